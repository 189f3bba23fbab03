//! # backend-api
//!
//! Token login for the frontend: `POST /auth` with a username and password
//! returns the user's API token, which later requests send back as
//! `Authorization: Token <key>`.
//!
//! ## Layout
//!
//! - [`core`]: request/response types, handlers and middleware, the regex
//!   URL resolver, the hyper server and logging
//! - [`auth`]: users, password hashing and the credential backend
//! - [`authtoken`]: tokens, the token-obtain view and token authentication
//! - [`config`]: settings and the root URL configuration
//! - [`apps`]: the api app and its route table
//!
//! ## Quick Start
//!
//! ```no_run
//! use backend_api::build_application;
//! use backend_api::config::Settings;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::load(None)?;
//! let app = build_application(&settings).await?;
//! app.server().listen(settings.bind_address()?).await?;
//! # Ok(())
//! # }
//! ```

pub mod apps;
pub mod auth;
pub mod authtoken;
pub mod config;
pub mod core;

use std::sync::Arc;

use crate::auth::backends::ModelBackend;
use crate::auth::hashers::{Argon2Hasher, PasswordHasher};
use crate::auth::models::User;
use crate::auth::store::{InMemoryUserStore, UserStore};
use crate::authtoken::authentication::{TokenAuthentication, TokenAuthenticationMiddleware};
use crate::authtoken::store::{InMemoryTokenStore, TokenStore};
use crate::config::settings::{Settings, UserSeed};
use crate::core::exception::{Error, Result};
use crate::core::logging::RequestLoggingMiddleware;
use crate::core::server::HttpServer;
use crate::core::urls::UrlResolver;

/// Shared stores and the password hasher
#[derive(Clone)]
pub struct Services {
	pub users: Arc<dyn UserStore>,
	pub tokens: Arc<dyn TokenStore>,
	pub hasher: Arc<dyn PasswordHasher>,
}

impl Services {
	/// Empty in-memory stores with the Argon2 hasher
	pub fn in_memory() -> Self {
		Self {
			users: Arc::new(InMemoryUserStore::new()),
			tokens: Arc::new(InMemoryTokenStore::new()),
			hasher: Arc::new(Argon2Hasher::new()),
		}
	}

	pub fn backend(&self) -> ModelBackend {
		ModelBackend::new(self.users.clone(), self.hasher.clone())
	}

	pub fn token_authentication(&self) -> TokenAuthentication {
		TokenAuthentication::new(self.tokens.clone(), self.users.clone())
	}

	/// Create a user from a settings entry
	pub async fn seed_user(&self, seed: &UserSeed) -> Result<User> {
		let password_hash = match (&seed.password, &seed.password_hash) {
			(Some(password), None) => {
				let hasher = self.hasher.clone();
				let password = password.clone();
				tokio::task::spawn_blocking(move || hasher.hash(&password))
					.await
					.map_err(|e| Error::Internal(format!("hashing task failed: {}", e)))??
			}
			(None, Some(hash)) if self.hasher.identifies(hash) => hash.clone(),
			(None, Some(_)) => {
				return Err(Error::ImproperlyConfigured(format!(
					"user '{}' has an unrecognised password_hash",
					seed.username
				)));
			}
			_ => {
				return Err(Error::ImproperlyConfigured(format!(
					"user '{}' needs exactly one of password or password_hash",
					seed.username
				)));
			}
		};

		let user = User::new(seed.username.trim(), password_hash)
			.with_email(seed.email.clone())
			.with_active(seed.is_active);
		self.users.insert(user.clone()).await?;
		Ok(user)
	}
}

/// A fully wired application, ready to serve
pub struct Application {
	pub services: Services,
	pub urls: Arc<UrlResolver>,
	max_body_bytes: usize,
}

impl Application {
	/// The HTTP server: request logging, then token authentication, then
	/// URL resolution
	pub fn server(&self) -> HttpServer {
		HttpServer::new(self.urls.clone())
			.with_middleware(Arc::new(RequestLoggingMiddleware::new()))
			.with_middleware(Arc::new(TokenAuthenticationMiddleware::new(
				self.services.token_authentication(),
			)))
			.with_max_body_bytes(self.max_body_bytes)
	}
}

/// Build the application from settings with fresh in-memory stores
pub async fn build_application(settings: &Settings) -> Result<Application> {
	build_application_with(settings, Services::in_memory()).await
}

/// Build the application around existing services
pub async fn build_application_with(settings: &Settings, services: Services) -> Result<Application> {
	for seed in &settings.users {
		let user = services.seed_user(seed).await?;
		tracing::debug!(username = %user.username, is_active = user.is_active, "seeded user");
	}

	let urls = config::urls::url_patterns(settings, &services)?;
	tracing::debug!(routes = urls.len(), prefix = %settings.api_prefix, "url patterns loaded");

	Ok(Application {
		services,
		urls: Arc::new(urls),
		max_body_bytes: settings.max_body_bytes,
	})
}
