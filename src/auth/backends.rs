use std::sync::Arc;

use super::hashers::PasswordHasher;
use super::models::User;
use super::store::UserStore;
use crate::core::exception::{Error, Result};

/// Checks a username and password against the user store
///
/// Lookups for unknown usernames still pay for one hash so response time
/// does not reveal which accounts exist.
#[derive(Clone)]
pub struct ModelBackend {
	users: Arc<dyn UserStore>,
	hasher: Arc<dyn PasswordHasher>,
}

impl ModelBackend {
	pub fn new(users: Arc<dyn UserStore>, hasher: Arc<dyn PasswordHasher>) -> Self {
		Self { users, hasher }
	}

	pub fn users(&self) -> &Arc<dyn UserStore> {
		&self.users
	}

	/// Return the user when the credentials are valid and the account is active
	pub async fn authenticate(&self, username: &str, password: &str) -> Result<Option<User>> {
		let user = self.users.get_by_username(username).await?;
		let hasher = self.hasher.clone();
		let password = password.to_string();

		let Some(user) = user else {
			tokio::task::spawn_blocking(move || hasher.hash(&password))
				.await
				.map_err(|e| Error::Internal(e.to_string()))??;
			tracing::debug!("authentication failed: unknown user");
			return Ok(None);
		};

		let stored = user.password.clone();
		let valid = tokio::task::spawn_blocking(move || hasher.verify(&password, &stored))
			.await
			.map_err(|e| Error::Internal(e.to_string()))??;

		if !valid {
			tracing::debug!(user_id = %user.id, "authentication failed: wrong password");
			return Ok(None);
		}
		if !user.is_active {
			tracing::debug!(user_id = %user.id, "authentication failed: inactive user");
			return Ok(None);
		}
		Ok(Some(user))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::auth::hashers::Argon2Hasher;
	use crate::auth::store::InMemoryUserStore;
	use rstest::{fixture, rstest};

	#[fixture]
	async fn backend() -> ModelBackend {
		let hasher = Argon2Hasher::new();
		let users = InMemoryUserStore::new();
		users
			.insert(User::new("alice", hasher.hash("wonderland").unwrap()))
			.await
			.unwrap();
		users
			.insert(User::new("bob", hasher.hash("builder").unwrap()).with_active(false))
			.await
			.unwrap();
		ModelBackend::new(Arc::new(users), Arc::new(hasher))
	}

	#[rstest]
	#[tokio::test]
	async fn test_valid_credentials(#[future] backend: ModelBackend) {
		let backend = backend.await;

		let user = backend.authenticate("alice", "wonderland").await.unwrap();

		assert_eq!(user.map(|u| u.username), Some("alice".to_string()));
	}

	#[rstest]
	#[case("alice", "wrong")]
	#[case("nobody", "wonderland")]
	#[case("bob", "builder")]
	#[tokio::test]
	async fn test_rejected_credentials(
		#[future] backend: ModelBackend,
		#[case] username: &str,
		#[case] password: &str,
	) {
		let backend = backend.await;

		let user = backend.authenticate(username, password).await.unwrap();

		assert!(user.is_none());
	}
}
