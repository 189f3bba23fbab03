use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An account that can exchange credentials for a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
	pub id: Uuid,
	pub username: String,
	#[serde(default)]
	pub email: String,
	/// Password hash as produced by a [`PasswordHasher`](super::hashers::PasswordHasher)
	#[serde(skip_serializing)]
	pub password: String,
	pub is_active: bool,
	pub date_joined: DateTime<Utc>,
}

impl User {
	/// New active user with an already hashed password
	///
	/// # Examples
	///
	/// ```
	/// use backend_api::auth::models::User;
	///
	/// let user = User::new("alice", "$argon2id$...");
	/// assert_eq!(user.username, "alice");
	/// assert!(user.is_active);
	/// ```
	pub fn new(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
		Self {
			id: Uuid::new_v4(),
			username: username.into(),
			email: String::new(),
			password: password_hash.into(),
			is_active: true,
			date_joined: Utc::now(),
		}
	}

	pub fn with_email(mut self, email: impl Into<String>) -> Self {
		self.email = email.into();
		self
	}

	pub fn with_active(mut self, is_active: bool) -> Self {
		self.is_active = is_active;
		self
	}
}

/// The user resolved from request credentials, stored in request extensions
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
	pub user: User,
	/// Key of the token that authenticated the request
	pub token: String,
}
