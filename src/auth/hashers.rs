use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{
	PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
};

use crate::core::exception::{Error, Result};

/// Password hasher trait
///
/// # Examples
///
/// ```
/// use backend_api::auth::hashers::{Argon2Hasher, PasswordHasher};
///
/// let hasher = Argon2Hasher::new();
/// let hash = hasher.hash("my_secure_password").unwrap();
///
/// assert!(hasher.verify("my_secure_password", &hash).unwrap());
/// assert!(!hasher.verify("wrong_password", &hash).unwrap());
/// ```
pub trait PasswordHasher: Send + Sync {
	/// Hash a plaintext password into a self-describing string
	fn hash(&self, password: &str) -> Result<String>;

	/// `Ok(false)` on mismatch; `Err` only when `hash` is unreadable
	fn verify(&self, password: &str, hash: &str) -> Result<bool>;

	/// Whether `hash` is a string this hasher can verify against
	fn identifies(&self, hash: &str) -> bool;
}

/// Argon2id hasher producing PHC strings (`$argon2id$v=19$...`)
#[derive(Debug, Default, Clone, Copy)]
pub struct Argon2Hasher;

impl Argon2Hasher {
	pub fn new() -> Self {
		Self
	}
}

impl PasswordHasher for Argon2Hasher {
	fn hash(&self, password: &str) -> Result<String> {
		let salt = SaltString::generate(&mut OsRng);

		Argon2::default()
			.hash_password(password.as_bytes(), &salt)
			.map(|hash| hash.to_string())
			.map_err(|e| Error::Internal(format!("password hashing failed: {}", e)))
	}

	fn verify(&self, password: &str, hash: &str) -> Result<bool> {
		let parsed_hash = PasswordHash::new(hash)
			.map_err(|e| Error::Internal(format!("unreadable password hash: {}", e)))?;

		Ok(Argon2::default()
			.verify_password(password.as_bytes(), &parsed_hash)
			.is_ok())
	}

	fn identifies(&self, hash: &str) -> bool {
		PasswordHash::new(hash).is_ok_and(|parsed| parsed.algorithm.as_str().starts_with("argon2"))
	}
}
