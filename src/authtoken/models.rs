use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use uuid::Uuid;

/// Number of random bytes in a key; the hex form is twice as long
const KEY_BYTES: usize = 20;

/// Length of a token key in characters
pub const KEY_LENGTH: usize = KEY_BYTES * 2;

/// An opaque bearer token, one per user
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
	pub key: String,
	pub user_id: Uuid,
	pub created: DateTime<Utc>,
}

impl Token {
	/// Issue a fresh token for a user
	pub fn new(user_id: Uuid) -> Self {
		Self {
			key: generate_key(),
			user_id,
			created: Utc::now(),
		}
	}
}

// Keys are credentials; keep them out of debug output
impl std::fmt::Debug for Token {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Token")
			.field("key", &"<redacted>")
			.field("user_id", &self.user_id)
			.field("created", &self.created)
			.finish()
	}
}

/// 40 lowercase hex characters from the operating system RNG
///
/// # Examples
///
/// ```
/// use backend_api::authtoken::models::{KEY_LENGTH, generate_key};
///
/// let key = generate_key();
/// assert_eq!(key.len(), KEY_LENGTH);
/// assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
/// ```
pub fn generate_key() -> String {
	let mut bytes = [0u8; KEY_BYTES];
	OsRng.fill_bytes(&mut bytes);

	bytes.iter().fold(String::with_capacity(KEY_LENGTH), |mut key, byte| {
		let _ = write!(key, "{:02x}", byte);
		key
	})
}
