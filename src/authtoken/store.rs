//! Token storage

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::Token;
use crate::core::exception::Result;

#[async_trait]
pub trait TokenStore: Send + Sync {
	/// Return the user's token, issuing one if none exists
	///
	/// The boolean is `true` when a new token was created.
	async fn get_or_create(&self, user_id: Uuid) -> Result<(Token, bool)>;

	async fn get_by_key(&self, key: &str) -> Result<Option<Token>>;

	/// Revoke the user's token; returns whether one existed
	async fn delete_for_user(&self, user_id: Uuid) -> Result<bool>;
}

#[derive(Default)]
struct Tokens {
	by_user: HashMap<Uuid, Token>,
	// key -> user id
	by_key: HashMap<String, Uuid>,
}

/// In-memory token storage; tokens live as long as the process
#[derive(Clone, Default)]
pub struct InMemoryTokenStore {
	tokens: Arc<RwLock<Tokens>>,
}

impl InMemoryTokenStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
	async fn get_or_create(&self, user_id: Uuid) -> Result<(Token, bool)> {
		let mut tokens = self.tokens.write().await;
		if let Some(token) = tokens.by_user.get(&user_id) {
			return Ok((token.clone(), false));
		}

		let mut token = Token::new(user_id);
		while tokens.by_key.contains_key(&token.key) {
			token = Token::new(user_id);
		}
		tokens.by_key.insert(token.key.clone(), user_id);
		tokens.by_user.insert(user_id, token.clone());
		Ok((token, true))
	}

	async fn get_by_key(&self, key: &str) -> Result<Option<Token>> {
		let tokens = self.tokens.read().await;
		Ok(tokens
			.by_key
			.get(key)
			.and_then(|user_id| tokens.by_user.get(user_id))
			.cloned())
	}

	async fn delete_for_user(&self, user_id: Uuid) -> Result<bool> {
		let mut tokens = self.tokens.write().await;
		match tokens.by_user.remove(&user_id) {
			Some(token) => {
				tokens.by_key.remove(&token.key);
				Ok(true)
			}
			None => Ok(false),
		}
	}
}
