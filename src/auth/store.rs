//! User storage

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::User;
use crate::core::exception::{Error, Result};

#[async_trait]
pub trait UserStore: Send + Sync {
	/// Add a user; usernames must be unique
	async fn insert(&self, user: User) -> Result<()>;

	async fn get(&self, id: Uuid) -> Result<Option<User>>;

	/// Exact, case-sensitive lookup
	async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

	async fn count(&self) -> Result<usize>;
}

/// In-memory user storage
#[derive(Clone, Default)]
pub struct InMemoryUserStore {
	users: Arc<RwLock<HashMap<Uuid, User>>>,
}

impl InMemoryUserStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl UserStore for InMemoryUserStore {
	async fn insert(&self, user: User) -> Result<()> {
		let mut users = self.users.write().await;
		if users.values().any(|existing| existing.username == user.username) {
			return Err(Error::ImproperlyConfigured(format!(
				"duplicate username '{}'",
				user.username
			)));
		}
		users.insert(user.id, user);
		Ok(())
	}

	async fn get(&self, id: Uuid) -> Result<Option<User>> {
		Ok(self.users.read().await.get(&id).cloned())
	}

	async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
		Ok(self
			.users
			.read()
			.await
			.values()
			.find(|user| user.username == username)
			.cloned())
	}

	async fn count(&self) -> Result<usize> {
		Ok(self.users.read().await.len())
	}
}
