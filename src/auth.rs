//! Users, password hashing and the username/password backend.
//!
//! ## Architecture
//!
//! - [`models`]: the `User` record and the per-request `AuthenticatedUser`
//! - [`hashers`]: `PasswordHasher` trait and the Argon2id implementation
//! - [`store`]: `UserStore` trait with an in-memory implementation
//! - [`backends`]: `ModelBackend`, which turns credentials into a user

pub mod backends;
pub mod hashers;
pub mod models;
pub mod store;

pub use backends::ModelBackend;
pub use hashers::{Argon2Hasher, PasswordHasher};
pub use models::{AuthenticatedUser, User};
pub use store::{InMemoryUserStore, UserStore};
