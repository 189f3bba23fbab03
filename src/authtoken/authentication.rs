//! `Authorization: Token <key>` request authentication

use std::sync::Arc;

use async_trait::async_trait;

use super::store::TokenStore;
use crate::auth::models::AuthenticatedUser;
use crate::auth::store::UserStore;
use crate::core::exception::{Error, Result};
use crate::core::handler::{Handler, Middleware};
use crate::core::http::{Request, Response};

/// Scheme keyword expected in the Authorization header
pub const KEYWORD: &str = "Token";

const NO_CREDENTIALS: &str = "Invalid token header. No credentials provided.";
const CONTAINS_SPACES: &str = "Invalid token header. Token string should not contain spaces.";
const INVALID_CHARACTERS: &str = "Invalid token header. Token string should not contain invalid characters.";
const INVALID_TOKEN: &str = "Invalid token.";
const INACTIVE_USER: &str = "User inactive or deleted.";

/// Resolves the user behind a token header
#[derive(Clone)]
pub struct TokenAuthentication {
	tokens: Arc<dyn TokenStore>,
	users: Arc<dyn UserStore>,
}

impl TokenAuthentication {
	pub fn new(tokens: Arc<dyn TokenStore>, users: Arc<dyn UserStore>) -> Self {
		Self { tokens, users }
	}

	/// Extract the key from a raw header value
	///
	/// `Ok(None)` means the header uses another scheme and the request
	/// should be treated as anonymous. Only the key itself has to be valid
	/// UTF-8.
	///
	/// # Examples
	///
	/// ```
	/// use backend_api::authtoken::authentication::TokenAuthentication;
	///
	/// assert_eq!(TokenAuthentication::parse_header(b"Token abc123").unwrap(), Some("abc123"));
	/// assert_eq!(TokenAuthentication::parse_header(b"token abc123").unwrap(), Some("abc123"));
	/// assert_eq!(TokenAuthentication::parse_header(b"Bearer abc123").unwrap(), None);
	/// assert_eq!(TokenAuthentication::parse_header(b"Bearer \xff").unwrap(), None);
	/// assert!(TokenAuthentication::parse_header(b"Token").is_err());
	/// ```
	pub fn parse_header(header: &[u8]) -> Result<Option<&str>> {
		let mut parts = header
			.split(|b| b.is_ascii_whitespace())
			.filter(|part| !part.is_empty());
		match parts.next() {
			Some(scheme) if scheme.eq_ignore_ascii_case(KEYWORD.as_bytes()) => {}
			_ => return Ok(None),
		}

		let key = parts
			.next()
			.ok_or_else(|| Error::AuthenticationFailed(NO_CREDENTIALS.to_string()))?;
		if parts.next().is_some() {
			return Err(Error::AuthenticationFailed(CONTAINS_SPACES.to_string()));
		}
		std::str::from_utf8(key)
			.map(Some)
			.map_err(|_| Error::AuthenticationFailed(INVALID_CHARACTERS.to_string()))
	}

	/// Authenticate a request
	///
	/// Returns `Ok(None)` for anonymous requests and an
	/// `AuthenticationFailed` error for bad tokens.
	pub async fn authenticate(&self, request: &Request) -> Result<Option<AuthenticatedUser>> {
		let Some(raw) = request.headers.get(hyper::header::AUTHORIZATION) else {
			return Ok(None);
		};

		match Self::parse_header(raw.as_bytes())? {
			Some(key) => self.authenticate_credentials(key).await.map(Some),
			None => Ok(None),
		}
	}

	pub async fn authenticate_credentials(&self, key: &str) -> Result<AuthenticatedUser> {
		let token = self
			.tokens
			.get_by_key(key)
			.await?
			.ok_or_else(|| Error::AuthenticationFailed(INVALID_TOKEN.to_string()))?;

		match self.users.get(token.user_id).await? {
			Some(user) if user.is_active => Ok(AuthenticatedUser {
				user,
				token: token.key,
			}),
			_ => Err(Error::AuthenticationFailed(INACTIVE_USER.to_string())),
		}
	}
}

/// Attaches [`AuthenticatedUser`] to requests carrying a valid token
///
/// Requests without a token pass through untouched; requests with a bad
/// token are rejected with 401.
pub struct TokenAuthenticationMiddleware {
	authentication: TokenAuthentication,
}

impl TokenAuthenticationMiddleware {
	pub fn new(authentication: TokenAuthentication) -> Self {
		Self { authentication }
	}
}

#[async_trait]
impl Middleware for TokenAuthenticationMiddleware {
	async fn process(&self, mut request: Request, next: Arc<dyn Handler>) -> Result<Response> {
		match self.authentication.authenticate(&request).await {
			Ok(Some(authenticated)) => {
				tracing::debug!(user_id = %authenticated.user.id, "token authenticated");
				request.extensions.insert(authenticated);
			}
			Ok(None) => {}
			Err(err) => {
				tracing::debug!(error = %err, "token authentication rejected");
				return Err(err);
			}
		}
		next.handle(request).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::auth::models::User;
	use crate::auth::store::InMemoryUserStore;
	use crate::authtoken::store::InMemoryTokenStore;
	use crate::core::handler::MiddlewareChain;
	use rstest::rstest;

	struct Context {
		authentication: TokenAuthentication,
		tokens: InMemoryTokenStore,
		active_key: String,
		inactive_key: String,
	}

	async fn context() -> Context {
		let users = InMemoryUserStore::new();
		let tokens = InMemoryTokenStore::new();
		let alice = User::new("alice", "hash");
		let bob = User::new("bob", "hash").with_active(false);
		let (alice_token, _) = tokens.get_or_create(alice.id).await.unwrap();
		let (bob_token, _) = tokens.get_or_create(bob.id).await.unwrap();
		users.insert(alice).await.unwrap();
		users.insert(bob).await.unwrap();

		Context {
			authentication: TokenAuthentication::new(Arc::new(tokens.clone()), Arc::new(users)),
			tokens,
			active_key: alice_token.key,
			inactive_key: bob_token.key,
		}
	}

	fn request_with(header: Option<&str>) -> Request {
		let mut builder = Request::builder().uri("/auth");
		if let Some(value) = header {
			builder = builder.header("authorization", value);
		}
		builder.build().unwrap()
	}

	fn failure_message(result: Result<Option<AuthenticatedUser>>) -> String {
		match result {
			Err(Error::AuthenticationFailed(message)) => message,
			other => panic!("expected authentication failure, got {:?}", other.map(|u| u.is_some())),
		}
	}

	#[rstest]
	#[tokio::test]
	async fn test_valid_token() {
		let ctx = context().await;
		let request = request_with(Some(&format!("Token {}", ctx.active_key)));

		let authenticated = ctx.authentication.authenticate(&request).await.unwrap().unwrap();

		assert_eq!(authenticated.user.username, "alice");
		assert_eq!(authenticated.token, ctx.active_key);
	}

	#[rstest]
	#[case(None)]
	#[case(Some("Bearer something"))]
	#[case(Some("Basic YWxpY2U6c2VjcmV0"))]
	#[tokio::test]
	async fn test_anonymous(#[case] header: Option<&str>) {
		let ctx = context().await;

		let result = ctx.authentication.authenticate(&request_with(header)).await.unwrap();

		assert!(result.is_none());
	}

	#[rstest]
	#[case("Token", NO_CREDENTIALS)]
	#[case("Token a b", CONTAINS_SPACES)]
	#[case("Token 0000000000000000000000000000000000000000", INVALID_TOKEN)]
	#[tokio::test]
	async fn test_rejected_headers(#[case] header: &str, #[case] expected: &str) {
		let ctx = context().await;

		let result = ctx.authentication.authenticate(&request_with(Some(header))).await;

		assert_eq!(failure_message(result), expected);
	}

	#[rstest]
	#[tokio::test]
	async fn test_non_ascii_header() {
		let ctx = context().await;
		let mut request = request_with(None);
		request.headers.insert(
			hyper::header::AUTHORIZATION,
			hyper::header::HeaderValue::from_bytes(b"Token \xff\xfe").unwrap(),
		);

		let result = ctx.authentication.authenticate(&request).await;

		assert_eq!(failure_message(result), INVALID_CHARACTERS);
	}

	#[rstest]
	#[tokio::test]
	async fn test_other_scheme_with_non_ascii_bytes_is_anonymous() {
		let ctx = context().await;
		let mut request = request_with(None);
		request.headers.insert(
			hyper::header::AUTHORIZATION,
			hyper::header::HeaderValue::from_bytes(b"Bearer \xff\xfe").unwrap(),
		);

		let result = ctx.authentication.authenticate(&request).await.unwrap();

		assert!(result.is_none());
	}

	#[rstest]
	#[tokio::test]
	async fn test_inactive_user() {
		let ctx = context().await;
		let request = request_with(Some(&format!("Token {}", ctx.inactive_key)));

		let result = ctx.authentication.authenticate(&request).await;

		assert_eq!(failure_message(result), INACTIVE_USER);
	}

	#[rstest]
	#[tokio::test]
	async fn test_revoked_token() {
		let ctx = context().await;
		let token = ctx.tokens.get_by_key(&ctx.active_key).await.unwrap().unwrap();
		ctx.tokens.delete_for_user(token.user_id).await.unwrap();
		let request = request_with(Some(&format!("Token {}", ctx.active_key)));

		let result = ctx.authentication.authenticate(&request).await;

		assert_eq!(failure_message(result), INVALID_TOKEN);
	}

	struct WhoAmI;

	#[async_trait]
	impl Handler for WhoAmI {
		async fn handle(&self, request: Request) -> Result<Response> {
			let name = request
				.extensions
				.get::<AuthenticatedUser>()
				.map(|a| a.user.username.clone())
				.unwrap_or_else(|| "anonymous".to_string());
			Ok(Response::ok().with_body(name))
		}
	}

	#[rstest]
	#[tokio::test]
	async fn test_middleware_attaches_user() {
		let ctx = context().await;
		let chain = MiddlewareChain::new(Arc::new(WhoAmI))
			.with_middleware(Arc::new(TokenAuthenticationMiddleware::new(ctx.authentication.clone())));

		let response = chain
			.handle(request_with(Some(&format!("Token {}", ctx.active_key))))
			.await
			.unwrap();
		assert_eq!(response.body, "alice");

		let response = chain.handle(request_with(None)).await.unwrap();
		assert_eq!(response.body, "anonymous");

		let result = chain.handle(request_with(Some("Token nope"))).await;
		assert!(matches!(result, Err(Error::AuthenticationFailed(_))));
	}
}
