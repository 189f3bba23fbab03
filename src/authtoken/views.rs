//! The token-obtain view

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::ready;
use futures_util::stream::once;
use hyper::Method;
use serde::Serialize;
use serde_json::{Map, Value};

use super::serializers::AuthTokenSerializer;
use super::store::TokenStore;
use crate::auth::backends::ModelBackend;
use crate::core::exception::{Error, Result};
use crate::core::handler::Handler;
use crate::core::http::{Request, Response};

const JSON: &str = "application/json";
const FORM: &str = "application/x-www-form-urlencoded";
const MULTIPART: &str = "multipart/form-data";

const ALLOWED_METHODS: [&str; 2] = ["POST", "OPTIONS"];

#[derive(Debug, Serialize)]
struct TokenResponse<'a> {
	token: &'a str,
}

#[derive(Debug, Serialize)]
struct ViewMetadata {
	name: &'static str,
	description: &'static str,
	renders: [&'static str; 1],
	parses: [&'static str; 3],
}

/// Exchanges a username and password for the user's token
///
/// `POST` a JSON object or form with `username` and `password`; the reply
/// is `{"token": "<key>"}`. The same key is returned on every login until
/// the token is revoked.
pub struct ObtainAuthToken {
	backend: ModelBackend,
	tokens: Arc<dyn TokenStore>,
}

impl ObtainAuthToken {
	pub fn new(backend: ModelBackend, tokens: Arc<dyn TokenStore>) -> Self {
		Self { backend, tokens }
	}

	/// Decode the body according to its media type
	///
	/// A request without a media type carries no data.
	async fn parse(request: &Request) -> Result<Value> {
		match request.content_type().as_deref() {
			Some(JSON) => {
				if request.body.is_empty() {
					Ok(Value::Object(Map::new()))
				} else {
					request.json::<Value>()
				}
			}
			Some(FORM) => {
				let fields: Vec<(String, String)> = request.form()?;
				// Repeated keys keep the last value
				let fields: HashMap<String, String> = fields.into_iter().collect();
				Ok(Value::Object(
					fields.into_iter().map(|(k, v)| (k, Value::String(v))).collect(),
				))
			}
			Some(MULTIPART) => Self::parse_multipart(request).await,
			Some(other) => Err(Error::UnsupportedMediaType(other.to_string())),
			None => Ok(Value::Object(Map::new())),
		}
	}

	/// Collect the text fields of a multipart body; file parts are skipped
	async fn parse_multipart(request: &Request) -> Result<Value> {
		let content_type = request.header("content-type").unwrap_or_default();
		let boundary = multer::parse_boundary(content_type)
			.map_err(|e| Error::Parse(format!("Multipart form parse error - {}", e)))?;

		let stream = once(ready(Ok::<_, std::io::Error>(request.body.clone())));
		let mut multipart = multer::Multipart::new(stream, boundary);

		let mut fields = Map::new();
		while let Some(field) = multipart
			.next_field()
			.await
			.map_err(|e| Error::Parse(format!("Multipart form parse error - {}", e)))?
		{
			let Some(name) = field.name().map(str::to_string) else {
				continue;
			};
			if field.file_name().is_some() {
				continue;
			}
			let text = field
				.text()
				.await
				.map_err(|e| Error::Parse(format!("Multipart form parse error - {}", e)))?;
			fields.insert(name, Value::String(text));
		}
		Ok(Value::Object(fields))
	}

	async fn post(&self, request: Request) -> Result<Response> {
		let data = Self::parse(&request).await?;
		let user = AuthTokenSerializer::validate(&data, &self.backend).await?;
		let (token, created) = self.tokens.get_or_create(user.id).await?;

		if created {
			tracing::debug!(user_id = %user.id, "issued new token");
		}
		Response::ok().with_json(&TokenResponse { token: &token.key })
	}

	fn options(&self) -> Result<Response> {
		Response::ok()
			.with_header("Allow", &ALLOWED_METHODS.join(", "))
			.with_json(&ViewMetadata {
				name: "Obtain Auth Token",
				description: "",
				renders: [JSON],
				parses: [FORM, MULTIPART, JSON],
			})
	}
}

#[async_trait]
impl Handler for ObtainAuthToken {
	async fn handle(&self, request: Request) -> Result<Response> {
		let method = request.method.clone();
		match method {
			Method::POST => self.post(request).await,
			Method::OPTIONS => self.options(),
			method => Err(Error::MethodNotAllowed {
				method: method.to_string(),
				allowed: ALLOWED_METHODS.to_vec(),
			}),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::auth::hashers::{Argon2Hasher, PasswordHasher};
	use crate::auth::models::User;
	use crate::auth::store::{InMemoryUserStore, UserStore};
	use crate::authtoken::models::KEY_LENGTH;
	use crate::authtoken::store::InMemoryTokenStore;
	use hyper::StatusCode;
	use rstest::rstest;

	async fn view() -> ObtainAuthToken {
		let hasher = Argon2Hasher::new();
		let users = InMemoryUserStore::new();
		users
			.insert(User::new("alice", hasher.hash("wonderland").unwrap()))
			.await
			.unwrap();
		let backend = ModelBackend::new(Arc::new(users), Arc::new(hasher));
		ObtainAuthToken::new(backend, Arc::new(InMemoryTokenStore::new()))
	}

	fn post(content_type: Option<&str>, body: &str) -> Request {
		let mut builder = Request::builder().method(Method::POST).uri("/auth").body(body.to_string());
		if let Some(content_type) = content_type {
			builder = builder.header("content-type", content_type);
		}
		builder.build().unwrap()
	}

	async fn respond(view: &ObtainAuthToken, request: Request) -> Response {
		view.handle(request).await.unwrap_or_else(Response::from)
	}

	#[rstest]
	#[case(Some("application/json"), r#"{"username": "alice", "password": "wonderland"}"#)]
	#[case(Some("application/json; charset=utf-8"), r#"{"username": " alice ", "password": "wonderland"}"#)]
	#[case(Some("application/x-www-form-urlencoded"), "username=alice&password=wonderland")]
	#[tokio::test]
	async fn test_valid_credentials_return_token(#[case] content_type: Option<&str>, #[case] body: &str) {
		let view = view().await;

		let response = respond(&view, post(content_type, body)).await;

		assert_eq!(response.status, StatusCode::OK);
		let body: Value = response.json().unwrap();
		assert_eq!(body.as_object().unwrap().len(), 1);
		assert_eq!(body["token"].as_str().unwrap().len(), KEY_LENGTH);
	}

	#[rstest]
	#[tokio::test]
	async fn test_repeated_login_returns_same_token() {
		let view = view().await;
		let body = r#"{"username": "alice", "password": "wonderland"}"#;

		let first: Value = respond(&view, post(Some(JSON), body)).await.json().unwrap();
		let second: Value = respond(&view, post(Some(JSON), body)).await.json().unwrap();

		assert_eq!(first["token"], second["token"]);
	}

	#[rstest]
	#[tokio::test]
	async fn test_wrong_password() {
		let view = view().await;

		let response = respond(
			&view,
			post(Some(JSON), r#"{"username": "alice", "password": "nope"}"#),
		)
		.await;

		assert_eq!(response.status, StatusCode::BAD_REQUEST);
		let body: Value = response.json().unwrap();
		assert_eq!(
			body,
			serde_json::json!({"non_field_errors": ["Unable to log in with provided credentials."]})
		);
	}

	#[rstest]
	#[tokio::test]
	async fn test_missing_fields() {
		let view = view().await;

		let response = respond(&view, post(None, "")).await;

		assert_eq!(response.status, StatusCode::BAD_REQUEST);
		let body: Value = response.json().unwrap();
		assert_eq!(
			body,
			serde_json::json!({
				"password": ["This field is required."],
				"username": ["This field is required."],
			})
		);
	}

	#[rstest]
	#[tokio::test]
	async fn test_malformed_json() {
		let view = view().await;

		let response = respond(&view, post(Some(JSON), "{\"username\": ")).await;

		assert_eq!(response.status, StatusCode::BAD_REQUEST);
		let body: Value = response.json().unwrap();
		assert!(body["detail"].as_str().unwrap().starts_with("JSON parse error - "));
	}

	#[rstest]
	#[tokio::test]
	async fn test_unsupported_media_type() {
		let view = view().await;

		let response = respond(&view, post(Some("text/plain"), "alice:wonderland")).await;

		assert_eq!(response.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
		let body: Value = response.json().unwrap();
		assert_eq!(body["detail"], "Unsupported media type \"text/plain\" in request.");
	}

	#[rstest]
	#[case(Method::GET)]
	#[case(Method::PUT)]
	#[case(Method::DELETE)]
	#[tokio::test]
	async fn test_method_not_allowed(#[case] method: Method) {
		let view = view().await;
		let request = Request::builder().method(method.clone()).uri("/auth").build().unwrap();

		let response = respond(&view, request).await;

		assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
		assert_eq!(response.headers.get("allow").unwrap(), "POST, OPTIONS");
		let body: Value = response.json().unwrap();
		assert_eq!(body["detail"], format!("Method \"{}\" not allowed.", method));
	}

	#[rstest]
	#[tokio::test]
	async fn test_options_metadata() {
		let view = view().await;
		let request = Request::builder().method(Method::OPTIONS).uri("/auth").build().unwrap();

		let response = respond(&view, request).await;

		assert_eq!(response.status, StatusCode::OK);
		let body: Value = response.json().unwrap();
		assert_eq!(body["name"], "Obtain Auth Token");
		assert_eq!(body["renders"], serde_json::json!(["application/json"]));
		assert_eq!(
			body["parses"],
			serde_json::json!([
				"application/x-www-form-urlencoded",
				"multipart/form-data",
				"application/json"
			])
		);
	}

	#[rstest]
	#[tokio::test]
	async fn test_form_last_value_wins() {
		let view = view().await;

		let response = respond(
			&view,
			post(Some(FORM), "username=bob&username=alice&password=wonderland"),
		)
		.await;

		assert_eq!(response.status, StatusCode::OK);
	}

	#[rstest]
	#[tokio::test]
	async fn test_inactive_user_cannot_log_in() {
		let hasher = Argon2Hasher::new();
		let users = InMemoryUserStore::new();
		users
			.insert(User::new("carol", hasher.hash("pw").unwrap()).with_active(false))
			.await
			.unwrap();
		let view = ObtainAuthToken::new(
			ModelBackend::new(Arc::new(users.clone()), Arc::new(hasher)),
			Arc::new(InMemoryTokenStore::new()),
		);

		let response = respond(&view, post(Some(JSON), r#"{"username": "carol", "password": "pw"}"#)).await;

		assert_eq!(response.status, StatusCode::BAD_REQUEST);
		assert_eq!(users.count().await.unwrap(), 1);
	}

	#[rstest]
	#[tokio::test]
	async fn test_body_without_media_type_is_empty_data() {
		let view = view().await;

		let response = respond(&view, post(None, "username=alice&password=wonderland")).await;

		assert_eq!(response.status, StatusCode::BAD_REQUEST);
		let body: Value = response.json().unwrap();
		assert_eq!(
			body,
			serde_json::json!({
				"password": ["This field is required."],
				"username": ["This field is required."],
			})
		);
	}

	fn multipart_body(parts: &[(&str, Option<&str>, &str)]) -> String {
		let mut body = String::new();
		for (name, file_name, value) in parts {
			body.push_str("--XyZ\r\n");
			match file_name {
				Some(file_name) => body.push_str(&format!(
					"Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: text/plain\r\n",
					name, file_name
				)),
				None => body.push_str(&format!("Content-Disposition: form-data; name=\"{}\"\r\n", name)),
			}
			body.push_str(&format!("\r\n{}\r\n", value));
		}
		body.push_str("--XyZ--\r\n");
		body
	}

	#[rstest]
	#[tokio::test]
	async fn test_multipart_login() {
		let view = view().await;
		let body = multipart_body(&[("username", None, "alice"), ("password", None, "wonderland")]);

		let response = respond(&view, post(Some("multipart/form-data; boundary=XyZ"), &body)).await;

		assert_eq!(response.status, StatusCode::OK);
		let body: Value = response.json().unwrap();
		assert_eq!(body["token"].as_str().unwrap().len(), KEY_LENGTH);
	}

	#[rstest]
	#[tokio::test]
	async fn test_multipart_file_parts_are_ignored() {
		let view = view().await;
		let body = multipart_body(&[("username", None, "alice"), ("password", Some("pw.txt"), "wonderland")]);

		let response = respond(&view, post(Some("multipart/form-data; boundary=XyZ"), &body)).await;

		assert_eq!(response.status, StatusCode::BAD_REQUEST);
		let body: Value = response.json().unwrap();
		assert_eq!(body, serde_json::json!({"password": ["This field is required."]}));
	}

	#[rstest]
	#[tokio::test]
	async fn test_multipart_without_boundary() {
		let view = view().await;

		let response = respond(&view, post(Some("multipart/form-data"), "username=alice")).await;

		assert_eq!(response.status, StatusCode::BAD_REQUEST);
		let body: Value = response.json().unwrap();
		assert!(body["detail"].as_str().unwrap().starts_with("Multipart form parse error - "));
	}
}
