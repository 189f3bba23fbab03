//! Request and response types passed between the server, middleware and views.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use hyper::header::{self, HeaderName, HeaderValue};
use hyper::{HeaderMap, Method, StatusCode, Uri, Version};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::exception::{Error, Result};

/// HTTP request representation
pub struct Request {
	pub method: Method,
	pub uri: Uri,
	pub version: Version,
	pub headers: HeaderMap,
	pub body: Bytes,
	/// Named groups captured by the URL resolver
	pub path_params: HashMap<String, String>,
	pub remote_addr: Option<SocketAddr>,
	/// Per-request data attached by middleware
	pub extensions: http::Extensions,
}

impl Request {
	pub fn new(method: Method, uri: Uri, version: Version, headers: HeaderMap, body: Bytes) -> Self {
		Self {
			method,
			uri,
			version,
			headers,
			body,
			path_params: HashMap::new(),
			remote_addr: None,
			extensions: http::Extensions::new(),
		}
	}

	/// Start building a request
	///
	/// # Examples
	///
	/// ```
	/// use backend_api::core::http::Request;
	/// use hyper::Method;
	///
	/// let request = Request::builder()
	///     .method(Method::POST)
	///     .uri("/auth")
	///     .header("content-type", "application/json")
	///     .body(r#"{"username": "alice"}"#)
	///     .build()
	///     .unwrap();
	///
	/// assert_eq!(request.path(), "/auth");
	/// assert_eq!(request.content_type(), Some("application/json".to_string()));
	/// ```
	pub fn builder() -> RequestBuilder {
		RequestBuilder::default()
	}

	pub fn path(&self) -> &str {
		self.uri.path()
	}

	/// Media type of the body, lowercased and without parameters
	pub fn content_type(&self) -> Option<String> {
		self.headers
			.get(header::CONTENT_TYPE)
			.and_then(|value| value.to_str().ok())
			.and_then(|value| value.split(';').next())
			.map(|media_type| media_type.trim().to_ascii_lowercase())
			.filter(|media_type| !media_type.is_empty())
	}

	/// Decode the body as JSON
	pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
		serde_json::from_slice(&self.body).map_err(|e| Error::Parse(format!("JSON parse error - {}", e)))
	}

	/// Decode the body as `application/x-www-form-urlencoded`
	pub fn form<T: DeserializeOwned>(&self) -> Result<T> {
		serde_urlencoded::from_bytes(&self.body)
			.map_err(|e| Error::Parse(format!("Form parse error - {}", e)))
	}

	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name).and_then(|value| value.to_str().ok())
	}
}

/// Builder for [`Request`], mostly used by tests
#[derive(Default)]
pub struct RequestBuilder {
	method: Option<Method>,
	uri: Option<String>,
	headers: HeaderMap,
	body: Bytes,
	remote_addr: Option<SocketAddr>,
}

impl RequestBuilder {
	pub fn method(mut self, method: Method) -> Self {
		self.method = Some(method);
		self
	}

	pub fn uri(mut self, uri: impl Into<String>) -> Self {
		self.uri = Some(uri.into());
		self
	}

	/// Add a header; invalid names or values are ignored
	pub fn header(mut self, name: &str, value: &str) -> Self {
		if let Ok(name) = HeaderName::from_bytes(name.as_bytes())
			&& let Ok(value) = HeaderValue::from_str(value)
		{
			self.headers.append(name, value);
		}
		self
	}

	pub fn body(mut self, body: impl Into<Bytes>) -> Self {
		self.body = body.into();
		self
	}

	pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
		self.remote_addr = Some(addr);
		self
	}

	pub fn build(self) -> Result<Request> {
		let uri = self
			.uri
			.unwrap_or_else(|| "/".to_string())
			.parse::<Uri>()
			.map_err(|e| Error::Parse(format!("Invalid URI: {}", e)))?;
		let mut request = Request::new(
			self.method.unwrap_or(Method::GET),
			uri,
			Version::HTTP_11,
			self.headers,
			self.body,
		);
		request.remote_addr = self.remote_addr;
		Ok(request)
	}
}

/// HTTP response representation
pub struct Response {
	pub status: StatusCode,
	pub headers: HeaderMap,
	pub body: Bytes,
}

impl Response {
	/// Create a new Response with the given status code
	///
	/// # Examples
	///
	/// ```
	/// use backend_api::core::http::Response;
	/// use hyper::StatusCode;
	///
	/// let response = Response::new(StatusCode::OK);
	/// assert_eq!(response.status, StatusCode::OK);
	/// assert!(response.body.is_empty());
	/// ```
	pub fn new(status: StatusCode) -> Self {
		Self {
			status,
			headers: HeaderMap::new(),
			body: Bytes::new(),
		}
	}

	pub fn ok() -> Self {
		Self::new(StatusCode::OK)
	}

	pub fn bad_request() -> Self {
		Self::new(StatusCode::BAD_REQUEST)
	}

	pub fn unauthorized() -> Self {
		Self::new(StatusCode::UNAUTHORIZED)
	}

	pub fn not_found() -> Self {
		Self::new(StatusCode::NOT_FOUND)
	}

	pub fn internal_server_error() -> Self {
		Self::new(StatusCode::INTERNAL_SERVER_ERROR)
	}

	pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
		self.body = body.into();
		self
	}

	/// Add a header; invalid names or values are ignored
	///
	/// # Examples
	///
	/// ```
	/// use backend_api::core::http::Response;
	///
	/// let response = Response::ok().with_header("Allow", "POST, OPTIONS");
	/// assert_eq!(response.headers.get("allow").unwrap(), "POST, OPTIONS");
	/// ```
	pub fn with_header(mut self, name: &str, value: &str) -> Self {
		if let Ok(header_name) = HeaderName::from_bytes(name.as_bytes())
			&& let Ok(header_value) = HeaderValue::from_str(value)
		{
			self.headers.insert(header_name, header_value);
		}
		self
	}

	/// Set the body to JSON and add the matching Content-Type header
	///
	/// # Examples
	///
	/// ```
	/// use backend_api::core::http::Response;
	/// use serde_json::json;
	///
	/// let response = Response::ok().with_json(&json!({"token": "abc"})).unwrap();
	/// assert_eq!(response.headers.get("content-type").unwrap(), "application/json");
	/// ```
	pub fn with_json<T: Serialize>(mut self, data: &T) -> Result<Self> {
		let json = serde_json::to_vec(data)?;
		self.body = Bytes::from(json);
		self.headers.insert(
			header::CONTENT_TYPE,
			HeaderValue::from_static("application/json"),
		);
		Ok(self)
	}

	/// Parse the body as JSON
	pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
		Ok(serde_json::from_slice(&self.body)?)
	}
}

impl From<Error> for Response {
	fn from(error: Error) -> Self {
		let status = error.status();
		let body = match &error {
			Error::Validation(errors) => serde_json::to_value(errors),
			_ => Ok(serde_json::json!({ "detail": error.detail() })),
		};

		let mut response = match body {
			Ok(body) => Response::new(status)
				.with_json(&body)
				.unwrap_or_else(|_| Response::internal_server_error()),
			Err(_) => Response::internal_server_error(),
		};

		match &error {
			Error::MethodNotAllowed { allowed, .. } => {
				response = response.with_header("Allow", &allowed.join(", "));
			}
			Error::AuthenticationFailed(_) => {
				response = response.with_header("WWW-Authenticate", "Token");
			}
			_ => {}
		}
		response
	}
}
