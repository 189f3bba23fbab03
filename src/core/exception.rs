//! Error types shared by every layer of the service.
//!
//! Each variant knows the HTTP status it maps to, so a handler can simply
//! return `Err(..)` and the server turns it into a REST-style JSON body.

use std::collections::BTreeMap;
use std::fmt;

use hyper::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Field name used for errors that do not belong to a single input field
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// Validation errors keyed by field name
///
/// Serializes to `{"field": ["message", ...], ...}`.
///
/// # Examples
///
/// ```
/// use backend_api::core::exception::ValidationErrors;
///
/// let mut errors = ValidationErrors::new();
/// errors.add("username", "This field is required.");
/// assert!(!errors.is_empty());
/// assert_eq!(errors.get("username"), Some(&["This field is required.".to_string()][..]));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
	pub fn new() -> Self {
		Self::default()
	}

	/// Build an error set holding a single non-field error
	pub fn non_field(message: impl Into<String>) -> Self {
		let mut errors = Self::new();
		errors.add(NON_FIELD_ERRORS, message);
		errors
	}

	pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
		self.0.entry(field.into()).or_default().push(message.into());
	}

	pub fn get(&self, field: &str) -> Option<&[String]> {
		self.0.get(field).map(Vec::as_slice)
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl fmt::Display for ValidationErrors {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let parts: Vec<String> = self
			.0
			.iter()
			.map(|(field, messages)| format!("{}: {}", field, messages.join(" ")))
			.collect();
		write!(f, "{}", parts.join("; "))
	}
}

/// Service error
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
	/// No route matched the request path
	#[error("No route found for {0}")]
	NotFound(String),

	/// The route exists but does not accept this method
	#[error("Method \"{method}\" not allowed.")]
	MethodNotAllowed {
		method: String,
		allowed: Vec<&'static str>,
	},

	/// The request body could not be parsed
	#[error("{0}")]
	Parse(String),

	/// The request body uses a media type no parser accepts
	#[error("Unsupported media type \"{0}\" in request.")]
	UnsupportedMediaType(String),

	/// The request body exceeded the configured size limit
	#[error("Request body exceeded {0} bytes")]
	PayloadTooLarge(usize),

	/// Input failed validation
	#[error("Validation failed: {0}")]
	Validation(ValidationErrors),

	/// Credentials were supplied but are not acceptable
	#[error("{0}")]
	AuthenticationFailed(String),

	/// Settings or route table are inconsistent
	#[error("Improperly configured: {0}")]
	ImproperlyConfigured(String),

	/// `reverse()` was asked for a name that is not registered
	#[error("Reverse for '{0}' not found")]
	NoReverseMatch(String),

	#[error("Serialization error: {0}")]
	Serialization(String),

	#[error("Internal error: {0}")]
	Internal(String),
}

impl Error {
	/// HTTP status code for this error
	///
	/// # Examples
	///
	/// ```
	/// use backend_api::core::exception::Error;
	///
	/// assert_eq!(Error::NotFound("/x".into()).status_code(), 404);
	/// assert_eq!(Error::AuthenticationFailed("Invalid token.".into()).status_code(), 401);
	/// ```
	pub fn status_code(&self) -> u16 {
		self.status().as_u16()
	}

	pub fn status(&self) -> StatusCode {
		match self {
			Error::NotFound(_) => StatusCode::NOT_FOUND,
			Error::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
			Error::Parse(_) | Error::Validation(_) => StatusCode::BAD_REQUEST,
			Error::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
			Error::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
			Error::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
			Error::ImproperlyConfigured(_)
			| Error::NoReverseMatch(_)
			| Error::Serialization(_)
			| Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	/// Message exposed to clients in the `detail` field
	///
	/// Server-side failures are masked; their text only reaches the log.
	pub fn detail(&self) -> String {
		match self {
			Error::NotFound(_) => "Not found.".to_string(),
			Error::PayloadTooLarge(_) => "Request body is too large.".to_string(),
			err if err.status().is_server_error() => "A server error occurred.".to_string(),
			err => err.to_string(),
		}
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Error::Serialization(err.to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case(Error::NotFound("/nope".into()), 404)]
	#[case(Error::MethodNotAllowed { method: "GET".into(), allowed: vec!["POST"] }, 405)]
	#[case(Error::Parse("JSON parse error - eof".into()), 400)]
	#[case(Error::UnsupportedMediaType("text/plain".into()), 415)]
	#[case(Error::PayloadTooLarge(10), 413)]
	#[case(Error::Validation(ValidationErrors::non_field("bad")), 400)]
	#[case(Error::AuthenticationFailed("Invalid token.".into()), 401)]
	#[case(Error::Internal("boom".into()), 500)]
	fn test_status_codes(#[case] error: Error, #[case] expected: u16) {
		assert_eq!(error.status_code(), expected);
	}

	#[rstest]
	fn test_detail_masks_server_errors() {
		let error = Error::Internal("database password leaked".into());
		assert_eq!(error.detail(), "A server error occurred.");
	}

	#[rstest]
	fn test_method_not_allowed_detail() {
		let error = Error::MethodNotAllowed {
			method: "DELETE".into(),
			allowed: vec!["POST", "OPTIONS"],
		};
		assert_eq!(error.detail(), "Method \"DELETE\" not allowed.");
	}

	#[rstest]
	fn test_validation_errors_serialize_as_map() {
		let mut errors = ValidationErrors::new();
		errors.add("password", "This field is required.");
		errors.add("username", "This field may not be blank.");

		let value = serde_json::to_value(&errors).unwrap();
		assert_eq!(
			value,
			serde_json::json!({
				"password": ["This field is required."],
				"username": ["This field may not be blank."],
			})
		);
	}
}
