//! Input validation for the token-obtain endpoint

use serde_json::{Map, Value};

use crate::auth::backends::ModelBackend;
use crate::auth::models::User;
use crate::core::exception::{Error, Result, ValidationErrors};

pub const FIELD_REQUIRED: &str = "This field is required.";
pub const FIELD_NULL: &str = "This field may not be null.";
pub const FIELD_BLANK: &str = "This field may not be blank.";
pub const FIELD_NOT_A_STRING: &str = "Not a valid string.";
pub const INVALID_CREDENTIALS: &str = "Unable to log in with provided credentials.";

/// Whitespace handling for a string field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trim {
	Yes,
	No,
}

/// Read one string field the way a REST form field would
fn char_field(data: &Map<String, Value>, name: &str, trim: Trim, errors: &mut ValidationErrors) -> Option<String> {
	let raw = match data.get(name) {
		None => {
			errors.add(name, FIELD_REQUIRED);
			return None;
		}
		Some(Value::Null) => {
			errors.add(name, FIELD_NULL);
			return None;
		}
		Some(Value::String(s)) => s.clone(),
		Some(Value::Number(n)) => n.to_string(),
		Some(_) => {
			errors.add(name, FIELD_NOT_A_STRING);
			return None;
		}
	};

	let value = match trim {
		Trim::Yes => raw.trim().to_string(),
		Trim::No => raw,
	};
	if value.is_empty() {
		errors.add(name, FIELD_BLANK);
		return None;
	}
	Some(value)
}

fn type_name(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "bool",
		Value::Number(n) if n.is_f64() => "float",
		Value::Number(_) => "int",
		Value::String(_) => "str",
		Value::Array(_) => "list",
		Value::Object(_) => "dict",
	}
}

/// Validated `username`/`password` pair
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
	pub username: String,
	pub password: String,
}

impl std::fmt::Debug for Credentials {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Credentials")
			.field("username", &self.username)
			.field("password", &"<redacted>")
			.finish()
	}
}

/// Validates login input and authenticates it
///
/// # Examples
///
/// ```
/// use backend_api::authtoken::serializers::AuthTokenSerializer;
/// use serde_json::json;
///
/// let credentials = AuthTokenSerializer::validate_fields(&json!({
///     "username": "  alice ",
///     "password": " secret ",
/// }))
/// .unwrap();
///
/// assert_eq!(credentials.username, "alice");
/// assert_eq!(credentials.password, " secret ");
/// ```
pub struct AuthTokenSerializer;

impl AuthTokenSerializer {
	/// Field-level checks; no store access
	pub fn validate_fields(data: &Value) -> Result<Credentials> {
		if data.is_null() {
			return Err(Error::Validation(ValidationErrors::non_field(FIELD_NULL)));
		}
		let Value::Object(map) = data else {
			return Err(Error::Validation(ValidationErrors::non_field(format!(
				"Invalid data. Expected a dictionary, but got {}.",
				type_name(data)
			))));
		};

		let mut errors = ValidationErrors::new();
		let username = char_field(map, "username", Trim::Yes, &mut errors);
		let password = char_field(map, "password", Trim::No, &mut errors);

		match (username, password) {
			(Some(username), Some(password)) if errors.is_empty() => Ok(Credentials { username, password }),
			_ => Err(Error::Validation(errors)),
		}
	}

	/// Full validation: fields, then the credential check
	pub async fn validate(data: &Value, backend: &ModelBackend) -> Result<User> {
		let credentials = Self::validate_fields(data)?;

		backend
			.authenticate(&credentials.username, &credentials.password)
			.await?
			.ok_or_else(|| Error::Validation(ValidationErrors::non_field(INVALID_CREDENTIALS)))
	}
}
