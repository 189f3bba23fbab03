//! Layered settings: built-in defaults, then an optional TOML file, then
//! `BACKEND_*` environment variables.
//!
//! ```toml
//! debug = false
//! host = "0.0.0.0"
//! port = 8000
//! log_filter = "info,backend_api=debug"
//! api_prefix = ""
//!
//! [[users]]
//! username = "alice"
//! password_hash = "$argon2id$v=19$m=19456,t=2,p=1$..."
//! ```

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::core::exception::{Error, Result};
use crate::core::server::DEFAULT_MAX_BODY_BYTES;

/// Prefix of every environment override
pub const ENV_PREFIX: &str = "BACKEND_";

/// Environment variable naming the settings file
pub const SETTINGS_FILE_VAR: &str = "BACKEND_SETTINGS";

/// A user created at startup
#[derive(Clone, Deserialize)]
pub struct UserSeed {
	pub username: String,
	#[serde(default)]
	pub email: String,
	/// Plaintext password, hashed at startup; meant for development
	#[serde(default)]
	pub password: Option<String>,
	/// Pre-computed hash, see `manage hashpassword`
	#[serde(default)]
	pub password_hash: Option<String>,
	#[serde(default = "default_true")]
	pub is_active: bool,
}

fn default_true() -> bool {
	true
}

impl fmt::Debug for UserSeed {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("UserSeed")
			.field("username", &self.username)
			.field("email", &self.email)
			.field("password", &self.password.as_ref().map(|_| "<redacted>"))
			.field("password_hash", &self.password_hash.as_ref().map(|_| "<redacted>"))
			.field("is_active", &self.is_active)
			.finish()
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
	pub debug: bool,
	pub host: String,
	pub port: u16,
	/// `tracing` filter used when `RUST_LOG` is unset
	pub log_filter: String,
	/// Regex prefix under which the api patterns are mounted
	pub api_prefix: String,
	pub max_body_bytes: usize,
	pub users: Vec<UserSeed>,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			debug: false,
			host: "127.0.0.1".to_string(),
			port: 8000,
			log_filter: "info".to_string(),
			api_prefix: String::new(),
			max_body_bytes: DEFAULT_MAX_BODY_BYTES,
			users: Vec::new(),
		}
	}
}

impl Settings {
	/// Load defaults, the settings file and the process environment
	///
	/// `path` wins over `BACKEND_SETTINGS`. A named file that does not
	/// exist is an error; with no file named, only defaults and the
	/// environment apply.
	pub fn load(path: Option<&Path>) -> Result<Self> {
		let path: Option<PathBuf> = path
			.map(Path::to_path_buf)
			.or_else(|| std::env::var_os(SETTINGS_FILE_VAR).map(PathBuf::from));

		let settings = match path {
			Some(path) => Self::from_file(&path)?,
			None => Self::default(),
		};
		settings.apply_env(std::env::vars())?.validated()
	}

	pub fn from_file(path: &Path) -> Result<Self> {
		let text = std::fs::read_to_string(path).map_err(|e| {
			Error::ImproperlyConfigured(format!("cannot read settings file {}: {}", path.display(), e))
		})?;
		Self::from_toml_str(&text)
			.map_err(|e| Error::ImproperlyConfigured(format!("{}: {}", path.display(), e)))
	}

	/// Parse settings from TOML; missing keys take their defaults
	///
	/// # Examples
	///
	/// ```
	/// use backend_api::config::settings::Settings;
	///
	/// let settings = Settings::from_toml_str("port = 9000").unwrap();
	/// assert_eq!(settings.port, 9000);
	/// assert_eq!(settings.host, "127.0.0.1");
	/// ```
	pub fn from_toml_str(text: &str) -> Result<Self> {
		toml::from_str(text).map_err(|e| Error::ImproperlyConfigured(e.to_string()))
	}

	/// Apply `BACKEND_*` overrides from the given variables
	///
	/// Unknown `BACKEND_*` names are ignored.
	pub fn apply_env<I>(mut self, vars: I) -> Result<Self>
	where
		I: IntoIterator<Item = (String, String)>,
	{
		for (name, value) in vars {
			let Some(key) = name.strip_prefix(ENV_PREFIX) else {
				continue;
			};
			match key {
				"DEBUG" => self.debug = parse_bool(&name, &value)?,
				"HOST" => self.host = value,
				"PORT" => self.port = parse_number(&name, &value)?,
				"LOG_FILTER" => self.log_filter = value,
				"API_PREFIX" => self.api_prefix = value,
				"MAX_BODY_BYTES" => self.max_body_bytes = parse_number(&name, &value)?,
				_ => {}
			}
		}
		Ok(self)
	}

	/// Check cross-field constraints
	pub fn validated(self) -> Result<Self> {
		if self.max_body_bytes == 0 {
			return Err(Error::ImproperlyConfigured(
				"max_body_bytes must be greater than zero".to_string(),
			));
		}
		for seed in &self.users {
			if seed.username.trim().is_empty() {
				return Err(Error::ImproperlyConfigured("user with empty username".to_string()));
			}
			match (&seed.password, &seed.password_hash) {
				(Some(_), None) | (None, Some(_)) => {}
				_ => {
					return Err(Error::ImproperlyConfigured(format!(
						"user '{}' needs exactly one of password or password_hash",
						seed.username
					)));
				}
			}
		}
		Ok(self)
	}

	/// Resolve `host:port` to a socket address
	pub fn bind_address(&self) -> Result<SocketAddr> {
		(self.host.as_str(), self.port)
			.to_socket_addrs()
			.map_err(|e| Error::ImproperlyConfigured(format!("invalid host '{}': {}", self.host, e)))?
			.next()
			.ok_or_else(|| Error::ImproperlyConfigured(format!("host '{}' did not resolve", self.host)))
	}
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
	match value.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" | "" => Ok(false),
		_ => Err(Error::ImproperlyConfigured(format!(
			"{} must be a boolean, got '{}'",
			name, value
		))),
	}
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
	value.trim().parse().map_err(|_| {
		Error::ImproperlyConfigured(format!("{} must be a number, got '{}'", name, value))
	})
}
