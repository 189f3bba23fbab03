//! URL configuration for the api app

use crate::Services;
use crate::authtoken::ObtainAuthToken;
use crate::core::exception::Result;
use crate::core::urls::{UrlResolver, re_path};

pub fn url_patterns(services: &Services) -> Result<UrlResolver> {
	Ok(UrlResolver::new().route(
		re_path(
			r"^auth$",
			ObtainAuthToken::new(services.backend(), services.tokens.clone()),
		)?
		.with_name("auth"),
	))
}
