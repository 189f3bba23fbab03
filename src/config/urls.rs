//! Root URL configuration

use super::settings::Settings;
use crate::Services;
use crate::core::exception::Result;
use crate::core::urls::UrlResolver;

/// Mount the api app under `settings.api_prefix`
pub fn url_patterns(settings: &Settings, services: &Services) -> Result<UrlResolver> {
	UrlResolver::new().include(
		&settings.api_prefix,
		crate::apps::api::urls::url_patterns(services)?,
	)
}
