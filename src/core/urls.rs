//! Regex URL resolution
//!
//! Patterns are matched against the percent-decoded request path with the
//! leading `/` removed, so `^auth$` matches `/auth` and `/au%74h`. An
//! include matches its prefix at the start of the remaining path and hands
//! the rest to a nested resolver.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use regex::Regex;

use super::exception::{Error, Result};
use super::handler::Handler;
use super::http::{Request, Response};

/// A compiled regular expression together with its source text
#[derive(Debug, Clone)]
pub struct RegexPattern {
	source: String,
	regex: Regex,
}

impl RegexPattern {
	/// Compile a pattern
	///
	/// # Examples
	///
	/// ```
	/// use backend_api::core::urls::RegexPattern;
	///
	/// let pattern = RegexPattern::new(r"^auth$").unwrap();
	/// assert_eq!(pattern.as_str(), "^auth$");
	/// assert!(RegexPattern::new(r"^(unclosed$").is_err());
	/// ```
	pub fn new(source: &str) -> Result<Self> {
		let regex = Regex::new(source).map_err(|e| {
			Error::ImproperlyConfigured(format!("invalid URL pattern {:?}: {}", source, e))
		})?;
		Ok(Self {
			source: source.to_string(),
			regex,
		})
	}

	pub fn as_str(&self) -> &str {
		&self.source
	}

	/// Match at the start of `path`; returns named groups and the matched length
	fn match_prefix(&self, path: &str) -> Option<(HashMap<String, String>, usize)> {
		let captures = self.regex.captures(path)?;
		let whole = captures.get(0)?;
		if whole.start() != 0 {
			return None;
		}

		let kwargs = self
			.regex
			.capture_names()
			.flatten()
			.filter_map(|name| {
				captures
					.name(name)
					.map(|m| (name.to_string(), m.as_str().to_string()))
			})
			.collect();
		Some((kwargs, whole.end()))
	}

	/// Match the full remaining path
	fn match_full(&self, path: &str) -> Option<HashMap<String, String>> {
		match self.match_prefix(path) {
			Some((kwargs, end)) if end == path.len() => Some(kwargs),
			_ => None,
		}
	}

	/// Turn the pattern back into a literal path segment
	fn reverse(&self, kwargs: &HashMap<String, String>) -> Result<String> {
		static GROUP: LazyLock<Regex> = LazyLock::new(|| {
			Regex::new(r"\(\?P?<([A-Za-z_][A-Za-z0-9_]*)>[^)]*\)").expect("static regex")
		});

		let body = self
			.source
			.strip_prefix('^')
			.unwrap_or(&self.source);
		let body = body.strip_suffix('$').unwrap_or(body);

		let mut missing = None;
		let reversed = GROUP.replace_all(body, |caps: &regex::Captures<'_>| {
			let name = &caps[1];
			match kwargs.get(name) {
				Some(value) => value.clone(),
				None => {
					missing.get_or_insert_with(|| name.to_string());
					String::new()
				}
			}
		});

		if let Some(name) = missing {
			return Err(Error::NoReverseMatch(format!(
				"{} (missing argument '{}')",
				self.source, name
			)));
		}
		Ok(reversed.replace('\\', ""))
	}
}

/// A pattern bound to a handler, optionally named for reversing
#[derive(Clone)]
pub struct Route {
	pattern: RegexPattern,
	handler: Arc<dyn Handler>,
	pub name: Option<String>,
}

impl Route {
	pub fn new(pattern: RegexPattern, handler: Arc<dyn Handler>) -> Self {
		Self {
			pattern,
			handler,
			name: None,
		}
	}

	/// Set the name used by [`UrlResolver::reverse`]
	pub fn with_name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}

	pub fn pattern(&self) -> &RegexPattern {
		&self.pattern
	}

	pub fn handler(&self) -> &dyn Handler {
		&*self.handler
	}

	pub fn handler_arc(&self) -> Arc<dyn Handler> {
		Arc::clone(&self.handler)
	}
}

/// Build a [`Route`] from a regular expression and a concrete handler
///
/// # Examples
///
/// ```
/// use backend_api::core::urls::re_path;
/// # use backend_api::core::handler::Handler;
/// # use backend_api::core::http::{Request, Response};
/// # use backend_api::core::exception::Result;
/// # struct Dummy;
/// # #[async_trait::async_trait]
/// # impl Handler for Dummy {
/// #     async fn handle(&self, _req: Request) -> Result<Response> { Ok(Response::ok()) }
/// # }
/// let route = re_path(r"^auth$", Dummy).unwrap().with_name("auth");
/// assert_eq!(route.name.as_deref(), Some("auth"));
/// ```
pub fn re_path<H>(regex: &str, handler: H) -> Result<Route>
where
	H: Handler + 'static,
{
	Ok(Route::new(RegexPattern::new(regex)?, Arc::new(handler)))
}

enum UrlEntry {
	Route(Route),
	Include {
		prefix: RegexPattern,
		resolver: UrlResolver,
	},
}

/// Result of a successful resolution
pub struct ResolverMatch {
	pub handler: Arc<dyn Handler>,
	pub url_name: Option<String>,
	/// Concatenated patterns that led to the handler
	pub route: String,
	pub kwargs: HashMap<String, String>,
}

/// One row of [`UrlResolver::url_list`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlInfo {
	pub pattern: String,
	pub name: Option<String>,
}

/// Ordered list of routes and includes; first match wins
#[derive(Default)]
pub struct UrlResolver {
	entries: Vec<UrlEntry>,
}

impl UrlResolver {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn route(mut self, route: Route) -> Self {
		self.entries.push(UrlEntry::Route(route));
		self
	}

	/// Mount another resolver under a prefix pattern
	///
	/// An empty prefix mounts the nested patterns at the root.
	pub fn include(mut self, prefix: &str, resolver: UrlResolver) -> Result<Self> {
		self.entries.push(UrlEntry::Include {
			prefix: RegexPattern::new(prefix)?,
			resolver,
		});
		Ok(self)
	}

	/// Number of routes, counting through includes
	pub fn len(&self) -> usize {
		self.entries
			.iter()
			.map(|entry| match entry {
				UrlEntry::Route(_) => 1,
				UrlEntry::Include { resolver, .. } => resolver.len(),
			})
			.sum()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Find the handler for a request path
	///
	/// # Examples
	///
	/// ```
	/// use backend_api::core::urls::{UrlResolver, re_path};
	/// # use backend_api::core::handler::Handler;
	/// # use backend_api::core::http::{Request, Response};
	/// # use backend_api::core::exception::Result;
	/// # struct Dummy;
	/// # #[async_trait::async_trait]
	/// # impl Handler for Dummy {
	/// #     async fn handle(&self, _req: Request) -> Result<Response> { Ok(Response::ok()) }
	/// # }
	/// let resolver = UrlResolver::new()
	///     .route(re_path(r"^auth$", Dummy).unwrap().with_name("auth"));
	///
	/// let matched = resolver.resolve("/auth").unwrap();
	/// assert_eq!(matched.url_name.as_deref(), Some("auth"));
	/// assert!(resolver.resolve("/auth/").is_none());
	/// ```
	pub fn resolve(&self, path: &str) -> Option<ResolverMatch> {
		let decoded = percent_decode_str(path).decode_utf8_lossy();
		self.resolve_relative(decoded.strip_prefix('/').unwrap_or(&decoded))
	}

	fn resolve_relative(&self, path: &str) -> Option<ResolverMatch> {
		for entry in &self.entries {
			match entry {
				UrlEntry::Route(route) => {
					if let Some(kwargs) = route.pattern.match_full(path) {
						return Some(ResolverMatch {
							handler: route.handler_arc(),
							url_name: route.name.clone(),
							route: route.pattern.as_str().to_string(),
							kwargs,
						});
					}
				}
				UrlEntry::Include { prefix, resolver } => {
					if let Some((outer, end)) = prefix.match_prefix(path)
						&& let Some(mut matched) = resolver.resolve_relative(&path[end..])
					{
						matched.route = format!("{}{}", prefix.as_str(), matched.route);
						for (key, value) in outer {
							matched.kwargs.entry(key).or_insert(value);
						}
						return Some(matched);
					}
				}
			}
		}
		None
	}

	/// Build the path for a named route
	///
	/// Named groups in the pattern are filled from `kwargs`.
	pub fn reverse(&self, name: &str, kwargs: &HashMap<String, String>) -> Result<String> {
		self.reverse_relative(name, kwargs)
			.ok_or_else(|| Error::NoReverseMatch(name.to_string()))?
			.map(|path| format!("/{}", path))
	}

	fn reverse_relative(&self, name: &str, kwargs: &HashMap<String, String>) -> Option<Result<String>> {
		for entry in &self.entries {
			match entry {
				UrlEntry::Route(route) if route.name.as_deref() == Some(name) => {
					return Some(route.pattern.reverse(kwargs));
				}
				UrlEntry::Route(_) => {}
				UrlEntry::Include { prefix, resolver } => {
					if let Some(inner) = resolver.reverse_relative(name, kwargs) {
						return Some(inner.and_then(|tail| {
							let head = prefix.reverse(kwargs)?;
							Ok(format!("{}{}", head, tail))
						}));
					}
				}
			}
		}
		None
	}

	/// Flattened view of every route, for display
	pub fn url_list(&self) -> Vec<UrlInfo> {
		let mut urls = Vec::new();
		self.collect_urls("", &mut urls);
		urls
	}

	fn collect_urls(&self, prefix: &str, out: &mut Vec<UrlInfo>) {
		for entry in &self.entries {
			match entry {
				UrlEntry::Route(route) => out.push(UrlInfo {
					pattern: format!("{}{}", prefix, route.pattern.as_str()),
					name: route.name.clone(),
				}),
				UrlEntry::Include {
					prefix: inner,
					resolver,
				} => resolver.collect_urls(&format!("{}{}", prefix, inner.as_str()), out),
			}
		}
	}
}

#[async_trait]
impl Handler for UrlResolver {
	async fn handle(&self, mut request: Request) -> Result<Response> {
		let path = request.path().to_string();
		match self.resolve(&path) {
			Some(matched) => {
				tracing::trace!(%path, route = %matched.route, "resolved");
				request.path_params = matched.kwargs;
				matched.handler.handle(request).await
			}
			None => Err(Error::NotFound(path)),
		}
	}
}
