//! Logging setup and the request logging middleware.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing_subscriber::EnvFilter;

use super::exception::Result;
use super::handler::{Handler, Middleware};
use super::http::{Request, Response};

/// Install the global `tracing` subscriber
///
/// `RUST_LOG` wins over `default_filter` when it is set. Calling this twice
/// is harmless; the second call is ignored.
pub fn init(default_filter: &str) {
	let filter = EnvFilter::try_from_default_env()
		.or_else(|_| EnvFilter::try_new(default_filter))
		.unwrap_or_else(|_| EnvFilter::new("info"));

	let _ = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.try_init();
}

/// Emits one event per request with method, path, status and latency
#[derive(Debug, Default, Clone)]
pub struct RequestLoggingMiddleware;

impl RequestLoggingMiddleware {
	pub fn new() -> Self {
		Self
	}
}

#[async_trait]
impl Middleware for RequestLoggingMiddleware {
	async fn process(&self, request: Request, next: Arc<dyn Handler>) -> Result<Response> {
		let method = request.method.clone();
		let path = request.path().to_string();
		let remote = request.remote_addr;
		let started = Instant::now();

		let result = next.handle(request).await;
		let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

		match &result {
			Ok(response) => tracing::info!(
				%method,
				%path,
				status = response.status.as_u16(),
				elapsed_ms,
				remote = ?remote,
				"request"
			),
			Err(err) if err.status().is_server_error() => tracing::error!(
				%method,
				%path,
				status = err.status_code(),
				elapsed_ms,
				error = %err,
				"request failed"
			),
			Err(err) => tracing::info!(
				%method,
				%path,
				status = err.status_code(),
				elapsed_ms,
				remote = ?remote,
				"request"
			),
		}

		result
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::core::exception::Error;
	use crate::core::handler::MiddlewareChain;
	use rstest::rstest;

	struct FailingHandler;

	#[async_trait]
	impl Handler for FailingHandler {
		async fn handle(&self, request: Request) -> Result<Response> {
			Err(Error::NotFound(request.path().to_string()))
		}
	}

	#[rstest]
	#[tokio::test]
	async fn test_logging_middleware_passes_errors_through() {
		let chain = MiddlewareChain::new(Arc::new(FailingHandler))
			.with_middleware(Arc::new(RequestLoggingMiddleware::new()));
		let request = Request::builder().uri("/missing").build().unwrap();

		let result = chain.handle(request).await;

		assert!(matches!(result, Err(Error::NotFound(path)) if path == "/missing"));
	}

	#[rstest]
	fn test_init_is_idempotent() {
		init("debug");
		init("info");
	}
}
