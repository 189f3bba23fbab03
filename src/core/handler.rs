use std::sync::Arc;

use async_trait::async_trait;

use super::exception::Result;
use super::http::{Request, Response};

/// Anything that turns a request into a response
///
/// Views, the URL resolver and the middleware chain all implement this.
#[async_trait]
pub trait Handler: Send + Sync {
	async fn handle(&self, request: Request) -> Result<Response>;
}

#[async_trait]
impl<T: Handler + ?Sized> Handler for Arc<T> {
	async fn handle(&self, request: Request) -> Result<Response> {
		(**self).handle(request).await
	}
}

/// Wraps a handler with cross-cutting behaviour
#[async_trait]
pub trait Middleware: Send + Sync {
	async fn process(&self, request: Request, next: Arc<dyn Handler>) -> Result<Response>;
}

/// A handler preceded by an ordered list of middleware
///
/// Middleware run in the order they were added; the first one added sees
/// the request first and the response last.
pub struct MiddlewareChain {
	handler: Arc<dyn Handler>,
	middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
	pub fn new(handler: Arc<dyn Handler>) -> Self {
		Self {
			handler,
			middlewares: Vec::new(),
		}
	}

	pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
		self.middlewares.push(middleware);
		self
	}

	pub fn add_middleware(&mut self, middleware: Arc<dyn Middleware>) {
		self.middlewares.push(middleware);
	}

	pub fn len(&self) -> usize {
		self.middlewares.len()
	}

	pub fn is_empty(&self) -> bool {
		self.middlewares.is_empty()
	}
}

/// One link of the chain: a middleware plus everything after it
struct Link {
	middleware: Arc<dyn Middleware>,
	next: Arc<dyn Handler>,
}

#[async_trait]
impl Handler for Link {
	async fn handle(&self, request: Request) -> Result<Response> {
		self.middleware.process(request, self.next.clone()).await
	}
}

#[async_trait]
impl Handler for MiddlewareChain {
	async fn handle(&self, request: Request) -> Result<Response> {
		let mut next = self.handler.clone();
		for middleware in self.middlewares.iter().rev() {
			next = Arc::new(Link {
				middleware: middleware.clone(),
				next,
			});
		}
		next.handle(request).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	struct TestHandler;

	#[async_trait]
	impl Handler for TestHandler {
		async fn handle(&self, _request: Request) -> Result<Response> {
			Ok(Response::ok().with_body("Hello"))
		}
	}

	struct PrefixMiddleware {
		prefix: &'static str,
	}

	#[async_trait]
	impl Middleware for PrefixMiddleware {
		async fn process(&self, request: Request, next: Arc<dyn Handler>) -> Result<Response> {
			let response = next.handle(request).await?;
			let current = String::from_utf8(response.body.to_vec()).unwrap_or_default();
			Ok(Response::ok().with_body(format!("{}{}", self.prefix, current)))
		}
	}

	#[rstest]
	#[tokio::test]
	async fn test_middleware_chain_execution_order() {
		let chain = MiddlewareChain::new(Arc::new(TestHandler))
			.with_middleware(Arc::new(PrefixMiddleware { prefix: "First:" }))
			.with_middleware(Arc::new(PrefixMiddleware { prefix: "Second:" }));
		let request = Request::builder().build().unwrap();

		let response = chain.handle(request).await.unwrap();

		// First -> Second -> Handler, so First wraps the outermost body
		assert_eq!(response.body, "First:Second:Hello");
		assert_eq!(chain.len(), 2);
	}

	#[rstest]
	#[tokio::test]
	async fn test_empty_chain_calls_handler() {
		let chain = MiddlewareChain::new(Arc::new(TestHandler));
		let request = Request::builder().build().unwrap();

		let response = chain.handle(request).await.unwrap();

		assert!(chain.is_empty());
		assert_eq!(response.body, "Hello");
	}
}
