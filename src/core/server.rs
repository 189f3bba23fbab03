use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::Service;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;

use super::exception::Error;
use super::handler::{Handler, Middleware, MiddlewareChain};
use super::http::{Request, Response};

/// Default body limit, matching the usual 2.5 MiB upload ceiling
pub const DEFAULT_MAX_BODY_BYTES: usize = 2_621_440;

/// How long in-flight connections may take to finish after shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// HTTP/1.1 server with middleware support
pub struct HttpServer {
	handler: Arc<dyn Handler>,
	middlewares: Vec<Arc<dyn Middleware>>,
	max_body_bytes: usize,
}

impl HttpServer {
	/// Create a new server with the given handler
	///
	/// # Examples
	///
	/// ```
	/// use std::sync::Arc;
	/// use backend_api::core::server::HttpServer;
	/// use backend_api::core::handler::Handler;
	/// use backend_api::core::http::{Request, Response};
	///
	/// struct MyHandler;
	///
	/// #[async_trait::async_trait]
	/// impl Handler for MyHandler {
	///     async fn handle(&self, _req: Request) -> backend_api::core::exception::Result<Response> {
	///         Ok(Response::ok().with_body("Hello"))
	///     }
	/// }
	///
	/// let server = HttpServer::new(Arc::new(MyHandler));
	/// ```
	pub fn new(handler: Arc<dyn Handler>) -> Self {
		Self {
			handler,
			middlewares: Vec::new(),
			max_body_bytes: DEFAULT_MAX_BODY_BYTES,
		}
	}

	/// Add a middleware; they run in the order they are added
	pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
		self.middlewares.push(middleware);
		self
	}

	pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
		self.max_body_bytes = max_body_bytes;
		self
	}

	fn build_handler(&self) -> Arc<dyn Handler> {
		if self.middlewares.is_empty() {
			return self.handler.clone();
		}

		let mut chain = MiddlewareChain::new(self.handler.clone());
		for middleware in &self.middlewares {
			chain.add_middleware(middleware.clone());
		}
		Arc::new(chain)
	}

	/// Bind `addr` and serve until the process is stopped
	pub async fn listen(self, addr: SocketAddr) -> std::io::Result<()> {
		let listener = TcpListener::bind(addr).await?;
		self.serve(listener, std::future::pending()).await
	}

	/// Serve connections from `listener` until `shutdown` resolves
	///
	/// After the signal fires no new connections are accepted and the
	/// in-flight ones get a grace period to finish.
	pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
	where
		F: Future<Output = ()>,
	{
		let local_addr = listener.local_addr()?;
		tracing::info!(address = %local_addr, "server listening on http://{}", local_addr);

		let handler = self.build_handler();
		let max_body_bytes = self.max_body_bytes;
		let graceful = GracefulShutdown::new();
		tokio::pin!(shutdown);

		loop {
			tokio::select! {
				accepted = listener.accept() => {
					let (stream, remote_addr) = match accepted {
						Ok(pair) => pair,
						Err(err) => {
							tracing::warn!(error = %err, "failed to accept connection");
							continue;
						}
					};
					let service = RequestService {
						handler: handler.clone(),
						remote_addr,
						max_body_bytes,
					};
					let connection = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
					let connection = graceful.watch(connection);

					tokio::spawn(async move {
						if let Err(err) = connection.await {
							tracing::debug!(remote = %remote_addr, error = %err, "connection closed with error");
						}
					});
				}
				_ = &mut shutdown => {
					tracing::info!("shutdown signal received, stopping server");
					break;
				}
			}
		}

		drop(listener);
		tokio::select! {
			_ = graceful.shutdown() => {
				tracing::info!("all connections closed");
			}
			_ = tokio::time::sleep(SHUTDOWN_GRACE) => {
				tracing::warn!("timed out waiting for connections to close");
			}
		}
		Ok(())
	}
}

/// Resolves on Ctrl-C, or SIGTERM on unix
pub async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(err) = tokio::signal::ctrl_c().await {
			tracing::error!(error = %err, "failed to listen for Ctrl-C");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
			Ok(mut signal) => {
				signal.recv().await;
			}
			Err(err) => {
				tracing::error!(error = %err, "failed to listen for SIGTERM");
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {}
		_ = terminate => {}
	}
}

/// Service implementation for hyper
struct RequestService {
	handler: Arc<dyn Handler>,
	remote_addr: SocketAddr,
	max_body_bytes: usize,
}

impl Service<hyper::Request<Incoming>> for RequestService {
	type Response = hyper::Response<Full<Bytes>>;
	type Error = Infallible;
	type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

	fn call(&self, req: hyper::Request<Incoming>) -> Self::Future {
		let handler = self.handler.clone();
		let remote_addr = self.remote_addr;
		let max_body_bytes = self.max_body_bytes;

		Box::pin(async move {
			let (parts, body) = req.into_parts();

			let body = match Limited::new(body, max_body_bytes).collect().await {
				Ok(collected) => collected.to_bytes(),
				Err(err) => {
					let error = if err.downcast_ref::<LengthLimitError>().is_some() {
						Error::PayloadTooLarge(max_body_bytes)
					} else {
						Error::Parse(format!("Failed to read request body: {}", err))
					};
					tracing::debug!(remote = %remote_addr, error = %error, "rejected request body");
					return Ok(into_hyper(Response::from(error)));
				}
			};

			let mut request = Request::new(parts.method, parts.uri, parts.version, parts.headers, body);
			request.remote_addr = Some(remote_addr);

			let response = handler.handle(request).await.unwrap_or_else(Response::from);
			Ok(into_hyper(response))
		})
	}
}

fn into_hyper(response: Response) -> hyper::Response<Full<Bytes>> {
	let mut hyper_response = hyper::Response::new(Full::new(response.body));
	*hyper_response.status_mut() = response.status;
	*hyper_response.headers_mut() = response.headers;
	hyper_response
}
