//! Request plumbing: HTTP types, handlers and middleware, URL resolution,
//! the hyper server and logging.

pub mod exception;
pub mod handler;
pub mod http;
pub mod logging;
pub mod server;
pub mod urls;

pub use exception::{Error, Result};
pub use handler::{Handler, Middleware, MiddlewareChain};
pub use http::{Request, Response};
