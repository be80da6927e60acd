//! # skiff
//!
//! A small async HTTP/1.1 web framework written in Rust: path routing with
//! named parameters, route groups, ordered middleware, content-type-aware
//! body parsing, and centralized error handling.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use skiff::{App, Context};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut app = App::new();
//!
//!     app.get("/", |ctx: Context| async move { ctx.send_text("Hello World") });
//!
//!     app.get("/hello", |ctx: Context| async move {
//!         let name = ctx.query("name", "Guest").to_owned();
//!         ctx.send_text(format!("Hello {name}"))
//!     });
//!
//!     app.listen("127.0.0.1:8080").await?;
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod body;
pub mod context;
pub mod error;
pub mod http;
pub mod middleware;
pub mod router;
pub mod server;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use app::{App, ErrorHandler};
pub use body::UploadedFile;
pub use context::{Context, PathParams};
pub use error::Error;
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use middleware::{Middleware, MiddlewareHandler, Next};
pub use router::{Handler, IntoHandler, RouteGroup, Router};
pub use server::Server;
