//! Application assembly — router, middleware stack, and error handling in one value.
//!
//! [`App`] is the framework's entry point. It is an explicitly constructed
//! value (no ambient singletons): register routes, groups, and middleware on
//! it single-threaded at startup, then either call [`App::handle`] directly
//! (tests) or [`App::listen`] to serve it over TCP. After registration the
//! app is only read, so dispatch shares it freely across tasks.
//!
//! Dispatch per request:
//!
//! 1. Match the route table; extract path parameters.
//! 2. Build a [`Context`] from the request.
//! 3. Fold the middleware list (outer → inner) around the matched handler,
//!    or around a terminal that signals [`Error::RouteNotFound`].
//! 4. Run the chain. An `Err` from any layer aborts the chain and is handed
//!    to the error handler exactly once; its response replaces whatever was
//!    in flight.

use std::future::Future;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;
use crate::http::{Method, Request, Response};
use crate::middleware::{Middleware, MiddlewareHandler, Next, from_middleware};
use crate::router::{IntoHandler, RouteGroup, Router};
use crate::server::Server;

/// The process-wide failure-to-response converter.
///
/// Receives every error surfaced by routing, body parsing, middleware, or
/// handlers — including [`Error::RouteNotFound`] — and decides the final
/// response.
pub type ErrorHandler = Arc<dyn Fn(&Error) -> Response + Send + Sync + 'static>;

/// A web application: route table, ordered middleware stack, and a single
/// error handler.
///
/// # Examples
///
/// ```
/// use skiff::{App, Context};
///
/// let mut app = App::new();
///
/// app.get("/", |ctx: Context| async move { ctx.send_text("Hello World") });
///
/// app.get("/hello", |ctx: Context| async move {
///     let name = ctx.query("name", "Guest").to_owned();
///     ctx.send_text(format!("Hello {name}"))
/// });
/// ```
pub struct App {
    router: Router,
    middleware: Vec<MiddlewareHandler>,
    error_handler: Option<ErrorHandler>,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    /// Creates an app with no routes, no middleware, and the default error handler.
    pub fn new() -> Self {
        Self {
            router: Router::new(),
            middleware: Vec::new(),
            error_handler: None,
        }
    }

    /// Registers a handler for `method` requests matching `pattern`.
    ///
    /// Registering the same method+pattern twice replaces the earlier handler.
    pub fn register(&mut self, method: Method, pattern: &str, handler: impl IntoHandler) {
        self.router.register(method, pattern, handler);
    }

    /// Registers a `GET` handler.
    pub fn get(&mut self, pattern: &str, handler: impl IntoHandler) {
        self.router.get(pattern, handler);
    }

    /// Registers a `POST` handler.
    pub fn post(&mut self, pattern: &str, handler: impl IntoHandler) {
        self.router.post(pattern, handler);
    }

    /// Registers a `PUT` handler.
    pub fn put(&mut self, pattern: &str, handler: impl IntoHandler) {
        self.router.put(pattern, handler);
    }

    /// Registers a `DELETE` handler.
    pub fn delete(&mut self, pattern: &str, handler: impl IntoHandler) {
        self.router.delete(pattern, handler);
    }

    /// Registers a `PATCH` handler.
    pub fn patch(&mut self, pattern: &str, handler: impl IntoHandler) {
        self.router.patch(pattern, handler);
    }

    /// Returns a sub-registrar scoped under `prefix`.
    pub fn group(&mut self, prefix: &str) -> RouteGroup<'_> {
        self.router.group(prefix)
    }

    /// Appends a [`Middleware`] to the global stack. Middleware wraps every
    /// request in registration order.
    pub fn wrap<M: Middleware + 'static>(&mut self, middleware: M) {
        self.middleware.push(from_middleware(Arc::new(middleware)));
    }

    /// Appends a middleware closure to the global stack.
    ///
    /// # Examples
    ///
    /// ```
    /// use skiff::App;
    ///
    /// let mut app = App::new();
    /// app.wrap_fn(|ctx, next| async move {
    ///     tracing::debug!("before");
    ///     let result = next.run(ctx).await;
    ///     tracing::debug!("after");
    ///     result
    /// });
    /// ```
    pub fn wrap_fn<F, Fut>(&mut self, middleware: F)
    where
        F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response, Error>> + Send + 'static,
    {
        self.middleware
            .push(Arc::new(move |ctx, next| Box::pin(middleware(ctx, next))));
    }

    /// Replaces the default error handler.
    ///
    /// The handler sees every error the chain surfaces and its return value
    /// becomes the final response.
    ///
    /// # Examples
    ///
    /// ```
    /// use skiff::{App, http::{Response, StatusCode}};
    ///
    /// let mut app = App::new();
    /// app.on_error(|err| {
    ///     Response::new(StatusCode::InternalServerError).body(format!("Error {err}"))
    /// });
    /// ```
    pub fn on_error<F>(&mut self, handler: F)
    where
        F: Fn(&Error) -> Response + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
    }

    /// Dispatches one request through the middleware chain to its handler and
    /// returns the final response.
    ///
    /// This is the test seam: integration tests parse a raw request and call
    /// `handle` directly, no TCP involved.
    ///
    /// The response's `Connection` header mirrors the request's keep-alive
    /// preference, whichever layer produced the response.
    pub async fn handle(&self, request: Request) -> Response {
        let keep_alive = request.is_keep_alive();
        let matched = self.router.find(request.method(), request.path());

        let mut chain = self.middleware.clone();
        let ctx = match matched {
            Some((handler, params)) => {
                chain.push(Arc::new(move |ctx, _next| handler(ctx)));
                Context::with_params(request, params)
            }
            // No terminal layer: the exhausted chain signals RouteNotFound,
            // after the middleware stack has run.
            None => Context::new(request),
        };

        let response = match Next::new(chain).run(ctx).await {
            Ok(response) => response,
            Err(err) => match &self.error_handler {
                Some(handler) => handler(&err),
                None => Response::new(err.status()).body(err.to_string()),
            },
        };

        response.keep_alive(keep_alive)
    }

    /// Binds `addr` and serves this app until the process terminates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] if the address cannot be bound, or
    /// [`Error::Io`] if the listener fails.
    pub async fn listen(self, addr: impl AsRef<str>) -> Result<(), Error> {
        let server = Server::bind(addr).await?;
        let app = Arc::new(self);
        server
            .run(move |request| {
                let app = Arc::clone(&app);
                async move { app.handle(request).await }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::StatusCode;

    fn make_request(method: &str, target: &str) -> Request {
        let raw = format!("{method} {target} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (request, _) = Request::parse(raw.as_bytes()).unwrap();
        request
    }

    #[tokio::test]
    async fn unmatched_path_uses_default_error_response() {
        let app = App::new();
        let response = app.handle(make_request("GET", "/nope")).await;
        assert_eq!(response.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn matched_handler_runs() {
        let mut app = App::new();
        app.get("/", |ctx: Context| async move { ctx.send_text("Hello World") });
        let response = app.handle(make_request("GET", "/")).await;
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.body_ref(), b"Hello World");
    }

    #[tokio::test]
    async fn error_handler_sees_route_not_found() {
        let mut app = App::new();
        app.on_error(|err| {
            Response::new(StatusCode::InternalServerError).body(format!("Error {err}"))
        });
        let response = app.handle(make_request("GET", "/nope")).await;
        assert_eq!(response.status(), StatusCode::InternalServerError);
        assert_eq!(response.body_ref(), b"Error Cannot find route");
    }

    #[tokio::test]
    async fn middleware_runs_for_unmatched_paths() {
        let mut app = App::new();
        app.wrap_fn(|ctx, next| async move {
            let mut result = next.run(ctx).await;
            if let Ok(response) = &mut result {
                response.add_header("X-Seen", "yes");
            }
            result
        });
        app.get("/here", |ctx: Context| async move { ctx.send_text("hi") });

        let response = app.handle(make_request("GET", "/here")).await;
        assert_eq!(response.headers().get("x-seen"), Some("yes"));

        // Unmatched: middleware still ran, error funnel produced the 404.
        let response = app.handle(make_request("GET", "/gone")).await;
        assert_eq!(response.status(), StatusCode::NotFound);
    }
}
