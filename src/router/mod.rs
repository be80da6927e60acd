//! Request routing — map URL patterns and HTTP methods to handler functions.
//!
//! This module provides [`Router`], which resolves an incoming HTTP method and
//! URL path to a registered handler. Two pattern styles are supported:
//!
//! | Pattern                    | Example match          | Captured params                       |
//! |----------------------------|------------------------|---------------------------------------|
//! | `/users`                   | `/users`               | *(none)*                              |
//! | `/user/:userId/order/:orderId` | `/user/hanafi/order/123` | `userId → "hanafi"`, `orderId → "123"` |
//!
//! A `:name` segment captures exactly one path segment; it never spans a `/`.
//! Trailing slashes are normalized on both patterns and incoming paths, and a
//! missing leading slash on a pattern is tolerated, so `users/:id` and
//! `/users/:id/` compile identically.
//!
//! Routes are matched in registration order and the first full match wins,
//! with one exception: registering a handler for a method+pattern pair that
//! is already registered silently replaces the earlier handler in place.
//!
//! [`RouteGroup`] scopes registrations under a shared path prefix; groups
//! nest, and prefixes compose by single-slash joining.

use std::pin::Pin;
use std::sync::Arc;

use crate::context::{Context, PathParams};
use crate::error::Error;
use crate::http::{Method, Response};

/// Type-erased, heap-allocated async handler that processes a [`Context`] and
/// returns `Result<Response, Error>`.
///
/// Handlers are stored behind `Arc<dyn Fn(…)>` so they can be cloned and shared
/// across tasks without copying the underlying closure. In practice you never
/// construct this type directly — use [`Router::get`], [`Router::post`], and
/// the other method-specific helpers instead.
pub type Handler = Arc<
    dyn Fn(Context) -> Pin<Box<dyn Future<Output = Result<Response, Error>> + Send>>
        + Send
        + Sync
        + 'static,
>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Result<Response, Error>> + Send`
/// that is also `Send + Sync + 'static` implements this trait automatically
/// via the blanket impl below.
pub trait IntoHandler: Send + Sync + 'static {
    /// Call the handler with the given context, boxing the returned future.
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Result<Response, Error>> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Result<Response, Error>> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Result<Response, Error>> + Send>> {
        Box::pin((self)(ctx))
    }
}

// A single path segment, either a literal string or a named capture (`:name`).
#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Parameter(String),
}

// Compiled representation of a route pattern string.
#[derive(Debug, Clone)]
struct Pattern {
    segments: Vec<Segment>,
}

/// Normalizes a pattern or path: guarantees a leading slash, strips a single
/// trailing slash (the root `/` is left alone).
fn normalize(path: &str) -> String {
    let mut normalized = if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    };
    if normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// Joins a group prefix and a pattern with exactly one slash between them.
/// No other normalization is applied; prefixes compose by concatenation.
fn join_paths(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        normalize(prefix)
    } else {
        format!("{}/{}", normalize(prefix), path)
    }
}

impl Pattern {
    /// Compiles a pattern string into literal and `:name` parameter segments.
    fn parse(pattern: &str) -> Self {
        let segments = normalize(pattern)
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix(':') {
                Some(name) => Segment::Parameter(name.to_owned()),
                None => Segment::Literal(s.to_owned()),
            })
            .collect();
        Self { segments }
    }

    // Try to match `path` against this pattern, returning extracted [`PathParams`]
    // on success. Segment counts must be equal, so a successful match always
    // binds every named parameter.
    fn matches(&self, path: &str) -> Option<PathParams> {
        let path = normalize(path);
        let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        if self.segments.len() != path_segments.len() {
            return None;
        }

        let mut params = PathParams::new();
        for (segment, path_segment) in self.segments.iter().zip(path_segments) {
            match segment {
                Segment::Literal(s) => {
                    if s != path_segment {
                        return None;
                    }
                }
                Segment::Parameter(name) => {
                    params.insert(name.clone(), path_segment.to_owned());
                }
            }
        }

        Some(params)
    }
}

// A single registered route binding a method + pattern to a handler.
//
// `raw` keeps the normalized pattern string so re-registrations of the same
// method+pattern can be detected and replaced.
struct Route {
    method: Method,
    raw: String,
    pattern: Pattern,
    handler: Handler,
}

impl Route {
    fn new(method: Method, pattern: &str, handler: Handler) -> Self {
        Self {
            method,
            raw: normalize(pattern),
            pattern: Pattern::parse(pattern),
            handler,
        }
    }

    // Returns `Some(params)` when both the HTTP method and path pattern match.
    fn matches(&self, method: &Method, path: &str) -> Option<PathParams> {
        if &self.method == method {
            self.pattern.matches(path)
        } else {
            None
        }
    }
}

/// HTTP request router mapping method + path-pattern pairs to handlers.
///
/// Routes are evaluated in registration order; the first route whose HTTP
/// method and path pattern both match wins. Registering the same
/// method+pattern twice replaces the earlier handler (last registration
/// wins), keeping its original position in the match order.
///
/// The router is a plain value: construct it, register routes, then share it
/// immutably for dispatch. There is no interior mutability and no global
/// state; concurrent registration during dispatch is not supported.
///
/// # Examples
///
/// ```
/// use skiff::{Router, http::{Response, StatusCode}};
///
/// let mut router = Router::new();
///
/// router.get("/ping", |ctx: skiff::Context| async move {
///     ctx.send_text("pong")
/// });
///
/// router.get("/user/:userId/order/:orderId", |ctx: skiff::Context| async move {
///     let user = ctx.param("userId").to_owned();
///     let order = ctx.param("orderId").to_owned();
///     ctx.send_text(format!("Get Order {order} From User {user}"))
/// });
/// ```
pub struct Router {
    routes: Vec<Route>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Creates a new, empty `Router` with no registered routes.
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Registers a handler for `method` requests matching `pattern`.
    ///
    /// If a route with the same method and normalized pattern already exists,
    /// its handler is replaced in place and no new route is added.
    pub fn register(&mut self, method: Method, pattern: &str, handler: impl IntoHandler) {
        let handler: Handler = Arc::new(move |ctx| handler.call(ctx));
        let raw = normalize(pattern);

        if let Some(existing) = self
            .routes
            .iter_mut()
            .find(|r| r.method == method && r.raw == raw)
        {
            existing.handler = handler;
            return;
        }

        self.routes.push(Route::new(method, pattern, handler));
    }

    /// Registers a handler for `GET` requests matching `pattern`.
    pub fn get(&mut self, pattern: &str, handler: impl IntoHandler) {
        self.register(Method::Get, pattern, handler);
    }

    /// Registers a handler for `POST` requests matching `pattern`.
    pub fn post(&mut self, pattern: &str, handler: impl IntoHandler) {
        self.register(Method::Post, pattern, handler);
    }

    /// Registers a handler for `PUT` requests matching `pattern`.
    pub fn put(&mut self, pattern: &str, handler: impl IntoHandler) {
        self.register(Method::Put, pattern, handler);
    }

    /// Registers a handler for `DELETE` requests matching `pattern`.
    pub fn delete(&mut self, pattern: &str, handler: impl IntoHandler) {
        self.register(Method::Delete, pattern, handler);
    }

    /// Registers a handler for `PATCH` requests matching `pattern`.
    pub fn patch(&mut self, pattern: &str, handler: impl IntoHandler) {
        self.register(Method::Patch, pattern, handler);
    }

    /// Returns a sub-registrar that prepends `prefix` to every pattern it
    /// registers. Groups nest; prefixes compose by single-slash joining.
    ///
    /// # Examples
    ///
    /// ```
    /// use skiff::{Router, Context};
    ///
    /// let mut router = Router::new();
    /// let mut api = router.group("/api");
    /// api.get("/hello", |ctx: Context| async move { ctx.send_text("Hello World") });
    /// // registered as GET /api/hello
    /// ```
    pub fn group(&mut self, prefix: &str) -> RouteGroup<'_> {
        RouteGroup {
            router: self,
            prefix: normalize(prefix),
        }
    }

    /// Returns the number of routes registered in this router.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if no routes have been registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Resolves `method` + `path` to a handler and its extracted path
    /// parameters. Routes are tested in registration order; the first full
    /// match wins. Returns `None` when nothing matches.
    pub fn find(&self, method: &Method, path: &str) -> Option<(Handler, PathParams)> {
        for route in &self.routes {
            if let Some(params) = route.matches(method, path) {
                return Some((Arc::clone(&route.handler), params));
            }
        }
        None
    }
}

/// A path-prefix scope over a [`Router`].
///
/// Created by [`Router::group`]. Every registration delegates to the parent
/// router with the group prefix prepended.
pub struct RouteGroup<'a> {
    router: &'a mut Router,
    prefix: String,
}

impl RouteGroup<'_> {
    /// Registers a handler for `method` under this group's prefix.
    pub fn register(&mut self, method: Method, pattern: &str, handler: impl IntoHandler) {
        let full = join_paths(&self.prefix, pattern);
        self.router.register(method, &full, handler);
    }

    /// Registers a `GET` handler under this group's prefix.
    pub fn get(&mut self, pattern: &str, handler: impl IntoHandler) {
        self.register(Method::Get, pattern, handler);
    }

    /// Registers a `POST` handler under this group's prefix.
    pub fn post(&mut self, pattern: &str, handler: impl IntoHandler) {
        self.register(Method::Post, pattern, handler);
    }

    /// Registers a `PUT` handler under this group's prefix.
    pub fn put(&mut self, pattern: &str, handler: impl IntoHandler) {
        self.register(Method::Put, pattern, handler);
    }

    /// Registers a `DELETE` handler under this group's prefix.
    pub fn delete(&mut self, pattern: &str, handler: impl IntoHandler) {
        self.register(Method::Delete, pattern, handler);
    }

    /// Registers a `PATCH` handler under this group's prefix.
    pub fn patch(&mut self, pattern: &str, handler: impl IntoHandler) {
        self.register(Method::Patch, pattern, handler);
    }

    /// Returns a nested group whose prefix is this group's prefix joined with
    /// `prefix`.
    pub fn group(&mut self, prefix: &str) -> RouteGroup<'_> {
        let joined = join_paths(&self.prefix, prefix);
        RouteGroup {
            router: self.router,
            prefix: joined,
        }
    }
}
