//! Middleware pipeline — composable before/after request handler logic.
//!
//! The middleware stack is an explicit ordered list. At dispatch time the
//! list is walked by a [`Next`] cursor: continuations run in registration
//! order going in, and unwind in reverse order coming out, so the outermost
//! middleware's post-logic runs last. A middleware that never calls its
//! [`Next`] short-circuits the chain; whatever it returns becomes the
//! response (or the error delivered to the application's error handler).
//!
//! ## Core types
//!
//! - [`Middleware`] — trait implemented by all middleware.
//! - [`Next`] — cursor into the remaining chain; call [`Next::run`] to
//!   advance to the next layer.
//! - [`MiddlewareHandler`] — type-erased, cheaply-cloneable middleware function.
//! - [`from_middleware`] — converts a [`Middleware`] trait object into a
//!   [`MiddlewareHandler`].
//! - [`LoggerMiddleware`] — built-in request/response logger.

use std::{future::Future, pin::Pin, sync::Arc};
use tokio::time::Instant;

use crate::{context::Context, error::Error, http::Response};

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is passed to each middleware's [`Middleware::handle`] implementation.
/// Calling [`Next::run`] advances the cursor by one position and invokes the
/// next layer. `Next` is consumed by [`run`](Self::run), so a middleware can
/// forward the request at most once.
///
/// When the chain is exhausted without any layer producing a response — which
/// only happens if no terminal handler was appended, i.e. no route matched —
/// `run` resolves to [`Error::RouteNotFound`].
///
/// # Examples
///
/// ```
/// use std::pin::Pin;
/// use skiff::{Context, Error, http::Response, middleware::{Middleware, Next}};
///
/// struct PassThrough;
///
/// impl Middleware for PassThrough {
///     fn handle(
///         &self,
///         ctx: Context,
///         next: Next,
///     ) -> Pin<Box<dyn std::future::Future<Output = Result<Response, Error>> + Send>> {
///         Box::pin(async move { next.run(ctx).await })
///     }
/// }
/// ```
pub struct Next {
    layers: Vec<MiddlewareHandler>,
    // Tracks which layer to invoke on the next `run` call.
    index: usize,
}

/// A type-erased, reference-counted middleware function.
///
/// Every entry in the middleware stack is stored as a `MiddlewareHandler`.
/// The [`Arc`] wrapper makes handlers cheap to clone so that [`Next`] can
/// advance through the chain without copying closures.
pub type MiddlewareHandler = Arc<
    dyn Fn(Context, Next) -> Pin<Box<dyn Future<Output = Result<Response, Error>> + Send>>
        + Send
        + Sync
        + 'static,
>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use skiff::middleware::{LoggerMiddleware, from_middleware};
///
/// let handler = from_middleware(Arc::new(LoggerMiddleware));
/// ```
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

impl Next {
    /// Creates a new `Next` positioned at the start of the given chain.
    pub fn new(layers: Vec<MiddlewareHandler>) -> Self {
        Self { layers, index: 0 }
    }

    /// Invokes the next layer in the chain and returns its result.
    ///
    /// Advances the internal cursor by one, clones the handler at the current
    /// position, and awaits it. An exhausted chain resolves to
    /// [`Error::RouteNotFound`].
    pub async fn run(mut self, ctx: Context) -> Result<Response, Error> {
        if self.index < self.layers.len() {
            let handler = self.layers[self.index].clone();
            self.index += 1;
            handler(ctx, self).await
        } else {
            Err(Error::RouteNotFound)
        }
    }
}

/// The core trait for all skiff middleware.
///
/// Implementors receive a [`Context`] and a [`Next`] cursor. They may:
///
/// - **Pass through** — call `next.run(ctx).await` without modification.
/// - **Short-circuit** — return `Ok(response)` or `Err(error)` directly
///   without calling `next`; downstream layers and the route handler never run.
/// - **Decorate** — call `next.run(ctx).await`, inspect the result, and
///   return a modified copy.
///
/// # Contract
///
/// - Implementations must be `Send + Sync` because middleware is shared across
///   Tokio tasks.
/// - `handle` must return a pinned, `Send` future so it can be awaited across
///   `.await` points in multi-threaded runtimes.
pub trait Middleware: Send + Sync {
    /// Handle the request and optionally delegate to the next layer.
    fn handle(
        &self,
        ctx: Context,
        next: Next,
    ) -> Pin<Box<dyn Future<Output = Result<Response, Error>> + Send>>;
}

/// Built-in middleware that logs each request's method, path, outcome, and duration.
///
/// Emits a single `tracing::info!` line after the downstream handler completes:
///
/// ```text
/// METHOD /path - STATUS (duration)
/// ```
///
/// Errors propagate unchanged; they are logged with the status the default
/// error mapping would assign.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(
        &self,
        ctx: Context,
        next: Next,
    ) -> Pin<Box<dyn Future<Output = Result<Response, Error>> + Send>> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().as_str().to_string();
            let path = ctx.request().path().to_string();

            let result = next.run(ctx).await;

            let duration = start.elapsed();
            let status = match &result {
                Ok(response) => response.status().as_u16(),
                Err(err) => err.status().as_u16(),
            };

            tracing::info!("{} {} - {} ({:?})", method, path, status, duration);

            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Request, StatusCode};
    use std::sync::Mutex;

    fn make_context(path: &str) -> Context {
        let raw = format!("GET {path} HTTP/1.1\r\nHost: x\r\n\r\n");
        let (request, _) = Request::parse(raw.as_bytes()).unwrap();
        Context::new(request)
    }

    fn recording_layer(log: Arc<Mutex<Vec<&'static str>>>, pre: &'static str, post: &'static str) -> MiddlewareHandler {
        Arc::new(move |ctx, next| {
            let log = log.clone();
            Box::pin(async move {
                log.lock().unwrap().push(pre);
                let result = next.run(ctx).await;
                log.lock().unwrap().push(post);
                result
            })
        })
    }

    fn terminal(body: &'static str) -> MiddlewareHandler {
        Arc::new(move |_ctx, _next| {
            Box::pin(async move { Ok(Response::new(StatusCode::Ok).body(body)) })
        })
    }

    #[tokio::test]
    async fn layers_run_in_order_and_unwind_in_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = vec![
            recording_layer(log.clone(), "a-in", "a-out"),
            recording_layer(log.clone(), "b-in", "b-out"),
            terminal("ok"),
        ];

        let result = Next::new(chain).run(make_context("/")).await.unwrap();
        assert_eq!(result.status(), StatusCode::Ok);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["a-in", "b-in", "b-out", "a-out"]
        );
    }

    #[tokio::test]
    async fn short_circuit_skips_downstream() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let blocker: MiddlewareHandler = Arc::new(|_ctx, _next| {
            Box::pin(async { Ok(Response::new(StatusCode::Ok).body("blocked")) })
        });
        let chain = vec![
            blocker,
            recording_layer(log.clone(), "never-in", "never-out"),
            terminal("unreached"),
        ];

        let result = Next::new(chain).run(make_context("/")).await.unwrap();
        assert_eq!(result.body_ref(), b"blocked");
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn exhausted_chain_signals_route_not_found() {
        let result = Next::new(Vec::new()).run(make_context("/")).await;
        assert!(matches!(result, Err(Error::RouteNotFound)));
    }

    #[tokio::test]
    async fn errors_propagate_through_layers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let failing: MiddlewareHandler =
            Arc::new(|_ctx, _next| Box::pin(async { Err(Error::msg("Ups")) }));
        let chain = vec![recording_layer(log.clone(), "in", "out"), failing];

        let result = Next::new(chain).run(make_context("/")).await;
        assert!(matches!(result, Err(Error::Handler(m)) if m == "Ups"));
        // The outer layer's post-logic still ran during unwind.
        assert_eq!(*log.lock().unwrap(), vec!["in", "out"]);
    }

    #[tokio::test]
    async fn trait_object_middleware_adapts() {
        let handler = from_middleware(Arc::new(LoggerMiddleware));
        let chain = vec![handler, terminal("hello")];
        let result = Next::new(chain).run(make_context("/")).await.unwrap();
        assert_eq!(result.body_ref(), b"hello");
    }
}
