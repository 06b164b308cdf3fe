//! Core interceptor and handler traits.
//!
//! A [`Middleware`] wraps the remainder of the chain: it may run logic before
//! delegating through [`Next::run`], after it returns, or short-circuit with
//! its own response. A [`Handler`] is the terminal stage that produces the
//! response for a request.
//!
//! # Example
//!
//! ```
//! use beacon_middleware::{BoxFuture, Middleware, MiddlewareContext, Next, Request, Response};
//!
//! struct ServerHeader;
//!
//! impl Middleware for ServerHeader {
//!     fn name(&self) -> &'static str {
//!         "server-header"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: &'a mut MiddlewareContext,
//!         request: Request,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, Response> {
//!         Box::pin(async move {
//!             let mut response = next.run(ctx, request).await;
//!             response
//!                 .headers_mut()
//!                 .insert("server", http::HeaderValue::from_static("beacon"));
//!             response
//!         })
//!     }
//! }
//! ```

use crate::context::MiddlewareContext;
use crate::types::{Request, Response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed future that returns a response.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A request interceptor.
///
/// # Invariants
///
/// - Call `next.run()` at most once; not calling it short-circuits the chain
/// - Do not swallow panics raised downstream unless you are the recovery stage
pub trait Middleware: Send + Sync + 'static {
    /// Returns the name of this stage, used in logs and introspection.
    fn name(&self) -> &'static str;

    /// Processes the request, delegating to `next` for the rest of the chain.
    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response>;
}

/// The terminal stage of a chain.
///
/// Routers, endpoint functions and whole chains implement this trait, so a
/// composed [`Chain`](crate::chain::Chain) can itself be served or nested.
pub trait Handler: Send + Sync + 'static {
    /// Produces the response for a request.
    fn call<'a>(&'a self, ctx: &'a mut MiddlewareContext, request: Request)
        -> BoxFuture<'a, Response>;
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn call<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
    ) -> BoxFuture<'a, Response> {
        (**self).call(ctx, request)
    }
}

/// A [`Handler`] built from an async function of the request.
///
/// Created with [`handler_fn`].
pub struct FnHandler<F> {
    func: F,
}

/// Wraps an async function as a [`Handler`].
///
/// The function does not see the [`MiddlewareContext`]; implement
/// [`Handler`] directly when the client address or extensions are needed.
pub const fn handler_fn<F>(func: F) -> FnHandler<F> {
    FnHandler { func }
}

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn call<'a>(
        &'a self,
        _ctx: &'a mut MiddlewareContext,
        request: Request,
    ) -> BoxFuture<'a, Response> {
        Box::pin((self.func)(request))
    }
}

/// The remainder of the chain, handed to each interceptor.
///
/// Consumed by [`Next::run`], so it can be invoked at most once.
pub struct Next<'a> {
    inner: NextInner<'a>,
}

enum NextInner<'a> {
    /// Another interceptor, followed by the rest of the chain.
    Chain {
        middleware: &'a dyn Middleware,
        next: Box<Next<'a>>,
    },
    /// End of chain.
    Handler(&'a dyn Handler),
}

impl<'a> Next<'a> {
    /// Creates a `Next` that will invoke `middleware`, then `next`.
    pub(crate) fn new(middleware: &'a dyn Middleware, next: Next<'a>) -> Self {
        Self {
            inner: NextInner::Chain {
                middleware,
                next: Box::new(next),
            },
        }
    }

    /// Creates a terminal `Next` that invokes the handler.
    pub(crate) fn handler(handler: &'a dyn Handler) -> Self {
        Self {
            inner: NextInner::Handler(handler),
        }
    }

    /// Invokes the next interceptor or the terminal handler.
    pub async fn run(self, ctx: &mut MiddlewareContext, request: Request) -> Response {
        match self.inner {
            NextInner::Chain { middleware, next } => middleware.process(ctx, request, *next).await,
            NextInner::Handler(handler) => handler.call(ctx, request).await,
        }
    }
}
