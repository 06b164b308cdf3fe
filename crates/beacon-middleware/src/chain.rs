//! Interceptor composition.
//!
//! A [`Chain`] wraps a terminal [`Handler`] with an ordered list of
//! interceptors. The first registered interceptor is the outermost: for a
//! chain built from `[A, B]` around `H`, a request observes
//! `A-pre, B-pre, H, B-post, A-post`.
//!
//! The recovery slot is separate from the ordered layers and always wraps
//! everything else, regardless of when it was set on the builder.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Handler, Middleware, Next};
use crate::types::{Request, Response};
use std::sync::Arc;

/// A type-erased interceptor that can be stored in a vector.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// A handler wrapped in interceptors.
///
/// Immutable once built; cheap to share behind an [`Arc`].
///
/// # Example
///
/// ```
/// use beacon_middleware::chain::Chain;
/// use beacon_middleware::middleware::handler_fn;
/// use beacon_middleware::types::{Response, ResponseExt};
/// use http::StatusCode;
///
/// let chain = Chain::builder(handler_fn(|_req| async {
///     Response::text(StatusCode::OK, "ok")
/// }))
/// .build();
///
/// assert_eq!(chain.stage_count(), 0);
/// ```
pub struct Chain {
    handler: Arc<dyn Handler>,
    recovery: Option<BoxedMiddleware>,
    layers: Vec<BoxedMiddleware>,
}

impl Chain {
    /// Starts building a chain around `handler`.
    #[must_use]
    pub fn builder<H: Handler>(handler: H) -> ChainBuilder {
        ChainBuilder::new(handler)
    }

    /// Wraps `handler` with `layers`, the first being outermost.
    ///
    /// An empty list yields a chain that behaves exactly like `handler`.
    #[must_use]
    pub fn compose<H, I>(handler: H, layers: I) -> Self
    where
        H: Handler,
        I: IntoIterator<Item = BoxedMiddleware>,
    {
        Self {
            handler: Arc::new(handler),
            recovery: None,
            layers: layers.into_iter().collect(),
        }
    }

    /// Returns the stages from outermost to innermost.
    fn stages(&self) -> impl DoubleEndedIterator<Item = &BoxedMiddleware> {
        self.recovery.iter().chain(self.layers.iter())
    }

    /// Builds the call chain for one request.
    fn build_next(&self) -> Next<'_> {
        self.stages()
            .rev()
            .fold(Next::handler(self.handler.as_ref()), |next, middleware| {
                Next::new(middleware.as_ref(), next)
            })
    }

    /// Returns the names of all stages, outermost first.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages().map(|mw| mw.name()).collect()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.layers.len() + usize::from(self.recovery.is_some())
    }
}

impl Handler for Chain {
    fn call<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move { self.build_next().run(ctx, request).await })
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("stages", &self.stage_names())
            .finish_non_exhaustive()
    }
}

/// Builder for constructing a [`Chain`].
pub struct ChainBuilder {
    handler: Arc<dyn Handler>,
    recovery: Option<BoxedMiddleware>,
    layers: Vec<BoxedMiddleware>,
}

impl ChainBuilder {
    /// Creates a builder around `handler` with no stages.
    #[must_use]
    pub fn new<H: Handler>(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
            recovery: None,
            layers: Vec::new(),
        }
    }

    /// Appends an interceptor inside all previously added ones.
    #[must_use]
    pub fn layer<M: Middleware>(mut self, middleware: M) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    /// Sets the outermost recovery stage, replacing any previous one.
    #[must_use]
    pub fn recovery<M: Middleware>(mut self, middleware: M) -> Self {
        self.recovery = Some(Arc::new(middleware));
        self
    }

    /// Builds the chain.
    #[must_use]
    pub fn build(self) -> Chain {
        Chain {
            handler: self.handler,
            recovery: self.recovery,
            layers: self.layers,
        }
    }
}
