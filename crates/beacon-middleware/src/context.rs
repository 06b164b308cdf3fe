//! Per-request context carried through the chain.
//!
//! The [`MiddlewareContext`] is created by the server for every request and
//! passed by mutable reference to each interceptor and to the terminal
//! handler. Interceptors record what they observed as typed extensions.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Context that flows through the chain for a single request.
///
/// # Example
///
/// ```
/// use beacon_middleware::context::MiddlewareContext;
///
/// let ctx = MiddlewareContext::new().with_remote_addr("127.0.0.1:5000".parse().unwrap());
/// assert_eq!(ctx.remote_addr().unwrap().port(), 5000);
/// ```
#[derive(Debug)]
pub struct MiddlewareContext {
    /// Address of the connected client, when known.
    remote_addr: Option<SocketAddr>,

    /// When the request entered the chain.
    started_at: Instant,

    /// Type-erased extension data.
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl MiddlewareContext {
    /// Creates a context with no remote address.
    #[must_use]
    pub fn new() -> Self {
        Self {
            remote_addr: None,
            started_at: Instant::now(),
            extensions: HashMap::new(),
        }
    }

    /// Sets the client address.
    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Returns the client address, if known.
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Returns when the request entered the chain.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns the elapsed time since the request entered the chain.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Stores a typed extension value, replacing any previous one.
    ///
    /// # Example
    ///
    /// ```
    /// use beacon_middleware::context::MiddlewareContext;
    ///
    /// struct Attempt(u32);
    ///
    /// let mut ctx = MiddlewareContext::new();
    /// ctx.set_extension(Attempt(2));
    /// assert_eq!(ctx.get_extension::<Attempt>().unwrap().0, 2);
    /// ```
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a typed extension value.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Removes and returns a typed extension value.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }

    /// Checks if an extension of the given type exists.
    #[must_use]
    pub fn has_extension<T: Send + Sync + 'static>(&self) -> bool {
        self.extensions.contains_key(&TypeId::of::<T>())
    }
}

impl Default for MiddlewareContext {
    fn default() -> Self {
        Self::new()
    }
}
