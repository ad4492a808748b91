//! Ordered, mutable interceptor chains.
//!
//! Three independent chains transform outgoing descriptors, successful
//! response bodies, and failures. Each registration returns an
//! [`InterceptorId`] that removes exactly that registration, even when two
//! registered functions behave identically.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

use super::request::RequestDescriptor;
use crate::error::{Result, StorefrontError};

/// Transforms an outgoing request. May await (e.g. to read a token).
pub type RequestInterceptor =
    Arc<dyn Fn(RequestDescriptor) -> BoxFuture<'static, Result<RequestDescriptor>> + Send + Sync>;

/// Transforms a successful response body.
pub type ResponseInterceptor = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Transforms or reacts to a failure. Always yields an error.
pub type ErrorInterceptor =
    Arc<dyn Fn(StorefrontError) -> BoxFuture<'static, StorefrontError> + Send + Sync>;

/// Removal handle returned by [`InterceptorChain::use_interceptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterceptorId(u64);

impl fmt::Display for InterceptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ordered list of interceptors. Insertion order is execution order.
pub struct InterceptorChain<F> {
    entries: Mutex<Vec<(InterceptorId, F)>>,
    next_id: AtomicU64,
}

impl<F: Clone> InterceptorChain<F> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Append `interceptor` and return its removal handle.
    pub fn use_interceptor(&self, interceptor: F) -> InterceptorId {
        let id = InterceptorId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, interceptor));
        id
    }

    /// Remove the registration behind `id`. Returns whether it was present.
    pub fn eject(&self, id: InterceptorId) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Remove every registration.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current chain, so it can be run without holding the lock.
    #[must_use]
    pub fn snapshot(&self) -> Vec<F> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, f)| f.clone())
            .collect()
    }
}

impl<F: Clone> Default for InterceptorChain<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> fmt::Debug for InterceptorChain<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self
            .entries
            .lock()
            .map_or(0, |entries| entries.len());
        f.debug_struct("InterceptorChain").field("len", &len).finish()
    }
}

impl InterceptorChain<RequestInterceptor> {
    /// Register an async request transform.
    pub fn use_fn<Fut>(
        &self,
        f: impl Fn(RequestDescriptor) -> Fut + Send + Sync + 'static,
    ) -> InterceptorId
    where
        Fut: Future<Output = Result<RequestDescriptor>> + Send + 'static,
    {
        self.use_interceptor(Arc::new(move |descriptor| f(descriptor).boxed()))
    }

    /// Run each interceptor in order, feeding each output into the next.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first interceptor error.
    pub async fn run(&self, mut descriptor: RequestDescriptor) -> Result<RequestDescriptor> {
        for interceptor in self.snapshot() {
            descriptor = interceptor(descriptor).await?;
        }
        Ok(descriptor)
    }
}

impl InterceptorChain<ResponseInterceptor> {
    /// Register an async response transform.
    pub fn use_fn<Fut>(&self, f: impl Fn(Value) -> Fut + Send + Sync + 'static) -> InterceptorId
    where
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.use_interceptor(Arc::new(move |body| f(body).boxed()))
    }

    /// Run each interceptor in order over the response body.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first interceptor error.
    pub async fn run(&self, mut body: Value) -> Result<Value> {
        for interceptor in self.snapshot() {
            body = interceptor(body).await?;
        }
        Ok(body)
    }
}

impl InterceptorChain<ErrorInterceptor> {
    /// Register an async error handler.
    pub fn use_fn<Fut>(
        &self,
        f: impl Fn(StorefrontError) -> Fut + Send + Sync + 'static,
    ) -> InterceptorId
    where
        Fut: Future<Output = StorefrontError> + Send + 'static,
    {
        self.use_interceptor(Arc::new(move |err| f(err).boxed()))
    }

    /// Run each handler in order; the final error is what the caller sees.
    pub async fn run(&self, mut error: StorefrontError) -> StorefrontError {
        for interceptor in self.snapshot() {
            error = interceptor(error).await;
        }
        error
    }
}

/// The three chains owned by a pipeline.
#[derive(Debug, Default)]
pub struct Interceptors {
    pub request: InterceptorChain<RequestInterceptor>,
    pub response: InterceptorChain<ResponseInterceptor>,
    pub error: InterceptorChain<ErrorInterceptor>,
}

impl Interceptors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
