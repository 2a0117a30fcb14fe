//! Ambient activation context and the seam for capturing it.
//!
//! Activation decisions (match rules, predicates) and the `on_init`/`on_start`
//! hooks all run against an [`ActivationContext`]: a snapshot of where the
//! embedding application currently is (URL, client identifier, optional
//! document handle). The manager never fabricates this on its own; it asks a
//! [`ContextSource`] at `initialize`, `activate_features` and reload time, so
//! tests and embedders stay in full control of the ambient state.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

/// # Snapshot of the embedder's ambient state.
///
/// Cheap to clone; the URL and client identifier are shared `Arc<str>`s and
/// the optional document handle is an opaque shared pointer the embedder can
/// downcast back with [`ActivationContext::doc`].
#[derive(Clone)]
pub struct ActivationContext {
    /// Location the activation pass runs against (match rules evaluate this).
    pub url: Arc<str>,
    /// Identifier of the embedding client (application name, surface, ...).
    pub client: Arc<str>,
    /// When this snapshot was captured.
    pub at: SystemTime,
    /// Opaque embedder payload (a document, a session, ...), if any.
    pub payload: Option<Arc<dyn Any + Send + Sync>>,
}

impl ActivationContext {
    /// Creates a context captured now, without a payload.
    pub fn new(url: impl Into<Arc<str>>, client: impl Into<Arc<str>>) -> Self {
        Self {
            url: url.into(),
            client: client.into(),
            at: SystemTime::now(),
            payload: None,
        }
    }

    /// Attaches an opaque embedder payload.
    #[inline]
    pub fn with_payload(mut self, payload: Arc<dyn Any + Send + Sync>) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Downcasts the payload back to a concrete type.
    ///
    /// Returns `None` when there is no payload or the type does not match.
    pub fn doc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.payload
            .clone()
            .and_then(|p| Arc::downcast::<T>(p).ok())
    }
}

impl fmt::Debug for ActivationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivationContext")
            .field("url", &self.url)
            .field("client", &self.client)
            .field("at", &self.at)
            .field("payload", &self.payload.is_some())
            .finish()
    }
}

/// # Source of ambient context snapshots.
///
/// The manager calls [`capture`](ContextSource::capture) whenever it needs a
/// fresh view of the embedder's state: once during `initialize`, and again on
/// every activation or reload pass. Implementations should be cheap and must
/// not block.
pub trait ContextSource: Send + Sync + 'static {
    /// Captures the current ambient state.
    fn capture(&self) -> ActivationContext;
}

/// Any `Fn() -> ActivationContext` closure works as a source.
impl<F> ContextSource for F
where
    F: Fn() -> ActivationContext + Send + Sync + 'static,
{
    fn capture(&self) -> ActivationContext {
        (self)()
    }
}

/// # Fixed context source.
///
/// Captures the same URL and client every time (the timestamp is still taken
/// at capture time). Useful for embedders whose ambient state never changes,
/// and as the builder's default.
pub struct StaticContext {
    url: Arc<str>,
    client: Arc<str>,
}

impl StaticContext {
    /// Creates a source that always reports the given location.
    pub fn new(url: impl Into<Arc<str>>, client: impl Into<Arc<str>>) -> Self {
        Self {
            url: url.into(),
            client: client.into(),
        }
    }
}

impl ContextSource for StaticContext {
    fn capture(&self) -> ActivationContext {
        ActivationContext::new(self.url.clone(), self.client.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_source_reports_fixed_location() {
        let src = StaticContext::new("https://example.com/app", "tests");
        let a = src.capture();
        let b = src.capture();
        assert_eq!(a.url.as_ref(), "https://example.com/app");
        assert_eq!(b.client.as_ref(), "tests");
        assert!(a.payload.is_none());
    }

    #[test]
    fn test_closure_source() {
        let src = || ActivationContext::new("https://example.com/x", "closure");
        let ctx = ContextSource::capture(&src);
        assert_eq!(ctx.url.as_ref(), "https://example.com/x");
    }

    #[test]
    fn test_payload_downcast() {
        let ctx = ActivationContext::new("https://example.com", "tests")
            .with_payload(Arc::new(42u32));
        assert_eq!(ctx.doc::<u32>().as_deref(), Some(&42));
        assert!(ctx.doc::<String>().is_none());
    }
}
