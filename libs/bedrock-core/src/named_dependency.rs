//! Named Dependency: the reference-counted wrapper every addressable
//! runtime object is exposed through (spec §3, §9 "Opaque handles from
//! modules").
//!
//! A module's `register` hook returns an opaque payload; nothing outside
//! the owning manager is allowed to know its concrete type. We model that
//! with a boxed `Any` behind a release callback, held inside an `Arc` so
//! that cloning a `NamedDependency` is cheap and shares the refcount with
//! every holder — exactly the property §5 requires ("a dependency cannot
//! be removed while its refcount exceeds one").

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Release hooks run at most once, when the last `NamedDependency` clone
/// referencing a given handle is dropped. Idempotence against a handle that
/// was never actually acquired is the caller's responsibility; the wrapper
/// itself guarantees single-invocation via `Arc`'s drop semantics.
pub trait ReleaseHook: Send + Sync {
    fn release(&self, payload: &(dyn Any + Send + Sync));
}

impl<F> ReleaseHook for F
where
    F: Fn(&(dyn Any + Send + Sync)) + Send + Sync,
{
    fn release(&self, payload: &(dyn Any + Send + Sync)) {
        (self)(payload);
    }
}

struct Inner {
    kind: String,
    payload: Box<dyn Any + Send + Sync>,
    release: Option<Box<dyn ReleaseHook>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(hook) = self.release.take() {
            hook.release(self.payload.as_ref());
        }
    }
}

/// `{ name, type, handle, release }` from spec §3, shared by reference count.
#[derive(Clone)]
pub struct NamedDependency {
    name: Arc<str>,
    inner: Arc<Inner>,
}

impl fmt::Debug for NamedDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedDependency")
            .field("name", &self.name)
            .field("type", &self.inner.kind)
            .field("refcount", &self.refcount())
            .finish()
    }
}

impl NamedDependency {
    /// Build a wrapper around an opaque payload. `kind` is the module name
    /// that produced it, or a reserved tag (`pool`, `xstream`, `group`) for
    /// engine-level objects.
    pub fn new<T: Send + Sync + 'static>(
        name: impl Into<Arc<str>>,
        kind: impl Into<String>,
        payload: T,
        release: impl ReleaseHook + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(Inner {
                kind: kind.into(),
                payload: Box::new(payload),
                release: Some(Box::new(release)),
            }),
        }
    }

    /// Variant with no release action, for handles the caller does not own
    /// (e.g. a raw reference forwarded from another manager).
    pub fn new_unowned<T: Send + Sync + 'static>(
        name: impl Into<Arc<str>>,
        kind: impl Into<String>,
        payload: T,
    ) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(Inner {
                kind: kind.into(),
                payload: Box::new(payload),
                release: None,
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.inner.kind
    }

    /// Number of live references to the underlying handle, including this one.
    #[must_use]
    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Typed access to the opaque payload.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.inner.payload.downcast_ref::<T>()
    }

    /// Identity comparison: two wrappers refer to the same underlying handle
    /// iff they share the same `Inner` allocation.
    #[must_use]
    pub fn same_handle(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
