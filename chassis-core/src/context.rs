//! Resolution context types shared by the registry and the binding layer.
//!
//! A resolved binding value is type-erased behind [`Resolved`], the same way
//! the DI containers this crate grew out of store providers: an
//! `Arc<dyn Any>` that is cheap to clone and downcast on the consumer side.
//! [`InstanceContext`] is the opaque "owning instance" handle a producer may
//! require; the engine never inspects what the instance is, only whether one
//! is present. [`CallArgs`] carries one invocation's named result slots.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

/// A resolved binding value: type-erased, cheap to clone, safe to share.
#[derive(Clone)]
pub struct Resolved(Arc<dyn Any + Send + Sync>);

impl Resolved {
    /// Wrap a value for storage in a binding slot or memoization cell.
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Resolved(Arc::new(value))
    }

    /// Downcast to the concrete value type.
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.0.clone().downcast::<T>().ok()
    }

    /// Check whether the erased value is of type `T`.
    pub fn is<T: 'static>(&self) -> bool {
        self.0.is::<T>()
    }
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Resolved(..)")
    }
}

/// The opaque owning instance an instance-bound producer computes against.
///
/// Consumers construct one per logical owner (for the HTTP glue, one per
/// request) and pass it to `resolve`. Per-instance memoization cells live
/// here, so they are destroyed together with the instance they belong to.
pub struct InstanceContext {
    target: Arc<dyn Any + Send + Sync>,
    memo: Mutex<HashMap<u64, Arc<OnceCell<Resolved>>>>,
}

impl InstanceContext {
    /// Create a context owning `target`.
    pub fn new<T: Send + Sync + 'static>(target: T) -> Self {
        Self {
            target: Arc::new(target),
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Downcast the owned instance to its concrete type.
    ///
    /// The engine never calls this; it exists for producers that know what
    /// kind of instance they are bound to.
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.target.clone().downcast::<T>().ok()
    }

    /// Fetch (or create) the memoization cell for one producer on this
    /// instance. Cells are keyed by producer identity so stacked producers
    /// under the same binding name never share a cell.
    pub(crate) fn memo_cell(&self, producer_id: u64) -> Arc<OnceCell<Resolved>> {
        self.memo.lock().entry(producer_id).or_default().clone()
    }
}

impl fmt::Debug for InstanceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceContext")
            .field("memoized", &self.memo.lock().len())
            .finish()
    }
}

/// The caller-provided arguments for one invocation: named result slots
/// filled in by binding decorators, plus the owning instance (if any).
#[derive(Clone, Default)]
pub struct CallArgs {
    slots: HashMap<String, Resolved>,
    instance: Option<Arc<InstanceContext>>,
}

impl CallArgs {
    /// An empty argument set with no owning instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// An argument set for an invocation owned by `instance`.
    pub fn with_instance(instance: Arc<InstanceContext>) -> Self {
        Self {
            slots: HashMap::new(),
            instance: Some(instance),
        }
    }

    /// Insert a resolved value into the named slot.
    pub fn insert(&mut self, name: impl Into<String>, value: Resolved) {
        self.slots.insert(name.into(), value);
    }

    /// Fetch a slot's value, downcast to its concrete type.
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.slots.get(name).and_then(Resolved::downcast)
    }

    /// Fetch a slot's raw erased value.
    pub fn slot(&self, name: &str) -> Option<&Resolved> {
        self.slots.get(name)
    }

    /// The owning instance of this invocation, if the target has one.
    pub fn instance(&self) -> Option<&Arc<InstanceContext>> {
        self.instance.as_ref()
    }

    /// Borrow the instance context the way `resolve` wants it.
    pub fn instance_context(&self) -> Option<&InstanceContext> {
        self.instance.as_deref()
    }
}

impl fmt::Debug for CallArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallArgs")
            .field("slots", &self.slots.keys().collect::<Vec<_>>())
            .field("has_instance", &self.instance.is_some())
            .finish()
    }
}
