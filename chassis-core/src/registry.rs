//! The injection registry: named stacks of producers.
//!
//! Each binding name owns an ordered stack; resolution always uses the most
//! recently pushed producer. The stack (rather than a single slot) is what
//! lets scoped overrides nest and unwind in exact reverse order of entry.
//!
//! A `Registry` is a cheap `Clone` handle over shared state, so it can be
//! passed to request-handling tasks freely. Push and pop take the write
//! lock; `resolve` takes the read lock only long enough to clone the top
//! producer handle and invokes it outside the lock, so resolves never
//! contend with each other and a slow producer never blocks the table.
//!
//! Two caller obligations are not enforced here: overrides of the *same*
//! name from concurrent logical flows have no defined LIFO order (keep a
//! name's overrides within one flow), and resolving a name from within its
//! own producer body is an error the engine does not detect.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::context::{InstanceContext, Resolved};
use crate::error::Error;
use crate::logging::{debug, trace};
use crate::producer::Producer;

/// Process-wide table of named producer stacks.
#[derive(Clone, Default)]
pub struct Registry {
    bindings: Arc<RwLock<HashMap<String, Vec<Arc<Producer>>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a producer onto the stack for `name` and return its handle.
    ///
    /// Names are not unique: pushing a second producer shadows the first
    /// until it is unregistered again.
    pub fn register(&self, name: &str, producer: Producer) -> Result<Arc<Producer>, Error> {
        validate_name(name)?;
        let producer = Arc::new(producer);
        let mut bindings = self.bindings.write();
        bindings
            .entry(name.to_string())
            .or_default()
            .push(producer.clone());
        debug!(binding = name, producer = producer.id(), "producer registered");
        Ok(producer)
    }

    /// Pop the most recently pushed producer for `name`.
    ///
    /// Popping an empty stack is a scope-discipline bug in the caller and
    /// fails with `StackUnderflow` rather than being ignored.
    pub fn unregister(&self, name: &str) -> Result<(), Error> {
        let mut bindings = self.bindings.write();
        match bindings.get_mut(name).and_then(Vec::pop) {
            Some(producer) => {
                debug!(binding = name, producer = producer.id(), "producer unregistered");
                Ok(())
            }
            None => Err(Error::StackUnderflow(name.to_string())),
        }
    }

    /// Resolve the current value for `name` by invoking the top-of-stack
    /// producer, passing `instance` when the producer is instance-bound.
    pub fn resolve(
        &self,
        name: &str,
        instance: Option<&InstanceContext>,
    ) -> Result<Resolved, Error> {
        let producer = {
            let bindings = self.bindings.read();
            bindings.get(name).and_then(|stack| stack.last()).cloned()
        };
        let producer = producer.ok_or_else(|| Error::UndefinedBinding(name.to_string()))?;
        trace!(binding = name, producer = producer.id(), "resolving binding");
        producer.produce(name, instance)
    }

    /// Resolve and downcast to the expected value type.
    pub fn resolve_as<T: Send + Sync + 'static>(
        &self,
        name: &str,
        instance: Option<&InstanceContext>,
    ) -> Result<Arc<T>, Error> {
        self.resolve(name, instance)?.downcast::<T>().ok_or_else(|| {
            Error::BindingMismatch(format!(
                "{name}: produced value is not a {}",
                std::any::type_name::<T>()
            ))
        })
    }

    /// Whether any producer is currently registered for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.bindings
            .read()
            .get(name)
            .is_some_and(|stack| !stack.is_empty())
    }

    /// Current stack depth for `name`.
    pub fn depth(&self, name: &str) -> usize {
        self.bindings.read().get(name).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bindings = self.bindings.read();
        f.debug_struct("Registry")
            .field("bindings", &bindings.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Reject malformed binding names before any producer lands in the table.
fn validate_name(name: &str) -> Result<(), Error> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidRegistration(format!(
            "binding name must be an identifier, got {name:?}"
        )))
    }
}
