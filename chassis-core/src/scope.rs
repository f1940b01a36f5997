//! Scoped producer overrides.
//!
//! An override pushes a producer above whatever is currently active for a
//! name and guarantees exactly one pop when the scope ends, on every exit
//! path: normal return, early `?`, or unwinding. Nested overrides of the
//! same name restore in strict LIFO order.
//!
//! LIFO is only well-defined within a single logical flow. Overriding the
//! same name concurrently from two tasks interleaves pushes and pops in an
//! unspecified order; callers who do that accept the interleaving.

use crate::error::Error;
use crate::logging::error;
use crate::producer::Producer;
use crate::registry::Registry;

/// RAII guard for a temporary producer. Dropping it restores the
/// previously active producer for the name.
#[must_use = "dropping the guard immediately would end the override scope"]
pub struct Override {
    registry: Registry,
    name: String,
}

impl Override {
    /// The overridden binding name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Override {
    fn drop(&mut self) {
        // A failed pop means something else already popped this name out
        // from under the guard. Stack discipline is broken either way; all
        // a destructor can do is report it.
        if let Err(err) = self.registry.unregister(&self.name) {
            error!(binding = %self.name, %err, "override guard failed to restore producer");
        }
    }
}

impl std::fmt::Debug for Override {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Override").field("name", &self.name).finish()
    }
}

impl Registry {
    /// Push `producer` for `name`, returning a guard that pops it again
    /// when dropped.
    pub fn push_override(&self, name: &str, producer: Producer) -> Result<Override, Error> {
        self.register(name, producer)?;
        Ok(Override {
            registry: self.clone(),
            name: name.to_string(),
        })
    }
}

/// Run `body` with `producer` temporarily active for `name`.
///
/// The previous producer is restored when `body` returns, and also if it
/// unwinds (the pop rides on the guard's destructor).
pub fn with_override<R>(
    registry: &Registry,
    name: &str,
    producer: Producer,
    body: impl FnOnce() -> R,
) -> Result<R, Error> {
    let _guard = registry.push_override(name, producer)?;
    Ok(body())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    fn current(registry: &Registry, name: &str) -> u32 {
        *registry.resolve_as::<u32>(name, None).unwrap()
    }

    #[test]
    fn test_override_applies_and_restores() {
        let registry = Registry::new();
        registry.register("port", Producer::constant(80u32)).unwrap();

        let seen = with_override(&registry, "port", Producer::constant(8080u32), || {
            current(&registry, "port")
        })
        .unwrap();

        assert_eq!(seen, 8080);
        assert_eq!(current(&registry, "port"), 80);
    }

    #[test]
    fn test_nested_overrides_unwind_lifo() {
        let registry = Registry::new();
        registry.register("n", Producer::constant(1u32)).unwrap();

        let outer = registry
            .push_override("n", Producer::constant(2u32))
            .unwrap();
        {
            let _inner = registry
                .push_override("n", Producer::constant(3u32))
                .unwrap();
            assert_eq!(current(&registry, "n"), 3);
        }
        assert_eq!(current(&registry, "n"), 2);
        drop(outer);
        assert_eq!(current(&registry, "n"), 1);
    }

    #[test]
    fn test_override_restores_across_unwinding() {
        let registry = Registry::new();
        registry.register("n", Producer::constant(1u32)).unwrap();

        let result = catch_unwind(AssertUnwindSafe(|| {
            with_override(&registry, "n", Producer::constant(99u32), || {
                assert_eq!(current(&registry, "n"), 99);
                panic!("handler blew up");
            })
        }));

        assert!(result.is_err());
        assert_eq!(current(&registry, "n"), 1);
        assert_eq!(registry.depth("n"), 1);
    }

    #[test]
    fn test_override_on_undefined_name_defines_it_for_the_scope() {
        let registry = Registry::new();
        {
            let _guard = registry
                .push_override("ephemeral", Producer::constant(7u32))
                .unwrap();
            assert_eq!(current(&registry, "ephemeral"), 7);
        }
        assert!(matches!(
            registry.resolve("ephemeral", None).unwrap_err(),
            Error::UndefinedBinding(_)
        ));
    }

    #[test]
    fn test_override_rejects_malformed_name() {
        let registry = Registry::new();
        assert!(matches!(
            registry
                .push_override("not a name", Producer::constant(0u8))
                .unwrap_err(),
            Error::InvalidRegistration(_)
        ));
    }
}
