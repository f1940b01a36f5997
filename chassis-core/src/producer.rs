//! Producer strategies.
//!
//! A [`Producer`] is the unit of logic behind a binding name. Whether it
//! needs an owning instance is declared here, as data, when the producer is
//! constructed; resolution checks that declaration instead of inspecting
//! anything at runtime. Four evaluation flavors exist:
//!
//! | constructor        | evaluated          | cached in                  |
//! |--------------------|--------------------|----------------------------|
//! | [`Producer::dynamic`] / [`Producer::dynamic_bound`] | every resolution | nothing |
//! | [`Producer::once`] | first resolution   | process-wide cell          |
//! | [`Producer::constant`] | never (value supplied up front) | nothing |
//! | [`Producer::per_instance`] | first resolution per instance | cell owned by the instance |
//!
//! The memoizing flavors guarantee a single winner under concurrent first
//! resolution: one caller computes, the rest block on the cell and observe
//! the same value. A failed computation leaves the cell empty, so the error
//! reaches that resolver and a later resolution may try again.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::OnceCell;

use crate::context::{InstanceContext, Resolved};
use crate::error::Error;

type FreeFn = dyn Fn() -> Result<Resolved, Error> + Send + Sync;
type BoundFn = dyn Fn(&InstanceContext) -> Result<Resolved, Error> + Send + Sync;

enum Compute {
    Free(Box<FreeFn>),
    Bound(Box<BoundFn>),
}

static NEXT_PRODUCER_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_PRODUCER_ID.fetch_add(1, Ordering::Relaxed)
}

/// A unit of logic that computes the value for a binding name.
pub struct Producer {
    id: u64,
    compute: Compute,
}

impl Producer {
    /// A free producer evaluated on every resolution.
    pub fn dynamic<T, F>(f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn() -> Result<T, Error> + Send + Sync + 'static,
    {
        Self {
            id: next_id(),
            compute: Compute::Free(Box::new(move || f().map(Resolved::new))),
        }
    }

    /// An instance-bound producer evaluated on every resolution.
    pub fn dynamic_bound<T, F>(f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&InstanceContext) -> Result<T, Error> + Send + Sync + 'static,
    {
        Self {
            id: next_id(),
            compute: Compute::Bound(Box::new(move |instance| f(instance).map(Resolved::new))),
        }
    }

    /// A free producer evaluated lazily, at most once per process.
    ///
    /// The constructor only accepts a context-free closure: a
    /// process-wide cell cannot depend on any one instance.
    pub fn once<T, F>(f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn() -> Result<T, Error> + Send + Sync + 'static,
    {
        let cell: OnceCell<Resolved> = OnceCell::new();
        Self {
            id: next_id(),
            compute: Compute::Free(Box::new(move || {
                cell.get_or_try_init(|| f().map(Resolved::new))
                    .map(|value| value.clone())
            })),
        }
    }

    /// A fixed value supplied at registration. No producer body ever runs.
    pub fn constant<T: Send + Sync + 'static>(value: T) -> Self {
        let value = Resolved::new(value);
        Self {
            id: next_id(),
            compute: Compute::Free(Box::new(move || Ok(value.clone()))),
        }
    }

    /// An instance-bound producer evaluated lazily, at most once per owning
    /// instance. The cell lives on the instance and dies with it.
    pub fn per_instance<T, F>(f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&InstanceContext) -> Result<T, Error> + Send + Sync + 'static,
    {
        let id = next_id();
        Self {
            id,
            compute: Compute::Bound(Box::new(move |instance| {
                let cell = instance.memo_cell(id);
                cell.get_or_try_init(|| f(instance).map(Resolved::new))
                    .map(|value| value.clone())
            })),
        }
    }

    /// The producer's unique identity; memoization cells are keyed by it.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether this producer requires an owning-instance context.
    pub fn requires_instance(&self) -> bool {
        matches!(self.compute, Compute::Bound(_))
    }

    /// Invoke the producer. An instance-bound producer without an instance
    /// context is a `BindingMismatch`; a free producer ignores any instance
    /// that happens to be present.
    pub(crate) fn produce(
        &self,
        name: &str,
        instance: Option<&InstanceContext>,
    ) -> Result<Resolved, Error> {
        match &self.compute {
            Compute::Free(f) => f(),
            Compute::Bound(f) => match instance {
                Some(instance) => f(instance),
                None => Err(Error::BindingMismatch(format!(
                    "{name}: producer requires an owning instance"
                ))),
            },
        }
    }
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("id", &self.id)
            .field("requires_instance", &self.requires_instance())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn counting() -> (Arc<AtomicUsize>, impl Fn() -> Result<usize, Error>) {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        (counter, move || Ok(seen.fetch_add(1, Ordering::SeqCst) + 1))
    }

    #[test]
    fn test_dynamic_recomputes_every_time() {
        let (_, produce) = counting();
        let producer = Producer::dynamic(produce);
        for expected in 1..=3usize {
            let value = producer.produce("echo", None).unwrap();
            assert_eq!(*value.downcast::<usize>().unwrap(), expected);
        }
    }

    #[test]
    fn test_once_computes_a_single_time() {
        let (counter, produce) = counting();
        let producer = Producer::once(produce);
        for _ in 0..3 {
            let value = producer.produce("once", None).unwrap();
            assert_eq!(*value.downcast::<usize>().unwrap(), 1);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_once_single_winner_under_contention() {
        let (counter, produce) = counting();
        let producer = Arc::new(Producer::once(produce));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let producer = producer.clone();
                thread::spawn(move || {
                    *producer
                        .produce("once", None)
                        .unwrap()
                        .downcast::<usize>()
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 1);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_once_failure_leaves_cell_empty() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = attempts.clone();
        let producer = Producer::once(move || {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Error::ServiceUnavailable("warming up".into()))
            } else {
                Ok(7u32)
            }
        });

        assert!(producer.produce("flaky", None).is_err());
        let value = producer.produce("flaky", None).unwrap();
        assert_eq!(*value.downcast::<u32>().unwrap(), 7);
        // Memoized now: no third attempt.
        producer.produce("flaky", None).unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_constant_returns_the_registered_value() {
        let producer = Producer::constant(String::from("fixed"));
        let a = producer.produce("k", None).unwrap();
        let b = producer.produce("k", None).unwrap();
        let a = a.downcast::<String>().unwrap();
        let b = b.downcast::<String>().unwrap();
        // The exact value supplied at registration, not a recomputation.
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(*a, "fixed");
    }

    #[test]
    fn test_per_instance_memoizes_per_owner() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        let producer = Producer::per_instance(move |_instance| {
            Ok(seen.fetch_add(1, Ordering::SeqCst) + 1)
        });

        let first = InstanceContext::new("a");
        let second = InstanceContext::new("b");

        let one = producer.produce("n", Some(&first)).unwrap();
        let one_again = producer.produce("n", Some(&first)).unwrap();
        let two = producer.produce("n", Some(&second)).unwrap();

        assert_eq!(*one.downcast::<usize>().unwrap(), 1);
        assert_eq!(*one_again.downcast::<usize>().unwrap(), 1);
        assert_eq!(*two.downcast::<usize>().unwrap(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_per_instance_single_winner_per_cell() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        let producer = Arc::new(Producer::per_instance(move |_| {
            Ok(seen.fetch_add(1, Ordering::SeqCst) + 1)
        }));
        let instance = Arc::new(InstanceContext::new(()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let producer = producer.clone();
                let instance = instance.clone();
                thread::spawn(move || {
                    *producer
                        .produce("n", Some(&instance))
                        .unwrap()
                        .downcast::<usize>()
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 1);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_bound_producer_without_instance_is_a_mismatch() {
        let producer = Producer::dynamic_bound(|_instance| Ok(0u8));
        let err = producer.produce("x", None).unwrap_err();
        assert!(matches!(err, Error::BindingMismatch(_)));
    }

    #[test]
    fn test_free_producer_ignores_instance() {
        let producer = Producer::dynamic(|| Ok(5u8));
        let instance = InstanceContext::new(());
        let value = producer.produce("x", Some(&instance)).unwrap();
        assert_eq!(*value.downcast::<u8>().unwrap(), 5);
    }
}
