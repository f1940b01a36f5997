// Binding decorator: inject named values into operations before they run
//
// The design follows the handler-dispatch pattern used elsewhere in this
// crate's lineage: a trait with an associated output type so wrapping stays
// monomorphized, plus type erasure at storage time for collections.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::context::CallArgs;
use crate::error::Error;
use crate::registry::Registry;

/// A unit of work that can have named values injected before it runs.
///
/// An operation is invoked with a [`CallArgs`] carrier holding named result
/// slots and (optionally) the owning instance. Binding decorators fill
/// slots; the innermost operation reads them.
pub trait Operation: Send + Sync + 'static {
    /// What the operation produces.
    type Output;

    /// Run the operation with the given argument carrier.
    fn invoke(&self, args: CallArgs) -> Result<Self::Output, Error>;
}

/// Trait for converting function types into operations.
///
/// The `Args` parameter disambiguates the blanket impls, the same trick the
/// handler layer uses for `IntoHandler`.
pub trait IntoOperation<Args> {
    type Operation: Operation;

    fn into_operation(self) -> Self::Operation;
}

/// Anything that already is an operation converts to itself.
impl<O: Operation> IntoOperation<()> for O {
    type Operation = O;

    fn into_operation(self) -> Self::Operation {
        self
    }
}

/// An operation wrapping a plain function of the argument carrier.
#[derive(Clone)]
pub struct FnOperation<F> {
    f: F,
}

impl<F> FnOperation<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, R> Operation for FnOperation<F>
where
    F: Fn(CallArgs) -> Result<R, Error> + Send + Sync + 'static,
    R: 'static,
{
    type Output = R;

    fn invoke(&self, args: CallArgs) -> Result<R, Error> {
        (self.f)(args)
    }
}

impl<F, R> IntoOperation<(CallArgs,)> for F
where
    F: Fn(CallArgs) -> Result<R, Error> + Send + Sync + 'static,
    R: 'static,
{
    type Operation = FnOperation<F>;

    fn into_operation(self) -> Self::Operation {
        FnOperation::new(self)
    }
}

/// A transformer produced by [`bind`]: wraps a target operation so that the
/// named binding is resolved and injected at invocation time.
pub struct Bind {
    registry: Registry,
    name: String,
}

/// Start a binding decoration for `name` against `registry`.
///
/// ```ignore
/// let op = bind(&registry, "payload").wrap(|args: CallArgs| {
///     let payload = args.get::<Option<Payload>>("payload");
///     ...
/// });
/// ```
pub fn bind(registry: &Registry, name: &str) -> Bind {
    Bind {
        registry: registry.clone(),
        name: name.to_string(),
    }
}

impl Bind {
    /// Wrap a target operation. The result has the same output type, plus
    /// one additional named slot filled in before the target runs.
    pub fn wrap<O, Args>(self, op: O) -> Bound<O::Operation>
    where
        O: IntoOperation<Args>,
    {
        Bound {
            registry: self.registry,
            name: self.name,
            inner: op.into_operation(),
        }
    }
}

/// An operation with one binding injected ahead of it.
///
/// `Bound` operations compose: each `bind(..).wrap(..)` layer injects one
/// distinct named slot, and composition order does not affect the final
/// slot set.
#[derive(Clone)]
pub struct Bound<O> {
    registry: Registry,
    name: String,
    inner: O,
}

impl<O: Operation> Operation for Bound<O> {
    type Output = O::Output;

    fn invoke(&self, mut args: CallArgs) -> Result<Self::Output, Error> {
        // Resolution failures (UndefinedBinding, BindingMismatch) propagate
        // unchanged; they are configuration errors of the call site.
        let value = self.registry.resolve(&self.name, args.instance_context())?;
        args.insert(self.name.clone(), value);
        self.inner.invoke(args)
    }
}

/// Type-erased operation for storing heterogeneous operations with a common
/// output type in one table.
pub struct BoxedOperation<T> {
    inner: Arc<dyn ErasedOperation<T>>,
}

impl<T: 'static> BoxedOperation<T> {
    pub fn new<O>(op: O) -> Self
    where
        O: Operation<Output = T>,
    {
        Self {
            inner: Arc::new(OperationWrapper {
                op,
                _marker: PhantomData,
            }),
        }
    }

    pub fn invoke(&self, args: CallArgs) -> Result<T, Error> {
        self.inner.invoke(args)
    }
}

impl<T> Clone for BoxedOperation<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

trait ErasedOperation<T>: Send + Sync {
    fn invoke(&self, args: CallArgs) -> Result<T, Error>;
}

struct OperationWrapper<O> {
    op: O,
    _marker: PhantomData<fn() -> O>,
}

impl<O: Operation> ErasedOperation<O::Output> for OperationWrapper<O> {
    fn invoke(&self, args: CallArgs) -> Result<O::Output, Error> {
        self.op.invoke(args)
    }
}
