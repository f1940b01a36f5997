//! Endpoints: per-method operations behind a route.
//!
//! Handlers produce JSON-serializable data; the dispatcher renders it. A
//! handler is any operation whose output is a [`HandlerFuture`], so binding
//! decorators compose in front of it freely:
//!
//! ```ignore
//! let whoami = bind(&registry, "basic_auth").wrap(handler(|args: CallArgs| async move {
//!     let creds = args.get::<Option<Credentials>>("basic_auth").unwrap();
//!     match &*creds {
//!         Some(creds) => Ok(json!({"user": creds.username})),
//!         None => Err(Error::Unauthorized("No basic authentication headers.".into())),
//!     }
//! }));
//! router.at("/whoami", Endpoint::new().get(whoami))?;
//! ```
//!
//! A method with no operation answers 405, matching the stub behavior of
//! the base handler this design descends from.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::bind::{BoxedOperation, FnOperation, IntoOperation, Operation};
use crate::context::CallArgs;
use crate::error::Error;
use crate::http::HttpRequest;

/// The future a request handler returns: JSON data, or an error the
/// dispatcher maps onto a status code.
pub type HandlerFuture =
    Pin<Box<dyn Future<Output = Result<serde_json::Value, Error>> + Send>>;

/// A type-erased request operation.
pub type MethodOperation = BoxedOperation<HandlerFuture>;

/// The per-request owning instance: the request itself, held behind the
/// opaque instance context the injection engine passes around. Producers
/// that know they serve HTTP downcast to this to reach the request.
#[derive(Debug)]
pub struct RequestScope {
    pub request: HttpRequest,
}

impl RequestScope {
    pub fn new(request: HttpRequest) -> Self {
        Self { request }
    }
}

/// Accessor for the request scope from inside a handler.
pub trait RequestArgs {
    /// The request this invocation serves.
    fn request_scope(&self) -> Result<Arc<RequestScope>, Error>;
}

impl RequestArgs for CallArgs {
    fn request_scope(&self) -> Result<Arc<RequestScope>, Error> {
        self.instance()
            .and_then(|instance| instance.downcast::<RequestScope>())
            .ok_or_else(|| Error::Internal("no request scope on this invocation".into()))
    }
}

/// Convert an async function into a handler operation.
pub fn handler<F, Fut>(
    f: F,
) -> FnOperation<impl Fn(CallArgs) -> Result<HandlerFuture, Error> + Send + Sync + Clone + 'static>
where
    F: Fn(CallArgs) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Result<serde_json::Value, Error>> + Send + 'static,
{
    FnOperation::new(move |args| Ok(Box::pin(f(args)) as HandlerFuture))
}

/// The set of method operations registered for one route.
#[derive(Clone, Default)]
pub struct Endpoint {
    get: Option<MethodOperation>,
    post: Option<MethodOperation>,
    put: Option<MethodOperation>,
    delete: Option<MethodOperation>,
}

impl Endpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<O, Args>(mut self, op: O) -> Self
    where
        O: IntoOperation<Args>,
        O::Operation: Operation<Output = HandlerFuture>,
    {
        self.get = Some(BoxedOperation::new(op.into_operation()));
        self
    }

    pub fn post<O, Args>(mut self, op: O) -> Self
    where
        O: IntoOperation<Args>,
        O::Operation: Operation<Output = HandlerFuture>,
    {
        self.post = Some(BoxedOperation::new(op.into_operation()));
        self
    }

    pub fn put<O, Args>(mut self, op: O) -> Self
    where
        O: IntoOperation<Args>,
        O::Operation: Operation<Output = HandlerFuture>,
    {
        self.put = Some(BoxedOperation::new(op.into_operation()));
        self
    }

    pub fn delete<O, Args>(mut self, op: O) -> Self
    where
        O: IntoOperation<Args>,
        O::Operation: Operation<Output = HandlerFuture>,
    {
        self.delete = Some(BoxedOperation::new(op.into_operation()));
        self
    }

    /// The operation for an HTTP method, if one was registered.
    pub fn operation(&self, method: &str) -> Option<&MethodOperation> {
        match method.to_ascii_uppercase().as_str() {
            "GET" => self.get.as_ref(),
            "POST" => self.post.as_ref(),
            "PUT" => self.put.as_ref(),
            "DELETE" => self.delete.as_ref(),
            _ => None,
        }
    }
}
