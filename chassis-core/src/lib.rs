// Core library for the Chassis framework
// Named-value injection registry, binding decorators, scoped overrides,
// and the HTTP glue that consumes them

pub mod application;
pub mod bind;
pub mod context;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod logging;
pub mod producer;
pub mod providers;
pub mod registry;
pub mod render;
pub mod routing;
pub mod scope;
pub mod status;

// Re-export commonly used types
pub use application::{Application, ServerConfig};
pub use bind::{Bind, Bound, BoxedOperation, FnOperation, IntoOperation, Operation, bind};
pub use context::{CallArgs, InstanceContext, Resolved};
pub use endpoint::{Endpoint, HandlerFuture, RequestArgs, RequestScope, handler};
pub use error::Error;
pub use http::{HttpRequest, HttpResponse};
pub use producer::Producer;
pub use registry::Registry;
pub use render::JsonRenderer;
pub use routing::{Route, RoutePattern, Router};
pub use scope::{Override, with_override};
pub use status::HttpStatus;
