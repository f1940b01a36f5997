//! Built-in binding producers for the HTTP glue layer.
//!
//! Both producers are Dynamic and instance-bound: they read the request
//! out of the per-request scope on every resolution.

pub mod basic_auth;
pub mod payload;
