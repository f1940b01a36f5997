//! Basic-authentication credential extraction.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::endpoint::RequestScope;
use crate::error::Error;
use crate::producer::Producer;
use crate::registry::Registry;

/// Binding name for the extracted credentials.
pub const BASIC_AUTH_BINDING: &str = "basic_auth";

/// Credentials carried in an `Authorization: Basic` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Register the `basic_auth` binding: resolves to `Option<Credentials>`,
/// `None` whenever the header is missing or malformed.
pub fn register(registry: &Registry) -> Result<(), Error> {
    registry.register(
        BASIC_AUTH_BINDING,
        Producer::dynamic_bound(|instance| {
            let scope = instance.downcast::<RequestScope>().ok_or_else(|| {
                Error::Internal("basic_auth binding requires a request scope".into())
            })?;
            Ok(parse_header(scope.request.header("Authorization")))
        }),
    )?;
    Ok(())
}

/// Extract credentials from an Authorization header value. Anything
/// malformed (wrong scheme, bad base64, bad UTF-8, missing colon) yields
/// `None` rather than an error; deciding what missing credentials mean is
/// the handler's business.
pub fn parse_header(header: Option<&str>) -> Option<Credentials> {
    let header = header?;
    let (_, encoded) = header.split_once("Basic ")?;
    let decoded = BASE64.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some(Credentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CallArgs, InstanceContext};
    use crate::http::HttpRequest;
    use std::sync::Arc;

    fn encode(user_pass: &str) -> String {
        format!("Basic {}", BASE64.encode(user_pass))
    }

    #[test]
    fn test_parse_valid_header() {
        let creds = parse_header(Some(&encode("alice:s3cret"))).unwrap();
        assert_eq!(creds.username, "alice");
        assert_eq!(creds.password, "s3cret");
    }

    #[test]
    fn test_password_may_contain_colons() {
        let creds = parse_header(Some(&encode("alice:a:b:c"))).unwrap();
        assert_eq!(creds.password, "a:b:c");
    }

    #[test]
    fn test_malformed_headers_yield_none() {
        assert!(parse_header(None).is_none());
        assert!(parse_header(Some("Bearer token")).is_none());
        assert!(parse_header(Some("Basic !!!not-base64!!!")).is_none());
        // Valid base64, but no colon separator.
        assert!(parse_header(Some(&encode("no-separator"))).is_none());
        // Valid base64, invalid UTF-8 inside.
        let bad_utf8 = format!("Basic {}", BASE64.encode([0xff, 0xfe, 0x3a, 0x20]));
        assert!(parse_header(Some(&bad_utf8)).is_none());
    }

    #[test]
    fn test_registered_producer_reads_the_request() {
        let registry = Registry::new();
        register(&registry).unwrap();

        let request =
            HttpRequest::new("GET", "/whoami").with_header("Authorization", encode("bob:pw"));
        let scope = Arc::new(InstanceContext::new(RequestScope::new(request)));
        let args = CallArgs::with_instance(scope);

        let creds = registry
            .resolve_as::<Option<Credentials>>(BASIC_AUTH_BINDING, args.instance_context())
            .unwrap();
        assert_eq!((*creds).as_ref().unwrap().username, "bob");

        // Without an instance the producer cannot run.
        assert!(matches!(
            registry.resolve(BASIC_AUTH_BINDING, None).unwrap_err(),
            Error::BindingMismatch(_)
        ));
    }
}
