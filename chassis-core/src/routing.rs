// Routing: pattern compilation and request dispatch

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;

use crate::context::{CallArgs, InstanceContext};
use crate::endpoint::{Endpoint, RequestScope};
use crate::error::Error;
use crate::http::{HttpRequest, HttpResponse};
use crate::logging::{debug, error};
use crate::registry::Registry;
use crate::render::{JsonRenderer, RENDERER_BINDING};

/// CORS headers attached to every response, matching the permissive
/// defaults of the service family this crate bootstraps.
const ALLOW_ORIGIN: &str = "*";
const ALLOW_HEADERS: &str = "authorization, Authorization, Content-Type, Depth, User-Agent, \
     X-File-Size, X-Requested-With, X-Requested-By, If-Modified-Since, X-File-Name, Cache-Control";
const ALLOW_METHODS: &str = "PUT, DELETE, POST, GET, OPTIONS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamKind {
    Int,
    Str,
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Param { name: String, kind: ParamKind },
}

/// A compiled route pattern: either a path spec with typed parameters,
/// or a raw regular expression with named capture groups.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    kind: PatternKind,
}

#[derive(Debug, Clone)]
enum PatternKind {
    Path(Vec<Segment>),
    Regex(Regex),
}

impl RoutePattern {
    /// Compile a path spec. Segments are literals or typed parameters:
    /// `/users/<id:int>` captures digits, `/files/<name:str>` captures any
    /// non-empty segment.
    pub fn path(spec: &str) -> Result<Self, Error> {
        let mut segments = Vec::new();
        for part in spec.split('/').filter(|s| !s.is_empty()) {
            if let Some(inner) = part.strip_prefix('<').and_then(|p| p.strip_suffix('>')) {
                let (name, kind) = inner.split_once(':').ok_or_else(|| {
                    Error::InvalidRoute(format!("parameter must be <name:type>, got {part:?}"))
                })?;
                let kind = match kind {
                    "int" => ParamKind::Int,
                    "str" => ParamKind::Str,
                    other => {
                        return Err(Error::InvalidRoute(format!(
                            "unknown parameter type {other:?} in {spec:?}"
                        )));
                    }
                };
                segments.push(Segment::Param {
                    name: name.to_string(),
                    kind,
                });
            } else {
                segments.push(Segment::Literal(part.to_string()));
            }
        }
        Ok(RoutePattern {
            kind: PatternKind::Path(segments),
        })
    }

    /// Compile a regular-expression route. The pattern is anchored to the
    /// whole path; parameters come from named capture groups.
    pub fn regex(pattern: &str) -> Result<Self, Error> {
        let anchored = format!("^(?:{pattern})$");
        let regex = Regex::new(&anchored)
            .map_err(|e| Error::InvalidRoute(format!("bad route regex {pattern:?}: {e}")))?;
        Ok(RoutePattern {
            kind: PatternKind::Regex(regex),
        })
    }

    /// Match a request path, returning captured parameters on success.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        match &self.kind {
            PatternKind::Path(segments) => {
                let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
                if parts.len() != segments.len() {
                    return None;
                }

                let mut params = HashMap::new();
                for (segment, part) in segments.iter().zip(parts.iter()) {
                    match segment {
                        Segment::Literal(literal) => {
                            if literal != part {
                                return None;
                            }
                        }
                        Segment::Param { name, kind } => {
                            let ok = match kind {
                                ParamKind::Int => part.chars().all(|c| c.is_ascii_digit()),
                                ParamKind::Str => true,
                            };
                            if !ok || part.is_empty() {
                                return None;
                            }
                            params.insert(name.clone(), (*part).to_string());
                        }
                    }
                }
                Some(params)
            }
            PatternKind::Regex(regex) => {
                let captures = regex.captures(path)?;
                let mut params = HashMap::new();
                for name in regex.capture_names().flatten() {
                    if let Some(value) = captures.name(name) {
                        params.insert(name.to_string(), value.as_str().to_string());
                    }
                }
                Some(params)
            }
        }
    }
}

/// Route definition: a pattern plus the endpoint behind it
#[derive(Clone)]
pub struct Route {
    pub pattern: RoutePattern,
    pub endpoint: Endpoint,
}

/// Router for managing routes and dispatching requests
#[derive(Clone, Default)]
pub struct Router {
    prefix: Option<String>,
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// A router whose routes all live under a base URL prefix.
    pub fn with_prefix(prefix: Option<String>) -> Self {
        Self {
            prefix,
            routes: Vec::new(),
        }
    }

    /// Add a route with an already-compiled pattern.
    pub fn route(&mut self, pattern: RoutePattern, endpoint: Endpoint) {
        self.routes.push(Route { pattern, endpoint });
    }

    /// Add a route from a path spec.
    pub fn at(&mut self, spec: &str, endpoint: Endpoint) -> Result<(), Error> {
        self.route(RoutePattern::path(spec)?, endpoint);
        Ok(())
    }

    /// Add a route from a regular expression.
    pub fn at_regex(&mut self, pattern: &str, endpoint: Endpoint) -> Result<(), Error> {
        self.route(RoutePattern::regex(pattern)?, endpoint);
        Ok(())
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Dispatch a request: match a route, run its bound operation with a
    /// fresh per-request scope, and render the outcome. Every error is
    /// mapped onto a response here; the engine's own error taxonomy is
    /// never swallowed on the way through, only translated at this edge.
    pub async fn dispatch(&self, registry: &Registry, request: HttpRequest) -> HttpResponse {
        let mut request = request;
        let (path, query) = match request.path.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (request.path.clone(), None),
        };
        if let Some(query) = query {
            request.query_params = parse_query_string(&query);
        }

        let path = match &self.prefix {
            Some(prefix) => match path.strip_prefix(prefix.as_str()) {
                Some(rest) => rest.to_string(),
                None => {
                    return finish(error_response(registry, &Error::RouteNotFound(path)));
                }
            },
            None => path,
        };

        let matched = self
            .routes
            .iter()
            .find_map(|route| route.pattern.matches(&path).map(|params| (route, params)));

        let Some((route, params)) = matched else {
            debug!(path = %path, "no route matched");
            return finish(error_response(
                registry,
                &Error::RouteNotFound(format!("{} {}", request.method, path)),
            ));
        };

        // Preflight: any routed path answers OPTIONS with the CORS grant.
        if request.method.eq_ignore_ascii_case("OPTIONS") {
            return finish(HttpResponse::no_content());
        }

        let Some(op) = route.endpoint.operation(&request.method) else {
            return finish(error_response(
                registry,
                &Error::MethodNotAllowed(format!("{} {}", request.method, path)),
            ));
        };

        request.path_params = params;
        let scope = Arc::new(InstanceContext::new(RequestScope::new(request)));
        let args = CallArgs::with_instance(scope);

        let result = match op.invoke(args) {
            Ok(future) => future.await,
            Err(err) => Err(err),
        };

        let response = match result {
            Ok(data) => render_data(registry, &data),
            Err(err) => error_response(registry, &err),
        };
        finish(response)
    }
}

/// Render handler data through the injected renderer binding.
fn render_data(registry: &Registry, data: &serde_json::Value) -> HttpResponse {
    let renderer = match registry.resolve_as::<JsonRenderer>(RENDERER_BINDING, None) {
        Ok(renderer) => renderer,
        Err(err) => {
            error!(%err, "renderer binding unavailable");
            return HttpResponse::new(500);
        }
    };
    match renderer.render(data) {
        Ok(body) => HttpResponse::ok()
            .with_header("Content-Type", "application/json")
            .with_body(body),
        Err(err) => {
            error!(%err, "failed to render response data");
            HttpResponse::new(500)
        }
    }
}

/// Map an error onto a response, rendering its body when it has one.
pub(crate) fn error_response(registry: &Registry, err: &Error) -> HttpResponse {
    if err.is_server_error() {
        error!(%err, "request failed");
    } else {
        debug!(%err, "request rejected");
    }

    let mut response = HttpResponse::new(err.status_code());
    for (name, value) in err.headers() {
        response = response.with_header(name, value);
    }
    if let Some(body) = err.response_body() {
        match registry.resolve_as::<JsonRenderer>(RENDERER_BINDING, None) {
            Ok(renderer) => match renderer.render(&body) {
                Ok(bytes) => {
                    response = response
                        .with_header("Content-Type", "application/json")
                        .with_body(bytes);
                }
                Err(render_err) => error!(%render_err, "failed to render error body"),
            },
            Err(resolve_err) => error!(%resolve_err, "renderer binding unavailable"),
        }
    }
    response
}

fn finish(response: HttpResponse) -> HttpResponse {
    response
        .with_header("Access-Control-Allow-Origin", ALLOW_ORIGIN)
        .with_header("Access-Control-Allow-Headers", ALLOW_HEADERS)
        .with_header("Access-Control-Allow-Methods", ALLOW_METHODS)
}

/// Parse a query string into a map of parameters
fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|part| {
            let mut split = part.splitn(2, '=');
            let key = split.next()?;
            let value = split.next().unwrap_or("");
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{RequestArgs, handler};
    use crate::render;
    use serde_json::json;

    fn test_registry() -> Registry {
        let registry = Registry::new();
        render::register(&registry, false).unwrap();
        registry
    }

    #[test]
    fn test_path_pattern_static() {
        let pattern = RoutePattern::path("/users").unwrap();
        assert_eq!(pattern.matches("/users").unwrap().len(), 0);
        assert!(pattern.matches("/posts").is_none());
        // Trailing slash matches: empty segments are ignored.
        assert!(pattern.matches("/users/").is_some());
    }

    #[test]
    fn test_path_pattern_typed_params() {
        let pattern = RoutePattern::path("/users/<id:int>/posts/<slug:str>").unwrap();
        let params = pattern.matches("/users/123/posts/intro").unwrap();
        assert_eq!(params.get("id"), Some(&"123".to_string()));
        assert_eq!(params.get("slug"), Some(&"intro".to_string()));

        // Int parameters reject non-digits.
        assert!(pattern.matches("/users/abc/posts/intro").is_none());
        // Str parameters accept digits too.
        let pattern = RoutePattern::path("/files/<name:str>").unwrap();
        assert!(pattern.matches("/files/123").is_some());
    }

    #[test]
    fn test_path_pattern_rejects_bad_specs() {
        assert!(matches!(
            RoutePattern::path("/users/<id>").unwrap_err(),
            Error::InvalidRoute(_)
        ));
        assert!(matches!(
            RoutePattern::path("/users/<id:uuid>").unwrap_err(),
            Error::InvalidRoute(_)
        ));
    }

    #[test]
    fn test_regex_pattern() {
        let pattern = RoutePattern::regex(r"/archive/(?P<year>\d{4})/(?P<rest>.+)").unwrap();
        let params = pattern.matches("/archive/2017/audio/take1").unwrap();
        assert_eq!(params.get("year"), Some(&"2017".to_string()));
        assert_eq!(params.get("rest"), Some(&"audio/take1".to_string()));
        assert!(pattern.matches("/archive/17/x").is_none());

        assert!(matches!(
            RoutePattern::regex("(unclosed").unwrap_err(),
            Error::InvalidRoute(_)
        ));
    }

    #[test]
    fn test_parse_query_string() {
        let params = parse_query_string("name=john&age=30&flag");
        assert_eq!(params.get("name"), Some(&"john".to_string()));
        assert_eq!(params.get("age"), Some(&"30".to_string()));
        assert_eq!(params.get("flag"), Some(&"".to_string()));
    }

    #[tokio::test]
    async fn test_dispatch_matches_and_renders() {
        let registry = test_registry();
        let mut router = Router::new();
        router
            .at(
                "/users/<id:int>",
                Endpoint::new().get(handler(|args: CallArgs| async move {
                    let scope = args.request_scope()?;
                    Ok(json!({"id": scope.request.param("id")}))
                })),
            )
            .unwrap();

        let response = router
            .dispatch(&registry, HttpRequest::new("GET", "/users/42?verbose=1"))
            .await;
        assert_eq!(response.status, 200);
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["id"], "42");
        assert_eq!(response.header("Access-Control-Allow-Origin"), Some("*"));
    }

    #[tokio::test]
    async fn test_dispatch_unmatched_is_404() {
        let registry = test_registry();
        let router = Router::new();
        let response = router
            .dispatch(&registry, HttpRequest::new("GET", "/nowhere"))
            .await;
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn test_dispatch_missing_method_is_405() {
        let registry = test_registry();
        let mut router = Router::new();
        router
            .at(
                "/only-get",
                Endpoint::new().get(handler(|_args: CallArgs| async move { Ok(json!(null)) })),
            )
            .unwrap();

        let response = router
            .dispatch(&registry, HttpRequest::new("POST", "/only-get"))
            .await;
        assert_eq!(response.status, 405);
    }

    #[tokio::test]
    async fn test_dispatch_options_preflight() {
        let registry = test_registry();
        let mut router = Router::new();
        router
            .at(
                "/thing",
                Endpoint::new().get(handler(|_args: CallArgs| async move { Ok(json!(null)) })),
            )
            .unwrap();

        let response = router
            .dispatch(&registry, HttpRequest::new("OPTIONS", "/thing"))
            .await;
        assert_eq!(response.status, 204);
        assert_eq!(
            response.header("Access-Control-Allow-Methods"),
            Some(ALLOW_METHODS)
        );
    }

    #[tokio::test]
    async fn test_dispatch_prefix_stripping() {
        let registry = test_registry();
        let mut router = Router::with_prefix(Some("/api/v1".to_string()));
        router
            .at(
                "/ping",
                Endpoint::new().get(handler(|_args: CallArgs| async move { Ok(json!("pong")) })),
            )
            .unwrap();

        let hit = router
            .dispatch(&registry, HttpRequest::new("GET", "/api/v1/ping"))
            .await;
        assert_eq!(hit.status, 200);

        let miss = router
            .dispatch(&registry, HttpRequest::new("GET", "/ping"))
            .await;
        assert_eq!(miss.status, 404);
    }

    #[tokio::test]
    async fn test_dispatch_error_body_shape() {
        let registry = test_registry();
        let mut router = Router::new();
        router
            .at(
                "/teapot",
                Endpoint::new().get(handler(|_args: CallArgs| async move {
                    Err::<serde_json::Value, _>(Error::Conflict("already brewing".into()))
                })),
            )
            .unwrap();

        let response = router
            .dispatch(&registry, HttpRequest::new("GET", "/teapot"))
            .await;
        assert_eq!(response.status, 409);
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["result"], "failure");
        assert_eq!(body["reason"], "already brewing");
    }

    #[tokio::test]
    async fn test_dispatch_engine_errors_become_500_without_body() {
        let registry = test_registry();
        let mut router = Router::new();
        // The handler's binding was never registered: a configuration
        // error, surfaced as a 500 with no leaked detail.
        router
            .at(
                "/broken",
                Endpoint::new().get(
                    crate::bind::bind(&registry, "never_registered").wrap(handler(
                        |_args: CallArgs| async move { Ok(json!(null)) },
                    )),
                ),
            )
            .unwrap();

        let response = router
            .dispatch(&registry, HttpRequest::new("GET", "/broken"))
            .await;
        assert_eq!(response.status, 500);
        assert!(response.body.is_empty());
    }
}
