//! Route registry and interception boundary.
//!
//! Registrations map an HTTP method and an exact path to a [`RouteHandler`].
//! [`RouteRegistry::dispatch`] decides whether a request is intercepted and, if
//! so, runs the handler. Handler failures never escape: an `Err` or a panic is
//! turned into a `500` carrying the standard error envelope.

use crate::errors::MockError;
use crate::openai::ErrorResponse;
use crate::stream::StreamHandle;
use async_trait::async_trait;
use axum::http::Method;
use futures::FutureExt;
use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};

/// Origin of the real API whose traffic is emulated
pub const DEFAULT_ORIGIN: &str = "https://api.openai.com";

/// An intercepted request as seen by a handler
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub method: Method,
    /// Path plus query string, as the client sent it
    pub uri: String,
    /// Path used for route matching
    pub path: String,
    pub body: Value,
}

impl MockRequest {
    pub fn new(method: Method, uri: impl Into<String>, body: Value) -> Self {
        let uri = uri.into();
        let path = uri.split('?').next().unwrap_or_default().to_string();
        Self {
            method,
            uri,
            path,
            body,
        }
    }
}

/// What a handler produced
#[derive(Debug)]
pub enum HandlerResponse {
    Json { status: u16, body: Value },
    Stream(StreamHandle),
}

impl HandlerResponse {
    pub fn json(status: u16, body: impl Serialize) -> Result<Self, MockError> {
        Ok(HandlerResponse::Json {
            status,
            body: serde_json::to_value(body)?,
        })
    }

    pub fn error(status: u16, error: &ErrorResponse) -> Self {
        HandlerResponse::Json {
            status,
            body: error.to_value(),
        }
    }

    pub fn internal_error() -> Self {
        Self::error(500, &ErrorResponse::internal())
    }

    pub fn status(&self) -> u16 {
        match self {
            HandlerResponse::Json { status, .. } => *status,
            HandlerResponse::Stream(_) => 200,
        }
    }

    /// The JSON body, if this is not a stream
    pub fn body(&self) -> Option<&Value> {
        match self {
            HandlerResponse::Json { body, .. } => Some(body),
            HandlerResponse::Stream(_) => None,
        }
    }

    pub fn into_stream(self) -> Option<StreamHandle> {
        match self {
            HandlerResponse::Stream(handle) => Some(handle),
            HandlerResponse::Json { .. } => None,
        }
    }
}

/// Outcome of offering a request to the registry
#[derive(Debug)]
pub enum Dispatch {
    Intercepted(HandlerResponse),
    /// No registration matched; the request belongs to the real network
    Passthrough,
}

impl Dispatch {
    pub fn intercepted(self) -> Option<HandlerResponse> {
        match self {
            Dispatch::Intercepted(response) => Some(response),
            Dispatch::Passthrough => None,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, Dispatch::Passthrough)
    }
}

#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn handle(&self, request: MockRequest) -> Result<HandlerResponse, MockError>;
}

/// Adapts a user closure `(uri, body) -> (status, body)` into a handler
pub struct CustomEndpoint<F> {
    handler: F,
}

impl<F> CustomEndpoint<F> {
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<F, Fut> RouteHandler for CustomEndpoint<F>
where
    F: Fn(String, Value) -> Fut + Send + Sync,
    Fut: Future<Output = (u16, Value)> + Send,
{
    async fn handle(&self, request: MockRequest) -> Result<HandlerResponse, MockError> {
        let (status, body) = (self.handler)(request.uri, request.body).await;
        Ok(HandlerResponse::Json { status, body })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    BuiltIn,
    Custom,
}

/// One method + path registration
#[derive(Clone)]
pub struct RouteRegistration {
    pub method: Method,
    pub path: String,
    pub handler: Arc<dyn RouteHandler>,
    /// One-shot registrations are removed after their first match
    pub persistent: bool,
    pub kind: RouteKind,
}

impl RouteRegistration {
    fn matches(&self, method: &Method, path: &str) -> bool {
        self.method == *method && self.path == path
    }
}

impl fmt::Debug for RouteRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteRegistration")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("persistent", &self.persistent)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Parse a method name case-insensitively
pub fn parse_method(method: &str) -> Result<Method, MockError> {
    Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| MockError::InvalidMethod(method.to_string()))
}

/// Ordered registration table bound to one origin
pub struct RouteRegistry {
    origin: Url,
    routes: RwLock<Vec<RouteRegistration>>,
    log_requests: bool,
}

impl RouteRegistry {
    pub fn new(origin: &str, log_requests: bool) -> Result<Self, MockError> {
        let origin = Url::parse(origin).map_err(|_| MockError::InvalidUrl(origin.to_string()))?;
        Ok(Self {
            origin,
            routes: RwLock::new(Vec::new()),
            log_requests,
        })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn register(
        &self,
        method: Method,
        path: &str,
        handler: Arc<dyn RouteHandler>,
        persistent: bool,
        kind: RouteKind,
    ) -> Result<(), MockError> {
        if !path.starts_with('/') {
            return Err(MockError::InvalidPath(path.to_string()));
        }
        tracing::debug!(%method, path, persistent, ?kind, "Registering route");
        self.write().push(RouteRegistration {
            method,
            path: path.to_string(),
            handler,
            persistent,
            kind,
        });
        Ok(())
    }

    /// Snapshot of the registrations in registration order
    pub fn routes(&self) -> Vec<RouteRegistration> {
        self.read().clone()
    }

    pub fn custom_routes(&self) -> Vec<RouteRegistration> {
        self.read()
            .iter()
            .filter(|r| r.kind == RouteKind::Custom)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Remove every registration, returning how many were dropped
    pub fn clear(&self) -> usize {
        let mut routes = self.write();
        let removed = routes.len();
        routes.clear();
        removed
    }

    /// Offer a request to the registry. `target` is either a path (with an
    /// optional query) or an absolute URL; URLs on another origin pass through.
    pub async fn dispatch(&self, method: &Method, target: &str, body: Value) -> Dispatch {
        let Some(uri) = self.local_uri(target) else {
            return Dispatch::Passthrough;
        };
        let request = MockRequest::new(method.clone(), uri, body);

        let Some(handler) = self.take_handler(&request.method, &request.path) else {
            tracing::debug!(method = %request.method, path = %request.path, "No route matched, passing through");
            return Dispatch::Passthrough;
        };

        if self.log_requests {
            tracing::info!(
                method = %request.method,
                uri = %request.uri,
                body = %request.body,
                "Intercepted request"
            );
        }

        let method = request.method.clone();
        let path = request.path.clone();
        let response = match AssertUnwindSafe(handler.handle(request))
            .catch_unwind()
            .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                tracing::error!(%method, %path, error = %err, "Mock handler failed");
                HandlerResponse::internal_error()
            }
            Err(_) => {
                tracing::error!(%method, %path, "Mock handler panicked");
                HandlerResponse::internal_error()
            }
        };
        Dispatch::Intercepted(response)
    }

    /// Resolve `target` to a path+query on this registry's origin
    fn local_uri(&self, target: &str) -> Option<String> {
        if target.starts_with('/') {
            return Some(target.to_string());
        }
        let url = Url::parse(target).ok()?;
        if url.origin() != self.origin.origin() {
            return None;
        }
        Some(match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        })
    }

    /// Find the most recent matching registration, consuming it if one-shot
    fn take_handler(&self, method: &Method, path: &str) -> Option<Arc<dyn RouteHandler>> {
        let mut routes = self.write();
        let index = routes.iter().rposition(|r| r.matches(method, path))?;
        if routes[index].persistent {
            Some(routes[index].handler.clone())
        } else {
            Some(routes.remove(index).handler)
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<RouteRegistration>> {
        self.routes.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<RouteRegistration>> {
        self.routes.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for RouteRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteRegistry")
            .field("origin", &self.origin.as_str())
            .field("routes", &*self.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Failing;

    #[async_trait]
    impl RouteHandler for Failing {
        async fn handle(&self, _request: MockRequest) -> Result<HandlerResponse, MockError> {
            Err(MockError::handler("boom"))
        }
    }

    struct Panicking;

    #[async_trait]
    impl RouteHandler for Panicking {
        async fn handle(&self, _request: MockRequest) -> Result<HandlerResponse, MockError> {
            panic!("handler exploded");
        }
    }

    fn echo(status: u16) -> Arc<dyn RouteHandler> {
        Arc::new(CustomEndpoint::new(move |uri: String, body: Value| async move {
            (status, json!({"uri": uri, "body": body}))
        }))
    }

    fn registry() -> RouteRegistry {
        RouteRegistry::new(DEFAULT_ORIGIN, false).unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_matches_method_and_path() {
        let registry = registry();
        registry
            .register(Method::POST, "/v1/echo", echo(201), true, RouteKind::Custom)
            .unwrap();

        let response = registry
            .dispatch(&Method::POST, "/v1/echo?x=1", json!({"a": 1}))
            .await
            .intercepted()
            .unwrap();
        assert_eq!(response.status(), 201);
        assert_eq!(response.body().unwrap()["uri"], "/v1/echo?x=1");
        assert_eq!(response.body().unwrap()["body"]["a"], 1);

        assert!(registry
            .dispatch(&Method::GET, "/v1/echo", Value::Null)
            .await
            .is_passthrough());
        assert!(registry
            .dispatch(&Method::POST, "/v1/other", Value::Null)
            .await
            .is_passthrough());
    }

    #[tokio::test]
    async fn test_dispatch_by_origin() {
        let registry = registry();
        registry
            .register(Method::POST, "/v1/echo", echo(200), true, RouteKind::Custom)
            .unwrap();

        let on_origin = registry
            .dispatch(&Method::POST, "https://api.openai.com/v1/echo", Value::Null)
            .await;
        assert!(!on_origin.is_passthrough());

        let elsewhere = registry
            .dispatch(&Method::POST, "https://example.com/v1/echo", Value::Null)
            .await;
        assert!(elsewhere.is_passthrough());
    }

    #[tokio::test]
    async fn test_latest_registration_wins() {
        let registry = registry();
        registry
            .register(Method::POST, "/v1/x", echo(200), true, RouteKind::BuiltIn)
            .unwrap();
        registry
            .register(Method::POST, "/v1/x", echo(202), true, RouteKind::Custom)
            .unwrap();
        let response = registry
            .dispatch(&Method::POST, "/v1/x", Value::Null)
            .await
            .intercepted()
            .unwrap();
        assert_eq!(response.status(), 202);
    }

    #[tokio::test]
    async fn test_one_shot_registration() {
        let registry = registry();
        registry
            .register(Method::GET, "/v1/once", echo(200), false, RouteKind::Custom)
            .unwrap();
        assert!(!registry
            .dispatch(&Method::GET, "/v1/once", Value::Null)
            .await
            .is_passthrough());
        assert!(registry
            .dispatch(&Method::GET, "/v1/once", Value::Null)
            .await
            .is_passthrough());
    }

    #[tokio::test]
    async fn test_handler_errors_become_500() {
        let registry = registry();
        registry
            .register(Method::POST, "/err", Arc::new(Failing), true, RouteKind::Custom)
            .unwrap();
        registry
            .register(Method::POST, "/panic", Arc::new(Panicking), true, RouteKind::Custom)
            .unwrap();

        for path in ["/err", "/panic"] {
            let response = registry
                .dispatch(&Method::POST, path, Value::Null)
                .await
                .intercepted()
                .unwrap();
            assert_eq!(response.status(), 500);
            assert_eq!(
                response.body().unwrap(),
                &json!({"error": {"message": "Internal server error in mock"}})
            );
        }

        // the registry keeps serving after a panic
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let registry = registry();
        registry
            .register(Method::POST, "/a", echo(200), true, RouteKind::BuiltIn)
            .unwrap();
        registry
            .register(Method::POST, "/b", echo(200), true, RouteKind::Custom)
            .unwrap();
        assert_eq!(registry.custom_routes().len(), 1);
        assert_eq!(registry.clear(), 2);
        assert!(registry.is_empty());
        assert!(registry
            .dispatch(&Method::POST, "/a", Value::Null)
            .await
            .is_passthrough());
    }

    #[test]
    fn test_register_rejects_relative_path() {
        let err = registry()
            .register(Method::POST, "v1/x", echo(200), true, RouteKind::Custom)
            .unwrap_err();
        assert!(matches!(err, MockError::InvalidPath(_)));
    }

    #[test]
    fn test_parse_method_is_case_insensitive() {
        assert_eq!(parse_method("post").unwrap(), Method::POST);
        assert_eq!(parse_method("Get").unwrap(), Method::GET);
        assert!(parse_method("not a method").is_err());
    }
}
