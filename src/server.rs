// Loopback Server Module
// Serves a session's routes over HTTP so unmodified clients can point their
// base URL at the mock. Every request goes through `MockSession::dispatch`.

use crate::errors::MockError;
use crate::openai::ErrorResponse;
use crate::router::{Dispatch, HandlerResponse};
use crate::session::MockSession;
use crate::stream::StreamHandle;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use futures::StreamExt;
use reqwest::Url;
use serde_json::Value;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Headers dropped in both directions when passing through: the hop-by-hop
/// set plus the framing headers the relayed body recomputes
const SKIPPED_HEADERS: [&str; 10] = [
    "connection",
    "content-length",
    "host",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut kept = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        if !SKIPPED_HEADERS.contains(&name.as_str()) {
            kept.append(name.clone(), value.clone());
        }
    }
    kept
}

struct ServerState {
    session: MockSession,
    upstream: Option<Url>,
    client: reqwest::Client,
}

/// Build the axum app serving `session`
pub fn router(session: MockSession) -> Result<Router, MockError> {
    let upstream = session
        .options()
        .passthrough_upstream
        .as_deref()
        .map(|raw| Url::parse(raw).map_err(|_| MockError::InvalidUrl(raw.to_string())))
        .transpose()?;

    let state = Arc::new(ServerState {
        session,
        upstream,
        client: reqwest::Client::new(),
    });

    Ok(Router::new()
        .fallback(handle)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state))
}

/// Serve `session` on `listener` until `shutdown` resolves
pub async fn serve_with_shutdown<S>(
    session: MockSession,
    listener: TcpListener,
    shutdown: S,
) -> Result<(), MockError>
where
    S: Future<Output = ()> + Send + 'static,
{
    let app = router(session)?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(MockError::Bind)
}

/// A running loopback server
#[derive(Debug)]
pub struct MockServer {
    base_url: String,
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<Result<(), MockError>>,
}

impl MockServer {
    /// `http://<addr>`; append `/v1` for OpenAI client base URLs
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for the server task to exit
    pub async fn shutdown(self) -> Result<(), MockError> {
        self.shutdown.cancel();
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(MockError::handler(format!("server task failed: {err}"))),
        }
    }
}

impl MockSession {
    /// Bind a loopback server for this session. Use port 0 for an ephemeral port.
    pub async fn serve(&self, addr: SocketAddr) -> Result<MockServer, MockError> {
        let listener = TcpListener::bind(addr).await.map_err(MockError::Bind)?;
        let local_addr = listener.local_addr().map_err(MockError::Bind)?;
        let shutdown = CancellationToken::new();

        let signal = shutdown.clone();
        let session = self.clone();
        let task = tokio::spawn(async move {
            serve_with_shutdown(session, listener, async move { signal.cancelled().await }).await
        });

        tracing::info!(%local_addr, "Mock server listening");
        Ok(MockServer {
            base_url: format!("http://{local_addr}"),
            local_addr,
            shutdown,
            task,
        })
    }
}

/// Request bodies are JSON when they parse, a string otherwise, null when empty
fn body_value(bytes: &Bytes) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

async fn handle(
    State(state): State<Arc<ServerState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let target = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());

    match state
        .session
        .dispatch(method.clone(), &target, body_value(&body))
        .await
    {
        Dispatch::Intercepted(response) => into_response(response),
        Dispatch::Passthrough => match &state.upstream {
            Some(upstream) => forward(&state.client, upstream, method, &target, headers, body).await,
            None => {
                let message = format!("No mock registered for {} {}", method, uri.path());
                error_response(StatusCode::NOT_FOUND, ErrorResponse::new(message))
            }
        },
    }
}

fn error_response(status: StatusCode, error: ErrorResponse) -> Response {
    (status, Json(error)).into_response()
}

fn into_response(response: HandlerResponse) -> Response {
    match response {
        HandlerResponse::Json { status, body } => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(body)).into_response()
        }
        HandlerResponse::Stream(handle) => sse_response(handle),
    }
}

fn sse_response(handle: StreamHandle) -> Response {
    let body = Body::from_stream(handle.into_sse().map(Ok::<_, Infallible>));
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}

/// Relay an unmatched request to the real upstream
async fn forward(
    client: &reqwest::Client,
    upstream: &Url,
    method: Method,
    target: &str,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let url = match upstream.join(target) {
        Ok(url) => url,
        Err(err) => {
            tracing::warn!(%target, error = %err, "Cannot build passthrough URL");
            return error_response(StatusCode::BAD_GATEWAY, ErrorResponse::new(err.to_string()));
        }
    };

    let request = client
        .request(method.clone(), url.clone())
        .headers(forwardable_headers(&headers))
        .body(body);

    tracing::debug!(%method, %url, "Passing request through");
    let upstream_response = match request.send().await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(%url, error = %err, "Passthrough request failed");
            return error_response(StatusCode::BAD_GATEWAY, ErrorResponse::new(err.to_string()));
        }
    };

    let status = upstream_response.status();
    let response_headers = forwardable_headers(upstream_response.headers());
    let mut response = Response::new(Body::from_stream(upstream_response.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_body_value() {
        assert_eq!(body_value(&Bytes::new()), Value::Null);
        assert_eq!(
            body_value(&Bytes::from_static(br#"{"a":1}"#)),
            json!({"a": 1})
        );
        assert_eq!(
            body_value(&Bytes::from_static(b"not json")),
            Value::String("not json".into())
        );
    }

    #[test]
    fn test_forwardable_headers_drop_hop_by_hop() {
        let mut headers = HeaderMap::new();
        for name in [
            "transfer-encoding",
            "keep-alive",
            "upgrade",
            "te",
            "trailer",
            "connection",
            "host",
            "content-length",
        ] {
            headers.insert(
                header::HeaderName::from_static(name),
                HeaderValue::from_static("x"),
            );
        }
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer sk-test"));
        headers.append("x-trace", HeaderValue::from_static("a"));
        headers.append("x-trace", HeaderValue::from_static("b"));

        let kept = forwardable_headers(&headers);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[header::AUTHORIZATION], "Bearer sk-test");
        assert_eq!(kept.get_all("x-trace").iter().count(), 2);
    }

    #[test]
    fn test_non_standard_status_falls_back_to_500() {
        let response = into_response(HandlerResponse::Json {
            status: 42,
            body: Value::Null,
        });
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = into_response(HandlerResponse::Json {
            status: 418,
            body: json!({}),
        });
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    }
}
