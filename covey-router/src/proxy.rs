//! Reverse proxy and status handlers

use crate::pool::{Endpoint, EndpointPool};
use axum::{
    Json,
    body::Body,
    extract::{Request, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// Largest request body buffered for proxying
const MAX_PROXY_BODY: usize = 10 * 1024 * 1024;

/// Fallback handler: proxy the request to the next healthy frontend
pub async fn proxy(State(pool): State<Arc<EndpointPool>>, request: Request) -> Response {
    let Some(endpoint) = pool.next_healthy() else {
        tracing::warn!("No healthy frontends available");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "Service Unavailable - No healthy frontends",
        )
            .into_response();
    };

    match relay(&pool, &endpoint, request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("Proxy to {} failed: {}", endpoint.url, e);
            (StatusCode::BAD_GATEWAY, "Bad Gateway").into_response()
        }
    }
}

async fn relay(
    pool: &EndpointPool,
    endpoint: &Endpoint,
    request: Request,
) -> anyhow::Result<Response> {
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let target = format!("{}{}", endpoint.url, path_and_query);

    tracing::debug!("Proxying {} {} to {}", request.method(), path_and_query, endpoint.url);

    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, MAX_PROXY_BODY).await?;

    // Rewrite the host; the original one travels in X-Forwarded-Host
    let original_host = parts.headers.get(header::HOST).cloned();
    let mut headers = parts.headers;
    headers.remove(header::HOST);
    if let Some(host) = original_host {
        headers.insert("x-forwarded-host", host);
    }

    let upstream = pool
        .client()
        .request(parts.method, target)
        .headers(headers)
        .body(body.to_vec())
        .timeout(pool.config().proxy_timeout)
        .send()
        .await?;

    let status = upstream.status();
    let upstream_headers = upstream.headers().clone();
    let bytes = upstream.bytes().await?;

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    for (name, value) in upstream_headers.iter() {
        if name == header::TRANSFER_ENCODING
            || name == header::CONNECTION
            || name == header::CONTENT_LENGTH
        {
            continue;
        }
        response.headers_mut().insert(name.clone(), value.clone());
    }

    Ok(response)
}

/// GET /router/status - pool totals and per-endpoint detail
pub async fn status(State(pool): State<Arc<EndpointPool>>) -> Json<serde_json::Value> {
    Json(pool.status())
}

/// GET /router/health - liveness probe for the router itself
pub async fn health() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;
    use axum::{Router, routing::get};
    use tower::util::ServiceExt;

    fn router_app(pool: Arc<EndpointPool>) -> Router {
        Router::new()
            .route("/router/status", get(status))
            .route("/router/health", get(health))
            .fallback(proxy)
            .with_state(pool)
    }

    #[tokio::test]
    async fn test_proxy_with_no_healthy_frontends_is_503() {
        let pool = EndpointPool::new(RouterConfig::default()).unwrap();
        let app = router_app(pool);

        let response = app
            .oneshot(Request::builder().uri("/anything").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_proxy_relays_and_rewrites_host() {
        // Upstream that echoes the forwarded-host header it saw
        let upstream = Router::new().fallback(|request: Request| async move {
            let forwarded = request
                .headers()
                .get("x-forwarded-host")
                .map(|v| v.to_str().unwrap().to_string())
                .unwrap_or_default();
            format!("{} {} fwd={}", request.method(), request.uri().path(), forwarded)
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, upstream).await.unwrap() });

        let pool = EndpointPool::new(RouterConfig::default()).unwrap();
        pool.inject_url("frontend-1", &format!("http://{}", addr), true);
        let app = router_app(pool);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/app/page?q=1")
                    .header(header::HOST, "edge.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(body.contains("GET /app/page"));
        assert!(body.contains("fwd=edge.example.com"));
    }

    #[tokio::test]
    async fn test_router_endpoints() {
        let pool = EndpointPool::new(RouterConfig::default()).unwrap();
        let app = router_app(pool);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/router/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/router/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let status: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(status["total"], 0);
        assert_eq!(status["healthy"], 0);
    }
}
