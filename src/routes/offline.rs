use actix_web::http::{header, StatusCode};
use actix_web::{web, HttpRequest, HttpResponse};
use bytes::Bytes;
use std::time::Duration;

use crate::models::ErrorResponse;

/// Body of the 503 returned for uncached pages while offline
pub const OFFLINE_PAGE: &str = "Offline - Content not available";

/// A successful upstream GET kept for offline use
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Shared state of the offline proxy
#[derive(Clone)]
pub struct OfflineState {
    upstream: String,
    client: reqwest::Client,
    cache: moka::future::Cache<String, CachedResponse>,
}

impl OfflineState {
    pub fn new(upstream: impl Into<String>, cache_size: u64, cache_ttl: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            upstream: upstream.into().trim_end_matches('/').to_string(),
            client,
            cache: moka::future::Cache::builder()
                .max_capacity(cache_size)
                .time_to_live(cache_ttl)
                .build(),
        })
    }

    pub async fn cached(&self, key: &str) -> Option<CachedResponse> {
        self.cache.get(key).await
    }

    pub async fn remember(&self, key: impl Into<String>, response: CachedResponse) {
        self.cache.insert(key.into(), response).await;
    }
}

/// Route every request through the proxy
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.default_service(web::to(proxy));
}

/// Path plus query, the cache key and upstream suffix of a request
fn request_key(req: &HttpRequest) -> String {
    req.uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.path().to_string())
}

fn is_api_path(path: &str) -> bool {
    path == "/api" || path.starts_with("/api/")
}

async fn proxy(state: web::Data<OfflineState>, req: HttpRequest, body: web::Bytes) -> HttpResponse {
    let key = request_key(&req);

    if req.method() != actix_web::http::Method::GET {
        return match forward(&state, &req, &key, body).await {
            Ok(upstream) => relay(upstream).await,
            Err(e) => {
                tracing::warn!("{} {} failed: {}", req.method(), key, e);
                HttpResponse::BadGateway().body(e.to_string())
            }
        };
    }

    // API responses are never cached
    if is_api_path(req.path()) {
        return match forward(&state, &req, &key, body).await {
            Ok(upstream) => relay(upstream).await,
            Err(e) => {
                tracing::debug!("API request {} failed while offline: {}", key, e);
                offline_api()
            }
        };
    }

    match forward(&state, &req, &key, body).await {
        Ok(upstream) if upstream.status().is_success() => {
            let status = upstream.status().as_u16();
            let content_type = content_type_of(&upstream);
            match upstream.bytes().await {
                Ok(bytes) => {
                    let cached = CachedResponse { content_type, body: bytes };
                    state.remember(key.clone(), cached.clone()).await;
                    respond(status, &cached)
                }
                Err(e) => from_cache(&state, &key, e).await,
            }
        }
        Ok(upstream) => relay(upstream).await,
        Err(e) => from_cache(&state, &key, e).await,
    }
}

async fn forward(
    state: &OfflineState,
    req: &HttpRequest,
    key: &str,
    body: web::Bytes,
) -> Result<reqwest::Response, reqwest::Error> {
    let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes()).unwrap_or(reqwest::Method::GET);
    let mut builder = state
        .client
        .request(method, format!("{}{}", state.upstream, key));

    if let Some(ct) = req.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        builder = builder.header(reqwest::header::CONTENT_TYPE, ct);
    }
    if !body.is_empty() {
        builder = builder.body(body.to_vec());
    }

    builder.send().await
}

fn content_type_of(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Pass an upstream response through unchanged
async fn relay(upstream: reqwest::Response) -> HttpResponse {
    let status = upstream.status().as_u16();
    let content_type = content_type_of(&upstream);
    match upstream.bytes().await {
        Ok(body) => respond(status, &CachedResponse { content_type, body }),
        Err(e) => {
            tracing::warn!("Failed to read upstream body: {}", e);
            offline_api()
        }
    }
}

fn respond(status: u16, response: &CachedResponse) -> HttpResponse {
    let mut builder = HttpResponse::build(StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY));
    if let Some(ct) = &response.content_type {
        builder.insert_header((header::CONTENT_TYPE, ct.as_str()));
    }
    builder.body(response.body.clone())
}

async fn from_cache(state: &OfflineState, key: &str, err: reqwest::Error) -> HttpResponse {
    match state.cached(key).await {
        Some(cached) => {
            tracing::debug!("Serving {} from offline cache ({})", key, err);
            respond(200, &cached)
        }
        None => {
            tracing::debug!("{} unavailable offline: {}", key, err);
            HttpResponse::ServiceUnavailable()
                .content_type("text/plain")
                .body(OFFLINE_PAGE)
        }
    }
}

fn offline_api() -> HttpResponse {
    HttpResponse::ServiceUnavailable().json(ErrorResponse {
        error: "Offline".to_string(),
    })
}
