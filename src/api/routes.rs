use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::models::{ScrapeRequest, ScrapeResponse};
use crate::api::response;
use crate::error::{AppError, Result};
use crate::scraper::scrape_comps;
use crate::AppState;

pub const INDEX_BODY: &str = "✅ CMA API is running!";

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/scrape", post(scrape_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(app_state)
}

async fn index() -> &'static str {
    INDEX_BODY
}

async fn scrape_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let req = parse_request(&headers, &body)?;
    let query = req.validate()?;

    let launcher = state.launcher.clone();
    let settings = state.config.scrape.clone();
    let search = query.clone();
    let start_time = std::time::Instant::now();

    let result = tokio::task::spawn_blocking(move || scrape_comps(launcher.as_ref(), &settings, &search))
        .await
        .map_err(AppError::from)
        .and_then(|scraped| scraped);

    let comps = match result {
        Ok(comps) => comps,
        Err(err) => {
            tracing::error!(error = %err, elapsed = ?start_time.elapsed(), "❌ Scraping failed");
            return Err(err);
        }
    };

    tracing::info!(count = comps.len(), elapsed = ?start_time.elapsed(), "Scrape finished");
    Ok(response::success(ScrapeResponse::new(req, &query.zip, comps)))
}

/// Reads the request body the way a lenient JSON body parser would: a
/// missing body or non-JSON content type yields an empty request, which then
/// fails validation.
fn parse_request(headers: &HeaderMap, body: &[u8]) -> Result<ScrapeRequest> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim_start().to_ascii_lowercase().starts_with("application/json"));

    if !is_json || body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ScrapeRequest::default());
    }

    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| AppError::MalformedBody(e.to_string()))?;
    match value {
        serde_json::Value::Object(_) => {
            serde_json::from_value(value).map_err(|e| AppError::MalformedBody(e.to_string()))
        }
        serde_json::Value::Array(_) => Ok(ScrapeRequest::default()),
        _ => Err(AppError::MalformedBody("body must be a JSON object".to_string())),
    }
}
