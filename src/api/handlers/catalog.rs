//! Catalog relay endpoint

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

use crate::api::server::AppState;
use crate::error::RelayError;

/// Characters left unescaped in catalog query parameters
const CATALOG_QUERY: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'(')
    .remove(b')')
    .remove(b'|');

/// Query parameters for the catalog endpoint
#[derive(Debug, Deserialize, Default)]
pub struct CatalogQuery {
    pub q: Option<String>,
    pub inav: Option<String>,
}

/// Build the upstream catalog URL for a search query and navigation filter
pub fn build_catalog_url(base: &str, q: &str, inav: &str) -> String {
    format!(
        "{}?count=true&q={}&inav={}",
        base,
        utf8_percent_encode(q, CATALOG_QUERY),
        utf8_percent_encode(inav, CATALOG_QUERY)
    )
}

/// Relay a catalog search to the upstream marketplace
pub async fn proxy_catalog(
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> Result<impl IntoResponse, RelayError> {
    let q = query
        .q
        .ok_or_else(|| RelayError::InvalidRequest("missing query parameter: q".into()))?;
    let inav = query
        .inav
        .ok_or_else(|| RelayError::InvalidRequest("missing query parameter: inav".into()))?;

    let url = build_catalog_url(&state.upstream_url, &q, &inav);
    let request_id = Uuid::new_v4();
    debug!(%request_id, "Relaying catalog request to {}", url);

    let result = state
        .executor
        .execute(&url)
        .instrument(info_span!("catalog", %request_id))
        .await;

    let body = result.into_body()?;
    let data: Value = serde_json::from_slice(&body)
        .map_err(|e| RelayError::InvalidResponseBody(e.to_string()))?;

    Ok(Json(data))
}
