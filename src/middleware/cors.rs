use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE, ETAG},
    HeaderName, HeaderValue, Method,
};
use tower_http::cors::{Any, CorsLayer};

use crate::{config::AppConfig, middleware::request_id::REQUEST_ID_HEADER};

pub fn build_cors_layer(config: &AppConfig) -> CorsLayer {
    let mut headers = vec![
        ACCEPT,
        AUTHORIZATION,
        CONTENT_TYPE,
        HeaderName::from_static(REQUEST_ID_HEADER),
    ];
    if config.auth_dev_overrides_enabled() {
        headers.push(HeaderName::from_static("x-account-id"));
    }

    // Browsers hide these from download code unless exposed explicitly.
    let exposed = vec![
        CONTENT_DISPOSITION,
        ETAG,
        HeaderName::from_static(REQUEST_ID_HEADER),
        HeaderName::from_static("x-report-id"),
        HeaderName::from_static("x-skipped-properties"),
    ];

    let mut layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(headers)
        .expose_headers(exposed);

    if config
        .cors_origins
        .iter()
        .any(|origin| origin.trim() == "*")
    {
        layer = layer.allow_origin(Any).allow_credentials(false);
    } else {
        let origins = config
            .cors_origins
            .iter()
            .filter_map(|origin| origin.trim().parse::<HeaderValue>().ok())
            .collect::<Vec<_>>();
        layer = layer.allow_origin(origins).allow_credentials(true);
    }

    layer
}
