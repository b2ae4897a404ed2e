use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, ETAG},
        HeaderMap, HeaderValue, Response, StatusCode,
    },
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    auth::require_account_id,
    error::{AppError, AppResult},
    schemas::{
        validate_input, GenerateScheduleEBatchInput, GenerateScheduleEInput, PropertyPath,
        ReportPath, ReportSummary, ScheduleEPreviewQuery,
    },
    services::{
        report_store::ReportFileType,
        tax_aggregation::{PropertyYearAggregate, TaxYear},
        tax_reports::{GeneratedArtifact, TaxReportService},
    },
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/tax-reports", axum::routing::get(list_reports))
        .route(
            "/tax-reports/schedule-e",
            axum::routing::post(generate_schedule_e),
        )
        .route(
            "/tax-reports/schedule-e/batch",
            axum::routing::post(generate_schedule_e_batch),
        )
        .route(
            "/tax-reports/schedule-e/{property_id}",
            axum::routing::get(preview_schedule_e),
        )
        .route(
            "/tax-reports/{report_id}",
            axum::routing::get(download_report).delete(delete_report),
        )
        .route(
            "/tax-reports/{report_id}/summary",
            axum::routing::get(report_summary),
        )
}

async fn preview_schedule_e(
    State(state): State<AppState>,
    Path(path): Path<PropertyPath>,
    Query(query): Query<ScheduleEPreviewQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let account_id = require_account_id(&state, &headers).await?;
    let year = TaxYear::current(query.year)?;
    let service = tax_reports(&state)?;

    let cache_key = format!("{account_id}:{}:{}", path.property_id, year.value());
    if let Some(cached) = state.preview_cache.get(&cache_key).await {
        return Ok(Json(cached));
    }

    let totals = service.preview(account_id, path.property_id, year).await?;
    let payload = preview_payload(&totals);
    state.preview_cache.insert(cache_key, payload.clone()).await;
    Ok(Json(payload))
}

async fn generate_schedule_e(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<GenerateScheduleEInput>,
) -> AppResult<Response<Body>> {
    let account_id = require_account_id(&state, &headers).await?;
    let year = TaxYear::current(payload.year)?;
    let service = tax_reports(&state)?;

    let generated = service
        .generate_single(account_id, payload.property_id, year)
        .await?;
    artifact_response(StatusCode::CREATED, generated)
}

async fn generate_schedule_e_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<GenerateScheduleEBatchInput>,
) -> AppResult<Response<Body>> {
    let account_id = require_account_id(&state, &headers).await?;
    validate_input(&payload)?;
    let year = TaxYear::current(payload.year)?;
    let service = tax_reports(&state)?;

    let generated = service
        .generate_batch(account_id, &payload.property_ids, year)
        .await?;
    artifact_response(StatusCode::CREATED, generated)
}

async fn list_reports(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let account_id = require_account_id(&state, &headers).await?;
    let service = tax_reports(&state)?;

    let reports = service
        .list_reports(account_id)
        .await?
        .into_iter()
        .map(ReportSummary::from)
        .collect::<Vec<_>>();
    Ok(Json(json!({ "data": reports })))
}

async fn download_report(
    State(state): State<AppState>,
    Path(path): Path<ReportPath>,
    headers: HeaderMap,
) -> AppResult<Response<Body>> {
    let account_id = require_account_id(&state, &headers).await?;
    let service = tax_reports(&state)?;

    let stored = service.download_report(account_id, path.report_id).await?;
    binary_response(
        StatusCode::OK,
        stored.bytes,
        stored.report.file_type,
        &stored.report.file_name,
        stored.report.id,
        &stored.report.content_sha256,
        &[],
    )
}

async fn report_summary(
    State(state): State<AppState>,
    Path(path): Path<ReportPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let account_id = require_account_id(&state, &headers).await?;
    let service = tax_reports(&state)?;

    let report = service.report_summary(account_id, path.report_id).await?;
    Ok(Json(json!({ "data": ReportSummary::from(report) })))
}

async fn delete_report(
    State(state): State<AppState>,
    Path(path): Path<ReportPath>,
    headers: HeaderMap,
) -> AppResult<StatusCode> {
    let account_id = require_account_id(&state, &headers).await?;
    let service = tax_reports(&state)?;

    service.delete_report(account_id, path.report_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn tax_reports(state: &AppState) -> AppResult<&Arc<TaxReportService>> {
    state.tax_reports.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}

fn artifact_response(status: StatusCode, generated: GeneratedArtifact) -> AppResult<Response<Body>> {
    let GeneratedArtifact {
        report,
        artifact,
        skipped_property_ids,
    } = generated;
    binary_response(
        status,
        artifact.bytes,
        artifact.file_type,
        &artifact.file_name,
        report.id,
        &report.content_sha256,
        &skipped_property_ids,
    )
}

fn binary_response(
    status: StatusCode,
    bytes: Vec<u8>,
    file_type: ReportFileType,
    file_name: &str,
    report_id: Uuid,
    content_sha256: &str,
    skipped_property_ids: &[Uuid],
) -> AppResult<Response<Body>> {
    let content_length = bytes.len();
    let mut response = Response::builder()
        .status(status)
        .body(Body::from(bytes))
        .map_err(|error| {
            tracing::error!(error = %error, "Could not build report response");
            AppError::Internal("Could not build report response.".to_string())
        })?;

    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(file_type.content_type()));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(content_length));
    if let Ok(value) = HeaderValue::from_str(&content_disposition(file_name)) {
        headers.insert(CONTENT_DISPOSITION, value);
    }
    if let Ok(value) = HeaderValue::from_str(&report_id.to_string()) {
        headers.insert("x-report-id", value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("\"{content_sha256}\"")) {
        headers.insert(ETAG, value);
    }
    if !skipped_property_ids.is_empty() {
        let skipped = skipped_property_ids
            .iter()
            .map(Uuid::to_string)
            .collect::<Vec<_>>()
            .join(",");
        if let Ok(value) = HeaderValue::from_str(&skipped) {
            headers.insert("x-skipped-properties", value);
        }
    }
    Ok(response)
}

fn content_disposition(file_name: &str) -> String {
    let safe = file_name
        .chars()
        .filter(|ch| ch.is_ascii_graphic() && *ch != '"' && *ch != '\\')
        .collect::<String>();
    format!("attachment; filename=\"{safe}\"")
}

fn preview_payload(totals: &PropertyYearAggregate) -> Value {
    let lines = totals
        .line_totals
        .iter()
        .map(|total| {
            json!({
                "line": total.line,
                "line_number": total.line.line_number(),
                "label": total.line.label(),
                "amount": total.amount,
            })
        })
        .collect::<Vec<_>>();

    json!({
        "property_id": totals.property_id,
        "property_name": totals.property_name,
        "year": totals.year,
        "lines": lines,
        "total_expenses": totals.total_expenses,
        "total_income": totals.total_income,
        "net_income": totals.net_income,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::content_disposition;
    use crate::{
        config::AppConfig,
        services::{
            fakes::{InMemoryLedger, InMemoryReportStore},
            tax_reports::TaxReportService,
        },
        state::AppState,
    };

    fn app(ledger: Arc<InMemoryLedger>) -> Router {
        let mut config = AppConfig::from_env();
        config.environment = "test".to_string();
        config.dev_auth_overrides_enabled = true;
        let service = TaxReportService::new(ledger, Arc::new(InMemoryReportStore::default()), 10);
        let state = AppState::with_service(config, None, Some(Arc::new(service)));
        super::router().with_state(state)
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn post_json(uri: &str, account: Uuid, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("x-account-id", account.to_string())
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn request(method: &str, uri: &str, account: Uuid) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("x-account-id", account.to_string())
            .body(Body::empty())
            .unwrap()
    }

    async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
    }

    #[tokio::test]
    async fn generate_download_list_and_delete_flow() {
        let ledger = Arc::new(InMemoryLedger::default());
        let account = Uuid::new_v4();
        let property = ledger.add_property(account, "Maple Duplex");
        ledger.add_expense(property, dec!(200), date(2025, 3, 1), Some("repairs"));
        ledger.add_expense(property, dec!(300), date(2025, 4, 1), Some("repairs"));
        ledger.add_income(property, dec!(600), date(2025, 5, 1));
        ledger.add_income(property, dec!(400), date(2025, 6, 1));
        let app = app(ledger);

        let response = app
            .clone()
            .oneshot(post_json(
                "/tax-reports/schedule-e",
                account,
                json!({ "property_id": property, "year": 2025 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["content-type"], "application/pdf");
        assert_eq!(
            response.headers()["content-disposition"],
            "attachment; filename=\"Schedule-E-Maple-Duplex-2025.pdf\""
        );
        let report_id = response.headers()["x-report-id"]
            .to_str()
            .unwrap()
            .to_string();
        let generated = body_bytes(response).await;
        assert!(generated.starts_with(b"%PDF-"));

        let download = app
            .clone()
            .oneshot(request("GET", &format!("/tax-reports/{report_id}"), account))
            .await
            .unwrap();
        assert_eq!(download.status(), StatusCode::OK);
        assert_eq!(body_bytes(download).await, generated);

        let listed = app
            .clone()
            .oneshot(request("GET", "/tax-reports", account))
            .await
            .unwrap();
        let listed: Value = serde_json::from_slice(&body_bytes(listed).await).unwrap();
        assert_eq!(listed["data"][0]["id"], report_id.as_str());
        assert_eq!(listed["data"][0]["report_type"], "single_property");
        assert_eq!(listed["data"][0]["file_type"], "pdf");

        let summary = app
            .clone()
            .oneshot(request("GET", &format!("/tax-reports/{report_id}/summary"), account))
            .await
            .unwrap();
        assert_eq!(summary.status(), StatusCode::OK);
        let summary: Value = serde_json::from_slice(&body_bytes(summary).await).unwrap();
        assert_eq!(summary["data"]["file_name"], "Schedule-E-Maple-Duplex-2025.pdf");
        assert_eq!(
            summary["data"]["file_size_bytes"],
            json!(generated.len() as i64)
        );

        let deleted = app
            .clone()
            .oneshot(request("DELETE", &format!("/tax-reports/{report_id}"), account))
            .await
            .unwrap();
        assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
        let deleted_again = app
            .oneshot(request("DELETE", &format!("/tax-reports/{report_id}"), account))
            .await
            .unwrap();
        assert_eq!(deleted_again.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn preview_returns_two_decimal_totals() {
        let ledger = Arc::new(InMemoryLedger::default());
        let account = Uuid::new_v4();
        let property = ledger.add_property(account, "Preview Place");
        ledger.add_expense(property, dec!(200), date(2025, 3, 1), Some("repairs"));
        ledger.add_expense(property, dec!(300), date(2025, 4, 1), Some("repairs"));
        ledger.add_income(property, dec!(1000), date(2025, 5, 1));
        let app = app(ledger);

        let response = app
            .oneshot(request(
                "GET",
                &format!("/tax-reports/schedule-e/{property}?year=2025"),
                account,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let payload: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(payload["total_expenses"], "500.00");
        assert_eq!(payload["total_income"], "1000.00");
        assert_eq!(payload["net_income"], "500.00");
        assert_eq!(payload["lines"][9]["line"], "repairs");
        assert_eq!(payload["lines"][9]["line_number"], 14);
        assert_eq!(payload["lines"][9]["amount"], "500.00");
    }

    #[tokio::test]
    async fn batch_errors_map_to_client_statuses() {
        let ledger = Arc::new(InMemoryLedger::default());
        let account = Uuid::new_v4();
        let app = app(ledger);

        let unresolved = app
            .clone()
            .oneshot(post_json(
                "/tax-reports/schedule-e/batch",
                account,
                json!({ "property_ids": [Uuid::new_v4(), Uuid::new_v4()], "year": 2025 }),
            ))
            .await
            .unwrap();
        assert_eq!(unresolved.status(), StatusCode::BAD_REQUEST);

        let bad_year = app
            .clone()
            .oneshot(post_json(
                "/tax-reports/schedule-e/batch",
                account,
                json!({ "property_ids": [Uuid::new_v4()], "year": 1999 }),
            ))
            .await
            .unwrap();
        assert_eq!(bad_year.status(), StatusCode::BAD_REQUEST);

        let oversized = app
            .clone()
            .oneshot(post_json(
                "/tax-reports/schedule-e/batch",
                account,
                json!({
                    "property_ids": (0..1001).map(|_| Uuid::new_v4()).collect::<Vec<_>>(),
                    "year": 2025,
                }),
            ))
            .await
            .unwrap();
        assert_eq!(oversized.status(), StatusCode::BAD_REQUEST);

        let over_limit = app
            .clone()
            .oneshot(post_json(
                "/tax-reports/schedule-e/batch",
                account,
                json!({
                    "property_ids": (0..11).map(|_| Uuid::new_v4()).collect::<Vec<_>>(),
                    "year": 2025,
                }),
            ))
            .await
            .unwrap();
        assert_eq!(over_limit.status(), StatusCode::BAD_REQUEST);

        let foreign = app
            .oneshot(request("GET", &format!("/tax-reports/{}", Uuid::new_v4()), account))
            .await
            .unwrap();
        assert_eq!(foreign.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn batch_reports_skipped_ids_in_header() {
        let ledger = Arc::new(InMemoryLedger::default());
        let account = Uuid::new_v4();
        let valid = ledger.add_property(account, "Harbor View");
        let missing = Uuid::new_v4();
        let app = app(ledger);

        let response = app
            .oneshot(post_json(
                "/tax-reports/schedule-e/batch",
                account,
                json!({ "property_ids": [valid, missing], "year": 2025 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["content-type"], "application/zip");
        assert_eq!(
            response.headers()["x-skipped-properties"],
            missing.to_string().as_str()
        );
    }

    #[tokio::test]
    async fn missing_credentials_are_unauthorized() {
        let app = app(Arc::new(InMemoryLedger::default()));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/tax-reports")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn content_disposition_strips_quotes() {
        assert_eq!(
            content_disposition("a\"b.pdf"),
            "attachment; filename=\"ab.pdf\""
        );
    }
}
