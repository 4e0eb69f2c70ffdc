//! Report routes. Each handler runs the shared precondition chain and hands
//! the result to one renderer; nothing is rendered for a request that fails
//! identity, id or ownership checks.

use std::time::Instant;

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use hourbook_reports::{
    DocumentRequest, ExportError, ReportError, build_summary, prepare, stream_document,
};
use tracing::{Instrument, Span};

use super::{
    ApiError, AppState, REQUEST_ID_HEADER, extract_identity, extract_request_id,
    report_error_response,
};

const SUMMARY_ROUTE: &str = "/api/reports/client/{client_id}";
const CSV_ROUTE: &str = "/api/reports/export/csv/{client_id}";
const PDF_ROUTE: &str = "/api/reports/export/pdf/{client_id}";

pub(super) async fn summary(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let request_id = extract_request_id(&headers);
    let started = Instant::now();
    let span = tracing::info_span!(
        "report.summary",
        request_id = %request_id,
        client_id = %client_id,
        identity = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
        outcome = tracing::field::Empty,
    );

    let result = async {
        let identity = extract_identity(&state, &headers)?;
        Span::current().record("identity", identity.email());

        let report = build_summary(state.store.as_ref(), &client_id, &identity)
            .await
            .map_err(|err| pipeline_failure("summary", &err))?;

        Ok::<Response, ApiError>(Json(report).into_response())
    }
    .instrument(span.clone())
    .await;

    complete(SUMMARY_ROUTE, &span, &request_id, started, result)
}

pub(super) async fn export_csv(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let request_id = extract_request_id(&headers);
    let started = Instant::now();
    let span = tracing::info_span!(
        "report.export_csv",
        request_id = %request_id,
        client_id = %client_id,
        identity = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
        outcome = tracing::field::Empty,
    );

    let result = async {
        let identity = extract_identity(&state, &headers)?;
        Span::current().record("identity", identity.email());

        let prepared = prepare(state.store.as_ref(), &client_id, &identity)
            .await
            .map_err(|err| pipeline_failure("export_csv", &err))?;

        let file = state
            .exporter
            .write(&prepared.client, &prepared.aggregate.entries, Utc::now())
            .await
            .map_err(csv_export_failure)?;
        let delivery = file
            .on_finish(|outcome| crate::metrics::observe_export("csv", outcome.as_str()))
            .deliver()
            .await
            .map_err(csv_export_failure)?;

        tracing::info!(
            rows = prepared.aggregate.entry_count,
            bytes = delivery.len(),
            "csv export ready"
        );

        let mut response_headers =
            attachment_headers("text/csv; charset=utf-8", delivery.download_name());
        response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(delivery.len()));

        let body = Body::from_stream(delivery);
        Ok::<Response, ApiError>((response_headers, body).into_response())
    }
    .instrument(span.clone())
    .await;

    complete(CSV_ROUTE, &span, &request_id, started, result)
}

pub(super) async fn export_pdf(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let request_id = extract_request_id(&headers);
    let started = Instant::now();
    let span = tracing::info_span!(
        "report.export_pdf",
        request_id = %request_id,
        client_id = %client_id,
        identity = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
        outcome = tracing::field::Empty,
    );

    let result = async {
        let identity = extract_identity(&state, &headers)?;
        Span::current().record("identity", identity.email());

        let prepared = prepare(state.store.as_ref(), &client_id, &identity)
            .await
            .map_err(|err| pipeline_failure("export_pdf", &err))?;

        let request = DocumentRequest::new(&prepared.client, &prepared.aggregate, Utc::now());
        let stream = stream_document(request, state.config.page_layout);

        crate::metrics::observe_export("pdf", "started");
        let download_name = format!("report-{}.pdf", prepared.client.id);
        let response_headers = attachment_headers("application/pdf", &download_name);

        let body = Body::from_stream(stream);
        Ok::<Response, ApiError>((response_headers, body).into_response())
    }
    .instrument(span.clone())
    .await;

    complete(PDF_ROUTE, &span, &request_id, started, result)
}

fn pipeline_failure(operation: &'static str, err: &ReportError) -> ApiError {
    match err {
        ReportError::Storage(_) | ReportError::Export(_) => {
            tracing::error!(operation, error = %err, "report pipeline failed");
        }
        ReportError::InvalidClientId(_) | ReportError::NotFound => {
            tracing::debug!(operation, error = %err, "report request rejected");
        }
    }
    report_error_response(err)
}

fn csv_export_failure(err: ExportError) -> ApiError {
    crate::metrics::observe_export("csv", "error");
    pipeline_failure("export_csv", &ReportError::from(err))
}

fn attachment_headers(content_type: &'static str, download_name: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    let disposition = format!("attachment; filename=\"{download_name}\"");
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers
}

/// Records latency and outcome on the span, tags the response with the
/// request id and observes HTTP metrics. Latency covers the time to response
/// headers; streamed bodies continue afterwards.
fn complete(
    route: &'static str,
    span: &Span,
    request_id: &str,
    started: Instant,
    result: Result<Response, ApiError>,
) -> Response {
    let elapsed = started.elapsed();
    span.record("latency_ms", elapsed.as_millis() as u64);

    let mut response = match result {
        Ok(response) => {
            span.record("outcome", "ok");
            response
        }
        Err(err) => {
            span.record("outcome", "error");
            err.into_response()
        }
    };

    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    let status: StatusCode = response.status();
    crate::metrics::observe_http_request(route, "GET", status.as_u16(), elapsed);
    response
}
