use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use hourbook_auth::{Identity, JwtAuthenticator};
use hourbook_reports::{ExportFs, LocalExportFs, ReportError, TabularExporter};
use hourbook_store::{PgReportStore, ReportStore, StoreError};
use serde::Serialize;
use ulid::Ulid;

use crate::config::{AuthMode, ServerConfig, StartupError};

mod reports;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const LOCAL_USER_HEADER: &str = "x-hourbook-user";
pub const LOCAL_AUTH_SECRET_HEADER: &str = "x-hourbook-local-auth-secret";

#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    store: Arc<dyn ReportStore>,
    jwt: Option<JwtAuthenticator>,
    exporter: TabularExporter,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn ReportStore>,
        export_fs: Arc<dyn ExportFs>,
    ) -> Result<Self, StartupError> {
        let jwt = if config.auth_mode == AuthMode::Jwt {
            let jwt_config = config.jwt.clone().ok_or_else(|| StartupError {
                code: "ERR_INVALID_CONFIG",
                message: "jwt auth mode requires jwt config".to_string(),
            })?;

            Some(
                JwtAuthenticator::new(jwt_config).map_err(|err| StartupError {
                    code: err.code,
                    message: err.message,
                })?,
            )
        } else {
            None
        };

        let exporter = TabularExporter::new(export_fs, config.export_dir.clone());

        Ok(Self {
            config,
            store,
            jwt,
            exporter,
        })
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Connects the Postgres store, applies migrations and builds the router.
pub async fn router(config: ServerConfig) -> Result<Router, StartupError> {
    let store = PgReportStore::connect_and_migrate(
        &config.db_url,
        config.db_max_connections,
        config.db_query_timeout(),
    )
    .await
    .map_err(|err| StartupError {
        code: "ERR_DB_UNAVAILABLE",
        message: format!("failed to initialize report store: {}", err),
    })?;

    let state = AppState::new(config, Arc::new(store), Arc::new(LocalExportFs))?;
    Ok(app(state))
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/reports/client/{client_id}", get(reports::summary))
        .route(
            "/api/reports/export/csv/{client_id}",
            get(reports::export_csv),
        )
        .route(
            "/api/reports/export/pdf/{client_id}",
            get(reports::export_pdf),
        )
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct ReadyzResponse {
    status: &'static str,
    checks: BTreeMap<&'static str, bool>,
}

async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let mut checks = BTreeMap::new();

    let database_ready = match state.store.ping().await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(error = %err, "readiness check: database unavailable");
            false
        }
    };
    checks.insert("database", database_ready);

    let all_ready = checks.values().all(|ok| *ok);
    let status = if all_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyzResponse {
            status: if all_ready { "ready" } else { "not_ready" },
            checks,
        }),
    )
}

async fn metrics(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if state.config.metrics_require_auth
        && let Err(err) = extract_identity(&state, &headers)
    {
        return err.into_response();
    }

    match crate::metrics::render() {
        Ok((body, content_type)) => {
            let mut headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(content_type.as_str()) {
                headers.insert(header::CONTENT_TYPE, value);
            }
            (headers, body).into_response()
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

fn extract_identity(state: &AppState, headers: &HeaderMap) -> Result<Identity, ApiError> {
    match state.config.auth_mode {
        AuthMode::Local => {
            validate_local_auth_shared_secret(
                headers,
                state.config.local_auth_shared_secret.as_deref(),
            )?;
            extract_local_user(headers)
        }
        AuthMode::Jwt => {
            let Some(auth) = state.jwt.as_ref() else {
                return Err(json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "ERR_INTERNAL",
                    "jwt authenticator is not initialized",
                    false,
                ));
            };

            auth.authenticate(headers)
                .map_err(|err| json_error(StatusCode::UNAUTHORIZED, err.code, err.message, false))
        }
    }
}

fn validate_local_auth_shared_secret(
    headers: &HeaderMap,
    expected_secret: Option<&str>,
) -> Result<(), ApiError> {
    let Some(expected_secret) = expected_secret else {
        return Ok(());
    };

    let provided_secret = headers
        .get(LOCAL_AUTH_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            json_error(
                StatusCode::UNAUTHORIZED,
                "ERR_AUTH_REQUIRED",
                "missing local auth secret",
                false,
            )
        })?;

    if provided_secret != expected_secret {
        return Err(json_error(
            StatusCode::UNAUTHORIZED,
            "ERR_AUTH_INVALID",
            "invalid local auth secret",
            false,
        ));
    }

    Ok(())
}

fn extract_local_user(headers: &HeaderMap) -> Result<Identity, ApiError> {
    headers
        .get(LOCAL_USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(Identity::from_email)
        .ok_or_else(|| {
            json_error(
                StatusCode::UNAUTHORIZED,
                "ERR_AUTH_REQUIRED",
                format!("missing {} header", LOCAL_USER_HEADER),
                false,
            )
        })
}

fn extract_request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .and_then(sanitize_request_id)
        .unwrap_or_else(|| Ulid::new().to_string())
}

fn sanitize_request_id(raw: &str) -> Option<String> {
    const MAX_LEN: usize = 64;
    let mut out = String::with_capacity(raw.len().min(MAX_LEN));

    for ch in raw.chars() {
        if out.len() >= MAX_LEN {
            break;
        }
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
            out.push(ch);
        }
    }

    (!out.is_empty()).then_some(out)
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: String,
    message: String,
    retryable: bool,
}

fn json_error(
    status: StatusCode,
    code: impl Into<String>,
    message: impl Into<String>,
    retryable: bool,
) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            code: code.into(),
            message: message.into(),
            retryable,
        }),
    )
}

/// Maps a pipeline failure to its response. Internal details stay in the log.
fn report_error_response(err: &ReportError) -> ApiError {
    match err {
        ReportError::InvalidClientId(_) => json_error(
            StatusCode::BAD_REQUEST,
            "ERR_INVALID_CLIENT_ID",
            "client id must be a positive integer",
            false,
        ),
        ReportError::NotFound => json_error(
            StatusCode::NOT_FOUND,
            "ERR_CLIENT_NOT_FOUND",
            "client not found",
            false,
        ),
        ReportError::Storage(store_err) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "ERR_STORAGE_UNAVAILABLE",
            "report storage is unavailable",
            matches!(store_err, StoreError::Timeout),
        ),
        ReportError::Export(_) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "ERR_EXPORT_FAILED",
            "report export failed",
            true,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hourbook_contracts::ClientId;

    #[test]
    fn request_id_is_sanitized() {
        assert_eq!(
            sanitize_request_id("req 01/<script>"),
            Some("req01script".to_string())
        );
        assert_eq!(sanitize_request_id("$$$"), None);
        assert_eq!(
            sanitize_request_id(&"a".repeat(100)).map(|s| s.len()),
            Some(64)
        );
    }

    #[test]
    fn missing_request_id_gets_a_ulid() {
        let id = extract_request_id(&HeaderMap::new());
        assert!(id.parse::<Ulid>().is_ok());
    }

    #[test]
    fn local_user_is_normalized() {
        let mut headers = HeaderMap::new();
        headers.insert(LOCAL_USER_HEADER, HeaderValue::from_static("  A@Example.COM "));
        let identity = extract_local_user(&headers).expect("identity");
        assert_eq!(identity.email(), "a@example.com");

        let (status, _) = extract_local_user(&HeaderMap::new()).unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn local_secret_must_match_when_configured() {
        let mut headers = HeaderMap::new();
        assert!(validate_local_auth_shared_secret(&headers, None).is_ok());

        let (status, Json(body)) =
            validate_local_auth_shared_secret(&headers, Some("s3cret")).unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.code, "ERR_AUTH_REQUIRED");

        headers.insert(LOCAL_AUTH_SECRET_HEADER, HeaderValue::from_static("nope"));
        let (_, Json(body)) =
            validate_local_auth_shared_secret(&headers, Some("s3cret")).unwrap_err();
        assert_eq!(body.code, "ERR_AUTH_INVALID");

        headers.insert(LOCAL_AUTH_SECRET_HEADER, HeaderValue::from_static("s3cret"));
        assert!(validate_local_auth_shared_secret(&headers, Some("s3cret")).is_ok());
    }

    #[test]
    fn report_errors_map_to_stable_codes() {
        let invalid = ReportError::from(ClientId::parse("abc").unwrap_err());
        let cases = [
            (invalid, StatusCode::BAD_REQUEST, "ERR_INVALID_CLIENT_ID"),
            (
                ReportError::NotFound,
                StatusCode::NOT_FOUND,
                "ERR_CLIENT_NOT_FOUND",
            ),
            (
                ReportError::Storage(StoreError::Timeout),
                StatusCode::INTERNAL_SERVER_ERROR,
                "ERR_STORAGE_UNAVAILABLE",
            ),
        ];

        for (err, status, code) in cases {
            let (got_status, Json(body)) = report_error_response(&err);
            assert_eq!(got_status, status);
            assert_eq!(body.code, code);
            assert!(!body.message.contains("abc"), "no input echo in {}", body.message);
        }
    }
}
