use axum::{
	Json, Router,
	extract::{
		DefaultBodyLimit, Query, State,
		rejection::{JsonRejection, QueryRejection},
	},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use bw_domain::EnrichedRecord;
use bw_service::{Error as ServiceError, QueryRequest, Stats};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
	let max_body_bytes = state.service.cfg.service.max_body_bytes;

	Router::new()
		.route("/", post(simple))
		.route("/home", post(simple))
		.route("/advanced", post(advanced))
		.route("/mags", post(mags))
		.route("/health", get(health))
		.route("/stats", get(stats))
		.layer(DefaultBodyLimit::max(max_body_bytes))
		.with_state(state)
}

async fn simple(
	State(state): State<AppState>,
	payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Vec<EnrichedRecord>>, ApiError> {
	let Json(body) = payload?;
	let query = state.service.parse_simple(body)?;

	run_query(&state, query).await
}

async fn advanced(
	State(state): State<AppState>,
	payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Vec<EnrichedRecord>>, ApiError> {
	let Json(body) = payload?;
	let query = state.service.parse_advanced(body)?;

	run_query(&state, query).await
}

async fn mags(
	State(state): State<AppState>,
	params: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<Json<Vec<EnrichedRecord>>, ApiError> {
	let Query(params) = params?;
	let query = state.service.parse_accession(&params)?;

	run_query(&state, query).await
}

async fn health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
	state.service.health().await?;

	Ok(Json(serde_json::json!({ "status": "ok" })))
}

async fn stats(State(state): State<AppState>) -> Result<Json<Stats>, ApiError> {
	Ok(Json(state.service.stats().await?))
}

/// Runs a query whose cancellation token fires if the handler future is dropped.
async fn run_query(
	state: &AppState,
	query: QueryRequest,
) -> Result<Json<Vec<EnrichedRecord>>, ApiError> {
	let cancel = CancellationToken::new();
	let _guard = cancel.clone().drop_guard();
	let records = state.service.run(query, cancel).await?;

	Ok(Json(records))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	fields: Option<Vec<String>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	upstream_status: Option<u16>,
	#[serde(skip_serializing_if = "Option::is_none")]
	upstream_body: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
	upstream_status: Option<u16>,
	upstream_body: Option<String>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self {
			status,
			error_code: error_code.into(),
			message: message.into(),
			fields,
			upstream_status: None,
			upstream_body: None,
		}
	}
}

pub fn json_error(
	status: StatusCode,
	code: &str,
	message: impl Into<String>,
	fields: Option<Vec<String>>,
) -> ApiError {
	ApiError::new(status, code, message, fields)
}

impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		let message = err.to_string();

		match err {
			ServiceError::Validation { fields, .. } => json_error(
				StatusCode::UNPROCESSABLE_ENTITY,
				"validation_error",
				message,
				Some(fields).filter(|fields| !fields.is_empty()),
			),
			ServiceError::NotFound { .. } =>
				json_error(StatusCode::NOT_FOUND, "not_found", message, None),
			ServiceError::Format { .. } =>
				json_error(StatusCode::BAD_REQUEST, "format_error", message, None),
			ServiceError::Search { upstream_status, upstream_body, .. } => Self {
				upstream_status,
				upstream_body,
				..json_error(StatusCode::BAD_GATEWAY, "search_error", message, None)
			},
			ServiceError::Store { .. } =>
				json_error(StatusCode::SERVICE_UNAVAILABLE, "store_error", message, None),
			ServiceError::Cancelled => json_error(
				StatusCode::from_u16(499).unwrap_or(StatusCode::REQUEST_TIMEOUT),
				"cancelled",
				message,
				None,
			),
			ServiceError::Internal { .. } =>
				json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message, None),
		}
	}
}

impl From<JsonRejection> for ApiError {
	fn from(rejection: JsonRejection) -> Self {
		let status = rejection.status();

		if status == StatusCode::PAYLOAD_TOO_LARGE {
			return json_error(status, "payload_too_large", rejection.body_text(), None);
		}

		json_error(StatusCode::UNPROCESSABLE_ENTITY, "invalid_json", rejection.body_text(), None)
	}
}

impl From<QueryRejection> for ApiError {
	fn from(rejection: QueryRejection) -> Self {
		json_error(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", rejection.body_text(), None)
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody {
			error_code: self.error_code,
			message: self.message,
			fields: self.fields,
			upstream_status: self.upstream_status,
			upstream_body: self.upstream_body,
		};

		(self.status, Json(body)).into_response()
	}
}
