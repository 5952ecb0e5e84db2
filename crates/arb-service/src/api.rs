//! HTTP API for selection, payload checks and payload execution.

use axum::{
	extract::State,
	http::StatusCode,
	response::Json,
	routing::{get, post},
	Router,
};
use arb_selector::{Decision, Opportunity};
use arb_engine::SessionReceipt;
use arb_types::{Classify, ProviderKind, U256};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::service::{ArbService, RegistryVersion, SelectionOutcome, ServiceError};

type ApiError = (StatusCode, Json<serde_json::Value>);

#[derive(Debug, Deserialize)]
pub struct SelectRequest {
	pub opportunities: Vec<Opportunity>,
	/// Lender liquidity for the loan asset, if known.
	#[serde(default)]
	pub available: Option<U256>,
	#[serde(default)]
	pub decimals: u8,
}

#[derive(Debug, Deserialize)]
pub struct RevalidateRequest {
	pub decision: Decision,
	pub opportunity: Opportunity,
}

#[derive(Debug, Deserialize)]
pub struct PayloadCheckRequest {
	/// ABI-encoded payload, `0x`-prefixed hex.
	pub payload: String,
}

#[derive(Debug, Deserialize)]
pub struct PayloadExecuteRequest {
	/// ABI-encoded payload, `0x`-prefixed hex.
	pub payload: String,
	pub provider: ProviderKind,
}

pub fn router(service: Arc<ArbService>) -> Router {
	Router::new()
		.route("/health", get(health_check))
		.route("/select", post(select))
		.route("/select/revalidate", post(revalidate))
		.route("/payload/check", post(check_payload))
		.route("/payload/execute", post(execute_payload))
		.route("/registry/version", get(registry_version))
		.with_state(service)
		.layer(TraceLayer::new_for_http())
		.layer(CorsLayer::permissive())
}

pub async fn start_http_server(
	service: Arc<ArbService>,
	host: &str,
	port: u16,
) -> anyhow::Result<()> {
	let app = router(service);
	let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;
	info!("HTTP server listening on {}:{}", host, port);
	axum::serve(listener, app).await?;
	Ok(())
}

async fn health_check(State(service): State<Arc<ArbService>>) -> Json<serde_json::Value> {
	let version = service.registry_version().await;
	Json(json!({
		"status": "healthy",
		"network": version.network,
		"registry_version": version.version,
		"timestamp": chrono::Utc::now().timestamp(),
	}))
}

async fn select(
	State(service): State<Arc<ArbService>>,
	Json(request): Json<SelectRequest>,
) -> Json<Vec<SelectionOutcome>> {
	let outcomes = service
		.select(
			&request.opportunities,
			request.available,
			request.decimals,
			ArbService::now(),
		)
		.await;
	Json(outcomes)
}

async fn revalidate(
	State(service): State<Arc<ArbService>>,
	Json(request): Json<RevalidateRequest>,
) -> Result<Json<Decision>, ApiError> {
	service
		.revalidate(request.decision, &request.opportunity, ArbService::now())
		.await
		.map(Json)
		.map_err(|e| {
			(
				StatusCode::UNPROCESSABLE_ENTITY,
				Json(json!({ "class": e.class(), "error": e.to_string() })),
			)
		})
}

fn decode_hex(payload: &str) -> Result<Vec<u8>, ApiError> {
	hex::decode(payload.trim_start_matches("0x")).map_err(|e| {
		(
			StatusCode::BAD_REQUEST,
			Json(json!({ "error": format!("Invalid hex: {}", e) })),
		)
	})
}

async fn check_payload(
	State(service): State<Arc<ArbService>>,
	Json(request): Json<PayloadCheckRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let bytes = decode_hex(&request.payload)?;

	match service.check_payload(&bytes, ArbService::now()).await {
		Ok(validated) => Ok(Json(json!({
			"valid": true,
			"network": validated.network,
			"asset": validated.asset,
			"amount": validated.payload.amount,
			"profit_floor": validated.payload.profit_floor(),
			"nonce": validated.nonce(),
		}))),
		Err(e) => Err((
			StatusCode::UNPROCESSABLE_ENTITY,
			Json(json!({
				"valid": false,
				"class": e.class(),
				"error": e.to_string(),
			})),
		)),
	}
}

async fn execute_payload(
	State(service): State<Arc<ArbService>>,
	Json(request): Json<PayloadExecuteRequest>,
) -> Result<Json<SessionReceipt>, ApiError> {
	let bytes = decode_hex(&request.payload)?;
	service
		.execute_payload(request.provider, &bytes, ArbService::now())
		.await
		.map(Json)
		.map_err(|e| {
			let status = match e {
				ServiceError::Execution(_) => StatusCode::UNPROCESSABLE_ENTITY,
				ServiceError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
			};
			(
				status,
				Json(json!({ "class": e.class(), "error": e.to_string() })),
			)
		})
}

async fn registry_version(State(service): State<Arc<ArbService>>) -> Json<RegistryVersion> {
	Json(service.registry_version().await)
}
