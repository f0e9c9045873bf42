use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::config::GatewayConfig;
use crate::mcp::types::ToolResult;

use super::gateway::{ChatGateway, ChatMessage, ChatReply};

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(rename = "conversationHistory", default)]
    conversation_history: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct UnitsQuery {
    units: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ForecastQuery {
    days: Option<u32>,
    units: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeQuery {
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CoordinatesQuery {
    lat: f64,
    lon: f64,
    units: Option<String>,
}

/// Chat and convenience weather endpoints.
pub fn router(gateway: Arc<ChatGateway>) -> Router {
    Router::new()
        .route("/api/chat", post(handle_chat))
        .route("/api/weather/coordinates", get(handle_coordinates))
        .route("/api/weather/{city}", get(handle_weather))
        .route("/api/forecast/{city}", get(handle_forecast))
        .route("/api/geocode/{city}", get(handle_geocode))
        .route("/health", get(handle_health))
        .layer(CorsLayer::permissive())
        .with_state(gateway)
}

pub async fn serve(gateway: Arc<ChatGateway>, config: &GatewayConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", config.bind, e))?;
    info!(
        mcp_url = %config.mcp_url,
        "chat gateway listening on {}",
        listener.local_addr()?
    );

    let client = gateway.client().clone();
    axum::serve(listener, router(gateway))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    if let Err(e) = client.close().await {
        warn!("failed to close MCP session: {}", e);
    }
    Ok(())
}

async fn handle_chat(
    State(gateway): State<Arc<ChatGateway>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return bad_request(rejection.body_text()),
    };

    let reply = gateway
        .respond(&request.message, &request.conversation_history)
        .await;
    let status = if request.message.trim().is_empty() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    (status, Json(reply)).into_response()
}

async fn handle_weather(
    State(gateway): State<Arc<ChatGateway>>,
    city: Result<Path<String>, PathRejection>,
    query: Result<Query<UnitsQuery>, QueryRejection>,
) -> Response {
    let (Path(city), Query(query)) = match (city, query) {
        (Ok(city), Ok(query)) => (city, query),
        (Err(e), _) => return bad_request(e.body_text()),
        (_, Err(e)) => return bad_request(e.body_text()),
    };

    let mut args = json!({ "city": city });
    if let Some(units) = query.units {
        args["units"] = json!(units);
    }
    call_tool(&gateway, "get_weather", args).await
}

async fn handle_forecast(
    State(gateway): State<Arc<ChatGateway>>,
    city: Result<Path<String>, PathRejection>,
    query: Result<Query<ForecastQuery>, QueryRejection>,
) -> Response {
    let (Path(city), Query(query)) = match (city, query) {
        (Ok(city), Ok(query)) => (city, query),
        (Err(e), _) => return bad_request(e.body_text()),
        (_, Err(e)) => return bad_request(e.body_text()),
    };

    let mut args = json!({ "city": city });
    if let Some(days) = query.days {
        args["days"] = json!(days);
    }
    if let Some(units) = query.units {
        args["units"] = json!(units);
    }
    call_tool(&gateway, "get_forecast", args).await
}

async fn handle_geocode(
    State(gateway): State<Arc<ChatGateway>>,
    city: Result<Path<String>, PathRejection>,
    query: Result<Query<GeocodeQuery>, QueryRejection>,
) -> Response {
    let (Path(city), Query(query)) = match (city, query) {
        (Ok(city), Ok(query)) => (city, query),
        (Err(e), _) => return bad_request(e.body_text()),
        (_, Err(e)) => return bad_request(e.body_text()),
    };

    let mut args = json!({ "city": city });
    if let Some(limit) = query.limit {
        args["limit"] = json!(limit);
    }
    call_tool(&gateway, "geocode_city", args).await
}

async fn handle_coordinates(
    State(gateway): State<Arc<ChatGateway>>,
    query: Result<Query<CoordinatesQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(e) => return bad_request(e.body_text()),
    };

    let mut args = json!({ "latitude": query.lat, "longitude": query.lon });
    if let Some(units) = query.units {
        args["units"] = json!(units);
    }
    call_tool(&gateway, "get_weather_by_coordinates", args).await
}

async fn handle_health(State(gateway): State<Arc<ChatGateway>>) -> Json<Value> {
    let client = gateway.client();
    let (status, mcp) = match client.ping().await {
        Ok(()) => ("ok", "connected".to_string()),
        Err(e) => {
            warn!("MCP health probe failed: {}", e);
            ("degraded", format!("unavailable: {}", e))
        }
    };

    Json(json!({
        "status": status,
        "gateway": "ok",
        "mcp": mcp,
        "session": format!("{:?}", client.session_state().await),
    }))
}

async fn call_tool(gateway: &ChatGateway, tool: &str, args: Value) -> Response {
    match gateway.client().call_tool(tool, args).await {
        Ok(result) => {
            let status = tool_status(&result);
            (status, Json(ChatReply::from_tool_result(result))).into_response()
        }
        Err(e) => {
            warn!(tool, "tool call failed: {}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(ChatReply {
                    response: "The weather service is unavailable right now.".to_string(),
                    weather_data: None,
                    error: Some(e.to_string()),
                }),
            )
                .into_response()
        }
    }
}

/// Extractor rejections get the same JSON shape as every other reply.
fn bad_request(detail: String) -> Response {
    warn!("bad request: {}", detail);
    (
        StatusCode::BAD_REQUEST,
        Json(ChatReply {
            response: "Sorry, I couldn't read that request.".to_string(),
            weather_data: None,
            error: Some(detail),
        }),
    )
        .into_response()
}

fn tool_status(result: &ToolResult) -> StatusCode {
    if !result.is_error {
        return StatusCode::OK;
    }
    let kind = result
        .structured_content
        .as_ref()
        .and_then(|s| s.get("errorKind"))
        .and_then(Value::as_str);
    match kind {
        Some("invalid_arguments") => StatusCode::BAD_REQUEST,
        Some("provider_failure") | Some("transport_failure") => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
