//! HTTP Endpoints
//!
//! REST API for the advisor. The chat-facing routes never surface pipeline
//! errors: a blank message is the only 400, and everything downstream of
//! validation answers 200 with whatever reply the pipeline produced.

use axum::{
    extract::{Json, Path, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Router,
};
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use sentinel_advisor::{AdvisorError, ChatInput, Contribution};
use sentinel_core::Channel;
use sentinel_persistence::{ConversationLogEntry, EscalationEvent, FeedbackRecord};

use crate::auth::auth_middleware;
use crate::metrics::{metrics_handler, record_chat, record_error, track_metrics};
use crate::rate_limit::rate_limit_middleware;
use crate::state::AppState;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let config = state.config.read();
    let cors_layer = build_cors_layer(&config.server.cors_origins, config.server.cors_enabled);
    let request_timeout = Duration::from_secs(config.server.timeout_seconds);
    drop(config); // Release lock before building router

    Router::new()
        // Advisor endpoints
        .route("/api/advisor/chat", post(chat))
        .route("/api/advisor/conversation/:session_id", get(conversation_history))
        .route("/api/advisor/escalations/:session_id", get(session_escalations))
        .route("/api/advisor/feedback", post(submit_feedback))
        .route("/api/advisor/agents", get(list_agents))
        .route("/api/advisor/agent-selection", post(agent_selection))
        .route("/api/advisor/metrics", get(usage_metrics))
        .route("/api/advisor/collaborate", post(collaborate))
        // Telephony webhook
        .route("/api/webhooks/voice", post(voice_webhook))
        // Health check
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // Prometheus metrics
        .route("/metrics", get(metrics_handler))
        // Admin endpoints
        .route("/admin/reload-config", post(reload_config))
        .route("/admin/personas/reload", post(reload_personas))
        // Request accounting sees the matched route template
        .route_layer(axum::middleware::from_fn(track_metrics))
        // Middleware (order matters - auth runs after rate limiting, both
        // need the config extension)
        .layer(axum::middleware::from_fn(
            |req: axum::extract::Request, next: axum::middleware::Next| async move {
                auth_middleware(req, next).await
            },
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(Extension(state.config.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(cors_layer)
        .with_state(state)
}

/// Build CORS layer from configured origins
///
/// - If cors_enabled is false, returns permissive layer (for dev)
/// - If cors_origins is empty, defaults to localhost:3000 for safety
/// - Otherwise, uses the configured origins
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins (NOT FOR PRODUCTION)");
        return CorsLayer::permissive();
    }

    if origins.is_empty() {
        tracing::info!("No CORS origins configured, defaulting to localhost:3000");
        return CorsLayer::new()
            .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any);
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    if parsed_origins.is_empty() {
        tracing::error!("All configured CORS origins are invalid, falling back to localhost");
        return CorsLayer::new()
            .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any);
    }

    tracing::info!("CORS configured with {} origins", parsed_origins.len());
    // Credentials disallow wildcard headers, so list the ones the API takes
    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Chat request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    message: String,
    session_id: Option<String>,
    user_id: Option<String>,
}

/// Chat endpoint
async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    if request.message.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "success": false,
                "error": "Message is required"
            })),
        );
    }

    let mut input = ChatInput::new(request.message);
    if let Some(session_id) = request.session_id {
        input = input.with_session(session_id);
    }
    if let Some(user_id) = request.user_id {
        input = input.with_user(user_id);
    }

    let outcome = state.advisor.handle_chat(input).await;
    record_chat(&outcome);

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "success": true,
            "response": outcome.response,
            "agent": outcome.agent,
            "agentType": outcome.agent_type,
            "intent": outcome.classification.category.as_str(),
            "confidence": outcome.classification.confidence,
            "escalated": outcome.escalated,
            "escalationType": outcome.escalation_type,
            "sessionId": outcome.session_id,
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<i32>,
}

/// Conversation history for a session, oldest first
async fn conversation_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let limit = params.limit.unwrap_or(50).clamp(1, 200);

    match state.advisor.conversation(&session_id, limit).await {
        Ok(entries) => {
            let conversation: Vec<serde_json::Value> =
                entries.iter().map(log_entry_body).collect();
            Ok(Json(serde_json::json!({
                "success": true,
                "sessionId": session_id,
                "messageCount": conversation.len(),
                "conversation": conversation,
            })))
        },
        Err(e) => {
            tracing::error!(session_id = %session_id, "History fetch failed: {}", e);
            record_error("store");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        },
    }
}

/// Escalation events recorded for a session
async fn session_escalations(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let limit = params.limit.unwrap_or(20).clamp(1, 100);

    match state.advisor.escalations(&session_id, limit).await {
        Ok(events) => {
            let escalations: Vec<serde_json::Value> =
                events.iter().map(escalation_body).collect();
            Ok(Json(serde_json::json!({
                "success": true,
                "sessionId": session_id,
                "count": escalations.len(),
                "escalations": escalations,
            })))
        },
        Err(e) => {
            tracing::error!(session_id = %session_id, "Escalation fetch failed: {}", e);
            record_error("store");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        },
    }
}

/// Feedback request; either a 1-5 rating or a helpful flag is required
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedbackRequest {
    session_id: String,
    user_id: Option<String>,
    rating: Option<i32>,
    helpful: Option<bool>,
    comment: Option<String>,
    agent_type: Option<String>,
}

/// Submit feedback for a session
async fn submit_feedback(
    State(state): State<AppState>,
    Json(request): Json<FeedbackRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    let rating = match (request.rating, request.helpful) {
        (Some(rating), _) => rating,
        (None, Some(true)) => 5,
        (None, Some(false)) => 2,
        (None, None) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "success": false,
                    "error": "Either rating or helpful is required"
                })),
            );
        },
    };
    if !(1..=5).contains(&rating) {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "success": false,
                "error": "Rating must be between 1 and 5"
            })),
        );
    }

    let record = FeedbackRecord {
        id: Uuid::new_v4(),
        session_id: request.session_id,
        user_id: request.user_id,
        rating,
        helpful: request.helpful,
        comment: request.comment,
        agent_type: request.agent_type,
        created_at: Utc::now(),
    };

    match state.advisor.submit_feedback(&record).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "feedbackId": record.id,
                "message": "Thank you for your feedback. We use this to continuously improve our service."
            })),
        ),
        Err(e) => {
            tracing::error!("Feedback write failed: {}", e);
            record_error("store");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "success": false,
                    "error": "Unable to submit feedback"
                })),
            )
        },
    }
}

/// Persona listing with capabilities; system prompts stay server-side
async fn list_agents(State(state): State<AppState>) -> Json<serde_json::Value> {
    let personas = state.advisor.registry().list().await;
    let agents: Vec<serde_json::Value> = personas
        .iter()
        .map(|p| {
            serde_json::json!({
                "name": p.name,
                "agentType": p.agent_type,
                "description": p.description,
                "categories": p.categories.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
                "scopes": {
                    "patientData": p.scopes.patient_data,
                    "financialData": p.scopes.financial_data,
                },
                "isDefault": p.is_default,
            })
        })
        .collect();

    Json(serde_json::json!({
        "success": true,
        "count": agents.len(),
        "agents": agents,
    }))
}

#[derive(Debug, Deserialize)]
struct AgentSelectionRequest {
    message: String,
}

/// Classification and persona selection without generation
async fn agent_selection(
    State(state): State<AppState>,
    Json(request): Json<AgentSelectionRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    if request.message.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "success": false,
                "error": "Message is required"
            })),
        );
    }

    let (persona, classification) = state.advisor.route_preview(&request.message).await;
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "success": true,
            "agent": persona.name,
            "agentType": persona.agent_type,
            "intent": classification.category.as_str(),
            "confidence": classification.confidence,
            "source": classification.source.as_str(),
            "matched": classification.matched,
        })),
    )
}

#[derive(Debug, Deserialize)]
struct UsageParams {
    hours: Option<i64>,
}

/// Usage aggregates over the recent conversation log
async fn usage_metrics(
    State(state): State<AppState>,
    Query(params): Query<UsageParams>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let hours = params.hours.unwrap_or(24).clamp(1, 24 * 30);

    match state.advisor.usage_report(hours).await {
        Ok(report) => Ok(Json(serde_json::json!({
            "success": true,
            "report": report,
        }))),
        Err(e) => {
            tracing::error!("Usage report failed: {}", e);
            record_error("store");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        },
    }
}

/// Collaboration request; omitting agents fans out to the full registry
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CollaborateRequest {
    message: String,
    #[serde(default)]
    agents: Vec<String>,
    session_id: Option<String>,
}

/// Fan one question out to several personas and synthesize the answers
async fn collaborate(
    State(state): State<AppState>,
    Json(request): Json<CollaborateRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    if request.message.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "success": false,
                "error": "Message is required"
            })),
        );
    }

    let agents = if request.agents.is_empty() {
        state
            .advisor
            .registry()
            .list()
            .await
            .into_iter()
            .map(|p| p.agent_type)
            .collect()
    } else {
        request.agents
    };

    match state
        .advisor
        .collaborate(&request.message, &agents, request.session_id)
        .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "sessionId": outcome.session_id,
                "response": outcome.synthesis,
                "degraded": outcome.degraded,
                "contributions": outcome
                    .contributions
                    .iter()
                    .map(contribution_body)
                    .collect::<Vec<_>>(),
            })),
        ),
        Err(AdvisorError::InvalidRequest(msg)) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "success": false,
                "error": msg
            })),
        ),
        Err(e) => {
            tracing::error!("Collaboration failed: {}", e);
            record_error("collaboration");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "success": false,
                    "error": "Collaboration failed"
                })),
            )
        },
    }
}

/// Telephony webhook payload, one transcribed utterance per call
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VoiceWebhookRequest {
    call_sid: String,
    from: Option<String>,
    transcript: String,
}

/// Run a transcribed utterance through the pipeline on the voice channel
async fn voice_webhook(
    State(state): State<AppState>,
    Json(request): Json<VoiceWebhookRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    if request.transcript.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "success": false,
                "error": "Transcript is required"
            })),
        );
    }

    tracing::info!(
        call_sid = %request.call_sid,
        from = request.from.as_deref().unwrap_or("unknown"),
        "Voice utterance received"
    );

    let input = ChatInput::new(request.transcript)
        .with_session(voice_session_id(&request.call_sid))
        .with_channel(Channel::Voice);

    let outcome = state.advisor.handle_chat(input).await;
    record_chat(&outcome);

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "success": true,
            "response": outcome.response,
            "escalated": outcome.escalated,
            "sessionId": outcome.session_id,
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
}

/// All turns of one call share a session keyed by the call SID
fn voice_session_id(call_sid: &str) -> String {
    format!("voice_{}", call_sid)
}

/// Liveness: personas and escalation rules are loaded, stores are wired
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let rule_count = {
        let config = state.get_config();
        config.escalation.rules.len()
    };

    let personas = state.advisor.registry().list().await;
    let persona_count = personas.len();
    let has_default = personas.iter().any(|p| p.is_default);

    let mut checks = serde_json::Map::new();
    checks.insert(
        "personas".to_string(),
        serde_json::json!({
            "status": if persona_count > 0 && has_default { "ok" } else { "degraded" },
            "count": persona_count
        }),
    );
    checks.insert(
        "escalation_rules".to_string(),
        serde_json::json!({
            "status": if rule_count > 0 { "ok" } else { "degraded" },
            "count": rule_count
        }),
    );
    checks.insert(
        "persistence".to_string(),
        serde_json::json!({
            "status": "ok",
            "mode": state.store_mode
        }),
    );

    let (status, status_code) = if persona_count == 0 {
        ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
    } else if !has_default || rule_count == 0 {
        ("degraded", StatusCode::OK)
    } else {
        ("healthy", StatusCode::OK)
    };

    (
        status_code,
        Json(serde_json::json!({
            "status": status,
            "version": env!("CARGO_PKG_VERSION"),
            "checks": checks
        })),
    )
}

/// Readiness: the model backend is configured and the registry can serve
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let mut checks = serde_json::Map::new();
    let mut ready = true;

    let model_ok = state.advisor.model_available().await;
    checks.insert(
        "model".to_string(),
        serde_json::json!({
            "status": if model_ok { "ok" } else { "unavailable" }
        }),
    );
    if !model_ok {
        ready = false;
    }

    let persona_count = state.advisor.registry().list().await.len();
    checks.insert(
        "personas".to_string(),
        serde_json::json!({
            "status": if persona_count > 0 { "ok" } else { "empty" },
            "count": persona_count
        }),
    );
    if persona_count == 0 {
        ready = false;
    }

    let status = if ready { "ready" } else { "not_ready" };
    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(serde_json::json!({
            "status": status,
            "checks": checks
        })),
    )
}

/// Config reload endpoint
///
/// POST /admin/reload-config
///
/// Reloads configuration from disk. Useful for updating settings without
/// restart. Note: CORS and the bind address are only applied at startup.
async fn reload_config(State(state): State<AppState>) -> impl IntoResponse {
    match state.reload_config() {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "success",
                "message": "Configuration reloaded successfully"
            })),
        ),
        Err(e) => {
            tracing::error!("Config reload failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "status": "error",
                    "message": e
                })),
            )
        },
    }
}

/// Persona reload endpoint
///
/// POST /admin/personas/reload
///
/// Forces a catalog refresh regardless of the cache TTL.
async fn reload_personas(State(state): State<AppState>) -> impl IntoResponse {
    match state.advisor.registry().force_refresh().await {
        Ok(count) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "success",
                "personas": count
            })),
        ),
        Err(e) => {
            tracing::error!("Persona reload failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "status": "error",
                    "message": e.to_string()
                })),
            )
        },
    }
}

fn log_entry_body(entry: &ConversationLogEntry) -> serde_json::Value {
    serde_json::json!({
        "id": entry.id,
        "channel": entry.channel.as_str(),
        "userId": entry.user_id,
        "message": entry.message,
        "response": entry.response,
        "agentType": entry.agent_type,
        "intent": entry.intent.as_str(),
        "confidence": entry.confidence,
        "sentiment": entry.sentiment.as_str(),
        "topics": entry.topics,
        "escalated": entry.escalated,
        "fallback": entry.fallback,
        "latencyMs": entry.latency_ms,
        "createdAt": entry.created_at.to_rfc3339(),
    })
}

fn escalation_body(event: &EscalationEvent) -> serde_json::Value {
    serde_json::json!({
        "id": event.id,
        "logId": event.log_id,
        "rule": event.rule,
        "escalationType": event.escalation_type,
        "matched": event.matched,
        "targets": event.targets,
        "message": event.message,
        "acknowledged": event.acknowledged,
        "createdAt": event.created_at.to_rfc3339(),
    })
}

fn contribution_body(contribution: &Contribution) -> serde_json::Value {
    serde_json::json!({
        "agent": contribution.agent,
        "agentType": contribution.agent_type,
        "success": contribution.success,
        "response": contribution.response,
        "error": contribution.error,
        "confidence": contribution.confidence,
    })
}
