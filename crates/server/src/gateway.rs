use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use gopherbot_core::config::mask_secret;
use gopherbot_core::types::{Callback, EventKind};
use gopherbot_dispatch::ReplyDispatcher;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

pub const EVENT_RECEIVED: &str = "EVENT_RECEIVED";
pub const CALLBACK_ERROR: &str = "CALLBACK_ERROR";
pub const INVALID_CALLBACK: &str = "INVALID_CALLBACK";
pub const VERIFY_FAILED: &str = "Error, wrong validation token";

#[derive(Clone)]
struct AppState {
    verify_token: Arc<str>,
    dispatcher: Arc<ReplyDispatcher>,
}

/// HTTP front of the bot: the webhook handshake and the event callback.
pub struct Gateway {
    bind: String,
    verify_token: String,
    dispatcher: Arc<ReplyDispatcher>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

impl Gateway {
    pub fn new(bind: String, verify_token: String, dispatcher: Arc<ReplyDispatcher>) -> Self {
        Self {
            bind,
            verify_token,
            dispatcher,
        }
    }

    pub fn router(&self) -> Router {
        let state = AppState {
            verify_token: Arc::from(self.verify_token.as_str()),
            dispatcher: self.dispatcher.clone(),
        };

        Router::new()
            .route("/health", get(health_check))
            .route("/webhook", get(webhook_verify).post(webhook_callback))
            .with_state(state)
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        let app = self.router();
        let listener = TcpListener::bind(&self.bind).await?;
        info!(
            addr = %listener.local_addr()?,
            mode = %self.dispatcher.mode(),
            "Gateway listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Gateway stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Deserialize)]
struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

async fn webhook_verify(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> (StatusCode, String) {
    let mode = query.mode.as_deref().unwrap_or_default();
    let provided = query.verify_token.as_deref().unwrap_or_default();
    let expected: &str = &state.verify_token;

    if !mode.is_empty() && !expected.is_empty() && provided == expected {
        info!(mode = %mode, "Webhook verification succeeded");
        return (StatusCode::OK, query.challenge.unwrap_or_default());
    }

    warn!(
        mode = %mode,
        token = %mask_secret(provided),
        "Webhook verification failed"
    );
    (StatusCode::NOT_FOUND, VERIFY_FAILED.to_string())
}

async fn webhook_callback(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let callback: Callback = match serde_json::from_slice(&body) {
        Ok(callback) => callback,
        Err(e) => {
            warn!(error = %e, "Couldn't decode callback");
            return (StatusCode::BAD_REQUEST, INVALID_CALLBACK);
        }
    };

    if !callback.is_page() {
        warn!(object = %callback.object, "Unexpected callback object");
        return (StatusCode::NOT_FOUND, CALLBACK_ERROR);
    }

    let dispatched = process_events(&state.dispatcher, &callback).await;
    debug!(dispatched, "Callback processed");

    (StatusCode::OK, EVENT_RECEIVED)
}

/// Runs every event of a page callback through identity capture, echo
/// filtering and the dispatcher, in payload order. Returns how many events
/// were dispatched.
async fn process_events(dispatcher: &ReplyDispatcher, callback: &Callback) -> usize {
    let mut dispatched = 0usize;

    for event in callback.events() {
        let ignore = {
            let mut bot = dispatcher.state().lock().await;
            if bot.observe_recipient(&event.recipient.id) {
                info!(me = %event.recipient.id, "Learned bot identity");
            }
            bot.should_ignore(&event.sender.id)
        };
        if ignore {
            debug!(sender = %event.sender.id, "Skipping event from the bot itself or without a sender");
            continue;
        }

        match &event.kind {
            EventKind::Message(message) => {
                info!(
                    sender = %event.sender.id,
                    text = %message.text_or_empty(),
                    attachments = message.attachments.len(),
                    "Message event"
                );
                dispatcher.handle_message(&event.sender.id, message).await;
            }
            EventKind::Postback(postback) => {
                info!(
                    sender = %event.sender.id,
                    payload = %postback.payload,
                    title = %postback.title,
                    "Postback event"
                );
                dispatcher.handle_postback(&event.sender.id, postback).await;
            }
            EventKind::Unsupported => {
                debug!(sender = %event.sender.id, "Ignoring unsupported event");
                continue;
            }
        }
        dispatched += 1;
    }

    dispatched
}
