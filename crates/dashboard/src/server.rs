use std::net::SocketAddr;

use {
    axum::{
        Json, Router,
        extract::{
            Path, State, WebSocketUpgrade,
            ws::{Message, WebSocket},
        },
        response::IntoResponse,
        routing::{get, post},
    },
    bytes::Bytes,
    chrono::{DateTime, Utc},
    futures::{SinkExt, StreamExt},
    serde_json::{Value, json},
    tokio::{net::TcpListener, sync::broadcast::error::RecvError},
    tokio_util::sync::CancellationToken,
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use ferry_metrics::{counter, dashboard as dashboard_metrics, gauge};

use crate::{
    error::{Context, Error, Result},
    history::{EventHistory, HISTORY_PAGE},
};

#[derive(Clone)]
pub struct DashboardState {
    pub history: EventHistory,
    started_at: DateTime<Utc>,
    #[cfg(feature = "prometheus")]
    metrics: Option<ferry_metrics::MetricsHandle>,
}

impl DashboardState {
    pub fn new(history: EventHistory) -> Self {
        Self {
            history,
            started_at: Utc::now(),
            #[cfg(feature = "prometheus")]
            metrics: None,
        }
    }

    #[cfg(feature = "prometheus")]
    #[must_use]
    pub fn with_metrics(mut self, handle: ferry_metrics::MetricsHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Build the dashboard router (shared between `serve` and tests).
pub fn build_router(state: DashboardState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new()
        .route("/discord-message", post(ingest_handler))
        .route("/ingest", post(ingest_handler))
        .route("/history", get(history_handler))
        .route("/history/{channel_id}", get(channel_history_handler))
        .route("/channels", get(channels_handler))
        .route("/status", get(status_handler))
        .route("/health", get(health_handler))
        .route("/ws", get(ws_upgrade_handler));

    #[cfg(feature = "prometheus")]
    let router = router.route("/metrics", get(prometheus_metrics_handler));

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `bind:port` and serve until `cancel` fires.
pub async fn serve(
    bind: &str,
    port: u16,
    state: DashboardState,
    cancel: CancellationToken,
) -> Result<()> {
    let addr = format!("{bind}:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind dashboard on {addr}"))?;
    serve_listener(listener, state, cancel).await
}

pub async fn serve_listener(
    listener: TcpListener,
    state: DashboardState,
    cancel: CancellationToken,
) -> Result<()> {
    let addr: SocketAddr = listener.local_addr()?;
    info!(%addr, "dashboard listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    info!("dashboard stopped");
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn ingest_handler(
    State(state): State<DashboardState>,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let parsed: Value = serde_json::from_slice(&body).map_err(|e| {
        #[cfg(feature = "metrics")]
        counter!(dashboard_metrics::EVENTS_REJECTED_TOTAL).increment(1);
        Error::invalid_event(e.to_string())
    })?;

    let event_type = parsed
        .get("event_type")
        .and_then(Value::as_str)
        .unwrap_or("message")
        .to_string();
    let author = parsed
        .pointer("/author/username")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();

    let timestamp = state.history.ingest(parsed).inspect_err(|_| {
        #[cfg(feature = "metrics")]
        counter!(dashboard_metrics::EVENTS_REJECTED_TOTAL).increment(1);
    })?;
    #[cfg(feature = "metrics")]
    counter!(dashboard_metrics::EVENTS_INGESTED_TOTAL).increment(1);
    info!(event_type = %event_type, author = %author, "event received");

    Ok(Json(json!({
        "status": "success",
        "message": "event recorded",
        "timestamp": timestamp,
    })))
}

async fn history_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let (messages, total) = state.history.recent(HISTORY_PAGE);
    Json(json!({ "messages": messages, "total": total }))
}

async fn channel_history_handler(
    State(state): State<DashboardState>,
    Path(channel_id): Path<String>,
) -> impl IntoResponse {
    let (messages, total) = state.history.channel_recent(&channel_id, HISTORY_PAGE);
    Json(json!({
        "messages": messages,
        "total": total,
        "channel_id": channel_id,
    }))
}

async fn channels_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let channels = state.history.channels();
    Json(json!({ "total": channels.len(), "channels": channels }))
}

async fn status_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let stats = state.history.stats();
    let now = Utc::now();
    Json(json!({
        "status": "running",
        "messages_count": stats.messages_count,
        "channels_monitored": stats.channels_monitored,
        "channels_with_messages": stats.channels_with_messages,
        "uptime_secs": (now - state.started_at).num_seconds(),
        "timestamp": now,
    }))
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(feature = "prometheus")]
async fn prometheus_metrics_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    use axum::http::{StatusCode, header};

    match state.metrics.as_ref().filter(|m| m.is_exporting()) {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain")],
            "Metrics not enabled".to_string(),
        ),
    }
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<DashboardState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_events(socket, state.history))
}

/// Push every newly ingested event to one WebSocket client until it leaves.
async fn stream_events(socket: WebSocket, history: EventHistory) {
    let mut events = history.subscribe();
    let (mut tx, mut rx) = socket.split();
    #[cfg(feature = "metrics")]
    gauge!(dashboard_metrics::SUBSCRIBERS_ACTIVE).increment(1.0);
    debug!("ws: subscriber connected");

    let hello = json!({ "event": "status", "message": "connected" }).to_string();
    if tx.send(Message::Text(hello.into())).await.is_ok() {
        loop {
            tokio::select! {
                incoming = rx.next() => match incoming {
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => {},
                },
                event = events.recv() => match event {
                    Ok(event) => {
                        let frame = json!({ "event": "new_message", "data": event }).to_string();
                        if tx.send(Message::Text(frame.into())).await.is_err() {
                            break;
                        }
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "ws: subscriber lagged, events dropped");
                    },
                    Err(RecvError::Closed) => break,
                },
            }
        }
    }

    #[cfg(feature = "metrics")]
    gauge!(dashboard_metrics::SUBSCRIBERS_ACTIVE).decrement(1.0);
    debug!("ws: subscriber disconnected");
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::history::ChannelInfo,
        reqwest::{Client, StatusCode},
    };

    struct Running {
        base: String,
        history: EventHistory,
        cancel: CancellationToken,
    }

    async fn start() -> Running {
        let history = EventHistory::new(1_000);
        history.register(ChannelInfo::configured(42, "Mirror", 1));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let cancel = CancellationToken::new();
        tokio::spawn(serve_listener(
            listener,
            DashboardState::new(history.clone()),
            cancel.clone(),
        ));
        Running {
            base,
            history,
            cancel,
        }
    }

    #[tokio::test]
    async fn ingest_then_query_history() {
        let server = start().await;
        let client = Client::new();

        let resp = client
            .post(format!("{}/discord-message", server.base))
            .json(&json!({
                "event_type": "message_relay",
                "channel_id": "42",
                "author": {"username": "alice"},
                "content": "hi",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "success");
        assert!(body["timestamp"].is_string());

        let all: Value = client
            .get(format!("{}/history", server.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(all["total"], 1);
        assert_eq!(all["messages"][0]["content"], "hi");

        let channel: Value = client
            .get(format!("{}/history/42", server.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(channel["channel_id"], "42");
        assert_eq!(channel["total"], 1);

        let empty: Value = client
            .get(format!("{}/history/999", server.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(empty["total"], 0);
        assert_eq!(empty["messages"], json!([]));

        server.cancel.cancel();
    }

    #[tokio::test]
    async fn alias_route_and_bad_bodies() {
        let server = start().await;
        let client = Client::new();

        let ok = client
            .post(format!("{}/ingest", server.base))
            .json(&json!({"channel_id": 7}))
            .send()
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);

        for body in ["[1,2]", "not json", ""] {
            let resp = client
                .post(format!("{}/discord-message", server.base))
                .header("content-type", "application/json")
                .body(body)
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "body {body:?}");
            let err: Value = resp.json().await.unwrap();
            assert!(err["error"].as_str().unwrap().starts_with("invalid event"));
        }

        assert_eq!(server.history.stats().messages_count, 1);
        server.cancel.cancel();
    }

    #[tokio::test]
    async fn channels_and_status() {
        let server = start().await;
        let client = Client::new();
        client
            .post(format!("{}/discord-message", server.base))
            .json(&json!({"channel_id": "77", "channel_name": "general"}))
            .send()
            .await
            .unwrap();

        let channels: Value = client
            .get(format!("{}/channels", server.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(channels["total"], 2);
        assert_eq!(channels["channels"][0]["id"], "42");
        assert_eq!(channels["channels"][1]["name"], "general");

        let status: Value = client
            .get(format!("{}/status", server.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["status"], "running");
        assert_eq!(status["messages_count"], 1);
        assert_eq!(status["channels_monitored"], 2);
        assert_eq!(status["channels_with_messages"], 1);

        let health = client
            .get(format!("{}/health", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        server.cancel.cancel();
    }
}
