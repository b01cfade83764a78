use crate::api::schemas::gateway::{AckFrame, InboundFrame};
use crate::config::WsConfig;
use crate::domain::event::{ClientEvent, ErrorPayload, ServerEvent};
use crate::error::AppError;
use crate::services::gateway::Metrics;
use crate::services::gateway::router::{ConnectionContext, Dispatch, EventRouter};
use crate::services::presence::{ConnectionHandle, PresenceRegistry};
use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, close_code};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use opentelemetry::KeyValue;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

type WsSink = SplitSink<WebSocket, WsMessage>;

enum Flow {
    Continue,
    Close,
}

pub(crate) struct Session {
    pub(crate) connection_id: Uuid,
    pub(crate) user_id: Option<Uuid>,
    pub(crate) request_id: String,
    pub(crate) socket: WebSocket,
    pub(crate) router: EventRouter,
    pub(crate) presence: PresenceRegistry,
    pub(crate) metrics: Metrics,
    pub(crate) config: WsConfig,
    pub(crate) shutdown_rx: watch::Receiver<bool>,
}

impl Session {
    #[tracing::instrument(
        name = "websocket_session",
        skip(self),
        fields(
            user_id = ?self.user_id,
            connection_id = %self.connection_id,
            request_id = %self.request_id,
            otel.kind = "server"
        )
    )]
    pub(crate) async fn run(self) {
        let Self { connection_id, user_id, socket, router, presence, metrics, config, mut shutdown_rx, .. } = self;

        metrics.active_connections.add(1, &[]);
        tracing::info!("WebSocket connected");

        let (mut ws_sink, mut ws_stream) = socket.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerEvent>(config.outbound_buffer_size);

        // Anonymous connections are never addressed, so their outbound channel stays closed.
        let bound = match user_id {
            Some(user_id) => presence.register(user_id, ConnectionHandle::new(connection_id, outbound_tx)).await,
            None => {
                drop(outbound_tx);
                Ok(())
            }
        };
        if let Err(e) = bound {
            let _ = send_json(&mut ws_sink, &ServerEvent::Error(ErrorPayload::from_error(None, &e))).await;
            let _ = ws_sink
                .send(WsMessage::Close(Some(CloseFrame { code: close_code::POLICY, reason: "Unknown user".into() })))
                .await;
            metrics.active_connections.add(-1, &[]);
            tracing::info!("WebSocket rejected");
            return;
        }

        let ctx = ConnectionContext { connection_id, user_id };

        let ping_every = Duration::from_secs(config.ping_interval_secs);
        let idle_limit = ping_every + Duration::from_secs(config.ping_timeout_secs);
        let mut heartbeat = tokio::time::interval_at(Instant::now() + ping_every, ping_every);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_seen = Instant::now();

        loop {
            if *shutdown_rx.borrow() {
                tracing::info!("Shutdown signal received, closing WebSocket");
                let _ = ws_sink
                    .send(WsMessage::Close(Some(CloseFrame {
                        code: close_code::AWAY,
                        reason: "Server shutting down".into(),
                    })))
                    .await;
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        tracing::debug!("Shutdown channel closed");
                        break;
                    }
                }

                msg = ws_stream.next() => {
                    last_seen = Instant::now();
                    let flow = match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            handle_text(&router, &ctx, &metrics, text.as_str(), &mut ws_sink).await
                        }
                        Some(Ok(WsMessage::Binary(_))) => {
                            let e = AppError::InvalidArgument("binary frames are not supported".into());
                            report(&mut ws_sink, None, None, &e).await
                        }
                        Some(Ok(WsMessage::Ping(_))) => {
                            tracing::debug!("Received heartbeat ping from client");
                            Flow::Continue
                        }
                        Some(Ok(WsMessage::Pong(_))) => {
                            tracing::debug!("Received heartbeat pong from client");
                            Flow::Continue
                        }
                        Some(Ok(WsMessage::Close(_)) | Err(_)) | None => Flow::Close,
                    };

                    if matches!(flow, Flow::Close) { break; }
                }

                Some(event) = outbound_rx.recv() => {
                    if send_json(&mut ws_sink, &event).await.is_err() { break; }
                }

                _ = heartbeat.tick() => {
                    if last_seen.elapsed() > idle_limit {
                        tracing::info!(idle_ms = last_seen.elapsed().as_millis(), "Heartbeat timed out");
                        metrics.heartbeat_timeouts_total.add(1, &[]);
                        break;
                    }
                    if ws_sink.send(WsMessage::Ping(Bytes::new())).await.is_err() { break; }
                }
            }
        }

        if let Some(user_id) = user_id {
            presence.unregister(user_id, connection_id).await;
        }
        let _ = ws_sink.close().await;

        metrics.active_connections.add(-1, &[]);
        tracing::info!("WebSocket disconnected");
    }
}

/// Handles one inbound frame to completion before the next one is read.
async fn handle_text(
    router: &EventRouter,
    ctx: &ConnectionContext,
    metrics: &Metrics,
    text: &str,
    sink: &mut WsSink,
) -> Flow {
    let frame: InboundFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(error = %e, "Failed to decode inbound frame");
            metrics.events_total.add(1, &[KeyValue::new("event", "invalid")]);
            let e = AppError::InvalidArgument("malformed frame".into());
            return report(sink, None, None, &e).await;
        }
    };

    let event = match ClientEvent::decode(&frame.event, frame.data) {
        Ok(event) => event,
        Err(e) => {
            metrics.events_total.add(1, &[KeyValue::new("event", "invalid")]);
            return report(sink, Some(&frame.event), frame.ack, &e).await;
        }
    };

    let name = event.name();
    metrics.events_total.add(1, &[KeyValue::new("event", name)]);

    let ack = match (event.expects_callback(), frame.ack) {
        (true, None) => {
            let e = AppError::InvalidArgument(format!("{name} requires an ack id"));
            return report(sink, Some(name), None, &e).await;
        }
        (_, ack) => ack,
    };

    let sent = match router.dispatch(ctx, event).await {
        Dispatch::Done => Ok(()),
        Dispatch::Reply(event) => send_json(sink, &event).await,
        Dispatch::Callback(result) => match ack {
            Some(ack) => send_json(sink, &AckFrame::from_result(ack, result)).await,
            None => Ok(()),
        },
        Dispatch::Failed(e) => return report(sink, Some(name), ack, &e).await,
        Dispatch::Close => return Flow::Close,
    };

    if sent.is_ok() { Flow::Continue } else { Flow::Close }
}

/// Tells the client an event failed: through its ack if it gave one, else as an `error` event.
async fn report(sink: &mut WsSink, event: Option<&str>, ack: Option<u64>, error: &AppError) -> Flow {
    tracing::debug!(event, code = error.code(), error = %error, "Event rejected");

    let sent = match ack {
        Some(ack) => send_json(sink, &AckFrame::error(ack, error)).await,
        None => send_json(sink, &ServerEvent::Error(ErrorPayload::from_error(event, error))).await,
    };

    if sent.is_ok() { Flow::Continue } else { Flow::Close }
}

async fn send_json<T: Serialize>(sink: &mut WsSink, value: &T) -> Result<(), axum::Error> {
    match serde_json::to_string(value) {
        Ok(text) => sink.send(WsMessage::Text(text.into())).await,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode outbound frame");
            Ok(())
        }
    }
}
