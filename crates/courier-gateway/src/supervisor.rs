//! Per-account connection supervisor.
//!
//! One task per managed account owns the streaming connection end to end:
//! handshake, frame reading, reconnect backoff, and cancellation. Side
//! effects are limited to queue publications and status transitions — the
//! supervisor never touches persistent storage, so everything it observes
//! is replayable through the queue.

use std::sync::Arc;
use std::time::Instant;

use courier_core::retry::ReconnectPolicy;
use courier_queue::EventBroker;
use futures::{SinkExt, StreamExt};
use metrics::counter;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::GatewayClient;
use crate::errors::GatewayError;
use crate::frames::{self, GatewayFrame};

/// Live connectivity of one supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionHealth {
    /// Handshake in progress (or reconnect pending).
    Connecting,
    /// Streaming connection established.
    Connected,
    /// No live connection.
    Disconnected,
}

impl std::fmt::Display for ConnectionHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        })
    }
}

/// Handle to one running supervisor.
///
/// The handle never references its owning manager; it only exposes status
/// reads and `stop`.
pub struct SupervisorHandle {
    account_id: String,
    status_rx: watch::Receiver<ConnectionHealth>,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl SupervisorHandle {
    /// The supervised account.
    #[must_use]
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Current connectivity.
    #[must_use]
    pub fn status(&self) -> ConnectionHealth {
        *self.status_rx.borrow()
    }

    /// Request shutdown without waiting. Idempotent: repeated signals are
    /// no-ops, and any pending reconnect timer is cancelled promptly.
    pub fn signal_stop(&self) {
        self.cancel.cancel();
    }

    /// Stop the supervisor and wait for its task to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(err) = self.task.await {
            if !err.is_cancelled() {
                warn!(account_id = %self.account_id, error = %err, "supervisor task panicked");
            }
        }
    }
}

/// Spawn a supervisor task for one account.
#[must_use]
pub fn spawn(
    account_id: String,
    client: Arc<GatewayClient>,
    broker: Arc<EventBroker>,
    policy: ReconnectPolicy,
) -> SupervisorHandle {
    let (status_tx, status_rx) = watch::channel(ConnectionHealth::Connecting);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run(
        account_id.clone(),
        client,
        broker,
        policy,
        cancel.clone(),
        status_tx,
    ));
    SupervisorHandle {
        account_id,
        status_rx,
        cancel,
        task,
    }
}

async fn run(
    account_id: String,
    client: Arc<GatewayClient>,
    broker: Arc<EventBroker>,
    policy: ReconnectPolicy,
    cancel: CancellationToken,
    status_tx: watch::Sender<ConnectionHealth>,
) {
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            break;
        }
        let _ = status_tx.send(ConnectionHealth::Connecting);

        let url = client.stream_url(&account_id);
        let handshake = tokio::time::timeout(client.connect_timeout(), connect_async(&url));
        let outcome = tokio::select! {
            () = cancel.cancelled() => break,
            outcome = handshake => outcome,
        };

        match outcome {
            Ok(Ok((stream, _response))) => {
                info!(account_id, "connection established");
                counter!("courier_supervisor_connects_total").increment(1);
                let connected_at = Instant::now();
                let _ = status_tx.send(ConnectionHealth::Connected);
                if let Some(event) = GatewayFrame::Connected.into_event(&account_id) {
                    broker.publish(event);
                }

                read_stream(stream, &account_id, &broker, &cancel).await;

                let _ = status_tx.send(ConnectionHealth::Disconnected);
                if let Some(event) = GatewayFrame::Disconnected.into_event(&account_id) {
                    broker.publish(event);
                }
                if cancel.is_cancelled() {
                    break;
                }
                // A stable connected period forgives the backoff history.
                if policy.is_stable(connected_at.elapsed()) {
                    attempt = 0;
                }
            }
            Ok(Err(err)) => {
                let err = GatewayError::WebSocket(err.to_string()).into_connectivity(&account_id);
                warn!(error = %err, "connection handshake failed");
                let _ = status_tx.send(ConnectionHealth::Disconnected);
            }
            Err(_elapsed) => {
                let err = GatewayError::WebSocket("handshake timed out".into())
                    .into_connectivity(&account_id);
                warn!(error = %err, "connection handshake failed");
                let _ = status_tx.send(ConnectionHealth::Disconnected);
            }
        }

        let delay = policy.delay_for(attempt);
        attempt = attempt.saturating_add(1);
        counter!("courier_supervisor_reconnects_total").increment(1);
        debug!(account_id, attempt, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    let _ = status_tx.send(ConnectionHealth::Disconnected);
    debug!(account_id, "supervisor stopped");
}

async fn read_stream(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    account_id: &str,
    broker: &EventBroker,
    cancel: &CancellationToken,
) {
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = sink.send(WsMessage::Close(None)).await;
                break;
            }
            frame = source.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => match frames::parse(&text) {
                    Ok(GatewayFrame::Qr { code }) => {
                        // Pairing codes are operator-facing, not pipeline events.
                        info!(account_id, code = %code, "pairing code received");
                    }
                    Ok(frame) => {
                        if let Some(event) = frame.into_event(account_id) {
                            broker.publish(event);
                        }
                    }
                    Err(err) => {
                        debug!(account_id, error = %err, "unparseable frame ignored");
                    }
                },
                Some(Ok(WsMessage::Ping(payload))) => {
                    let _ = sink.send(WsMessage::Pong(payload)).await;
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    debug!(account_id, "stream closed by gateway");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    let err = GatewayError::WebSocket(err.to_string()).into_connectivity(account_id);
                    warn!(error = %err, "stream read failed");
                    break;
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::GatewayConfig;
    use courier_core::event::EventKind;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn test_policy() -> ReconnectPolicy {
        ReconnectPolicy {
            base: Duration::from_millis(10),
            cap: Duration::from_millis(50),
            factor: 2,
            jitter: 0.0,
            stability_window: Duration::from_secs(30),
        }
    }

    fn client_for(base_url: String) -> Arc<GatewayClient> {
        Arc::new(
            GatewayClient::new(GatewayConfig {
                base_url,
                username: "admin".into(),
                password: "secret".into(),
                connect_timeout: Duration::from_secs(2),
                send_timeout: Duration::from_secs(2),
            })
            .unwrap(),
        )
    }

    /// One-shot websocket server: accepts a single connection, sends the
    /// given frames, then closes.
    async fn ws_server(frames: Vec<String>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            for frame in frames {
                ws.send(WsMessage::Text(frame.into())).await.unwrap();
            }
            ws.close(None).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn wait_for<F: Fn() -> bool>(cond: F) {
        for _ in 0..100 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn publishes_normalized_events_from_the_stream() {
        let base_url = ws_server(vec![
            r#"{"event":"message","id":"M1","sender":"alice@host","chat":"alice@host","body":"hi"}"#
                .to_string(),
        ])
        .await;

        let broker = Arc::new(EventBroker::new(3));
        let handle = spawn("acct_1".into(), client_for(base_url), Arc::clone(&broker), test_policy());

        // connected event + message event arrive in order.
        wait_for(|| broker.depth("acct_1") >= 2).await;
        let first = broker.try_next().unwrap();
        assert_eq!(first.event.kind, EventKind::ConnectionState);
        assert_eq!(first.event.body, "connected");
        broker.ack(first);

        let second = broker.try_next().unwrap();
        assert_eq!(second.event.kind, EventKind::Message);
        assert_eq!(second.event.external_id, "M1");
        broker.ack(second);

        handle.stop().await;
    }

    #[tokio::test]
    async fn server_close_emits_disconnect_and_schedules_reconnect() {
        let base_url = ws_server(vec![]).await;
        let broker = Arc::new(EventBroker::new(3));
        let handle = spawn("acct_y".into(), client_for(base_url), Arc::clone(&broker), test_policy());

        // connected then disconnected connection-state events.
        wait_for(|| broker.depth("acct_y") >= 2).await;
        let connected = broker.try_next().unwrap();
        assert_eq!(connected.event.body, "connected");
        broker.ack(connected);
        let disconnected = broker.try_next().unwrap();
        assert_eq!(disconnected.event.kind, EventKind::ConnectionState);
        assert_eq!(disconnected.event.body, "disconnected");
        broker.ack(disconnected);

        // The supervisor keeps retrying (the one-shot server is gone) and
        // reports disconnected/connecting, never a stale connected.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_ne!(handle.status(), ConnectionHealth::Connected);

        handle.stop().await;
    }

    #[tokio::test]
    async fn stop_is_prompt_and_idempotent() {
        // Unreachable endpoint: the supervisor sits in its backoff loop.
        let broker = Arc::new(EventBroker::new(3));
        let handle = spawn(
            "acct_z".into(),
            client_for("http://127.0.0.1:9".into()),
            broker,
            test_policy(),
        );

        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.signal_stop();
        handle.signal_stop();
        tokio::time::timeout(Duration::from_secs(1), handle.stop())
            .await
            .expect("stop resolved within the grace period");
    }
}
