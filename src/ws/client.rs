//! WebSocket client with bounded automatic reconnection

use super::types::{WsConfig, WsError, WsMessage};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// How an established connection came to an end
enum StreamEnd {
    /// Consumer dropped the receiver; stop without reconnecting
    ReceiverDropped,
    /// Connection was up and then ended
    Lost(WsError),
}

/// Reconnecting WebSocket client
///
/// Both connect failures and terminations of an established stream count
/// as failures. Each failure is followed by a reconnection attempt after an
/// increasing delay; a successful connect resets the budget.
pub struct WsClient {
    config: WsConfig,
}

impl WsClient {
    /// Create a new WebSocket client with the given configuration
    pub fn new(config: WsConfig) -> Self {
        Self { config }
    }

    /// Get the configured URL
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Spawn the connection task and return its event receiver
    ///
    /// The final event is [`WsMessage::Exhausted`] once the reconnect budget
    /// is spent. The channel then closes.
    pub fn connect(&self) -> mpsc::Receiver<WsMessage> {
        let (tx, rx) = mpsc::channel(1024);
        let config = self.config.clone();

        tokio::spawn(async move {
            if let Err(e) = Self::run_connection_loop(config, tx).await {
                tracing::error!(error = %e, "WebSocket connection loop stopped");
            }
        });

        rx
    }

    async fn run_connection_loop(
        config: WsConfig,
        tx: mpsc::Sender<WsMessage>,
    ) -> Result<(), WsError> {
        let mut attempts: u32 = 0;

        loop {
            let failure = match Self::connect_and_stream(&config, &tx).await {
                Ok(StreamEnd::ReceiverDropped) => {
                    tracing::debug!("Receiver dropped, stopping connection loop");
                    return Ok(());
                }
                Ok(StreamEnd::Lost(e)) => {
                    attempts = 0;
                    e
                }
                Err(e) => e,
            };

            attempts += 1;
            if config.max_reconnect_attempts > 0 && attempts > config.max_reconnect_attempts {
                tracing::error!(
                    attempts = attempts - 1,
                    error = %failure,
                    "Max reconnection attempts reached"
                );
                let _ = tx
                    .send(WsMessage::Exhausted {
                        attempts: attempts - 1,
                    })
                    .await;
                return Err(WsError::MaxReconnectsExceeded);
            }

            if tx.is_closed() {
                return Ok(());
            }

            let delay = config.backoff(attempts);
            tracing::warn!(
                error = %failure,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                "WebSocket failure, reconnecting"
            );
            let _ = tx
                .send(WsMessage::Reconnecting {
                    attempt: attempts,
                    delay,
                })
                .await;

            sleep(delay).await;
        }
    }

    async fn connect_and_stream(
        config: &WsConfig,
        tx: &mpsc::Sender<WsMessage>,
    ) -> Result<StreamEnd, WsError> {
        tracing::info!(url = %config.url, "Connecting to WebSocket");

        let (ws_stream, _response) = connect_async(&config.url)
            .await
            .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();

        if tx.send(WsMessage::Connected).await.is_err() {
            return Ok(StreamEnd::ReceiverDropped);
        }

        let mut ping_interval = tokio::time::interval(config.ping_interval);
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // first tick completes immediately
        ping_interval.tick().await;
        let mut waiting_for_pong = false;

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if tx.send(WsMessage::Text(text)).await.is_err() {
                                return Ok(StreamEnd::ReceiverDropped);
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                return Ok(StreamEnd::Lost(WsError::SendFailed(e.to_string())));
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {
                            waiting_for_pong = false;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let reason = frame
                                .map(|f| f.reason.to_string())
                                .unwrap_or_else(|| "close frame".to_string());
                            return Ok(StreamEnd::Lost(WsError::Terminated(reason)));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Ok(StreamEnd::Lost(WsError::Terminated(e.to_string())));
                        }
                        None => {
                            return Ok(StreamEnd::Lost(WsError::Terminated(
                                "stream ended".into(),
                            )));
                        }
                    }
                }

                _ = ping_interval.tick() => {
                    if waiting_for_pong {
                        return Ok(StreamEnd::Lost(WsError::Terminated("pong timeout".into())));
                    }
                    if let Err(e) = write.send(Message::Ping(vec![])).await {
                        return Ok(StreamEnd::Lost(WsError::SendFailed(e.to_string())));
                    }
                    waiting_for_pong = true;
                }
            }
        }
    }
}
