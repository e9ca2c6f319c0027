//! OKX public market-data feed.
//!
//! Subscribes to the `books5` channel for one instrument and keeps the
//! shared order book current. Reconnects with a capped backoff until the
//! stop flag is set. Every received text frame counts toward the activity
//! metric, whether or not it parses as a book update.

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::book::{Level, OrderBook};
use crate::config::ConnectorConfig;
use crate::error::{BenchError, Result};
use crate::state::RunState;

const CONNECT_TIMEOUT_SECS: u64 = 10;
// OKX drops connections idle for 30s; keepalive pings are application-level
// text frames, not websocket pings.
const PING_INTERVAL_SECS: u64 = 25;
const STOP_POLL_MILLIS: u64 = 250;
const MAX_RECONNECT_DELAY_SECS: u64 = 30;

#[derive(Debug, Serialize)]
struct SubscribeRequest<'a> {
    op: &'a str,
    args: [SubscribeArg<'a>; 1],
}

#[derive(Debug, Serialize)]
struct SubscribeArg<'a> {
    channel: &'a str,
    #[serde(rename = "instId")]
    inst_id: &'a str,
}

/// Push message on the books channel
#[derive(Debug, Deserialize)]
struct BookPush {
    #[allow(dead_code)]
    arg: PushArg,
    /// `snapshot` or `update` on the full books channel; absent on books5,
    /// where every push is a snapshot
    #[serde(default)]
    action: Option<String>,
    data: Vec<BookFrame>,
}

#[derive(Debug, Deserialize)]
struct PushArg {
    #[allow(dead_code)]
    channel: String,
    #[serde(rename = "instId")]
    #[allow(dead_code)]
    inst_id: String,
}

/// One ladder frame; levels are [price, size, liquidations, order_count]
#[derive(Debug, Deserialize)]
struct BookFrame {
    #[serde(default)]
    bids: Vec<[String; 4]>,
    #[serde(default)]
    asks: Vec<[String; 4]>,
    ts: String,
}

/// Subscription / error acknowledgement
#[derive(Debug, Deserialize)]
struct EventMessage {
    event: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

/// Ingestion worker owning the websocket connection
pub struct OkxFeed {
    config: ConnectorConfig,
    inst_id: String,
    book: Arc<Mutex<OrderBook>>,
    state: Arc<RunState>,
}

impl OkxFeed {
    pub fn new(
        config: ConnectorConfig,
        inst_id: impl Into<String>,
        book: Arc<Mutex<OrderBook>>,
        state: Arc<RunState>,
    ) -> Self {
        Self {
            config,
            inst_id: inst_id.into(),
            book,
            state,
        }
    }

    /// Run until the stop flag is set, reconnecting with a capped backoff
    pub async fn run(&self) -> Result<()> {
        let mut attempt: u32 = 0;

        while !self.state.is_stopped() {
            match self.connect_and_stream().await {
                Ok(()) => {
                    attempt = 0;
                }
                Err(e) => {
                    attempt += 1;
                    error!("feed connection error (attempt {attempt}): {e}");
                }
            }

            if self.state.is_stopped() {
                break;
            }

            let delay = reconnect_delay(attempt);
            debug!("reconnecting in {delay:?}");
            self.sleep_unless_stopped(delay).await;
        }

        info!(messages = self.state.messages_received(), "feed stopped");
        Ok(())
    }

    /// Backoff sleep that still honors the stop flag
    async fn sleep_unless_stopped(&self, total: Duration) {
        let step = Duration::from_millis(STOP_POLL_MILLIS);
        let mut waited = Duration::ZERO;
        while waited < total && !self.state.is_stopped() {
            tokio::time::sleep(step.min(total - waited)).await;
            waited += step;
        }
    }

    async fn connect_and_stream(&self) -> Result<()> {
        let url = Url::parse(&self.config.url_pub)?;
        info!("connecting to OKX feed: {url}");

        let (ws_stream, _) = tokio::time::timeout(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            connect_async(url.as_str()),
        )
        .await
        .map_err(|_| BenchError::Internal("OKX WebSocket connection timeout".to_string()))?
        .map_err(BenchError::WebSocket)?;

        let (mut write, mut read) = ws_stream.split();

        let sub = SubscribeRequest {
            op: "subscribe",
            args: [SubscribeArg {
                channel: "books5",
                inst_id: &self.inst_id,
            }],
        };
        write.send(Message::Text(serde_json::to_string(&sub)?)).await?;
        info!(inst_id = %self.inst_id, "subscribed to books5");

        let mut ping_interval = tokio::time::interval(Duration::from_secs(PING_INTERVAL_SECS));
        let mut stop_poll = tokio::time::interval(Duration::from_millis(STOP_POLL_MILLIS));

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_frame(&text);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) => {
                            info!("feed closed by server");
                            break;
                        }
                        Some(Err(e)) => {
                            return Err(BenchError::WebSocket(e));
                        }
                        None => {
                            info!("feed stream ended");
                            break;
                        }
                        _ => {}
                    }
                }
                _ = ping_interval.tick() => {
                    write.send(Message::Text("ping".to_string())).await?;
                    debug!("sent keepalive ping");
                }
                _ = stop_poll.tick() => {
                    if self.state.is_stopped() {
                        let _ = write.send(Message::Close(None)).await;
                        info!("feed observed stop flag, closing connection");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Handle one received text frame.
    ///
    /// The frame is counted before parsing; `pong` replies and frames that
    /// fail to parse still register as activity. Parse failures discard the
    /// single frame and leave the stream running.
    fn handle_frame(&self, text: &str) {
        self.state.inc_messages();

        if text == "pong" {
            return;
        }

        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                warn!("discarding unparseable frame: {e}");
                return;
            }
        };

        if value.get("event").is_some() {
            match serde_json::from_value::<EventMessage>(value) {
                Ok(ev) if ev.event == "error" => {
                    warn!(code = ?ev.code, msg = ?ev.msg, "feed error event");
                }
                Ok(ev) => debug!(event = %ev.event, "feed event"),
                Err(e) => warn!("discarding malformed event frame: {e}"),
            }
            return;
        }

        match serde_json::from_value::<BookPush>(value) {
            Ok(push) => self.apply_push(&push),
            Err(e) => warn!("discarding malformed book frame: {e}"),
        }
    }

    fn apply_push(&self, push: &BookPush) {
        for frame in &push.data {
            let bids = parse_levels(&frame.bids);
            let asks = parse_levels(&frame.asks);
            let ts = parse_ts(&frame.ts);

            // critical section: in-memory merge only, never I/O
            let mut book = match self.book.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if push.action.as_deref() == Some("update") {
                book.merge(&bids, &asks, ts);
            } else {
                book.replace(&bids, &asks, ts);
            }
        }
    }
}

/// Backoff before the next connection attempt. Never zero: a server that
/// closes cleanly on every connect must not produce a hot reconnect loop.
fn reconnect_delay(attempt: u32) -> Duration {
    let secs = u64::from(attempt).clamp(1, MAX_RECONNECT_DELAY_SECS);
    Duration::from_secs(secs)
}

fn parse_levels(raw: &[[String; 4]]) -> Vec<Level> {
    raw.iter()
        .filter_map(|level| match (level[0].parse::<f64>(), level[1].parse::<f64>()) {
            (Ok(price), Ok(size)) => Some((price, size)),
            _ => {
                warn!(price = %level[0], size = %level[1], "discarding malformed level");
                None
            }
        })
        .collect()
}

fn parse_ts(ts: &str) -> DateTime<Utc> {
    ts.parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(Utc::now)
}
