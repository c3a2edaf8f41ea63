use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{
    self, Config, DEFAULT_CAPACITY, DEFAULT_ENDPOINT, DEFAULT_FLUSH_INTERVAL,
    DEFAULT_WRITE_TIMEOUT,
};
use crate::measurement::Measurement;
use crate::sink::{HttpSink, MetricSink, SinkError};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("failed to encode batch: {0}")]
    Encode(#[from] serde_json::Error),
}

/// State shared by every handle to one client instance.
///
/// `pending` is the only shared mutable resource; every append, length
/// check, and drain happens under its lock. The lock is a tokio mutex
/// because the drain path keeps it held across the `send` await: observing
/// a full buffer and draining it must be atomic against concurrent appends,
/// at the cost of blocking other appenders during a send.
struct Shared<S: MetricSink> {
    sink: S,
    capacity: usize,
    pending: Mutex<Vec<Measurement>>,
    cancel: CancellationToken,
    timer_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl<S: MetricSink> Drop for Shared<S> {
    fn drop(&mut self) {
        // Last handle gone; the timer task holds only a weak reference and
        // must not keep ticking.
        if let Some(handle) = self.timer_task.get_mut().ok().and_then(|t| t.take()) {
            handle.abort();
        }
    }
}

/// Buffered metrics-emission client.
///
/// Safe to use from any number of tasks: handles are cheap clones sharing
/// one buffer, one stop signal, and one background flush timer. With a
/// capacity of N > 0, measurements accumulate until the N-th record or the
/// next timer fire, whichever comes first; with a capacity of 0 every
/// record is sent immediately.
///
/// Construction spawns the timer task and therefore must happen inside a
/// tokio runtime.
pub struct Client<S: MetricSink = HttpSink> {
    shared: Arc<Shared<S>>,
}

impl<S: MetricSink> Clone for Client<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Client<HttpSink> {
    /// A buffered client against the production endpoint with default
    /// capacity and flush interval.
    pub fn new(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Result<Self, config::ConfigError> {
        Self::builder().credentials(api_key, api_secret).build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }
}

impl<S: MetricSink> Client<S> {
    /// Build a client over a custom sink. `flush_interval` must be non-zero.
    pub fn with_sink(sink: S, capacity: usize, flush_interval: Duration) -> Self {
        let shared = Arc::new(Shared {
            sink,
            capacity,
            pending: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
            timer_task: std::sync::Mutex::new(None),
        });
        let handle = spawn_timer(&shared, flush_interval);
        *shared.timer_task.lock().unwrap() = Some(handle);
        Self { shared }
    }

    /// Record one measurement.
    ///
    /// Unbuffered clients send it immediately and surface the sink's result.
    /// Buffered clients append it and return `Ok`; if the append fills the
    /// buffer, the resulting inline flush runs before this call returns, but
    /// its outcome is not reported here (no caller is waiting on that batch;
    /// failures are logged and the batch is discarded).
    pub async fn record(&self, measurement: Measurement) -> Result<(), ClientError> {
        if self.shared.cancel.is_cancelled() {
            debug!(entity_id = %measurement.entity_id, "record after close dropped");
            return Ok(());
        }

        if self.shared.capacity == 0 {
            let payload = serde_json::to_vec(&[&measurement])?;
            self.shared.sink.send(Bytes::from(payload)).await?;
            return Ok(());
        }

        let mut pending = self.shared.pending.lock().await;
        pending.push(measurement);
        if pending.len() == self.shared.capacity {
            let batched = pending.len();
            if let Err(e) = drain(&self.shared.sink, &mut pending).await {
                warn!(error = %e, batched, "capacity flush failed, batch dropped");
            }
        }
        Ok(())
    }

    /// Record a gauge: the value of one or more named quantities right now.
    pub async fn send_gauge(
        &self,
        entity_id: &str,
        values: HashMap<String, Value>,
        tags: HashMap<String, String>,
    ) -> Result<(), ClientError> {
        self.record(Measurement::gauge(entity_id, values).with_tags(tags))
            .await
    }

    /// Record a geohash position report.
    pub async fn send_geohash(
        &self,
        entity_id: &str,
        geohash: &str,
        tags: HashMap<String, String>,
    ) -> Result<(), ClientError> {
        self.record(Measurement::geohash(entity_id, geohash).with_tags(tags))
            .await
    }

    /// Record a latitude/longitude position report.
    pub async fn send_location(
        &self,
        entity_id: &str,
        lat: f64,
        lon: f64,
        tags: HashMap<String, String>,
    ) -> Result<(), ClientError> {
        self.record(Measurement::location(entity_id, lat, lon).with_tags(tags))
            .await
    }

    /// Send everything currently buffered as one batch.
    ///
    /// A no-op on an empty buffer: the sink is not invoked, so two
    /// back-to-back flushes never double-send.
    pub async fn flush(&self) -> Result<(), ClientError> {
        let mut pending = self.shared.pending.lock().await;
        drain(&self.shared.sink, &mut pending).await
    }

    /// Stop the background timer and, for buffered clients, send one final
    /// batch of whatever is pending.
    ///
    /// Idempotent: the stop signal fires at most once and a repeated close
    /// finds an empty buffer. Measurements recorded after close are dropped.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.shared.cancel.cancel();

        if self.shared.capacity > 0 {
            return self.flush().await;
        }
        Ok(())
    }

    /// Number of measurements currently buffered.
    pub async fn pending_len(&self) -> usize {
        self.shared.pending.lock().await.len()
    }
}

/// Serialize and send everything in `pending` as one batch. The buffer is
/// truncated whether or not encoding or sending succeeds; a failed batch
/// is never retried and never re-buffered.
///
/// Callers hold the buffer lock for the duration.
async fn drain<S: MetricSink>(
    sink: &S,
    pending: &mut Vec<Measurement>,
) -> Result<(), ClientError> {
    if pending.is_empty() {
        return Ok(());
    }

    let encoded = serde_json::to_vec(&pending);
    pending.clear();
    sink.send(Bytes::from(encoded?)).await?;
    Ok(())
}

/// Spawn the repeating flush timer for a client instance.
///
/// The task owns a weak reference only, so dropping the last client handle
/// ends it. Cancellation via the stop signal ends it permanently; it never
/// restarts.
fn spawn_timer<S: MetricSink>(shared: &Arc<Shared<S>>, period: Duration) -> JoinHandle<()> {
    let weak = Arc::downgrade(shared);
    let cancel = shared.cancel.clone();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick of a tokio interval completes immediately; swallow
        // it so the first automatic flush lands one full period in.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(shared) = weak.upgrade() else { break };
                    let mut pending = shared.pending.lock().await;
                    if pending.is_empty() {
                        continue;
                    }
                    let batched = pending.len();
                    if let Err(e) = drain(&shared.sink, &mut pending).await {
                        warn!(error = %e, batched, "timer flush failed, batch dropped");
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
    })
}

/// Configures and connects a [`Client`] over the HTTP sink.
pub struct ClientBuilder {
    endpoint: String,
    api_key: String,
    api_secret: String,
    capacity: usize,
    flush_interval: Duration,
    write_timeout: Duration,
    accept_invalid_certs: bool,
}

impl ClientBuilder {
    fn new() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            api_key: String::new(),
            api_secret: String::new(),
            capacity: DEFAULT_CAPACITY,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            accept_invalid_certs: false,
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn credentials(
        mut self,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        self.api_key = api_key.into();
        self.api_secret = api_secret.into();
        self
    }

    /// Buffer capacity. 0 disables buffering: every record sends
    /// immediately.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Interval between automatic flush attempts. Must be non-zero.
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Skip TLS certificate verification. Forwarded to the sink untouched.
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    pub fn build(self) -> Result<Client<HttpSink>, config::ConfigError> {
        let config = Config {
            endpoint: config::parse_endpoint(&self.endpoint)?,
            api_key: self.api_key,
            api_secret: self.api_secret,
            capacity: self.capacity,
            flush_interval: self.flush_interval,
            write_timeout: self.write_timeout,
            accept_invalid_certs: self.accept_invalid_certs,
        };
        let sink = HttpSink::new(&config);
        Ok(Client::with_sink(
            sink,
            config.capacity,
            config.flush_interval,
        ))
    }
}
