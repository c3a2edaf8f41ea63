//! Buffered metrics-emission client for the waypulse collection API.
//!
//! Application code records point-in-time measurements (gauges, geohashes,
//! lat/lon positions) against a named entity; the client batches them and
//! POSTs JSON batches to the collection endpoint. Batches go out when the
//! buffer reaches capacity or on a background timer, whichever comes first.
//! Delivery is at-most-once: a batch that fails to send is logged and
//! dropped, never retried.
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use waypulse::{Client, Measurement};
//!
//! let client = Client::builder()
//!     .endpoint("https://ingest.example.com/v1/write")
//!     .credentials("api-key", "api-secret")
//!     .capacity(10)
//!     .build()?;
//!
//! client.record(Measurement::location("truck-7", 37.77, -122.42)).await?;
//! client.send_geohash("truck-8", "9Q8YY", Default::default()).await?;
//!
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod measurement;
mod sink;

#[cfg(test)]
mod testing;

pub use client::{Client, ClientBuilder, ClientError};
pub use config::{
    Config, ConfigError, DEFAULT_CAPACITY, DEFAULT_ENDPOINT, DEFAULT_FLUSH_INTERVAL,
    DEFAULT_WRITE_TIMEOUT,
};
pub use measurement::{Measurement, VALUE_GEOHASH, VALUE_LAT, VALUE_LON};
pub use sink::{HEADER_API_KEY, HEADER_API_SECRET, HttpSink, MetricSink, SinkError};
