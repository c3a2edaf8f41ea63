use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::measurement::Measurement;
use crate::sink::{MetricSink, SinkError};

pub struct MockSinkState {
    pub sent: Mutex<Vec<Bytes>>,
}

impl MockSinkState {
    pub fn payload_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Decode every captured payload back into its measurement batch.
    pub fn batches(&self) -> Vec<Vec<Measurement>> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|payload| serde_json::from_slice(payload).expect("payload is not a JSON batch"))
            .collect()
    }
}

/// Accepts every payload and records it for inspection.
pub struct MockSink {
    state: Arc<MockSinkState>,
}

impl MockSink {
    pub fn new() -> (Self, Arc<MockSinkState>) {
        let state = Arc::new(MockSinkState {
            sent: Mutex::new(Vec::new()),
        });
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

impl MetricSink for MockSink {
    async fn send(&self, payload: Bytes) -> Result<(), SinkError> {
        self.state.sent.lock().unwrap().push(payload);
        Ok(())
    }
}

/// Rejects every payload, counting attempts.
pub struct FailingSink {
    attempts: Arc<AtomicUsize>,
}

impl FailingSink {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let attempts = Arc::new(AtomicUsize::new(0));
        (
            Self {
                attempts: Arc::clone(&attempts),
            },
            attempts,
        )
    }
}

impl MetricSink for FailingSink {
    async fn send(&self, _payload: Bytes) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(SinkError::Rejected {
            code: 500,
            result: "write failed".to_owned(),
        })
    }
}
