//! Mock construction helpers

use async_trait::async_trait;
use pointflow::offload::{Receiver, ReceiverError};
use pointflow::{Category, Point};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

/// One delivery attempt seen by [`RecordingReceiver`]
#[derive(Debug, Clone)]
pub struct Delivery {
    pub route_index: usize,
    pub category: Category,
    pub names: Vec<String>,
    pub at: Instant,
}

/// Receiver that records every attempt and answers from a script of HTTP
/// statuses (200 once the script runs out)
#[derive(Default)]
pub struct RecordingReceiver {
    deliveries: Mutex<Vec<Delivery>>,
    answers: Mutex<VecDeque<u16>>,
    always: Option<u16>,
}

impl RecordingReceiver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer every attempt with `status`
    pub fn always(status: u16) -> Arc<Self> {
        Arc::new(Self {
            always: Some(status),
            ..Default::default()
        })
    }

    /// Answer attempts with `statuses` in order
    pub fn answering(statuses: &[u16]) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(statuses.iter().copied().collect()),
            ..Default::default()
        })
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }

    /// Batch sizes of every attempt, in order
    pub fn sizes(&self) -> Vec<usize> {
        self.deliveries().iter().map(|d| d.names.len()).collect()
    }
}

#[async_trait]
impl Receiver for RecordingReceiver {
    async fn send(
        &self,
        route_index: usize,
        category: Category,
        points: &[Point],
    ) -> Result<(), ReceiverError> {
        self.deliveries.lock().unwrap().push(Delivery {
            route_index,
            category,
            names: points.iter().map(|p| p.name().to_string()).collect(),
            at: Instant::now(),
        });
        let status = self
            .always
            .or_else(|| self.answers.lock().unwrap().pop_front())
            .unwrap_or(200);
        if status < 300 {
            Ok(())
        } else {
            Err(ReceiverError::Status {
                status,
                body: String::new(),
            })
        }
    }
}
