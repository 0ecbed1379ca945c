//! Collector upload over HTTP.
//!
//! The engine hands reports to [`HttpSink`], which only serializes and queues
//! them. [`run_uploader`] posts the queued documents from its own task, so link
//! processing never waits on the network.

use hoptrail::{CollectorSink, DeliveryReport};
use log::{debug, warn};
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("report encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("uploader task has stopped")]
    Closed,
}

pub struct HttpSink {
    tx: UnboundedSender<String>,
}

impl HttpSink {
    /// Sink plus the receiving end for [`run_uploader`].
    pub fn new() -> (Self, UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl CollectorSink for HttpSink {
    type Error = SinkError;

    fn deliver(&self, report: &DeliveryReport) -> Result<(), Self::Error> {
        let document = report.to_json()?;
        self.tx.send(document).map_err(|_| SinkError::Closed)
    }
}

/// POST every queued document to `url` until all senders are gone.
///
/// Failures and non-2xx answers are logged; there is no retry.
pub async fn run_uploader(client: reqwest::Client, url: String, mut rx: UnboundedReceiver<String>) {
    while let Some(document) = rx.recv().await {
        let result = client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(document)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                debug!("collector accepted report ({})", resp.status());
            }
            Ok(resp) => warn!("collector rejected report: {}", resp.status()),
            Err(e) => warn!("collector upload failed: {}", e),
        }
    }
    debug!("uploader stopped");
}
