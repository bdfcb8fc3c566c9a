//! Best-effort reporting to the external match record service.
//!
//! Persisting results, paying out wagers, and updating leaderboards are
//! downstream concerns; the coordinator only emits one call per event and
//! never rolls back in-memory state when that call fails. Failures are
//! logged and left for reconciliation.

use futures::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::dto::battle::PlayerScore;

/// Result alias for reporting operations.
pub type ReportResult = Result<(), ReportError>;

/// Error raised by a reporter backend.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The record service rejected or never received the call.
    #[error("report endpoint error: {0}")]
    Endpoint(#[from] reqwest::Error),
}

/// Abstraction over the external match record service.
pub trait MatchReporter: Send + Sync {
    /// Record a finished match's scores and winner.
    fn report_result(
        &self,
        match_id: String,
        scores: Vec<PlayerScore>,
        winner: Option<String>,
    ) -> BoxFuture<'static, ReportResult>;

    /// Flip the external match record to its in-progress status.
    fn mark_in_progress(&self, match_id: String) -> BoxFuture<'static, ReportResult>;
}

/// Reporter that posts JSON to a configured HTTP endpoint.
pub struct HttpReporter {
    client: reqwest::Client,
    base_url: String,
}

impl HttpReporter {
    /// Create a reporter targeting `base_url` (no trailing slash).
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResultBody {
    match_id: String,
    scores: Vec<PlayerScore>,
    winner: Option<String>,
}

#[derive(Serialize)]
struct StatusBody {
    status: &'static str,
}

impl MatchReporter for HttpReporter {
    fn report_result(
        &self,
        match_id: String,
        scores: Vec<PlayerScore>,
        winner: Option<String>,
    ) -> BoxFuture<'static, ReportResult> {
        let client = self.client.clone();
        let url = format!("{}/matches/{}/result", self.base_url, match_id);
        Box::pin(async move {
            client
                .post(url)
                .json(&ResultBody {
                    match_id,
                    scores,
                    winner,
                })
                .send()
                .await?
                .error_for_status()?;
            Ok(())
        })
    }

    fn mark_in_progress(&self, match_id: String) -> BoxFuture<'static, ReportResult> {
        let client = self.client.clone();
        let url = format!("{}/matches/{}/status", self.base_url, match_id);
        Box::pin(async move {
            client
                .post(url)
                .json(&StatusBody {
                    status: "in_progress",
                })
                .send()
                .await?
                .error_for_status()?;
            Ok(())
        })
    }
}

/// Reporter used when no endpoint is configured; logs and discards.
pub struct NoopReporter;

impl MatchReporter for NoopReporter {
    fn report_result(
        &self,
        match_id: String,
        scores: Vec<PlayerScore>,
        winner: Option<String>,
    ) -> BoxFuture<'static, ReportResult> {
        debug!(
            %match_id,
            ?winner,
            scores = scores.len(),
            "no report endpoint configured; discarding match result"
        );
        Box::pin(async { Ok(()) })
    }

    fn mark_in_progress(&self, match_id: String) -> BoxFuture<'static, ReportResult> {
        debug!(%match_id, "no report endpoint configured; discarding status update");
        Box::pin(async { Ok(()) })
    }
}

/// Run a reporting call in the background, logging any failure.
pub fn fire_and_forget(fut: BoxFuture<'static, ReportResult>, context: &'static str) {
    tokio::spawn(async move {
        if let Err(err) = fut.await {
            warn!(error = %err, context, "best-effort report failed");
        }
    });
}
