//! Job query protocol types
//!
//! A report is produced by a server-side job. The first request opens the job
//! and every response carries the `jobId` to echo back. While the job is
//! running the status is something other than `COMPLETED`; once completed,
//! each response carries one page of data plus a `pageToken` when more pages
//! remain.

use crate::fetcher::{FetcherError, FetcherResult};
use crate::relay::TimeWindow;
use crate::UsageRecord;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Status value marking a finished job (compared case-insensitively)
pub const COMPLETED_STATUS: &str = "COMPLETED";

/// Job status reported by the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// Results are available
    Completed,
    /// Job still processing; the raw status is kept for logging
    Processing(String),
}

impl JobStatus {
    /// Interpret a raw status string
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case(COMPLETED_STATUS) {
            JobStatus::Completed
        } else {
            JobStatus::Processing(raw.to_string())
        }
    }

    /// Whether the job has completed
    pub fn is_completed(&self) -> bool {
        matches!(self, JobStatus::Completed)
    }
}

/// One response of the reporting API
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    /// Job identifier to echo on the next request
    #[serde(default)]
    pub job_id: Option<String>,
    /// Cursor for the next page, if any
    #[serde(default)]
    pub page_token: Option<String>,
    /// Job status
    #[serde(default)]
    pub status: Option<String>,
    /// Total record count for the query (informational)
    ///
    /// Values that are not a non-negative integer, or a string holding one,
    /// decode as `None` rather than failing the response.
    #[serde(default, deserialize_with = "lenient_total")]
    pub total: Option<u64>,
    /// Records of this page
    #[serde(default)]
    pub data: Option<Vec<UsageRecord>>,
}

fn lenient_total<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::Number(n)) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// What the poller does after a response has been applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobTransition {
    /// Job still running: re-issue the same request
    Processing,
    /// Completed with a page token: fetch the next page
    NextPage,
    /// Completed without a page token: query exhausted
    Exhausted,
}

/// Protocol state threaded through the requests of one job query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobQueryState {
    job_id: Option<String>,
    page_token: Option<String>,
    status: Option<JobStatus>,
}

impl JobQueryState {
    /// Fresh state for a new query
    pub fn new() -> Self {
        Self::default()
    }

    /// Job identifier assigned by the service
    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    /// Page token to echo on the next request
    pub fn page_token(&self) -> Option<&str> {
        self.page_token.as_deref()
    }

    /// Status of the last response
    pub fn status(&self) -> Option<&JobStatus> {
        self.status.as_ref()
    }

    /// Query parameters for the next request
    ///
    /// `from`, `to` and `pageSize` are always sent; `jobId` and `pageToken`
    /// only once the service has assigned them.
    pub fn query_params(&self, window: &TimeWindow, page_size: usize) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("from", window.from_param()),
            ("to", window.to_param()),
            ("pageSize", page_size.to_string()),
        ];

        if let Some(job_id) = &self.job_id {
            params.push(("jobId", job_id.clone()));
        }

        if let Some(token) = &self.page_token {
            params.push(("pageToken", token.clone()));
        }

        params
    }

    /// Fold a response into the state and decide the next step.
    ///
    /// The completion test is evaluated here, exactly once per response.
    ///
    /// # Errors
    ///
    /// Returns [`FetcherError::InvalidResponse`] if the response lacks a
    /// `jobId` or a `status`.
    pub fn apply(&mut self, response: &JobResponse) -> FetcherResult<JobTransition> {
        let job_id = response
            .job_id
            .as_ref()
            .ok_or_else(|| FetcherError::InvalidResponse("jobId is not defined in the response".to_string()))?;
        self.job_id = Some(job_id.clone());

        self.page_token = response.page_token.clone().filter(|token| !token.is_empty());

        let raw_status = response
            .status
            .as_deref()
            .ok_or_else(|| FetcherError::InvalidResponse("status is not defined in the response".to_string()))?;
        let status = JobStatus::parse(raw_status);
        let completed = status.is_completed();
        self.status = Some(status);

        Ok(match (completed, self.page_token.is_some()) {
            (false, _) => JobTransition::Processing,
            (true, true) => JobTransition::NextPage,
            (true, false) => JobTransition::Exhausted,
        })
    }
}
