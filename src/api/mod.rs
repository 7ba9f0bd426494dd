//! Remote tier: the backend JSON API.
//!
//! - [`HttpApi`]: reqwest client against the real backend
//! - `FakeApi` (tests only): in-memory backend with an offline switch
//!
//! Everything above this module holds an `Arc<dyn MeetingApi>` and never
//! talks HTTP directly.

pub mod http;

#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{MeetingId, PollId};
use crate::meeting::{Meeting, PastMeeting, Report};
use crate::poll::{Poll, PollDraft};
use crate::resident::Resident;
use crate::stats::StatsSnapshot;

pub use http::HttpApi;

/// Failure of a single backend call.
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    /// Connection refused, DNS failure, timeout.
    #[error("request failed: {0}")]
    Network(String),

    /// Non-2xx answer. `message` is the server's own explanation, if it sent one.
    #[error("HTTP {status}{}", .message.as_ref().map(|m| format!(": {m}")).unwrap_or_default())]
    Status { status: u16, message: Option<String> },

    /// 2xx answer whose body could not be decoded.
    #[error("unexpected response body: {0}")]
    Decode(String),
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Body of `POST /api/votes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePollRequest {
    pub title: String,
    pub description: String,
    pub options: Vec<String>,
    pub allow_multiple: bool,
    pub created_by: String,
    pub meeting_id: MeetingId,
}

impl From<&PollDraft> for CreatePollRequest {
    fn from(draft: &PollDraft) -> Self {
        Self {
            title: draft.title.clone(),
            description: draft.description.clone().unwrap_or_default(),
            options: draft.options.clone(),
            allow_multiple: draft.allow_multiple,
            created_by: draft.created_by.clone(),
            meeting_id: draft.meeting_id.clone(),
        }
    }
}

/// Body of `POST /api/votes/{id}/submit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotRequest {
    pub user_name: String,
    pub selected_options: Vec<String>,
}

/// Body of `POST /api/votes/{id}/cancel`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelBallotRequest {
    pub user_name: String,
}

/// Body of `POST /api/reports/{meetingId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportUpdate {
    pub report_url: String,
}

/// The backend consumed by the client.
///
/// Implementations perform exactly one request per call: no caching, no
/// retries, no fallback. Those policies live in the sync engine and session.
#[async_trait]
pub trait MeetingApi: Send + Sync {
    /// Human-readable backend name (e.g., "http", "fake").
    fn backend_name(&self) -> &str;

    // ── Polls ────────────────────────────────────────────────────────

    async fn list_polls(&self, meeting_id: &MeetingId) -> ApiResult<Vec<Poll>>;

    async fn create_poll(&self, request: &CreatePollRequest) -> ApiResult<Poll>;

    async fn submit_ballot(&self, poll_id: &PollId, ballot: &BallotRequest) -> ApiResult<Poll>;

    async fn cancel_ballot(&self, poll_id: &PollId, request: &CancelBallotRequest)
        -> ApiResult<()>;

    async fn close_poll(&self, poll_id: &PollId) -> ApiResult<()>;

    // ── Participant statistics ──────────────────────────────────────

    async fn save_participant_stats(&self, stats: &StatsSnapshot) -> ApiResult<()>;

    async fn load_participant_stats(&self) -> ApiResult<StatsSnapshot>;

    // ── Meetings ─────────────────────────────────────────────────────

    async fn list_meetings(&self) -> ApiResult<Vec<Meeting>>;

    async fn create_meeting(&self, meeting: &Meeting) -> ApiResult<Meeting>;

    async fn delete_meeting(&self, meeting_id: &MeetingId) -> ApiResult<()>;

    // ── Past meetings and reports ────────────────────────────────────

    async fn list_past_meetings(&self) -> ApiResult<Vec<PastMeeting>>;

    async fn save_past_meeting(&self, meeting: &PastMeeting) -> ApiResult<()>;

    async fn delete_past_meeting(&self, meeting_id: &MeetingId) -> ApiResult<()>;

    async fn get_report(&self, meeting_id: &MeetingId) -> ApiResult<Report>;

    async fn update_report(&self, meeting_id: &MeetingId, update: &ReportUpdate)
        -> ApiResult<Report>;

    // ── Residents ───────────────────────────────────────────────────

    async fn list_residents(&self) -> ApiResult<Vec<Resident>>;

    async fn save_residents(&self, residents: &[Resident]) -> ApiResult<()>;
}
