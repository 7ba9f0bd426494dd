use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client as HttpClient, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::{
    ApiError, ApiResult, BallotRequest, CancelBallotRequest, CreatePollRequest, MeetingApi,
    ReportUpdate,
};
use crate::ids::{MeetingId, PollId};
use crate::meeting::{Meeting, PastMeeting, Report};
use crate::poll::Poll;
use crate::resident::Resident;
use crate::stats::StatsSnapshot;

/// Client for the backend's JSON API.
///
/// Read calls (lists and loads) are bounded by `read_timeout`; writes run to
/// completion or failure.
pub struct HttpApi {
    base_url: String,
    http_client: HttpClient,
    read_timeout: Duration,
}

impl HttpApi {
    pub fn new(base_url: &str, read_timeout: Duration) -> Result<Self> {
        let http_client = HttpClient::builder()
            .user_agent(concat!("townhall/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
            read_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and turn anything but 2xx into an [`ApiError`].
    async fn send(request: RequestBuilder) -> ApiResult<Response> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Network(format!("timed out: {e}"))
            } else {
                ApiError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            message: error_message(&body),
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn read<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let request = self
            .http_client
            .get(self.url(path))
            .timeout(self.read_timeout);
        Self::decode(Self::send(request).await?).await
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult<Response> {
        Self::send(self.http_client.post(self.url(path)).json(body)).await
    }

    async fn delete(&self, path: &str) -> ApiResult<()> {
        Self::send(self.http_client.delete(self.url(path))).await?;
        Ok(())
    }
}

/// Pull a human-readable message out of an error body. The backend uses
/// `{"error": ...}`; `{"message": ...}` is accepted as well.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["message", "error"]
        .iter()
        .filter_map(|key| value.get(key).and_then(Value::as_str))
        .map(str::trim)
        .find(|m| !m.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl MeetingApi for HttpApi {
    fn backend_name(&self) -> &str {
        "http"
    }

    async fn list_polls(&self, meeting_id: &MeetingId) -> ApiResult<Vec<Poll>> {
        let request = self
            .http_client
            .get(self.url("/api/votes"))
            .query(&[("meetingId", meeting_id.as_str())])
            .timeout(self.read_timeout);
        Self::decode(Self::send(request).await?).await
    }

    async fn create_poll(&self, request: &CreatePollRequest) -> ApiResult<Poll> {
        Self::decode(self.post("/api/votes", request).await?).await
    }

    async fn submit_ballot(&self, poll_id: &PollId, ballot: &BallotRequest) -> ApiResult<Poll> {
        let path = format!("/api/votes/{}/submit", poll_id);
        Self::decode(self.post(&path, ballot).await?).await
    }

    async fn cancel_ballot(
        &self,
        poll_id: &PollId,
        request: &CancelBallotRequest,
    ) -> ApiResult<()> {
        let path = format!("/api/votes/{}/cancel", poll_id);
        self.post(&path, request).await?;
        Ok(())
    }

    async fn close_poll(&self, poll_id: &PollId) -> ApiResult<()> {
        self.delete(&format!("/api/votes/{}", poll_id)).await
    }

    async fn save_participant_stats(&self, stats: &StatsSnapshot) -> ApiResult<()> {
        self.post("/api/participant-stats", stats).await?;
        Ok(())
    }

    async fn load_participant_stats(&self) -> ApiResult<StatsSnapshot> {
        self.read("/api/participant-stats").await
    }

    async fn list_meetings(&self) -> ApiResult<Vec<Meeting>> {
        let request = self
            .http_client
            .get(self.url("/api/meetings"))
            .header(header::CACHE_CONTROL, "no-cache")
            .timeout(self.read_timeout);
        Self::decode(Self::send(request).await?).await
    }

    async fn create_meeting(&self, meeting: &Meeting) -> ApiResult<Meeting> {
        Self::decode(self.post("/api/meetings", meeting).await?).await
    }

    async fn delete_meeting(&self, meeting_id: &MeetingId) -> ApiResult<()> {
        self.delete(&format!("/api/meetings/{}", meeting_id)).await
    }

    async fn list_past_meetings(&self) -> ApiResult<Vec<PastMeeting>> {
        self.read("/api/past-meetings").await
    }

    async fn save_past_meeting(&self, meeting: &PastMeeting) -> ApiResult<()> {
        self.post("/api/past-meetings", meeting).await?;
        Ok(())
    }

    async fn delete_past_meeting(&self, meeting_id: &MeetingId) -> ApiResult<()> {
        self.delete(&format!("/api/past-meetings/{}", meeting_id)).await
    }

    async fn get_report(&self, meeting_id: &MeetingId) -> ApiResult<Report> {
        self.read(&format!("/api/reports/{}", meeting_id)).await
    }

    async fn update_report(
        &self,
        meeting_id: &MeetingId,
        update: &ReportUpdate,
    ) -> ApiResult<Report> {
        let path = format!("/api/reports/{}", meeting_id);
        Self::decode(self.post(&path, update).await?).await
    }

    async fn list_residents(&self) -> ApiResult<Vec<Resident>> {
        self.read("/api/residents").await
    }

    async fn save_residents(&self, residents: &[Resident]) -> ApiResult<()> {
        self.post("/api/residents", residents).await?;
        Ok(())
    }
}
