//! In-memory backend for tests. Mirrors the server's rules closely enough to
//! exercise the sync paths, and can be switched offline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::{
    ApiError, ApiResult, BallotRequest, CancelBallotRequest, CreatePollRequest, MeetingApi,
    ReportUpdate,
};
use crate::ids::{MeetingId, PollId};
use crate::meeting::{Meeting, PastMeeting, Report};
use crate::poll::{Poll, PollDraft};
use crate::resident::Resident;
use crate::stats::StatsSnapshot;

#[derive(Default)]
struct State {
    polls: Vec<Poll>,
    stats: StatsSnapshot,
    meetings: Vec<Meeting>,
    past_meetings: Vec<PastMeeting>,
    reports: HashMap<MeetingId, Report>,
    residents: Vec<Resident>,
    calls: HashMap<&'static str, usize>,
}

pub struct FakeApi {
    online: AtomicBool,
    next_id: AtomicU64,
    state: Mutex<State>,
}

impl Default for FakeApi {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
            state: Mutex::new(State::default()),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Number of times `method` was invoked, online or not.
    pub fn calls(&self, method: &str) -> usize {
        self.state.lock().unwrap().calls.get(method).copied().unwrap_or(0)
    }

    pub fn polls(&self) -> Vec<Poll> {
        self.state.lock().unwrap().polls.clone()
    }

    pub fn insert_meeting(&self, meeting: Meeting) {
        self.state.lock().unwrap().meetings.push(meeting);
    }

    pub fn meetings(&self) -> Vec<Meeting> {
        self.state.lock().unwrap().meetings.clone()
    }

    pub fn past_meetings(&self) -> Vec<PastMeeting> {
        self.state.lock().unwrap().past_meetings.clone()
    }

    pub fn residents(&self) -> Vec<Resident> {
        self.state.lock().unwrap().residents.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.state.lock().unwrap().stats.clone()
    }

    fn enter(&self, method: &'static str) -> ApiResult<std::sync::MutexGuard<'_, State>> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(method).or_insert(0) += 1;
        if self.online.load(Ordering::SeqCst) {
            Ok(state)
        } else {
            Err(ApiError::Network("connection refused".to_string()))
        }
    }

    fn rejected(status: u16, message: &str) -> ApiError {
        ApiError::Status {
            status,
            message: Some(message.to_string()),
        }
    }
}

#[async_trait]
impl MeetingApi for FakeApi {
    fn backend_name(&self) -> &str {
        "fake"
    }

    async fn list_polls(&self, meeting_id: &MeetingId) -> ApiResult<Vec<Poll>> {
        let state = self.enter("list_polls")?;
        Ok(state
            .polls
            .iter()
            .filter(|p| &p.meeting_id == meeting_id)
            .map(|p| {
                let mut listed = p.clone();
                listed.ballots.clear();
                listed
            })
            .collect())
    }

    async fn create_poll(&self, request: &CreatePollRequest) -> ApiResult<Poll> {
        let mut state = self.enter("create_poll")?;
        let id = format!("srv-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let draft = PollDraft {
            meeting_id: request.meeting_id.clone(),
            title: request.title.clone(),
            description: Some(request.description.clone()),
            options: request.options.clone(),
            allow_multiple: request.allow_multiple,
            created_by: request.created_by.clone(),
        };
        let mut poll = Poll::from_draft(draft, PollId::new(id), Utc::now());
        poll.ballots.clear();
        state.polls.push(poll.clone());
        Ok(poll)
    }

    async fn submit_ballot(&self, poll_id: &PollId, ballot: &BallotRequest) -> ApiResult<Poll> {
        let mut state = self.enter("submit_ballot")?;
        let poll = state
            .polls
            .iter_mut()
            .find(|p| &p.id == poll_id)
            .ok_or_else(|| Self::rejected(404, "Vote introuvable"))?;
        let counted: Vec<String> = ballot
            .selected_options
            .iter()
            .filter(|o| poll.options.contains(o))
            .cloned()
            .collect();
        poll.apply_ballot(&ballot.user_name, &counted);
        let mut canonical = poll.clone();
        canonical.ballots.clear();
        Ok(canonical)
    }

    async fn cancel_ballot(
        &self,
        poll_id: &PollId,
        request: &CancelBallotRequest,
    ) -> ApiResult<()> {
        let mut state = self.enter("cancel_ballot")?;
        let poll = state
            .polls
            .iter_mut()
            .find(|p| &p.id == poll_id)
            .ok_or_else(|| Self::rejected(404, "Vote introuvable"))?;
        if !poll.is_active() {
            return Err(Self::rejected(400, "Ce vote est fermé"));
        }
        if !poll.retract(&request.user_name) {
            return Err(Self::rejected(400, "Vous n'avez pas encore voté"));
        }
        Ok(())
    }

    async fn close_poll(&self, poll_id: &PollId) -> ApiResult<()> {
        let mut state = self.enter("close_poll")?;
        if let Some(poll) = state.polls.iter_mut().find(|p| &p.id == poll_id) {
            poll.close(Utc::now());
        }
        Ok(())
    }

    async fn save_participant_stats(&self, stats: &StatsSnapshot) -> ApiResult<()> {
        self.enter("save_participant_stats")?.stats = stats.clone();
        Ok(())
    }

    async fn load_participant_stats(&self) -> ApiResult<StatsSnapshot> {
        Ok(self.enter("load_participant_stats")?.stats.clone())
    }

    async fn list_meetings(&self) -> ApiResult<Vec<Meeting>> {
        Ok(self.enter("list_meetings")?.meetings.clone())
    }

    async fn create_meeting(&self, meeting: &Meeting) -> ApiResult<Meeting> {
        self.enter("create_meeting")?.meetings.push(meeting.clone());
        Ok(meeting.clone())
    }

    async fn delete_meeting(&self, meeting_id: &MeetingId) -> ApiResult<()> {
        self.enter("delete_meeting")?
            .meetings
            .retain(|m| &m.id != meeting_id);
        Ok(())
    }

    async fn list_past_meetings(&self) -> ApiResult<Vec<PastMeeting>> {
        Ok(self.enter("list_past_meetings")?.past_meetings.clone())
    }

    async fn save_past_meeting(&self, meeting: &PastMeeting) -> ApiResult<()> {
        self.enter("save_past_meeting")?
            .past_meetings
            .push(meeting.clone());
        Ok(())
    }

    async fn delete_past_meeting(&self, meeting_id: &MeetingId) -> ApiResult<()> {
        let mut state = self.enter("delete_past_meeting")?;
        let before = state.past_meetings.len();
        state.past_meetings.retain(|m| &m.id != meeting_id);
        if state.past_meetings.len() == before {
            return Err(Self::rejected(404, "Réunion introuvable"));
        }
        Ok(())
    }

    async fn get_report(&self, meeting_id: &MeetingId) -> ApiResult<Report> {
        let state = self.enter("get_report")?;
        Ok(state.reports.get(meeting_id).cloned().unwrap_or(Report {
            meeting_id: meeting_id.clone(),
            report_url: String::new(),
            updated_at: None,
        }))
    }

    async fn update_report(
        &self,
        meeting_id: &MeetingId,
        update: &ReportUpdate,
    ) -> ApiResult<Report> {
        let mut state = self.enter("update_report")?;
        let report = Report {
            meeting_id: meeting_id.clone(),
            report_url: update.report_url.clone(),
            updated_at: Some(Utc::now()),
        };
        state.reports.insert(meeting_id.clone(), report.clone());
        Ok(report)
    }

    async fn list_residents(&self) -> ApiResult<Vec<Resident>> {
        Ok(self.enter("list_residents")?.residents.clone())
    }

    async fn save_residents(&self, residents: &[Resident]) -> ApiResult<()> {
        self.enter("save_residents")?.residents = residents.to_vec();
        Ok(())
    }
}
