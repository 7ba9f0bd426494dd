//! Meeting lifecycle: scheduling, archival, reports.

use chrono::{DateTime, Utc};

use super::{Session, ADMIN_NAME};
use crate::api::ReportUpdate;
use crate::error::{Error, Result};
use crate::ids::MeetingId;
use crate::meeting::{self, Meeting, PastMeeting, Report};
use crate::storage;

impl Session {
    /// Schedule a meeting. If the backend is unreachable the meeting is kept
    /// in the durable store and still returned.
    pub async fn create_meeting(
        &mut self,
        name: &str,
        subjects: &str,
        scheduled_date: Option<DateTime<Utc>>,
    ) -> Result<Meeting> {
        self.require_admin()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("A meeting needs a name".to_string()));
        }

        let now = Utc::now();
        let id = meeting::generate_room_id(name, now);
        let meeting = Meeting {
            url: self.join_url(&id, ADMIN_NAME)?,
            id,
            name: name.to_string(),
            subjects: subjects.trim().to_string(),
            scheduled_date,
            created_at: now,
        };

        match self.api.create_meeting(&meeting).await {
            Ok(created) => Ok(created),
            Err(e) => {
                tracing::warn!("Meeting '{}' saved locally only: {}", meeting.name, e);
                let mut stored = self.stored_meetings();
                stored.push(meeting.clone());
                storage::save_json(self.store.as_ref(), storage::MEETINGS, &stored);
                Ok(meeting)
            }
        }
    }

    /// Scheduled and running meetings.
    pub async fn list_meetings(&self) -> Vec<Meeting> {
        match self.api.list_meetings().await {
            Ok(meetings) => meetings,
            Err(e) => {
                tracing::warn!("Serving stored meetings: {}", e);
                self.stored_meetings()
            }
        }
    }

    /// Delete a meeting with its cached polls and statistics.
    pub async fn delete_meeting(&mut self, meeting_id: &MeetingId) -> Result<()> {
        self.require_admin()?;

        self.polls.clear_meeting(meeting_id);
        self.stats.take_meeting(meeting_id).await;
        if self.current_meeting.as_ref().is_some_and(|m| &m.id == meeting_id) {
            self.clear_meeting_state();
        }

        if let Err(e) = self.api.delete_meeting(meeting_id).await {
            self.forget_stored_meeting(meeting_id);
            return Err(e.into());
        }
        Ok(())
    }

    /// End the current meeting: archive its polls, participants and
    /// statistics as a past meeting, then delete it.
    pub async fn end_meeting(&mut self) -> Result<PastMeeting> {
        self.require_admin()?;
        let meeting = self.current_meeting.clone().ok_or(Error::NoActiveMeeting)?;

        if let Some(user) = self.user_name.clone() {
            self.stats.record_disconnect(&meeting.id, &user).await;
        }
        let votes = self.polls.final_polls(&meeting.id).await;
        let participant_stats = self.stats.take_meeting(&meeting.id).await;

        let past = PastMeeting {
            id: meeting.id.clone(),
            name: meeting.name.clone(),
            ended_at: Utc::now(),
            report_link: self.report_link.clone(),
            participants: self.participants.clone(),
            votes,
            participant_stats,
        };

        if let Err(e) = self.api.save_past_meeting(&past).await {
            tracing::warn!("Past meeting {} saved locally only: {}", past.id, e);
        }
        let mut stored = self.stored_past_meetings();
        stored.push(past.clone());
        storage::save_json(self.store.as_ref(), storage::PAST_MEETINGS, &stored);

        if let Err(e) = self.api.delete_meeting(&meeting.id).await {
            tracing::warn!("Could not delete ended meeting {}: {}", meeting.id, e);
            self.forget_stored_meeting(&meeting.id);
        }

        self.polls.clear_meeting(&meeting.id);
        self.clear_meeting_state();
        tracing::info!("Meeting {} archived with {} polls", past.id, past.votes.len());
        Ok(past)
    }

    /// Archived meetings. A successful fetch refreshes the durable copy.
    pub async fn past_meetings(&self) -> Vec<PastMeeting> {
        match self.api.list_past_meetings().await {
            Ok(meetings) => {
                storage::save_json(self.store.as_ref(), storage::PAST_MEETINGS, &meetings);
                meetings
            }
            Err(e) => {
                tracing::warn!("Serving stored past meetings: {}", e);
                self.stored_past_meetings()
            }
        }
    }

    pub async fn delete_past_meeting(&mut self, meeting_id: &MeetingId) -> Result<()> {
        self.require_admin()?;
        self.api.delete_past_meeting(meeting_id).await?;

        let mut stored = self.stored_past_meetings();
        stored.retain(|m| &m.id != meeting_id);
        storage::save_json(self.store.as_ref(), storage::PAST_MEETINGS, &stored);
        Ok(())
    }

    pub async fn report(&mut self, meeting_id: &MeetingId) -> Result<Report> {
        let report = self.api.get_report(meeting_id).await?;
        self.track_report(&report);
        Ok(report)
    }

    pub async fn set_report(&mut self, meeting_id: &MeetingId, url: &str) -> Result<Report> {
        self.require_admin()?;
        let update = ReportUpdate {
            report_url: url.trim().to_string(),
        };
        let report = self.api.update_report(meeting_id, &update).await?;
        self.track_report(&report);
        Ok(report)
    }

    fn track_report(&mut self, report: &Report) {
        if self
            .current_meeting
            .as_ref()
            .is_some_and(|m| m.id == report.meeting_id)
        {
            self.report_link = report.link().map(str::to_string);
        }
    }

    fn stored_meetings(&self) -> Vec<Meeting> {
        storage::load_json(self.store.as_ref(), storage::MEETINGS).unwrap_or_default()
    }

    fn forget_stored_meeting(&self, meeting_id: &MeetingId) {
        let mut stored = self.stored_meetings();
        stored.retain(|m| &m.id != meeting_id);
        storage::save_json(self.store.as_ref(), storage::MEETINGS, &stored);
    }

    fn stored_past_meetings(&self) -> Vec<PastMeeting> {
        storage::load_json(self.store.as_ref(), storage::PAST_MEETINGS).unwrap_or_default()
    }
}
