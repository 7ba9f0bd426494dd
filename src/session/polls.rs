use super::{Session, ADMIN_NAME};
use crate::error::{Error, Result};
use crate::ids::PollId;
use crate::poll::{Poll, PollDraft, PollPartition};

impl Session {
    /// Create a poll in the current meeting. The draft's meeting and author
    /// are taken from the session.
    pub async fn create_poll(&mut self, mut draft: PollDraft) -> Result<Poll> {
        self.require_admin()?;
        draft.meeting_id = self.require_meeting()?;
        draft.created_by = self
            .user_name
            .clone()
            .unwrap_or_else(|| ADMIN_NAME.to_string());
        self.polls.create(draft).await
    }

    /// Polls of the current meeting.
    pub async fn list_polls(&mut self) -> Result<PollPartition> {
        let meeting_id = self.require_meeting()?;
        Ok(self.polls.list_polls(&meeting_id).await)
    }

    pub async fn vote(&mut self, poll_id: &PollId, selected: &[String]) -> Result<Poll> {
        let meeting_id = self.require_meeting()?;
        let user = self.require_user()?;
        if !self
            .polls
            .poll(poll_id)
            .is_some_and(|p| p.meeting_id == meeting_id)
        {
            return Err(Error::NotFound(format!(
                "poll {} in meeting {}",
                poll_id, meeting_id
            )));
        }
        self.polls
            .submit_ballot(poll_id, &user, selected, &mut self.stats)
            .await
    }

    pub async fn cancel_vote(&mut self, poll_id: &PollId) -> Result<PollPartition> {
        self.require_meeting()?;
        let user = self.require_user()?;
        self.polls.cancel_ballot(poll_id, &user).await
    }

    pub async fn close_poll(&mut self, poll_id: &PollId) -> Result<Poll> {
        self.require_admin()?;
        self.polls.close(poll_id).await
    }
}
