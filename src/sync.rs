//! Poll synchronization engine.
//!
//! Every mutation lands in the local [`PollCache`] first. The backend is
//! then asked to do the same thing:
//!
//! - create, submit and close favor availability: when the backend fails the
//!   optimistic local result stands ("local mode") and the cache is mirrored
//!   to the durable store
//! - cancel favors consistency: the backend decides, and nothing changes
//!   locally unless it agrees
//! - listing replaces the meeting's cache entry with the backend's list, or
//!   serves the cache when the backend cannot be reached

use std::sync::Arc;

use chrono::Utc;

use crate::api::{BallotRequest, CancelBallotRequest, CreatePollRequest, MeetingApi};
use crate::cache::PollCache;
use crate::error::{Error, Result};
use crate::ids::{MeetingId, PollId};
use crate::poll::{generate_local_id, Poll, PollDraft, PollPartition};
use crate::stats::StatsTracker;
use crate::storage::{self, DurableStore};

pub struct PollSync {
    cache: PollCache,
    api: Arc<dyn MeetingApi>,
    store: Arc<dyn DurableStore>,
    keep_unsynced: bool,
}

impl PollSync {
    pub fn new(api: Arc<dyn MeetingApi>, store: Arc<dyn DurableStore>, keep_unsynced: bool) -> Self {
        Self {
            cache: PollCache::new(),
            api,
            store,
            keep_unsynced,
        }
    }

    pub fn cache(&self) -> &PollCache {
        &self.cache
    }

    pub fn poll(&self, poll_id: &PollId) -> Option<&Poll> {
        self.cache.find(poll_id)
    }

    /// Create a poll. The returned poll carries the server id when the
    /// backend accepted it, the local `vote_...` id otherwise.
    pub async fn create(&mut self, draft: PollDraft) -> Result<Poll> {
        let draft = draft.validate()?;
        let request = CreatePollRequest::from(&draft);
        let local_id = generate_local_id(Utc::now());
        let poll = Poll::from_draft(draft, local_id.clone(), Utc::now());
        self.cache.insert(poll.clone());

        match self.api.create_poll(&request).await {
            Ok(canonical) => {
                tracing::debug!("Poll {} stored remotely as {}", local_id, canonical.id);
                let server_id = canonical.id.clone();
                self.cache.replace(&local_id, canonical);
                Ok(self.cache.find(&server_id).cloned().unwrap_or(poll))
            }
            Err(e) => {
                tracing::warn!("Poll '{}' kept in local mode: {}", poll.title, e);
                self.cache.mark_unsynced(&local_id);
                self.mirror_to_store();
                Ok(poll)
            }
        }
    }

    /// Record `voter`'s ballot, replacing any previous one.
    pub async fn submit_ballot(
        &mut self,
        poll_id: &PollId,
        voter: &str,
        selected: &[String],
        stats: &mut StatsTracker,
    ) -> Result<Poll> {
        let voter = voter.trim();
        if voter.is_empty() {
            return Err(Error::NotIdentified);
        }
        let poll = self
            .cache
            .find_mut(poll_id)
            .ok_or_else(|| Error::NotFound(format!("poll {}", poll_id)))?;
        let counted = poll.validate_selection(selected)?;
        poll.apply_ballot(voter, &counted);
        let meeting_id = poll.meeting_id.clone();
        let optimistic = poll.clone();

        stats.record_ballot(&meeting_id, voter).await;

        let ballot = BallotRequest {
            user_name: voter.to_string(),
            selected_options: counted,
        };
        match self.api.submit_ballot(poll_id, &ballot).await {
            Ok(canonical) => {
                let server_id = canonical.id.clone();
                self.cache.replace(poll_id, canonical);
                Ok(self.cache.find(&server_id).cloned().unwrap_or(optimistic))
            }
            Err(e) => {
                tracing::warn!("Ballot of {} on {} kept locally: {}", voter, poll_id, e);
                self.mirror_to_store();
                Ok(optimistic)
            }
        }
    }

    /// Withdraw `voter`'s ballot. The backend must accept; on success the
    /// meeting's polls are reloaded and returned.
    pub async fn cancel_ballot(&mut self, poll_id: &PollId, voter: &str) -> Result<PollPartition> {
        let voter = voter.trim();
        if voter.is_empty() {
            return Err(Error::NotIdentified);
        }
        let meeting_id = self
            .cache
            .find(poll_id)
            .map(|p| p.meeting_id.clone())
            .ok_or_else(|| Error::NotFound(format!("poll {}", poll_id)))?;

        let request = CancelBallotRequest {
            user_name: voter.to_string(),
        };
        self.api.cancel_ballot(poll_id, &request).await?;

        if let Some(poll) = self.cache.find_mut(poll_id) {
            poll.retract(voter);
        }
        Ok(self.list_polls(&meeting_id).await)
    }

    /// Close a poll. Closing twice changes nothing.
    pub async fn close(&mut self, poll_id: &PollId) -> Result<Poll> {
        let poll = self
            .cache
            .find_mut(poll_id)
            .ok_or_else(|| Error::NotFound(format!("poll {}", poll_id)))?;
        if !poll.close(Utc::now()) {
            tracing::debug!("Poll {} already closed", poll_id);
            return Ok(poll.clone());
        }
        let closed = poll.clone();

        if let Err(e) = self.api.close_poll(poll_id).await {
            tracing::warn!("Poll {} closed locally only: {}", poll_id, e);
            self.mirror_to_store();
        }
        Ok(closed)
    }

    /// Polls of a meeting, split by status.
    pub async fn list_polls(&mut self, meeting_id: &MeetingId) -> PollPartition {
        match self.api.list_polls(meeting_id).await {
            Ok(polls) => {
                tracing::debug!("Fetched {} polls for {}", polls.len(), meeting_id);
                self.cache
                    .replace_meeting(meeting_id, polls, self.keep_unsynced);
            }
            Err(e) => {
                tracing::warn!("Serving cached polls for {}: {}", meeting_id, e);
                if !self.cache.contains_meeting(meeting_id) {
                    let stored = self.stored_polls(meeting_id);
                    self.cache.seed_meeting(meeting_id, stored);
                }
            }
        }
        self.cache.partition(meeting_id)
    }

    /// Final poll list of a meeting being archived: the backend's, else the
    /// durable mirror's, else whatever is cached.
    pub async fn final_polls(&self, meeting_id: &MeetingId) -> Vec<Poll> {
        match self.api.list_polls(meeting_id).await {
            Ok(polls) => polls,
            Err(e) => {
                tracing::warn!("Archiving polls of {} from local data: {}", meeting_id, e);
                let stored = self.stored_polls(meeting_id);
                if stored.is_empty() {
                    self.cache.polls(meeting_id).to_vec()
                } else {
                    stored
                }
            }
        }
    }

    pub fn clear_meeting(&mut self, meeting_id: &MeetingId) {
        let removed = self.cache.clear_meeting(meeting_id);
        tracing::debug!("Dropped {} cached polls of {}", removed.len(), meeting_id);
    }

    fn stored_polls(&self, meeting_id: &MeetingId) -> Vec<Poll> {
        storage::load_json::<Vec<Poll>>(self.store.as_ref(), storage::VOTES)
            .unwrap_or_default()
            .into_iter()
            .filter(|p| &p.meeting_id == meeting_id)
            .collect()
    }

    /// Write the cache to the durable `votes` list. Meetings absent from the
    /// cache keep whatever the store already held for them.
    fn mirror_to_store(&self) {
        let snapshot = self.cache.snapshot();
        let mut polls: Vec<Poll> =
            storage::load_json::<Vec<Poll>>(self.store.as_ref(), storage::VOTES)
                .unwrap_or_default()
                .into_iter()
                .filter(|p| !snapshot.contains_key(&p.meeting_id))
                .collect();
        polls.extend(snapshot.values().flatten().cloned());
        storage::save_json(self.store.as_ref(), storage::VOTES, &polls);
    }
}
