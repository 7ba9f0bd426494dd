//! Local tier of the poll store: meeting id -> polls, for the life of the
//! process.

use std::collections::{BTreeMap, HashSet};

use crate::ids::{MeetingId, PollId};
use crate::poll::{Poll, PollPartition};

#[derive(Debug, Default)]
pub struct PollCache {
    polls: BTreeMap<MeetingId, Vec<Poll>>,
    /// Polls whose remote create failed; they only exist here.
    unsynced: HashSet<PollId>,
}

impl PollCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_meeting(&self, meeting_id: &MeetingId) -> bool {
        self.polls.contains_key(meeting_id)
    }

    pub fn polls(&self, meeting_id: &MeetingId) -> &[Poll] {
        self.polls.get(meeting_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn partition(&self, meeting_id: &MeetingId) -> PollPartition {
        PollPartition::from_polls(self.polls(meeting_id))
    }

    pub fn snapshot(&self) -> &BTreeMap<MeetingId, Vec<Poll>> {
        &self.polls
    }

    /// Look a poll up in any meeting.
    pub fn find(&self, poll_id: &PollId) -> Option<&Poll> {
        self.polls.values().flatten().find(|p| &p.id == poll_id)
    }

    pub fn find_mut(&mut self, poll_id: &PollId) -> Option<&mut Poll> {
        self.polls.values_mut().flatten().find(|p| &p.id == poll_id)
    }

    /// Install polls read back from the durable mirror. Polls with a
    /// client-generated id are assumed never to have reached the backend.
    pub fn seed_meeting(&mut self, meeting_id: &MeetingId, polls: Vec<Poll>) {
        for poll in polls.iter().filter(|p| p.is_local_id()) {
            self.unsynced.insert(poll.id.clone());
        }
        self.polls.insert(meeting_id.clone(), polls);
    }

    pub fn insert(&mut self, poll: Poll) {
        self.polls
            .entry(poll.meeting_id.clone())
            .or_default()
            .push(poll);
    }

    pub fn mark_unsynced(&mut self, poll_id: &PollId) {
        self.unsynced.insert(poll_id.clone());
    }

    pub fn is_unsynced(&self, poll_id: &PollId) -> bool {
        self.unsynced.contains(poll_id)
    }

    /// Swap the entry `previous_id` for the server's record, which may carry
    /// a different id. Ledger entries of voters the server still lists are
    /// kept. If the local entry is gone, the record is appended.
    pub fn replace(&mut self, previous_id: &PollId, mut canonical: Poll) {
        self.unsynced.remove(previous_id);
        self.unsynced.remove(&canonical.id);

        if let Some(slot) = self.find_mut(previous_id) {
            canonical.adopt_ballots(slot);
            *slot = canonical;
        } else {
            self.insert(canonical);
        }
    }

    /// Install the server's list for a meeting.
    ///
    /// With `keep_unsynced`, polls that never reached the backend are kept
    /// after the server's entries; everything else cached for the meeting is
    /// dropped. Without it the server list is taken as is.
    pub fn replace_meeting(
        &mut self,
        meeting_id: &MeetingId,
        server_polls: Vec<Poll>,
        keep_unsynced: bool,
    ) {
        let previous = self.polls.remove(meeting_id).unwrap_or_default();

        let mut merged: Vec<Poll> = server_polls
            .into_iter()
            .map(|mut p| {
                if let Some(old) = previous.iter().find(|old| old.id == p.id) {
                    p.adopt_ballots(old);
                }
                p
            })
            .collect();

        for poll in previous {
            if !self.unsynced.contains(&poll.id) {
                continue;
            }
            if keep_unsynced && !merged.iter().any(|p| p.id == poll.id) {
                merged.push(poll);
            } else {
                self.unsynced.remove(&poll.id);
            }
        }

        self.polls.insert(meeting_id.clone(), merged);
    }

    /// Forget every poll of a meeting.
    pub fn clear_meeting(&mut self, meeting_id: &MeetingId) -> Vec<Poll> {
        let removed = self.polls.remove(meeting_id).unwrap_or_default();
        for poll in &removed {
            self.unsynced.remove(&poll.id);
        }
        removed
    }
}
