//! Participant statistics: connection time and ballot counts per meeting.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::MeetingApi;
use crate::ids::MeetingId;
use crate::storage::{self, DurableStore};
use crate::timestamp::now_ms;

/// One participant's record within one meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantStats {
    /// Start of the current (or last) session, epoch ms.
    #[serde(rename = "lastConnectionTime", default = "now_ms")]
    pub connection_time: i64,
    /// Accumulated time connected, ms.
    #[serde(default)]
    pub total_connection_duration: i64,
    #[serde(default)]
    pub vote_count: u32,
    #[serde(default)]
    pub is_connected: bool,
}

impl ParticipantStats {
    fn connected_at(now: i64) -> Self {
        Self {
            connection_time: now,
            total_connection_duration: 0,
            vote_count: 0,
            is_connected: true,
        }
    }
}

/// meeting id -> participant name -> record. This is the wire shape of
/// `/api/participant-stats` and of the durable `participantStats` key.
pub type StatsSnapshot = BTreeMap<MeetingId, BTreeMap<String, ParticipantStats>>;

/// Format a duration in milliseconds as `1h 2min 3s`, `2min 3s` or `3s`.
pub fn format_duration(ms: i64) -> String {
    let total = ms.max(0) / 1000;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}h {}min {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}min {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Tracks statistics in memory and writes the whole map through after every
/// mutation: remote first, durable store only when the remote save fails.
pub struct StatsTracker {
    stats: StatsSnapshot,
    api: Arc<dyn MeetingApi>,
    store: Arc<dyn DurableStore>,
}

impl StatsTracker {
    pub fn new(api: Arc<dyn MeetingApi>, store: Arc<dyn DurableStore>) -> Self {
        Self {
            stats: StatsSnapshot::new(),
            api,
            store,
        }
    }

    /// Replace the in-memory map with the remote one, or the durable copy if
    /// the backend is unreachable.
    pub async fn load(&mut self) {
        self.stats = match self.api.load_participant_stats().await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!("Loading participant stats from local storage: {}", e);
                storage::load_json(self.store.as_ref(), storage::PARTICIPANT_STATS)
                    .unwrap_or_default()
            }
        };
    }

    pub fn snapshot(&self) -> &StatsSnapshot {
        &self.stats
    }

    pub fn meeting(&self, meeting_id: &MeetingId) -> Option<&BTreeMap<String, ParticipantStats>> {
        self.stats.get(meeting_id)
    }

    pub fn get(&self, meeting_id: &MeetingId, name: &str) -> Option<&ParticipantStats> {
        self.stats.get(meeting_id)?.get(name)
    }

    pub async fn initialize(&mut self, meeting_id: &MeetingId, name: &str) -> bool {
        self.initialize_at(meeting_id, name, now_ms()).await
    }

    /// Create a connected record if none exists and save it. Returns false
    /// when the participant already had one.
    pub async fn initialize_at(&mut self, meeting_id: &MeetingId, name: &str, now: i64) -> bool {
        let created = self.insert_record(meeting_id, name, now);
        if created {
            self.persist().await;
        }
        created
    }

    fn insert_record(&mut self, meeting_id: &MeetingId, name: &str, now: i64) -> bool {
        let meeting = self.stats.entry(meeting_id.clone()).or_default();
        if meeting.contains_key(name) {
            return false;
        }
        meeting.insert(name.to_string(), ParticipantStats::connected_at(now));
        true
    }

    pub async fn record_connect(&mut self, meeting_id: &MeetingId, name: &str) {
        self.record_connect_at(meeting_id, name, now_ms()).await
    }

    /// Start a new session for `name`. A participant already connected is
    /// left alone.
    pub async fn record_connect_at(&mut self, meeting_id: &MeetingId, name: &str, now: i64) {
        if self.initialize_at(meeting_id, name, now).await {
            return;
        }
        let Some(record) = self
            .stats
            .get_mut(meeting_id)
            .and_then(|m| m.get_mut(name))
        else {
            return;
        };
        if record.is_connected {
            return;
        }
        record.connection_time = now;
        record.is_connected = true;
        self.persist().await;
    }

    pub async fn record_disconnect(&mut self, meeting_id: &MeetingId, name: &str) {
        self.record_disconnect_at(meeting_id, name, now_ms()).await
    }

    /// Close the current session of `name`. No-op when there is no record or
    /// the participant is already disconnected.
    pub async fn record_disconnect_at(&mut self, meeting_id: &MeetingId, name: &str, now: i64) {
        let Some(record) = self
            .stats
            .get_mut(meeting_id)
            .and_then(|m| m.get_mut(name))
        else {
            return;
        };
        if !record.is_connected {
            return;
        }
        record.total_connection_duration += (now - record.connection_time).max(0);
        record.connection_time = now;
        record.is_connected = false;
        self.persist().await;
    }

    pub async fn record_ballot(&mut self, meeting_id: &MeetingId, name: &str) {
        self.record_ballot_at(meeting_id, name, now_ms()).await
    }

    pub async fn record_ballot_at(&mut self, meeting_id: &MeetingId, name: &str, now: i64) {
        self.insert_record(meeting_id, name, now);
        if let Some(record) = self
            .stats
            .get_mut(meeting_id)
            .and_then(|m| m.get_mut(name))
        {
            record.vote_count += 1;
        }
        self.persist().await;
    }

    /// Remove and return every record of a meeting.
    pub async fn take_meeting(
        &mut self,
        meeting_id: &MeetingId,
    ) -> BTreeMap<String, ParticipantStats> {
        let taken = self.stats.remove(meeting_id).unwrap_or_default();
        self.persist().await;
        taken
    }

    async fn persist(&self) {
        if let Err(e) = self.api.save_participant_stats(&self.stats).await {
            tracing::warn!("Saving participant stats locally: {}", e);
            storage::save_json(self.store.as_ref(), storage::PARTICIPANT_STATS, &self.stats);
        }
    }
}
