//! Poll records and the tally rules applied to them.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ids::{random_base36, MeetingId, PollId};

const LOCAL_ID_PREFIX: &str = "vote_";
const LOCAL_ID_SUFFIX_LEN: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    #[default]
    Active,
    Closed,
}

/// A question asked during a meeting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub id: PollId,
    pub meeting_id: MeetingId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub options: Vec<String>,
    #[serde(default)]
    pub allow_multiple: bool,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub status: PollStatus,
    /// Tally per option label.
    #[serde(default)]
    pub votes: BTreeMap<String, u32>,
    /// Participants with a ballot on record, in voting order.
    #[serde(default)]
    pub voters: Vec<String>,
    #[serde(default = "Utc::now", with = "crate::timestamp::flexible")]
    pub created_at: DateTime<Utc>,
    #[serde(
        default,
        with = "crate::timestamp::flexible_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub closed_at: Option<DateTime<Utc>>,
    /// Client-side ledger of each participant's latest ballot. The backend
    /// does not return it; it only lets retractions hit the right tallies.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ballots: BTreeMap<String, Vec<String>>,
}

/// Caller input for a new poll, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollDraft {
    pub meeting_id: MeetingId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub options: Vec<String>,
    #[serde(default)]
    pub allow_multiple: bool,
    #[serde(default)]
    pub created_by: String,
}

impl PollDraft {
    /// Trim options, drop blank ones, and reject drafts that cannot form a
    /// poll. Nothing is mutated anywhere when this fails.
    pub fn validate(mut self) -> Result<Self> {
        self.title = self.title.trim().to_string();
        if self.title.is_empty() {
            return Err(Error::Validation("A poll needs a title".to_string()));
        }

        self.options = self
            .options
            .iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        if self.options.len() < 2 {
            return Err(Error::Validation(
                "At least 2 options are required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        if !self.options.iter().all(|o| seen.insert(o.as_str())) {
            return Err(Error::Validation("Options must be unique".to_string()));
        }

        self.description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        Ok(self)
    }
}

/// Polls of one meeting split by status.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PollPartition {
    pub active: Vec<Poll>,
    pub closed: Vec<Poll>,
}

impl PollPartition {
    pub fn from_polls(polls: &[Poll]) -> Self {
        let (active, closed): (Vec<Poll>, Vec<Poll>) =
            polls.iter().cloned().partition(Poll::is_active);
        Self { active, closed }
    }
}

/// Generate a client-side poll id: `vote_{epoch_ms}_{9 base36 chars}`.
pub fn generate_local_id(now: DateTime<Utc>) -> PollId {
    PollId::new(format!(
        "{}{}_{}",
        LOCAL_ID_PREFIX,
        now.timestamp_millis(),
        random_base36(LOCAL_ID_SUFFIX_LEN)
    ))
}

impl Poll {
    /// Build a fresh, active poll from a validated draft.
    pub fn from_draft(draft: PollDraft, id: PollId, now: DateTime<Utc>) -> Self {
        let votes = draft.options.iter().map(|o| (o.clone(), 0)).collect();
        Self {
            id,
            meeting_id: draft.meeting_id,
            title: draft.title,
            description: draft.description,
            options: draft.options,
            allow_multiple: draft.allow_multiple,
            created_by: draft.created_by,
            status: PollStatus::Active,
            votes,
            voters: Vec::new(),
            created_at: now,
            closed_at: None,
            ballots: BTreeMap::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PollStatus::Active
    }

    pub fn has_voted(&self, voter: &str) -> bool {
        self.voters.iter().any(|v| v == voter)
    }

    pub fn tally(&self, option: &str) -> u32 {
        self.votes.get(option).copied().unwrap_or(0)
    }

    pub fn total_votes(&self) -> u32 {
        self.votes.values().sum()
    }

    /// Check a ballot against this poll and return the options that will be
    /// counted: valid labels only, first occurrence wins.
    pub fn validate_selection(&self, selected: &[String]) -> Result<Vec<String>> {
        if selected.is_empty() {
            return Err(Error::Validation("Select at least one option".to_string()));
        }
        if !self.is_active() {
            return Err(Error::Validation(format!("Poll '{}' is closed", self.title)));
        }

        let mut counted: Vec<String> = Vec::new();
        for option in selected {
            if self.options.contains(option) && !counted.contains(option) {
                counted.push(option.clone());
            }
        }

        if counted.is_empty() {
            return Err(Error::Validation(
                "None of the selected options belong to this poll".to_string(),
            ));
        }
        if !self.allow_multiple && counted.len() > 1 {
            return Err(Error::Validation(
                "This poll accepts a single option".to_string(),
            ));
        }
        Ok(counted)
    }

    /// Remove a participant's contribution. Returns false if they had none.
    ///
    /// With a ledger entry, exactly the options of their last ballot are
    /// decremented. Without one (ballot cast from another client), a
    /// multi-choice poll has every positive tally decremented once, as the
    /// backend does, and a single-choice poll loses one vote from its first
    /// positive tally.
    pub fn retract(&mut self, voter: &str) -> bool {
        if !self.has_voted(voter) {
            self.ballots.remove(voter);
            return false;
        }
        self.voters.retain(|v| v != voter);

        match self.ballots.remove(voter) {
            Some(previous) => {
                for option in previous {
                    if let Some(count) = self.votes.get_mut(&option) {
                        *count = count.saturating_sub(1);
                    }
                }
            }
            None if self.allow_multiple => {
                tracing::debug!(
                    "No ledger entry for {} on poll {}, decrementing every tally",
                    voter,
                    self.id
                );
                for option in &self.options {
                    if let Some(count) = self.votes.get_mut(option) {
                        *count = count.saturating_sub(1);
                    }
                }
            }
            None => {
                // A single-choice ballot counted exactly one option
                let counted = self
                    .options
                    .iter()
                    .find(|o| self.votes.get(*o).is_some_and(|c| *c > 0))
                    .cloned();
                tracing::debug!(
                    "No ledger entry for {} on poll {}, decrementing {:?}",
                    voter,
                    self.id,
                    counted
                );
                if let Some(option) = counted {
                    if let Some(count) = self.votes.get_mut(&option) {
                        *count -= 1;
                    }
                }
            }
        }
        true
    }

    /// Replace any previous ballot of `voter` with `counted`, which must come
    /// from [`Poll::validate_selection`].
    pub fn apply_ballot(&mut self, voter: &str, counted: &[String]) {
        self.retract(voter);
        self.voters.push(voter.to_string());
        for option in counted {
            *self.votes.entry(option.clone()).or_insert(0) += 1;
        }
        self.ballots.insert(voter.to_string(), counted.to_vec());
    }

    /// Close the poll. Returns false if it was already closed, in which case
    /// the first `closed_at` is kept.
    pub fn close(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_active() {
            return false;
        }
        self.status = PollStatus::Closed;
        self.closed_at = Some(now);
        true
    }

    /// Carry over ledger entries from the record this one replaces, for
    /// voters the new record still lists.
    pub fn adopt_ballots(&mut self, previous: &Poll) {
        for (voter, options) in &previous.ballots {
            if self.has_voted(voter) && !self.ballots.contains_key(voter) {
                self.ballots.insert(voter.clone(), options.clone());
            }
        }
    }

    pub fn is_local_id(&self) -> bool {
        self.id.as_str().starts_with(LOCAL_ID_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(options: &[&str], allow_multiple: bool) -> PollDraft {
        PollDraft {
            meeting_id: MeetingId::from("council-abc123-1700000000000"),
            title: "Lunch".to_string(),
            description: None,
            options: options.iter().map(|s| s.to_string()).collect(),
            allow_multiple,
            created_by: "Admin".to_string(),
        }
    }

    fn poll(options: &[&str], allow_multiple: bool) -> Poll {
        let d = draft(options, allow_multiple).validate().unwrap();
        Poll::from_draft(d, PollId::from("p1"), Utc::now())
    }

    fn vote(p: &mut Poll, voter: &str, selected: &[&str]) {
        let selected: Vec<String> = selected.iter().map(|s| s.to_string()).collect();
        let counted = p.validate_selection(&selected).unwrap();
        p.apply_ballot(voter, &counted);
    }

    #[test]
    fn test_draft_trims_and_drops_blank_options() {
        let d = draft(&["  Pizza ", "", "Salad", "   "], false).validate().unwrap();
        assert_eq!(d.options, vec!["Pizza", "Salad"]);
    }

    #[test]
    fn test_draft_needs_two_options() {
        let err = draft(&["Pizza", "  "], false).validate().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_draft_rejects_duplicates_case_sensitively() {
        assert!(draft(&["Pizza", "Pizza "], false).validate().is_err());
        assert!(draft(&["Pizza", "pizza"], false).validate().is_ok());
    }

    #[test]
    fn test_draft_needs_title() {
        let mut d = draft(&["A", "B"], false);
        d.title = "   ".to_string();
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_new_poll_has_zeroed_tallies() {
        let p = poll(&["Pizza", "Salad"], false);
        assert!(p.is_active());
        assert_eq!(p.tally("Pizza"), 0);
        assert_eq!(p.tally("Salad"), 0);
        assert_eq!(p.votes.len(), 2);
        assert!(p.voters.is_empty());
    }

    #[test]
    fn test_resubmission_replaces_previous_ballot() {
        let mut p = poll(&["A", "B"], false);
        vote(&mut p, "Alice", &["A"]);
        vote(&mut p, "Alice", &["B"]);
        assert_eq!(p.tally("A"), 0);
        assert_eq!(p.tally("B"), 1);
        assert_eq!(p.voters, vec!["Alice"]);
    }

    #[test]
    fn test_single_choice_sum_matches_voters() {
        let mut p = poll(&["A", "B", "C"], false);
        let script = [
            ("Alice", "A"),
            ("Bob", "B"),
            ("Alice", "C"),
            ("Carol", "A"),
            ("Bob", "B"),
            ("Alice", "A"),
            ("Dave", "C"),
        ];
        for (voter, option) in script {
            vote(&mut p, voter, &[option]);
            assert_eq!(p.total_votes() as usize, p.voters.len());
        }
        assert_eq!(p.tally("A"), 2);
        assert_eq!(p.tally("B"), 1);
        assert_eq!(p.tally("C"), 1);
    }

    #[test]
    fn test_multiple_choice_resubmission() {
        let mut p = poll(&["A", "B", "C"], true);
        vote(&mut p, "Alice", &["A", "B"]);
        vote(&mut p, "Bob", &["B", "C"]);
        vote(&mut p, "Alice", &["C"]);
        assert_eq!(p.tally("A"), 0);
        assert_eq!(p.tally("B"), 1);
        assert_eq!(p.tally("C"), 2);
        assert_eq!(p.voters, vec!["Bob", "Alice"]);
    }

    #[test]
    fn test_selection_validation() {
        let p = poll(&["A", "B"], false);
        assert!(p.validate_selection(&[]).is_err());
        assert!(p.validate_selection(&["Z".to_string()]).is_err());
        assert!(p
            .validate_selection(&["A".to_string(), "B".to_string()])
            .is_err());
        // Unknown labels are ignored, duplicates counted once
        let counted = p
            .validate_selection(&["A".to_string(), "Z".to_string(), "A".to_string()])
            .unwrap();
        assert_eq!(counted, vec!["A"]);
    }

    #[test]
    fn test_closed_poll_rejects_ballots() {
        let mut p = poll(&["A", "B"], false);
        p.close(Utc::now());
        assert!(p.validate_selection(&["A".to_string()]).is_err());
    }

    #[test]
    fn test_close_keeps_first_timestamp() {
        let mut p = poll(&["A", "B"], false);
        let first = Utc::now();
        assert!(p.close(first));
        assert!(!p.close(first + chrono::Duration::minutes(5)));
        assert_eq!(p.closed_at, Some(first));
        assert_eq!(p.status, PollStatus::Closed);
    }

    #[test]
    fn test_retract_without_ledger_uses_backend_rule() {
        let mut p = poll(&["A", "B"], true);
        p.voters = vec!["Remote".to_string()];
        p.votes.insert("A".to_string(), 1);
        p.votes.insert("B".to_string(), 1);
        assert!(p.retract("Remote"));
        assert_eq!(p.tally("A"), 0);
        assert_eq!(p.tally("B"), 0);
        assert!(!p.retract("Remote"));
    }

    #[test]
    fn test_single_choice_retract_without_ledger_removes_one_vote() {
        let mut p = poll(&["A", "B", "C"], false);
        p.voters = vec!["Alice".to_string(), "Bob".to_string()];
        p.votes.insert("A".to_string(), 1);
        p.votes.insert("B".to_string(), 1);
        assert!(p.retract("Alice"));
        assert_eq!(p.total_votes(), 1);
        assert_eq!(p.voters, vec!["Bob"]);
    }

    #[test]
    fn test_adopt_ballots_only_for_listed_voters() {
        let mut local = poll(&["A", "B"], false);
        vote(&mut local, "Alice", &["A"]);
        vote(&mut local, "Bob", &["B"]);

        let mut server = local.clone();
        server.ballots.clear();
        server.voters = vec!["Alice".to_string()];
        server.adopt_ballots(&local);

        assert_eq!(server.ballots.get("Alice"), Some(&vec!["A".to_string()]));
        assert!(!server.ballots.contains_key("Bob"));
    }

    #[test]
    fn test_local_id_format() {
        let id = generate_local_id(Utc::now());
        let parts: Vec<&str> = id.as_str().split('_').collect();
        assert_eq!(parts[0], "vote");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
    }

    #[test]
    fn test_deserialize_backend_poll() {
        let json = r#"{
            "id": "1a2b3c4d",
            "title": "Budget",
            "description": "",
            "options": ["Yes", "No"],
            "allowMultiple": false,
            "createdBy": "Admin",
            "meetingId": "council-x-1",
            "createdAt": "2025-03-01T18:30:12.345678",
            "status": "closed",
            "votes": {"Yes": 3, "No": 1},
            "voters": ["A", "B", "C", "D"],
            "closedAt": "2025-03-01T19:00:00"
        }"#;
        let p: Poll = serde_json::from_str(json).unwrap();
        assert_eq!(p.id, PollId::from("1a2b3c4d"));
        assert_eq!(p.status, PollStatus::Closed);
        assert_eq!(p.tally("Yes"), 3);
        assert!(p.closed_at.is_some());
        assert!(p.ballots.is_empty());
        assert!(!p.is_local_id());

        let back = serde_json::to_value(&p).unwrap();
        assert!(back.get("ballots").is_none());
        assert_eq!(back["allowMultiple"], false);
    }

    #[test]
    fn test_partition() {
        let a = poll(&["A", "B"], false);
        let mut b = poll(&["A", "B"], false);
        b.close(Utc::now());
        let parts = PollPartition::from_polls(&[a, b]);
        assert_eq!(parts.active.len(), 1);
        assert_eq!(parts.closed.len(), 1);
    }
}
