//! Meetings, their archived form, and the video widget join URL.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::ids::{random_base36, MeetingId};
use crate::poll::Poll;
use crate::stats::ParticipantStats;

const SLUG_MAX_LEN: usize = 20;
const ROOM_ID_MAX_LEN: usize = 50;
const ROOM_SUFFIX_LEN: usize = 6;

/// A scheduled or running meeting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meeting {
    pub id: MeetingId,
    pub name: String,
    #[serde(default)]
    pub subjects: String,
    #[serde(
        default,
        with = "crate::timestamp::flexible_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub scheduled_date: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now", with = "crate::timestamp::flexible")]
    pub created_at: DateTime<Utc>,
    /// Join URL for the administrator.
    #[serde(default)]
    pub url: String,
}

impl Meeting {
    /// Whether participants may join at `now`. Meetings without a scheduled
    /// date are always open; scheduled ones open `window` before the date.
    pub fn is_joinable(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match self.scheduled_date {
            Some(date) => date - now <= window,
            None => true,
        }
    }
}

/// A meeting that has ended, with everything that happened in it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PastMeeting {
    pub id: MeetingId,
    pub name: String,
    #[serde(with = "crate::timestamp::flexible")]
    pub ended_at: DateTime<Utc>,
    #[serde(default)]
    pub report_link: Option<String>,
    #[serde(default)]
    pub participants: Vec<String>,
    /// Final poll history.
    #[serde(default)]
    pub votes: Vec<Poll>,
    #[serde(default)]
    pub participant_stats: BTreeMap<String, ParticipantStats>,
}

/// Link to the written report of a meeting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub meeting_id: MeetingId,
    #[serde(default)]
    pub report_url: String,
    #[serde(
        default,
        with = "crate::timestamp::flexible_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Report {
    pub fn link(&self) -> Option<&str> {
        let url = self.report_url.trim();
        (!url.is_empty()).then_some(url)
    }
}

/// Lowercase, every character outside `[a-z0-9]` becomes `-`, runs of `-`
/// collapse, and the result is cut to 20 characters.
fn slugify(name: &str) -> String {
    let mut slug = String::new();
    for c in name.to_lowercase().chars() {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() {
            c
        } else {
            '-'
        };
        if c == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(c);
    }
    slug.chars().take(SLUG_MAX_LEN).collect()
}

/// Room id: `{slug}-{6 base36 chars}-{epoch ms}`, at most 50 characters.
pub fn generate_room_id(name: &str, now: DateTime<Utc>) -> MeetingId {
    let id = format!(
        "{}-{}-{}",
        slugify(name),
        random_base36(ROOM_SUFFIX_LEN),
        now.timestamp_millis()
    );
    MeetingId::new(id.chars().take(ROOM_ID_MAX_LEN).collect::<String>())
}

/// URL handed to the embedded video widget. Chat, notifications and the
/// widget's own "share the room" dialog are switched off.
pub fn join_url(video_base_url: &str, room: &MeetingId, user_name: &str) -> Result<String> {
    let base = format!("{}/join", video_base_url.trim_end_matches('/'));
    let url = Url::parse_with_params(
        &base,
        &[
            ("room", room.as_str()),
            ("name", user_name),
            ("audio", "1"),
            ("video", "1"),
            ("screen", "0"),
            ("chat", "0"),
            ("hide", "0"),
            ("notify", "0"),
            ("share", "0"),
        ],
    )
    .with_context(|| format!("Invalid video base URL: {}", video_base_url))?;
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Conseil Municipal"), "conseil-municipal");
        assert_eq!(slugify("Réunion  du 12/03 !!"), "r-union-du-12-03-");
        assert_eq!(slugify("A very long meeting name indeed"), "a-very-long-meeting-");
    }

    #[test]
    fn test_room_id_shape() {
        let now = Utc::now();
        let id = generate_room_id("Budget 2025", now);
        let s = id.as_str();
        assert!(s.starts_with("budget-2025-"));
        assert!(s.ends_with(&now.timestamp_millis().to_string()));
        assert!(s.len() <= ROOM_ID_MAX_LEN);
    }

    #[test]
    fn test_room_id_is_truncated() {
        let id = generate_room_id("Extraordinary general assembly of residents", Utc::now());
        assert!(id.as_str().chars().count() <= ROOM_ID_MAX_LEN);
    }

    #[test]
    fn test_join_url() {
        let url = join_url(
            "https://sfu.mirotalk.com/",
            &MeetingId::from("budget-abc123-1"),
            "Jean Dupont",
        )
        .unwrap();
        assert_eq!(
            url,
            "https://sfu.mirotalk.com/join?room=budget-abc123-1&name=Jean+Dupont\
             &audio=1&video=1&screen=0&chat=0&hide=0&notify=0&share=0"
        );
    }

    #[test]
    fn test_join_url_rejects_bad_base() {
        assert!(join_url("not a url", &MeetingId::from("r"), "x").is_err());
    }

    #[test]
    fn test_join_window() {
        let now = Utc::now();
        let window = Duration::minutes(10);
        let mut meeting = Meeting {
            id: MeetingId::from("m"),
            name: "m".to_string(),
            subjects: String::new(),
            scheduled_date: None,
            created_at: now,
            url: String::new(),
        };
        assert!(meeting.is_joinable(now, window));

        meeting.scheduled_date = Some(now + Duration::minutes(30));
        assert!(!meeting.is_joinable(now, window));

        meeting.scheduled_date = Some(now + Duration::minutes(10));
        assert!(meeting.is_joinable(now, window));

        meeting.scheduled_date = Some(now - Duration::hours(2));
        assert!(meeting.is_joinable(now, window));
    }

    #[test]
    fn test_backend_meeting_deserializes() {
        let json = r#"{
            "id": "budget-abc123-1",
            "name": "Budget",
            "subjects": "",
            "scheduledDate": null,
            "createdAt": "2025-03-01T18:30:12.345678",
            "url": "https://sfu.mirotalk.com/join?room=budget-abc123-1&name=Admin"
        }"#;
        let m: Meeting = serde_json::from_str(json).unwrap();
        assert!(m.scheduled_date.is_none());
        assert_eq!(m.name, "Budget");
    }

    #[test]
    fn test_report_link() {
        let mut report = Report {
            meeting_id: MeetingId::from("m"),
            report_url: "  ".to_string(),
            updated_at: None,
        };
        assert_eq!(report.link(), None);
        report.report_url = "https://docs.example.org/cr".to_string();
        assert_eq!(report.link(), Some("https://docs.example.org/cr"));
    }
}
