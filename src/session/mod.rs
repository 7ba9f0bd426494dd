//! The client session: who is using the client, in which meeting, with
//! which privileges, plus every component that talks to the backend.
//!
//! Operations are split by concern across this module's files; they all
//! take `&mut self`, so callers run them one at a time.

mod meetings;
mod polls;
mod residents;

use std::sync::Arc;

use anyhow::{Context, Result as AnyResult};
use chrono::Utc;

use crate::api::{HttpApi, MeetingApi};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::ids::MeetingId;
use crate::meeting::{self, Meeting};
use crate::resident::Roster;
use crate::stats::StatsTracker;
use crate::storage::{self, DurableStore, MemoryStore, RedbStore};
use crate::sync::PollSync;

/// Name under which the administrator appears in join URLs and polls.
const ADMIN_NAME: &str = "Admin";

pub struct Session {
    pub config: Config,
    api: Arc<dyn MeetingApi>,
    store: Arc<dyn DurableStore>,

    // Components
    pub polls: PollSync,
    pub stats: StatsTracker,
    pub roster: Roster,

    // Who and where
    admin: bool,
    current_meeting: Option<Meeting>,
    user_name: Option<String>,
    participants: Vec<String>,
    report_link: Option<String>,
}

impl Session {
    pub fn new(config: Config, api: Arc<dyn MeetingApi>, store: Arc<dyn DurableStore>) -> Self {
        let admin = storage::load_json(store.as_ref(), storage::ADMIN_MODE).unwrap_or(false);
        Self {
            polls: PollSync::new(api.clone(), store.clone(), config.sync.keep_unsynced_polls),
            stats: StatsTracker::new(api.clone(), store.clone()),
            roster: Roster::new(api.clone()),
            config,
            api,
            store,
            admin,
            current_meeting: None,
            user_name: None,
            participants: Vec::new(),
            report_link: None,
        }
    }

    /// Build a session against the configured backend. `ephemeral` keeps
    /// the fallback data in memory instead of on disk.
    pub fn from_config(config: Config, ephemeral: bool) -> AnyResult<Self> {
        let api = HttpApi::new(&config.api.base_url, config.api.read_timeout())
            .context("Failed to set up backend client")?;

        let store: Arc<dyn DurableStore> = if ephemeral {
            Arc::new(MemoryStore::new())
        } else {
            let dir = RedbStore::default_dir(config.storage.data_dir.as_deref())?;
            Arc::new(RedbStore::open(&dir)?)
        };

        tracing::info!(
            "Backend {} ({}), fallback store: {}",
            api.base_url(),
            api.backend_name(),
            store.backend_name()
        );
        Ok(Self::new(config, Arc::new(api), store))
    }

    /// Load what the session needs before the first command.
    pub async fn start(&mut self) {
        self.stats.load().await;
        self.roster.load().await;
    }

    // ── Admin mode ───────────────────────────────────────────────────

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    pub fn set_admin(&mut self, admin: bool) {
        self.admin = admin;
        storage::save_json(self.store.as_ref(), storage::ADMIN_MODE, &admin);
    }

    fn require_admin(&self) -> Result<()> {
        if self.admin {
            Ok(())
        } else {
            Err(Error::PermissionDenied)
        }
    }

    // ── Current meeting ──────────────────────────────────────────────

    pub fn current_meeting(&self) -> Option<&Meeting> {
        self.current_meeting.as_ref()
    }

    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    pub fn participants(&self) -> &[String] {
        &self.participants
    }

    pub fn report_link(&self) -> Option<&str> {
        self.report_link.as_deref()
    }

    fn require_meeting(&self) -> Result<MeetingId> {
        self.current_meeting
            .as_ref()
            .map(|m| m.id.clone())
            .ok_or(Error::NoActiveMeeting)
    }

    fn require_user(&self) -> Result<String> {
        self.user_name.clone().ok_or(Error::NotIdentified)
    }

    /// Enter a meeting as `user_name` and return the URL for the video
    /// widget.
    pub async fn join(&mut self, meeting_id: &MeetingId, user_name: &str) -> Result<String> {
        let user_name = user_name.trim();
        if user_name.is_empty() {
            return Err(Error::NotIdentified);
        }

        let meeting = self
            .list_meetings()
            .await
            .into_iter()
            .find(|m| &m.id == meeting_id)
            .ok_or_else(|| Error::NotFound(format!("meeting {}", meeting_id)))?;

        if !meeting.is_joinable(Utc::now(), self.config.meetings.join_window()) {
            let opens = meeting
                .scheduled_date
                .map(|d| crate::timestamp::format(&(d - self.config.meetings.join_window())))
                .unwrap_or_default();
            return Err(Error::Validation(format!(
                "Meeting '{}' opens at {}",
                meeting.name, opens
            )));
        }

        let url = self.join_url(&meeting.id, user_name)?;

        if self.current_meeting.as_ref().is_some_and(|m| m.id != meeting.id) {
            self.leave().await?;
        }

        self.report_link = match self.api.get_report(&meeting.id).await {
            Ok(report) => report.link().map(str::to_string),
            Err(e) => {
                tracing::debug!("No report for {}: {}", meeting.id, e);
                None
            }
        };
        if !self.participants.iter().any(|p| p == user_name) {
            self.participants.push(user_name.to_string());
        }
        self.user_name = Some(user_name.to_string());
        self.stats.record_connect(&meeting.id, user_name).await;
        tracing::info!("{} joined {}", user_name, meeting.id);
        self.current_meeting = Some(meeting);
        Ok(url)
    }

    /// Leave the current meeting, closing the participant's session.
    pub async fn leave(&mut self) -> Result<()> {
        let meeting_id = self.require_meeting()?;
        if let Some(user) = self.user_name.take() {
            self.stats.record_disconnect(&meeting_id, &user).await;
            tracing::info!("{} left {}", user, meeting_id);
        }
        self.clear_meeting_state();
        Ok(())
    }

    fn clear_meeting_state(&mut self) {
        self.current_meeting = None;
        self.user_name = None;
        self.participants.clear();
        self.report_link = None;
    }

    pub fn join_url(&self, meeting_id: &MeetingId, user_name: &str) -> Result<String> {
        meeting::join_url(&self.config.video.base_url, meeting_id, user_name)
            .map_err(|e| Error::Validation(format!("{:#}", e)))
    }
}
