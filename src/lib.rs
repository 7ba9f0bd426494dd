//! Client for scheduling video meetings, running live polls in them and
//! archiving what happened.
//!
//! State lives in a [`Session`]. Every remote call goes through
//! [`MeetingApi`]; when the backend cannot be reached, reads fall back to a
//! [`DurableStore`] and poll mutations continue in local mode.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod ids;
pub mod meeting;
pub mod poll;
pub mod protocol;
pub mod resident;
pub mod session;
pub mod stats;
pub mod storage;
pub mod sync;
pub mod timestamp;

pub use api::{HttpApi, MeetingApi};
pub use config::Config;
pub use error::{Error, Result};
pub use ids::{MeetingId, PollId, ResidentId};
pub use session::Session;
pub use storage::DurableStore;
