//! JSON-lines command protocol spoken by `townhall serve`.
//!
//! One request object per line, with a `cmd` field; one response per line,
//! either `{"ok": <payload>}` or `{"error": <message>, "kind": <kind>}`.

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::ids::{MeetingId, PollId, ResidentId};
use crate::poll::PollDraft;
use crate::session::Session;
use crate::stats::format_duration;
use crate::timestamp;

/// Run one command against the session and build its response.
pub async fn handle(session: &mut Session, cmd: &Value) -> Value {
    let name = cmd.get("cmd").and_then(Value::as_str).unwrap_or("");
    tracing::debug!("Command: {}", name);

    let result = match name {
        "admin" => cmd_admin(session, cmd),
        "meetings" => payload(session.list_meetings().await),
        "create_meeting" => cmd_create_meeting(session, cmd).await,
        "delete_meeting" => cmd_delete_meeting(session, cmd).await,
        "join" => cmd_join(session, cmd).await,
        "leave" => session.leave().await.map(|()| Value::Null),
        "polls" => session.list_polls().await.and_then(payload),
        "create_poll" => cmd_create_poll(session, cmd).await,
        "vote" => cmd_vote(session, cmd).await,
        "cancel_vote" => cmd_cancel_vote(session, cmd).await,
        "close_poll" => cmd_close_poll(session, cmd).await,
        "stats" => cmd_stats(session, cmd),
        "end_meeting" => session.end_meeting().await.and_then(payload),
        "past_meetings" => payload(session.past_meetings().await),
        "delete_past_meeting" => cmd_delete_past_meeting(session, cmd).await,
        "report" => cmd_report(session, cmd).await,
        "set_report" => cmd_set_report(session, cmd).await,
        "residents" => payload(session.roster.sorted()),
        "add_residents" => cmd_add_residents(session, cmd).await,
        "edit_resident" => cmd_edit_resident(session, cmd).await,
        "delete_resident" => cmd_delete_resident(session, cmd).await,
        "join_url" => cmd_join_url(session, cmd),
        other => Err(Error::Validation(format!("unknown command '{}'", other))),
    };

    match result {
        Ok(value) => json!({ "ok": value }),
        Err(e) => {
            tracing::debug!("Command {} failed: {}", name, e);
            json!({ "error": e.to_string(), "kind": e.kind() })
        }
    }
}

fn payload<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::Validation(format!("unserializable: {e}")))
}

fn str_arg<'a>(cmd: &'a Value, key: &str) -> Result<&'a str> {
    cmd.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Validation(format!("missing string field '{}'", key)))
}

fn opt_str_arg<'a>(cmd: &'a Value, key: &str) -> Option<&'a str> {
    cmd.get(key).and_then(Value::as_str)
}

fn strings_arg(cmd: &Value, key: &str) -> Result<Vec<String>> {
    cmd.get(key)
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .ok_or_else(|| Error::Validation(format!("missing array field '{}'", key)))
}

fn meeting_arg(cmd: &Value) -> Result<MeetingId> {
    str_arg(cmd, "meetingId").map(MeetingId::from)
}

fn poll_arg(cmd: &Value) -> Result<PollId> {
    str_arg(cmd, "pollId").map(PollId::from)
}

fn resident_arg(cmd: &Value) -> Result<ResidentId> {
    let raw = cmd
        .get("id")
        .cloned()
        .ok_or_else(|| Error::Validation("missing field 'id'".to_string()))?;
    serde_json::from_value(raw).map_err(|e| Error::Validation(e.to_string()))
}

fn cmd_admin(session: &mut Session, cmd: &Value) -> Result<Value> {
    if let Some(enabled) = cmd.get("enabled").and_then(Value::as_bool) {
        session.set_admin(enabled);
    }
    Ok(json!({ "admin": session.is_admin() }))
}

async fn cmd_create_meeting(session: &mut Session, cmd: &Value) -> Result<Value> {
    let scheduled_date = match opt_str_arg(cmd, "scheduledDate").map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(timestamp::parse(raw).ok_or_else(|| {
            Error::Validation(format!("invalid scheduledDate '{}'", raw))
        })?),
    };
    let meeting = session
        .create_meeting(
            str_arg(cmd, "name")?,
            opt_str_arg(cmd, "subjects").unwrap_or(""),
            scheduled_date,
        )
        .await?;
    payload(meeting)
}

async fn cmd_delete_meeting(session: &mut Session, cmd: &Value) -> Result<Value> {
    session.delete_meeting(&meeting_arg(cmd)?).await?;
    Ok(Value::Null)
}

async fn cmd_join(session: &mut Session, cmd: &Value) -> Result<Value> {
    let url = session
        .join(&meeting_arg(cmd)?, str_arg(cmd, "userName")?)
        .await?;
    Ok(json!({ "url": url }))
}

async fn cmd_create_poll(session: &mut Session, cmd: &Value) -> Result<Value> {
    let draft = PollDraft {
        title: str_arg(cmd, "title")?.to_string(),
        description: opt_str_arg(cmd, "description").map(str::to_string),
        options: strings_arg(cmd, "options")?,
        allow_multiple: cmd
            .get("allowMultiple")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        ..PollDraft::default()
    };
    session.create_poll(draft).await.and_then(payload)
}

async fn cmd_vote(session: &mut Session, cmd: &Value) -> Result<Value> {
    let selected = strings_arg(cmd, "options")?;
    session
        .vote(&poll_arg(cmd)?, &selected)
        .await
        .and_then(payload)
}

async fn cmd_cancel_vote(session: &mut Session, cmd: &Value) -> Result<Value> {
    session.cancel_vote(&poll_arg(cmd)?).await.and_then(payload)
}

async fn cmd_close_poll(session: &mut Session, cmd: &Value) -> Result<Value> {
    session.close_poll(&poll_arg(cmd)?).await.and_then(payload)
}

/// Statistics of a meeting (the current one by default), each record
/// extended with a human-readable `duration`.
fn cmd_stats(session: &Session, cmd: &Value) -> Result<Value> {
    let meeting_id = match opt_str_arg(cmd, "meetingId") {
        Some(id) => MeetingId::from(id),
        None => session
            .current_meeting()
            .map(|m| m.id.clone())
            .ok_or(Error::NoActiveMeeting)?,
    };

    let mut out = serde_json::Map::new();
    for (name, record) in session.stats.meeting(&meeting_id).into_iter().flatten() {
        let mut entry = payload(record)?;
        if let Value::Object(fields) = &mut entry {
            fields.insert(
                "duration".to_string(),
                Value::String(format_duration(record.total_connection_duration)),
            );
        }
        out.insert(name.clone(), entry);
    }
    Ok(Value::Object(out))
}

async fn cmd_delete_past_meeting(session: &mut Session, cmd: &Value) -> Result<Value> {
    session.delete_past_meeting(&meeting_arg(cmd)?).await?;
    Ok(Value::Null)
}

async fn cmd_report(session: &mut Session, cmd: &Value) -> Result<Value> {
    session.report(&meeting_arg(cmd)?).await.and_then(payload)
}

async fn cmd_set_report(session: &mut Session, cmd: &Value) -> Result<Value> {
    session
        .set_report(&meeting_arg(cmd)?, str_arg(cmd, "reportUrl")?)
        .await
        .and_then(payload)
}

async fn cmd_add_residents(session: &mut Session, cmd: &Value) -> Result<Value> {
    session
        .add_residents(str_arg(cmd, "input")?)
        .await
        .and_then(payload)
}

async fn cmd_edit_resident(session: &mut Session, cmd: &Value) -> Result<Value> {
    session
        .edit_resident(
            resident_arg(cmd)?,
            str_arg(cmd, "firstName")?,
            str_arg(cmd, "lastName")?,
        )
        .await?;
    Ok(Value::Null)
}

async fn cmd_delete_resident(session: &mut Session, cmd: &Value) -> Result<Value> {
    session
        .delete_resident(resident_arg(cmd)?)
        .await
        .and_then(payload)
}

fn cmd_join_url(session: &Session, cmd: &Value) -> Result<Value> {
    let url = session.join_url(&meeting_arg(cmd)?, str_arg(cmd, "userName")?)?;
    Ok(json!({ "url": url }))
}
