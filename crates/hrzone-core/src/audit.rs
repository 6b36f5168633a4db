//! Append-only audit trail of dialogue outcomes.

use std::{fs::OpenOptions, io::Write, path::PathBuf, sync::Mutex};

use chrono::Utc;
use serde::Serialize;

use crate::{domain::UserId, errors::Error, session::DialogueState, zones::ZoneResult, Result};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event: String,
    pub user_id: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resting_heart_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_heart_rate: Option<i32>,
}

impl AuditEvent {
    fn base(event: &str, user_id: UserId) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            event: event.to_string(),
            user_id: user_id.0,
            trigger: None,
            stage: None,
            age: None,
            resting_heart_rate: None,
            max_heart_rate: None,
        }
    }

    /// `trigger` is the event that (re)started the dialogue: "start" or "restart".
    pub fn started(user_id: UserId, trigger: &str) -> Self {
        Self {
            trigger: Some(trigger.to_string()),
            ..Self::base("started", user_id)
        }
    }

    pub fn cancelled(user_id: UserId, stage: Option<DialogueState>) -> Self {
        let stage = match stage {
            Some(DialogueState::AwaitingAge) => "awaiting_age",
            Some(DialogueState::AwaitingRestingHr { .. }) => "awaiting_resting_hr",
            None => "idle",
        };
        Self {
            stage: Some(stage.to_string()),
            ..Self::base("cancelled", user_id)
        }
    }

    pub fn completed(
        user_id: UserId,
        age: u32,
        resting_heart_rate: u32,
        result: &ZoneResult,
    ) -> Self {
        Self {
            age: Some(age),
            resting_heart_rate: Some(resting_heart_rate),
            max_heart_rate: Some(result.max_heart_rate),
            ..Self::base("completed", user_id)
        }
    }
}

#[derive(Debug)]
pub struct AuditLogger {
    path: PathBuf,
    json: bool,
    write_lock: Mutex<()>,
}

impl AuditLogger {
    pub fn new(path: impl Into<PathBuf>, json: bool) -> Self {
        Self {
            path: path.into(),
            json,
            write_lock: Mutex::new(()),
        }
    }

    pub fn write(&self, event: &AuditEvent) -> Result<()> {
        let entry = if self.json {
            let mut line = serde_json::to_string(event)?;
            line.push('\n');
            line
        } else {
            format_plain(event)?
        };

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::External("audit log lock poisoned".to_string()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(entry.as_bytes())?;
        Ok(())
    }
}

fn format_plain(event: &AuditEvent) -> Result<String> {
    let value = serde_json::to_value(event)?;
    let Some(obj) = value.as_object() else {
        return Err(Error::External(
            "audit event is not a JSON object".to_string(),
        ));
    };

    let mut out = String::new();
    out.push('\n');
    out.push_str(&"=".repeat(60));
    for (k, v) in obj {
        out.push('\n');
        out.push_str(k);
        out.push_str(": ");
        match v {
            serde_json::Value::String(s) => out.push_str(s),
            other => out.push_str(&other.to_string()),
        }
    }
    out.push('\n');
    Ok(out)
}
