use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Connected-service credentials keyed by service name
pub type ServiceTokenMap = HashMap<String, TokenBundle>;

#[derive(Debug, Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseKindError {
    kind: &'static str,
    value: String,
}

/// Tokens obtained from a provider for one user and one service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBundle {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Service registration the tokens were issued for
    #[serde(default)]
    pub service_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    #[default]
    Default,
    Google,
    Discord,
    Microsoft,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Default => "default",
            AccountType::Google => "google",
            AccountType::Discord => "discord",
            AccountType::Microsoft => "microsoft",
        }
    }
}

impl TryFrom<String> for AccountType {
    type Error = ParseKindError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "default" => Ok(AccountType::Default),
            "google" => Ok(AccountType::Google),
            "discord" => Ok(AccountType::Discord),
            "microsoft" => Ok(AccountType::Microsoft),
            _ => Err(ParseKindError {
                kind: "account type",
                value,
            }),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    #[sqlx(json)]
    pub services: ServiceTokenMap,
    pub friends: Vec<i64>,
    #[sqlx(try_from = "String")]
    #[serde(rename = "type")]
    pub account_type: AccountType,
}

/// Workspace membership entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: i64,
    #[serde(alias = "permission_level")]
    pub permission: u8,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Workspace {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub is_private: bool,
    pub owner_id: i64,
    #[sqlx(json)]
    pub users_id: Vec<Member>,
    #[sqlx(json)]
    pub variables: serde_json::Value,
    pub views: i64,
    pub is_enabled: bool,
}

impl Workspace {
    /// Owner first, then members in declaration order, without duplicates
    pub fn participant_ids(&self) -> Vec<i64> {
        let mut ids = vec![self.owner_id];
        for member in &self.users_id {
            if !ids.contains(&member.id) {
                ids.push(member.id);
            }
        }
        ids
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Success,
    Warning,
    Error,
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogKind::Success => "success",
            LogKind::Warning => "warning",
            LogKind::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub message: String,
}

impl LogEntry {
    pub fn success(message: impl Into<String>) -> Self {
        LogEntry {
            kind: LogKind::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        LogEntry {
            kind: LogKind::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        LogEntry {
            kind: LogKind::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Automate {
    pub id: i64,
    pub title: String,
    pub is_private: bool,
    pub workspace_id: i64,
    #[sqlx(json)]
    pub workflow: serde_json::Value,
    #[sqlx(json)]
    pub variables: serde_json::Value,
    pub trigger: i32,
    pub trigger_option: String,
    pub action: i32,
    pub action_option: String,
    #[sqlx(json)]
    pub logs: Vec<LogEntry>,
    pub is_enabled: bool,
    pub views: i64,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
    pub auth_url: String,
    pub token_url: String,
    pub owner_id: i64,
    pub users_id: Vec<i64>,
    pub is_private: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Trigger,
    Action,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Trigger => "trigger",
            EventKind::Action => "action",
        }
    }
}

impl TryFrom<String> for EventKind {
    type Error = ParseKindError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "trigger" => Ok(EventKind::Trigger),
            "action" => Ok(EventKind::Action),
            _ => Err(ParseKindError {
                kind: "event type",
                value,
            }),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub name: String,
    pub service_id: i64,
    #[sqlx(json)]
    pub workflow: serde_json::Value,
    #[sqlx(rename = "type", try_from = "String")]
    #[serde(rename = "type")]
    pub kind: EventKind,
}

/// Fields for a new user record
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub account_type: AccountType,
}

#[derive(Debug, Clone)]
pub struct NewWorkspace {
    pub title: String,
    pub description: String,
    pub is_private: bool,
    pub owner_id: i64,
    pub users_id: Vec<Member>,
    pub variables: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct NewAutomate {
    pub title: String,
    pub is_private: bool,
    pub workspace_id: i64,
    pub workflow: serde_json::Value,
    pub variables: serde_json::Value,
    pub trigger: i32,
    pub trigger_option: String,
    pub action: i32,
    pub action_option: String,
}

#[derive(Debug, Clone)]
pub struct NewService {
    pub name: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
    pub auth_url: String,
    pub token_url: String,
    pub owner_id: i64,
    pub is_private: bool,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub name: String,
    pub service_id: i64,
    pub workflow: serde_json::Value,
    pub kind: EventKind,
}
