// crates/types/src/ticket.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::id::{self, Id};
use crate::lenient;

/// Lifecycle status of a support ticket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Raised by a user, not yet claimed by an agent.
    #[default]
    Open,
    /// Claimed by an agent.
    InProgress,
    Closed,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 3] = [Self::Open, Self::InProgress, Self::Closed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Closed => "closed",
        }
    }

    /// Blank or unrecognised statuses decode as absent instead of failing
    /// the frame they arrive in.
    fn lenient_optional<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Self>, D::Error> {
        let value = Option::<Value>::deserialize(d)?;
        Ok(value.as_ref().and_then(Value::as_str).and_then(|s| s.parse().ok()))
    }

    /// As [`Self::lenient_optional`], falling back to `open`.
    fn lenient<'de, D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Ok(Self::lenient_optional(d)?.unwrap_or_default())
    }

    /// Label shown in ticket lists.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::InProgress => "Active",
            Self::Closed => "Closed",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "in_progress" | "in-progress" | "active" => Ok(Self::InProgress),
            "closed" => Ok(Self::Closed),
            other => Err(format!("unknown ticket status: {other}")),
        }
    }
}

/// Conversation language. Anything unrecognised is treated as English.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Hindi,
    #[default]
    #[serde(other)]
    English,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::English => "english",
            Self::Hindi => "hindi",
        }
    }

    /// Canned text asking the user to attach an image or video.
    pub fn upload_prompt(&self) -> &'static str {
        match self {
            Self::English => "Please upload image/video",
            Self::Hindi => "कृपया छवि/वीडियो अपलोड करें",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A support ticket as returned by `getTickets`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Id,
    #[serde(default, deserialize_with = "TicketStatus::lenient")]
    pub status: TicketStatus,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub language: Language,
    #[serde(default, deserialize_with = "id::optional::deserialize")]
    pub user_id: Option<Id>,
    #[serde(default, deserialize_with = "lenient::text::deserialize")]
    pub user_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::text::deserialize")]
    pub user_team_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::text::deserialize")]
    pub topic_name: Option<String>,
    #[serde(default, with = "lenient::timestamp")]
    pub update_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "id::optional::deserialize")]
    pub agent_id: Option<Id>,
}

impl Ticket {
    pub fn new(id: impl Into<Id>, status: TicketStatus) -> Self {
        Self {
            id: id.into(),
            status,
            language: Language::default(),
            user_id: None,
            user_name: None,
            user_team_name: None,
            topic_name: None,
            update_at: None,
            agent_id: None,
        }
    }
}

/// Requester contact details sent alongside `getChat` as `ticketInfo`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketContact {
    #[serde(default, deserialize_with = "id::optional::deserialize")]
    pub user_id: Option<Id>,
    #[serde(default, deserialize_with = "lenient::text::deserialize")]
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::text::deserialize")]
    pub user_email: Option<String>,
    #[serde(default, deserialize_with = "lenient::text::deserialize")]
    pub user_created_at: Option<String>,
    #[serde(default, deserialize_with = "lenient::text::deserialize")]
    pub user_phone_no: Option<String>,
    #[serde(default, deserialize_with = "lenient::text::deserialize")]
    pub user_team_name: Option<String>,
}

/// Ticket metadata sent alongside `getChat` as `ticketData`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketMeta {
    #[serde(default, deserialize_with = "id::optional::deserialize")]
    pub id: Option<Id>,
    #[serde(default, deserialize_with = "TicketStatus::lenient_optional")]
    pub status: Option<TicketStatus>,
    #[serde(default)]
    pub language: Option<Language>,
    #[serde(default, rename = "userName", deserialize_with = "lenient::text::deserialize")]
    pub user_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::text::deserialize")]
    pub topic_name: Option<String>,
    #[serde(default, with = "lenient::timestamp")]
    pub update_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "id::optional::deserialize")]
    pub agent_id: Option<Id>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ticket_decodes_loose_payload() {
        let ticket: Ticket = serde_json::from_value(json!({
            "id": 17,
            "status": "in_progress",
            "language": null,
            "user_id": "501",
            "user_name": "Ravi",
            "user_team_name": 11,
            "topic_name": "",
            "update_at": "garbage",
        }))
        .unwrap();

        assert_eq!(ticket.id, Id::from("17"));
        assert_eq!(ticket.status, TicketStatus::InProgress);
        assert_eq!(ticket.language, Language::English);
        assert_eq!(ticket.user_team_name.as_deref(), Some("11"));
        assert_eq!(ticket.topic_name, None);
        assert_eq!(ticket.update_at, None);
        assert_eq!(ticket.agent_id, None);
    }

    #[test]
    fn test_unknown_language_falls_back_to_english() {
        let lang: Language = serde_json::from_value(json!("tamil")).unwrap();
        assert_eq!(lang, Language::English);
        let lang: Language = serde_json::from_value(json!("hindi")).unwrap();
        assert_eq!(lang, Language::Hindi);
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in TicketStatus::ALL {
            assert_eq!(status.as_str().parse::<TicketStatus>().unwrap(), status);
        }
        assert!("pending".parse::<TicketStatus>().is_err());
    }

    #[test]
    fn test_ticket_meta_reads_camel_case_user_name() {
        let meta: TicketMeta = serde_json::from_value(json!({
            "id": "42",
            "status": "closed",
            "userName": "Asha",
            "agent_id": 9,
        }))
        .unwrap();
        assert_eq!(meta.user_name.as_deref(), Some("Asha"));
        assert_eq!(meta.status, Some(TicketStatus::Closed));
        assert_eq!(meta.agent_id, Some(Id::from("9")));
    }

    #[test]
    fn test_blank_or_unknown_status_does_not_fail_decoding() {
        let meta: TicketMeta = serde_json::from_value(json!({"id": 42, "status": ""})).unwrap();
        assert_eq!(meta.status, None);
        let meta: TicketMeta = serde_json::from_value(json!({"id": 42, "status": "pending"})).unwrap();
        assert_eq!(meta.status, None);
        let meta: TicketMeta = serde_json::from_value(json!({"id": 42, "status": null})).unwrap();
        assert_eq!(meta.status, None);

        let ticket: Ticket = serde_json::from_value(json!({"id": 3, "status": ""})).unwrap();
        assert_eq!(ticket.status, TicketStatus::Open);
        let ticket: Ticket = serde_json::from_value(json!({"id": 3, "status": "closed"})).unwrap();
        assert_eq!(ticket.status, TicketStatus::Closed);
    }
}
