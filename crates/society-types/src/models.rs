use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Prefix of client-assigned ids for messages that are not yet confirmed.
pub const TEMP_ID_PREFIX: &str = "tmp-";

/// Identifier of a complaint, and therefore of its discussion room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComplaintId(String);

impl ComplaintId {
    /// Returns `None` for an empty or whitespace-only id.
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            None
        } else {
            Some(Self(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComplaintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Society role. Only used to tint messages; authorization is server-side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Owner,
    #[default]
    Tenant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Owner => "owner",
            Self::Tenant => "tenant",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "owner" => Ok(Self::Owner),
            "tenant" => Ok(Self::Tenant),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

fn default_display_name() -> String {
    "User".into()
}

/// Treat an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(rename = "name", default = "default_display_name")]
    pub display_name: String,
    #[serde(default)]
    pub role: Role,
}

impl Default for Author {
    fn default() -> Self {
        Self {
            id: String::new(),
            display_name: default_display_name(),
            role: Role::default(),
        }
    }
}

/// A discussion message, in the shape the complaints API emits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "message")]
    pub body: String,
    /// Comments whose author was deleted arrive without one
    #[serde(rename = "createdBy", default, deserialize_with = "null_as_default")]
    pub author: Author,
    #[serde(rename = "createdAt", default, deserialize_with = "null_as_default")]
    pub created_at: DateTime<Utc>,
    /// Set on optimistic placeholders; never sent over the wire.
    #[serde(skip)]
    pub pending: bool,
}

/// How a message is tinted when rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tint {
    Mine,
    Admin,
    Other,
}

impl Message {
    pub fn is_confirmed(&self) -> bool {
        !self.pending
    }

    pub fn tint(&self, me: Option<&str>) -> Tint {
        match me {
            Some(me) if !me.is_empty() && self.author.id == me => Tint::Mine,
            _ if self.author.role == Role::Admin => Tint::Admin,
            _ => Tint::Other,
        }
    }
}
