use serde::{Deserialize, Serialize};

use crate::models::{ComplaintId, Message};

/// Events sent from the gateway to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChannelEvent {
    /// Server accepted the bearer token
    Ready { user_id: String, display_name: String },

    /// A message was posted to the room
    NewMessage {
        complaint_id: ComplaintId,
        message: Message,
    },

    /// A participant started composing
    TypingStart {
        complaint_id: ComplaintId,
        user_id: String,
        #[serde(default)]
        display_name: Option<String>,
    },

    /// A participant stopped composing
    TypingStop {
        complaint_id: ComplaintId,
        user_id: String,
    },

    /// A participant's connection went away
    ParticipantLeft {
        complaint_id: ComplaintId,
        user_id: String,
    },

    /// Server-side failure on this connection
    ConnectionError { reason: String },
}

impl ChannelEvent {
    /// Returns the room this event belongs to. Events that return `None`
    /// concern the connection itself.
    pub fn complaint_id(&self) -> Option<&ComplaintId> {
        match self {
            Self::NewMessage { complaint_id, .. }
            | Self::TypingStart { complaint_id, .. }
            | Self::TypingStop { complaint_id, .. }
            | Self::ParticipantLeft { complaint_id, .. } => Some(complaint_id),
            Self::Ready { .. } | Self::ConnectionError { .. } => None,
        }
    }
}

/// Commands sent FROM client TO gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChannelCommand {
    /// Join the discussion room of a complaint. A connection is in at most one room.
    JoinRoom { complaint_id: ComplaintId },

    /// Post a message to the room
    SendMessage { complaint_id: ComplaintId, body: String },

    /// Indicate composing in the room
    TypingStart {
        complaint_id: ComplaintId,
        display_name: String,
    },

    /// Indicate composing ended
    TypingStop { complaint_id: ComplaintId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_wire_format() {
        let cmd = ChannelCommand::JoinRoom {
            complaint_id: ComplaintId::new("c-123").unwrap(),
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "type": "JoinRoom", "data": { "complaint_id": "c-123" } })
        );
    }

    #[test]
    fn typing_start_without_name() {
        let raw = r#"{"type":"TypingStart","data":{"complaint_id":"c-1","user_id":"u-2"}}"#;
        let event: ChannelEvent = serde_json::from_str(raw).unwrap();
        match event {
            ChannelEvent::TypingStart { display_name, .. } => assert_eq!(display_name, None),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn connection_scoped_events_have_no_room() {
        let event = ChannelEvent::ConnectionError {
            reason: "bad token".into(),
        };
        assert!(event.complaint_id().is_none());
    }
}
