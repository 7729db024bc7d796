use std::collections::HashSet;

use chrono::Utc;
use society_types::models::{Author, Message, TEMP_ID_PREFIX};

/// Ordered message list for one room.
///
/// Entries stay in arrival order. Optimistic placeholders are never paired
/// with the server's echo of the same text: both remain, one after the other,
/// until the caller rolls the placeholder back.
#[derive(Debug, Default)]
pub struct MessageStream {
    messages: Vec<Message>,
    ids: HashSet<String>,
    last_temp: i64,
}

impl MessageStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Replace the list wholesale. Repeated ids keep their first occurrence.
    pub fn load_history(&mut self, history: Vec<Message>) {
        self.messages.clear();
        self.ids.clear();
        for message in history {
            if self.ids.insert(message.id.clone()) {
                self.messages.push(message);
            }
        }
    }

    /// Load history that arrived after the room was already live. Entries we
    /// already hold and the history lacks (live arrivals, pending sends) are
    /// kept after it, in their original order.
    pub fn rebase_on_history(&mut self, history: Vec<Message>) {
        let live = std::mem::take(&mut self.messages);
        self.load_history(history);
        for message in live {
            if self.ids.insert(message.id.clone()) {
                self.messages.push(message);
            }
        }
    }

    /// Append a pending placeholder and return its temporary id, or `None`
    /// when the body is blank.
    pub fn append_optimistic(&mut self, body: &str, author: Author) -> Option<String> {
        if body.trim().is_empty() {
            return None;
        }

        let now = Utc::now();
        // Strictly increasing so two sends in the same millisecond stay distinct
        let stamp = now.timestamp_millis().max(self.last_temp + 1);
        self.last_temp = stamp;
        let id = format!("{}{}", TEMP_ID_PREFIX, stamp);

        self.ids.insert(id.clone());
        self.messages.push(Message {
            id: id.clone(),
            body: body.to_string(),
            author,
            created_at: now,
            pending: true,
        });
        Some(id)
    }

    /// Append a server message unless its id is already present.
    /// Returns whether the list changed.
    pub fn reconcile_inbound(&mut self, mut message: Message) -> bool {
        if self.ids.contains(&message.id) {
            return false;
        }
        message.pending = false;
        self.ids.insert(message.id.clone());
        self.messages.push(message);
        true
    }

    /// Remove the entry with `id`. Returns whether anything was removed.
    pub fn rollback(&mut self, id: &str) -> bool {
        if !self.ids.remove(id) {
            return false;
        }
        self.messages.retain(|m| m.id != id);
        true
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use society_types::models::Role;

    use super::*;

    fn author(id: &str) -> Author {
        Author {
            id: id.into(),
            display_name: id.to_uppercase(),
            role: Role::Owner,
        }
    }

    fn confirmed(id: &str, body: &str) -> Message {
        Message {
            id: id.into(),
            body: body.into(),
            author: author("u-2"),
            created_at: Utc::now(),
            pending: false,
        }
    }

    #[test]
    fn redelivery_is_ignored() {
        let mut stream = MessageStream::new();
        assert!(stream.reconcile_inbound(confirmed("m-1", "first")));
        assert!(stream.reconcile_inbound(confirmed("m-2", "second")));
        assert!(!stream.reconcile_inbound(confirmed("m-1", "first")));
        assert!(!stream.reconcile_inbound(confirmed("m-2", "second, replayed")));

        let ids: Vec<&str> = stream.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m-1", "m-2"]);
        assert_eq!(stream.messages()[1].body, "second");
    }

    #[test]
    fn keeps_arrival_order_regardless_of_timestamps() {
        let mut stream = MessageStream::new();
        let mut late = confirmed("m-late", "written later");
        late.created_at = Utc::now() + chrono::Duration::hours(1);
        stream.reconcile_inbound(late);
        stream.reconcile_inbound(confirmed("m-early", "written earlier"));

        assert_eq!(stream.messages()[0].id, "m-late");
        assert_eq!(stream.messages()[1].id, "m-early");
    }

    #[test]
    fn blank_body_is_rejected() {
        let mut stream = MessageStream::new();
        assert_eq!(stream.append_optimistic("   \n", author("u-1")), None);
        assert!(stream.is_empty());
    }

    #[test]
    fn optimistic_then_rollback() {
        let mut stream = MessageStream::new();
        let id = stream.append_optimistic("hello", author("u-1")).unwrap();
        assert!(id.starts_with("tmp-"));
        assert!(!stream.messages()[0].is_confirmed());

        assert!(stream.rollback(&id));
        assert!(stream.messages().iter().all(|m| m.body != "hello"));
        assert!(!stream.rollback(&id));
    }

    #[test]
    fn temp_ids_are_unique() {
        let mut stream = MessageStream::new();
        let a = stream.append_optimistic("one", author("u-1")).unwrap();
        let b = stream.append_optimistic("two", author("u-1")).unwrap();
        assert_ne!(a, b);
        assert_eq!(stream.len(), 2);
    }

    #[test]
    fn echo_is_not_paired_with_placeholder() {
        let mut stream = MessageStream::new();
        let tmp = stream.append_optimistic("need help", author("u-1")).unwrap();
        stream.reconcile_inbound(confirmed("m-1", "need help"));

        assert_eq!(stream.len(), 2);
        assert_eq!(stream.messages()[0].id, tmp);
        assert_eq!(stream.messages()[1].id, "m-1");
    }

    #[test]
    fn history_replaces_and_dedups() {
        let mut stream = MessageStream::new();
        stream.append_optimistic("stale", author("u-1"));
        stream.load_history(vec![
            confirmed("m-1", "a"),
            confirmed("m-2", "b"),
            confirmed("m-1", "a again"),
        ]);
        assert_eq!(stream.len(), 2);
        assert_eq!(stream.messages()[0].body, "a");

        stream.load_history(Vec::new());
        assert!(stream.is_empty());
        assert!(stream.reconcile_inbound(confirmed("m-1", "a")));
    }

    #[test]
    fn late_history_keeps_live_entries() {
        let mut stream = MessageStream::new();
        stream.reconcile_inbound(confirmed("m-3", "live"));
        let tmp = stream.append_optimistic("mine", author("u-1")).unwrap();

        stream.rebase_on_history(vec![confirmed("m-1", "old"), confirmed("m-3", "live")]);

        let ids: Vec<&str> = stream.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m-1", "m-3", tmp.as_str()]);
        assert!(!stream.messages()[2].is_confirmed());
        assert!(stream.rollback(&tmp));
    }
}
