use std::time::Duration;

use tokio::time::Instant;

const UNNAMED_TYPER: &str = "Someone";

/// Another participant currently composing a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingParticipant {
    pub user_id: String,
    pub display_name: String,
    last_seen: Instant,
}

/// Remote participants that are composing, in order of their first typing-start.
#[derive(Debug)]
pub struct TypingTracker {
    local_user: Option<String>,
    participants: Vec<TypingParticipant>,
    expiry: Option<Duration>,
}

impl TypingTracker {
    pub fn new(expiry: Option<Duration>) -> Self {
        Self {
            local_user: None,
            participants: Vec::new(),
            expiry,
        }
    }

    pub fn participants(&self) -> &[TypingParticipant] {
        &self.participants
    }

    /// Record who "we" are. An entry for that id is dropped immediately.
    pub fn set_local_user(&mut self, user_id: &str) {
        self.participants.retain(|p| p.user_id != user_id);
        self.local_user = Some(user_id.to_string());
    }

    /// Returns whether the visible set changed.
    pub fn on_remote_start(&mut self, user_id: &str, display_name: Option<&str>, now: Instant) -> bool {
        if self.local_user.as_deref() == Some(user_id) {
            return false;
        }

        let display_name = display_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(UNNAMED_TYPER);

        if let Some(p) = self.participants.iter_mut().find(|p| p.user_id == user_id) {
            p.last_seen = now;
            if p.display_name == display_name {
                return false;
            }
            p.display_name = display_name.to_string();
            return true;
        }

        self.participants.push(TypingParticipant {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            last_seen: now,
        });
        true
    }

    /// Removing an absent participant is a no-op.
    pub fn on_remote_stop(&mut self, user_id: &str) -> bool {
        let before = self.participants.len();
        self.participants.retain(|p| p.user_id != user_id);
        self.participants.len() != before
    }

    /// Drop participants whose last signal is older than the expiry window.
    pub fn expire(&mut self, now: Instant) -> bool {
        let Some(expiry) = self.expiry else {
            return false;
        };
        let before = self.participants.len();
        self.participants
            .retain(|p| now.saturating_duration_since(p.last_seen) < expiry);
        self.participants.len() != before
    }

    /// When the next participant would expire, if any.
    pub fn next_expiry(&self) -> Option<Instant> {
        let expiry = self.expiry?;
        self.participants.iter().map(|p| p.last_seen + expiry).min()
    }

    pub fn clear(&mut self) -> bool {
        let changed = !self.participants.is_empty();
        self.participants.clear();
        changed
    }

    pub fn label(&self) -> Option<String> {
        let names: Vec<&str> = self
            .participants
            .iter()
            .map(|p| p.display_name.as_str())
            .collect();
        typing_label(&names)
    }
}

/// Compose the "... is typing…" line for a set of names.
pub fn typing_label(names: &[&str]) -> Option<String> {
    match names {
        [] => None,
        [one] => Some(format!("{} is typing…", one)),
        [first, second] => Some(format!("{} and {} are typing…", first, second)),
        [first, rest @ ..] => Some(format!("{} and {} others are typing…", first, rest.len())),
    }
}

/// Debounce for our own typing signal.
///
/// The first keystroke after idle asks for typing-start; every keystroke
/// pushes the idle deadline out; when the deadline passes the owner sends
/// typing-stop.
#[derive(Debug)]
pub struct LocalTyping {
    idle: Duration,
    deadline: Option<Instant>,
}

impl LocalTyping {
    pub fn new(idle: Duration) -> Self {
        Self {
            idle,
            deadline: None,
        }
    }

    /// Returns `true` when typing-start should be emitted.
    pub fn on_keystroke(&mut self, now: Instant) -> bool {
        let was_idle = self.deadline.is_none();
        self.deadline = Some(now + self.idle);
        was_idle
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_typing(&self) -> bool {
        self.deadline.is_some()
    }

    /// Returns `true` when typing-stop should be emitted.
    pub fn on_tick(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Forget pending state without asking for a stop (connection gone).
    pub fn reset(&mut self) {
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_for_each_group_size() {
        assert_eq!(typing_label(&[]), None);
        assert_eq!(typing_label(&["Alice"]).as_deref(), Some("Alice is typing…"));
        assert_eq!(
            typing_label(&["Alice", "Bob"]).as_deref(),
            Some("Alice and Bob are typing…")
        );
        assert_eq!(
            typing_label(&["Alice", "Bob", "Carol"]).as_deref(),
            Some("Alice and 2 others are typing…")
        );
    }

    #[test]
    fn tracker_label_follows_first_start_order() {
        let now = Instant::now();
        let mut tracker = TypingTracker::new(None);
        tracker.on_remote_start("u-a", Some("Alice"), now);
        tracker.on_remote_start("u-b", Some("Bob"), now);
        tracker.on_remote_start("u-a", Some("Alice"), now);
        assert_eq!(tracker.label().as_deref(), Some("Alice and Bob are typing…"));

        tracker.on_remote_start("u-c", Some("Carol"), now);
        assert_eq!(tracker.label().as_deref(), Some("Alice and 2 others are typing…"));
    }

    #[test]
    fn self_is_never_listed() {
        let now = Instant::now();
        let mut tracker = TypingTracker::new(None);
        tracker.on_remote_start("me", Some("Me"), now);
        tracker.set_local_user("me");
        assert!(tracker.participants().is_empty());

        assert!(!tracker.on_remote_start("me", Some("Me"), now));
        assert!(tracker.participants().is_empty());
        assert_eq!(tracker.label(), None);
    }

    #[test]
    fn stop_of_unknown_participant_is_noop() {
        let mut tracker = TypingTracker::new(None);
        assert!(!tracker.on_remote_stop("ghost"));

        tracker.on_remote_start("u-a", None, Instant::now());
        assert_eq!(tracker.participants()[0].display_name, "Someone");
        assert!(tracker.on_remote_stop("u-a"));
        assert!(tracker.participants().is_empty());
    }

    #[test]
    fn stale_participants_expire() {
        let start = Instant::now();
        let mut tracker = TypingTracker::new(Some(Duration::from_secs(6)));
        tracker.on_remote_start("u-a", Some("Alice"), start);
        tracker.on_remote_start("u-b", Some("Bob"), start + Duration::from_secs(4));
        assert_eq!(tracker.next_expiry(), Some(start + Duration::from_secs(6)));

        assert!(!tracker.expire(start + Duration::from_secs(5)));
        assert!(tracker.expire(start + Duration::from_secs(6)));
        assert_eq!(tracker.label().as_deref(), Some("Bob is typing…"));
    }

    #[test]
    fn expiry_can_be_disabled() {
        let start = Instant::now();
        let mut tracker = TypingTracker::new(None);
        tracker.on_remote_start("u-a", Some("Alice"), start);
        assert_eq!(tracker.next_expiry(), None);
        assert!(!tracker.expire(start + Duration::from_secs(3600)));
    }

    #[test]
    fn local_debounce() {
        let idle = Duration::from_millis(1200);
        let start = Instant::now();
        let mut local = LocalTyping::new(idle);

        assert!(local.on_keystroke(start));
        assert!(!local.on_keystroke(start + Duration::from_millis(500)));
        assert!(!local.on_tick(start + Duration::from_millis(1300)));
        assert!(local.on_tick(start + Duration::from_millis(1700)));
        assert!(!local.is_typing());

        // next burst starts again
        assert!(local.on_keystroke(start + Duration::from_secs(5)));
    }
}
