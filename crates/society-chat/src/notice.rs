use std::fmt;

/// A user-visible notice raised by a discussion session.
///
/// Network failures never surface as errors to the view; they are turned
/// into one of these and the view keeps working with whatever state it has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The history fetch failed. The thread stays empty but usable.
    HistoryLoadFailed(String),
    /// The realtime connection could not be (re)established within the retry budget.
    ConnectionFailed(String),
    /// A message could not be handed to the connection and was rolled back.
    SendFailed,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HistoryLoadFailed(reason) => write!(f, "Failed to load comments: {}", reason),
            Self::ConnectionFailed(reason) => write!(f, "Live discussion unavailable: {}", reason),
            Self::SendFailed => f.write_str("Failed to add comment"),
        }
    }
}
