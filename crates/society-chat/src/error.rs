use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("complaint id must not be empty")]
    EmptyComplaintId,

    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("api returned status {status}")]
    Api { status: u16, message: Option<String> },

    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("connection closed")]
    Closed,
}

const NETWORK_MESSAGE: &str = "Unable to connect to server. Please try again.";
const FALLBACK_MESSAGE: &str = "Something went wrong. Please try again later.";

fn status_message(status: u16) -> Option<&'static str> {
    match status {
        401 => Some("Your session has expired. Please login again."),
        403 => Some("You do not have permission to do this action."),
        404 => Some("Requested data was not found."),
        500 => Some("Request failed with status code 500"),
        _ => None,
    }
}

impl ChatError {
    /// Text suitable for a toast. A message supplied by the server wins over
    /// the status-based wording.
    pub fn user_message(&self) -> String {
        match self {
            Self::Api {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => message.clone(),
            Self::Api { status, .. } => status_message(*status).unwrap_or(FALLBACK_MESSAGE).into(),
            Self::Http(e) if e.is_connect() || e.is_timeout() => NETWORK_MESSAGE.into(),
            Self::Http(e) => e
                .status()
                .and_then(|s| status_message(s.as_u16()))
                .unwrap_or(FALLBACK_MESSAGE)
                .into(),
            Self::WebSocket(tungstenite::Error::Http(resp)) => status_message(resp.status().as_u16())
                .unwrap_or(FALLBACK_MESSAGE)
                .into(),
            Self::WebSocket(tungstenite::Error::Io(_)) | Self::Closed => NETWORK_MESSAGE.into(),
            _ => FALLBACK_MESSAGE.into(),
        }
    }
}
