pub mod config;
pub mod error;
pub mod history;
pub mod notice;
pub mod reducer;
pub mod session;
pub mod transport;
pub mod typing;

pub use config::ChatConfig;
pub use error::ChatError;
pub use notice::Notice;
pub use session::{ChannelSession, DiscussionView, SessionState};
