use std::collections::HashSet;

use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use society_chat::history::HttpHistory;
use society_chat::transport::WsConnector;
use society_chat::{ChannelSession, ChatConfig, DiscussionView, SessionState};
use society_types::models::{Message, Tint};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "society=info".into()),
        )
        .init();

    // Config
    let config = ChatConfig::from_env();
    let token = std::env::var("SOCIETY_TOKEN").ok();
    let complaint_id = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SOCIETY_COMPLAINT_ID").ok())
        .ok_or_else(|| anyhow::anyhow!("usage: society-console <complaint-id>"))?;

    info!("Opening discussion {} via {}", complaint_id, config.gateway_url);
    let mut session = ChannelSession::open(
        &complaint_id,
        token,
        WsConnector::new(config.gateway_url.clone()),
        HttpHistory::new(config.api_url.clone()),
        config,
    )?;

    let mut view_rx = session.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut screen = Screen::default();
    let mut notices_open = true;

    loop {
        tokio::select! {
            changed = view_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = view_rx.borrow_and_update().clone();
                screen.render(&view);
            }
            notice = session.next_notice(), if notices_open => match notice {
                Some(notice) => println!("! {}", notice),
                None => notices_open = false,
            },
            line = lines.next_line() => match line? {
                Some(line) if line.trim() == "/quit" => break,
                Some(line) => {
                    session.keystroke();
                    session.send(&line);
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.close();
    Ok(())
}

/// Prints only what changed since the last snapshot.
#[derive(Default)]
struct Screen {
    /// Ids already on screen
    printed: HashSet<String>,
    state: Option<SessionState>,
    typing_label: Option<String>,
    loading_done: bool,
}

impl Screen {
    fn render(&mut self, view: &DiscussionView) {
        if self.state != Some(view.state) {
            self.state = Some(view.state);
            println!("-- {:?} ({})", view.state, view.complaint_id);
        }

        if !view.loading && !self.loading_done {
            self.loading_done = true;
            if view.messages.is_empty() {
                println!("-- No discussion yet");
            }
        }

        for message in self.unseen(&view.messages) {
            println!("{}", line_for(message, view.me.as_deref()));
        }

        if self.typing_label != view.typing_label {
            if let Some(label) = &view.typing_label {
                println!("   {}", label);
            }
            self.typing_label = view.typing_label.clone();
        }
    }

    /// Messages not printed yet, in list order. A snapshot may merge a
    /// rollback with a new append, so the list length alone says nothing.
    fn unseen<'a>(&mut self, messages: &'a [Message]) -> Vec<&'a Message> {
        messages
            .iter()
            .filter(|message| self.printed.insert(message.id.clone()))
            .collect()
    }
}

fn line_for(message: &Message, me: Option<&str>) -> String {
    let time = message.created_at.with_timezone(&Local).format("%H:%M");
    let status = if message.is_confirmed() { "" } else { " (sending)" };
    match message.tint(me) {
        Tint::Mine => format!("{:>40} [{}]{}", message.body, time, status),
        Tint::Admin => format!("[{}] {} (admin): {}", time, message.author.display_name, message.body),
        Tint::Other => format!("[{}] {}: {}", time, message.author.display_name, message.body),
    }
}
