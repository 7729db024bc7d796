use std::future::pending;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use society_types::api::HistoryResponse;
use society_types::events::{ChannelCommand, ChannelEvent};
use society_types::models::{Author, ComplaintId, Message};

use crate::config::ChatConfig;
use crate::error::ChatError;
use crate::history::HistorySource;
use crate::notice::Notice;
use crate::reducer::MessageStream;
use crate::transport::{Connection, Connector, TokenProvider};
use crate::typing::{LocalTyping, TypingParticipant, TypingTracker};

/// Name shown on our own optimistic messages.
const OWN_DISPLAY_NAME: &str = "You";

/// Lifecycle of a discussion session.
///
/// `Idle → Connecting → Joined → (Disconnected → Connecting)* → Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Joined,
    Disconnected,
    Closed,
}

/// Everything a discussion pane renders.
#[derive(Debug, Clone)]
pub struct DiscussionView {
    pub complaint_id: ComplaintId,
    pub state: SessionState,
    /// True until the history fetch settles
    pub loading: bool,
    /// Our own user id, once the server has told us
    pub me: Option<String>,
    pub messages: Vec<Message>,
    pub typing: Vec<TypingParticipant>,
    pub typing_label: Option<String>,
}

impl DiscussionView {
    fn new(complaint_id: ComplaintId) -> Self {
        Self {
            complaint_id,
            state: SessionState::Idle,
            loading: true,
            me: None,
            messages: Vec::new(),
            typing: Vec::new(),
            typing_label: None,
        }
    }
}

enum Control {
    Send { body: String },
    Keystroke,
}

/// One live discussion for one complaint.
///
/// Owns a background driver task holding the connection, the message list
/// and the typing state. The view is observed through a `watch` channel;
/// notices arrive on their own queue. Dropping the session closes it.
pub struct ChannelSession {
    complaint_id: ComplaintId,
    control: mpsc::UnboundedSender<Control>,
    view_tx: Arc<watch::Sender<DiscussionView>>,
    view_rx: watch::Receiver<DiscussionView>,
    notices: mpsc::UnboundedReceiver<Notice>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ChannelSession {
    /// Open a session for `complaint_id`. Must be called inside a tokio runtime.
    pub fn open<T, C, H>(
        complaint_id: &str,
        tokens: T,
        connector: C,
        history: H,
        config: ChatConfig,
    ) -> Result<Self, ChatError>
    where
        T: TokenProvider,
        C: Connector,
        H: HistorySource,
    {
        let complaint_id = ComplaintId::new(complaint_id).ok_or(ChatError::EmptyComplaintId)?;

        let (view_tx, view_rx) = watch::channel(DiscussionView::new(complaint_id.clone()));
        let view_tx = Arc::new(view_tx);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let driver = Driver {
            complaint_id: complaint_id.clone(),
            tokens: Arc::new(tokens),
            connector: Arc::new(connector),
            history: Arc::new(history),
            stream: MessageStream::new(),
            tracker: TypingTracker::new(config.remote_typing_expiry),
            local: LocalTyping::new(config.typing_idle),
            config,
            me: None,
            state: SessionState::Idle,
            loading: true,
            history_requested: false,
            view: view_tx.clone(),
            notices: notice_tx,
            control: control_rx,
            cancel: cancel.clone(),
        };

        info!("Opening discussion for complaint {}", complaint_id);
        let task = tokio::spawn(driver.run());

        Ok(Self {
            complaint_id,
            control: control_tx,
            view_tx,
            view_rx,
            notices: notice_rx,
            cancel,
            task: Some(task),
        })
    }

    pub fn complaint_id(&self) -> &ComplaintId {
        &self.complaint_id
    }

    /// Post a message. Returns `false` when the body is blank or the session
    /// is closed. A message that cannot be delivered is rolled back and
    /// reported as [`Notice::SendFailed`], including after the session gave
    /// up reconnecting.
    pub fn send(&self, body: &str) -> bool {
        if body.trim().is_empty() || self.cancel.is_cancelled() {
            return false;
        }
        let queued = self
            .control
            .send(Control::Send {
                body: body.to_string(),
            })
            .is_ok();
        queued && !self.is_closed()
    }

    /// Report a keystroke in the composer.
    pub fn keystroke(&self) {
        if !self.cancel.is_cancelled() {
            let _ = self.control.send(Control::Keystroke);
        }
    }

    pub fn view(&self) -> DiscussionView {
        self.view_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DiscussionView> {
        self.view_rx.clone()
    }

    /// Next user-facing notice. `None` once the session has shut down and
    /// every notice was read.
    pub async fn next_notice(&mut self) -> Option<Notice> {
        self.notices.recv().await
    }

    pub fn try_notice(&mut self) -> Option<Notice> {
        self.notices.try_recv().ok()
    }

    /// True after `close()` or once the reconnect budget is spent.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.view_rx.borrow().state == SessionState::Closed
    }

    /// Tear the session down: pending typing timer, history fetch,
    /// reconnect backoff and the connection itself. Idempotent.
    pub fn close(&mut self) {
        self.cancel.cancel();
        let Some(task) = self.task.take() else {
            return;
        };
        task.abort();
        self.view_tx.send_modify(|view| {
            view.state = SessionState::Closed;
            view.loading = false;
            view.typing.clear();
            view.typing_label = None;
        });
        info!("Closed discussion for complaint {}", self.complaint_id);
    }
}

impl Drop for ChannelSession {
    fn drop(&mut self) {
        self.close();
    }
}

type HistoryResult = (ComplaintId, Result<HistoryResponse, ChatError>);

struct Driver<T, C, H> {
    complaint_id: ComplaintId,
    tokens: Arc<T>,
    connector: Arc<C>,
    history: Arc<H>,
    config: ChatConfig,
    stream: MessageStream,
    tracker: TypingTracker,
    local: LocalTyping,
    me: Option<String>,
    state: SessionState,
    loading: bool,
    history_requested: bool,
    view: Arc<watch::Sender<DiscussionView>>,
    notices: mpsc::UnboundedSender<Notice>,
    control: mpsc::UnboundedReceiver<Control>,
    cancel: CancellationToken,
}

impl<T, C, H> Driver<T, C, H>
where
    T: TokenProvider,
    C: Connector,
    H: HistorySource,
{
    async fn run(mut self) {
        let mut connecting = Some(self.start_connect());
        let mut connection: Option<Connection> = None;
        let mut history: Option<BoxFuture<'static, HistoryResult>> = None;
        let mut retry_at: Option<Instant> = None;
        // Consecutive failed attempts since the last successful join
        let mut attempts: u32 = 0;

        self.set_state(SessionState::Connecting);

        loop {
            let typing_deadline = self.local.deadline();
            let expiry_deadline = self.tracker.next_expiry();

            tokio::select! {
                _ = self.cancel.cancelled() => break,

                ctrl = self.control.recv() => match ctrl {
                    Some(Control::Send { body }) => self.send_message(&body, connection.as_ref()),
                    Some(Control::Keystroke) => self.keystroke(connection.as_ref()),
                    None => break,
                },

                result = wait_opt(&mut connecting) => {
                    connecting = None;
                    match result {
                        Ok(conn) => {
                            if self.join(&conn) {
                                attempts = 0;
                                connection = Some(conn);
                                if !self.history_requested {
                                    self.history_requested = true;
                                    history = Some(self.start_history());
                                }
                            } else {
                                warn!("Connection for {} closed before join", self.complaint_id);
                                match self.schedule_retry(&mut attempts) {
                                    Some(at) => retry_at = Some(at),
                                    None => self.exhausted(&ChatError::Closed),
                                }
                            }
                        }
                        Err(e) => {
                            warn!("Connecting to {} failed: {}", self.complaint_id, e);
                            match self.schedule_retry(&mut attempts) {
                                Some(at) => retry_at = Some(at),
                                None => self.exhausted(&e),
                            }
                        }
                    }
                }

                event = recv_opt(&mut connection) => {
                    let outcome = match event {
                        Some(ChannelEvent::ConnectionError { reason }) => {
                            warn!("Gateway reported an error for {}: {}", self.complaint_id, reason);
                            Err(ChatError::Api { status: 0, message: Some(reason) })
                        }
                        Some(event) => {
                            self.handle_event(event);
                            Ok(())
                        }
                        None => {
                            info!("Connection for {} dropped", self.complaint_id);
                            Err(ChatError::Closed)
                        }
                    };

                    if let Err(e) = outcome {
                        connection = None;
                        self.lost_connection();
                        match self.schedule_retry(&mut attempts) {
                            Some(at) => retry_at = Some(at),
                            None => self.exhausted(&e),
                        }
                    }
                }

                (complaint_id, result) = wait_opt(&mut history) => {
                    history = None;
                    self.apply_history(complaint_id, result);
                }

                _ = sleep_opt(typing_deadline) => {
                    if self.local.on_tick(Instant::now()) {
                        let cmd = ChannelCommand::TypingStop {
                            complaint_id: self.complaint_id.clone(),
                        };
                        self.emit(connection.as_ref(), cmd);
                    }
                }

                _ = sleep_opt(expiry_deadline) => {
                    if self.tracker.expire(Instant::now()) {
                        self.publish();
                    }
                }

                _ = sleep_opt(retry_at) => {
                    retry_at = None;
                    debug!("Reconnecting to {} (attempt {})", self.complaint_id, attempts);
                    connecting = Some(self.start_connect());
                    self.set_state(SessionState::Connecting);
                }
            }
        }
    }

    fn start_connect(&self) -> BoxFuture<'static, Result<Connection, ChatError>> {
        let connector = Arc::clone(&self.connector);
        let token = self.tokens.current_token();
        async move { connector.connect(token).await }.boxed()
    }

    fn start_history(&self) -> BoxFuture<'static, HistoryResult> {
        let history = Arc::clone(&self.history);
        let token = self.tokens.current_token();
        let complaint_id = self.complaint_id.clone();
        async move {
            let result = history.fetch(&complaint_id, token).await;
            (complaint_id, result)
        }
        .boxed()
    }

    /// Issue join-room on a fresh connection. Returns `false` if it is already gone.
    fn join(&mut self, conn: &Connection) -> bool {
        let cmd = ChannelCommand::JoinRoom {
            complaint_id: self.complaint_id.clone(),
        };
        if self.cancel.is_cancelled() || conn.outbound.send(cmd).is_err() {
            return false;
        }
        info!("Joined discussion room {}", self.complaint_id);
        self.set_state(SessionState::Joined);
        true
    }

    /// Next reconnect deadline, or `None` once the retry budget is spent.
    fn schedule_retry(&mut self, attempts: &mut u32) -> Option<Instant> {
        let next = *attempts + 1;
        if next > self.config.max_reconnect_attempts {
            return None;
        }
        *attempts = next;
        self.set_state(SessionState::Disconnected);
        Some(Instant::now() + self.config.reconnect_backoff(next))
    }

    /// Stop reconnecting. The driver stays up so later sends still roll back
    /// and raise `SendFailed` until the session is closed.
    fn exhausted(&mut self, last_error: &ChatError) {
        warn!(
            "Giving up on discussion {} after {} reconnect attempts",
            self.complaint_id, self.config.max_reconnect_attempts
        );
        self.notify(Notice::ConnectionFailed(last_error.user_message()));
        self.loading = false;
        self.tracker.clear();
        self.local.reset();
        self.set_state(SessionState::Closed);
    }

    fn lost_connection(&mut self) {
        // Nobody can tell us when remote typers stop while we are away
        self.tracker.clear();
        self.local.reset();
        self.set_state(SessionState::Disconnected);
    }

    fn handle_event(&mut self, event: ChannelEvent) {
        if let Some(complaint_id) = event.complaint_id() {
            if complaint_id != &self.complaint_id {
                debug!("Ignoring event for room {} in {}", complaint_id, self.complaint_id);
                return;
            }
        }

        let changed = match event {
            ChannelEvent::Ready { user_id, display_name } => {
                debug!("Gateway identified us as {} ({})", display_name, user_id);
                self.set_me(user_id);
                true
            }
            ChannelEvent::NewMessage { message, .. } => self.stream.reconcile_inbound(message),
            ChannelEvent::TypingStart {
                user_id,
                display_name,
                ..
            } => self
                .tracker
                .on_remote_start(&user_id, display_name.as_deref(), Instant::now()),
            ChannelEvent::TypingStop { user_id, .. } => self.tracker.on_remote_stop(&user_id),
            ChannelEvent::ParticipantLeft { user_id, .. } => self.tracker.on_remote_stop(&user_id),
            ChannelEvent::ConnectionError { .. } => false,
        };

        if changed {
            self.publish();
        }
    }

    fn apply_history(&mut self, complaint_id: ComplaintId, result: Result<HistoryResponse, ChatError>) {
        if complaint_id != self.complaint_id || self.cancel.is_cancelled() {
            debug!("Discarding history for inactive room {}", complaint_id);
            return;
        }

        match result {
            Ok(page) => {
                debug!("Loaded {} messages for {}", page.comments.len(), complaint_id);
                if let Some(me) = page.me {
                    self.set_me(me);
                }
                self.stream.rebase_on_history(page.comments);
            }
            Err(e) => {
                warn!("Loading history for {} failed: {}", complaint_id, e);
                self.notify(Notice::HistoryLoadFailed(e.user_message()));
            }
        }
        self.loading = false;
        self.publish();
    }

    fn send_message(&mut self, body: &str, connection: Option<&Connection>) {
        let author = Author {
            id: self.me.clone().unwrap_or_default(),
            display_name: OWN_DISPLAY_NAME.into(),
            role: self.config.role,
        };
        let Some(temp_id) = self.stream.append_optimistic(body, author) else {
            return;
        };

        let cmd = ChannelCommand::SendMessage {
            complaint_id: self.complaint_id.clone(),
            body: body.to_string(),
        };
        let delivered = self.state == SessionState::Joined && self.emit(connection, cmd);
        if !delivered {
            warn!("Send on {} failed, rolling back {}", self.complaint_id, temp_id);
            self.stream.rollback(&temp_id);
            self.notify(Notice::SendFailed);
        }
        self.publish();
    }

    fn keystroke(&mut self, connection: Option<&Connection>) {
        if self.local.on_keystroke(Instant::now()) {
            let cmd = ChannelCommand::TypingStart {
                complaint_id: self.complaint_id.clone(),
                display_name: self.config.display_name.clone(),
            };
            self.emit(connection, cmd);
        }
    }

    /// Fire-and-forget. Returns whether the command reached an open connection.
    fn emit(&self, connection: Option<&Connection>, cmd: ChannelCommand) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        match connection {
            Some(conn) => conn.outbound.send(cmd).is_ok(),
            None => false,
        }
    }

    fn set_me(&mut self, user_id: String) {
        self.tracker.set_local_user(&user_id);
        self.me = Some(user_id);
    }

    fn notify(&self, notice: Notice) {
        if !self.cancel.is_cancelled() {
            let _ = self.notices.send(notice);
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!("Discussion {}: {:?} -> {:?}", self.complaint_id, self.state, state);
            self.state = state;
            self.publish();
        }
    }

    fn publish(&self) {
        let cancel = &self.cancel;
        self.view.send_if_modified(|view| {
            // close() owns the final snapshot
            if cancel.is_cancelled() {
                return false;
            }
            view.state = self.state;
            view.loading = self.loading;
            view.me = self.me.clone();
            view.messages = self.stream.messages().to_vec();
            view.typing = self.tracker.participants().to_vec();
            view.typing_label = self.tracker.label();
            true
        });
    }
}

async fn wait_opt<F: std::future::Future + Unpin>(slot: &mut Option<F>) -> F::Output {
    match slot {
        Some(fut) => fut.await,
        None => pending().await,
    }
}

async fn recv_opt(connection: &mut Option<Connection>) -> Option<ChannelEvent> {
    match connection {
        Some(conn) => conn.inbound.recv().await,
        None => pending().await,
    }
}

async fn sleep_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
