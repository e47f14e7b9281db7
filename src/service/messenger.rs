use std::ops::ControlFlow;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::conversation::{aggregate_conversations, ConversationThread, ThreadPhase};
use crate::errors::MessagingError;
use crate::models::{CorrelationId, Message, MessageId, NewMessage, UserProfile};
use crate::service::poller::PollHandle;
use crate::service::views::{ConversationListView, ThreadView};
use crate::session::{SelectedConversation, Session, Ticket};
use crate::store::MessageStore;

const LOAD_CONVERSATIONS_FAILED: &str = "Failed to load conversations";
const LOAD_MESSAGES_FAILED: &str = "Failed to load messages. Please try again later.";
const SEND_FAILED: &str = "Failed to send message. Please try again.";
const UPDATE_FAILED: &str = "Failed to update message.";
const DELETE_FAILED: &str = "Failed to delete message.";

#[derive(Default)]
struct State {
    session: Session,
    thread: ConversationThread,
    list: ConversationListView,
    thread_error: Option<String>,
    retry_text: Option<String>,
    new_message_count: usize,
    list_poller: Option<PollHandle>,
    thread_poller: Option<PollHandle>,
}

impl State {
    fn reset_thread(&mut self) {
        self.thread_poller = None;
        self.thread.reset();
        self.thread_error = None;
        self.retry_text = None;
        self.new_message_count = 0;
    }

    fn thread_view(&self) -> ThreadView {
        ThreadView {
            current_user_id: self.session.current_user_id().map(str::to_string),
            selection: self.session.selection().cloned(),
            phase: self.thread.phase(),
            messages: self.thread.messages().to_vec(),
            new_message_count: self.new_message_count,
            error: self.thread_error.clone(),
            retry_text: self.retry_text.clone(),
        }
    }

    /// Current user and open counterpart, or why there is none.
    fn open_thread(&self) -> Result<(String, String), MessagingError> {
        let user_id = self
            .session
            .current_user_id()
            .ok_or(MessagingError::IdentityMissing)?;
        let selection = self
            .session
            .selection()
            .ok_or(MessagingError::NoConversationSelected)?;
        Ok((user_id.to_string(), selection.counterpart_id.clone()))
    }
}

struct Shared<S> {
    store: S,
    config: ClientConfig,
    state: Mutex<State>,
    conversations_tx: watch::Sender<ConversationListView>,
    thread_tx: watch::Sender<ThreadView>,
}

impl<S> Shared<S> {
    fn publish_conversations(&self, state: &State) {
        let view = state.list.clone();
        self.conversations_tx.send_if_modified(|current| {
            if *current == view {
                return false;
            }
            *current = view;
            true
        });
    }

    fn publish_thread(&self, state: &State) {
        let view = state.thread_view();
        self.thread_tx.send_if_modified(|current| {
            if *current == view {
                return false;
            }
            *current = view;
            true
        });
    }
}

/// Messaging client: conversation list, open thread, optimistic sends and
/// the pollers that keep them fresh. Cheap to clone; clones share state.
///
/// Views are published through `watch` channels and only re-sent when they
/// actually change.
pub struct Messenger<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for Messenger<S> {
    fn clone(&self) -> Self {
        Self { shared: self.shared.clone() }
    }
}

impl<S: MessageStore> Messenger<S> {
    pub fn new(store: S, config: ClientConfig) -> Self {
        let state = State { list: ConversationListView::without_identity(), ..State::default() };
        let (conversations_tx, _) = watch::channel(state.list.clone());
        let (thread_tx, _) = watch::channel(state.thread_view());
        Self {
            shared: Arc::new(Shared {
                store,
                config,
                state: Mutex::new(state),
                conversations_tx,
                thread_tx,
            }),
        }
    }

    fn from_weak(weak: &Weak<Shared<S>>) -> Option<Self> {
        weak.upgrade().map(|shared| Self { shared })
    }

    pub fn store(&self) -> &S {
        &self.shared.store
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    // ── Identity & selection ──────────────────────────────────────────────────

    pub fn current_user_id(&self) -> Option<String> {
        self.shared.state.lock().session.current_user_id().map(str::to_string)
    }

    pub fn selection(&self) -> Option<SelectedConversation> {
        self.shared.state.lock().session.selection().cloned()
    }

    /// Sets the logged-in user. Switching to another user drops every
    /// view, poller and in-flight result of the previous one. A list poller
    /// started before anyone logged in is restarted for the new user.
    pub fn login(&self, user_id: impl Into<String>) {
        let restart_list_polling = {
            let mut state = self.shared.state.lock();
            let first_identity = state.session.current_user_id().is_none();
            if !state.session.login(user_id) {
                return;
            }
            let waiting_poller = state.list_poller.take().is_some();
            state.reset_thread();
            state.list = ConversationListView::default();
            self.shared.publish_conversations(&state);
            self.shared.publish_thread(&state);
            first_identity && waiting_poller
        };
        if restart_list_polling {
            self.start_conversation_polling();
        }
    }

    /// Clears the identity together with all conversation and thread state.
    pub fn logout(&self) {
        let mut state = self.shared.state.lock();
        if !state.session.logout() {
            return;
        }
        state.list_poller = None;
        state.reset_thread();
        state.list = ConversationListView::without_identity();
        self.shared.publish_conversations(&state);
        self.shared.publish_thread(&state);
    }

    /// Makes `counterpart_id` the open conversation and resets the thread to
    /// `Loading`. Results still in flight for the previous thread are dropped.
    pub fn select_conversation(
        &self,
        counterpart_id: impl Into<String>,
        profile: Option<UserProfile>,
    ) -> Result<(), MessagingError> {
        let mut state = self.shared.state.lock();
        if state.session.current_user_id().is_none() {
            return Err(MessagingError::IdentityMissing);
        }
        state.reset_thread();
        state.session.select(counterpart_id, profile);
        self.shared.publish_thread(&state);
        Ok(())
    }

    /// Selects the conversation and starts loading and polling it.
    pub fn open_conversation(
        &self,
        counterpart_id: impl Into<String>,
        profile: Option<UserProfile>,
    ) -> Result<(), MessagingError> {
        self.select_conversation(counterpart_id, profile)?;
        self.start_thread_polling();
        Ok(())
    }

    /// Stops the thread poller and forgets the open conversation.
    pub fn close_conversation(&self) {
        let mut state = self.shared.state.lock();
        state.reset_thread();
        state.session.clear_selection();
        self.shared.publish_thread(&state);
    }

    pub fn dismiss_error(&self) {
        let mut state = self.shared.state.lock();
        state.list.error = None;
        state.thread_error = None;
        state.retry_text = None;
        self.shared.publish_conversations(&state);
        self.shared.publish_thread(&state);
    }

    /// Resets the "new messages" counter once the user has seen them.
    pub fn mark_seen(&self) {
        let mut state = self.shared.state.lock();
        state.new_message_count = 0;
        self.shared.publish_thread(&state);
    }

    // ── Views ─────────────────────────────────────────────────────────────────

    pub fn subscribe_conversations(&self) -> watch::Receiver<ConversationListView> {
        self.shared.conversations_tx.subscribe()
    }

    pub fn subscribe_thread(&self) -> watch::Receiver<ThreadView> {
        self.shared.thread_tx.subscribe()
    }

    pub fn conversations(&self) -> ConversationListView {
        self.shared.conversations_tx.borrow().clone()
    }

    pub fn thread(&self) -> ThreadView {
        self.shared.thread_tx.borrow().clone()
    }

    // ── Conversation list ─────────────────────────────────────────────────────

    /// Initial load of the conversation list. A failure is shown in the view.
    pub async fn load_conversations(&self) -> Result<(), MessagingError> {
        self.refresh_conversations(true).await
    }

    /// Background refresh of the conversation list. A failure is logged and
    /// the previous list stays on screen.
    pub async fn poll_conversations(&self) -> Result<(), MessagingError> {
        self.refresh_conversations(false).await
    }

    async fn refresh_conversations(&self, initial: bool) -> Result<(), MessagingError> {
        let (user_id, ticket) = {
            let mut state = self.shared.state.lock();
            let Some(user_id) = state.session.current_user_id().map(str::to_string) else {
                state.list = ConversationListView::without_identity();
                self.shared.publish_conversations(&state);
                return Err(MessagingError::IdentityMissing);
            };
            if initial {
                state.list.loading = true;
                self.shared.publish_conversations(&state);
            }
            (user_id, state.session.ticket())
        };

        let result = self.shared.store.list_for_user(&user_id).await;

        let mut state = self.shared.state.lock();
        if !state.session.is_current_identity(&ticket) {
            debug!(%user_id, "dropping conversation list of a previous identity");
            return Ok(());
        }
        match result {
            Ok(messages) => {
                state.list.conversations = aggregate_conversations(&user_id, &messages);
                state.list.loading = false;
                state.list.identity_missing = false;
                state.list.error = None;
                debug!(count = state.list.conversations.len(), "conversation list refreshed");
                self.shared.publish_conversations(&state);
                Ok(())
            }
            Err(e) if initial => {
                error!(%user_id, "Failed to load conversations: {e}");
                state.list.loading = false;
                state.list.error = Some(LOAD_CONVERSATIONS_FAILED.to_string());
                self.shared.publish_conversations(&state);
                Err(e)
            }
            Err(e) => {
                warn!(%user_id, "conversation poll failed: {e}");
                Err(e)
            }
        }
    }

    /// Loads the list now and refreshes it on the configured interval until
    /// `stop_conversation_polling`, logout or an identity switch.
    pub fn start_conversation_polling(&self) {
        let weak = Arc::downgrade(&self.shared);
        let mut initial = true;
        let handle = PollHandle::spawn(
            "conversations",
            self.shared.config.conversation_poll_interval,
            move || {
                let first = std::mem::replace(&mut initial, false);
                let weak = weak.clone();
                async move {
                    let Some(messenger) = Self::from_weak(&weak) else {
                        return ControlFlow::Break(());
                    };
                    // Errors already reached the view or the log.
                    let _ = messenger.refresh_conversations(first).await;
                    ControlFlow::Continue(())
                }
            },
        );
        self.shared.state.lock().list_poller = Some(handle);
    }

    pub fn stop_conversation_polling(&self) {
        self.shared.state.lock().list_poller = None;
    }

    pub fn is_polling_conversations(&self) -> bool {
        self.shared
            .state
            .lock()
            .list_poller
            .as_ref()
            .is_some_and(|poller| !poller.is_finished())
    }

    // ── Open thread ───────────────────────────────────────────────────────────

    /// Fetches the whole thread and replaces what is held. A failure is
    /// shown in the view and stops polling until the next load.
    pub async fn load_thread(&self) -> Result<(), MessagingError> {
        let (user_id, counterpart_id, ticket) = {
            let mut state = self.shared.state.lock();
            let (user_id, counterpart_id) = state.open_thread()?;
            state.thread.begin_load();
            state.thread_error = None;
            self.shared.publish_thread(&state);
            (user_id, counterpart_id, state.session.ticket())
        };

        let result = self
            .shared
            .store
            .list_conversation(&user_id, &counterpart_id)
            .await;

        let mut state = self.shared.state.lock();
        if !state.session.is_current_thread(&ticket) {
            debug!(%counterpart_id, "dropping thread load for a closed conversation");
            return Ok(());
        }
        match result {
            Ok(messages) => {
                state.thread.finish_load(messages);
                self.shared.publish_thread(&state);
                Ok(())
            }
            Err(e) => {
                error!(%counterpart_id, "Failed to load messages: {e}");
                state.thread.fail_load();
                state.thread_error = Some(LOAD_MESSAGES_FAILED.to_string());
                self.shared.publish_thread(&state);
                Err(e)
            }
        }
    }

    /// Fetches the thread in the background and merges anything new.
    /// Returns how many messages were added. Does nothing unless the thread
    /// is idle; a failure is logged and leaves the view alone.
    pub async fn poll_thread(&self) -> Result<usize, MessagingError> {
        let (user_id, counterpart_id, ticket) = {
            let mut state = self.shared.state.lock();
            let (user_id, counterpart_id) = state.open_thread()?;
            if !state.thread.begin_update() {
                return Ok(0);
            }
            (user_id, counterpart_id, state.session.ticket())
        };

        let result = self
            .shared
            .store
            .list_conversation(&user_id, &counterpart_id)
            .await;

        let mut state = self.shared.state.lock();
        if !state.session.is_current_thread(&ticket) {
            debug!(%counterpart_id, "dropping poll result for a closed conversation");
            return Ok(0);
        }
        match result {
            Ok(messages) => {
                let added = state.thread.merge_polled(messages);
                if added > 0 {
                    state.new_message_count = added;
                }
                self.shared.publish_thread(&state);
                Ok(added)
            }
            Err(e) => {
                state.thread.end_update();
                warn!(%counterpart_id, "thread poll failed: {e}");
                Err(e)
            }
        }
    }

    /// Loads or polls the open thread depending on where it is.
    async fn refresh_thread(&self) {
        let phase = self.shared.state.lock().thread.phase();
        // Errors already reached the view or the log.
        let _ = match phase {
            ThreadPhase::Loading => self.load_thread().await,
            ThreadPhase::Idle => self.poll_thread().await.map(|_| ()),
            ThreadPhase::Updating | ThreadPhase::Failed => Ok(()),
        };
    }

    /// Polls the open thread on the configured interval until it is closed
    /// or replaced. The first tick performs the initial load; without an
    /// open conversation the poller stops on its first tick.
    pub fn start_thread_polling(&self) {
        let weak = Arc::downgrade(&self.shared);
        let ticket = self.shared.state.lock().session.ticket();
        let handle = PollHandle::spawn(
            "thread",
            self.shared.config.thread_poll_interval,
            move || {
                let weak = weak.clone();
                async move {
                    let Some(messenger) = Self::from_weak(&weak) else {
                        return ControlFlow::Break(());
                    };
                    {
                        let state = messenger.shared.state.lock();
                        let stale = !state.session.is_current_thread(&ticket);
                        if stale || state.open_thread().is_err() {
                            return ControlFlow::Break(());
                        }
                    }
                    messenger.refresh_thread().await;
                    ControlFlow::Continue(())
                }
            },
        );
        self.shared.state.lock().thread_poller = Some(handle);
    }

    pub fn is_polling_thread(&self) -> bool {
        self.shared
            .state
            .lock()
            .thread_poller
            .as_ref()
            .is_some_and(|poller| !poller.is_finished())
    }

    // ── Sending ───────────────────────────────────────────────────────────────

    /// Sends `text` to the open conversation.
    ///
    /// A pending entry shows up at once and is replaced by the confirmed
    /// message, or removed if the backend rejects it. In the latter case the
    /// error carries the text for a retry.
    pub async fn send_message(&self, text: &str) -> Result<Message, MessagingError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MessagingError::EmptyField { field_name: "text".to_string() });
        }

        let correlation = CorrelationId::new();
        let (new_message, ticket) = {
            let mut state = self.shared.state.lock();
            let (user_id, counterpart_id) = state.open_thread()?;
            state
                .thread
                .push_pending(Message::pending(&correlation, &user_id, &counterpart_id, text));
            state.thread_error = None;
            state.retry_text = None;
            self.shared.publish_thread(&state);
            let new_message = NewMessage {
                sender_id: user_id,
                receiver_id: counterpart_id,
                text: text.to_string(),
            };
            (new_message, state.session.ticket())
        };
        debug!(%correlation, "optimistic send");

        let result = self.shared.store.send(&new_message).await;

        let mut state = self.shared.state.lock();
        let current = state.session.is_current_thread(&ticket);
        match result {
            Ok(confirmed) => {
                if current {
                    state.thread.confirm(&correlation, confirmed.clone());
                    self.shared.publish_thread(&state);
                } else {
                    debug!(%correlation, "confirmation for a closed conversation dropped");
                }
                info!(id = %confirmed.id, "message sent");
                Ok(confirmed)
            }
            Err(e) => {
                error!(%correlation, "Failed to send message: {e}");
                if current {
                    state.thread.fail(&correlation);
                    state.thread_error = Some(SEND_FAILED.to_string());
                    state.retry_text = Some(text.to_string());
                    self.shared.publish_thread(&state);
                }
                Err(MessagingError::SendFailed { text: text.to_string(), source: Box::new(e) })
            }
        }
    }

    /// Edits a confirmed message and reflects the result in the open thread.
    pub async fn edit_message(
        &self,
        message_id: &MessageId,
        text: &str,
    ) -> Result<Message, MessagingError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MessagingError::EmptyField { field_name: "text".to_string() });
        }
        let ticket = self.identity_ticket()?;

        let result = self.shared.store.update(message_id, text).await;

        let mut state = self.shared.state.lock();
        let current = state.session.is_current_thread(&ticket);
        match result {
            Ok(edited) => {
                if current && state.thread.apply_edit(edited.clone()) {
                    self.shared.publish_thread(&state);
                }
                Ok(edited)
            }
            Err(e) => {
                error!(%message_id, "Failed to update message: {e}");
                if current {
                    state.thread_error = Some(UPDATE_FAILED.to_string());
                    self.shared.publish_thread(&state);
                }
                Err(e)
            }
        }
    }

    /// Deletes a confirmed message and drops it from the open thread.
    pub async fn delete_message(&self, message_id: &MessageId) -> Result<(), MessagingError> {
        let ticket = self.identity_ticket()?;

        let result = self.shared.store.delete(message_id).await;

        let mut state = self.shared.state.lock();
        let current = state.session.is_current_thread(&ticket);
        match result {
            Ok(()) => {
                if current && state.thread.remove(message_id).is_some() {
                    self.shared.publish_thread(&state);
                }
                Ok(())
            }
            Err(e) => {
                error!(%message_id, "Failed to delete message: {e}");
                if current {
                    state.thread_error = Some(DELETE_FAILED.to_string());
                    self.shared.publish_thread(&state);
                }
                Err(e)
            }
        }
    }

    fn identity_ticket(&self) -> Result<Ticket, MessagingError> {
        let state = self.shared.state.lock();
        if state.session.current_user_id().is_none() {
            return Err(MessagingError::IdentityMissing);
        }
        Ok(state.session.ticket())
    }
}
