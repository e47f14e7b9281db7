use tracing::info;

use crate::models::UserProfile;

/// The conversation currently open, with the profile snapshot it was opened with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedConversation {
    pub counterpart_id: String,
    pub profile: Option<UserProfile>,
}

/// Epochs captured by an async operation before it awaits.
///
/// A completion whose ticket no longer matches the session is stale and
/// must be dropped instead of merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    identity: u64,
    thread: u64,
}

/// Identity and selection state of the messaging client.
#[derive(Debug, Default)]
pub struct Session {
    current_user_id: Option<String>,
    selection: Option<SelectedConversation>,
    identity_epoch: u64,
    thread_epoch: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_user_id(&self) -> Option<&str> {
        self.current_user_id.as_deref()
    }

    pub fn selection(&self) -> Option<&SelectedConversation> {
        self.selection.as_ref()
    }

    /// Sets the identity. Returns false if that user was already current.
    ///
    /// Switching users behaves like a logout followed by a login: selection
    /// is cleared and every outstanding ticket becomes stale.
    pub fn login(&mut self, user_id: impl Into<String>) -> bool {
        let user_id = user_id.into();
        if self.current_user_id.as_deref() == Some(user_id.as_str()) {
            return false;
        }
        info!(%user_id, "identity set");
        self.current_user_id = Some(user_id);
        self.bump_identity();
        true
    }

    /// Clears the identity. Returns false if nobody was logged in.
    pub fn logout(&mut self) -> bool {
        if self.current_user_id.take().is_none() {
            return false;
        }
        info!("identity cleared");
        self.bump_identity();
        true
    }

    /// Opens a conversation; tickets for the previous thread become stale.
    pub fn select(&mut self, counterpart_id: impl Into<String>, profile: Option<UserProfile>) -> Ticket {
        let counterpart_id = counterpart_id.into();
        info!(%counterpart_id, "conversation selected");
        self.selection = Some(SelectedConversation { counterpart_id, profile });
        self.thread_epoch += 1;
        self.ticket()
    }

    pub fn clear_selection(&mut self) {
        if self.selection.take().is_some() {
            self.thread_epoch += 1;
        }
    }

    pub fn ticket(&self) -> Ticket {
        Ticket { identity: self.identity_epoch, thread: self.thread_epoch }
    }

    /// True while neither the identity nor the open thread changed.
    pub fn is_current_thread(&self, ticket: &Ticket) -> bool {
        *ticket == self.ticket()
    }

    /// True while the identity did not change.
    pub fn is_current_identity(&self, ticket: &Ticket) -> bool {
        ticket.identity == self.identity_epoch
    }

    fn bump_identity(&mut self) {
        self.identity_epoch += 1;
        self.thread_epoch += 1;
        self.selection = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selecting_invalidates_previous_thread_ticket() {
        let mut session = Session::new();
        session.login("me");
        let first = session.select("x", None);
        assert!(session.is_current_thread(&first));

        let second = session.select("y", None);
        assert!(!session.is_current_thread(&first));
        assert!(session.is_current_identity(&first));
        assert!(session.is_current_thread(&second));
    }

    #[test]
    fn logout_clears_selection_and_invalidates_everything() {
        let mut session = Session::new();
        session.login("me");
        let ticket = session.select("x", Some(UserProfile::new("x")));

        assert!(session.logout());

        assert_eq!(session.current_user_id(), None);
        assert_eq!(session.selection(), None);
        assert!(!session.is_current_identity(&ticket));
        assert!(!session.logout());
    }

    #[test]
    fn relogin_as_same_user_is_a_noop() {
        let mut session = Session::new();
        assert!(session.login("me"));
        let ticket = session.select("x", None);
        assert!(!session.login("me"));
        assert!(session.is_current_thread(&ticket));
        assert!(session.login("other"));
        assert!(!session.is_current_thread(&ticket));
        assert_eq!(session.selection(), None);
    }
}
