//! Connection Close Handling
//!
//! The only writer of the credential store:
//! - Remote logout: clear stored credentials (best effort)
//! - Any other close: save the connection's current credentials
//!
//! Until a save replaces it, the previous file stays valid, so a crash loses
//! at most the credential changes made since the last close.

use super::auth_state::AuthState;
use super::dispatch::{EventHandler, HandlerError};
use super::store::{CredentialStore, StoreError};
use super::traits::{CloseReason, Connection, Event, EventKind};
use async_trait::async_trait;
use tracing::{info, warn};

/// What the close handler did with the stored credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// Credentials removed after a remote logout
    Cleared,
    /// Removal failed; an unpaired state was written in its place
    Invalidated,
    /// Neither removal nor invalidation succeeded
    ClearFailed,
    /// Current credentials persisted
    Saved,
}

/// Finalizes credential storage when a connection terminates
pub struct CloseHandler {
    store: CredentialStore,
}

impl CloseHandler {
    pub fn new(store: CredentialStore) -> Self {
        Self { store }
    }

    /// Persist or clear credentials for a close with `reason`
    ///
    /// Clearing after a logout never fails the handler. If the file cannot be
    /// removed it is overwritten with an unpaired state so the next start
    /// still takes the pairing path.
    pub fn finalize(
        &self,
        auth_state: &AuthState,
        reason: &CloseReason,
    ) -> Result<CloseAction, StoreError> {
        if reason.logged_out {
            info!(path = %self.store.path().display(), "logged out remotely, clearing credentials");
            return Ok(match self.store.clear() {
                Ok(()) => CloseAction::Cleared,
                Err(e) => self.invalidate(e),
            });
        }

        info!(
            reason = reason.description.as_deref().unwrap_or("unspecified"),
            path = %self.store.path().display(),
            "connection closed, saving credentials"
        );
        self.store.save(auth_state)?;
        Ok(CloseAction::Saved)
    }

    /// Overwrite logged-out credentials that could not be removed
    fn invalidate(&self, clear_error: StoreError) -> CloseAction {
        warn!("Failed to remove logged-out credentials: {}", clear_error);
        match self.store.save(&AuthState::new()) {
            Ok(()) => CloseAction::Invalidated,
            Err(e) => {
                warn!("Failed to invalidate logged-out credentials: {}", e);
                CloseAction::ClearFailed
            }
        }
    }
}

#[async_trait]
impl<C: Connection> EventHandler<C> for CloseHandler {
    async fn handle(&mut self, connection: &C, event: Event) -> Result<(), HandlerError> {
        match event {
            Event::Close(reason) => {
                self.finalize(&connection.auth_state(), &reason)?;
                Ok(())
            }
            other => Err(HandlerError::UnexpectedEvent {
                expected: EventKind::Close,
                received: other.kind(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn paired_state() -> AuthState {
        AuthState::from_json(json!({
            "me": { "jid": "15550001111:7@s.whatsapp.net" },
            "signedIdentityKey": { "public": "AAEC" }
        }))
        .unwrap()
    }

    #[test]
    fn test_logout_clears_and_does_not_save() {
        let temp_dir = TempDir::new().unwrap();
        let store = CredentialStore::new(temp_dir.path().join("session.json"));
        store.save(&paired_state()).unwrap();
        let handler = CloseHandler::new(store.clone());

        // A logout must not persist the state held by the connection
        let action = handler
            .finalize(&paired_state(), &CloseReason::logged_out())
            .unwrap();

        assert_eq!(action, CloseAction::Cleared);
        assert!(!store.path().exists());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_logout_without_stored_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = CredentialStore::new(temp_dir.path().join("session.json"));
        let handler = CloseHandler::new(store);

        let action = handler
            .finalize(&AuthState::new(), &CloseReason::logged_out())
            .unwrap();
        assert_eq!(action, CloseAction::Cleared);
    }

    #[test]
    fn test_failed_removal_is_not_fatal() {
        let temp_dir = TempDir::new().unwrap();
        // A non-empty directory cannot be removed with remove_file
        let path = temp_dir.path().join("session.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), b"x").unwrap();
        let handler = CloseHandler::new(CredentialStore::new(&path));

        let action = handler
            .finalize(&paired_state(), &CloseReason::logged_out())
            .unwrap();
        assert_eq!(action, CloseAction::ClearFailed);
    }

    #[test]
    fn test_unremovable_credentials_are_invalidated() {
        let temp_dir = TempDir::new().unwrap();
        let store = CredentialStore::new(temp_dir.path().join("session.json"));
        store.save(&paired_state()).unwrap();
        let handler = CloseHandler::new(store.clone());

        let clear_error = StoreError::Io {
            path: store.path().to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "busy"),
        };
        let action = handler.invalidate(clear_error);

        assert_eq!(action, CloseAction::Invalidated);
        // The next start sees an unpaired state and pairs again
        let reloaded = store.load().unwrap().unwrap();
        assert!(reloaded.is_empty());
        assert!(!reloaded.is_identified());
    }

    #[test]
    fn test_non_logout_close_saves_current_state() {
        let temp_dir = TempDir::new().unwrap();
        let store = CredentialStore::new(temp_dir.path().join("session.json"));
        let handler = CloseHandler::new(store.clone());

        let action = handler
            .finalize(&paired_state(), &CloseReason::disconnected("stream ended"))
            .unwrap();

        assert_eq!(action, CloseAction::Saved);
        assert_eq!(store.load().unwrap().unwrap(), paired_state());
    }

    #[test]
    fn test_save_failure_propagates() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        let handler = CloseHandler::new(CredentialStore::new(blocker.join("session.json")));

        let result = handler.finalize(&paired_state(), &CloseReason::default());
        assert!(result.is_err());
    }
}
