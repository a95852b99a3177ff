//! Contact lookup for notifications.

use std::collections::HashMap;
use std::sync::RwLock;

use bankledger_core::UserId;

/// Resolves the contact address a notification is sent to.
pub trait ContactDirectory: Send + Sync {
    fn email_for(&self, user: UserId) -> Option<String>;
}

/// Address book filled from authenticated requests (the token's `email` claim).
#[derive(Debug, Default)]
pub struct InMemoryContactDirectory {
    emails: RwLock<HashMap<UserId, String>>,
}

impl InMemoryContactDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember (or replace) the address of `user`.
    pub fn register(&self, user: UserId, email: impl Into<String>) {
        if let Ok(mut emails) = self.emails.write() {
            emails.insert(user, email.into());
        }
    }
}

impl ContactDirectory for InMemoryContactDirectory {
    fn email_for(&self, user: UserId) -> Option<String> {
        self.emails.read().ok()?.get(&user).cloned()
    }
}
