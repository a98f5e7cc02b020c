//! Who is syncing, and with which bearer token.
//!
//! Token acquisition belongs to the host application; the engine only asks
//! for the current credentials right before sending a batch.

use std::sync::RwLock;

use crinz_core::UserId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user_id: UserId,
    pub token: String,
}

impl Credentials {
    pub fn new(user_id: UserId, token: impl Into<String>) -> Self {
        Self {
            user_id,
            token: token.into(),
        }
    }
}

pub trait CredentialProvider: Send + Sync {
    /// Current credentials, or `None` when signed out or the token is gone.
    fn credentials(&self) -> Option<Credentials>;
}

/// Credentials updated by the host on sign-in and sign-out.
#[derive(Debug, Default)]
pub struct SessionCredentials {
    current: RwLock<Option<Credentials>>,
}

impl SessionCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(credentials: Credentials) -> Self {
        Self {
            current: RwLock::new(Some(credentials)),
        }
    }

    pub fn sign_in(&self, credentials: Credentials) {
        *self.current.write().unwrap_or_else(|p| p.into_inner()) = Some(credentials);
    }

    pub fn sign_out(&self) {
        *self.current.write().unwrap_or_else(|p| p.into_inner()) = None;
    }
}

impl CredentialProvider for SessionCredentials {
    fn credentials(&self) -> Option<Credentials> {
        let current = self.current.read().unwrap_or_else(|p| p.into_inner());
        current.as_ref().filter(|c| !c.token.trim().is_empty()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_tokens_count_as_signed_out() {
        let session = SessionCredentials::signed_in(Credentials::new(
            UserId::parse("U1").unwrap(),
            "  ",
        ));
        assert!(session.credentials().is_none());

        session.sign_in(Credentials::new(UserId::parse("U1").unwrap(), "t0k3n"));
        assert_eq!(session.credentials().unwrap().token, "t0k3n");

        session.sign_out();
        assert!(session.credentials().is_none());
    }
}
