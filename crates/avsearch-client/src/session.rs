//! Signed-in user sessions.
//!
//! Authentication itself happens elsewhere; the clients in this crate only
//! need the current identity token to attach to requests.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::Result;

/// The signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Supplies the identity of the current user.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// The signed-in user, if any.
    async fn current_user(&self) -> Result<Option<UserInfo>>;

    /// Bearer token for API calls, if signed in.
    async fn id_token(&self) -> Result<Option<String>>;

    /// Discard the session. Later calls behave as signed out.
    async fn sign_out(&self) -> Result<()>;
}

/// A session backed by a fixed token.
pub struct StaticSession {
    inner: RwLock<Option<(UserInfo, String)>>,
}

impl StaticSession {
    pub fn new(user: UserInfo, token: impl Into<String>) -> Self {
        Self {
            inner: RwLock::new(Some((user, token.into()))),
        }
    }

    /// A session from a token alone. The username is a placeholder.
    pub fn from_token(token: impl Into<String>) -> Self {
        Self::new(
            UserInfo {
                username: "token".to_string(),
                email: None,
            },
            token,
        )
    }
}

#[async_trait]
impl SessionProvider for StaticSession {
    async fn current_user(&self) -> Result<Option<UserInfo>> {
        Ok(self.inner.read().as_ref().map(|(user, _)| user.clone()))
    }

    async fn id_token(&self) -> Result<Option<String>> {
        Ok(self.inner.read().as_ref().map(|(_, token)| token.clone()))
    }

    async fn sign_out(&self) -> Result<()> {
        *self.inner.write() = None;
        Ok(())
    }
}

/// No user. Requests go out without credentials.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnonymousSession;

#[async_trait]
impl SessionProvider for AnonymousSession {
    async fn current_user(&self) -> Result<Option<UserInfo>> {
        Ok(None)
    }

    async fn id_token(&self) -> Result<Option<String>> {
        Ok(None)
    }

    async fn sign_out(&self) -> Result<()> {
        Ok(())
    }
}
