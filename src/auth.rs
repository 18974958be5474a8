//! Signed-in user and what they may do
//!
//! The [`AuthContext`] is built once per command and passed explicitly to
//! whatever needs it; nothing reads it from global state.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::api::{ApiClient, Envelope, FetchError};
use crate::records::de_id;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Editor,
    #[default]
    #[serde(other)]
    Member,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permissions: u8 {
        const SUBMIT = 1 << 0;
        const EDIT = 1 << 1;
        const APPROVE = 1 << 2;
        const DELETE = 1 << 3;
    }
}

impl Role {
    pub fn permissions(&self) -> Permissions {
        match self {
            Self::Admin => Permissions::all(),
            Self::Editor => Permissions::SUBMIT | Permissions::EDIT | Permissions::APPROVE,
            Self::Member => Permissions::SUBMIT,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurrentUser {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Role,
}

/// Who is acting, read-only for the lifetime of a command.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub user: Option<CurrentUser>,
    pub token: Option<String>,
}

impl AuthContext {
    #[cfg(test)]
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn new(user: CurrentUser, token: String) -> Self {
        Self {
            user: Some(user),
            token: Some(token),
        }
    }

    /// Resolve the user behind `token` (`GET auth/me`).
    pub async fn resolve(api: &ApiClient, token: String) -> Result<Self, FetchError> {
        let me: Envelope<CurrentUser> = api.get_json(&["auth", "me"], &[]).await?;
        tracing::debug!("Signed in as user {} ({:?})", me.data.id, me.data.role);
        Ok(Self::new(me.data, token))
    }

    pub fn is_signed_in(&self) -> bool {
        self.user.is_some() && self.token.is_some()
    }

    pub fn permissions(&self) -> Permissions {
        match &self.user {
            Some(user) if self.token.is_some() => user.role.permissions(),
            _ => Permissions::empty(),
        }
    }

    pub fn can(&self, required: Permissions) -> bool {
        self.permissions().contains(required)
    }

    pub fn user_name(&self) -> Option<&str> {
        self.user.as_ref()?.name.as_deref()
    }

    pub fn user_email(&self) -> Option<&str> {
        self.user.as_ref()?.email.as_deref()
    }
}
