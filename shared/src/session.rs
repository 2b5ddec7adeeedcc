//! Admin session gate.
//!
//! The session is a role tag persisted in key/value storage under
//! `session:admin_session`. It only hides or shows the write controls; the
//! remote table enforces its own row-level permissions.

use serde::{Deserialize, Serialize};

use crate::capabilities::kv::{KeyNamespace, KvError, TypedKvStore};

pub const SESSION_KEY: &str = "admin_session";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminSession {
    pub role: Role,
}

impl AdminSession {
    #[must_use]
    pub const fn admin() -> Self {
        Self { role: Role::Admin }
    }

    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }
}

/// Storage key and encoding of the persisted session.
pub struct SessionContext {
    store: TypedKvStore<AdminSession>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: TypedKvStore::new(KeyNamespace::Session),
        }
    }

    pub fn key(&self) -> Result<String, KvError> {
        self.store.key(SESSION_KEY)
    }

    pub fn encode(&self, session: &AdminSession) -> Result<Vec<u8>, KvError> {
        self.store.encode(session)
    }

    /// Interprets the stored value. A value that does not parse is treated
    /// as no session.
    #[must_use]
    pub fn restore(&self, stored: Option<Vec<u8>>) -> Option<AdminSession> {
        match self.store.decode(stored) {
            Ok(session) => session.filter(AdminSession::is_admin),
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable admin session");
                None
            }
        }
    }
}

/// Decides whether an id/secret pair grants the admin role.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, id: &str, secret: &str) -> bool;
}

/// Accepts exactly `admin` / `1234`. A placeholder gate with no security
/// value; replace it with a real verifier before shipping.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderVerifier;

impl PlaceholderVerifier {
    const ID: &'static str = "admin";
    const SECRET: &'static str = "1234";
}

impl CredentialVerifier for PlaceholderVerifier {
    fn verify(&self, id: &str, secret: &str) -> bool {
        id == Self::ID && secret == Self::SECRET
    }
}
