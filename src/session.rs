//! Per-user settings, kept in memory for the lifetime of the process.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use crate::access::AllowList;
use crate::backend::Backend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserSession {
    pub selected_backend: Backend,
    pub template_substitution_enabled: bool,
}

/// Lookup for a user that wasn't on the allow-list at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownUser(pub u64);

impl fmt::Display for UnknownUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no session for user {}", self.0)
    }
}

impl std::error::Error for UnknownUser {}

/// Sessions for every allow-listed user.
///
/// The key set is fixed at construction; updates only touch existing entries.
pub struct SessionStore {
    sessions: RwLock<HashMap<u64, UserSession>>,
}

impl SessionStore {
    pub fn new(allow_list: &AllowList, default_backend: Backend) -> Self {
        let sessions = allow_list
            .ids()
            .iter()
            .map(|&id| {
                (
                    id,
                    UserSession {
                        selected_backend: default_backend,
                        template_substitution_enabled: false,
                    },
                )
            })
            .collect();
        Self { sessions: RwLock::new(sessions) }
    }

    pub fn get(&self, user_id: u64) -> Result<UserSession, UnknownUser> {
        self.sessions
            .read()
            .expect("session lock poisoned")
            .get(&user_id)
            .copied()
            .ok_or(UnknownUser(user_id))
    }

    pub fn set_backend(&self, user_id: u64, backend: Backend) -> Result<(), UnknownUser> {
        self.update(user_id, |s| s.selected_backend = backend)
    }

    pub fn set_template_enabled(&self, user_id: u64, enabled: bool) -> Result<(), UnknownUser> {
        self.update(user_id, |s| s.template_substitution_enabled = enabled)
    }

    fn update(&self, user_id: u64, f: impl FnOnce(&mut UserSession)) -> Result<(), UnknownUser> {
        let mut sessions = self.sessions.write().expect("session lock poisoned");
        let session = sessions.get_mut(&user_id).ok_or(UnknownUser(user_id))?;
        f(session);
        Ok(())
    }
}
