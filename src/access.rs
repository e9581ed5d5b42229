//! Allow-list gate in front of every command except `/myid`.

use crate::config::ConfigError;

/// Telegram user IDs allowed to talk to the backends, in configured order.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    ids: Vec<u64>,
}

impl AllowList {
    /// Parse a comma-separated list of numeric IDs. Blank entries are skipped.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut ids = Vec::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            if !entry.chars().all(|c| c.is_ascii_digit()) {
                return Err(ConfigError::Invalid {
                    key: "users_id",
                    value: entry.to_string(),
                    reason: "user IDs can contain digits only".into(),
                });
            }
            let id: u64 = entry.parse().map_err(|_| ConfigError::Invalid {
                key: "users_id",
                value: entry.to_string(),
                reason: "user ID out of range".into(),
            })?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(Self { ids })
    }

    pub fn permits(&self, user_id: u64) -> bool {
        self.ids.contains(&user_id)
    }

    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<u64> for AllowList {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        let mut ids = Vec::new();
        for id in iter {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Self { ids }
    }
}

/// Reply for senders that aren't on the allow-list.
pub fn anonymous_reply(display_name: &str, source_url: &str) -> String {
    format!(
        "Hi **{display_name}**.\n\
         You are not authorised to use this Bot.\n\
         I recommend setting up your own bot like this.\n\
         Get the source code from [Github]({source_url})."
    )
}
