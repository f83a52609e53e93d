//! Short-lived in-memory cache for role lookups.

use std::{
    collections::HashMap,
    time::{Duration, SystemTime},
};

use crate::domain::RoleInfo;
use crate::util::age_string;

/// Default freshness window for a resolved role.
pub const ROLE_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Clone, Debug)]
struct CachedRole {
    info: RoleInfo,
    fetched_at: SystemTime,
}

impl CachedRole {
    fn age(&self) -> Duration {
        self.fetched_at.elapsed().unwrap_or(Duration::MAX)
    }
}

/// Roles keyed by lower-cased email.
#[derive(Debug, Default)]
pub struct RoleCache {
    entries: HashMap<String, CachedRole>,
}

impl RoleCache {
    fn key(email: &str) -> String {
        email.trim().to_lowercase()
    }

    pub fn fresh(&self, email: &str, ttl: Duration) -> Option<RoleInfo> {
        let entry = self.entries.get(&Self::key(email))?;
        let age = entry.age();
        if age <= ttl {
            tracing::debug!(
                email,
                age = %age_string(age.as_secs()),
                "serving cached role"
            );
            Some(entry.info.clone())
        } else {
            None
        }
    }

    pub fn insert(&mut self, info: RoleInfo) {
        self.insert_at(info, SystemTime::now());
    }

    pub fn insert_at(&mut self, info: RoleInfo, fetched_at: SystemTime) {
        self.entries
            .insert(Self::key(&info.email), CachedRole { info, fetched_at });
    }

    pub fn invalidate(&mut self, email: &str) {
        self.entries.remove(&Self::key(email));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
