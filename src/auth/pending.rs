// Usernames staged by set_username, waiting for a password

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

#[derive(Debug, Clone)]
struct PendingEntry {
    username: String,
    staged_at: DateTime<Utc>,
}

/// Per-session staged usernames with a time-to-live
///
/// Keys are transport session identifiers, so two clients sharing one
/// server never see each other's pending login.
#[derive(Debug)]
pub struct PendingLogins {
    entries: DashMap<String, PendingEntry>,
    ttl: Duration,
}

impl PendingLogins {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Stage a username, replacing any earlier one for the session
    pub fn set_username(&self, session_key: &str, username: &str, now: DateTime<Utc>) {
        self.purge(now);
        self.entries.insert(
            session_key.to_string(),
            PendingEntry {
                username: username.to_string(),
                staged_at: now,
            },
        );
    }

    /// Staged username, if present and not stale
    pub fn peek(&self, session_key: &str, now: DateTime<Utc>) -> Option<String> {
        self.entries
            .get(session_key)
            .filter(|entry| !self.is_stale(entry, now))
            .map(|entry| entry.username.clone())
    }

    /// Remove and return the staged username
    pub fn take(&self, session_key: &str, now: DateTime<Utc>) -> Option<String> {
        self.entries
            .remove(session_key)
            .map(|(_, entry)| entry)
            .filter(|entry| !self.is_stale(entry, now))
            .map(|entry| entry.username)
    }

    /// Drop every stale entry
    pub fn purge(&self, now: DateTime<Utc>) {
        let ttl = self.ttl;
        self.entries.retain(|_, entry| now - entry.staged_at < ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_stale(&self, entry: &PendingEntry, now: DateTime<Utc>) -> bool {
        now - entry.staged_at >= self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_take_consumes_username() {
        let pending = PendingLogins::new(Duration::minutes(10));
        pending.set_username("a", "reporter", t0());

        assert_eq!(pending.peek("a", t0()).as_deref(), Some("reporter"));
        assert_eq!(pending.take("a", t0()).as_deref(), Some("reporter"));
        assert_eq!(pending.take("a", t0()), None);
    }

    #[test]
    fn test_sessions_are_isolated() {
        let pending = PendingLogins::new(Duration::minutes(10));
        pending.set_username("a", "alice", t0());
        pending.set_username("b", "bob", t0());

        assert_eq!(pending.take("b", t0()).as_deref(), Some("bob"));
        assert_eq!(pending.peek("a", t0()).as_deref(), Some("alice"));
    }

    #[test]
    fn test_stale_entries_expire() {
        let pending = PendingLogins::new(Duration::minutes(10));
        pending.set_username("a", "reporter", t0());

        let later = t0() + Duration::minutes(10);
        assert_eq!(pending.peek("a", later), None);
        assert_eq!(pending.take("a", later), None);
    }

    #[test]
    fn test_purge_removes_only_stale() {
        let pending = PendingLogins::new(Duration::minutes(10));
        pending.set_username("old", "alice", t0());
        pending.set_username("new", "bob", t0() + Duration::minutes(8));

        pending.purge(t0() + Duration::minutes(12));
        assert_eq!(pending.len(), 1);
        assert!(pending.peek("new", t0() + Duration::minutes(12)).is_some());
    }

    #[test]
    fn test_set_username_replaces_previous() {
        let pending = PendingLogins::new(Duration::minutes(10));
        pending.set_username("a", "alice", t0());
        pending.set_username("a", "carol", t0());
        assert_eq!(pending.take("a", t0()).as_deref(), Some("carol"));
    }
}
