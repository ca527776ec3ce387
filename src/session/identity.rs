use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Opaque id of one recording session, minted from the start time in
/// milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for SessionId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mints strictly increasing session ids.
///
/// Ids follow the wall clock; two sessions started in the same millisecond
/// (or after the clock stepped back) get `last + 1`.
#[derive(Debug, Default)]
pub struct SessionIdMinter {
    last: AtomicU64,
}

impl SessionIdMinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&self) -> SessionId {
        let now = Utc::now().timestamp_millis().max(0) as u64;

        let previous = match self.last.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        }) {
            Ok(last) | Err(last) => last,
        };

        SessionId(now.max(previous + 1))
    }
}

/// Who is recording, stamped unchanged onto every outbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdentity {
    pub user_id: String,
    /// Milliseconds since the Unix epoch; groups every recording of one visit
    pub session_timestamp: i64,
}

impl SessionIdentity {
    pub fn new(user_id: impl Into<String>, session_timestamp: i64) -> Self {
        Self {
            user_id: user_id.into(),
            session_timestamp,
        }
    }

    /// Identity whose session timestamp is the current time
    pub fn starting_now(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Utc::now().timestamp_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minted_ids_strictly_increase() {
        let minter = SessionIdMinter::new();

        let ids: Vec<SessionId> = (0..1000).map(|_| minter.mint()).collect();

        for pair in ids.windows(2) {
            assert!(pair[1] > pair[0], "{} not after {}", pair[1], pair[0]);
        }
    }

    #[test]
    fn test_minted_id_tracks_wall_clock() {
        let before = Utc::now().timestamp_millis() as u64;
        let id = SessionIdMinter::new().mint();

        assert!(id.as_u64() >= before);
    }
}
