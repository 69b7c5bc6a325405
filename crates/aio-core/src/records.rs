use std::collections::BTreeSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::BridgeError;

/// Current wall-clock time in unix seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// A bearer token together with its absolute expiry (unix seconds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    pub expires_at: i64,
}

impl Credential {
    /// Create a credential expiring `ttl_secs` after `issued_at`.
    pub fn issued(token: impl Into<String>, issued_at: i64, ttl_secs: i64) -> Self {
        Self {
            token: token.into(),
            expires_at: issued_at.saturating_add(ttl_secs),
        }
    }

    /// `true` while `now + margin < expires_at`.
    pub fn is_usable_at(&self, now: i64, margin: Duration) -> bool {
        let margin = i64::try_from(margin.as_secs()).unwrap_or(i64::MAX);
        now.saturating_add(margin) < self.expires_at
    }

    pub fn is_usable(&self, margin: Duration) -> bool {
        self.is_usable_at(unix_now(), margin)
    }
}

// ---------------------------------------------------------------------------
// Directory records
// ---------------------------------------------------------------------------

/// An organizational unit (department) mirrored from the remote directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryUnit {
    pub remote_id: String,
    pub display_name: String,
    /// `None` for root units.
    pub parent_remote_id: Option<String>,
    pub leader_remote_id: Option<String>,
    pub active: bool,
}

/// A directory user mirrored from the remote directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryMember {
    pub remote_id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub unit_ids: BTreeSet<String>,
    pub active: bool,
}

// ---------------------------------------------------------------------------
// Inbound messages
// ---------------------------------------------------------------------------

/// A message received through the event webhook. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessageRecord {
    pub message_id: String,
    pub chat_id: String,
    pub sender_id: String,
    /// Raw content as delivered by the platform (usually a JSON string).
    pub content: String,
    /// Platform creation time in unix milliseconds, `0` when not reported.
    pub received_at: i64,
}

// ---------------------------------------------------------------------------
// Fetch and reconcile results
// ---------------------------------------------------------------------------

/// Items accumulated by a paginated fetch.
///
/// When `interruption` is set the fetch stopped early and `items` holds only
/// the pages read before the failure.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryListing<T> {
    pub items: Vec<T>,
    pub interruption: Option<BridgeError>,
}

impl<T> DirectoryListing<T> {
    pub fn complete(items: Vec<T>) -> Self {
        Self {
            items,
            interruption: None,
        }
    }

    pub fn partial(items: Vec<T>, error: BridgeError) -> Self {
        Self {
            items,
            interruption: Some(error),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.interruption.is_none()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Write counts produced by one reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl ReconcileReport {
    pub fn writes(&self) -> usize {
        self.inserted + self.updated
    }

    pub fn merge(&mut self, other: ReconcileReport) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
    }
}

/// Outcome of a directory synchronization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub units: ReconcileReport,
    pub members: ReconcileReport,
    /// `false` when any listing was cut short by a remote failure.
    pub complete: bool,
}

impl Default for SyncReport {
    fn default() -> Self {
        Self {
            units: ReconcileReport::default(),
            members: ReconcileReport::default(),
            complete: true,
        }
    }
}

impl SyncReport {
    pub fn merge(&mut self, other: SyncReport) {
        self.units.merge(other.units);
        self.members.merge(other.members);
        self.complete &= other.complete;
    }
}

/// Data backing the integration dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub platform: String,
    pub enabled: bool,
    pub webhook_url: Option<String>,
    pub user_count: usize,
    pub department_count: usize,
    pub recent_messages: Vec<InboundMessageRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_margin() {
        let cred = Credential::issued("t", 1_000, 7200);
        assert_eq!(cred.expires_at, 8_200);
        assert!(cred.is_usable_at(1_000, Duration::from_secs(300)));
        assert!(cred.is_usable_at(7_899, Duration::from_secs(300)));
        assert!(!cred.is_usable_at(7_900, Duration::from_secs(300)));
    }

    #[test]
    fn oversized_margin_never_usable() {
        let cred = Credential::issued("t", 1_000, 7200);
        assert!(!cred.is_usable_at(1_000, Duration::from_secs(u64::MAX)));
        assert!(!cred.is_usable_at(1_000, Duration::from_secs(1 << 63)));
    }

    #[test]
    fn sync_report_merge_tracks_completeness() {
        let mut report = SyncReport::default();
        report.merge(SyncReport {
            complete: false,
            ..Default::default()
        });
        assert!(!report.complete);
    }
}
