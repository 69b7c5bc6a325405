use std::sync::Arc;

use crate::{BridgeError, DirectoryMember, DirectoryStore, DirectoryUnit, ReconcileReport};

/// Reconciles fetched directory records into a [`DirectoryStore`].
///
/// Records are matched by `remote_id`. Nothing is ever deleted: records that
/// disappear remotely keep their last known state, and inactivity comes only
/// from the per-record flag the platform reports. A record identical to the
/// stored one is not written, so replaying the same input is a no-op.
#[derive(Clone)]
pub struct DirectoryMirror {
    store: Arc<dyn DirectoryStore>,
}

impl DirectoryMirror {
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DirectoryStore> {
        &self.store
    }

    pub async fn reconcile_units(
        &self,
        units: &[DirectoryUnit],
    ) -> Result<ReconcileReport, BridgeError> {
        let mut report = ReconcileReport::default();
        for unit in units {
            match self.store.find_unit(&unit.remote_id).await? {
                Some(existing) if existing == *unit => report.unchanged += 1,
                Some(_) => {
                    self.store.save_unit(unit.clone()).await?;
                    report.updated += 1;
                }
                None => {
                    self.store.save_unit(unit.clone()).await?;
                    report.inserted += 1;
                }
            }
        }
        tracing::debug!(
            inserted = report.inserted,
            updated = report.updated,
            unchanged = report.unchanged,
            "reconciled directory units"
        );
        Ok(report)
    }

    pub async fn reconcile_members(
        &self,
        members: &[DirectoryMember],
    ) -> Result<ReconcileReport, BridgeError> {
        let mut report = ReconcileReport::default();
        for member in members {
            match self.store.find_member(&member.remote_id).await? {
                Some(existing) if existing == *member => report.unchanged += 1,
                Some(_) => {
                    self.store.save_member(member.clone()).await?;
                    report.updated += 1;
                }
                None => {
                    self.store.save_member(member.clone()).await?;
                    report.inserted += 1;
                }
            }
        }
        tracing::debug!(
            inserted = report.inserted,
            updated = report.updated,
            unchanged = report.unchanged,
            "reconciled directory members"
        );
        Ok(report)
    }
}
