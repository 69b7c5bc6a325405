use serde::{Deserialize, Serialize};

use crate::BridgeError;

/// A host-persisted platform configuration entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformRecord {
    /// Host record identifier.
    pub name: String,
    /// Platform key, e.g. `"feishu"`.
    pub platform_type: String,
    #[serde(default)]
    pub is_enabled: bool,
}

impl PlatformRecord {
    pub fn new(
        name: impl Into<String>,
        platform_type: impl Into<String>,
        is_enabled: bool,
    ) -> Self {
        Self {
            name: name.into(),
            platform_type: platform_type.into(),
            is_enabled,
        }
    }
}

/// Reject saving `candidate` when another enabled record exists for the same
/// platform type. Records sharing the candidate's `name` are the candidate's
/// own previous version and are ignored.
pub fn ensure_single_enabled(
    existing: &[PlatformRecord],
    candidate: &PlatformRecord,
) -> Result<(), BridgeError> {
    if !candidate.is_enabled {
        return Ok(());
    }
    let conflict = existing.iter().find(|record| {
        record.is_enabled
            && record.platform_type == candidate.platform_type
            && record.name != candidate.name
    });
    match conflict {
        Some(record) => Err(BridgeError::Config(format!(
            "an enabled {} configuration already exists ({})",
            candidate.platform_type, record.name
        ))),
        None => Ok(()),
    }
}

/// Join a host base URL and an absolute path without doubling slashes.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
