// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Plan-tier password masking.
//!
//! Applied once per canonical record, after correlation, regardless of which
//! store answered the query.
//!
//! ```
//! use exposure_engine::masking::{mask_password, PlanTier};
//!
//! assert_eq!(mask_password("abcdefgh"), "ab****gh");
//! assert_eq!(mask_password("abc"), "****");
//! assert!(!PlanTier::Professional.masks_passwords());
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::metrics;
use crate::record::{CanonicalRecord, ResolvedResult, SourceStoreTag};

/// Characters left visible at the start of a masked password
const SHOW_START: usize = 2;
/// Characters left visible at the end of a masked password
const SHOW_END: usize = 2;
/// Shortest run of asterisks a fully masked password gets
const MIN_FULL_MASK: usize = 4;

/// Caller entitlement level. Resolved outside the engine and passed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanTier {
    #[default]
    Free,
    Basic,
    Professional,
    Enterprise,
}

impl PlanTier {
    /// Only the lowest tier sees redacted passwords.
    pub fn masks_passwords(&self) -> bool {
        matches!(self, Self::Free)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Basic => "BASIC",
            Self::Professional => "PROFESSIONAL",
            Self::Enterprise => "ENTERPRISE",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FREE" => Ok(Self::Free),
            "BASIC" => Ok(Self::Basic),
            "PROFESSIONAL" | "PRO" => Ok(Self::Professional),
            "ENTERPRISE" => Ok(Self::Enterprise),
            other => Err(format!("unknown plan tier '{}'", other)),
        }
    }
}

/// Redact the middle of a password.
///
/// Keeps the first two and last two characters. Passwords too short to hide
/// anything that way are replaced by `max(len, 4)` asterisks. Counts chars,
/// not bytes.
pub fn mask_password(password: &str) -> String {
    let len = password.chars().count();
    if len == 0 {
        return String::new();
    }
    if len <= SHOW_START + SHOW_END {
        return "*".repeat(len.max(MIN_FULL_MASK));
    }

    let mut masked = String::with_capacity(password.len());
    for (i, c) in password.chars().enumerate() {
        if i < SHOW_START || i >= len - SHOW_END {
            masked.push(c);
        } else {
            masked.push('*');
        }
    }
    masked
}

/// Turns canonical records into caller-visible results.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaskingPolicy;

impl MaskingPolicy {
    pub fn mask(&self, record: CanonicalRecord, tier: PlanTier, source: SourceStoreTag) -> ResolvedResult {
        let masking_applied = tier.masks_passwords();
        metrics::record_masking(masking_applied);

        let password = if masking_applied {
            mask_password(&record.password)
        } else {
            record.password
        };

        ResolvedResult {
            id: record.id,
            login: record.login,
            password,
            url: record.url,
            domain: record.domain,
            metadata: record.metadata,
            timestamp: record.timestamp,
            created_at: record.created_at,
            updated_at: record.updated_at,
            source_tag: record.source_tag,
            masking_applied,
            source_store: source,
        }
    }

    pub fn mask_all(
        &self,
        records: Vec<CanonicalRecord>,
        tier: PlanTier,
        source: SourceStoreTag,
    ) -> Vec<ResolvedResult> {
        records.into_iter().map(|r| self.mask(r, tier, source)).collect()
    }
}
