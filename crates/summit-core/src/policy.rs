//! # Conflict Policies
//!
//! Per-entity-type conflict resolution strategies.
//!
//! The mapping from entity type to policy is a tagged variant keyed by
//! [`EntityType`] — a total table fixed at configuration time, never
//! chosen per record.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::EntityType;

// =============================================================================
// Conflict Policy
// =============================================================================

/// Resolution strategy applied when local and remote state diverge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Adopt remote state, but only once any queued operation for the
    /// record has been delivered or voided. Used where authority is
    /// inherently server-side (attendance validation).
    ServerWins,

    /// Adopt remote state unconditionally and purge any still-queued
    /// operation for the record. Queued local edits are discarded, never
    /// delivered. Used for issued certificates.
    ServerWinsHard,

    /// Client-priority default: a still-queued local write is pushed as
    /// the winner, unless the pulled remote `updated_at` is newer than
    /// the value the queued write was based on — then the remote wins and
    /// the queued operation is cancelled. Used for evaluation answers.
    LastWriteWins,

    /// No merge: local and remote artifacts persist as distinct records
    /// under the same logical subject. Used for uploaded media.
    KeepBoth,

    /// No automatic action: the record is marked `conflict` and surfaced
    /// for manual resolution.
    UserArbitration,
}

impl ConflictPolicy {
    /// Stable configuration name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::ServerWins => "server_wins",
            ConflictPolicy::ServerWinsHard => "server_wins_hard",
            ConflictPolicy::LastWriteWins => "last_write_wins",
            ConflictPolicy::KeepBoth => "keep_both",
            ConflictPolicy::UserArbitration => "user_arbitration",
        }
    }
}

impl std::fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConflictPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "server_wins" => Ok(ConflictPolicy::ServerWins),
            "server_wins_hard" => Ok(ConflictPolicy::ServerWinsHard),
            "last_write_wins" => Ok(ConflictPolicy::LastWriteWins),
            "keep_both" => Ok(ConflictPolicy::KeepBoth),
            "user_arbitration" => Ok(ConflictPolicy::UserArbitration),
            other => Err(CoreError::UnknownConflictPolicy(other.to_string())),
        }
    }
}

// =============================================================================
// Policy Table
// =============================================================================

/// Total mapping `EntityType → ConflictPolicy`.
///
/// Built once from configuration; lookups never fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    overrides: HashMap<EntityType, ConflictPolicy>,
}

impl PolicyTable {
    /// Table with the built-in defaults for every entity type.
    pub fn new() -> Self {
        PolicyTable {
            overrides: HashMap::new(),
        }
    }

    /// Built-in default policy for an entity type.
    pub const fn default_policy(entity_type: EntityType) -> ConflictPolicy {
        match entity_type {
            EntityType::Attendance => ConflictPolicy::ServerWins,
            EntityType::Registration => ConflictPolicy::ServerWins,
            EntityType::Evaluation => ConflictPolicy::LastWriteWins,
            EntityType::Certificate => ConflictPolicy::ServerWinsHard,
            EntityType::Media => ConflictPolicy::KeepBoth,
            EntityType::Profile => ConflictPolicy::LastWriteWins,
        }
    }

    /// Overrides the policy for one entity type.
    pub fn with_policy(mut self, entity_type: EntityType, policy: ConflictPolicy) -> Self {
        self.overrides.insert(entity_type, policy);
        self
    }

    /// The policy in force for an entity type.
    pub fn policy_for(&self, entity_type: EntityType) -> ConflictPolicy {
        self.overrides
            .get(&entity_type)
            .copied()
            .unwrap_or_else(|| Self::default_policy(entity_type))
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_round_trip() {
        for policy in [
            ConflictPolicy::ServerWins,
            ConflictPolicy::ServerWinsHard,
            ConflictPolicy::LastWriteWins,
            ConflictPolicy::KeepBoth,
            ConflictPolicy::UserArbitration,
        ] {
            assert_eq!(policy.as_str().parse::<ConflictPolicy>().unwrap(), policy);
        }
        assert!("merge_harder".parse::<ConflictPolicy>().is_err());
    }

    #[test]
    fn test_table_is_total() {
        let table = PolicyTable::new();
        for ty in EntityType::ALL {
            // Every lookup resolves; the defaults cover all types.
            let _ = table.policy_for(ty);
        }
        assert_eq!(
            table.policy_for(EntityType::Certificate),
            ConflictPolicy::ServerWinsHard
        );
        assert_eq!(
            table.policy_for(EntityType::Media),
            ConflictPolicy::KeepBoth
        );
    }

    #[test]
    fn test_override_wins_over_default() {
        let table = PolicyTable::new()
            .with_policy(EntityType::Evaluation, ConflictPolicy::UserArbitration);
        assert_eq!(
            table.policy_for(EntityType::Evaluation),
            ConflictPolicy::UserArbitration
        );
        // Other types keep their defaults.
        assert_eq!(
            table.policy_for(EntityType::Attendance),
            ConflictPolicy::ServerWins
        );
    }
}
