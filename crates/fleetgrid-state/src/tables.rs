//! redb table definitions for the fleet state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain
//! types). Composite keys follow the pattern `{environment}/{target_id}`
//! or `{parent_key}:{seq}` with zero-padded sequences so iteration order
//! is audit order.

use redb::TableDefinition;

/// Targets keyed by `{environment}/{target_id}`.
pub const TARGETS: TableDefinition<&str, &[u8]> = TableDefinition::new("targets");

/// Pipeline runs keyed by `{environment}/{seq}` (the run id).
pub const RUNS: TableDefinition<&str, &[u8]> = TableDefinition::new("runs");

/// Rollback audit records keyed by `{environment}/{target_id}:{seq}`.
pub const ROLLBACKS: TableDefinition<&str, &[u8]> = TableDefinition::new("rollbacks");

/// Escalation events keyed by `inc-{seq}`.
pub const ESCALATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("escalations");

/// Recent health reports keyed by `{target_id}:{seq}` (rolling window).
pub const REPORTS: TableDefinition<&str, &[u8]> = TableDefinition::new("reports");
