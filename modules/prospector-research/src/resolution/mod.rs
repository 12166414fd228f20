//! Deduplication engines.
//!
//! `entities` works within one run; `people` and `companies` resolve across
//! every run the tenant owns. All three are hash- or lookup-idempotent: a
//! second pass over unchanged input writes nothing.

pub mod companies;
pub mod entities;
pub mod people;

use serde::Serialize;

/// Outcome of the run-scoped executive resolution pass.
#[derive(Debug, Default, Serialize)]
pub struct EntityResolutionSummary {
    pub inputs_considered: u64,
    pub resolved_entities_new: u64,
    pub resolved_entities_existing: u64,
    pub merge_links_new: u64,
    pub merge_links_existing: u64,
}

/// Outcome of a tenant-scoped canonical resolution pass.
#[derive(Debug, Default, Serialize)]
pub struct CanonicalResolutionSummary {
    pub inputs_considered: u64,
    pub canonical_new: u64,
    pub links_new: u64,
    pub links_existing: u64,
    pub skipped_ambiguous: u64,
    pub skipped_unkeyed: u64,
    pub count_before: i64,
    pub count_after: i64,
}
