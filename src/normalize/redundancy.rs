//! Redundant table detection.
//!
//! Temporal redundancy groups `orders`, `orders_log`, `old_orders` and the like
//! by their base name. Structural redundancy clusters any remaining tables
//! whose column sets are nearly identical.

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::debug;

use super::{average_similarity, jaccard, sql, Redundancy, RedundancyKind};
use crate::schema::{Schema, Table};

const TEMPORAL_SUFFIXES: &[&str] = &[
    "_log", "_logs", "_history", "_hist", "_archive", "_arch", "_backup", "_bak", "_temp", "_tmp",
    "_old", "_new", "_legacy",
];

const TEMPORAL_PREFIXES: &[&str] = &[
    "log_", "logs_", "history_", "hist_", "archive_", "arch_", "backup_", "bak_", "temp_", "tmp_",
    "old_", "new_", "legacy_",
];

/// Base names with their temporal variants, in first-seen order.
fn group_by_base(schema: &Schema) -> IndexMap<String, Vec<String>> {
    let mut groups: IndexMap<String, Vec<String>> = IndexMap::new();

    for name in schema.tables.keys() {
        let lower = name.to_ascii_lowercase();
        if let Some(suffix) = TEMPORAL_SUFFIXES.iter().find(|s| lower.ends_with(*s)) {
            let base = &name[..name.len() - suffix.len()];
            if !base.is_empty() {
                groups.entry(base.to_string()).or_default().push(name.clone());
            }
        }
        if let Some(prefix) = TEMPORAL_PREFIXES.iter().find(|p| lower.starts_with(*p)) {
            let base = &name[prefix.len()..];
            if !base.is_empty() {
                groups.entry(base.to_string()).or_default().push(name.clone());
            }
        }
    }

    for (base, members) in groups.iter_mut() {
        if schema.tables.contains_key(base) {
            members.insert(0, base.clone());
        }
        let mut seen = HashSet::new();
        members.retain(|m| seen.insert(m.clone()));
    }
    groups
}

fn recommendation(base: &str, tables: &[String]) -> String {
    let has = |needles: &[&str]| {
        tables.iter().any(|t| {
            let t = t.to_ascii_lowercase();
            needles.iter().any(|n| t.contains(n))
        })
    };
    if has(&["log", "hist"]) {
        format!("Keep a single {base} history table with a 'type' column instead of one table per log")
    } else if has(&["temp", "tmp"]) {
        format!("Use a single {base} table with a 'status' column instead of temporary copies")
    } else {
        format!("Merge these tables into {base}_unified with a discriminant column")
    }
}

pub fn temporal_groups(schema: &Schema, threshold: f64) -> Vec<Redundancy> {
    let mut found = Vec::new();

    for (base, members) in group_by_base(schema) {
        if members.len() < 2 {
            continue;
        }
        let tables: Vec<&Table> = members.iter().filter_map(|m| schema.tables.get(m)).collect();
        let similarity = average_similarity(&tables);
        debug!(base = %base, tables = ?members, similarity, "temporal group");
        if similarity <= threshold {
            continue;
        }

        found.push(Redundancy {
            kind: RedundancyKind::Temporal,
            recommendation: recommendation(&base, &members),
            sql: sql::unified(&tables, &format!("{base}_unified"), "record_type"),
            tables: members,
            similarity,
        });
    }
    found
}

/// Greedy clustering: each unclaimed table pulls in every later unclaimed
/// table whose similarity to it exceeds `threshold`.
pub fn structural_clusters(schema: &Schema, threshold: f64, excluded: &HashSet<&str>) -> Vec<Redundancy> {
    let candidates: Vec<&Table> = schema
        .tables
        .values()
        .filter(|t| !excluded.contains(t.name.as_str()))
        .collect();
    let mut claimed = vec![false; candidates.len()];
    let mut found = Vec::new();

    for i in 0..candidates.len() {
        if claimed[i] {
            continue;
        }
        let mut cluster = vec![candidates[i]];
        for j in i + 1..candidates.len() {
            if !claimed[j] && jaccard(candidates[i], candidates[j]) > threshold {
                claimed[j] = true;
                cluster.push(candidates[j]);
            }
        }
        if cluster.len() < 2 {
            continue;
        }
        claimed[i] = true;

        let tables: Vec<String> = cluster.iter().map(|t| t.name.clone()).collect();
        let merged = format!("{}_merged", tables[0]);
        let similarity = average_similarity(&cluster);
        debug!(tables = ?tables, similarity, "structural cluster");

        found.push(Redundancy {
            kind: RedundancyKind::Structural,
            recommendation: format!(
                "Tables {} share almost the same columns; merge them into {merged} with an 'entity_type' column",
                tables.join(", ")
            ),
            sql: sql::unified(&cluster, &merged, "entity_type"),
            tables,
            similarity,
        });
    }
    found
}
