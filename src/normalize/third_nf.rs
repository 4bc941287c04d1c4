//! Transitive dependency and concatenated-entity detection.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use tracing::debug;

use super::sql;
use super::{Decomposition, DecompositionKind, SuggestedForeignKey, SuggestedTable};
use crate::schema::{Cardinality, Table, TableType};

static PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([A-Za-z][A-Za-z0-9]*)_").unwrap());
static STATUS_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)status|state|type|category|flag").unwrap());
static ADDRESS_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)address|street|city|state|zip|postal|country").unwrap());
static GEO_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(^|_)(lat|lng|lon|latitude|longitude|coords?|coordinates)(_|$)").unwrap()
});

/// Name parts that never denote an entity.
const NON_ENTITY_WORDS: &[&str] = &["tmp", "temp", "bak", "backup", "test", "log", "data", "info"];

/// Column groups that tend to depend on each other rather than on the key.
fn dependent_groups(table: &Table) -> Vec<Vec<String>> {
    let columns: Vec<&String> = table.columns.keys().collect();
    let mut groups: Vec<Vec<String>> = Vec::new();

    // prefixes compare case-insensitively
    let mut by_prefix: IndexMap<String, Vec<String>> = IndexMap::new();
    for column in &columns {
        if let Some(caps) = PREFIX.captures(column) {
            let prefix = caps.get(1).map_or("", |m| m.as_str());
            if prefix.len() > 2 {
                by_prefix
                    .entry(prefix.to_ascii_lowercase())
                    .or_default()
                    .push(column.to_string());
            }
        }
    }
    groups.extend(by_prefix.into_values().filter(|g| g.len() > 1));

    for pattern in [&*STATUS_LIKE, &*ADDRESS_LIKE, &*GEO_LIKE] {
        let group: Vec<String> = columns
            .iter()
            .filter(|c| pattern.is_match(c))
            .map(|c| c.to_string())
            .collect();
        if group.len() > 1 {
            groups.push(group);
        }
    }

    let mut unique: Vec<Vec<String>> = Vec::new();
    for group in groups {
        if !unique.contains(&group) {
            unique.push(group);
        }
    }
    unique
}

/// Every dependent group without a key column becomes a split suggestion.
pub fn transitive_dependencies(table: &Table) -> Vec<Decomposition> {
    let key = table.key_columns();

    dependent_groups(table)
        .into_iter()
        .filter(|group| !group.iter().any(|c| key.contains(c)))
        .map(|group| {
            debug!(table = %table.name, group = ?group, "transitive dependency");
            decompose(table, &key, group)
        })
        .collect()
}

fn decompose(table: &Table, key: &[String], group: Vec<String>) -> Decomposition {
    let child_name = format!("{}_{}", table.name, group[0]);
    let remaining: Vec<String> = table
        .columns
        .keys()
        .filter(|c| !group.contains(c))
        .cloned()
        .collect();

    let mut child_fks = vec![SuggestedForeignKey {
        columns: key.to_vec(),
        referenced_table: table.name.clone(),
        referenced_columns: key.to_vec(),
    }];
    child_fks.extend(outgoing_keys(table, &group));

    let parent = SuggestedTable {
        name: table.name.clone(),
        columns: remaining.clone(),
        primary_key: key.to_vec(),
        foreign_keys: outgoing_keys(table, &remaining),
    };
    let child = SuggestedTable {
        name: child_name.clone(),
        columns: key.iter().chain(group.iter()).cloned().collect(),
        primary_key: key.to_vec(),
        foreign_keys: child_fks,
    };

    let listed = group.join(", ");
    Decomposition {
        kind: DecompositionKind::TransitiveDependency,
        table_name: table.name.clone(),
        description: format!("Columns {listed} depend on a non-key attribute rather than on the primary key"),
        recommendation: format!("Move {listed} into a separate table {child_name} keyed by the primary key"),
        sql: sql::decomposition(table, key, &group),
        columns: group,
        suggested_tables: vec![parent, child],
    }
}

// Outgoing relations whose source column is in `columns`, as foreign keys.
fn outgoing_keys(table: &Table, columns: &[String]) -> Vec<SuggestedForeignKey> {
    table
        .relations
        .iter()
        .filter(|r| r.cardinality != Cardinality::OneToMany && columns.contains(&r.source_column))
        .map(|r| SuggestedForeignKey {
            columns: vec![r.source_column.clone()],
            referenced_table: r.target_table.clone(),
            referenced_columns: vec![r.target_column.clone()],
        })
        .collect()
}

fn is_entity_name(part: &str) -> bool {
    part.len() >= 3 && !NON_ENTITY_WORDS.contains(&part.to_ascii_lowercase().as_str())
}

fn entity_columns(table: &Table, entity: &str) -> Vec<String> {
    let entity = entity.to_ascii_lowercase();
    table
        .columns
        .keys()
        .filter(|c| c.to_ascii_lowercase().contains(&entity))
        .cloned()
        .collect()
}

/// Tables such as `user_order_address` whose name parts each have their own columns.
/// Junction tables are expected to look like this and are skipped.
pub fn concatenated_entities(table: &Table) -> Option<Decomposition> {
    if table.table_type == TableType::Junction {
        return None;
    }
    let parts: Vec<&str> = table.name.split('_').collect();
    if parts.len() < 2 || !parts.iter().all(|p| is_entity_name(p)) {
        return None;
    }
    if parts.iter().any(|p| entity_columns(table, p).is_empty()) {
        return None;
    }
    debug!(table = %table.name, entities = ?parts, "concatenated entities");

    let key = table.key_columns();
    let mut layout: Vec<(String, Vec<String>)> = parts
        .iter()
        .map(|part| {
            let mut columns = key.clone();
            for column in entity_columns(table, part) {
                if !columns.contains(&column) {
                    columns.push(column);
                }
            }
            (part.to_string(), columns)
        })
        .collect();

    let unassigned: Vec<String> = table
        .columns
        .keys()
        .filter(|c| !layout.iter().any(|(_, cols)| cols.contains(c)))
        .cloned()
        .collect();
    layout[0].1.extend(unassigned);

    let first = layout[0].0.clone();
    let suggested_tables = layout
        .iter()
        .enumerate()
        .map(|(i, (entity, columns))| SuggestedTable {
            name: entity.clone(),
            columns: columns.clone(),
            primary_key: key.clone(),
            foreign_keys: if i == 0 {
                Vec::new()
            } else {
                vec![SuggestedForeignKey {
                    columns: key.clone(),
                    referenced_table: first.clone(),
                    referenced_columns: key.clone(),
                }]
            },
        })
        .collect();

    let entities: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
    Some(Decomposition {
        kind: DecompositionKind::ConcatenatedEntities,
        table_name: table.name.clone(),
        description: format!("Table looks like a concatenation of entities: {}", entities.join(", ")),
        recommendation: "Split the table into one table per entity".to_string(),
        sql: sql::entity_split(table, &key, &layout),
        columns: entities,
        suggested_tables,
    })
}
