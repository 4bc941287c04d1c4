//! Normalization advisor: 3NF violations and redundant tables.
//!
//! Both detectors are heuristics over column names. Every suggestion carries
//! migration SQL which is only ever rendered, never executed.

mod redundancy;
mod sql;
mod third_nf;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::schema::{Schema, Table};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Average Jaccard similarity a temporal group must exceed.
    pub temporal_similarity_threshold: f64,
    /// Pairwise Jaccard similarity two unrelated tables must exceed.
    pub structural_similarity_threshold: f64,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            temporal_similarity_threshold: 0.70,
            structural_similarity_threshold: 0.85,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum NormalizationSuggestion {
    #[serde(rename = "3NF_VIOLATION")]
    ThirdNormalForm(Decomposition),
    #[serde(rename = "REDUNDANT_TABLES")]
    RedundantTables(Redundancy),
}

impl NormalizationSuggestion {
    pub fn tables(&self) -> Vec<&str> {
        match self {
            Self::ThirdNormalForm(d) => vec![d.table_name.as_str()],
            Self::RedundantTables(r) => r.tables.iter().map(String::as_str).collect(),
        }
    }

    pub fn sql(&self) -> &str {
        match self {
            Self::ThirdNormalForm(d) => &d.sql,
            Self::RedundantTables(r) => &r.sql,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecompositionKind {
    TransitiveDependency,
    ConcatenatedEntities,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decomposition {
    pub kind: DecompositionKind,
    pub table_name: String,
    pub description: String,
    pub recommendation: String,
    /// The dependent column group, or the entity names for a concatenation.
    pub columns: Vec<String>,
    pub suggested_tables: Vec<SuggestedTable>,
    pub sql: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedTable {
    pub name: String,
    pub columns: Vec<String>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<SuggestedForeignKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedForeignKey {
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RedundancyKind {
    Temporal,
    Structural,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Redundancy {
    pub kind: RedundancyKind,
    pub tables: Vec<String>,
    pub similarity: f64,
    pub recommendation: String,
    pub sql: String,
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, schema: &Schema) -> Vec<NormalizationSuggestion> {
        let mut suggestions = Vec::new();

        for table in schema.tables.values() {
            for decomposition in third_nf::transitive_dependencies(table) {
                suggestions.push(NormalizationSuggestion::ThirdNormalForm(decomposition));
            }
            if let Some(decomposition) = third_nf::concatenated_entities(table) {
                suggestions.push(NormalizationSuggestion::ThirdNormalForm(decomposition));
            }
        }
        let violations = suggestions.len();

        let temporal = redundancy::temporal_groups(schema, self.config.temporal_similarity_threshold);
        let grouped: HashSet<&str> = temporal
            .iter()
            .flat_map(|r| r.tables.iter().map(String::as_str))
            .collect();
        let structural =
            redundancy::structural_clusters(schema, self.config.structural_similarity_threshold, &grouped);

        let redundant = temporal.len() + structural.len();
        suggestions.extend(temporal.into_iter().map(NormalizationSuggestion::RedundantTables));
        suggestions.extend(structural.into_iter().map(NormalizationSuggestion::RedundantTables));

        info!(violations, redundant, "normalization analysis done");
        suggestions
    }
}

/// Jaccard similarity of the two tables' column-name sets.
pub fn jaccard(a: &Table, b: &Table) -> f64 {
    let common = a.columns.keys().filter(|c| b.columns.contains_key(*c)).count();
    let union = a.columns.len() + b.columns.len() - common;
    if union == 0 {
        return 0.0;
    }
    common as f64 / union as f64
}

/// Mean pairwise Jaccard similarity; 1.0 for fewer than two tables.
pub fn average_similarity(tables: &[&Table]) -> f64 {
    if tables.len() < 2 {
        return 1.0;
    }
    let mut total = 0.0;
    let mut pairs = 0;
    for (i, a) in tables.iter().enumerate() {
        for b in &tables[i + 1..] {
            total += jaccard(a, b);
            pairs += 1;
        }
    }
    total / pairs as f64
}
