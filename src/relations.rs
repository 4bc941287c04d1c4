//! Relation inference.
//!
//! Relations come from three sources, merged in this order and deduplicated
//! on the source/target column pair:
//!
//! 1. declared foreign keys
//! 2. naming conventions (`user_id`, `id_user`) resolved against table names
//! 3. JOIN conditions mined from SQL text and application source (opt-in)
//!
//! A final pass adds the inverse of every many-to-one / one-to-many edge to
//! the target table so each relation is visible from both ends.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::joins::{JoinCondition, JoinMiner, SourceText};
use crate::naming::{pluralize, singularize};
use crate::schema::{Cardinality, ColumnRef, Relation, Schema, Severity, Table};

static ID_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^id_(\w+)$").unwrap());
static ID_SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^(\w+)_id$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationIssueKind {
    ImplicitForeignKey,
    JoinDetectedRelation,
    MissingReferencedTable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationIssue {
    pub kind: RelationIssueKind,
    pub severity: Severity,
    pub table_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_name: Option<String>,
    pub description: String,
    pub recommendation: String,
}

#[derive(Debug, Clone)]
pub struct RelationAnalysis {
    pub schema: Schema,
    pub issues: Vec<RelationIssue>,
}

#[derive(Default)]
pub struct RelationAnalyzer {
    analyze_joins: bool,
    miner: JoinMiner,
}

impl RelationAnalyzer {
    pub fn new(analyze_joins: bool) -> Self {
        Self {
            analyze_joins,
            miner: JoinMiner::default(),
        }
    }

    pub fn with_miner(mut self, miner: JoinMiner) -> Self {
        self.miner = miner;
        self
    }

    /// Populate `relations` on every table and report what was inferred.
    pub fn analyze(&self, schema: &Schema, sql: &str, sources: &[SourceText]) -> RelationAnalysis {
        let mut schema = schema.clone();
        let mut issues = Vec::new();

        let mut relations: Vec<Relation> = schema
            .tables
            .values()
            .flat_map(|t| t.relations.iter().cloned())
            .collect();

        let explicit = explicit_relations(&schema, &mut issues);
        let explicit_count = merge(&mut relations, explicit);

        let implicit = implicit_relations(&mut schema, &mut issues);
        let implicit_count = merge(&mut relations, implicit);

        let mut mined_count = 0;
        if self.analyze_joins {
            let texts = std::iter::once(("dump", sql))
                .chain(sources.iter().map(|s| (s.path.as_str(), s.content.as_str())));
            for (origin, text) in texts {
                let mined = self.miner.mine(text, &schema);
                let new = join_relations(&schema, &relations, mined, origin, &mut issues);
                for relation in &new {
                    mark_implicit(&mut schema, relation);
                }
                mined_count += merge(&mut relations, new);
            }
        }

        for table in schema.tables.values_mut() {
            table.relations.clear();
        }
        for relation in relations {
            if let Some(table) = schema.tables.get_mut(&relation.source_table) {
                table.relations.push(relation);
            }
        }
        let inverses = normalize_relations(&mut schema);

        info!(
            explicit = explicit_count,
            implicit = implicit_count,
            mined = mined_count,
            inverses,
            "relation analysis done"
        );
        RelationAnalysis { schema, issues }
    }
}

// Appends relations whose edge is not yet known; returns how many were added.
fn merge(relations: &mut Vec<Relation>, new: Vec<Relation>) -> usize {
    let mut added = 0;
    for relation in new {
        if !relations.iter().any(|r| r.same_edge(&relation)) {
            relations.push(relation);
            added += 1;
        }
    }
    added
}

fn explicit_relations(schema: &Schema, issues: &mut Vec<RelationIssue>) -> Vec<Relation> {
    let mut relations = Vec::new();

    for table in schema.tables.values() {
        for fk in &table.foreign_keys {
            let Some(source_column) = fk.columns.first() else {
                continue;
            };
            if !schema.tables.contains_key(&fk.referenced_table) {
                warn!(table = %table.name, target = %fk.referenced_table, "foreign key to unknown table");
                issues.push(RelationIssue {
                    kind: RelationIssueKind::MissingReferencedTable,
                    severity: Severity::High,
                    table_name: table.name.clone(),
                    column_name: Some(source_column.clone()),
                    description: format!(
                        "Foreign key on {}.{} references missing table {}",
                        table.name, source_column, fk.referenced_table
                    ),
                    recommendation: format!(
                        "Restore table {} or drop the constraint before migrating",
                        fk.referenced_table
                    ),
                });
                continue;
            }

            let target_column = fk.referenced_columns.first().cloned().unwrap_or_else(|| "id".to_string());
            relations.push(Relation {
                source_table: table.name.clone(),
                source_column: source_column.clone(),
                target_table: fk.referenced_table.clone(),
                target_column,
                cardinality: cardinality_for(table, source_column),
                is_implicit: false,
                detected_in_code: false,
                name: fk.name.clone(),
            });
        }
    }

    relations
}

fn cardinality_for(table: &Table, column: &str) -> Cardinality {
    if table.is_column_unique(column) {
        Cardinality::OneToOne
    } else {
        Cardinality::ManyToOne
    }
}

fn implicit_relations(schema: &mut Schema, issues: &mut Vec<RelationIssue>) -> Vec<Relation> {
    let mut relations = Vec::new();
    let view: &Schema = schema;

    for table in view.tables.values() {
        for column in table.columns.keys() {
            if table.is_foreign_key_column(column) {
                continue;
            }
            // `id_<table>` first, then `<table>_id`
            let candidates: Vec<String> = [&*ID_PREFIX, &*ID_SUFFIX]
                .iter()
                .filter_map(|pattern| pattern.captures(column))
                .map(|caps| caps[1].to_string())
                .collect();
            if candidates.is_empty() {
                continue;
            }

            let Some(target) = candidates
                .iter()
                .find_map(|candidate| find_matching_table(view, candidate))
            else {
                debug!(table = %table.name, column = %column, "no table for implicit key");
                continue;
            };
            let Some(target_column) = find_key_column(target) else {
                continue;
            };
            if target.name == table.name && target_column == *column {
                continue;
            }

            let reference = ColumnRef {
                table: target.name.clone(),
                column: target_column,
            };
            debug!(
                table = %table.name,
                column = %column,
                target = %reference.table,
                "implicit foreign key"
            );
            issues.push(RelationIssue {
                kind: RelationIssueKind::ImplicitForeignKey,
                severity: Severity::Medium,
                table_name: table.name.clone(),
                column_name: Some(column.clone()),
                description: format!(
                    "Column {}.{} looks like a reference to {}.{} but has no constraint",
                    table.name, column, reference.table, reference.column
                ),
                recommendation: format!(
                    "ALTER TABLE `{}` ADD CONSTRAINT `fk_{}_{}` FOREIGN KEY (`{}`) REFERENCES `{}` (`{}`);",
                    table.name, table.name, column, column, reference.table, reference.column
                ),
            });
            relations.push(Relation {
                source_table: table.name.clone(),
                source_column: column.clone(),
                target_table: reference.table.clone(),
                target_column: reference.column.clone(),
                cardinality: cardinality_for(table, column),
                is_implicit: true,
                detected_in_code: false,
                name: None,
            });
        }
    }

    for relation in &relations {
        mark_implicit(schema, relation);
    }

    relations
}

// Flags the source column of an inferred relation unless a constraint covers it.
fn mark_implicit(schema: &mut Schema, relation: &Relation) {
    let Some(table) = schema.tables.get_mut(&relation.source_table) else {
        return;
    };
    if table.is_foreign_key_column(&relation.source_column) {
        return;
    }
    if let Some(column) = table.columns.get_mut(&relation.source_column) {
        column.is_implicit_foreign_key = true;
        column.references = Some(ColumnRef {
            table: relation.target_table.clone(),
            column: relation.target_column.clone(),
        });
    }
}

/// Exact, plural and singular forms first, then the same case-insensitively.
pub fn find_matching_table<'a>(schema: &'a Schema, candidate: &str) -> Option<&'a Table> {
    let forms = [candidate.to_string(), pluralize(candidate), singularize(candidate)];

    forms
        .iter()
        .find_map(|form| schema.tables.get(form))
        .or_else(|| {
            forms.iter().find_map(|form| {
                schema
                    .tables
                    .values()
                    .find(|t| t.name.eq_ignore_ascii_case(form))
            })
        })
}

fn find_key_column(table: &Table) -> Option<String> {
    if table.columns.contains_key("id") {
        return Some("id".to_string());
    }
    let own = format!("{}_id", table.name.to_ascii_lowercase());
    let own_singular = format!("{}_id", singularize(&table.name).to_ascii_lowercase());
    let names: Vec<&String> = table.columns.keys().collect();

    names
        .iter()
        .find(|c| {
            let lower = c.to_ascii_lowercase();
            lower == own || lower == own_singular
        })
        .or_else(|| names.iter().find(|c| c.eq_ignore_ascii_case("id")))
        .or_else(|| names.iter().find(|c| c.to_ascii_lowercase().ends_with("_id")))
        .map(|c| c.to_string())
}

// The unique side of a JOIN equality becomes the target.
fn join_relations(
    schema: &Schema,
    known: &[Relation],
    conditions: Vec<JoinCondition>,
    origin: &str,
    issues: &mut Vec<RelationIssue>,
) -> Vec<Relation> {
    let mut relations = Vec::new();

    for condition in conditions {
        let unique = |side: &ColumnRef| {
            schema
                .tables
                .get(&side.table)
                .is_some_and(|t| t.is_column_unique(&side.column))
        };
        let (source, target) = if !unique(&condition.right) && unique(&condition.left) {
            (condition.right, condition.left)
        } else {
            (condition.left, condition.right)
        };
        let cardinality = if unique(&source) {
            Cardinality::OneToOne
        } else {
            Cardinality::ManyToOne
        };

        let relation = Relation {
            source_table: source.table.clone(),
            source_column: source.column.clone(),
            target_table: target.table.clone(),
            target_column: target.column.clone(),
            cardinality,
            is_implicit: true,
            detected_in_code: true,
            name: None,
        };
        let inverse = relation.inverse();
        if known.iter().chain(relations.iter()).any(|r| r.same_edge(&relation) || r.same_edge(&inverse)) {
            continue;
        }

        issues.push(RelationIssue {
            kind: RelationIssueKind::JoinDetectedRelation,
            severity: Severity::Low,
            table_name: source.table.clone(),
            column_name: Some(source.column.clone()),
            description: format!(
                "JOIN on {}.{} = {}.{} found in {}",
                source.table, source.column, target.table, target.column, origin
            ),
            recommendation: format!(
                "Consider a foreign key from {}.{} to {}.{}",
                source.table, source.column, target.table, target.column
            ),
        });
        relations.push(relation);
    }

    relations
}

/// Add the missing inverse of every many-to-one / one-to-many relation.
/// Returns the number of relations added.
pub fn normalize_relations(schema: &mut Schema) -> usize {
    let directed: Vec<Relation> = schema
        .tables
        .values()
        .flat_map(|t| t.relations.iter())
        .filter(|r| r.cardinality != Cardinality::OneToOne)
        .cloned()
        .collect();

    let mut added = 0;
    for relation in directed {
        let inverse = relation.inverse();
        let Some(target) = schema.tables.get_mut(&inverse.source_table) else {
            continue;
        };
        if !target.has_relation(&inverse) {
            target.relations.push(inverse);
            added += 1;
        }
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;

    fn users() -> Table {
        Table::new("users")
            .with_column(Column::new("id", "int"))
            .with_column(Column::new("email", "varchar(100)"))
            .with_primary_key(&["id"])
    }

    fn orders() -> Table {
        Table::new("orders")
            .with_column(Column::new("id", "int"))
            .with_column(Column::new("user_id", "int"))
            .with_primary_key(&["id"])
    }

    fn relation<'a>(schema: &'a Schema, table: &str, column: &str) -> Option<&'a Relation> {
        schema.tables[table].relations.iter().find(|r| r.source_column == column)
    }

    #[test]
    fn test_implicit_relation_and_inverse() {
        let schema = Schema::new("s").with_table(orders()).with_table(users());
        let result = RelationAnalyzer::default().analyze(&schema, "", &[]);

        let rel = relation(&result.schema, "orders", "user_id").unwrap();
        assert_eq!(rel.target_table, "users");
        assert_eq!(rel.target_column, "id");
        assert_eq!(rel.cardinality, Cardinality::ManyToOne);
        assert!(rel.is_implicit);

        let inverse = relation(&result.schema, "users", "id").unwrap();
        assert_eq!(inverse.target_table, "orders");
        assert_eq!(inverse.target_column, "user_id");
        assert_eq!(inverse.cardinality, Cardinality::OneToMany);

        let column = &result.schema.tables["orders"].columns["user_id"];
        assert!(column.is_implicit_foreign_key);
        assert_eq!(column.references.as_ref().unwrap().table, "users");
        assert_eq!(result.issues[0].kind, RelationIssueKind::ImplicitForeignKey);
    }

    #[test]
    fn test_explicit_one_to_one() {
        let profiles = Table::new("profiles")
            .with_column(Column::new("id", "int"))
            .with_column(Column::new("owner", "int"))
            .with_primary_key(&["id"])
            .with_index("uniq_owner", &["owner"], true)
            .with_foreign_key(&["owner"], "users", &["id"]);
        let schema = Schema::new("s").with_table(users()).with_table(profiles);
        let result = RelationAnalyzer::default().analyze(&schema, "", &[]);

        let rel = relation(&result.schema, "profiles", "owner").unwrap();
        assert_eq!(rel.cardinality, Cardinality::OneToOne);
        assert!(!rel.is_implicit);
        // one-to-one gets no synthesized inverse
        assert!(result.schema.tables["users"].relations.is_empty());
    }

    #[test]
    fn test_missing_target_reported_not_fatal() {
        let schema = Schema::new("s").with_table(orders().with_foreign_key(&["user_id"], "people", &["id"]));
        let result = RelationAnalyzer::default().analyze(&schema, "", &[]);
        assert!(result.schema.tables["orders"].relations.is_empty());
        assert_eq!(result.issues[0].kind, RelationIssueKind::MissingReferencedTable);
    }

    #[test]
    fn test_table_name_matching() {
        let schema = Schema::new("s")
            .with_table(Table::new("Category").with_column(Column::new("category_id", "int")))
            .with_table(Table::new("boxes").with_column(Column::new("id", "int")))
            .with_table(Table::new("person").with_column(Column::new("id", "int")));

        assert_eq!(find_matching_table(&schema, "box").unwrap().name, "boxes");
        assert_eq!(find_matching_table(&schema, "persons").unwrap().name, "person");
        assert_eq!(find_matching_table(&schema, "category").unwrap().name, "Category");
        assert!(find_matching_table(&schema, "ghost").is_none());
        assert_eq!(find_key_column(&schema.tables["Category"]).as_deref(), Some("category_id"));
    }

    #[test]
    fn test_id_prefix_convention() {
        let posts = Table::new("posts")
            .with_column(Column::new("id", "int"))
            .with_column(Column::new("id_user", "int"))
            .with_column(Column::new("id_ghost", "int"));
        let schema = Schema::new("s").with_table(users()).with_table(posts);
        let result = RelationAnalyzer::default().analyze(&schema, "", &[]);

        assert!(relation(&result.schema, "posts", "id_user").is_some());
        assert!(relation(&result.schema, "posts", "id_ghost").is_none());
        assert!(!result.schema.tables["posts"].columns["id_ghost"].is_implicit_foreign_key);
    }

    #[test]
    fn test_suffix_convention_after_unmatched_prefix() {
        let cards = Table::new("id_cards")
            .with_column(Column::new("id", "int"))
            .with_primary_key(&["id"]);
        let wallets = Table::new("wallets")
            .with_column(Column::new("id", "int"))
            .with_column(Column::new("id_card_id", "int"))
            .with_primary_key(&["id"]);
        let schema = Schema::new("s").with_table(cards).with_table(wallets);
        let result = RelationAnalyzer::default().analyze(&schema, "", &[]);

        let rel = relation(&result.schema, "wallets", "id_card_id").unwrap();
        assert_eq!(rel.target_table, "id_cards");
        assert_eq!(rel.target_column, "id");
        let column = &result.schema.tables["wallets"].columns["id_card_id"];
        assert_eq!(column.references.as_ref().unwrap().table, "id_cards");
    }

    #[test]
    fn test_join_mining_is_opt_in() {
        let payments = Table::new("payments")
            .with_column(Column::new("id", "int"))
            .with_column(Column::new("buyer", "int"))
            .with_primary_key(&["id"]);
        let schema = Schema::new("s").with_table(users()).with_table(payments);
        let sql = "SELECT * FROM payments p JOIN users u ON u.id = p.buyer;";

        let off = RelationAnalyzer::default().analyze(&schema, sql, &[]);
        assert!(relation(&off.schema, "payments", "buyer").is_none());

        let on = RelationAnalyzer::new(true).analyze(&schema, "", &[SourceText::new("a.php", sql)]);
        let rel = relation(&on.schema, "payments", "buyer").unwrap();
        assert_eq!(rel.target_table, "users");
        assert!(rel.detected_in_code);
        assert!(relation(&on.schema, "users", "id").is_some());

        let buyer = &on.schema.tables["payments"].columns["buyer"];
        assert!(buyer.is_implicit_foreign_key);
        let reference = buyer.references.as_ref().unwrap();
        assert_eq!((reference.table.as_str(), reference.column.as_str()), ("users", "id"));
        assert!(!off.schema.tables["payments"].columns["buyer"].is_implicit_foreign_key);
        assert!(on.issues.iter().any(|i| i.kind == RelationIssueKind::JoinDetectedRelation
            && i.description.contains("a.php")));
    }

    #[test]
    fn test_bidirectional_closure_and_rerun() {
        let items = Table::new("order_items")
            .with_column(Column::new("id", "int"))
            .with_column(Column::new("order_id", "int"))
            .with_foreign_key(&["order_id"], "orders", &["id"]);
        let schema = Schema::new("s").with_table(users()).with_table(orders()).with_table(items);
        let once = RelationAnalyzer::default().analyze(&schema, "", &[]).schema;

        for table in once.tables.values() {
            for rel in &table.relations {
                if rel.cardinality != Cardinality::OneToOne {
                    let inverse = rel.inverse();
                    assert!(once.tables[&rel.target_table].has_relation(&inverse));
                }
            }
        }

        let twice = RelationAnalyzer::default().analyze(&once, "", &[]).schema;
        assert_eq!(once.tables["orders"].relations.len(), twice.tables["orders"].relations.len());
    }
}
