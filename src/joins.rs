//! JOIN mining over raw SQL and application source text.
//!
//! Text is cut into `;`-separated segments. Each segment gets its own alias
//! map built from FROM/JOIN/UPDATE/INTO clauses, then every JOIN pattern is
//! applied and `alias.column = alias.column` pairs are resolved back to
//! schema tables. Anything that does not resolve is dropped.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::schema::{ColumnRef, Schema};

/// A named piece of text to scan, typically a PHP file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceText {
    pub path: String,
    pub content: String,
}

impl SourceText {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Equality found in a JOIN ... ON clause, resolved to schema columns.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinCondition {
    pub left: ColumnRef,
    pub right: ColumnRef,
}

/// Capture layout shared by every JOIN pattern:
/// 1 joined table, 2 optional alias, 3/4 left alias.column, 5/6 right alias.column.
const JOIN_TAIL: &str = r"JOIN\s+`?(\w+)`?(?:\s+(?:AS\s+)?`?(\w+)`?)?\s+ON\s+\(?\s*`?(\w+)`?\.`?(\w+)`?\s*=\s*`?(\w+)`?\.`?(\w+)`?";

const JOIN_PATTERNS: &[&str] = &[
    // Full statement form
    r"\b(?:SELECT|UPDATE|DELETE)\b.*?\b",
    // Bare typed JOIN clauses, including LEFT OUTER JOIN
    r"\b(?:(?:INNER|LEFT|RIGHT|OUTER|CROSS|FULL|NATURAL)\s+)+",
    // Untyped JOIN
    r"(?:^|[^\w])",
];

static ALIAS_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:FROM|JOIN|UPDATE|INTO)\s+`?(\w+)`?(?:\s+(?:AS\s+)?`?(\w+)`?)?").unwrap()
});

static DEFAULT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    JOIN_PATTERNS
        .iter()
        .map(|prefix| Regex::new(&format!("(?is){prefix}{JOIN_TAIL}")).unwrap())
        .collect()
});

const NOT_AN_ALIAS: &[&str] = &[
    "on", "where", "join", "inner", "left", "right", "outer", "cross", "full", "natural", "set",
    "group", "order", "limit", "having", "using", "as", "and", "or", "values", "select", "union",
    "straight_join", "force", "use", "ignore", "with",
];

pub struct JoinMiner {
    patterns: Vec<Regex>,
}

impl Default for JoinMiner {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_PATTERNS.clone(),
        }
    }
}

impl JoinMiner {
    /// Custom patterns must keep the six-group capture layout of the defaults.
    pub fn with_patterns(patterns: Vec<Regex>) -> Self {
        Self { patterns }
    }

    /// All distinct column equalities found in `text` that resolve against `schema`.
    pub fn mine(&self, text: &str, schema: &Schema) -> Vec<JoinCondition> {
        let mut found: Vec<JoinCondition> = Vec::new();

        for segment in text.split(';') {
            if !segment.to_ascii_uppercase().contains("JOIN") {
                continue;
            }
            let aliases = alias_map(segment);

            for pattern in &self.patterns {
                for caps in pattern.captures_iter(segment) {
                    let Some(condition) = resolve(&caps, &aliases, schema) else {
                        debug!(text = &caps[0], "unresolved join");
                        continue;
                    };
                    let duplicate = found.iter().any(|c| {
                        (c.left == condition.left && c.right == condition.right)
                            || (c.left == condition.right && c.right == condition.left)
                    });
                    if !duplicate {
                        found.push(condition);
                    }
                }
            }
        }

        found
    }
}

fn alias_map(segment: &str) -> HashMap<String, String> {
    let mut aliases = HashMap::new();
    for caps in ALIAS_CLAUSE.captures_iter(segment) {
        let table = caps[1].to_string();
        if NOT_AN_ALIAS.contains(&table.to_ascii_lowercase().as_str()) {
            continue;
        }
        if let Some(alias) = caps.get(2) {
            let alias = alias.as_str();
            if !NOT_AN_ALIAS.contains(&alias.to_ascii_lowercase().as_str()) {
                aliases.insert(alias.to_string(), table.clone());
            }
        }
        aliases.insert(table.clone(), table);
    }
    aliases
}

fn resolve(caps: &Captures, aliases: &HashMap<String, String>, schema: &Schema) -> Option<JoinCondition> {
    let mut local = aliases.clone();
    let joined = caps[1].to_string();
    if let Some(alias) = caps.get(2) {
        if !NOT_AN_ALIAS.contains(&alias.as_str().to_ascii_lowercase().as_str()) {
            local.insert(alias.as_str().to_string(), joined.clone());
        }
    }
    local.insert(joined.clone(), joined);

    let left = column_ref(&local, &caps[3], &caps[4], schema)?;
    let right = column_ref(&local, &caps[5], &caps[6], schema)?;
    if left == right {
        return None;
    }
    Some(JoinCondition { left, right })
}

fn column_ref(aliases: &HashMap<String, String>, alias: &str, column: &str, schema: &Schema) -> Option<ColumnRef> {
    let table_name = aliases
        .get(alias)
        .map(String::as_str)
        .or_else(|| schema.tables.contains_key(alias).then_some(alias))?;
    let table = schema.tables.get(table_name)?;
    let column = table
        .columns
        .keys()
        .find(|c| c.eq_ignore_ascii_case(column))?;
    Some(ColumnRef {
        table: table.name.clone(),
        column: column.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, Table};

    fn schema() -> Schema {
        Schema::new("shop")
            .with_table(
                Table::new("users")
                    .with_column(Column::new("id", "int"))
                    .with_column(Column::new("name", "varchar(50)"))
                    .with_primary_key(&["id"]),
            )
            .with_table(
                Table::new("orders")
                    .with_column(Column::new("id", "int"))
                    .with_column(Column::new("buyer", "int"))
                    .with_primary_key(&["id"]),
            )
            .with_table(
                Table::new("payments")
                    .with_column(Column::new("id", "int"))
                    .with_column(Column::new("order_ref", "int")),
            )
    }

    #[test]
    fn test_mine_aliased_joins() {
        let sql = "SELECT o.id, u.name FROM orders o INNER JOIN users AS u ON o.buyer = u.id WHERE u.id > 3;";
        let found = JoinMiner::default().mine(sql, &schema());

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].left.table, "orders");
        assert_eq!(found[0].left.column, "buyer");
        assert_eq!(found[0].right.table, "users");
        assert_eq!(found[0].right.column, "id");
    }

    #[test]
    fn test_mine_php_source_multiple_joins() {
        let php = r#"
            $sql = "SELECT * FROM payments p
                    LEFT OUTER JOIN orders ON orders.id = p.order_ref
                    JOIN users u ON u.id = orders.buyer";
            $db->query($sql);
        "#;
        let found = JoinMiner::default().mine(php, &schema());

        assert_eq!(found.len(), 2);
        assert!(found.iter().any(|c| c.left.table == "orders" && c.right.column == "order_ref"));
        assert!(found.iter().any(|c| c.left.table == "users" && c.right.column == "buyer"));
    }

    #[test]
    fn test_unknown_tables_and_columns_are_skipped() {
        let sql = "SELECT * FROM ghosts g JOIN users u ON g.user_id = u.id;
                   SELECT * FROM orders o JOIN users u ON o.missing = u.id;
                   SELECT * FROM orders o JOIN users u ON o.id = o.id";
        assert!(JoinMiner::default().mine(sql, &schema()).is_empty());
    }

    #[test]
    fn test_aliases_do_not_leak_between_statements() {
        let sql = "SELECT * FROM orders x JOIN users u ON x.buyer = u.id;
                   SELECT * FROM payments p JOIN users u ON x.order_ref = u.id;";
        let found = JoinMiner::default().mine(sql, &schema());
        assert_eq!(found.len(), 1);
    }
}
