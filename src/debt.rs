//! Technical-debt scoring.
//!
//! Every table starts at 100. Penalties come from the table name, the share
//! of nullable columns and the share of column-level findings. Scores are
//! rounded and clamped to `0..=100`.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::naming::snake_case;
use crate::schema::{Column, Schema, Severity, Table};
use crate::types::enum_values;

const BAD_PREFIXES: &[&str] = &["z_", "old_", "tmp_", "temp_", "unused_", "test_", "obsolete_"];
const BAD_SUFFIXES: &[&str] = &["_old", "_tmp", "_temp", "_bak", "_backup", "_test", "_obsolete", "_unused"];
const GENERIC_NAMES: &[&str] = &["data", "value", "val", "field", "column", "param", "info", "misc", "stuff"];
const OBSOLETE_COLUMNS: &[&str] = &[
    "user_modif",
    "modified_by",
    "created_by",
    "last_seen",
    "create_time",
    "update_time",
    "last_update",
    "temp_id",
    "tmp_value",
    "old_status",
];

static SNAKE_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").unwrap());
static NUMBERED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([a-z_]+)(\d+)$").unwrap());
static ABBREVIATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z]{1,2}\d*$").unwrap());
static LARGE_TYPE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)text|blob").unwrap());
static DATE_TYPE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)date|time").unwrap());

static REQUIRED_NAMES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^is_",
        r"status$",
        r"type$",
        r"^(created|updated|modified)_(at|on|date)$",
        r"^date_",
        r"^(active|deleted|enabled|visible)$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DebtIssueKind {
    TableNaming,
    NullableOveruse,
    Naming,
    ObsoleteColumn,
    LargeUnindexed,
    DateUnindexed,
    ExcessiveLength,
    SmallEnum,
    UnnecessaryNull,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebtFlag {
    pub table_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_name: Option<String>,
    #[serde(rename = "type")]
    pub kind: DebtIssueKind,
    pub severity: Severity,
    pub description: String,
    pub impact: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebtScore {
    pub table_name: String,
    pub score: u8,
    /// At most three, in detection order.
    pub main_issues: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRenamingSuggestion {
    pub table_name: String,
    pub column_name: String,
    pub suggested_name: String,
    pub reason: String,
    pub column_type: String,
}

#[derive(Debug, Clone)]
pub struct DebtAnalysis {
    /// Input schema with `debt_score` set on every table.
    pub schema: Schema,
    pub scores: Vec<DebtScore>,
    pub renamings: Vec<FieldRenamingSuggestion>,
    pub flags: Vec<DebtFlag>,
}

struct ColumnIssue {
    kind: DebtIssueKind,
    severity: Severity,
    description: String,
    impact: &'static str,
    rename: Option<String>,
}

impl ColumnIssue {
    fn new(kind: DebtIssueKind, severity: Severity, description: String, impact: &'static str) -> Self {
        Self {
            kind,
            severity,
            description,
            impact,
            rename: None,
        }
    }
}

/// Name lists the scorer penalizes.
#[derive(Debug, Clone)]
pub struct DebtRules {
    pub bad_prefixes: Vec<String>,
    pub bad_suffixes: Vec<String>,
    pub generic_names: Vec<String>,
    pub obsolete_columns: Vec<String>,
}

impl Default for DebtRules {
    fn default() -> Self {
        let owned = |list: &[&str]| -> Vec<String> { list.iter().map(|s| s.to_string()).collect() };
        Self {
            bad_prefixes: owned(BAD_PREFIXES),
            bad_suffixes: owned(BAD_SUFFIXES),
            generic_names: owned(GENERIC_NAMES),
            obsolete_columns: owned(OBSOLETE_COLUMNS),
        }
    }
}

impl DebtRules {
    fn bad_prefix(&self, name: &str) -> Option<&str> {
        self.bad_prefixes.iter().find(|p| name.starts_with(p.as_str())).map(String::as_str)
    }

    fn bad_suffix(&self, name: &str) -> Option<&str> {
        self.bad_suffixes.iter().find(|s| name.ends_with(s.as_str())).map(String::as_str)
    }

    fn is_generic(&self, name: &str) -> bool {
        self.generic_names.iter().any(|g| g == name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DebtScorer {
    rules: DebtRules,
}

impl DebtScorer {
    pub fn new(rules: DebtRules) -> Self {
        Self { rules }
    }

    pub fn score(&self, schema: &Schema) -> DebtAnalysis {
        let mut scored = schema.clone();
        let mut scores = Vec::new();
        let mut renamings = Vec::new();
        let mut flags = Vec::new();

        for table in scored.tables.values_mut() {
            let score = self.score_table(table, &mut renamings, &mut flags);
            debug!(table = %table.name, score = score.score, "debt score");
            table.debt_score = Some(score.score);
            scores.push(score);
        }

        info!(tables = scores.len(), flags = flags.len(), renamings = renamings.len(), "debt scoring done");
        DebtAnalysis {
            schema: scored,
            scores,
            renamings,
            flags,
        }
    }

    fn score_table(
        &self,
        table: &Table,
        renamings: &mut Vec<FieldRenamingSuggestion>,
        flags: &mut Vec<DebtFlag>,
    ) -> DebtScore {
        let mut score = 100.0;
        let mut issues = Vec::new();

        let name_score = self.table_name_score(&table.name);
        if name_score < 100 {
            score -= f64::from(100 - name_score) * 0.2;
            issues.push(format!("Table naming: {}/100 penalty", 100 - name_score));
            flags.push(DebtFlag {
                table_name: table.name.clone(),
                column_name: None,
                kind: DebtIssueKind::TableNaming,
                severity: if name_score < 50 { Severity::High } else { Severity::Medium },
                description: format!("Table name is not descriptive: {}", table.name),
                impact: "Harder to read and maintain the code using it".to_string(),
            });
        }

        let nullable = nullable_percentage(table);
        if nullable > 50.0 {
            score -= (nullable - 50.0) * 0.4;
            issues.push(format!("NULL overuse: {nullable:.0}% of columns are nullable"));
            flags.push(DebtFlag {
                table_name: table.name.clone(),
                column_name: None,
                kind: DebtIssueKind::NullableOveruse,
                severity: if nullable > 75.0 { Severity::High } else { Severity::Medium },
                description: format!("{nullable:.0}% of columns are nullable"),
                impact: "More NULL-related bugs and weaker data integrity".to_string(),
            });
        }

        let mut findings = 0usize;
        for column in table.columns.values() {
            for issue in self.column_issues(table, column) {
                if let Some(suggested) = issue.rename {
                    renamings.push(FieldRenamingSuggestion {
                        table_name: table.name.clone(),
                        column_name: column.name.clone(),
                        suggested_name: suggested,
                        reason: issue.description.clone(),
                        column_type: column.data_type.clone(),
                    });
                }
                flags.push(DebtFlag {
                    table_name: table.name.clone(),
                    column_name: Some(column.name.clone()),
                    kind: issue.kind,
                    severity: issue.severity,
                    description: issue.description,
                    impact: issue.impact.to_string(),
                });
                findings += 1;
            }
        }

        if !table.columns.is_empty() {
            let share = findings as f64 / table.columns.len() as f64 * 100.0;
            score -= share * 0.6;
            if share > 0.0 {
                issues.push(format!("{share:.1}% column findings"));
            }
        }

        issues.truncate(3);
        DebtScore {
            table_name: table.name.clone(),
            score: score.clamp(0.0, 100.0).round() as u8,
            main_issues: issues,
        }
    }

    /// Name quality from 0 to 100.
    pub fn table_name_score(&self, name: &str) -> u8 {
        let mut score: i32 = 100;
        let length = name.chars().count();
        if length < 3 {
            score -= 30;
        } else if length > 30 {
            score -= 20;
        }
        if self.rules.bad_prefix(name).is_some() {
            score -= 40;
        }
        if self.rules.bad_suffix(name).is_some() {
            score -= 40;
        }
        if self.rules.is_generic(name) {
            score -= 50;
        }
        if name.chars().any(|c| c.is_ascii_digit()) {
            score -= 20;
        }
        if !SNAKE_NAME.is_match(name) {
            score -= 15;
        }
        score.max(0) as u8
    }

    fn column_issues(&self, table: &Table, column: &Column) -> Vec<ColumnIssue> {
        let name = column.name.as_str();
        let indexed = table.is_indexed(name);
        let mut issues = Vec::new();

        if let Some((reason, suggestion)) = self.rename_suggestion(name) {
            let mut issue = ColumnIssue::new(
                DebtIssueKind::Naming,
                Severity::Medium,
                format!("Problematic column name: {reason}"),
                "Harder to read and maintain the code using it",
            );
            issue.rename = Some(suggestion);
            issues.push(issue);
        }

        if self.rules.obsolete_columns.iter().any(|c| c == name) {
            issues.push(ColumnIssue::new(
                DebtIssueKind::ObsoleteColumn,
                Severity::Medium,
                "Column is probably obsolete".to_string(),
                "Adds complexity and storage without a use",
            ));
        }

        if LARGE_TYPE.is_match(&column.data_type) && !indexed {
            issues.push(ColumnIssue::new(
                DebtIssueKind::LargeUnindexed,
                Severity::Low,
                format!("Large type ({}) without an index", column.data_type),
                "Frequent queries on it may be slow",
            ));
        }

        if DATE_TYPE.is_match(&column.data_type) && !indexed && (name.contains("date") || name.contains("time")) {
            issues.push(ColumnIssue::new(
                DebtIssueKind::DateUnindexed,
                Severity::Low,
                "Date/time column without an index".to_string(),
                "Time range queries and chronological sorts may be slow",
            ));
        }

        if column.base_type() == "VARCHAR" {
            if let Some(length) = column.length.filter(|l| *l > 255) {
                issues.push(ColumnIssue::new(
                    DebtIssueKind::ExcessiveLength,
                    Severity::Medium,
                    format!("Excessive length for VARCHAR({length})"),
                    "Wasted space and possibly slower queries",
                ));
            }
        }

        if column.base_type() == "ENUM" {
            let values = enum_values(&column.data_type).unwrap_or_default();
            if values.len() <= 2 {
                issues.push(ColumnIssue::new(
                    DebtIssueKind::SmallEnum,
                    Severity::Low,
                    format!("Enumeration with only {} values", values.len()),
                    "A boolean flag is probably a better fit",
                ));
            }
        }

        if column.nullable && REQUIRED_NAMES.iter().any(|re| re.is_match(name)) {
            issues.push(ColumnIssue::new(
                DebtIssueKind::UnnecessaryNull,
                Severity::Medium,
                "Column should probably be NOT NULL".to_string(),
                "Risk of inconsistent data and bugs",
            ));
        }

        issues
    }

    /// Reason and replacement for a problematic column name.
    pub fn rename_suggestion(&self, name: &str) -> Option<(&'static str, String)> {
        if name.chars().count() <= 1 {
            return Some(("name too short", format!("{name}_value")));
        }
        if let Some(prefix) = self.rules.bad_prefix(name) {
            return Some(("prefix suggests a temporary column", stripped_or(&name[prefix.len()..], name)));
        }
        if let Some(suffix) = self.rules.bad_suffix(name) {
            return Some((
                "suffix suggests a temporary column",
                stripped_or(&name[..name.len() - suffix.len()], name),
            ));
        }
        if self.rules.is_generic(name) {
            return Some(("name too generic", format!("specific_{name}")));
        }
        if let Some(caps) = NUMBERED.captures(name) {
            return Some((
                "numbered name",
                format!("{}_item_{}", caps[1].trim_end_matches('_'), &caps[2]),
            ));
        }
        if ABBREVIATION.is_match(name) && name != "id" {
            return Some(("abbreviation too short", format!("expanded_{name}")));
        }
        if !SNAKE_NAME.is_match(name) {
            if name.chars().any(|c| c.is_ascii_uppercase()) {
                return Some(("camelCase instead of snake_case", snake_case(name)));
            }
            let cleaned: String = name
                .to_ascii_lowercase()
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
                .collect();
            return Some(("inconsistent naming convention", cleaned));
        }
        None
    }
}

// Nothing left after stripping keeps the original name.
fn stripped_or(stripped: &str, name: &str) -> String {
    if stripped.is_empty() { name } else { stripped }.to_string()
}

fn nullable_percentage(table: &Table) -> f64 {
    if table.columns.is_empty() {
        return 0.0;
    }
    let nullable = table.columns.values().filter(|c| c.nullable).count();
    nullable as f64 / table.columns.len() as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> DebtScorer {
        DebtScorer::default()
    }

    #[test]
    fn test_table_name_score() {
        let s = scorer();
        assert_eq!(s.table_name_score("users"), 100);
        // bad prefix, digit
        assert_eq!(s.table_name_score("tmp_cache_1"), 40);
        assert_eq!(s.table_name_score("data"), 50);
        assert_eq!(s.table_name_score("Ab"), 55);
        assert_eq!(s.table_name_score("old_data_tmp"), 20);
        assert_eq!(s.table_name_score("z_1_tmp"), 0);
    }

    #[test]
    fn test_rename_suggestions() {
        let s = scorer();
        let renamed = |n: &str| s.rename_suggestion(n).map(|(_, r)| r);

        assert_eq!(renamed("x"), Some("x_value".to_string()));
        assert_eq!(renamed("old_price"), Some("price".to_string()));
        assert_eq!(renamed("price_bak"), Some("price".to_string()));
        assert_eq!(renamed("tmp_"), Some("tmp_".to_string()));
        assert_eq!(renamed("misc"), Some("specific_misc".to_string()));
        assert_eq!(renamed("phone2"), Some("phone_item_2".to_string()));
        assert_eq!(renamed("qt"), Some("expanded_qt".to_string()));
        assert_eq!(renamed("userName"), Some("user_name".to_string()));
        assert_eq!(renamed("unit-price"), Some("unit_price".to_string()));
        assert_eq!(renamed("email"), None);
        assert_eq!(renamed("id"), None);
    }

    #[test]
    fn test_technical_table_scores_below_clean_table() {
        let schema = Schema::new("s")
            .with_table(
                Table::new("users")
                    .with_column(Column::new("id", "int").auto_increment())
                    .with_column(Column::new("email", "varchar(255)").not_null())
                    .with_primary_key(&["id"]),
            )
            .with_table(
                Table::new("tmp_cache_1")
                    .with_column(Column::new("k", "varchar(64)"))
                    .with_column(Column::new("v", "text")),
            );
        let analysis = scorer().score(&schema);

        assert_eq!(analysis.scores[0].score, 100);
        assert!(analysis.scores[0].main_issues.is_empty());

        let tmp = &analysis.scores[1];
        assert!(tmp.score < 100);
        assert!(tmp.main_issues.len() <= 3);
        assert_eq!(analysis.schema.tables["tmp_cache_1"].debt_score, Some(tmp.score));

        assert!(analysis.flags.iter().any(|f| f.kind == DebtIssueKind::TableNaming && f.severity == Severity::High));
        assert!(analysis.flags.iter().any(|f| f.kind == DebtIssueKind::NullableOveruse));
        assert!(analysis.flags.iter().any(|f| f.kind == DebtIssueKind::LargeUnindexed));
        assert_eq!(analysis.renamings.len(), 2);
    }

    #[test]
    fn test_column_checks() {
        let table = Table::new("orders")
            .with_column(Column::new("id", "int"))
            .with_column(Column::new("order_status", "varchar(20)"))
            .with_column(Column::new("notes", "varchar(1000)").not_null())
            .with_column(Column::new("delivery_date", "datetime").not_null())
            .with_column(Column::new("paid", "enum('Y','N')").not_null())
            .with_column(Column::new("created_by", "int").not_null())
            .with_primary_key(&["id"]);
        let s = scorer();
        let kinds = |c: &str| -> Vec<DebtIssueKind> {
            s.column_issues(&table, &table.columns[c]).into_iter().map(|i| i.kind).collect()
        };

        assert!(kinds("id").is_empty());
        assert_eq!(kinds("order_status"), vec![DebtIssueKind::UnnecessaryNull]);
        assert_eq!(kinds("notes"), vec![DebtIssueKind::ExcessiveLength]);
        assert_eq!(kinds("delivery_date"), vec![DebtIssueKind::DateUnindexed]);
        assert_eq!(kinds("paid"), vec![DebtIssueKind::SmallEnum]);
        assert_eq!(kinds("created_by"), vec![DebtIssueKind::ObsoleteColumn]);
    }

    #[test]
    fn test_scores_stay_in_range() {
        let mut table = Table::new("z_x1");
        for name in ["a", "b", "c", "data", "tmp_v"] {
            table.add_column(Column::new(name, "longtext"));
        }
        let analysis = scorer().score(&Schema::new("s").with_table(table));
        assert_eq!(analysis.scores[0].score, 0);
    }
}
