//! Table classification.
//!
//! A table is typed by the first matching name rule; failing that by its
//! structure (foreign key density, audit columns, technical vocabulary);
//! failing that by the configured fallback. A second pass looks at the
//! foreign key graph and promotes heavily referenced tables.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

use crate::schema::{Schema, Table, TableType};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Type given to tables no rule recognises.
    pub fallback: TableType,
    /// Incoming foreign keys needed to promote a table to BUSINESS_CORE.
    pub incoming_fk_threshold: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            fallback: TableType::Unknown,
            incoming_fk_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub table_type: TableType,
    pub reason: String,
}

pub trait TableClassifier {
    fn classify_table(&self, table: &Table) -> Classification;
}

/// Table-name pattern mapped to a type. Rules are tried in order.
#[derive(Debug, Clone)]
pub struct NameRule {
    pub table_type: TableType,
    pub pattern: Regex,
}

impl NameRule {
    pub fn new(pattern: &str, table_type: TableType) -> Result<Self, regex::Error> {
        Ok(Self {
            table_type,
            pattern: Regex::new(&format!("(?i){pattern}"))?,
        })
    }
}

const NAME_PATTERNS: &[(&str, TableType)] = &[
    (
        r"^(users?|customers?|clients?|accounts?|products?|orders?|invoices?|compan(y|ies)|employees?|members?|articles?|projects?|contracts?|suppliers?|vendors?|stores?|shops?)$",
        TableType::BusinessCore,
    ),
    (
        r"^(order|invoice|cart|product|customer|user|account|contract|client)s?_(items?|lines?|details?|address(es)?|variants?|profiles?|contacts?|payments?)$",
        TableType::BusinessDetail,
    ),
    (r"_(has|to|x)_|_(map|mapping|link|links|rel|assoc|pivot)$", TableType::Junction),
    (r"(^|_)(audit|audits|log|logs|history|histories|journal|changelog|trail)(_|$)", TableType::Audit),
    (
        r"^(tmp|temp|bak|backup|old|z|sys|system|migrations?|sessions?|queue|jobs?|failed_jobs|password_resets|phinxlog|sequences?)(_|$)",
        TableType::Technical,
    ),
    (r"(^|_)(cache|caches|cached)(_|$)", TableType::Cache),
    (
        r"(^|_)(config|configs|configuration|settings?|options?|preferences?|parameters?|params)(_|$)",
        TableType::Configuration,
    ),
    (r"(^|_)(meta|metadata|types|categories|statuses|kinds|tags)$", TableType::Metadata),
    (
        r"^(ref|lookup|lkp|enum)_|(^|_)(countries|country|currenc(y|ies)|languages?|locales?|regions?|cities|timezones?|units?)$",
        TableType::Reference,
    ),
];

static DEFAULT_NAME_RULES: LazyLock<Vec<NameRule>> = LazyLock::new(|| {
    NAME_PATTERNS
        .iter()
        .map(|(pattern, table_type)| NameRule::new(pattern, *table_type).unwrap())
        .collect()
});

static AUDIT_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(created|updated|modified|deleted)(_at|_on|_date|_time)?$|^date_(creation|modification|update)$").unwrap()
});
static NAME_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(^|_)(name|title|label|firstname|lastname)$").unwrap());
static STATUS_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(^|_)(status|state)$").unwrap());

const TECHNICAL_KEYWORDS: &[&str] = &[
    "tmp", "temp", "cache", "log", "session", "token", "hash", "checksum", "serialized", "payload",
    "queue", "lock", "migration", "debug", "internal", "technical", "system",
];

pub struct RuleClassifier {
    name_rules: Vec<NameRule>,
    config: ClassifierConfig,
}

impl Default for RuleClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

impl RuleClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            name_rules: DEFAULT_NAME_RULES.clone(),
            config,
        }
    }

    /// Replace the name rule table.
    pub fn with_name_rules(mut self, rules: Vec<NameRule>) -> Self {
        self.name_rules = rules;
        self
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify every table of the schema, including the incoming-key pass.
    pub fn classify(&self, schema: &Schema) -> Schema {
        classify_schema(self, schema, self.config.incoming_fk_threshold)
    }

    fn by_name(&self, table: &Table) -> Option<Classification> {
        self.name_rules
            .iter()
            .find(|rule| rule.pattern.is_match(&table.name))
            .map(|rule| Classification {
                table_type: rule.table_type,
                reason: format!("name matches {} pattern", rule.table_type.as_str()),
            })
    }

    fn by_structure(&self, table: &Table) -> Option<Classification> {
        let column_count = table.columns.len();
        if column_count == 0 {
            return None;
        }

        let fk_columns: HashSet<&str> = table
            .foreign_keys
            .iter()
            .flat_map(|fk| fk.columns.iter().map(String::as_str))
            .collect();
        let fk_ratio = fk_columns.len() as f64 / column_count as f64;
        if column_count <= 4 && table.foreign_keys.len() >= 2 && fk_ratio >= 0.5 {
            return Some(Classification {
                table_type: TableType::Junction,
                reason: format!(
                    "{} columns, {} foreign keys covering {:.0}% of columns",
                    column_count,
                    table.foreign_keys.len(),
                    fk_ratio * 100.0
                ),
            });
        }

        let names: Vec<&str> = table.columns.keys().map(String::as_str).collect();
        let has_audit = names.iter().any(|n| AUDIT_TIMESTAMP.is_match(n));
        let has_name = names.iter().any(|n| NAME_LIKE.is_match(n));
        let has_status = names.iter().any(|n| STATUS_LIKE.is_match(n));
        if column_count >= 4 && has_audit && (has_name || has_status) {
            return Some(Classification {
                table_type: TableType::BusinessCore,
                reason: "audit timestamps with a name or status column".to_string(),
            });
        }

        let comment = table.comment.as_deref().unwrap_or("").to_lowercase();
        if let Some(keyword) = TECHNICAL_KEYWORDS.iter().find(|k| comment.contains(*k)) {
            return Some(Classification {
                table_type: TableType::Technical,
                reason: format!("table comment mentions '{keyword}'"),
            });
        }

        let technical = names
            .iter()
            .filter(|n| {
                let lower = n.to_lowercase();
                TECHNICAL_KEYWORDS.iter().any(|k| lower.contains(k))
            })
            .count();
        let technical_ratio = technical as f64 / column_count as f64;
        if technical_ratio >= 0.4 {
            return Some(Classification {
                table_type: TableType::Technical,
                reason: format!("{:.0}% of column names are technical", technical_ratio * 100.0),
            });
        }

        None
    }
}

impl TableClassifier for RuleClassifier {
    fn classify_table(&self, table: &Table) -> Classification {
        self.by_name(table)
            .or_else(|| self.by_structure(table))
            .unwrap_or_else(|| Classification {
                table_type: self.config.fallback,
                reason: "no rule matched".to_string(),
            })
    }
}

/// Classify each table, then promote by incoming foreign keys.
///
/// The promotion pass reads a snapshot of the first pass, never the types
/// already stored on the input, so reclassifying gives the same result.
pub fn classify_schema(classifier: &impl TableClassifier, schema: &Schema, incoming_fk_threshold: usize) -> Schema {
    let first_pass: HashMap<&str, Classification> = schema
        .tables
        .values()
        .map(|t| (t.name.as_str(), classifier.classify_table(t)))
        .collect();

    let mut incoming: HashMap<&str, usize> = HashMap::new();
    for table in schema.tables.values() {
        for fk in &table.foreign_keys {
            if fk.referenced_table != table.name {
                *incoming.entry(fk.referenced_table.as_str()).or_default() += 1;
            }
        }
    }

    let mut result = schema.clone();
    for table in result.tables.values_mut() {
        let Some(first) = first_pass.get(table.name.as_str()) else {
            continue;
        };
        let mut classification = first.clone();
        let referenced_by = incoming.get(table.name.as_str()).copied().unwrap_or(0);

        if matches!(classification.table_type, TableType::Unknown | TableType::BusinessDetail)
            && referenced_by >= incoming_fk_threshold
        {
            classification = Classification {
                table_type: TableType::BusinessCore,
                reason: format!("referenced by {referenced_by} foreign keys"),
            };
        } else if classification.table_type == TableType::Unknown {
            let metadata_target = table.foreign_keys.iter().find(|fk| {
                first_pass
                    .get(fk.referenced_table.as_str())
                    .is_some_and(|c| c.table_type == TableType::Metadata)
            });
            if let Some(fk) = metadata_target {
                classification = Classification {
                    table_type: TableType::BusinessDetail,
                    reason: format!("references metadata table {}", fk.referenced_table),
                };
            }
        }

        debug!(table = %table.name, table_type = classification.table_type.as_str(), reason = %classification.reason, "classified");
        table.table_type = classification.table_type;
        table.classification_reason = classification.reason;
    }

    info!(tables = result.tables.len(), "classification done");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;

    fn table(name: &str, columns: &[&str]) -> Table {
        columns
            .iter()
            .fold(Table::new(name), |t, c| t.with_column(Column::new(*c, "int")))
    }

    fn type_of(classifier: &RuleClassifier, t: &Table) -> TableType {
        classifier.classify_table(t).table_type
    }

    #[test]
    fn test_name_rules_first_match_wins() {
        let c = RuleClassifier::default();
        assert_eq!(type_of(&c, &table("users", &["id"])), TableType::BusinessCore);
        assert_eq!(type_of(&c, &table("order_items", &["id"])), TableType::BusinessDetail);
        assert_eq!(type_of(&c, &table("user_has_roles", &["id"])), TableType::Junction);
        assert_eq!(type_of(&c, &table("login_history", &["id"])), TableType::Audit);
        assert_eq!(type_of(&c, &table("app_settings", &["id"])), TableType::Configuration);
        assert_eq!(type_of(&c, &table("countries", &["id"])), TableType::Reference);
        assert_eq!(type_of(&c, &table("product_types", &["id"])), TableType::Metadata);
        // technical prefix is tried before the cache rule
        assert_eq!(type_of(&c, &table("tmp_cache_1", &["id"])), TableType::Technical);
        assert_eq!(type_of(&c, &table("page_cache", &["id"])), TableType::Cache);
    }

    #[test]
    fn test_structural_junction() {
        let t = table("enrolment", &["student_id", "course_id", "grade"])
            .with_foreign_key(&["student_id"], "students", &["id"])
            .with_foreign_key(&["course_id"], "courses", &["id"]);
        let c = RuleClassifier::default();
        assert_eq!(type_of(&c, &t), TableType::Junction);
    }

    #[test]
    fn test_structural_business() {
        let t = table("widget", &["id", "title", "price", "created_at"]);
        let c = RuleClassifier::default();
        assert_eq!(type_of(&c, &t), TableType::BusinessCore);

        // three columns is not enough
        let t = table("gizmo", &["id", "title", "created_at"]);
        assert_eq!(type_of(&c, &t), TableType::Unknown);
    }

    #[test]
    fn test_structural_technical() {
        let c = RuleClassifier::default();
        let t = table("blob_store", &["id", "payload", "checksum", "size"]);
        assert_eq!(type_of(&c, &t), TableType::Technical);

        let t = table("things", &["id", "a"]).with_comment("Internal bookkeeping");
        assert_eq!(type_of(&c, &t), TableType::Technical);
    }

    #[test]
    fn test_configurable_fallback() {
        let c = RuleClassifier::new(ClassifierConfig {
            fallback: TableType::BusinessCore,
            ..Default::default()
        });
        assert_eq!(type_of(&c, &table("gadget", &["id"])), TableType::BusinessCore);
    }

    #[test]
    fn test_incoming_foreign_keys_promote() {
        let mut schema = Schema::new("s").with_table(table("widget", &["id"]));
        for name in ["a_things", "b_things", "c_things"] {
            schema.add_table(table(name, &["id", "widget_id"]).with_foreign_key(&["widget_id"], "widget", &["id"]));
        }
        schema.add_table(table("product_types", &["id"]));
        schema.add_table(
            table("gadget", &["id", "type_id"]).with_foreign_key(&["type_id"], "product_types", &["id"]),
        );

        let classified = RuleClassifier::default().classify(&schema);
        assert_eq!(classified.tables["widget"].table_type, TableType::BusinessCore);
        assert!(classified.tables["widget"].classification_reason.contains("3 foreign keys"));
        assert_eq!(classified.tables["gadget"].table_type, TableType::BusinessDetail);
        assert_eq!(classified.tables["a_things"].table_type, TableType::Unknown);
    }

    #[test]
    fn test_classification_is_idempotent() {
        let schema = Schema::new("s")
            .with_table(table("users", &["id"]))
            .with_table(table("widget", &["id"]))
            .with_table(table("tmp_x", &["id"]));
        let c = RuleClassifier::default();
        let once = c.classify(&schema);
        let twice = c.classify(&once);
        for (name, t) in &once.tables {
            assert_eq!(t.table_type, twice.tables[name].table_type);
        }
    }
}
