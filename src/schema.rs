//! Schema model shared by every analysis stage.
//!
//! A `Schema` is produced by the dump parser and then passed by value
//! through the pipeline. Each stage clones what it receives and returns a
//! new annotated snapshot, so upstream snapshots are never mutated.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    pub name: String,
    pub tables: IndexMap<String, Table>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SchemaMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_at: Option<String>,
    pub table_count: usize,
    pub column_count: usize,
    pub foreign_key_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub name: String,
    pub columns: IndexMap<String, Column>,
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub indexes: Vec<Index>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub table_type: TableType,
    #[serde(default)]
    pub classification_reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debt_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    /// Type text as written in the dump, e.g. `varchar(255)` or `enum('a','b')`.
    pub data_type: String,
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub auto_increment: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    // Filled in by the analysis stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_postgres_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_prisma_type: Option<String>,
    #[serde(default)]
    pub is_implicit_foreign_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<ColumnRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_update: Option<String>,
}

/// Directed edge between two columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    pub source_table: String,
    pub source_column: String,
    pub target_table: String,
    pub target_column: String,
    pub cardinality: Cardinality,
    #[serde(default)]
    pub is_implicit: bool,
    #[serde(default)]
    pub detected_in_code: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Relation {
    /// True when both relations connect the same column pair in the same direction.
    pub fn same_edge(&self, other: &Relation) -> bool {
        self.source_table == other.source_table
            && self.source_column == other.source_column
            && self.target_table == other.target_table
            && self.target_column == other.target_column
    }

    /// The same edge seen from the target table.
    pub fn inverse(&self) -> Relation {
        Relation {
            source_table: self.target_table.clone(),
            source_column: self.target_column.clone(),
            target_table: self.source_table.clone(),
            target_column: self.source_column.clone(),
            cardinality: self.cardinality.inverse(),
            is_implicit: self.is_implicit,
            detected_in_code: self.detected_in_code,
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToOne,
}

impl Cardinality {
    pub fn inverse(self) -> Self {
        match self {
            Self::OneToOne => Self::OneToOne,
            Self::OneToMany => Self::ManyToOne,
            Self::ManyToOne => Self::OneToMany,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneToOne => "ONE_TO_ONE",
            Self::OneToMany => "ONE_TO_MANY",
            Self::ManyToOne => "MANY_TO_ONE",
        }
    }
}

/// Severity attached to analysis findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableType {
    BusinessCore,
    BusinessDetail,
    Junction,
    Technical,
    Metadata,
    Configuration,
    Audit,
    Cache,
    Reference,
    #[default]
    Unknown,
}

impl TableType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "business_core" => Some(Self::BusinessCore),
            "business_detail" => Some(Self::BusinessDetail),
            "junction" => Some(Self::Junction),
            "technical" => Some(Self::Technical),
            "metadata" => Some(Self::Metadata),
            "configuration" => Some(Self::Configuration),
            "audit" => Some(Self::Audit),
            "cache" => Some(Self::Cache),
            "reference" => Some(Self::Reference),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BusinessCore => "BUSINESS_CORE",
            Self::BusinessDetail => "BUSINESS_DETAIL",
            Self::Junction => "JUNCTION",
            Self::Technical => "TECHNICAL",
            Self::Metadata => "METADATA",
            Self::Configuration => "CONFIGURATION",
            Self::Audit => "AUDIT",
            Self::Cache => "CACHE",
            Self::Reference => "REFERENCE",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Insert a table keyed by its name, replacing any previous definition.
    pub fn add_table(&mut self, table: Table) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn with_table(mut self, table: Table) -> Self {
        self.add_table(table);
        self
    }

    pub fn column_count(&self) -> usize {
        self.tables.values().map(|t| t.columns.len()).sum()
    }

    pub fn foreign_key_count(&self) -> usize {
        self.tables.values().map(|t| t.foreign_keys.len()).sum()
    }

    /// Recompute the totals kept in `metadata`.
    pub fn refresh_metadata(&mut self) {
        let extracted_at = self.metadata.as_ref().and_then(|m| m.extracted_at.clone());
        self.metadata = Some(SchemaMetadata {
            extracted_at,
            table_count: self.tables.len(),
            column_count: self.column_count(),
            foreign_key_count: self.foreign_key_count(),
        });
    }
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn add_column(&mut self, column: Column) {
        self.columns.insert(column.name.clone(), column);
    }

    pub fn with_column(mut self, column: Column) -> Self {
        self.add_column(column);
        self
    }

    /// Set the primary key, flagging the listed columns as non-null key members.
    pub fn set_primary_key(&mut self, columns: Vec<String>) {
        for name in &columns {
            if let Some(col) = self.columns.get_mut(name) {
                col.primary_key = true;
                col.nullable = false;
            }
        }
        self.primary_key = columns;
    }

    pub fn with_primary_key(mut self, columns: &[&str]) -> Self {
        self.set_primary_key(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn with_foreign_key(mut self, columns: &[&str], table: &str, referenced: &[&str]) -> Self {
        self.foreign_keys.push(ForeignKey {
            name: None,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            referenced_table: table.to_string(),
            referenced_columns: referenced.iter().map(|c| c.to_string()).collect(),
            on_delete: None,
            on_update: None,
        });
        self
    }

    pub fn with_index(mut self, name: &str, columns: &[&str], unique: bool) -> Self {
        self.indexes.push(Index {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique,
        });
        self
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }

    /// Primary key columns, or `["id"]` when none are declared.
    pub fn key_columns(&self) -> Vec<String> {
        if self.primary_key.is_empty() {
            vec!["id".to_string()]
        } else {
            self.primary_key.clone()
        }
    }

    /// A column is unique when it is the sole primary key, carries an inline
    /// UNIQUE, or is covered by a single-column unique index.
    pub fn is_column_unique(&self, column: &str) -> bool {
        if self.primary_key.len() == 1 && self.primary_key[0] == column {
            return true;
        }
        if self.columns.get(column).is_some_and(|c| c.unique) {
            return true;
        }
        self.indexes
            .iter()
            .any(|idx| idx.unique && idx.columns.len() == 1 && idx.columns[0] == column)
    }

    pub fn is_indexed(&self, column: &str) -> bool {
        self.primary_key.iter().any(|c| c == column)
            || self.indexes.iter().any(|idx| idx.columns.iter().any(|c| c == column))
    }

    pub fn is_foreign_key_column(&self, column: &str) -> bool {
        self.foreign_keys
            .iter()
            .any(|fk| fk.columns.iter().any(|c| c == column))
    }

    pub fn has_relation(&self, relation: &Relation) -> bool {
        self.relations.iter().any(|r| r.same_edge(relation))
    }
}

impl Column {
    /// Nullable column with length/precision/scale read from the type text.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        let data_type = data_type.into();
        let (length, precision, scale) = type_arguments(&data_type);
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            length,
            precision,
            scale,
            ..Default::default()
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn with_default(mut self, value: &str) -> Self {
        self.default = Some(value.to_string());
        self
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }

    /// Uppercased type keyword without arguments or modifiers (`VARCHAR`, `INT`).
    pub fn base_type(&self) -> String {
        base_type(&self.data_type)
    }
}

pub fn base_type(data_type: &str) -> String {
    data_type
        .split(|c: char| c == '(' || c.is_whitespace())
        .next()
        .unwrap_or("")
        .to_ascii_uppercase()
}

/// Split `type(a,b)` arguments into `(length, precision, scale)`.
pub fn type_arguments(data_type: &str) -> (Option<u32>, Option<u32>, Option<u32>) {
    let Some(open) = data_type.find('(') else {
        return (None, None, None);
    };
    let Some(close) = data_type[open..].find(')') else {
        return (None, None, None);
    };
    let args: Vec<&str> = data_type[open + 1..open + close].split(',').map(str::trim).collect();

    match base_type(data_type).as_str() {
        "ENUM" | "SET" => (None, None, None),
        "DECIMAL" | "NUMERIC" | "DEC" | "FIXED" | "FLOAT" | "DOUBLE" | "REAL" => {
            let precision = args.first().and_then(|a| a.parse().ok());
            let scale = args.get(1).and_then(|a| a.parse().ok());
            (None, precision, scale)
        }
        _ => (args.first().and_then(|a| a.parse().ok()), None, None),
    }
}

/// Check that every foreign key points at an existing table and columns.
pub fn validate_schema(schema: &Schema) -> Vec<String> {
    let mut errors = Vec::new();

    for table in schema.tables.values() {
        for fk in &table.foreign_keys {
            let Some(target) = schema.tables.get(&fk.referenced_table) else {
                errors.push(format!(
                    "Table {}: foreign key ({}) references unknown table {}",
                    table.name,
                    fk.columns.join(", "),
                    fk.referenced_table
                ));
                continue;
            };
            for column in &fk.referenced_columns {
                if !target.columns.contains_key(column) {
                    errors.push(format!(
                        "Table {}: foreign key ({}) references unknown column {}.{}",
                        table.name,
                        fk.columns.join(", "),
                        fk.referenced_table,
                        column
                    ));
                }
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Table {
        Table::new("users")
            .with_column(Column::new("id", "int(11)").auto_increment())
            .with_column(Column::new("email", "varchar(255)").not_null())
            .with_primary_key(&["id"])
            .with_index("uniq_email", &["email"], true)
    }

    #[test]
    fn test_type_arguments() {
        assert_eq!(type_arguments("varchar(255)"), (Some(255), None, None));
        assert_eq!(type_arguments("DECIMAL(10, 2)"), (None, Some(10), Some(2)));
        assert_eq!(type_arguments("enum('a','b')"), (None, None, None));
        assert_eq!(type_arguments("text"), (None, None, None));
        assert_eq!(base_type("int(10) unsigned"), "INT");
    }

    #[test]
    fn test_primary_key_marks_columns() {
        let table = users();
        let id = &table.columns["id"];
        assert!(id.primary_key);
        assert!(!id.nullable);
        assert_eq!(table.key_columns(), vec!["id".to_string()]);
        assert_eq!(Table::new("t").key_columns(), vec!["id".to_string()]);
    }

    #[test]
    fn test_column_uniqueness() {
        let table = users();
        assert!(table.is_column_unique("id"));
        assert!(table.is_column_unique("email"));
        assert!(table.is_indexed("email"));

        let composite = Table::new("user_roles")
            .with_column(Column::new("user_id", "int"))
            .with_column(Column::new("role_id", "int"))
            .with_primary_key(&["user_id", "role_id"]);
        assert!(!composite.is_column_unique("user_id"));
        assert!(composite.is_indexed("role_id"));
    }

    #[test]
    fn test_relation_inverse() {
        let rel = Relation {
            source_table: "orders".to_string(),
            source_column: "user_id".to_string(),
            target_table: "users".to_string(),
            target_column: "id".to_string(),
            cardinality: Cardinality::ManyToOne,
            is_implicit: true,
            detected_in_code: false,
            name: None,
        };
        let inv = rel.inverse();
        assert_eq!(inv.source_table, "users");
        assert_eq!(inv.target_column, "user_id");
        assert_eq!(inv.cardinality, Cardinality::OneToMany);
        assert!(rel.same_edge(&inv.inverse()));
    }

    #[test]
    fn test_validate_schema() {
        let orders = Table::new("orders")
            .with_column(Column::new("id", "int"))
            .with_column(Column::new("user_id", "int"))
            .with_foreign_key(&["user_id"], "users", &["id"]);
        let schema = Schema::new("shop").with_table(users()).with_table(orders.clone());
        assert!(validate_schema(&schema).is_empty());

        let broken = Schema::new("shop").with_table(orders);
        let errors = validate_schema(&broken);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("unknown table users"));

        let bad_column = Schema::new("shop").with_table(users()).with_table(
            Table::new("orders")
                .with_column(Column::new("user_id", "int"))
                .with_foreign_key(&["user_id"], "users", &["uuid"]),
        );
        assert!(validate_schema(&bad_column)[0].contains("users.uuid"));
    }

    #[test]
    fn test_table_type_names() {
        assert_eq!(TableType::from_str("business-core"), Some(TableType::BusinessCore));
        assert_eq!(TableType::Junction.as_str(), "JUNCTION");
        assert_eq!(TableType::default(), TableType::Unknown);
        let json = serde_json::to_string(&TableType::BusinessDetail).unwrap();
        assert_eq!(json, "\"BUSINESS_DETAIL\"");
    }
}
