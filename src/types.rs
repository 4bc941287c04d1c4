//! MySQL to PostgreSQL / Prisma type mapping.
//!
//! Mappings live in an ordered rule table. Each rule lists its candidate
//! mappings in priority order; the first one whose predicate accepts the
//! column wins, and a mapping without a predicate is the fallback.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::schema::{Column, Schema};

pub struct TypeMapping {
    pub postgres: &'static str,
    pub prisma: &'static str,
    pub when: Option<fn(&Column) -> bool>,
    pub note: Option<&'static str>,
}

pub struct TypeRule {
    pub sources: &'static [&'static str],
    pub mappings: &'static [TypeMapping],
}

const fn map(postgres: &'static str, prisma: &'static str) -> TypeMapping {
    TypeMapping { postgres, prisma, when: None, note: None }
}

const fn map_if(postgres: &'static str, prisma: &'static str, when: fn(&Column) -> bool) -> TypeMapping {
    TypeMapping { postgres, prisma, when: Some(when), note: None }
}

const fn map_noted(postgres: &'static str, prisma: &'static str, note: &'static str) -> TypeMapping {
    TypeMapping { postgres, prisma, when: None, note: Some(note) }
}

/// Prisma type marker for columns that should become an enum.
pub const ENUM_MARKER: &str = "enum";

pub static TYPE_RULES: &[TypeRule] = &[
    TypeRule {
        sources: &["TINYINT"],
        mappings: &[map_if("BOOLEAN", "Boolean", is_flag), map("SMALLINT", "Int")],
    },
    TypeRule { sources: &["SMALLINT"], mappings: &[map("SMALLINT", "Int")] },
    TypeRule { sources: &["MEDIUMINT", "INT", "INTEGER"], mappings: &[map("INTEGER", "Int")] },
    TypeRule { sources: &["BIGINT"], mappings: &[map("BIGINT", "BigInt")] },
    TypeRule {
        sources: &["FLOAT"],
        mappings: &[map_noted("REAL", "Float", "floating point precision may differ")],
    },
    TypeRule {
        sources: &["DOUBLE", "REAL"],
        mappings: &[map_noted("DOUBLE PRECISION", "Float", "floating point precision may differ")],
    },
    TypeRule { sources: &["DECIMAL", "DEC", "FIXED"], mappings: &[map("DECIMAL", "Decimal")] },
    TypeRule { sources: &["NUMERIC"], mappings: &[map("NUMERIC", "Decimal")] },
    TypeRule { sources: &["CHAR"], mappings: &[map("CHAR", "String")] },
    TypeRule {
        sources: &["VARCHAR"],
        mappings: &[
            map_if("VARCHAR", ENUM_MARKER, is_enum_candidate),
            map_if("TEXT", "String", is_long_varchar),
            map("VARCHAR", "String"),
        ],
    },
    TypeRule {
        sources: &["TINYTEXT", "TEXT", "MEDIUMTEXT", "LONGTEXT"],
        mappings: &[map("TEXT", "String")],
    },
    TypeRule {
        sources: &["BINARY", "VARBINARY", "TINYBLOB", "BLOB", "MEDIUMBLOB", "LONGBLOB"],
        mappings: &[map("BYTEA", "Bytes")],
    },
    TypeRule { sources: &["DATE"], mappings: &[map("DATE", "DateTime")] },
    TypeRule { sources: &["DATETIME", "TIMESTAMP"], mappings: &[map("TIMESTAMP", "DateTime")] },
    TypeRule { sources: &["TIME"], mappings: &[map("TIME", "DateTime")] },
    TypeRule {
        sources: &["YEAR"],
        mappings: &[map_noted("SMALLINT", "Int", "PostgreSQL has no YEAR type")],
    },
    TypeRule { sources: &["JSON"], mappings: &[map("JSONB", "Json")] },
    TypeRule { sources: &["ENUM"], mappings: &[map("TEXT", ENUM_MARKER)] },
    TypeRule {
        sources: &["SET"],
        mappings: &[map_noted("TEXT[]", "String[]", "SET values become a text array")],
    },
    TypeRule {
        sources: &["BIT"],
        mappings: &[map_if("BOOLEAN", "Boolean", is_single_bit), map("BIT VARYING", "String")],
    },
    TypeRule { sources: &["BOOL", "BOOLEAN"], mappings: &[map("BOOLEAN", "Boolean")] },
    TypeRule { sources: &["UUID"], mappings: &[map("UUID", "String")] },
    TypeRule {
        sources: &["GEOMETRY", "POINT", "POLYGON", "LINESTRING"],
        mappings: &[map_noted("GEOMETRY", "Unsupported(\"geometry\")", "requires the PostGIS extension")],
    },
];

static BOOLEAN_COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(bool|boolean|flag)\b|yes\s*/\s*no|true\s*/\s*false|\b0\s*/\s*1\b").unwrap()
});

static ENUM_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\benum\s*\(").unwrap());

static COMMENT_VALUES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:values|enum)\s*:\s*(.+)$").unwrap());

fn is_flag(column: &Column) -> bool {
    column.length == Some(1)
        || column
            .comment
            .as_deref()
            .is_some_and(|c| BOOLEAN_COMMENT.is_match(c))
}

fn is_enum_candidate(column: &Column) -> bool {
    let name = column.name.to_ascii_lowercase();
    matches!(name.as_str(), "type" | "status" | "state")
        || name.ends_with("_type")
        || name.ends_with("_status")
        || name.ends_with("_state")
}

fn is_long_varchar(column: &Column) -> bool {
    column.length.is_some_and(|len| len > 255)
}

fn is_single_bit(column: &Column) -> bool {
    column.length.is_none_or(|len| len == 1)
}

/// Values of an `ENUM('a','b')` type text, in declaration order.
pub fn enum_values(data_type: &str) -> Option<Vec<String>> {
    let open = ENUM_OPEN.find(data_type)?;
    let rest = &data_type[open.end()..];
    let close = closing_paren(rest)?;
    let values = split_value_list(&rest[..close]);
    (!values.is_empty()).then_some(values)
}

/// Values listed in a column comment, either as `ENUM('a','b')` or `values: a, b`.
pub fn comment_enum_values(comment: &str) -> Option<Vec<String>> {
    let values = enum_values(comment).or_else(|| {
        COMMENT_VALUES
            .captures(comment)
            .map(|caps| split_value_list(&caps[1]))
    })?;
    (!values.is_empty()).then_some(values)
}

// Byte offset of the first `)` outside a quoted value.
fn closing_paren(list: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut chars = list.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                if chars.peek().is_some_and(|&(_, next)| next == q) {
                    chars.next();
                } else {
                    quote = None;
                }
            }
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, ')') => return Some(i),
            (None, _) => {}
        }
    }
    None
}

// Splits `'a','b, c',d` honoring single/double quotes and doubled quotes.
fn split_value_list(list: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = list.chars().peekable();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                if chars.peek() == Some(&q) {
                    current.push(q);
                    chars.next();
                } else {
                    quote = None;
                }
            }
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => quote = Some(c),
            (None, ',') => {
                values.push(current.trim().to_string());
                current.clear();
            }
            (None, c) => current.push(c),
        }
    }
    if !current.trim().is_empty() || !values.is_empty() {
        values.push(current.trim().to_string());
    }

    values
}

/// Resolved target types for one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedType {
    pub postgres: String,
    pub prisma: String,
    pub note: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeConversion {
    pub source: String,
    pub postgres: String,
    pub prisma: String,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Distinct source -> target conversions with occurrence counts, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TypeConversionMap {
    pub entries: Vec<TypeConversion>,
}

impl TypeConversionMap {
    fn record(&mut self, source: &str, resolved: &ResolvedType) {
        if let Some(entry) = self.entries.iter_mut().find(|e| {
            e.source == source && e.postgres == resolved.postgres && e.prisma == resolved.prisma
        }) {
            entry.count += 1;
            return;
        }
        self.entries.push(TypeConversion {
            source: source.to_string(),
            postgres: resolved.postgres.clone(),
            prisma: resolved.prisma.clone(),
            count: 1,
            note: resolved.note.map(str::to_string),
        });
    }

    pub fn get(&self, source: &str) -> impl Iterator<Item = &TypeConversion> {
        self.entries.iter().filter(move |e| e.source == source)
    }
}

#[derive(Debug, Clone)]
pub struct TypeConversionResult {
    pub schema: Schema,
    pub conversions: TypeConversionMap,
}

pub struct TypeConverter {
    rules: &'static [TypeRule],
}

impl Default for TypeConverter {
    fn default() -> Self {
        Self { rules: TYPE_RULES }
    }
}

impl TypeConverter {
    pub fn with_rules(rules: &'static [TypeRule]) -> Self {
        Self { rules }
    }

    /// Annotate every column with suggested PostgreSQL and Prisma types.
    pub fn convert(&self, schema: &Schema) -> TypeConversionResult {
        let mut schema = schema.clone();
        let mut conversions = TypeConversionMap::default();

        for table in schema.tables.values_mut() {
            for column in table.columns.values_mut() {
                let resolved = self.resolve(column);
                conversions.record(&column.base_type(), &resolved);
                debug!(
                    table = %table.name,
                    column = %column.name,
                    postgres = %resolved.postgres,
                    prisma = %resolved.prisma,
                    "type mapped"
                );

                if resolved.prisma == ENUM_MARKER {
                    let values = if column.base_type() == "ENUM" {
                        enum_values(&column.data_type)
                    } else {
                        column.comment.as_deref().and_then(comment_enum_values)
                    };
                    column.enum_values = values.unwrap_or_default();
                }
                column.suggested_postgres_type = Some(resolved.postgres);
                column.suggested_prisma_type = Some(resolved.prisma);
            }
        }

        info!(distinct = conversions.entries.len(), "type conversion done");
        TypeConversionResult { schema, conversions }
    }

    /// First matching mapping for the column, with size arguments applied.
    pub fn resolve(&self, column: &Column) -> ResolvedType {
        let base = column.base_type();
        let mapping = self
            .rules
            .iter()
            .find(|rule| rule.sources.contains(&base.as_str()))
            .and_then(|rule| {
                rule.mappings
                    .iter()
                    .find(|m| m.when.is_none_or(|when| when(column)))
            });

        let Some(mapping) = mapping else {
            let postgres = if base.is_empty() { "TEXT".to_string() } else { base };
            return ResolvedType {
                postgres,
                prisma: "String".to_string(),
                note: Some("unknown source type, kept as-is"),
            };
        };

        ResolvedType {
            postgres: with_size(mapping.postgres, column),
            prisma: mapping.prisma.to_string(),
            note: mapping.note,
        }
    }
}

fn with_size(postgres: &str, column: &Column) -> String {
    match postgres {
        "VARCHAR" | "CHAR" => match column.length {
            Some(len) => format!("{postgres}({len})"),
            None => postgres.to_string(),
        },
        "DECIMAL" | "NUMERIC" => match (column.precision, column.scale) {
            (Some(p), Some(s)) => format!("{postgres}({p},{s})"),
            (Some(p), None) => format!("{postgres}({p})"),
            _ => postgres.to_string(),
        },
        _ => postgres.to_string(),
    }
}
