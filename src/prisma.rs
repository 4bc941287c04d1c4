//! Prisma schema generation from an annotated schema.
//!
//! Output order: datasource header, one `enum` block per distinct enum,
//! then one `model` per table in schema order. Every model ends with
//! `@@map` back to the original table name.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::naming::{camel_case, pascal_case, pluralize, singularize};
use crate::schema::{Cardinality, Column, Relation, Schema, Table, TableType};
use crate::types::{comment_enum_values, enum_values, TypeConverter, ENUM_MARKER};

pub struct PrismaGenerator {
    provider: String,
}

impl Default for PrismaGenerator {
    fn default() -> Self {
        Self::new("postgresql")
    }
}

impl PrismaGenerator {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
        }
    }

    pub fn generate(&self, schema: &Schema) -> String {
        let mut output = String::new();
        self.write_header(&mut output);

        let models: HashSet<String> = schema.tables.keys().map(|t| pascal_case(t)).collect();
        let enums = EnumCatalog::collect(schema, &models);
        for (name, members) in &enums.blocks {
            output.push_str(&format!("enum {name} {{\n"));
            for member in members {
                output.push_str(&format!("  {member}\n"));
            }
            output.push_str("}\n\n");
        }

        for table in schema.tables.values() {
            ModelWriter::new(schema, &enums, table).write(&mut output);
        }

        info!(models = schema.tables.len(), enums = enums.blocks.len(), "prisma schema generated");
        output
    }

    fn write_header(&self, output: &mut String) {
        output.push_str("generator client {\n  provider = \"prisma-client-js\"\n}\n\n");
        output.push_str("datasource db {\n");
        output.push_str(&format!("  provider = \"{}\"\n", self.provider));
        output.push_str("  url      = env(\"DATABASE_URL\")\n}\n\n");
    }
}

/// Generate with the default PostgreSQL datasource.
pub fn generate(schema: &Schema) -> String {
    PrismaGenerator::default().generate(schema)
}

/// Turn an enum literal into a Prisma identifier.
pub fn sanitize_enum_value(value: &str) -> String {
    let mut safe: String = value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if safe.is_empty() {
        return "EMPTY".to_string();
    }
    if !safe.starts_with(|c: char| c.is_ascii_alphabetic()) {
        safe.insert_str(0, "E_");
    }
    safe
}

fn is_enum_column(column: &Column) -> bool {
    column.suggested_prisma_type.as_deref() == Some(ENUM_MARKER) || column.base_type() == "ENUM"
}

fn column_enum_values(column: &Column) -> Vec<String> {
    if !column.enum_values.is_empty() {
        return column.enum_values.clone();
    }
    enum_values(&column.data_type)
        .or_else(|| column.comment.as_deref().and_then(comment_enum_values))
        .unwrap_or_default()
}

#[derive(Default)]
struct EnumCatalog {
    blocks: IndexMap<String, Vec<String>>,
    assigned: HashMap<(String, String), String>,
}

impl EnumCatalog {
    fn collect(schema: &Schema, models: &HashSet<String>) -> Self {
        let mut catalog = Self::default();

        for table in schema.tables.values() {
            for column in table.columns.values().filter(|c| is_enum_column(c)) {
                let values = column_enum_values(column);
                if values.is_empty() {
                    debug!(table = %table.name, column = %column.name, "enum without values, using String");
                    continue;
                }
                let mut members: Vec<String> = Vec::new();
                for member in values.iter().map(|v| sanitize_enum_value(v)) {
                    if !members.contains(&member) {
                        members.push(member);
                    }
                }

                let name = catalog.name_for(table, column, &members, models);
                catalog.blocks.entry(name.clone()).or_insert(members);
                catalog
                    .assigned
                    .insert((table.name.clone(), column.name.clone()), name);
            }
        }
        catalog
    }

    // Column name first, then table + column; an existing block is reused
    // only when its members match.
    fn name_for(&self, table: &Table, column: &Column, members: &[String], models: &HashSet<String>) -> String {
        let qualified = format!("{}{}", pascal_case(&table.name), pascal_case(&column.name));
        let candidates = [pascal_case(&column.name), qualified.clone()];

        for candidate in candidates {
            let candidate = if models.contains(&candidate) {
                format!("{candidate}Enum")
            } else {
                candidate
            };
            match self.blocks.get(&candidate) {
                None => return candidate,
                Some(existing) if existing == members => return candidate,
                Some(_) => {}
            }
        }

        let mut n = 2;
        loop {
            let candidate = format!("{qualified}{n}");
            if !self.blocks.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    fn lookup(&self, table: &str, column: &str) -> Option<(&str, &[String])> {
        let name = self.assigned.get(&(table.to_string(), column.to_string()))?;
        let members = self.blocks.get(name)?;
        Some((name.as_str(), members.as_slice()))
    }
}

/// Outgoing many-to-one and one-to-one relations that can be rendered as
/// relation fields, one per source column.
fn forward_relations<'a>(schema: &Schema, table: &'a Table) -> Vec<&'a Relation> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut forward = Vec::new();
    for relation in &table.relations {
        let renderable = relation.source_table == table.name
            && matches!(relation.cardinality, Cardinality::ManyToOne | Cardinality::OneToOne)
            && table.columns.contains_key(&relation.source_column)
            && schema
                .tables
                .get(&relation.target_table)
                .is_some_and(|t| t.columns.contains_key(&relation.target_column));
        if renderable && seen.insert(relation.source_column.as_str()) {
            forward.push(relation);
        }
    }
    forward
}

/// Named only when the model pair has more than one relation, or for self relations.
fn relation_name(schema: &Schema, relation: &Relation) -> Option<String> {
    let between = |from: &str, to: &str| {
        schema.tables.get(from).map_or(0, |t| {
            forward_relations(schema, t)
                .iter()
                .filter(|r| r.target_table == to)
                .count()
        })
    };
    let ambiguous = relation.source_table == relation.target_table
        || between(&relation.source_table, &relation.target_table)
            + between(&relation.target_table, &relation.source_table)
            > 1;
    ambiguous.then(|| format!("{}_{}", relation.source_table, relation.source_column))
}

fn relation_field_base(column: &str, target: &str) -> String {
    let lower = column.to_ascii_lowercase();
    let stem = lower
        .strip_suffix("_id")
        .or_else(|| lower.strip_prefix("id_"))
        .filter(|s| !s.is_empty());
    match stem {
        Some(stem) => camel_case(stem),
        None => camel_case(&singularize(target)),
    }
}

fn list_field_base(table: &str) -> String {
    camel_case(&pluralize(&singularize(table)))
}

fn render_default(value: &str, field_type: &str, members: Option<&[String]>) -> Option<String> {
    let upper = value.to_ascii_uppercase();
    if upper.starts_with("CURRENT_TIMESTAMP") || upper == "NOW()" {
        return Some("now()".to_string());
    }
    if let Some(members) = members {
        let member = sanitize_enum_value(value);
        return members.contains(&member).then_some(member);
    }
    match field_type {
        "Int" | "Float" | "Decimal" | "BigInt" => value.parse::<f64>().is_ok().then(|| value.to_string()),
        "Boolean" => {
            let lower = value.to_ascii_lowercase();
            Some(matches!(lower.as_str(), "1" | "true" | "b'1'").to_string())
        }
        _ => Some(format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))),
    }
}

struct ModelWriter<'a> {
    schema: &'a Schema,
    enums: &'a EnumCatalog,
    table: &'a Table,
    fields: HashSet<String>,
}

impl<'a> ModelWriter<'a> {
    fn new(schema: &'a Schema, enums: &'a EnumCatalog, table: &'a Table) -> Self {
        let fields = table.columns.keys().map(|c| camel_case(c)).collect();
        Self {
            schema,
            enums,
            table,
            fields,
        }
    }

    fn write(mut self, output: &mut String) {
        output.push_str(&format!("model {} {{\n", pascal_case(&self.table.name)));

        let mut lines: Vec<String> = self.table.columns.values().map(|c| self.scalar_field(c)).collect();
        lines.extend(self.relation_fields());
        lines.extend(self.back_relation_fields());
        lines.extend(self.many_to_many_fields());
        for line in &lines {
            output.push_str(&format!("  {line}\n"));
        }

        output.push('\n');
        for attribute in self.block_attributes() {
            output.push_str(&format!("  {attribute}\n"));
        }
        output.push_str("}\n\n");
    }

    /// Reserve a field name, suffixing it when already taken.
    fn claim(&mut self, base: String) -> String {
        if self.fields.insert(base.clone()) {
            return base;
        }
        let with_ref = format!("{base}Ref");
        if self.fields.insert(with_ref.clone()) {
            return with_ref;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}{n}");
            if self.fields.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }

    fn is_optional(&self, column: &Column) -> bool {
        column.nullable && !self.table.is_foreign_key_column(&column.name)
    }

    fn scalar_field(&self, column: &Column) -> String {
        let name = camel_case(&column.name);
        let (field_type, members) = match self.enums.lookup(&self.table.name, &column.name) {
            Some((enum_name, members)) => (enum_name.to_string(), Some(members)),
            None => (scalar_type(column), None),
        };

        let mut line = format!("{name} {field_type}{}", if self.is_optional(column) { "?" } else { "" });

        let single_key = self.table.primary_key.len() == 1 && self.table.primary_key[0] == column.name;
        if single_key {
            line.push_str(" @id");
            if column.auto_increment {
                line.push_str(" @default(autoincrement())");
            }
        } else if self.table.is_column_unique(&column.name) {
            line.push_str(" @unique");
        }

        if !column.auto_increment {
            if let Some(value) = column
                .default
                .as_deref()
                .and_then(|v| render_default(v, &field_type, members))
            {
                line.push_str(&format!(" @default({value})"));
            }
        }
        if name != column.name {
            line.push_str(&format!(" @map(\"{}\")", column.name));
        }
        if let Some(comment) = column.comment.as_deref().filter(|c| !c.is_empty()) {
            line.push_str(&format!(" /// {}", comment.replace(['\r', '\n'], " ")));
        }
        line
    }

    fn relation_fields(&mut self) -> Vec<String> {
        let (schema, table) = (self.schema, self.table);
        let mut lines = Vec::new();
        for relation in forward_relations(schema, table) {
            let optional = table
                .columns
                .get(&relation.source_column)
                .is_some_and(|c| self.is_optional(c));
            let field = self.claim(relation_field_base(&relation.source_column, &relation.target_table));

            let mut arguments = Vec::new();
            if let Some(name) = relation_name(schema, relation) {
                arguments.push(format!("\"{name}\""));
            }
            arguments.push(format!("fields: [{}]", camel_case(&relation.source_column)));
            arguments.push(format!("references: [{}]", camel_case(&relation.target_column)));

            lines.push(format!(
                "{field} {}{} @relation({})",
                pascal_case(&relation.target_table),
                if optional { "?" } else { "" },
                arguments.join(", ")
            ));
        }
        lines
    }

    /// List fields for the synthesized one-to-many inverses, then optional
    /// fields for one-to-one relations pointing here.
    fn back_relation_fields(&mut self) -> Vec<String> {
        let (schema, table) = (self.schema, self.table);
        let mut back: Vec<(&Relation, bool)> = Vec::new();

        for inverse in table.relations.iter().filter(|r| r.cardinality == Cardinality::OneToMany) {
            let forward = inverse.inverse();
            let Some(source) = schema.tables.get(&forward.source_table) else {
                continue;
            };
            if let Some(relation) = forward_relations(schema, source)
                .into_iter()
                .find(|r| r.same_edge(&forward))
            {
                back.push((relation, true));
            }
        }
        for source in schema.tables.values() {
            for relation in forward_relations(schema, source) {
                if relation.cardinality == Cardinality::OneToOne && relation.target_table == table.name {
                    back.push((relation, false));
                }
            }
        }

        let mut lines = Vec::new();
        for (relation, many) in back {
            let model = pascal_case(&relation.source_table);
            let name = relation_name(schema, relation);
            let line = if many {
                let field = self.claim(list_field_base(&relation.source_table));
                format!("{field} {model}[]")
            } else {
                let field = self.claim(camel_case(&singularize(&relation.source_table)));
                format!("{field} {model}?")
            };
            lines.push(match name {
                Some(name) => format!("{line} @relation(\"{name}\")"),
                None => line,
            });
        }
        lines
    }

    /// Junction tables get list fields for the first two referenced tables
    /// that exist in the schema.
    fn many_to_many_fields(&mut self) -> Vec<String> {
        let (schema, table) = (self.schema, self.table);
        if table.table_type != TableType::Junction {
            return Vec::new();
        }

        let referenced: Vec<String> = table
            .foreign_keys
            .iter()
            .filter(|fk| schema.tables.contains_key(&fk.referenced_table))
            .map(|fk| fk.referenced_table.clone())
            .collect();
        if referenced.len() < 2 {
            return Vec::new();
        }

        let mut lines = Vec::new();
        for target in referenced.iter().take(2) {
            let field = self.claim(list_field_base(target));
            lines.push(format!(
                "{field} {}[] @relation(\"{}_{target}\")",
                pascal_case(target),
                table.name
            ));
        }
        lines
    }

    fn block_attributes(&self) -> Vec<String> {
        let mut attributes = Vec::new();

        if self.table.primary_key.len() > 1 {
            attributes.push(format!("@@id([{}])", field_list(&self.table.primary_key)));
        }
        for index in &self.table.indexes {
            if index.columns.is_empty() || index.name.eq_ignore_ascii_case("PRIMARY") {
                continue;
            }
            match (index.unique, index.columns.len()) {
                (true, 1) => {}
                (true, _) => attributes.push(format!("@@unique([{}])", field_list(&index.columns))),
                (false, _) => attributes.push(format!("@@index([{}])", field_list(&index.columns))),
            }
        }
        attributes.push(format!("@@map(\"{}\")", self.table.name));
        attributes
    }
}

fn field_list(columns: &[String]) -> String {
    columns.iter().map(|c| camel_case(c)).collect::<Vec<_>>().join(", ")
}

fn scalar_type(column: &Column) -> String {
    let prisma = match &column.suggested_prisma_type {
        Some(prisma) => prisma.clone(),
        None => TypeConverter::default().resolve(column).prisma,
    };
    if prisma == ENUM_MARKER { "String".to_string() } else { prisma }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relations::RelationAnalyzer;
    use pretty_assertions::assert_eq;

    fn annotated(schema: Schema) -> Schema {
        let converted = TypeConverter::default().convert(&schema).schema;
        RelationAnalyzer::default().analyze(&converted, "", &[]).schema
    }

    fn model<'a>(output: &'a str, name: &str) -> &'a str {
        let start = output.find(&format!("model {name} {{")).unwrap();
        let end = output[start..].find("\n}\n").unwrap();
        &output[start..start + end]
    }

    #[test]
    fn test_sanitize_enum_value() {
        assert_eq!(sanitize_enum_value("active"), "active");
        assert_eq!(sanitize_enum_value("in-progress"), "in_progress");
        assert_eq!(sanitize_enum_value("1st"), "E_1st");
        assert_eq!(sanitize_enum_value(""), "EMPTY");
    }

    #[test]
    fn test_header_and_map() {
        let schema = Schema::new("s").with_table(
            Table::new("users")
                .with_column(Column::new("id", "int").auto_increment())
                .with_primary_key(&["id"]),
        );
        let output = generate(&annotated(schema));

        assert!(output.starts_with("generator client {\n  provider = \"prisma-client-js\"\n}\n"));
        assert!(output.contains("  provider = \"postgresql\"\n  url      = env(\"DATABASE_URL\")"));
        assert_eq!(
            model(&output, "Users"),
            "model Users {\n  id Int @id @default(autoincrement())\n\n  @@map(\"users\")"
        );
    }

    #[test]
    fn test_varchar_status_enum_block() {
        let schema = Schema::new("s").with_table(
            Table::new("accounts")
                .with_column(Column::new("id", "int"))
                .with_column(
                    Column::new("user_status", "varchar(20)")
                        .not_null()
                        .with_default("active")
                        .with_comment("values: active, inactive"),
                )
                .with_primary_key(&["id"]),
        );
        let output = generate(&annotated(schema));

        assert!(output.contains("enum UserStatus {\n  active\n  inactive\n}\n"));
        assert!(output.find("enum UserStatus").unwrap() < output.find("model Accounts").unwrap());
        assert!(output.contains(
            "userStatus UserStatus @default(active) @map(\"user_status\") /// values: active, inactive"
        ));
    }

    #[test]
    fn test_conflicting_enum_names_are_qualified() {
        let schema = Schema::new("s")
            .with_table(Table::new("orders").with_column(Column::new("state", "enum('open','closed')")))
            .with_table(Table::new("tickets").with_column(Column::new("state", "enum('new','done')")))
            .with_table(Table::new("carts").with_column(Column::new("state", "enum('open','closed')")));
        let output = generate(&annotated(schema));

        assert!(output.contains("enum State {\n  open\n  closed\n}"));
        assert!(output.contains("enum TicketsState {\n  new\n  done\n}"));
        assert_eq!(output.matches("enum State {").count(), 1);
    }

    #[test]
    fn test_defaults_per_type() {
        let table = Table::new("items")
            .with_column(Column::new("qty", "int").not_null().with_default("0"))
            .with_column(Column::new("active", "tinyint(1)").not_null().with_default("1"))
            .with_column(Column::new("created_at", "timestamp").not_null().with_default("CURRENT_TIMESTAMP"))
            .with_column(Column::new("label", "varchar(50)").with_default("none"));
        let output = generate(&annotated(Schema::new("s").with_table(table)));

        assert!(output.contains("qty Int @default(0)\n"));
        assert!(output.contains("active Boolean @default(true)\n"));
        assert!(output.contains("createdAt DateTime @default(now()) @map(\"created_at\")\n"));
        assert!(output.contains("label String? @default(\"none\")\n"));
    }

    #[test]
    fn test_relation_and_back_relation_fields() {
        let schema = Schema::new("s")
            .with_table(
                Table::new("users")
                    .with_column(Column::new("id", "int"))
                    .with_primary_key(&["id"]),
            )
            .with_table(
                Table::new("orders")
                    .with_column(Column::new("id", "int"))
                    .with_column(Column::new("user_id", "int"))
                    .with_primary_key(&["id"]),
            );
        let output = generate(&annotated(schema));

        let orders = model(&output, "Orders");
        assert!(orders.contains("  userId Int? @map(\"user_id\")\n"));
        assert!(orders.contains("  user Users? @relation(fields: [userId], references: [id])\n"));

        let users = model(&output, "Users");
        assert!(users.contains("  orders Orders[]\n"));
    }

    #[test]
    fn test_junction_many_to_many_and_composite_key() {
        let schema = Schema::new("s")
            .with_table(Table::new("users").with_column(Column::new("id", "int")).with_primary_key(&["id"]))
            .with_table(Table::new("roles").with_column(Column::new("id", "int")).with_primary_key(&["id"]))
            .with_table(
                Table::new("user_roles")
                    .with_column(Column::new("user_id", "int"))
                    .with_column(Column::new("role_id", "int"))
                    .with_primary_key(&["user_id", "role_id"])
                    .with_foreign_key(&["user_id"], "users", &["id"])
                    .with_foreign_key(&["role_id"], "roles", &["id"])
                    .with_index("idx_role", &["role_id"], false),
            );
        let mut schema = annotated(schema);
        if let Some(t) = schema.tables.get_mut("user_roles") {
            t.table_type = TableType::Junction;
        }
        let output = generate(&schema);
        let junction = model(&output, "UserRoles");

        assert!(junction.contains("  userId Int @map(\"user_id\")\n"));
        assert!(junction.contains("  users Users[] @relation(\"user_roles_users\")\n"));
        assert!(junction.contains("  roles Roles[] @relation(\"user_roles_roles\")\n"));
        assert!(junction.contains("  @@id([userId, roleId])\n  @@index([roleId])\n  @@map(\"user_roles\")"));
    }

    #[test]
    fn test_junction_skips_missing_tables() {
        let schema = Schema::new("s")
            .with_table(Table::new("users").with_column(Column::new("id", "int")).with_primary_key(&["id"]))
            .with_table(
                Table::new("user_ghosts")
                    .with_column(Column::new("user_id", "int"))
                    .with_column(Column::new("ghost_id", "int"))
                    .with_primary_key(&["user_id", "ghost_id"])
                    .with_foreign_key(&["user_id"], "users", &["id"])
                    .with_foreign_key(&["ghost_id"], "ghosts", &["id"]),
            );
        let mut schema = annotated(schema);
        if let Some(t) = schema.tables.get_mut("user_ghosts") {
            t.table_type = TableType::Junction;
        }
        let output = generate(&schema);
        let junction = model(&output, "UserGhosts");

        assert!(!output.contains(" Ghosts[]"));
        assert!(!junction.contains("Users[]"));
    }

    #[test]
    fn test_multi_column_unique_index() {
        let table = Table::new("slots")
            .with_column(Column::new("id", "int"))
            .with_column(Column::new("day", "date"))
            .with_column(Column::new("room", "int"))
            .with_column(Column::new("code", "varchar(10)"))
            .with_primary_key(&["id"])
            .with_index("uq_day_room", &["day", "room"], true)
            .with_index("uq_code", &["code"], true);
        let output = generate(&annotated(Schema::new("s").with_table(table)));

        assert!(output.contains("  code String? @unique\n"));
        assert!(output.contains("  @@unique([day, room])\n"));
        assert!(!output.contains("@@unique([code])"));
    }
}
