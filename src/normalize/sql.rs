//! MySQL migration scripts attached to normalization suggestions.


use crate::schema::{Column, Table};

fn quote(name: &str) -> String {
    format!("`{name}`")
}

fn quoted_list(names: &[String]) -> String {
    names.iter().map(|n| quote(n)).collect::<Vec<_>>().join(", ")
}

fn literal(value: &str) -> String {
    let upper = value.to_ascii_uppercase();
    let is_number = value.parse::<f64>().is_ok();
    let is_keyword = matches!(upper.as_str(), "NULL" | "CURRENT_TIMESTAMP" | "TRUE" | "FALSE");
    if is_number || is_keyword || value.ends_with(')') {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "''"))
    }
}

fn column_definition(column: &Column) -> String {
    let mut def = format!(
        "{} {} {}",
        quote(&column.name),
        column.data_type,
        if column.nullable { "NULL" } else { "NOT NULL" }
    );
    if let Some(default) = &column.default {
        def.push_str(&format!(" DEFAULT {}", literal(default)));
    }
    def
}

fn key_definition(table: &Table, name: &str) -> String {
    let data_type = table.columns.get(name).map_or("INT", |c| c.data_type.as_str());
    format!("{} {} NOT NULL", quote(name), data_type)
}

fn create_table(out: &mut String, name: &str, lines: &[String]) {
    out.push_str(&format!("CREATE TABLE {} (\n", quote(name)));
    out.push_str(&format!("  {}\n", lines.join(",\n  ")));
    out.push_str(");\n\n");
}

fn copy_rows(out: &mut String, target: &str, columns: &[String], source: &str) {
    let list = quoted_list(columns);
    out.push_str(&format!(
        "INSERT INTO {} ({list}) SELECT {list} FROM {};\n",
        quote(target),
        quote(source)
    ));
}

/// Column definitions for `columns`; key columns always come out NOT NULL.
fn definitions(table: &Table, key: &[String], columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .map(|name| match table.columns.get(name) {
            Some(_) if key.contains(name) => key_definition(table, name),
            Some(column) => column_definition(column),
            None => key_definition(table, name),
        })
        .collect()
}

/// Split `group` out of `table` into `{table}_{group[0]}`.
pub fn decomposition(table: &Table, key: &[String], group: &[String]) -> String {
    let new_name = format!("{}_new", table.name);
    let child_name = format!("{}_{}", table.name, group[0]);
    let keys = quoted_list(key);

    let main: Vec<String> = table.columns.keys().filter(|c| !group.contains(c)).cloned().collect();
    let child: Vec<String> = key.iter().chain(group).cloned().collect();

    let mut out = format!("-- Split transitive dependency out of {}\n", quote(&table.name));

    let mut lines = definitions(table, key, &main);
    lines.push(format!("PRIMARY KEY ({keys})"));
    create_table(&mut out, &new_name, &lines);

    let mut lines = definitions(table, key, &child);
    lines.push(format!("PRIMARY KEY ({keys})"));
    lines.push(format!(
        "CONSTRAINT {} FOREIGN KEY ({keys}) REFERENCES {} ({keys}) ON DELETE CASCADE",
        quote(&format!("fk_{child_name}_{}", table.name)),
        quote(&new_name)
    ));
    create_table(&mut out, &child_name, &lines);

    copy_rows(&mut out, &new_name, &main, &table.name);
    copy_rows(&mut out, &child_name, &child, &table.name);

    out.push_str("\n-- Then either keep a backup:\n");
    out.push_str(&format!(
        "-- RENAME TABLE {} TO {}, {} TO {};\n",
        quote(&table.name),
        quote(&format!("{}_bak", table.name)),
        quote(&new_name),
        quote(&table.name)
    ));
    out.push_str("-- or drop the original:\n");
    out.push_str(&format!(
        "-- DROP TABLE {}; RENAME TABLE {} TO {};\n",
        quote(&table.name),
        quote(&new_name),
        quote(&table.name)
    ));
    out
}

/// One table per entity; every later entity references the first.
pub fn entity_split(table: &Table, key: &[String], layout: &[(String, Vec<String>)]) -> String {
    let keys = quoted_list(key);
    let mut out = format!("-- Split {} into one table per entity\n", quote(&table.name));

    for (entity, columns) in layout {
        let mut lines = definitions(table, key, columns);
        lines.push(format!("PRIMARY KEY ({keys})"));
        create_table(&mut out, entity, &lines);
    }
    for (entity, columns) in layout {
        copy_rows(&mut out, entity, columns, &table.name);
    }

    if let Some(((first, _), rest)) = layout.split_first() {
        for (entity, _) in rest {
            out.push_str(&format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({keys}) REFERENCES {} ({keys});\n",
                quote(entity),
                quote(&format!("fk_{entity}_{first}")),
                quote(first)
            ));
        }
    }
    out
}

/// Merge `tables` into `unified`, tagging each row with its origin in `discriminant`.
///
/// Columns shared by every table keep their name and the first table's type.
/// The rest are prefixed with their table name and made nullable.
pub fn unified(tables: &[&Table], unified: &str, discriminant: &str) -> String {
    let Some(first) = tables.first() else {
        return String::new();
    };
    let common: Vec<String> = first
        .columns
        .keys()
        .filter(|c| tables.iter().all(|t| t.columns.contains_key(*c)))
        .cloned()
        .collect();
    let origins = tables
        .iter()
        .map(|t| format!("'{}'", t.name))
        .collect::<Vec<_>>()
        .join(",");

    let mut out = format!(
        "-- Merge {} into {}\n",
        tables.iter().map(|t| quote(&t.name)).collect::<Vec<_>>().join(", "),
        quote(unified)
    );

    let mut lines: Vec<String> = common
        .iter()
        .filter_map(|c| first.columns.get(c))
        .map(column_definition)
        .collect();
    lines.push(format!("{} ENUM({origins}) NOT NULL", quote(discriminant)));
    for table in tables {
        for column in table.columns.values().filter(|c| !common.contains(&c.name)) {
            lines.push(format!(
                "{} {} NULL",
                quote(&format!("{}_{}", table.name, column.name)),
                column.data_type
            ));
        }
    }
    let mut key: Vec<String> = first
        .key_columns()
        .into_iter()
        .filter(|k| common.contains(k))
        .collect();
    key.push(discriminant.to_string());
    lines.push(format!("PRIMARY KEY ({})", quoted_list(&key)));
    create_table(&mut out, unified, &lines);

    for table in tables {
        let specific: Vec<&String> = table.columns.keys().filter(|c| !common.contains(c)).collect();

        let mut targets: Vec<String> = common.iter().map(|c| quote(c)).collect();
        targets.push(quote(discriminant));
        targets.extend(specific.iter().map(|c| quote(&format!("{}_{c}", table.name))));

        let mut values: Vec<String> = common.iter().map(|c| quote(c)).collect();
        values.push(format!("'{}'", table.name));
        values.extend(specific.iter().map(|c| quote(c)));

        out.push_str(&format!(
            "INSERT INTO {} ({}) SELECT {} FROM {};\n",
            quote(unified),
            targets.join(", "),
            values.join(", "),
            quote(&table.name)
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_definition_defaults() {
        let col = Column::new("status", "varchar(20)").not_null().with_default("new");
        assert_eq!(column_definition(&col), "`status` varchar(20) NOT NULL DEFAULT 'new'");

        let col = Column::new("qty", "int").with_default("0");
        assert_eq!(column_definition(&col), "`qty` int NULL DEFAULT 0");

        let col = Column::new("at", "timestamp").with_default("CURRENT_TIMESTAMP");
        assert_eq!(column_definition(&col), "`at` timestamp NULL DEFAULT CURRENT_TIMESTAMP");
    }

    #[test]
    fn test_unified_script() {
        let a = Table::new("orders")
            .with_column(Column::new("id", "int"))
            .with_column(Column::new("total", "decimal(10,2)"))
            .with_primary_key(&["id"]);
        let b = Table::new("orders_log")
            .with_column(Column::new("id", "int"))
            .with_column(Column::new("total", "decimal(10,2)"))
            .with_column(Column::new("logged_at", "datetime"))
            .with_primary_key(&["id"]);

        let sql = unified(&[&a, &b], "orders_unified", "record_type");

        assert!(sql.contains("CREATE TABLE `orders_unified` ("));
        assert!(sql.contains("`id` int NOT NULL,\n  `total` decimal(10,2) NULL,"));
        assert!(sql.contains("`record_type` ENUM('orders','orders_log') NOT NULL"));
        assert!(sql.contains("`orders_log_logged_at` datetime NULL"));
        assert!(sql.contains("PRIMARY KEY (`id`, `record_type`)"));
        assert!(sql.contains(
            "INSERT INTO `orders_unified` (`id`, `total`, `record_type`, `orders_log_logged_at`) \
             SELECT `id`, `total`, 'orders_log', `logged_at` FROM `orders_log`;"
        ));
    }

    #[test]
    fn test_entity_split_missing_key_column() {
        let t = Table::new("user_order")
            .with_column(Column::new("user_name", "varchar(50)"))
            .with_column(Column::new("order_total", "int"));
        let layout = vec![
            ("user".to_string(), vec!["id".to_string(), "user_name".to_string()]),
            ("order".to_string(), vec!["id".to_string(), "order_total".to_string()]),
        ];
        let sql = entity_split(&t, &["id".to_string()], &layout);

        assert!(sql.contains("`id` INT NOT NULL"));
        assert!(sql.contains("REFERENCES `user` (`id`);"));
    }
}
