//! MySQL dump parser for CREATE TABLE / ALTER TABLE statements.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use super::lexer::{Lexer, Token};
use crate::schema::{Column, ForeignKey, Index, Schema, Table};

#[derive(Debug, Error)]
pub enum SqlParseError {
    #[error("Unexpected token: {0:?}")]
    UnexpectedToken(Token),
    #[error("Expected {expected}, found {found:?}")]
    Expected { expected: String, found: Token },
    #[error("Unexpected end of input")]
    UnexpectedEof,
}

static DUMP_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*--\s*(?:Dump completed on|Generation Time:)\s*(.+?)\s*$").unwrap()
});

/// Parse a MySQL dump into a Schema.
pub fn parse_sql(input: &str) -> Result<Schema, SqlParseError> {
    let tokens = Lexer::new(input).tokenize();
    let mut schema = Parser::new(tokens).parse()?;

    schema.refresh_metadata();
    if let (Some(meta), Some(caps)) = (schema.metadata.as_mut(), DUMP_DATE.captures(input)) {
        meta.extracted_at = Some(caps[1].to_string());
    }
    debug!(tables = schema.tables.len(), "parsed dump");
    Ok(schema)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn ident(&self) -> Option<String> {
        match self.current() {
            Token::Ident(name) => Some(name.clone()),
            _ => None,
        }
    }

    fn parse(&mut self) -> Result<Schema, SqlParseError> {
        let mut schema = Schema::default();

        while self.current() != &Token::Eof {
            match self.current() {
                Token::Create => {
                    self.advance();
                    if self.current() == &Token::Table {
                        self.advance();
                        if let Some(table) = self.parse_create_table()? {
                            schema.add_table(table);
                        }
                    } else if self.current().is_word("DATABASE") || self.current().is_word("SCHEMA") {
                        self.advance();
                        self.skip_if_not_exists();
                        if let Some(name) = self.ident() {
                            if schema.name.is_empty() {
                                schema.name = name;
                            }
                        }
                        self.skip_statement();
                    } else {
                        // Views, triggers, standalone indexes
                        self.skip_statement();
                    }
                }
                Token::Alter => self.parse_alter_table(&mut schema)?,
                Token::Ident(word) if word.eq_ignore_ascii_case("USE") => {
                    self.advance();
                    if let Some(name) = self.ident() {
                        schema.name = name;
                    }
                    self.skip_statement();
                }
                _ => self.skip_statement(),
            }
        }

        Ok(schema)
    }

    fn skip_if_not_exists(&mut self) {
        if self.current() == &Token::If {
            self.advance();
            if self.current() == &Token::Not {
                self.advance();
            }
            if self.current() == &Token::Exists {
                self.advance();
            }
        }
    }

    /// `name` or `db.name`; returns the last part.
    fn parse_qualified_name(&mut self) -> Option<String> {
        let mut name = self.ident()?;
        self.advance();
        if self.current() == &Token::Dot {
            self.advance();
            if let Some(part) = self.ident() {
                name = part;
                self.advance();
            }
        }
        Some(name)
    }

    fn parse_create_table(&mut self) -> Result<Option<Table>, SqlParseError> {
        self.skip_if_not_exists();

        let Some(table_name) = self.parse_qualified_name() else {
            self.skip_statement();
            return Ok(None);
        };

        // CREATE TABLE t LIKE other / AS SELECT ...
        if self.current() != &Token::LParen {
            self.skip_statement();
            return Ok(None);
        }
        self.advance();

        let mut table = Table::new(table_name);
        let mut pk_columns: Vec<String> = Vec::new();
        let mut constraint_name: Option<String> = None;

        loop {
            match self.current() {
                Token::RParen => {
                    self.advance();
                    break;
                }
                Token::Comma => {
                    constraint_name = None;
                    self.advance();
                }
                Token::Primary => {
                    // PRIMARY KEY (col1, col2, ...)
                    self.advance();
                    if self.current() == &Token::Key {
                        self.advance();
                    }
                    pk_columns = self.parse_index_columns()?;
                    self.skip_until(&[Token::Comma, Token::RParen]);
                }
                Token::Foreign => {
                    if let Some(fk) = self.parse_foreign_key(constraint_name.take())? {
                        table.foreign_keys.push(fk);
                    }
                }
                Token::Unique | Token::Index | Token::Key | Token::Fulltext | Token::Spatial => {
                    let index = self.parse_index_definition(constraint_name.take())?;
                    table.indexes.push(index);
                    self.skip_until(&[Token::Comma, Token::RParen]);
                }
                Token::Constraint => {
                    self.advance();
                    if let Some(name) = self.ident() {
                        constraint_name = Some(name);
                        self.advance();
                    }
                }
                Token::Check => {
                    self.advance();
                    self.skip_parenthesized();
                }
                Token::Ident(_) => {
                    if let Some((column, inline_fk)) = self.parse_column(&table.name)? {
                        if column.primary_key {
                            pk_columns = vec![column.name.clone()];
                        }
                        table.foreign_keys.extend(inline_fk);
                        table.add_column(column);
                    }
                }
                Token::Eof => return Err(SqlParseError::UnexpectedEof),
                _ => {
                    self.advance();
                }
            }
        }

        table.set_primary_key(pk_columns);
        self.parse_table_options(&mut table);
        Ok(Some(table))
    }

    // ENGINE=InnoDB DEFAULT CHARSET=utf8 COMMENT='...';
    fn parse_table_options(&mut self, table: &mut Table) {
        while !matches!(self.current(), Token::Semicolon | Token::Eof) {
            if self.current() == &Token::Comment {
                self.advance();
                if self.current() == &Token::Eq {
                    self.advance();
                }
                if let Token::Str(s) = self.current() {
                    if !s.is_empty() {
                        table.comment = Some(s.clone());
                    }
                }
            }
            self.advance();
        }
        if self.current() == &Token::Semicolon {
            self.advance();
        }
    }

    fn parse_column(&mut self, table: &str) -> Result<Option<(Column, Option<ForeignKey>)>, SqlParseError> {
        let Some(name) = self.ident() else {
            return Ok(None);
        };
        self.advance();

        let data_type = self.parse_type()?;
        if data_type.is_empty() {
            return Ok(None);
        }

        let mut column = Column::new(name, data_type);
        let mut inline_fk = None;

        loop {
            match self.current() {
                Token::Primary => {
                    self.advance();
                    if self.current() == &Token::Key {
                        self.advance();
                    }
                    column.primary_key = true;
                    column.nullable = false;
                }
                Token::Not => {
                    self.advance();
                    if self.current() == &Token::Null {
                        self.advance();
                        column.nullable = false;
                    }
                }
                Token::Null => {
                    self.advance();
                    column.nullable = true;
                }
                Token::Unique => {
                    self.advance();
                    if self.current() == &Token::Key {
                        self.advance();
                    }
                    column.unique = true;
                }
                Token::Default => {
                    self.advance();
                    column.default = self.parse_default_value();
                }
                Token::AutoIncrement => {
                    self.advance();
                    column.auto_increment = true;
                }
                Token::Comment => {
                    self.advance();
                    if let Token::Str(s) = self.current() {
                        if !s.is_empty() {
                            column.comment = Some(s.clone());
                        }
                        self.advance();
                    }
                }
                Token::References => {
                    // Inline FK reference
                    self.advance();
                    let (referenced_table, referenced_columns) = self.parse_reference()?;
                    let (on_delete, on_update) = self.parse_on_actions();
                    inline_fk = Some(ForeignKey {
                        name: None,
                        columns: vec![column.name.clone()],
                        referenced_table,
                        referenced_columns,
                        on_delete,
                        on_update,
                    });
                }
                Token::On => {
                    // ON UPDATE CURRENT_TIMESTAMP
                    self.advance();
                    if self.current() == &Token::Update {
                        self.advance();
                        self.parse_default_value();
                    }
                }
                Token::Constraint => {
                    self.advance();
                    if self.ident().is_some() {
                        self.advance();
                    }
                }
                Token::Check | Token::LParen => {
                    if self.current() == &Token::Check {
                        self.advance();
                    }
                    self.skip_parenthesized();
                }
                Token::Comma | Token::RParen => break,
                Token::Eof => return Err(SqlParseError::UnexpectedEof),
                _ => {
                    // CHARACTER SET, COLLATE, GENERATED ...
                    self.advance();
                }
            }
        }

        debug!(table, column = %column.name, data_type = %column.data_type, "column");
        Ok(Some((column, inline_fk)))
    }

    /// Type text: `int(11) unsigned`, `decimal(10,2)`, `enum('a','b')`.
    fn parse_type(&mut self) -> Result<String, SqlParseError> {
        let mut data_type = match self.current() {
            Token::Ident(t) => t.clone(),
            _ => return Ok(String::new()),
        };
        self.advance();

        if self.current() == &Token::LParen {
            self.advance();
            let mut args = Vec::new();
            loop {
                match self.current() {
                    Token::Num(n) => args.push(n.clone()),
                    Token::Str(s) => args.push(format!("'{}'", s.replace('\'', "''"))),
                    Token::Ident(s) => args.push(s.clone()),
                    Token::Comma => {}
                    Token::RParen => {
                        self.advance();
                        break;
                    }
                    Token::Eof => return Err(SqlParseError::UnexpectedEof),
                    other => return Err(SqlParseError::UnexpectedToken(other.clone())),
                }
                self.advance();
            }
            data_type.push('(');
            data_type.push_str(&args.join(","));
            data_type.push(')');
        }

        while let Token::Ident(word) = self.current() {
            let upper = word.to_ascii_uppercase();
            if !matches!(upper.as_str(), "UNSIGNED" | "SIGNED" | "ZEROFILL" | "PRECISION" | "VARYING") {
                break;
            }
            data_type.push(' ');
            data_type.push_str(&upper.to_ascii_lowercase());
            self.advance();
        }

        Ok(data_type)
    }

    fn parse_default_value(&mut self) -> Option<String> {
        match self.current() {
            Token::Str(s) => {
                let val = s.clone();
                self.advance();
                Some(val)
            }
            Token::Num(n) => {
                let val = n.clone();
                self.advance();
                Some(val)
            }
            Token::Null => {
                self.advance();
                None
            }
            Token::Ident(s) => {
                let mut val = s.clone();
                self.advance();
                // Function calls like NOW() or CURRENT_TIMESTAMP(3)
                if self.current() == &Token::LParen {
                    self.advance();
                    val.push('(');
                    val.push_str(&self.collect_until_paren());
                    val.push(')');
                } else if let Token::Str(bits) = self.current() {
                    // b'0' bit literals
                    val = bits.clone();
                    self.advance();
                }
                Some(val)
            }
            Token::LParen => {
                self.advance();
                let inner = self.collect_until_paren();
                Some(format!("({})", inner))
            }
            _ => None,
        }
    }

    fn collect_until_paren(&mut self) -> String {
        let mut parts = Vec::new();
        let mut depth = 1;

        loop {
            match self.current() {
                Token::LParen => {
                    depth += 1;
                    parts.push("(".to_string());
                }
                Token::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        self.advance();
                        break;
                    }
                    parts.push(")".to_string());
                }
                Token::Ident(s) | Token::Num(s) => parts.push(s.clone()),
                Token::Str(s) => parts.push(format!("'{}'", s)),
                Token::Comma => parts.push(",".to_string()),
                Token::Eof => break,
                _ => {}
            }
            self.advance();
        }

        parts.join(" ")
    }

    /// `table(col, ...)` after REFERENCES.
    fn parse_reference(&mut self) -> Result<(String, Vec<String>), SqlParseError> {
        let Some(target) = self.parse_qualified_name() else {
            return Err(SqlParseError::UnexpectedToken(self.current().clone()));
        };

        let mut columns = if self.current() == &Token::LParen {
            self.parse_column_list()
        } else {
            Vec::new()
        };
        if columns.is_empty() {
            columns.push("id".to_string());
        }

        Ok((target, columns))
    }

    fn parse_foreign_key(&mut self, name: Option<String>) -> Result<Option<ForeignKey>, SqlParseError> {
        self.advance(); // FOREIGN
        if self.current() != &Token::Key {
            return Ok(None);
        }
        self.advance(); // KEY

        // Optional index name before the column list
        let mut name = name;
        if let Some(index_name) = self.ident() {
            name.get_or_insert(index_name);
            self.advance();
        }

        let columns = self.parse_index_columns()?;

        if self.current() != &Token::References {
            return Err(SqlParseError::Expected {
                expected: "REFERENCES".to_string(),
                found: self.current().clone(),
            });
        }
        self.advance();

        let (referenced_table, referenced_columns) = self.parse_reference()?;
        let (on_delete, on_update) = self.parse_on_actions();

        Ok(Some(ForeignKey {
            name,
            columns,
            referenced_table,
            referenced_columns,
            on_delete,
            on_update,
        }))
    }

    /// `[UNIQUE|FULLTEXT|SPATIAL] [KEY|INDEX] [name] (cols)`
    fn parse_index_definition(&mut self, constraint_name: Option<String>) -> Result<Index, SqlParseError> {
        let unique = self.current() == &Token::Unique;
        self.advance();
        if matches!(self.current(), Token::Key | Token::Index) {
            self.advance();
        }

        let mut name = constraint_name;
        if let Some(index_name) = self.ident() {
            if !self.current().is_word("USING") {
                name = Some(index_name);
                self.advance();
            }
        }

        let columns = self.parse_index_columns()?;
        let name = name.unwrap_or_else(|| columns.join("_"));
        Ok(Index { name, columns, unique })
    }

    /// Like `parse_column_list`, but the list is mandatory.
    fn parse_index_columns(&mut self) -> Result<Vec<String>, SqlParseError> {
        if self.current().is_word("USING") {
            self.advance();
            self.advance();
        }
        if self.current() != &Token::LParen {
            return Err(SqlParseError::Expected {
                expected: "(".to_string(),
                found: self.current().clone(),
            });
        }
        Ok(self.parse_column_list())
    }

    // Only the first identifier of each element is a column; prefix
    // lengths and ASC/DESC are skipped.
    fn parse_column_list(&mut self) -> Vec<String> {
        let mut cols = Vec::new();

        if self.current() != &Token::LParen {
            return cols;
        }
        self.advance();

        let mut expect_name = true;
        loop {
            match self.current() {
                Token::Ident(name) => {
                    if expect_name {
                        cols.push(name.clone());
                        expect_name = false;
                    }
                    self.advance();
                }
                Token::LParen => self.skip_parenthesized(),
                Token::Comma => {
                    expect_name = true;
                    self.advance();
                }
                Token::RParen => {
                    self.advance();
                    break;
                }
                Token::Eof => break,
                _ => {
                    self.advance();
                }
            }
        }

        cols
    }

    /// ON DELETE / ON UPDATE actions; returns `(on_delete, on_update)`.
    fn parse_on_actions(&mut self) -> (Option<String>, Option<String>) {
        let mut on_delete = None;
        let mut on_update = None;

        while self.current() == &Token::On {
            self.advance();
            let is_delete = match self.current() {
                Token::Delete => true,
                Token::Update => false,
                _ => break,
            };
            self.advance();

            let action = match self.current() {
                Token::Cascade => {
                    self.advance();
                    "CASCADE".to_string()
                }
                Token::Restrict => {
                    self.advance();
                    "RESTRICT".to_string()
                }
                Token::Ident(s) if s.eq_ignore_ascii_case("SET") => {
                    self.advance();
                    let what = match self.current() {
                        Token::Null => "SET NULL",
                        Token::Default => "SET DEFAULT",
                        _ => "SET",
                    };
                    self.advance();
                    what.to_string()
                }
                Token::Ident(s) if s.eq_ignore_ascii_case("NO") => {
                    self.advance();
                    if self.current().is_word("ACTION") {
                        self.advance();
                    }
                    "NO ACTION".to_string()
                }
                _ => continue,
            };

            if is_delete {
                on_delete = Some(action);
            } else {
                on_update = Some(action);
            }
        }

        (on_delete, on_update)
    }

    fn skip_parenthesized(&mut self) {
        if self.current() != &Token::LParen {
            self.advance();
            return;
        }
        self.advance();
        let mut depth = 1;
        while depth > 0 {
            match self.current() {
                Token::LParen => depth += 1,
                Token::RParen => depth -= 1,
                Token::Eof => break,
                _ => {}
            }
            self.advance();
        }
    }

    fn skip_statement(&mut self) {
        while !matches!(self.current(), Token::Semicolon | Token::Eof) {
            self.advance();
        }
        if self.current() == &Token::Semicolon {
            self.advance();
        }
    }

    fn skip_until(&mut self, tokens: &[Token]) {
        while !tokens.contains(self.current()) && self.current() != &Token::Eof {
            if self.current() == &Token::LParen {
                self.skip_parenthesized();
            } else {
                self.advance();
            }
        }
    }

    /// ALTER TABLE t ADD PRIMARY KEY (...), ADD KEY ..., ADD CONSTRAINT ... FOREIGN KEY ...
    fn parse_alter_table(&mut self, schema: &mut Schema) -> Result<(), SqlParseError> {
        self.advance(); // ALTER
        if self.current().is_word("ONLINE") || self.current().is_word("IGNORE") {
            self.advance();
        }
        if self.current() != &Token::Table {
            self.skip_statement();
            return Ok(());
        }
        self.advance(); // TABLE

        let Some(table_name) = self.parse_qualified_name() else {
            self.skip_statement();
            return Ok(());
        };

        loop {
            match self.current() {
                Token::Add => {
                    self.advance();
                    self.parse_alter_add(schema, &table_name)?;
                }
                Token::Semicolon => {
                    self.advance();
                    break;
                }
                Token::Ident(word) if word.eq_ignore_ascii_case("MODIFY") => {
                    self.advance();
                    self.parse_alter_modify(schema, &table_name)?;
                }
                Token::Eof => break,
                Token::LParen => self.skip_parenthesized(),
                _ => self.advance(),
            }
        }

        Ok(())
    }

    /// MODIFY [COLUMN] definition; key membership survives the redefinition.
    fn parse_alter_modify(&mut self, schema: &mut Schema, table_name: &str) -> Result<(), SqlParseError> {
        if self.current().is_word("COLUMN") {
            self.advance();
        }
        if let Some((mut column, inline_fk)) = self.parse_column(table_name)? {
            if let Some(table) = schema.tables.get_mut(table_name) {
                if let Some(old) = table.columns.get(&column.name) {
                    column.primary_key |= old.primary_key;
                    column.unique |= old.unique;
                }
                table.foreign_keys.extend(inline_fk);
                table.add_column(column);
            }
        }
        Ok(())
    }

    fn parse_alter_add(&mut self, schema: &mut Schema, table_name: &str) -> Result<(), SqlParseError> {
        let mut constraint_name = None;
        if self.current() == &Token::Constraint {
            self.advance();
            if let Some(name) = self.ident() {
                constraint_name = Some(name);
                self.advance();
            }
        }

        match self.current() {
            Token::Primary => {
                self.advance();
                if self.current() == &Token::Key {
                    self.advance();
                }
                let columns = self.parse_index_columns()?;
                if let Some(table) = schema.tables.get_mut(table_name) {
                    table.set_primary_key(columns);
                }
            }
            Token::Unique | Token::Index | Token::Key | Token::Fulltext | Token::Spatial => {
                let index = self.parse_index_definition(constraint_name)?;
                if let Some(table) = schema.tables.get_mut(table_name) {
                    table.indexes.push(index);
                }
            }
            Token::Foreign => {
                if let Some(fk) = self.parse_foreign_key(constraint_name)? {
                    if let Some(table) = schema.tables.get_mut(table_name) {
                        table.foreign_keys.push(fk);
                    }
                }
            }
            Token::Ident(_) => {
                // ADD [COLUMN] definition
                if self.current().is_word("COLUMN") {
                    self.advance();
                }
                if let Some((column, inline_fk)) = self.parse_column(table_name)? {
                    if let Some(table) = schema.tables.get_mut(table_name) {
                        table.foreign_keys.extend(inline_fk);
                        table.add_column(column);
                    }
                }
            }
            _ => {}
        }

        self.skip_until(&[Token::Comma, Token::Semicolon]);
        Ok(())
    }
}
