//! Plain-text report for the terminal.
//!
//! Column widths are measured in display cells so tables and comments
//! written in CJK scripts still line up.

use unicode_width::UnicodeWidthStr;

use crate::pipeline::AnalysisReport;

const HEADERS: [&str; 4] = ["table", "type", "debt", "top issue"];

pub struct TextTable {
    rows: Vec<[String; 4]>,
    pub gap: usize,
}

impl Default for TextTable {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            gap: 2,
        }
    }
}

impl TextTable {
    pub fn push(&mut self, row: [String; 4]) {
        self.rows.push(row);
    }

    pub fn text_width(text: &str) -> usize {
        UnicodeWidthStr::width(text)
    }

    fn column_widths(&self) -> [usize; 4] {
        let mut widths = HEADERS.map(Self::text_width);
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(Self::text_width(cell));
            }
        }
        widths
    }

    pub fn render(&self) -> String {
        let widths = self.column_widths();
        let mut out = String::new();
        self.write_row(&mut out, &HEADERS.map(String::from), &widths);
        self.write_row(&mut out, &widths.map(|w| "-".repeat(w)), &widths);
        for row in &self.rows {
            self.write_row(&mut out, row, &widths);
        }
        out
    }

    fn write_row(&self, out: &mut String, cells: &[String; 4], widths: &[usize; 4]) {
        let mut line = String::new();
        for (i, (cell, width)) in cells.iter().zip(widths).enumerate() {
            line.push_str(cell);
            if i + 1 < cells.len() {
                let pad = width - Self::text_width(cell) + self.gap;
                line.push_str(&" ".repeat(pad));
            }
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
}

/// Per-table overview followed by totals.
pub fn render(report: &AnalysisReport) -> String {
    let mut table = TextTable::default();
    for (name, t) in &report.schema.tables {
        let score = report.debt_scores.iter().find(|s| &s.table_name == name);
        table.push([
            name.clone(),
            t.table_type.as_str().to_string(),
            score.map(|s| s.score.to_string()).unwrap_or_else(|| "-".into()),
            score
                .and_then(|s| s.main_issues.first().cloned())
                .unwrap_or_default(),
        ]);
    }

    let mut out = table.render();
    out.push('\n');
    out.push_str(&format!(
        "{} tables, {} relation issues, {} normalization suggestions, {} debt flags, {} renames\n",
        report.schema.tables.len(),
        report.relation_issues.len(),
        report.normalization_suggestions.len(),
        report.debt_flags.len(),
        report.field_renaming_suggestions.len(),
    ));
    if !report.validation_errors.is_empty() {
        out.push_str(&format!("{} validation errors\n", report.validation_errors.len()));
    }
    out
}
