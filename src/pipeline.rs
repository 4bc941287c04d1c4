//! Ordered stage runner.
//!
//! classify -> types -> relations -> normalize -> debt -> prisma. Each stage
//! takes the previous stage's schema by reference and returns a new one.

use serde::Serialize;
use tracing::{info, warn};

use crate::classify::RuleClassifier;
use crate::config::AnalyzerConfig;
use crate::debt::{DebtFlag, DebtScore, DebtScorer, FieldRenamingSuggestion};
use crate::error::Result;
use crate::joins::SourceText;
use crate::normalize::{NormalizationSuggestion, Normalizer};
use crate::prisma::PrismaGenerator;
use crate::relations::{RelationAnalyzer, RelationIssue};
use crate::schema::{validate_schema, Schema};
use crate::sql::parse_sql;
use crate::types::{TypeConversionMap, TypeConverter};

pub struct AnalysisInput<'a> {
    pub schema: Schema,
    /// Raw dump text, mined for JOINs when enabled.
    pub sql: &'a str,
    pub sources: &'a [SourceText],
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub schema: Schema,
    pub validation_errors: Vec<String>,
    pub relation_issues: Vec<RelationIssue>,
    pub normalization_suggestions: Vec<NormalizationSuggestion>,
    pub type_conversions: TypeConversionMap,
    pub debt_scores: Vec<DebtScore>,
    pub field_renaming_suggestions: Vec<FieldRenamingSuggestion>,
    pub debt_flags: Vec<DebtFlag>,
    pub prisma_schema: String,
}

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: AnalyzerConfig,
}

impl Pipeline {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, input: &AnalysisInput) -> AnalysisReport {
        let validation_errors = validate_schema(&input.schema);
        for error in &validation_errors {
            warn!("{error}");
        }

        let classified = RuleClassifier::new(self.config.classifier.clone()).classify(&input.schema);
        let converted = TypeConverter::default().convert(&classified);
        let related = RelationAnalyzer::new(self.config.analyze_joins).analyze(
            &converted.schema,
            input.sql,
            input.sources,
        );
        let normalization_suggestions = Normalizer::new(self.config.normalizer.clone()).analyze(&related.schema);
        let debt = DebtScorer::default().score(&related.schema);
        let prisma_schema = PrismaGenerator::default().generate(&debt.schema);

        info!(
            tables = debt.schema.tables.len(),
            validation_errors = validation_errors.len(),
            "analysis complete"
        );
        AnalysisReport {
            schema: debt.schema,
            validation_errors,
            relation_issues: related.issues,
            normalization_suggestions,
            type_conversions: converted.conversions,
            debt_scores: debt.scores,
            field_renaming_suggestions: debt.renamings,
            debt_flags: debt.flags,
            prisma_schema,
        }
    }
}

/// Parse a dump and run every stage on it.
pub fn analyze_sql(sql: &str, sources: &[SourceText], config: &AnalyzerConfig) -> Result<AnalysisReport> {
    let schema = parse_sql(sql)?;
    let input = AnalysisInput { schema, sql, sources };
    Ok(Pipeline::new(config.clone()).run(&input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::schema::{Cardinality, TableType};

    const DUMP: &str = r#"
-- MySQL dump 10.13
CREATE TABLE `users` (
  `id` int(11) NOT NULL AUTO_INCREMENT,
  `email` varchar(255) NOT NULL,
  `user_status` varchar(20) NOT NULL DEFAULT 'active' COMMENT 'values: active, inactive',
  PRIMARY KEY (`id`),
  UNIQUE KEY `uq_email` (`email`)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;

CREATE TABLE `orders` (
  `id` int(11) NOT NULL AUTO_INCREMENT,
  `user_id` int(11) NOT NULL,
  `total` decimal(10,2) NOT NULL,
  `status` tinyint(1) NOT NULL DEFAULT '0',
  `created_at` datetime NOT NULL,
  PRIMARY KEY (`id`)
) ENGINE=InnoDB;

CREATE TABLE `orders_log` (
  `id` int(11) NOT NULL AUTO_INCREMENT,
  `user_id` int(11) NOT NULL,
  `total` decimal(10,2) NOT NULL,
  `status` tinyint(1) NOT NULL DEFAULT '0',
  `created_at` datetime NOT NULL,
  `logged_at` datetime NOT NULL,
  PRIMARY KEY (`id`)
) ENGINE=InnoDB;

CREATE TABLE `tmp_cache_1` (
  `k` varchar(64) DEFAULT NULL,
  `v` text
) ENGINE=MEMORY;
"#;

    fn report() -> AnalysisReport {
        analyze_sql(DUMP, &[], &AnalyzerConfig::default()).unwrap()
    }

    #[test]
    fn test_implicit_relation_and_inverse() {
        let report = report();
        let orders = &report.schema.tables["orders"];
        let forward = orders
            .relations
            .iter()
            .find(|r| r.source_column == "user_id")
            .unwrap();
        assert_eq!(forward.target_table, "users");
        assert_eq!(forward.target_column, "id");
        assert_eq!(forward.cardinality, Cardinality::ManyToOne);
        assert!(forward.is_implicit);

        let users = &report.schema.tables["users"];
        assert!(users.relations.iter().any(|r| {
            r.cardinality == Cardinality::OneToMany && r.target_table == "orders" && r.target_column == "user_id"
        }));
    }

    #[test]
    fn test_tinyint_flag_becomes_boolean() {
        let report = report();
        let status = &report.schema.tables["orders"].columns["status"];
        assert_eq!(status.suggested_postgres_type.as_deref(), Some("BOOLEAN"));
        assert_eq!(status.suggested_prisma_type.as_deref(), Some("Boolean"));
    }

    #[test]
    fn test_temporary_table_is_technical_and_penalized() {
        let report = report();
        let cache = &report.schema.tables["tmp_cache_1"];
        assert!(matches!(cache.table_type, TableType::Technical | TableType::Cache));

        let score = report.debt_scores.iter().find(|s| s.table_name == "tmp_cache_1").unwrap();
        assert!(score.score < 100);
        assert_eq!(cache.debt_score, Some(score.score));
    }

    #[test]
    fn test_log_table_is_redundant() {
        let report = report();
        let redundant = report
            .normalization_suggestions
            .iter()
            .find_map(|s| match s {
                NormalizationSuggestion::RedundantTables(r) => Some(r),
                _ => None,
            })
            .unwrap();
        assert!(redundant.tables.contains(&"orders".to_string()));
        assert!(redundant.tables.contains(&"orders_log".to_string()));
        assert!(redundant.sql.contains("`record_type` ENUM("));
    }

    #[test]
    fn test_status_enum_reaches_prisma() {
        let report = report();
        let column = &report.schema.tables["users"].columns["user_status"];
        assert_eq!(column.suggested_prisma_type.as_deref(), Some("enum"));
        assert!(report.prisma_schema.contains("enum UserStatus {\n  active\n  inactive\n}"));
        assert!(report.prisma_schema.contains("model Orders {"));
        assert!(report.prisma_schema.contains("@@map(\"tmp_cache_1\")"));
    }

    #[test]
    fn test_every_column_gets_types() {
        let report = report();
        for table in report.schema.tables.values() {
            for column in table.columns.values() {
                assert!(column.suggested_postgres_type.as_deref().is_some_and(|t| !t.is_empty()));
                assert!(column.suggested_prisma_type.as_deref().is_some_and(|t| !t.is_empty()));
            }
        }
    }

    #[test]
    fn test_report_json_shape() {
        let json = serde_json::to_value(report()).unwrap();
        assert!(json["typeConversions"].is_array());
        assert!(json["prismaSchema"].as_str().unwrap().contains("datasource db"));
        assert!(json["normalizationSuggestions"]
            .as_array()
            .unwrap()
            .iter()
            .any(|s| s["type"] == "REDUNDANT_TABLES"));
        assert_eq!(json["schema"]["tables"]["tmp_cache_1"]["tableType"], "TECHNICAL");
    }

    #[test]
    fn test_dangling_foreign_key_is_reported_not_fatal() {
        let sql = "CREATE TABLE `items` (
            `id` int NOT NULL,
            `owner_ref` int NOT NULL,
            PRIMARY KEY (`id`),
            CONSTRAINT `fk_owner` FOREIGN KEY (`owner_ref`) REFERENCES `owners` (`id`)
        );";
        let report = analyze_sql(sql, &[], &AnalyzerConfig::default()).unwrap();

        assert_eq!(report.validation_errors.len(), 1);
        assert!(report.validation_errors[0].contains("unknown table owners"));
        assert!(!report.relation_issues.is_empty());
    }

    #[test]
    fn test_parse_failure_is_an_error() {
        let err = analyze_sql("CREATE TABLE broken (id int", &[], &AnalyzerConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }
}
