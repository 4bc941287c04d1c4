pub mod batch;
pub mod classify;
pub mod config;
pub mod debt;
pub mod error;
pub mod joins;
pub mod naming;
pub mod normalize;
pub mod pipeline;
pub mod prisma;
pub mod relations;
pub mod schema;
pub mod sql;
pub mod summary;
pub mod types;

use wasm_bindgen::prelude::*;

use config::AnalyzerConfig;
use pipeline::analyze_sql;

/// Initialize panic hook for better error messages in WASM
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();
}

/// Analyze a MySQL dump and return the full report as JSON
#[wasm_bindgen(js_name = "analyzeSql")]
pub fn analyze(sql: &str, analyze_joins: Option<bool>) -> Result<String, String> {
    let config = AnalyzerConfig {
        analyze_joins: analyze_joins.unwrap_or(false),
        ..AnalyzerConfig::default()
    };
    let report = analyze_sql(sql, &[], &config).map_err(|e| e.to_string())?;
    serde_json::to_string(&report).map_err(|e| e.to_string())
}

/// Convert a MySQL dump straight to a suggested Prisma schema
#[wasm_bindgen(js_name = "sqlToPrisma")]
pub fn sql_to_prisma(sql: &str) -> Result<String, String> {
    let report = analyze_sql(sql, &[], &AnalyzerConfig::default()).map_err(|e| e.to_string())?;
    Ok(report.prisma_schema)
}
