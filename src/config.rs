//! Analyzer settings.
//!
//! Every field is optional in JSON; missing ones take the defaults below.
//!
//! ```json
//! {
//!   "analyze_joins": true,
//!   "classifier": { "fallback": "BUSINESS_CORE" },
//!   "normalizer": { "temporal_similarity_threshold": 0.8 }
//! }
//! ```

use serde::Deserialize;

use crate::classify::ClassifierConfig;
use crate::error::Result;
use crate::normalize::NormalizerConfig;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Mine JOIN conditions from the dump and source files for extra relations.
    pub analyze_joins: bool,
    pub classifier: ClassifierConfig,
    pub normalizer: NormalizerConfig,
}

impl AnalyzerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::schema::TableType;

    #[test]
    fn test_defaults() {
        let config = AnalyzerConfig::from_json("{}").unwrap();
        assert_eq!(config, AnalyzerConfig::default());
        assert!(!config.analyze_joins);
        assert_eq!(config.classifier.fallback, TableType::Unknown);
        assert_eq!(config.classifier.incoming_fk_threshold, 3);
        assert_eq!(config.normalizer.temporal_similarity_threshold, 0.70);
        assert_eq!(config.normalizer.structural_similarity_threshold, 0.85);
    }

    #[test]
    fn test_partial_override() {
        let config = AnalyzerConfig::from_json(
            r#"{"analyze_joins": true, "classifier": {"fallback": "BUSINESS_CORE"}, "normalizer": {"temporal_similarity_threshold": 0.8}}"#,
        )
        .unwrap();

        assert!(config.analyze_joins);
        assert_eq!(config.classifier.fallback, TableType::BusinessCore);
        assert_eq!(config.classifier.incoming_fk_threshold, 3);
        assert_eq!(config.normalizer.temporal_similarity_threshold, 0.8);
        assert_eq!(config.normalizer.structural_similarity_threshold, 0.85);
    }

    #[test]
    fn test_invalid_config() {
        let err = AnalyzerConfig::from_json(r#"{"classifier": {"fallback": "NOPE"}}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
