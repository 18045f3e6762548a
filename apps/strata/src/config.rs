//! # Configuration
//!
//! `strata.toml` holds defaults for the store and the inference engine.
//! Command-line flags override values from the file.
//!
//! ```toml
//! [store]
//! backend = "redb"        # or "memory" (dump file at `path`)
//! path = "strata.db"
//!
//! [inference]
//! standard = "rdfs"       # or "none"
//! rules = "rules.txt"     # extra rules, merged over the standard set
//! encoding = "compressed" # or "uncompressed"
//! optimized_queries = false
//! recursive = true
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use strata_core::{
    BackendKind, InferenceEngine, ProvenanceEncoding, RuleParser, RuleSet, StandardRuleSet,
    StrataError,
};

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "strata.toml";

/// Database path used when neither the flag nor the file names one.
pub const DEFAULT_DATABASE: &str = "strata.db";

/// Maximum accepted config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// FILE SECTIONS
// =============================================================================

/// The parsed `strata.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StrataConfig {
    pub store: StoreSection,
    pub inference: InferenceSection,
}

/// `[store]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSection {
    pub backend: Option<BackendKind>,
    pub path: Option<PathBuf>,
}

/// `[inference]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InferenceSection {
    /// Built-in rule set to start from: `rdfs` or `none`.
    pub standard: String,
    /// Rule file merged over the standard set; same-named rules replace.
    pub rules: Option<PathBuf>,
    pub encoding: ProvenanceEncoding,
    pub optimized_queries: bool,
    pub recursive: bool,
}

impl Default for InferenceSection {
    fn default() -> Self {
        Self {
            standard: "rdfs".to_string(),
            rules: None,
            encoding: ProvenanceEncoding::default(),
            optimized_queries: false,
            recursive: true,
        }
    }
}

impl InferenceSection {
    /// The configured rules.
    pub fn rule_set(&self) -> Result<RuleSet, StrataError> {
        let mut rules = match self.standard.to_ascii_lowercase().as_str() {
            "rdfs" => RuleSet::standard(StandardRuleSet::Rdfs)?,
            "none" => RuleSet::new(),
            other => {
                return Err(StrataError::InvalidArgument(format!(
                    "Unknown standard rule set '{}'. Use: rdfs, none",
                    other
                )));
            }
        };
        if let Some(path) = &self.rules {
            let mut parser = RuleParser::new();
            parser.parse_file(path)?;
            for rule in parser.into_rules() {
                rules.insert(rule);
            }
        }
        Ok(rules)
    }

    /// An engine carrying the configured rules and options.
    pub fn engine(&self) -> Result<InferenceEngine, StrataError> {
        let mut engine = InferenceEngine::with_rules(self.rule_set()?);
        engine.set_provenance_encoding(self.encoding);
        engine.set_optimized_queries_enabled(self.optimized_queries);
        engine.set_recursive(self.recursive);
        Ok(engine)
    }
}

// =============================================================================
// LOADING
// =============================================================================

impl StrataConfig {
    pub fn from_toml(text: &str) -> Result<Self, StrataError> {
        toml::from_str(text)
            .map_err(|e| StrataError::InvalidArgument(format!("Invalid configuration: {}", e)))
    }

    /// Load `path`, or `strata.toml` from the working directory if present.
    ///
    /// An explicit path that does not exist is an error; a missing default
    /// file yields the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, StrataError> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        if !path.exists() {
            if required {
                return Err(StrataError::NotFound(format!(
                    "Configuration file {}",
                    path.display()
                )));
            }
            return Ok(Self::default());
        }

        let metadata = std::fs::metadata(&path).map_err(|e| {
            StrataError::BackendFailure(format!("Cannot read {}: {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(StrataError::InvalidArgument(format!(
                "Configuration file {} exceeds {} bytes",
                path.display(),
                MAX_CONFIG_FILE_SIZE
            )));
        }

        let text = std::fs::read_to_string(&path).map_err(|e| {
            StrataError::BackendFailure(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml(&text)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Apply command-line overrides.
    pub fn resolve(
        self,
        database: Option<PathBuf>,
        backend: Option<&str>,
    ) -> Result<Settings, StrataError> {
        let backend = match backend {
            Some(name) => name.parse()?,
            None => self.store.backend.unwrap_or(BackendKind::Redb),
        };
        let database = database
            .or(self.store.path)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE));
        Ok(Settings {
            database,
            backend,
            inference: self.inference,
        })
    }
}

/// Effective settings for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database: PathBuf,
    pub backend: BackendKind,
    pub inference: InferenceSection,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_file() {
        let config = StrataConfig::from_toml(
            r#"
            [store]
            backend = "memory"
            path = "data/people.db"

            [inference]
            standard = "none"
            encoding = "uncompressed"
            optimized_queries = true
            recursive = false
            "#,
        )
        .expect("valid config");

        assert_eq!(config.store.backend, Some(BackendKind::Memory));
        assert_eq!(config.store.path, Some(PathBuf::from("data/people.db")));
        assert_eq!(config.inference.encoding, ProvenanceEncoding::Uncompressed);
        assert!(config.inference.optimized_queries);
        assert!(!config.inference.recursive);
        assert!(config.inference.rule_set().expect("rules").is_empty());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = StrataConfig::from_toml("").expect("empty config");
        assert_eq!(config, StrataConfig::default());
        assert_eq!(config.inference.rule_set().expect("rules").len(), 6);
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = StrataConfig::from_toml("[store]\nbackand = \"redb\"\n").expect_err("typo");
        assert!(matches!(err, StrataError::InvalidArgument(_)));
    }

    #[test]
    fn flags_override_file() {
        let config = StrataConfig::from_toml("[store]\nbackend = \"memory\"\npath = \"a.db\"\n")
            .expect("config");
        let settings = config
            .clone()
            .resolve(Some(PathBuf::from("b.db")), Some("redb"))
            .expect("resolve");
        assert_eq!(settings.database, PathBuf::from("b.db"));
        assert_eq!(settings.backend, BackendKind::Redb);

        let settings = config.resolve(None, None).expect("resolve");
        assert_eq!(settings.database, PathBuf::from("a.db"));
        assert_eq!(settings.backend, BackendKind::Memory);
    }

    #[test]
    fn unknown_standard_set_is_rejected() {
        let section = InferenceSection {
            standard: "owl".to_string(),
            ..InferenceSection::default()
        };
        assert!(section.engine().is_err());
    }
}
