use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 8 * 1024 * 1024;
pub const DEFAULT_MAX_DEPTH: usize = 128;
pub const DEFAULT_READ_CHUNK_BYTES: usize = 8192;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct TransformLimits {
    /// `None` disables the size bound.
    pub max_document_bytes: Option<usize>,
    pub max_depth: usize,
}

impl Default for TransformLimits {
    fn default() -> Self {
        Self {
            max_document_bytes: Some(DEFAULT_MAX_DOCUMENT_BYTES),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Which responses are admitted for rewriting.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct EligibilityConfig {
    pub statuses: Vec<u16>,
    /// Matched case-insensitively as a prefix of the `Content-Type` value.
    pub content_types: Vec<String>,
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        Self {
            statuses: vec![200],
            content_types: vec!["application/json".to_string()],
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub limits: TransformLimits,
    pub eligibility: EligibilityConfig,
    /// Read size used by the async driver when pulling from the upstream.
    pub read_chunk_bytes: usize,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            limits: TransformLimits::default(),
            eligibility: EligibilityConfig::default(),
            read_chunk_bytes: DEFAULT_READ_CHUNK_BYTES,
        }
    }
}

impl TransformConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(input).map_err(|source| ConfigError::TomlDecode { source })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_chunk_bytes == 0 {
            return Err(invalid("read_chunk_bytes must be greater than zero"));
        }
        if self.limits.max_depth == 0 {
            return Err(invalid("limits.max_depth must be greater than zero"));
        }
        if self.limits.max_document_bytes == Some(0) {
            return Err(invalid("limits.max_document_bytes must be greater than zero"));
        }
        if self.eligibility.statuses.is_empty() {
            return Err(invalid("eligibility.statuses must not be empty"));
        }
        if self.eligibility.content_types.is_empty() {
            return Err(invalid("eligibility.content_types must not be empty"));
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> ConfigError {
    ConfigError::Invalid {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = TransformConfig::from_toml_str("").unwrap();
        assert_eq!(config, TransformConfig::default());
        assert_eq!(config.eligibility.statuses, vec![200]);
    }

    #[test]
    fn partial_tables_keep_remaining_defaults() {
        let config = TransformConfig::from_toml_str(
            r#"
            read_chunk_bytes = 512

            [limits]
            max_depth = 16

            [eligibility]
            content_types = ["application/json", "application/vnd.api+json"]
            "#,
        )
        .unwrap();

        assert_eq!(config.read_chunk_bytes, 512);
        assert_eq!(config.limits.max_depth, 16);
        assert_eq!(
            config.limits.max_document_bytes,
            Some(DEFAULT_MAX_DOCUMENT_BYTES)
        );
        assert_eq!(config.eligibility.statuses, vec![200]);
        assert_eq!(config.eligibility.content_types.len(), 2);
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let err = TransformConfig::from_toml_str("read_chunk_bytes = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn rejects_empty_status_list() {
        let err = TransformConfig::from_toml_str("[eligibility]\nstatuses = []").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn rejects_empty_content_type_list() {
        let err =
            TransformConfig::from_toml_str("[eligibility]\ncontent_types = []").unwrap_err();
        match err {
            ConfigError::Invalid { reason } => assert!(reason.contains("content_types")),
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn reads_config_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jcrusher.toml");
        std::fs::write(&path, "[limits]\nmax_document_bytes = 1024\n").unwrap();

        let config = TransformConfig::from_path(&path).unwrap();
        assert_eq!(config.limits.max_document_bytes, Some(1024));

        let missing = TransformConfig::from_path(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }
}
