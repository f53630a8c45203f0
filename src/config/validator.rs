use crate::config::Config;
use crate::error::{FinderError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every problem found
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_search(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(FinderError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        // Existence is checked when the store is opened; the paths may still hold `~`
        if config.storage.database_path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.database_path",
                "Database path cannot be empty",
            ));
        }

        if config.storage.index_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.index_dir",
                "Index directory cannot be empty",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }
    }

    fn validate_search(config: &Config, errors: &mut Vec<ValidationError>) {
        let search = &config.search;

        if search.default_limit == 0 {
            errors.push(ValidationError::new(
                "search.default_limit",
                "Default limit must be greater than 0",
            ));
        }

        if search.max_limit == 0 {
            errors.push(ValidationError::new(
                "search.max_limit",
                "Max limit must be greater than 0",
            ));
        } else if search.default_limit > search.max_limit {
            errors.push(ValidationError::new(
                "search.default_limit",
                format!(
                    "Default limit {} exceeds max limit {}",
                    search.default_limit, search.max_limit
                ),
            ));
        }

        let threshold = search.default_threshold;
        if !threshold.is_finite() || !(-1.0..=1.0).contains(&threshold) {
            errors.push(ValidationError::new(
                "search.default_threshold",
                format!(
                    "Threshold must be between -1.0 and 1.0, got {}",
                    threshold
                ),
            ));
        }
    }
}
