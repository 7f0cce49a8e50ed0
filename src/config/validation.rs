//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("defaults.guard is required")]
    MissingDefaultGuard,
    #[error("guards[{0}].name is required")]
    MissingGuardName(usize),
    #[error("guards[{0}].model is required")]
    MissingGuardModel(usize),
    #[error("guard `{0}` is declared more than once")]
    DuplicateGuard(String),
    #[error("defaults.guard `{0}` is not declared in [[guards]]")]
    UnknownDefaultGuard(String),
    #[error("guard_overrides.{model} points at undeclared guard `{guard}`")]
    UnknownOverrideGuard { model: String, guard: String },
    #[error("models.{0} is required")]
    MissingModelTag(&'static str),
    #[error("collection name `{0}` must match [A-Za-z_][A-Za-z0-9_]*")]
    InvalidCollectionName(String),
    #[error("collection name `{0}` is used more than once")]
    DuplicateCollectionName(String),
    #[error("cache.ttl_secs must be greater than zero")]
    ZeroCacheTtl,
    #[error("database.path parent directory does not exist: {0}")]
    DatabasePathInvalid(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.defaults.guard.is_empty() {
        errors.push(ValidationError::MissingDefaultGuard);
    }

    // Guard blocks
    let mut seen = HashSet::new();
    for (idx, guard) in config.guards.iter().enumerate() {
        if guard.name.is_empty() {
            errors.push(ValidationError::MissingGuardName(idx));
        } else if !seen.insert(guard.name.as_str()) {
            errors.push(ValidationError::DuplicateGuard(guard.name.clone()));
        }
        if guard.model.is_empty() {
            errors.push(ValidationError::MissingGuardModel(idx));
        }
    }

    if !config.guards.is_empty()
        && !config.defaults.guard.is_empty()
        && !seen.contains(config.defaults.guard.as_str())
    {
        errors.push(ValidationError::UnknownDefaultGuard(
            config.defaults.guard.clone(),
        ));
    }

    for (model, guard) in &config.guard_overrides {
        if guard != &config.defaults.guard && !seen.contains(guard.as_str()) {
            errors.push(ValidationError::UnknownOverrideGuard {
                model: model.clone(),
                guard: guard.clone(),
            });
        }
    }

    if config.models.permission.is_empty() {
        errors.push(ValidationError::MissingModelTag("permission"));
    }
    if config.models.role.is_empty() {
        errors.push(ValidationError::MissingModelTag("role"));
    }

    // Collection names end up in SQL text, so they must be plain identifiers.
    let mut collections = HashSet::new();
    for name in config.collection_names.all() {
        if !is_identifier(name) {
            errors.push(ValidationError::InvalidCollectionName(name.to_string()));
        } else if !collections.insert(name.to_ascii_lowercase()) {
            errors.push(ValidationError::DuplicateCollectionName(name.to_string()));
        }
    }

    if config.cache.ttl_secs == Some(0) {
        errors.push(ValidationError::ZeroCacheTtl);
    }

    if let Some(ref db) = config.database
        && db.path != ":memory:"
    {
        let db_path = Path::new(&db.path);
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            errors.push(ValidationError::DatabasePathInvalid(db.path.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate(&Config::default()), Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let config = Config::parse(
            r#"
            [defaults]
            guard = "admin"

            [[guards]]
            name = "web"

            [[guards]]
            name = "web"

            [guard_overrides]
            bot = "robots"

            [collection_names]
            roles = "roles; DROP TABLE roles"
            model_has_roles = "permissions"

            [cache]
            ttl_secs = 0

            [database]
            path = "/definitely/not/here/acl.db"
            "#,
        )
        .unwrap();

        let errors = validate(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::DuplicateGuard("web".into())));
        assert!(errors.contains(&ValidationError::UnknownDefaultGuard("admin".into())));
        assert!(errors.contains(&ValidationError::UnknownOverrideGuard {
            model: "bot".into(),
            guard: "robots".into(),
        }));
        assert!(errors.contains(&ValidationError::InvalidCollectionName(
            "roles; DROP TABLE roles".into()
        )));
        assert!(errors.contains(&ValidationError::DuplicateCollectionName(
            "permissions".into()
        )));
        assert!(errors.contains(&ValidationError::ZeroCacheTtl));
        assert!(errors.contains(&ValidationError::DatabasePathInvalid(
            "/definitely/not/here/acl.db".into()
        )));
    }

    #[test]
    fn test_override_may_name_default_guard() {
        let mut config = Config::default();
        config.guards.clear();
        config.defaults.guard = "web".into();
        config
            .guard_overrides
            .insert("admin".into(), "web".into());
        assert_eq!(validate(&config), Ok(()));
    }

    #[test]
    fn test_identifier_rules() {
        assert!(is_identifier("permissions"));
        assert!(is_identifier("_acl_2"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("2fa"));
        assert!(!is_identifier("acl-roles"));
    }
}
