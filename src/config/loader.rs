//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    let config: GatewayConfig = toml::from_str(content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::StatusConfig;

    #[test]
    fn empty_file_yields_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.command.program, "aux4");
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert!(config.api.is_empty());
    }

    #[test]
    fn parses_route_overrides() {
        let config = parse_config(
            r#"
            [command]
            program = "mycli"
            path_prefix = "/api"

            [response.headers]
            "X-Powered-By" = "gateway"

            [api."GET /users/list".response]
            status = 201

            [api."POST /users/create".response.status]
            "0" = 201
            "2" = 409

            [api."GET /report".output]
            base64 = true

            [api."GET /dashboard".view]
            name = "dashboard"
            layout = "admin"
            "#,
        )
        .unwrap();

        assert_eq!(config.command.program, "mycli");
        assert_eq!(config.command.path_prefix.as_deref(), Some("/api"));
        assert_eq!(config.response.headers["X-Powered-By"], "gateway");
        assert_eq!(
            config.api["GET /users/list"].response.status,
            Some(StatusConfig::Code(201))
        );
        match &config.api["POST /users/create"].response.status {
            Some(StatusConfig::Map(map)) => {
                assert_eq!(map["0"], 201);
                assert_eq!(map["2"], 409);
            }
            other => panic!("expected status map, got {:?}", other),
        }
        assert!(config.api["GET /report"].output.base64);
        let view = config.api["GET /dashboard"].view.as_ref().unwrap();
        assert_eq!(view.name, "dashboard");
        assert_eq!(view.layout.as_deref(), Some("admin"));
    }

    #[test]
    fn reports_validation_errors() {
        let err = parse_config(
            r#"
            [api."FETCH /x".response]
            status = 999
            "#,
        )
        .unwrap_err();

        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {}", other),
        }
    }

    #[test]
    fn example_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("gateway.example.toml");
        let config = load_config(&path).unwrap();
        assert_eq!(config.uploads.max_files, Some(10));
        assert!(config.api["GET /users/avatar"].output.base64);
        assert!(config.api["GET /report"].command.is_some());
    }

    #[test]
    fn reports_parse_errors() {
        assert!(matches!(
            parse_config("[listener\nbind_address = 1"),
            Err(ConfigError::Parse(_))
        ));
    }
}
