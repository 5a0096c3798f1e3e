#![allow(clippy::collapsible_if)]

use std::{collections::HashSet, net::SocketAddr};

use eyre::Result;
use http::{HeaderName, Method, StatusCode};
use regex::Regex;

use crate::config::models::{FilterSpec, GatewayConfig, RouteConfig};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Route conflict detected: {message}")]
    RouteConflict { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Gateway configuration validator
pub struct GatewayConfigValidator;

impl GatewayConfigValidator {
    /// Validate the entire gateway configuration, collecting every problem found.
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        for (index, route) in config.routes.iter().enumerate() {
            if let Err(mut route_errors) = Self::validate_single_route(index, route) {
                errors.append(&mut route_errors);
            }
        }

        if let Err(mut id_errors) = Self::check_duplicate_ids(&config.routes) {
            errors.append(&mut id_errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:8787' or '0.0.0.0:8787')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn route_label(index: usize, route: &RouteConfig) -> String {
        if route.name.is_empty() {
            format!("routes[{index}]")
        } else {
            format!("route '{}'", route.name)
        }
    }

    fn validate_single_route(index: usize, route: &RouteConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let label = Self::route_label(index, route);

        if !route.path_prefix.is_empty() && !route.path_prefix.starts_with('/') {
            errors.push(ValidationError::InvalidField {
                field: format!("{label} path_prefix"),
                message: format!(
                    "Path prefixes must start with '/', got '{}'",
                    route.path_prefix
                ),
            });
        }

        for method in &route.methods {
            if Method::from_bytes(method.as_bytes()).is_err() {
                errors.push(ValidationError::InvalidField {
                    field: format!("{label} methods"),
                    message: format!("'{method}' is not a valid HTTP method"),
                });
            }
        }

        if !route.host.is_empty() {
            if let Err(e) = Self::validate_host(&route.host, &label) {
                errors.push(e);
            }
        }

        for name in route.headers.keys() {
            if HeaderName::from_bytes(name.as_bytes()).is_err() {
                errors.push(ValidationError::InvalidField {
                    field: format!("{label} headers"),
                    message: format!("'{name}' is not a valid header name"),
                });
            }
        }

        if route.is_enabled() && route.upstreams.is_empty() && !Self::is_terminal_only(route) {
            errors.push(ValidationError::MissingField {
                field: format!("{label} upstreams"),
            });
        }

        for (i, upstream) in route.upstreams.iter().enumerate() {
            if let Err(e) = Self::validate_url(upstream, &format!("{label} upstream {}", i + 1)) {
                errors.push(e);
            }
        }

        for filter in &route.filters {
            if let Err(e) = Self::validate_filter(filter, &label) {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Routes whose chain always answers on its own never reach an upstream.
    fn is_terminal_only(route: &RouteConfig) -> bool {
        route
            .filters
            .iter()
            .any(|f| f.name == "RedirectTo" || f.name == "SetStatus")
    }

    fn validate_url(url_str: &str, context: &str) -> ValidationResult<()> {
        match url::Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: format!(
                            "URL scheme must be 'http' or 'https', got '{}'",
                            url.scheme()
                        ),
                    });
                }

                if url.host().is_none() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "URL must have a valid host".to_string(),
                    });
                }

                Ok(())
            }
            Err(e) => Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Invalid URL format: {e}"),
            }),
        }
    }

    /// Checks the few filter settings that cannot degrade to a default at runtime.
    fn validate_filter(filter: &FilterSpec, label: &str) -> ValidationResult<()> {
        let field = format!("{label} filter '{}'", filter.name);
        match filter.name.as_str() {
            "RewritePath" => {
                let pattern = filter
                    .settings
                    .get("from")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                Regex::new(pattern).map_err(|e| ValidationError::InvalidField {
                    field,
                    message: format!("Invalid regular expression '{pattern}': {e}"),
                })?;
            }
            "SetStatus" | "RedirectTo" => {
                if let Some(code) = filter.settings.get("status_code").and_then(|v| v.as_u64()) {
                    let valid = u16::try_from(code)
                        .ok()
                        .and_then(|c| StatusCode::from_u16(c).ok())
                        .is_some();
                    if !valid {
                        return Err(ValidationError::InvalidField {
                            field,
                            message: format!("Status code {code} is out of range"),
                        });
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn check_duplicate_ids(routes: &[RouteConfig]) -> Result<(), Vec<ValidationError>> {
        let mut seen = HashSet::new();
        let errors: Vec<_> = routes
            .iter()
            .filter(|r| !r.id.is_empty())
            .filter(|r| !seen.insert(r.id.as_str()))
            .map(|r| ValidationError::RouteConflict {
                message: format!("Route id '{}' is used more than once", r.id),
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_host(host: &str, label: &str) -> ValidationResult<()> {
        if host.contains("://") {
            return Err(ValidationError::InvalidField {
                field: format!("{label} host"),
                message: "Host should not contain protocol (e.g., use 'example.com' not 'http://example.com')".to_string(),
            });
        }
        if host.contains('/') || host.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidField {
                field: format!("{label} host"),
                message: format!("Invalid host format: '{host}'"),
            });
        }
        Ok(())
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_valid_config() -> GatewayConfig {
        GatewayConfig {
            listen_addr: "127.0.0.1:8787".to_string(),
            routes: vec![
                RouteConfig::new("api", "/api")
                    .with_id("api-1")
                    .with_upstreams(["http://localhost:3000"]),
            ],
            ..GatewayConfig::default()
        }
    }

    #[test]
    fn validate_accepts_minimal_config() {
        assert!(GatewayConfigValidator::validate(&minimal_valid_config()).is_ok());
    }

    #[test]
    fn validate_rejects_bad_listen_addr() {
        let mut config = minimal_valid_config();
        config.listen_addr = "localhost".to_string();
        let err = GatewayConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("Invalid listen address"));
    }

    #[test]
    fn validate_rejects_non_http_upstream() {
        let mut config = minimal_valid_config();
        config.routes[0].upstreams = vec!["ftp://files.local".to_string()];
        let err = GatewayConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("scheme must be 'http' or 'https'"));
    }

    #[test]
    fn validate_rejects_enabled_route_without_upstreams() {
        let mut config = minimal_valid_config();
        config.routes[0].upstreams.clear();
        assert!(GatewayConfigValidator::validate(&config).is_err());

        config.routes[0].enabled = Some(false);
        assert!(GatewayConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn validate_allows_terminal_route_without_upstreams() {
        let mut config = minimal_valid_config();
        config.routes.push(
            RouteConfig::new("gone", "/gone")
                .with_filter(FilterSpec::new("SetStatus").with_setting("status_code", 410)),
        );
        assert!(GatewayConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn validate_rejects_bad_rewrite_regex() {
        let mut config = minimal_valid_config();
        config.routes[0].filters.push(
            FilterSpec::new("RewritePath")
                .with_setting("from", "/api/(.*")
                .with_setting("to", "/$1"),
        );
        let err = GatewayConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("Invalid regular expression"));
    }

    #[test]
    fn validate_rejects_duplicate_ids_and_collects_all_errors() {
        let mut config = minimal_valid_config();
        config.routes.push(
            RouteConfig::new("api-copy", "no-slash")
                .with_id("api-1")
                .with_upstreams(["http://localhost:3001"]),
        );
        let message = GatewayConfigValidator::validate(&config)
            .unwrap_err()
            .to_string();
        assert!(message.contains("Found 2 validation errors"));
        assert!(message.contains("used more than once"));
        assert!(message.contains("must start with '/'"));
    }

    #[test]
    fn validate_rejects_invalid_method_and_host() {
        let mut config = minimal_valid_config();
        config.routes[0].methods = vec!["GE T".to_string()];
        config.routes[0].host = "http://example.com".to_string();
        let message = GatewayConfigValidator::validate(&config)
            .unwrap_err()
            .to_string();
        assert!(message.contains("not a valid HTTP method"));
        assert!(message.contains("should not contain protocol"));
    }
}
