use axum::body::Body;
use hyper::{Request, Response};
use tracing::Level;

use super::SettingsReader;
use crate::core::chain::Next;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineFormat {
    Text,
    Json,
}

/// Emits one log line per request before passing it on.
#[derive(Debug)]
pub struct LoggingFilter {
    level: Level,
    format: LineFormat,
}

impl LoggingFilter {
    pub(super) fn from_settings(reader: &mut SettingsReader<'_>) -> Self {
        let raw_level = reader.string_or("level", "INFO");
        let level = match raw_level.to_ascii_uppercase().as_str() {
            "TRACE" => Level::TRACE,
            "DEBUG" => Level::DEBUG,
            "INFO" => Level::INFO,
            "WARN" | "WARNING" => Level::WARN,
            "ERROR" => Level::ERROR,
            _ => {
                reader.warn("level", format!("unknown level '{raw_level}'; using INFO"));
                Level::INFO
            }
        };
        let format = match reader.string_or("format", "text").to_ascii_lowercase().as_str() {
            "json" => LineFormat::Json,
            _ => LineFormat::Text,
        };
        Self { level, format }
    }

    pub fn line<B>(&self, req: &Request<B>) -> String {
        match self.format {
            LineFormat::Text => format!("[{}] {} {}", self.level, req.method(), req.uri().path()),
            LineFormat::Json => serde_json::json!({
                "level": self.level.as_str(),
                "method": req.method().as_str(),
                "path": req.uri().path(),
            })
            .to_string(),
        }
    }

    pub(super) async fn apply(&self, req: Request<Body>, next: Next<'_>) -> Response<Body> {
        let line = self.line(&req);
        let route = &next.context().route_id;
        match self.level {
            Level::TRACE => tracing::trace!(route = %route, "{line}"),
            Level::DEBUG => tracing::debug!(route = %route, "{line}"),
            Level::INFO => tracing::info!(route = %route, "{line}"),
            Level::WARN => tracing::warn!(route = %route, "{line}"),
            _ => tracing::error!(route = %route, "{line}"),
        }
        next.run(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::FilterSpec;

    fn build(spec: FilterSpec) -> (LoggingFilter, usize) {
        let mut reader = SettingsReader::new(&spec);
        let filter = LoggingFilter::from_settings(&mut reader);
        (filter, reader.finish().len())
    }

    fn request() -> Request<()> {
        Request::builder().method("POST").uri("/orders?x=1").body(()).unwrap()
    }

    #[test]
    fn test_text_line() {
        let (filter, warnings) = build(FilterSpec::new("Logging"));
        assert_eq!(warnings, 0);
        assert_eq!(filter.line(&request()), "[INFO] POST /orders");
    }

    #[test]
    fn test_json_line() {
        let (filter, _) = build(
            FilterSpec::new("Logging")
                .with_setting("level", "debug")
                .with_setting("format", "json"),
        );
        let parsed: serde_json::Value = serde_json::from_str(&filter.line(&request())).unwrap();
        assert_eq!(parsed["level"], "DEBUG");
        assert_eq!(parsed["method"], "POST");
        assert_eq!(parsed["path"], "/orders");
    }

    #[test]
    fn test_unknown_level_falls_back_to_info() {
        let (filter, warnings) = build(FilterSpec::new("Logging").with_setting("level", "LOUD"));
        assert_eq!(filter.level, Level::INFO);
        assert_eq!(warnings, 1);
    }
}
