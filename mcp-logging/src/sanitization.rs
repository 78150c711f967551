//! Log sanitization for probe diagnostics
//!
//! Error messages from token endpoints and upstream servers routinely echo
//! credentials back. Everything that ends up in a log line or in a health
//! report diagnostic passes through [`LogSanitizer`] first.

use regex::Regex;
use std::sync::OnceLock;

/// Regex patterns for detecting sensitive information
static PASSWORD_REGEX: OnceLock<Regex> = OnceLock::new();
static TOKEN_REGEX: OnceLock<Regex> = OnceLock::new();
static API_KEY_REGEX: OnceLock<Regex> = OnceLock::new();
static CREDENTIAL_REGEX: OnceLock<Regex> = OnceLock::new();
static AUTH_SCHEME_REGEX: OnceLock<Regex> = OnceLock::new();
static URL_USERINFO_REGEX: OnceLock<Regex> = OnceLock::new();
static IP_REGEX: OnceLock<Regex> = OnceLock::new();

/// Initialize sanitization regex patterns
fn init_sanitization_patterns() {
    PASSWORD_REGEX.get_or_init(|| {
        Regex::new(
            r#"(?i)(["']?)(password|passwd|pwd|pass)(["']?)[\s]*[=:][\s]*["`']?([^'"`\s,}&]+)"#,
        )
        .expect("Invalid password regex")
    });

    TOKEN_REGEX.get_or_init(|| {
        Regex::new(r#"(?i)(["']?)(access_token|refresh_token|id_token|token)(["']?)[\s]*[=:][\s]*['"]?([a-zA-Z0-9._~+/=-]+)"#)
            .expect("Invalid token regex")
    });

    API_KEY_REGEX.get_or_init(|| {
        Regex::new(
            r#"(?i)(["']?)(x-api-key|api[_-]?key|apikey)(["']?)[\s]*[=:][\s]*['"]?([a-zA-Z0-9._-]+)"#,
        )
        .expect("Invalid API key regex")
    });

    CREDENTIAL_REGEX.get_or_init(|| {
        Regex::new(r#"(?i)(["']?)(client_secret|credentials|credential|secret)(["']?)[\s]*[=:][\s]*['"]?([^'"\s,}&]+)"#)
            .expect("Invalid credential regex")
    });

    AUTH_SCHEME_REGEX.get_or_init(|| {
        Regex::new(r"(?i)\b(bearer|basic)\s+([a-zA-Z0-9._~+/=-]+)")
            .expect("Invalid auth scheme regex")
    });

    URL_USERINFO_REGEX.get_or_init(|| {
        Regex::new(r"(?i)(https?://)([^/\s:@]+):([^/\s@]+)@").expect("Invalid userinfo regex")
    });

    IP_REGEX.get_or_init(|| {
        Regex::new(r"\b(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\b")
            .expect("Invalid IP regex")
    });
}

/// Sanitization configuration
#[derive(Debug, Clone)]
pub struct SanitizationConfig {
    /// Enable sanitization
    pub enabled: bool,

    /// Preserve IP addresses in logs (endpoints are usually needed for triage)
    pub preserve_ips: bool,

    /// Replacement string for sensitive data
    pub replacement: String,
}

impl Default for SanitizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            preserve_ips: true,
            replacement: "[REDACTED]".to_string(),
        }
    }
}

/// Log sanitizer for removing sensitive information
pub struct LogSanitizer {
    config: SanitizationConfig,
}

impl LogSanitizer {
    /// Create a new log sanitizer with default configuration
    pub fn new() -> Self {
        Self::with_config(SanitizationConfig::default())
    }

    /// Create a new log sanitizer with custom configuration
    pub fn with_config(config: SanitizationConfig) -> Self {
        init_sanitization_patterns();
        Self { config }
    }

    /// Sanitize a message by redacting sensitive values
    pub fn sanitize(&self, message: &str) -> String {
        if !self.config.enabled {
            return message.to_string();
        }

        let mut sanitized = message.to_string();

        for regex in [&PASSWORD_REGEX, &TOKEN_REGEX, &API_KEY_REGEX, &CREDENTIAL_REGEX] {
            if let Some(regex) = regex.get() {
                sanitized = regex
                    .replace_all(&sanitized, |caps: &regex::Captures| {
                        let full_match = &caps[0];
                        let value = &caps[4];
                        full_match.replace(value, &self.config.replacement)
                    })
                    .to_string();
            }
        }

        if let Some(regex) = AUTH_SCHEME_REGEX.get() {
            sanitized = regex
                .replace_all(&sanitized, |caps: &regex::Captures| {
                    format!("{} {}", &caps[1], self.config.replacement)
                })
                .to_string();
        }

        if let Some(regex) = URL_USERINFO_REGEX.get() {
            sanitized = regex
                .replace_all(&sanitized, |caps: &regex::Captures| {
                    format!("{}{}:{}@", &caps[1], &caps[2], self.config.replacement)
                })
                .to_string();
        }

        if !self.config.preserve_ips {
            if let Some(regex) = IP_REGEX.get() {
                sanitized = regex.replace_all(&sanitized, "[IP_REDACTED]").to_string();
            }
        }

        sanitized
    }

    /// Sanitize an error's display output
    pub fn sanitize_error(&self, error: &dyn std::error::Error) -> String {
        self.sanitize(&error.to_string())
    }

    /// Redact a header value when the header carries credentials
    pub fn sanitize_header(&self, name: &str, value: &str) -> String {
        if self.config.enabled && Self::is_sensitive_field(name) {
            self.config.replacement.clone()
        } else {
            self.sanitize(value)
        }
    }

    /// Create a sanitized version of a JSON context
    pub fn sanitize_context(&self, context: &serde_json::Value) -> serde_json::Value {
        if !self.config.enabled {
            return context.clone();
        }

        match context {
            serde_json::Value::Object(map) => {
                let mut sanitized_map = serde_json::Map::new();

                for (key, value) in map {
                    let sanitized_value = if Self::is_sensitive_field(key) {
                        serde_json::Value::String(self.config.replacement.clone())
                    } else {
                        self.sanitize_context(value)
                    };
                    sanitized_map.insert(key.clone(), sanitized_value);
                }

                serde_json::Value::Object(sanitized_map)
            }
            serde_json::Value::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(|v| self.sanitize_context(v)).collect())
            }
            serde_json::Value::String(s) => serde_json::Value::String(self.sanitize(s)),
            other => other.clone(),
        }
    }

    /// Check if a field or header name indicates sensitive data
    pub fn is_sensitive_field(field_name: &str) -> bool {
        let lower_name = field_name.to_lowercase();
        if matches!(
            lower_name.as_str(),
            "password"
                | "pwd"
                | "pass"
                | "key"
                | "cookie"
                | "set-cookie"
                | "authorization"
                | "proxy-authorization"
        ) {
            return true;
        }

        lower_name.contains("password")
            || lower_name.contains("token")
            || lower_name.contains("secret")
            || lower_name.contains("api_key")
            || lower_name.contains("api-key")
            || lower_name.contains("apikey")
            || lower_name.contains("credential")
            || lower_name.contains("bearer")
    }
}

impl Default for LogSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Global sanitizer instance
static GLOBAL_SANITIZER: OnceLock<LogSanitizer> = OnceLock::new();

/// Get the global sanitizer instance
pub fn get_sanitizer() -> &'static LogSanitizer {
    GLOBAL_SANITIZER.get_or_init(LogSanitizer::new)
}

/// Initialize the global sanitizer with custom configuration
pub fn init_sanitizer(config: SanitizationConfig) {
    let _ = GLOBAL_SANITIZER.set(LogSanitizer::with_config(config));
}

#[cfg(test)]
#[path = "sanitization_tests.rs"]
mod sanitization_tests;
