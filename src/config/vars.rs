//! Environment variable interpolation for config files.
//!
//! Supported syntax:
//! - `$VAR` or `${VAR}` - substitute with env var value, error if missing
//! - `${VAR:-default}` - use default if VAR is unset OR empty
//! - `${VAR-default}` - use default only if VAR is unset
//! - `$$` - escape sequence for a literal `$`

use regex::Regex;
use std::env;
use std::sync::LazyLock;

static VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$                           # escape sequence $$
        |
        \$\{
            ([A-Za-z_][A-Za-z0-9_]*)   # braced variable name (group 1)
            (?:
                (:?-)                  # :- or - (group 2)
                ([^}]*)                # default value (group 3)
            )?
        \}
        |
        \$([A-Za-z_][A-Za-z0-9_]*)     # unbraced $VAR (group 4)
        ",
    )
    .expect("Invalid interpolation pattern")
});

/// Result of environment variable interpolation.
///
/// Errors are accumulated rather than short-circuited so the user sees every
/// missing variable at once.
#[derive(Debug)]
pub struct InterpolationResult {
    pub text: String,
    pub errors: Vec<String>,
}

impl InterpolationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Interpolate environment variables in the given text.
pub fn interpolate(input: &str) -> InterpolationResult {
    let mut errors = Vec::new();

    let text = VAR_PATTERN
        .replace_all(input, |caps: &regex::Captures| {
            let matched = caps.get(0).unwrap().as_str();
            if matched == "$$" {
                return "$".to_string();
            }

            let name = caps
                .get(1)
                .or_else(|| caps.get(4))
                .map(|m| m.as_str())
                .unwrap_or("");
            let default_syntax = caps.get(2).map(|m| m.as_str());
            let default_value = caps.get(3).map(|m| m.as_str());

            match env::var(name) {
                Ok(value) => {
                    // Reject newline injection into the YAML document
                    if value.contains('\n') || value.contains('\r') {
                        errors.push(format!(
                            "environment variable '{name}' contains newlines, which is not allowed"
                        ));
                        return matched.to_string();
                    }
                    if value.is_empty() && default_syntax == Some(":-") {
                        return default_value.unwrap_or("").to_string();
                    }
                    value
                }
                Err(_) => match default_value {
                    Some(default) => default.to_string(),
                    None => {
                        errors.push(format!("environment variable '{name}' is not set"));
                        matched.to_string()
                    }
                },
            }
        })
        .to_string();

    InterpolationResult { text, errors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn with_env_vars<F, R>(vars: &[(&str, Option<&str>)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let originals: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();

        // SAFETY: test env vars use unique names and are restored below
        for (key, value) in vars {
            match value {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        let result = f();

        for (key, original) in originals {
            match original {
                Some(v) => unsafe { env::set_var(&key, v) },
                None => unsafe { env::remove_var(&key) },
            }
        }

        result
    }

    #[test]
    fn test_basic_substitution() {
        with_env_vars(&[("MEDALLION_TEST_BASIC", Some("hello"))], || {
            let result = interpolate("value: $MEDALLION_TEST_BASIC");
            assert!(result.is_ok());
            assert_eq!(result.text, "value: hello");
        });
    }

    #[test]
    fn test_braced_substitution() {
        with_env_vars(&[("MEDALLION_TEST_BRACED", Some("world"))], || {
            let result = interpolate("value: ${MEDALLION_TEST_BRACED}");
            assert!(result.is_ok());
            assert_eq!(result.text, "value: world");
        });
    }

    #[test]
    fn test_missing_variable_error() {
        with_env_vars(&[("MEDALLION_TEST_MISSING", None)], || {
            let result = interpolate("value: $MEDALLION_TEST_MISSING");
            assert!(!result.is_ok());
            assert_eq!(result.errors.len(), 1);
            assert!(result.errors[0].contains("MEDALLION_TEST_MISSING"));
        });
    }

    #[test]
    fn test_default_when_unset() {
        with_env_vars(&[("MEDALLION_TEST_UNSET", None)], || {
            let result = interpolate("interval: ${MEDALLION_TEST_UNSET:-60}");
            assert!(result.is_ok());
            assert_eq!(result.text, "interval: 60");
        });
    }

    #[test]
    fn test_default_when_empty_with_colon() {
        with_env_vars(&[("MEDALLION_TEST_EMPTY", Some(""))], || {
            let result = interpolate("value: ${MEDALLION_TEST_EMPTY:-fallback}");
            assert!(result.is_ok());
            assert_eq!(result.text, "value: fallback");
        });
    }

    #[test]
    fn test_empty_kept_without_colon() {
        with_env_vars(&[("MEDALLION_TEST_EMPTY2", Some(""))], || {
            let result = interpolate("value: ${MEDALLION_TEST_EMPTY2-fallback}");
            assert!(result.is_ok());
            assert_eq!(result.text, "value: ");
        });
    }

    #[test]
    fn test_escape_sequence() {
        let result = interpolate("fare: $$12");
        assert!(result.is_ok());
        assert_eq!(result.text, "fare: $12");
    }

    #[test]
    fn test_newline_injection_blocked() {
        with_env_vars(&[("MEDALLION_TEST_NL", Some("a\nb"))], || {
            let result = interpolate("value: $MEDALLION_TEST_NL");
            assert!(!result.is_ok());
            assert!(result.errors[0].contains("newlines"));
        });
    }

    #[test]
    fn test_yaml_config_example() {
        with_env_vars(
            &[
                ("MEDALLION_TEST_BUCKET", Some("trip-data")),
                ("MEDALLION_TEST_KEY", Some("AKIA123")),
                ("MEDALLION_TEST_INTERVAL", None),
            ],
            || {
                let yaml = r#"
storage:
  url: "s3://${MEDALLION_TEST_BUCKET}"
  options:
    aws_access_key_id: ${MEDALLION_TEST_KEY}
source:
  poll_interval_secs: ${MEDALLION_TEST_INTERVAL:-60}
"#;
                let result = interpolate(yaml);
                assert!(result.is_ok());
                assert!(result.text.contains("s3://trip-data"));
                assert!(result.text.contains("aws_access_key_id: AKIA123"));
                assert!(result.text.contains("poll_interval_secs: 60"));
            },
        );
    }
}
