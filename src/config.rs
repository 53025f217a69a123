use std::time::Duration;

use crate::spacing::{SpacingRules, DEFAULT_CAPTION_PREFIX};

const DEFAULT_BIND: &str = "0.0.0.0:8000";
const DEFAULT_SOFFICE: &str = "soffice";
const DEFAULT_CONVERT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_UPLOAD_MB: usize = 20;

/// Runtime settings, read once from `DOCX_SPACER_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub soffice: String,
    pub convert_timeout: Duration,
    pub max_upload_bytes: usize,
    pub rules: SpacingRules,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            soffice: DEFAULT_SOFFICE.to_string(),
            convert_timeout: Duration::from_secs(DEFAULT_CONVERT_TIMEOUT_SECS),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
            rules: SpacingRules::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let timeout_secs = parse_or(
            "DOCX_SPACER_CONVERT_TIMEOUT_SECS",
            lookup("DOCX_SPACER_CONVERT_TIMEOUT_SECS"),
            DEFAULT_CONVERT_TIMEOUT_SECS,
        );
        let max_upload_mb = parse_or(
            "DOCX_SPACER_MAX_UPLOAD_MB",
            lookup("DOCX_SPACER_MAX_UPLOAD_MB"),
            DEFAULT_MAX_UPLOAD_MB,
        );

        let caption_prefixes: Vec<String> = lookup("DOCX_SPACER_CAPTION_PREFIXES")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .filter(|prefixes: &Vec<String>| !prefixes.is_empty())
            .unwrap_or_else(|| vec![DEFAULT_CAPTION_PREFIX.to_string()]);

        let space_before_images = lookup("DOCX_SPACER_SPACE_BEFORE_IMAGES")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Self {
            bind: lookup("DOCX_SPACER_BIND").unwrap_or(defaults.bind),
            soffice: lookup("DOCX_SPACER_SOFFICE").unwrap_or(defaults.soffice),
            convert_timeout: Duration::from_secs(timeout_secs),
            max_upload_bytes: max_upload_mb * 1024 * 1024,
            rules: SpacingRules {
                caption_prefixes,
                space_before_images,
            },
        }
    }
}

fn parse_or<T: std::str::FromStr + Copy>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, "ignoring invalid setting");
                default
            }
        },
    }
}
