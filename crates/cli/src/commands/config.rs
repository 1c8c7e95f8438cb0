use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use toml::Value;
use voicequote_core::config::{AppConfig, LoadOptions};

/// One rendered setting: dotted key, display value, env vars that can set it.
struct Setting {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for setting in settings(&config) {
        let source = field_source(
            setting.key,
            setting.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", setting.key, setting.value));
    }

    lines.join("\n")
}

fn settings(config: &AppConfig) -> Vec<Setting> {
    let api_key = config
        .realtime
        .api_key
        .as_ref()
        .map(|key| redact_key(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    vec![
        Setting {
            key: "realtime.api_key",
            value: api_key,
            env_keys: &["VOICEQUOTE_REALTIME_API_KEY", "OPENAI_API_KEY"],
        },
        Setting {
            key: "realtime.base_url",
            value: config.realtime.base_url.clone(),
            env_keys: &["VOICEQUOTE_REALTIME_BASE_URL"],
        },
        Setting {
            key: "realtime.model",
            value: config.realtime.model.clone(),
            env_keys: &["VOICEQUOTE_REALTIME_MODEL"],
        },
        Setting {
            key: "realtime.voice",
            value: config.realtime.voice.clone(),
            env_keys: &["VOICEQUOTE_REALTIME_VOICE"],
        },
        Setting {
            key: "realtime.timeout_secs",
            value: config.realtime.timeout_secs.to_string(),
            env_keys: &["VOICEQUOTE_REALTIME_TIMEOUT_SECS"],
        },
        Setting {
            key: "server.bind_address",
            value: config.server.bind_address.clone(),
            env_keys: &["VOICEQUOTE_SERVER_BIND_ADDRESS"],
        },
        Setting {
            key: "server.port",
            value: config.server.port.to_string(),
            env_keys: &["VOICEQUOTE_SERVER_PORT"],
        },
        Setting {
            key: "server.graceful_shutdown_secs",
            value: config.server.graceful_shutdown_secs.to_string(),
            env_keys: &["VOICEQUOTE_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        },
        Setting {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["VOICEQUOTE_LOGGING_LEVEL", "VOICEQUOTE_LOG_LEVEL"],
        },
        Setting {
            key: "logging.format",
            value: format!("{:?}", config.logging.format),
            env_keys: &["VOICEQUOTE_LOGGING_FORMAT", "VOICEQUOTE_LOG_FORMAT"],
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("voicequote.toml"), PathBuf::from("config/voicequote.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

const MAX_VISIBLE_PREFIX: usize = 4;

/// Keeps a short vendor prefix such as `sk-` and hides the rest.
fn redact_key(key: &str) -> String {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.split_once('-') {
        Some((prefix, _))
            if !prefix.is_empty()
                && prefix.len() <= MAX_VISIBLE_PREFIX
                && prefix.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!("{prefix}-***")
        }
        _ => "<redacted>".to_string(),
    }
}
