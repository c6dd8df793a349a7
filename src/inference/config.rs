//! API configuration resolution.
//!
//! The effective `{base_url, api_key, model}` triple is built from four
//! layers. Each layer overrides the previous one, field by field, but only
//! for fields it sets to a non-empty value:
//!
//! 1. Built-in defaults
//! 2. `logisim-evolution.properties` (working directory, else home directory)
//! 3. `.env` in the working directory
//! 4. Process environment
//!
//! Resolution happens once per process ([`init`]). Afterwards the shared
//! [`ApiSettings`] only changes through an explicit override.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use super::errors::InferenceError;

// ─── Constants ───────────────────────────────────────────────────────────────

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Properties file looked up in the working directory, then the home directory.
pub const PROPERTIES_FILE: &str = "logisim-evolution.properties";
/// `KEY=value` file looked up in the working directory only.
pub const DOTENV_FILE: &str = ".env";

pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_MODEL: &str = "OPENAI_MODEL";

const PROP_API_KEY: &str = "api.key";
const PROP_BASE_URL: &str = "api.base.url";
const PROP_MODEL: &str = "api.model";

// ─── Public Types ────────────────────────────────────────────────────────────

/// The effective configuration used for a completion call.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Credential sent with every request. Empty means "not configured".
    pub api_key: String,
    /// Endpoint root, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub model: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("api_key", &self.masked_api_key())
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl ApiConfig {
    /// Full URL of the chat completions endpoint.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// The credential with everything past the first four characters hidden.
    pub fn masked_api_key(&self) -> String {
        if self.api_key.is_empty() {
            return "(not set)".to_string();
        }
        let visible: String = self.api_key.chars().take(4).collect();
        format!("{visible}****")
    }

    /// Overlay the non-empty fields of `layer` onto this config.
    pub fn apply(&mut self, layer: &ConfigOverride) {
        overwrite_if_set(&mut self.api_key, layer.api_key.as_deref());
        overwrite_if_set(&mut self.base_url, layer.base_url.as_deref());
        overwrite_if_set(&mut self.model, layer.model.as_deref());
    }
}

fn overwrite_if_set(slot: &mut String, value: Option<&str>) {
    if let Some(v) = value.filter(|v| !v.is_empty()) {
        *slot = v.to_string();
    }
}

/// Values contributed by one configuration layer or by an explicit override.
///
/// `None` and empty strings both leave the current value untouched.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConfigOverride {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

impl ConfigOverride {
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Record `value` if `key` is one of the three environment-style keys.
    fn set_env_key(&mut self, key: &str, value: String) {
        match key {
            ENV_API_KEY => self.api_key = Some(value),
            ENV_BASE_URL => self.base_url = Some(value),
            ENV_MODEL => self.model = Some(value),
            _ => {}
        }
    }
}

// ─── Shared Settings ─────────────────────────────────────────────────────────

/// A read-mostly, thread-safe holder for the effective configuration.
///
/// Overrides are last-writer-wins. Calls already in flight keep the snapshot
/// they started with.
pub struct ApiSettings {
    current: RwLock<ApiConfig>,
}

impl ApiSettings {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            current: RwLock::new(config),
        }
    }

    /// A copy of the configuration as it is right now.
    pub fn snapshot(&self) -> ApiConfig {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply an override in place.
    pub fn apply(&self, overrides: &ConfigOverride) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        current.apply(overrides);
        tracing::info!(
            base_url = %current.base_url,
            model = %current.model,
            api_key_set = !current.api_key.is_empty(),
            "API configuration overridden"
        );
    }
}

static GLOBAL_SETTINGS: OnceLock<Arc<ApiSettings>> = OnceLock::new();

/// The process-wide settings, resolved from all layers on first use.
pub fn init() -> Arc<ApiSettings> {
    GLOBAL_SETTINGS
        .get_or_init(|| Arc::new(ApiSettings::new(resolve())))
        .clone()
}

/// Override fields of the process-wide settings.
pub fn override_config(overrides: &ConfigOverride) {
    init().apply(overrides);
}

/// Snapshot of the process-wide settings.
pub fn current() -> ApiConfig {
    init().snapshot()
}

// ─── Resolution ──────────────────────────────────────────────────────────────

/// Resolve the configuration against the real working directory, home
/// directory and process environment.
pub fn resolve() -> ApiConfig {
    let working_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let home_dir = dirs::home_dir();
    resolve_with(&working_dir, home_dir.as_deref(), |key| std::env::var(key).ok())
}

/// Resolve the configuration from explicit sources.
pub fn resolve_with<F>(working_dir: &Path, home_dir: Option<&Path>, env: F) -> ApiConfig
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ApiConfig::default();
    config.apply(&properties_layer(working_dir, home_dir));
    config.apply(&dotenv_layer(working_dir));
    config.apply(&env_layer(env));

    tracing::debug!(config = ?config, "resolved API configuration");
    config
}

fn properties_layer(working_dir: &Path, home_dir: Option<&Path>) -> ConfigOverride {
    let mut path = working_dir.join(PROPERTIES_FILE);
    if !path.exists() {
        match home_dir {
            Some(home) => path = home.join(PROPERTIES_FILE),
            None => return ConfigOverride::default(),
        }
    }
    if !path.exists() {
        tracing::debug!("no {PROPERTIES_FILE} found, skipping");
        return ConfigOverride::default();
    }

    match load_properties(&path) {
        Ok(mut props) => ConfigOverride {
            api_key: props.remove(PROP_API_KEY),
            base_url: props.remove(PROP_BASE_URL),
            model: props.remove(PROP_MODEL),
        },
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "error reading configuration file");
            ConfigOverride::default()
        }
    }
}

fn dotenv_layer(working_dir: &Path) -> ConfigOverride {
    let path = working_dir.join(DOTENV_FILE);
    let iter = match dotenvy::from_path_iter(&path) {
        Ok(iter) => iter,
        Err(e) if e.not_found() => {
            tracing::debug!(path = %path.display(), "no .env file, skipping");
            return ConfigOverride::default();
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not read .env file");
            return ConfigOverride::default();
        }
    };

    let mut layer = ConfigOverride::default();
    for item in iter {
        match item {
            Ok((key, value)) => layer.set_env_key(&key, value),
            Err(e) => tracing::debug!(error = %e, "skipping unparsable .env line"),
        }
    }
    layer
}

fn env_layer<F>(env: F) -> ConfigOverride
where
    F: Fn(&str) -> Option<String>,
{
    ConfigOverride {
        api_key: env(ENV_API_KEY),
        base_url: env(ENV_BASE_URL),
        model: env(ENV_MODEL),
    }
}

// ─── Properties format ───────────────────────────────────────────────────────

/// Read and parse a `.properties` file.
pub fn load_properties(path: &Path) -> Result<HashMap<String, String>, InferenceError> {
    let raw = std::fs::read_to_string(path).map_err(|e| InferenceError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;
    Ok(parse_properties(&raw))
}

/// Parse the line-oriented properties format: `#`/`!` comments, `=`, `:` or
/// whitespace separators, backslash continuation lines and escapes.
fn parse_properties(raw: &str) -> HashMap<String, String> {
    let mut entries = HashMap::new();
    let mut logical = String::new();

    for line in raw.lines() {
        let trimmed = line.trim_start();
        if logical.is_empty()
            && (trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!'))
        {
            continue;
        }

        if ends_with_continuation(trimmed) {
            logical.push_str(&trimmed[..trimmed.len() - 1]);
            continue;
        }

        logical.push_str(trimmed);
        let (key, value) = split_property(&logical);
        entries.insert(key, value);
        logical.clear();
    }

    if !logical.is_empty() {
        let (key, value) = split_property(&logical);
        entries.insert(key, value);
    }

    entries
}

/// A line continues when it ends in an odd number of backslashes.
fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

fn split_property(line: &str) -> (String, String) {
    let mut key = String::new();
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    push_escaped(&mut key, escaped, &mut chars);
                }
            }
            '=' | ':' => break,
            c if c.is_whitespace() => {
                while chars.peek().is_some_and(|c| c.is_whitespace()) {
                    chars.next();
                }
                if matches!(chars.peek(), Some('=') | Some(':')) {
                    chars.next();
                }
                break;
            }
            c => key.push(c),
        }
    }

    while chars.peek().is_some_and(|c| c.is_whitespace()) {
        chars.next();
    }

    let mut value = String::new();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                push_escaped(&mut value, escaped, &mut chars);
            }
        } else {
            value.push(c);
        }
    }

    (key, value)
}

fn push_escaped<I>(out: &mut String, escaped: char, rest: &mut I)
where
    I: Iterator<Item = char>,
{
    match escaped {
        't' => out.push('\t'),
        'n' => out.push('\n'),
        'r' => out.push('\r'),
        'f' => out.push('\u{000c}'),
        'u' => {
            let hex: String = rest.take(4).collect();
            match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                Some(c) => out.push(c),
                None => out.push_str(&hex),
            }
        }
        other => out.push(other),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn write(dir: &Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn test_defaults_when_nothing_configured() {
        let cwd = tempfile::tempdir().unwrap();
        let config = resolve_with(cwd.path(), None, no_env);
        assert_eq!(config, ApiConfig::default());
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert!(config.api_key.is_empty());
    }

    #[test]
    fn test_properties_in_working_dir() {
        let cwd = tempfile::tempdir().unwrap();
        write(
            cwd.path(),
            PROPERTIES_FILE,
            "# assistant settings\napi.key=sk-props\napi.base.url = https://llm.example.com/v1\napi.model: deepseek-r1\n",
        );
        let config = resolve_with(cwd.path(), None, no_env);
        assert_eq!(config.api_key, "sk-props");
        assert_eq!(config.base_url, "https://llm.example.com/v1");
        assert_eq!(config.model, "deepseek-r1");
    }

    #[test]
    fn test_properties_falls_back_to_home_dir() {
        let cwd = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        write(home.path(), PROPERTIES_FILE, "api.model=home-model\n");
        let config = resolve_with(cwd.path(), Some(home.path()), no_env);
        assert_eq!(config.model, "home-model");
    }

    #[test]
    fn test_working_dir_properties_shadow_home() {
        let cwd = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        write(cwd.path(), PROPERTIES_FILE, "api.model=cwd-model\n");
        write(home.path(), PROPERTIES_FILE, "api.model=home-model\napi.key=home-key\n");
        let config = resolve_with(cwd.path(), Some(home.path()), no_env);
        assert_eq!(config.model, "cwd-model");
        assert!(config.api_key.is_empty(), "home file is not consulted");
    }

    #[test]
    fn test_empty_property_does_not_override_default() {
        let cwd = tempfile::tempdir().unwrap();
        write(cwd.path(), PROPERTIES_FILE, "api.model=\napi.base.url=\n");
        let config = resolve_with(cwd.path(), None, no_env);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_unreadable_properties_is_skipped() {
        let cwd = tempfile::tempdir().unwrap();
        // A directory with the file's name exists but cannot be read as text.
        std::fs::create_dir(cwd.path().join(PROPERTIES_FILE)).unwrap();
        write(cwd.path(), DOTENV_FILE, "OPENAI_MODEL=from-dotenv\n");
        let config = resolve_with(cwd.path(), None, no_env);
        assert_eq!(config.model, "from-dotenv");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_dotenv_overrides_properties() {
        let cwd = tempfile::tempdir().unwrap();
        write(cwd.path(), PROPERTIES_FILE, "api.key=props-key\napi.model=props-model\n");
        write(
            cwd.path(),
            DOTENV_FILE,
            "# local overrides\n\nexport OPENAI_API_KEY=dotenv-key\nUNRELATED=1\n",
        );
        let config = resolve_with(cwd.path(), None, no_env);
        assert_eq!(config.api_key, "dotenv-key");
        assert_eq!(config.model, "props-model");
    }

    #[test]
    fn test_dotenv_empty_value_ignored() {
        let cwd = tempfile::tempdir().unwrap();
        write(cwd.path(), PROPERTIES_FILE, "api.base.url=https://props.example/v1\n");
        write(cwd.path(), DOTENV_FILE, "OPENAI_BASE_URL=\n");
        let config = resolve_with(cwd.path(), None, no_env);
        assert_eq!(config.base_url, "https://props.example/v1");
    }

    #[test]
    fn test_dotenv_quoting() {
        let cwd = tempfile::tempdir().unwrap();
        write(
            cwd.path(),
            DOTENV_FILE,
            "OPENAI_API_KEY='sk-ab$cd'\nOPENAI_MODEL=\"gpt-4o\"\n",
        );
        let config = resolve_with(cwd.path(), None, no_env);
        // Single quotes keep `$` literal; double quotes are stripped.
        assert_eq!(config.api_key, "sk-ab$cd");
        assert_eq!(config.model, "gpt-4o");
    }

    #[test]
    fn test_env_model_only_overrides_model() {
        let cwd = tempfile::tempdir().unwrap();
        write(
            cwd.path(),
            PROPERTIES_FILE,
            "api.key=props-key\napi.base.url=https://props.example/v1\napi.model=props-model\n",
        );
        let config = resolve_with(cwd.path(), None, |key| {
            (key == ENV_MODEL).then(|| "env-model".to_string())
        });
        assert_eq!(config.model, "env-model");
        assert_eq!(config.api_key, "props-key");
        assert_eq!(config.base_url, "https://props.example/v1");
    }

    #[test]
    fn test_env_overrides_every_layer() {
        let cwd = tempfile::tempdir().unwrap();
        write(cwd.path(), PROPERTIES_FILE, "api.key=props-key\n");
        write(cwd.path(), DOTENV_FILE, "OPENAI_API_KEY=dotenv-key\n");
        let config = resolve_with(cwd.path(), None, |key| match key {
            ENV_API_KEY => Some("env-key".to_string()),
            ENV_BASE_URL => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.api_key, "env-key");
        assert_eq!(config.base_url, DEFAULT_BASE_URL, "empty env value is ignored");
    }

    #[test]
    fn test_settings_override_skips_empty_fields() {
        let settings = ApiSettings::new(ApiConfig::default());
        settings.apply(
            &ConfigOverride::default()
                .api_key("sk-new")
                .base_url("")
                .model("gpt-4o"),
        );
        let snapshot = settings.snapshot();
        assert_eq!(snapshot.api_key, "sk-new");
        assert_eq!(snapshot.base_url, DEFAULT_BASE_URL);
        assert_eq!(snapshot.model, "gpt-4o");
    }

    #[test]
    fn test_snapshot_is_independent_of_later_overrides() {
        let settings = ApiSettings::new(ApiConfig::default());
        let before = settings.snapshot();
        settings.apply(&ConfigOverride::default().model("other"));
        assert_eq!(before.model, DEFAULT_MODEL);
        assert_eq!(settings.snapshot().model, "other");
    }

    #[test]
    fn test_global_override_visible_through_current() {
        assert!(Arc::ptr_eq(&init(), &init()));
        override_config(&ConfigOverride::default().model("global-test-model"));
        assert_eq!(current().model, "global-test-model");
        assert_eq!(init().snapshot().model, "global-test-model");
    }

    #[test]
    fn test_completions_url_tolerates_trailing_slash() {
        let mut config = ApiConfig::default();
        assert_eq!(config.completions_url(), "https://api.openai.com/v1/chat/completions");
        config.base_url = "http://localhost:8080/v1/".into();
        assert_eq!(config.completions_url(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = ApiConfig {
            api_key: "sk-secret-value".into(),
            ..ApiConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("sk-s****"));
        assert_eq!(ApiConfig::default().masked_api_key(), "(not set)");
    }

    #[test]
    fn test_parse_properties_escapes_and_continuations() {
        let raw = "! bang comment\n\
                   multi = first \\\n    second\n\
                   spaced key value\n\
                   escaped\\:key=tab\\there\n\
                   unicode=\\u00e9t\\u00e9\n";
        let props = parse_properties(raw);
        assert_eq!(props["multi"], "first second");
        assert_eq!(props["spaced"], "key value");
        assert_eq!(props["escaped:key"], "tab\there");
        assert_eq!(props["unicode"], "été");
    }

    #[test]
    fn test_parse_properties_url_value_keeps_colons() {
        let props = parse_properties("api.base.url=https://host:8443/v1\n");
        assert_eq!(props["api.base.url"], "https://host:8443/v1");
    }
}
