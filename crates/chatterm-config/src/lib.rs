use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_CHATTERM_CONFIG: &str = "CHATTERM_CONFIG";

const APP_DIR_NAME: &str = "chatterm";
const DEFAULT_SESSION_NAME: &str = "chatterm";
const DEFAULT_CONVERSATIONS_LIMIT: usize = 100;
const DEFAULT_MESSAGES_LIMIT: usize = 30;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_DOWNLOADS_DIR_NAME: &str = "chatterm_downloads";
const DEFAULT_TICK_MILLIS: u64 = 50;
const DEFAULT_BANNER_SECS: u64 = 5;
const DEFAULT_HEADER_COLOR: &str = "cyan";
const DEFAULT_UNREAD_COLOR: &str = "green";
const DEFAULT_SELECTED_COLOR: &str = "yellow";
const DEFAULT_ERROR_COLOR: &str = "red";
const DEFAULT_LOG_FILTER: &str = "info";
const LOG_FILE_NAME: &str = "chatterm.log";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("{0}")]
    Message(String),
}

impl ConfigError {
    fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChattermConfig {
    #[serde(default = "default_session_name")]
    pub session_name: String,
    #[serde(default = "default_conversations_limit")]
    pub conversations_limit: usize,
    #[serde(default = "default_messages_limit")]
    pub messages_limit: usize,
    #[serde(default)]
    pub show_all_conversations: bool,
    #[serde(default)]
    pub cache: CacheConfigToml,
    #[serde(default)]
    pub downloads: DownloadsConfigToml,
    #[serde(default)]
    pub client: ClientConfigToml,
    #[serde(default)]
    pub ui: UiConfigToml,
    #[serde(default)]
    pub log: LogConfigToml,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheConfigToml {
    #[serde(default = "default_cache_dir")]
    pub dir: String,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadsConfigToml {
    #[serde(default = "default_downloads_dir")]
    pub dir: String,
    #[serde(default)]
    pub open_after_download: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfigToml {
    /// Empty means the built-in sample inbox.
    #[serde(default)]
    pub fixture_path: String,
    #[serde(default)]
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UiConfigToml {
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
    #[serde(default = "default_banner_secs")]
    pub banner_secs: u64,
    #[serde(default)]
    pub colors: ColorSchemeToml,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColorSchemeToml {
    #[serde(default = "default_header_color")]
    pub header: String,
    #[serde(default = "default_unread_color")]
    pub unread: String,
    #[serde(default = "default_selected_color")]
    pub selected: String,
    #[serde(default = "default_error_color")]
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogConfigToml {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for ChattermConfig {
    fn default() -> Self {
        Self {
            session_name: default_session_name(),
            conversations_limit: default_conversations_limit(),
            messages_limit: default_messages_limit(),
            show_all_conversations: false,
            cache: CacheConfigToml::default(),
            downloads: DownloadsConfigToml::default(),
            client: ClientConfigToml::default(),
            ui: UiConfigToml::default(),
            log: LogConfigToml::default(),
        }
    }
}

impl Default for CacheConfigToml {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Default for DownloadsConfigToml {
    fn default() -> Self {
        Self {
            dir: default_downloads_dir(),
            open_after_download: false,
        }
    }
}

impl Default for UiConfigToml {
    fn default() -> Self {
        Self {
            tick_millis: default_tick_millis(),
            banner_secs: default_banner_secs(),
            colors: ColorSchemeToml::default(),
        }
    }
}

impl Default for ColorSchemeToml {
    fn default() -> Self {
        Self {
            header: default_header_color(),
            unread: default_unread_color(),
            selected: default_selected_color(),
            error: default_error_color(),
        }
    }
}

impl Default for LogConfigToml {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl ChattermConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.ui.tick_millis)
    }

    pub fn banner_ttl(&self) -> Duration {
        Duration::from_secs(self.ui.banner_secs)
    }

    pub fn client_latency(&self) -> Duration {
        Duration::from_millis(self.client.latency_ms)
    }

    pub fn cache_dir(&self) -> PathBuf {
        PathBuf::from(&self.cache.dir)
    }

    pub fn download_dir(&self) -> PathBuf {
        PathBuf::from(&self.downloads.dir)
    }

    pub fn fixture_path(&self) -> Option<PathBuf> {
        let raw = self.client.fixture_path.trim();
        (!raw.is_empty()).then(|| PathBuf::from(raw))
    }

    pub fn log_path(&self) -> PathBuf {
        default_chatterm_data_dir().join(LOG_FILE_NAME)
    }
}

pub fn load_from_env() -> Result<ChattermConfig, ConfigError> {
    let path = config_path_from_env()?;
    load_from_path(path)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<ChattermConfig, ConfigError> {
    load_or_create_config(path.as_ref())
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let home = resolve_home_dir().ok_or_else(|| {
        ConfigError::Message("unable to resolve home directory from HOME or USERPROFILE".to_owned())
    })?;
    Ok(home.join(".config").join(APP_DIR_NAME).join("config.toml"))
}

fn config_path_from_env() -> Result<PathBuf, ConfigError> {
    match std::env::var(ENV_CHATTERM_CONFIG) {
        Ok(raw) if raw.trim().is_empty() => default_config_path(),
        Ok(raw) => Ok(raw.into()),
        Err(std::env::VarError::NotPresent) => default_config_path(),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::Message(format!(
            "{ENV_CHATTERM_CONFIG} contained invalid UTF-8"
        ))),
    }
}

fn persist_config(path: &Path, config: &ChattermConfig) -> Result<(), ConfigError> {
    let rendered = toml::to_string_pretty(config)?;
    std::fs::write(path, rendered.as_bytes())
        .map_err(|err| ConfigError::io(format!("failed to write config {}", path.display()), err))
}

fn load_or_create_config(path: &Path) -> Result<ChattermConfig, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|err| {
                        ConfigError::io(
                            format!("failed to create config directory {}", parent.display()),
                            err,
                        )
                    })?;
                }
            }
            let defaults = ChattermConfig::default();
            persist_config(path, &defaults)?;
            return Ok(defaults);
        }
        Err(err) => {
            return Err(ConfigError::io(
                format!("failed to read config {}", path.display()),
                err,
            ));
        }
    };

    let mut config: ChattermConfig = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    if normalize_config(&mut config) {
        persist_config(path, &config)?;
    }
    Ok(config)
}

/// Replaces blank or zero values with defaults. Returns whether anything changed.
fn normalize_config(config: &mut ChattermConfig) -> bool {
    let mut changed = false;

    changed |= normalize_text(&mut config.session_name, default_session_name);
    changed |= normalize_nonzero(&mut config.conversations_limit, DEFAULT_CONVERSATIONS_LIMIT);
    changed |= normalize_nonzero(&mut config.messages_limit, DEFAULT_MESSAGES_LIMIT);
    changed |= normalize_text(&mut config.cache.dir, default_cache_dir);
    changed |= normalize_nonzero(&mut config.cache.ttl_secs, DEFAULT_CACHE_TTL_SECS);
    changed |= normalize_text(&mut config.downloads.dir, default_downloads_dir);
    changed |= normalize_nonzero(&mut config.ui.tick_millis, DEFAULT_TICK_MILLIS);
    changed |= normalize_nonzero(&mut config.ui.banner_secs, DEFAULT_BANNER_SECS);
    changed |= normalize_color(&mut config.ui.colors.header, DEFAULT_HEADER_COLOR);
    changed |= normalize_color(&mut config.ui.colors.unread, DEFAULT_UNREAD_COLOR);
    changed |= normalize_color(&mut config.ui.colors.selected, DEFAULT_SELECTED_COLOR);
    changed |= normalize_color(&mut config.ui.colors.error, DEFAULT_ERROR_COLOR);
    changed |= normalize_text(&mut config.log.filter, default_log_filter);

    let trimmed = config.client.fixture_path.trim();
    if trimmed.len() != config.client.fixture_path.len() {
        config.client.fixture_path = trimmed.to_owned();
        changed = true;
    }

    changed
}

fn normalize_text(value: &mut String, default: fn() -> String) -> bool {
    if value.trim().is_empty() {
        *value = default();
        return true;
    }
    false
}

fn normalize_nonzero<T: Copy + PartialEq + Default>(value: &mut T, default: T) -> bool {
    if *value == T::default() {
        *value = default;
        return true;
    }
    false
}

fn normalize_color(value: &mut String, default: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    let normalized = if normalized.is_empty() {
        default.to_owned()
    } else {
        normalized
    };
    if *value == normalized {
        return false;
    }
    *value = normalized;
    true
}

fn default_chatterm_data_dir() -> PathBuf {
    resolve_data_local_dir().join(APP_DIR_NAME)
}

fn resolve_data_local_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(path) = non_empty_env("LOCALAPPDATA") {
            return absolutize_path(path);
        }
        if let Some(home) = resolve_home_dir() {
            return home.join("AppData").join("Local");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = resolve_home_dir() {
            return home.join("Library").join("Application Support");
        }
    }

    #[cfg(all(not(target_os = "windows"), not(target_os = "macos")))]
    {
        if let Some(path) = non_empty_env("XDG_DATA_HOME") {
            return absolutize_path(path);
        }
        if let Some(home) = resolve_home_dir() {
            return home.join(".local").join("share");
        }
    }

    std::env::temp_dir()
}

fn non_empty_env(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn resolve_home_dir() -> Option<PathBuf> {
    non_empty_env("HOME").or_else(|| non_empty_env("USERPROFILE"))
}

fn absolutize_path(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(current) => current.join(path),
        Err(_) => std::env::temp_dir().join(path),
    }
}

fn default_session_name() -> String {
    DEFAULT_SESSION_NAME.to_owned()
}

fn default_conversations_limit() -> usize {
    DEFAULT_CONVERSATIONS_LIMIT
}

fn default_messages_limit() -> usize {
    DEFAULT_MESSAGES_LIMIT
}

fn default_cache_dir() -> String {
    default_chatterm_data_dir()
        .join("cache")
        .to_string_lossy()
        .to_string()
}

fn default_cache_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

fn default_downloads_dir() -> String {
    resolve_home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(DEFAULT_DOWNLOADS_DIR_NAME)
        .to_string_lossy()
        .to_string()
}

fn default_tick_millis() -> u64 {
    DEFAULT_TICK_MILLIS
}

fn default_banner_secs() -> u64 {
    DEFAULT_BANNER_SECS
}

fn default_header_color() -> String {
    DEFAULT_HEADER_COLOR.to_owned()
}

fn default_unread_color() -> String {
    DEFAULT_UNREAD_COLOR.to_owned()
}

fn default_selected_color() -> String {
    DEFAULT_SELECTED_COLOR.to_owned()
}

fn default_error_color() -> String {
    DEFAULT_ERROR_COLOR.to_owned()
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatterm_core::test_support::TestDir;

    /// Overrides that, together with `HOME`, keep the host's config out of a test.
    fn isolated_env(config_path: Option<&str>) -> [(&'static str, Option<&str>); 4] {
        [
            ("USERPROFILE", None),
            (ENV_CHATTERM_CONFIG, config_path),
            ("XDG_DATA_HOME", None),
            ("LOCALAPPDATA", None),
        ]
    }

    fn write_config_file(path: &Path, raw: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create config parent");
        }
        std::fs::write(path, raw.as_bytes()).expect("write config");
    }

    #[test]
    fn load_from_env_creates_default_config_when_missing() {
        let home = TestDir::new("config-home-defaults");
        let expected = home.join(".config").join("chatterm").join("config.toml");

        home.as_home(&isolated_env(None), || {
            let config = load_from_env().expect("load defaults");
            assert_eq!(config.conversations_limit, 100);
            assert_eq!(config.messages_limit, 30);
            assert_eq!(config.cache_ttl(), Duration::from_secs(300));
            assert!(!config.show_all_conversations);
            assert!(config.fixture_path().is_none());
            assert!(config.cache_dir().ends_with("chatterm/cache"));
            assert!(expected.exists());
        });
    }

    #[test]
    fn load_from_env_honors_explicit_config_path() {
        let home = TestDir::new("config-home-explicit");
        let root = TestDir::new("config-explicit");
        let explicit = root.join("nested").join("custom.toml");
        let default = home.join(".config").join("chatterm").join("config.toml");

        let explicit_text = explicit.to_string_lossy();
        home.as_home(&isolated_env(Some(&*explicit_text)), || {
            load_from_env().expect("load explicit config");
            assert!(explicit.exists());
            assert!(!default.exists());
        });
    }

    #[test]
    fn partial_file_is_filled_with_defaults() {
        let root = TestDir::new("config-partial");
        let path = root.join("config.toml");
        write_config_file(
            &path,
            r#"
messages_limit = 12
show_all_conversations = true

[cache]
dir = "/tmp/chatterm-cache"

[ui.colors]
header = "magenta"
"#,
        );

        let config = load_from_path(&path).expect("load partial config");

        assert_eq!(config.messages_limit, 12);
        assert_eq!(config.conversations_limit, 100);
        assert!(config.show_all_conversations);
        assert_eq!(config.cache.dir, "/tmp/chatterm-cache");
        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(config.ui.colors.header, "magenta");
        assert_eq!(config.ui.colors.unread, "green");
    }

    #[test]
    fn normalization_repairs_blank_and_zero_values_and_persists() {
        let root = TestDir::new("config-normalize");
        let path = root.join("config.toml");
        write_config_file(
            &path,
            r#"
session_name = "  "
conversations_limit = 0

[cache]
dir = "/tmp/cache"
ttl_secs = 0

[client]
fixture_path = "  /tmp/inbox.json "

[ui]
tick_millis = 0

[ui.colors]
selected = " YELLOW "
error = ""
"#,
        );

        let config = load_from_path(&path).expect("load config");

        assert_eq!(config.session_name, "chatterm");
        assert_eq!(config.conversations_limit, 100);
        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(config.ui.tick_millis, 50);
        assert_eq!(config.ui.colors.selected, "yellow");
        assert_eq!(config.ui.colors.error, "red");
        assert_eq!(config.fixture_path(), Some(PathBuf::from("/tmp/inbox.json")));

        let rewritten = std::fs::read_to_string(&path).expect("read rewritten config");
        assert!(rewritten.contains("conversations_limit = 100"));
        assert!(rewritten.contains("ttl_secs = 300"));
    }

    #[test]
    fn invalid_toml_reports_the_path() {
        let root = TestDir::new("config-invalid");
        let path = root.join("config.toml");
        write_config_file(&path, "messages_limit = \"many\"");

        let error = load_from_path(&path).expect_err("invalid config must fail");

        assert!(matches!(error, ConfigError::Parse { .. }));
        assert!(error.to_string().contains("config.toml"));
    }

    #[test]
    fn blank_env_value_falls_back_to_default_path() {
        let home = TestDir::new("config-blank-env");
        home.as_home(&isolated_env(Some("   ")), || {
            let path = config_path_from_env().expect("resolve path");
            assert_eq!(
                path,
                home.join(".config").join("chatterm").join("config.toml")
            );
        });
    }
}
