//! Layered configuration for gharvest.
//!
//! Sources are merged in increasing priority: built-in defaults, an optional
//! TOML file, then `GHARVEST_`-prefixed environment variables using `__` as
//! the nesting separator (`GHARVEST_ARCHIVE__MINIMUM_QUEUED=20`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File read from the working directory when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "gharvest.toml";
/// Environment variables consulted, in order, for the API credential.
pub const TOKEN_VARIABLES: [&str; 3] = ["GH_PAT", "GITHUB_TOKEN", "GH_TOKEN"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default `tracing` filter directive; `RUST_LOG` takes precedence.
    pub log_level: String,
    /// Backpressure delay shared by every stage, in milliseconds.
    pub saturation_delay_ms: u64,
    pub paths: PathsConfig,
    pub archive: ArchiveConfig,
    pub processor: ProcessorConfig,
    pub rate_limit: RateLimitConfig,
    pub enrich: EnrichConfig,
    pub github: GithubConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            saturation_delay_ms: 120_000,
            paths: PathsConfig::default(),
            archive: ArchiveConfig::default(),
            processor: ProcessorConfig::default(),
            rate_limit: RateLimitConfig::default(),
            enrich: EnrichConfig::default(),
            github: GithubConfig::default(),
        }
    }
}

/// Filesystem locations. Anything left unset is derived from `data_dir`,
/// which itself defaults to the platform data directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: Option<PathBuf>,
    pub extracted: Option<PathBuf>,
    pub processed: Option<PathBuf>,
    pub work: Option<PathBuf>,
    pub cursor: Option<PathBuf>,
    pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Refill `extracted/` only while it holds fewer batches than this.
    pub minimum_queued: usize,
    pub lines_per_batch: usize,
    pub base_url: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self { minimum_queued: 20, lines_per_batch: 1000, base_url: "https://data.gharchive.org".to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Stop writing consolidated files once `processed/` holds this many.
    pub maximum_queued: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self { maximum_queued: 50 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub secondary_delay_ms: u64,
    /// Added to the advertised reset time before calling again.
    pub reset_grace_secs: u64,
    /// Calls made for one URL before a secondary throttle is given up on.
    pub max_attempts: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { secondary_delay_ms: 120_000, reset_grace_secs: 10, max_attempts: 10 }
    }
}

impl RateLimitConfig {
    pub fn secondary_delay(&self) -> Duration {
        Duration::from_millis(self.secondary_delay_ms)
    }

    pub fn reset_grace(&self) -> Duration {
        Duration::from_secs(self.reset_grace_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    /// File trees with more entries than this are not stored.
    pub max_tree_entries: usize,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self { max_tree_entries: 200 }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub token: Option<String>,
    pub api_url: String,
    pub page_url: String,
    pub user_agent: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: "https://api.github.com".to_string(),
            page_url: "https://github.com".to_string(),
            user_agent: concat!("gharvest/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

// Keep the token out of debug logs.
impl std::fmt::Debug for GithubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("api_url", &self.api_url)
            .field("page_url", &self.page_url)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Fully resolved, absolute filesystem locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub extracted: PathBuf,
    pub processed: PathBuf,
    pub work: PathBuf,
    pub cursor: PathBuf,
    pub database: PathBuf,
}

impl Config {
    /// Build the provider chain without extracting it.
    ///
    /// `file` defaults to [`DEFAULT_CONFIG_FILE`]. A missing file is skipped
    /// here, leaving defaults and the environment; [`Config::load`] rejects an
    /// explicit path that does not exist.
    pub fn figment(file: Option<&Path>) -> Figment {
        let file = file.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed("GHARVEST_").split("__"))
    }

    /// Load, fill in the credential and validate.
    ///
    /// An explicitly named file must exist; only the default file is optional.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        if let Some(file) = file
            && !file.is_file()
        {
            exn::bail!(ErrorKind::MissingFile(file.to_path_buf()));
        }
        let mut config = Self::from_figment(Self::figment(file))?;
        if config.github.token.is_none() {
            config.github.token = token_from(|name| std::env::var(name).ok());
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        figment.extract().or_raise(|| ErrorKind::Load)
    }

    pub fn saturation_delay(&self) -> Duration {
        Duration::from_millis(self.saturation_delay_ms)
    }

    /// Reject values no stage could work with.
    pub fn validate(&self) -> Result<()> {
        if self.saturation_delay_ms == 0 {
            exn::bail!(ErrorKind::invalid("saturation_delay_ms", "must be greater than zero"));
        }
        if self.archive.minimum_queued == 0 {
            exn::bail!(ErrorKind::invalid("archive.minimum_queued", "must be greater than zero"));
        }
        if self.archive.lines_per_batch == 0 {
            exn::bail!(ErrorKind::invalid("archive.lines_per_batch", "must be greater than zero"));
        }
        if self.processor.maximum_queued == 0 {
            exn::bail!(ErrorKind::invalid("processor.maximum_queued", "must be greater than zero"));
        }
        if self.rate_limit.max_attempts == 0 {
            exn::bail!(ErrorKind::invalid("rate_limit.max_attempts", "must be greater than zero"));
        }
        for (field, url) in [
            ("archive.base_url", &self.archive.base_url),
            ("github.api_url", &self.github.api_url),
            ("github.page_url", &self.github.page_url),
        ] {
            if url.trim().is_empty() {
                exn::bail!(ErrorKind::invalid(field, "must not be empty"));
            }
            if !url.starts_with("http://") && !url.starts_with("https://") {
                exn::bail!(ErrorKind::invalid(field, format!("not an HTTP URL: {url}")));
            }
        }
        if self.github.token.as_deref().is_some_and(|token| token.trim().is_empty()) {
            exn::bail!(ErrorKind::invalid("github.token", "must not be blank when set"));
        }
        Ok(())
    }

    /// Resolve every location to an absolute path.
    pub fn paths(&self) -> Result<Paths> {
        let data_dir = match &self.paths.data_dir {
            Some(dir) => absolute(dir)?,
            None => ProjectDirs::from("dev", "gharvest", "gharvest")
                .map(|dirs| dirs.data_dir().to_path_buf())
                .ok_or_else(|| exn::Exn::from(ErrorKind::NoDataDirectory))?,
        };
        tracing::debug!(data_dir = %data_dir.display(), "Resolved data directory");
        let resolve = |configured: &Option<PathBuf>, default: &str| -> Result<PathBuf> {
            match configured {
                Some(path) => absolute(path),
                None => Ok(data_dir.join(default)),
            }
        };
        Ok(Paths {
            extracted: resolve(&self.paths.extracted, "extracted")?,
            processed: resolve(&self.paths.processed, "processed")?,
            work: resolve(&self.paths.work, "work")?,
            cursor: resolve(&self.paths.cursor, "cursor.json")?,
            database: resolve(&self.paths.database, "documents.db")?,
        })
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).or_raise(|| ErrorKind::invalid("paths", format!("cannot resolve {}", path.display())))
}

/// First non-blank credential among [`TOKEN_VARIABLES`].
pub fn token_from(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    TOKEN_VARIABLES
        .iter()
        .filter_map(|name| lookup(*name))
        .map(|token| token.trim().to_string())
        .find(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn from_toml(toml: &str) -> Result<Config> {
        Config::from_figment(Figment::from(Serialized::defaults(Config::default())).merge(Toml::string(toml)))
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.saturation_delay(), Duration::from_secs(120));
        assert_eq!(config.archive.minimum_queued, 20);
        assert_eq!(config.archive.lines_per_batch, 1000);
        assert_eq!(config.processor.maximum_queued, 50);
        assert_eq!(config.rate_limit.secondary_delay(), Duration::from_secs(120));
        assert_eq!(config.rate_limit.reset_grace(), Duration::from_secs(10));
        assert_eq!(config.enrich.max_tree_entries, 200);
    }

    #[test]
    fn test_toml_overrides_nested_values() {
        let config = from_toml(
            r#"
            saturation_delay_ms = 500
            [archive]
            minimum_queued = 3
            [github]
            token = "secret"
            "#,
        )
        .unwrap();
        assert_eq!(config.saturation_delay_ms, 500);
        assert_eq!(config.archive.minimum_queued, 3);
        // Untouched siblings keep their defaults.
        assert_eq!(config.archive.lines_per_batch, 1000);
        assert_eq!(config.github.token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(dir.path().join("does-not-exist.toml")));
        assert_eq!(Config::from_figment(figment).unwrap(), Config::default());
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("missing.toml");
        let err = Config::load(Some(&file)).unwrap_err();
        assert!(matches!(&*err, ErrorKind::MissingFile(path) if *path == file), "{err:?}");
    }

    #[test]
    fn test_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("gharvest.toml");
        std::fs::write(&file, "[processor]\nmaximum_queued = 7\n").unwrap();
        let figment = Figment::from(Serialized::defaults(Config::default())).merge(Toml::file(&file));
        assert_eq!(Config::from_figment(figment).unwrap().processor.maximum_queued, 7);
    }

    #[test]
    fn test_wrong_type_fails_to_load() {
        let err = from_toml("[archive]\nminimum_queued = \"lots\"\n").unwrap_err();
        assert!(matches!(&*err, ErrorKind::Load));
    }

    #[rstest]
    #[case::saturation("saturation_delay_ms = 0", "saturation_delay_ms")]
    #[case::minimum("[archive]\nminimum_queued = 0", "archive.minimum_queued")]
    #[case::batch("[archive]\nlines_per_batch = 0", "archive.lines_per_batch")]
    #[case::maximum("[processor]\nmaximum_queued = 0", "processor.maximum_queued")]
    #[case::attempts("[rate_limit]\nmax_attempts = 0", "rate_limit.max_attempts")]
    #[case::empty_url("[github]\napi_url = \"\"", "github.api_url")]
    #[case::not_http("[archive]\nbase_url = \"ftp://example.com\"", "archive.base_url")]
    #[case::blank_token("[github]\ntoken = \"  \"", "github.token")]
    fn test_validation(#[case] toml: &str, #[case] expected: &str) {
        let config = from_toml(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid { field, .. } if *field == expected), "{err:?}");
    }

    #[test]
    fn test_paths_derive_from_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.paths.data_dir = Some(dir.path().to_path_buf());
        config.paths.database = Some(dir.path().join("elsewhere.db"));
        let paths = config.paths().unwrap();
        assert_eq!(paths.extracted, dir.path().join("extracted"));
        assert_eq!(paths.processed, dir.path().join("processed"));
        assert_eq!(paths.cursor, dir.path().join("cursor.json"));
        assert_eq!(paths.database, dir.path().join("elsewhere.db"));
    }

    #[test]
    fn test_relative_paths_become_absolute() {
        let mut config = Config::default();
        config.paths.data_dir = Some(PathBuf::from("relative/data"));
        let paths = config.paths().unwrap();
        assert!(paths.extracted.is_absolute());
        assert!(paths.extracted.ends_with("relative/data/extracted"));
    }

    #[rstest]
    #[case::first_wins(&[("GH_PAT", "a"), ("GITHUB_TOKEN", "b")], Some("a"))]
    #[case::skips_blank(&[("GH_PAT", " "), ("GH_TOKEN", "c")], Some("c"))]
    #[case::none(&[], None)]
    fn test_token_lookup(#[case] vars: &[(&str, &str)], #[case] expected: Option<&str>) {
        let vars: HashMap<_, _> = vars.iter().copied().collect();
        let token = token_from(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(token.as_deref(), expected);
    }

    #[test]
    fn test_debug_redacts_token() {
        let mut config = GithubConfig::default();
        config.token = Some("ghp_supersecret".to_string());
        let debug = format!("{config:?}");
        assert!(!debug.contains("supersecret"));
        assert!(debug.contains("<redacted>"));
    }
}
