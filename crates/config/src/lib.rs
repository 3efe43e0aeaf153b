//! Layered configuration for folio.
//!
//! Values are resolved in order, later layers winning:
//!
//! 1. Built-in defaults ([`Config::default`]).
//! 2. A config file: either the path given explicitly, or `folio.toml`,
//!    `folio.yaml` or `folio.json` in the platform config directory.
//! 3. Environment variables prefixed with `FOLIO_`, using `__` to reach into
//!    a section (`FOLIO_PREFETCH__WINDOW=4`).
//!
//! The result is validated before it is handed out, so everything downstream
//! may assume the ranges documented on each field.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "FOLIO_";
const APPLICATION: &str = "folio";
const FILE_STEM: &str = "folio";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APPLICATION)
}

/// Page segmentation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentSection {
    /// Smallest page the segmenter cuts on a blank band, in pixels.
    pub min_page_height: u32,
    /// Largest page the segmenter ever produces, in pixels.
    pub max_page_height: u32,
    /// Rows whose luminance standard deviation is below this are blank.
    pub blank_threshold: f64,
    /// Shortest run of blank rows that counts as a break between panels.
    pub min_blank_rows: u32,
}
impl Default for SegmentSection {
    fn default() -> Self {
        Self {
            min_page_height: 950,
            max_page_height: 1600,
            blank_threshold: 4.0,
            min_blank_rows: 5,
        }
    }
}

/// Look-ahead processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchSection {
    /// How many chapters after the current one to keep ready.
    pub window: usize,
    /// How many background chapters may be processed at once.
    pub workers: usize,
}
impl Default for PrefetchSection {
    fn default() -> Self {
        Self { window: 2, workers: 2 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// Absolute directory holding segmented pages.
    pub root: PathBuf,
}
impl Default for CacheSection {
    fn default() -> Self {
        let root = match project_dirs() {
            Some(dirs) => dirs.cache_dir().join("pages"),
            None => std::env::temp_dir().join(APPLICATION).join("pages"),
        };
        Self { root }
    }
}

/// Strip download behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSection {
    /// Total attempts per fetch, including the first one.
    pub retry_max: u32,
    pub timeout_secs: u64,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}
impl Default for FetchSection {
    fn default() -> Self {
        Self {
            retry_max: 3,
            timeout_secs: 60,
            backoff_base_ms: 500,
            backoff_max_ms: 8000,
        }
    }
}
impl FetchSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

/// Where raw strips are read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSection {
    /// Absolute directory laid out as `<manga>/<chapter>/<part files>`.
    pub root: PathBuf,
}
impl Default for SourceSection {
    fn default() -> Self {
        let root = match project_dirs() {
            Some(dirs) => dirs.data_dir().join("library"),
            None => std::env::temp_dir().join(APPLICATION).join("library"),
        };
        Self { root }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub segment: SegmentSection,
    pub prefetch: PrefetchSection,
    pub cache: CacheSection,
    pub fetch: FetchSection,
    pub source: SourceSection,
}
impl Config {
    /// Load and validate the configuration.
    ///
    /// An explicit `file` must exist; without one, the platform config
    /// directory is searched and a missing file is not an error.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::from_figment(Self::figment(file)?)
    }

    /// Build the layered provider without extracting it.
    pub fn figment(file: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        match file {
            Some(path) => {
                if !path.is_file() {
                    exn::bail!(ErrorKind::FileNotFound(path.to_path_buf()));
                }
                figment = merge_file(figment, path)?;
            },
            None => {
                if let Some(path) = default_file() {
                    tracing::debug!(path = %path.display(), "using config file");
                    figment = merge_file(figment, &path)?;
                }
            },
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let segment = &self.segment;
        if segment.min_page_height == 0 {
            exn::bail!(ErrorKind::Invalid("segment.min_page_height must be positive".to_string()));
        }
        if segment.min_page_height > segment.max_page_height {
            exn::bail!(ErrorKind::Invalid(format!(
                "segment.min_page_height ({}) exceeds segment.max_page_height ({})",
                segment.min_page_height, segment.max_page_height
            )));
        }
        if !segment.blank_threshold.is_finite() || segment.blank_threshold < 0.0 {
            exn::bail!(ErrorKind::Invalid("segment.blank_threshold must be a non-negative number".to_string()));
        }
        if segment.min_blank_rows == 0 {
            exn::bail!(ErrorKind::Invalid("segment.min_blank_rows must be positive".to_string()));
        }
        if self.prefetch.workers == 0 {
            exn::bail!(ErrorKind::Invalid("prefetch.workers must be positive".to_string()));
        }
        if self.fetch.retry_max == 0 {
            exn::bail!(ErrorKind::Invalid("fetch.retry_max must allow at least one attempt".to_string()));
        }
        if self.fetch.timeout_secs == 0 {
            exn::bail!(ErrorKind::Invalid("fetch.timeout_secs must be positive".to_string()));
        }
        if self.fetch.backoff_base_ms > self.fetch.backoff_max_ms {
            exn::bail!(ErrorKind::Invalid("fetch.backoff_base_ms exceeds fetch.backoff_max_ms".to_string()));
        }
        for (key, root) in [("cache.root", &self.cache.root), ("source.root", &self.source.root)] {
            if !root.is_absolute() {
                exn::bail!(ErrorKind::Invalid(format!("{key} must be an absolute path, got {}", root.display())));
            }
        }
        Ok(())
    }
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file_exact(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
        Some("json") => figment.merge(Json::file_exact(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    })
}

fn default_file() -> Option<PathBuf> {
    let dirs = project_dirs()?;
    ["toml", "yaml", "yml", "json"]
        .iter()
        .map(|ext| dirs.config_dir().join(format!("{FILE_STEM}.{ext}")))
        .find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.segment.min_page_height, 950);
        assert_eq!(config.segment.max_page_height, 1600);
        assert_eq!(config.prefetch.window, 2);
        assert_eq!(config.fetch.retry_max, 3);
        assert_eq!(config.fetch.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn file_then_environment() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "folio.toml",
                r#"
                [segment]
                max_page_height = 2000

                [prefetch]
                window = 3
                workers = 4
                "#,
            )?;
            jail.set_env("FOLIO_PREFETCH__WINDOW", "5");
            jail.set_env("FOLIO_FETCH__RETRY_MAX", "7");

            let path = jail.directory().join("folio.toml");
            let config = Config::load(Some(&path)).unwrap();
            assert_eq!(config.segment.max_page_height, 2000);
            // Untouched keys keep their defaults.
            assert_eq!(config.segment.min_page_height, 950);
            assert_eq!(config.prefetch.window, 5);
            assert_eq!(config.prefetch.workers, 4);
            assert_eq!(config.fetch.retry_max, 7);
            Ok(())
        });
    }

    #[test]
    fn yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("folio.yaml");
        std::fs::write(&path, "cache:\n  root: /srv/folio/pages\n").unwrap();
        let config = Config::from_figment(Figment::from(Serialized::defaults(Config::default())).merge(Yaml::file_exact(&path)))
            .unwrap();
        assert_eq!(config.cache.root, PathBuf::from("/srv/folio/pages"));
    }

    #[test]
    fn explicit_file_must_exist() {
        let err = Config::load(Some(Path::new("/definitely/not/here/folio.toml"))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::FileNotFound(_)));
    }

    #[test]
    fn unknown_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("folio.ini");
        std::fs::write(&path, "").unwrap();
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
    }

    #[test]
    fn malformed_values_fail_to_load() {
        Jail::expect_with(|jail| {
            jail.set_env("FOLIO_PREFETCH__WORKERS", "many");
            let err = Config::from_figment(Figment::from(Serialized::defaults(Config::default())).merge(Env::prefixed(ENV_PREFIX).split("__"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Load));
            Ok(())
        });
    }

    fn with(edit: impl FnOnce(&mut Config)) -> Config {
        let mut config = Config::default();
        edit(&mut config);
        config
    }

    #[rstest]
    #[case::zero_min(with(|c| c.segment.min_page_height = 0))]
    #[case::min_above_max(with(|c| c.segment.min_page_height = 2000))]
    #[case::nan_threshold(with(|c| c.segment.blank_threshold = f64::NAN))]
    #[case::negative_threshold(with(|c| c.segment.blank_threshold = -0.5))]
    #[case::no_blank_rows(with(|c| c.segment.min_blank_rows = 0))]
    #[case::no_workers(with(|c| c.prefetch.workers = 0))]
    #[case::no_attempts(with(|c| c.fetch.retry_max = 0))]
    #[case::no_timeout(with(|c| c.fetch.timeout_secs = 0))]
    #[case::backoff_inverted(with(|c| c.fetch.backoff_base_ms = 10_000))]
    #[case::relative_cache(with(|c| c.cache.root = PathBuf::from("pages")))]
    #[case::relative_source(with(|c| c.source.root = PathBuf::from("library")))]
    fn rejects(#[case] config: Config) {
        let err = config.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }

    #[test]
    fn zero_window_is_allowed() {
        with(|c| c.prefetch.window = 0).validate().unwrap();
    }
}
