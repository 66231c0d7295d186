//! Run configuration.
//!
//! A crawl is described by a TOML file whose every key has a default, so an
//! empty file (plus an input path from the command line) is a valid run:
//!
//! ```toml
//! input = "rows.csv"
//! output = "listings.csv"
//! seed_column = "url"
//! site = "directory"
//! source_site = "yellowpages.ca"
//!
//! [retry]
//! max_retries = 4
//!
//! [throttle]
//! start_delay_ms = 500
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeZone};
use listcrawl_crawl_models::SiteProfile;
use listcrawl_scraper::canonical::{Canonicalizer, DEFAULT_REDIRECT_PARAMS};
use listcrawl_scraper::identity::{DEFAULT_USER_AGENTS, IdentityPolicy};
use listcrawl_scraper::retry::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_STATUSES, RetryPolicy};
use listcrawl_scraper::throttle::ThrottleConfig;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Default number of rows walked concurrently.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default name of the input column holding the seed URL.
pub const DEFAULT_SEED_COLUMN: &str = "url";

/// Top-level crawl configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrawlConfig {
    /// Seed CSV file.
    pub input: Option<PathBuf>,
    /// Output CSV file. Defaults to `listings-<timestamp>.csv`.
    pub output: Option<PathBuf>,
    /// Progress file. Defaults to `<output>.progress`.
    pub progress: Option<PathBuf>,
    /// Rows before this index are never crawled.
    pub skip: u64,
    /// Maximum rows walked at once.
    pub concurrency: usize,
    /// Input column holding the seed URL.
    pub seed_column: String,
    /// Input columns copied into every record. `None` copies all of them.
    pub passthrough_columns: Option<Vec<String>>,
    /// Page layout to extract.
    pub site: SiteProfile,
    /// Tag stamped into the `source_site` column. Defaults to the site
    /// profile name.
    pub source_site: Option<String>,
    /// Query parameter names that carry the target of a redirect wrapper,
    /// highest priority first.
    pub redirect_params: Vec<String>,
    /// HTTP settings.
    pub fetch: FetchSection,
    /// Retry settings.
    pub retry: RetrySection,
    /// Auto-throttle settings.
    pub throttle: ThrottleSection,
    /// User agent rotation settings.
    pub identity: IdentitySection,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            progress: None,
            skip: 0,
            concurrency: DEFAULT_CONCURRENCY,
            seed_column: DEFAULT_SEED_COLUMN.to_owned(),
            passthrough_columns: None,
            site: SiteProfile::default(),
            source_site: None,
            redirect_params: DEFAULT_REDIRECT_PARAMS
                .iter()
                .map(|&p| p.to_owned())
                .collect(),
            fetch: FetchSection::default(),
            retry: RetrySection::default(),
            throttle: ThrottleSection::default(),
            identity: IdentitySection::default(),
        }
    }
}

/// `[fetch]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchSection {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

/// `[retry]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySection {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// HTTP statuses that are retried.
    pub statuses: Vec<u16>,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Cap on any single backoff, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            statuses: DEFAULT_RETRY_STATUSES.to_vec(),
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

/// `[throttle]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThrottleSection {
    /// Whether request starts are spaced out at all.
    pub enabled: bool,
    /// Initial spacing, in milliseconds.
    pub start_delay_ms: u64,
    /// Lower bound, in milliseconds.
    pub min_delay_ms: u64,
    /// Upper bound, in milliseconds.
    pub max_delay_ms: u64,
    /// Average in-flight requests the remote server should see.
    pub target_concurrency: f64,
}

impl Default for ThrottleSection {
    fn default() -> Self {
        Self {
            enabled: true,
            start_delay_ms: 500,
            min_delay_ms: 0,
            max_delay_ms: 10_000,
            target_concurrency: 1.0,
        }
    }
}

/// `[identity]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentitySection {
    /// Keep one user agent per row for the whole walk.
    pub sticky: bool,
    /// User agent pool. `None` uses the built-in pool; an empty list sends
    /// the HTTP client's own user agent.
    pub user_agents: Option<Vec<String>>,
    /// Headers sent with every request.
    pub headers: BTreeMap<String, String>,
}

impl Default for IdentitySection {
    fn default() -> Self {
        Self {
            sticky: true,
            user_agents: None,
            headers: BTreeMap::new(),
        }
    }
}

impl CrawlConfig {
    /// Reads and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, is not valid
    /// TOML, or fails [`Self::validate`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&contents)?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parses and validates a config document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the document is not valid TOML for this
    /// struct or fails [`Self::validate`].
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::de::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges and cross-field consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(invalid("concurrency must be at least 1"));
        }
        if self.seed_column.trim().is_empty() {
            return Err(invalid("seed_column must not be empty"));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(invalid("fetch.timeout_secs must be at least 1"));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(invalid(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }
        if self.throttle.min_delay_ms > self.throttle.max_delay_ms {
            return Err(invalid(format!(
                "throttle.min_delay_ms ({}) exceeds throttle.max_delay_ms ({})",
                self.throttle.min_delay_ms, self.throttle.max_delay_ms
            )));
        }
        if !(self.throttle.target_concurrency.is_finite()
            && self.throttle.target_concurrency > 0.0)
        {
            return Err(invalid("throttle.target_concurrency must be positive"));
        }
        Ok(())
    }

    /// The input file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if no input was configured.
    pub fn input_path(&self) -> Result<&Path, ConfigError> {
        self.input
            .as_deref()
            .ok_or_else(|| invalid("no input file configured"))
    }

    /// The output file, or `listings-<timestamp>.csv` stamped with `now`.
    #[must_use]
    pub fn output_path<Tz: TimeZone>(&self, now: DateTime<Tz>) -> PathBuf
    where
        Tz::Offset: std::fmt::Display,
    {
        self.output.clone().unwrap_or_else(|| {
            PathBuf::from(format!(
                "listings-{}.csv",
                now.format("%Y-%m-%d_%H-%M-%S")
            ))
        })
    }

    /// The progress file, or `<output>.progress`.
    #[must_use]
    pub fn progress_path(&self, output: &Path) -> PathBuf {
        self.progress.clone().unwrap_or_else(|| {
            let mut name = output.as_os_str().to_os_string();
            name.push(".progress");
            PathBuf::from(name)
        })
    }

    /// The tag stamped on every record.
    #[must_use]
    pub fn source_site(&self) -> String {
        self.source_site
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map_or_else(|| self.site.to_string(), str::to_owned)
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout_secs)
    }

    /// Builds the retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry.max_retries)
            .with_statuses(self.retry.statuses.iter().copied())
            .with_base_delay(Duration::from_millis(self.retry.base_delay_ms))
            .with_max_delay(Duration::from_millis(self.retry.max_delay_ms))
    }

    /// Builds the throttle settings.
    #[must_use]
    pub const fn throttle_config(&self) -> ThrottleConfig {
        ThrottleConfig {
            enabled: self.throttle.enabled,
            start_delay: Duration::from_millis(self.throttle.start_delay_ms),
            min_delay: Duration::from_millis(self.throttle.min_delay_ms),
            max_delay: Duration::from_millis(self.throttle.max_delay_ms),
            target_concurrency: self.throttle.target_concurrency,
        }
    }

    /// Builds the identity rotation policy.
    #[must_use]
    pub fn identity_policy(&self) -> IdentityPolicy {
        self.identity.user_agents.as_ref().map_or_else(
            || {
                IdentityPolicy::from_user_agents(
                    DEFAULT_USER_AGENTS,
                    &self.identity.headers,
                    self.identity.sticky,
                )
            },
            |agents| {
                IdentityPolicy::from_user_agents(
                    agents.as_slice(),
                    &self.identity.headers,
                    self.identity.sticky,
                )
            },
        )
    }

    /// Builds the URL canonicalizer.
    #[must_use]
    pub fn canonicalizer(&self) -> Canonicalizer {
        Canonicalizer::new(self.redirect_params.as_slice())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = CrawlConfig::from_toml_str("").unwrap();
        assert_eq!(config, CrawlConfig::default());
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.seed_column, "url");
        assert_eq!(config.retry_policy().max_retries(), 4);
        assert!(config.retry_policy().is_retryable_status(403));
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.identity_policy().pool_size(), DEFAULT_USER_AGENTS.len());
        assert!(config.identity_policy().is_sticky());
    }

    #[test]
    fn parses_full_document() {
        let config = CrawlConfig::from_toml_str(
            r#"
            input = "rows.csv"
            output = "out.csv"
            skip = 10
            concurrency = 8
            seed_column = "business_category_url"
            passthrough_columns = ["province", "city_name"]
            site = "place"
            source_site = "maps"
            redirect_params = ["to"]

            [fetch]
            timeout_secs = 5

            [retry]
            max_retries = 2
            statuses = [503]
            base_delay_ms = 10
            max_delay_ms = 100

            [throttle]
            enabled = false
            target_concurrency = 2.0

            [identity]
            sticky = false
            user_agents = ["a", "b"]

            [identity.headers]
            "Accept-Language" = "fr-CA"
            "#,
        )
        .unwrap();

        assert_eq!(config.input_path().unwrap(), Path::new("rows.csv"));
        assert_eq!(config.skip, 10);
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.site, SiteProfile::Place);
        assert_eq!(config.source_site(), "maps");
        assert_eq!(
            config.passthrough_columns.as_deref(),
            Some(&["province".to_owned(), "city_name".to_owned()][..])
        );
        assert_eq!(config.canonicalizer().redirect_params(), ["to".to_owned()]);

        let retry = config.retry_policy();
        assert_eq!(retry.max_retries(), 2);
        assert!(retry.is_retryable_status(503));
        assert!(!retry.is_retryable_status(429));
        assert_eq!(retry.delay_for(0), Duration::from_millis(10));

        let throttle = config.throttle_config();
        assert!(!throttle.enabled);
        assert_eq!(throttle.start_delay, Duration::from_millis(500));

        let identities = config.identity_policy();
        assert_eq!(identities.pool_size(), 2);
        assert!(!identities.is_sticky());
        assert_eq!(
            identities.identity_for(0).unwrap().headers["Accept-Language"],
            "fr-CA"
        );
    }

    #[test]
    fn rejects_invalid_values() {
        for doc in [
            "concurrency = 0",
            "seed_column = ' '",
            "[throttle]\nmin_delay_ms = 5000\nmax_delay_ms = 100",
            "[throttle]\ntarget_concurrency = 0.0",
            "[retry]\nbase_delay_ms = 10\nmax_delay_ms = 1",
            "[fetch]\ntimeout_secs = 0",
        ] {
            assert!(
                matches!(CrawlConfig::from_toml_str(doc), Err(ConfigError::Invalid(_))),
                "{doc}"
            );
        }
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(matches!(
            CrawlConfig::from_toml_str("concurency = 4"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_input_is_an_error() {
        assert!(CrawlConfig::default().input_path().is_err());
    }

    #[test]
    fn default_paths_derive_from_output() {
        let now = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        let config = CrawlConfig::default();

        let output = config.output_path(now);
        assert_eq!(output, PathBuf::from("listings-2025-03-04_05-06-07.csv"));
        assert_eq!(
            config.progress_path(&output),
            PathBuf::from("listings-2025-03-04_05-06-07.csv.progress")
        );

        let explicit = CrawlConfig {
            output: Some(PathBuf::from("out/a.csv")),
            progress: Some(PathBuf::from("state/a.txt")),
            ..CrawlConfig::default()
        };
        assert_eq!(explicit.output_path(now), PathBuf::from("out/a.csv"));
        assert_eq!(
            explicit.progress_path(Path::new("out/a.csv")),
            PathBuf::from("state/a.txt")
        );
    }

    #[test]
    fn source_site_defaults_to_profile_name() {
        assert_eq!(CrawlConfig::default().source_site(), "directory");
        let blank = CrawlConfig {
            source_site: Some("  ".to_owned()),
            ..CrawlConfig::default()
        };
        assert_eq!(blank.source_site(), "directory");
    }
}
