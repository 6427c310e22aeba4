use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

use crate::profiler::ProfileFormat;

pub const DEFAULT_URI: &str = "mongodb://localhost:27017";
pub const DEFAULT_DATABASE: &str = "loadtest";
pub const DEFAULT_COLLECTION: &str = "test";
pub const DOCUMENT_COUNT: u64 = 50_000;
pub const REQUEST_COUNT: usize = 100;
pub const PROFILE_DURATION_MS: u64 = 20_000;
pub const SAMPLE_INTERVAL_US: u64 = 100;
pub const PROFILE_LABEL: &str = "driver-fetch-50k-docs-100-times";
pub const DRIVER_TAG: &str = "mongodb driver 3";

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub database: DatabaseConfig,
    #[validate(nested)]
    pub fixture: FixtureConfig,
    #[validate(nested)]
    pub load: LoadConfig,
    #[validate(nested)]
    pub profile: ProfileConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    #[validate(length(min = 1))]
    pub uri: String,
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub collection: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FixtureConfig {
    #[validate(range(min = 1))]
    pub document_count: u64,
    /// Copied verbatim into every inserted document.
    pub template: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoadConfig {
    #[validate(range(min = 1))]
    pub request_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProfileConfig {
    #[validate(length(min = 1))]
    pub label: String,
    pub duration_ms: u64,
    pub sample_interval_us: u64,
    pub format: ProfileFormat,
    pub output_dir: PathBuf,
}

impl ProfileConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_micros(self.sample_interval_us)
    }

    /// `<output_dir>/<label>.<ext>`; reused by every run.
    pub fn output_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", self.label, self.format.extension()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Overrides the generated stopwatch label.
    pub tag: Option<String>,
    pub driver: String,
}

impl Default for Config {
    fn default() -> Self {
        let mut template = Map::new();
        template.insert("field1".into(), Value::String("value1".into()));
        Self {
            database: DatabaseConfig {
                uri: DEFAULT_URI.into(),
                name: DEFAULT_DATABASE.into(),
                collection: DEFAULT_COLLECTION.into(),
            },
            fixture: FixtureConfig {
                document_count: DOCUMENT_COUNT,
                template,
            },
            load: LoadConfig {
                request_count: REQUEST_COUNT,
            },
            profile: ProfileConfig {
                label: PROFILE_LABEL.into(),
                duration_ms: PROFILE_DURATION_MS,
                sample_interval_us: SAMPLE_INTERVAL_US,
                format: ProfileFormat::Pprof,
                output_dir: PathBuf::from("."),
            },
            report: ReportConfig {
                tag: None,
                driver: DRIVER_TAG.into(),
            },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("PROBE__").split("__"));
        let cfg: Config = figment.extract()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Stopwatch label, e.g. `fetch 50k docs 100 times in parallel (mongodb driver 3)`.
    pub fn timer_label(&self) -> String {
        if let Some(tag) = &self.report.tag {
            return tag.clone();
        }
        let docs = self.fixture.document_count;
        let docs = if docs >= 1000 && docs % 1000 == 0 {
            format!("{}k", docs / 1000)
        } else {
            docs.to_string()
        };
        format!(
            "fetch {} docs {} times in parallel ({})",
            docs, self.load.request_count, self.report.driver
        )
    }
}
