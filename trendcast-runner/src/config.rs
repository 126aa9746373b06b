//! Pipeline configuration, loaded from TOML.
//!
//! ```toml
//! [data]
//! from_date = "2014-01-01"
//! symbol = "BTC-USD"
//! keywords = ["bitcoin"]
//!
//! [trend]
//! trdays = 250
//! overlap = 100
//!
//! [features]
//! look_back = 10
//! split_ratio = 0.7
//! ```
//!
//! Every field has a default, so an empty file is a valid config.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use trendcast_core::data::{MAX_KEYWORDS, MAX_WINDOW_DAYS};
use trendcast_core::dates::parse_date;
use trendcast_core::StitchOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub data: DataSection,
    pub trend: TrendSection,
    pub features: FeatureSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataSection {
    pub from_date: String,
    /// Defaults to today when absent.
    pub to_date: Option<String>,
    pub symbol: String,
    pub keywords: Vec<String>,
    /// Trend column the aligner uses; defaults to the first keyword.
    pub target_keyword: Option<String>,
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            from_date: "2014-01-01".into(),
            to_date: None,
            symbol: "BTC-USD".into(),
            keywords: vec!["bitcoin".into()],
            target_keyword: None,
            raw_dir: PathBuf::from("data/raw"),
            processed_dir: PathBuf::from("data/processed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrendSection {
    pub trdays: u32,
    pub overlap: u32,
    pub scale: bool,
    pub stitch_forward: bool,
    pub keep_partial: bool,
    /// Pause between consecutive trend queries, in milliseconds.
    pub pause_ms: u64,
}

impl Default for TrendSection {
    fn default() -> Self {
        Self {
            trdays: 250,
            overlap: 100,
            scale: true,
            stitch_forward: false,
            keep_partial: false,
            pause_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeatureSection {
    pub look_back: usize,
    pub n_out: usize,
    pub split_ratio: f64,
}

impl Default for FeatureSection {
    fn default() -> Self {
        Self {
            look_back: 10,
            n_out: 1,
            split_ratio: 0.7,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&s)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let from = self.from_date()?;
        if let Some(to) = self.to_date()? {
            if to < from {
                return Err(ConfigError::Invalid(format!(
                    "to_date {to} is before from_date {from}"
                )));
            }
        }

        let kws = &self.data.keywords;
        if kws.is_empty() || kws.len() > MAX_KEYWORDS {
            return Err(ConfigError::Invalid(format!(
                "data.keywords must hold 1 to {MAX_KEYWORDS} terms, got {}",
                kws.len()
            )));
        }
        if let Some(target) = &self.data.target_keyword {
            if !kws.contains(target) {
                return Err(ConfigError::Invalid(format!(
                    "target_keyword '{target}' is not one of {kws:?}"
                )));
            }
        }

        let t = &self.trend;
        if i64::from(t.trdays) > MAX_WINDOW_DAYS {
            return Err(ConfigError::Invalid(format!(
                "trend.trdays must not exceed {MAX_WINDOW_DAYS}"
            )));
        }
        if t.overlap >= t.trdays {
            return Err(ConfigError::Invalid(
                "trend.overlap must be smaller than trend.trdays".into(),
            ));
        }

        let f = &self.features;
        if f.look_back < 2 {
            return Err(ConfigError::Invalid(
                "features.look_back must be at least 2".into(),
            ));
        }
        if f.n_out == 0 {
            return Err(ConfigError::Invalid("features.n_out must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&f.split_ratio) {
            return Err(ConfigError::Invalid(format!(
                "features.split_ratio must be within [0, 1], got {}",
                f.split_ratio
            )));
        }
        Ok(())
    }

    pub fn from_date(&self) -> Result<NaiveDate, ConfigError> {
        parse_date(&self.data.from_date).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn to_date(&self) -> Result<Option<NaiveDate>, ConfigError> {
        self.data
            .to_date
            .as_deref()
            .map(parse_date)
            .transpose()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// End of the requested range, falling back to `today`.
    pub fn to_date_or(&self, today: NaiveDate) -> Result<NaiveDate, ConfigError> {
        Ok(self.to_date()?.unwrap_or(today))
    }

    pub fn target_keyword(&self) -> &str {
        self.data
            .target_keyword
            .as_deref()
            .or_else(|| self.data.keywords.first().map(String::as_str))
            .unwrap_or("bitcoin")
    }

    pub fn stitch_options(&self) -> StitchOptions {
        let t = &self.trend;
        StitchOptions {
            trdays: t.trdays,
            overlap: t.overlap,
            scale: t.scale,
            stitch_forward: t.stitch_forward,
            keep_partial: t.keep_partial,
            pause: std::time::Duration::from_millis(t.pause_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = PipelineConfig::from_toml("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.target_keyword(), "bitcoin");
        assert_eq!(config.stitch_options(), StitchOptions::default());
    }

    #[test]
    fn sections_override_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
[data]
from_date = "2018-06-01"
to_date = "2020-06-01"
keywords = ["bitcoin", "crypto"]
target_keyword = "crypto"

[trend]
trdays = 200
overlap = 50
pause_ms = 0

[features]
look_back = 5
split_ratio = 0.8
"#,
        )
        .unwrap();

        assert_eq!(config.from_date().unwrap(), NaiveDate::from_ymd_opt(2018, 6, 1).unwrap());
        assert_eq!(config.target_keyword(), "crypto");
        assert_eq!(config.features.look_back, 5);
        assert_eq!(config.features.n_out, 1);
        let opts = config.stitch_options();
        assert_eq!((opts.trdays, opts.overlap), (200, 50));
        assert!(opts.pause.is_zero());
        assert!(opts.scale);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let cases = [
            "[data]\nfrom_date = \"2018/06/01\"",
            "[data]\nfrom_date = \"2020-01-01\"\nto_date = \"2019-01-01\"",
            "[data]\nkeywords = []",
            "[data]\nkeywords = [\"a\",\"b\",\"c\",\"d\",\"e\",\"f\"]",
            "[data]\ntarget_keyword = \"ethereum\"",
            "[trend]\ntrdays = 300",
            "[trend]\ntrdays = 100\noverlap = 100",
            "[features]\nlook_back = 1",
            "[features]\nsplit_ratio = 1.5",
        ];
        for case in cases {
            assert!(
                matches!(PipelineConfig::from_toml(case), Err(ConfigError::Invalid(_))),
                "expected invalid: {case}"
            );
        }
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            PipelineConfig::from_toml("[data\nfrom_date = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn toml_round_trips() {
        let config = PipelineConfig::default();
        let text = config.to_toml().unwrap();
        assert_eq!(PipelineConfig::from_toml(&text).unwrap(), config);
    }
}
