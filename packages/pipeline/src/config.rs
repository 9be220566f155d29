//! Pipeline configuration.
//!
//! Read from a TOML file in which every key is optional; missing keys take
//! the defaults shown in the embedded [`DEFAULT_CONFIG_TOML`] template.

use std::path::{Path, PathBuf};

use commute_air_geography::boundaries::BoundaryOptions;
use commute_air_geography::indicator::{IndicatorFormat, IndicatorOptions};
use commute_air_geography::stations::StationOptions;
use commute_air_geography_models::ags::{KREIS_WIDTH, LEVEL_WIDTHS};
use commute_air_spatial::idw::{DEFAULT_K, DEFAULT_MAX_KM, DEFAULT_MIN_DISTANCE_M, IdwParams};
use commute_air_spatial::projection::DEFAULT_ZONE;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::PipelineError;

/// Annotated configuration template with every default spelled out.
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../commute_air.toml");

/// What to do when an indicator source is not available.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FallbackPolicy {
    /// Abort the run.
    Fail,
    /// Fill every region with seeded uniform placeholder values.
    Synthesize,
    /// Leave the field absent for every region.
    Skip,
}

/// Placeholder generation for an unavailable source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fallback {
    /// Applied when the source file is not configured or missing.
    pub policy: FallbackPolicy,
    /// Inclusive range of synthetic values.
    pub synthetic_range: [f64; 2],
}

impl Fallback {
    pub(crate) fn validate(&self, input: &str) -> Result<(), PipelineError> {
        let [lo, hi] = self.synthetic_range;
        // The width must be finite too or uniform sampling overflows.
        if lo.is_finite() && hi.is_finite() && lo <= hi && (hi - lo).is_finite() {
            Ok(())
        } else {
            Err(PipelineError::Config {
                message: format!("{input}.synthetic_range must be [min, max], got [{lo}, {hi}]"),
            })
        }
    }
}

/// Boundary input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    /// `GeoJSON` file in the projected CRS.
    pub path: PathBuf,
    /// Field selection and filtering.
    pub options: BoundaryOptions,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data_raw/kreise.geojson"),
            options: BoundaryOptions::default(),
        }
    }
}

/// Commuting indicator input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommuteConfig {
    /// CSV table; the source counts as unavailable if unset or missing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Behaviour when the table is unavailable.
    pub policy: FallbackPolicy,
    /// Inclusive range of synthetic values.
    pub synthetic_range: [f64; 2],
    /// Table layout.
    pub options: IndicatorOptions,
}

impl Default for CommuteConfig {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from("data_raw/pendler.csv")),
            policy: FallbackPolicy::Synthesize,
            synthetic_range: [0.0, 100.0],
            options: IndicatorOptions {
                format: IndicatorFormat::Wide,
                ..IndicatorOptions::default()
            },
        }
    }
}

impl CommuteConfig {
    /// Fallback settings of this source.
    #[must_use]
    pub const fn fallback(&self) -> Fallback {
        Fallback {
            policy: self.policy,
            synthetic_range: self.synthetic_range,
        }
    }
}

/// Air-quality station input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirConfig {
    /// Station CSV; the source counts as unavailable if unset or missing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Pollutant label written to the output.
    pub pollutant: String,
    /// Behaviour when the station file is unavailable.
    pub policy: FallbackPolicy,
    /// Inclusive range of synthetic values.
    pub synthetic_range: [f64; 2],
    /// Column selection and network filter.
    pub options: StationOptions,
}

impl Default for AirConfig {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from("data_raw/stations_no2.csv")),
            pollutant: "NO2".to_string(),
            policy: FallbackPolicy::Fail,
            synthetic_range: [5.0, 40.0],
            options: StationOptions::default(),
        }
    }
}

impl AirConfig {
    /// Fallback settings of this source.
    #[must_use]
    pub const fn fallback(&self) -> Fallback {
        Fallback {
            policy: self.policy,
            synthetic_range: self.synthetic_range,
        }
    }
}

/// IDW search parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdwConfig {
    /// Nearest references per estimate.
    pub k: usize,
    /// Search radius in kilometres.
    pub max_km: f64,
    /// Distance floor in metres.
    pub min_distance_m: f64,
}

impl Default for IdwConfig {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            max_km: DEFAULT_MAX_KM,
            min_distance_m: DEFAULT_MIN_DISTANCE_M,
        }
    }
}

impl From<IdwConfig> for IdwParams {
    fn from(config: IdwConfig) -> Self {
        Self {
            k: config.k,
            max_km: config.max_km,
            min_distance_m: config.min_distance_m,
        }
    }
}

/// A named output subset selected by identifier prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsetConfig {
    /// Output name; the file is `<name>_bivariate.geojson`.
    pub name: String,
    /// Canonical identifier prefix; empty selects every region.
    pub prefix: String,
}

impl SubsetConfig {
    /// Creates a subset.
    #[must_use]
    pub fn new(name: &str, prefix: &str) -> Self {
        Self {
            name: name.to_string(),
            prefix: prefix.to_string(),
        }
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Canonical identifier width in digits.
    pub id_width: usize,
    /// UTM zone of the projected CRS.
    pub utm_zone: u8,
    /// Seed for synthetic placeholder values.
    pub seed: u64,
    /// Directory the subset files are written to.
    pub output_dir: PathBuf,
    /// Boundary input.
    pub boundaries: BoundaryConfig,
    /// Commuting input.
    pub commute: CommuteConfig,
    /// Air-quality input.
    pub air: AirConfig,
    /// IDW parameters.
    pub idw: IdwConfig,
    /// Output subsets.
    pub subsets: Vec<SubsetConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            id_width: KREIS_WIDTH,
            utm_zone: DEFAULT_ZONE,
            seed: 42,
            output_dir: PathBuf::from("data_processed"),
            boundaries: BoundaryConfig::default(),
            commute: CommuteConfig::default(),
            air: AirConfig::default(),
            idw: IdwConfig::default(),
            subsets: vec![
                SubsetConfig::new("bayern", "09"),
                SubsetConfig::new("oberpfalz", "093"),
            ],
        }
    }
}

impl PipelineConfig {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// * [`PipelineError::Toml`] if the text is not valid configuration
    /// * [`PipelineError::Config`] if a value is out of range
    pub fn from_toml_str(s: &str) -> Result<Self, PipelineError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a configuration file.
    ///
    /// # Errors
    ///
    /// * [`PipelineError::Io`] if the file cannot be read
    /// * see [`Self::from_toml_str`]
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TomlSerialize`] if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, PipelineError> {
        Ok(toml::to_string(self)?)
    }

    /// Checks value ranges that the TOML schema cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] describing the first bad value.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let max_width = LEVEL_WIDTHS.iter().copied().max().unwrap_or(KREIS_WIDTH);
        if !(2..=max_width).contains(&self.id_width) {
            return Err(PipelineError::Config {
                message: format!("id_width must be within 2..={max_width}, got {}", self.id_width),
            });
        }
        if self.subsets.iter().any(|s| s.name.trim().is_empty()) {
            return Err(PipelineError::Config {
                message: "subset names must not be empty".to_string(),
            });
        }
        self.commute.fallback().validate("commute")?;
        self.air.fallback().validate("air")?;
        IdwParams::from(self.idw).validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_template_matches_defaults() {
        let config = PipelineConfig::from_toml_str(DEFAULT_CONFIG_TOML).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.subsets.len(), 2);
        assert_eq!(config.subsets[1].prefix, "093");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            seed = 7

            [idw]
            k = 3

            [commute]
            policy = "skip"

            [commute.options]
            format = "pairs"

            [air.options]
            network = "BY"

            [[subsets]]
            name = "niederbayern"
            prefix = "092"
            "#,
        )
        .unwrap();

        assert_eq!(config.seed, 7);
        assert_eq!(config.idw.k, 3);
        assert!((config.idw.max_km - DEFAULT_MAX_KM).abs() < f64::EPSILON);
        assert_eq!(config.commute.policy, FallbackPolicy::Skip);
        assert_eq!(config.commute.options.format, IndicatorFormat::Pairs);
        assert_eq!(config.commute.options.id_column, "AGS5");
        assert_eq!(config.air.options.network.as_deref(), Some("BY"));
        assert_eq!(config.air.policy, FallbackPolicy::Fail);
        assert_eq!(config.subsets, vec![SubsetConfig::new("niederbayern", "092")]);
    }

    #[test]
    fn rejects_out_of_range_values() {
        for toml_str in [
            "id_width = 1",
            "id_width = 13",
            "[idw]\nk = 0",
            "[idw]\nmax_km = -1.0",
            "[air]\nsynthetic_range = [10.0, 5.0]",
            "[commute]\nsynthetic_range = [-1e308, 1e308]",
            "[[subsets]]\nname = \" \"\nprefix = \"09\"",
        ] {
            assert!(
                matches!(
                    PipelineConfig::from_toml_str(toml_str),
                    Err(PipelineError::Config { .. } | PipelineError::Spatial(_))
                ),
                "accepted {toml_str:?}"
            );
        }
    }

    #[test]
    fn rejects_unknown_policy() {
        let result = PipelineConfig::from_toml_str("[commute]\npolicy = \"guess\"");
        assert!(matches!(result, Err(PipelineError::Toml(_))));
    }

    #[test]
    fn renders_back_to_equivalent_toml() {
        let config = PipelineConfig::default();
        let rendered = config.to_toml_string().unwrap();
        assert_eq!(PipelineConfig::from_toml_str(&rendered).unwrap(), config);
    }

    #[test]
    fn policy_names() {
        assert_eq!(FallbackPolicy::Synthesize.to_string(), "synthesize");
        assert_eq!("skip".parse::<FallbackPolicy>().unwrap(), FallbackPolicy::Skip);
    }
}
