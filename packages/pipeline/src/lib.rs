#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Commuting × air-quality enrichment pipeline.
//!
//! Attaches a commuting indicator (tabular, keyed by AGS) and an air
//! pollutant concentration (point stations) to every district, classifies
//! both into tertiles and writes named regional subsets as `GeoJSON`.
//!
//! [`enrich`] is the pure core working on in-memory data; [`run`] wires it
//! to the file loaders and the exporter according to a [`PipelineConfig`].

pub mod config;
pub mod progress;
pub mod summary;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use commute_air_bivariate::{IndicatorPair, classify};
use commute_air_geography::boundaries::load_regions;
use commute_air_geography::export::{LayerInfo, write_layer};
use commute_air_geography::indicator::load_indicator;
use commute_air_geography::stations::load_observations;
use commute_air_geography::{GeoError, IndicatorValue, Region};
use commute_air_geography_models::IndicatorRecord;
use commute_air_geography_models::ags::AgsNormalizer;
use commute_air_spatial::idw::{IdwInterpolator, IdwParams};
use commute_air_spatial::projection::Utm;
use commute_air_spatial::{
    ObservationPoint, RegionIndex, SpatialError, aggregate_means, representative_point,
};
use geo::MultiPolygon;
use rand::rngs::StdRng;
use rand::{Rng as _, SeedableRng as _};
use strum_macros::{AsRefStr, Display};
use thiserror::Error;

use crate::config::{Fallback, FallbackPolicy, PipelineConfig, SubsetConfig};
use crate::progress::ProgressCallback;
use crate::summary::{FieldSummary, RunSummary};

/// An input of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Source {
    /// Region boundaries.
    Boundaries,
    /// Commuting indicator table.
    Commute,
    /// Air-quality stations.
    Air,
}

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration value out of range.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the bad value.
        message: String,
    },

    /// Loading or exporting geographic data failed.
    #[error("Geography error: {0}")]
    Geo(#[from] GeoError),

    /// Spatial parameters were invalid.
    #[error("Spatial error: {0}")]
    Spatial(#[from] SpatialError),

    /// A source is unavailable and its policy is `fail`.
    #[error("{input} source is unavailable and its fallback policy is 'fail'")]
    MissingSource {
        /// The unavailable source.
        input: Source,
    },

    /// A source was available but yielded nothing usable.
    #[error("{input} source produced no usable data: {reason}")]
    TotalFailure {
        /// The failing source.
        input: Source,
        /// What went wrong.
        reason: String,
    },

    /// File could not be read or written.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be parsed.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration could not be rendered.
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Parameters of [`enrich`].
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichOptions {
    /// Identifier normalization for tabular records.
    pub normalizer: AgsNormalizer,
    /// IDW search parameters.
    pub idw: IdwParams,
    /// Fallback for an unavailable commuting source.
    pub commute_fallback: Fallback,
    /// Fallback for an unavailable air source.
    pub air_fallback: Fallback,
    /// Seed for synthetic values.
    pub seed: u64,
}

impl EnrichOptions {
    /// Derives the options from a pipeline configuration.
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            normalizer: AgsNormalizer::new(config.id_width),
            idw: config.idw.into(),
            commute_fallback: config.commute.fallback(),
            air_fallback: config.air.fallback(),
            seed: config.seed,
        }
    }
}

/// Attaches both indicators to `regions` and classifies them.
///
/// A source of `None` is unavailable and handled by its fallback policy.
/// Each region field is written by exactly one stage: commuting values by
/// tabular aggregation or fallback, air values by spatial aggregation, then
/// IDW, or fallback, and bins by the classifier.
///
/// # Errors
///
/// * [`PipelineError::TotalFailure`] if there are no regions, if an
///   available source yields no usable record, matches no region, or (for
///   air) leaves every region without a value
/// * [`PipelineError::MissingSource`] if an unavailable source has policy
///   `fail`
/// * [`PipelineError::Spatial`] / [`PipelineError::Config`] on invalid
///   parameters
pub fn enrich(
    regions: &mut [Region],
    commute: Option<&[IndicatorRecord]>,
    air: Option<&[ObservationPoint]>,
    options: &EnrichOptions,
    progress: &dyn ProgressCallback,
) -> Result<RunSummary, PipelineError> {
    if regions.is_empty() {
        return Err(PipelineError::TotalFailure {
            input: Source::Boundaries,
            reason: "no regions to enrich".to_string(),
        });
    }
    options.idw.validate()?;

    let mut summary = RunSummary {
        regions: regions.len(),
        ..RunSummary::default()
    };
    let mut rng = StdRng::seed_from_u64(options.seed);

    progress.set_message("Attaching commuting values".to_string());
    summary.commute = match commute {
        Some(records) => assign_tabular(regions, records, &options.normalizer, &mut summary)?,
        None => apply_fallback(
            regions,
            Source::Commute,
            options.commute_fallback,
            &mut rng,
            |region, value| region.commute = Some(value),
        )?,
    };

    progress.set_message("Attaching air quality values".to_string());
    summary.air = match air {
        Some(observations) => {
            assign_spatial(regions, observations, options.idw, &mut summary, progress)?
        }
        None => apply_fallback(
            regions,
            Source::Air,
            options.air_fallback,
            &mut rng,
            |region, value| region.air = Some(value),
        )?,
    };

    summary.commute.absent = regions.iter().filter(|r| r.commute.is_none()).count();
    summary.air.absent = regions.iter().filter(|r| r.air.is_none()).count();
    summary.classified = assign_classes(regions);

    Ok(summary)
}

/// Averages tabular records per canonical identifier and attaches the means.
fn assign_tabular(
    regions: &mut [Region],
    records: &[IndicatorRecord],
    normalizer: &AgsNormalizer,
    summary: &mut RunSummary,
) -> Result<FieldSummary, PipelineError> {
    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    let mut keys = BTreeSet::new();

    for record in records {
        let key = match normalizer.normalize(&record.raw_id) {
            Ok(key) => key,
            Err(e) => {
                log::debug!("Skipping indicator record: {e}");
                summary.indicator_rejected_ids += 1;
                continue;
            }
        };

        match record.value.filter(|v| v.is_finite()) {
            Some(value) => {
                let entry = sums.entry(key.clone()).or_insert((0.0, 0));
                entry.0 += value;
                entry.1 += 1;
            }
            None => summary.null_indicator_values += 1,
        }
        keys.insert(key);
    }

    if keys.is_empty() {
        return Err(PipelineError::TotalFailure {
            input: Source::Commute,
            reason: format!("none of {} records has a usable identifier", records.len()),
        });
    }

    let region_keys: BTreeSet<&str> = regions.iter().map(Region::ags).collect();
    summary.unmatched_indicator_keys = keys
        .iter()
        .filter(|key| !region_keys.contains(key.as_str()))
        .count();

    let mut field = FieldSummary::default();
    for region in regions.iter_mut() {
        if let Some(&(sum, count)) = sums.get(region.ags()) {
            #[allow(clippy::cast_precision_loss)]
            let mean = sum / count as f64;
            region.commute = Some(IndicatorValue::measured(mean));
            field.measured += 1;
        }
    }

    if field.measured == 0 {
        let matched = keys.len() - summary.unmatched_indicator_keys;
        let reason = if matched == 0 {
            format!("none of {} identifiers matches a region", keys.len())
        } else {
            format!("none of the {matched} identifiers matching a region has a value")
        };
        return Err(PipelineError::TotalFailure {
            input: Source::Commute,
            reason,
        });
    }

    log::info!(
        "Commuting values for {}/{} regions from {} records",
        field.measured,
        regions.len(),
        records.len()
    );
    Ok(field)
}

/// Averages observations inside each region, then interpolates the rest.
fn assign_spatial(
    regions: &mut [Region],
    observations: &[ObservationPoint],
    idw: IdwParams,
    summary: &mut RunSummary,
    progress: &dyn ProgressCallback,
) -> Result<FieldSummary, PipelineError> {
    let polygons: Vec<&MultiPolygon<f64>> = regions.iter().map(|r| &r.geometry).collect();
    let index = RegionIndex::new(&polygons);
    let aggregation = aggregate_means(&index, observations);

    summary.null_observations = aggregation.null_points;
    summary.observations_outside_regions = aggregation.outside_points;
    summary.overlapping_observations = aggregation.overlapping_points;

    let mut field = FieldSummary::default();
    for (region, mean) in regions.iter_mut().zip(&aggregation.means) {
        if let Some(mean) = *mean {
            region.air = Some(IndicatorValue::measured(mean));
            field.measured += 1;
        }
    }
    log::info!(
        "Air values for {}/{} regions from {} contained observations",
        field.measured,
        regions.len(),
        aggregation.assigned_points()
    );

    let interpolator = IdwInterpolator::new(observations, idw)?;
    let pending: Vec<&mut Region> = regions.iter_mut().filter(|r| r.air.is_none()).collect();
    progress.set_total(pending.len() as u64);

    for region in pending {
        match representative_point(&region.geometry).and_then(|p| interpolator.estimate(p)) {
            Some(value) => {
                region.air = Some(IndicatorValue::interpolated(value));
                field.interpolated += 1;
            }
            None => {
                log::debug!("No air reference within range of {}", region.ags());
                field.exhausted += 1;
            }
        }
        progress.inc(1);
    }
    progress.finish(format!(
        "Interpolated {} regions from {} references",
        field.interpolated,
        interpolator.reference_count()
    ));

    if field.measured + field.interpolated == 0 {
        return Err(PipelineError::TotalFailure {
            input: Source::Air,
            reason: format!(
                "{} observations left every region without a value",
                observations.len()
            ),
        });
    }
    Ok(field)
}

/// Applies the policy of an unavailable source.
fn apply_fallback(
    regions: &mut [Region],
    input: Source,
    fallback: Fallback,
    rng: &mut StdRng,
    set: impl Fn(&mut Region, IndicatorValue),
) -> Result<FieldSummary, PipelineError> {
    let mut field = FieldSummary::default();

    match fallback.policy {
        FallbackPolicy::Fail => return Err(PipelineError::MissingSource { input }),
        FallbackPolicy::Synthesize => {
            fallback.validate(input.as_ref())?;
            let [lo, hi] = fallback.synthetic_range;
            for region in regions.iter_mut() {
                set(region, IndicatorValue::synthetic(rng.gen_range(lo..=hi)));
            }
            field.synthesized = regions.len();
            log::warn!(
                "{input} source unavailable; synthesized placeholder values for {} regions",
                regions.len()
            );
        }
        FallbackPolicy::Skip => {
            field.skipped = regions.len();
            log::warn!(
                "{input} source unavailable; {} regions left without a value",
                regions.len()
            );
        }
    }

    Ok(field)
}

/// Writes tertile bins and joint categories; returns the classified count.
fn assign_classes(regions: &mut [Region]) -> usize {
    let pairs: Vec<IndicatorPair> = regions
        .iter()
        .map(|r| IndicatorPair {
            commute: r.commute_value(),
            air: r.air_value(),
        })
        .collect();

    let classification = classify(&pairs);
    for (region, class) in regions.iter_mut().zip(&classification.classes) {
        region.commute_bin = class.commute_bin;
        region.air_bin = class.air_bin;
        region.category = class.category;
    }

    if let Some(breaks) = classification.commute_breaks {
        log::info!(
            "Commuting tertile breaks: {:.2} / {:.2}",
            breaks.lower,
            breaks.upper
        );
    }
    if let Some(breaks) = classification.air_breaks {
        log::info!("Air tertile breaks: {:.2} / {:.2}", breaks.lower, breaks.upper);
    }

    classification.classified_count()
}

/// Regions selected for one output subset.
#[derive(Debug, Clone, PartialEq)]
pub struct Subset<'a> {
    /// Subset name.
    pub name: String,
    /// Regions whose identifier starts with the subset prefix, in input
    /// order.
    pub regions: Vec<&'a Region>,
}

/// Selects the regions of every subset by identifier prefix. Subsets may
/// overlap, and a region may belong to none.
#[must_use]
pub fn partition_subsets<'a>(regions: &'a [Region], subsets: &[SubsetConfig]) -> Vec<Subset<'a>> {
    subsets
        .iter()
        .map(|subset| Subset {
            name: subset.name.clone(),
            regions: regions
                .iter()
                .filter(|r| r.ags().starts_with(subset.prefix.as_str()))
                .collect(),
        })
        .collect()
}

/// A written subset file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsetOutput {
    /// Subset name.
    pub name: String,
    /// File written.
    pub path: PathBuf,
    /// Number of regions in the file.
    pub regions: usize,
}

/// Outcome of [`run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Counters collected during the run.
    pub summary: RunSummary,
    /// Files written, one per configured subset.
    pub outputs: Vec<SubsetOutput>,
}

/// Returns the source path if it is configured and exists.
fn available(path: Option<&Path>, input: Source) -> Option<&Path> {
    match path {
        Some(path) if path.exists() => Some(path),
        Some(path) => {
            log::warn!("{input} file {} not found", path.display());
            None
        }
        None => {
            log::warn!("No {input} file configured");
            None
        }
    }
}

/// Runs the whole pipeline: load, enrich, classify, partition and export.
///
/// # Errors
///
/// * [`PipelineError::Config`] if the configuration is invalid
/// * [`PipelineError::Geo`] if an input cannot be loaded or an output
///   cannot be written
/// * see [`enrich`]
pub fn run(
    config: &PipelineConfig,
    progress: &dyn ProgressCallback,
) -> Result<RunReport, PipelineError> {
    config.validate()?;
    let normalizer = AgsNormalizer::new(config.id_width);
    let projection = Utm::zone(config.utm_zone)?;

    progress.set_message("Loading boundaries".to_string());
    let boundaries = load_regions(
        &config.boundaries.path,
        &config.boundaries.options,
        &normalizer,
    )?;
    let mut regions = boundaries.regions;

    progress.set_message("Loading commuting table".to_string());
    let commute = available(config.commute.path.as_deref(), Source::Commute)
        .map(|path| load_indicator(path, &config.commute.options))
        .transpose()?;

    progress.set_message("Loading air quality stations".to_string());
    let air = available(config.air.path.as_deref(), Source::Air)
        .map(|path| load_observations(path, &config.air.options, &projection))
        .transpose()?;

    let options = EnrichOptions::from_config(config);
    let mut summary = enrich(
        &mut regions,
        commute.as_ref().map(|load| load.records.as_slice()),
        air.as_ref().map(|load| load.observations.as_slice()),
        &options,
        progress,
    )?;
    summary.boundary_rejected_ids = boundaries.rejected_ids;
    summary.duplicate_regions = boundaries.duplicates;
    summary.invalid_geometries = boundaries.invalid_geometries;
    if let Some(load) = &air {
        summary.invalid_station_coordinates = load.invalid_coordinates;
    }

    let epsg = projection.epsg();
    let mut outputs = Vec::new();
    for subset in partition_subsets(&regions, &config.subsets) {
        let path = config
            .output_dir
            .join(format!("{}_bivariate.geojson", subset.name));
        let layer = LayerInfo {
            name: &subset.name,
            epsg,
            pollutant: &config.air.pollutant,
        };
        write_layer(&path, &subset.regions, &layer)?;
        outputs.push(SubsetOutput {
            regions: subset.regions.len(),
            name: subset.name,
            path,
        });
    }

    summary.log_summary();
    Ok(RunReport { summary, outputs })
}
