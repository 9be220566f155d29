//! Counters collected over a pipeline run.

/// How one indicator field was filled across all regions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldSummary {
    /// Regions with a directly observed value.
    pub measured: usize,
    /// Regions filled by IDW.
    pub interpolated: usize,
    /// Regions where IDW found no reference within range.
    pub exhausted: usize,
    /// Regions given a synthetic placeholder.
    pub synthesized: usize,
    /// Regions left absent because the source was skipped.
    pub skipped: usize,
    /// Regions without a value at the end of the run, for any reason.
    pub absent: usize,
}

/// Stage-local failures and outcomes of a run.
///
/// None of these abort the run; they are reported once at the end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Regions after loading and deduplication.
    pub regions: usize,
    /// Boundary features with unusable identifiers.
    pub boundary_rejected_ids: usize,
    /// Boundary features collapsed onto an earlier canonical code.
    pub duplicate_regions: usize,
    /// Boundary features without polygon geometry.
    pub invalid_geometries: usize,
    /// Indicator records with unusable identifiers.
    pub indicator_rejected_ids: usize,
    /// Canonical indicator keys that match no region.
    pub unmatched_indicator_keys: usize,
    /// Indicator records without a value.
    pub null_indicator_values: usize,
    /// Station rows dropped for bad coordinates.
    pub invalid_station_coordinates: usize,
    /// Observations without a usable value.
    pub null_observations: usize,
    /// Observations inside no region.
    pub observations_outside_regions: usize,
    /// Observations inside several regions, assigned to the first.
    pub overlapping_observations: usize,
    /// Commuting field outcome.
    pub commute: FieldSummary,
    /// Air field outcome.
    pub air: FieldSummary,
    /// Regions given a joint category.
    pub classified: usize,
}

impl RunSummary {
    /// Logs the summary, warning about anything that was dropped.
    pub fn log_summary(&self) {
        log::info!("Run summary: {} regions, {} classified", self.regions, self.classified);
        log_field("commute", &self.commute);
        log_field("air", &self.air);

        let dropped = [
            ("boundary features with unusable identifiers", self.boundary_rejected_ids),
            ("duplicate boundary features collapsed", self.duplicate_regions),
            ("boundary features without polygon geometry", self.invalid_geometries),
            ("indicator records with unusable identifiers", self.indicator_rejected_ids),
            ("indicator keys matching no region", self.unmatched_indicator_keys),
            ("indicator records without a value", self.null_indicator_values),
            ("station rows with invalid coordinates", self.invalid_station_coordinates),
            ("observations without a value", self.null_observations),
            ("observations outside every region", self.observations_outside_regions),
            ("observations inside overlapping regions", self.overlapping_observations),
        ];
        for (what, count) in dropped {
            if count > 0 {
                log::warn!("  {count} {what}");
            }
        }
    }
}

fn log_field(name: &str, field: &FieldSummary) {
    log::info!(
        "  {name}: {} measured, {} interpolated, {} synthesized",
        field.measured,
        field.interpolated,
        field.synthesized
    );
    if field.exhausted > 0 {
        log::warn!(
            "  {name}: {} regions had no reference within range",
            field.exhausted
        );
    }
    if field.skipped > 0 {
        log::warn!("  {name}: source skipped for {} regions", field.skipped);
    }
    if field.absent > 0 {
        log::warn!("  {name}: {} regions have no value", field.absent);
    }
}
