//! Metric names recorded by the pipeline.
//!
//! Recording goes through the `metrics` facade and is free when the host has
//! not installed a recorder.

use metrics::{describe_counter, describe_histogram, Unit};

/// Pairs whose height raster was written.
pub const PAIRS_COMPUTED: &str = "chm_pairs_computed_total";

/// Pairs left out under the skip policy.
pub const PAIRS_SKIPPED: &str = "chm_pairs_skipped_total";

/// Wall time to read, difference and write one pair.
pub const PAIR_DURATION: &str = "chm_pair_duration_seconds";

/// Register descriptions for every pipeline metric with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(PAIRS_COMPUTED, Unit::Count, "Height rasters written");
    describe_counter!(PAIRS_SKIPPED, Unit::Count, "Pairs skipped after a per-pair failure");
    describe_histogram!(
        PAIR_DURATION,
        Unit::Seconds,
        "Time to read, difference and write one DSM/DTM pair"
    );
}
