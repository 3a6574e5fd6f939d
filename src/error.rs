//! Error taxonomy for trace reconstruction and slicing.
//!
//! Most of these never escape the public API: the slicing and geocoding entry points
//! catch them and degrade to a smaller renderable result, logging the cause. Only whole
//! document decoding reports failure to the caller.

use thiserror::Error;

/// Errors raised while decoding input or producing trace geometry.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to decode GeoJSON: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("insufficient points: got {point_count} points, need at least {minimum_required}")]
    InsufficientPoints {
        point_count: usize,
        minimum_required: usize,
    },

    #[error("ambiguous range: start {start_m:.1}m is not before end {end_m:.1}m")]
    AmbiguousRange { start_m: f64, end_m: f64 },

    #[error("marker at km {km:.3} resolves both ends of the range")]
    MarkerCollision { km: f64 },

    #[error("slice of {actual_km:.2}km is implausible for anchors {implied_km:.2}km apart")]
    GeometryMismatch { actual_km: f64, implied_km: f64 },

    #[error("unsupported geometry type: {0}")]
    UnsupportedGeometry(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, TraceError>;

/// Conversions from `Option` into the error taxonomy.
pub trait OptionExt<T> {
    /// Map `None` to [`TraceError::InsufficientPoints`].
    fn ok_or_insufficient_points(self, point_count: usize, minimum_required: usize) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_insufficient_points(self, point_count: usize, minimum_required: usize) -> Result<T> {
        self.ok_or(TraceError::InsufficientPoints {
            point_count,
            minimum_required,
        })
    }
}
