use std::io;

/// Errors that abort setup before any particle is advected.
///
/// Per-particle failures during a step are never reported through this type,
/// they are recorded as flags on the particle instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("source {source_idx} has no release policy")]
    MissingRelease { source_idx: usize },

    #[error("release schedule would inject no particles")]
    NonPositiveParticleCount,

    #[error("release window [{start}, {end}] lies outside of the simulation [0, {duration}]")]
    ReleaseWindow { start: f64, end: f64, duration: f64 },

    #[error("invalid value for {name}: {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("unknown output field: {0}")]
    UnknownOutputField(String),

    #[error("invalid obstacle mesh: {0}")]
    InvalidMesh(String),

    #[error("output failed: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = ::std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid<V: ToString>(name: &'static str, value: V, reason: &'static str) -> Self {
        Error::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }
}

/// Fails with `InvalidParameter` unless `value` is finite and strictly positive.
pub(crate) fn require_positive(name: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(Error::invalid(name, value, "must be positive"))
    }
}
