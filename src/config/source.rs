use crate::error::Result;
use crate::particle::ParticleProperties;
use crate::release::ReleasePolicy;
use crate::source::{Source, SourceBuilder, SourceGeometry};
use serde::{Deserialize, Serialize};

/// Parameters of one particle source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub geometry: SourceGeometry,
    /// A source without a release policy is rejected when the simulation is set up.
    #[serde(default)]
    pub release: Option<ReleasePolicy>,
    #[serde(default)]
    pub particle: ParticleProperties,
}

impl SourceConfig {
    pub fn into_source(&self, idx: usize, timestep: f64, sim_duration: f64) -> Result<Source> {
        SourceBuilder::new(idx)
            .geometry(self.geometry)
            .maybe_release(self.release)
            .properties(self.particle)
            .build(timestep, sim_duration)
    }
}
