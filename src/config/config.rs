use super::SourceConfig;
use crate::error::{require_positive, Result};
use crate::interp::Interpolation;
use crate::output::OutputConfig;
use crate::reflection::ReflectionConfig;
use crate::release;
use crate::source::Source;
use serde::{Deserialize, Serialize};

/// Encapsulates all parameters of a transport run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Length of one step in s.
    pub timestep: f64,
    /// Simulated time in s.
    pub sim_duration: f64,
    /// Seed of all random numbers drawn during the run.
    pub seed: u64,
    pub interpolation: Interpolation,
    pub reflection: ReflectionConfig,
    pub output: OutputConfig,
    pub sources: Vec<SourceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            timestep: 1.0,
            sim_duration: 100.0,
            seed: 0,
            interpolation: Interpolation::default(),
            reflection: ReflectionConfig::default(),
            output: OutputConfig::default(),
            sources: Vec::new(),
        }
    }
}

impl Config {
    /// Checks the discretization and scheme and builds every source with its schedule.
    pub fn build_sources(&self) -> Result<Vec<Source>> {
        require_positive("timestep", self.timestep)?;
        require_positive("sim_duration", self.sim_duration)?;
        self.interpolation.validate()?;

        self.sources
            .iter()
            .enumerate()
            .map(|(idx, src)| src.into_source(idx, self.timestep, self.sim_duration))
            .collect()
    }

    /// Amount of steps needed to cover the simulated time.
    pub fn step_count(&self) -> usize {
        release::step_count(self.sim_duration, self.timestep)
    }
}
