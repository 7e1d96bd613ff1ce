//! Lagrangian transport of particles through a gridded wind field with
//! reflection off triangulated obstacles.

#[cfg(test)]
#[macro_use]
extern crate approx;
#[macro_use]
extern crate log;

mod bvh;
mod config;
mod error;
mod geom;
mod grid;
mod interp;
mod output;
mod particle;
mod reflection;
mod release;
mod sim;
mod source;
mod tracer;
mod transport;

pub use crate::bvh::{Bvh, HitRecord};
pub use crate::config::{Config, SourceConfig};
pub use crate::error::{Error, Result};
pub use crate::geom::{ObstacleMesh, Segment, Triangle};
pub use crate::grid::{FieldSample, Turbulence, WindGrid};
pub use crate::interp::Interpolation;
pub use crate::output::{
    Column, FieldSelection, Frame, FrameRecorder, OutputConfig, OutputField, OutputWriter, ParticleOutput, Value,
};
pub use crate::particle::{Particle, ParticleProperties, ParticleStore};
pub use crate::reflection::{Reflection, ReflectionConfig, ReflectionMethod, WallReflection};
pub use crate::release::{ReleasePolicy, ReleaseSchedule};
pub use crate::sim::{Simulation, StepReport};
pub use crate::source::{Source, SourceBuilder, SourceGeometry};
pub use crate::tracer::{Tracer, DEFAULT_MAX_BOUNCES, DEFAULT_SURFACE_OFFSET};
pub use crate::transport::{Displacement, MeanAdvection, RandomWalk, TransportModel};
