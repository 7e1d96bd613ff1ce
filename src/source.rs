use crate::error::{require_positive, Error, Result};
use crate::particle::ParticleProperties;
use crate::release::{ReleasePolicy, ReleaseSchedule};
use glam::DVec3;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::iter;

/// Region new particles of a source are placed in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceGeometry {
    Point { position: DVec3 },
    /// Uniformly distributed along the segment.
    Line { start: DVec3, end: DVec3 },
    /// Uniformly distributed in the axis aligned box.
    Cube { min: DVec3, max: DVec3 },
    /// Uniformly distributed on the surface of the sphere.
    SphereShell { center: DVec3, radius: f64 },
}

impl SourceGeometry {
    pub fn validate(&self) -> Result<()> {
        match *self {
            SourceGeometry::Point { position } => require_finite("position", position),
            SourceGeometry::Line { start, end } => {
                require_finite("start", start)?;
                require_finite("end", end)
            }
            SourceGeometry::Cube { min, max } => {
                require_finite("min", min)?;
                require_finite("max", max)?;
                if min.cmple(max).all() {
                    Ok(())
                } else {
                    Err(Error::invalid("max", max, "must not be below min"))
                }
            }
            SourceGeometry::SphereShell { center, radius } => {
                require_finite("center", center)?;
                require_positive("radius", radius).map(|_| ())
            }
        }
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> DVec3 {
        match *self {
            SourceGeometry::Point { position } => position,
            SourceGeometry::Line { start, end } => start + rng.gen::<f64>() * (end - start),
            SourceGeometry::Cube { min, max } => DVec3::new(
                rng.gen_range(min.x..=max.x),
                rng.gen_range(min.y..=max.y),
                rng.gen_range(min.z..=max.z),
            ),
            SourceGeometry::SphereShell { center, radius } => {
                // Uniform in height and azimuth is uniform on the sphere
                let z: f64 = rng.gen_range(-1.0..=1.0);
                let phi = rng.gen_range(0.0..2.0 * PI);
                let r = (1.0 - z * z).max(0.0).sqrt();
                center + radius * DVec3::new(r * phi.cos(), r * phi.sin(), z)
            }
        }
    }
}

fn require_finite(name: &'static str, v: DVec3) -> Result<()> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(Error::invalid(name, v, "must be finite"))
    }
}

/// Releases particles of one kind from one region on a fixed schedule.
#[derive(Debug, Clone)]
pub struct Source {
    idx: usize,
    geometry: SourceGeometry,
    schedule: ReleaseSchedule,
    properties: ParticleProperties,
}

impl Source {
    pub fn idx(&self) -> usize {
        self.idx
    }

    pub fn geometry(&self) -> &SourceGeometry {
        &self.geometry
    }

    pub fn schedule(&self) -> &ReleaseSchedule {
        &self.schedule
    }

    pub fn properties(&self) -> &ParticleProperties {
        &self.properties
    }

    /// Total amount of particles this source will ever release.
    pub fn num_par(&self) -> usize {
        self.schedule.num_par
    }

    /// Initial positions of the particles released on `step`.
    pub fn emit<'a, R: Rng>(&'a self, step: usize, rng: &'a mut R) -> impl Iterator<Item = DVec3> + 'a {
        let geometry = self.geometry;
        iter::repeat_with(move || geometry.sample(&mut *rng)).take(self.schedule.released_at_step(step))
    }
}

pub struct SourceBuilder {
    idx: usize,
    geometry: SourceGeometry,
    release: Option<ReleasePolicy>,
    properties: ParticleProperties,
}

impl SourceBuilder {
    pub fn new(idx: usize) -> SourceBuilder {
        SourceBuilder {
            idx,
            geometry: SourceGeometry::Point {
                position: DVec3::ZERO,
            },
            release: None,
            properties: ParticleProperties::default(),
        }
    }

    pub fn geometry(mut self, geometry: SourceGeometry) -> SourceBuilder {
        self.geometry = geometry;
        self
    }

    pub fn point_shaped(self, position: DVec3) -> SourceBuilder {
        self.geometry(SourceGeometry::Point { position })
    }

    pub fn line_shaped(self, start: DVec3, end: DVec3) -> SourceBuilder {
        self.geometry(SourceGeometry::Line { start, end })
    }

    pub fn cube_shaped(self, min: DVec3, max: DVec3) -> SourceBuilder {
        self.geometry(SourceGeometry::Cube { min, max })
    }

    pub fn sphere_shell_shaped(self, center: DVec3, radius: f64) -> SourceBuilder {
        self.geometry(SourceGeometry::SphereShell { center, radius })
    }

    pub fn release(mut self, policy: ReleasePolicy) -> SourceBuilder {
        self.release = Some(policy);
        self
    }

    pub fn maybe_release(mut self, policy: Option<ReleasePolicy>) -> SourceBuilder {
        self.release = policy;
        self
    }

    pub fn properties(mut self, properties: ParticleProperties) -> SourceBuilder {
        self.properties = properties;
        self
    }

    /// Computes the release schedule for the given discretization.
    pub fn build(self, timestep: f64, sim_duration: f64) -> Result<Source> {
        let policy = self.release.ok_or(Error::MissingRelease {
            source_idx: self.idx,
        })?;
        self.geometry.validate()?;
        let schedule = policy.schedule(timestep, sim_duration)?;

        Ok(Source {
            idx: self.idx,
            geometry: self.geometry,
            schedule,
            properties: self.properties,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_emission_follows_schedule() {
        let src = SourceBuilder::new(0)
            .point_shaped(DVec3::new(1.0, 2.0, 3.0))
            .release(ReleasePolicy::Continuous { par_per_timestep: 4 })
            .build(1.0, 5.0)
            .unwrap();

        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(src.num_par(), 20);
        assert_eq!(src.emit(0, &mut rng).count(), 4);
        assert_eq!(src.emit(5, &mut rng).count(), 0);
        assert!(src.emit(2, &mut rng).all(|p| p == DVec3::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn test_missing_release_is_reported() {
        match SourceBuilder::new(3).build(1.0, 5.0) {
            Err(Error::MissingRelease { source_idx }) => assert_eq!(source_idx, 3),
            other => panic!("expected missing release, got {:?}", other.map(|s| s.num_par())),
        }
    }

    #[test]
    fn test_shapes_stay_in_their_regions() {
        let mut rng = StdRng::seed_from_u64(42);

        let cube = SourceGeometry::Cube {
            min: DVec3::new(0.0, 1.0, 2.0),
            max: DVec3::new(1.0, 2.0, 2.0),
        };
        for _ in 0..100 {
            let p = cube.sample(&mut rng);
            assert!(p.x >= 0.0 && p.x <= 1.0);
            assert!(p.y >= 1.0 && p.y <= 2.0);
            assert_eq!(p.z, 2.0);
        }

        let shell = SourceGeometry::SphereShell {
            center: DVec3::new(5.0, 5.0, 5.0),
            radius: 2.0,
        };
        for _ in 0..100 {
            let p = shell.sample(&mut rng);
            assert_relative_eq!(p.distance(DVec3::splat(5.0)), 2.0, epsilon = 1e-12);
        }

        let line = SourceGeometry::Line {
            start: DVec3::ZERO,
            end: DVec3::new(10.0, 0.0, 0.0),
        };
        for _ in 0..100 {
            let p = line.sample(&mut rng);
            assert!(p.x >= 0.0 && p.x <= 10.0);
            assert_eq!(p.y, 0.0);
        }
    }

    #[test]
    fn test_invalid_geometry() {
        let inverted = SourceGeometry::Cube {
            min: DVec3::ONE,
            max: DVec3::ZERO,
        };
        assert!(inverted.validate().is_err());

        let flat = SourceGeometry::SphereShell {
            center: DVec3::ZERO,
            radius: 0.0,
        };
        assert!(flat.validate().is_err());

        let nan = SourceGeometry::Point {
            position: DVec3::new(::std::f64::NAN, 0.0, 0.0),
        };
        assert!(nan.validate().is_err());
    }
}
