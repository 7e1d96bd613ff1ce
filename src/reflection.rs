use crate::error::{Error, Result};
use crate::geom::ObstacleMesh;
use crate::particle::Particle;
use crate::tracer::{Bounce, Tracer, DEFAULT_MAX_BOUNCES, DEFAULT_SURFACE_OFFSET};
use glam::DVec3;
use serde::{Deserialize, Serialize};

/// How particles interact with the obstacle mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReflectionMethod {
    /// Obstacles are ignored.
    DoNothing,
    /// Particles touching an obstacle stop where they were.
    SetInactive,
    /// Specular reflection off the obstacle triangles.
    TriMesh,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectionConfig {
    pub method: ReflectionMethod,
    /// Reflections allowed in one step before a particle turns rogue.
    pub max_bounces: usize,
    /// Distance in m a reflected particle is put off the surface.
    pub surface_offset: f64,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        ReflectionConfig {
            method: ReflectionMethod::TriMesh,
            max_bounces: DEFAULT_MAX_BOUNCES,
            surface_offset: DEFAULT_SURFACE_OFFSET,
        }
    }
}

/// What happened to a particle's motion during one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reflection {
    Clear,
    Reflected { bounces: usize },
    /// Hit an obstacle and was stopped at its pre-step position.
    Deactivated,
    /// Could not be resolved to free space within the bounce limit.
    Rogue,
}

pub enum WallReflection {
    DoNothing,
    SetInactive(Tracer),
    TriMesh(Tracer),
}

impl WallReflection {
    pub fn new(config: &ReflectionConfig, mesh: &ObstacleMesh) -> Result<Self> {
        let offset = config.surface_offset;
        if !offset.is_finite() || offset < 0.0 {
            return Err(Error::invalid("surface_offset", offset, "must not be negative"));
        }

        let tracer = || Tracer::new(mesh.triangles()).with_limits(config.max_bounces, offset);
        Ok(match config.method {
            ReflectionMethod::DoNothing => WallReflection::DoNothing,
            ReflectionMethod::SetInactive => WallReflection::SetInactive(tracer()),
            ReflectionMethod::TriMesh => WallReflection::TriMesh(tracer()),
        })
    }

    pub fn method(&self) -> ReflectionMethod {
        match self {
            WallReflection::DoNothing => ReflectionMethod::DoNothing,
            WallReflection::SetInactive(_) => ReflectionMethod::SetInactive,
            WallReflection::TriMesh(_) => ReflectionMethod::TriMesh,
        }
    }

    /// Moves `pos` by `displacement` unless obstacles are in the way.
    ///
    /// Only `pos` and `fluct` are ever changed.
    pub fn reflect(&self, pos: &mut DVec3, displacement: DVec3, fluct: &mut DVec3) -> Reflection {
        match self {
            WallReflection::DoNothing => {
                *pos += displacement;
                Reflection::Clear
            }
            WallReflection::SetInactive(tracer) => {
                let to = *pos + displacement;
                match tracer.trace_segment(*pos, to) {
                    Some(_) => Reflection::Deactivated,
                    None => {
                        *pos = to;
                        Reflection::Clear
                    }
                }
            }
            WallReflection::TriMesh(tracer) => match tracer.bounce(pos, displacement, fluct) {
                Bounce::Clear => Reflection::Clear,
                Bounce::Reflected { bounces } => Reflection::Reflected { bounces },
                Bounce::Exhausted => Reflection::Rogue,
            },
        }
    }

    /// Reflects the particle's step and updates its flags with the outcome.
    pub fn apply(&self, particle: &mut Particle, displacement: DVec3) -> Reflection {
        let outcome = self.reflect(&mut particle.pos, displacement, &mut particle.uvw_fluct);
        match outcome {
            Reflection::Deactivated => particle.is_active = false,
            Reflection::Rogue => {
                warn!(
                    "Particle {} still hitting obstacles after the bounce limit at {}, marking rogue",
                    particle.par_id, particle.pos
                );
                particle.mark_rogue();
            }
            Reflection::Clear | Reflection::Reflected { .. } => {}
        }
        outcome
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::particle::ParticleProperties;

    fn ground() -> ObstacleMesh {
        let mut mesh = ObstacleMesh::empty();
        mesh.add_ground((-20.0, -20.0), (20.0, 20.0), 0.0);
        mesh
    }

    fn resolver(method: ReflectionMethod) -> WallReflection {
        let config = ReflectionConfig {
            method,
            ..ReflectionConfig::default()
        };
        WallReflection::new(&config, &ground()).unwrap()
    }

    fn particle_at(pos: DVec3) -> Particle {
        let mut p = Particle::new(7, 0, 0.0, pos, &ParticleProperties::default());
        p.uvw_fluct = DVec3::new(0.5, 0.0, -1.0);
        p.uvw_mean = DVec3::new(3.0, 0.0, 0.0);
        p
    }

    #[test]
    fn test_default_limits() {
        let config = ReflectionConfig::default();
        assert_eq!(config.max_bounces, 10);
        assert_eq!(config.surface_offset, 1e-4);
        assert_eq!(config.method, ReflectionMethod::TriMesh);
    }

    #[test]
    fn test_free_motion_is_untouched() {
        for method in &[
            ReflectionMethod::DoNothing,
            ReflectionMethod::SetInactive,
            ReflectionMethod::TriMesh,
        ] {
            let walls = resolver(*method);
            let mut p = particle_at(DVec3::new(0.0, 0.0, 5.0));
            let outcome = walls.apply(&mut p, DVec3::new(1.0, 2.0, -1.0));

            assert_eq!(outcome, Reflection::Clear);
            assert_eq!(p.pos, DVec3::new(1.0, 2.0, 4.0));
            assert_eq!(p.uvw_fluct, DVec3::new(0.5, 0.0, -1.0));
            assert!(p.is_moving());
        }
    }

    #[test]
    fn test_do_nothing_passes_through_ground() {
        let walls = resolver(ReflectionMethod::DoNothing);
        let mut p = particle_at(DVec3::new(0.0, 0.0, 1.0));
        assert_eq!(walls.apply(&mut p, DVec3::new(0.0, 0.0, -3.0)), Reflection::Clear);
        assert_eq!(p.pos.z, -2.0);
    }

    #[test]
    fn test_set_inactive_stops_at_pre_step_position() {
        let walls = resolver(ReflectionMethod::SetInactive);
        let mut p = particle_at(DVec3::new(1.0, 1.0, 1.0));
        let outcome = walls.apply(&mut p, DVec3::new(0.0, 0.0, -3.0));

        assert_eq!(outcome, Reflection::Deactivated);
        assert_eq!(p.pos, DVec3::new(1.0, 1.0, 1.0));
        assert!(!p.is_active);
        assert!(!p.is_rogue);
    }

    #[test]
    fn test_tri_mesh_reflects_fluctuation_only() {
        let walls = resolver(ReflectionMethod::TriMesh);
        let mut p = particle_at(DVec3::new(1.0, 3.0, 1.0));
        let outcome = walls.apply(&mut p, DVec3::new(0.0, 0.0, -3.0));

        assert_eq!(outcome, Reflection::Reflected { bounces: 1 });
        assert_relative_eq!(p.pos.z, 2.0 + 1e-4, epsilon = 1e-9);
        assert_eq!(p.uvw_fluct, DVec3::new(0.5, 0.0, 1.0));
        assert_eq!(p.uvw_mean, DVec3::new(3.0, 0.0, 0.0));
        assert_eq!(p.pos_init, DVec3::new(1.0, 3.0, 1.0));
        assert!(p.is_moving());
    }

    #[test]
    fn test_exhausted_bounces_mark_rogue() {
        let mut mesh = ground();
        mesh.add_quad([
            DVec3::new(-20.0, -20.0, 1.0),
            DVec3::new(-20.0, 20.0, 1.0),
            DVec3::new(20.0, 20.0, 1.0),
            DVec3::new(20.0, -20.0, 1.0),
        ]);
        let config = ReflectionConfig {
            max_bounces: 2,
            ..ReflectionConfig::default()
        };
        let walls = WallReflection::new(&config, &mesh).unwrap();

        let mut p = particle_at(DVec3::new(1.0, 3.0, 0.5));
        let outcome = walls.apply(&mut p, DVec3::new(0.0, 0.0, -10.0));

        assert_eq!(outcome, Reflection::Rogue);
        assert!(p.is_rogue);
        assert!(!p.is_active);
        assert!(!p.is_moving());
        // Left in the slot between the two planes
        assert!(p.pos.z > 0.0 && p.pos.z < 1.0);
    }

    #[test]
    fn test_rejects_negative_offset() {
        let config = ReflectionConfig {
            surface_offset: -1.0,
            ..ReflectionConfig::default()
        };
        assert!(WallReflection::new(&config, &ground()).is_err());
    }

    #[test]
    fn test_config_from_json() {
        let config: ReflectionConfig =
            serde_json::from_str(r#"{ "method": "set_inactive", "max_bounces": 4 }"#).unwrap();
        assert_eq!(config.method, ReflectionMethod::SetInactive);
        assert_eq!(config.max_bounces, 4);
        assert_eq!(config.surface_offset, DEFAULT_SURFACE_OFFSET);
    }
}
