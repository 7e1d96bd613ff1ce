use crate::error::{require_positive, Result};
use crate::grid::FieldSample;
use crate::particle::Particle;
use glam::DVec3;
use rand::{Rng, RngCore};
use std::f64::consts::PI;

/// Variances below this are treated as a field without turbulence.
const MIN_VARIANCE: f64 = 1e-12;

/// Velocity change and motion of one particle over one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Displacement {
    /// Change of the fluctuating velocity in m s⁻¹.
    pub delta_fluct: DVec3,
    /// Proposed motion in m before obstacles are considered.
    pub displacement: DVec3,
}

/// Turns sampled wind into particle motion.
///
/// Implementations are shared between the worker threads of a step and must
/// only read from `self`.
pub trait TransportModel: Sync {
    fn displace(
        &self,
        particle: &Particle,
        sample: &FieldSample,
        dt: f64,
        rng: &mut dyn RngCore,
    ) -> Displacement;

    /// Whether a fluctuating velocity means the transport broke down.
    fn is_rogue(&self, fluct: DVec3) -> bool {
        !fluct.is_finite()
    }
}

/// Pure advection with the mean wind, fluctuations stay as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanAdvection;

impl TransportModel for MeanAdvection {
    fn displace(&self, particle: &Particle, sample: &FieldSample, dt: f64, _rng: &mut dyn RngCore) -> Displacement {
        Displacement {
            delta_fluct: DVec3::ZERO,
            displacement: (sample.mean + particle.uvw_fluct) * dt,
        }
    }
}

/// Langevin random walk on the diagonal of the stress tensor.
///
/// Each fluctuation component relaxes towards zero with the rate
/// `C0ε / 2σ²` and is kicked by Gaussian noise of variance `C0ε dt`, where
/// `σ²` is the matching diagonal entry of the stress tensor.
#[derive(Debug, Clone, Copy)]
pub struct RandomWalk {
    max_fluct: f64,
}

impl RandomWalk {
    /// `max_fluct` is the largest fluctuation component in m s⁻¹ considered
    /// physical, anything beyond turns the particle rogue.
    pub fn new(max_fluct: f64) -> Result<Self> {
        Ok(RandomWalk {
            max_fluct: require_positive("max_fluct", max_fluct)?,
        })
    }

    pub fn max_fluct(&self) -> f64 {
        self.max_fluct
    }
}

impl Default for RandomWalk {
    fn default() -> Self {
        RandomWalk { max_fluct: 50.0 }
    }
}

/// Standard normal deviate via Box-Muller.
fn gaussian(rng: &mut dyn RngCore) -> f64 {
    // 1 - [0, 1) is never zero, keeps the logarithm finite
    let u1 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

impl TransportModel for RandomWalk {
    fn displace(&self, particle: &Particle, sample: &FieldSample, dt: f64, rng: &mut dyn RngCore) -> Displacement {
        let co_eps = sample.turbulence.co_eps.max(0.0);
        let variances = sample.turbulence.variances();
        let kick = (co_eps * dt).sqrt();

        let mut component = |fluct: f64, sigma2: f64| {
            let drift = if sigma2 > MIN_VARIANCE {
                -co_eps / (2.0 * sigma2) * fluct * dt
            } else {
                0.0
            };
            drift + kick * gaussian(&mut *rng)
        };

        let delta_fluct = DVec3::new(
            component(particle.uvw_fluct.x, variances.x),
            component(particle.uvw_fluct.y, variances.y),
            component(particle.uvw_fluct.z, variances.z),
        );

        Displacement {
            delta_fluct,
            displacement: (sample.mean + particle.uvw_fluct + delta_fluct) * dt,
        }
    }

    fn is_rogue(&self, fluct: DVec3) -> bool {
        !fluct.is_finite() || fluct.abs().max_element() > self.max_fluct
    }
}
