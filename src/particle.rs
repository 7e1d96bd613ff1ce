use glam::DVec3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Physical properties a source hands to every particle it releases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleProperties {
    /// Diameter in µm, zero for passive tracers.
    pub d: f64,
    /// Mass in g.
    pub m: f64,
    /// Density in kg m⁻³.
    pub rho: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    /// Dense zero-based identifier, doubles as the index into the store.
    pub par_id: usize,
    /// Release time in s.
    pub t_strt: f64,
    pub source_idx: usize,
    pub d: f64,
    pub m: f64,
    pub rho: f64,
    /// Fraction of the particle that has not decayed yet.
    pub wdecay: f64,
    pub pos_init: DVec3,
    pub pos: DVec3,
    pub uvw_mean: DVec3,
    pub uvw_fluct: DVec3,
    /// Change of `uvw_fluct` during the last step.
    pub delta_uvw_fluct: DVec3,
    /// Currently being advected.
    pub is_active: bool,
    /// Transport became invalid, excluded from physics but kept for output.
    pub is_rogue: bool,
}

impl Particle {
    pub fn new(
        par_id: usize,
        source_idx: usize,
        t_strt: f64,
        pos: DVec3,
        properties: &ParticleProperties,
    ) -> Self {
        Particle {
            par_id,
            t_strt,
            source_idx,
            d: properties.d,
            m: properties.m,
            rho: properties.rho,
            wdecay: 1.0,
            pos_init: pos,
            pos,
            uvw_mean: DVec3::ZERO,
            uvw_fluct: DVec3::ZERO,
            delta_uvw_fluct: DVec3::ZERO,
            is_active: true,
            is_rogue: false,
        }
    }

    /// Whether the particle still takes part in sampling and reflection.
    pub fn is_moving(&self) -> bool {
        self.is_active && !self.is_rogue
    }

    pub fn mark_rogue(&mut self) {
        self.is_rogue = true;
        self.is_active = false;
    }
}

/// Arena of every particle ever released, indexed by `par_id`.
///
/// Particles are never removed from the arena. The separate list of
/// currently listed particles shrinks when inactive particles are scrubbed
/// and is what output staging reads.
///
/// Within a simulation phase each particle slot has exactly one writer,
/// phases themselves never overlap.
#[derive(Debug, Clone)]
pub struct ParticleStore {
    particles: Vec<Particle>,
    num_par: usize,
    listed: Vec<usize>,
}

impl ParticleStore {
    pub fn new(num_par: usize) -> Self {
        ParticleStore {
            particles: Vec::with_capacity(num_par),
            num_par,
            listed: Vec::with_capacity(num_par),
        }
    }

    /// Amount of particles the store was sized for.
    pub fn num_par(&self) -> usize {
        self.num_par
    }

    /// Amount of particles admitted so far.
    pub fn released(&self) -> usize {
        self.particles.len()
    }

    /// Adds a new active particle with the next free `par_id` and lists it.
    ///
    /// # Panics
    /// If more particles are admitted than the store was sized for.
    pub fn admit(
        &mut self,
        source_idx: usize,
        t_strt: f64,
        pos: DVec3,
        properties: &ParticleProperties,
    ) -> usize {
        let par_id = self.particles.len();
        assert!(
            par_id < self.num_par,
            "Release schedule admitted more than the {} particles the store was sized for",
            self.num_par
        );

        self.particles
            .push(Particle::new(par_id, source_idx, t_strt, pos, properties));
        self.listed.push(par_id);
        par_id
    }

    pub fn get(&self, par_id: usize) -> Option<&Particle> {
        self.particles.get(par_id)
    }

    pub fn get_mut(&mut self, par_id: usize) -> Option<&mut Particle> {
        self.particles.get_mut(par_id)
    }

    /// Every particle ever admitted, in `par_id` order.
    pub fn all(&self) -> &[Particle] {
        &self.particles
    }

    /// Particles currently on the list, in `par_id` order.
    pub fn listed<'a>(&'a self) -> impl Iterator<Item = &'a Particle> + 'a {
        self.listed.iter().map(move |&idx| &self.particles[idx])
    }

    pub fn listed_count(&self) -> usize {
        self.listed.len()
    }

    /// Takes a particle off the list without touching its state.
    pub fn unlist(&mut self, par_id: usize) -> bool {
        match self.listed.binary_search(&par_id) {
            Ok(pos) => {
                self.listed.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    /// Removes inactive particles from the list, returns how many were removed.
    pub fn scrub(&mut self) -> usize {
        let particles = &self.particles;
        let before = self.listed.len();
        self.listed.retain(|&idx| particles[idx].is_active);
        before - self.listed.len()
    }

    /// Parallel mutable access to all particles that are still moving.
    pub fn par_moving_mut(&mut self) -> impl ParallelIterator<Item = &mut Particle> {
        self.particles.par_iter_mut().filter(|p| p.is_moving())
    }

    pub fn active_count(&self) -> usize {
        self.particles.iter().filter(|p| p.is_active).count()
    }

    pub fn rogue_count(&self) -> usize {
        self.particles.iter().filter(|p| p.is_rogue).count()
    }
}
