use crate::config::Config;
use crate::error::{Error, Result};
use crate::geom::ObstacleMesh;
use crate::grid::WindGrid;
use crate::interp::Interpolation;
use crate::output::{OutputWriter, ParticleOutput};
use crate::particle::{Particle, ParticleStore};
use crate::reflection::{Reflection, WallReflection};
use crate::source::Source;
use crate::transport::TransportModel;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

/// Counts describing what happened during one call to `Simulation::advance`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    /// Index of the step that was just performed.
    pub step: usize,
    /// Simulation time in s after the step.
    pub time: f64,
    /// Particles newly released on this step.
    pub released: usize,
    /// Particles still active after the step.
    pub active: usize,
    /// Particles rogue after the step, including those from earlier steps.
    pub rogue: usize,
    /// Particles that stopped during this step, not counting new rogues.
    pub deactivated: usize,
}

/// What became of a moving particle in the parallel phase.
#[derive(Clone, Copy, PartialEq)]
enum Fate {
    Moving,
    Stopped,
    Rogue,
}

pub struct Simulation {
    sources: Vec<Source>,
    store: ParticleStore,
    grid: WindGrid,
    interpolation: Interpolation,
    walls: WallReflection,
    transport: Box<dyn TransportModel>,
    timestep: f64,
    step_count: usize,
    seed: u64,
    release_rng: StdRng,
    step: usize,
    time: f64,
}

impl Simulation {
    /// Validates the configuration, computes every release schedule and sizes
    /// the particle store for all particles that will ever be released.
    pub fn new<T>(config: &Config, grid: WindGrid, mesh: &ObstacleMesh, transport: T) -> Result<Self>
    where
        T: TransportModel + 'static,
    {
        let sources = config.build_sources()?;
        let num_par: usize = sources.iter().map(Source::num_par).sum();
        if num_par == 0 {
            return Err(Error::NonPositiveParticleCount);
        }

        for src in &sources {
            let schedule = src.schedule();
            info!(
                "Source {} releases {} particles between {} s and {} s",
                src.idx(),
                schedule.num_par,
                schedule.release_start_time,
                schedule.release_end_time
            );
        }

        if let Interpolation::TriLinear = config.interpolation {
            let counts = grid.cell_counts();
            if counts.iter().any(|&n| n < 2) {
                warn!(
                    "Tri-linear interpolation on a grid with cell counts {:?} uses the nearest cell along axes with a single cell",
                    counts
                );
            }
        }

        let walls = WallReflection::new(&config.reflection, mesh)?;
        info!(
            "Simulating {} particles over {} steps of {} s, {} interpolation",
            num_par,
            config.step_count(),
            config.timestep,
            config.interpolation.name()
        );

        Ok(Simulation {
            sources,
            store: ParticleStore::new(num_par),
            grid,
            interpolation: config.interpolation,
            walls,
            transport: Box::new(transport),
            timestep: config.timestep,
            step_count: config.step_count(),
            seed: config.seed,
            release_rng: StdRng::seed_from_u64(config.seed),
            step: 0,
            time: 0.0,
        })
    }

    /// Advances the simulation by one step.
    ///
    /// Particles stopped on the previous step are taken off the list first,
    /// then the step's new particles are released. Every moving particle is
    /// then sampled, displaced and reflected in parallel. All of them are
    /// done before this returns.
    pub fn advance(&mut self) -> StepReport {
        self.store.scrub();
        let released = self.release();

        let grid = &self.grid;
        let interpolation = self.interpolation;
        let walls = &self.walls;
        let transport = &*self.transport;
        let dt = self.timestep;
        let seed = self.seed;
        let step = self.step;

        let (deactivated, new_rogues) = self
            .store
            .par_moving_mut()
            .map(|particle| {
                let mut rng = StdRng::seed_from_u64(particle_seed(seed, particle.par_id, step));
                match move_particle(particle, grid, interpolation, walls, transport, dt, &mut rng) {
                    Fate::Moving => (0, 0),
                    Fate::Stopped => (1, 0),
                    Fate::Rogue => (0, 1),
                }
            })
            .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1 + b.1));

        self.step += 1;
        self.time = self.step as f64 * self.timestep;

        let report = StepReport {
            step,
            time: self.time,
            released,
            active: self.store.active_count(),
            rogue: self.store.rogue_count(),
            deactivated,
        };

        debug!(
            "Step {} at t = {} s: released {}, active {}, stopped {}, new rogue {}",
            step, self.time, released, report.active, deactivated, new_rogues
        );

        report
    }

    /// Runs all remaining steps, staging output after each of them.
    pub fn run<W: OutputWriter>(&mut self, output: &mut ParticleOutput, writer: &mut W) -> Result<Vec<StepReport>> {
        let mut reports = Vec::with_capacity(self.step_count.saturating_sub(self.step));
        while !self.is_finished() {
            let report = self.advance();
            output.save_to(report.time, &self.store, writer)?;
            reports.push(report);
        }
        Ok(reports)
    }

    pub fn store(&self) -> &ParticleStore {
        &self.store
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn grid(&self) -> &WindGrid {
        &self.grid
    }

    pub fn walls(&self) -> &WallReflection {
        &self.walls
    }

    /// Amount of particles released over the whole run.
    pub fn num_par(&self) -> usize {
        self.store.num_par()
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Index of the next step to perform.
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn is_finished(&self) -> bool {
        self.step >= self.step_count
    }

    fn release(&mut self) -> usize {
        let step = self.step;
        let t_strt = self.time;
        let grid = &self.grid;
        let interpolation = self.interpolation;
        let store = &mut self.store;
        let rng = &mut self.release_rng;

        let mut released = 0;
        for src in &self.sources {
            for pos in src.emit(step, &mut *rng) {
                let par_id = store.admit(src.idx(), t_strt, pos, src.properties());
                if let Some(particle) = store.get_mut(par_id) {
                    particle.uvw_mean = interpolation.sample(grid, pos).mean;
                }
                released += 1;
            }
        }
        released
    }
}

/// Independent random stream per particle and step, so results do not
/// depend on how particles are spread over threads.
fn particle_seed(seed: u64, par_id: usize, step: usize) -> u64 {
    seed ^ (par_id as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ (step as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
}

fn move_particle(
    particle: &mut Particle,
    grid: &WindGrid,
    interpolation: Interpolation,
    walls: &WallReflection,
    transport: &dyn TransportModel,
    dt: f64,
    rng: &mut StdRng,
) -> Fate {
    let sample = interpolation.sample(grid, particle.pos);
    particle.uvw_mean = sample.mean;

    let motion = transport.displace(particle, &sample, dt, rng);
    let fluct = particle.uvw_fluct + motion.delta_fluct;

    // A rogue keeps the last state that was still valid
    if transport.is_rogue(fluct) {
        warn!(
            "Particle {} would reach fluctuating velocity {} at {}, marking rogue",
            particle.par_id, fluct, particle.pos
        );
        particle.mark_rogue();
        return Fate::Rogue;
    }

    particle.delta_uvw_fluct = motion.delta_fluct;
    particle.uvw_fluct = fluct;

    match walls.apply(particle, motion.displacement) {
        Reflection::Rogue => Fate::Rogue,
        Reflection::Deactivated => Fate::Stopped,
        Reflection::Clear | Reflection::Reflected { .. } => {
            if grid.contains(particle.pos) {
                Fate::Moving
            } else {
                particle.is_active = false;
                Fate::Stopped
            }
        }
    }
}
