use crate::error::{require_positive, Error, Result};
use serde::{Deserialize, Serialize};

/// Step counts are rounded up, but quotients within this of an integer are
/// taken as that integer, so that e.g. `1.0 / 0.1` counts as ten steps.
const STEP_ROUNDING_TOLERANCE: f64 = 1e-9;

/// Rule governing how many particles a source releases and when.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReleasePolicy {
    /// A fixed amount on every step of the simulation.
    Continuous { par_per_timestep: usize },
    /// Everything at once on the first step.
    Instantaneous { num_par: usize },
    /// A fixed amount on every step whose time lies in `[release_start_time, release_end_time)`.
    Discrete {
        par_per_timestep: usize,
        release_start_time: f64,
        release_end_time: f64,
    },
}

/// Release timing derived from a policy for a concrete time discretization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReleaseSchedule {
    pub release_start_time: f64,
    pub release_end_time: f64,
    /// Total amount of particles ever released.
    pub num_par: usize,
    first_step: usize,
    release_steps: usize,
    par_per_step: usize,
}

pub(crate) fn step_count(duration: f64, timestep: f64) -> usize {
    (duration / timestep - STEP_ROUNDING_TOLERANCE).ceil().max(0.0) as usize
}

impl ReleasePolicy {
    /// Derives the release window and particle total.
    ///
    /// Fails for windows outside of `[0, sim_duration]` and for schedules that
    /// would never release anything.
    pub fn schedule(&self, timestep: f64, sim_duration: f64) -> Result<ReleaseSchedule> {
        require_positive("timestep", timestep)?;
        require_positive("sim_duration", sim_duration)?;

        let schedule = match *self {
            ReleasePolicy::Continuous { par_per_timestep } => {
                let release_steps = step_count(sim_duration, timestep);
                ReleaseSchedule {
                    release_start_time: 0.0,
                    release_end_time: sim_duration,
                    num_par: par_per_timestep * release_steps,
                    first_step: 0,
                    release_steps,
                    par_per_step: par_per_timestep,
                }
            }
            ReleasePolicy::Instantaneous { num_par } => ReleaseSchedule {
                release_start_time: 0.0,
                release_end_time: 0.0,
                num_par,
                first_step: 0,
                release_steps: 1,
                par_per_step: num_par,
            },
            ReleasePolicy::Discrete {
                par_per_timestep,
                release_start_time,
                release_end_time,
            } => {
                let in_simulation = |t: f64| t >= 0.0 && t <= sim_duration;
                if !in_simulation(release_start_time)
                    || !in_simulation(release_end_time)
                    || release_start_time > release_end_time
                {
                    return Err(Error::ReleaseWindow {
                        start: release_start_time,
                        end: release_end_time,
                        duration: sim_duration,
                    });
                }

                // Step n releases at n * timestep, count the steps landing in the window
                let first_step = step_count(release_start_time, timestep);
                let end_step = step_count(release_end_time, timestep).min(step_count(sim_duration, timestep));
                let release_steps = end_step.saturating_sub(first_step);
                ReleaseSchedule {
                    release_start_time,
                    release_end_time,
                    num_par: par_per_timestep * release_steps,
                    first_step,
                    release_steps,
                    par_per_step: par_per_timestep,
                }
            }
        };

        if schedule.num_par == 0 {
            return Err(Error::NonPositiveParticleCount);
        }

        Ok(schedule)
    }
}

impl ReleaseSchedule {
    /// Amount of particles becoming active on the given step.
    pub fn released_at_step(&self, step: usize) -> usize {
        if step >= self.first_step && step - self.first_step < self.release_steps {
            self.par_per_step
        } else {
            0
        }
    }

    /// Amount of particles released on all steps up to and including `step`.
    pub fn released_by_step(&self, step: usize) -> usize {
        if step < self.first_step {
            0
        } else {
            (step - self.first_step + 1).min(self.release_steps) * self.par_per_step
        }
    }

    pub fn release_event_count(&self) -> usize {
        self.release_steps
    }
}
