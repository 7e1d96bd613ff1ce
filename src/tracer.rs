use crate::bvh::{Bvh, HitRecord};
use crate::geom::{Segment, Triangle};
use glam::DVec3;
#[cfg(feature = "debug_tracing")]
use std::sync::Mutex;

/// Reflections allowed within a single step before a particle is given up on.
pub const DEFAULT_MAX_BOUNCES: usize = 10;
/// Distance in m to move off a surface after a reflection. This avoids the
/// continued motion intersecting the triangle it was reflected from due to
/// floating point imprecision.
pub const DEFAULT_SURFACE_OFFSET: f64 = 0.0001;

#[cfg(feature = "debug_tracing")]
const MAX_TRACING_EVENT_COUNT: usize = 600;

/// Specular reflection of `v` about the plane with unit normal `n`, preserves `|v|`.
pub fn reflect(v: DVec3, n: DVec3) -> DVec3 {
    v - 2.0 * v.dot(n) * n
}

/// Result of tracing one step of motion through the obstacles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Bounce {
    /// Nothing was in the way.
    Clear,
    /// The motion was reflected this many times and ended in free space.
    Reflected { bounces: usize },
    /// Still hitting surfaces after the maximum number of reflections.
    Exhausted,
}

pub struct Tracer {
    geometry: Bvh,
    max_bounces: usize,
    surface_offset: f64,
    #[cfg(feature = "debug_tracing")]
    first_tracing_events: Mutex<Vec<(DVec3, DVec3)>>,
}

impl Tracer {
    pub fn new<I>(triangles: I) -> Self
    where
        I: IntoIterator<Item = Triangle>,
    {
        let geometry = Bvh::build(triangles);
        info!(
            "Built obstacle hierarchy over {} triangles with {} nodes, depth {}",
            geometry.triangle_count(),
            geometry.node_count(),
            geometry.depth()
        );

        Tracer {
            geometry,
            max_bounces: DEFAULT_MAX_BOUNCES,
            surface_offset: DEFAULT_SURFACE_OFFSET,
            #[cfg(feature = "debug_tracing")]
            first_tracing_events: Mutex::new(Vec::new()),
        }
    }

    pub fn with_limits(mut self, max_bounces: usize, surface_offset: f64) -> Self {
        self.max_bounces = max_bounces;
        self.surface_offset = surface_offset;
        self
    }

    pub fn max_bounces(&self) -> usize {
        self.max_bounces
    }

    pub fn surface_offset(&self) -> f64 {
        self.surface_offset
    }

    /// First surface hit on the straight way from `from` to `to`.
    pub fn trace_segment(&self, from: DVec3, to: DVec3) -> Option<HitRecord> {
        self.geometry.nearest(&Segment::between(from, to))
    }

    /// Moves `pos` by `displacement`, reflecting off every surface in the way.
    ///
    /// On each hit `fluct` is mirrored about the surface, the particle is put
    /// just off the surface on the side it came from and the rest of the
    /// displacement continues in the mirrored direction. When the motion still
    /// hits something after `max_bounces` reflections, `pos` stays at the last
    /// point known to be in free space.
    pub(crate) fn bounce(&self, pos: &mut DVec3, displacement: DVec3, fluct: &mut DVec3) -> Bounce {
        let mut origin = *pos;
        let mut remaining = displacement;
        let mut bounces = 0;

        loop {
            let segment = Segment::new(origin, remaining);
            let hit = match self.geometry.nearest(&segment) {
                Some(hit) => hit,
                None => {
                    #[cfg(feature = "debug_tracing")]
                    self.debug_push(origin, segment.end());

                    *pos = segment.end();
                    return if bounces == 0 {
                        Bounce::Clear
                    } else {
                        Bounce::Reflected { bounces }
                    };
                }
            };

            if bounces == self.max_bounces {
                *pos = origin;
                return Bounce::Exhausted;
            }

            #[cfg(feature = "debug_tracing")]
            self.debug_push(origin, hit.point);

            // Orient towards the side the particle arrives from, winding does not matter
            let normal = if remaining.dot(hit.normal) > 0.0 {
                -hit.normal
            } else {
                hit.normal
            };

            *fluct = reflect(*fluct, normal);
            remaining = reflect(remaining * (1.0 - hit.t), normal);
            origin = hit.point + self.surface_offset * normal;
            bounces += 1;
        }
    }

    #[cfg(feature = "debug_tracing")]
    fn debug_push(&self, from: DVec3, to: DVec3) {
        let mut evts = match self.first_tracing_events.lock() {
            Ok(evts) => evts,
            Err(_) => return,
        };

        if evts.len() == MAX_TRACING_EVENT_COUNT {
            return;
        }

        evts.push((from, to));
        if evts.len() == MAX_TRACING_EVENT_COUNT {
            if let Err(err) = Self::dump_debug_tracing_events(&evts) {
                warn!("Could not dump reflection segments: {}", err);
            }
        }
    }

    #[cfg(feature = "debug_tracing")]
    fn dump_debug_tracing_events(evts: &[(DVec3, DVec3)]) -> ::std::io::Result<()> {
        use std::fs::File;
        use std::io::{BufWriter, Write};

        let mut obj = BufWriter::new(File::create("debug_reflections.obj")?);
        writeln!(obj, "o reflections")?;
        for (idx, &(from, to)) in evts.iter().enumerate() {
            writeln!(obj, "v {} {} {}", from.x, from.y, from.z)?;
            writeln!(obj, "v {} {} {}", to.x, to.y, to.z)?;
            writeln!(obj, "l {} {}", 2 * idx + 1, 2 * idx + 2)?;
        }
        info!("Dumped {} reflection segments to debug_reflections.obj", evts.len());
        Ok(())
    }
}
