use glam::DVec3;
use plume_transport::{
    Config, FieldSample, Interpolation, ObstacleMesh, RandomWalk, ReleasePolicy, Simulation, SourceConfig,
    SourceGeometry, Tracer, Turbulence, WindGrid,
};

/// Domain is 200 m x 100 m x 50 m in cells of 2 m.
pub const CELL_COUNTS: [usize; 3] = [100, 50, 25];
pub const SPACING: [f64; 3] = [2.0, 2.0, 2.0];

/// Wind speed in m s⁻¹ at 10 m above ground.
pub const REFERENCE_SPEED: f64 = 4.0;

/// Ground plane with two rows of block buildings forming a canyon along x.
pub fn mesh() -> ObstacleMesh {
    let mut mesh = ObstacleMesh::empty();
    mesh.add_ground((0.0, 0.0), (200.0, 100.0), 0.0);

    for row in 0..5 {
        let x0 = 40.0 + row as f64 * 25.0;
        mesh.add_block(DVec3::new(x0, 20.0, 0.0), DVec3::new(x0 + 15.0, 40.0, 18.0));
        mesh.add_block(DVec3::new(x0, 60.0, 0.0), DVec3::new(x0 + 15.0, 80.0, 24.0));
    }

    mesh
}

/// Wind along x following a power law profile with uniform isotropic turbulence.
pub fn grid() -> WindGrid {
    WindGrid::from_fn(CELL_COUNTS, SPACING, |centre| {
        let speed = REFERENCE_SPEED * (centre.z / 10.0).powf(0.2);
        FieldSample::new(DVec3::new(speed, 0.0, 0.0), Turbulence::isotropic(0.6, 0.05))
    }).expect("fixed grid dimensions are valid")
}

pub fn make_tracer() -> Tracer {
    Tracer::new(mesh().triangles())
}

/// Ground level point source at the mouth of the canyon, releasing for a
/// minute in steps of 0.5 s.
pub fn config(par_per_timestep: usize) -> Config {
    Config {
        timestep: 0.5,
        sim_duration: 60.0,
        seed: 2018,
        interpolation: Interpolation::TriLinear,
        sources: vec![SourceConfig {
            geometry: SourceGeometry::Point {
                position: DVec3::new(20.0, 50.0, 1.5),
            },
            release: Some(ReleasePolicy::Continuous { par_per_timestep }),
            particle: Default::default(),
        }],
        ..Config::default()
    }
}

pub fn make_simulation(par_per_timestep: usize) -> Simulation {
    Simulation::new(&config(par_per_timestep), grid(), &mesh(), RandomWalk::default())
        .expect("street canyon configuration is valid")
}
