use fixtures::street_canyon::{config, grid, make_simulation, mesh};
use glam::DVec3;
use plume_transport::{
    Bvh, FrameRecorder, OutputConfig, OutputField, ParticleOutput, Segment, Simulation, Value, WallReflection,
    DEFAULT_MAX_BOUNCES,
};

#[test]
fn particles_stay_out_of_buildings() {
    let mut sim = make_simulation(20);
    while !sim.is_finished() {
        sim.advance();
    }

    assert_eq!(sim.store().released(), sim.num_par());
    assert_eq!(sim.num_par(), 20 * 120);

    let blocks: Vec<(DVec3, DVec3)> = (0..5)
        .flat_map(|row| {
            let x0 = 40.0 + row as f64 * 25.0;
            vec![
                (DVec3::new(x0, 20.0, 0.0), DVec3::new(x0 + 15.0, 40.0, 18.0)),
                (DVec3::new(x0, 60.0, 0.0), DVec3::new(x0 + 15.0, 80.0, 24.0)),
            ]
        })
        .collect();

    for p in sim.store().all().iter().filter(|p| !p.is_rogue) {
        assert!(p.pos.z >= 0.0, "particle {} below ground at {}", p.par_id, p.pos);
        for &(min, max) in &blocks {
            let inside = p.pos.cmpgt(min).all() && p.pos.cmplt(max).all();
            assert!(!inside, "particle {} inside a building at {}", p.par_id, p.pos);
        }
    }
}

#[test]
fn ids_are_unique_over_the_run() {
    let mut sim = make_simulation(5);
    let mut seen = vec![false; sim.num_par()];

    while !sim.is_finished() {
        let report = sim.advance();
        assert!(report.active + report.rogue <= sim.store().released());
    }

    for p in sim.store().all() {
        assert!(p.par_id < sim.num_par());
        assert!(!seen[p.par_id]);
        seen[p.par_id] = true;
    }
    assert!(seen.iter().all(|&s| s));
}

#[test]
fn plume_is_carried_downwind() {
    let mut sim = make_simulation(20);
    for _ in 0..40 {
        sim.advance();
    }

    let moving: Vec<_> = sim.store().listed().filter(|p| p.is_moving()).collect();
    assert!(!moving.is_empty());
    let mean_x = moving.iter().map(|p| p.pos.x).sum::<f64>() / moving.len() as f64;
    assert!(mean_x > 20.0, "plume centre at x = {}", mean_x);
}

#[test]
fn output_frames_cover_every_particle() {
    let mut config = config(3);
    config.output = OutputConfig {
        output_fields: vec!["minimal".to_string()],
        output_frequency: 10.0,
        output_start_time: None,
    };

    let mut sim = Simulation::new(&config, grid(), &mesh(), plume_transport::RandomWalk::default()).unwrap();
    let mut output = ParticleOutput::new(&config.output, 0.0, sim.num_par()).unwrap();
    let mut frames = FrameRecorder::new();

    sim.run(&mut output, &mut frames).unwrap();

    // First step at t = 0.5, then every 10 s up to and including 60 s
    assert_eq!(frames.frames.len(), 7);
    for (frame, _) in frames.frames.iter().enumerate() {
        let ids = frames.column(frame, OutputField::ParId).unwrap();
        assert_eq!(ids.len(), sim.num_par());
        assert_eq!(ids.get(sim.num_par() - 1), Some(Value::Int(sim.num_par() as i32 - 1)));
    }

    match sim.walls() {
        WallReflection::TriMesh(tracer) => assert_eq!(tracer.max_bounces(), DEFAULT_MAX_BOUNCES),
        _ => panic!("street canyon reflects off its buildings"),
    }
}

#[test]
fn ground_edge_is_found_from_the_crate_root() {
    let bvh = Bvh::build(mesh().triangles());
    assert_eq!(bvh.triangle_count(), mesh().triangle_count());

    // Straight down onto the western edge of the ground
    let seg = Segment::between(DVec3::new(0.0, 50.0, 1.0), DVec3::new(0.0, 50.0, -1.0));
    let hit = bvh.nearest(&seg).expect("ground edge is hit");
    assert!((hit.t - 0.5).abs() < 1e-12);
    assert_eq!(bvh.query(&seg).first(), Some(&hit));
}
