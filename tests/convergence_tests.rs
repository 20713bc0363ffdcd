use approx::assert_abs_diff_eq;
use physics_bridge::{
    BodyDesc, ConvergenceMonitor, DVec3, EntityId, GeomShape, ImpulseBackend, PhysicsError,
    PhysicsParams, PhysicsWorld, Retention,
};

#[test]
fn rms_over_recorded_samples() {
    let mut monitor = ConvergenceMonitor::new(Retention::Unbounded, 1.0);
    assert_eq!(monitor.rms_error(), 0.0);
    for value in [3.0, 4.0] {
        monitor.record_error(value);
    }
    assert_abs_diff_eq!(monitor.rms_error(), (12.5f64).sqrt(), epsilon = 1e-12);
    assert!(monitor.exceeds_tolerance());
    monitor.set_rms_error_tolerance(10.0);
    assert!(!monitor.exceeds_tolerance());
}

#[test]
fn window_keeps_most_recent_samples() {
    let mut monitor = ConvergenceMonitor::new(Retention::Window(3), 1e-3);
    for value in 1..=5 {
        monitor.record_error(value as f64);
    }
    assert_eq!(monitor.samples().collect::<Vec<_>>(), vec![3.0, 4.0, 5.0]);
    assert_abs_diff_eq!(
        monitor.rms_error(),
        ((9.0 + 16.0 + 25.0) / 3.0f64).sqrt(),
        epsilon = 1e-12
    );

    monitor.set_retention(Retention::Window(1));
    assert_eq!(monitor.samples().collect::<Vec<_>>(), vec![5.0]);
    monitor.set_retention(Retention::Unbounded);
    for _ in 0..2000 {
        monitor.record_error(0.0);
    }
    assert_eq!(monitor.len(), 2001);
}

#[test]
fn world_window_follows_configuration() {
    let mut world: PhysicsWorld<ImpulseBackend> = PhysicsWorld::default();
    world
        .load(&PhysicsParams::new().with_rms_error_window(4))
        .unwrap();
    world.init().unwrap();
    let token = world.init_for_thread().unwrap();
    world.create_body(EntityId(1)).unwrap();

    for _ in 0..10 {
        world.step(&token).unwrap();
    }
    assert_eq!(world.convergence().retention(), Retention::Window(4));
    assert_eq!(world.convergence().len(), 4);

    world.set_rms_retention(Retention::Unbounded);
    for _ in 0..10 {
        world.step(&token).unwrap();
    }
    assert_eq!(world.convergence().len(), 14);
}

#[test]
fn resting_contact_converges_below_tolerance() {
    let mut world: PhysicsWorld<ImpulseBackend> = PhysicsWorld::default();
    world
        .load(
            &PhysicsParams::new()
                .with_step_time(0.01)
                .with_solver_iterations(50)
                .with_rms_error_tolerance(0.05),
        )
        .unwrap();
    world.init().unwrap();
    let token = world.init_for_thread().unwrap();

    let ground = world
        .create_body_with(EntityId(0), BodyDesc::fixed())
        .unwrap();
    world
        .create_geom(ground, GeomShape::ground_plane(DVec3::Z))
        .unwrap();
    let crate_body = world
        .create_body_with(
            EntityId(1),
            BodyDesc::dynamic().with_position(DVec3::new(0.0, 0.0, 0.5)),
        )
        .unwrap();
    world
        .create_geom(crate_body, GeomShape::cuboid(DVec3::splat(0.5)))
        .unwrap();

    for _ in 0..200 {
        world.step(&token).unwrap();
    }
    assert_abs_diff_eq!(world.rms_error_tolerance(), 0.05);
    assert!(world.rms_error() < world.rms_error_tolerance(), "rms {}", world.rms_error());
    assert!(world.last_report().unwrap().contacts >= 4);
}

#[test]
fn world_tolerance_setter_validates_like_the_config_key() {
    let mut world: PhysicsWorld<ImpulseBackend> = PhysicsWorld::default();
    world.load(&PhysicsParams::new()).unwrap();
    for bad in [-1.0, 0.0, f64::NAN, f64::INFINITY] {
        assert!(matches!(
            world.set_rms_error_tolerance(bad),
            Err(PhysicsError::Configuration(_))
        ));
    }
    assert_abs_diff_eq!(world.rms_error_tolerance(), 1e-3);
    world.set_rms_error_tolerance(0.5).unwrap();
    assert_abs_diff_eq!(world.rms_error_tolerance(), 0.5);
}

#[test]
fn chosen_retention_survives_unrelated_reconfiguration() {
    let mut world: PhysicsWorld<ImpulseBackend> = PhysicsWorld::default();
    world
        .load(&PhysicsParams::new().with_rms_error_window(4))
        .unwrap();
    world.init().unwrap();
    let token = world.init_for_thread().unwrap();
    world.set_rms_retention(Retention::Unbounded);

    world
        .reconfigure(&PhysicsParams::new().with_erp(0.4).with_rms_error_window(4))
        .unwrap();
    for _ in 0..6 {
        world.step(&token).unwrap();
    }
    assert_eq!(world.convergence().retention(), Retention::Unbounded);
    assert_eq!(world.convergence().len(), 6);

    world
        .reconfigure(&PhysicsParams::new().with_rms_error_window(2))
        .unwrap();
    world.step(&token).unwrap();
    assert_eq!(world.convergence().retention(), Retention::Window(2));
    assert_eq!(world.convergence().len(), 2);
}
