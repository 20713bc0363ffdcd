use std::sync::{Arc, Mutex};

use physics_bridge::{
    BodyDesc, BodyKind, DMat3, DQuat, DVec3, EntityId, GeomDesc, GeomShape, HandleCounts,
    ImpulseBackend, MassProperties, ObjectCounts, PhysicsBackend, PhysicsError, PhysicsParams,
    PhysicsWorld, Pose, ShapeType, Velocity,
};

fn running_world() -> PhysicsWorld<ImpulseBackend> {
    let mut world = PhysicsWorld::default();
    world.load(&PhysicsParams::new()).unwrap();
    world.init().unwrap();
    world
}

#[test]
fn entity_owns_at_most_one_body() {
    let mut world = running_world();
    let entity = EntityId(7);
    let body = world.create_body(entity).unwrap();
    assert_eq!(world.body_of(entity), Some(body));
    assert_eq!(world.entity_of(body), Some(entity));
    assert_eq!(
        world.create_body(entity),
        Err(PhysicsError::DuplicateBody(entity))
    );
    assert_eq!(world.handle_counts().bodies, 1);
}

#[test]
fn body_desc_sets_initial_state() {
    let mut world = running_world();
    let desc = BodyDesc::dynamic()
        .with_position(DVec3::new(1.0, 2.0, 3.0))
        .with_velocity(Velocity::new(DVec3::X, DVec3::ZERO))
        .with_mass(MassProperties::solid_sphere(3.0, 0.5));
    let body = world.create_body_with(EntityId(1), desc).unwrap();

    assert_eq!(world.body_pose(body).unwrap().position(), DVec3::new(1.0, 2.0, 3.0));
    assert_eq!(world.body_velocity(body).unwrap().linear, DVec3::X);
    assert!((world.body_mass(body).unwrap().mass - 3.0).abs() < 1e-12);
}

#[test]
fn invalid_initial_state_registers_nothing() {
    let mut world = running_world();
    let bad_mass = BodyDesc::dynamic().with_mass(MassProperties::new(
        -1.0,
        DVec3::ZERO,
        DMat3::IDENTITY,
    ));
    assert!(matches!(
        world.create_body_with(EntityId(1), bad_mass),
        Err(PhysicsError::InvalidGeometry(_))
    ));
    let bad_pose = BodyDesc::dynamic().with_pose(Pose::from_position(DVec3::splat(f64::NAN)));
    assert!(world.create_body_with(EntityId(1), bad_pose).is_err());
    assert_eq!(world.handle_counts(), HandleCounts::default());
    assert_eq!(world.backend().object_counts(), ObjectCounts::default());
}

#[test]
fn geom_validation() {
    let mut world = running_world();
    let body = world.create_body(EntityId(1)).unwrap();

    world.create_geom(body, GeomShape::sphere(0.5)).unwrap();
    assert!(matches!(
        world.create_geom(body, GeomShape::sphere(-0.5)),
        Err(PhysicsError::InvalidGeometry(_))
    ));
    assert!(matches!(
        world.create_geom(
            body,
            GeomShape::Cylinder {
                radius: 0.2,
                length: 1.0
            }
        ),
        Err(PhysicsError::UnsupportedShape(_))
    ));
    assert!(matches!(
        "torus".parse::<ShapeType>(),
        Err(PhysicsError::UnsupportedShape(_))
    ));

    world.remove_entity(EntityId(1));
    assert_eq!(
        world.create_geom(body, GeomShape::sphere(0.5)),
        Err(PhysicsError::InvalidBody(body))
    );
    assert_eq!(world.handle_counts().geoms, 0);
}

#[test]
fn planes_belong_on_static_bodies() {
    let mut world = running_world();
    let ground = world
        .create_body_with(EntityId(0), BodyDesc::fixed())
        .unwrap();
    world
        .create_geom(ground, GeomShape::ground_plane(DVec3::Z))
        .unwrap();

    let ball = world.create_body(EntityId(1)).unwrap();
    assert!(matches!(
        world.create_geom(ball, GeomShape::ground_plane(DVec3::Z)),
        Err(PhysicsError::InvalidGeometry(_))
    ));
}

#[test]
fn geom_offset_and_destroy() {
    let mut world = running_world();
    let body = world.create_body(EntityId(1)).unwrap();
    let geom = world
        .create_geom(
            body,
            GeomDesc::new(GeomShape::cuboid(DVec3::splat(0.5)))
                .with_offset(Pose::from_position(DVec3::Z)),
        )
        .unwrap();
    assert_eq!(world.handle_counts().geoms, 1);
    world.destroy_geom(geom).unwrap();
    assert_eq!(world.handle_counts().geoms, 0);
    assert_eq!(world.destroy_geom(geom), Err(PhysicsError::InvalidGeom(geom)));
}

#[test]
fn remove_entity_is_idempotent() {
    let mut world = running_world();
    let removed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&removed);
    world.on_entity_removed(move |entity| sink.lock().unwrap().push(entity));

    let a = world.create_body(EntityId(1)).unwrap();
    world.create_body(EntityId(2)).unwrap();
    world.create_geom(a, GeomShape::sphere(0.5)).unwrap();
    world.create_geom(a, GeomShape::sphere(0.25)).unwrap();

    assert!(world.remove_entity(EntityId(1)));
    let once = world.handle_counts();
    assert!(!world.remove_entity(EntityId(1)));
    assert_eq!(world.handle_counts(), once);
    assert_eq!(
        once,
        HandleCounts {
            entities: 1,
            bodies: 1,
            geoms: 0,
            joints: 0
        }
    );
    assert_eq!(*removed.lock().unwrap(), vec![EntityId(1)]);
    assert_eq!(world.body_of(EntityId(1)), None);
    assert_eq!(world.body_pose(a), Err(PhysicsError::InvalidBody(a)));
}

#[test]
fn remove_entity_after_fini_is_a_no_op() {
    let mut world = running_world();
    world.create_body(EntityId(1)).unwrap();
    world.fini().unwrap();
    assert!(!world.remove_entity(EntityId(1)));
    assert!(!world.remove_entity(EntityId(1)));
}

#[test]
fn accessors_round_trip_values() {
    let mut world = running_world();
    let body = world.create_body(EntityId(1)).unwrap();

    let pose = Pose::new(
        DVec3::new(0.5, -1.0, 2.0),
        DQuat::from_rotation_y(0.7),
    );
    world.set_body_pose(body, pose).unwrap();
    assert!(world.body_pose(body).unwrap().max_component_delta(&pose) < 1e-9);

    let velocity = Velocity::new(DVec3::new(1.0, 2.0, 3.0), DVec3::new(0.0, 0.1, 0.0));
    world.set_body_velocity(body, velocity).unwrap();
    assert_eq!(world.body_velocity(body).unwrap(), velocity);

    let mass = MassProperties::solid_box(2.0, DVec3::new(0.1, 0.2, 0.3));
    world.set_body_mass(body, mass).unwrap();
    let read = world.body_mass(body).unwrap();
    assert!((read.mass - 2.0).abs() < 1e-12);
    assert!((read.inertia.z_axis.z - mass.inertia.z_axis.z).abs() < 1e-9);

    assert!(world
        .apply_force(body, DVec3::new(f64::NAN, 0.0, 0.0), DVec3::ZERO)
        .is_err());
}

#[test]
fn snapshot_is_ordered_by_entity() {
    let mut world = running_world();
    for raw in [5, 2, 9] {
        let desc = BodyDesc::dynamic().with_position(DVec3::new(raw as f64, 0.0, 0.0));
        world.create_body_with(EntityId(raw), desc).unwrap();
    }
    world
        .create_body_with(EntityId(0), BodyDesc::fixed())
        .unwrap();

    let snapshot = world.snapshot().unwrap();
    let entities: Vec<_> = snapshot.iter().map(|s| s.entity.raw()).collect();
    assert_eq!(entities, vec![0, 2, 5, 9]);
    assert_eq!(snapshot[0].kind, BodyKind::Static);
    assert_eq!(snapshot[2].pose.position().x, 5.0);
}

#[test]
fn factory_calls_fail_when_not_running() {
    let mut world: PhysicsWorld<ImpulseBackend> = PhysicsWorld::default();
    assert_eq!(
        world.create_body(EntityId(1)),
        Err(PhysicsError::EngineNotRunning)
    );
    world.load(&PhysicsParams::new()).unwrap();
    world.init().unwrap();
    let body = world.create_body(EntityId(1)).unwrap();
    world.fini().unwrap();
    assert_eq!(
        world.create_geom(body, GeomShape::sphere(1.0)),
        Err(PhysicsError::EngineNotRunning)
    );
    assert_eq!(world.body_pose(body), Err(PhysicsError::EngineNotRunning));
    assert_eq!(world.handle_counts(), HandleCounts::default());
}
