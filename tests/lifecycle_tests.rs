use std::sync::{Arc, Mutex};

use physics_bridge::{
    BodyDesc, DVec3, EntityId, GeomShape, ImpulseBackend, JointType, PhysicsEngine, PhysicsError,
    PhysicsParams, PhysicsWorld, WorldState,
};

fn world() -> PhysicsWorld<ImpulseBackend> {
    PhysicsWorld::default()
}

#[test]
fn init_requires_load() {
    let mut world = world();
    assert_eq!(world.state(), WorldState::Uninitialized);
    assert_eq!(world.init(), Err(PhysicsError::NotLoaded));
    assert!(matches!(
        world.init_for_thread(),
        Err(PhysicsError::EngineNotRunning)
    ));
}

#[test]
fn misuse_while_running_is_reported() {
    let mut world = world();
    world.load(&PhysicsParams::new()).unwrap();
    world.init().unwrap();
    assert_eq!(world.state(), WorldState::Initialized);

    assert_eq!(world.init(), Err(PhysicsError::AlreadyInitialized));
    assert_eq!(
        world.load(&PhysicsParams::new()),
        Err(PhysicsError::AlreadyInitialized)
    );
    assert!(PhysicsError::AlreadyInitialized.is_lifecycle());
}

#[test]
fn fini_ends_stepping_and_factory_calls() {
    let mut world = world();
    world.load(&PhysicsParams::new()).unwrap();
    world.init().unwrap();
    let token = world.init_for_thread().unwrap();
    world.create_body(EntityId(1)).unwrap();
    world.step(&token).unwrap();

    world.fini().unwrap();
    assert_eq!(world.state(), WorldState::Finalized);
    assert!(matches!(world.step(&token), Err(PhysicsError::EngineNotRunning)));
    assert!(matches!(
        world.update_collision(&token),
        Err(PhysicsError::EngineNotRunning)
    ));
    assert!(matches!(
        world.create_joint(JointType::Ball),
        Err(PhysicsError::EngineNotRunning)
    ));
    assert_eq!(world.fini(), Err(PhysicsError::EngineNotRunning));
    assert_eq!(
        world.reconfigure(&PhysicsParams::new()),
        Err(PhysicsError::EngineNotRunning)
    );
}

#[test]
fn reinit_invalidates_old_tokens() {
    let mut world = world();
    world.load(&PhysicsParams::new()).unwrap();
    world.init().unwrap();
    let stale = world.init_for_thread().unwrap();
    world.fini().unwrap();

    world.init().unwrap();
    assert_eq!(world.sim_time(), 0.0);
    assert_eq!(world.handle_counts().bodies, 0);
    assert!(matches!(
        world.step(&stale),
        Err(PhysicsError::ThreadNotInitialized)
    ));
    let fresh = world.init_for_thread().unwrap();
    world.step(&fresh).unwrap();
}

#[test]
fn token_from_another_world_is_rejected() {
    let mut first = world();
    let mut second = world();
    for world in [&mut first, &mut second] {
        world.load(&PhysicsParams::new()).unwrap();
        world.init().unwrap();
    }
    assert_ne!(first.id(), second.id());

    let token = first.init_for_thread().unwrap();
    assert_eq!(token.world_id(), first.id());
    assert!(matches!(
        second.step(&token),
        Err(PhysicsError::ThreadNotInitialized)
    ));
    first.step(&token).unwrap();
}

#[test]
fn worlds_are_independent() {
    let mut low = world();
    let mut high = world();
    low.load(&PhysicsParams::new().with_gravity([0.0, 0.0, -1.0])).unwrap();
    high.load(&PhysicsParams::new().with_gravity([0.0, 0.0, -20.0])).unwrap();
    low.init().unwrap();
    high.init().unwrap();

    let a = low.create_body(EntityId(1)).unwrap();
    let b = high.create_body(EntityId(1)).unwrap();
    let low_token = low.init_for_thread().unwrap();
    let high_token = high.init_for_thread().unwrap();
    for _ in 0..10 {
        low.step(&low_token).unwrap();
        high.step(&high_token).unwrap();
    }
    let za = low.body_pose(a).unwrap().position().z;
    let zb = high.body_pose(b).unwrap().position().z;
    assert!(zb < za * 10.0);
}

#[test]
fn second_load_replaces_pending_config() {
    let mut world = world();
    world.load(&PhysicsParams::new().with_erp(0.3)).unwrap();
    world.load(&PhysicsParams::new().with_erp(0.6)).unwrap();
    world.init().unwrap();
    assert_eq!(world.config().map(|config| config.erp), Some(0.6));
}

#[test]
fn dropping_a_running_world_is_clean() {
    let mut world = world();
    world.load(&PhysicsParams::new()).unwrap();
    world.init().unwrap();
    let body = world.create_body(EntityId(1)).unwrap();
    world.create_geom(body, GeomShape::sphere(1.0)).unwrap();
    drop(world);
}

#[test]
fn engine_wraps_the_full_lifecycle() {
    let mut engine = PhysicsEngine::new();
    engine.start(&PhysicsParams::new()).unwrap();
    let token = engine.init_for_thread().unwrap();
    let body = engine
        .add_body(
            EntityId(3),
            BodyDesc::dynamic().with_position(DVec3::new(0.0, 0.0, 2.0)),
            GeomShape::sphere(0.5),
        )
        .unwrap();

    // A rejected shape does not leave a half-registered body behind.
    assert!(engine
        .add_body(EntityId(4), BodyDesc::dynamic(), GeomShape::sphere(-1.0))
        .is_err());
    assert_eq!(engine.world().body_of(EntityId(4)), None);

    engine.step(&token).unwrap();
    assert!(engine.body_pose(body).unwrap().position().z < 2.0);
    assert!(engine.remove_body(EntityId(3)));
    engine.fini().unwrap();
    assert_eq!(engine.world().state(), WorldState::Finalized);
}

#[test]
fn rejected_add_body_stays_silent() {
    let mut engine = PhysicsEngine::new();
    assert_eq!(engine.world().backend_name(), "impulse");
    engine.start(&PhysicsParams::new()).unwrap();

    let removed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&removed);
    engine
        .world_mut()
        .on_entity_removed(move |entity| sink.lock().unwrap().push(entity));

    assert!(matches!(
        engine.add_body(EntityId(9), BodyDesc::dynamic(), GeomShape::sphere(-1.0)),
        Err(PhysicsError::InvalidGeometry(_))
    ));
    assert_eq!(engine.world().body_of(EntityId(9)), None);
    assert!(removed.lock().unwrap().is_empty());

    engine
        .add_body(EntityId(10), BodyDesc::dynamic(), GeomShape::sphere(0.5))
        .unwrap();
    assert!(engine.remove_body(EntityId(10)));
    assert_eq!(*removed.lock().unwrap(), vec![EntityId(10)]);
}
