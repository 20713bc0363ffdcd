use std::sync::Arc;
use std::thread;

use physics_bridge::{
    BodyDesc, DVec3, EntityId, GeomShape, ImpulseBackend, PhysicsBackend, PhysicsError,
    PhysicsParams, PhysicsWorld, SharedWorld, WorldConfig,
};

#[test]
fn physics_world_is_send() {
    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}
    assert_send::<PhysicsWorld<ImpulseBackend>>();
    assert_send::<SharedWorld<ImpulseBackend>>();
    assert_sync::<SharedWorld<ImpulseBackend>>();
}

fn shared_world() -> SharedWorld<ImpulseBackend> {
    let mut world = PhysicsWorld::default();
    world.load(&PhysicsParams::new()).unwrap();
    world.init().unwrap();
    world.into_shared()
}

#[test]
fn shared_world_steps_from_several_threads() {
    let world = shared_world();
    let body = world
        .lock()
        .create_body_with(EntityId(1), BodyDesc::dynamic().with_position(DVec3::new(0.0, 0.0, 50.0)))
        .unwrap();
    world.lock().create_geom(body, GeomShape::sphere(0.5)).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let world = Arc::clone(&world);
            thread::spawn(move || {
                let token = world.lock().init_for_thread().unwrap();
                for _ in 0..5 {
                    world.lock().step(&token).unwrap();
                }
                // Factory calls interleave with stepping under the same lock.
                let mut guard = world.lock();
                let extra = guard.create_body(EntityId(100 + i)).unwrap();
                guard.create_geom(extra, GeomShape::sphere(0.1)).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let world = world.lock();
    assert_eq!(world.convergence().len(), 20);
    assert!((world.sim_time() - 20.0 * 0.025).abs() < 1e-9);
    assert_eq!(world.handle_counts().bodies, 5);
    assert!(world.body_pose(body).unwrap().position().z < 50.0);
}

#[test]
fn backend_refuses_unprepared_threads() {
    let outcome = thread::spawn(|| {
        let mut backend = ImpulseBackend::new();
        backend.init(&WorldConfig::default()).unwrap();
        backend.update_physics(0.01)
    })
    .join()
    .unwrap();
    assert_eq!(outcome, Err(PhysicsError::ThreadNotInitialized));

    let prepared = thread::spawn(|| {
        let mut backend = ImpulseBackend::new();
        backend.init(&WorldConfig::default()).unwrap();
        backend.init_for_thread().unwrap();
        backend.update_physics(0.01).map(|report| report.constraint_rows)
    })
    .join()
    .unwrap();
    assert_eq!(prepared, Ok(0));
}
