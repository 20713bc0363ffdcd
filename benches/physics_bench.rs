use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use physics_bridge::{
    BodyDesc, DVec3, EntityId, GeomShape, ImpulseBackend, JointParams, JointType, MassProperties,
    PhysicsParams, PhysicsWorld, SteppingToken,
};
use std::hint::black_box;

const DT: f64 = 1.0 / 60.0;

fn prepare_world(body_count: usize) -> (PhysicsWorld<ImpulseBackend>, SteppingToken) {
    let mut world = PhysicsWorld::default();
    world
        .load(&PhysicsParams::new().with_step_time(DT))
        .expect("default parameters are valid");
    world.init().expect("world initializes");
    let token = world.init_for_thread().expect("thread prepared");

    let ground = world
        .create_body_with(EntityId(0), BodyDesc::fixed())
        .expect("ground body");
    world
        .create_geom(ground, GeomShape::ground_plane(DVec3::Z))
        .expect("ground plane");

    let side = (body_count as f64).sqrt().ceil() as usize;
    for i in 0..body_count {
        let position = DVec3::new(
            (i % side) as f64 * 1.1,
            (i / side) as f64 * 1.1,
            0.5 + (i % 3) as f64 * 0.2,
        );
        let body = world
            .create_body_with(
                EntityId(i as u64 + 1),
                BodyDesc::dynamic()
                    .with_position(position)
                    .with_mass(MassProperties::solid_box(1.0, DVec3::splat(0.5))),
            )
            .expect("body");
        let shape = if i % 2 == 0 {
            GeomShape::sphere(0.5)
        } else {
            GeomShape::cuboid(DVec3::splat(0.5))
        };
        world.create_geom(body, shape).expect("geom");
    }
    (world, token)
}

fn bench_world_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("world_step");
    for &count in &[16usize, 128, 512] {
        group.bench_with_input(BenchmarkId::new("mixed_pile", count), &count, |b, &count| {
            let (mut world, token) = prepare_world(count);
            b.iter(|| {
                black_box(world.step(&token).expect("step"));
            })
        });
    }
    group.finish();
}

fn bench_collision_phase(c: &mut Criterion) {
    let mut group = c.benchmark_group("collision_phase");
    for &count in &[128usize, 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let (mut world, token) = prepare_world(count);
            b.iter(|| {
                black_box(world.update_collision(&token).expect("collision"));
            })
        });
    }
    group.finish();
}

fn bench_pendulum_chain(c: &mut Criterion) {
    c.bench_function("hinge_chain_32", |b| {
        let mut world: PhysicsWorld<ImpulseBackend> = PhysicsWorld::default();
        world.load(&PhysicsParams::new().with_step_time(DT)).expect("load");
        world.init().expect("init");
        let token = world.init_for_thread().expect("thread prepared");

        let mut previous = None;
        for i in 0..32 {
            let body = world
                .create_body_with(
                    EntityId(i + 1),
                    BodyDesc::dynamic().with_position(DVec3::new(i as f64 * 0.5 + 0.5, 0.0, 0.0)),
                )
                .expect("link");
            let joint = world.create_joint(JointType::Hinge).expect("joint");
            world
                .attach_joint(
                    joint,
                    previous,
                    Some(body),
                    JointParams::at(DVec3::new(i as f64 * 0.5, 0.0, 0.0)).with_axis(DVec3::Y),
                )
                .expect("attach");
            previous = Some(body);
        }

        b.iter(|| {
            black_box(world.step(&token).expect("step"));
        })
    });
}

criterion_group!(
    benches,
    bench_world_step,
    bench_collision_phase,
    bench_pendulum_chain
);
criterion_main!(benches);
