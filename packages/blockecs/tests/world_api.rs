use std::collections::HashSet;

use blockecs::*;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Pos(f32, f32, f32);
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Vel(f32, f32, f32);
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Health(u32);
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Small(u32);
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Other(u32);

component!(Pos);
component!(Vel);
component!(Health);
component!(Small);
component!(Other);

#[test]
fn signature_tracks_fields() {
    let _ = tracing_subscriber::fmt::try_init();

    let mut shape = Shape::new();
    shape.add_field::<Pos>().add_field::<Health>();

    assert_eq!(shape.field_count(), 2);
    assert_eq!(shape.signature().len(), 2);
    assert!(shape.signature().includes(Pos::type_id()));
    assert!(shape.signature().includes(Health::type_id()));
    assert!(!shape.signature().includes(Vel::type_id()));
    assert_eq!(shape.memory_size(), 12 + 4);
}

#[test]
fn contains_is_reflexive_and_monotonic() {
    let a = shape![Pos];
    let ab = shape![Pos, Vel];
    assert!(a.contains(&a));
    assert!(ab.contains(&a));
    assert!(!a.contains(&ab));

    let mut grown = ab.clone();
    grown.add_field::<Health>();
    assert!(!ab.contains(&grown));
    assert!(grown.contains(&ab));
}

#[test]
fn create_exists_destroy() {
    let _ = tracing_subscriber::fmt::try_init();

    let mut world = World::new();
    let e = world.create_entity(&shape![Pos]);
    assert!(world.exists(e));

    assert!(world.destroy_entity(e));
    assert!(!world.exists(e));
    assert_eq!(world.get_field::<Pos>(e), None);
    assert!(!world.destroy_entity(e));
}

#[test]
fn set_get_across_blocks() {
    let mut world = World::new();
    let shape = shape![Pos, Health];

    let handles = (0..1000)
        .map(|i| {
            let e = world.create_entity(&shape);
            world.set_field(e, Health(i));
            world.set_field(e, Pos(i as f32, 0.0, 0.0));
            e
        })
        .collect::<Vec<_>>();

    assert!(world.entities().blocks().len() > 1);

    for (i, e) in handles.iter().enumerate() {
        assert_eq!(world.get_field::<Health>(*e), Some(&Health(i as u32)));
        assert_eq!(world.get_field::<Pos>(*e), Some(&Pos(i as f32, 0.0, 0.0)));
    }

    // Destroy every third entity; survivors keep their values.
    for e in handles.iter().step_by(3) {
        world.destroy_entity(*e);
    }
    for (i, e) in handles.iter().enumerate() {
        if i % 3 == 0 {
            assert!(!world.exists(*e));
        } else {
            assert_eq!(world.get_field::<Health>(*e), Some(&Health(i as u32)));
        }
    }
}

#[test]
fn add_then_remove_restores_signature() {
    let mut world = World::new();
    let e = world.create_entity(&shape![Pos]);
    world.set_field(e, Pos(1.0, 2.0, 3.0));
    let before = world.entities().shape_of(e).unwrap().signature();

    assert!(world.add_field::<Vel>(e));
    assert!(world.entities().shape_of(e).unwrap().has_field::<Vel>());
    assert!(world.remove_field::<Vel>(e));

    assert_eq!(world.entities().shape_of(e).unwrap().signature(), before);
    assert_eq!(world.get_field::<Pos>(e), Some(&Pos(1.0, 2.0, 3.0)));
}

#[test]
fn block_capacity_spills_into_second_block() {
    let mut world = World::new();
    let shape = shape![Small, Other];

    let handles = (0..256).map(|_| world.create_entity(&shape)).collect::<Vec<_>>();
    assert_eq!(world.entities().blocks().len(), 1);
    assert_eq!(world.entities().blocks()[0].capacity(), 256);
    assert!(world.entities().blocks()[0].is_full());

    let extra = world.create_entity(&shape);
    assert_eq!(world.entities().blocks().len(), 2);
    assert_eq!(world.entities().location(extra).unwrap().block, 1);
    assert!(handles.iter().all(|h| world.entities().location(*h).unwrap().block == 0));
}

#[test]
fn query_visits_each_match_once() {
    let mut world = World::new();
    let mut expected = HashSet::new();

    for _ in 0..300 {
        let e = world.create_entity(&shape![Pos, Vel]);
        expected.insert(e);
    }
    for _ in 0..50 {
        let e = world.create_entity(&shape![Pos, Vel, Health]);
        expected.insert(e);
    }
    for _ in 0..70 {
        world.create_entity(&shape![Pos]);
        world.create_entity(&shape![Vel, Health]);
    }

    let requirements = Requirements::new().require::<Pos>().require::<Vel>();
    let mut seen = HashSet::new();
    requirements.execute_for_entities_matching::<(EntityHandle, &mut Vel), _>(
        world.entities_mut(),
        |(e, v)| {
            assert!(seen.insert(e), "entity visited twice");
            v.0 += 1.0;
        });
    assert_eq!(seen, expected);

    let mut moved = 0;
    world.entities_mut().for_each::<&Vel, _>(|v| {
        if v.0 == 1.0 {
            moved += 1;
        }
    });
    assert_eq!(moved, 350);
}

#[test]
fn recycled_handles_have_new_generation() {
    let mut world = World::new();
    let first = world.create_empty_entity();
    world.destroy_entity(first);

    let second = world.create_entity(&shape![Health]);
    assert_eq!(second.index(), first.index());
    assert_ne!(second.generation(), first.generation());
    assert!(!world.exists(first));
    assert!(world.exists(second));
    assert!(!world.set_field(first, Health(3)));
    assert_eq!(world.get_field::<Health>(second), Some(&Health(0)));
}

#[test]
fn units_run_in_order() {
    struct Double(Requirements);

    impl Unit for Double {
        fn update(&mut self, entities: &mut EntityManager, _delta_time: f32) {
            self.0.execute_for_entities_matching::<&mut Health, _>(entities, |h| h.0 *= 2);
        }
    }

    struct Increment(Requirements);

    impl Unit for Increment {
        fn update(&mut self, entities: &mut EntityManager, _delta_time: f32) {
            self.0.execute_for_entities_matching::<&mut Health, _>(entities, |h| h.0 += 1);
        }
    }

    let mut world = World::new();
    let e = world.create_entity(&shape![Health]);
    world.set_field(e, Health(1));

    let requirements = Requirements::new().require::<Health>();
    world.add_unit(1, Double(requirements.clone()));
    world.add_unit(0, Increment(requirements));

    world.update(0.016);
    assert_eq!(world.get_field::<Health>(e), Some(&Health(4)));

    // Increment now runs after Double.
    assert_eq!(world.change_update_order(0, 0, 2), Ok(0));
    world.update(0.016);
    assert_eq!(world.get_field::<Health>(e), Some(&Health(9)));
}
