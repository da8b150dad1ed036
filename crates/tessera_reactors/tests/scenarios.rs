//! # Reactor Scenarios
//!
//! End-to-end runs of the three reactors against one world.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use tessera_core::{EntityBuilder, EntityId, EventKind, TesseraConfig, World, WorldConfig, WorldEvent};
use tessera_reactors::{Aggregator, Hierarchy, Mapper, Reactor};

fn set(ids: &[EntityId]) -> HashSet<EntityId> {
    ids.iter().copied().collect()
}

fn members(aggregator: &Aggregator<u32>, key: u32) -> HashSet<EntityId> {
    aggregator.members(&key).into_iter().collect()
}

#[test]
fn test_aggregation_follows_key_changes() {
    let world: World<u32> = World::new(WorldConfig::small());
    let aggregator = Aggregator::new();
    Aggregator::activate(&aggregator, &world);

    let e1 = world.create(EntityBuilder::new().with_key(1)).unwrap();
    let e2 = world.create(EntityBuilder::new().with_key(1)).unwrap();
    let e3 = world.create(EntityBuilder::new().with_key(2)).unwrap();

    assert_eq!(aggregator.group_count(), 2);
    assert_eq!(members(&aggregator, 1), set(&[e1, e2]));
    assert_eq!(members(&aggregator, 2), set(&[e3]));

    let mut groups = aggregator.groups();
    groups.sort_by_key(|group| group.key);
    let keys: Vec<u32> = groups.iter().map(|group| group.key).collect();
    assert_eq!(keys, vec![1, 2]);
    assert_eq!(set(&groups[0].members), set(&[e1, e2]));
    assert_eq!(groups[0].first, e1);
    assert_eq!(groups[1].representative, aggregator.get(&2).unwrap());

    world.set_key(e1, 2).unwrap();
    assert_eq!(members(&aggregator, 1), set(&[e2]));
    assert_eq!(members(&aggregator, 2), set(&[e1, e3]));
    assert_eq!(aggregator.first(&1), Some(e2));

    let group_one = aggregator.get(&1).unwrap();
    world.destroy(e2);
    assert!(aggregator.try_get(&1).is_none());
    assert!(!world.is_alive(group_one));
    assert_eq!(aggregator.group_count(), 1);

    let mut visited = Vec::new();
    aggregator.for_each_group(|key, group| visited.push((*key, group.members.len())));
    assert_eq!(visited, vec![(2, 2)]);
}

#[test]
fn test_hierarchy_enable_round_trip() {
    let world: World<u32> = World::new(WorldConfig::small());
    let hierarchy = Hierarchy::new();
    Hierarchy::activate(&hierarchy, &world);

    let root = world.create(EntityBuilder::new().root()).unwrap();
    let child = world.create(EntityBuilder::new().child_of(root)).unwrap();
    assert!(hierarchy.is_enabled(root));
    assert!(hierarchy.is_enabled(child));

    let flips = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&flips);
    world.listen(
        EventKind::EnabledChanged,
        Rc::new(move |_: &World<u32>, target: EntityId, event: &WorldEvent<u32>| {
            sink.borrow_mut().push((target, event.clone()));
            false
        }),
    );

    world.set_self_enabled(root, false).unwrap();
    assert!(!hierarchy.is_enabled(root));
    assert!(!hierarchy.is_enabled(child));
    assert_eq!(flips.borrow().len(), 2);

    world.set_self_enabled(root, true).unwrap();
    assert!(hierarchy.is_enabled(root));
    assert!(hierarchy.is_enabled(child));
    assert_eq!(
        flips.borrow()[2..],
        [
            (root, WorldEvent::EnabledChanged { enabled: true }),
            (child, WorldEvent::EnabledChanged { enabled: true }),
        ]
    );
}

#[test]
fn test_late_activation_replays_existing_entities() {
    let world: World<u32> = World::new(WorldConfig::small());
    let root = world.create(EntityBuilder::new().with_key(10).root()).unwrap();
    let child = world.create(EntityBuilder::new().with_key(10).child_of(root)).unwrap();
    let loose = world.create(EntityBuilder::new().with_key(11)).unwrap();

    let aggregator = Aggregator::new();
    let mapper = Mapper::new();
    let hierarchy = Hierarchy::new();
    Aggregator::activate(&aggregator, &world);
    Mapper::activate(&mapper, &world);
    Hierarchy::activate(&hierarchy, &world);

    assert_eq!(members(&aggregator, 10), set(&[root, child]));
    assert_eq!(mapper.try_get(&11), Some(loose));
    assert!(mapper.contains_key(&10));
    assert_eq!(hierarchy.children(root), vec![child]);
    assert!(!Aggregator::activate(&aggregator, &world));
}

#[test]
fn test_subtree_teardown_updates_every_index() {
    let world: World<u32> = World::new(WorldConfig::small());
    let aggregator = Aggregator::new();
    let mapper = Mapper::new();
    let hierarchy = Hierarchy::new();
    Aggregator::activate(&aggregator, &world);
    Mapper::activate(&mapper, &world);
    Hierarchy::activate(&hierarchy, &world);

    let root = world.create(EntityBuilder::new().root()).unwrap();
    let a = world.create(EntityBuilder::new().with_key(1).child_of(root)).unwrap();
    world.create(EntityBuilder::new().with_key(2).child_of(a)).unwrap();

    world.destroy(root);
    assert_eq!(world.alive_count(), 0);
    assert!(hierarchy.is_empty());
    assert!(mapper.is_empty());
    assert_eq!(aggregator.group_count(), 0);
}

#[test]
fn test_forced_representative_release_keeps_user_entities() {
    let world: World<u32> = World::new(WorldConfig::small());
    let aggregator = Aggregator::new();
    let mapper = Mapper::new();
    let hierarchy = Hierarchy::new();
    Aggregator::activate(&aggregator, &world);
    Mapper::activate(&mapper, &world);
    Hierarchy::activate(&hierarchy, &world);

    let parent = world.create(EntityBuilder::new().with_key(5).root()).unwrap();
    let child = world.create(EntityBuilder::new().child_of(parent)).unwrap();
    let representative = aggregator.get(&5).unwrap();

    world.destroy(representative);
    assert!(world.is_alive(parent) && world.is_alive(child));
    assert_eq!(members(&aggregator, 5), set(&[parent]));
    assert_ne!(aggregator.get(&5).unwrap(), representative);
    assert_eq!(mapper.try_get(&5), Some(parent));
    assert_eq!(hierarchy.children(parent), vec![child]);
}

#[test]
fn test_config_sizes_reactor_pools() {
    let config = TesseraConfig::from_toml_str(
        r#"
        [world]
        capacity = 128

        [reactors]
        group_pool_prealloc = 4
        children_pool_prealloc = 8
        "#,
    )
    .unwrap();

    let world: World<u32> = World::new(config.world.clone());
    let aggregator = Aggregator::with_config(&config.reactors);
    let hierarchy = Hierarchy::with_config(&config.reactors);
    Aggregator::activate(&aggregator, &world);
    Hierarchy::activate(&hierarchy, &world);

    assert_eq!(world.capacity(), 128);
    assert_eq!(aggregator.pooled_sets(), 4);
    assert_eq!(hierarchy.pooled_sets(), 8);

    world.create(EntityBuilder::new().with_key(1)).unwrap();
    assert_eq!(aggregator.pool_stats().reused, 1);
    assert_eq!(aggregator.pool_stats().allocated, 4);
}
