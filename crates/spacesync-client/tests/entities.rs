//! Entity replication between sessions sharing one hub

mod common;

use common::{tick_until, World, SPACE};
use spacesync_core::{
    ComponentType, EntityEvent, EntityState, Error, ReplicatedValue, Transform, UpdateFlags,
    Vector3,
};
use tokio::sync::broadcast::error::TryRecvError;

#[tokio::test]
async fn test_create_replicates_to_peers() {
    let world = World::new();
    let alice = world.session("alice").await;
    let bob = world.session("bob").await;
    let mut bob_events = bob.subscribe_entity_events();

    let handle = alice.create_entity("Chair", Transform::default(), None).await.unwrap();
    let id = alice.entities().entity(handle).unwrap().id();

    tick_until(&[&alice, &bob], || bob.entities().find_by_id(id).is_some()).await;

    {
        let entities = bob.entities();
        let remote = entities.entity(entities.find_by_id(id).unwrap()).unwrap();
        assert_eq!(remote.name(), "Chair");
        assert_eq!(remote.owner_id(), alice.client_id());
        assert_eq!(remote.position(), Vector3::ZERO);
    }
    assert_eq!(alice.entities().entity(handle).unwrap().state(), EntityState::Live);
    assert_eq!(world.hub.entity_count(SPACE), 1);

    match bob_events.try_recv() {
        Ok(EntityEvent::Created { id: created, .. }) => assert_eq!(created, id),
        other => panic!("expected a create event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_creator_sees_created_event_after_tick() {
    let world = World::new();
    let alice = world.session("alice").await;
    let mut events = alice.subscribe_entity_events();

    let handle = alice.create_entity("Lamp", Transform::default(), None).await.unwrap();
    assert_eq!(alice.entities().entity(handle).unwrap().state(), EntityState::Created);
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));

    assert_eq!(alice.tick().await.unwrap(), 1);
    assert!(matches!(events.try_recv(), Ok(EntityEvent::Created { .. })));
}

#[tokio::test]
async fn test_queued_edits_replicate_as_one_patch() {
    let world = World::new();
    let alice = world.session("alice").await;
    let bob = world.session("bob").await;

    let handle = alice.create_entity("Table", Transform::default(), None).await.unwrap();
    let id = alice.entities().entity(handle).unwrap().id();
    tick_until(&[&alice, &bob], || bob.entities().find_by_id(id).is_some()).await;

    {
        let mut entities = alice.entities();
        assert!(entities.set_name(handle, "Desk"));
        assert!(entities.set_position(handle, Vector3::new(1.0, 2.0, 3.0)));
        assert!(entities.queue_update(handle));
    }

    tick_until(&[&alice, &bob], || {
        let entities = bob.entities();
        let remote = entities.entity(entities.find_by_id(id).unwrap()).unwrap();
        remote.name() == "Desk" && remote.position() == Vector3::new(1.0, 2.0, 3.0)
    })
    .await;

    let stored = world.hub.entity_snapshot(SPACE, id).unwrap();
    assert_eq!(stored.name, "Desk");
    assert_eq!(stored.transform.position, Vector3::new(1.0, 2.0, 3.0));
}

#[tokio::test]
async fn test_deleting_parent_reroots_children_everywhere() {
    let world = World::new();
    let alice = world.session("alice").await;
    let bob = world.session("bob").await;

    let parent = alice.create_entity("Room", Transform::default(), None).await.unwrap();
    let parent_id = alice.entities().entity(parent).unwrap().id();
    let child = alice
        .create_entity("Chair", Transform::default(), Some(parent_id))
        .await
        .unwrap();
    let child_id = alice.entities().entity(child).unwrap().id();

    tick_until(&[&alice, &bob], || {
        let entities = bob.entities();
        match entities.find_by_id(parent_id) {
            Some(p) => entities.children_of(p).len() == 1,
            None => false,
        }
    })
    .await;

    alice.destroy_entity(parent).await.unwrap();
    tick_until(&[&alice, &bob], || {
        bob.entities().find_by_id(parent_id).is_none() && alice.entities().find_by_id(parent_id).is_none()
    })
    .await;

    for session in [&alice, &bob] {
        let entities = session.entities();
        let handle = entities.find_by_id(child_id).unwrap();
        assert_eq!(entities.entity(handle).unwrap().parent_id(), None);
        assert_eq!(entities.root_entities(), vec![handle]);
    }
    assert_eq!(world.hub.entity_snapshot(SPACE, child_id).unwrap().parent_id, None);
    assert_eq!(world.hub.entity_count(SPACE), 1);
}

#[tokio::test]
async fn test_late_joiner_receives_existing_entities() {
    let world = World::new();
    let alice = world.session("alice").await;

    let parent = alice.create_entity("Room", Transform::default(), None).await.unwrap();
    let parent_id = alice.entities().entity(parent).unwrap().id();
    alice
        .create_entity("Chair", Transform::default(), Some(parent_id))
        .await
        .unwrap();

    let carol = world.session("carol").await;
    tick_until(&[&carol], || carol.entities().len() == 2).await;

    let entities = carol.entities();
    let room = entities.find_by_name("Room").unwrap();
    assert_eq!(entities.children_of(room).len(), 1);
    assert_eq!(entities.root_entities(), vec![room]);
}

#[tokio::test]
async fn test_component_extensions_replicate() {
    let world = World::new();
    let alice = world.session("alice").await;
    let bob = world.session("bob").await;

    let handle = alice.create_entity("Sign", Transform::default(), None).await.unwrap();
    let id = alice.entities().entity(handle).unwrap().id();
    let component_id = {
        let mut entities = alice.entities();
        let component_id = entities.add_component(handle, ComponentType::Custom).unwrap();
        entities
            .component_extensions(handle, component_id)
            .set_property("label", ReplicatedValue::from("Exit"));
        assert!(entities.queue_update(handle));
        component_id
    };

    tick_until(&[&alice, &bob], || {
        let entities = bob.entities();
        entities
            .find_by_id(id)
            .and_then(|h| entities.entity(h))
            .map_or(false, |e| e.component(component_id).is_some())
    })
    .await;

    let entities = bob.entities();
    let remote = entities.find_by_id(id).unwrap();
    assert_eq!(
        entities.entity(remote).unwrap().component(component_id).unwrap().component_type(),
        ComponentType::Custom
    );
    assert_eq!(
        entities.extension_property(remote, component_id, "label"),
        ReplicatedValue::from("Exit")
    );
    assert_eq!(
        entities.extension_property(remote, component_id, "colour"),
        ReplicatedValue::Invalid
    );
    // Reading does not claim the entity
    assert!(!entities.entity(remote).unwrap().has_pending_changes());
}

#[tokio::test]
async fn test_locked_entity_rejects_remote_edits() {
    let world = World::new();
    let alice = world.session("alice").await;
    let bob = world.session("bob").await;

    let handle = alice.create_entity("Statue", Transform::default(), None).await.unwrap();
    let id = alice.entities().entity(handle).unwrap().id();
    let component_id = {
        let mut entities = alice.entities();
        let component_id = entities.add_component(handle, ComponentType::Custom).unwrap();
        entities
            .component_extensions(handle, component_id)
            .set_property("label", ReplicatedValue::from("Bronze"));
        assert!(entities.lock(handle));
        assert!(entities.queue_update(handle));
        component_id
    };

    tick_until(&[&alice, &bob], || {
        let entities = bob.entities();
        entities
            .find_by_id(id)
            .and_then(|h| entities.entity(h))
            .map_or(false, |e| e.is_locked())
    })
    .await;

    {
        let mut entities = bob.entities();
        let remote = entities.find_by_id(id).unwrap();
        assert!(!entities.is_modifiable(remote));
        assert!(!entities.set_name(remote, "Defaced"));

        entities
            .component_extensions(remote, component_id)
            .set_property("label", ReplicatedValue::from("Defaced"));
        assert!(!entities.queue_update(remote));
        assert_eq!(
            entities.extension_property(remote, component_id, "label"),
            ReplicatedValue::from("Bronze")
        );
        assert_eq!(entities.entity(remote).unwrap().owner_id(), alice.client_id());
    }

    // Nothing leaves bob, so the server copy is untouched
    bob.tick().await.unwrap();
    alice.bus().ping().await.unwrap();
    alice.tick().await.unwrap();
    let stored = world.hub.entity_snapshot(SPACE, id).unwrap();
    assert_eq!(stored.owner_id, alice.client_id());
    assert_eq!(
        alice.entities().extension_property(handle, component_id, "label"),
        ReplicatedValue::from("Bronze")
    );
}

#[tokio::test]
async fn test_duplicate_delivery_is_applied_once() {
    let world = World::new();
    world.hub.set_duplicate_delivery(true);
    let alice = world.session("alice").await;
    let bob = world.session("bob").await;
    let mut bob_events = bob.subscribe_entity_events();

    let handle = alice.create_entity("Crate", Transform::default(), None).await.unwrap();
    let id = alice.entities().entity(handle).unwrap().id();
    {
        let mut entities = alice.entities();
        entities.set_scale(handle, Vector3::new(2.0, 2.0, 2.0));
        entities.queue_update(handle);
    }

    tick_until(&[&alice, &bob], || {
        let entities = bob.entities();
        entities
            .find_by_id(id)
            .and_then(|h| entities.entity(h))
            .map_or(false, |e| e.scale() == Vector3::new(2.0, 2.0, 2.0))
    })
    .await;
    bob.bus().ping().await.unwrap();
    bob.tick().await.unwrap();

    let mut created = 0;
    let mut scaled = 0;
    while let Ok(event) = bob_events.try_recv() {
        match event {
            EntityEvent::Created { .. } => created += 1,
            EntityEvent::Updated { flags, .. } if flags.contains(UpdateFlags::SCALE) => scaled += 1,
            _ => {}
        }
    }
    assert_eq!(created, 1);
    assert_eq!(scaled, 1);
    assert_eq!(bob.entities().len(), 1);
}

#[tokio::test]
async fn test_exit_space_clears_local_graph() {
    let world = World::new();
    let alice = world.session("alice").await;
    alice.enter_space().await.unwrap();
    alice.create_entity("Chair", Transform::default(), None).await.unwrap();
    alice.tick().await.unwrap();

    let bob = world.session("bob").await;

    alice.exit_space().await.unwrap();
    assert!(alice.has_exited());
    assert!(alice.entities().is_empty());
    assert_eq!(world.hub.entity_count(SPACE), 1);

    // Peers keep editing, but nothing is replicated into the exited session
    let table = bob.create_entity("Table", Transform::default(), None).await.unwrap();
    tick_until(&[&bob], || bob.entities().len() == 2).await;
    {
        let mut entities = bob.entities();
        entities.set_position(table, Vector3::new(4.0, 0.0, 0.0));
        entities.queue_update(table);
    }
    bob.tick().await.unwrap();
    alice.bus().ping().await.unwrap();
    alice.tick().await.unwrap();
    assert!(alice.entities().is_empty());
    assert_eq!(world.hub.entity_count(SPACE), 2);

    let err = alice.create_entity("Ghost", Transform::default(), None).await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert!(alice.enter_space().await.is_err());
    assert_eq!(world.hub.entity_count(SPACE), 2);
}

#[tokio::test]
async fn test_failed_patch_is_resent_on_next_tick() {
    let world = World::new();
    let alice = world.session("alice").await;
    let bob = world.session("bob").await;

    let handle = alice.create_entity("Shelf", Transform::default(), None).await.unwrap();
    let id = alice.entities().entity(handle).unwrap().id();
    tick_until(&[&alice, &bob], || bob.entities().find_by_id(id).is_some()).await;

    {
        let mut entities = alice.entities();
        assert!(entities.set_position(handle, Vector3::new(0.0, 1.0, 0.0)));
        assert!(entities.queue_update(handle));
    }
    world.hub.fail_next_entity_operations(1);
    let err = alice.tick().await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(world.hub.entity_snapshot(SPACE, id).unwrap().transform.position, Vector3::ZERO);

    tick_until(&[&alice, &bob], || {
        let entities = bob.entities();
        let remote = entities.entity(entities.find_by_id(id).unwrap()).unwrap();
        remote.position() == Vector3::new(0.0, 1.0, 0.0)
    })
    .await;
    assert_eq!(
        world.hub.entity_snapshot(SPACE, id).unwrap().transform.position,
        Vector3::new(0.0, 1.0, 0.0)
    );
}
