//! Basic SpaceSync Example
//!
//! Two sessions share an in-process hub: one creates and edits entities,
//! the other watches them arrive, then both use sequences, conversations
//! and leader election.
//!
//! Run with: cargo run --example basic
//! Set RUST_LOG=debug for the full trace.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use spacesync_client::Session;
use spacesync_core::{ComponentType, ReplicatedValue, SessionConfig, Transform, Vector3};
use spacesync_service::MemorySequenceService;
use spacesync_transport::LocalHub;
use tracing_subscriber::EnvFilter;

const SPACE: &str = "demo-space";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("SpaceSync Basic Example\n");

    let hub = LocalHub::new();
    let service = Arc::new(MemorySequenceService::new());
    service.add_observer(Arc::new(hub.clone()));

    let config = SessionConfig::default();
    let alice = Session::connect(hub.connect(), service.clone(), config.clone(), "alice", SPACE)
        .await
        .context("alice failed to connect")?;
    let bob = Session::connect(hub.connect(), service.clone(), config, "bob", SPACE)
        .await
        .context("bob failed to connect")?;

    alice.enter_space().await?;
    bob.enter_space().await?;

    println!("=== Leader Election ===\n");
    let leader = bob.leader().current_leader(SPACE);
    println!("Leader of {}: {:?}", SPACE, leader.current_leader_user_id);

    println!("\n=== Entities ===\n");
    entity_example(&alice, &bob).await?;

    println!("\n=== Hierarchy and Hotspots ===\n");
    sequence_example(&alice).await?;

    println!("\n=== Conversations ===\n");
    conversation_example(&alice, &bob).await?;

    alice.exit_space().await?;
    bob.exit_space().await?;
    println!("\nService stats: {:?}", service.stats());
    Ok(())
}

/// Tick both sessions a few frames so operations propagate
async fn settle(sessions: &[&Session]) -> anyhow::Result<()> {
    for _ in 0..10 {
        for session in sessions {
            session.tick().await?;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    Ok(())
}

async fn entity_example(alice: &Session, bob: &Session) -> anyhow::Result<()> {
    let room = alice.create_entity("Room", Transform::default(), None).await?;
    let room_id = alice.entities().entity(room).map(|e| e.id()).context("room vanished")?;
    let lamp = alice
        .create_entity("Lamp", Transform::default(), Some(room_id))
        .await?;

    {
        let mut entities = alice.entities();
        entities.set_position(lamp, Vector3::new(1.0, 2.0, 0.5));
        if let Some(component_id) = entities.add_component(lamp, ComponentType::Light) {
            entities
                .component_extensions(lamp, component_id)
                .set_property("colour", ReplicatedValue::from("warm-white"));
        }
        entities.queue_update(lamp);
    }
    settle(&[alice, bob]).await?;

    let entities = bob.entities();
    for handle in entities.entities() {
        if let Some(entity) = entities.entity(handle) {
            println!(
                "bob sees {} (id {}, parent {:?}, position {:?})",
                entity.name(),
                entity.id(),
                entity.parent_id(),
                entity.position()
            );
        }
    }
    Ok(())
}

async fn sequence_example(alice: &Session) -> anyhow::Result<()> {
    let hierarchy = alice.hierarchy();
    hierarchy.create_sequence_hierarchy(None, &[10, 11, 12]).await?;
    let root = hierarchy.get_sequence_hierarchy(None).await?;
    println!("Root order: {:?}", root.ids);

    let hotspots = alice.hotspots();
    hotspots
        .create_hotspot_group("tour", vec!["entrance".into(), "gallery".into()])
        .await?;
    let groups = hotspots.get_hotspot_groups_containing_hotspot("gallery").await?;
    println!("Groups containing gallery: {:?}", groups.iter().map(|g| &g.name).collect::<Vec<_>>());

    match alice
        .sequences()
        .create_sequence("bad/key", "Demo", SPACE, Vec::new(), Default::default())
        .await
    {
        Ok(_) => println!("Unexpectedly accepted a reserved key"),
        Err(e) => println!("Rejected before any request: {}", e),
    }
    Ok(())
}

async fn conversation_example(alice: &Session, bob: &Session) -> anyhow::Result<()> {
    let mut events = bob.conversations().subscribe();

    let conversations = alice.conversations();
    let id = conversations.create_conversation("Lamp is flickering").await?;
    conversations.add_message(&id, "Can someone take a look?").await?;
    conversations.add_message(&id, "Replaced the bulb").await?;
    conversations.set_conversation_info(&id, "Lamp is flickering", true).await?;

    let page = conversations.get_messages(&id, 0, Some(10)).await?;
    for message in &page.messages {
        println!("[{}] {}", message.user_id, message.message);
    }

    for _ in 0..4 {
        match tokio::time::timeout(Duration::from_millis(200), events.recv()).await {
            Ok(Some(event)) => println!("bob got {:?}", event.event_type),
            _ => break,
        }
    }
    Ok(())
}
