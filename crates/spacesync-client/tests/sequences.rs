//! Sequence, hierarchy and hotspot group behaviour against the in-memory service

mod common;

use common::{within, World, SPACE};
use spacesync_core::{
    Error, FailureReason, OperationResult, ResultCode, SequenceCriteria, SequenceUpdateType,
};
use std::collections::BTreeMap;

fn items(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[tokio::test]
async fn test_reserved_key_characters_never_reach_the_service() {
    let world = World::new();
    let session = world.session("alice").await;
    let sequences = session.sequences();

    for key in ["a/b", "a%b"] {
        let err = sequences
            .create_sequence(key, "Test", SPACE, items(&["1"]), BTreeMap::new())
            .await
            .unwrap_err();
        assert_eq!(err, Error::InvalidSequenceKey(key.to_string()));
    }
    assert!(sequences.rename_sequence("ok", "bad/key").await.is_err());
    assert!(sequences.get_sequence("bad%key").await.is_err());

    // One bad key rejects the whole batch
    let err = sequences
        .delete_sequences(&items(&["fine", "not/fine"]))
        .await
        .unwrap_err();
    assert_eq!(err.failure_reason(), FailureReason::InvalidSequenceKey);

    assert_eq!(world.service.calls(), 0);
}

#[tokio::test]
async fn test_reserved_characters_are_accepted_in_query_bodies() {
    let world = World::new();
    let session = world.session("alice").await;

    let criteria = SequenceCriteria {
        keys: items(&["a/b"]),
        ..Default::default()
    };
    let found = session.sequences().get_sequences_by_criteria(&criteria).await.unwrap();
    assert!(found.is_empty());
    assert_eq!(world.service.calls(), 1);
}

#[tokio::test]
async fn test_create_then_delete_leaves_no_residue() {
    let world = World::new();
    let session = world.session("alice").await;
    let sequences = session.sequences();

    let created = sequences
        .create_sequence("tour", "Test", SPACE, items(&["x", "y"]), BTreeMap::new())
        .await
        .unwrap();
    assert_eq!(created.items, items(&["x", "y"]));

    sequences.delete_sequences(&items(&["tour"])).await.unwrap();
    let err = sequences.get_sequence("tour").await.unwrap_err();
    assert_eq!(err.failure_reason(), FailureReason::NotFound);
    assert_eq!(world.store.stats().sequence_count, 0);
}

#[tokio::test]
async fn test_duplicate_create_is_a_conflict() {
    let world = World::new();
    let session = world.session("alice").await;
    let sequences = session.sequences();

    sequences
        .create_sequence("tour", "Test", SPACE, Vec::new(), BTreeMap::new())
        .await
        .unwrap();
    let outcome = sequences
        .create_sequence("tour", "Test", SPACE, Vec::new(), BTreeMap::new())
        .await;

    let result = OperationResult::from_outcome(&outcome);
    assert_eq!(result.result_code, ResultCode::Failed);
    assert_eq!(result.http_result_code, 409);
    assert_eq!(result.failure_reason, FailureReason::Conflict);
}

#[tokio::test]
async fn test_rename_moves_key_and_keeps_contents() {
    let world = World::new();
    let session = world.session("alice").await;
    let sequences = session.sequences();

    let mut metadata = BTreeMap::new();
    metadata.insert("Author".to_string(), "alice".to_string());
    sequences
        .create_sequence("a", "Test", SPACE, items(&["1", "2"]), metadata.clone())
        .await
        .unwrap();

    let renamed = sequences.rename_sequence("a", "b").await.unwrap();
    assert_eq!(renamed.key, "b");

    let fetched = sequences.get_sequence("b").await.unwrap();
    assert_eq!(fetched.key, "b");
    assert_eq!(fetched.items, items(&["1", "2"]));
    assert_eq!(fetched.metadata, metadata);
    assert!(sequences.get_sequence("a").await.is_err());
}

#[tokio::test]
async fn test_rename_notifies_rename_then_update() {
    let world = World::new();
    let session = world.session("alice").await;
    let sequences = session.sequences();
    let mut changes = sequences.subscribe();

    sequences
        .create_sequence("old", "Test", SPACE, Vec::new(), BTreeMap::new())
        .await
        .unwrap();
    sequences.rename_sequence("old", "new").await.unwrap();

    let created = within(changes.recv()).await.unwrap();
    assert_eq!((created.update_type, created.key.as_str()), (SequenceUpdateType::Create, "old"));

    let first = within(changes.recv()).await.unwrap();
    let second = within(changes.recv()).await.unwrap();
    assert_eq!((first.update_type, first.key.as_str()), (SequenceUpdateType::Rename, "old"));
    assert_eq!((second.update_type, second.key.as_str()), (SequenceUpdateType::Update, "new"));
    assert_eq!(second.space_id, SPACE);

    session.bus().ping().await.unwrap();
    assert!(changes.try_recv().is_none());
}

#[tokio::test]
async fn test_read_only_scope_surfaces_permission_failure() {
    let world = World::new();
    let session = world.session("alice").await;
    let sequences = session.sequences();

    sequences
        .create_sequence("locked", "Test", "archive", Vec::new(), BTreeMap::new())
        .await
        .unwrap();
    world.store.set_read_only("archive");

    let outcome = sequences
        .update_sequence("locked", "Test", "archive", items(&["1"]), BTreeMap::new())
        .await;
    let result = OperationResult::from_outcome(&outcome);
    assert_eq!(result.http_result_code, 403);
    assert_eq!(result.failure_reason, FailureReason::PermissionDenied);
    assert!(!outcome.unwrap_err().is_retryable());
}

#[tokio::test]
async fn test_containing_items_uses_any_match() {
    let world = World::new();
    let session = world.session("alice").await;
    let sequences = session.sequences();

    for (key, values) in [("a", &["1", "2"][..]), ("b", &["3"][..]), ("c", &["4"][..])] {
        sequences
            .create_sequence(key, "Test", SPACE, items(values), BTreeMap::new())
            .await
            .unwrap();
    }

    let found = sequences
        .get_all_sequences_containing_items(&items(&["2", "3"]), Some("Test"), &[SPACE.to_string()])
        .await
        .unwrap();
    let keys: Vec<&str> = found.iter().map(|s| s.key.as_str()).collect();
    assert_eq!(keys, vec!["a", "b"]);
}

#[tokio::test]
async fn test_criteria_filter_by_regex_and_metadata() {
    let world = World::new();
    let session = world.session("alice").await;
    let sequences = session.sequences();

    let mut tagged = BTreeMap::new();
    tagged.insert("Kind".to_string(), "tour".to_string());
    sequences
        .create_sequence("space1:tour", "Test", SPACE, Vec::new(), tagged.clone())
        .await
        .unwrap();
    sequences
        .create_sequence("space1:lobby", "Test", SPACE, Vec::new(), BTreeMap::new())
        .await
        .unwrap();

    let criteria = SequenceCriteria {
        key_regex: Some("^space1:".into()),
        metadata: tagged,
        ..Default::default()
    };
    let found = sequences.get_sequences_by_criteria(&criteria).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].key, "space1:tour");

    let bad = SequenceCriteria {
        key_regex: Some("[".into()),
        ..Default::default()
    };
    let err = sequences.get_sequences_by_criteria(&bad).await.unwrap_err();
    assert_eq!(err.http_code(), 400);
}

#[tokio::test]
async fn test_hierarchy_round_trip() {
    let world = World::new();
    let session = world.session("alice").await;
    let hierarchy = session.hierarchy();

    hierarchy.create_sequence_hierarchy(None, &[1, 2, 3]).await.unwrap();
    let root = hierarchy.get_sequence_hierarchy(None).await.unwrap();
    assert!(!root.has_parent());
    assert_eq!(root.ids, vec![1, 2, 3]);
    assert_eq!(root.space_id, SPACE);

    hierarchy.create_sequence_hierarchy(Some(1), &[2, 3]).await.unwrap();
    let branch = hierarchy.get_sequence_hierarchy(Some(1)).await.unwrap();
    assert!(branch.has_parent());
    assert_eq!(branch.parent_id, Some(1));
    assert_eq!(branch.ids, vec![2, 3]);

    let stored = session
        .sequences()
        .get_sequence("EntityHierarchy:space1:m_Id_1")
        .await
        .unwrap();
    assert_eq!(stored.items, items(&["2", "3"]));
}

#[tokio::test]
async fn test_hierarchy_update_replaces_list() {
    let world = World::new();
    let session = world.session("alice").await;
    let hierarchy = session.hierarchy();

    hierarchy.create_sequence_hierarchy(None, &[1, 2]).await.unwrap();
    hierarchy.update_sequence_hierarchy(None, &[2, 3]).await.unwrap();
    assert_eq!(hierarchy.get_sequence_hierarchy(None).await.unwrap().ids, vec![2, 3]);

    hierarchy.delete_sequence_hierarchy(None).await.unwrap();
    assert!(hierarchy.get_sequence_hierarchy(None).await.is_err());
}

#[tokio::test]
async fn test_hierarchy_changes_report_parent() {
    let world = World::new();
    let alice = world.session("alice").await;
    let bob = world.session("bob").await;
    let mut changes = bob.hierarchy().subscribe();

    alice.hierarchy().create_sequence_hierarchy(None, &[7]).await.unwrap();
    alice.hierarchy().create_sequence_hierarchy(Some(7), &[8]).await.unwrap();

    let root = within(changes.recv()).await.unwrap();
    assert!(root.is_root);
    assert_eq!(root.parent_id, None);
    assert_eq!(root.update_type, SequenceUpdateType::Create);

    let branch = within(changes.recv()).await.unwrap();
    assert!(!branch.is_root);
    assert_eq!(branch.parent_id, Some(7));
    assert_eq!(branch.space_id, SPACE);
}

#[tokio::test]
async fn test_hotspot_group_lifecycle() {
    let world = World::new();
    let session = world.session("alice").await;
    let hotspots = session.hotspots();
    let mut changes = hotspots.subscribe();

    hotspots.create_hotspot_group("tour", items(&["h1", "h2"])).await.unwrap();
    hotspots.create_hotspot_group("lobby", items(&["h2"])).await.unwrap();

    let group = hotspots.get_hotspot_group("tour").await.unwrap();
    assert_eq!(group.name, "tour");
    assert_eq!(group.items, items(&["h1", "h2"]));
    let stored = session.sequences().get_sequence("space1:tour").await.unwrap();
    assert_eq!(stored.reference_id, SPACE);

    let containing = hotspots.get_hotspot_groups_containing_hotspot("h2").await.unwrap();
    let names: Vec<&str> = containing.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, vec!["lobby", "tour"]);

    let renamed = hotspots.rename_hotspot_group("tour", "grand-tour").await.unwrap();
    assert_eq!(renamed.name, "grand-tour");
    assert!(hotspots.get_hotspot_group("tour").await.is_err());

    assert_eq!(hotspots.remove_item_from_groups("h2").await.unwrap(), 2);
    assert_eq!(hotspots.get_hotspot_group("grand-tour").await.unwrap().items, items(&["h1"]));
    assert!(hotspots.get_hotspot_group("lobby").await.unwrap().items.is_empty());

    hotspots.delete_hotspot_group("lobby").await.unwrap();
    assert!(hotspots.get_hotspot_group("lobby").await.is_err());

    let first = within(changes.recv()).await.unwrap();
    assert_eq!(first.group_name, "tour");
    assert_eq!(first.update_type, SequenceUpdateType::Create);
}

#[tokio::test]
async fn test_hotspot_group_names_are_validated() {
    let world = World::new();
    let session = world.session("alice").await;

    let err = session
        .hotspots()
        .create_hotspot_group("bad/name", Vec::new())
        .await
        .unwrap_err();
    assert_eq!(err.failure_reason(), FailureReason::InvalidSequenceKey);
    assert_eq!(world.service.calls(), 0);
}
