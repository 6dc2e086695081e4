use overlay_rust::keypair::Keypair;
use overlay_rust::pseudonym::flood::AlwaysFlooded;
use overlay_rust::pseudonym::AuthError;
use overlay_rust::store::StoreError;
use overlay_rust::test_utilities::test_manager::TestManager;
use overlay_rust::Identifier;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test]
async fn put_get_collision_delete_across_two_nodes() {
    let manager = TestManager::new(2).await;
    // B asks A; A only ever asks itself
    manager.connect(1, 0);
    let (a, b) = (manager.node(0), manager.node(1));
    let key = Identifier::from_data(b"id1");

    a.put(key, b"v1".to_vec()).await.unwrap();
    assert_eq!(a.local_store().get_authoritative(&key), Some(b"v1".to_vec()));

    let results = b.get(key).collect_all().await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].data, b"v1".to_vec());
    assert!(results[0].authoritative);

    assert_eq!(
        a.put(key, b"v2".to_vec()).await,
        Err(StoreError::KeyCollision(key))
    );
    a.delete(key).await.unwrap();
    a.put(key, b"v2".to_vec()).await.unwrap();

    let results = b.get(key).collect_all().await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].data, b"v2".to_vec());
    assert!(results[0].authoritative);

    manager.shutdown().await;
}

#[tokio::test]
async fn get_against_unreachable_candidates_is_bounded() {
    let timeout = Duration::from_millis(150);
    let manager = TestManager::with_timeout(1, timeout).await;
    for port in 1..=4u16 {
        manager.add_unreachable(0, port);
    }
    let started = Instant::now();
    let results = manager
        .node(0)
        .get(Identifier::from_data(b"missing"))
        .collect_all()
        .await;
    assert!(results.is_empty());
    assert!(started.elapsed() < timeout * 4 + Duration::from_secs(1));
    manager.shutdown().await;
}

#[tokio::test]
async fn flooded_challenge_surfaces_exact_backoff() {
    let manager = TestManager::new(1).await;
    let flooded = manager
        .spawn_node_with_flood_policy(Arc::new(AlwaysFlooded::new(Duration::from_secs(2))))
        .await;

    let result = manager
        .node(0)
        .challenge(
            flooded.local_contact(),
            flooded.identifier(),
            flooded.public_key(),
        )
        .await;
    assert_eq!(
        result,
        Err(AuthError::Flood {
            backoff: Duration::from_secs(2)
        })
    );

    flooded.shutdown().await;
    manager.shutdown().await;
}

#[tokio::test]
async fn challenge_true_only_for_the_key_holder() {
    let manager = TestManager::new(2).await;
    let peer = manager.node(1);

    assert_eq!(
        manager
            .node(0)
            .challenge(peer.local_contact(), peer.identifier(), peer.public_key())
            .await,
        Ok(true)
    );
    let stranger = Keypair::new();
    assert_eq!(
        manager
            .node(0)
            .challenge(peer.local_contact(), peer.identifier(), stranger.public_key())
            .await,
        Ok(false)
    );

    manager.shutdown().await;
}

#[tokio::test]
async fn trust_weighted_resolution_over_disagreeing_replicas() {
    let manager = TestManager::new(4).await;
    for from in 0..3 {
        manager.connect(3, from);
    }
    let key = Identifier::from_data(b"example.org");
    manager.node(0).put(key, b"10.0.0.1".to_vec()).await.unwrap();
    manager.node(1).put(key, b"10.0.0.2".to_vec()).await.unwrap();
    manager.node(2).put(key, b"10.0.0.2".to_vec()).await.unwrap();

    assert_eq!(
        manager.node(3).resolve(key).await,
        Some(b"10.0.0.2".to_vec())
    );
    manager.shutdown().await;
}
