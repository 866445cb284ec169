use std::time::Duration;

use crate::ddll::Mode;
use crate::error::Error;
use crate::error::Result;
use crate::ring::RingKey;
use crate::tests::default::key;
use crate::tests::default::prepare_manager;
use crate::tests::default::settle;
use crate::tests::default::test_config;
use crate::tests::default::TestRing;

#[tokio::test(start_paused = true)]
async fn test_single_node_ring() -> Result<()> {
    let ring = TestRing::build(test_config(), &[10]).await?;
    let node = ring.node(10);

    assert_eq!(node.ddll().mode()?, Mode::In);
    assert_eq!(node.ddll().left()?, Some(node.me().clone()));
    assert_eq!(node.ddll().right()?, Some(node.me().clone()));

    let result = node.lookup(&RingKey::search(42)).await?;
    assert_eq!(result.owner, *node.me());
    assert_eq!(result.resolver, *node.me());
    assert_eq!(result.hops, 0);

    ring.shutdown();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_join_keeps_key_order() -> Result<()> {
    let ring = TestRing::build(test_config(), &[40, 10, 30, 20, 50]).await?;
    ring.assert_linked()?;
    for node in &ring.nodes {
        assert_eq!(node.ddll().mode()?, Mode::In);
    }

    // the neighbor set of 30 starts with its left neighbors
    let neighbors = ring.node(30).ddll().neighbors()?;
    assert_eq!(neighbors.first(), Some(&ring.link(20)));

    ring.shutdown();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_joins_between_same_neighbors() -> Result<()> {
    let mut ring = TestRing::build(test_config(), &[10]).await?;
    let introducer = ring.link(10);

    let m20 = prepare_manager(&ring.network, &ring.scheduler, "node-20", ring.config.clone())?;
    let m30 = prepare_manager(&ring.network, &ring.scheduler, "node-30", ring.config.clone())?;
    let n20 = m20.create_node(key(20))?;
    let n30 = m30.create_node(key(30))?;

    let (r20, r30) = futures::join!(n20.insert(&introducer), n30.insert(&introducer));
    assert!(r20?);
    assert!(r30?);
    settle().await;

    ring.managers.extend([m20, m30]);
    ring.nodes.extend([n20, n30]);
    ring.nodes.sort_by(|a, b| a.me().key.cmp(&b.me().key));
    ring.assert_linked()?;

    ring.shutdown();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_lookup_finds_owner() -> Result<()> {
    let ring = TestRing::build(test_config(), &[10, 20, 30]).await?;

    let result = ring.node(10).lookup(&RingKey::search(25)).await?;
    assert_eq!(result.owner, ring.link(30));
    assert_eq!(result.key, RingKey::search(25));

    // an exact node key is owned by that node
    let result = ring.node(30).lookup(&key(20)).await?;
    assert_eq!(result.owner, ring.link(20));

    // keys past the largest node wrap around
    let result = ring.node(20).lookup(&RingKey::search(35)).await?;
    assert_eq!(result.owner, ring.link(10));

    ring.shutdown();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_lookup_after_update_passes() -> Result<()> {
    let keys = [10, 20, 30, 40, 50, 60, 70, 80];
    let ring = TestRing::build(test_config(), &keys).await?;
    ring.update_rounds(2).await?;

    for node in &ring.nodes {
        for probe in [5, 15, 45, 75, 85] {
            let owner = keys.iter().find(|k| **k >= probe).copied().unwrap_or(10);
            let result = node.lookup(&RingKey::search(probe)).await?;
            assert_eq!(result.owner, ring.link(owner), "lookup {} from {}", probe, node.me());
        }
    }

    ring.shutdown();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_delete_relinks_neighbors() -> Result<()> {
    let mut ring = TestRing::build(test_config(), &[10, 20, 30]).await?;
    let leaving = ring.node(20);

    assert!(leaving.delete().await?);
    tokio::time::sleep(Duration::from_millis(1000)).await;

    assert_eq!(leaving.ddll().mode()?, Mode::Out);
    assert_eq!(leaving.ddll().left()?, None);
    ring.nodes.retain(|n| n.me().key != key(20));
    ring.assert_linked()?;

    let result = ring.node(10).lookup(&RingKey::search(15)).await?;
    assert_eq!(result.owner, ring.link(30));

    ring.shutdown();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_delete_last_node() -> Result<()> {
    let ring = TestRing::build(test_config(), &[10]).await?;
    let node = ring.node(10);

    assert!(node.delete().await?);
    assert_eq!(node.ddll().mode()?, Mode::Out);

    let err = node.delete().await.unwrap_err();
    assert!(matches!(err, Error::IllegalState {
        expected: Mode::In,
        actual: Mode::Out
    }));

    ring.shutdown();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_rejoin_after_delete() -> Result<()> {
    let ring = TestRing::build(test_config(), &[10, 20, 30]).await?;
    let node = ring.node(20);
    assert!(node.delete().await?);
    settle().await;
    assert_eq!(node.ddll().mode()?, Mode::Out);

    let introducer = ring.link(30);
    assert!(node.insert(&introducer).await?);
    settle().await;
    ring.assert_linked()?;

    ring.shutdown();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_lookup_requires_membership() -> Result<()> {
    let ring = TestRing::build(test_config(), &[10]).await?;
    let m = prepare_manager(&ring.network, &ring.scheduler, "outsider", ring.config.clone())?;
    let outsider = m.create_node(key(99))?;

    let err = outsider.lookup(&RingKey::search(1)).await.unwrap_err();
    assert!(matches!(err, Error::IllegalState { .. }));

    ring.shutdown();
    m.shutdown();
    Ok(())
}
