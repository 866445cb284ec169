use std::time::Duration;

use tokio::time::Instant;

use crate::config::NodeConfig;
use crate::ddll::DdllAction;
use crate::ddll::Mode;
use crate::error::Result;
use crate::finger::Direction;
use crate::message::Message;
use crate::ring::RingKey;
use crate::tests::default::chord_config;
use crate::tests::default::key;
use crate::tests::default::prepare_manager;
use crate::tests::default::settle;
use crate::tests::default::test_config;
use crate::tests::default::TestRing;
use crate::tests::setup_tracing;

#[tokio::test(start_paused = true)]
async fn test_crashed_left_neighbor_is_repaired() -> Result<()> {
    setup_tracing();
    let mut ring = TestRing::build(test_config(), &[10, 20, 30]).await?;
    let dead = ring.link(20);
    let monitor = ring.managers[2].monitor().clone();
    assert!(monitor.is_watching(&dead, &ring.link(30)));

    ring.kill(20);
    tokio::time::sleep(Duration::from_secs(5)).await;

    ring.assert_linked()?;
    assert!(!monitor.is_watching(&dead, &ring.link(30)));
    assert!(monitor.is_watching(&ring.link(10), &ring.link(30)));

    let result = ring.node(10).lookup(&RingKey::search(25)).await?;
    assert_eq!(result.owner, ring.link(30));

    ring.shutdown();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_two_adjacent_crashes_are_repaired() -> Result<()> {
    setup_tracing();
    let mut ring = TestRing::build(test_config(), &[10, 20, 30, 40, 50]).await?;

    ring.kill(30);
    ring.kill(40);
    tokio::time::sleep(Duration::from_secs(10)).await;

    ring.assert_linked()?;
    assert_eq!(ring.node(50).ddll().mode()?, Mode::In);

    ring.shutdown();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_lookup_routes_around_crashed_finger() -> Result<()> {
    let mut ring = TestRing::build(chord_config(), &[10, 20, 30, 40, 50]).await?;
    ring.update_rounds(3).await?;

    let dead = ring.link(30);
    let origin = ring.node(10);
    {
        let ft = origin.suzaku().read_fingers()?;
        let idx1 = ft.table(Direction::Forward).and_then(|t| t.get(1));
        assert_eq!(idx1.map(|e| &e.primary), Some(&dead));
    }

    ring.kill(30);
    let result = origin.lookup(&RingKey::search(45)).await?;
    assert_eq!(result.owner, ring.link(50));
    assert!(result.hops >= 2);

    assert!(origin.suzaku().is_suspected(&dead));
    assert!(!origin.suzaku().read_fingers()?.references(&dead));

    ring.shutdown();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_leave_notifies_reverse_pointers() -> Result<()> {
    let keys = [10, 20, 30, 40, 50, 60, 70, 80];
    let mut ring = TestRing::build(chord_config(), &keys).await?;
    ring.update_rounds(3).await?;

    let leaving = ring.node(30);
    let gone = leaving.me().clone();
    assert!(leaving.delete().await?);
    tokio::time::sleep(Duration::from_secs(2)).await;
    ring.nodes.retain(|n| *n.me() != gone);
    ring.assert_linked()?;

    for node in &ring.nodes {
        let ft = node.suzaku().read_fingers()?;
        let Some(table) = ft.table(Direction::Forward) else {
            continue;
        };
        for (index, entry) in table.stream().filter(|(i, _)| *i > 0) {
            assert_ne!(entry.primary, gone, "{} index {}", node.me(), index);
        }
    }

    // 10 pointed at 30 and now points at its right neighbor
    let n10 = ring.node(10);
    let ft = n10.suzaku().read_fingers()?;
    let idx1 = ft.table(Direction::Forward).and_then(|t| t.get(1));
    assert_eq!(idx1.map(|e| e.primary.clone()), Some(ring.link(40)));
    drop(ft);

    settle().await;
    ring.shutdown();
    Ok(())
}

/// Liveness pings far apart, so only the code under test notices failures.
fn quiet_config() -> NodeConfig {
    let mut config = test_config();
    config.ddll.ping_period_ms = 3_600_000;
    config
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_insertion_is_withdrawn() -> Result<()> {
    setup_tracing();
    let ring = TestRing::build(quiet_config(), &[10, 30]).await?;
    let manager = prepare_manager(
        &ring.network,
        &ring.scheduler,
        "node-20",
        ring.config.clone(),
    )?;
    let joiner = manager.create_node(key(20))?;
    let left = ring.node(10);
    let right = ring.node(30);

    let pending = joiner.ddll().begin_insert(left.me(), right.me())?;
    let DdllAction::Send(_, Message::SetR(set_r)) = pending.action else {
        panic!("set_r expected");
    };
    // 10 accepts while 20 is unreachable, so the ack never arrives
    ring.network.kill(&joiner.me().endpoint);
    let act = left.ddll().on_set_r(joiner.me(), &set_r)?;
    left.execute(act).await?;
    settle().await;
    assert_eq!(right.ddll().left()?, Some(joiner.me().clone()));
    assert_eq!(left.ddll().right()?, Some(joiner.me().clone()));

    ring.network.revive(&joiner.me().endpoint);
    let act = joiner.ddll().abort_insert(pending.req_no, true)?;
    joiner.execute(act).await?;
    settle().await;

    assert_eq!(joiner.ddll().mode()?, Mode::Out);
    ring.assert_linked()?;
    {
        let l = left.ddll().read_state()?;
        let r = right.ddll().read_state()?;
        assert_eq!(l.ref_count, 0);
        assert_eq!(l.right_seq, r.left_seq);
    }

    manager.shutdown();
    ring.shutdown();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_lookup_repairs_dead_left_hop() -> Result<()> {
    setup_tracing();
    let mut ring = TestRing::build(quiet_config(), &[10, 20, 30, 40, 50]).await?;
    let dead = ring.link(50);
    ring.kill(50);

    let n10 = ring.node(10);
    assert_eq!(n10.ddll().left()?, Some(dead.clone()));

    // the closest node before 5 is the dead left neighbor of 10
    let result = n10.lookup(&RingKey::search(5)).await?;
    assert_eq!(result.owner, ring.link(10));
    assert!(n10.suzaku().is_suspected(&dead));

    assert_eq!(n10.ddll().left()?, Some(ring.link(40)));
    assert_eq!(ring.node(40).ddll().right()?, Some(ring.link(10)));
    ring.assert_linked()?;

    ring.shutdown();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_delete_past_dead_left_hands_over_to_right() -> Result<()> {
    let mut ring = TestRing::build(quiet_config(), &[10, 20, 30]).await?;
    let dead = ring.link(10);
    ring.kill(10);

    let n20 = ring.node(20);
    let started = Instant::now();
    assert!(n20.delete().await?);
    assert_eq!(n20.ddll().mode()?, Mode::Out);

    // 30 took the left of 20 directly and released 20 before GRACE ran out
    assert_eq!(ring.node(30).ddll().left()?, Some(dead));
    let ddll = &ring.config.ddll;
    assert!(started.elapsed() >= ddll.set_r_timeout());
    assert!(started.elapsed() < ddll.set_r_timeout() + ddll.grace_timeout());

    settle().await;
    ring.shutdown();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_grace_times_out_without_unref() -> Result<()> {
    let mut ring = TestRing::build(quiet_config(), &[10, 20, 30, 40]).await?;
    ring.kill(10);
    ring.kill(30);

    let n20 = ring.node(20);
    let started = Instant::now();
    assert!(n20.delete().await?);

    // neither neighbor answers: the deletion times out, then GRACE does
    let ddll = &ring.config.ddll;
    assert!(started.elapsed() >= ddll.set_r_timeout() + ddll.grace_timeout());
    assert_eq!(n20.ddll().mode()?, Mode::Out);
    assert!(n20.ddll().grace_notifier()?.is_none());
    assert_eq!(n20.ddll().read_state()?.ref_count, 0);

    ring.shutdown();
    Ok(())
}
