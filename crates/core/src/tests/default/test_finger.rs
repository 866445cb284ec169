use crate::config::NodeConfig;
use crate::error::Result;
use crate::finger::Direction;
use crate::finger::FTEntry;
use crate::message::GetEntRequest;
use crate::node::RingNode;
use crate::ring::Link;
use crate::suzaku::update::LevelOutcome;
use crate::tests::default::chord_config;
use crate::tests::default::settle;
use crate::tests::default::test_config;
use crate::tests::default::TestRing;

const KEYS: [i64; 8] = [10, 20, 30, 40, 50, 60, 70, 80];

fn entry_at(node: &RingNode, dir: Direction, index: usize) -> Result<Option<Link>> {
    let ft = node.suzaku().read_fingers()?;
    Ok(ft
        .table(dir)
        .and_then(|t| t.get(index))
        .map(|e| e.primary.clone()))
}

#[tokio::test(start_paused = true)]
async fn test_chord_layout_after_update_passes() -> Result<()> {
    let ring = TestRing::build(chord_config(), &KEYS).await?;
    ring.update_rounds(3).await?;

    let n = KEYS.len();
    for (i, k) in KEYS.iter().enumerate() {
        let node = ring.node(*k);
        assert_eq!(
            entry_at(&node, Direction::Forward, 1)?,
            Some(ring.link(KEYS[(i + 2) % n])),
            "distance 2 of {k}"
        );
        assert_eq!(
            entry_at(&node, Direction::Forward, 2)?,
            Some(ring.link(KEYS[(i + 4) % n])),
            "distance 4 of {k}"
        );
        // distance 8 wraps back to the node itself
        assert_eq!(entry_at(&node, Direction::Forward, 3)?, None);
        assert!(node.suzaku().read_fingers()?.table(Direction::Backward).is_none());
        assert!(node.suzaku().cycles() >= 3);
    }

    ring.shutdown();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_pointed_nodes_learn_reverse_pointers() -> Result<()> {
    let ring = TestRing::build(chord_config(), &KEYS).await?;
    ring.update_rounds(3).await?;

    let n = KEYS.len();
    for (i, k) in KEYS.iter().enumerate() {
        let target = ring.node(KEYS[(i + 2) % n]);
        let rps = target.suzaku().read_fingers()?.reverse_pointers();
        assert!(rps.contains(&ring.link(*k)), "{} misses {k}", target.me());
    }

    ring.shutdown();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_both_directions_with_branching_factor_four() -> Result<()> {
    let ring = TestRing::build(test_config(), &KEYS).await?;
    ring.update_rounds(2).await?;

    let n = KEYS.len();
    for (i, k) in KEYS.iter().enumerate() {
        let node = ring.node(*k);
        // with K = 4, index 1 covers distance 2 and index 2 distance 3
        assert_eq!(
            entry_at(&node, Direction::Forward, 1)?,
            Some(ring.link(KEYS[(i + 2) % n]))
        );
        assert_eq!(
            entry_at(&node, Direction::Forward, 2)?,
            Some(ring.link(KEYS[(i + 3) % n]))
        );
        assert_eq!(
            entry_at(&node, Direction::Backward, 1)?,
            Some(ring.link(KEYS[(i + n - 2) % n]))
        );
        assert_eq!(
            entry_at(&node, Direction::Backward, 2)?,
            Some(ring.link(KEYS[(i + n - 3) % n]))
        );
    }

    ring.shutdown();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_joiner_copies_predecessor_table() -> Result<()> {
    let mut ring = TestRing::build(chord_config(), &KEYS).await?;
    ring.update_rounds(3).await?;

    ring.config.suzaku.copy_predecessor_table = true;
    let joiner = ring.join(85).await?;

    // slots of 80 are copied verbatim; the next pass corrects them
    let left = ring.node(80);
    assert_eq!(
        entry_at(&joiner, Direction::Forward, 1)?,
        entry_at(&left, Direction::Forward, 1)?
    );
    // the copied slot points at 20, which learns about the joiner
    assert_eq!(
        entry_at(&joiner, Direction::Forward, 1)?,
        Some(ring.link(20))
    );
    let rps = ring.node(20).suzaku().read_fingers()?.reverse_pointers();
    assert!(rps.contains(joiner.me()));

    joiner.suzaku().update_pass().await?;
    assert_eq!(
        entry_at(&joiner, Direction::Forward, 1)?,
        Some(ring.link(20))
    );

    ring.shutdown();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_get_ent_rejects_other_branching_factor() -> Result<()> {
    let ring = TestRing::build(chord_config(), &[10, 20]).await?;
    let node = ring.node(10);

    let req = GetEntRequest {
        is_backward: false,
        x: 0,
        y: 0,
        branching_factor: 16,
        passive1: vec![],
        passive2: None,
    };
    let reply = node.suzaku().on_get_ent(&ring.link(20), &req).await?;
    assert!(reply.entries.is_empty());
    assert_eq!(reply.pushed_message_count, 0);

    let req = GetEntRequest {
        branching_factor: 2,
        ..req
    };
    let reply = node.suzaku().on_get_ent(&ring.link(20), &req).await?;
    assert_eq!(reply.entries.len(), 2);
    let own = reply.entries[0].as_ref().map(|e| e.primary.clone());
    assert_eq!(own, Some(ring.link(10)));
    let next = reply.entries[1].as_ref().map(|e| e.primary.clone());
    assert_eq!(next, Some(ring.link(20)));
    assert!(node
        .suzaku()
        .read_fingers()?
        .reverse_pointers()
        .contains(&ring.link(20)));

    ring.shutdown();
    Ok(())
}

/// Chord layout in both directions.
fn two_way_config() -> NodeConfig {
    let mut config = chord_config();
    config.suzaku.use_bft = true;
    config
}

#[tokio::test(start_paused = true)]
async fn test_sequential_passes_fill_both_directions() -> Result<()> {
    let config = two_way_config();
    assert!(!config.suzaku.zigzag_update);
    let ring = TestRing::build(config, &KEYS).await?;
    ring.update_rounds(3).await?;

    let n = KEYS.len();
    for (i, k) in KEYS.iter().enumerate() {
        let node = ring.node(*k);
        for (index, distance) in [(1, 2), (2, 4)] {
            assert_eq!(
                entry_at(&node, Direction::Forward, index)?,
                Some(ring.link(KEYS[(i + distance) % n])),
                "forward {distance} of {k}"
            );
            assert_eq!(
                entry_at(&node, Direction::Backward, index)?,
                Some(ring.link(KEYS[(i + n - distance) % n])),
                "backward {distance} of {k}"
            );
        }
        assert_eq!(entry_at(&node, Direction::Backward, 3)?, None);
    }

    ring.shutdown();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_level_pushes_own_entries_to_queried_node() -> Result<()> {
    let ring = TestRing::build(two_way_config(), &KEYS).await?;
    let n10 = ring.node(10);
    let n20 = ring.node(20);
    assert_eq!(entry_at(&n20, Direction::Backward, 1)?, None);

    // 10 queries its right neighbor and pushes its own left along
    let outcome = n10
        .suzaku()
        .update_level(Direction::Forward, 0, None, true)
        .await?;
    assert_eq!(outcome, LevelOutcome::Next(None));
    assert_eq!(
        entry_at(&n10, Direction::Forward, 1)?,
        Some(ring.link(30))
    );
    assert_eq!(
        entry_at(&n20, Direction::Backward, 1)?,
        Some(ring.link(80))
    );

    settle().await;
    let rps = ring.node(80).suzaku().read_fingers()?.reverse_pointers();
    assert!(rps.contains(n20.me()));

    ring.shutdown();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_delayed_update_defers_last_entry() -> Result<()> {
    let ring = TestRing::build(chord_config(), &KEYS).await?;
    let node = ring.node(10);
    let outcome = node
        .suzaku()
        .update_level(Direction::Forward, 0, None, false)
        .await?;
    assert_eq!(outcome, LevelOutcome::Next(None));
    assert_eq!(
        entry_at(&node, Direction::Forward, 1)?,
        Some(ring.link(30))
    );
    ring.shutdown();

    let mut config = chord_config();
    config.suzaku.delayed_update = true;
    let ring = TestRing::build(config, &KEYS).await?;
    let node = ring.node(10);
    let outcome = node
        .suzaku()
        .update_level(Direction::Forward, 0, None, false)
        .await?;
    let LevelOutcome::Next(Some(basis)) = outcome else {
        panic!("deferred entry expected");
    };
    assert_eq!(basis.primary, ring.link(30));
    assert_eq!(entry_at(&node, Direction::Forward, 1)?, None);

    // the next level starts from the deferred entry and installs it once it answered
    node.suzaku()
        .update_level(Direction::Forward, 1, Some(basis), false)
        .await?;
    assert_eq!(
        entry_at(&node, Direction::Forward, 1)?,
        Some(ring.link(30))
    );

    ring.shutdown();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_first_cycle_seed_is_the_base_distance_entry() -> Result<()> {
    let ring = TestRing::build(two_way_config(), &KEYS).await?;
    ring.update_rounds(3).await?;

    // level 1 forward of 30 queries 50, two nodes away
    let n30 = ring.node(30);
    let strategy = n30.suzaku();
    let now = strategy.now();
    let (batch, seed) = {
        let mut ft = strategy.lock_fingers()?;
        strategy.passive_updates(&mut ft, Direction::Forward, 2, 1, true, now)?
    };
    let batch: Vec<_> = batch.into_iter().map(|e| e.map(|e| e.primary)).collect();
    assert_eq!(batch, vec![Some(ring.link(30)), Some(ring.link(10))]);
    assert_eq!(seed.map(|e| e.primary), Some(ring.link(10)));

    let (_, seed) = {
        let mut ft = strategy.lock_fingers()?;
        strategy.passive_updates(&mut ft, Direction::Forward, 2, 1, false, now)?
    };
    assert!(seed.is_none());

    ring.shutdown();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_seed_fills_slot_one_level_out() -> Result<()> {
    let ring = TestRing::build(two_way_config(), &KEYS).await?;
    let n50 = ring.node(50);
    let now = n50.suzaku().now();
    let req = GetEntRequest {
        is_backward: false,
        x: 1,
        y: 0,
        branching_factor: 2,
        passive1: vec![],
        passive2: Some(FTEntry::new(ring.link(40), now)),
    };

    // going backward from 30, 40 lies past 50
    let reply = n50.suzaku().on_get_ent(&ring.link(30), &req).await?;
    assert_eq!(reply.pushed_message_count, 0);
    assert_eq!(entry_at(&n50, Direction::Backward, 2)?, None);

    let req = GetEntRequest {
        passive1: vec![Some(FTEntry::new(ring.link(30), now)), None],
        passive2: Some(FTEntry::new(ring.link(10), now)),
        ..req
    };
    let reply = n50.suzaku().on_get_ent(&ring.link(30), &req).await?;
    assert_eq!(reply.pushed_message_count, 2);
    assert_eq!(
        entry_at(&n50, Direction::Backward, 1)?,
        Some(ring.link(30))
    );
    assert_eq!(
        entry_at(&n50, Direction::Backward, 2)?,
        Some(ring.link(10))
    );

    ring.shutdown();
    Ok(())
}
