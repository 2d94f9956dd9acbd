//! Multi-client convergence tests under deterministic simulation.
//!
//! Every scenario runs the real server driver and real client engines
//! against a shared virtual clock; minutes of simulated playback execute
//! instantly and reproduce exactly.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use reelsync_client::DRIFT_THRESHOLD;
use reelsync_harness::SimCluster;
use reelsync_proto::RoomId;

const ROOM_ID: RoomId = 0x0001_0001_0001_0001_0001_0001_0001_0001;

#[test]
fn players_stay_in_lock_step_without_corrections() {
    let mut cluster = SimCluster::new(ROOM_ID);
    let a = cluster.add_client();
    let b = cluster.add_client();
    let c = cluster.add_client();

    cluster.load(a, "movie.mkv");
    cluster.advance(Duration::from_millis(700));

    // Settled and playing everywhere; record the corrective-seek baseline.
    let baseline: Vec<usize> =
        [a, b, c].iter().map(|&i| cluster.player(i).seek_history().len()).collect();

    // Several heartbeat cycles, inside the first force-sync interval.
    cluster.advance(Duration::from_secs(12));

    for (n, &idx) in [a, b, c].iter().enumerate() {
        assert_eq!(
            cluster.player(idx).seek_history().len(),
            baseline[n],
            "client {idx} was seek-corrected despite zero drift"
        );
    }

    // Force-sync broadcasts adopt the sender's position unconditionally;
    // with zero drift they must not move anyone.
    cluster.advance(Duration::from_secs(48));

    assert!(cluster.max_drift() < 0.01);
    assert!(cluster.server_errors().is_empty());
}

#[test]
fn injected_divergence_converges_within_a_heartbeat_cycle() {
    let mut cluster = SimCluster::new(ROOM_ID);
    let a = cluster.add_client();
    // Staggered join so the heartbeat phases differ, as they would in
    // any real deployment.
    cluster.advance(Duration::from_secs(1));
    let b = cluster.add_client();

    cluster.load(a, "movie.mkv");
    cluster.advance(Duration::from_secs(10));

    // B's surface jumps far out of sync without the engine noticing.
    cluster.player_mut(b).force_state(300.0, true);
    assert!(cluster.max_drift() > 200.0);

    cluster.advance(Duration::from_secs(20));

    assert!(
        cluster.max_drift() < DRIFT_THRESHOLD,
        "drift {} not repaired after heartbeat cycles",
        cluster.max_drift()
    );
    assert!(cluster.server_errors().is_empty());
}

#[test]
fn scrub_burst_collapses_to_one_announcement() {
    let mut cluster = SimCluster::new(ROOM_ID);
    let a = cluster.add_client();
    let b = cluster.add_client();

    cluster.load(a, "movie.mkv");
    cluster.advance(Duration::from_secs(2));

    let before = cluster.player(b).seek_history().len();

    // Three scrubs inside the debounce window.
    cluster.seek(a, 10.0);
    cluster.advance(Duration::from_millis(100));
    cluster.seek(a, 20.0);
    cluster.advance(Duration::from_millis(100));
    cluster.seek(a, 30.0);
    cluster.advance(Duration::from_millis(400));

    let seeks = &cluster.player(b).seek_history()[before..];
    assert_eq!(seeks.len(), 1, "scrub burst produced {} corrections", seeks.len());
    assert!((seeks[0] - 30.0).abs() < f64::EPSILON);
}

#[test]
fn load_supersedes_an_unflushed_scrub() {
    let mut cluster = SimCluster::new(ROOM_ID);
    let a = cluster.add_client();
    let b = cluster.add_client();

    cluster.load(a, "movie.mkv");
    cluster.advance(Duration::from_secs(2));

    // Scrub, then pick a new video before the debounce window closes.
    cluster.seek(a, 3600.0);
    cluster.load(a, "other.mkv");
    cluster.advance(Duration::from_secs(1));

    assert!(
        !cluster.player(b).seek_history().contains(&3600.0),
        "stale scrub announced after the load"
    );
    assert_eq!(cluster.player(b).video_id(), Some("other.mkv"));
    assert!(cluster.max_drift() < DRIFT_THRESHOLD);
}

#[test]
fn late_joiner_lands_at_live_position() {
    let mut cluster = SimCluster::new(ROOM_ID);
    let a = cluster.add_client();

    cluster.load(a, "movie.mkv");
    cluster.advance(Duration::from_secs(15));

    let b = cluster.add_client();
    cluster.advance(Duration::from_secs(1));

    assert_eq!(cluster.player(b).video_id(), Some("movie.mkv"));
    assert!(
        (cluster.player(b).position() - cluster.player(a).position()).abs() < 0.1,
        "late joiner at {} while room is at {}",
        cluster.player(b).position(),
        cluster.player(a).position()
    );
}

#[test]
fn paused_room_stays_frozen_for_late_joiner() {
    let mut cluster = SimCluster::new(ROOM_ID);
    let a = cluster.add_client();

    cluster.load(a, "movie.mkv");
    cluster.advance(Duration::from_secs(10));
    cluster.pause(a);

    // Time passes while paused; the room position must not move.
    cluster.advance(Duration::from_secs(20));

    let b = cluster.add_client();
    cluster.advance(Duration::from_secs(1));

    let position = cluster.player(b).position();
    assert!((position - 10.0).abs() < 0.5, "paused room drifted to {position}");
    assert_eq!(
        cluster.player(b).playback_state(),
        reelsync_client::PlaybackState::Paused
    );
}

#[test]
fn local_pause_reaches_every_peer() {
    let mut cluster = SimCluster::new(ROOM_ID);
    let a = cluster.add_client();
    let b = cluster.add_client();
    let c = cluster.add_client();

    cluster.load(a, "movie.mkv");
    cluster.advance(Duration::from_secs(5));

    cluster.pause(b);
    cluster.advance(Duration::from_secs(5));

    for idx in [a, b, c] {
        assert_eq!(
            cluster.player(idx).playback_state(),
            reelsync_client::PlaybackState::Paused,
            "client {idx} still playing after a peer paused"
        );
    }
    assert!(cluster.max_drift() < 0.5);
}
