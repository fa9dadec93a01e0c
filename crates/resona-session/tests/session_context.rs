//! Integration tests for the session context lifecycle.
//!
//! Most tests run on a paused clock (`start_paused = true`) so resume
//! deadlines, stats ticks and player updates can be driven with `sleep`.
//! The concurrency tests use a multi-threaded runtime and real time.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{RecordingConnection, RecordingRegistry, build, evicting_harness, harness};
use resona_protocol::{GuildId, Inbound};
use resona_transport::Connection;
use resona_session::{SessionConfig, SessionError, SessionState};
use serde_json::json;
use tokio::sync::Barrier;

// =========================================================================
// Construction
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_new_sends_hello_first() {
    let h = harness("abc");

    let frames = h.transport.values();
    assert_eq!(frames[0]["op"], "hello");
    assert_eq!(frames[0]["sessionId"], "abc");
    assert!(frames[0]["info"]["version"].is_string());
    assert!(frames[0]["info"]["audioLibraryVersion"].is_string());
    assert_eq!(h.context.state(), SessionState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_stats_tick_fires_immediately_then_every_minute() {
    let h = harness("abc");

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.registry.stats_ticks(), 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.registry.stats_ticks(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stats_tick_keeps_running_while_paused() {
    let h = harness("abc");
    h.context.pause().unwrap();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.registry.stats_ticks(), 1);
}

// =========================================================================
// Pause / resume
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_end_to_end_pause_queue_resume() {
    let h = harness("abc");
    h.context.get_or_create_player(GuildId(7));

    h.context.pause().unwrap();
    assert_eq!(h.context.state(), SessionState::Resumable);

    h.context.send_json(&json!({ "op": "event", "event": "X" }));
    assert_eq!(h.context.queued_frames(), 1);
    assert_eq!(h.transport.ops(), ["hello"], "nothing transmitted while paused");

    let fresh = RecordingConnection::new(2);
    h.context.resume(fresh.clone()).unwrap();

    let frames = fresh.values();
    assert_eq!(fresh.ops(), ["event", "playerUpdate", "resume"]);
    assert_eq!(frames[0]["event"], "X");
    assert_eq!(frames[1]["guildId"], "7");
    assert_eq!(frames[2], json!({ "op": "resume", "sessionId": "abc" }));
    assert_eq!(h.context.state(), SessionState::Open);
    assert_eq!(h.context.queued_frames(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_send_while_paused_replays_in_send_order() {
    let h = harness("abc");
    h.context.pause().unwrap();

    for i in 0..100 {
        h.context.send_json(&json!({ "op": "event", "seq": i }));
    }

    let fresh = RecordingConnection::new(2);
    h.context.resume(fresh.clone()).unwrap();

    let seqs: Vec<i64> = fresh
        .values()
        .iter()
        .filter_map(|v| v["seq"].as_i64())
        .collect();
    assert_eq!(seqs, (0..100).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn test_resume_empty_queue_sends_one_snapshot_per_player_then_resume() {
    let h = harness("abc");
    h.context.get_or_create_player(GuildId(1));
    h.context.get_or_create_player(GuildId(2));
    h.context.pause().unwrap();

    let fresh = RecordingConnection::new(2);
    h.context.resume(fresh.clone()).unwrap();

    let frames = fresh.values();
    assert_eq!(frames.len(), 3);
    let mut guilds: Vec<&str> = frames[..2]
        .iter()
        .map(|v| {
            assert_eq!(v["op"], "playerUpdate");
            v["guildId"].as_str().unwrap()
        })
        .collect();
    guilds.sort();
    assert_eq!(guilds, ["1", "2"]);
    assert_eq!(frames[2]["op"], "resume");
}

#[tokio::test(start_paused = true)]
async fn test_resume_when_open_returns_invalid_state() {
    let h = harness("abc");

    let result = h.context.resume(RecordingConnection::new(2));

    assert!(matches!(
        result,
        Err(SessionError::InvalidState {
            operation: "resume",
            state: SessionState::Open
        })
    ));
    assert_eq!(h.transport.ops(), ["hello"]);
}

#[tokio::test(start_paused = true)]
async fn test_pause_twice_returns_invalid_state() {
    let h = harness("abc");
    h.context.pause().unwrap();

    assert!(matches!(
        h.context.pause(),
        Err(SessionError::InvalidState { operation: "pause", .. })
    ));
    assert_eq!(h.handler.count("paused"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_pause_after_transport_closed_is_allowed() {
    let h = harness("abc");
    h.transport.close(None, None);
    assert_eq!(h.context.state(), SessionState::Destroyed);

    h.context.pause().unwrap();
    assert_eq!(h.context.state(), SessionState::Resumable);
}

// =========================================================================
// Resume timeout race
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_resume_before_timeout_cancels_eviction() {
    let h = harness("abc");
    h.context.pause().unwrap();

    tokio::time::sleep(Duration::from_secs(59)).await;
    h.context.resume(RecordingConnection::new(2)).unwrap();

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.registry.timeouts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_resume_after_timeout_returns_expired_and_fires_once() {
    let h = harness("abc");
    h.context.pause().unwrap();

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(h.registry.timeouts(), 1);

    let result = h.context.resume(RecordingConnection::new(2));
    assert!(matches!(result, Err(SessionError::ResumeExpired(id)) if id.as_str() == "abc"));
    assert_eq!(h.context.state(), SessionState::Resumable);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.registry.timeouts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_pause_uses_configured_timeout() {
    let h = harness("abc");
    h.context.set_resume_timeout(Duration::from_secs(5));
    h.context.pause().unwrap();

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(h.registry.timeouts(), 0);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.registry.timeouts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_with_evicting_registry_destroys_context() {
    let h = evicting_harness("abc");
    h.context.get_or_create_player(GuildId(3));
    h.context.pause().unwrap();

    tokio::time::sleep(Duration::from_secs(61)).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(h.context.state(), SessionState::Destroyed);
    assert_eq!(h.handler.count("destroyed"), 1);
    assert_eq!(h.voice.destroyed(), [GuildId(3)]);
}

// =========================================================================
// Outbound dispatch
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_send_after_transport_closed_drops_silently() {
    let h = harness("abc");
    h.transport.close(None, None);

    h.context.send_json(&json!({ "op": "event", "event": "lost" }));

    assert_eq!(h.context.queued_frames(), 0);
    assert_eq!(h.transport.ops(), ["hello"]);
}

#[tokio::test(start_paused = true)]
async fn test_message_out_hook_sees_sent_queued_and_dropped_frames() {
    let h = harness("abc");
    // hello
    assert_eq!(h.handler.frames_out.load(std::sync::atomic::Ordering::SeqCst), 1);

    h.context.pause().unwrap();
    h.context.send_json(&json!({ "op": "event" }));
    h.context.destroy().await;
    h.context.send_json(&json!({ "op": "event" }));

    assert_eq!(h.handler.frames_out.load(std::sync::atomic::Ordering::SeqCst), 3);
}

// =========================================================================
// Players
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_get_or_create_player_concurrent_calls_create_once() {
    let h = harness("abc");
    let barrier = Arc::new(Barrier::new(32));

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let context = Arc::clone(&h.context);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                context.get_or_create_player(GuildId(9))
            })
        })
        .collect();

    let mut players = Vec::new();
    for task in tasks {
        players.push(task.await.unwrap());
    }

    assert!(players.iter().all(|p| Arc::ptr_eq(p, &players[0])));
    assert_eq!(h.handler.count("new_player:9"), 1);
    assert_eq!(h.context.players().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_get_existing_player_does_not_create() {
    let h = harness("abc");
    assert!(h.context.get_existing_player(GuildId(1)).is_none());
    assert!(h.context.players().is_empty());
    assert_eq!(h.handler.count("new_player"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_destroy_player_without_player_still_destroys_voice() {
    let h = harness("abc");

    h.context.destroy_player(GuildId(42));

    assert_eq!(h.voice.destroyed(), [GuildId(42)]);
    assert_eq!(h.handler.count("destroy_player"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_destroy_player_existing_notifies_and_removes() {
    let h = harness("abc");
    let player = h.context.get_or_create_player(GuildId(5));
    player.play("track-a").unwrap();

    h.context.destroy_player(GuildId(5));

    assert!(h.context.get_existing_player(GuildId(5)).is_none());
    assert_eq!(h.handler.count("destroy_player:5"), 1);
    assert_eq!(h.voice.destroyed(), [GuildId(5)]);
    assert!(!player.is_playing());
}

#[tokio::test(start_paused = true)]
async fn test_playing_players_counts_only_unpaused_tracks() {
    let h = harness("abc");
    h.context.get_or_create_player(GuildId(1)).play("a").unwrap();
    let paused = h.context.get_or_create_player(GuildId(2));
    paused.play("b").unwrap();
    paused.set_paused(true);
    h.context.get_or_create_player(GuildId(3));

    let playing = h.context.playing_players();
    assert_eq!(playing.len(), 1);
    assert_eq!(playing[0].guild_id(), GuildId(1));
}

#[tokio::test(start_paused = true)]
async fn test_player_updates_sent_while_playing_and_stop_cancels() {
    let h = harness("abc");
    let player = h.context.get_or_create_player(GuildId(4));
    player.play("track").unwrap();

    tokio::time::sleep(Duration::from_millis(10_500)).await;
    let updates = h.transport.ops().iter().filter(|op| *op == "playerUpdate").count();
    assert_eq!(updates, 2);

    player.stop();
    tokio::time::sleep(Duration::from_secs(30)).await;
    let after = h.transport.ops().iter().filter(|op| *op == "playerUpdate").count();
    assert_eq!(after, 2);
}

#[tokio::test(start_paused = true)]
async fn test_player_updates_skipped_while_paused() {
    let h = harness("abc");
    h.context
        .get_or_create_player(GuildId(4))
        .play("track")
        .unwrap();
    h.context.pause().unwrap();

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(h.context.queued_frames(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_player_position_advances_and_freezes_when_paused() {
    let h = harness("abc");
    let player = h.context.get_or_create_player(GuildId(1));
    player.play("track").unwrap();

    tokio::time::sleep(Duration::from_secs(3)).await;
    player.set_paused(true);
    let frozen = player.position();
    assert!((3000..3100).contains(&frozen), "position was {frozen}");

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(player.position(), frozen);

    let state = player.state();
    assert!(state.paused);
    assert!(!state.playing);
    assert_eq!(state.position, Some(frozen));
}

#[tokio::test(start_paused = true)]
async fn test_player_seek_without_track_returns_nothing_playing() {
    let h = harness("abc");
    let player = h.context.get_or_create_player(GuildId(1));

    assert!(matches!(
        player.seek(1000),
        Err(SessionError::NothingPlaying(GuildId(1)))
    ));

    player.play("track").unwrap();
    player.seek(42_000).unwrap();
    assert!(player.position() >= 42_000);
}

#[tokio::test(start_paused = true)]
async fn test_player_set_volume_clamps_to_max() {
    let h = harness("abc");
    let player = h.context.get_or_create_player(GuildId(1));
    assert_eq!(player.volume(), 100);

    player.set_volume(5000);
    assert_eq!(player.volume(), resona_session::MAX_VOLUME);
}

// =========================================================================
// Concurrency
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pause_racing_resume_never_fires_timeout_for_open_session() {
    let config = SessionConfig {
        resume_timeout_secs: 1,
        ..Default::default()
    };
    let harnesses: Vec<_> = (0..200)
        .map(|i| build(&format!("s{i}"), config.clone(), RecordingRegistry::default()))
        .collect();

    let mut tasks = Vec::new();
    for h in &harnesses {
        let barrier = Arc::new(Barrier::new(2));

        let context = Arc::clone(&h.context);
        let start = Arc::clone(&barrier);
        tasks.push(tokio::spawn(async move {
            start.wait().await;
            context.pause().unwrap();
        }));

        let context = Arc::clone(&h.context);
        let start = Arc::clone(&barrier);
        tasks.push(tokio::spawn(async move {
            let fresh = RecordingConnection::new(2);
            start.wait().await;
            loop {
                match context.resume(fresh.clone()) {
                    Ok(()) => break,
                    Err(SessionError::InvalidState { .. }) => tokio::task::yield_now().await,
                    Err(e) => panic!("unexpected resume error: {e}"),
                }
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(1500)).await;

    for h in &harnesses {
        assert_eq!(h.context.state(), SessionState::Open);
        assert_eq!(
            h.registry.timeouts(),
            0,
            "{} is open but its resume deadline fired",
            h.context.session_id()
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sends_racing_resume_arrive_once_in_order() {
    const PRODUCERS: u64 = 4;
    const FRAMES: u64 = 250;

    let h = harness("abc");
    h.context.pause().unwrap();
    let fresh = RecordingConnection::new(2);
    let barrier = Arc::new(Barrier::new(PRODUCERS as usize + 1));

    let mut tasks = Vec::new();
    for producer in 0..PRODUCERS {
        let context = Arc::clone(&h.context);
        let barrier = Arc::clone(&barrier);
        tasks.push(tokio::spawn(async move {
            barrier.wait().await;
            for seq in 0..FRAMES {
                context.send_json(&json!({ "op": "event", "producer": producer, "seq": seq }));
                if seq % 16 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }
    let context = Arc::clone(&h.context);
    let transport = fresh.clone();
    let start = Arc::clone(&barrier);
    tasks.push(tokio::spawn(async move {
        start.wait().await;
        context.resume(transport).unwrap();
    }));
    for task in tasks {
        task.await.unwrap();
    }

    let frames = fresh.values();
    for producer in 0..PRODUCERS {
        let seqs: Vec<u64> = frames
            .iter()
            .filter(|v| v["producer"].as_u64() == Some(producer))
            .filter_map(|v| v["seq"].as_u64())
            .collect();
        assert_eq!(seqs, (0..FRAMES).collect::<Vec<_>>(), "producer {producer}");
    }
    assert_eq!(h.transport.ops(), ["hello"], "nothing reaches the old transport");
    assert_eq!(h.context.queued_frames(), 0);
    assert_eq!(fresh.ops().iter().filter(|op| *op == "resume").count(), 1);
}

// =========================================================================
// Destroy
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_destroy_twice_is_idempotent() {
    let h = harness("abc");
    h.context.get_or_create_player(GuildId(1));
    h.context.get_or_create_player(GuildId(2));
    tokio::time::sleep(Duration::from_millis(10)).await;

    h.context.destroy().await;
    h.context.destroy().await;

    assert_eq!(h.context.state(), SessionState::Destroyed);
    assert_eq!(h.handler.count("destroyed"), 1);
    assert_eq!(h.handler.count("destroy_player"), 2);
    assert_eq!(h.voice.destroyed().len(), 2);
    assert!(h.voice.closed.load(std::sync::atomic::Ordering::SeqCst));
    assert!(h.context.players().is_empty());

    let ticks = h.registry.stats_ticks();
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(h.registry.stats_ticks(), ticks, "stats tick must be stopped");
}

#[tokio::test(start_paused = true)]
async fn test_destroy_while_paused_cancels_resume_deadline() {
    let h = harness("abc");
    h.context.pause().unwrap();
    h.context.destroy().await;

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.registry.timeouts(), 0);
    assert!(matches!(
        h.context.resume(RecordingConnection::new(2)),
        Err(SessionError::InvalidState { state: SessionState::Destroyed, .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_pause_after_destroy_returns_invalid_state() {
    let h = harness("abc");
    h.context.destroy().await;
    assert!(matches!(
        h.context.pause(),
        Err(SessionError::InvalidState { state: SessionState::Destroyed, .. })
    ));
}

// =========================================================================
// Inbound
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_handle_inbound_configure_resuming_sets_flag_and_timeout() {
    let h = build(
        "abc",
        SessionConfig::default(),
        RecordingRegistry::default(),
    );
    assert!(!h.context.is_resuming());

    h.context.handle_inbound(Inbound::ConfigureResuming {
        resuming: true,
        timeout: Some(300),
    });
    assert!(h.context.is_resuming());
    assert_eq!(h.context.resume_timeout(), Duration::from_secs(300));

    h.context.handle_inbound(Inbound::ConfigureResuming {
        resuming: false,
        timeout: None,
    });
    assert!(!h.context.is_resuming());
    assert_eq!(h.context.resume_timeout(), Duration::from_secs(300));
}

#[tokio::test(start_paused = true)]
async fn test_config_resuming_default_is_carried_into_context() {
    let h = build(
        "abc",
        SessionConfig {
            resuming: true,
            resume_timeout_secs: 15,
            ..Default::default()
        },
        RecordingRegistry::default(),
    );
    assert!(h.context.is_resuming());
    assert_eq!(h.context.resume_timeout(), Duration::from_secs(15));
}
