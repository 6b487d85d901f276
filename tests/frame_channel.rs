//! Frame channel integration tests against a loopback WebSocket frame source.
//!
//! These cover the wire protocol end to end: the initial selection command,
//! binary frame delivery, mode commands on an open connection, ignored text
//! messages, server-initiated close and teardown.

mod support;

use guardcar_live::config::FrameConfig;
use guardcar_live::{CameraMode, ConnectionState, FrameChannel, ViewStore};
use support::{eventually, jpeg, png, spawn_frame_server, within};

fn frame_channel(url: &str, store: &ViewStore) -> FrameChannel {
    FrameChannel::new(
        FrameConfig {
            url: url.to_owned(),
            connect_timeout_ms: 2_000,
        },
        store.clone(),
    )
}

// ────────────────────────────────────────────────────────────────────────────
// Handshake and selection commands
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_open_sends_initial_primary_selection() {
    let mut server = spawn_frame_server().await;
    let store = ViewStore::new();
    let frames = frame_channel(&server.url, &store);

    frames.open();
    assert_eq!(server.next_command().await, r#"{"camera":0}"#);

    let mut state = frames.watch_state();
    within(state.wait_for(|s| *s == ConnectionState::Open))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_reopen_asserts_store_mode() {
    let mut server = spawn_frame_server().await;
    let store = ViewStore::with_mode(CameraMode::Secondary);
    let frames = frame_channel(&server.url, &store);

    frames.open();
    assert_eq!(server.next_command().await, r#"{"camera":1}"#);
}

#[tokio::test]
async fn test_set_mode_on_open_connection_sends_command() {
    let mut server = spawn_frame_server().await;
    let store = ViewStore::new();
    let frames = frame_channel(&server.url, &store);

    frames.open();
    server.next_command().await;
    eventually("frame channel open", || frames.state().is_open()).await;

    assert!(frames.set_mode(CameraMode::Combined));
    assert_eq!(server.next_command().await, r#"{"camera":2}"#);
    assert_eq!(frames.mirrored_mode(), CameraMode::Combined);
}

// ────────────────────────────────────────────────────────────────────────────
// Inbound frames
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_binary_frames_reach_store() {
    let mut server = spawn_frame_server().await;
    let store = ViewStore::new();
    let frames = frame_channel(&server.url, &store);

    frames.open();
    server.next_command().await;

    server.send_frame(png(4, 3, [255, 0, 0, 255]));
    eventually("png frame installed", || store.snapshot().frame.is_some()).await;
    let frame = store.snapshot().frame.unwrap();
    assert_eq!((frame.width(), frame.height()), (4, 3));
    assert_eq!(frame.pixels().get_pixel(0, 0).0, [255, 0, 0, 255]);

    server.send_frame(jpeg(8, 8));
    eventually("jpeg frame installed", || {
        store.snapshot().frame.is_some_and(|f| f.width() == 8)
    })
    .await;
    assert!(frames.last_frame_at().is_some());
}

#[tokio::test]
async fn test_garbage_frame_keeps_previous_and_text_is_ignored() {
    let mut server = spawn_frame_server().await;
    let store = ViewStore::new();
    let frames = frame_channel(&server.url, &store);

    frames.open();
    server.next_command().await;

    server.send_frame(png(2, 2, [0, 255, 0, 255]));
    eventually("first frame", || store.snapshot().frame.is_some()).await;

    server.send_text("hello");
    server.send_frame(vec![0xde, 0xad, 0xbe]);
    eventually("decode failure counted", || frames.stats().decode_failures == 1).await;

    assert_eq!(frames.state(), ConnectionState::Open);
    let frame = store.snapshot().frame.unwrap();
    assert_eq!(frame.sequence(), 1);
    assert_eq!(frame.width(), 2);
}

#[tokio::test]
async fn test_frame_burst_ends_on_latest_frame() {
    let mut server = spawn_frame_server().await;
    let store = ViewStore::new();
    let frames = frame_channel(&server.url, &store);

    frames.open();
    server.next_command().await;

    for width in 1..=20 {
        server.send_frame(png(width, 1, [0, 0, 0, 255]));
    }
    eventually("all frames accounted for", || {
        let stats = frames.stats();
        stats.received == 20 && stats.decoded + stats.superseded == 20
    })
    .await;

    assert_eq!(store.snapshot().frame.map(|f| f.width()), Some(20));
    let stats = frames.stats();
    assert_eq!(stats.live_handles(), 1);
    assert_eq!(stats.released, stats.decoded - 1);
}

// ────────────────────────────────────────────────────────────────────────────
// Teardown
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_server_close_transitions_to_closed() {
    let mut server = spawn_frame_server().await;
    let store = ViewStore::new();
    let frames = frame_channel(&server.url, &store);

    frames.open();
    server.next_command().await;
    eventually("open", || frames.state().is_open()).await;

    server.close();
    eventually("closed by server", || frames.state() == ConnectionState::Closed).await;
    assert!(!frames.set_mode(CameraMode::Secondary), "no transport after close");
}

#[tokio::test]
async fn test_close_releases_frame_and_blocks_later_frames() {
    let mut server = spawn_frame_server().await;
    let store = ViewStore::new();
    let frames = frame_channel(&server.url, &store);

    frames.open();
    server.next_command().await;
    server.send_frame(png(2, 2, [9, 9, 9, 255]));
    eventually("frame installed", || store.snapshot().frame.is_some()).await;

    frames.close();
    assert!(store.snapshot().frame.is_none());
    assert_eq!(frames.stats().live_handles(), 0);

    server.send_frame(png(2, 2, [1, 1, 1, 255]));
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(store.snapshot().frame.is_none());
    assert_eq!(frames.state(), ConnectionState::Closed);
}
