//! End-to-end tests for the live view: both channels against local fakes.

mod support;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use guardcar_live::config::{LiveConfig, MediaConfig};
use guardcar_live::{
    CameraMode, ConnectionState, EventOutcome, LiveError, LiveView, SseEvent, ViewSnapshot, ViewUpdate,
};
use serde_json::json;
use support::{eventually, png, spawn_frame_server};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn backend(sse_body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sse/stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse_body),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/videos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            "2024-05-01.mp4",
            "2024-05-03.mp4",
            "2024-05-02.mp4"
        ])))
        .mount(&server)
        .await;
    server
}

fn config(frame_url: &str, backend: &MockServer) -> LiveConfig {
    let mut config = LiveConfig::default();
    config.frame.url = frame_url.to_owned();
    config.events.url = format!("{}/sse/stream", backend.uri());
    config.media = MediaConfig {
        url: Some(format!("{}/api/videos", backend.uri())),
        limit: 2,
        ..MediaConfig::default()
    };
    config
}

#[tokio::test]
async fn test_mount_merges_both_channels_into_one_snapshot() {
    let mut frames = spawn_frame_server().await;
    let backend = backend(concat!(
        "event: hello\ndata: {}\n\n",
        "event: suspicion\ndata: {\"suspicion_score\": 61.239}\n\n",
        "event: recording\ndata: {\"recording\": true}\n\n",
    ))
    .await;

    let mut view = LiveView::new(config(&frames.url, &backend)).unwrap();
    view.mount();
    assert_eq!(frames.next_command().await, r#"{"camera":0}"#);

    frames.send_frame(png(6, 4, [10, 20, 30, 255]));
    eventually("frame and telemetry merged", || {
        let snap = view.snapshot();
        snap.frame.is_some() && snap.telemetry.recording
    })
    .await;

    let snap = view.snapshot();
    assert_eq!(snap.telemetry.anomaly_score, 61.24);
    assert_eq!(snap.frame.as_ref().map(|f| (f.width(), f.height())), Some((6, 4)));
    assert_eq!(snap.mode, CameraMode::Primary);

    // The event stream ending does not touch the frame channel.
    eventually("event stream closed", || view.event_state() == ConnectionState::Closed).await;
    assert_eq!(view.frame_state(), ConnectionState::Open);
    assert!(view.snapshot().frame.is_some());
}

#[tokio::test]
async fn test_request_mode_is_optimistic_and_forwarded() {
    let mut frames = spawn_frame_server().await;
    let backend = backend("").await;

    let mut view = LiveView::new(config(&frames.url, &backend)).unwrap();
    let mut updates = view.subscribe();
    view.mount();
    frames.next_command().await;
    eventually("frame channel open", || view.frame_state().is_open()).await;

    let change = view.request_mode("secondary").unwrap();
    assert!(change.command_sent);
    assert_eq!(view.snapshot().mode, CameraMode::Secondary);
    assert_eq!(frames.next_command().await, r#"{"camera":1}"#);
    assert_eq!(updates.recv().await.unwrap(), ViewUpdate::Mode(CameraMode::Secondary));

    assert!(matches!(view.request_mode(9_i64), Err(LiveError::InvalidMode(_))));
    assert_eq!(view.snapshot().mode, CameraMode::Secondary);
}

#[tokio::test]
async fn test_unmount_releases_frame_and_stops_both_channels() {
    let mut frames = spawn_frame_server().await;
    let backend = backend("event: suspicion\ndata: {\"suspicion_score\": 3}\n\n").await;

    let mut view = LiveView::new(config(&frames.url, &backend)).unwrap();
    view.mount();
    frames.next_command().await;
    frames.send_frame(png(2, 2, [0, 0, 0, 255]));
    eventually("frame installed", || view.snapshot().frame.is_some()).await;

    view.unmount();
    assert!(view.snapshot().frame.is_none());
    assert_eq!(view.frames().stats().live_handles(), 0);
    assert_eq!(view.frame_state(), ConnectionState::Closed);
    assert_eq!(view.event_state(), ConnectionState::Closed);

    frames.send_frame(png(3, 3, [0, 0, 0, 255]));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(view.snapshot().frame.is_none());
}

#[tokio::test]
async fn test_recent_media_uses_configured_limit() {
    let frames = spawn_frame_server().await;
    let backend = backend("").await;

    let view = LiveView::new(config(&frames.url, &backend)).unwrap();
    assert_eq!(
        view.recent_media_default().await.unwrap(),
        vec!["2024-05-03.mp4", "2024-05-02.mp4"]
    );
    assert_eq!(view.recent_media(10).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_supervisor_reopens_event_channel_after_stream_ends() {
    let frames = spawn_frame_server().await;
    let backend = backend("event: recording\ndata: {\"recording\": true}\n\n").await;

    let mut config = config(&frames.url, &backend);
    config.reconnect.enabled = true;
    config.reconnect.base_delay_ms = 20;
    config.reconnect.max_delay_ms = 50;
    config.reconnect.jitter = 0.0;

    let mut view = LiveView::new(config).unwrap();
    view.mount();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let streams = backend
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == "/sse/stream")
            .count();
        if streams >= 2 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "event stream was not reopened"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(view.snapshot().telemetry.recording);
    view.unmount();
}

// ────────────────────────────────────────────────────────────────────────────
// Concurrent updates
// ────────────────────────────────────────────────────────────────────────────

const ROUNDS: u64 = 300;

fn frame_sequence(snap: &ViewSnapshot) -> Option<u64> {
    snap.frame.as_ref().map(|f| f.sequence())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_updates_are_neither_lost_nor_torn() {
    let view = LiveView::new(LiveConfig::default()).unwrap();
    let store = view.store().clone();
    let frames = Arc::clone(view.frames());
    let events = Arc::clone(view.events());
    let controller = view.controller().clone();
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let store = store.clone();
        let done = Arc::clone(&done);
        tokio::task::spawn_blocking(move || {
            let mut last = store.snapshot();
            while !done.load(Ordering::Acquire) {
                let snap = store.snapshot();
                assert!(snap.version >= last.version);
                assert!(snap.telemetry.anomaly_score >= last.telemetry.anomaly_score);
                assert!(frame_sequence(&snap) >= frame_sequence(&last));
                last = snap;
            }
        })
    };

    let frame_writer = {
        let frames = Arc::clone(&frames);
        tokio::task::spawn_blocking(move || {
            let payload = png(2, 2, [40, 80, 120, 255]);
            (0..ROUNDS).filter(|_| frames.on_frame(&payload)).count() as u64
        })
    };
    let telemetry_writer = {
        let events = Arc::clone(&events);
        tokio::task::spawn_blocking(move || {
            let mut applied = 0_u64;
            for i in 0..ROUNDS {
                let score = SseEvent::new("suspicion", format!("{{\"suspicion_score\": {}}}", i + 1));
                let recording =
                    SseEvent::new("recording", format!("{{\"recording\": {}}}", i % 2 == 0));
                for event in [score, recording] {
                    if events.on_event(&event) == EventOutcome::Applied {
                        applied += 1;
                    }
                }
            }
            applied
        })
    };
    let mode_writers: Vec<_> = [
        [CameraMode::Secondary, CameraMode::Combined],
        [CameraMode::Combined, CameraMode::Secondary],
    ]
    .into_iter()
    .map(|pair| {
        let controller = controller.clone();
        tokio::task::spawn_blocking(move || {
            let mut changed = 0_u64;
            for i in 0..ROUNDS as usize {
                if controller.request_mode(pair[i % 2]).unwrap().changed {
                    changed += 1;
                }
            }
            changed
        })
    })
    .collect();

    let installed = frame_writer.await.unwrap();
    let applied = telemetry_writer.await.unwrap();
    let mut mode_changes = 0;
    for writer in mode_writers {
        mode_changes += writer.await.unwrap();
    }
    done.store(true, Ordering::Release);
    reader.await.unwrap();

    assert_eq!(installed, ROUNDS);
    assert_eq!(applied, 2 * ROUNDS);

    let snap = store.snapshot();
    assert_eq!(snap.version, installed + applied + mode_changes);
    assert_eq!(frame_sequence(&snap), Some(ROUNDS));
    assert_eq!(snap.telemetry.anomaly_score, ROUNDS as f64);
    assert!(!snap.telemetry.recording, "last write was recording=false");
    assert_eq!(snap.mode, frames.mirrored_mode());
    drop(snap);

    let stats = frames.stats();
    assert_eq!(stats.decoded, ROUNDS);
    assert_eq!(stats.released, ROUNDS - 1);
    assert_eq!(stats.live_handles(), 1);
}
