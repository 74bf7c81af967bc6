//! Local controls and stream replacement tests.
//!
//! Mic and deafen toggles, noise suppression and screen share replacements
//! (with re-calls to every linked peer), and routing of remote screen shares.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]

use common::types::MeshId;
use signaling_protocol::ServerEvent;
use voice_client::errors::{ClientError, MediaError};
use voice_client::mesh::{MeshEvent, MeshState};
use voice_test_utils::fixtures::{self, VOICE_LOUNGE};
use voice_test_utils::{eventually, FakeMeshNetwork, RemotePeer, SurfaceCall, TestMesh};

fn p(id: &str) -> MeshId {
    MeshId::from(id)
}

/// Y (`p2`) in voice-lounge, linked to a scripted X (`p1`).
async fn linked_pair(network: &FakeMeshNetwork) -> (TestMesh, RemotePeer) {
    let x = RemotePeer::spawn(network, "p1", fixtures::voice_stream()).await;
    let mesh = TestMesh::spawn(network, "p2", fixtures::settings("Y"));
    mesh.handle.join_room(fixtures::voice_lounge()).await.unwrap();
    mesh.snapshot(fixtures::snapshot(VOICE_LOUNGE, &[("p1", "X"), ("p2", "Y")]))
        .await;

    let surface = &*mesh.surface;
    eventually(move || async move { surface.voice_stream(&MeshId::from("p1")).is_some() }).await;
    let remote = &x;
    eventually(move || async move { remote.latest_from(&MeshId::from("p2")).is_some() }).await;
    (mesh, x)
}

// --- Mic and deafen ---

#[tokio::test]
async fn test_toggle_mic_disables_track_and_reports() {
    let network = FakeMeshNetwork::new();
    let mesh = TestMesh::spawn(&network, "p1", fixtures::settings("X"));
    mesh.handle.join_room(fixtures::voice_lounge()).await.unwrap();
    mesh.signal.take();

    assert!(mesh.handle.toggle_mic().await.unwrap());
    let track = mesh.devices.mic_streams()[0].audio_tracks().next().cloned().unwrap();
    assert!(!track.is_enabled());
    assert!(track.is_live());

    assert!(!mesh.handle.toggle_mic().await.unwrap());
    assert!(track.is_enabled());

    assert_eq!(
        mesh.signal.emitted(),
        vec![
            fixtures::toggle_mute(VOICE_LOUNGE, true),
            fixtures::toggle_mute(VOICE_LOUNGE, false),
        ]
    );
}

#[tokio::test]
async fn test_controls_outside_voice_are_invalid_state() {
    let network = FakeMeshNetwork::new();
    let mesh = TestMesh::spawn(&network, "p1", fixtures::settings("X"));

    for result in [
        mesh.handle.toggle_mic().await,
        mesh.handle.toggle_deafen().await,
        mesh.handle.toggle_noise_suppression().await,
        mesh.handle.toggle_screen_share().await,
    ] {
        assert!(matches!(result, Err(ClientError::InvalidState(_))));
    }
    assert!(mesh.signal.emitted().is_empty());
}

/// Deafening with a live mic also mutes it; un-deafening leaves it muted.
#[tokio::test]
async fn test_deafen_cascades_to_mute() {
    let network = FakeMeshNetwork::new();
    let (mesh, _x) = linked_pair(&network).await;
    mesh.signal.take();

    assert!(mesh.handle.toggle_deafen().await.unwrap());

    assert_eq!(
        mesh.signal.take(),
        vec![
            fixtures::toggle_deafen(VOICE_LOUNGE, true),
            fixtures::toggle_mute(VOICE_LOUNGE, true),
        ]
    );
    assert_eq!(mesh.surface.voice_muted(&p("p1")), Some(true));
    assert!(mesh.surface.screen_muted());
    let status = mesh.status().await;
    assert!(status.deafened);
    assert!(status.mic_muted);

    assert!(!mesh.handle.toggle_deafen().await.unwrap());

    assert_eq!(
        mesh.signal.take(),
        vec![fixtures::toggle_deafen(VOICE_LOUNGE, false)]
    );
    assert_eq!(mesh.surface.voice_muted(&p("p1")), Some(false));
    let status = mesh.status().await;
    assert!(!status.deafened);
    assert!(status.mic_muted);
}

#[tokio::test]
async fn test_deafen_with_muted_mic_sends_no_mute() {
    let network = FakeMeshNetwork::new();
    let mesh = TestMesh::spawn(&network, "p1", fixtures::settings("X"));
    mesh.handle.join_room(fixtures::voice_lounge()).await.unwrap();
    mesh.handle.toggle_mic().await.unwrap();
    mesh.signal.take();

    mesh.handle.toggle_deafen().await.unwrap();

    assert_eq!(mesh.signal.names(), vec!["toggle-deafen"]);
}

#[tokio::test]
async fn test_new_sinks_join_deafened() {
    let network = FakeMeshNetwork::new();
    let (mesh, _x) = linked_pair(&network).await;
    mesh.handle.toggle_deafen().await.unwrap();

    let z = RemotePeer::spawn(&network, "p3", fixtures::voice_stream()).await;
    z.call(&p("p2")).await;

    let surface = &*mesh.surface;
    eventually(move || async move { surface.voice_muted(&MeshId::from("p3")).is_some() }).await;
    assert_eq!(mesh.surface.voice_muted(&p("p3")), Some(true));
}

#[tokio::test]
async fn test_controls_reset_on_rejoin() {
    let network = FakeMeshNetwork::new();
    let mesh = TestMesh::spawn(&network, "p1", fixtures::settings("X"));
    mesh.handle.join_room(fixtures::voice_lounge()).await.unwrap();
    mesh.handle.toggle_deafen().await.unwrap();
    mesh.handle.leave_room().await.unwrap();

    mesh.handle.join_room(fixtures::voice_lounge()).await.unwrap();

    let status = mesh.status().await;
    assert!(!status.deafened);
    assert!(!status.mic_muted);
    let track = mesh.devices.mic_streams()[1].audio_tracks().next().cloned().unwrap();
    assert!(track.is_enabled());
}

// --- Noise suppression ---

/// The replacement stops the old mic first, then re-calls every linked
/// peer; the peer's voice sink switches to the new stream.
#[tokio::test]
async fn test_noise_suppression_toggle_recalls_peers() {
    let network = FakeMeshNetwork::new();
    let (mesh, x) = linked_pair(&network).await;
    let first = mesh.devices.mic_streams()[0].clone();

    assert!(!mesh.handle.toggle_noise_suppression().await.unwrap());

    let requests = mesh.devices.mic_requests();
    assert_eq!(requests.len(), 2);
    assert!(!requests[1].noise_suppression);
    assert!(requests[1].echo_cancellation);
    assert!(!first.is_live());
    assert_eq!(mesh.devices.live_mic_tracks(), 1);

    let second = mesh.devices.mic_streams()[1].clone();
    let remote = &x;
    let expected = second.id();
    eventually(move || async move {
        remote.latest_from(&MeshId::from("p2")).map(|s| s.id()) == Some(expected)
    })
    .await;

    assert_eq!(network.calls_between(&p("p2"), &p("p1")).len(), 2);
    let status = mesh.status().await;
    assert!(!status.noise_suppression);
    assert_eq!(status.links, 1);

    assert!(mesh.handle.toggle_noise_suppression().await.unwrap());
    assert!(mesh.devices.mic_requests()[2].noise_suppression);
}

#[tokio::test]
async fn test_noise_suppression_keeps_mute() {
    let network = FakeMeshNetwork::new();
    let mesh = TestMesh::spawn(&network, "p1", fixtures::settings("X"));
    mesh.handle.join_room(fixtures::voice_lounge()).await.unwrap();
    mesh.handle.toggle_mic().await.unwrap();

    mesh.handle.toggle_noise_suppression().await.unwrap();

    let track = mesh.devices.mic_streams()[1].audio_tracks().next().cloned().unwrap();
    assert!(!track.is_enabled());
    assert!(mesh.status().await.mic_muted);
}

#[tokio::test]
async fn test_noise_suppression_failure_leaves_session_silent() {
    let network = FakeMeshNetwork::new();
    let mesh = TestMesh::spawn(&network, "p1", fixtures::settings("X"));
    mesh.handle.join_room(fixtures::voice_lounge()).await.unwrap();
    mesh.devices
        .fail_next_mic(MediaError::DeviceUnavailable("unplugged".to_string()));

    let err = mesh.handle.toggle_noise_suppression().await.unwrap_err();

    assert!(matches!(err, ClientError::ReplaceFailed(_)));
    assert_eq!(mesh.devices.live_mic_tracks(), 0);
    let status = mesh.status().await;
    assert_eq!(status.state, MeshState::Active);
    assert!(status.voice_silent);
    // The previous policy stays in effect.
    assert!(status.noise_suppression);
}

/// Deafening while voice-silent still records the mute, so the recovered
/// stream does not go out live.
#[tokio::test]
async fn test_deafen_while_silent_keeps_recovered_mic_muted() {
    let network = FakeMeshNetwork::new();
    let mesh = TestMesh::spawn(&network, "p1", fixtures::settings("X"));
    mesh.handle.join_room(fixtures::voice_lounge()).await.unwrap();
    mesh.devices
        .fail_next_mic(MediaError::DeviceUnavailable("unplugged".to_string()));
    mesh.handle.toggle_noise_suppression().await.unwrap_err();
    assert!(mesh.status().await.voice_silent);
    mesh.signal.take();

    assert!(mesh.handle.toggle_deafen().await.unwrap());

    assert_eq!(
        mesh.signal.take(),
        vec![
            fixtures::toggle_deafen(VOICE_LOUNGE, true),
            fixtures::toggle_mute(VOICE_LOUNGE, true),
        ]
    );

    mesh.handle.toggle_noise_suppression().await.unwrap();

    let status = mesh.status().await;
    assert!(!status.voice_silent);
    assert!(status.deafened);
    assert!(status.mic_muted);
    let recovered = mesh.devices.mic_streams().last().cloned().unwrap();
    let track = recovered.audio_tracks().next().cloned().unwrap();
    assert!(track.is_live());
    assert!(!track.is_enabled());
}

#[tokio::test]
async fn test_concurrent_media_change_is_refused() {
    let network = FakeMeshNetwork::new();
    let mesh = TestMesh::spawn(&network, "p1", fixtures::settings("X"));
    mesh.handle.join_room(fixtures::voice_lounge()).await.unwrap();
    let gate = mesh.devices.hold_mic();

    let pending = {
        let handle = mesh.handle.clone();
        tokio::spawn(async move { handle.toggle_noise_suppression().await })
    };
    let devices = &*mesh.devices;
    eventually(move || async move { devices.mic_requests().len() == 2 }).await;

    let refused = mesh.handle.toggle_screen_share().await;
    assert!(matches!(refused, Err(ClientError::InvalidState(_))));

    gate.release();
    assert!(!pending.await.unwrap().unwrap());
}

#[tokio::test]
async fn test_leave_during_replacement_discards_stream() {
    let network = FakeMeshNetwork::new();
    let mesh = TestMesh::spawn(&network, "p1", fixtures::settings("X"));
    mesh.handle.join_room(fixtures::voice_lounge()).await.unwrap();
    let gate = mesh.devices.hold_mic();

    let pending = {
        let handle = mesh.handle.clone();
        tokio::spawn(async move { handle.toggle_noise_suppression().await })
    };
    let devices = &*mesh.devices;
    eventually(move || async move { devices.mic_requests().len() == 2 }).await;

    mesh.handle.leave_room().await.unwrap();
    assert!(matches!(
        pending.await.unwrap(),
        Err(ClientError::InvalidState(_))
    ));

    gate.release();
    eventually(move || async move { devices.mic_streams().len() == 2 }).await;
    eventually(move || async move { devices.live_mic_tracks() == 0 }).await;
}

// --- Screen share ---

#[tokio::test]
async fn test_screen_share_start_and_stop() {
    let network = FakeMeshNetwork::new();
    let (mesh, x) = linked_pair(&network).await;

    assert!(mesh.handle.toggle_screen_share().await.unwrap());

    // Picker first, then a fresh mic.
    assert_eq!(mesh.devices.display_requests(), 1);
    assert_eq!(mesh.devices.mic_requests().len(), 2);
    assert_eq!(mesh.devices.live_mic_tracks(), 1);
    assert_eq!(mesh.devices.live_display_tracks(), 1);
    let remote = &x;
    eventually(move || async move {
        remote
            .latest_from(&MeshId::from("p2"))
            .is_some_and(|s| s.has_video() && s.has_audio())
    })
    .await;
    assert!(mesh.status().await.screen_sharing);

    assert!(!mesh.handle.toggle_screen_share().await.unwrap());

    assert_eq!(mesh.devices.live_display_tracks(), 0);
    assert_eq!(mesh.devices.live_mic_tracks(), 1);
    eventually(move || async move {
        remote
            .latest_from(&MeshId::from("p2"))
            .is_some_and(|s| !s.has_video())
    })
    .await;
    let calls = network.calls_between(&p("p2"), &p("p1"));
    assert_eq!(calls.len(), 3);
    assert!(calls[1].has_video);
    assert!(!calls[2].has_video);
    assert!(!mesh.status().await.screen_sharing);
}

#[tokio::test]
async fn test_screen_share_uses_current_noise_suppression() {
    let network = FakeMeshNetwork::new();
    let mesh = TestMesh::spawn(&network, "p1", fixtures::settings("X"));
    mesh.handle.join_room(fixtures::voice_lounge()).await.unwrap();
    mesh.handle.toggle_noise_suppression().await.unwrap();

    mesh.handle.toggle_screen_share().await.unwrap();

    assert!(!mesh.devices.mic_requests()[2].noise_suppression);
}

#[tokio::test]
async fn test_cancelled_picker_keeps_current_stream() {
    let network = FakeMeshNetwork::new();
    let (mesh, _x) = linked_pair(&network).await;
    mesh.devices.fail_next_display(MediaError::Cancelled);

    let err = mesh.handle.toggle_screen_share().await.unwrap_err();

    assert_eq!(err, ClientError::ShareCancelled);
    assert_eq!(mesh.devices.mic_requests().len(), 1);
    assert_eq!(mesh.devices.live_mic_tracks(), 1);
    assert_eq!(network.calls_between(&p("p2"), &p("p1")).len(), 1);
    let status = mesh.status().await;
    assert!(!status.screen_sharing);
    assert!(!status.voice_silent);
}

#[tokio::test]
async fn test_mic_failure_after_picker_releases_display() {
    let network = FakeMeshNetwork::new();
    let mesh = TestMesh::spawn(&network, "p1", fixtures::settings("X"));
    mesh.handle.join_room(fixtures::voice_lounge()).await.unwrap();
    mesh.devices
        .fail_next_mic(MediaError::PermissionDenied("revoked".to_string()));

    let err = mesh.handle.toggle_screen_share().await.unwrap_err();

    assert!(matches!(err, ClientError::ReplaceFailed(_)));
    assert_eq!(mesh.devices.live_display_tracks(), 0);
    let status = mesh.status().await;
    assert!(!status.screen_sharing);
    assert!(status.voice_silent);
}

#[tokio::test]
async fn test_noise_suppression_refused_while_sharing() {
    let network = FakeMeshNetwork::new();
    let mesh = TestMesh::spawn(&network, "p1", fixtures::settings("X"));
    mesh.handle.join_room(fixtures::voice_lounge()).await.unwrap();
    mesh.handle.toggle_screen_share().await.unwrap();

    let err = mesh.handle.toggle_noise_suppression().await.unwrap_err();

    assert!(matches!(err, ClientError::InvalidState(_)));
    assert_eq!(mesh.devices.mic_requests().len(), 2);
    assert!(mesh.status().await.screen_sharing);
}

/// The user ends the share from the OS: the mic-only stream is restored
/// and re-sent without a toggle.
#[tokio::test]
async fn test_share_ended_outside_client_restores_mic() {
    let network = FakeMeshNetwork::new();
    let (mut mesh, x) = linked_pair(&network).await;
    mesh.handle.toggle_screen_share().await.unwrap();

    mesh.devices.end_display();

    mesh.wait_for(|e| e == &MeshEvent::LocalShareEnded).await;
    let status = mesh.status().await;
    assert!(!status.screen_sharing);
    assert!(!status.voice_silent);
    assert_eq!(mesh.devices.live_mic_tracks(), 1);
    let remote = &x;
    eventually(move || async move {
        remote
            .latest_from(&MeshId::from("p2"))
            .is_some_and(|s| !s.has_video())
    })
    .await;
}

// --- Remote screen shares ---

#[tokio::test]
async fn test_remote_screen_share_installs_and_clears_claim() {
    let network = FakeMeshNetwork::new();
    let (mut mesh, x) = linked_pair(&network).await;

    let share = fixtures::screen_stream();
    x.call_with(&p("p2"), share.clone()).await;

    let event = mesh
        .wait_for(|e| matches!(e, MeshEvent::ScreenShareStarted { .. }))
        .await;
    assert_eq!(
        event,
        MeshEvent::ScreenShareStarted {
            peer: p("p1"),
            display_name: Some("X".to_string()),
        }
    );
    assert_eq!(mesh.surface.screen(), Some((p("p1"), share.id())));
    assert_eq!(mesh.surface.voice_stream(&p("p1")), Some(share.id()));
    assert_eq!(mesh.status().await.screen_holder, Some(p("p1")));

    // Back to voice only.
    x.call_with(&p("p2"), fixtures::voice_stream()).await;

    mesh.wait_for(|e| e == &MeshEvent::ScreenShareEnded { peer: MeshId::from("p1") })
        .await;
    assert_eq!(mesh.surface.screen(), None);
    assert_eq!(mesh.status().await.screen_holder, None);
}

#[tokio::test]
async fn test_second_sharer_replaces_first() {
    let network = FakeMeshNetwork::new();
    let (mut mesh, x) = linked_pair(&network).await;
    let z = RemotePeer::spawn(&network, "p3", fixtures::voice_stream()).await;

    x.call_with(&p("p2"), fixtures::screen_stream()).await;
    mesh.wait_for(|e| matches!(e, MeshEvent::ScreenShareStarted { .. }))
        .await;
    mesh.surface.take();

    let share = fixtures::screen_stream();
    z.call_with(&p("p2"), share.clone()).await;

    mesh.wait_for(|e| e == &MeshEvent::ScreenShareEnded { peer: MeshId::from("p1") })
        .await;
    mesh.wait_for(|e| {
        matches!(e, MeshEvent::ScreenShareStarted { peer, .. } if peer.as_str() == "p3")
    })
    .await;

    let calls = mesh.surface.calls();
    let cleared = calls
        .iter()
        .position(|c| c == &SurfaceCall::ClearScreen { peer: p("p1") })
        .unwrap();
    let shown = calls
        .iter()
        .position(|c| matches!(c, SurfaceCall::ShowScreen { peer, .. } if peer.as_str() == "p3"))
        .unwrap();
    assert!(cleared < shown);
    assert_eq!(mesh.surface.screen(), Some((p("p3"), share.id())));
}

#[tokio::test]
async fn test_sharer_leaving_clears_screen() {
    let network = FakeMeshNetwork::new();
    let (mut mesh, x) = linked_pair(&network).await;
    x.call_with(&p("p2"), fixtures::screen_stream()).await;
    mesh.wait_for(|e| matches!(e, MeshEvent::ScreenShareStarted { .. }))
        .await;

    mesh.relay(ServerEvent::PeerLeft(p("p1"))).await;

    mesh.wait_for(|e| e == &MeshEvent::ScreenShareEnded { peer: MeshId::from("p1") })
        .await;
    assert_eq!(mesh.surface.screen(), None);
    assert_eq!(mesh.surface.voice_count(), 0);
}
