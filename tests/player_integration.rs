#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! End-to-end scenarios driven through a real `Player` against a mock
//! HTTP device, covering spec.md §8 scenarios 1 and 4 plus the refresh/
//! command pipeline those unit tests can't exercise on their own.

mod support;

use wiim_linkplay_core::{Error, PlayState, Player, Role};

#[tokio::test]
async fn full_refresh_populates_status_from_device() {
    let mock = support::MockDevice::start().await;
    mock.set_response(
        "getPlayerStatusEx",
        serde_json::json!({
            "uuid": "DEV-1",
            "project": "WiiM_Pro_Plus",
            "firmware": "4.6.8020",
            "wmrm_version": "4.2",
            "group": "0",
            "status": "play",
            "vol": 42,
            "mute": 0,
            "Title": "",
            "curpos": 10_000,
            "totlen": 200_000,
            "loop": 0,
        })
        .to_string(),
    )
    .await;

    let player = Player::new(mock.host(), mock.player_options()).unwrap();
    player.refresh(true).await.unwrap();

    let status = player.status().await;
    assert_eq!(status.play_state, PlayState::Play);
    assert_eq!(status.volume, 42);
    assert_eq!(status.role, Role::Solo);

    mock.stop().await;
}

#[tokio::test]
async fn scenario_one_stop_normalizes_to_pause_end_to_end() {
    let mock = support::MockDevice::start().await;
    mock.set_response(
        "getPlayerStatusEx",
        serde_json::json!({"uuid": "DEV-2", "project": "WiiM", "status": "stopped", "group": "0"}).to_string(),
    )
    .await;

    let player = Player::new(mock.host(), mock.player_options()).unwrap();
    player.refresh(true).await.unwrap();

    assert_eq!(player.status().await.play_state, PlayState::Pause);
    mock.stop().await;
}

#[tokio::test]
async fn play_command_issues_expected_http_call_and_patches_optimistically() {
    let mock = support::MockDevice::start().await;
    let player = Player::new(mock.host(), mock.player_options()).unwrap();
    player.refresh(true).await.unwrap();

    player.play().await.unwrap();

    assert_eq!(player.status().await.play_state, PlayState::Play);
    let commands = mock.commands_received().await;
    assert!(commands.iter().any(|c| c == "setPlayerCmd:play"));

    mock.stop().await;
}

#[tokio::test]
async fn set_volume_clamps_and_issues_vol_command() {
    let mock = support::MockDevice::start().await;
    let player = Player::new(mock.host(), mock.player_options()).unwrap();
    player.refresh(true).await.unwrap();

    player.set_volume(150).await.unwrap();

    assert_eq!(player.status().await.volume, 100);
    let commands = mock.commands_received().await;
    assert!(commands.iter().any(|c| c == "setPlayerCmd:vol:100"));

    mock.stop().await;
}

#[tokio::test]
async fn tunein_source_disables_shuffle_and_repeat_end_to_end() {
    // spec.md §4.6: shuffle/repeat are blacklisted for TuneIn (among other
    // internet-radio sources). `mode=36` is the raw device code that
    // `parser::mode_to_source` maps to `"tunein"` — drive it through a real
    // `Player::refresh` (not a hand-set `PlayerStatus`) so the blacklist is
    // proven to actually engage from real device data, not just from a
    // status struct built by hand.
    let mock = support::MockDevice::start().await;
    mock.set_response(
        "getPlayerStatusEx",
        serde_json::json!({
            "uuid": "DEV-3",
            "project": "WiiM_Pro_Plus",
            "firmware": "4.6.8020",
            "wmrm_version": "4.2",
            "group": "0",
            "status": "play",
            "vol": 20,
            "mute": 0,
            "mode": "36",
            "curpos": 0,
            "totlen": 0,
            "loop": 2,
        })
        .to_string(),
    )
    .await;

    let player = Player::new(mock.host(), mock.player_options()).unwrap();
    player.refresh(true).await.unwrap();

    assert_eq!(player.status().await.source.as_deref(), Some("tunein"));
    assert_eq!(player.shuffle().await, None);
    assert_eq!(player.repeat().await, None);

    let err = player.set_shuffle(true).await.unwrap_err();
    assert!(matches!(err, Error::UnsupportedOperation { .. }));

    let commands = mock.commands_received().await;
    assert!(!commands.iter().any(|c| c.starts_with("setPlayerCmd:loopmode")));

    mock.stop().await;
}

#[tokio::test]
async fn reprobe_forces_endpoint_reprobe_on_next_call() {
    // spec.md §4.2: reprobe clears the cached (protocol, port) so a later
    // call re-runs the probe instead of reusing a stale cache entry.
    let mock = support::MockDevice::start().await;
    let player = Player::new(mock.host(), mock.player_options()).unwrap();
    player.refresh(true).await.unwrap();
    player.reprobe().await;
    // A second refresh still succeeds: the probe just re-runs against the
    // same mock and finds the same working endpoint again.
    player.refresh(true).await.unwrap();
    assert_eq!(player.status().await.role, Role::Solo);

    mock.stop().await;
}
