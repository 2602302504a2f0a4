#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Multiroom Group scenarios driven through real `Player`/`Group` objects
//! against mock devices (spec.md §4.7, §8 scenarios 4 and 6, P8/P9/P10).

mod support;

use std::sync::Arc;

use wiim_linkplay_core::profile::DeviceProfile;
use wiim_linkplay_core::{Group, Player, PlayerOptions, Role};

fn status_json(uuid: &str, group: &str, extra: serde_json::Value) -> String {
    let mut base = serde_json::json!({
        "uuid": uuid,
        "project": "WiiM_Pro_Plus",
        "firmware": "4.6.8020",
        "wmrm_version": "4.2",
        "group": group,
        "status": "play",
        "vol": 30,
        "mute": 0,
    });
    base.as_object_mut().unwrap().extend(extra.as_object().unwrap().clone());
    base.to_string()
}

#[tokio::test]
async fn create_group_issues_set_multiroom_master() {
    let mock = support::MockDevice::start().await;
    mock.set_response("getPlayerStatusEx", status_json("MASTER-1", "0", serde_json::json!({})))
        .await;
    let master = Arc::new(Player::new(mock.host(), mock.player_options()).unwrap());
    master.refresh(true).await.unwrap();

    let group = Group::create_group(master.clone()).await.unwrap();

    assert!(mock.commands_received().await.iter().any(|c| c == "setMultiroom:Master"));
    assert_eq!(group.master().status().await.role, Role::Master);

    mock.stop().await;
}

#[tokio::test]
async fn join_group_routes_slave_commands_to_master() {
    let master_mock = support::MockDevice::start().await;
    let slave_mock = support::MockDevice::start().await;
    master_mock
        .set_response("getPlayerStatusEx", status_json("MASTER-2", "0", serde_json::json!({})))
        .await;
    slave_mock
        .set_response("getPlayerStatusEx", status_json("SLAVE-2", "0", serde_json::json!({})))
        .await;

    let master = Arc::new(Player::new(master_mock.host(), master_mock.player_options()).unwrap());
    let slave = Arc::new(Player::new(slave_mock.host(), slave_mock.player_options()).unwrap());
    master.refresh(true).await.unwrap();
    slave.refresh(true).await.unwrap();

    let group = Group::join_group(slave.clone(), master.clone()).await.unwrap();
    assert_eq!(slave.status().await.role, Role::Slave);
    assert!(Arc::ptr_eq(&group.master(), &master));

    // spec.md §4.7 command routing: a slave's transport-bound commands are
    // issued against the master, not the slave, and the slave issues no
    // local optimistic patch for them.
    slave.play().await.unwrap();
    assert!(
        master_mock
            .commands_received()
            .await
            .iter()
            .any(|c| c == "setPlayerCmd:play"),
        "play() on a slave must route to the master's transport"
    );
    assert!(
        !slave_mock.commands_received().await.iter().any(|c| c == "setPlayerCmd:play"),
        "slave must not issue the transport-bound command itself"
    );

    master_mock.stop().await;
    slave_mock.stop().await;
}

#[tokio::test]
async fn leave_group_on_solo_player_is_idempotent_with_no_io() {
    let mock = support::MockDevice::start().await;
    let player = Arc::new(Player::new(mock.host(), mock.player_options()).unwrap());
    player.refresh(true).await.unwrap();
    assert_eq!(player.role().await, Role::Solo);

    Group::leave_group(player.clone()).await.unwrap();

    // P8: no multiroom command was ever issued for an already-solo player.
    assert!(!mock
        .commands_received()
        .await
        .iter()
        .any(|c| c.starts_with("multiroom:") || c.starts_with("setMultiroom:")));

    mock.stop().await;
}

#[tokio::test]
async fn leave_group_from_slave_issues_ungroup_and_unlinks() {
    let master_mock = support::MockDevice::start().await;
    let slave_mock = support::MockDevice::start().await;
    master_mock
        .set_response("getPlayerStatusEx", status_json("MASTER-3", "0", serde_json::json!({})))
        .await;
    slave_mock
        .set_response("getPlayerStatusEx", status_json("SLAVE-3", "0", serde_json::json!({})))
        .await;

    let master = Arc::new(Player::new(master_mock.host(), master_mock.player_options()).unwrap());
    let slave = Arc::new(Player::new(slave_mock.host(), slave_mock.player_options()).unwrap());
    master.refresh(true).await.unwrap();
    slave.refresh(true).await.unwrap();
    Group::join_group(slave.clone(), master.clone()).await.unwrap();
    assert_eq!(slave.role().await, Role::Slave);

    Group::leave_group(slave.clone()).await.unwrap();

    assert_eq!(slave.role().await, Role::Solo);
    assert!(slave_mock
        .commands_received()
        .await
        .iter()
        .any(|c| c == "multiroom:Ungroup"));

    master_mock.stop().await;
    slave_mock.stop().await;
}

#[tokio::test]
async fn role_is_not_derived_from_group_set() {
    // P5: Role is authoritative from the device's own group report, not
    // from local `Group` linkage. Creating a group optimistically patches
    // `Role::Master` locally, but a subsequent refresh against a device
    // that still reports no slaves must fall back to `Role::Solo` rather
    // than trusting the Player's own `linked_group` state.
    let mock = support::MockDevice::start().await;
    mock.set_response("getPlayerStatusEx", status_json("LONE-1", "0", serde_json::json!({})))
        .await;
    mock.set_response("getStatusEx", status_json("LONE-1", "0", serde_json::json!({})))
        .await;
    mock.set_response("multiroom:getSlaveList", "{\"slaves\":[]}".to_string()).await;

    let master = Arc::new(Player::new(mock.host(), mock.player_options()).unwrap());
    master.refresh(true).await.unwrap();
    assert_eq!(master.status().await.role, Role::Solo);

    let _group = Group::create_group(master.clone()).await.unwrap();
    assert_eq!(master.status().await.role, Role::Master);

    // Device was never actually told about any slaves joining, so a full
    // refresh must re-derive Solo from its own group info, not keep the
    // optimistic patch just because `master` is still linked to a Group.
    master.refresh(true).await.unwrap();
    assert_eq!(master.status().await.role, Role::Solo);

    mock.stop().await;
}

#[tokio::test]
async fn join_group_rejects_incompatible_wmrm_major_before_any_io() {
    // P10: a Gen1 Audio Pro (wmrm major 2) and a WiiM (wmrm major 4) must
    // never be grouped, and the rejection must happen before any command
    // is sent to either device.
    let master_mock = support::MockDevice::start().await;
    let slave_mock = support::MockDevice::start().await;
    master_mock
        .set_response(
            "getPlayerStatusEx",
            status_json("MASTER-4", "0", serde_json::json!({"wmrm_version": "4.2"})),
        )
        .await;
    slave_mock
        .set_response(
            "getPlayerStatusEx",
            status_json("SLAVE-4", "0", serde_json::json!({"wmrm_version": "2.0", "project": "Audio Pro A10"})),
        )
        .await;

    let master = Arc::new(
        Player::new(
            master_mock.host(),
            PlayerOptions {
                profile: Some(DeviceProfile::wiim()),
                ..master_mock.player_options()
            },
        )
        .unwrap(),
    );
    let slave = Arc::new(
        Player::new(
            slave_mock.host(),
            PlayerOptions {
                profile: Some(DeviceProfile::audio_pro_original()),
                ..slave_mock.player_options()
            },
        )
        .unwrap(),
    );
    master.refresh(true).await.unwrap();
    slave.refresh(true).await.unwrap();

    let result = Group::join_group(slave.clone(), master.clone()).await;
    assert!(result.is_err());
    assert!(!master_mock
        .commands_received()
        .await
        .iter()
        .any(|c| c == "setMultiroom:Master"));
    assert!(!slave_mock.commands_received().await.iter().any(|c| c.starts_with("ConnectMasterAp")));

    master_mock.stop().await;
    slave_mock.stop().await;
}
