mod common;

use common::{Fixture, key};
use concord_storage::{IdentityStore, ParticipantRole};
use concord_sync::snapshot::{ADMIN_SETTINGS_FIELD, BROADCAST_SETTINGS_FIELD};
use concord_sync::{ChangeOrigin, CheckOutcome, SyncError};
use concord_types::ParticipantId;
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn only_administrators_may_stage() {
    let fx = Fixture::new();
    let moderator = fx.add_participant("Mod", ParticipantRole::Moderator);

    let err = fx
        .staging()
        .stage(moderator.id, fx.player.id, &json!({"mod-a": {"volume": 60}}))
        .unwrap_err();
    assert!(matches!(err, SyncError::NotAdministrator(_)));
    assert_eq!(fx.record(ADMIN_SETTINGS_FIELD), None);
}

#[test]
fn unknown_target_is_an_error() {
    let fx = Fixture::new();
    let err = fx
        .staging()
        .stage(fx.admin.id, ParticipantId::new(), &json!({"mod-a": {"volume": 60}}))
        .unwrap_err();
    assert!(matches!(err, SyncError::UnknownParticipant(_)));
}

#[test]
fn values_matching_the_target_are_not_staged() {
    let fx = Fixture::new();
    let delta = fx
        .staging()
        .stage(
            fx.admin.id,
            fx.player.id,
            &json!({"mod-a": {"volume": 50, "theme": "dark"}}),
        )
        .unwrap();

    assert_eq!(delta.settings().len(), 1);
    assert_eq!(delta.settings().get(&key("mod-a.theme")), Some(&json!("dark")));
    assert_eq!(
        fx.record(ADMIN_SETTINGS_FIELD).as_deref(),
        Some(r#"{"mod-a":{"theme":"dark"}}"#)
    );
}

#[test]
fn comparison_uses_the_target_snapshot() {
    let fx = Fixture::new();
    fx.set_live("mod-a.volume", json!(75));
    fx.engine.save_settings(fx.player.id).unwrap();
    let staging = fx.staging();

    let delta = staging
        .stage(fx.admin.id, fx.player.id, &json!({"mod-a": {"volume": 75}}))
        .unwrap();
    assert!(delta.is_empty());
    assert_eq!(fx.record(ADMIN_SETTINGS_FIELD), None);

    let delta = staging
        .stage(fx.admin.id, fx.player.id, &json!({"mod-a": {"volume": 50}}))
        .unwrap();
    assert_eq!(delta.settings().get(&key("mod-a.volume")), Some(&json!(50)));
}

#[test]
fn staging_is_cumulative_and_can_be_withdrawn() {
    let fx = Fixture::new();
    let staging = fx.staging();

    staging
        .stage(fx.admin.id, fx.player.id, &json!({"mod-a": {"theme": "dark"}}))
        .unwrap();
    let delta = staging
        .stage(fx.admin.id, fx.player.id, &json!({"mod-a": {"volume": 60}}))
        .unwrap();
    assert_eq!(
        delta.settings().expand(),
        json!({"mod-a": {"theme": "dark", "volume": 60}})
    );

    let delta = staging
        .stage(fx.admin.id, fx.player.id, &json!({"mod-a": {"theme": "light"}}))
        .unwrap();
    assert_eq!(delta.settings().expand(), json!({"mod-a": {"volume": 60}}));
}

#[test]
fn restricted_settings_only_reach_privileged_targets() {
    let fx = Fixture::new();
    let moderator = fx.add_participant("Mod", ParticipantRole::Moderator);
    let proposed = json!({
        "mod-b": {"admin-only": true, "speed": 20},
        "mod-a": {"world": 3}
    });
    let staging = fx.staging();

    let member_delta = staging.stage(fx.admin.id, fx.player.id, &proposed).unwrap();
    assert_eq!(member_delta.settings().expand(), json!({"mod-b": {"speed": 20}}));

    let moderator_delta = staging.stage(fx.admin.id, moderator.id, &proposed).unwrap();
    assert_eq!(
        moderator_delta.settings().expand(),
        json!({"mod-b": {"admin-only": true, "speed": 20}})
    );
}

#[test]
fn broadcast_reports_per_target() {
    let fx = Fixture::new();
    let moderator = fx.add_participant("Mod", ParticipantRole::Moderator);
    let missing = ParticipantId::new();

    let report = fx
        .staging()
        .stage_broadcast(
            fx.admin.id,
            &[fx.player.id, moderator.id, missing],
            &json!({"mod-a": {"volume": 60}}),
        )
        .unwrap();

    assert_eq!(report.staged, vec![(fx.player.id, 1), (moderator.id, 1)]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, missing);
    assert!(!report.is_complete());

    assert_eq!(
        fx.record(BROADCAST_SETTINGS_FIELD).as_deref(),
        Some(r#"{"mod-a":{"volume":60}}"#)
    );
    assert_eq!(fx.record(ADMIN_SETTINGS_FIELD), None);
    assert!(
        fx.identity
            .get_attached_record(moderator.id, &fx.config.namespace, BROADCAST_SETTINGS_FIELD)
            .unwrap()
            .is_some()
    );
}

#[test]
fn broadcast_requires_an_administrator() {
    let fx = Fixture::new();
    let err = fx
        .staging()
        .stage_broadcast(fx.player.id, &[fx.admin.id], &json!({"mod-a": {"volume": 60}}))
        .unwrap_err();
    assert!(matches!(err, SyncError::NotAdministrator(_)));
}

#[test]
fn broadcast_is_offered_on_the_next_pass() {
    let fx = Fixture::new();
    fx.engine.save_settings(fx.player.id).unwrap();
    fx.staging()
        .stage_broadcast(fx.admin.id, &[fx.player.id], &json!({"mod-b": {"speed": 20}}))
        .unwrap();

    let CheckOutcome::Prompt(set) = fx.engine.check(fx.player.id).unwrap() else {
        panic!("expected a prompt");
    };
    let change = set.record(&key("mod-b.speed")).unwrap();
    assert_eq!(change.origin, ChangeOrigin::Administrator);
    assert_eq!(change.new_value, Some(json!(20)));
}

#[test]
fn view_shows_defaults_and_proposals() {
    let fx = Fixture::new();
    let staging = fx.staging();
    staging
        .stage(fx.admin.id, fx.player.id, &json!({"mod-a": {"volume": 60}}))
        .unwrap();

    let view = staging.view(fx.player.id).unwrap();
    assert_eq!(view.participant, fx.player.id);
    assert!(!view.has_saved);

    let volume = view.entry(&key("mod-a.volume")).unwrap();
    assert_eq!(volume.original, json!(50));
    assert_eq!(volume.proposed, Some(json!(60)));

    let theme = view.entry(&key("mod-a.theme")).unwrap();
    assert_eq!(theme.label, "Theme");
    assert_eq!(theme.original, json!("light"));
    assert_eq!(theme.proposed, None);

    assert!(view.entry(&key("mod-a.secret")).is_none());
    assert!(view.entry(&key("concord.sync-settings")).is_none());
}

#[test]
fn view_reflects_the_saved_snapshot() {
    let fx = Fixture::new();
    fx.set_live("mod-a.theme", json!("dark"));
    fx.engine.save_settings(fx.player.id).unwrap();

    let view = fx.staging().view(fx.player.id).unwrap();
    assert!(view.has_saved);
    assert_eq!(
        view.entry(&key("mod-a.theme")).unwrap().original,
        json!("dark")
    );
}
