mod common;

use common::{Fixture, flat, key};
use concord_sync::{ArbitrationDecision, ArbitrationFlow, DifferenceSet, FlatSettingMap, Resolution};
use serde_json::json;

fn two_changes(fx: &Fixture) -> DifferenceSet {
    fx.engine.differ().diff(
        &flat(json!({"mod-a": {"volume": 75, "theme": "dark"}})),
        &FlatSettingMap::new(),
    )
}

#[test]
fn every_record_starts_as_use_new() {
    let fx = Fixture::new();
    let mut set = two_changes(&fx);
    for change in set.records_mut() {
        change.resolution = Resolution::UseOld;
    }

    let flow = ArbitrationFlow::new(set);
    assert!(
        flow.differences()
            .records()
            .all(|c| c.resolution == Resolution::UseNew)
    );
}

#[test]
fn choosing_the_active_resolution_again_reverts_to_none() {
    let fx = Fixture::new();
    let mut flow = ArbitrationFlow::new(two_changes(&fx));
    let volume = key("mod-a.volume");

    assert_eq!(flow.choose(&volume, Resolution::UseNew), Some(Resolution::None));
    assert_eq!(flow.choose(&volume, Resolution::UseOld), Some(Resolution::UseOld));
    assert_eq!(flow.choose(&volume, Resolution::UseOld), Some(Resolution::None));
    assert_eq!(flow.choose(&volume, Resolution::UseNew), Some(Resolution::UseNew));
    assert_eq!(flow.resolution(&volume), Some(Resolution::UseNew));
    assert_eq!(flow.resolution(&key("mod-a.theme")), Some(Resolution::UseNew));
}

#[test]
fn choosing_an_unknown_key_changes_nothing() {
    let fx = Fixture::new();
    let mut flow = ArbitrationFlow::new(two_changes(&fx));
    assert_eq!(flow.choose(&key("mod-b.speed"), Resolution::UseOld), None);
    assert_eq!(flow.resolution(&key("mod-b.speed")), None);
}

#[test]
fn choose_all_sets_every_record() {
    let fx = Fixture::new();
    let mut flow = ArbitrationFlow::new(two_changes(&fx));
    flow.choose_all(Resolution::UseOld);
    flow.choose_all(Resolution::UseOld);
    assert!(
        flow.differences()
            .records()
            .all(|c| c.resolution == Resolution::UseOld)
    );
}

#[test]
fn confirm_carries_resolutions() {
    let fx = Fixture::new();
    let mut flow = ArbitrationFlow::new(two_changes(&fx));
    flow.choose(&key("mod-a.theme"), Resolution::UseOld);

    let ArbitrationDecision::Confirm(set) = flow.confirm() else {
        panic!("expected a confirmation");
    };
    assert_eq!(set.record(&key("mod-a.theme")).unwrap().resolution, Resolution::UseOld);
    assert_eq!(set.record(&key("mod-a.volume")).unwrap().resolution, Resolution::UseNew);
}

#[test]
fn dismissal_variants() {
    let fx = Fixture::new();
    assert_eq!(
        ArbitrationFlow::new(two_changes(&fx)).dismiss(),
        ArbitrationDecision::Dismiss
    );
    assert_eq!(
        ArbitrationFlow::new(two_changes(&fx)).dismiss_and_ignore(),
        ArbitrationDecision::Ignore
    );
}
