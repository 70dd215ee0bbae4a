use sitelift::shared::ids::ProfileId;
use sitelift::wizard::{reduce, WizardAction, WizardStage, WizardState};

#[test]
fn analysis_records_site_type_and_moves_to_compatibility() {
    let state = reduce(
        &WizardState::default(),
        WizardAction::JumpTo(WizardStage::Analysis),
    );
    let state = reduce(
        &state,
        WizardAction::AnalysisCompleted(ProfileId::parse("static").expect("profile")),
    );
    assert_eq!(state.stage, WizardStage::Compatibility);
    assert_eq!(state.effective_profile().as_str(), "static");

    let state = reduce(&state, WizardAction::Next);
    assert_eq!(state.stage, WizardStage::Migration);
    assert_eq!(state.effective_profile().as_str(), "static");
}

#[test]
fn unclassified_site_migrates_as_dynamic() {
    let state = reduce(
        &WizardState::default(),
        WizardAction::JumpTo(WizardStage::Migration),
    );
    assert!(state.site_type.is_none());
    assert_eq!(state.effective_profile().as_str(), "dynamic");
}

#[test]
fn sidebar_jumps_keep_site_type_and_reset_clears_it() {
    let mut state = reduce(
        &WizardState::default(),
        WizardAction::AnalysisCompleted(ProfileId::parse("static").expect("profile")),
    );
    state = reduce(&state, WizardAction::JumpTo(WizardStage::Reports));
    assert_eq!(state.stage, WizardStage::Reports);
    state = reduce(&state, WizardAction::JumpTo(WizardStage::Dashboard));
    assert_eq!(state.site_type.as_ref().map(|p| p.as_str()), Some("static"));

    let reset = reduce(&state, WizardAction::Reset);
    assert_eq!(reset, WizardState::default());
}

#[test]
fn reduce_does_not_mutate_its_input() {
    let state = WizardState::default();
    let next = reduce(&state, WizardAction::Next);
    assert_eq!(state.stage, WizardStage::Dashboard);
    assert_eq!(next.stage, WizardStage::Analysis);
}
