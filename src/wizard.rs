use crate::migration::DYNAMIC_PROFILE;
use crate::shared::ids::ProfileId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WizardStage {
    Dashboard,
    Analysis,
    Compatibility,
    Migration,
    Validation,
    Reports,
}

pub const ALL_WIZARD_STAGES: [WizardStage; 6] = [
    WizardStage::Dashboard,
    WizardStage::Analysis,
    WizardStage::Compatibility,
    WizardStage::Migration,
    WizardStage::Validation,
    WizardStage::Reports,
];

impl WizardStage {
    pub fn as_str(self) -> &'static str {
        match self {
            WizardStage::Dashboard => "dashboard",
            WizardStage::Analysis => "analysis",
            WizardStage::Compatibility => "compatibility",
            WizardStage::Migration => "migration",
            WizardStage::Validation => "validation",
            WizardStage::Reports => "reports",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        let normalized = raw.trim().to_ascii_lowercase();
        ALL_WIZARD_STAGES
            .into_iter()
            .find(|stage| stage.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "stage must be one of: {}",
                    ALL_WIZARD_STAGES
                        .iter()
                        .map(|stage| stage.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
    }

    fn index(self) -> usize {
        ALL_WIZARD_STAGES
            .iter()
            .position(|stage| *stage == self)
            .unwrap_or(0)
    }

    pub fn next(self) -> Option<Self> {
        ALL_WIZARD_STAGES.get(self.index() + 1).copied()
    }

    pub fn previous(self) -> Option<Self> {
        self.index()
            .checked_sub(1)
            .and_then(|idx| ALL_WIZARD_STAGES.get(idx).copied())
    }
}

impl std::fmt::Display for WizardStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardAction {
    Next,
    Back,
    /// Sidebar navigation; any stage is reachable.
    JumpTo(WizardStage),
    /// Analysis finished and classified the site.
    AnalysisCompleted(ProfileId),
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WizardState {
    pub stage: WizardStage,
    pub site_type: Option<ProfileId>,
}

impl Default for WizardState {
    fn default() -> Self {
        Self {
            stage: WizardStage::Dashboard,
            site_type: None,
        }
    }
}

impl WizardState {
    /// Profile handed to the migration stage. Unclassified sites migrate as dynamic.
    pub fn effective_profile(&self) -> ProfileId {
        self.site_type
            .clone()
            .unwrap_or_else(|| ProfileId::builtin(DYNAMIC_PROFILE))
    }
}

pub fn reduce(state: &WizardState, action: WizardAction) -> WizardState {
    match action {
        WizardAction::Next => WizardState {
            stage: state.stage.next().unwrap_or(state.stage),
            site_type: state.site_type.clone(),
        },
        WizardAction::Back => WizardState {
            stage: state.stage.previous().unwrap_or(state.stage),
            site_type: state.site_type.clone(),
        },
        WizardAction::JumpTo(stage) => WizardState {
            stage,
            site_type: state.site_type.clone(),
        },
        WizardAction::AnalysisCompleted(profile) => WizardState {
            stage: WizardStage::Compatibility,
            site_type: Some(profile),
        },
        WizardAction::Reset => WizardState::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_and_back_are_linear_and_clamped() {
        let mut state = WizardState::default();
        state = reduce(&state, WizardAction::Back);
        assert_eq!(state.stage, WizardStage::Dashboard);
        for expected in &ALL_WIZARD_STAGES[1..] {
            state = reduce(&state, WizardAction::Next);
            assert_eq!(state.stage, *expected);
        }
        state = reduce(&state, WizardAction::Next);
        assert_eq!(state.stage, WizardStage::Reports);
        state = reduce(&state, WizardAction::Back);
        assert_eq!(state.stage, WizardStage::Validation);
    }

    #[test]
    fn stage_names_round_trip() {
        for stage in ALL_WIZARD_STAGES {
            assert_eq!(WizardStage::parse(stage.as_str()), Ok(stage));
        }
        assert!(WizardStage::parse("checkout").is_err());
    }
}
