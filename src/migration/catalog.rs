use crate::config::{ProfileStepConfig, Settings};
use crate::migration::error::MigrationError;
use crate::shared::ids::ProfileId;
use crate::shared::serde_ext::{deserialize_duration, serialize_duration};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

pub const STATIC_PROFILE: &str = "static";
pub const DYNAMIC_PROFILE: &str = "dynamic";

/// Number of equal increments a step's progress advances through.
pub const PROGRESS_QUANTA: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub name: String,
    pub order: u32,
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub estimated_duration: Duration,
}

impl StepDefinition {
    pub fn quantum_interval(&self) -> Duration {
        self.estimated_duration / PROGRESS_QUANTA
    }
}

#[derive(Debug, Clone, Default)]
pub struct StepCatalog {
    profiles: BTreeMap<ProfileId, Vec<StepDefinition>>,
}

impl StepCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        for (profile, steps) in builtin_profiles() {
            let definitions = steps
                .iter()
                .enumerate()
                .map(|(idx, (name, secs))| StepDefinition {
                    name: (*name).to_string(),
                    order: idx as u32 + 1,
                    estimated_duration: Duration::from_secs(*secs),
                })
                .collect();
            catalog
                .profiles
                .insert(ProfileId::builtin(profile), definitions);
        }
        catalog
    }

    /// Built-in profiles plus the `profiles` section of the settings. A
    /// configured profile with a built-in name replaces the built-in one.
    pub fn from_settings(settings: &Settings) -> Result<Self, MigrationError> {
        let mut catalog = Self::builtin();
        for (profile, steps) in &settings.profiles {
            catalog.register(profile.clone(), profile_steps(steps))?;
        }
        Ok(catalog)
    }

    /// Registers `steps` under `profile`, assigning orders 1..=n in list order.
    pub fn register(
        &mut self,
        profile: ProfileId,
        steps: Vec<(String, Duration)>,
    ) -> Result<(), MigrationError> {
        let definitions = steps
            .into_iter()
            .enumerate()
            .map(|(idx, (name, estimated_duration))| StepDefinition {
                name,
                order: idx as u32 + 1,
                estimated_duration,
            })
            .collect();
        self.register_definitions(profile, definitions)
    }

    pub fn register_definitions(
        &mut self,
        profile: ProfileId,
        definitions: Vec<StepDefinition>,
    ) -> Result<(), MigrationError> {
        validate_definitions(&definitions).map_err(|reason| {
            MigrationError::InvalidCatalog(format!("profile `{profile}`: {reason}"))
        })?;
        self.profiles.insert(profile, definitions);
        Ok(())
    }

    pub fn steps(&self, profile: &ProfileId) -> Result<&[StepDefinition], MigrationError> {
        self.profiles
            .get(profile)
            .map(Vec::as_slice)
            .ok_or_else(|| MigrationError::UnknownProfile {
                profile: profile.to_string(),
            })
    }

    pub fn definition(&self, profile: &ProfileId, order: u32) -> Option<&StepDefinition> {
        self.profiles
            .get(profile)?
            .iter()
            .find(|definition| definition.order == order)
    }

    pub fn contains(&self, profile: &ProfileId) -> bool {
        self.profiles.contains_key(profile)
    }

    pub fn profiles(&self) -> impl Iterator<Item = (&ProfileId, &[StepDefinition])> {
        self.profiles
            .iter()
            .map(|(profile, steps)| (profile, steps.as_slice()))
    }
}

fn builtin_profiles() -> [(&'static str, [(&'static str, u64); 6]); 2] {
    [
        (
            DYNAMIC_PROFILE,
            [
                ("Create Backup", 300),
                ("Transfer Database", 600),
                ("Transfer Files", 900),
                ("Email Migration", 300),
                ("DNS Configuration", 180),
                ("SSL Certificate", 240),
            ],
        ),
        (
            STATIC_PROFILE,
            [
                ("Create Backup", 180),
                ("Code Modernization", 480),
                ("Transfer Files", 360),
                ("Performance Optimization", 240),
                ("DNS Configuration", 180),
                ("SSL Certificate", 240),
            ],
        ),
    ]
}

fn profile_steps(steps: &[ProfileStepConfig]) -> Vec<(String, Duration)> {
    steps
        .iter()
        .map(|step| (step.name.trim().to_string(), step.estimated_duration))
        .collect()
}

/// Shared by catalog registration and settings validation.
pub fn validate_step_list<'a>(
    steps: impl IntoIterator<Item = (&'a str, Duration)>,
) -> Result<(), String> {
    let mut names = BTreeSet::new();
    let mut count = 0usize;
    for (name, duration) in steps {
        count += 1;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("step {count} name must be non-empty"));
        }
        if !names.insert(name.to_string()) {
            return Err(format!("duplicate step name `{name}`"));
        }
        if duration.is_zero() {
            return Err(format!("step `{name}` estimated_duration must be positive"));
        }
    }
    if count == 0 {
        return Err("profile must declare at least one step".to_string());
    }
    Ok(())
}

fn validate_definitions(definitions: &[StepDefinition]) -> Result<(), String> {
    validate_step_list(
        definitions
            .iter()
            .map(|definition| (definition.name.as_str(), definition.estimated_duration)),
    )?;
    let mut previous = 0u32;
    for definition in definitions {
        if definition.order <= previous {
            return Err(format!(
                "step `{}` order {} must be positive and greater than {}",
                definition.name, definition.order, previous
            ));
        }
        previous = definition.order;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(raw: &str) -> ProfileId {
        ProfileId::parse(raw).expect("profile id")
    }

    #[test]
    fn builtin_profiles_have_six_ordered_steps() {
        let catalog = StepCatalog::builtin();
        for id in [STATIC_PROFILE, DYNAMIC_PROFILE] {
            let steps = catalog.steps(&profile(id)).expect("builtin profile");
            assert_eq!(steps.len(), 6);
            let orders = steps.iter().map(|step| step.order).collect::<Vec<_>>();
            assert_eq!(orders, vec![1, 2, 3, 4, 5, 6]);
            assert_eq!(steps[0].name, "Create Backup");
        }
    }

    #[test]
    fn static_profile_is_front_loaded_by_modernization() {
        let catalog = StepCatalog::builtin();
        let names = catalog
            .steps(&profile(STATIC_PROFILE))
            .expect("static")
            .iter()
            .map(|step| step.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "Create Backup",
                "Code Modernization",
                "Transfer Files",
                "Performance Optimization",
                "DNS Configuration",
                "SSL Certificate",
            ]
        );
    }

    #[test]
    fn quantum_interval_is_one_hundredth_of_the_estimate() {
        let definition = StepDefinition {
            name: "Create Backup".to_string(),
            order: 1,
            estimated_duration: Duration::from_secs(300),
        };
        assert_eq!(definition.quantum_interval(), Duration::from_secs(3));
    }

    #[test]
    fn rejects_non_increasing_orders() {
        let mut catalog = StepCatalog::empty();
        let err = catalog
            .register_definitions(
                profile("custom"),
                vec![
                    StepDefinition {
                        name: "a".to_string(),
                        order: 2,
                        estimated_duration: Duration::from_secs(1),
                    },
                    StepDefinition {
                        name: "b".to_string(),
                        order: 2,
                        estimated_duration: Duration::from_secs(1),
                    },
                ],
            )
            .expect_err("duplicate order must fail");
        assert!(err.to_string().contains("order 2"));
        assert!(!catalog.contains(&profile("custom")));
    }

    #[test]
    fn rejects_duplicate_names_and_zero_durations() {
        assert!(validate_step_list([("a", Duration::from_secs(1)), ("a", Duration::from_secs(1))])
            .expect_err("duplicate")
            .contains("duplicate step name"));
        assert!(validate_step_list([("a", Duration::ZERO)])
            .expect_err("zero")
            .contains("must be positive"));
        assert!(validate_step_list(std::iter::empty())
            .expect_err("empty")
            .contains("at least one step"));
    }
}
