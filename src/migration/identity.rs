use crate::shared::ids::ActorId;

pub const ACTOR_ENV_VAR: &str = "SITELIFT_ACTOR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: ActorId,
}

pub trait IdentityProvider {
    /// `None` when nobody is authenticated.
    fn current_actor(&self) -> Option<Actor>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    actor: Option<Actor>,
}

impl StaticIdentity {
    pub fn new(id: ActorId) -> Self {
        Self {
            actor: Some(Actor { id }),
        }
    }

    pub fn anonymous() -> Self {
        Self { actor: None }
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_actor(&self) -> Option<Actor> {
        self.actor.clone()
    }
}

/// Reads the actor id from an environment variable, falling back to a
/// configured default. An unparsable value counts as unauthenticated.
#[derive(Debug, Clone)]
pub struct EnvIdentity {
    var: String,
    fallback: Option<ActorId>,
}

impl EnvIdentity {
    pub fn new(fallback: Option<ActorId>) -> Self {
        Self::with_var(ACTOR_ENV_VAR, fallback)
    }

    pub fn with_var(var: impl Into<String>, fallback: Option<ActorId>) -> Self {
        Self {
            var: var.into(),
            fallback,
        }
    }
}

impl IdentityProvider for EnvIdentity {
    fn current_actor(&self) -> Option<Actor> {
        match std::env::var(&self.var) {
            Ok(raw) if !raw.trim().is_empty() => ActorId::parse(raw.trim())
                .ok()
                .map(|id| Actor { id }),
            _ => self.fallback.clone().map(|id| Actor { id }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_identity_reports_its_actor() {
        let identity = StaticIdentity::new(ActorId::parse("alice").expect("actor"));
        assert_eq!(
            identity.current_actor().map(|actor| actor.id.to_string()),
            Some("alice".to_string())
        );
        assert!(StaticIdentity::anonymous().current_actor().is_none());
    }

    #[test]
    fn env_identity_prefers_variable_and_falls_back() {
        let var = "SITELIFT_ACTOR_IDENTITY_TEST";
        let fallback = ActorId::parse("fallback").expect("actor");
        let identity = EnvIdentity::with_var(var, Some(fallback));

        std::env::remove_var(var);
        assert_eq!(
            identity.current_actor().map(|actor| actor.id.to_string()),
            Some("fallback".to_string())
        );

        std::env::set_var(var, "bob");
        assert_eq!(
            identity.current_actor().map(|actor| actor.id.to_string()),
            Some("bob".to_string())
        );

        std::env::set_var(var, "not valid!");
        assert!(identity.current_actor().is_none());
        std::env::remove_var(var);
    }
}
