use crate::entity::Entity;
use crate::migrator_config::EmptyDestinationPolicy;
use dialoguer::{Select, theme::ColorfulTheme};
use tracing::warn;

/// Operator answer to "reuse this empty destination?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReuseDecision {
    Reuse,
    ReuseAll, // Operator chose to reuse every remaining empty destination
    Decline,
}

/// Decides whether an existing, empty destination may be adopted as created.
pub struct DestinationGate {
    policy: EmptyDestinationPolicy,
    assume_yes: bool,
}

impl DestinationGate {
    pub fn new(policy: EmptyDestinationPolicy, assume_yes: bool) -> Self {
        Self { policy, assume_yes }
    }

    pub fn policy(&self) -> EmptyDestinationPolicy {
        self.policy
    }

    /// Returns true when the orchestrator may treat `address` as already created.
    ///
    /// `Prompt` without an attended terminal declines rather than guessing.
    pub fn confirm_reuse(&mut self, entity: &Entity, address: &str) -> bool {
        match self.policy {
            EmptyDestinationPolicy::Reuse => true,
            EmptyDestinationPolicy::Abort => false,
            EmptyDestinationPolicy::Prompt if self.assume_yes => true,
            EmptyDestinationPolicy::Prompt if !console::user_attended() => {
                warn!(
                    entity = %entity.name,
                    destination = address,
                    "empty destination needs confirmation but no terminal is attached"
                );
                false
            }
            EmptyDestinationPolicy::Prompt => match self.prompt_user(entity, address) {
                ReuseDecision::Reuse => true,
                ReuseDecision::ReuseAll => {
                    self.policy = EmptyDestinationPolicy::Reuse;
                    true
                }
                ReuseDecision::Decline => false,
            },
        }
    }

    fn prompt_user(&self, entity: &Entity, address: &str) -> ReuseDecision {
        let options = &[
            "Yes, reuse it",
            "Yes, and reuse every remaining empty destination",
            "No, fail this repository",
        ];

        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(format!(
                "Destination {} for '{}' already exists but is empty. Reuse it?",
                address, entity.name
            ))
            .items(options)
            .default(0)
            .interact();

        match selection {
            Ok(0) => ReuseDecision::Reuse,
            Ok(1) => ReuseDecision::ReuseAll,
            _ => ReuseDecision::Decline,
        }
    }
}

impl Default for DestinationGate {
    fn default() -> Self {
        Self::new(EmptyDestinationPolicy::default(), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity() -> Entity {
        Entity::new("svc", "", "git@example.com:svc.git")
    }

    #[test]
    fn test_reuse_policy_accepts() {
        let mut gate = DestinationGate::new(EmptyDestinationPolicy::Reuse, false);
        assert!(gate.confirm_reuse(&entity(), "https://github.com/acme/svc"));
    }

    #[test]
    fn test_abort_policy_declines_even_with_yes() {
        let mut gate = DestinationGate::new(EmptyDestinationPolicy::Abort, true);
        assert!(!gate.confirm_reuse(&entity(), "https://github.com/acme/svc"));
    }

    #[test]
    fn test_prompt_policy_with_yes_accepts() {
        let mut gate = DestinationGate::new(EmptyDestinationPolicy::Prompt, true);
        assert!(gate.confirm_reuse(&entity(), "https://github.com/acme/svc"));
        assert_eq!(gate.policy(), EmptyDestinationPolicy::Prompt);
    }
}
