use serde::{Deserialize, Serialize};

/// One repository to migrate, as listed in the configuration.
///
/// Entities are built once when the configuration is resolved and are never
/// mutated afterwards; everything that changes during a run lives on the
/// corresponding [`crate::record::MigrationRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub source_address: String,
}

impl Entity {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        source_address: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            source_address: source_address.into(),
        }
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}
