use std::fmt;

/// Rejection reasons for a pair configuration.
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    EmptyEntityId,
    SamePairEntities { entity: String },
    DuplicatePair { source: String, target: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyEntityId => write!(f, "entity ids cannot be empty"),
            ConfigError::SamePairEntities { entity } => write!(
                f,
                "source and target must be different entities (both are \"{entity}\")"
            ),
            ConfigError::DuplicatePair { source, target } => {
                write!(f, "pair {source} -> {target} is configured more than once")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
