#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

const TEMP_PREFIX: &str = "tmp-";
const MAX_ID_LEN: usize = 128;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("id must not be empty")]
    Empty,
    #[error("id is too long")]
    TooLong,
    #[error("id contains control characters")]
    ContainsControl,
}

impl IdError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "id must not be empty",
            Self::TooLong => "id is too long",
            Self::ContainsControl => "id contains control characters",
        }
    }
}

fn validate_id(value: &str) -> Result<(), IdError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(IdError::Empty);
    }
    if trimmed.len() > MAX_ID_LEN {
        return Err(IdError::TooLong);
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(IdError::ContainsControl);
    }
    Ok(())
}

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }

            pub fn try_new(value: impl Into<String>) -> Result<Self, IdError> {
                let value = value.into();
                validate_id(&value)?;
                Ok(Self(value.trim().to_string()))
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::try_new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(IdeaId);
string_id!(EdgeId);
string_id!(BrainDumpId);
string_id!(EdgeTypeId);

macro_rules! temporary_id {
    ($name:ident) => {
        impl $name {
            /// Mints a locally unique id for an entity the backend has not confirmed yet.
            pub fn temporary() -> Self {
                Self(format!("{TEMP_PREFIX}{}", uuid::Uuid::new_v4()))
            }

            pub fn is_temporary(&self) -> bool {
                self.0.starts_with(TEMP_PREFIX)
            }
        }
    };
}

temporary_id!(IdeaId);
temporary_id!(EdgeId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_validation() {
        assert_eq!(IdeaId::try_new("").unwrap_err(), IdError::Empty);
        assert_eq!(IdeaId::try_new("   ").unwrap_err(), IdError::Empty);
        assert_eq!(
            EdgeId::try_new("bad\u{0007}id").unwrap_err(),
            IdError::ContainsControl
        );
        assert_eq!(
            BrainDumpId::try_new("x".repeat(129)).unwrap_err(),
            IdError::TooLong
        );
        assert_eq!(IdeaId::try_new(" idea-1 ").unwrap().as_str(), "idea-1");
    }

    #[test]
    fn temporary_ids_are_tagged_and_unique() {
        let a = IdeaId::temporary();
        let b = IdeaId::temporary();
        assert!(a.is_temporary());
        assert_ne!(a, b);
        assert!(!IdeaId::try_new("idea-7").unwrap().is_temporary());
    }

    #[test]
    fn ids_deserialize_through_validation() {
        let ok: EdgeId = serde_json::from_str("\"edge-1\"").unwrap();
        assert_eq!(ok.as_str(), "edge-1");
        assert!(serde_json::from_str::<EdgeId>("\"\"").is_err());
    }
}
