//! Opaque identifier newtypes shared across the workspace.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a new random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Wrap an existing string as an id.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

id_newtype!(VideoId);
id_newtype!(ContextId);
id_newtype!(LineageId);
id_newtype!(JobId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_display_their_inner_string() {
        let id = VideoId::from_string("v1");
        assert_eq!(id.as_str(), "v1");
        assert_eq!(id.to_string(), "v1");
    }

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(VideoId::new(), VideoId::new());
    }
}
