use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(HeadsetId);

/// One entry of a discovery cycle. Replaced wholesale on every poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadsetDescriptor {
    pub id: HeadsetId,
    #[serde(
        default,
        alias = "customName",
        skip_serializing_if = "Option::is_none"
    )]
    pub display_name: Option<String>,
}

impl HeadsetDescriptor {
    pub fn new(id: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            id: HeadsetId::new(id),
            display_name,
        }
    }

    /// Name to render in a selectable list; falls back to the id.
    pub fn label(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => self.id.as_str(),
        }
    }
}
