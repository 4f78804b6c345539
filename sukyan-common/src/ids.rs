//! Newtype identifiers so a workspace id can never be passed where a scan id
//! is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(WorkspaceId);
id_newtype!(ScanId);
id_newtype!(HistoryId);
id_newtype!(WsConnectionId);
id_newtype!(WsMessageId);
id_newtype!(IssueId);
id_newtype!(OobTestId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_round_trips_inner_string() {
        let id = ScanId::new("scan-1");
        assert_eq!(id.to_string(), "scan-1");
        assert_eq!(id.as_str(), "scan-1");
    }
}
