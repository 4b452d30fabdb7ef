//! Shared identifier types.
//!
//! Every entity kind gets its own newtype so a [`ContestId`] can never be
//! passed where a [`ContenderId`] is expected. The zero value of each kind is
//! reserved as "wildcard/unset".

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i32);

        impl $name {
            /// The reserved wildcard/unset value.
            pub const WILDCARD: Self = Self(0);

            /// Returns true for the reserved zero value.
            pub fn is_wildcard(self) -> bool {
                self.0 == 0
            }
        }

        impl From<i32> for $name {
            fn from(value: i32) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

resource_id!(
    /// Contest identifier.
    ContestId
);
resource_id!(
    /// Contender identifier.
    ContenderId
);
resource_id!(
    /// Competition class identifier.
    CompClassId
);
resource_id!(
    /// Problem identifier.
    ProblemId
);
resource_id!(
    /// Tick identifier.
    TickId
);
resource_id!(
    /// Organizer identifier.
    OrganizerId
);

/// Identifier of one broker subscription.
pub type SubscriptionId = Uuid;

/// Identifier of one running score engine instance.
pub type ScoreEngineInstanceId = Uuid;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_wildcard() {
        assert!(ContestId::WILDCARD.is_wildcard());
        assert!(ContenderId::default().is_wildcard());
        assert!(!ProblemId(7).is_wildcard());
    }

    #[test]
    fn ids_serialize_as_plain_integers() {
        let json = serde_json::to_string(&ContenderId(42)).expect("serialize");
        assert_eq!(json, "42");
        let back: ContenderId = serde_json::from_str("42").expect("deserialize");
        assert_eq!(back, ContenderId(42));
    }
}
