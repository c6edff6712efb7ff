//! Typed identifiers.
//!
//! Every entity the engine passes around is identified by a UUID wrapped in
//! a zero-cost newtype, so a `UserId` can never be handed to an API that
//! expects a `RetroId`. All ids serialize transparently as their inner UUID.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random id.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing [`Uuid`].
            #[must_use]
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Return the inner [`Uuid`].
            #[must_use]
            pub fn as_uuid(&self) -> &Uuid {
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
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id! {
    /// A retrospective (and therefore a room) identifier.
    RetroId
}

uuid_id! {
    /// An authenticated user identifier.
    UserId
}

uuid_id! {
    /// A team identifier.
    TeamId
}

uuid_id! {
    /// A retro template identifier.
    TemplateId
}

uuid_id! {
    /// A template column identifier.
    ColumnId
}

uuid_id! {
    /// A retro item (card / Lean Coffee topic) identifier.
    ItemId
}

uuid_id! {
    /// An action item identifier.
    ActionId
}

uuid_id! {
    /// A Lean Coffee per-topic discussion history row identifier.
    TopicHistoryId
}

uuid_id! {
    /// Process-unique identifier for one client connection.
    ///
    /// A user with several tabs open holds several `ConnectionId`s that all
    /// map to the same [`UserId`].
    ConnectionId
}

uuid_id! {
    /// Identifier for one backend replica (process instance).
    ///
    /// Generated fresh at process start and never persisted; a replica that
    /// reconnects to the cluster substrate starts with a new identity.
    ReplicaId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types_with_uuid_round_trip() {
        let retro = RetroId::new();
        let parsed: RetroId = retro.to_string().parse().unwrap();
        assert_eq!(retro, parsed);
    }

    #[test]
    fn ids_serialize_transparently() {
        let user = UserId::new();
        let json = serde_json::to_string(&user).unwrap();
        assert_eq!(json, format!("\"{user}\""));
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(user, back);
    }
}
