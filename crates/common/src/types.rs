use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a single saga execution.
///
/// Wraps a UUID to provide type safety and prevent mixing up
/// saga execution ids with business entity ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SagaId(Uuid);

impl SagaId {
    /// Creates a new random saga id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a saga id from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SagaId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SagaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SagaId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<SagaId> for Uuid {
    fn from(id: SagaId) -> Self {
        id.0
    }
}

/// Identifier of the business entity a saga acts on.
///
/// Entity ids come from different services (user ids, lawyer ids,
/// appointment ids) and from natural business keys such as an email
/// address, so this is an opaque string rather than a UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Creates an entity id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mints a fresh UUID-backed entity id.
    ///
    /// Orchestrators use this to assign the business entity id before
    /// the entity row exists, so the saga record can reference it.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saga_id_new_creates_unique_ids() {
        let id1 = SagaId::new();
        let id2 = SagaId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn saga_id_from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        let id = SagaId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), uuid);
    }

    #[test]
    fn saga_id_serialization_roundtrip() {
        let id = SagaId::new();
        let json = serde_json::to_string(&id).unwrap();
        let deserialized: SagaId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }

    #[test]
    fn entity_id_from_str_and_display() {
        let id = EntityId::from("lawyer-42");
        assert_eq!(id.as_str(), "lawyer-42");
        assert_eq!(id.to_string(), "lawyer-42");
    }

    #[test]
    fn entity_id_generate_is_unique() {
        assert_ne!(EntityId::generate(), EntityId::generate());
    }

    #[test]
    fn entity_id_serializes_as_plain_string() {
        let id = EntityId::new("user@example.com");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"user@example.com\"");
    }
}
