// Identifier correlation
// Maps upstream-native keys into opaque correlation keys and back.
// E.g. key 'OFFER-123' can be mapped into '123e4567-e89b-12d3-a456-426614174000',
// later on 'OFFER-123' can be retrieved using the correlation key (reverse mapping).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

// Plain mapping (original key -> correlation key) handed to the persistence layer
pub type Mapping = BTreeMap<String, String>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CorrelationError {
    #[error("Cannot reverse mapping for key {0}, original key does not exist")]
    NotFound(String),
}

// Source of fresh correlation keys
pub trait KeyGenerator: Send + Sync + 'static {
    fn generate(&self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UuidKeyGenerator;

impl KeyGenerator for UuidKeyGenerator {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

// Bidirectional stable-key mapping.
// Once an original key is mapped its correlation key never changes, and no two
// original keys share a correlation key. Mutation needs `&mut self`; callers sharing
// one mapper across tasks wrap it in a lock.
#[derive(Clone)]
pub struct UuidMapper {
    mapping: HashMap<String, String>,
    reverse_mapping: HashMap<String, String>,
    generator: Arc<dyn KeyGenerator>,
}

impl UuidMapper {
    pub fn new() -> Self {
        Self::with_generator(Arc::new(UuidKeyGenerator))
    }

    pub fn with_generator(generator: Arc<dyn KeyGenerator>) -> Self {
        Self {
            mapping: HashMap::new(),
            reverse_mapping: HashMap::new(),
            generator,
        }
    }

    // Hydrate from a previously serialized mapping, the reverse table is rebuilt here
    pub fn from_mapping(existing: Mapping) -> Self {
        let mut mapper = Self::new();
        mapper.replace(existing);
        mapper
    }

    // Whole-table replace, the only way entries ever disappear
    pub fn replace(&mut self, existing: Mapping) {
        self.mapping.clear();
        self.reverse_mapping.clear();
        for (original, correlation) in existing {
            self.reverse_mapping
                .insert(correlation.clone(), original.clone());
            self.mapping.insert(original, correlation);
        }
    }

    pub fn map(&mut self, original_key: &str) -> String {
        if let Some(existing) = self.mapping.get(original_key) {
            return existing.clone();
        }

        let mut correlation_key = self.generator.generate();
        // a generator handing out a key twice must not break the one-to-one invariant
        while self.reverse_mapping.contains_key(&correlation_key) {
            tracing::warn!(key = %correlation_key, "key generator produced a duplicate correlation key");
            correlation_key = self.generator.generate();
        }

        self.mapping
            .insert(original_key.to_string(), correlation_key.clone());
        self.reverse_mapping
            .insert(correlation_key.clone(), original_key.to_string());
        correlation_key
    }

    pub fn reverse(&self, correlation_key: &str) -> Result<&str, CorrelationError> {
        self.reverse_mapping
            .get(correlation_key)
            .map(String::as_str)
            .ok_or_else(|| CorrelationError::NotFound(correlation_key.to_string()))
    }

    pub fn contains(&self, original_key: &str) -> bool {
        self.mapping.contains_key(original_key)
    }

    pub fn serialize(&self) -> Mapping {
        self.mapping
            .iter()
            .map(|(original, correlation)| (original.clone(), correlation.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}

impl Default for UuidMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UuidMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UuidMapper")
            .field("entries", &self.mapping.len())
            .finish()
    }
}

// Persisted as the plain forward mapping
impl Serialize for UuidMapper {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mapping: Mapping = UuidMapper::serialize(self);
        mapping.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for UuidMapper {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Mapping::deserialize(deserializer).map(UuidMapper::from_mapping)
    }
}

impl From<Mapping> for UuidMapper {
    fn from(existing: Mapping) -> Self {
        Self::from_mapping(existing)
    }
}

impl From<UuidMapper> for Mapping {
    fn from(mapper: UuidMapper) -> Self {
        mapper.serialize()
    }
}
