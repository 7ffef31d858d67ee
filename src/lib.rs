// Core of the travel distribution gateway

pub mod aggregator;
pub mod config;
pub mod credentials;
pub mod hash_code;
pub mod model;
pub mod option_codes;
pub mod provider;
pub mod ttl_cache;
pub mod uuid_mapper;

// Re-export key types for convenience
pub use aggregator::{
    AggregatedResult, AggregationError, AggregationState, EntityKind, EntityOrigin,
    FailureCause, OfferAggregator, OfferRoute, ProviderFailure, ProviderResult,
};
pub use config::{ConfigError, GatewayConfig};
pub use credentials::{decode_bearer_token, did_to_org_id, org_id_to_did, Claims, CredentialError};
pub use hash_code::{combine, HashCodeBuilder, HashValue};
pub use option_codes::OptionCodeRegistry;
pub use provider::{FlightProvider, ProviderError, ProviderRegistry, RegistryError};
pub use ttl_cache::{CacheStatsReport, TtlCache};
pub use uuid_mapper::{CorrelationError, UuidMapper};
