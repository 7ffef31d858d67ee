// Offer aggregation
// Fans a search out to every provider concurrently, merges whatever arrives in time into one
// canonical response and routes follow-up calls (pricing, seatmap, order) back to the
// provider that produced the offer.
//
// Every merged entity is renamed through the UuidMapper using its provider identity, so
// identical native ids from different providers never clash. Offer routes live in a TTL
// cache with a session horizon; once expired, follow-ups fail with UnknownEntity.

use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::model::{
    Offer, Order, OrderRequest, PriceRequest, PricedOffer, SearchRequest, SearchResults, Seat,
    SeatMap,
};
use crate::option_codes::OptionCodeRegistry;
use crate::provider::{FlightProvider, ProviderError, ProviderRegistry, RegistryError};
use crate::ttl_cache::TtlCache;
use crate::uuid_mapper::{CorrelationError, Mapping, UuidMapper};

pub type SharedUuidMapper = Arc<Mutex<UuidMapper>>;
pub type OfferRoutes = Arc<TtlCache<String, OfferRoute>>;

const ENTITY_KEY_SEPARATOR: char = '|';

#[derive(Error, Debug)]
pub enum AggregationError {
    #[error("No flight providers configured")]
    NoProvidersConfigured,

    #[error("No results available, all {} provider(s) failed or timed out", .causes.len())]
    NoResultsAvailable { causes: Vec<ProviderFailure> },

    #[error("Offer expired or not found: {0}")]
    UnknownEntity(String),

    #[error("Provider {0} is not registered")]
    ProviderNotRegistered(String),

    #[error("Provider {provider_id} did not answer within {timeout_ms}ms")]
    ProviderTimeout { provider_id: String, timeout_ms: u64 },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationState {
    Dispatched,
    Collecting,
    Merged,
    Failed,
}

// Outcome of one provider within one aggregation run
#[derive(Debug)]
pub enum ProviderResult {
    Success(SearchResults),
    Failure(ProviderError),
    TimedOut,
}

#[derive(Debug)]
pub enum FailureCause {
    Error(ProviderError),
    TimedOut { after: Duration },
}

#[derive(Debug)]
pub struct ProviderFailure {
    pub provider_id: String,
    pub cause: FailureCause,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            FailureCause::Error(error) => write!(f, "{}: {}", self.provider_id, error),
            FailureCause::TimedOut { after } => {
                write!(f, "{}: timed out after {}ms", self.provider_id, after.as_millis())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Offer,
    Segment,
    PricePlan,
    Itinerary,
}

impl EntityKind {
    fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Offer => "offer",
            EntityKind::Segment => "segment",
            EntityKind::PricePlan => "priceplan",
            EntityKind::Itinerary => "itinerary",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "offer" => Some(EntityKind::Offer),
            "segment" => Some(EntityKind::Segment),
            "priceplan" => Some(EntityKind::PricePlan),
            "itinerary" => Some(EntityKind::Itinerary),
            _ => None,
        }
    }
}

// Where a correlated entity came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityOrigin {
    pub provider_id: String,
    pub kind: EntityKind,
    pub native_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferRoute {
    pub provider_id: String,
    pub native_offer_id: String,
}

#[derive(Debug)]
pub struct AggregatedResult {
    pub status: AggregationState,
    pub results: SearchResults,
    // correlation key -> provider id, for every offer, segment, price plan and itinerary
    pub origins: HashMap<String, String>,
    pub diagnostics: Vec<ProviderFailure>,
}

struct AggregationRun {
    state: AggregationState,
    started: Instant,
}

impl AggregationRun {
    fn start(providers: usize) -> Self {
        tracing::debug!(providers, state = ?AggregationState::Dispatched, "aggregation run started");
        Self {
            state: AggregationState::Dispatched,
            started: Instant::now(),
        }
    }

    fn transition(&mut self, next: AggregationState) {
        tracing::debug!(
            from = ?self.state,
            to = ?next,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "aggregation state change"
        );
        self.state = next;
    }
}

// Correlations are permanent while routes expire, so the mapper grows with every search.
// Give each session its own mapper through with_state, or call reset_correlations once
// a session is over and hand the returned table to the persistence layer.
pub struct OfferAggregator {
    registry: ProviderRegistry,
    mapper: SharedUuidMapper,
    routes: OfferRoutes,
    config: GatewayConfig,
}

impl OfferAggregator {
    pub fn new(registry: ProviderRegistry, config: GatewayConfig) -> Self {
        let routes = Arc::new(TtlCache::new(config.offer_route_ttl()));
        Self::with_state(registry, config, Arc::new(Mutex::new(UuidMapper::new())), routes)
    }

    // Share correlation state and routes with other components, or hydrate a persisted mapper
    pub fn with_state(
        registry: ProviderRegistry,
        config: GatewayConfig,
        mapper: SharedUuidMapper,
        routes: OfferRoutes,
    ) -> Self {
        Self {
            registry,
            mapper,
            routes,
            config,
        }
    }

    pub fn mapper(&self) -> &SharedUuidMapper {
        &self.mapper
    }

    pub fn routes(&self) -> &OfferRoutes {
        &self.routes
    }

    // Swaps in an empty correlation table and returns the previous one. Routes already
    // cached stay usable, but keys minted before the reset no longer reverse.
    pub fn reset_correlations(&self) -> Mapping {
        let mut mapper = self.mapper.lock();
        let previous = mapper.serialize();
        mapper.replace(Mapping::new());
        tracing::info!(entries = previous.len(), "correlation table reset");
        previous
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn start_route_cleanup(&self) -> JoinHandle<()> {
        self.routes.spawn_cleanup(self.config.cleanup_interval())
    }

    // Searches every registered provider with the configured per-provider timeout.
    pub async fn search(&self, request: SearchRequest) -> Result<AggregatedResult, AggregationError> {
        let providers = self.registry.providers().to_vec();
        self.search_with_providers(request, &providers, self.config.search_timeout())
            .await
    }

    // Fans `request` out to `providers` and merges what arrives within `per_provider_timeout`.
    // At least one success yields a merged result, failures and timeouts of the other
    // providers are reported in `diagnostics`. When nobody succeeds the run fails with
    // NoResultsAvailable carrying every cause. Providers are merged in the given order,
    // which decides conflicts on shared dictionary entries; a repeated provider id is
    // rejected before anything is dispatched.
    pub async fn search_with_providers(
        &self,
        request: SearchRequest,
        providers: &[Arc<dyn FlightProvider>],
        per_provider_timeout: Duration,
    ) -> Result<AggregatedResult, AggregationError> {
        if providers.is_empty() {
            tracing::warn!("no providers available for search");
            return Err(AggregationError::NoProvidersConfigured);
        }

        let mut seen = HashSet::new();
        if let Some(duplicate) = providers
            .iter()
            .map(|provider| provider.provider_id())
            .find(|provider_id| !seen.insert(*provider_id))
        {
            tracing::warn!(provider = duplicate, "provider listed twice for one search");
            return Err(RegistryError::DuplicateProvider(duplicate.to_string()).into());
        }

        let mut run = AggregationRun::start(providers.len());
        let request = Arc::new(request);
        let pending: Vec<PendingSearch> = providers
            .iter()
            .map(|provider| PendingSearch::spawn(Arc::clone(provider), Arc::clone(&request)))
            .collect();

        run.transition(AggregationState::Collecting);
        // join_all keeps dispatch order regardless of completion order
        let outcomes = join_all(
            pending
                .into_iter()
                .map(|search| search.collect(per_provider_timeout)),
        )
        .await;

        let mut merged = SearchResults::default();
        let mut origins = HashMap::new();
        let mut diagnostics = Vec::new();
        let mut succeeded = 0usize;

        for (provider_id, outcome) in outcomes {
            match outcome {
                ProviderResult::Success(results) => {
                    succeeded += 1;
                    self.merge_provider_results(&provider_id, results, &mut merged, &mut origins);
                }
                ProviderResult::Failure(error) => diagnostics.push(ProviderFailure {
                    provider_id,
                    cause: FailureCause::Error(error),
                }),
                ProviderResult::TimedOut => diagnostics.push(ProviderFailure {
                    provider_id,
                    cause: FailureCause::TimedOut {
                        after: per_provider_timeout,
                    },
                }),
            }
        }

        if succeeded == 0 {
            run.transition(AggregationState::Failed);
            tracing::warn!(failures = diagnostics.len(), "no provider returned results");
            return Err(AggregationError::NoResultsAvailable {
                causes: diagnostics,
            });
        }

        run.transition(AggregationState::Merged);
        tracing::info!(
            offers = merged.offers.len(),
            succeeded,
            failed = diagnostics.len(),
            elapsed_ms = run.started.elapsed().as_millis() as u64,
            "search results merged"
        );

        Ok(AggregatedResult {
            status: run.state,
            results: merged,
            origins,
            diagnostics,
        })
    }

    // One critical section on the mapper per provider batch
    fn merge_provider_results(
        &self,
        provider_id: &str,
        results: SearchResults,
        merged: &mut SearchResults,
        origins: &mut HashMap<String, String>,
    ) {
        let mut mapper = self.mapper.lock();

        for (native_id, segment) in results.segments {
            let key = correlation_key(&mut mapper, provider_id, EntityKind::Segment, &native_id);
            origins.insert(key.clone(), provider_id.to_string());
            merged.segments.insert(key, segment);
        }

        for (native_id, price_plan) in results.price_plans {
            let key =
                correlation_key(&mut mapper, provider_id, EntityKind::PricePlan, &native_id);
            origins.insert(key.clone(), provider_id.to_string());
            merged.price_plans.insert(key, price_plan);
        }

        for (native_id, segment_refs) in results.combinations {
            let key =
                correlation_key(&mut mapper, provider_id, EntityKind::Itinerary, &native_id);
            let segment_refs = segment_refs
                .iter()
                .map(|segment| {
                    correlation_key(&mut mapper, provider_id, EntityKind::Segment, segment)
                })
                .collect();
            origins.insert(key.clone(), provider_id.to_string());
            merged.combinations.insert(key, segment_refs);
        }

        // passenger ids come from the request and are shared, first provider wins
        for (passenger_id, passenger) in results.passengers {
            match merged.passengers.get(&passenger_id) {
                Some(existing) if *existing != passenger => tracing::debug!(
                    provider = provider_id,
                    passenger = %passenger_id,
                    "conflicting passenger entry ignored"
                ),
                Some(_) => {}
                None => {
                    merged.passengers.insert(passenger_id, passenger);
                }
            }
        }

        for (native_id, offer) in results.offers {
            let key = correlation_key(&mut mapper, provider_id, EntityKind::Offer, &native_id);
            let offer = correlate_offer_refs(&mut mapper, provider_id, offer);
            self.routes.put(
                key.clone(),
                OfferRoute {
                    provider_id: provider_id.to_string(),
                    native_offer_id: native_id,
                },
            );
            origins.insert(key.clone(), provider_id.to_string());
            merged.offers.insert(key, offer);
        }
    }

    // Permanent origin of any correlated entity, independent of the route horizon
    pub fn entity_origin(&self, correlation_key: &str) -> Result<EntityOrigin, CorrelationError> {
        let mapper = self.mapper.lock();
        let original = mapper.reverse(correlation_key)?;
        let mut parts = original.splitn(3, ENTITY_KEY_SEPARATOR);
        match (
            parts.next(),
            parts.next().and_then(EntityKind::parse),
            parts.next(),
        ) {
            (Some(provider_id), Some(kind), Some(native_id)) => Ok(EntityOrigin {
                provider_id: provider_id.to_string(),
                kind,
                native_id: native_id.to_string(),
            }),
            _ => Err(CorrelationError::NotFound(correlation_key.to_string())),
        }
    }

    fn resolve_route(
        &self,
        offer_key: &str,
    ) -> Result<(OfferRoute, Arc<dyn FlightProvider>), AggregationError> {
        let route = self
            .routes
            .get(&offer_key.to_string())
            .ok_or_else(|| AggregationError::UnknownEntity(offer_key.to_string()))?;
        let provider = self
            .registry
            .get(&route.provider_id)
            .ok_or_else(|| AggregationError::ProviderNotRegistered(route.provider_id.clone()))?;
        Ok((route, provider))
    }

    async fn follow_up<T>(
        &self,
        provider_id: &str,
        cancel: CancellationToken,
        call: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, AggregationError> {
        let timeout = self.config.follow_up_timeout();
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result.map_err(AggregationError::from),
            Err(_) => {
                cancel.cancel();
                tracing::warn!(
                    provider = provider_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "follow-up call timed out"
                );
                Err(AggregationError::ProviderTimeout {
                    provider_id: provider_id.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    // Prices an offer with the provider that produced it.
    // The priced offer comes back under a new provider id, it is correlated and routed like
    // a search result so it can be ordered afterwards.
    pub async fn price_offer(
        &self,
        offer_key: &str,
        request: &PriceRequest,
    ) -> Result<PricedOffer, AggregationError> {
        let (route, provider) = self.resolve_route(offer_key)?;
        tracing::info!(offer = offer_key, provider = %route.provider_id, "pricing offer");

        let cancel = CancellationToken::new();
        let priced = self
            .follow_up(
                &route.provider_id,
                cancel.clone(),
                provider.price_offer(&route.native_offer_id, request, cancel),
            )
            .await?;

        let (key, offer) = {
            let mut mapper = self.mapper.lock();
            let key = correlation_key(
                &mut mapper,
                &route.provider_id,
                EntityKind::Offer,
                &priced.offer_id,
            );
            (key, correlate_offer_refs(&mut mapper, &route.provider_id, priced.offer))
        };
        self.routes.put(
            key.clone(),
            OfferRoute {
                provider_id: route.provider_id,
                native_offer_id: priced.offer_id,
            },
        );

        Ok(PricedOffer { offer_id: key, offer })
    }

    // Retrieves the seat map of an offer; seats sharing a price share one option code.
    pub async fn retrieve_seatmap(&self, offer_key: &str) -> Result<SeatMap, AggregationError> {
        let (route, provider) = self.resolve_route(offer_key)?;
        tracing::info!(offer = offer_key, provider = %route.provider_id, "retrieving seatmap");

        let cancel = CancellationToken::new();
        let seatmap = self
            .follow_up(
                &route.provider_id,
                cancel.clone(),
                provider.retrieve_seatmap(&route.native_offer_id, cancel),
            )
            .await?;

        let mut option_codes = OptionCodeRegistry::new();
        let mut mapper = self.mapper.lock();
        let seats = seatmap
            .seats
            .into_iter()
            .map(|seat| Seat {
                segment_ref: correlation_key(
                    &mut mapper,
                    &route.provider_id,
                    EntityKind::Segment,
                    &seat.segment_ref,
                ),
                option_code: seat
                    .price
                    .as_ref()
                    .map(|price| option_codes.add_price(&seat.category, price)),
                number: seat.number,
                available: seat.available,
            })
            .collect();
        drop(mapper);

        Ok(SeatMap {
            seats,
            prices: option_codes.into_prices(),
        })
    }

    pub async fn create_order(
        &self,
        offer_key: &str,
        request: &OrderRequest,
    ) -> Result<Order, AggregationError> {
        let (route, provider) = self.resolve_route(offer_key)?;
        tracing::info!(offer = offer_key, provider = %route.provider_id, "creating order");

        let cancel = CancellationToken::new();
        let order = self
            .follow_up(
                &route.provider_id,
                cancel.clone(),
                provider.create_order(&route.native_offer_id, request, cancel),
            )
            .await?;
        tracing::info!(order = %order.order_id, status = ?order.status, "order created");
        Ok(order)
    }
}

fn correlation_key(
    mapper: &mut UuidMapper,
    provider_id: &str,
    kind: EntityKind,
    native_id: &str,
) -> String {
    mapper.map(&format!(
        "{}{sep}{}{sep}{}",
        provider_id,
        kind.as_str(),
        native_id,
        sep = ENTITY_KEY_SEPARATOR
    ))
}

fn correlate_offer_refs(mapper: &mut UuidMapper, provider_id: &str, mut offer: Offer) -> Offer {
    offer.segment_refs = offer
        .segment_refs
        .iter()
        .map(|native_id| correlation_key(mapper, provider_id, EntityKind::Segment, native_id))
        .collect();
    offer.price_plan_refs = offer
        .price_plan_refs
        .iter()
        .map(|native_id| correlation_key(mapper, provider_id, EntityKind::PricePlan, native_id))
        .collect();
    offer
}

// One provider search running as its own task. A provider that misses the deadline is
// cancelled cooperatively and left to finish on its own, its late answer is only logged.
struct PendingSearch {
    provider_id: String,
    cancel: CancellationToken,
    started: Instant,
    handle: JoinHandle<Result<SearchResults, ProviderError>>,
}

impl PendingSearch {
    fn spawn(provider: Arc<dyn FlightProvider>, request: Arc<SearchRequest>) -> Self {
        let provider_id = provider.provider_id().to_string();
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let handle =
            tokio::spawn(async move { provider.search_offers(&request, task_cancel).await });
        Self {
            provider_id,
            cancel,
            started: Instant::now(),
            handle,
        }
    }

    async fn collect(self, timeout: Duration) -> (String, ProviderResult) {
        let PendingSearch {
            provider_id,
            cancel,
            started,
            mut handle,
        } = self;

        let outcome = match tokio::time::timeout_at(started + timeout, &mut handle).await {
            Ok(Ok(Ok(results))) => {
                tracing::debug!(
                    provider = %provider_id,
                    offers = results.offers.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "provider search completed"
                );
                ProviderResult::Success(results)
            }
            Ok(Ok(Err(error))) => {
                tracing::warn!(provider = %provider_id, error = %error, "provider search failed");
                ProviderResult::Failure(error)
            }
            Ok(Err(join_error)) => {
                tracing::error!(provider = %provider_id, error = %join_error, "provider search task died");
                ProviderResult::Failure(ProviderError::upstream(
                    &provider_id,
                    anyhow::anyhow!("provider task did not complete: {}", join_error),
                ))
            }
            Err(_) => {
                tracing::warn!(
                    provider = %provider_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "provider search timed out"
                );
                cancel.cancel();
                let late_provider = provider_id.clone();
                tokio::spawn(async move {
                    match handle.await {
                        Ok(Ok(results)) => tracing::debug!(
                            provider = %late_provider,
                            offers = results.offers.len(),
                            "late provider answer discarded"
                        ),
                        Ok(Err(error)) => tracing::debug!(
                            provider = %late_provider,
                            error = %error,
                            "late provider failure discarded"
                        ),
                        Err(_) => {}
                    }
                });
                ProviderResult::TimedOut
            }
        };

        (provider_id, outcome)
    }
}
