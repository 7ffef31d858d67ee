// Provider contract
// Every upstream airline/hotel integration implements FlightProvider; the aggregator only
// depends on this trait. Calls receive a cancellation token which is cancelled once the
// gateway stops waiting, implementations are expected to check it cooperatively.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::model::{
    Order, OrderRequest, PriceRequest, PricedOffer, ProviderSeatMap, SearchRequest,
    SearchResults,
};

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider {provider_id} failed: {source}")]
    Upstream {
        provider_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Provider {provider_id} does not support {operation}")]
    Unsupported {
        provider_id: String,
        operation: &'static str,
    },

    #[error("Provider {provider_id} call was cancelled")]
    Cancelled { provider_id: String },
}

impl ProviderError {
    pub fn upstream(provider_id: &str, source: impl Into<anyhow::Error>) -> Self {
        ProviderError::Upstream {
            provider_id: provider_id.to_string(),
            source: source.into(),
        }
    }

    pub fn provider_id(&self) -> &str {
        match self {
            ProviderError::Upstream { provider_id, .. }
            | ProviderError::Unsupported { provider_id, .. }
            | ProviderError::Cancelled { provider_id } => provider_id,
        }
    }
}

#[async_trait]
pub trait FlightProvider: Send + Sync + 'static {
    fn provider_id(&self) -> &str;

    async fn search_offers(
        &self,
        request: &SearchRequest,
        cancel: CancellationToken,
    ) -> Result<SearchResults, ProviderError>;

    // offer_id is the provider-native id the offer was returned with
    async fn price_offer(
        &self,
        offer_id: &str,
        request: &PriceRequest,
        cancel: CancellationToken,
    ) -> Result<PricedOffer, ProviderError>;

    async fn retrieve_seatmap(
        &self,
        _offer_id: &str,
        _cancel: CancellationToken,
    ) -> Result<ProviderSeatMap, ProviderError> {
        Err(ProviderError::Unsupported {
            provider_id: self.provider_id().to_string(),
            operation: "seatmap",
        })
    }

    async fn create_order(
        &self,
        _offer_id: &str,
        _request: &OrderRequest,
        _cancel: CancellationToken,
    ) -> Result<Order, ProviderError> {
        Err(ProviderError::Unsupported {
            provider_id: self.provider_id().to_string(),
            operation: "order creation",
        })
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Provider {0} is already registered")]
    DuplicateProvider(String),
}

// Registration order is the dispatch order, and the tie-break when merged results collide
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn FlightProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn FlightProvider>) -> Result<(), RegistryError> {
        if self.get(provider.provider_id()).is_some() {
            return Err(RegistryError::DuplicateProvider(
                provider.provider_id().to_string(),
            ));
        }
        tracing::info!(provider = provider.provider_id(), "provider registered");
        self.providers.push(provider);
        Ok(())
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn FlightProvider>> {
        self.providers
            .iter()
            .find(|provider| provider.provider_id() == provider_id)
            .cloned()
    }

    pub fn providers(&self) -> &[Arc<dyn FlightProvider>] {
        &self.providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.providers.iter().map(|p| p.provider_id()))
            .finish()
    }
}

// Configurable provider for tests
#[cfg(test)]
pub mod mock_provider {
    use super::*;
    use crate::model::{
        Offer, OrderStatus, Passenger, PassengerType, Price, PricePlan, ProviderSeat, Segment,
    };
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        Succeed(SearchResults),
        Fail(String),
    }

    pub struct MockProvider {
        id: String,
        behavior: MockBehavior,
        delay: Duration,
        pub search_calls: AtomicUsize,
        pub price_calls: AtomicUsize,
        pub seatmap_calls: AtomicUsize,
        pub order_calls: AtomicUsize,
        pub observed_cancel: AtomicBool,
    }

    impl MockProvider {
        pub fn new(id: &str, behavior: MockBehavior) -> Self {
            Self {
                id: id.to_string(),
                behavior,
                delay: Duration::ZERO,
                search_calls: AtomicUsize::new(0),
                price_calls: AtomicUsize::new(0),
                seatmap_calls: AtomicUsize::new(0),
                order_calls: AtomicUsize::new(0),
                observed_cancel: AtomicBool::new(false),
            }
        }

        pub fn succeeding(id: &str, offers: usize) -> Self {
            Self::new(id, MockBehavior::Succeed(sample_results(id, offers)))
        }

        pub fn failing(id: &str, message: &str) -> Self {
            Self::new(id, MockBehavior::Fail(message.to_string()))
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        // Sleeps for the configured delay unless cancelled first
        async fn simulate_latency(&self, cancel: &CancellationToken) -> Result<(), ProviderError> {
            if self.delay.is_zero() {
                return Ok(());
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.observed_cancel.store(true, Ordering::SeqCst);
                    Err(ProviderError::Cancelled { provider_id: self.id.clone() })
                }
                _ = tokio::time::sleep(self.delay) => Ok(()),
            }
        }

        fn results(&self) -> Result<&SearchResults, ProviderError> {
            match &self.behavior {
                MockBehavior::Succeed(results) => Ok(results),
                MockBehavior::Fail(message) => Err(ProviderError::upstream(
                    &self.id,
                    anyhow::anyhow!(message.clone()),
                )),
            }
        }
    }

    #[async_trait]
    impl FlightProvider for MockProvider {
        fn provider_id(&self) -> &str {
            &self.id
        }

        async fn search_offers(
            &self,
            _request: &SearchRequest,
            cancel: CancellationToken,
        ) -> Result<SearchResults, ProviderError> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            self.simulate_latency(&cancel).await?;
            self.results().cloned()
        }

        async fn price_offer(
            &self,
            offer_id: &str,
            request: &PriceRequest,
            cancel: CancellationToken,
        ) -> Result<PricedOffer, ProviderError> {
            self.price_calls.fetch_add(1, Ordering::SeqCst);
            self.simulate_latency(&cancel).await?;
            let results = self.results()?;
            let mut offer = results.offers.get(offer_id).cloned().ok_or_else(|| {
                ProviderError::upstream(&self.id, anyhow::anyhow!("unknown offer {}", offer_id))
            })?;
            // every selected option adds a flat 10.0
            offer.price.amount += 10.0 * request.selected_options.len() as f64;
            Ok(PricedOffer {
                offer_id: format!("{}-PRICED", offer_id),
                offer,
            })
        }

        async fn retrieve_seatmap(
            &self,
            offer_id: &str,
            cancel: CancellationToken,
        ) -> Result<ProviderSeatMap, ProviderError> {
            self.seatmap_calls.fetch_add(1, Ordering::SeqCst);
            self.simulate_latency(&cancel).await?;
            let results = self.results()?;
            let offer = results.offers.get(offer_id).ok_or_else(|| {
                ProviderError::upstream(&self.id, anyhow::anyhow!("unknown offer {}", offer_id))
            })?;
            let segment_ref = offer.segment_refs[0].clone();
            let seat = |number: &str, category: &str, price: Option<f64>| ProviderSeat {
                segment_ref: segment_ref.clone(),
                number: number.to_string(),
                category: category.to_string(),
                available: true,
                price: price.map(|amount| Price::new(amount, "EUR")),
            };
            Ok(ProviderSeatMap {
                seats: vec![
                    seat("1A", "EXTRA LEGROOM", Some(35.0)),
                    seat("1B", "EXTRA LEGROOM", Some(35.0)),
                    seat("1C", "EXTRA LEGROOM", Some(40.0)),
                    seat("12A", "STANDARD", None),
                    seat("12B", "STANDARD", Some(5.0)),
                ],
            })
        }

        async fn create_order(
            &self,
            offer_id: &str,
            _request: &OrderRequest,
            cancel: CancellationToken,
        ) -> Result<Order, ProviderError> {
            self.order_calls.fetch_add(1, Ordering::SeqCst);
            self.simulate_latency(&cancel).await?;
            let results = self.results()?;
            let total = results
                .offers
                .get(offer_id)
                .map(|offer| offer.price.clone())
                .unwrap_or_else(|| Price::new(0.0, "EUR"));
            Ok(Order {
                order_id: format!("{}-ORDER-{}", self.id, offer_id),
                status: OrderStatus::Confirmed,
                total,
            })
        }
    }

    // A provider-native result set: offers "OF1".."OFn", one segment, itinerary and price plan
    // per offer, and a shared "PAX1" passenger entry. Native ids repeat across providers on purpose.
    pub fn sample_results(provider_id: &str, offers: usize) -> SearchResults {
        let mut results = SearchResults::default();
        results.passengers.insert(
            "PAX1".to_string(),
            Passenger {
                passenger_type: PassengerType::Adt,
                count: 1,
            },
        );
        for i in 1..=offers {
            let departure = Utc.with_ymd_and_hms(2025, 6, 1, 8 + i as u32, 0, 0).unwrap();
            results.segments.insert(
                format!("SEG{}", i),
                Segment {
                    origin: "JFK".to_string(),
                    destination: "LHR".to_string(),
                    departure,
                    arrival: departure + chrono::Duration::hours(7),
                    marketing_carrier: provider_id.to_uppercase(),
                    flight_number: format!("{}", 100 + i),
                },
            );
            results
                .combinations
                .insert(format!("IT{}", i), vec![format!("SEG{}", i)]);
            results.price_plans.insert(
                format!("PP{}", i),
                PricePlan {
                    name: format!("{} basic", provider_id),
                    amenities: vec!["Carry-on".to_string()],
                    checked_baggages: 0,
                },
            );
            results.offers.insert(
                format!("OF{}", i),
                Offer {
                    price: Price::new(100.0 * i as f64, "EUR"),
                    segment_refs: vec![format!("SEG{}", i)],
                    price_plan_refs: vec![format!("PP{}", i)],
                    passenger_refs: vec!["PAX1".to_string()],
                    expiration: None,
                },
            );
        }
        results
    }
}
