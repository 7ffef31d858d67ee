// Canonical in-memory structures exchanged between the gateway and its providers.
// Providers translate their own XML/SOAP dialects into these; dictionary keys are
// provider-native ids on the way in and correlation keys once merged.

use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub amount: f64,
    pub currency: String,
}

impl Price {
    pub fn new(amount: f64, currency: &str) -> Self {
        Self {
            amount,
            currency: currency.to_string(),
        }
    }

    // Amount in minor units (2 decimals), so 10.1 and 10.10000001 compare equal
    pub fn normalized_amount(&self) -> i64 {
        (self.amount * 100.0).round() as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PassengerType {
    Adt,
    Chd,
    Inf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassengerCriteria {
    pub passenger_type: PassengerType,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub origin: String,
    pub destination: String,
    pub departure: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub passengers: Vec<PassengerCriteria>,
    pub cabin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub origin: String,
    pub destination: String,
    pub departure: DateTime<Utc>,
    pub arrival: DateTime<Utc>,
    pub marketing_carrier: String,
    pub flight_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePlan {
    pub name: String,
    pub amenities: Vec<String>,
    pub checked_baggages: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passenger {
    pub passenger_type: PassengerType,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub price: Price,
    pub segment_refs: Vec<String>,
    pub price_plan_refs: Vec<String>,
    pub passenger_refs: Vec<String>,
    pub expiration: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub offers: IndexMap<String, Offer>,
    pub segments: IndexMap<String, Segment>,
    pub price_plans: IndexMap<String, PricePlan>,
    pub passengers: IndexMap<String, Passenger>,
    // itinerary id -> ids of the segments it is flown on
    #[serde(default)]
    pub combinations: IndexMap<String, Vec<String>>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }
}

// Options (seats, bags, ...) selected for pricing, as option codes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceRequest {
    pub selected_options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedOffer {
    pub offer_id: String,
    pub offer: Offer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSeat {
    pub segment_ref: String,
    pub number: String,
    pub category: String,
    pub available: bool,
    pub price: Option<Price>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderSeatMap {
    pub seats: Vec<ProviderSeat>,
}

// Seats reference a shared option code instead of repeating the price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seat {
    pub segment_ref: String,
    pub number: String,
    pub available: bool,
    pub option_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeatMap {
    pub seats: Vec<Seat>,
    pub prices: IndexMap<String, Price>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassengerDetails {
    pub passenger_ref: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub passengers: Vec<PassengerDetails>,
    pub selected_options: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Created,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub status: OrderStatus,
    pub total: Price,
}
