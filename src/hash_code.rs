// Composite hash codes
// Folds an ordered sequence of values into one deterministic 32-bit signed integer.
// Used to deduplicate derived values (option codes) without keeping them by reference.

use chrono::{DateTime, Utc};

// Fixed hashes for booleans, same constants as java.lang.Boolean
pub const TRUE_HASH: i32 = 1231;
pub const FALSE_HASH: i32 = 1237;

// A value that can be fed to the hash builder.
// Field names of composite values are never part of the hash, only the values in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub enum HashValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(DateTime<Utc>),
    Composite(Vec<HashValue>),
}

impl HashValue {
    pub fn hash_code(&self) -> i32 {
        match self {
            HashValue::Null => 0,
            HashValue::Bool(true) => TRUE_HASH,
            HashValue::Bool(false) => FALSE_HASH,
            HashValue::Int(value) => hash_i64(*value),
            HashValue::Float(value) => hash_f64(*value),
            HashValue::Str(value) => hash_str(value),
            HashValue::Date(value) => hash_i64(value.timestamp_millis()),
            HashValue::Composite(fields) => combine(fields),
        }
    }
}

// Combines the values in order: `acc = (acc << 5) - acc + hash(value)` with 32-bit wrap-around.
// An empty sequence hashes to 0. Feeding the same values in a different order may
// produce a different result, so callers must use a canonical order.
pub fn combine(values: &[HashValue]) -> i32 {
    values
        .iter()
        .fold(0, |acc, value| fold(acc, value.hash_code()))
}

fn fold(acc: i32, value_hash: i32) -> i32 {
    acc.wrapping_shl(5).wrapping_sub(acc).wrapping_add(value_hash)
}

// Rolling hash over UTF-16 code units
fn hash_str(value: &str) -> i32 {
    value
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

fn hash_i64(value: i64) -> i32 {
    match i32::try_from(value) {
        Ok(small) => small,
        Err(_) => {
            let bits = value as u64;
            (bits ^ (bits >> 32)) as u32 as i32
        }
    }
}

// Integral floats hash like the equal integer so 100.0 and 100 agree
fn hash_f64(value: f64) -> i32 {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        return hash_i64(value as i64);
    }
    let bits = if value.is_nan() {
        f64::NAN.to_bits()
    } else {
        value.to_bits()
    };
    (bits ^ (bits >> 32)) as u32 as i32
}

// Stateful wrapper: add values one by one, then compute
#[derive(Debug, Clone, Default)]
pub struct HashCodeBuilder {
    acc: i32,
    count: usize,
}

impl HashCodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, value: impl Into<HashValue>) -> Self {
        self.push(value);
        self
    }

    pub fn push(&mut self, value: impl Into<HashValue>) {
        self.acc = fold(self.acc, value.into().hash_code());
        self.count += 1;
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn compute(&self) -> i32 {
        self.acc
    }
}

impl From<&str> for HashValue {
    fn from(value: &str) -> Self {
        HashValue::Str(value.to_string())
    }
}

impl From<String> for HashValue {
    fn from(value: String) -> Self {
        HashValue::Str(value)
    }
}

impl From<&String> for HashValue {
    fn from(value: &String) -> Self {
        HashValue::Str(value.clone())
    }
}

impl From<bool> for HashValue {
    fn from(value: bool) -> Self {
        HashValue::Bool(value)
    }
}

impl From<i32> for HashValue {
    fn from(value: i32) -> Self {
        HashValue::Int(i64::from(value))
    }
}

impl From<i64> for HashValue {
    fn from(value: i64) -> Self {
        HashValue::Int(value)
    }
}

impl From<u32> for HashValue {
    fn from(value: u32) -> Self {
        HashValue::Int(i64::from(value))
    }
}

impl From<f64> for HashValue {
    fn from(value: f64) -> Self {
        HashValue::Float(value)
    }
}

impl From<DateTime<Utc>> for HashValue {
    fn from(value: DateTime<Utc>) -> Self {
        HashValue::Date(value)
    }
}

impl<T: Into<HashValue>> From<Option<T>> for HashValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(HashValue::Null, Into::into)
    }
}

impl<T: Into<HashValue>> From<Vec<T>> for HashValue {
    fn from(values: Vec<T>) -> Self {
        HashValue::Composite(values.into_iter().map(Into::into).collect())
    }
}

impl From<()> for HashValue {
    fn from(_: ()) -> Self {
        HashValue::Null
    }
}
