// Option code registry
// Assigns one shared code per (category, price) so that many seats with the same price
// reference a single entry of the price dictionary instead of repeating the price.
// Scoped to one response-building pass.

use indexmap::IndexMap;
use std::collections::HashMap;

use crate::hash_code::HashCodeBuilder;
use crate::model::Price;

type OptionHashFn = fn(category: &str, currency: &str, amount: i64, attempt: u32) -> i32;

fn default_option_hash(category: &str, currency: &str, amount: i64, attempt: u32) -> i32 {
    let mut builder = HashCodeBuilder::new()
        .add(category)
        .add(currency)
        .add(amount);
    if attempt > 0 {
        builder.push(attempt);
    }
    builder.compute()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PriceKey {
    category: String,
    currency: String,
    amount: i64,
}

#[derive(Debug, Clone)]
struct OptionEntry {
    key: PriceKey,
    code: String,
}

pub struct OptionCodeRegistry {
    slots: HashMap<i32, OptionEntry>,
    prices: IndexMap<String, Price>,
    collisions: usize,
    hash_fn: OptionHashFn,
}

impl OptionCodeRegistry {
    pub fn new() -> Self {
        Self::with_hash_fn(default_option_hash)
    }

    fn with_hash_fn(hash_fn: OptionHashFn) -> Self {
        Self {
            slots: HashMap::new(),
            prices: IndexMap::new(),
            collisions: 0,
            hash_fn,
        }
    }

    // Returns the option code for `category` at `price`.
    // Equal (category, currency, normalized amount) triples always get the same code and
    // only the first occurrence is stored. A different triple landing on an occupied hash
    // is never given the occupant's code: the hash is re-probed with an attempt counter
    // until a free slot is found, and the collision is logged and counted.
    pub fn add_price(&mut self, category: &str, price: &Price) -> String {
        let key = PriceKey {
            category: category.to_string(),
            currency: price.currency.clone(),
            amount: price.normalized_amount(),
        };

        let mut attempt = 0u32;
        loop {
            let hash = (self.hash_fn)(&key.category, &key.currency, key.amount, attempt);
            match self.slots.get(&hash) {
                Some(entry) if entry.key == key => return entry.code.clone(),
                Some(entry) => {
                    tracing::debug!(
                        hash,
                        attempt,
                        occupant = %entry.code,
                        "option code hash occupied by a different price"
                    );
                    attempt += 1;
                }
                None => {
                    if attempt > 0 {
                        self.collisions += 1;
                        tracing::warn!(
                            category,
                            currency = %key.currency,
                            amount = key.amount,
                            attempts = attempt,
                            "option code hash collision resolved by re-probing"
                        );
                    }
                    let code = format_option_code(hash, category);
                    self.prices.insert(code.clone(), price.clone());
                    self.slots.insert(
                        hash,
                        OptionEntry {
                            key,
                            code: code.clone(),
                        },
                    );
                    return code;
                }
            }
        }
    }

    pub fn get_prices(&self) -> &IndexMap<String, Price> {
        &self.prices
    }

    pub fn into_prices(self) -> IndexMap<String, Price> {
        self.prices
    }

    pub fn collisions(&self) -> usize {
        self.collisions
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl Default for OptionCodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// e.g. "0001F7A2.EXTRALEGROOM"
fn format_option_code(hash: i32, category: &str) -> String {
    let category: String = category.chars().filter(|c| !c.is_whitespace()).collect();
    format!("{:08X}.{}", hash as u32, category)
}
