//! Shared order-book state for a single instrument.
//!
//! The feed is the only writer and mutates the book under the shared lock;
//! the compute worker clones it under the same lock. Keeping every mutation
//! a plain in-memory merge is what guarantees a reader can never observe a
//! ladder mid-update.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// One parsed ladder level: (price, size)
pub type Level = (f64, f64);

/// Live order book. Price keys are in cents so the ladders sort numerically.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    pub bids: BTreeMap<i64, Decimal>, // price_cents -> size
    pub asks: BTreeMap<i64, Decimal>,
    pub last_update_time: Option<DateTime<Utc>>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace both ladders with a fresh snapshot.
    pub fn replace(&mut self, bids: &[Level], asks: &[Level], ts: DateTime<Utc>) {
        self.bids.clear();
        self.asks.clear();
        self.merge(bids, asks, ts);
    }

    /// Merge incremental level updates; a zero size removes the level.
    pub fn merge(&mut self, bids: &[Level], asks: &[Level], ts: DateTime<Utc>) {
        for &(price, size) in bids {
            apply_level(&mut self.bids, price, size);
        }
        for &(price, size) in asks {
            apply_level(&mut self.asks, price, size);
        }
        self.last_update_time = Some(ts);
    }

    /// Get best bid price
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next_back().map(price_from_cents)
    }

    /// Get best ask price
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().map(price_from_cents)
    }

    /// Get mid price
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::from(2)),
            _ => None,
        }
    }

    /// Total number of populated levels across both ladders
    pub fn depth(&self) -> usize {
        self.bids.len() + self.asks.len()
    }

    /// Deterministic digest of the ladders, used to seed the matrix fill.
    /// Equal books produce equal digests; any level change perturbs it.
    pub fn digest(&self) -> u64 {
        let mut acc: u64 = 0xcbf29ce484222325;
        for (tag, side) in [(0u64, &self.bids), (1u64, &self.asks)] {
            for (price_cents, size) in side {
                acc ^= (*price_cents as u64).wrapping_add(tag);
                acc = acc.wrapping_mul(0x100000001b3);
                acc ^= size.mantissa() as u64;
                acc = acc.wrapping_mul(0x100000001b3);
            }
        }
        acc
    }
}

fn apply_level(side: &mut BTreeMap<i64, Decimal>, price: f64, size: f64) {
    let price_cents = (price * 100.0).round() as i64;
    if size == 0.0 {
        side.remove(&price_cents);
    } else {
        side.insert(price_cents, Decimal::try_from(size).unwrap_or_default());
    }
}

fn price_from_cents(&cents: &i64) -> Decimal {
    Decimal::from(cents) / Decimal::from(100)
}
