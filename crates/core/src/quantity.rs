//! Unit counts: requested quantities and on-hand stock levels.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// A strictly positive number of units (what a customer asks for).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Quantity(i64);

impl ValueObject for Quantity {}

impl Quantity {
    pub fn new(units: i64) -> DomainResult<Self> {
        if units <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        Ok(Self(units))
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for Quantity {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Quantity::new(value)
    }
}

impl From<Quantity> for i64 {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Units on hand for a product. Never negative.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct StockLevel(i64);

impl ValueObject for StockLevel {}

impl StockLevel {
    pub const EMPTY: StockLevel = StockLevel(0);

    pub fn new(units: i64) -> DomainResult<Self> {
        if units < 0 {
            return Err(DomainError::invariant("stock cannot go negative"));
        }
        Ok(Self(units))
    }

    pub const fn get(self) -> i64 {
        self.0
    }

    pub fn covers(self, quantity: Quantity) -> bool {
        self.0 >= quantity.get()
    }

    /// Level after taking `quantity` out, or `None` if that would go below zero.
    pub fn take(self, quantity: Quantity) -> Option<StockLevel> {
        let next = self.0.checked_sub(quantity.get())?;
        (next >= 0).then_some(StockLevel(next))
    }

    /// Level after putting `quantity` back, or `None` on overflow.
    pub fn put(self, quantity: Quantity) -> Option<StockLevel> {
        self.0.checked_add(quantity.get()).map(StockLevel)
    }
}

impl TryFrom<i64> for StockLevel {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        StockLevel::new(value)
    }
}

impl From<StockLevel> for i64 {
    fn from(value: StockLevel) -> Self {
        value.0
    }
}

impl core::fmt::Display for StockLevel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}
