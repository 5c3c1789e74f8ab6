//! Money in the smallest currency unit.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::quantity::Quantity;
use crate::value_object::ValueObject;

/// Non-negative amount of money, stored in the smallest currency unit (cents).
///
/// All arithmetic is checked: an overflow is reported instead of wrapping, so a
/// running order total can never silently drift.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    pub const fn cents(self) -> u64 {
        self.0
    }

    /// Build from a signed storage value (e.g. a Postgres `BIGINT`).
    pub fn try_from_cents(cents: i64) -> DomainResult<Self> {
        u64::try_from(cents)
            .map(Self)
            .map_err(|_| DomainError::validation(format!("amount cannot be negative: {cents}")))
    }

    /// Signed representation for storage backends without unsigned integers.
    pub fn to_signed_cents(self) -> DomainResult<i64> {
        i64::try_from(self.0)
            .map_err(|_| DomainError::invariant(format!("amount out of range: {}", self.0)))
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// `self × quantity`, e.g. a line subtotal.
    pub fn checked_mul(self, quantity: Quantity) -> Option<Money> {
        let units = u64::try_from(quantity.get()).ok()?;
        self.0.checked_mul(units).map(Money)
    }

    /// Sum of many amounts; `None` on overflow.
    pub fn checked_sum<I>(amounts: I) -> Option<Money>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, m| acc.checked_add(m))
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}
