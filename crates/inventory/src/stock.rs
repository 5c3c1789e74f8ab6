use serde::{Deserialize, Serialize};
use thiserror::Error;

use shopfloor_core::{Quantity, StockLevel};
use shopfloor_products::{Product, ProductId};

/// A change to a product's on-hand level.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "quantity", rename_all = "lowercase")]
pub enum StockMovement {
    /// Take units out for a line item.
    Reserve(Quantity),
    /// Put units back (undo of a reservation).
    Release(Quantity),
}

impl StockMovement {
    pub fn quantity(self) -> Quantity {
        match self {
            StockMovement::Reserve(q) | StockMovement::Release(q) => q,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    /// The product does not exist or is not active.
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: Quantity,
        available: StockLevel,
    },

    #[error("stock level overflow for product {0}")]
    Overflow(ProductId),
}

/// Read-only feasibility check.
///
/// Missing or inactive products are never available. This is advisory only:
/// a `true` here does not hold any units.
pub fn check_available(product: Option<&Product>, quantity: Quantity) -> bool {
    match product {
        Some(p) => p.can_be_sold() && p.available().covers(quantity),
        None => false,
    }
}

/// Decide the level that results from applying `movement` to `product`.
///
/// Reservations require an active product and enough units. Releases are
/// accepted for inactive products too, since they undo an earlier reservation.
pub fn apply_movement(product: &Product, movement: StockMovement) -> Result<StockLevel, StockError> {
    let product_id = product.id_typed();
    match movement {
        StockMovement::Reserve(q) => {
            if !product.can_be_sold() {
                return Err(StockError::ProductNotFound(product_id));
            }
            product
                .available()
                .take(q)
                .ok_or(StockError::InsufficientStock {
                    product_id,
                    requested: q,
                    available: product.available(),
                })
        }
        StockMovement::Release(q) => product
            .available()
            .put(q)
            .ok_or(StockError::Overflow(product_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopfloor_core::{AggregateId, Money};
    use shopfloor_products::{CategoryId, ProductStatus};

    fn qty(n: i64) -> Quantity {
        Quantity::new(n).unwrap()
    }

    fn product_with_stock(units: i64) -> Product {
        Product::new(
            ProductId::new(AggregateId::new()),
            "Widget",
            CategoryId(1),
            Money::from_cents(1000),
            StockLevel::new(units).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn reserve_decrements_when_enough_stock() {
        let p = product_with_stock(5);
        let next = apply_movement(&p, StockMovement::Reserve(qty(3))).unwrap();
        assert_eq!(next.get(), 2);
    }

    #[test]
    fn reserve_fails_without_enough_stock() {
        let p = product_with_stock(2);
        let err = apply_movement(&p, StockMovement::Reserve(qty(3))).unwrap_err();
        match err {
            StockError::InsufficientStock {
                requested,
                available,
                ..
            } => {
                assert_eq!(requested.get(), 3);
                assert_eq!(available.get(), 2);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
    }

    #[test]
    fn reserve_on_inactive_product_is_not_found() {
        let p = product_with_stock(10).with_status(ProductStatus::Inactive);
        let err = apply_movement(&p, StockMovement::Reserve(qty(1))).unwrap_err();
        assert_eq!(err, StockError::ProductNotFound(p.id_typed()));
    }

    #[test]
    fn release_is_allowed_on_inactive_product() {
        let p = product_with_stock(1).with_status(ProductStatus::Inactive);
        let next = apply_movement(&p, StockMovement::Release(qty(4))).unwrap();
        assert_eq!(next.get(), 5);
    }

    #[test]
    fn check_available_covers_missing_inactive_and_short() {
        let p = product_with_stock(3);
        assert!(check_available(Some(&p), qty(3)));
        assert!(!check_available(Some(&p), qty(4)));
        assert!(!check_available(None, qty(1)));
        let inactive = p.with_status(ProductStatus::Inactive);
        assert!(!check_available(Some(&inactive), qty(1)));
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 500,
                ..ProptestConfig::default()
            })]

            /// Property: any sequence of reserve/release keeps stock non-negative and
            /// equal to start - reserved + released (counting only accepted movements).
            #[test]
            fn movements_never_drive_stock_negative(
                start in 0i64..50,
                moves in proptest::collection::vec((any::<bool>(), 1i64..20), 0..60)
            ) {
                let mut p = product_with_stock(start);
                let mut expected = start;
                for (is_reserve, n) in moves {
                    let movement = if is_reserve {
                        StockMovement::Reserve(qty(n))
                    } else {
                        StockMovement::Release(qty(n))
                    };
                    if let Ok(next) = apply_movement(&p, movement) {
                        expected += if is_reserve { -n } else { n };
                        p.set_available(next);
                    }
                    prop_assert!(p.available().get() >= 0);
                    prop_assert_eq!(p.available().get(), expected);
                }
            }
        }
    }
}
