use serde::{Deserialize, Serialize};

use shopfloor_core::{AggregateId, DomainError, DomainResult, Entity, Money, StockLevel};

/// Product identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for ProductId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<AggregateId>()
            .map(Self)
            .map_err(|_| DomainError::invalid_id(format!("ProductId: {s}")))
    }
}

/// Reference to a product category (categories themselves are catalog data).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub i64);

/// Product status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Inactive,
}

impl ProductStatus {
    pub fn is_active(self) -> bool {
        matches!(self, ProductStatus::Active)
    }
}

/// Catalog entry: price, on-hand stock and sellability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    name: String,
    category_id: CategoryId,
    unit_price: Money,
    available: StockLevel,
    status: ProductStatus,
}

impl Product {
    /// Create an active product.
    pub fn new(
        id: ProductId,
        name: impl Into<String>,
        category_id: CategoryId,
        unit_price: Money,
        available: StockLevel,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        Ok(Self {
            id,
            name,
            category_id,
            unit_price,
            available,
            status: ProductStatus::Active,
        })
    }

    pub fn with_status(mut self, status: ProductStatus) -> Self {
        self.status = status;
        self
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category_id(&self) -> CategoryId {
        self.category_id
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn available(&self) -> StockLevel {
        self.available
    }

    pub fn status(&self) -> ProductStatus {
        self.status
    }

    /// Check if product can be sold (must be Active).
    pub fn can_be_sold(&self) -> bool {
        self.status.is_active()
    }

    pub fn set_unit_price(&mut self, unit_price: Money) {
        self.unit_price = unit_price;
    }

    pub fn set_status(&mut self, status: ProductStatus) {
        self.status = status;
    }

    /// Overwrite the on-hand level.
    ///
    /// Only stock movements (reserve/release) and seeding go through here.
    pub fn set_available(&mut self, available: StockLevel) {
        self.available = available;
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn widget() -> Product {
        Product::new(
            test_product_id(),
            "Widget",
            CategoryId(1),
            Money::from_cents(1000),
            StockLevel::new(5).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn new_product_is_active_and_sellable() {
        let product = widget();
        assert_eq!(product.status(), ProductStatus::Active);
        assert!(product.can_be_sold());
        assert_eq!(product.available().get(), 5);
    }

    #[test]
    fn blank_name_is_rejected() {
        let err = Product::new(
            test_product_id(),
            "   ",
            CategoryId(1),
            Money::ZERO,
            StockLevel::EMPTY,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn inactive_product_cannot_be_sold() {
        let product = widget().with_status(ProductStatus::Inactive);
        assert!(!product.can_be_sold());
    }

    #[test]
    fn product_id_parses_from_display() {
        let id = test_product_id();
        assert_eq!(id.to_string().parse::<ProductId>().unwrap(), id);
        assert!("nope".parse::<ProductId>().is_err());
    }

    #[test]
    fn identity_survives_price_change() {
        let mut product = widget();
        let id = *product.id();
        product.set_unit_price(Money::from_cents(1500));
        assert_eq!(*product.id(), id);
        assert_eq!(product.unit_price(), Money::from_cents(1500));
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: any non-blank name and non-negative stock builds an active product.
            #[test]
            fn valid_inputs_build_active_products(
                name in "[A-Za-z][A-Za-z0-9 ]{0,40}",
                cents in 0u64..1_000_000,
                stock in 0i64..100_000,
            ) {
                let product = Product::new(
                    test_product_id(),
                    name.clone(),
                    CategoryId(7),
                    Money::from_cents(cents),
                    StockLevel::new(stock).unwrap(),
                ).unwrap();
                prop_assert_eq!(product.name(), name.as_str());
                prop_assert_eq!(product.unit_price().cents(), cents);
                prop_assert_eq!(product.available().get(), stock);
                prop_assert!(product.can_be_sold());
            }
        }
    }
}
