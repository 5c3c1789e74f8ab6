//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Products, customers and orders are entities: two snapshots with the same
/// id describe the same thing even when their attributes differ (a product
/// whose price changed is still the same product).
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
