//! Reference (association) definitions between entities.

use serde::{Deserialize, Serialize};

/// Cardinality of a reference, seen from its owning entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    /// Single related object; the key may live on either side.
    OneToOne,
    /// Collection of related objects holding a key to the owner.
    OneToMany,
    /// Single related object referenced by a key on the owner.
    ManyToOne,
}

/// A reference element of an entity.
///
/// Related objects of a row `r` are the `to_entity` objects `t` with
/// `t.to_field == r.from_field`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDef {
    /// Member name on the owning entity.
    pub name: String,
    /// Owning entity name.
    pub from_entity: String,
    /// Target entity name.
    pub to_entity: String,
    /// Reference cardinality.
    pub cardinality: Cardinality,
    /// Field on the owning entity.
    pub from_field: String,
    /// Field on the target entity.
    pub to_field: String,
    /// Whether the reference is loaded on demand rather than eagerly.
    pub lazy: bool,
}

impl RelationDef {
    fn build(
        cardinality: Cardinality,
        name: impl Into<String>,
        from_entity: impl Into<String>,
        from_field: impl Into<String>,
        to_entity: impl Into<String>,
        to_field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            from_entity: from_entity.into(),
            to_entity: to_entity.into(),
            cardinality,
            from_field: from_field.into(),
            to_field: to_field.into(),
            lazy: true,
        }
    }

    /// Create a one-to-one reference.
    pub fn one_to_one(
        name: impl Into<String>,
        from_entity: impl Into<String>,
        from_field: impl Into<String>,
        to_entity: impl Into<String>,
        to_field: impl Into<String>,
    ) -> Self {
        Self::build(
            Cardinality::OneToOne,
            name,
            from_entity,
            from_field,
            to_entity,
            to_field,
        )
    }

    /// Create a one-to-many (collection) reference.
    pub fn one_to_many(
        name: impl Into<String>,
        from_entity: impl Into<String>,
        from_field: impl Into<String>,
        to_entity: impl Into<String>,
        to_field: impl Into<String>,
    ) -> Self {
        Self::build(
            Cardinality::OneToMany,
            name,
            from_entity,
            from_field,
            to_entity,
            to_field,
        )
    }

    /// Create a many-to-one reference.
    pub fn many_to_one(
        name: impl Into<String>,
        from_entity: impl Into<String>,
        from_field: impl Into<String>,
        to_entity: impl Into<String>,
        to_field: impl Into<String>,
    ) -> Self {
        Self::build(
            Cardinality::ManyToOne,
            name,
            from_entity,
            from_field,
            to_entity,
            to_field,
        )
    }

    /// Mark the reference as eagerly loaded.
    pub fn eager(mut self) -> Self {
        self.lazy = false;
        self
    }

    /// Check if the reference yields a collection.
    pub fn is_collection(&self) -> bool {
        self.cardinality == Cardinality::OneToMany
    }

    /// Check if the owner row stores the key of the related object itself.
    ///
    /// `owner_identity` is the identity field of the owning entity.
    pub fn has_redundant_attribute(&self, owner_identity: &str) -> bool {
        match self.cardinality {
            Cardinality::ManyToOne => true,
            Cardinality::OneToOne => self.from_field != owner_identity,
            Cardinality::OneToMany => false,
        }
    }

    /// Get the inverse reference (swapping from/to).
    pub fn inverse(&self, name: impl Into<String>) -> Self {
        let cardinality = match self.cardinality {
            Cardinality::OneToOne => Cardinality::OneToOne,
            Cardinality::OneToMany => Cardinality::ManyToOne,
            Cardinality::ManyToOne => Cardinality::OneToMany,
        };
        Self {
            name: name.into(),
            from_entity: self.to_entity.clone(),
            to_entity: self.from_entity.clone(),
            cardinality,
            from_field: self.to_field.clone(),
            to_field: self.from_field.clone(),
            lazy: self.lazy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_many_to_one_relation() {
        let rel = RelationDef::many_to_one("customer", "Order", "customer_id", "Customer", "id");

        assert_eq!(rel.cardinality, Cardinality::ManyToOne);
        assert!(!rel.is_collection());
        assert!(rel.lazy);
        assert!(rel.has_redundant_attribute("id"));
    }

    #[test]
    fn test_one_to_many_relation() {
        let rel =
            RelationDef::one_to_many("orders", "Customer", "id", "Order", "customer_id").eager();

        assert!(rel.is_collection());
        assert!(!rel.lazy);
        assert!(!rel.has_redundant_attribute("id"));
    }

    #[test]
    fn test_one_to_one_redundancy_depends_on_key_side() {
        let owned = RelationDef::one_to_one("profile", "User", "profile_id", "Profile", "id");
        assert!(owned.has_redundant_attribute("id"));

        let shared = RelationDef::one_to_one("settings", "User", "id", "Settings", "user_id");
        assert!(!shared.has_redundant_attribute("id"));
    }

    #[test]
    fn test_inverse_relation() {
        let rel = RelationDef::many_to_one("customer", "Order", "customer_id", "Customer", "id");
        let inverse = rel.inverse("orders");

        assert_eq!(inverse.from_entity, "Customer");
        assert_eq!(inverse.to_entity, "Order");
        assert_eq!(inverse.from_field, "id");
        assert_eq!(inverse.to_field, "customer_id");
        assert!(inverse.is_collection());
    }
}
