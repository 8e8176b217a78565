//! Backend capability policies.
//!
//! A [`HeterogeneityPolicy`] answers whether the designated backend can
//! execute an operation kind, an expression or a key comparer natively.
//! Swapping the policy retargets the whole engine to a different backend.

use std::collections::HashSet;
use std::fmt;

use ormx_proto::{Expr, KeyComparer, OpKind, TypeRef};

use crate::catalog::ObjectModel;
use crate::error::Error;
use crate::expr::functions::FUNCTIONS;
use crate::expr::traverses_reference;

/// Capability answers for one backend.
pub trait HeterogeneityPolicy: Send + Sync {
    /// Policy name, for diagnostics.
    fn name(&self) -> &str;

    /// Check if operations of `kind` can run in the backend.
    fn supports_kind(&self, kind: OpKind) -> bool;

    /// Check if `expr`, with parameters typed `params`, can be evaluated by
    /// the backend.
    fn supports_expr(
        &self,
        model: &ObjectModel,
        expr: &Expr,
        params: &[TypeRef],
    ) -> Result<bool, Error>;

    /// Check if group keys can be compared with `comparer`.
    fn supports_comparer(&self, comparer: KeyComparer) -> bool;
}

/// Expression features a backend may lack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Constructing new shapes inside a projection.
    NewInstance,
    /// Following reference elements (including aggregate sources).
    Navigation,
    /// Non-default key comparers.
    CustomComparers,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::NewInstance => write!(f, "new_instance"),
            Capability::Navigation => write!(f, "navigation"),
            Capability::CustomComparers => write!(f, "custom_comparers"),
        }
    }
}

/// Policy configured from explicit capability sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityPolicy {
    name: String,
    kinds: HashSet<OpKind>,
    functions: HashSet<String>,
    capabilities: HashSet<Capability>,
}

impl CapabilityPolicy {
    /// Policy with no capabilities at all.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kinds: HashSet::new(),
            functions: HashSet::new(),
            capabilities: HashSet::new(),
        }
    }

    /// Policy of a fully capable backend.
    pub fn full() -> Self {
        Self {
            name: "full".to_string(),
            kinds: OpKind::ALL.iter().copied().collect(),
            functions: FUNCTIONS.iter().map(|f| f.to_string()).collect(),
            capabilities: [
                Capability::NewInstance,
                Capability::Navigation,
                Capability::CustomComparers,
            ]
            .into_iter()
            .collect(),
        }
    }

    /// Policy of a backend that only filters, projects existing members,
    /// counts and aggregates over a single extent.
    pub fn minimal() -> Self {
        let mut policy = Self::empty("minimal");
        policy.kinds.extend([
            OpKind::Select,
            OpKind::Where,
            OpKind::Include,
            OpKind::Count,
            OpKind::ArithAggregate,
        ]);
        policy
    }

    /// Rename the policy.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add a supported operation kind.
    pub fn with_kind(mut self, kind: OpKind) -> Self {
        self.kinds.insert(kind);
        self
    }

    /// Remove a supported operation kind.
    pub fn without_kind(mut self, kind: OpKind) -> Self {
        self.kinds.remove(&kind);
        self
    }

    /// Add a supported scalar function.
    pub fn with_function(mut self, name: impl Into<String>) -> Self {
        self.functions.insert(name.into());
        self
    }

    /// Remove a supported scalar function.
    pub fn without_function(mut self, name: &str) -> Self {
        self.functions.remove(name);
        self
    }

    /// Grant a capability.
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    /// Revoke a capability.
    pub fn without_capability(mut self, capability: Capability) -> Self {
        self.capabilities.remove(&capability);
        self
    }

    /// Check if a capability is granted.
    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Check if a scalar function is supported.
    pub fn supports_function(&self, name: &str) -> bool {
        self.functions.contains(name)
    }
}

impl Default for CapabilityPolicy {
    fn default() -> Self {
        Self::full()
    }
}

impl HeterogeneityPolicy for CapabilityPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_kind(&self, kind: OpKind) -> bool {
        self.kinds.contains(&kind)
    }

    fn supports_expr(
        &self,
        model: &ObjectModel,
        expr: &Expr,
        params: &[TypeRef],
    ) -> Result<bool, Error> {
        let new_instance = self.has(Capability::NewInstance);
        let navigation = self.has(Capability::Navigation);
        let unsupported = expr.any(&|e| match e {
            Expr::Call { function, .. } => !self.supports_function(function),
            Expr::New { .. } | Expr::MemberInit { .. } => !new_instance,
            Expr::Aggregate { .. } => !navigation,
            _ => false,
        });
        if unsupported {
            return Ok(false);
        }
        if !navigation && traverses_reference(model, expr, params)? {
            return Ok(false);
        }
        Ok(true)
    }

    fn supports_comparer(&self, comparer: KeyComparer) -> bool {
        comparer == KeyComparer::Default || self.has(Capability::CustomComparers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::create_test_model;

    fn order() -> Vec<TypeRef> {
        vec![TypeRef::entity("Order")]
    }

    #[test]
    fn test_full_policy_supports_everything() {
        let model = create_test_model();
        let policy = CapabilityPolicy::full();
        for kind in OpKind::ALL {
            assert!(policy.supports_kind(kind));
        }
        let expr = Expr::call("upper", vec![Expr::param(0).member("customer").member("name")]);
        assert!(policy.supports_expr(&model, &expr, &order()).unwrap());
        assert!(policy.supports_comparer(KeyComparer::CaseInsensitive));
    }

    #[test]
    fn test_minimal_policy_rejects_features() {
        let model = create_test_model();
        let policy = CapabilityPolicy::minimal();
        assert!(policy.supports_kind(OpKind::Where));
        assert!(!policy.supports_kind(OpKind::Group));

        let plain = Expr::param(0).member("total").gt(20);
        assert!(policy.supports_expr(&model, &plain, &order()).unwrap());

        let navigating = Expr::param(0).member("customer").member("name");
        assert!(!policy.supports_expr(&model, &navigating, &order()).unwrap());

        let call = Expr::call("reverse", vec![Expr::param(0).member("note")]);
        assert!(!policy.supports_expr(&model, &call, &order()).unwrap());
        let policy = policy.with_function("reverse");
        assert!(policy.supports_expr(&model, &call, &order()).unwrap());

        assert!(policy.supports_comparer(KeyComparer::Default));
        assert!(!policy.supports_comparer(KeyComparer::CaseInsensitive));
    }

    #[test]
    fn test_capability_builders() {
        let policy = CapabilityPolicy::minimal()
            .with_kind(OpKind::Group)
            .without_kind(OpKind::Count)
            .with_capability(Capability::Navigation)
            .with_name("custom");
        assert_eq!(policy.name(), "custom");
        assert!(policy.supports_kind(OpKind::Group));
        assert!(!policy.supports_kind(OpKind::Count));
        assert!(policy.has(Capability::Navigation));
        assert!(!policy.has(Capability::NewInstance));
    }
}
