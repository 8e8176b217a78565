//! Per-kind heterogeneity classification.
//!
//! The [`Classifier`] maps every operation kind to a [`KindRule`]: an
//! optional previsit that prepares the operation (registering its Type
//! View) and the predicate deciding whether the backend can run it.

use std::collections::HashMap;

use ormx_proto::{ChainRoot, Expr, KeyComparer, Op, OpKind, QueryChain, QueryOp, TypeRef};
use tracing::trace;

use super::policy::HeterogeneityPolicy;
use crate::catalog::ObjectModel;
use crate::error::Error;
use crate::expr::predicate::{conjuncts, or_factors};
use crate::query::lambda_signatures;
use crate::view::parse_view;

/// Preparation run before an operation is classified.
pub type Previsit = fn(&ObjectModel, &QueryOp) -> Result<(), Error>;

/// Decides whether an operation is heterogeneous under a policy.
pub type Applicability =
    fn(&Classifier, &ObjectModel, &dyn HeterogeneityPolicy, &QueryOp) -> Result<bool, Error>;

/// Classification rule of one operation kind.
#[derive(Clone, Copy)]
pub struct KindRule {
    /// Optional preparation step.
    pub previsit: Option<Previsit>,
    /// Heterogeneity predicate.
    pub heterogeneous: Applicability,
}

impl KindRule {
    /// Rule without a previsit.
    pub fn new(heterogeneous: Applicability) -> Self {
        Self {
            previsit: None,
            heterogeneous,
        }
    }

    /// Add a previsit.
    pub fn with_previsit(mut self, previsit: Previsit) -> Self {
        self.previsit = Some(previsit);
        self
    }
}

/// Registry of classification rules by operation kind.
#[derive(Clone)]
pub struct Classifier {
    rules: HashMap<OpKind, KindRule>,
}

impl Classifier {
    /// Classifier without any rules.
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Classifier with the rules of every built-in kind.
    pub fn standard() -> Self {
        let prepared = KindRule::new(direct).with_previsit(prepare_view);
        Self::empty()
            .with_rule(OpKind::Select, prepared)
            .with_rule(OpKind::CollectionSelect, prepared)
            .with_rule(OpKind::CombiningSelect, prepared)
            .with_rule(OpKind::Group, prepared)
            .with_rule(OpKind::GroupAggregate, prepared)
            .with_rule(OpKind::Accumulate, prepared)
            .with_rule(OpKind::Count, KindRule::new(direct))
            .with_rule(OpKind::ArithAggregate, KindRule::new(direct))
            .with_rule(OpKind::Join, KindRule::new(nested))
            .with_rule(OpKind::Zip, KindRule::new(nested))
            .with_rule(OpKind::Where, KindRule::new(filter))
            .with_rule(OpKind::Include, KindRule::new(never))
    }

    /// Register (or replace) the rule of a kind.
    pub fn with_rule(mut self, kind: OpKind, rule: KindRule) -> Self {
        self.rules.insert(kind, rule);
        self
    }

    /// Remove the rule of a kind.
    pub fn without(mut self, kind: OpKind) -> Self {
        self.rules.remove(&kind);
        self
    }

    /// Check whether `op` cannot run in the backend described by `policy`.
    pub fn is_heterogeneous(
        &self,
        model: &ObjectModel,
        policy: &dyn HeterogeneityPolicy,
        op: &QueryOp,
    ) -> Result<bool, Error> {
        let kind = op.kind();
        let rule = self.rules.get(&kind).ok_or_else(|| {
            Error::unsupported(kind, format!("policy {} has no rule", policy.name()))
        })?;
        if let Some(previsit) = rule.previsit {
            previsit(model, op)?;
        }
        let heterogeneous = (rule.heterogeneous)(self, model, policy, op)?;
        trace!(%kind, heterogeneous, "classified operation");
        Ok(heterogeneous)
    }

    /// Classify every operation of a chain.
    pub fn classify_chain(
        &self,
        model: &ObjectModel,
        policy: &dyn HeterogeneityPolicy,
        chain: &QueryChain,
    ) -> Result<Vec<bool>, Error> {
        chain
            .ops()
            .iter()
            .map(|op| self.is_heterogeneous(model, policy, op))
            .collect()
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::standard()
    }
}

fn prepare_view(model: &ObjectModel, op: &QueryOp) -> Result<(), Error> {
    parse_view(model, op).map(|_| ())
}

fn comparer_of(op: &Op) -> KeyComparer {
    match op {
        Op::Group { comparer, .. } | Op::GroupAggregate { comparer, .. } => *comparer,
        _ => KeyComparer::Default,
    }
}

fn direct(
    _classifier: &Classifier,
    model: &ObjectModel,
    policy: &dyn HeterogeneityPolicy,
    op: &QueryOp,
) -> Result<bool, Error> {
    if !policy.supports_kind(op.kind()) || !policy.supports_comparer(comparer_of(&op.op)) {
        return Ok(true);
    }
    for signature in lambda_signatures(model, op)? {
        if !policy.supports_expr(model, &signature.lambda.body, &signature.params)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn nested(
    classifier: &Classifier,
    model: &ObjectModel,
    policy: &dyn HeterogeneityPolicy,
    op: &QueryOp,
) -> Result<bool, Error> {
    if direct(classifier, model, policy, op)? {
        return Ok(true);
    }
    let inner = match &op.op {
        Op::Join { inner, .. } => inner,
        Op::Zip { other, .. } => other,
        _ => {
            return Err(Error::ContractViolation(format!(
                "nested rule applied to {}",
                op.kind()
            )))
        }
    };
    if matches!(inner.root(), ChainRoot::Input(_)) {
        return Ok(true);
    }
    Ok(classifier
        .classify_chain(model, policy, inner)?
        .into_iter()
        .any(|h| h))
}

fn filter(
    _classifier: &Classifier,
    model: &ObjectModel,
    policy: &dyn HeterogeneityPolicy,
    op: &QueryOp,
) -> Result<bool, Error> {
    let Op::Where { predicate } = &op.op else {
        return Err(Error::ContractViolation(format!(
            "filter rule applied to {}",
            op.kind()
        )));
    };
    if !policy.supports_kind(OpKind::Where) {
        return Ok(true);
    }
    let params = [op.source_type.clone()];
    for factor in or_factors(&predicate.body) {
        if !policy.supports_expr(model, &factor, &params)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn never(
    _classifier: &Classifier,
    _model: &ObjectModel,
    _policy: &dyn HeterogeneityPolicy,
    _op: &QueryOp,
) -> Result<bool, Error> {
    Ok(false)
}

/// Clauses of one OR-factor, split by backend support.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorSplit {
    /// The whole factor.
    pub factor: Expr,
    /// Conjuncts the backend can evaluate.
    pub supported: Vec<Expr>,
    /// Conjuncts it cannot.
    pub unsupported: Vec<Expr>,
}

impl FactorSplit {
    /// Check if the whole factor can run in the backend.
    pub fn is_homogeneous(&self) -> bool {
        self.unsupported.is_empty()
    }
}

/// Split a predicate into OR-factors and each factor into supported and
/// unsupported conjuncts.
pub fn split_factors(
    model: &ObjectModel,
    policy: &dyn HeterogeneityPolicy,
    predicate: &Expr,
    row_type: &TypeRef,
) -> Result<Vec<FactorSplit>, Error> {
    let params = [row_type.clone()];
    let mut splits = Vec::new();
    for factor in or_factors(predicate) {
        let mut supported = Vec::new();
        let mut unsupported = Vec::new();
        for clause in conjuncts(&factor) {
            if policy.supports_expr(model, &clause, &params)? {
                supported.push(clause);
            } else {
                unsupported.push(clause);
            }
        }
        splits.push(FactorSplit {
            factor,
            supported,
            unsupported,
        });
    }
    Ok(splits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hetero::CapabilityPolicy;
    use crate::query::QueryBuilder;
    use crate::testing::create_test_model;

    #[test]
    fn test_filter_heterogeneous_by_factor() {
        let model = create_test_model();
        let policy = CapabilityPolicy::minimal();
        let classifier = Classifier::standard();

        let plain = QueryBuilder::from_extent(&model, "Item")
            .unwrap()
            .filter(Expr::param(0).member("key").gt(3))
            .unwrap()
            .build();
        assert_eq!(
            classifier.classify_chain(&model, &policy, &plain).unwrap(),
            vec![false]
        );

        let mixed = QueryBuilder::from_extent(&model, "Item")
            .unwrap()
            .filter(
                Expr::param(0).member("key").gt(3).or(Expr::call(
                    "starts_with",
                    vec![Expr::param(0).member("tag"), Expr::lit("t1")],
                )),
            )
            .unwrap()
            .build();
        assert_eq!(
            classifier.classify_chain(&model, &policy, &mixed).unwrap(),
            vec![true]
        );
    }

    #[test]
    fn test_include_never_heterogeneous() {
        let model = create_test_model();
        let policy = CapabilityPolicy::empty("nothing");
        let chain = QueryBuilder::from_extent(&model, "Order")
            .unwrap()
            .include(&["customer"])
            .unwrap()
            .build();
        assert!(!Classifier::standard()
            .is_heterogeneous(&model, &policy, &chain.ops()[0])
            .unwrap());
    }

    #[test]
    fn test_group_and_join_follow_policy() {
        let model = create_test_model();
        let classifier = Classifier::standard();
        let grouped = QueryBuilder::from_extent(&model, "Item")
            .unwrap()
            .group_by(Expr::param(0).member("flag"))
            .unwrap()
            .build();
        let op = &grouped.ops()[0];
        assert!(classifier
            .is_heterogeneous(&model, &CapabilityPolicy::minimal(), op)
            .unwrap());
        assert!(!classifier
            .is_heterogeneous(&model, &CapabilityPolicy::full(), op)
            .unwrap());

        let inner = QueryBuilder::from_extent(&model, "Customer")
            .unwrap()
            .filter(Expr::call("reverse", vec![Expr::param(0).member("name")]).equals("adA"))
            .unwrap()
            .build();
        let joined = QueryBuilder::from_extent(&model, "Order")
            .unwrap()
            .join(
                inner,
                Expr::param(0).member("customer_id"),
                Expr::param(0).member("id"),
                Expr::param(0).member("total"),
            )
            .unwrap()
            .build();
        let policy = CapabilityPolicy::full().without_function("reverse");
        assert!(classifier
            .is_heterogeneous(&model, &policy, &joined.ops()[0])
            .unwrap());
    }

    #[test]
    fn test_missing_rule_is_unsupported() {
        let model = create_test_model();
        let chain = QueryBuilder::from_extent(&model, "Item")
            .unwrap()
            .count()
            .unwrap()
            .build();
        let classifier = Classifier::standard().without(OpKind::Count);
        let err = classifier
            .is_heterogeneous(&model, &CapabilityPolicy::full(), &chain.ops()[0])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Unsupported {
                kind: OpKind::Count,
                ..
            }
        ));
    }

    #[test]
    fn test_split_factors() {
        let model = create_test_model();
        let predicate = Expr::param(0)
            .member("key")
            .gt(0)
            .and(Expr::call(
                "starts_with",
                vec![
                    Expr::call("reverse", vec![Expr::param(0).member("tag")]),
                    Expr::lit("0"),
                ],
            ))
            .or(Expr::param(0).member("flag"));
        let splits = split_factors(
            &model,
            &CapabilityPolicy::minimal(),
            &predicate,
            &TypeRef::entity("Item"),
        )
        .unwrap();
        assert_eq!(splits.len(), 2);
        assert_eq!(splits[0].supported.len(), 1);
        assert_eq!(splits[0].unsupported.len(), 1);
        assert!(splits[1].is_homogeneous());
    }
}
