//! Splitting a chain at its heterogeneous boundary.
//!
//! The boundary is the heterogeneous operation closest to the tail. It and
//! everything toward the source form the main segment; the rest is the
//! complement, executed locally over the main segment's rows. The
//! including tree is threaded from the source through the main segment and
//! cut across every operation.

use std::sync::Arc;

use ormx_proto::{Op, OpKind, QueryChain, QueryOp};
use tracing::debug;

use super::classify::Classifier;
use super::cut::{cut, lift, own_needs};
use super::policy::HeterogeneityPolicy;
use crate::catalog::ObjectModel;
use crate::config::IncludingFallback;
use crate::error::Error;
use crate::including::IncludingTree;
use crate::view::{parse_view, TypeView};

/// Result of decomposing a chain.
#[derive(Debug, Clone)]
pub struct Segments {
    /// The decomposed chain.
    pub chain: QueryChain,
    /// Operations up to and including the boundary.
    pub main: QueryChain,
    /// Position of the boundary operation.
    pub boundary: Option<usize>,
    /// Operations after the boundary, rooted at the main segment's output.
    pub complement: Option<QueryChain>,
    /// Related data carried by the main segment's result.
    pub including: IncludingTree,
    /// Related data to load on the boundary's input rows.
    pub source_including: IncludingTree,
    /// Type View of the boundary, if it has one.
    pub view: Option<Arc<TypeView>>,
    /// Heterogeneity of every operation of `chain`.
    pub classification: Vec<bool>,
}

impl Segments {
    /// The boundary operation.
    pub fn boundary_op(&self) -> Option<&QueryOp> {
        self.boundary.and_then(|i| self.chain.ops().get(i))
    }

    /// Kind of the boundary operation.
    pub fn boundary_kind(&self) -> Option<OpKind> {
        self.boundary_op().map(QueryOp::kind)
    }

    /// Chain producing the boundary's input rows.
    pub fn base_chain(&self) -> QueryChain {
        match self.boundary {
            Some(boundary) => self.chain.prefix(boundary),
            None => self.chain.clone(),
        }
    }

    /// Check whether any part of the chain runs locally.
    pub fn is_heterogeneous(&self) -> bool {
        self.boundary.is_some()
    }
}

/// Splits chains for one backend policy.
pub struct Decomposer<'a> {
    model: &'a ObjectModel,
    classifier: &'a Classifier,
    policy: &'a dyn HeterogeneityPolicy,
    fallback: IncludingFallback,
}

impl<'a> Decomposer<'a> {
    /// Create a decomposer.
    pub fn new(
        model: &'a ObjectModel,
        classifier: &'a Classifier,
        policy: &'a dyn HeterogeneityPolicy,
    ) -> Self {
        Self {
            model,
            classifier,
            policy,
            fallback: IncludingFallback::default(),
        }
    }

    /// Set the including fallback.
    pub fn with_fallback(mut self, fallback: IncludingFallback) -> Self {
        self.fallback = fallback;
        self
    }

    fn carries_fresh_cut(&self, kind: OpKind) -> bool {
        self.fallback == IncludingFallback::FreshCut
            || matches!(kind, OpKind::Select | OpKind::Where | OpKind::Group)
    }

    /// Decompose `chain`.
    pub fn decompose(&self, chain: &QueryChain) -> Result<Segments, Error> {
        let classification = self.classifier.classify_chain(self.model, self.policy, chain)?;
        let boundary = classification.iter().rposition(|h| *h);
        let end = boundary.unwrap_or_else(|| chain.len().saturating_sub(1));

        let mut tree = IncludingTree::new(chain.root().element_type());
        let mut source_including = tree.clone();
        let mut view = None;
        for (index, op) in chain.ops().iter().enumerate().take(end + 1) {
            let op_view = parse_view(self.model, op)?;
            let mut source = tree.clone();
            if let Op::Include { paths } = &op.op {
                for path in paths {
                    source.grow(self.model, path)?;
                }
            }
            let next = cut(self.model, op, op_view.as_deref(), &source)?
                .unwrap_or_else(|| IncludingTree::new(op.result_type.clone()));

            source_including = source.clone();
            tree = if Some(index) == boundary
                && !self.carries_fresh_cut(op.kind())
                && source.root_type() == &op.result_type
            {
                source
            } else {
                next
            };
            if Some(index) == boundary {
                view = op_view;
            }
        }

        let (main, complement) = match boundary {
            Some(boundary) if boundary + 1 < chain.len() => {
                let (main, complement) = chain.split_at(boundary + 1);
                (main, Some(complement))
            }
            _ => (chain.clone(), None),
        };

        if let Some(complement) = &complement {
            let needs = self.complement_needs(complement)?;
            if needs.root_type() == tree.root_type() {
                tree.merge(&needs);
            }
        }
        if let Some(op) = boundary.and_then(|i| chain.ops().get(i)) {
            if let Some(lifted) = lift(self.model, op, view.as_deref(), &tree)? {
                source_including.merge(&lifted);
            }
        } else {
            source_including = tree.clone();
        }

        debug!(
            %chain,
            boundary = ?boundary,
            complement = complement.as_ref().map(|c| c.len()).unwrap_or(0),
            including = tree.paths().len(),
            "decomposed chain"
        );
        Ok(Segments {
            chain: chain.clone(),
            main,
            boundary,
            complement,
            including: tree,
            source_including,
            view,
            classification,
        })
    }

    /// Related data the complement navigates, lifted back into the space of
    /// the complement's input rows.
    fn complement_needs(&self, complement: &QueryChain) -> Result<IncludingTree, Error> {
        let mut needed = IncludingTree::new(complement.element_type());
        for op in complement.ops().iter().rev() {
            let view = parse_view(self.model, op)?;
            let mut before = match lift(self.model, op, view.as_deref(), &needed)? {
                Some(lifted) => lifted,
                None => IncludingTree::new(op.source_type.clone()),
            };
            before.merge(&own_needs(self.model, op)?);
            needed = before;
        }
        Ok(needed)
    }
}
