//! Expression services: typing, evaluation, scalar functions and predicate
//! normalization.

mod eval;
pub mod functions;
pub mod predicate;
mod typing;

pub use eval::{
    aggregate, compare, convert_scalar, values_equal, Evaluator, LocalResolver, MemberResolver,
};
pub use typing::{
    aggregate_type, infer, member_chains, member_chains_from, navigable_origin,
    navigation_paths, sequence_element, traverses_reference, ChainRef,
};
