//! Structural fingerprints of projection sources.
//!
//! Two projections with the same parser kind, the same source type and the
//! same expression structure share a fingerprint, so they resolve to the
//! same cached Type View.

use ormx_proto::{Expr, TypeRef};
use serde::Serialize;

use super::ParserKind;
use crate::error::Error;

#[derive(Serialize)]
struct FingerprintInput<'a> {
    parser: ParserKind,
    source: &'a TypeRef,
    params: &'a [TypeRef],
    body: &'a [&'a Expr],
}

/// Hex fingerprint over the parser kind, the source type, the parameter
/// types and the expressions defining the view.
pub fn source_fingerprint(
    parser: ParserKind,
    source: &TypeRef,
    params: &[TypeRef],
    body: &[&Expr],
) -> Result<String, Error> {
    let input = FingerprintInput {
        parser,
        source,
        params,
        body,
    };
    let bytes = serde_json::to_vec(&input)?;
    let hash = blake3::hash(&bytes);
    Ok(hex::encode(&hash.as_bytes()[..16]))
}
