//! Boolean predicate normalization: OR-factors, AND-conjuncts and member
//! path rewriting.

use ormx_proto::{BinaryOp, Expr, MemberPath};

/// Split a predicate into its OR-connected factors.
///
/// Top-level disjunctions are flattened; a disjunction nested under a
/// conjunction is distributed so that every factor is a pure conjunction.
pub fn or_factors(expr: &Expr) -> Vec<Expr> {
    match expr {
        Expr::Binary {
            op: BinaryOp::Or,
            left,
            right,
        } => {
            let mut factors = or_factors(left);
            factors.extend(or_factors(right));
            factors
        }
        Expr::Binary {
            op: BinaryOp::And,
            left,
            right,
        } => {
            let lefts = or_factors(left);
            let rights = or_factors(right);
            let mut factors = Vec::with_capacity(lefts.len() * rights.len());
            for l in &lefts {
                for r in &rights {
                    factors.push(l.clone().and(r.clone()));
                }
            }
            factors
        }
        other => vec![other.clone()],
    }
}

/// Split a conjunction into its AND-connected clauses.
pub fn conjuncts(expr: &Expr) -> Vec<Expr> {
    match expr {
        Expr::Binary {
            op: BinaryOp::And,
            left,
            right,
        } => {
            let mut clauses = conjuncts(left);
            clauses.extend(conjuncts(right));
            clauses
        }
        other => vec![other.clone()],
    }
}

/// Join clauses with AND; `None` for an empty list.
pub fn conjoin(clauses: impl IntoIterator<Item = Expr>) -> Option<Expr> {
    clauses.into_iter().reduce(|acc, clause| acc.and(clause))
}

/// Join factors with OR; `None` for an empty list.
pub fn disjoin(factors: impl IntoIterator<Item = Expr>) -> Option<Expr> {
    factors.into_iter().reduce(|acc, factor| acc.or(factor))
}

/// Maximal member paths rooted at parameter `param`, in first-use order.
/// A bare reference to the parameter yields the root path.
pub fn member_paths(expr: &Expr, param: usize) -> Vec<MemberPath> {
    let mut paths = Vec::new();
    collect_paths(expr, param, &mut paths);
    paths
}

fn collect_paths(expr: &Expr, param: usize, out: &mut Vec<MemberPath>) {
    if let Some((index, path)) = expr.member_chain() {
        if index == param && !out.contains(&path) {
            out.push(path);
        }
        return;
    }
    for child in expr.children() {
        collect_paths(child, param, out);
    }
}

/// Replace every maximal member path of parameter `param` found in
/// `mapping` with the mapped expression.
pub fn rewrite_paths(expr: &Expr, param: usize, mapping: &[(MemberPath, Expr)]) -> Expr {
    expr.rewrite(&mut |e| {
        let (index, path) = e.member_chain()?;
        if index != param {
            return Some(e.clone());
        }
        mapping
            .iter()
            .find(|(p, _)| *p == path)
            .map(|(_, replacement)| replacement.clone())
            .or_else(|| Some(e.clone()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_gt(n: i64) -> Expr {
        Expr::param(0).member("key").gt(Expr::lit(n))
    }

    #[test]
    fn test_or_factors_flatten_and_distribute() {
        let tag = Expr::param(0).member("flag").equals(true);
        let expr = key_gt(1).or(key_gt(2)).and(tag.clone());
        let factors = or_factors(&expr);
        assert_eq!(factors.len(), 2);
        assert_eq!(factors[0], key_gt(1).and(tag.clone()));
        assert_eq!(factors[1], key_gt(2).and(tag));

        assert_eq!(or_factors(&key_gt(1)), vec![key_gt(1)]);
    }

    #[test]
    fn test_conjuncts_and_rejoin() {
        let expr = key_gt(1).and(key_gt(2)).and(key_gt(3));
        let clauses = conjuncts(&expr);
        assert_eq!(clauses.len(), 3);
        assert_eq!(conjoin(clauses), Some(expr));
        assert_eq!(conjoin(Vec::new()), None);
        assert_eq!(disjoin(vec![key_gt(1)]), Some(key_gt(1)));
    }

    #[test]
    fn test_member_paths_are_maximal() {
        let expr = Expr::param(0)
            .path("customer.name")
            .equals("Ada")
            .and(Expr::param(0).member("total").gt(1))
            .and(Expr::param(1).member("x").is_null());
        assert_eq!(
            member_paths(&expr, 0),
            vec![MemberPath::parse("customer.name"), MemberPath::parse("total")]
        );
        assert_eq!(member_paths(&Expr::param(0), 0), vec![MemberPath::root()]);
    }

    #[test]
    fn test_rewrite_paths() {
        let expr = Expr::call("reverse", vec![Expr::param(0).member("tag")]).equals("0t");
        let mapping = vec![(MemberPath::parse("tag"), Expr::param(0).member("P0"))];
        let rewritten = rewrite_paths(&expr, 0, &mapping);
        assert_eq!(
            rewritten,
            Expr::call("reverse", vec![Expr::param(0).member("P0")]).equals("0t")
        );
    }
}
