//! In-memory execution of operation chains over materialized rows.
//!
//! Used for local complements, for filter re-validation and by the reference
//! memory backend. Inner chains of joins and zips are obtained through a
//! [`ChainSource`].

use std::collections::HashMap;

use ormx_proto::{KeyComparer, Lambda, Op, QueryChain, QueryOp, Record, Value};
use tracing::trace;

use super::QueryOutput;
use crate::catalog::{ObjectModel, GROUPING_SHAPE, GROUP_ELEMENTS, GROUP_KEY};
use crate::error::Error;
use crate::expr::{aggregate, values_equal, Evaluator, MemberResolver};

/// Produces the rows of a nested chain (join inner side, zip partner).
pub trait ChainSource {
    /// Rows produced by `chain`.
    fn rows(&self, chain: &QueryChain) -> Result<Vec<Value>, Error>;
}

/// Executes operations over materialized rows.
pub struct LocalExecutor<'a> {
    evaluator: Evaluator<'a>,
    source: &'a dyn ChainSource,
}

impl<'a> LocalExecutor<'a> {
    /// Create an executor.
    pub fn new(
        model: &'a ObjectModel,
        resolver: &'a dyn MemberResolver,
        source: &'a dyn ChainSource,
    ) -> Self {
        Self {
            evaluator: Evaluator::new(model, resolver),
            source,
        }
    }

    /// Evaluator used for lambda bodies.
    pub fn evaluator(&self) -> &Evaluator<'a> {
        &self.evaluator
    }

    /// Run every operation of `chain` over `input`, ignoring its root.
    pub fn run(&self, chain: &QueryChain, input: Vec<Value>) -> Result<QueryOutput, Error> {
        let mut rows = input;
        let last = chain.len().saturating_sub(1);
        for (index, op) in chain.ops().iter().enumerate() {
            match self.apply(op, rows)? {
                QueryOutput::Rows(next) => rows = next,
                QueryOutput::Scalar(value) if index == last => return Ok(QueryOutput::Scalar(value)),
                QueryOutput::Scalar(_) => {
                    return Err(Error::ContractViolation(format!(
                        "{} produced a single value before the end of the chain",
                        op.kind()
                    )))
                }
            }
        }
        Ok(QueryOutput::Rows(rows))
    }

    /// Apply one operation.
    pub fn apply(&self, op: &QueryOp, rows: Vec<Value>) -> Result<QueryOutput, Error> {
        trace!(kind = %op.kind(), rows = rows.len(), "local operation");
        let output = match &op.op {
            Op::Select { selector } => {
                let indexed = selector.arity() >= 2;
                let mut out = Vec::with_capacity(rows.len());
                for (index, row) in rows.into_iter().enumerate() {
                    let env = if indexed {
                        vec![row, Value::Int64(index as i64)]
                    } else {
                        vec![row]
                    };
                    out.push(self.evaluator.eval(&selector.body, &env)?);
                }
                QueryOutput::Rows(out)
            }
            Op::CollectionSelect { collection } => {
                let mut out = Vec::new();
                for row in rows {
                    out.extend(self.items(collection, &[row])?);
                }
                QueryOutput::Rows(out)
            }
            Op::CombiningSelect { collection, result } => {
                let mut out = Vec::new();
                for row in rows {
                    for item in self.items(collection, std::slice::from_ref(&row))? {
                        out.push(self.evaluator.eval(&result.body, &[row.clone(), item])?);
                    }
                }
                QueryOutput::Rows(out)
            }
            Op::Where { predicate } => {
                let mut out = Vec::with_capacity(rows.len());
                for row in rows {
                    if self.evaluator.eval_bool(&predicate.body, std::slice::from_ref(&row))? {
                        out.push(row);
                    }
                }
                QueryOutput::Rows(out)
            }
            Op::Group {
                key,
                element,
                comparer,
            } => {
                let groups = self.group(rows, key, element.as_ref(), *comparer)?;
                QueryOutput::Rows(
                    groups
                        .into_iter()
                        .map(|(key, elements)| grouping_record(key, elements))
                        .collect(),
                )
            }
            Op::GroupAggregate {
                key,
                element,
                result,
                comparer,
            } => {
                let groups = self.group(rows, key, element.as_ref(), *comparer)?;
                let mut out = Vec::with_capacity(groups.len());
                for (key, elements) in groups {
                    out.push(
                        self.evaluator
                            .eval(&result.body, &[key, Value::List(elements)])?,
                    );
                }
                QueryOutput::Rows(out)
            }
            Op::Join {
                inner,
                outer_key,
                inner_key,
                result,
            } => {
                let inner_rows = self.source.rows(inner)?;
                self.join(rows, inner_rows, outer_key, inner_key, result)?
            }
            Op::Zip { other, result } => {
                let other_rows = self.source.rows(other)?;
                let mut out = Vec::with_capacity(rows.len().min(other_rows.len()));
                for (a, b) in rows.into_iter().zip(other_rows) {
                    out.push(self.evaluator.eval(&result.body, &[a, b])?);
                }
                QueryOutput::Rows(out)
            }
            Op::Count { predicate } => {
                let count = match predicate {
                    Some(predicate) => {
                        let mut count = 0i64;
                        for row in rows {
                            if self.evaluator.eval_bool(&predicate.body, &[row])? {
                                count += 1;
                            }
                        }
                        count
                    }
                    None => rows.len() as i64,
                };
                QueryOutput::Scalar(Value::Int64(count))
            }
            Op::ArithAggregate { function, selector } => {
                let values = match selector {
                    Some(selector) => rows
                        .into_iter()
                        .map(|row| self.evaluator.eval(&selector.body, &[row]))
                        .collect::<Result<Vec<_>, _>>()?,
                    None => rows,
                };
                QueryOutput::Scalar(aggregate(*function, &values)?)
            }
            Op::Accumulate {
                seed, func, result, ..
            } => {
                let mut acc = seed.clone();
                for row in rows {
                    acc = self.evaluator.eval(&func.body, &[acc, row])?;
                }
                if let Some(result) = result {
                    acc = self.evaluator.eval(&result.body, &[acc])?;
                }
                QueryOutput::Scalar(acc)
            }
            Op::Include { .. } => QueryOutput::Rows(rows),
        };
        Ok(output)
    }

    fn items(&self, collection: &Lambda, env: &[Value]) -> Result<Vec<Value>, Error> {
        match self.evaluator.eval(&collection.body, env)? {
            Value::Null => Ok(Vec::new()),
            Value::List(items) => Ok(items),
            other => Err(Error::type_mismatch("sequence", other.type_name())),
        }
    }

    /// Groups in first-appearance order of their keys.
    fn group(
        &self,
        rows: Vec<Value>,
        key: &Lambda,
        element: Option<&Lambda>,
        comparer: KeyComparer,
    ) -> Result<Vec<(Value, Vec<Value>)>, Error> {
        let model = self.evaluator.model();
        let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for row in rows {
            let env = [row];
            let key_value = self.evaluator.eval(&key.body, &env)?;
            let element_value = match element {
                Some(element) => self.evaluator.eval(&element.body, &env)?,
                None => {
                    let [row] = env;
                    row
                }
            };
            let slot = *index
                .entry(group_key(model, &key_value, comparer))
                .or_insert_with(|| {
                    groups.push((key_value, Vec::new()));
                    groups.len() - 1
                });
            groups[slot].1.push(element_value);
        }
        Ok(groups)
    }

    fn join(
        &self,
        outer: Vec<Value>,
        inner: Vec<Value>,
        outer_key: &Lambda,
        inner_key: &Lambda,
        result: &Lambda,
    ) -> Result<QueryOutput, Error> {
        let model = self.evaluator.model();
        let inner_keys = inner
            .iter()
            .map(|row| self.evaluator.eval(&inner_key.body, std::slice::from_ref(row)))
            .collect::<Result<Vec<_>, _>>()?;
        let mut out = Vec::new();
        for row in outer {
            let key = self.evaluator.eval(&outer_key.body, std::slice::from_ref(&row))?;
            if key.is_null() {
                continue;
            }
            for (candidate, candidate_key) in inner.iter().zip(&inner_keys) {
                if !candidate_key.is_null() && values_equal(model, &key, candidate_key) {
                    out.push(
                        self.evaluator
                            .eval(&result.body, &[row.clone(), candidate.clone()])?,
                    );
                }
            }
        }
        Ok(QueryOutput::Rows(out))
    }
}

/// Canonical grouping key: entity identity, or the value's key string with
/// the comparer applied.
pub fn group_key(model: &ObjectModel, value: &Value, comparer: KeyComparer) -> String {
    if let Some(identity) = model.identity_of_value(value) {
        return identity.to_string();
    }
    match (comparer, value) {
        (KeyComparer::CaseInsensitive, Value::String(s)) => format!("s:{}", s.to_lowercase()),
        _ => value.key_string(),
    }
}

/// A grouping result record.
pub fn grouping_record(key: Value, elements: Vec<Value>) -> Value {
    Record::new(GROUPING_SHAPE)
        .with_field(GROUP_KEY, key)
        .with_field(GROUP_ELEMENTS, Value::List(elements))
        .into_value()
}
