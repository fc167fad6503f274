//! Kernel-side evaluation of predicates against constant column values.
//!
//! The log-replay engine uses this to decide whether a file's partition values can possibly
//! satisfy a scan predicate. Evaluation follows SQL three-valued logic, with one extra state for
//! columns the resolver knows nothing about (e.g. data columns when only partition values are
//! available).
use std::cmp::Ordering;

use crate::expressions::{
    BinaryPredicate, BinaryPredicateOp, Expression, JunctionPredicate, JunctionPredicateOp,
    Predicate, Scalar,
};
use crate::utils::CaseInsensitiveMap;

/// Resolves a column reference to a constant value, or `None` if the value is not known.
pub trait ResolveColumnAsScalar {
    fn resolve_scalar(&self, col: &str) -> Option<Scalar>;
}

impl ResolveColumnAsScalar for CaseInsensitiveMap<Scalar> {
    fn resolve_scalar(&self, col: &str) -> Option<Scalar> {
        self.get(col).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    True,
    False,
    Null,
    /// Depends on a value the resolver could not provide
    Unknown,
}

impl From<bool> for Outcome {
    fn from(value: bool) -> Self {
        if value {
            Self::True
        } else {
            Self::False
        }
    }
}

/// Evaluate `pred` with SQL WHERE semantics: NULL counts as false. Returns `None` when the
/// outcome depends on columns `resolver` could not resolve.
pub fn eval_sql_where(pred: &Predicate, resolver: &dyn ResolveColumnAsScalar) -> Option<bool> {
    match eval_pred(pred, resolver) {
        Outcome::True => Some(true),
        Outcome::False | Outcome::Null => Some(false),
        Outcome::Unknown => None,
    }
}

/// True if `pred` definitely rejects every row whose columns resolve as `resolver` says.
pub fn can_skip(pred: &Predicate, resolver: &dyn ResolveColumnAsScalar) -> bool {
    eval_sql_where(pred, resolver) == Some(false)
}

fn eval_expr(expr: &Expression, resolver: &dyn ResolveColumnAsScalar) -> Option<Scalar> {
    match expr {
        Expression::Literal(value) => Some(value.clone()),
        Expression::Column(name) => resolver.resolve_scalar(name),
    }
}

fn eval_pred(pred: &Predicate, resolver: &dyn ResolveColumnAsScalar) -> Outcome {
    match pred {
        Predicate::BooleanExpression(expr) => match eval_expr(expr, resolver) {
            Some(Scalar::Boolean(value)) => value.into(),
            Some(Scalar::Null(_)) => Outcome::Null,
            _ => Outcome::Unknown,
        },
        Predicate::Not(inner) => match eval_pred(inner, resolver) {
            Outcome::True => Outcome::False,
            Outcome::False => Outcome::True,
            other => other,
        },
        Predicate::IsNull(expr) => match eval_expr(expr, resolver) {
            Some(value) => value.is_null().into(),
            None => Outcome::Unknown,
        },
        Predicate::Binary(BinaryPredicate { op, left, right }) => {
            let (Some(left), Some(right)) =
                (eval_expr(left, resolver), eval_expr(right, resolver))
            else {
                return Outcome::Unknown;
            };
            eval_binary(*op, &left, &right)
        }
        Predicate::Junction(JunctionPredicate { op, preds }) => {
            let outcomes = preds.iter().map(|p| eval_pred(p, resolver));
            match op {
                JunctionPredicateOp::And => fold_junction(outcomes, Outcome::False, Outcome::True),
                JunctionPredicateOp::Or => fold_junction(outcomes, Outcome::True, Outcome::False),
            }
        }
    }
}

fn eval_binary(op: BinaryPredicateOp, left: &Scalar, right: &Scalar) -> Outcome {
    if op == BinaryPredicateOp::Distinct {
        return match (left.is_null(), right.is_null()) {
            (true, true) => Outcome::False,
            (true, false) | (false, true) => Outcome::True,
            (false, false) => match left.partial_cmp(right) {
                Some(ord) => (ord != Ordering::Equal).into(),
                None => Outcome::Unknown,
            },
        };
    }
    if left.is_null() || right.is_null() {
        return Outcome::Null;
    }
    let Some(ord) = left.partial_cmp(right) else {
        return Outcome::Unknown;
    };
    let result = match op {
        BinaryPredicateOp::LessThan => ord == Ordering::Less,
        BinaryPredicateOp::GreaterThan => ord == Ordering::Greater,
        BinaryPredicateOp::Equal => ord == Ordering::Equal,
        BinaryPredicateOp::Distinct => ord != Ordering::Equal,
    };
    result.into()
}

/// `dominant` short-circuits the junction (FALSE for AND, TRUE for OR); `identity` is the result
/// of an empty junction.
fn fold_junction(
    outcomes: impl Iterator<Item = Outcome>,
    dominant: Outcome,
    identity: Outcome,
) -> Outcome {
    let mut result = identity;
    for outcome in outcomes {
        if outcome == dominant {
            return dominant;
        }
        result = match (result, outcome) {
            (Outcome::Unknown, _) | (_, Outcome::Unknown) => Outcome::Unknown,
            (Outcome::Null, _) | (_, Outcome::Null) => Outcome::Null,
            _ => result,
        };
    }
    result
}
