//! Definitions and functions to create and manipulate kernel expressions

use std::collections::HashSet;
use std::fmt::{Display, Formatter};

use itertools::Itertools;

pub use self::scalars::Scalar;

pub(crate) mod scalars;

pub type ExpressionRef = std::sync::Arc<Expression>;
pub type PredicateRef = std::sync::Arc<Predicate>;

////////////////////////////////////////////////////////////////////////
// Operators
////////////////////////////////////////////////////////////////////////

/// A binary predicate operator.
///
/// `<=`, `>=` and `!=` are expressed as the negation of `>`, `<` and `=` respectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryPredicateOp {
    /// Comparison Less Than
    LessThan,
    /// Comparison Greater Than
    GreaterThan,
    /// Comparison Equal
    Equal,
    /// Distinct (null-safe inequality)
    Distinct,
}

/// A junction (AND/OR) predicate operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JunctionPredicateOp {
    /// Conjunction
    And,
    /// Disjunction
    Or,
}

/// A SQL expression.
///
/// Expressions do not track data types other than the type of literals. Column references are
/// resolved by name, ignoring ASCII case.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A literal value.
    Literal(Scalar),
    /// A top-level column reference by name.
    Column(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryPredicate {
    pub op: BinaryPredicateOp,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JunctionPredicate {
    pub op: JunctionPredicateOp,
    pub preds: Vec<Predicate>,
}

/// A SQL predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// A boolean-valued expression, e.g. a boolean column or literal.
    BooleanExpression(Expression),
    /// Boolean inversion (true <-> false)
    Not(Box<Predicate>),
    /// `expr IS NULL`
    IsNull(Box<Expression>),
    /// A binary comparison.
    Binary(BinaryPredicate),
    /// A junction operation (AND/OR).
    Junction(JunctionPredicate),
}

////////////////////////////////////////////////////////////////////////
// Struct/Enum impls
////////////////////////////////////////////////////////////////////////

impl Expression {
    /// Create a new column reference expression
    pub fn column(name: impl Into<String>) -> Self {
        Self::Column(name.into())
    }

    /// Create a new literal expression
    pub fn literal(value: impl Into<Scalar>) -> Self {
        Self::Literal(value.into())
    }

    /// Returns the set of column names referenced by this expression.
    pub fn references(&self) -> HashSet<&str> {
        match self {
            Self::Column(name) => HashSet::from([name.as_str()]),
            Self::Literal(_) => HashSet::new(),
        }
    }

    /// Create a new predicate `self IS NULL`
    pub fn is_null(self) -> Predicate {
        Predicate::is_null(self)
    }

    /// Create a new predicate `self IS NOT NULL`
    pub fn is_not_null(self) -> Predicate {
        Predicate::is_not_null(self)
    }

    /// Create a new predicate `self == other`
    pub fn eq(self, other: impl Into<Self>) -> Predicate {
        Predicate::eq(self, other)
    }

    /// Create a new predicate `self != other`
    pub fn ne(self, other: impl Into<Self>) -> Predicate {
        Predicate::ne(self, other)
    }

    /// Create a new predicate `self < other`
    pub fn lt(self, other: impl Into<Self>) -> Predicate {
        Predicate::lt(self, other)
    }

    /// Create a new predicate `self <= other`
    pub fn le(self, other: impl Into<Self>) -> Predicate {
        Predicate::le(self, other)
    }

    /// Create a new predicate `self > other`
    pub fn gt(self, other: impl Into<Self>) -> Predicate {
        Predicate::gt(self, other)
    }

    /// Create a new predicate `self >= other`
    pub fn ge(self, other: impl Into<Self>) -> Predicate {
        Predicate::ge(self, other)
    }
}

impl Predicate {
    /// Create a new literal predicate
    pub fn literal(value: bool) -> Self {
        Self::BooleanExpression(Expression::literal(value))
    }

    /// Creates a predicate that evaluates a boolean column
    pub fn column(name: impl Into<String>) -> Self {
        Self::BooleanExpression(Expression::column(name))
    }

    /// Logical NOT (boolean inversion)
    pub fn not(pred: impl Into<Self>) -> Self {
        Self::Not(Box::new(pred.into()))
    }

    /// Create a new predicate `expr IS NULL`
    pub fn is_null(expr: impl Into<Expression>) -> Self {
        Self::IsNull(Box::new(expr.into()))
    }

    /// Create a new predicate `expr IS NOT NULL`
    pub fn is_not_null(expr: impl Into<Expression>) -> Self {
        Self::not(Self::is_null(expr))
    }

    /// Create a new predicate `a == b`
    pub fn eq(a: impl Into<Expression>, b: impl Into<Expression>) -> Self {
        Self::binary(BinaryPredicateOp::Equal, a, b)
    }

    /// Create a new predicate `a != b`
    pub fn ne(a: impl Into<Expression>, b: impl Into<Expression>) -> Self {
        Self::not(Self::eq(a, b))
    }

    /// Create a new predicate `a < b`
    pub fn lt(a: impl Into<Expression>, b: impl Into<Expression>) -> Self {
        Self::binary(BinaryPredicateOp::LessThan, a, b)
    }

    /// Create a new predicate `a <= b`
    pub fn le(a: impl Into<Expression>, b: impl Into<Expression>) -> Self {
        Self::not(Self::gt(a, b))
    }

    /// Create a new predicate `a > b`
    pub fn gt(a: impl Into<Expression>, b: impl Into<Expression>) -> Self {
        Self::binary(BinaryPredicateOp::GreaterThan, a, b)
    }

    /// Create a new predicate `a >= b`
    pub fn ge(a: impl Into<Expression>, b: impl Into<Expression>) -> Self {
        Self::not(Self::lt(a, b))
    }

    /// Create a new predicate `DISTINCT(a, b)`
    pub fn distinct(a: impl Into<Expression>, b: impl Into<Expression>) -> Self {
        Self::binary(BinaryPredicateOp::Distinct, a, b)
    }

    /// Create a new predicate `a AND b`
    pub fn and(a: impl Into<Self>, b: impl Into<Self>) -> Self {
        Self::and_from([a.into(), b.into()])
    }

    /// Create a new predicate `a OR b`
    pub fn or(a: impl Into<Self>, b: impl Into<Self>) -> Self {
        Self::or_from([a.into(), b.into()])
    }

    /// Creates a new predicate AND(preds...)
    pub fn and_from(preds: impl IntoIterator<Item = Self>) -> Self {
        Self::junction(JunctionPredicateOp::And, preds)
    }

    /// Creates a new predicate OR(preds...)
    pub fn or_from(preds: impl IntoIterator<Item = Self>) -> Self {
        Self::junction(JunctionPredicateOp::Or, preds)
    }

    /// Creates a new binary predicate lhs OP rhs
    pub fn binary(
        op: BinaryPredicateOp,
        lhs: impl Into<Expression>,
        rhs: impl Into<Expression>,
    ) -> Self {
        Self::Binary(BinaryPredicate {
            op,
            left: Box::new(lhs.into()),
            right: Box::new(rhs.into()),
        })
    }

    /// Creates a new junction predicate OP(preds...)
    pub fn junction(op: JunctionPredicateOp, preds: impl IntoIterator<Item = Self>) -> Self {
        let preds = preds.into_iter().collect();
        Self::Junction(JunctionPredicate { op, preds })
    }

    /// Returns the set of column names referenced by this predicate.
    pub fn references(&self) -> HashSet<&str> {
        let mut refs = HashSet::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references<'a>(&'a self, refs: &mut HashSet<&'a str>) {
        match self {
            Self::BooleanExpression(expr) => refs.extend(expr.references()),
            Self::IsNull(expr) => refs.extend(expr.references()),
            Self::Not(pred) => pred.collect_references(refs),
            Self::Binary(BinaryPredicate { left, right, .. }) => {
                refs.extend(left.references());
                refs.extend(right.references());
            }
            Self::Junction(JunctionPredicate { preds, .. }) => {
                for pred in preds {
                    pred.collect_references(refs);
                }
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////
// Trait impls
////////////////////////////////////////////////////////////////////////

impl Display for BinaryPredicateOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use BinaryPredicateOp::*;
        match self {
            LessThan => write!(f, "<"),
            GreaterThan => write!(f, ">"),
            Equal => write!(f, "="),
            Distinct => write!(f, "DISTINCT"),
        }
    }
}

fn format_child_list<T: Display>(children: &[T]) -> String {
    children.iter().map(|c| format!("{c}")).join(", ")
}

impl Display for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(l) => write!(f, "{l}"),
            Self::Column(name) => write!(f, "Column({name})"),
        }
    }
}

impl Display for Predicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use Predicate::*;
        match self {
            BooleanExpression(expr) => write!(f, "{expr}"),
            Not(pred) => match pred.as_ref() {
                IsNull(expr) => write!(f, "{expr} IS NOT NULL"),
                pred => write!(f, "NOT({pred})"),
            },
            IsNull(expr) => write!(f, "{expr} IS NULL"),
            Binary(BinaryPredicate {
                op: BinaryPredicateOp::Distinct,
                left,
                right,
            }) => write!(f, "DISTINCT({left}, {right})"),
            Binary(BinaryPredicate { op, left, right }) => write!(f, "{left} {op} {right}"),
            Junction(JunctionPredicate { op, preds }) => {
                let op = match op {
                    JunctionPredicateOp::And => "AND",
                    JunctionPredicateOp::Or => "OR",
                };
                write!(f, "{op}({})", format_child_list(preds))
            }
        }
    }
}

impl From<Scalar> for Expression {
    fn from(value: Scalar) -> Self {
        Self::Literal(value)
    }
}

impl From<&str> for Expression {
    fn from(value: &str) -> Self {
        Self::literal(value)
    }
}

impl From<i64> for Expression {
    fn from(value: i64) -> Self {
        Self::literal(value)
    }
}

impl From<i32> for Expression {
    fn from(value: i32) -> Self {
        Self::literal(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{Expression as Expr, Predicate as Pred};

    #[test]
    fn test_expression_format() {
        let cases = [
            (Expr::column("x").eq(Expr::literal("us")), "Column(x) = 'us'"),
            (Expr::column("x").lt(3i64), "Column(x) < 3"),
            (Expr::column("x").le(3i64), "NOT(Column(x) > 3)"),
            (Expr::column("x").is_null(), "Column(x) IS NULL"),
            (Expr::column("x").is_not_null(), "Column(x) IS NOT NULL"),
            (
                Pred::and(Expr::column("a").gt(1), Expr::column("b").eq(2)),
                "AND(Column(a) > 1, Column(b) = 2)",
            ),
            (
                Pred::or_from([Pred::literal(true), Pred::column("flag")]),
                "OR(true, Column(flag))",
            ),
            (Pred::distinct(Expr::column("a"), 1), "DISTINCT(Column(a), 1)"),
        ];

        for (pred, expected) in cases {
            assert_eq!(pred.to_string(), expected);
        }
    }

    #[test]
    fn test_references() {
        let pred = Pred::and_from([
            Expr::column("a").gt(1),
            Pred::not(Expr::column("b").is_null()),
            Pred::or(Pred::column("c"), Pred::literal(false)),
        ]);
        let mut refs: Vec<_> = pred.references().into_iter().collect();
        refs.sort();
        assert_eq!(refs, vec!["a", "b", "c"]);
    }
}
