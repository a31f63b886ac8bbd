//! Run search: filter parsing and evaluation
//!
//! The filter grammar is a conjunction of comparisons over qualified keys:
//!
//! ```text
//! metrics.loss < 0.5 AND params.lr = '0.01' AND tags.model != 'mlp'
//! AND attributes.status = 'FINISHED'
//! ```
//!
//! Expressions are parsed with sqlparser by treating the filter as a WHERE
//! clause, then lowered to a typed comparison list: metric comparisons are
//! numeric, param/tag comparisons are string equality, and attribute
//! comparisons cover `status` (string) and `start_time`/`end_time`
//! (numeric). Evaluation is pure over a materialized [`Run`] snapshot.

use std::cmp::Ordering;

use sqlparser::ast::{BinaryOperator, Expr, Ident, SetExpr, Statement, UnaryOperator, Value};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::entity::Run;
use crate::{Error, Result};

/// Upper bound on `max_results` accepted by `search_runs`.
pub const SEARCH_MAX_RESULTS_THRESHOLD: usize = 50_000;

/// Which entity collection a comparison targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Metric,
    Param,
    Tag,
    Attribute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    const fn is_equality(self) -> bool {
        matches!(self, Self::Eq | Self::NotEq)
    }

    fn eval_ordering(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::NotEq => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::LtEq => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::GtEq => ordering != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Comparison {
    target: Target,
    key: String,
    op: CompareOp,
    value: Operand,
}

/// A parsed, validated filter expression: zero or more ANDed comparisons.
///
/// The empty filter matches every run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunFilter {
    comparisons: Vec<Comparison>,
}

impl RunFilter {
    /// Parse a filter expression.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for syntax errors, unknown key prefixes,
    /// disjunctions, or comparisons whose operand/operator types do not fit
    /// the target (e.g. a string compared against a metric).
    pub fn parse(expression: &str) -> Result<Self> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Ok(Self::default());
        }

        // The filter grammar is a SQL WHERE clause in disguise; let the SQL
        // parser do the tokenizing and lower its AST afterwards.
        let sql = format!("SELECT * FROM runs WHERE {expression}");
        let statements = Parser::parse_sql(&GenericDialect {}, &sql)
            .map_err(|e| Error::InvalidArgument(format!("malformed filter expression: {e}")))?;
        if statements.len() != 1 {
            return Err(Error::InvalidArgument(
                "filter must be a single expression".to_string(),
            ));
        }

        let Statement::Query(query) = &statements[0] else {
            return Err(Error::InvalidArgument(
                "filter must be a boolean expression".to_string(),
            ));
        };
        let SetExpr::Select(select) = query.body.as_ref() else {
            return Err(Error::InvalidArgument(
                "filter must be a boolean expression".to_string(),
            ));
        };
        let Some(selection) = select.selection.as_ref() else {
            return Err(Error::InvalidArgument(
                "filter must contain at least one comparison".to_string(),
            ));
        };

        let mut comparisons = Vec::new();
        lower_conjunction(selection, &mut comparisons)?;
        Ok(Self { comparisons })
    }

    /// True when the filter has no comparisons.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.comparisons.is_empty()
    }

    /// Evaluate the filter against a materialized run snapshot.
    ///
    /// Pure: no store access, no side effects. A comparison over an absent
    /// key is false, so runs missing the key never match.
    #[must_use]
    pub fn matches(&self, run: &Run) -> bool {
        self.comparisons.iter().all(|c| eval_comparison(c, run))
    }
}

/// Flatten an AND chain into comparison leaves.
fn lower_conjunction(expr: &Expr, out: &mut Vec<Comparison>) -> Result<()> {
    match expr {
        Expr::BinaryOp { left, op: BinaryOperator::And, right } => {
            lower_conjunction(left, out)?;
            lower_conjunction(right, out)
        }
        Expr::Nested(inner) => lower_conjunction(inner, out),
        Expr::BinaryOp { left, op, right } => {
            out.push(lower_comparison(left, op, right)?);
            Ok(())
        }
        other => Err(Error::InvalidArgument(format!(
            "unsupported filter clause '{other}': expected ANDed comparisons"
        ))),
    }
}

fn lower_comparison(left: &Expr, op: &BinaryOperator, right: &Expr) -> Result<Comparison> {
    let op = match op {
        BinaryOperator::Eq => CompareOp::Eq,
        BinaryOperator::NotEq => CompareOp::NotEq,
        BinaryOperator::Lt => CompareOp::Lt,
        BinaryOperator::LtEq => CompareOp::LtEq,
        BinaryOperator::Gt => CompareOp::Gt,
        BinaryOperator::GtEq => CompareOp::GtEq,
        other => {
            return Err(Error::InvalidArgument(format!(
                "unsupported comparison operator '{other}'"
            )))
        }
    };
    let (target, key) = lower_key(left)?;
    let value = lower_operand(right)?;
    validate_comparison(target, &key, op, &value)?;
    Ok(Comparison { target, key, op, value })
}

fn lower_key(expr: &Expr) -> Result<(Target, String)> {
    let Expr::CompoundIdentifier(parts) = expr else {
        return Err(Error::InvalidArgument(format!(
            "comparison key '{expr}' must be qualified, e.g. metrics.loss or params.lr"
        )));
    };
    let [prefix, key] = parts.as_slice() else {
        return Err(Error::InvalidArgument(format!(
            "comparison key '{expr}' must have exactly one qualifier"
        )));
    };
    let target = match prefix.value.as_str() {
        "metric" | "metrics" => Target::Metric,
        "param" | "params" | "parameter" => Target::Param,
        "tag" | "tags" => Target::Tag,
        "attribute" | "attributes" | "attr" | "run" => Target::Attribute,
        other => {
            return Err(Error::InvalidArgument(format!(
                "invalid key prefix '{other}': expected metrics, params, tags, or attributes"
            )))
        }
    };
    Ok((target, unquoted(key)))
}

fn unquoted(ident: &Ident) -> String {
    ident.value.clone()
}

fn lower_operand(expr: &Expr) -> Result<Operand> {
    match expr {
        Expr::Value(Value::Number(n, _)) => n
            .parse::<f64>()
            .map(Operand::Number)
            .map_err(|_| Error::InvalidArgument(format!("invalid numeric literal '{n}'"))),
        Expr::Value(Value::SingleQuotedString(s) | Value::DoubleQuotedString(s)) => {
            Ok(Operand::Text(s.clone()))
        }
        Expr::UnaryOp { op: UnaryOperator::Minus, expr } => match lower_operand(expr)? {
            Operand::Number(n) => Ok(Operand::Number(-n)),
            Operand::Text(_) => Err(Error::InvalidArgument(
                "cannot negate a string literal".to_string(),
            )),
        },
        other => Err(Error::InvalidArgument(format!(
            "unsupported comparison value '{other}': expected a number or quoted string"
        ))),
    }
}

fn validate_comparison(target: Target, key: &str, op: CompareOp, value: &Operand) -> Result<()> {
    match target {
        Target::Metric => match value {
            Operand::Number(_) => Ok(()),
            Operand::Text(_) => Err(Error::InvalidArgument(format!(
                "metric comparison 'metrics.{key}' requires a numeric value"
            ))),
        },
        Target::Param | Target::Tag => {
            let kind = if target == Target::Param { "param" } else { "tag" };
            if !op.is_equality() {
                return Err(Error::InvalidArgument(format!(
                    "{kind} comparison '{key}' supports only = and !="
                )));
            }
            match value {
                Operand::Text(_) => Ok(()),
                Operand::Number(_) => Err(Error::InvalidArgument(format!(
                    "{kind} comparison '{key}' requires a quoted string value"
                ))),
            }
        }
        Target::Attribute => match key {
            "status" => {
                if !op.is_equality() {
                    return Err(Error::InvalidArgument(
                        "attribute comparison 'status' supports only = and !=".to_string(),
                    ));
                }
                match value {
                    Operand::Text(_) => Ok(()),
                    Operand::Number(_) => Err(Error::InvalidArgument(
                        "attribute comparison 'status' requires a quoted string value".to_string(),
                    )),
                }
            }
            "start_time" | "end_time" => match value {
                Operand::Number(_) => Ok(()),
                Operand::Text(_) => Err(Error::InvalidArgument(format!(
                    "attribute comparison '{key}' requires a numeric value"
                ))),
            },
            other => Err(Error::InvalidArgument(format!(
                "invalid attribute '{other}': expected status, start_time, or end_time"
            ))),
        },
    }
}

fn eval_comparison(comparison: &Comparison, run: &Run) -> bool {
    match comparison.target {
        Target::Metric => {
            let Operand::Number(expected) = &comparison.value else { return false };
            run.latest_metric(&comparison.key)
                .and_then(|m| m.value().partial_cmp(expected))
                .is_some_and(|ordering| comparison.op.eval_ordering(ordering))
        }
        Target::Param => eval_text(run.param(&comparison.key), comparison),
        Target::Tag => eval_text(run.tag(&comparison.key), comparison),
        Target::Attribute => match comparison.key.as_str() {
            "status" => eval_text(Some(run.info().status().as_str()), comparison),
            "start_time" => eval_number(Some(run.info().start_time()), comparison),
            "end_time" => eval_number(run.info().end_time(), comparison),
            _ => false,
        },
    }
}

fn eval_text(actual: Option<&str>, comparison: &Comparison) -> bool {
    let (Some(actual), Operand::Text(expected)) = (actual, &comparison.value) else {
        return false;
    };
    comparison.op.eval_ordering(actual.cmp(expected.as_str()))
}

#[allow(clippy::cast_precision_loss)]
fn eval_number(actual: Option<i64>, comparison: &Comparison) -> bool {
    let (Some(actual), Operand::Number(expected)) = (actual, &comparison.value) else {
        return false;
    };
    (actual as f64)
        .partial_cmp(expected)
        .is_some_and(|ordering| comparison.op.eval_ordering(ordering))
}

/// Order survivors by `start_time` descending then `run_id` ascending, and
/// truncate to `max_results`. The run-id tie-break keeps result pages
/// deterministic across calls.
pub(crate) fn order_and_truncate(mut runs: Vec<Run>, max_results: usize) -> Vec<Run> {
    runs.sort_by(|a, b| {
        b.info()
            .start_time()
            .cmp(&a.info().start_time())
            .then_with(|| a.info().run_id().cmp(b.info().run_id()))
    });
    runs.truncate(max_results);
    runs
}
