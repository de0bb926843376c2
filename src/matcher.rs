use log::warn;
use regex::Regex;

use crate::target::{Match, MatchType, Operator, ValueType};
use crate::value::UserValue;
use crate::HackleValue;

/// Match a resolved user-side value against a condition's [Match].
///
/// Arrays match with OR semantics over their non-null elements; an empty
/// array, or an array containing only nulls, matches nothing. The final
/// boolean is inverted when the match type is `notMatch`.
pub(crate) fn value_operator_matches(user_value: Option<&UserValue>, m: &Match) -> bool {
    let matched = match user_value {
        None => operator_matches(m, None),
        Some(UserValue::Single(value)) => operator_matches(m, Some(value)),
        Some(UserValue::Array(values)) => values
            .iter()
            .filter(|value| !value.is_null())
            .any(|value| operator_matches(m, Some(value))),
    };
    match m.match_type {
        MatchType::Match => matched,
        MatchType::NotMatch => !matched,
    }
}

/// Apply the operator across the candidate match values (OR semantics).
///
/// `exists` ignores the candidates entirely; every other operator fails
/// closed on an absent user value.
fn operator_matches(m: &Match, user_value: Option<&HackleValue>) -> bool {
    let user_value = match user_value {
        Some(value) if !value.is_null() => value,
        _ => return false,
    };
    if m.match_operator == Operator::Exists {
        return true;
    }
    m.values
        .iter()
        .any(|match_value| value_matches(m.match_operator, m.value_type, user_value, match_value))
}

/// Compare one user value against one candidate value, coercing both sides
/// to the condition's declared value type. Coercion failure on either side
/// is a non-match, never an error.
fn value_matches(
    operator: Operator,
    value_type: ValueType,
    user_value: &HackleValue,
    match_value: &HackleValue,
) -> bool {
    match value_type {
        // json values are compared textually
        ValueType::String | ValueType::Json => string_op(user_value, match_value, operator),
        ValueType::Number => number_op(user_value, match_value, operator),
        ValueType::Bool => bool_op(user_value, match_value, operator),
        ValueType::Version => version_op(user_value, match_value, operator),
        // a null value type can never match anything
        ValueType::Null => false,
    }
}

fn string_op(lhs: &HackleValue, rhs: &HackleValue, operator: Operator) -> bool {
    match (lhs.as_string(), rhs.as_string()) {
        (Some(l), Some(r)) => match operator {
            Operator::In => l == r,
            Operator::Contains => l.contains(&r),
            Operator::StartsWith => l.starts_with(&r),
            Operator::EndsWith => l.ends_with(&r),
            Operator::Gt => l > r,
            Operator::Gte => l >= r,
            Operator::Lt => l < r,
            Operator::Lte => l <= r,
            Operator::Regex => match Regex::new(&r) {
                Ok(re) => re.is_match(&l),
                Err(e) => {
                    warn!("Invalid regex for 'regex' operator ({}): {}", e, r);
                    false
                }
            },
            Operator::Exists => false,
        },
        _ => false,
    }
}

fn number_op(lhs: &HackleValue, rhs: &HackleValue, operator: Operator) -> bool {
    match (lhs.as_double(), rhs.as_double()) {
        (Some(l), Some(r)) => match operator {
            Operator::In => l == r,
            Operator::Gt => l > r,
            Operator::Gte => l >= r,
            Operator::Lt => l < r,
            Operator::Lte => l <= r,
            _ => false,
        },
        _ => false,
    }
}

fn bool_op(lhs: &HackleValue, rhs: &HackleValue, operator: Operator) -> bool {
    match (lhs.as_bool(), rhs.as_bool()) {
        (Some(l), Some(r)) => match operator {
            Operator::In => l == r,
            _ => false,
        },
        _ => false,
    }
}

fn version_op(lhs: &HackleValue, rhs: &HackleValue, operator: Operator) -> bool {
    match (lhs.as_version(), rhs.as_version()) {
        (Some(l), Some(r)) => match operator {
            Operator::In => l == r,
            Operator::Gt => l > r,
            Operator::Gte => l >= r,
            Operator::Lt => l < r,
            Operator::Lte => l <= r,
            _ => false,
        },
        _ => false,
    }
}
