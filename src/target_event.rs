use serde::Deserialize;

use crate::evaluator::{Evaluator, EvaluatorError};
use crate::matcher::value_operator_matches;
use crate::target::{Condition, KeyType};
use crate::user::{HackleUser, TargetEvent};
use crate::value::UserValue;
use crate::HackleValue;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// The key payload of a `numberOfEventsInDays` condition, serialized as JSON
/// into the condition key's name.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NumberOfEventsInDays {
    event_key: String,
    days: i64,
}

/// The key payload of a `numberOfEventsWithPropertyInDays` condition. Only
/// events whose recorded property satisfies `property_filter` are counted.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NumberOfEventsWithPropertyInDays {
    event_key: String,
    days: i64,
    property_filter: Condition,
}

impl Evaluator {
    /// Match a windowed event-count condition against the user's
    /// pre-aggregated per-day event records.
    pub(crate) fn target_event_matches(
        &self,
        user: &HackleUser,
        condition: &Condition,
    ) -> Result<bool, EvaluatorError> {
        let count = match condition.key.key_type {
            KeyType::NumberOfEventsInDays => {
                let key: NumberOfEventsInDays = parse_aggregation_key(&condition.key.name)?;
                let cutoff = self.window_cutoff(key.days)?;
                count_events(user, &key.event_key, cutoff, |event| event.property.is_none())
            }
            KeyType::NumberOfEventsWithPropertyInDays => {
                let key: NumberOfEventsWithPropertyInDays =
                    parse_aggregation_key(&condition.key.name)?;
                let cutoff = self.window_cutoff(key.days)?;
                count_events(user, &key.event_key, cutoff, |event| {
                    property_satisfies(event, &key.property_filter)
                })
            }
            key_type => return Err(EvaluatorError::UnsupportedKeyType { key_type }),
        };

        Ok(value_operator_matches(
            Some(&UserValue::Single(HackleValue::from(count))),
            &condition.matcher,
        ))
    }

    /// The epoch-millis lower bound of a `days`-long window ending now.
    fn window_cutoff(&self, days: i64) -> Result<i64, EvaluatorError> {
        if days <= 0 {
            return Err(EvaluatorError::DayWindowOutOfRange(days));
        }
        let window = days
            .checked_mul(MILLIS_PER_DAY)
            .ok_or(EvaluatorError::DayWindowOutOfRange(days))?;
        Ok(self.clock.now_millis() - window)
    }
}

fn parse_aggregation_key<'a, T: Deserialize<'a>>(name: &'a str) -> Result<T, EvaluatorError> {
    serde_json::from_str(name).map_err(|_| EvaluatorError::InvalidAggregationKey(name.to_string()))
}

fn count_events(
    user: &HackleUser,
    event_key: &str,
    cutoff: i64,
    record_filter: impl Fn(&TargetEvent) -> bool,
) -> i64 {
    user.target_events()
        .iter()
        .filter(|event| event.event_key == event_key && record_filter(event))
        .flat_map(|event| &event.stats)
        .filter(|stat| stat.date >= cutoff)
        .map(|stat| stat.count)
        .sum()
}

fn property_satisfies(event: &TargetEvent, filter: &Condition) -> bool {
    match &event.property {
        Some(property) if property.key == filter.key.name => value_operator_matches(
            Some(&UserValue::Single(property.value.clone())),
            &filter.matcher,
        ),
        _ => false,
    }
}
