use serde::Deserialize;

use crate::HackleValue;

/// A reusable boolean predicate over user/event/derived attributes.
///
/// All conditions of a target must hold for the target to match; a list of
/// targets matches if any of them does.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Target {
    pub conditions: Vec<Condition>,
}

impl Target {
    pub fn new(conditions: Vec<Condition>) -> Self {
        Target { conditions }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Condition {
    pub key: TargetKey,
    #[serde(rename = "match")]
    pub matcher: Match,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct TargetKey {
    #[serde(rename = "type")]
    pub key_type: KeyType,
    pub name: String,
}

/// The closed set of condition key types. The key type determines how the
/// left-hand side of a condition is resolved to a concrete value.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum KeyType {
    UserId,
    UserProperty,
    HackleProperty,
    EventProperty,
    Segment,
    AbTest,
    FeatureFlag,
    Cohort,
    NumberOfEventsInDays,
    NumberOfEventsWithPropertyInDays,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    #[serde(rename = "type")]
    pub match_type: MatchType,
    #[serde(rename = "operator")]
    pub match_operator: Operator,
    pub value_type: ValueType,
    pub values: Vec<HackleValue>,
}

impl Match {
    pub fn new(
        match_type: MatchType,
        match_operator: Operator,
        value_type: ValueType,
        values: Vec<HackleValue>,
    ) -> Self {
        Match {
            match_type,
            match_operator,
            value_type,
            values,
        }
    }
}

/// Polarity of a match: `NotMatch` inverts the final boolean.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum MatchType {
    Match,
    NotMatch,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    In,
    Contains,
    StartsWith,
    EndsWith,
    Gt,
    Gte,
    Lt,
    Lte,
    Exists,
    Regex,
}

/// The declared type of a condition's match values; selects the value
/// matcher used for leaf comparisons.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum ValueType {
    String,
    Number,
    Bool,
    Version,
    Json,
    Null,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_parse() {
        let condition: Condition = serde_json::from_str(
            r#"{
                "key": {"type": "userProperty", "name": "age"},
                "match": {
                    "type": "match",
                    "operator": "gte",
                    "valueType": "number",
                    "values": [18]
                }
            }"#,
        )
        .expect("should parse");

        assert_eq!(
            condition,
            Condition {
                key: TargetKey {
                    key_type: KeyType::UserProperty,
                    name: "age".to_string(),
                },
                matcher: Match::new(
                    MatchType::Match,
                    Operator::Gte,
                    ValueType::Number,
                    vec![HackleValue::from(18_i64)],
                ),
            }
        );
    }

    #[test]
    fn key_type_parse() {
        fn parse(json: &str) -> KeyType {
            serde_json::from_str(json).expect("should parse")
        }

        assert_eq!(parse("\"userId\""), KeyType::UserId);
        assert_eq!(parse("\"hackleProperty\""), KeyType::HackleProperty);
        assert_eq!(parse("\"eventProperty\""), KeyType::EventProperty);
        assert_eq!(parse("\"abTest\""), KeyType::AbTest);
        assert_eq!(parse("\"featureFlag\""), KeyType::FeatureFlag);
        assert_eq!(parse("\"cohort\""), KeyType::Cohort);
        assert_eq!(
            parse("\"numberOfEventsInDays\""),
            KeyType::NumberOfEventsInDays
        );
        assert_eq!(
            parse("\"numberOfEventsWithPropertyInDays\""),
            KeyType::NumberOfEventsWithPropertyInDays
        );
    }

    #[test]
    fn target_parse() {
        let target: Target = serde_json::from_str(
            r#"{
                "conditions": [
                    {
                        "key": {"type": "segment", "name": "SEGMENT"},
                        "match": {
                            "type": "notMatch",
                            "operator": "in",
                            "valueType": "string",
                            "values": ["seg-01", "seg-02"]
                        }
                    }
                ]
            }"#,
        )
        .expect("should parse");

        assert_eq!(target.conditions.len(), 1);
        assert_eq!(target.conditions[0].key.key_type, KeyType::Segment);
        assert_eq!(target.conditions[0].matcher.match_type, MatchType::NotMatch);
        assert_eq!(target.conditions[0].matcher.values.len(), 2);
    }
}
