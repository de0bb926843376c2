use std::collections::HashMap;

use crate::value::UserValue;
use crate::HackleValue;

/// The identifier type every user carries by default.
pub const DEFAULT_IDENTIFIER_TYPE: &str = "$id";

/// A fully-resolved user, as supplied by the host user-state layer.
///
/// The evaluation engine reads this structure but never mutates it: it
/// resolves condition keys against the identifier/property maps, checks
/// cohort membership, and aggregates over [TargetEvent] records.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HackleUser {
    identifiers: HashMap<String, String>,
    properties: HashMap<String, UserValue>,
    hackle_properties: HashMap<String, UserValue>,
    cohorts: Vec<i64>,
    target_events: Vec<TargetEvent>,
}

impl HackleUser {
    /// Create a builder with the default identifier set to `id`.
    pub fn with_id(id: impl Into<String>) -> HackleUserBuilder {
        HackleUserBuilder::new().identifier(DEFAULT_IDENTIFIER_TYPE, id)
    }

    pub fn builder() -> HackleUserBuilder {
        HackleUserBuilder::new()
    }

    /// The identifier registered for `identifier_type`, if any.
    pub fn identifier(&self, identifier_type: &str) -> Option<&str> {
        self.identifiers.get(identifier_type).map(|s| s.as_str())
    }

    pub fn property(&self, name: &str) -> Option<&UserValue> {
        self.properties.get(name)
    }

    pub fn hackle_property(&self, name: &str) -> Option<&UserValue> {
        self.hackle_properties.get(name)
    }

    pub fn cohorts(&self) -> &[i64] {
        &self.cohorts
    }

    pub fn target_events(&self) -> &[TargetEvent] {
        &self.target_events
    }
}

/// Contains methods for configuring a user.
#[derive(Clone, Debug, Default)]
pub struct HackleUserBuilder {
    user: HackleUser,
}

impl HackleUserBuilder {
    pub fn new() -> Self {
        Self {
            user: HackleUser::default(),
        }
    }

    pub fn identifier(
        mut self,
        identifier_type: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.user
            .identifiers
            .insert(identifier_type.into(), value.into());
        self
    }

    pub fn property(mut self, name: impl Into<String>, value: impl Into<UserValue>) -> Self {
        self.user.properties.insert(name.into(), value.into());
        self
    }

    pub fn hackle_property(mut self, name: impl Into<String>, value: impl Into<UserValue>) -> Self {
        self.user.hackle_properties.insert(name.into(), value.into());
        self
    }

    pub fn cohort(mut self, cohort_id: i64) -> Self {
        self.user.cohorts.push(cohort_id);
        self
    }

    pub fn target_event(mut self, target_event: TargetEvent) -> Self {
        self.user.target_events.push(target_event);
        self
    }

    pub fn build(self) -> HackleUser {
        self.user
    }
}

/// A tracked event, used when evaluating event-triggered requests
/// (in-app-message trigger rules and `eventProperty` conditions).
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    key: String,
    properties: HashMap<String, UserValue>,
}

impl Event {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            properties: HashMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<UserValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn property(&self, name: &str) -> Option<&UserValue> {
        self.properties.get(name)
    }
}

/// A user-side windowed-event-count record, supplied read-only by the host
/// user-state layer and consumed by the event-count condition matchers.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetEvent {
    pub event_key: String,
    pub stats: Vec<TargetEventStat>,
    /// Present only for records that were aggregated per property value.
    pub property: Option<TargetEventProperty>,
}

/// A per-day count entry. `date` is the day bucket in unix epoch millis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TargetEventStat {
    pub date: i64,
    pub count: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TargetEventProperty {
    pub key: String,
    pub value: HackleValue,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_all_fields() {
        let user = HackleUser::with_id("user-1")
            .identifier("$deviceId", "device-1")
            .property("age", 25_i64)
            .hackle_property("osName", "iOS")
            .cohort(42)
            .target_event(TargetEvent {
                event_key: "purchase".to_string(),
                stats: vec![TargetEventStat { date: 1, count: 2 }],
                property: None,
            })
            .build();

        assert_eq!(user.identifier("$id"), Some("user-1"));
        assert_eq!(user.identifier("$deviceId"), Some("device-1"));
        assert_eq!(user.identifier("$sessionId"), None);
        assert_eq!(user.property("age"), Some(&UserValue::from(25_i64)));
        assert_eq!(user.property("unknown"), None);
        assert_eq!(
            user.hackle_property("osName"),
            Some(&UserValue::from("iOS"))
        );
        assert_eq!(user.cohorts(), &[42]);
        assert_eq!(user.target_events().len(), 1);
    }

    #[test]
    fn event_properties() {
        let event = Event::new("purchase").with_property("amount", 42.0);
        assert_eq!(event.key(), "purchase");
        assert_eq!(event.property("amount"), Some(&UserValue::from(42.0)));
        assert_eq!(event.property("missing"), None);
    }
}
