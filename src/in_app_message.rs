use serde::Deserialize;

use crate::evaluator::{
    DecisionReason, Evaluator, EvaluatorContext, EvaluatorError, EvaluatorRequest,
    InAppMessageRequest,
};
use crate::target::Target;

/// An in-app message and the rules deciding who may see it and when.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InAppMessage {
    pub id: i64,
    pub key: i64,
    pub status: InAppMessageStatus,
    /// Display window in epoch millis. Absent means always displayable.
    #[serde(default)]
    pub period: Option<InAppMessagePeriod>,
    #[serde(default)]
    pub event_trigger_rules: Vec<EventTriggerRule>,
    pub target_context: InAppMessageTargetContext,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InAppMessageStatus {
    Draft,
    Pause,
    Active,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InAppMessagePeriod {
    pub start_millis_inclusive: i64,
    pub end_millis_exclusive: i64,
}

impl InAppMessagePeriod {
    pub fn contains(&self, timestamp: i64) -> bool {
        self.start_millis_inclusive <= timestamp && timestamp < self.end_millis_exclusive
    }
}

/// A trigger rule: the message may be shown in response to `event_key`
/// events matching the rule's targets.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventTriggerRule {
    pub event_key: String,
    #[serde(default)]
    pub targets: Vec<Target>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InAppMessageTargetContext {
    #[serde(default)]
    pub overrides: Vec<InAppMessageUserOverride>,
    #[serde(default)]
    pub targets: Vec<Target>,
}

/// A test-device style override: users carrying one of the listed
/// identifiers are always eligible.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InAppMessageUserOverride {
    pub identifier_type: String,
    pub identifiers: Vec<String>,
}

/// The result of evaluating one in-app message for one user.
#[derive(Clone, Debug, PartialEq)]
pub struct InAppMessageEvaluation {
    pub reason: DecisionReason,
    pub target_evaluations: Vec<crate::evaluator::EvaluatorEvaluation>,
    pub in_app_message_id: i64,
    pub in_app_message_key: i64,
    pub is_eligible: bool,
}

impl InAppMessageEvaluation {
    fn of(
        request: &InAppMessageRequest<'_>,
        context: &EvaluatorContext,
        is_eligible: bool,
        reason: DecisionReason,
    ) -> Self {
        Self {
            reason,
            target_evaluations: context.evaluations().to_vec(),
            in_app_message_id: request.in_app_message.id,
            in_app_message_key: request.in_app_message.key,
            is_eligible,
        }
    }
}

impl Evaluator {
    pub(crate) fn evaluate_in_app_message(
        &self,
        request: &InAppMessageRequest<'_>,
        context: &mut EvaluatorContext,
    ) -> Result<InAppMessageEvaluation, EvaluatorError> {
        let message = request.in_app_message;
        let ineligible = |context: &EvaluatorContext, reason| {
            Ok(InAppMessageEvaluation::of(request, context, false, reason))
        };

        match message.status {
            InAppMessageStatus::Draft => {
                return ineligible(context, DecisionReason::InAppMessageDraft)
            }
            InAppMessageStatus::Pause => {
                return ineligible(context, DecisionReason::InAppMessagePaused)
            }
            InAppMessageStatus::Active => {}
        }

        if let Some(period) = &message.period {
            if !period.contains(self.clock.now_millis()) {
                return ineligible(context, DecisionReason::NotInInAppMessagePeriod);
            }
        }

        let eval_request = EvaluatorRequest::InAppMessage(*request);
        if let Some(event) = request.event {
            if !self.trigger_matches(&eval_request, context, event.key())? {
                return ineligible(context, DecisionReason::NotInInAppMessageTarget);
            }
        }

        if self.override_matches(request) {
            return Ok(InAppMessageEvaluation::of(
                request,
                context,
                true,
                DecisionReason::InAppMessageTarget,
            ));
        }

        if self.any_target_matches(&eval_request, context, &message.target_context.targets)? {
            Ok(InAppMessageEvaluation::of(
                request,
                context,
                true,
                DecisionReason::InAppMessageTarget,
            ))
        } else {
            ineligible(context, DecisionReason::NotInInAppMessageTarget)
        }
    }

    fn trigger_matches(
        &self,
        request: &EvaluatorRequest<'_>,
        context: &mut EvaluatorContext,
        event_key: &str,
    ) -> Result<bool, EvaluatorError> {
        let message = match request {
            EvaluatorRequest::InAppMessage(r) => r.in_app_message,
            _ => return Ok(false),
        };
        for rule in &message.event_trigger_rules {
            if rule.event_key == event_key
                && self.any_target_matches(request, context, &rule.targets)?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn override_matches(&self, request: &InAppMessageRequest<'_>) -> bool {
        request
            .in_app_message
            .target_context
            .overrides
            .iter()
            .any(|o| match request.user.identifier(&o.identifier_type) {
                Some(identifier) => o.identifiers.iter().any(|i| i == identifier),
                None => false,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucketer::Sha1Bucketer;
    use crate::clock::FixedClock;
    use crate::evaluator::EvaluatorEvaluation;
    use crate::test_common::TestWorkspace;
    use crate::user::{Event, HackleUser};
    use crate::workspace::Workspace;

    const NOW: i64 = 1_700_000_000_000;

    const MESSAGE_JSON: &str = r#"{
        "id": 300,
        "key": 3000,
        "status": "ACTIVE",
        "eventTriggerRules": [{"eventKey": "session_start", "targets": []}],
        "targetContext": {
            "overrides": [{"identifierType": "$id", "identifiers": ["qa-user"]}],
            "targets": [
                {
                    "conditions": [
                        {
                            "key": {"type": "hackleProperty", "name": "osName"},
                            "match": {
                                "type": "match",
                                "operator": "in",
                                "valueType": "string",
                                "values": ["iOS"]
                            }
                        }
                    ]
                }
            ]
        }
    }"#;

    fn evaluate(
        workspace: &TestWorkspace,
        user: &HackleUser,
        event: Option<&Event>,
    ) -> Result<InAppMessageEvaluation, EvaluatorError> {
        let message = workspace.in_app_message(3000).unwrap();
        let request = EvaluatorRequest::InAppMessage(InAppMessageRequest {
            workspace,
            user,
            in_app_message: message,
            event,
        });
        let evaluator = Evaluator::new(Box::new(Sha1Bucketer), Box::new(FixedClock(NOW)));
        let mut context = EvaluatorContext::new();
        match evaluator.evaluate(&request, &mut context)? {
            EvaluatorEvaluation::InAppMessage(evaluation) => Ok(evaluation),
            _ => panic!("expected an in-app message evaluation"),
        }
    }

    #[test]
    fn matching_user_is_eligible() {
        let workspace = TestWorkspace::new().with_in_app_message(MESSAGE_JSON);
        let user = HackleUser::with_id("user-1")
            .hackle_property("osName", "iOS")
            .build();

        let evaluation = evaluate(&workspace, &user, None).unwrap();
        assert!(evaluation.is_eligible);
        assert_eq!(evaluation.reason, DecisionReason::InAppMessageTarget);
        assert_eq!(evaluation.in_app_message_key, 3000);
    }

    #[test]
    fn non_matching_user_is_not_eligible() {
        let workspace = TestWorkspace::new().with_in_app_message(MESSAGE_JSON);
        let user = HackleUser::with_id("user-1")
            .hackle_property("osName", "Android")
            .build();

        let evaluation = evaluate(&workspace, &user, None).unwrap();
        assert!(!evaluation.is_eligible);
        assert_eq!(evaluation.reason, DecisionReason::NotInInAppMessageTarget);
    }

    #[test]
    fn override_bypasses_targets() {
        let workspace = TestWorkspace::new().with_in_app_message(MESSAGE_JSON);
        let user = HackleUser::with_id("qa-user")
            .hackle_property("osName", "Android")
            .build();

        let evaluation = evaluate(&workspace, &user, None).unwrap();
        assert!(evaluation.is_eligible);
        assert_eq!(evaluation.reason, DecisionReason::InAppMessageTarget);
    }

    #[test]
    fn draft_and_paused_messages_are_not_shown() {
        let user = HackleUser::with_id("qa-user").build();

        let workspace = TestWorkspace::new()
            .with_in_app_message(&MESSAGE_JSON.replace("ACTIVE", "DRAFT"));
        let evaluation = evaluate(&workspace, &user, None).unwrap();
        assert!(!evaluation.is_eligible);
        assert_eq!(evaluation.reason, DecisionReason::InAppMessageDraft);

        let workspace = TestWorkspace::new()
            .with_in_app_message(&MESSAGE_JSON.replace("ACTIVE", "PAUSE"));
        let evaluation = evaluate(&workspace, &user, None).unwrap();
        assert!(!evaluation.is_eligible);
        assert_eq!(evaluation.reason, DecisionReason::InAppMessagePaused);
    }

    #[test]
    fn display_period() {
        let user = HackleUser::with_id("qa-user").build();
        let in_period = format!(
            r#""period": {{"startMillisInclusive": {}, "endMillisExclusive": {}}},"#,
            NOW - 1000,
            NOW + 1000
        );
        let out_of_period = format!(
            r#""period": {{"startMillisInclusive": {}, "endMillisExclusive": {}}},"#,
            NOW + 1000,
            NOW + 2000
        );

        let workspace = TestWorkspace::new().with_in_app_message(
            &MESSAGE_JSON.replace(r#""status": "ACTIVE","#, &format!(r#""status": "ACTIVE", {in_period}"#)),
        );
        assert!(evaluate(&workspace, &user, None).unwrap().is_eligible);

        let workspace = TestWorkspace::new().with_in_app_message(
            &MESSAGE_JSON.replace(r#""status": "ACTIVE","#, &format!(r#""status": "ACTIVE", {out_of_period}"#)),
        );
        let evaluation = evaluate(&workspace, &user, None).unwrap();
        assert!(!evaluation.is_eligible);
        assert_eq!(evaluation.reason, DecisionReason::NotInInAppMessagePeriod);
    }

    #[test]
    fn event_trigger_rules() {
        let workspace = TestWorkspace::new().with_in_app_message(MESSAGE_JSON);
        let user = HackleUser::with_id("user-1")
            .hackle_property("osName", "iOS")
            .build();

        let triggering = Event::new("session_start");
        let evaluation = evaluate(&workspace, &user, Some(&triggering)).unwrap();
        assert!(evaluation.is_eligible);

        let other = Event::new("purchase");
        let evaluation = evaluate(&workspace, &user, Some(&other)).unwrap();
        assert!(!evaluation.is_eligible);
        assert_eq!(evaluation.reason, DecisionReason::NotInInAppMessageTarget);
    }

    #[test]
    fn period_is_half_open() {
        let period = InAppMessagePeriod {
            start_millis_inclusive: 100,
            end_millis_exclusive: 200,
        };
        assert!(period.contains(100));
        assert!(period.contains(199));
        assert!(!period.contains(200));
        assert!(!period.contains(99));
    }
}
