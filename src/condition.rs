use crate::evaluator::{Evaluator, EvaluatorContext, EvaluatorError, EvaluatorRequest};
use crate::matcher::value_operator_matches;
use crate::target::{Condition, KeyType, MatchType, Target};
use crate::user::HackleUser;
use crate::value::UserValue;
use crate::workspace::Workspace;
use crate::HackleValue;

impl Evaluator {
    /// Whether every condition of `target` holds. A target with no
    /// conditions always matches.
    pub(crate) fn target_matches(
        &self,
        request: &EvaluatorRequest<'_>,
        context: &mut EvaluatorContext,
        target: &Target,
    ) -> Result<bool, EvaluatorError> {
        for condition in &target.conditions {
            if !self.condition_matches(request, context, condition)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Whether any target in `targets` matches. An empty list means no
    /// restriction and always matches.
    pub(crate) fn any_target_matches(
        &self,
        request: &EvaluatorRequest<'_>,
        context: &mut EvaluatorContext,
        targets: &[Target],
    ) -> Result<bool, EvaluatorError> {
        if targets.is_empty() {
            return Ok(true);
        }
        for target in targets {
            if self.target_matches(request, context, target)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Resolve and match a single condition. The key type selects how the
    /// user-side value is produced; the match itself is always performed by
    /// the value/operator matrix.
    pub(crate) fn condition_matches(
        &self,
        request: &EvaluatorRequest<'_>,
        context: &mut EvaluatorContext,
        condition: &Condition,
    ) -> Result<bool, EvaluatorError> {
        match condition.key.key_type {
            KeyType::UserId
            | KeyType::UserProperty
            | KeyType::HackleProperty
            | KeyType::Cohort => Ok(user_condition_matches(request.user(), condition)),
            KeyType::EventProperty => Ok(event_property_matches(request, condition)),
            KeyType::Segment => self.segment_condition_matches(request, condition),
            KeyType::AbTest | KeyType::FeatureFlag => {
                self.experiment_condition_matches(request, context, condition)
            }
            KeyType::NumberOfEventsInDays | KeyType::NumberOfEventsWithPropertyInDays => {
                self.target_event_matches(request.user(), condition)
            }
        }
    }

    /// A `segment` condition lists segment keys; the user matches when any
    /// referenced segment's targets match. The condition's polarity is then
    /// applied to that boolean, so `notMatch` means "in none of them".
    fn segment_condition_matches(
        &self,
        request: &EvaluatorRequest<'_>,
        condition: &Condition,
    ) -> Result<bool, EvaluatorError> {
        let mut matched = false;
        for value in &condition.matcher.values {
            let segment_key = value.as_string().ok_or(EvaluatorError::InvalidSegmentKey)?;
            let segment = request
                .workspace()
                .segment(&segment_key)
                .ok_or(EvaluatorError::SegmentNotFound(segment_key))?;

            for target in &segment.targets {
                let mut target_matched = true;
                for segment_condition in &target.conditions {
                    if !segment_user_condition_matches(request.user(), segment_condition)? {
                        target_matched = false;
                        break;
                    }
                }
                if target_matched {
                    matched = true;
                    break;
                }
            }
            if matched {
                break;
            }
        }
        Ok(match condition.matcher.match_type {
            MatchType::Match => matched,
            MatchType::NotMatch => !matched,
        })
    }
}

/// Match a condition resolvable from the user alone.
fn user_condition_matches(user: &HackleUser, condition: &Condition) -> bool {
    match condition.key.key_type {
        KeyType::UserId => {
            let identifier = user
                .identifier(&condition.key.name)
                .map(UserValue::from);
            value_operator_matches(identifier.as_ref(), &condition.matcher)
        }
        KeyType::UserProperty => {
            value_operator_matches(user.property(&condition.key.name), &condition.matcher)
        }
        KeyType::HackleProperty => {
            value_operator_matches(user.hackle_property(&condition.key.name), &condition.matcher)
        }
        KeyType::Cohort => {
            let cohorts = UserValue::Array(
                user.cohorts()
                    .iter()
                    .map(|id| HackleValue::from(*id))
                    .collect(),
            );
            value_operator_matches(Some(&cohorts), &condition.matcher)
        }
        _ => false,
    }
}

/// Conditions inside a segment definition may only reference the user
/// itself; anything else is a workspace data bug.
fn segment_user_condition_matches(
    user: &HackleUser,
    condition: &Condition,
) -> Result<bool, EvaluatorError> {
    match condition.key.key_type {
        KeyType::UserId | KeyType::UserProperty | KeyType::HackleProperty | KeyType::Cohort => {
            Ok(user_condition_matches(user, condition))
        }
        key_type => Err(EvaluatorError::UnsupportedKeyType { key_type }),
    }
}

/// Requests with no triggering event cannot satisfy event-property
/// conditions.
fn event_property_matches(request: &EvaluatorRequest<'_>, condition: &Condition) -> bool {
    match request.event() {
        Some(event) => {
            value_operator_matches(event.property(&condition.key.name), &condition.matcher)
        }
        None => false,
    }
}
