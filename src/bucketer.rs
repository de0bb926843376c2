use sha1::{Digest, Sha1};

use crate::evaluator::EvaluatorError;
use crate::user::HackleUser;
use crate::workspace::{Action, Bucket, Experiment, Slot, Variation, Workspace};

/// Deterministic hash-based slot assignment.
///
/// Given the same bucket and identifier, `bucketing` must always return the
/// same slot, across processes and releases. Returning `None` means the
/// identifier's slot number falls in a range no slot covers.
pub trait Bucketer {
    fn bucketing<'a>(&self, bucket: &'a Bucket, identifier: &str) -> Option<&'a Slot>;
}

/// The default [Bucketer]: SHA-1 of `"{seed}.{identifier}"`, folded into
/// `[0, slot_size)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha1Bucketer;

impl Sha1Bucketer {
    fn slot_number(&self, seed: i32, slot_size: i32, identifier: &str) -> i32 {
        let mut hash = Sha1::new();
        hash.update(seed.to_string().as_bytes());
        hash.update(b".");
        hash.update(identifier.as_bytes());

        let digest = hash.finalize();
        let hexhash = base16ct::lower::encode_string(&digest);

        // 15 hex chars keep the value within i64 range
        let numhash = i64::from_str_radix(&hexhash[..15], 16).unwrap_or(0);

        (numhash % slot_size as i64) as i32
    }
}

impl Bucketer for Sha1Bucketer {
    fn bucketing<'a>(&self, bucket: &'a Bucket, identifier: &str) -> Option<&'a Slot> {
        if bucket.slot_size <= 0 {
            return None;
        }
        let slot_number = self.slot_number(bucket.seed, bucket.slot_size, identifier);
        bucket.slot(slot_number)
    }
}

/// Resolve an [Action] to a concrete variation for `experiment`.
///
/// A fixed-variation action referencing an unknown variation is a workspace
/// data bug and fails the evaluation; a bucket action that assigns no slot,
/// or assigns a slot whose variation the experiment no longer has, resolves
/// to `None` (not allocated).
pub(crate) fn resolve_variation<'a>(
    workspace: &dyn Workspace,
    experiment: &'a Experiment,
    user: &HackleUser,
    action: &Action,
    bucketer: &dyn Bucketer,
) -> Result<Option<&'a Variation>, EvaluatorError> {
    match action {
        Action::Variation { variation_id } => experiment
            .variation_by_id(*variation_id)
            .map(Some)
            .ok_or(EvaluatorError::VariationNotFound(*variation_id)),
        Action::Bucket { bucket_id } => {
            let bucket = workspace
                .bucket(*bucket_id)
                .ok_or(EvaluatorError::BucketNotFound(*bucket_id))?;
            let identifier = match user.identifier(&experiment.identifier_type) {
                Some(identifier) => identifier,
                None => return Ok(None),
            };
            let slot = match bucketer.bucketing(bucket, identifier) {
                Some(slot) => slot,
                None => return Ok(None),
            };
            Ok(experiment.variation_by_id(slot.variation_id))
        }
    }
}
