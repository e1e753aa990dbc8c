//! Contract envelope: wraps a frozen plan's target, digest, and bytes
//! so a downstream executor can verify the plan it is about to run is
//! exactly the one a human or an upstream system agreed to.
//!
//! Wire layout: `MAGIC(4) VERSION(2) TYPE(1) TARGET_LEN(2) TARGET
//! DIGEST(32) PLAN`, where `PLAN` is the frozen plan's own serialized
//! bytes (preamble, header, and body) occupying the rest of the
//! envelope. Repeating the target outside the embedded plan lets a
//! caller route or reject an envelope by target without decoding the
//! plan at all.

use subtle::ConstantTimeEq;

use crate::codec::reader::{self, Cursor};
use crate::codec::writer::{self, WriterLimits};
use crate::codec::{CONTRACT_TYPE_BYTE, MAGIC, MAX_FIELD_LEN, VERSION};
use crate::error::{PlanError, Result};
use crate::plan::Plan;

/// A parsed contract envelope: the target and digest it commits to,
/// plus the frozen plan's own serialized bytes (not yet decoded).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contract {
    pub target: String,
    pub digest: [u8; 32],
    pub plan_bytes: Vec<u8>,
}

/// Freezes `plan` (a no-op if it is already frozen) and seals it into a
/// contract envelope.
pub fn seal(plan: &mut Plan) -> Result<Vec<u8>> {
    seal_with_limits(plan, WriterLimits::default())
}

/// Like [`seal`], but threads an explicit [`WriterLimits`] through both
/// the freeze and the envelope's own write, so a caller that tightened
/// the body-size ceiling gets it enforced consistently end to end.
pub fn seal_with_limits(plan: &mut Plan, limits: WriterLimits) -> Result<Vec<u8>> {
    plan.freeze_with_limits(limits)?;
    let written = writer::write(plan, limits)?;
    tracing::debug!(plan_target = %plan.target(), digest = %hex::encode(written.digest), "sealed contract");
    Ok(encode(plan.target(), &written.digest, &written.bytes))
}

fn encode(target: &str, digest: &[u8; 32], plan_bytes: &[u8]) -> Vec<u8> {
    let target_bytes = target.as_bytes();
    let mut out = Vec::with_capacity(4 + 2 + 1 + 2 + target_bytes.len() + 32 + plan_bytes.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.push(CONTRACT_TYPE_BYTE);
    out.extend_from_slice(&(target_bytes.len() as u16).to_le_bytes());
    out.extend_from_slice(target_bytes);
    out.extend_from_slice(digest);
    out.extend_from_slice(plan_bytes);
    out
}

/// Parses the envelope's fixed fields without decoding or verifying the
/// embedded plan.
pub fn open(bytes: &[u8]) -> Result<Contract> {
    let mut cur = Cursor::new(bytes);

    let magic = cur.read_bytes("magic", 4)?;
    if magic != MAGIC {
        return Err(PlanError::BadMagic);
    }

    let version = cur.read_u16("version")?;
    if version != VERSION {
        return Err(PlanError::UnsupportedVersion(version));
    }

    let type_byte = cur.read_u8("type")?;
    if type_byte != CONTRACT_TYPE_BYTE {
        return Err(PlanError::UnknownContractType(type_byte));
    }

    let target_len = cur.read_u16("target_len")? as usize;
    if target_len > MAX_FIELD_LEN {
        return Err(PlanError::FieldTooLong {
            len: target_len,
            max: MAX_FIELD_LEN,
        });
    }
    let target_bytes = cur.read_bytes("target", target_len)?;
    let target = String::from_utf8(target_bytes.to_vec())
        .map_err(|_| PlanError::InvalidUtf8 { field: "target" })?;

    let digest_bytes = cur.read_bytes("digest", 32)?;
    let mut digest = [0u8; 32];
    digest.copy_from_slice(digest_bytes);

    let plan_bytes = cur.read_rest().to_vec();

    Ok(Contract {
        target,
        digest,
        plan_bytes,
    })
}

/// Opens the envelope, decodes the embedded plan, and checks that its
/// own recomputed digest matches the one stored in the envelope. The
/// comparison runs in constant time so a verifier leaks no timing
/// signal about how many leading bytes of a forged digest matched.
pub fn verify(bytes: &[u8]) -> Result<Plan> {
    let contract = open(bytes)?;
    let decoded = reader::read(&contract.plan_bytes)?;
    if !bool::from(decoded.digest.ct_eq(&contract.digest)) {
        tracing::warn!(plan_target = %contract.target, "contract digest mismatch");
        return Err(PlanError::DigestMismatch);
    }
    Ok(decoded.plan)
}

/// Verifies a contract against an independently produced candidate
/// plan — typically one a planner just rebuilt from the same inputs
/// and the contract's own `plan_salt`. The candidate's digest must
/// match the envelope's stored digest exactly.
pub fn verify_against(bytes: &[u8], candidate: &Plan) -> Result<()> {
    let contract = open(bytes)?;
    let candidate_digest = candidate.compute_hash()?;
    if !bool::from(candidate_digest.ct_eq(&contract.digest)) {
        tracing::warn!(plan_target = %contract.target, "re-planned digest does not match stored contract");
        return Err(PlanError::DigestMismatch);
    }
    Ok(())
}

/// Produces a short, human-readable list of structural differences
/// between an expected and an actual plan, for reporting a verification
/// failure. Not a full tree diff — just enough to point an operator at
/// what moved.
pub fn diff_summary(expected: &Plan, actual: &Plan) -> Vec<String> {
    let mut diffs = Vec::new();

    if expected.target() != actual.target() {
        diffs.push(format!(
            "target changed: {:?} -> {:?}",
            expected.target(),
            actual.target()
        ));
    }
    if expected.steps().len() != actual.steps().len() {
        diffs.push(format!(
            "step count changed: {} -> {}",
            expected.steps().len(),
            actual.steps().len()
        ));
    }
    if expected.transports().len() != actual.transports().len() {
        diffs.push(format!(
            "transport count changed: {} -> {}",
            expected.transports().len(),
            actual.transports().len()
        ));
    }
    if expected.secret_uses().len() != actual.secret_uses().len() {
        diffs.push(format!(
            "secret use count changed: {} -> {}",
            expected.secret_uses().len(),
            actual.secret_uses().len()
        ));
    }
    if expected.plan_salt() != actual.plan_salt() {
        diffs.push("plan salt changed".to_string());
    }

    diffs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::ExecutionNode;
    use crate::value::Arg;

    fn sample_plan() -> Plan {
        let mut plan = Plan::new("demo-target");
        plan.push_step(crate::tree::Step::new(
            1,
            ExecutionNode::command("shell", "local", vec![Arg::new("cmd", crate::value::Value::String("echo hi".into()))]),
        ))
        .unwrap();
        plan
    }

    #[test]
    fn seal_then_verify_round_trips() {
        let mut plan = sample_plan();
        let bytes = seal(&mut plan).unwrap();
        let verified = verify(&bytes).unwrap();
        assert_eq!(verified.target(), "demo-target");
    }

    #[test]
    fn tampered_digest_is_rejected() {
        let mut plan = sample_plan();
        let mut bytes = seal(&mut plan).unwrap();
        // Flip a byte inside the literal argument text, well clear of
        // any length prefix, so the envelope still frames correctly.
        let needle = b"echo hi";
        let at = bytes
            .windows(needle.len())
            .position(|w| w == needle)
            .expect("sample plan argument text present in sealed bytes");
        bytes[at] ^= 0x20; // toggles ASCII case, stays valid UTF-8
        assert_eq!(verify(&bytes), Err(PlanError::DigestMismatch));
    }

    #[test]
    fn open_rejects_bad_magic() {
        let bytes = vec![0u8; 64];
        assert_eq!(open(&bytes), Err(PlanError::BadMagic));
    }
}
