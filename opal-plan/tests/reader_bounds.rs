//! Reader robustness against arbitrary and adversarial input, depth and
//! flag enforcement, freeze immutability, and contract verification.

use opal_plan::codec::reader::{self, ReaderLimits};
use opal_plan::codec::writer::{self, WriterLimits};
use opal_plan::{contract, Arg, ExecutionNode, Plan, SecretUse, Step, Value};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Arbitrary bytes never panic the reader: every input decodes to
    /// either a valid plan or a descriptive error.
    #[test]
    fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..4096)) {
        let _ = reader::read(&bytes);
    }

    /// A byte stream claiming an enormous header or body is rejected
    /// before any allocation proportional to the claim is attempted.
    #[test]
    fn oversized_claims_are_rejected_before_allocating(
        header_len in (ReaderLimits::default().max_header_bytes + 1)..u32::MAX,
        body_len in any::<u64>(),
    ) {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"OPAL");
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&header_len.to_le_bytes());
        bytes.extend_from_slice(&body_len.to_le_bytes());
        let err = reader::read(&bytes).unwrap_err();
        prop_assert!(matches!(err, opal_plan::PlanError::HeaderTooLarge { .. }));
    }
}

fn deeply_nested_plan(depth: usize) -> Plan {
    let mut node = ExecutionNode::command("leaf", "t", vec![]);
    for _ in 0..depth {
        node = ExecutionNode::And {
            left: Box::new(node),
            right: Box::new(ExecutionNode::command("noop", "t", vec![])),
        };
    }
    let mut plan = Plan::new("deep");
    plan.push_step(Step::new(1, node)).unwrap();
    plan
}

#[test]
fn depth_within_bound_round_trips() {
    let plan = deeply_nested_plan(999);
    let written = writer::write(&plan, WriterLimits::default()).unwrap();
    let decoded = reader::read(&written.bytes);
    assert!(decoded.is_ok());
}

#[test]
fn depth_beyond_bound_is_rejected() {
    let plan = deeply_nested_plan(1001);
    let written = writer::write(&plan, WriterLimits::default()).unwrap();
    let err = reader::read(&written.bytes).unwrap_err();
    assert_eq!(err.to_string(), "max recursion depth 1000 exceeded");
}

fn bare_header_body_bytes(flags: u16) -> Vec<u8> {
    let plan = Plan::new("flagged");
    let written = writer::write(&plan, WriterLimits::default()).unwrap();
    let mut bytes = written.bytes;
    bytes[6..8].copy_from_slice(&flags.to_le_bytes());
    bytes
}

#[test]
fn compressed_flag_is_rejected() {
    let bytes = bare_header_body_bytes(opal_plan::codec::FLAG_COMPRESSED);
    let err = reader::read(&bytes).unwrap_err();
    assert_eq!(err, opal_plan::PlanError::CompressedNotSupported);
}

#[test]
fn signed_flag_is_rejected() {
    let bytes = bare_header_body_bytes(opal_plan::codec::FLAG_SIGNED);
    let err = reader::read(&bytes).unwrap_err();
    assert_eq!(err, opal_plan::PlanError::SignedNotSupported);
}

#[test]
fn unknown_flag_bit_is_rejected() {
    let bytes = bare_header_body_bytes(1 << 2);
    let err = reader::read(&bytes).unwrap_err();
    assert_eq!(err, opal_plan::PlanError::UnsupportedFlags(1 << 2));
}

#[test]
fn freeze_rejects_further_mutation() {
    let mut plan = Plan::new("build");
    plan.freeze().unwrap();

    let err = plan
        .push_step(Step::new(
            1,
            ExecutionNode::command("shell", "t", vec![Arg::new("x", Value::Bool(true))]),
        ))
        .unwrap_err();
    assert!(err.to_string().contains("frozen"));

    let err = plan
        .add_secret_use(SecretUse::new("d", "s", "site"))
        .unwrap_err();
    assert!(err.to_string().contains("frozen"));
}

#[test]
fn verification_round_trip_matches_replan_with_same_salt() {
    let mut plan = Plan::new("deploy");
    plan.set_salt(vec![7u8; 32]).unwrap();
    plan.push_step(Step::new(
        1,
        ExecutionNode::command("shell", "t", vec![Arg::new("cmd", Value::String("go".into()))]),
    ))
    .unwrap();

    let envelope = contract::seal(&mut plan).unwrap();

    let mut replanned = Plan::new("deploy");
    replanned.set_salt(vec![7u8; 32]).unwrap();
    replanned
        .push_step(Step::new(
            1,
            ExecutionNode::command("shell", "t", vec![Arg::new("cmd", Value::String("go".into()))]),
        ))
        .unwrap();

    assert!(contract::verify_against(&envelope, &replanned).is_ok());
}

#[test]
fn verification_fails_when_replan_body_differs() {
    let mut plan = Plan::new("deploy");
    plan.set_salt(vec![7u8; 32]).unwrap();
    plan.push_step(Step::new(
        1,
        ExecutionNode::command("shell", "t", vec![Arg::new("cmd", Value::String("go".into()))]),
    ))
    .unwrap();

    let envelope = contract::seal(&mut plan).unwrap();

    let mut replanned = Plan::new("deploy");
    replanned.set_salt(vec![7u8; 32]).unwrap();
    replanned
        .push_step(Step::new(
            1,
            ExecutionNode::command(
                "shell",
                "t",
                vec![Arg::new("cmd", Value::String("go faster".into()))],
            ),
        ))
        .unwrap();

    let err = contract::verify_against(&envelope, &replanned).unwrap_err();
    assert_eq!(err, opal_plan::PlanError::DigestMismatch);
}
