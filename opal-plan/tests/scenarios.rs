//! Concrete end-to-end scenarios with literal inputs and exact expected
//! outputs.

use opal_plan::codec::writer::{self, WriterLimits};
use opal_plan::{Arg, ExecutionNode, Plan, Step, Value};

/// S1: an empty plan's preamble, header, and body sizes are exactly
/// those spelled out by the byte-accounting invariant.
#[test]
fn s1_empty_plan() {
    let mut plan = Plan::new("");
    plan.set_salt(vec![0u8; 32]).unwrap();

    let written = writer::write(&plan, WriterLimits::default()).unwrap();

    assert_eq!(
        &written.bytes[0..8],
        &[0x4F, 0x50, 0x41, 0x4C, 0x01, 0x00, 0x00, 0x00]
    );

    let header_len = u32::from_le_bytes(written.bytes[8..12].try_into().unwrap());
    let body_len = u64::from_le_bytes(written.bytes[12..20].try_into().unwrap());
    assert_eq!(header_len, 46);
    assert_eq!(body_len, 38);
    assert_eq!(written.bytes.len(), 104);
}

/// S2: a single shell step's digest is stable across repeated writes.
#[test]
fn s2_single_shell_step_digest_is_stable() {
    let mut plan = Plan::new("build");
    plan.set_salt(vec![0u8; 32]).unwrap();
    plan.push_step(Step::new(
        1,
        ExecutionNode::command(
            "@shell",
            "",
            vec![Arg::new("cmd", Value::String("echo hi".to_string()))],
        ),
    ))
    .unwrap();

    let first = writer::write(&plan, WriterLimits::default()).unwrap();
    for _ in 0..100 {
        let again = writer::write(&plan, WriterLimits::default()).unwrap();
        assert_eq!(again.digest, first.digest);
    }
}

/// S3: identical args in a different source order yield byte-identical
/// canonical output.
#[test]
fn s3_arg_permutation_yields_identical_bytes() {
    let ordered = vec![
        Arg::new("a", Value::Int(1)),
        Arg::new("b", Value::Int(2)),
        Arg::new("c", Value::Int(3)),
    ];
    let permuted = vec![
        Arg::new("c", Value::Int(3)),
        Arg::new("a", Value::Int(1)),
        Arg::new("b", Value::Int(2)),
    ];

    let mut plan_a = Plan::new("build");
    plan_a
        .push_step(Step::new(1, ExecutionNode::command("x", "", ordered)))
        .unwrap();
    plan_a.freeze().unwrap();

    let mut plan_b = Plan::new("build");
    plan_b
        .push_step(Step::new(1, ExecutionNode::command("x", "", permuted)))
        .unwrap();
    plan_b.freeze().unwrap();

    let a = writer::write(&plan_a, WriterLimits::default()).unwrap();
    let b = writer::write(&plan_b, WriterLimits::default()).unwrap();
    assert_eq!(a.bytes, b.bytes);
}

/// S4: swapping the operands of a binary operator changes the digest.
#[test]
fn s4_left_right_swap_changes_digest() {
    let cmd_x = ExecutionNode::command("x", "", vec![]);
    let cmd_y = ExecutionNode::command("y", "", vec![]);

    let mut plan_xy = Plan::new("build");
    plan_xy
        .push_step(Step::new(
            1,
            ExecutionNode::And {
                left: Box::new(cmd_x.clone()),
                right: Box::new(cmd_y.clone()),
            },
        ))
        .unwrap();

    let mut plan_yx = Plan::new("build");
    plan_yx
        .push_step(Step::new(
            1,
            ExecutionNode::And {
                left: Box::new(cmd_y),
                right: Box::new(cmd_x),
            },
        ))
        .unwrap();

    let a = writer::write(&plan_xy, WriterLimits::default()).unwrap();
    let b = writer::write(&plan_yx, WriterLimits::default()).unwrap();
    assert_ne!(a.digest, b.digest);
}

/// S5: identical steps under different targets are unlinkable.
#[test]
fn s5_deploy_vs_destroy_are_unlinkable() {
    let step = || {
        Step::new(
            1,
            ExecutionNode::command("@shell", "", vec![Arg::new("cmd", Value::String("run".into()))]),
        )
    };

    let mut deploy = Plan::new("deploy");
    deploy.push_step(step()).unwrap();

    let mut destroy = Plan::new("destroy");
    destroy.push_step(step()).unwrap();

    let a = writer::write(&deploy, WriterLimits::default()).unwrap();
    let b = writer::write(&destroy, WriterLimits::default()).unwrap();
    assert_ne!(a.digest, b.digest);
}

// S6 (tampering past the public API) lives in `opal_plan::plan`'s own
// unit tests, since reaching past the public mutation guard requires
// private-field access this integration test cannot have.
