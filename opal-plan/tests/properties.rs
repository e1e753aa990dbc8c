//! Property-based tests over the codec's core invariants: determinism,
//! round-trip identity, byte accounting, canonical ordering, target
//! unlinkability, metadata non-participation, and salt sensitivity.

use std::collections::HashSet;

use opal_plan::codec::reader;
use opal_plan::codec::writer::{self, WriterLimits};
use opal_plan::{Arg, CommandNode, ExecutionNode, Plan, Step, Value};
use proptest::prelude::*;

fn arb_ident() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,8}"
}

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        "[a-zA-Z0-9 ]{0,16}".prop_map(Value::String),
        any::<i64>().prop_map(Value::Int),
        any::<bool>().prop_map(Value::Bool),
        any::<u32>().prop_map(Value::Placeholder),
    ]
}

fn arb_arg() -> impl Strategy<Value = Arg> {
    (arb_ident(), arb_value()).prop_map(|(key, val)| Arg::new(key, val))
}

fn arb_args(max: usize) -> impl Strategy<Value = Vec<Arg>> {
    prop::collection::vec(arb_arg(), 0..max).prop_map(|args| {
        let mut seen = HashSet::new();
        args.into_iter()
            .filter(|a| seen.insert(a.key.clone()))
            .collect::<Vec<_>>()
    })
}

fn arb_steps() -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec((0u64..1000, arb_ident(), arb_ident(), arb_args(5)), 0..5).prop_map(
        |raw| {
            let mut seen = HashSet::new();
            raw.into_iter()
                .filter(|(id, ..)| seen.insert(*id))
                .map(|(id, decorator, transport_id, args)| {
                    Step::new(
                        id,
                        ExecutionNode::Command(CommandNode {
                            decorator,
                            transport_id,
                            args,
                            block: Vec::new(),
                        }),
                    )
                })
                .collect()
        },
    )
}

fn arb_salt() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        Just(Vec::new()),
        prop::collection::vec(any::<u8>(), 32).prop_map(|v| v),
    ]
}

fn arb_plan() -> impl Strategy<Value = Plan> {
    ("[a-z-]{0,12}", arb_steps(), arb_salt()).prop_map(|(target, steps, salt)| {
        let mut plan = Plan::new(target);
        for step in steps {
            plan.push_step(step).unwrap();
        }
        plan.set_salt(salt).unwrap();
        plan
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn determinism(plan in arb_plan()) {
        let a = writer::write(&plan, WriterLimits::default()).unwrap();
        let b = writer::write(&plan, WriterLimits::default()).unwrap();
        prop_assert_eq!(a.bytes, b.bytes);
        prop_assert_eq!(a.digest, b.digest);
    }

    #[test]
    fn round_trip_identity(plan in arb_plan()) {
        // Canonicalization is a precondition of serialization (spec §4.1):
        // it also pads an empty salt out to 32 zero bytes, the only
        // representation the fixed-size wire field can actually hold.
        let mut plan = plan;
        opal_plan::canon::canonicalize(&mut plan);

        let written = writer::write(&plan, WriterLimits::default()).unwrap();
        let decoded = reader::read(&written.bytes).unwrap();
        prop_assert_eq!(decoded.plan, plan);
        prop_assert_eq!(decoded.digest, written.digest);
    }

    #[test]
    fn byte_accounting(plan in arb_plan()) {
        let written = writer::write(&plan, WriterLimits::default()).unwrap();
        let header_len = u32::from_le_bytes(written.bytes[8..12].try_into().unwrap()) as usize;
        let body_len = u64::from_le_bytes(written.bytes[12..20].try_into().unwrap()) as usize;
        prop_assert_eq!(written.bytes.len(), 20 + header_len + body_len);
    }

    #[test]
    fn target_unlinkability(plan in arb_plan(), other_target in "[a-z-]{1,12}") {
        prop_assume!(other_target != plan.target());

        let mut other = Plan::new(other_target);
        for step in plan.steps().to_vec() {
            other.push_step(step).unwrap();
        }
        other.set_salt(plan.plan_salt().to_vec()).unwrap();

        let a = writer::write(&plan, WriterLimits::default()).unwrap();
        let b = writer::write(&other, WriterLimits::default()).unwrap();
        prop_assert_ne!(a.digest, b.digest);
    }

    #[test]
    fn metadata_non_participation(plan in arb_plan(), nanos in any::<u64>()) {
        let mut other = plan.clone();
        let mut header = *other.header();
        header.created_at_nanos = header.created_at_nanos.wrapping_add(nanos).wrapping_add(1);
        other.set_header(header).unwrap();

        let a = writer::write(&plan, WriterLimits::default()).unwrap();
        let b = writer::write(&other, WriterLimits::default()).unwrap();
        prop_assert_eq!(a.digest, b.digest);
    }

    #[test]
    fn salt_sensitivity(plan in arb_plan()) {
        let mut other = plan.clone();
        let mut flipped = plan.plan_salt().to_vec();
        if flipped.is_empty() {
            // An empty salt and an all-zero 32-byte salt serialize
            // identically (the wire field has no "unset" state), so
            // flipping to all-zero wouldn't actually change the digest.
            // Pick a salt that differs from empty's zero-padded encoding.
            flipped = vec![0xFFu8; 32];
        } else {
            flipped[0] ^= 0xFF;
        }
        other.set_salt(flipped).unwrap();
        prop_assume!(other.plan_salt() != plan.plan_salt());

        let a = writer::write(&plan, WriterLimits::default()).unwrap();
        let b = writer::write(&other, WriterLimits::default()).unwrap();
        prop_assert_ne!(a.digest, b.digest);
    }
}

#[test]
fn canonical_arg_order_is_permutation_invariant() {
    let args_a = vec![
        Arg::new("a", Value::Int(1)),
        Arg::new("b", Value::Int(2)),
        Arg::new("c", Value::Int(3)),
    ];
    let args_b = vec![
        Arg::new("c", Value::Int(3)),
        Arg::new("a", Value::Int(1)),
        Arg::new("b", Value::Int(2)),
    ];

    let mut plan_a = Plan::new("build");
    plan_a
        .push_step(Step::new(1, ExecutionNode::command("shell", "t", args_a)))
        .unwrap();
    plan_a.freeze().unwrap();

    let mut plan_b = Plan::new("build");
    plan_b
        .push_step(Step::new(1, ExecutionNode::command("shell", "t", args_b)))
        .unwrap();
    plan_b.freeze().unwrap();

    let written_a = writer::write(&plan_a, WriterLimits::default()).unwrap();
    let written_b = writer::write(&plan_b, WriterLimits::default()).unwrap();
    assert_eq!(written_a.bytes, written_b.bytes);
    assert_eq!(written_a.digest, written_b.digest);
}

#[test]
fn canonical_secret_use_order_is_permutation_invariant() {
    use opal_plan::SecretUse;

    let mut plan_a = Plan::new("deploy");
    plan_a
        .add_secret_use(SecretUse::new("d1", "s1", "site-a"))
        .unwrap();
    plan_a
        .add_secret_use(SecretUse::new("d0", "s0", "site-b"))
        .unwrap();
    plan_a.freeze().unwrap();

    let mut plan_b = Plan::new("deploy");
    plan_b
        .add_secret_use(SecretUse::new("d0", "s0", "site-b"))
        .unwrap();
    plan_b
        .add_secret_use(SecretUse::new("d1", "s1", "site-a"))
        .unwrap();
    plan_b.freeze().unwrap();

    let written_a = writer::write(&plan_a, WriterLimits::default()).unwrap();
    let written_b = writer::write(&plan_b, WriterLimits::default()).unwrap();
    assert_eq!(written_a.bytes, written_b.bytes);
}

#[test]
fn child_order_is_significant() {
    let x = ExecutionNode::command("x", "t", vec![]);
    let y = ExecutionNode::command("y", "t", vec![]);

    let mut plan_xy = Plan::new("build");
    plan_xy
        .push_step(Step::new(
            1,
            ExecutionNode::And {
                left: Box::new(x.clone()),
                right: Box::new(y.clone()),
            },
        ))
        .unwrap();

    let mut plan_yx = Plan::new("build");
    plan_yx
        .push_step(Step::new(
            1,
            ExecutionNode::And {
                left: Box::new(y),
                right: Box::new(x),
            },
        ))
        .unwrap();

    let a = writer::write(&plan_xy, WriterLimits::default()).unwrap();
    let b = writer::write(&plan_yx, WriterLimits::default()).unwrap();
    assert_ne!(a.bytes, b.bytes);
    assert_ne!(a.digest, b.digest);
}
