//! Property-based tests for signature determinism and sensitivity.
//!
//! - Determinism: the same inputs always produce the same signature
//! - Sensitivity: changing the function name or generator source changes it
//! - Shape: every signature is 64 lowercase hex characters that parse back

#![allow(clippy::unwrap_used, clippy::expect_used)]

use proptest::prelude::*;
use safelight_artifacts::{Signature, SignatureInputs, SignaturePolicy};

fn name_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z_][A-Za-z0-9_]{0,24}".prop_map(String::from)
}

fn source_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{1,10}/[a-z_]{1,16}_generator\\.cpp".prop_map(String::from),
        "/[a-z]{1,8}/[a-z]{1,8}\\.cpp".prop_map(String::from),
    ]
}

fn policy_strategy() -> impl Strategy<Value = SignaturePolicy> {
    prop_oneof![
        Just(SignaturePolicy::NameAndSource),
        Just(SignaturePolicy::NameSourceAndArgs),
    ]
}

fn compute(policy: SignaturePolicy, name: &str, source: &str, args: &[String]) -> Signature {
    policy.compute(&SignatureInputs {
        function_name: name,
        generator_source: source,
        generator_args: args,
    })
}

proptest! {
    #[test]
    fn signature_is_deterministic(
        name in name_strategy(),
        source in source_strategy(),
        args in prop::collection::vec("[a-z]{1,8}=[a-z0-9]{1,8}", 0..4),
        policy in policy_strategy(),
    ) {
        let a = compute(policy, &name, &source, &args);
        let b = compute(policy, &name, &source, &args);
        prop_assert_eq!(a, b);
    }

    #[test]
    fn signature_changes_with_function_name(
        name in name_strategy(),
        other in name_strategy(),
        source in source_strategy(),
    ) {
        prop_assume!(name != other);
        let a = compute(SignaturePolicy::default(), &name, &source, &[]);
        let b = compute(SignaturePolicy::default(), &other, &source, &[]);
        prop_assert_ne!(a, b);
    }

    #[test]
    fn signature_changes_with_generator_source(
        name in name_strategy(),
        source in source_strategy(),
        other in source_strategy(),
    ) {
        prop_assume!(source != other);
        let a = compute(SignaturePolicy::default(), &name, &source, &[]);
        let b = compute(SignaturePolicy::default(), &name, &other, &[]);
        prop_assert_ne!(a, b);
    }

    #[test]
    fn signature_is_parseable_hex(
        name in name_strategy(),
        source in source_strategy(),
        policy in policy_strategy(),
    ) {
        let sig = compute(policy, &name, &source, &[]);
        prop_assert_eq!(sig.as_str().len(), 64);
        prop_assert_eq!(Signature::parse(sig.as_str()).unwrap(), sig);
    }
}
