//! Property-Based Tests for Domain Splitting and Deferred Values
//!
//! These tests prove laws that must hold for all inputs: splitting a
//! fully qualified domain and reassembling it is lossless, and mapping
//! over a deferred value composes the way plain function application does.

use proptest::prelude::*;

use sitestack::domain::DomainSplit;
use sitestack::value::AsyncValue;

// ============================================================================
// Strategies
// ============================================================================

/// A single RFC 1123 label: alphanumeric, short enough to never trip
/// the length limits when composed.
fn label() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,7}"
}

/// Zero to three subdomain labels joined with dots, empty for an apex.
fn subdomain() -> impl Strategy<Value = String> {
    prop::collection::vec(label(), 0..=3).prop_map(|labels| labels.join("."))
}

/// A registrable domain: one label under a well-known public suffix,
/// including a multi-part one.
fn registered_domain() -> impl Strategy<Value = String> {
    let suffix = prop_oneof![
        Just("com"),
        Just("org"),
        Just("net"),
        Just("co.uk"),
    ];
    (label(), suffix).prop_map(|(name, suffix)| format!("{name}.{suffix}"))
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Property: splitting then reassembling is the identity
    ///
    /// For any fully qualified domain built from a subdomain and a
    /// registrable domain, `DomainSplit::of` recovers exactly those
    /// parts and `fqdn()` reproduces the input.
    #[test]
    fn prop_domain_split_roundtrips(sub in subdomain(), registered in registered_domain()) {
        // A generated name can itself be a multi-label public suffix
        // (cn.com, us.com, ...); such inputs have no registrable domain
        // and are skipped.
        prop_assume!(psl::domain_str(registered.as_str()) == Some(registered.as_str()));

        let fqdn = if sub.is_empty() {
            registered.clone()
        } else {
            format!("{sub}.{registered}")
        };

        let split = DomainSplit::of(&fqdn).unwrap();
        prop_assert_eq!(&split.subdomain, &sub);
        prop_assert_eq!(&split.registered_domain, &registered);
        prop_assert_eq!(split.fqdn(), fqdn);
    }

    /// Property: map over a deferred value composes
    ///
    /// Two successive `map` calls resolve to the same value as one
    /// `map` of the composed function.
    #[test]
    fn prop_map_composes(seed in any::<i32>()) {
        let value = AsyncValue::literal(i64::from(seed));

        let chained = value.map(|n| n.wrapping_mul(3)).map(|n| n - 7);
        let composed = value.map(|n| n.wrapping_mul(3) - 7);

        let chained = tokio_test::block_on(chained.resolve()).unwrap();
        let composed = tokio_test::block_on(composed.resolve()).unwrap();
        prop_assert_eq!(chained, composed);
    }

    /// Property: combine preserves both operands
    ///
    /// Combining two literals applies the function to exactly the
    /// values they carry.
    #[test]
    fn prop_combine_applies_both(a in any::<i32>(), b in any::<i32>()) {
        let left = AsyncValue::literal(i64::from(a));
        let right = AsyncValue::literal(i64::from(b));

        let sum = left.combine(&right, |x, y| x + y);
        let resolved = tokio_test::block_on(sum.resolve()).unwrap();
        prop_assert_eq!(resolved, i64::from(a) + i64::from(b));
    }
}
