//! Property-based tests for the `mode` module.
//!
//! Covers modifier insensitivity of the capability table, agreement between
//! `capabilities`, `is_valid_open_mode` and `open_options`, and the
//! access-mode reconstruction.

use netstream_core::mode::{
    OPEN_MODES, READ_MODES, WRITE_MODES, capabilities, from_access_mode, is_valid_open_mode,
    normalize, open_options,
};
use netstream_fd::AccessMode;
use proptest::prelude::*;

// =========================================================================
// Strategies
// =========================================================================

fn arb_base_mode() -> impl Strategy<Value = &'static str> {
    prop::sample::select(OPEN_MODES)
}

fn arb_modifiers() -> impl Strategy<Value = Vec<char>> {
    prop::collection::vec(prop::sample::select(vec!['b', 't', 'e']), 0..4)
}

/// A base mode with modifiers sprinkled in at arbitrary positions.
fn arb_decorated_mode() -> impl Strategy<Value = (&'static str, String)> {
    (arb_base_mode(), arb_modifiers(), prop::collection::vec(any::<prop::sample::Index>(), 4))
        .prop_map(|(base, modifiers, positions)| {
            let mut chars: Vec<char> = base.chars().collect();
            for (modifier, index) in modifiers.into_iter().zip(positions) {
                let at = index.index(chars.len() + 1);
                chars.insert(at, modifier);
            }
            (base, chars.into_iter().collect())
        })
}

// =========================================================================
// Capability table
// =========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Modifiers never change what a mode allows.
    #[test]
    fn prop_modifiers_are_ignored((base, decorated) in arb_decorated_mode()) {
        prop_assert_eq!(normalize(&decorated), base);
        prop_assert_eq!(capabilities(&decorated), capabilities(base));
        prop_assert!(is_valid_open_mode(&decorated));
        prop_assert!(open_options(&decorated).is_some());
    }

    /// Every open mode grants at least one direction, and `+` grants both.
    #[test]
    fn prop_open_modes_grant_a_direction(base in arb_base_mode()) {
        let caps = capabilities(base);
        prop_assert!(caps.readable || caps.writable);
        if base.ends_with('+') {
            prop_assert!(caps.readable && caps.writable);
        }
        prop_assert_eq!(caps.readable, READ_MODES.contains(&base));
        prop_assert_eq!(caps.writable, WRITE_MODES.contains(&base));
    }

    /// Strings outside the tables are neither readable, writable nor valid.
    #[test]
    fn prop_unknown_modes_grant_nothing(mode in "[a-z+]{0,4}") {
        let base = normalize(&mode);
        if !OPEN_MODES.contains(&base.as_str()) {
            let caps = capabilities(&mode);
            prop_assert!(!caps.readable && !caps.writable);
            prop_assert!(!is_valid_open_mode(&mode));
            prop_assert!(open_options(&mode).is_none());
        }
    }
}

// =========================================================================
// Access-mode reconstruction
// =========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A reconstructed mode grants exactly the directions the descriptor has.
    #[test]
    fn prop_access_mode_round_trips(read in any::<bool>(), write in any::<bool>(), append in any::<bool>()) {
        prop_assume!(read || write);
        let access = AccessMode { read, write, append, non_blocking: false };
        let mode = from_access_mode(access);
        let caps = capabilities(mode);
        prop_assert_eq!(caps.writable, write);
        prop_assert_eq!(caps.readable, read);
    }
}
