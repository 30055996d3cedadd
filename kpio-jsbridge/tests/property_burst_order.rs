//! Property 2: Burst preserves property order
//!
//! For any object literal with distinct keys, `burst` returns one pair per
//! property, in source order, and each pair's handle encodes the value of
//! that property.
//!
//! Validates: Requirements R3.11

use std::collections::HashSet;
use std::sync::OnceLock;

use kpio_jsbridge::{BridgeError, Context, Isolate, NO_FILE};
use proptest::prelude::*;

/// Fresh context per case on one shared isolate.
fn context() -> Context {
    static ISOLATE: OnceLock<Isolate> = OnceLock::new();
    Context::new(ISOLATE.get_or_init(|| Isolate::new().unwrap())).unwrap()
}

/// Strategy for `(key, value)` pairs with unique keys in insertion order.
fn arb_fields() -> impl Strategy<Value = Vec<(String, i32)>> {
    proptest::collection::vec(("k_[a-z0-9]{0,6}", any::<i32>()), 0..8).prop_map(|fields| {
        let mut seen = HashSet::new();
        fields
            .into_iter()
            .filter(|(key, _)| seen.insert(key.clone()))
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn burst_follows_source_order(fields in arb_fields()) {
        let ctx = context();
        let body: Vec<String> = fields
            .iter()
            .map(|(key, value)| format!("{}: {}", key, value))
            .collect();
        let object = ctx.create_js(&format!("{{{}}}", body.join(", ")), NO_FILE).unwrap();

        let parts = ctx.burst(object).unwrap();
        prop_assert_eq!(parts.len(), fields.len());
        for ((name, handle), (key, value)) in parts.iter().zip(&fields) {
            prop_assert_eq!(name, key);
            prop_assert_eq!(ctx.to_json(*handle).unwrap(), value.to_string());
        }
    }

    #[test]
    fn burst_rejects_primitives(n in any::<i32>()) {
        let ctx = context();
        let number = ctx.create_js(&n.to_string(), NO_FILE).unwrap();
        let err = ctx.burst(number).unwrap_err();
        prop_assert!(matches!(err, BridgeError::NotBurstable(_)));
        let expected_suffix = format!(":{}", n);
        prop_assert!(err.to_string().ends_with(&expected_suffix));
        ctx.release(number).unwrap();
    }
}
