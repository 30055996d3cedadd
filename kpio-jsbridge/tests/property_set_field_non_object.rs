//! Property 3: SetField on a non-object
//!
//! For any primitive receiver, `set_field` fails with the receiver type
//! error, leaves `to_json` of the receiver unchanged and does not touch
//! the context's last error.
//!
//! Validates: Requirements R3.11, R3.8

use std::sync::OnceLock;

use kpio_jsbridge::{BridgeError, Context, Isolate, NO_FILE};
use proptest::prelude::*;

/// Fresh context per case on one shared isolate.
fn context() -> Context {
    static ISOLATE: OnceLock<Isolate> = OnceLock::new();
    Context::new(ISOLATE.get_or_init(|| Isolate::new().unwrap())).unwrap()
}

/// Strategy for primitive expressions.
fn arb_primitive() -> impl Strategy<Value = String> {
    prop_oneof![
        any::<i32>().prop_map(|n| n.to_string()),
        any::<bool>().prop_map(|b| b.to_string()),
        Just("null".to_string()),
        Just("undefined".to_string()),
        "[a-z ]{0,8}".prop_map(|s| format!("'{}'", s)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn set_field_on_primitive_is_rejected(
        receiver in arb_primitive(),
        field in "[a-z]{1,6}",
    ) {
        let ctx = context();
        let target = ctx.create_js(&receiver, NO_FILE).unwrap();
        let value = ctx.create_js("{x: 1}", NO_FILE).unwrap();
        let before = ctx.to_json(target).unwrap();

        let err = ctx.set_field(target, &field, value).unwrap_err();
        prop_assert!(matches!(err, BridgeError::NotAnObject));
        prop_assert_eq!(ctx.to_json(target).unwrap(), before);
        prop_assert_eq!(ctx.error().unwrap(), "");
    }

    #[test]
    fn set_field_on_object_is_visible(field in "[a-z]{1,6}", n in any::<i32>()) {
        let ctx = context();
        let target = ctx.create_js("{}", NO_FILE).unwrap();
        let value = ctx.create_js(&n.to_string(), NO_FILE).unwrap();

        ctx.set_field(target, &field, value).unwrap();
        prop_assert_eq!(ctx.to_json(target).unwrap(), format!("{{\"{}\":{}}}", field, n));
    }
}
