//! Property 4: Apply calls with handle arguments
//!
//! For any two integers, applying an adding function to handles of them
//! yields a handle whose JSON is their sum, with or without an explicit
//! receiver.
//!
//! Validates: Requirements R3.8, R3.10

use std::sync::OnceLock;

use kpio_jsbridge::{Context, Isolate, NO_FILE};
use proptest::prelude::*;

/// Fresh context per case on one shared isolate.
fn context() -> Context {
    static ISOLATE: OnceLock<Isolate> = OnceLock::new();
    Context::new(ISOLATE.get_or_init(|| Isolate::new().unwrap())).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn apply_adds_two_numbers(a in any::<i32>(), b in any::<i32>(), with_this in any::<bool>()) {
        let ctx = context();
        let add = ctx.create_js("function(a, b) { return a + b; }", NO_FILE).unwrap();
        let x = ctx.create_js(&a.to_string(), NO_FILE).unwrap();
        let y = ctx.create_js(&b.to_string(), NO_FILE).unwrap();
        let this = if with_this { Some(add) } else { None };

        let sum = ctx.apply(add, this, &[x, y]).unwrap();
        prop_assert_eq!(ctx.to_json(sum).unwrap(), (a as i64 + b as i64).to_string());
    }

    #[test]
    fn apply_reads_the_receiver(y in any::<i32>()) {
        let ctx = context();
        let get = ctx.create_js("function() { return this.y; }", NO_FILE).unwrap();
        let receiver = ctx.create_js(&format!("{{y: {}}}", y), NO_FILE).unwrap();

        let result = ctx.apply(get, Some(receiver), &[]).unwrap();
        prop_assert_eq!(ctx.to_json(result).unwrap(), y.to_string());
    }
}
