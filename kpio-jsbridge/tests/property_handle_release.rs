//! Property 5: Handle release is checked
//!
//! For any interleaving of allocations and releases, the context owns
//! exactly the handles that were not released, live handles keep their
//! values, and released handles are rejected on use and on a second
//! release.
//!
//! Validates: Requirements R3.10, R3.11, R4.7

use kpio_jsbridge::{BridgeError, Context, Handle, Isolate, NO_FILE};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Alloc(i32),
    Release(usize),
}

fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(
        prop_oneof![
            any::<i32>().prop_map(Op::Alloc),
            any::<usize>().prop_map(Op::Release),
        ],
        1..24,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn live_values_track_releases(ops in arb_ops()) {
        let ctx = Context::new(&Isolate::new().unwrap()).unwrap();
        let mut live: Vec<(Handle, i32)> = Vec::new();
        let mut released: Vec<Handle> = Vec::new();

        for op in ops {
            match op {
                Op::Alloc(n) => {
                    let h = ctx.eval(&n.to_string(), NO_FILE).unwrap();
                    live.push((h, n));
                }
                Op::Release(i) if !live.is_empty() => {
                    let (h, _) = live.remove(i % live.len());
                    ctx.release(h).unwrap();
                    released.push(h);
                }
                Op::Release(_) => {}
            }
            prop_assert_eq!(ctx.live_values().unwrap(), live.len());
        }

        for (h, n) in &live {
            prop_assert_eq!(ctx.to_json(*h).unwrap(), n.to_string());
        }
        for h in released {
            prop_assert!(matches!(ctx.to_json(h), Err(BridgeError::Released)));
            prop_assert!(matches!(ctx.release(h), Err(BridgeError::Released)));
        }
    }
}
