//! End-to-end tests of isolates, contexts, handles and the call bridge.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use kpio_jsbridge::{
    BridgeError, CallerInfo, Context, Handle, Isolate, IsolateConfig, Snapshot, NO_FILE,
};
use regex::Regex;
use serde_json::json;

fn context() -> Context {
    Context::new(&Isolate::new().unwrap()).unwrap()
}

fn number(ctx: &Context, source: &str) -> f64 {
    ctx.execute(source, NO_FILE).unwrap().parse().unwrap()
}

// ── Execution ────────────────────────────────────────────────────────

#[test]
fn create_context_and_execute() {
    let ctx = context();
    let result = ctx
        .execute(
            "
        var a = 10;
        var b = 20;
        var c = a + b;
        c;
    ",
            NO_FILE,
        )
        .unwrap();
    assert_eq!(result, "30");
}

#[test]
fn add_func_receives_json_arguments() {
    let ctx = context();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = seen.clone();
    ctx.add_func("_console_log", move |args| {
        record.lock().unwrap().extend_from_slice(args);
        None
    })
    .unwrap();

    assert!(ctx.registry().has_func("_console_log"));
    ctx.execute(r#"_console_log("Added console.log function", 5);"#, NO_FILE)
        .unwrap();
    assert_eq!(
        *seen.lock().unwrap(),
        vec![json!("Added console.log function"), json!(5)]
    );
}

#[test]
fn unknown_json_function_is_undefined() {
    let ctx = context();
    let id = ctx.id();
    assert_eq!(
        ctx.execute(&format!("typeof _host_call({}, 'nobody', '[]')", id), NO_FILE)
            .unwrap(),
        "\"undefined\""
    );
}

#[test]
fn host_call_to_unknown_context_throws() {
    let ctx = context();
    let err = ctx
        .execute("_host_call(0, 'nobody', '[]')", NO_FILE)
        .unwrap_err();
    assert!(err.to_string().contains("Unknown context 0"), "{}", err);
}

#[test]
fn many_runs_in_same_context() {
    let ctx = context();
    for i in 0..200 {
        ctx.execute("function sum(x, y) {return x + y};", NO_FILE)
            .unwrap();
        let res = ctx.run("sum", &[json!(i), json!(i * 2)]).unwrap();
        assert_eq!(res, json!(i * 3));
    }
}

#[test]
fn many_contexts_on_one_isolate() {
    let isolate = Isolate::new().unwrap();
    for i in 0..200 {
        let ctx = Context::new(&isolate).unwrap();
        ctx.execute("function sum(x, y) {return x + y};", NO_FILE)
            .unwrap();
        assert_eq!(ctx.run("sum", &[json!(i), json!(i * 2)]).unwrap(), json!(i * 3));
    }
}

#[test]
fn recursive_calls_into_script() {
    let ctx = context();
    let inner = ctx.clone();
    ctx.add_func("recurse", move |args| {
        let n = args[0].as_f64().unwrap_or(0.0);
        if n > 0.0 {
            inner.run("'x' + recurse", &[json!(n - 1.0)]).ok()
        } else {
            Some(json!("y"))
        }
    })
    .unwrap();

    assert_eq!(ctx.run("recurse", &[json!(5)]).unwrap(), json!("xxxxxy"));
}

#[test]
fn run_func_with_structured_arguments() {
    let ctx = context();
    ctx.execute("function add(a,b,c) { return a+b.Val+c[0]+c[1]; }", NO_FILE)
        .unwrap();
    let res = ctx
        .run("add", &[json!(3), json!({"Val": 5}), json!([7, 13])])
        .unwrap();
    assert_eq!(res.as_f64(), Some(28.0));
}

#[test]
fn run_without_result_is_null() {
    let ctx = context();
    ctx.execute("function nothing() {}", NO_FILE).unwrap();
    assert_eq!(ctx.run("nothing", &[]).unwrap(), serde_json::Value::Null);
}

#[test]
fn numbers_keep_script_formatting_in_json() {
    let ctx = context();
    assert_eq!(ctx.execute("Math.pow(2, 53)", NO_FILE).unwrap(), "9007199254740992");
    assert_eq!(ctx.execute("1e20", NO_FILE).unwrap(), "100000000000000000000");
    assert_eq!(
        ctx.execute("[1e16, 1e-6, 0.000001, 1e21, 1e-7]", NO_FILE).unwrap(),
        "[10000000000000000,0.000001,0.000001,1e+21,1e-7]"
    );
    assert_eq!(
        ctx.execute("JSON.stringify({big: Math.pow(2, 60)})", NO_FILE).unwrap(),
        r#""{\"big\":1152921504606846976}""#
    );
    let h = ctx.eval("1e20", NO_FILE).unwrap();
    assert_eq!(ctx.to_json(h).unwrap(), "100000000000000000000");
}

#[test]
fn deep_nesting_fails_without_crashing() {
    let ctx = context();
    let err = ctx
        .execute(
            "var o = {}; for (var i = 0; i < 200000; i++) { o = {a: o}; } JSON.stringify(o).length",
            NO_FILE,
        )
        .unwrap_err();
    assert!(err.to_string().contains("Maximum call stack size exceeded"), "{}", err);
    assert!(ctx.error().unwrap().contains("Maximum call stack size exceeded"));

    // The completion value itself is too deep to report.
    let err = ctx.execute("o", NO_FILE).unwrap_err();
    assert!(err.to_string().contains("Maximum call stack size exceeded"), "{}", err);

    let source = format!("{}1{}", "(".repeat(200_000), ")".repeat(200_000));
    let err = ctx.execute(&source, NO_FILE).unwrap_err();
    assert!(err.to_string().contains("Maximum call stack size exceeded"), "{}", err);

    ctx.execute("o = null", NO_FILE).unwrap();
    assert_eq!(ctx.execute("1 + 1", NO_FILE).unwrap(), "2");
}

// ── Concurrency ──────────────────────────────────────────────────────

#[test]
fn parallel_isolates() {
    const ISOLATES: usize = 10;
    let sleep = Duration::from_millis(30);
    let start = Instant::now();

    let workers: Vec<_> = (0..ISOLATES)
        .map(|_| {
            thread::spawn(move || {
                let ctx = Context::new(&Isolate::new().unwrap()).unwrap();
                ctx.add_func("sleep", move |_| {
                    thread::sleep(sleep);
                    None
                })
                .unwrap();
                ctx.run("sleep", &[])
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap().unwrap();
    }
    assert!(start.elapsed() >= sleep);
}

#[test]
fn ping_pong_between_isolates() {
    let vm1 = context();
    let vm2 = context();

    let (ball_tx, ball_rx) = mpsc::sync_channel::<String>(0);
    let ball_rx = Arc::new(Mutex::new(ball_rx));

    for vm in [&vm1, &vm2] {
        let tx = ball_tx.clone();
        let rx = ball_rx.clone();
        vm.add_func("pingpong", move |args| {
            let done = args[0].as_bool().unwrap_or(false);
            let v = rx.lock().unwrap().recv().unwrap();
            if done {
                tx.send("done".into()).unwrap();
                return Some(json!("done"));
            }
            if v == "done" {
                return Some(json!("done"));
            }
            let next = if v == "ping" { "pong" } else { "ping" };
            tx.send(next.into()).unwrap();
            Some(json!(v))
        })
        .unwrap();
    }

    let (out_tx, out_rx) = mpsc::channel();
    let out1 = out_tx.clone();
    let player1 = thread::spawn(move || {
        for _ in 0..10 {
            let res = vm1.run("pingpong", &[json!(false)]).unwrap();
            out1.send(format!("VM1:{}", res.as_str().unwrap())).unwrap();
        }
        vm1.run("pingpong", &[json!(true)]).unwrap();
    });
    let player2 = thread::spawn(move || loop {
        let res = vm2.run("pingpong", &[json!(false)]).unwrap();
        out_tx.send(format!("VM2:{}", res.as_str().unwrap())).unwrap();
        if res == "done" {
            break;
        }
    });

    ball_tx.send("ping".into()).unwrap();
    player1.join().unwrap();
    player2.join().unwrap();

    let rally: Vec<String> = out_rx.iter().collect();
    assert_eq!(rally.iter().filter(|r| r.starts_with("VM1:")).count(), 10);
    assert_eq!(rally.last().map(String::as_str), Some("VM2:done"));
}

#[test]
fn many_threads_on_one_context() {
    let ctx = context();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    ctx.add_func("sleep", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(1));
        None
    })
    .unwrap();

    let workers: Vec<_> = (0..20)
        .map(|_| {
            let ctx = ctx.clone();
            thread::spawn(move || ctx.run("sleep", &[]).unwrap())
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 20);
}

#[test]
fn cross_isolate_reentry_does_not_deadlock() {
    let a = context();
    let b = context();
    a.execute("function base() { return 40; }", NO_FILE).unwrap();

    let to_a = a.clone();
    b.add_func("fromA", move |_| to_a.run("base", &[]).ok()).unwrap();
    b.execute("function answer() { return fromA() + 2; }", NO_FILE)
        .unwrap();

    let to_b = b.clone();
    a.add_func("askB", move |_| to_b.run("answer", &[]).ok()).unwrap();

    assert_eq!(a.execute("askB()", NO_FILE).unwrap(), "42");
}

#[test]
fn unlocked_resolver_lets_other_threads_run() {
    let isolate = Isolate::new().unwrap();
    let ctx = Context::new(&isolate).unwrap();
    let (tx, rx) = mpsc::channel::<String>();
    let rx = Mutex::new(rx);

    let released = isolate.clone();
    ctx.add_func("slow", move |_| {
        let got = released
            .unlocked(|| rx.lock().unwrap().recv_timeout(Duration::from_secs(10)).ok())
            .ok()
            .flatten();
        got.map(serde_json::Value::String)
    })
    .unwrap();

    let other = ctx.clone();
    let helper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        let result = other.execute("6 * 7", NO_FILE).unwrap();
        tx.send(result).unwrap();
    });

    assert_eq!(ctx.execute("slow()", NO_FILE).unwrap(), "\"42\"");
    helper.join().unwrap();
}

// ── Termination ──────────────────────────────────────────────────────

fn spin(ctx: &Context) -> mpsc::Receiver<kpio_jsbridge::Result<Handle>> {
    let (tx, rx) = mpsc::channel();
    let looping = ctx.clone();
    thread::spawn(move || {
        let _ = tx.send(looping.eval("while(1){}", NO_FILE));
    });
    rx
}

/// Terminate until the loop reports back; a request issued before the
/// spawned thread asks for the isolate does not reach the loop.
fn stop(ctx: &Context, done: &mpsc::Receiver<kpio_jsbridge::Result<Handle>>) -> BridgeError {
    loop {
        ctx.terminate();
        if let Ok(result) = done.recv_timeout(Duration::from_millis(10)) {
            return result.unwrap_err();
        }
    }
}

#[test]
fn terminate_stops_an_infinite_loop() {
    let isolate = Isolate::new().unwrap();
    let ctx = Context::new(&isolate).unwrap();

    let done = spin(&ctx);
    assert!(done.recv_timeout(Duration::from_millis(10)).is_err());

    let err = stop(&ctx, &done);
    assert_eq!(err.to_string(), "Uncaught exception: execution terminated");
    assert_eq!(ctx.error().unwrap(), "Uncaught exception: execution terminated");

    // Terminating while idle is harmless.
    ctx.terminate();
    let fresh = Context::new(&isolate).unwrap();
    assert_eq!(fresh.execute("1 + 1", NO_FILE).unwrap(), "2");
    assert_eq!(ctx.execute("'still alive'", NO_FILE).unwrap(), "\"still alive\"");
}

#[test]
fn terminate_only_affects_its_isolate() {
    let vm1 = context();
    let vm2 = context();
    let done1 = spin(&vm1);
    let done2 = spin(&vm2);

    assert!(done1.recv_timeout(Duration::from_millis(10)).is_err());
    assert!(done2.try_recv().is_err());

    stop(&vm2, &done2);
    assert!(done1.recv_timeout(Duration::from_millis(10)).is_err());
    stop(&vm1, &done1);
}

#[test]
fn terminate_skips_catch_and_finally() {
    let ctx = context();
    ctx.execute("var reached = false;", NO_FILE).unwrap();
    let (tx, rx) = mpsc::channel();
    let looping = ctx.clone();
    thread::spawn(move || {
        let _ = tx.send(looping.eval(
            "try { while(1){} } catch (e) { reached = true } finally { reached = true }",
            NO_FILE,
        ));
    });
    stop(&ctx, &rx);
    assert_eq!(ctx.execute("reached", NO_FILE).unwrap(), "false");
}

// ── Exception reports ────────────────────────────────────────────────

#[test]
fn reference_error_report() {
    let ctx = context();
    let err = ctx
        .execute(
            "
        dne; // dne = does not exist.
    ",
            "my_file.js",
        )
        .unwrap_err();
    let re = Regex::new("Stack trace: ReferenceError: dne is not defined.*\n.*at my_file.js").unwrap();
    assert!(re.is_match(&err.to_string()), "{}", err);
}

#[test]
fn syntax_error_report() {
    let ctx = context();
    let err = ctx
        .execute(
            "\n\t\t// blah blah blah\n\t\tfunction(asdf) { // error, no function name\n\t\t\treturn 0\n\t\t}\n\t",
            "my_file.js",
        )
        .unwrap_err()
        .to_string();
    for expected in [
        "Uncaught exception",
        "SyntaxError",
        "Unexpected token",
        "my_file.js:3:10",
        "function(asdf)",
    ] {
        assert!(err.contains(expected), "missing {:?} in {}", expected, err);
    }
}

#[test]
fn type_error_report() {
    let ctx = context();
    let err = ctx
        .execute(
            "
        var x = undefined;
        x.blah;
    ",
            "my_file.js",
        )
        .unwrap_err();
    let re = Regex::new(
        "Stack trace: TypeError: Cannot read property 'blah' of undefined.*\n.*at my_file.js",
    )
    .unwrap();
    assert!(re.is_match(&err.to_string()), "{}", err);
}

#[test]
fn thrown_string_report() {
    let ctx = context();
    let err = ctx.execute("throw 'badness'", "my_file.js").unwrap_err();
    assert!(err.to_string().starts_with("Uncaught exception: badness"));
}

#[test]
fn thrown_object_report() {
    let ctx = context();
    let err = ctx
        .execute(r#"throw {msg:"died", data:3}"#, "my_file.js")
        .unwrap_err();
    let re = Regex::new("Uncaught exception:.*died").unwrap();
    assert!(re.is_match(&err.to_string()), "{}", err);
}

#[test]
fn context_survives_a_throw() {
    let ctx = context();
    let err = ctx.execute(
        "
        function fail(a,b) {
            this.c = a+b;
            throw 'some failure';
        }
        function work(a,b) {
            this.c = a+b+2;
        }
        x = new fail(3,5);",
        "file1.js",
    );
    assert!(err.is_err());
    assert_eq!(number(&ctx, "y = new work(3,6); y.c"), 11.0);
}

#[test]
fn many_contexts_throwing_errors() {
    const PROG: &str = "
        function work(N, depth, fail) {
            if (depth == 0) { return 1; }
            var sum = 0;
            for (i = 0; i < N; i++) { sum *= work(N, depth-1); }
            if (fail) {
                throw 'Failed';
            }
            return sum;
        }";

    let workers: Vec<_> = (0..10)
        .map(|i| {
            let ctx = context();
            ctx.execute(PROG, "prog.js").unwrap();
            thread::spawn(move || {
                let fail = i % 5 == 0;
                for _ in 0..3 {
                    let res = ctx.run("work", &[json!(100000), json!(100), json!(fail)]);
                    assert_eq!(res.is_err(), fail);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
}

#[test]
fn errors_in_native_code() {
    let ctx = context();
    let err = ctx.execute("[].map(undefined);", "map_undef.js").unwrap_err();
    assert!(err.to_string().contains("TypeError"), "{}", err);
}

#[test]
fn stack_overflow_is_a_range_error() {
    let ctx = context();
    let err = ctx
        .execute(
            "function a(x,y) { return a(x,y) + a(y,x); }; a(1,2)",
            "stack_attack.js",
        )
        .unwrap_err();
    assert!(
        err.to_string().contains("RangeError: Maximum call stack size exceeded"),
        "{}",
        err
    );
}

// ── Handles ──────────────────────────────────────────────────────────

#[test]
fn eval_holds_the_full_value() {
    let ctx = context();
    let val = ctx.eval("x = {a:3,b:{c:'asdf'}}", "new eval hotness!").unwrap();
    assert_eq!(ctx.to_json(val).unwrap(), r#"{"a":3,"b":{"c":"asdf"}}"#);
}

#[test]
fn to_json_is_live() {
    let ctx = context();
    let val = ctx.eval("var live = {n: 1}; live", NO_FILE).unwrap();
    ctx.execute("live.n = 2", NO_FILE).unwrap();
    assert_eq!(ctx.to_json(val).unwrap(), r#"{"n":2}"#);
}

#[test]
fn from_json_round_trip() {
    let ctx = context();
    let text = r#"{"a":3,"b":{"c":"asdf"}}"#;
    let val = ctx.from_json(text).unwrap();
    assert_eq!(ctx.to_json(val).unwrap(), text);
}

#[test]
fn from_json_rejects_garbage() {
    let ctx = context();
    let err = ctx.from_json("{nope").unwrap_err();
    assert!(err.is_script());
    assert!(ctx.error().unwrap().contains("SyntaxError"));
}

#[test]
fn apply_adds() {
    let ctx = context();
    let f = ctx.create_js("function(a,b) { return a+b; }", NO_FILE).unwrap();
    let a = ctx.create_js("3", NO_FILE).unwrap();
    let b = ctx.create_js("7", NO_FILE).unwrap();
    let res = ctx.apply(f, Some(f), &[a, b]).unwrap();
    assert_eq!(ctx.to_json(res).unwrap(), "10");
}

#[test]
fn apply_with_this() {
    let ctx = context();
    let f = ctx.create_js("function(x) { return x+this.y; }", NO_FILE).unwrap();
    let x = ctx.create_js("5", NO_FILE).unwrap();
    let y1 = ctx.create_js("{y:3}", NO_FILE).unwrap();
    let y2 = ctx.create_js("{y:7}", NO_FILE).unwrap();

    let res = ctx.apply(f, Some(y1), &[x]).unwrap();
    assert_eq!(ctx.to_json(res).unwrap(), "8");
    let res = ctx.apply(f, Some(y2), &[x]).unwrap();
    assert_eq!(ctx.to_json(res).unwrap(), "12");
}

#[test]
fn apply_without_this_uses_the_global_object() {
    let ctx = context();
    ctx.execute("var y = 100;", NO_FILE).unwrap();
    let f = ctx.create_js("function(x) { return x+this.y; }", NO_FILE).unwrap();
    let x = ctx.create_js("5", NO_FILE).unwrap();
    let res = ctx.apply(f, None, &[x]).unwrap();
    assert_eq!(ctx.to_json(res).unwrap(), "105");
}

#[test]
fn apply_failure_sets_the_last_error() {
    let ctx = context();
    let f = ctx.create_js("function() { throw new Error('nope'); }", "f.js").unwrap();
    let err = ctx.apply(f, None, &[]).unwrap_err();
    assert!(err.to_string().starts_with("Uncaught exception: Error: nope"));
    assert_eq!(ctx.error().unwrap(), err.to_string());
}

#[test]
fn value_to_string() {
    let ctx = context();
    let val = ctx.eval(r#""lalala""#, "test").unwrap();
    assert_eq!(ctx.to_string_value(val).unwrap(), "lalala");
    let val = ctx.eval("123", "test").unwrap();
    assert!(matches!(ctx.to_string_value(val), Err(BridgeError::NotAString(_))));
}

#[test]
fn create_js() {
    let ctx = context();
    let val = ctx.create_js("{a:1, b:{c:3}}", NO_FILE).unwrap();
    assert_eq!(ctx.to_json(val).unwrap(), r#"{"a":1,"b":{"c":3}}"#);
}

#[derive(serde::Serialize)]
#[allow(non_snake_case)]
struct Example {
    One: i32,
    Two: String,
}

#[test]
fn to_value_serializes() {
    let ctx = context();
    let val = ctx
        .to_value(&Example {
            One: 1,
            Two: "two".into(),
        })
        .unwrap();
    assert_eq!(ctx.to_json(val).unwrap(), r#"{"One":1,"Two":"two"}"#);
}

#[test]
fn raw_func_created_from_a_closure() {
    let ctx = context();
    let called = Arc::new(AtomicBool::new(false));
    let flag = called.clone();
    let f = ctx
        .create_raw_func(move |ctx, _, _| {
            flag.store(true, Ordering::SeqCst);
            ctx.to_value(&17).map(Some)
        })
        .unwrap();

    let val = ctx.apply(f, None, &[]).unwrap();
    assert!(called.load(Ordering::SeqCst));
    assert_eq!(ctx.to_json(val).unwrap(), "17");
}

#[test]
fn burst() {
    let ctx = context();
    let ob = ctx.create_js("{a:1, b:{c:3}}", NO_FILE).unwrap();
    let vals = ctx.burst(ob).unwrap();
    assert_eq!(vals.len(), 2);
    assert_eq!(vals[0].0, "a");
    assert_eq!(ctx.to_json(vals[0].1).unwrap(), "1");
    assert_eq!(vals[1].0, "b");
    assert_eq!(ctx.to_json(vals[1].1).unwrap(), r#"{"c":3}"#);
}

#[test]
fn burst_on_non_object() {
    let ctx = context();
    let num = ctx.create_js("5", NO_FILE).unwrap();
    let err = ctx.burst(num).unwrap_err();
    assert!(matches!(err, BridgeError::NotBurstable(_)));
    assert!(err.to_string().ends_with(":5"));
}

#[test]
fn get_object_field() {
    let ctx = context();
    let ob = ctx.create_js("{a:1}", NO_FILE).unwrap();
    let a = ctx.get(ob, "a").unwrap();
    assert_eq!(ctx.to_json(a).unwrap(), "1");
}

#[test]
fn get_missing_field() {
    let ctx = context();
    let ob = ctx.create_js("{}", NO_FILE).unwrap();
    let err = ctx.get(ob, "a").unwrap_err();
    assert_eq!(err.to_string(), "field 'a' is undefined.");
}

#[test]
fn set_object_field() {
    let ctx = context();
    let ob = ctx.create_js("{}", NO_FILE).unwrap();
    let num = ctx.create_js("3", NO_FILE).unwrap();

    ctx.set_field(ob, "foo", num).unwrap();
    assert_eq!(ctx.to_json(ob).unwrap(), r#"{"foo":3}"#);

    let err = ctx.set_field(num, "bar", ob).unwrap_err();
    assert_eq!(err.to_string(), "The supplied receiver is not an object.");
    assert_eq!(ctx.to_json(num).unwrap(), "3");

    let called = Arc::new(AtomicBool::new(false));
    let flag = called.clone();
    let f = ctx
        .create_raw_func(move |_, _, _| {
            flag.store(true, Ordering::SeqCst);
            Ok(Some(num))
        })
        .unwrap();
    ctx.set_field(ob, "func", f).unwrap();

    ctx.add_raw_func("getObject", move |_, _, _| Ok(Some(ob)))
        .unwrap();
    assert_eq!(ctx.execute("getObject().func()", "test").unwrap(), "3");
    assert!(called.load(Ordering::SeqCst));
}

#[test]
fn from_json_with_single_quotes() {
    let ctx = context();
    let actual_key = r#"a'x<\>""#;
    let text = r#"{"a'x<\\>\"":3}"#;
    let v = ctx.from_json(text).unwrap();
    let fields = ctx.burst(v).unwrap();
    assert!(fields.iter().any(|(name, _)| name == actual_key), "{:?}", fields);
}

#[test]
fn release_is_checked() {
    let ctx = context();
    let h = ctx.eval("({})", NO_FILE).unwrap();
    ctx.release(h).unwrap();
    assert_eq!(
        ctx.release(h).unwrap_err().to_string(),
        "Value has been already released."
    );
    assert!(matches!(ctx.to_json(h), Err(BridgeError::Released)));
}

// ── Raw functions ────────────────────────────────────────────────────

#[test]
fn raw_func_returns_an_argument() {
    let ctx = context();
    ctx.add_raw_func("lastarg", |_, caller, args| {
        assert_eq!(caller.file, "some_test_file.js");
        Ok(args.last().copied())
    })
    .unwrap();

    let arg = ctx.eval("lastarg(1,2,3,4,'blah')", "some_test_file.js").unwrap();
    assert_eq!(ctx.to_json(arg).unwrap(), r#""blah""#);
    let arg = ctx.eval("lastarg(1,2,3,4)", "some_test_file.js").unwrap();
    assert_eq!(ctx.to_json(arg).unwrap(), "4");
}

#[test]
fn raw_func_returning_nothing_is_undefined() {
    let ctx = context();
    ctx.add_raw_func("undef", |_, _, _| Ok(None)).unwrap();
    let arg = ctx.eval("undef(1,2,3)", "test").unwrap();
    assert_eq!(ctx.to_json(arg).unwrap(), "undefined");
}

#[test]
fn raw_func_error_is_thrown() {
    let ctx = context();
    ctx.add_raw_func("die", |_, _, _| Err(BridgeError::Host("diediedie".into())))
        .unwrap();
    let err = ctx.eval("die(1,2,3)", "test").unwrap_err();
    assert!(err.to_string().contains("diediedie"), "{}", err);

    assert_eq!(
        ctx.execute("try { die() } catch (e) { e.message }", "test").unwrap(),
        "\"diediedie\""
    );
}

#[test]
fn raw_func_sees_its_caller() {
    let ctx = context();
    let callers = Arc::new(Mutex::new(Vec::new()));
    let record = callers.clone();
    ctx.add_raw_func("require", move |_, caller, _| {
        record.lock().unwrap().push(caller.clone());
        Ok(None)
    })
    .unwrap();

    ctx.eval(
        "\n\t\tfunction inner() {\n\t\t\trequire('foo');\n\t\t};\n\t\tinner();",
        "inner.js",
    )
    .unwrap();
    ctx.eval(
        "\n\t\tfunction middle() {\n\t\t\tinner();\n\t\t};\n\t\tinner();\n\t\tmiddle();",
        "middle.js",
    )
    .unwrap();
    ctx.eval("\n\t\tinner();\n\t\tmiddle();", "outer.js").unwrap();

    let expected = CallerInfo {
        function: "inner".into(),
        file: "inner.js".into(),
        line: 3,
        column: 4,
    };
    let callers = callers.lock().unwrap();
    assert_eq!(callers.len(), 5);
    assert!(callers.iter().all(|c| *c == expected), "{:?}", callers);
}

#[test]
fn raw_func_applied_from_host_has_no_caller() {
    let ctx = context();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let f = ctx
        .create_raw_func(move |_, caller, _| {
            assert_eq!(caller.file, "");
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        })
        .unwrap();
    ctx.apply(f, Some(f), &[]).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn values_do_not_cross_contexts() {
    let ctx1 = context();
    let ctx2 = context();
    let from_ctx1 = ctx1.eval(r#"x={"s":4};x"#, NO_FILE).unwrap();

    ctx2.add_raw_func("getVal", move |_, _, _| Ok(Some(from_ctx1)))
        .unwrap();
    let err = ctx2.eval("getVal()", NO_FILE).unwrap_err();
    assert!(
        err.to_string().contains(
            "Error processing return value of raw function callback getVal: \
             Return value was generated from another context."
        ),
        "{}",
        err
    );
}

#[test]
fn throw_from_resolver() {
    let ctx = context();
    ctx.add_raw_func("die", |_, _, _| Err(BridgeError::Host("bart".into())))
        .unwrap();
    let err = ctx.eval("die()", NO_FILE).unwrap_err();
    assert!(err.to_string().contains("bart"));
    assert_eq!(number(&ctx, "1+2"), 3.0);
}

#[test]
fn context_throw_inside_resolver() {
    let ctx = context();
    ctx.add_raw_func("boom", |ctx, _, _| {
        ctx.throw("boom")?;
        Ok(None)
    })
    .unwrap();

    let err = ctx.execute("boom()", NO_FILE).unwrap_err();
    assert!(ctx.error().unwrap().contains("boom"));
    assert!(err.to_string().starts_with("Uncaught exception: Error: boom"));
    assert_eq!(
        ctx.execute("try { boom(); 'no' } catch (e) { e.message }", NO_FILE)
            .unwrap(),
        "\"boom\""
    );
}

#[test]
fn context_throw_outside_resolver_is_ignored() {
    let ctx = context();
    ctx.throw("nobody listens").unwrap();
    assert_eq!(ctx.execute("1", NO_FILE).unwrap(), "1");
}

// ── Snapshots and configuration ──────────────────────────────────────

#[test]
fn snapshot_runs_in_every_context() {
    let snapshot = Snapshot::from_source(
        "boot.js",
        "function greet(n) { return 'hi ' + n; } var booted = (typeof booted === 'undefined') ? 1 : booted + 1;",
    )
    .unwrap();
    let isolate = Isolate::with_snapshot(snapshot).unwrap();

    for _ in 0..2 {
        let ctx = Context::new(&isolate).unwrap();
        assert_eq!(ctx.run("greet", &[json!("there")]).unwrap(), json!("hi there"));
        assert_eq!(ctx.execute("booted", NO_FILE).unwrap(), "1");
    }
}

#[test]
fn failing_snapshot_fails_context_creation() {
    let snapshot = Snapshot::from_source("boot.js", "throw 'no boot'").unwrap();
    let isolate = Isolate::with_snapshot(snapshot).unwrap();
    let err = Context::new(&isolate).unwrap_err();
    assert!(matches!(err, BridgeError::Snapshot(_)));
    assert!(err.to_string().contains("no boot"));
}

#[test]
fn isolate_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("boot.js"), "var ready = 'yes';").unwrap();
    let path = dir.path().join("isolate.toml");
    std::fs::write(&path, "max_call_depth = 32\nsnapshot = \"boot.js\"\n").unwrap();

    let config = IsolateConfig::load(&path).unwrap();
    let isolate = Isolate::with_config(config).unwrap();
    let ctx = Context::new(&isolate).unwrap();
    assert_eq!(ctx.execute("ready", NO_FILE).unwrap(), "\"yes\"");

    let err = ctx
        .execute("function down(n) { return down(n + 1); } down(0)", NO_FILE)
        .unwrap_err();
    assert!(err.to_string().contains("Maximum call stack size exceeded"));
}

#[test]
fn dropping_the_isolate_disposes_it() {
    let isolate = Isolate::new().unwrap();
    let ctx = Context::new(&isolate).unwrap();
    drop(isolate);
    // Still alive through the context.
    assert_eq!(ctx.execute("2", NO_FILE).unwrap(), "2");
    drop(ctx);
}
