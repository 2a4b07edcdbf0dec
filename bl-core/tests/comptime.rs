//! Compile-time execution: folding, the VM, traps and native calls.

mod common;
use common::*;

use bl_core::native::NativeRegistry;

fn both_modes() -> [SessionConfig; 2] {
    [
        SessionConfig::default(),
        SessionConfig::default().with_fold_constants(false),
    ]
}

#[test]
fn arithmetic_agrees_with_and_without_folding() {
    for config in both_modes() {
        let mut src = Src::new();
        let two = src.int(2);
        let three = src.int(3);
        let four = src.int(4);
        let product = src.bin(BinOp::Mul, three, four);
        let sum = src.bin(BinOp::Add, two, product);
        let mut session = src.session_with(config.clone());
        assert_eq!(session.eval_comptime(sum).expect("evaluates"), int(14), "{config:?}");
    }
}

#[test]
fn division_by_zero_traps_at_the_operator() {
    for config in both_modes() {
        let mut src = Src::new();
        let ten = src.int(10);
        let zero = src.int(0);
        let div = src.bin(BinOp::Div, ten, zero);
        let span = src.span_of(div);
        let mut session = src.session_with(config);
        match session.eval_comptime(div) {
            Err(CoreError::Trap(trap)) => {
                assert_eq!(trap.kind, TrapKind::DivideByZero);
                assert_eq!(trap.span, span);
            }
            other => panic!("expected a trap, got {other:?}"),
        }
        let diags = session.diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, ErrorKind::Trap(TrapKind::DivideByZero));
    }
}

#[test]
fn literal_overflow_is_a_type_error() {
    let mut src = Src::new();
    let big = src.int(300);
    let u8_ty = src.ident("u8");
    src.global("small", Some(u8_ty), Some(big), false);

    let mut session = src.session();
    let diags = errors_of(session.analyze(), &ErrorKind::Type);
    assert_eq!(diags.len(), 1);
    assert!(diags[0].message.contains("does not fit"), "{}", diags[0].message);
}

/// `fact :: fn(n: s64) s64 { if n <= 1 { return 1; } return n * fact(n - 1); }`
fn factorial(src: &mut Src) {
    let n = src.ident("n");
    let one = src.int(1);
    let cond = src.bin(BinOp::LessEq, n, one);
    let one = src.int(1);
    let base = src.ret(Some(one));
    let check = src.if_(cond, vec![base], None);
    let n = src.ident("n");
    let n2 = src.ident("n");
    let one = src.int(1);
    let pred = src.bin(BinOp::Sub, n2, one);
    let rec = src.call("fact", vec![pred]);
    let product = src.bin(BinOp::Mul, n, rec);
    let step = src.ret(Some(product));
    let s64 = src.ident("s64");
    let s64_ret = src.ident("s64");
    let fact = src.func(&[("n", s64)], Some(s64_ret), vec![check, step]);
    src.constant("fact", fact);
}

#[test]
fn recursive_function_runs_at_compile_time() {
    for config in both_modes() {
        let mut src = Src::new();
        // Used before the function is declared.
        let ten = src.int(10);
        let call = src.call("fact", vec![ten]);
        src.constant("x", call);
        factorial(&mut src);

        let mut session = src.session_with(config);
        session.analyze().expect("analysis succeeds");
        assert_eq!(session.const_value("x"), Some(int(3_628_800)));
    }
}

#[test]
fn runaway_recursion_overflows_the_stack() {
    let mut src = Src::new();
    let n = src.ident("n");
    let one = src.int(1);
    let next = src.bin(BinOp::Add, n, one);
    let rec = src.call("down", vec![next]);
    let ret = src.ret(Some(rec));
    let s64 = src.ident("s64");
    let s64_ret = src.ident("s64");
    let down = src.func(&[("n", s64)], Some(s64_ret), vec![ret]);
    src.constant("down", down);
    let zero = src.int(0);
    let call = src.call("down", vec![zero]);
    src.constant("x", call);

    let config = SessionConfig::default().with_vm(VmConfig {
        max_frames: 64,
        ..VmConfig::default()
    });
    let mut session = src.session_with(config);
    let traps = errors_of(session.analyze(), &ErrorKind::Trap(TrapKind::StackOverflow));
    assert_eq!(traps.len(), 1);
}

#[test]
fn loops_and_locals_execute_in_the_vm() {
    // sum_to :: fn(n: s64) s64 { total: s64 = 0; i: s64 = 1;
    //     while i <= n { total += i; i += 1; } return total; }
    let mut src = Src::new();
    let s64 = src.ident("s64");
    let zero = src.int(0);
    let total = src.decl("total", Some(s64), Some(zero), true);
    let s64 = src.ident("s64");
    let one = src.int(1);
    let i = src.decl("i", Some(s64), Some(one), true);
    let i_ref = src.ident("i");
    let n_ref = src.ident("n");
    let cond = src.bin(BinOp::LessEq, i_ref, n_ref);
    let total_ref = src.ident("total");
    let i_ref = src.ident("i");
    let add = src.assign_op(BinOp::Add, total_ref, i_ref);
    let i_ref = src.ident("i");
    let one = src.int(1);
    let step = src.assign_op(BinOp::Add, i_ref, one);
    let body = src.while_(cond, vec![add, step]);
    let total_ref = src.ident("total");
    let ret = src.ret(Some(total_ref));
    let s64 = src.ident("s64");
    let s64_ret = src.ident("s64");
    let sum_to = src.func(&[("n", s64)], Some(s64_ret), vec![total, i, body, ret]);
    src.constant("sum_to", sum_to);
    let hundred = src.int(100);
    let call = src.call("sum_to", vec![hundred]);
    src.constant("r", call);

    let mut session = src.session();
    session.analyze().expect("analysis succeeds");
    assert_eq!(session.const_value("r"), Some(int(5050)));
}

#[test]
fn comptime_functions_are_evaluated_at_the_call_site() {
    let mut src = Src::new();
    let x = src.ident("x");
    let x2 = src.ident("x");
    let square = src.bin(BinOp::Mul, x, x2);
    let ret = src.ret(Some(square));
    let s32 = src.ident("s32");
    let s32_ret = src.ident("s32");
    let square_fn = src.comptime_func(&[("x", s32)], Some(s32_ret), vec![ret]);
    src.constant("square", square_fn);

    // use_square :: fn() s32 { return square(7); }
    let seven = src.int(7);
    let call = src.call("square", vec![seven]);
    let ret = src.ret(Some(call));
    let s32 = src.ident("s32");
    let user = src.func(&[], Some(s32), vec![ret]);
    src.constant("use_square", user);

    let mut session = src.session();
    session.analyze().expect("analysis succeeds");
    let program = session.finish().expect("program");
    // The call was replaced by its value.
    let func = program.function("use_square").expect("declared");
    let body = program.mir.function(func);
    assert!(body.instrs.iter().all(|i| !matches!(i.kind, bl_core::mir::InstrKind::Call { .. })));
    assert_eq!(program.execute("use_square", &[]).expect("runs"), int(49));
}

#[test]
fn comptime_function_rejects_runtime_arguments() {
    let mut src = Src::new();
    let x = src.ident("x");
    let ret = src.ret(Some(x));
    let s32 = src.ident("s32");
    let s32_ret = src.ident("s32");
    let ident_fn = src.comptime_func(&[("x", s32)], Some(s32_ret), vec![ret]);
    src.constant("same", ident_fn);

    let y = src.ident("y");
    let call = src.call("same", vec![y]);
    let ret = src.ret(Some(call));
    let s32 = src.ident("s32");
    let s32_ret = src.ident("s32");
    let user = src.func(&[("y", s32)], Some(s32_ret), vec![ret]);
    src.constant("user", user);

    let mut session = src.session();
    let diags = errors_of(session.analyze(), &ErrorKind::Type);
    assert_eq!(diags.len(), 1);
    assert!(diags[0].message.contains("known at compile time"), "{}", diags[0].message);
}

#[test]
fn static_assert_reports_only_failing_conditions() {
    let mut src = Src::new();
    let s64 = src.ident("s64");
    let size = src.size_of(s64);
    let eight = src.int(8);
    let cond = src.bin(BinOp::Eq, size, eight);
    let passing = src.static_assert(cond, "s64 is eight bytes");
    let one = src.int(1);
    let two = src.int(2);
    let cond = src.bin(BinOp::Greater, one, two);
    let failing = src.static_assert(cond, "one is not greater than two");
    let failing_span = src.span_of(failing);
    let checks = src.func(&[], None, vec![passing, failing]);
    src.constant("checks", checks);

    let mut session = src.session();
    let expected = ErrorKind::Trap(TrapKind::AssertionFailed("one is not greater than two".into()));
    let diags = errors_of(session.analyze(), &expected);
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].span, Some(failing_span));
}

fn host_add_program() -> Src {
    let mut src = Src::new();
    let s64 = src.ident("s64");
    let s64_b = src.ident("s64");
    let s64_ret = src.ident("s64");
    let ext = src.extern_func(&[("a", s64), ("b", s64_b)], Some(s64_ret), "host_add");
    src.constant("host_add", ext);
    let forty = src.int(40);
    let two = src.int(2);
    let call = src.call("host_add", vec![forty, two]);
    src.constant("r", call);
    src
}

#[test]
fn external_functions_call_into_the_host() {
    let natives = NativeRegistry::new().with("host_add", |args| match args {
        [ConstValue::Int(a), ConstValue::Int(b)] => Ok(ConstValue::Int(a.wrapping_add(*b))),
        _ => Err("expected two integers".into()),
    });
    let mut session = host_add_program().session().with_natives(natives);
    session.analyze().expect("analysis succeeds");
    assert_eq!(session.const_value("r"), Some(int(42)));
}

#[test]
fn missing_native_is_a_trap() {
    let mut session = host_add_program().session();
    let result = session.analyze();
    let Err(CoreError::CompilationFailed(diags)) = result else {
        panic!("expected analysis to fail");
    };
    assert_eq!(diags.len(), 1);
    assert!(matches!(diags[0].kind, ErrorKind::Trap(TrapKind::Native(_))));
}

#[test]
fn mutable_globals_keep_their_initial_value() {
    let mut src = Src::new();
    let s32 = src.ident("s32");
    let five = src.int(5);
    src.global("counter", Some(s32), Some(five), true);
    let s32 = src.ident("s32");
    src.global("zeroed", Some(s32), None, true);

    let mut session = src.session();
    session.analyze().expect("analysis succeeds");
    assert_eq!(session.const_value("counter"), Some(int(5)));
    assert_eq!(session.const_value("zeroed"), Some(int(0)));
    assert_eq!(session.mir().globals.len(), 2);
}
