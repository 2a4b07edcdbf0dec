//! Symbol resolution across declaration order, modules and dependency cycles.

mod common;
use common::*;

use bl_core::scope::SymbolValue;

#[test]
fn globals_resolve_regardless_of_declaration_order() {
    let mut src = Src::new();
    let b = src.ident("b");
    let one = src.int(1);
    let sum = src.bin(BinOp::Add, b, one);
    src.constant("a", sum);
    let c = src.ident("c");
    let two = src.int(2);
    let product = src.bin(BinOp::Mul, c, two);
    src.constant("b", product);
    let base = src.int(20);
    src.constant("c", base);

    let mut session = src.session();
    session.analyze().expect("analysis succeeds");
    assert_eq!(session.const_value("a"), Some(int(41)));
    assert_eq!(session.const_value("b"), Some(int(40)));
    assert_eq!(session.const_value("c"), Some(int(20)));
}

#[test]
fn mutual_dependency_is_reported_as_one_cycle() {
    let mut src = Src::new();
    let b = src.ident("b");
    src.constant("a", b);
    let a = src.ident("a");
    src.constant("b", a);
    // Independent declarations still resolve.
    let seven = src.int(7);
    src.constant("ok", seven);

    let mut session = src.session();
    let result = session.analyze();
    let cycles = errors_of(result, &ErrorKind::Dependency);
    assert_eq!(cycles.len(), 1);
    assert!(cycles[0].message.contains("`a`"), "{}", cycles[0].message);
    assert!(cycles[0].message.contains("`b`"), "{}", cycles[0].message);
    assert_eq!(cycles[0].notes.len(), 2);
    assert_eq!(session.const_value("ok"), Some(int(7)));
    assert_eq!(session.const_value("a"), None);
}

#[test]
fn dependents_of_a_failed_declaration_fail_silently() {
    let mut src = Src::new();
    let missing = src.ident("missing");
    src.constant("broken", missing);
    let broken = src.ident("broken");
    let one = src.int(1);
    let sum = src.bin(BinOp::Add, broken, one);
    src.constant("user", sum);

    let mut session = src.session();
    let Err(CoreError::CompilationFailed(diags)) = session.analyze() else {
        panic!("expected analysis to fail");
    };
    // Only the root cause is reported.
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].kind, ErrorKind::Resolution);
    assert!(diags[0].message.contains("missing"));
    assert!(session.symbol_value("user").is_none());
}

#[test]
fn redeclaration_points_at_the_first_declaration() {
    let mut src = Src::new();
    let one = src.int(1);
    let first = src.constant("x", one);
    let two = src.int(2);
    let second = src.constant("x", two);
    let first_span = src.span_of(first);
    let second_span = src.span_of(second);

    let mut session = src.session();
    let diags = errors_of(session.analyze(), &ErrorKind::Resolution);
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].span, Some(second_span));
    assert_eq!(diags[0].notes[0].span, Some(first_span));
    // The first declaration stays usable.
    assert_eq!(session.const_value("x"), Some(int(1)));
}

#[test]
fn module_members_are_reached_through_the_module_name() {
    let mut src = Src::new();
    let three = src.int(3);
    let pi = src.decl("pi", None, Some(three), false);
    let s32 = src.ident("s32");
    let x = src.ident("x");
    let two = src.int(2);
    let doubled = src.bin(BinOp::Mul, x, two);
    let ret = src.ret(Some(doubled));
    let s32_ret = src.ident("s32");
    let twice_fn = src.func(&[("x", s32)], Some(s32_ret), vec![ret]);
    let twice = src.decl("twice", None, Some(twice_fn), false);
    src.module("math", vec![pi, twice]);

    let callee = src.path("math.twice");
    let arg = src.path("math.pi");
    let result = src.call_expr(callee, vec![arg]);
    src.constant("r", result);

    let mut session = src.session();
    session.analyze().expect("analysis succeeds");
    assert_eq!(session.const_value("r"), Some(int(6)));
    assert_eq!(session.const_value("math.pi"), Some(int(3)));
    assert!(matches!(session.symbol_value("math"), Some(SymbolValue::Scope(_))));
    assert!(session.symbol_value("pi").is_none());
}

#[test]
fn locals_of_enclosing_functions_are_not_captured() {
    let mut src = Src::new();
    let one = src.int(1);
    let x = src.decl("x", None, Some(one), true);
    let x_ref = src.ident("x");
    let inner_ret = src.ret(Some(x_ref));
    let s32 = src.ident("s32");
    let inner_fn = src.func(&[], Some(s32), vec![inner_ret]);
    let inner = src.decl("inner", None, Some(inner_fn), false);
    let call = src.call("inner", vec![]);
    let outer_ret = src.ret(Some(call));
    let s32 = src.ident("s32");
    let outer_fn = src.func(&[], Some(s32), vec![x, inner, outer_ret]);
    src.constant("outer", outer_fn);

    let mut session = src.session();
    let diags = errors_of(session.analyze(), &ErrorKind::Resolution);
    assert_eq!(diags.len(), 1);
    assert!(diags[0].message.contains("enclosing function"), "{}", diags[0].message);
}

#[test]
fn analysis_is_deterministic() {
    fn build() -> Session {
        let mut src = Src::new();
        let b = src.ident("b");
        src.constant("a", b);
        let a = src.ident("a");
        src.constant("b", a);
        let truth = src.boolean(true);
        let s32 = src.ident("s32");
        src.global("bad", Some(s32), Some(truth), false);
        let n = src.ident("n");
        let ret = src.ret(Some(n));
        let s64 = src.ident("s64");
        let s64_ret = src.ident("s64");
        let id = src.func(&[("n", s64)], Some(s64_ret), vec![ret]);
        src.constant("id", id);
        src.session()
    }

    let mut first = build();
    let mut second = build();
    let _ = first.analyze();
    let _ = second.analyze();
    assert_eq!(first.diagnostics(), second.diagnostics());
    assert_eq!(first.diagnostics().len(), 2);
    let render = |s: &Session| s.mir().fns.iter().map(|f| f.to_string()).collect::<Vec<_>>();
    assert_eq!(render(&first), render(&second));
}
