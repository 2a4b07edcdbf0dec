//! Function groups and polymorphic specialization.

mod common;
use common::*;

use bl_core::scope::SymbolValue;

/// `f :: fn { fn(x: s32) s32 { return 1; }, fn(x: f64) s32 { return 2; } }`
fn overloaded(src: &mut Src, first: &str, second: &str) {
    let ty = src.ident(first);
    let ret_ty = src.ident("s32");
    let one = src.int(1);
    let ret = src.ret(Some(one));
    let a = src.func(&[("x", ty)], Some(ret_ty), vec![ret]);
    let ty = src.ident(second);
    let ret_ty = src.ident("s32");
    let two = src.int(2);
    let ret = src.ret(Some(two));
    let b = src.func(&[("x", ty)], Some(ret_ty), vec![ret]);
    let group = src.group(vec![a, b]);
    src.constant("f", group);
}

#[test]
fn overload_is_picked_by_argument_type() {
    let mut src = Src::new();
    overloaded(&mut src, "s32", "f64");
    let ten = src.int(10);
    let call = src.call("f", vec![ten]);
    src.constant("a", call);
    let half = src.float(1.5);
    let call = src.call("f", vec![half]);
    src.constant("b", call);

    let mut session = src.session();
    session.analyze().expect("analysis succeeds");
    assert_eq!(session.const_value("a"), Some(int(1)));
    assert_eq!(session.const_value("b"), Some(int(2)));
    match session.symbol_value("f") {
        Some(SymbolValue::FnGroup(fns)) => assert_eq!(fns.len(), 2),
        other => panic!("expected a function group, got {other:?}"),
    }
}

#[test]
fn equally_ranked_overloads_are_ambiguous() {
    let mut src = Src::new();
    overloaded(&mut src, "s64", "f64");
    let one = src.int(1);
    let call = src.call("f", vec![one]);
    let call_span = src.span_of(call);
    src.constant("a", call);

    let mut session = src.session();
    let diags = errors_of(session.analyze(), &ErrorKind::Resolution);
    assert_eq!(diags.len(), 1);
    assert!(diags[0].message.contains("ambiguous"), "{}", diags[0].message);
    assert_eq!(diags[0].span, Some(call_span));
    assert_eq!(diags[0].notes.len(), 2);
    assert!(diags[0].notes.iter().all(|n| n.message.starts_with("candidate")));
}

#[test]
fn overloads_with_the_same_signature_are_rejected() {
    let mut src = Src::new();
    overloaded(&mut src, "s32", "s32");

    let mut session = src.session();
    let diags = errors_of(session.analyze(), &ErrorKind::Type);
    assert_eq!(diags.len(), 1);
    assert!(diags[0].message.contains("share the signature"), "{}", diags[0].message);
}

#[test]
fn no_matching_overload_lists_every_candidate() {
    let mut src = Src::new();
    overloaded(&mut src, "s32", "f64");
    let truth = src.boolean(true);
    let call = src.call("f", vec![truth]);
    src.constant("a", call);

    let mut session = src.session();
    let diags = errors_of(session.analyze(), &ErrorKind::Resolution);
    assert_eq!(diags.len(), 1);
    assert!(diags[0].message.contains("no overload"), "{}", diags[0].message);
    assert_eq!(diags[0].notes.len(), 2);
}

/// `id :: fn(v: ?T) T { return v; }`
fn identity(src: &mut Src) {
    let poly = src.poly("T");
    let ret_ty = src.ident("T");
    let v = src.ident("v");
    let ret = src.ret(Some(v));
    let id = src.func(&[("v", poly)], Some(ret_ty), vec![ret]);
    src.constant("id", id);
}

#[test]
fn polymorphic_function_is_specialized_once_per_type() {
    let mut src = Src::new();
    identity(&mut src);
    let five = src.int(5);
    let call = src.call("id", vec![five]);
    src.constant("a", call);
    let half = src.float(2.5);
    let call = src.call("id", vec![half]);
    src.constant("b", call);
    let seven = src.int(7);
    let call = src.call("id", vec![seven]);
    src.constant("c", call);

    let mut session = src.session();
    session.analyze().expect("analysis succeeds");
    assert_eq!(session.const_value("a"), Some(int(5)));
    assert_eq!(session.const_value("b"), Some(ConstValue::F64(2.5)));
    assert_eq!(session.const_value("c"), Some(int(7)));

    let mut specializations: Vec<String> = session
        .mir()
        .fns
        .iter()
        .filter(|f| f.name == "id")
        .filter_map(|f| f.specialization.clone())
        .collect();
    specializations.sort();
    assert_eq!(specializations, vec!["?T = f64".to_string(), "?T = s32".to_string()]);
    assert!(matches!(session.symbol_value("id"), Some(SymbolValue::PolyFn(_))));
}

#[test]
fn conflicting_bindings_are_rejected() {
    // pick :: fn(a: ?T, b: T) T { return a; }  pick(1, true)
    let mut src = Src::new();
    let poly = src.poly("T");
    let t = src.ident("T");
    let ret_ty = src.ident("T");
    let a = src.ident("a");
    let ret = src.ret(Some(a));
    let pick = src.func(&[("a", poly), ("b", t)], Some(ret_ty), vec![ret]);
    src.constant("pick", pick);
    let one = src.int(1);
    let truth = src.boolean(true);
    let call = src.call("pick", vec![one, truth]);
    src.constant("r", call);

    let mut session = src.session();
    let diags = errors_of(session.analyze(), &ErrorKind::Type);
    assert_eq!(diags.len(), 1);
    assert!(diags[0].message.contains("expected `s32`, found `bool`"), "{}", diags[0].message);
}

#[test]
fn polymorphic_functions_cannot_be_stored() {
    let mut src = Src::new();
    identity(&mut src);
    let id = src.ident("id");
    src.global("stored", None, Some(id), true);

    let mut session = src.session();
    let diags = errors_of(session.analyze(), &ErrorKind::Type);
    assert_eq!(diags.len(), 1);
}
