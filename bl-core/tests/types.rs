//! Structs, enums, arrays, slices and pointers.

mod common;
use common::*;

use bl_core::scope::SymbolValue;

#[test]
fn struct_members_are_read_through_parameters() {
    let mut src = Src::new();
    let s32 = src.ident("s32");
    let s32_b = src.ident("s32");
    let vec2 = src.struct_ty(&[("x", s32), ("y", s32_b)]);
    src.constant("Vec2", vec2);

    // len2 :: fn(v: Vec2) s32 { return v.x * v.x + v.y * v.y; }
    let square = |src: &mut Src, member: &str| {
        let a = src.path(&format!("v.{member}"));
        let b = src.path(&format!("v.{member}"));
        src.bin(BinOp::Mul, a, b)
    };
    let xx = square(&mut src, "x");
    let yy = square(&mut src, "y");
    let sum = src.bin(BinOp::Add, xx, yy);
    let ret = src.ret(Some(sum));
    let vec2_ty = src.ident("Vec2");
    let s32 = src.ident("s32");
    let len2 = src.func(&[("v", vec2_ty)], Some(s32), vec![ret]);
    src.constant("len2", len2);

    let vec2_ty = src.ident("Vec2");
    let three = src.int(3);
    let four = src.int(4);
    let value = src.compound(vec2_ty, vec![three, four]);
    let call = src.call("len2", vec![value]);
    src.constant("r", call);
    // Members of constant aggregates fold directly.
    let vec2_ty = src.ident("Vec2");
    let five = src.int(5);
    let six = src.int(6);
    let value = src.compound(vec2_ty, vec![five, six]);
    let y = src.member(value, "y");
    src.constant("y", y);

    let mut session = src.session();
    session.analyze().expect("analysis succeeds");
    assert_eq!(session.const_value("r"), Some(int(25)));
    assert_eq!(session.const_value("y"), Some(int(6)));
}

#[test]
fn struct_may_point_to_itself() {
    let mut src = Src::new();
    let s32 = src.ident("s32");
    let node = src.ident("Node");
    let next = src.ptr_ty(node);
    let def = src.struct_ty(&[("value", s32), ("next", next)]);
    src.constant("Node", def);
    let node = src.ident("Node");
    let size = src.size_of(node);
    src.constant("size", size);

    let mut session = src.session();
    session.analyze().expect("analysis succeeds");
    assert_eq!(session.const_value("size"), Some(ConstValue::Int(16)));
}

#[test]
fn struct_containing_itself_by_value_is_rejected() {
    let mut src = Src::new();
    let bad = src.ident("Bad");
    let def = src.struct_ty(&[("inner", bad)]);
    src.constant("Bad", def);

    let mut session = src.session();
    let diags = errors_of(session.analyze(), &ErrorKind::Type);
    assert_eq!(diags.len(), 1);
    assert!(diags[0].message.contains("contains itself"), "{}", diags[0].message);
}

#[test]
fn enum_variants_count_up_from_the_previous_value() {
    let mut src = Src::new();
    let u8_ty = src.ident("u8");
    let five = src.int(5);
    let color = src.enum_ty(Some(u8_ty), &[("Red", None), ("Green", Some(five)), ("Blue", None)]);
    src.constant("Color", color);
    let red = src.path("Color.Red");
    src.constant("red", red);
    let blue = src.path("Color.Blue");
    src.constant("blue", blue);
    let bad = src.path("Color.Purple");
    src.constant("purple", bad);

    let mut session = src.session();
    let diags = errors_of(session.analyze(), &ErrorKind::Type);
    assert_eq!(diags.len(), 1);
    assert!(diags[0].message.contains("no variant `Purple`"), "{}", diags[0].message);
    assert_eq!(session.const_value("red"), Some(ConstValue::Int(0)));
    assert_eq!(session.const_value("blue"), Some(ConstValue::Int(6)));
    assert!(matches!(session.symbol_value("Color"), Some(SymbolValue::Type(_))));
}

#[test]
fn arrays_are_indexed_with_bounds_checks() {
    // sum3 :: fn() s32 { arr: [3]s32 = [3]s32.{1, 2, 3}; return arr[0] + arr[1] + arr[2]; }
    let mut src = Src::new();
    let s32 = src.ident("s32");
    let arr_ty = src.array_ty(3, s32);
    let s32 = src.ident("s32");
    let init_ty = src.array_ty(3, s32);
    let items: Vec<AstId> = (1..=3).map(|v| src.int(v)).collect();
    let init = src.compound(init_ty, items);
    let arr = src.decl("arr", Some(arr_ty), Some(init), true);
    let element = |src: &mut Src, i: u64| {
        let base = src.ident("arr");
        let index = src.int(i);
        src.index(base, index)
    };
    let a = element(&mut src, 0);
    let b = element(&mut src, 1);
    let c = element(&mut src, 2);
    let ab = src.bin(BinOp::Add, a, b);
    let abc = src.bin(BinOp::Add, ab, c);
    let ret = src.ret(Some(abc));
    let s32 = src.ident("s32");
    let sum3 = src.func(&[], Some(s32), vec![arr, ret]);
    src.constant("sum3", sum3);
    let call = src.call("sum3", vec![]);
    src.constant("x", call);

    let mut session = src.session();
    session.analyze().expect("analysis succeeds");
    assert_eq!(session.const_value("x"), Some(int(6)));

    let mut src = Src::new();
    let s32 = src.ident("s32");
    let ty = src.array_ty(3, s32);
    let items: Vec<AstId> = (1..=3).map(|v| src.int(v)).collect();
    let value = src.compound(ty, items);
    let five = src.int(5);
    let out_of_bounds = src.index(value, five);
    let mut session = src.session();
    match session.eval_comptime(out_of_bounds) {
        Err(CoreError::Trap(trap)) => assert_eq!(trap.kind, TrapKind::OutOfBounds { index: 5, len: 3 }),
        other => panic!("expected a trap, got {other:?}"),
    }
}

#[test]
fn slices_carry_length_and_pointer() {
    // view :: fn() s64 {
    //     arr: [3]s32 = [3]s32.{10, 20, 30};
    //     s: []s32 = []s32.{3, &arr[0]};
    //     return s.len + cast(s64) s[2];
    // }
    let mut src = Src::new();
    let s32 = src.ident("s32");
    let arr_ty = src.array_ty(3, s32);
    let s32 = src.ident("s32");
    let init_ty = src.array_ty(3, s32);
    let items: Vec<AstId> = [10, 20, 30].into_iter().map(|v| src.int(v)).collect();
    let init = src.compound(init_ty, items);
    let arr = src.decl("arr", Some(arr_ty), Some(init), true);

    let s32 = src.ident("s32");
    let slice_ty = src.slice_ty(s32);
    let s32 = src.ident("s32");
    let init_ty = src.slice_ty(s32);
    let len = src.int(3);
    let base = src.ident("arr");
    let zero = src.int(0);
    let first = src.index(base, zero);
    let ptr = src.addr_of(first);
    let init = src.compound(init_ty, vec![len, ptr]);
    let s = src.decl("s", Some(slice_ty), Some(init), false);

    let len = src.path("s.len");
    let base = src.ident("s");
    let two = src.int(2);
    let elem = src.index(base, two);
    let s64 = src.ident("s64");
    let wide = src.cast(s64, elem);
    let sum = src.bin(BinOp::Add, len, wide);
    let ret = src.ret(Some(sum));
    let s64 = src.ident("s64");
    let view = src.func(&[], Some(s64), vec![arr, s, ret]);
    src.constant("view", view);
    let call = src.call("view", vec![]);
    src.constant("x", call);

    let mut session = src.session();
    session.analyze().expect("analysis succeeds");
    assert_eq!(session.const_value("x"), Some(int(33)));
}

#[test]
fn pointers_allow_writes_through_parameters() {
    // bump :: fn(p: *s32) { @p += 1; }
    // twice :: fn() s32 { v := 1; bump(&v); bump(&v); return v; }
    let mut src = Src::new();
    let p = src.ident("p");
    let target = src.deref(p);
    let one = src.int(1);
    let add = src.assign_op(BinOp::Add, target, one);
    let s32 = src.ident("s32");
    let ptr = src.ptr_ty(s32);
    let bump = src.func(&[("p", ptr)], None, vec![add]);
    src.constant("bump", bump);

    let one = src.int(1);
    let v = src.decl("v", None, Some(one), true);
    let call = |src: &mut Src| {
        let v = src.ident("v");
        let addr = src.addr_of(v);
        src.call("bump", vec![addr])
    };
    let first = call(&mut src);
    let second = call(&mut src);
    let v_ref = src.ident("v");
    let ret = src.ret(Some(v_ref));
    let s32 = src.ident("s32");
    let twice = src.func(&[], Some(s32), vec![v, first, second, ret]);
    src.constant("twice", twice);
    let call = src.call("twice", vec![]);
    src.constant("x", call);

    let mut session = src.session();
    session.analyze().expect("analysis succeeds");
    assert_eq!(session.const_value("x"), Some(int(3)));
}

#[test]
fn immutable_locals_cannot_be_assigned() {
    let mut src = Src::new();
    let s32 = src.ident("s32");
    let one = src.int(1);
    let v = src.decl("v", Some(s32), Some(one), false);
    let v_ref = src.ident("v");
    let two = src.int(2);
    let assign = src.assign(v_ref, two);
    let f = src.func(&[], None, vec![v, assign]);
    src.constant("f", f);

    let mut session = src.session();
    let diags = errors_of(session.analyze(), &ErrorKind::Type);
    assert_eq!(diags.len(), 1);
}

#[test]
fn oversized_array_types_are_type_errors() {
    let mut src = Src::new();
    let s64 = src.ident("s64");
    let huge = src.array_ty(1 << 62, s64);
    let size = src.size_of(huge);
    src.constant("size", size);

    let mut session = src.session();
    let diags = errors_of(session.analyze(), &ErrorKind::Type);
    assert_eq!(diags.len(), 1);
    assert!(diags[0].message.contains("too large"), "{}", diags[0].message);
}

#[test]
fn zero_initialized_values_respect_the_size_limit() {
    let mut src = Src::new();
    let u8_ty = src.ident("u8");
    let big = src.array_ty(1 << 32, u8_ty);
    src.global("buffer", Some(big), None, true);
    let void = src.ident("void");
    let cells = src.array_ty(1 << 40, void);
    let empty = src.compound(cells, vec![]);
    src.constant("cells", empty);
    let u8_ty = src.ident("u8");
    let small = src.array_ty(64, u8_ty);
    src.global("small", Some(small), None, true);

    let mut session = src.session_with(SessionConfig::default().with_max_value_size(4096));
    let diags = errors_of(session.analyze(), &ErrorKind::Type);
    assert_eq!(diags.len(), 2, "{diags:?}");
    assert!(diags.iter().all(|d| d.message.contains("too large")));
}

#[test]
fn compound_length_is_checked_before_allocation() {
    let mut src = Src::new();
    let s32 = src.ident("s32");
    let huge = src.array_ty(1 << 60, s32);
    let one = src.int(1);
    let value = src.compound(huge, vec![one]);
    src.constant("value", value);

    let mut session = src.session();
    let diags = errors_of(session.analyze(), &ErrorKind::Type);
    assert_eq!(diags.len(), 1);
    assert!(diags[0].message.contains("initializer value"), "{}", diags[0].message);
}
