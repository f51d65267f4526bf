//! Runtime glue: `print` type encoding and `assert` lowering.

mod common;

use common::*;
use gangc::diagnostics;
use gangc::expr::Expr;
use gangc::ir::{Constant, Inst, IrType};
use gangc::stmt::{AssertStmt, PrintStmt, Stmt};
use gangc::types::{AtomicKind, Type, Variability};
use gangc::CompileContext;

fn print_stmt(format: &str, values: Option<Box<Expr>>) -> Box<Stmt> {
    Box::new(Stmt::Print(PrintStmt::new(format, values, pos())))
}

fn str_arg(f: &gangc::ir::Function, v: gangc::ir::ValueId) -> String {
    match f.constant_of(v) {
        Some(Constant::Str(s)) => s.clone(),
        other => panic!("expected string constant, got {:?}", other),
    }
}

#[test]
fn print_encodes_types_and_widens_small_integers() {
    let g = CompileContext::new();
    let values = Box::new(Expr::List {
        exprs: vec![
            *varying_const(AtomicKind::Int8, 7),
            *uniform_double(2.5),
        ],
        pos: pos(),
    });
    let module = compile(&g, stmt_list(vec![print_stmt("%d %f\n", Some(values))]));
    let f = func(&module);

    let calls = f.calls_to("__do_print");
    assert_eq!(calls.len(), 1);
    let args = calls[0];
    assert_eq!(args.len(), 5);

    // the 8-bit varying int widens to a varying int32 ('I'); the
    // uniform double stays 'd'
    assert_eq!(str_arg(f, args[0]), "%d %f\n");
    assert_eq!(str_arg(f, args[1]), "Id");
    assert_eq!(
        f.constant_of(args[2]),
        Some(&Constant::Int {
            ty: IrType::I32,
            value: 8
        })
    );

    // exactly one slot per argument
    assert_eq!(count_allocas(f, "print_arg"), 2);
    // the widening conversion targets an i32 vector at the gang width
    assert!(f.insts().any(|i| matches!(
        i,
        Inst::Convert { ty: IrType::Vector(elem, 8), .. } if **elem == IrType::I32
    )));
    // the lane mask is passed as an integer bitmap
    assert!(f.count_insts(|i| matches!(i, Inst::LaneMask { .. })) == 1);
}

#[test]
fn print_without_values_passes_a_null_pointer_array() {
    let g = CompileContext::new();
    let module = compile(&g, stmt_list(vec![print_stmt("hello\n", None)]));
    let f = func(&module);

    let calls = f.calls_to("__do_print");
    assert_eq!(calls.len(), 1);
    let args = calls[0];
    assert_eq!(str_arg(f, args[1]), "");
    assert_eq!(f.constant_of(args[4]), Some(&Constant::NullPtr));
    assert_eq!(count_allocas(f, "print_arg"), 0);
}

#[test]
fn print_rejects_non_atomic_arguments() {
    let _quiet = diagnostics::suppress();
    let g = CompileContext::new();
    let s = sym(
        "s",
        Type::Struct {
            name: "pair".to_string(),
            members: vec![("a".to_string(), Type::uniform_int32())],
        },
    );
    let before = diagnostics::error_count();
    let module = compile(&g, stmt_list(vec![print_stmt("%v\n", Some(sym_ref(&s)))]));
    let f = func(&module);

    assert_eq!(diagnostics::error_count(), before + 1);
    assert!(f.calls_to("__do_print").is_empty());
}

#[test]
fn print_dereferences_reference_arguments() {
    let g = CompileContext::new();
    let y = sym("y", Type::atomic(AtomicKind::Float, Variability::Uniform));
    let r = sym(
        "r",
        Type::Reference {
            target: Box::new(Type::atomic(AtomicKind::Float, Variability::Uniform)),
        },
    );
    let bind = Box::new(Expr::Reference {
        expr: sym_ref(&y),
        pos: pos(),
    });
    let body = stmt_list(vec![
        decl(&y, Some(uniform_float(1.0))),
        decl(&r, Some(bind)),
        print_stmt("%f\n", Some(sym_ref(&r))),
    ]);
    let module = compile(&g, body);
    let f = func(&module);

    let calls = f.calls_to("__do_print");
    assert_eq!(calls.len(), 1);
    assert_eq!(str_arg(f, calls[0][1]), "f");
}

#[test]
fn uniform_assert_calls_the_uniform_helper() {
    let g = CompileContext::new();
    let body = stmt_list(vec![Box::new(Stmt::Assert(AssertStmt::new(
        "count is positive",
        uniform_bool(true),
        pos(),
    )))]);
    let module = compile(&g, body);
    let f = func(&module);

    let calls = f.calls_to("__do_assert_uniform");
    assert_eq!(calls.len(), 1);
    assert!(f.calls_to("__do_assert_varying").is_empty());
    let args = calls[0];
    assert_eq!(args.len(), 3);
    assert_eq!(
        str_arg(f, args[0]),
        "test.gang:1:1: Assertion failed: count is positive\n"
    );
}

#[test]
fn varying_assert_calls_the_varying_helper() {
    let g = CompileContext::new();
    let body = stmt_list(vec![Box::new(Stmt::Assert(AssertStmt::new(
        "lanes in range",
        varying_i32(&[1, 1, 1, 1, 1, 1, 1, 1]),
        pos(),
    )))]);
    let module = compile(&g, body);
    let f = func(&module);

    assert_eq!(f.calls_to("__do_assert_varying").len(), 1);
    assert!(f.calls_to("__do_assert_uniform").is_empty());
}
