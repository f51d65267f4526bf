//! Type-checking pass behavior: boolean test casts, idempotence,
//! coherent-flag demotion, and declared-constant annotation.

mod common;

use common::*;
use gangc::diagnostics;
use gangc::expr::Expr;
use gangc::stmt::{
    AssertStmt, BreakStmt, ContinueStmt, DoStmt, ForStmt, IfStmt, ReturnStmt, Stmt,
};
use gangc::types::{AtomicKind, Type, Variability};
use gangc::CompileContext;

fn if_test_type(stmt: &Stmt) -> Type {
    match stmt {
        Stmt::If(s) => s.test.as_ref().unwrap().get_type().unwrap(),
        _ => panic!("expected if stmt"),
    }
}

#[test]
fn uniform_if_test_is_cast_to_uniform_bool() {
    let g = CompileContext::new();
    let stmt = Box::new(Stmt::If(IfStmt::new(
        uniform_i32(1),
        Some(stmt_list(vec![])),
        None,
        false,
        &g,
        pos(),
    )));
    let checked = stmt.type_check(&g).unwrap();
    assert_eq!(if_test_type(&checked), Type::uniform_bool());
}

#[test]
fn varying_if_test_is_cast_to_varying_bool() {
    let g = CompileContext::new();
    let stmt = Box::new(Stmt::If(IfStmt::new(
        varying_i32(&[1, 0, 1, 0, 1, 0, 1, 0]),
        Some(stmt_list(vec![])),
        None,
        false,
        &g,
        pos(),
    )));
    let checked = stmt.type_check(&g).unwrap();
    assert_eq!(if_test_type(&checked), Type::varying_bool());
}

#[test]
fn disable_uniform_control_flow_demotes_uniform_tests() {
    let mut g = CompileContext::new();
    g.opt.disable_uniform_control_flow = true;
    let stmt = Box::new(Stmt::If(IfStmt::new(
        uniform_i32(1),
        Some(stmt_list(vec![])),
        None,
        false,
        &g,
        pos(),
    )));
    let checked = stmt.type_check(&g).unwrap();
    assert_eq!(if_test_type(&checked), Type::varying_bool());
}

#[test]
fn type_check_is_idempotent_on_if_tests() {
    let g = CompileContext::new();
    let stmt = Box::new(Stmt::If(IfStmt::new(
        uniform_i32(1),
        Some(stmt_list(vec![])),
        None,
        false,
        &g,
        pos(),
    )));
    let once = stmt.type_check(&g).unwrap();
    let twice = once.type_check(&g).unwrap();
    assert_eq!(if_test_type(&twice), Type::uniform_bool());
    // the second pass must not wrap the cast in another cast
    match &*twice {
        Stmt::If(s) => match s.test.as_deref().unwrap() {
            Expr::Cast { expr, .. } => assert!(matches!(expr.as_ref(), Expr::Const(_))),
            other => panic!("expected cast around the test, got {:?}", other),
        },
        _ => unreachable!(),
    }
}

#[test]
fn non_boolean_test_is_rejected() {
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
    let stmt = Box::new(Stmt::If(IfStmt::new(
        sym_ref(&s),
        Some(stmt_list(vec![])),
        None,
        false,
        &g,
        pos(),
    )));
    assert!(stmt.type_check(&g).is_none());
    assert_eq!(diagnostics::error_count(), before + 1);
}

#[test]
fn coherent_flags_demoted_when_disabled() {
    let mut g = CompileContext::new();
    g.opt.disable_coherent_control_flow = true;

    let if_stmt = IfStmt::new(varying_test(), None, None, true, &g, pos());
    assert!(!if_stmt.do_all_check);

    let do_stmt = DoStmt::new(uniform_bool(true), None, true, &g, pos());
    assert!(!do_stmt.do_coherent_check);

    let for_stmt = ForStmt::new(None, None, None, None, true, &g, pos());
    assert!(!for_stmt.do_coherent_check);

    let break_stmt = BreakStmt::new(true, &g, pos());
    assert!(!break_stmt.do_coherence_check);

    let continue_stmt = ContinueStmt::new(true, &g, pos());
    assert!(!continue_stmt.do_coherence_check);

    let return_stmt = ReturnStmt::new(None, true, &g, pos());
    assert!(!return_stmt.do_coherence_check);
}

#[test]
fn varying_break_promotes_uniform_loop_test() {
    let g = CompileContext::new();
    let body = stmt_list(vec![Box::new(Stmt::If(IfStmt::new(
        varying_test(),
        Some(Box::new(Stmt::Break(BreakStmt::new(false, &g, pos())))),
        None,
        false,
        &g,
        pos(),
    )))]);
    let for_stmt = Box::new(Stmt::For(ForStmt::new(
        None,
        Some(uniform_bool(true)),
        None,
        Some(body),
        false,
        &g,
        pos(),
    )));
    let checked = for_stmt.type_check(&g).unwrap();
    match &*checked {
        Stmt::For(s) => {
            assert_eq!(
                s.test.as_ref().unwrap().get_type().unwrap(),
                Type::varying_bool()
            );
        }
        _ => unreachable!(),
    }
}

#[test]
fn assert_test_is_cast_but_keeps_variability() {
    let g = CompileContext::new();
    let stmt = Box::new(Stmt::Assert(AssertStmt::new(
        "positive",
        varying_i32(&[1, 1, 1, 1, 1, 1, 1, 1]),
        pos(),
    )));
    let checked = stmt.type_check(&g).unwrap();
    match &*checked {
        Stmt::Assert(s) => {
            assert_eq!(
                s.expr.as_ref().unwrap().get_type().unwrap(),
                Type::varying_bool()
            );
        }
        _ => unreachable!(),
    }
}

#[test]
fn const_scalar_initializer_is_recorded_on_the_symbol() {
    let g = CompileContext::new();
    let k = sym(
        "k",
        Type::Atomic {
            kind: AtomicKind::Float,
            variability: Variability::Uniform,
            is_const: true,
        },
    );
    // `const uniform float k = 2` converts the int constant to float
    // during type checking, so the cached constant is a float.
    let stmt = decl(&k, Some(uniform_i32(2)));
    let stmt = stmt.type_check(&g).unwrap();
    let _ = stmt.optimize();

    let cached = k.const_value.borrow();
    let cached = cached.as_ref().expect("constant recorded");
    assert!(cached.ty.equal_ignoring_const(&k.ty.borrow()));
    assert_eq!(cached.values[0].as_f64(), 2.0);
}

#[test]
fn statement_trees_render_for_debugging() {
    let g = CompileContext::new();
    let x = sym("x", Type::varying_int32());
    let tree = stmt_list(vec![
        decl(&x, Some(uniform_i32(0))),
        Box::new(Stmt::If(IfStmt::new(
            varying_test(),
            Some(Box::new(Stmt::Break(BreakStmt::new(true, &g, pos())))),
            None,
            true,
            &g,
            pos(),
        ))),
    ]);
    let rendered = tree.to_string();
    assert!(rendered.contains("stmt list"));
    assert!(rendered.contains("if stmt (coherent)"));
    assert!(rendered.contains("coherent break stmt"));
}

#[test]
fn driver_fails_on_type_errors_but_emits_clean_bodies() {
    let _quiet = diagnostics::suppress();
    let g = CompileContext::new();
    let mut module = gangc::ir::Module::new();

    let ok_body = stmt_list(vec![expr_stmt(uniform_i32(1))]);
    assert!(
        gangc::compile_stmt_function(&g, &mut module, "ok_fn", gangc::ir::IrType::Void, ok_body)
            .is_ok()
    );
    assert!(module.find_function("ok_fn").is_some());

    let s = sym(
        "s",
        Type::Struct {
            name: "pair".to_string(),
            members: vec![("a".to_string(), Type::uniform_int32())],
        },
    );
    let bad_body = stmt_list(vec![Box::new(Stmt::If(IfStmt::new(
        sym_ref(&s),
        Some(stmt_list(vec![])),
        None,
        false,
        &g,
        pos(),
    )))]);
    assert!(gangc::compile_stmt_function(
        &g,
        &mut module,
        "bad_fn",
        gangc::ir::IrType::Void,
        bad_body
    )
    .is_err());
}
