//! Declaration lowering: unsized arrays, statics, references, brace
//! initializers and the varying-control-flow depth annotation.

mod common;

use common::*;
use gangc::diagnostics;
use gangc::expr::Expr;
use gangc::ir::{Constant, Inst, IrType};
use gangc::stmt::{IfStmt, Stmt};
use gangc::sym::{StorageClass, Symbol};
use gangc::types::{AtomicKind, Type, Variability};
use gangc::CompileContext;

fn brace(exprs: Vec<Box<Expr>>) -> Box<Expr> {
    Box::new(Expr::List {
        exprs: exprs.into_iter().map(|e| *e).collect(),
        pos: pos(),
    })
}

#[test]
fn unsized_array_takes_its_length_from_the_brace_initializer() {
    let g = CompileContext::new();
    let a = sym(
        "a",
        Type::Array {
            element: Box::new(Type::atomic(AtomicKind::Float, Variability::Uniform)),
            count: 0,
        },
    );
    let init = brace(vec![
        uniform_float(1.0),
        uniform_float(2.0),
        uniform_float(3.0),
    ]);
    let module = compile(&g, stmt_list(vec![decl(&a, Some(init))]));
    let f = func(&module);

    // the symbol's type is rewritten to the sized array
    assert_eq!(a.ty.borrow().element_count(), Some(3));
    // and the stack slot has exactly three elements
    assert!(f.insts().any(|i| matches!(
        i,
        Inst::Alloca { ty: IrType::Array(_, 3), name } if name == "a"
    )));
    assert_eq!(count_allocas(f, "a"), 1);
    // three elementwise stores through element pointers
    assert_eq!(
        f.count_insts(|i| matches!(i, Inst::ElementPtr { name, .. } if name == "element")),
        3
    );
}

#[test]
fn unsized_array_without_brace_initializer_is_rejected() {
    let _quiet = diagnostics::suppress();
    let g = CompileContext::new();
    let a = sym(
        "a",
        Type::Array {
            element: Box::new(Type::atomic(AtomicKind::Float, Variability::Uniform)),
            count: 0,
        },
    );
    let before = diagnostics::error_count();
    let module = compile(&g, stmt_list(vec![decl(&a, None)]));
    let f = func(&module);

    assert_eq!(diagnostics::error_count(), before + 1);
    // no storage is produced for the rejected declaration
    assert!(!has_alloca(f, "a"));
    assert!(a.storage.get().is_none());
}

#[test]
fn static_with_constant_initializer_becomes_an_internal_global() {
    let g = CompileContext::new();
    let k = Symbol::new(
        "k",
        Type::atomic(AtomicKind::Float, Variability::Uniform),
        StorageClass::Static,
        pos(),
    );
    let module = compile(
        &g,
        stmt_list(vec![decl(&k, Some(uniform_float(3.0)))]),
    );

    let global = module.find_global("static.1.k").expect("static global");
    assert!(global.internal_linkage);
    assert_eq!(
        global.init,
        Constant::Float {
            ty: IrType::F32,
            value: 3.0
        }
    );
}

#[test]
fn static_with_non_constant_initializer_reports_and_zero_fills() {
    let _quiet = diagnostics::suppress();
    let g = CompileContext::new();
    let y = sym("y", Type::atomic(AtomicKind::Float, Variability::Uniform));
    let k = Symbol::new(
        "k",
        Type::atomic(AtomicKind::Float, Variability::Uniform),
        StorageClass::Static,
        pos(),
    );
    let before = diagnostics::error_count();
    let module = compile(
        &g,
        stmt_list(vec![
            decl(&y, Some(uniform_float(1.0))),
            decl(&k, Some(sym_ref(&y))),
        ]),
    );

    assert_eq!(diagnostics::error_count(), before + 1);
    // the global still exists, zero-initialized
    let global = module.find_global("static.1.k").expect("static global");
    assert_eq!(global.init, Constant::Zero(IrType::F32));
}

#[test]
fn reference_declaration_requires_an_initializer() {
    let _quiet = diagnostics::suppress();
    let g = CompileContext::new();
    let r = sym(
        "r",
        Type::Reference {
            target: Box::new(Type::atomic(AtomicKind::Float, Variability::Uniform)),
        },
    );
    let before = diagnostics::error_count();
    let _ = compile(&g, stmt_list(vec![decl(&r, None)]));
    assert_eq!(diagnostics::error_count(), before + 1);
    assert!(r.storage.get().is_none());
}

#[test]
fn reference_declaration_binds_an_exact_reference() {
    let g = CompileContext::new();
    let y = sym("y", Type::atomic(AtomicKind::Float, Variability::Uniform));
    let r = sym(
        "r",
        Type::Reference {
            target: Box::new(Type::atomic(AtomicKind::Float, Variability::Uniform)),
        },
    );
    let init = Box::new(Expr::Reference {
        expr: sym_ref(&y),
        pos: pos(),
    });
    let before = diagnostics::error_count();
    let _ = compile(
        &g,
        stmt_list(vec![decl(&y, Some(uniform_float(1.0))), decl(&r, Some(init))]),
    );
    assert_eq!(diagnostics::error_count(), before);
    assert!(r.storage.get().is_some());
}

#[test]
fn mismatched_reference_initializer_is_rejected() {
    let _quiet = diagnostics::suppress();
    let g = CompileContext::new();
    let y = sym("y", Type::uniform_int32());
    let r = sym(
        "r",
        Type::Reference {
            target: Box::new(Type::atomic(AtomicKind::Float, Variability::Uniform)),
        },
    );
    let init = Box::new(Expr::Reference {
        expr: sym_ref(&y),
        pos: pos(),
    });
    let before = diagnostics::error_count();
    let _ = compile(
        &g,
        stmt_list(vec![decl(&y, Some(uniform_i32(1))), decl(&r, Some(init))]),
    );
    assert_eq!(diagnostics::error_count(), before + 1);
}

#[test]
fn brace_initializer_for_atomic_is_rejected() {
    let _quiet = diagnostics::suppress();
    let g = CompileContext::new();
    let x = sym("x", Type::uniform_int32());
    let before = diagnostics::error_count();
    let _ = compile(
        &g,
        stmt_list(vec![decl(&x, Some(brace(vec![uniform_i32(1)])))]),
    );
    assert_eq!(diagnostics::error_count(), before + 1);
}

#[test]
fn aggregate_initializer_arity_must_match() {
    let _quiet = diagnostics::suppress();
    let g = CompileContext::new();
    let a = sym(
        "a",
        Type::Array {
            element: Box::new(Type::atomic(AtomicKind::Float, Variability::Uniform)),
            count: 3,
        },
    );
    let before = diagnostics::error_count();
    let _ = compile(
        &g,
        stmt_list(vec![decl(
            &a,
            Some(brace(vec![uniform_float(1.0), uniform_float(2.0)])),
        )]),
    );
    assert_eq!(diagnostics::error_count(), before + 1);
}

#[test]
fn struct_brace_initializer_initializes_each_member() {
    let g = CompileContext::new();
    let s = sym(
        "s",
        Type::Struct {
            name: "pair".to_string(),
            members: vec![
                (
                    "a".to_string(),
                    Type::atomic(AtomicKind::Float, Variability::Uniform),
                ),
                ("b".to_string(), Type::uniform_int32()),
            ],
        },
    );
    let before = diagnostics::error_count();
    let module = compile(
        &g,
        stmt_list(vec![decl(
            &s,
            Some(brace(vec![uniform_float(1.0), uniform_i32(2)])),
        )]),
    );
    assert_eq!(diagnostics::error_count(), before);
    let f = func(&module);
    assert_eq!(
        f.count_insts(|i| matches!(i, Inst::ElementPtr { name, .. } if name == "element")),
        2
    );
}

#[test]
fn missing_initializer_stores_an_undefined_value() {
    let g = CompileContext::new();
    let x = sym("x", Type::uniform_int32());
    let module = compile(&g, stmt_list(vec![decl(&x, None)]));
    let f = func(&module);

    let stored_undef = f.insts().any(|i| match i {
        Inst::Store { value, .. } => {
            matches!(f.constant_of(*value), Some(Constant::Undef(_)))
        }
        _ => false,
    });
    assert!(stored_undef);
}

#[test]
fn declaration_records_varying_control_flow_depth() {
    let g = CompileContext::new();
    let top = sym("top", Type::varying_int32());
    let nested = sym("nested", Type::varying_int32());
    let body = stmt_list(vec![
        decl(&top, Some(varying_i32(&[0, 0, 0, 0, 0, 0, 0, 0]))),
        Box::new(Stmt::If(IfStmt::new(
            varying_test(),
            Some(stmt_list(vec![decl(
                &nested,
                Some(varying_i32(&[1, 1, 1, 1, 1, 1, 1, 1])),
            )])),
            None,
            false,
            &g,
            pos(),
        ))),
    ]);
    let _ = compile(&g, body);

    assert_eq!(top.varying_cf_depth.get(), 0);
    assert_eq!(nested.varying_cf_depth.get(), 1);
}
