//! Shared builders for the statement-lowering tests: tiny constructors
//! for expressions, symbols and statements, plus harnesses that drive a
//! tree through type-check, optimize and emit and hand back the module
//! for inspection.
#![allow(dead_code)]

use std::rc::Rc;

use gangc::ctx::FunctionEmitContext;
use gangc::expr::{BinaryOp, ConstExpr, ConstScalar, Expr};
use gangc::ir;
use gangc::pos::SourcePos;
use gangc::stmt::{DeclStmt, ExprStmt, Stmt, StmtList, VariableDeclaration};
use gangc::sym::Symbol;
use gangc::types::{AtomicKind, Type, Variability};
use gangc::CompileContext;

pub fn pos() -> SourcePos {
    SourcePos::new("test.gang", 1, 1)
}

pub fn uniform_i32(v: i32) -> Box<Expr> {
    Box::new(Expr::Const(ConstExpr::uniform_i32(v, pos())))
}

pub fn varying_i32(vals: &[i32]) -> Box<Expr> {
    Box::new(Expr::Const(ConstExpr::varying_i32(vals, pos())))
}

pub fn uniform_bool(v: bool) -> Box<Expr> {
    Box::new(Expr::Const(ConstExpr::uniform_bool(v, pos())))
}

pub fn uniform_float(v: f32) -> Box<Expr> {
    Box::new(Expr::Const(ConstExpr::uniform_float(v, pos())))
}

pub fn uniform_double(v: f64) -> Box<Expr> {
    Box::new(Expr::Const(ConstExpr::uniform_double(v, pos())))
}

/// A varying constant of an arbitrary atomic kind, splatting one value.
pub fn varying_const(kind: AtomicKind, value: i64) -> Box<Expr> {
    Box::new(Expr::Const(ConstExpr {
        ty: Type::atomic(kind, Variability::Varying),
        values: vec![ConstScalar::SInt(value)],
        pos: pos(),
    }))
}

/// An eight-wide varying i32 ramp compared against a splat: a varying
/// bool expression whose value is not statically known.
pub fn varying_test() -> Box<Expr> {
    Box::new(Expr::Binary {
        op: BinaryOp::Lt,
        left: varying_i32(&[0, 1, 2, 3, 4, 5, 6, 7]),
        right: varying_i32(&[4, 4, 4, 4, 4, 4, 4, 4]),
        pos: pos(),
    })
}

pub fn sym(name: &str, ty: Type) -> Rc<Symbol> {
    Symbol::auto(name, ty, pos())
}

pub fn sym_ref(s: &Rc<Symbol>) -> Box<Expr> {
    Box::new(Expr::Symbol {
        sym: s.clone(),
        pos: pos(),
    })
}

pub fn assign(lvalue: Box<Expr>, rvalue: Box<Expr>) -> Box<Stmt> {
    Box::new(Stmt::Expr(ExprStmt::new(
        Box::new(Expr::Assign {
            lvalue,
            rvalue,
            pos: pos(),
        }),
        pos(),
    )))
}

pub fn expr_stmt(e: Box<Expr>) -> Box<Stmt> {
    Box::new(Stmt::Expr(ExprStmt::new(e, pos())))
}

pub fn stmt_list(stmts: Vec<Box<Stmt>>) -> Box<Stmt> {
    Box::new(Stmt::List(StmtList::new(stmts, pos())))
}

pub fn decl(s: &Rc<Symbol>, init: Option<Box<Expr>>) -> Box<Stmt> {
    Box::new(Stmt::Decl(DeclStmt::new(
        vec![VariableDeclaration::new(s.clone(), init)],
        pos(),
    )))
}

pub fn call(name: &str) -> Box<Expr> {
    Box::new(Expr::Call {
        callee: Box::new(Expr::FunctionSymbol {
            name: name.to_string(),
            ret_type: Type::uniform_int32(),
            pos: pos(),
        }),
        args: Vec::new(),
        pos: pos(),
    })
}

/// Run all three passes over `body` as the body of a void function and
/// return the module.
pub fn compile(g: &CompileContext, body: Box<Stmt>) -> ir::Module {
    let mut module = ir::Module::new();
    let body = body.type_check(g).expect("type check");
    let body = body.optimize();
    let mut ctx = FunctionEmitContext::new(g, &mut module, "test_fn", ir::IrType::Void);
    body.emit(&mut ctx);
    ctx.finish();
    module
}

/// Like [`compile`], but emits the body inside a varying-if region whose
/// mask is a runtime value, so the full mask is not statically all on.
pub fn compile_in_varying_region(g: &CompileContext, body: Box<Stmt>) -> ir::Module {
    let mut module = ir::Module::new();
    let body = body.type_check(g).expect("type check");
    let body = body.optimize();
    let mut ctx = FunctionEmitContext::new(g, &mut module, "test_fn", ir::IrType::Void);
    let mask = varying_test().get_value(&mut ctx).expect("region mask");
    let old = ctx.get_internal_mask();
    ctx.start_varying_if(old);
    ctx.set_internal_mask(mask);
    body.emit(&mut ctx);
    ctx.end_if();
    ctx.finish();
    module
}

pub fn func(module: &ir::Module) -> &ir::Function {
    module.find_function("test_fn").expect("emitted function")
}

pub fn has_block(f: &ir::Function, name: &str) -> bool {
    f.blocks.iter().any(|b| b.name == name)
}

pub fn block<'f>(f: &'f ir::Function, name: &str) -> &'f ir::Block {
    f.blocks
        .iter()
        .find(|b| b.name == name)
        .unwrap_or_else(|| panic!("no block named {}", name))
}

pub fn count_selects_in(b: &ir::Block) -> usize {
    b.insts
        .iter()
        .filter(|(_, i)| matches!(i, ir::Inst::Select { .. }))
        .count()
}

pub fn count_stores_in(b: &ir::Block) -> usize {
    b.insts
        .iter()
        .filter(|(_, i)| matches!(i, ir::Inst::Store { .. }))
        .count()
}

pub fn count_all_probes(f: &ir::Function) -> usize {
    f.count_insts(|i| matches!(i, ir::Inst::All { .. }))
}

pub fn count_any_probes(f: &ir::Function) -> usize {
    f.count_insts(|i| matches!(i, ir::Inst::Any { .. }))
}

pub fn count_selects(f: &ir::Function) -> usize {
    f.count_insts(|i| matches!(i, ir::Inst::Select { .. }))
}

pub fn has_alloca(f: &ir::Function, name: &str) -> bool {
    f.insts()
        .any(|i| matches!(i, ir::Inst::Alloca { name: n, .. } if n == name))
}

pub fn count_allocas(f: &ir::Function, name: &str) -> usize {
    f.count_insts(|i| matches!(i, ir::Inst::Alloca { name: n, .. } if n == name))
}
