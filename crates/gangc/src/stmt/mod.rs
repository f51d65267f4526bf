//! The statement tree and its three passes.
//!
//! Statements are a tagged variant; the four operations (`emit`,
//! `type_check`, `optimize`, `estimate_cost`) are total functions
//! dispatched on the tag. The mutation model is return-value
//! substitution: `type_check` and `optimize` consume the node and return
//! a (possibly new) replacement, or `None` when the subtree is rejected.
//! Parents store the returned value back into their child slot, so
//! rewrites stay tree-local and a rejection suppresses emission of just
//! that subtree while siblings keep getting checked.

pub mod assert_stmt;
pub mod break_continue;
pub mod control_flow;
pub mod decl;
pub mod print;
pub mod return_stmt;
pub mod safety;

use std::fmt;

use crate::ctx::FunctionEmitContext;
use crate::expr::Expr;
use crate::pos::SourcePos;
use crate::CompileContext;

pub use assert_stmt::AssertStmt;
pub use break_continue::{BreakStmt, ContinueStmt};
pub use control_flow::{DoStmt, ForStmt, IfStmt};
pub use decl::{DeclStmt, VariableDeclaration};
pub use print::PrintStmt;
pub use return_stmt::ReturnStmt;

/// A statement-tree node.
#[derive(Debug)]
pub enum Stmt {
    Expr(ExprStmt),
    Decl(DeclStmt),
    If(IfStmt),
    Do(DoStmt),
    For(ForStmt),
    Break(BreakStmt),
    Continue(ContinueStmt),
    Return(ReturnStmt),
    List(StmtList),
    Print(PrintStmt),
    Assert(AssertStmt),
}

impl Stmt {
    pub fn pos(&self) -> &SourcePos {
        match self {
            Stmt::Expr(s) => &s.pos,
            Stmt::Decl(s) => &s.pos,
            Stmt::If(s) => &s.pos,
            Stmt::Do(s) => &s.pos,
            Stmt::For(s) => &s.pos,
            Stmt::Break(s) => &s.pos,
            Stmt::Continue(s) => &s.pos,
            Stmt::Return(s) => &s.pos,
            Stmt::List(s) => &s.pos,
            Stmt::Print(s) => &s.pos,
            Stmt::Assert(s) => &s.pos,
        }
    }

    /// Emit code for this statement into `ctx`.
    pub fn emit(&self, ctx: &mut FunctionEmitContext) {
        match self {
            Stmt::Expr(s) => s.emit(ctx),
            Stmt::Decl(s) => s.emit(ctx),
            Stmt::If(s) => s.emit(ctx),
            Stmt::Do(s) => s.emit(ctx),
            Stmt::For(s) => s.emit(ctx),
            Stmt::Break(s) => s.emit(ctx),
            Stmt::Continue(s) => s.emit(ctx),
            Stmt::Return(s) => s.emit(ctx),
            Stmt::List(s) => s.emit(ctx),
            Stmt::Print(s) => s.emit(ctx),
            Stmt::Assert(s) => s.emit(ctx),
        }
    }

    /// Type-check this subtree, returning the replacement statement or
    /// `None` if the subtree is rejected.
    pub fn type_check(self: Box<Self>, g: &CompileContext) -> Option<Box<Stmt>> {
        let checked = match *self {
            Stmt::Expr(s) => Stmt::Expr(s.type_check(g)?),
            Stmt::Decl(s) => Stmt::Decl(s.type_check(g)?),
            Stmt::If(s) => Stmt::If(s.type_check(g)?),
            Stmt::Do(s) => Stmt::Do(s.type_check(g)?),
            Stmt::For(s) => Stmt::For(s.type_check(g)?),
            Stmt::Break(s) => Stmt::Break(s),
            Stmt::Continue(s) => Stmt::Continue(s),
            Stmt::Return(s) => Stmt::Return(s.type_check(g)?),
            Stmt::List(s) => Stmt::List(s.type_check(g)?),
            Stmt::Print(s) => Stmt::Print(s.type_check(g)?),
            Stmt::Assert(s) => Stmt::Assert(s.type_check(g)?),
        };
        Some(Box::new(checked))
    }

    /// Fold children and annotate declared constants.
    pub fn optimize(self: Box<Self>) -> Box<Stmt> {
        Box::new(match *self {
            Stmt::Expr(s) => Stmt::Expr(s.optimize()),
            Stmt::Decl(s) => Stmt::Decl(s.optimize()),
            Stmt::If(s) => Stmt::If(s.optimize()),
            Stmt::Do(s) => Stmt::Do(s.optimize()),
            Stmt::For(s) => Stmt::For(s.optimize()),
            Stmt::Break(s) => Stmt::Break(s),
            Stmt::Continue(s) => Stmt::Continue(s),
            Stmt::Return(s) => Stmt::Return(s.optimize()),
            Stmt::List(s) => Stmt::List(s.optimize()),
            Stmt::Print(s) => Stmt::Print(s.optimize()),
            Stmt::Assert(s) => Stmt::Assert(s.optimize()),
        })
    }

    /// Per-node cost heuristic used to gate lowering decisions.
    pub fn estimate_cost(&self) -> i32 {
        match self {
            Stmt::Expr(s) => s.estimate_cost(),
            Stmt::Decl(s) => s.estimate_cost(),
            Stmt::If(s) => s.estimate_cost(),
            Stmt::Do(s) => s.estimate_cost(),
            Stmt::For(s) => s.estimate_cost(),
            Stmt::Break(s) => s.estimate_cost(),
            Stmt::Continue(s) => s.estimate_cost(),
            Stmt::Return(s) => s.estimate_cost(),
            Stmt::List(s) => s.estimate_cost(),
            Stmt::Print(s) => s.estimate_cost(),
            Stmt::Assert(s) => s.estimate_cost(),
        }
    }

    /// Render the tree shape for debugging.
    pub fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let pad = " ".repeat(indent);
        match self {
            Stmt::Expr(_) => writeln!(f, "{}expr stmt", pad),
            Stmt::Decl(s) => {
                writeln!(f, "{}decl stmt:", pad)?;
                for v in &s.vars {
                    writeln!(f, "{}  {} ({})", pad, v.sym.name, v.sym.ty.borrow())?;
                }
                Ok(())
            }
            Stmt::If(s) => {
                writeln!(
                    f,
                    "{}if stmt{}",
                    pad,
                    if s.do_all_check { " (coherent)" } else { "" }
                )?;
                if let Some(t) = &s.true_stmts {
                    writeln!(f, "{}  true:", pad)?;
                    t.fmt_tree(f, indent + 4)?;
                }
                if let Some(e) = &s.false_stmts {
                    writeln!(f, "{}  false:", pad)?;
                    e.fmt_tree(f, indent + 4)?;
                }
                Ok(())
            }
            Stmt::Do(s) => {
                writeln!(
                    f,
                    "{}do stmt{}",
                    pad,
                    if s.do_coherent_check { " (coherent)" } else { "" }
                )?;
                if let Some(b) = &s.body {
                    b.fmt_tree(f, indent + 4)?;
                }
                Ok(())
            }
            Stmt::For(s) => {
                writeln!(
                    f,
                    "{}for stmt{}",
                    pad,
                    if s.do_coherent_check { " (coherent)" } else { "" }
                )?;
                if let Some(b) = &s.body {
                    b.fmt_tree(f, indent + 4)?;
                }
                Ok(())
            }
            Stmt::Break(s) => writeln!(
                f,
                "{}{}break stmt",
                pad,
                if s.do_coherence_check { "coherent " } else { "" }
            ),
            Stmt::Continue(s) => writeln!(
                f,
                "{}{}continue stmt",
                pad,
                if s.do_coherence_check { "coherent " } else { "" }
            ),
            Stmt::Return(s) => writeln!(
                f,
                "{}{}return stmt",
                pad,
                if s.do_coherence_check { "coherent " } else { "" }
            ),
            Stmt::List(s) => {
                writeln!(f, "{}stmt list:", pad)?;
                for child in &s.stmts {
                    child.fmt_tree(f, indent + 4)?;
                }
                Ok(())
            }
            Stmt::Print(s) => writeln!(f, "{}print stmt ({:?})", pad, s.format),
            Stmt::Assert(s) => writeln!(f, "{}assert stmt ({:?})", pad, s.message),
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_tree(f, 0)
    }
}

/// An expression evaluated for its side effects.
#[derive(Debug)]
pub struct ExprStmt {
    pub expr: Option<Box<Expr>>,
    pub pos: SourcePos,
}

impl ExprStmt {
    pub fn new(expr: Box<Expr>, pos: SourcePos) -> ExprStmt {
        ExprStmt {
            expr: Some(expr),
            pos,
        }
    }

    pub fn emit(&self, ctx: &mut FunctionEmitContext) {
        if ctx.current_basic_block().is_none() {
            return;
        }
        ctx.set_debug_pos(&self.pos);
        if let Some(e) = &self.expr {
            e.get_value(ctx);
        }
    }

    pub fn type_check(mut self, _g: &CompileContext) -> Option<ExprStmt> {
        self.expr = self.expr.and_then(|e| e.type_check());
        Some(self)
    }

    pub fn optimize(mut self) -> ExprStmt {
        self.expr = self.expr.map(|e| e.optimize());
        self
    }

    pub fn estimate_cost(&self) -> i32 {
        self.expr.as_ref().map_or(0, |e| e.estimate_cost())
    }
}

/// An ordered sequence of statements introducing a lexical scope.
#[derive(Debug)]
pub struct StmtList {
    pub stmts: Vec<Box<Stmt>>,
    pub pos: SourcePos,
}

impl StmtList {
    pub fn new(stmts: Vec<Box<Stmt>>, pos: SourcePos) -> StmtList {
        StmtList { stmts, pos }
    }

    pub fn emit(&self, ctx: &mut FunctionEmitContext) {
        if ctx.current_basic_block().is_none() {
            return;
        }
        ctx.start_scope();
        ctx.set_debug_pos(&self.pos);
        for s in &self.stmts {
            s.emit(ctx);
        }
        ctx.end_scope();
    }

    pub fn type_check(mut self, g: &CompileContext) -> Option<StmtList> {
        // rejected children drop out; their errors are already reported
        // and the remaining siblings still get checked
        self.stmts = self
            .stmts
            .into_iter()
            .filter_map(|s| s.type_check(g))
            .collect();
        Some(self)
    }

    pub fn optimize(mut self) -> StmtList {
        self.stmts = self.stmts.into_iter().map(|s| s.optimize()).collect();
        self
    }

    pub fn estimate_cost(&self) -> i32 {
        self.stmts.iter().map(|s| s.estimate_cost()).sum()
    }
}
