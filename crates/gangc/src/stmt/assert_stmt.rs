//! `assert` statements: runtime glue around `__do_assert_uniform` and
//! `__do_assert_varying`.

use crate::constants::COST_ASSERT;
use crate::ctx::FunctionEmitContext;
use crate::diagnostics;
use crate::expr::Expr;
use crate::ir::IrType;
use crate::pos::SourcePos;
use crate::CompileContext;

use super::control_flow::cast_test_to_bool;

/// An `assert`: a message plus a predicate of either variability. The
/// runtime helper receives the full mask so that a varying assert only
/// reports lanes that are actually live; an assert is never safe to run
/// with all lanes off for exactly that reason.
#[derive(Debug)]
pub struct AssertStmt {
    pub message: String,
    pub expr: Option<Box<Expr>>,
    pub pos: SourcePos,
}

impl AssertStmt {
    pub fn new(message: impl Into<String>, expr: Box<Expr>, pos: SourcePos) -> AssertStmt {
        AssertStmt {
            message: message.into(),
            expr: Some(expr),
            pos,
        }
    }

    pub fn emit(&self, ctx: &mut FunctionEmitContext) {
        let Some(expr) = &self.expr else { return };
        let Some(ty) = expr.get_type() else { return };
        let is_uniform = ty.is_uniform();

        // The check-and-report logic lives in the runtime.
        let assert_fn = if is_uniform {
            "__do_assert_uniform"
        } else {
            "__do_assert_varying"
        };

        let error_string = format!(
            "{}:{}:{}: Assertion failed: {}\n",
            self.pos.name, self.pos.line, self.pos.column, self.message
        );
        let msg = ctx.string_ptr(&error_string);
        let Some(cond) = expr.get_value(ctx) else {
            return;
        };
        let full = ctx.get_full_mask();
        ctx.call(assert_fn, vec![msg, cond, full], IrType::Void);
    }

    pub fn type_check(mut self, _g: &CompileContext) -> Option<AssertStmt> {
        if let Some(expr) = self.expr.take() {
            match expr.type_check() {
                None => {}
                Some(expr) => {
                    if let Some(ty) = expr.get_type() {
                        if !ty.is_numeric() && !ty.is_bool() {
                            diagnostics::error(
                                expr.pos(),
                                format!(
                                    "type \"{}\" can't be converted to boolean for \"assert\"",
                                    ty
                                ),
                            );
                            return None;
                        }
                        // The predicate keeps its variability.
                        self.expr = Some(cast_test_to_bool(expr, ty.is_uniform()));
                    } else {
                        self.expr = Some(expr);
                    }
                }
            }
        }
        Some(self)
    }

    pub fn optimize(mut self) -> AssertStmt {
        self.expr = self.expr.map(|e| e.optimize());
        self
    }

    pub fn estimate_cost(&self) -> i32 {
        self.expr.as_ref().map_or(0, |e| e.estimate_cost()) + COST_ASSERT
    }
}
