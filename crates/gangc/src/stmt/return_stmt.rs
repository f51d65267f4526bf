//! `return` and its coherent `creturn` form.

use crate::constants::COST_RETURN;
use crate::ctx::FunctionEmitContext;
use crate::expr::Expr;
use crate::pos::SourcePos;
use crate::CompileContext;

/// A `return` statement marks the currently-running lanes as returned.
/// Under varying control flow the rest of the gang keeps executing, so
/// emission of the enclosing block continues; the builder only ends the
/// block when every lane is known to be following the return.
#[derive(Debug)]
pub struct ReturnStmt {
    pub value: Option<Box<Expr>>,
    pub do_coherence_check: bool,
    pub pos: SourcePos,
}

impl ReturnStmt {
    pub fn new(
        value: Option<Box<Expr>>,
        check_coherence: bool,
        g: &CompileContext,
        pos: SourcePos,
    ) -> ReturnStmt {
        ReturnStmt {
            value,
            do_coherence_check: check_coherence && !g.opt.disable_coherent_control_flow,
            pos,
        }
    }

    pub fn emit(&self, ctx: &mut FunctionEmitContext) {
        if ctx.current_basic_block().is_none() {
            return;
        }
        ctx.set_debug_pos(&self.pos);
        ctx.current_lanes_returned(self.value.as_deref(), self.do_coherence_check);
    }

    pub fn type_check(mut self, _g: &CompileContext) -> Option<ReturnStmt> {
        self.value = self.value.and_then(|v| v.type_check());
        Some(self)
    }

    pub fn optimize(mut self) -> ReturnStmt {
        self.value = self.value.map(|v| v.optimize());
        self
    }

    pub fn estimate_cost(&self) -> i32 {
        COST_RETURN + self.value.as_ref().map_or(0, |v| v.estimate_cost())
    }
}
