//! `break` and `continue`, plus their coherent forms.
//!
//! Both delegate to the emit context's structured-jump primitives: in a
//! uniform loop they are direct branches; in a varying loop the jumping
//! lanes are accumulated and masked out, and the coherent forms probe
//! for the loop going empty to leave early.

use crate::constants::{COST_COHERENT_BREAK_CONTINUE, COST_REGULAR_BREAK_CONTINUE};
use crate::ctx::FunctionEmitContext;
use crate::pos::SourcePos;
use crate::CompileContext;

#[derive(Debug)]
pub struct BreakStmt {
    pub do_coherence_check: bool,
    pub pos: SourcePos,
}

impl BreakStmt {
    pub fn new(check_coherence: bool, g: &CompileContext, pos: SourcePos) -> BreakStmt {
        BreakStmt {
            do_coherence_check: check_coherence && !g.opt.disable_coherent_control_flow,
            pos,
        }
    }

    pub fn emit(&self, ctx: &mut FunctionEmitContext) {
        if ctx.current_basic_block().is_none() {
            return;
        }
        ctx.set_debug_pos(&self.pos);
        ctx.break_lanes(self.do_coherence_check);
    }

    pub fn estimate_cost(&self) -> i32 {
        if self.do_coherence_check {
            COST_COHERENT_BREAK_CONTINUE
        } else {
            COST_REGULAR_BREAK_CONTINUE
        }
    }
}

#[derive(Debug)]
pub struct ContinueStmt {
    pub do_coherence_check: bool,
    pub pos: SourcePos,
}

impl ContinueStmt {
    pub fn new(check_coherence: bool, g: &CompileContext, pos: SourcePos) -> ContinueStmt {
        ContinueStmt {
            do_coherence_check: check_coherence && !g.opt.disable_coherent_control_flow,
            pos,
        }
    }

    pub fn emit(&self, ctx: &mut FunctionEmitContext) {
        if ctx.current_basic_block().is_none() {
            return;
        }
        ctx.set_debug_pos(&self.pos);
        ctx.continue_lanes(self.do_coherence_check);
    }

    pub fn estimate_cost(&self) -> i32 {
        if self.do_coherence_check {
            COST_COHERENT_BREAK_CONTINUE
        } else {
            COST_REGULAR_BREAK_CONTINUE
        }
    }
}
