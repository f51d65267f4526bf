//! Conditional and loop statements: the mask-management core.
//!
//! An `if` over a uniform test is an ordinary two-way branch. An `if`
//! over a varying test picks one of three lowerings, from most to least
//! specific:
//!
//! 1. the full mask is *statically* all on (we are not inside any
//!    varying region): probe the test with `all`/`any` and run only the
//!    arms that actually have lanes;
//! 2. the source asked for the coherent form (`cif`): probe
//!    `all(full_mask)` at runtime and dispatch between the all-on path
//!    and the general mixed path;
//! 3. both arms are safe to run with every lane off and cheap enough:
//!    run both unconditionally under masked restriction, with no
//!    branches at all. Otherwise fall back to the mixed path, which
//!    guards each arm with an `any` probe.
//!
//! Loops follow the same pattern: a uniform test gives a scalar-style
//! loop, a varying test keeps a loop mask plus break/continue lane
//! accumulators, and the coherent forms (`cdo`/`cfor`) probe for an
//! all-on mask at the top of each iteration to run a fast body.

use crate::constants::{
    COST_UNIFORM_IF, COST_UNIFORM_LOOP, COST_VARYING_IF, COST_VARYING_LOOP,
    PREDICATE_SAFE_IF_STATEMENT_COST,
};
use crate::ctx::FunctionEmitContext;
use crate::diagnostics;
use crate::expr::Expr;
use crate::ir::{Constant, IrType, ValueId};
use crate::pos::SourcePos;
use crate::types::Type;
use crate::CompileContext;

use super::safety::{has_varying_break_or_continue, safe_to_run_with_all_lanes_off};
use super::Stmt;

/// Wrap `test` in a cast to the uniform or varying bool type, unless it
/// already has exactly that type (which keeps type checking idempotent).
pub(crate) fn cast_test_to_bool(test: Box<Expr>, uniform: bool) -> Box<Expr> {
    let to = if uniform {
        Type::uniform_bool()
    } else {
        Type::varying_bool()
    };
    if test.get_type().is_some_and(|t| t == to) {
        return test;
    }
    let pos = test.pos().clone();
    Box::new(Expr::Cast { to, expr: test, pos })
}

/// Emit the statements of one `if` arm. Arms that are not already
/// statement lists get their own lexical scope.
fn emit_if_statements(ctx: &mut FunctionEmitContext, stmts: Option<&Stmt>, note: &str) {
    let Some(stmts) = stmts else { return };
    let is_list = matches!(stmts, Stmt::List(_));
    if !is_list {
        ctx.start_scope();
    }
    ctx.add_instrumentation_point(note);
    stmts.emit(ctx);
    if !is_list {
        ctx.end_scope();
    }
}

/// An `if` statement, optionally in its coherent `cif` form.
#[derive(Debug)]
pub struct IfStmt {
    pub test: Option<Box<Expr>>,
    pub true_stmts: Option<Box<Stmt>>,
    pub false_stmts: Option<Box<Stmt>>,
    /// The source used `cif`: dispatch at runtime on `all(full_mask)`.
    pub do_all_check: bool,
    /// The test is varying, so arms need `any()` guards in the mixed
    /// lowering.
    pub do_any_check: bool,
    pub pos: SourcePos,
}

impl IfStmt {
    pub fn new(
        test: Box<Expr>,
        true_stmts: Option<Box<Stmt>>,
        false_stmts: Option<Box<Stmt>>,
        check_coherence: bool,
        g: &CompileContext,
        pos: SourcePos,
    ) -> IfStmt {
        let do_any_check = test.get_type().is_some_and(|t| t.is_varying());
        IfStmt {
            test: Some(test),
            true_stmts,
            false_stmts,
            do_all_check: check_coherence && !g.opt.disable_coherent_control_flow,
            do_any_check,
            pos,
        }
    }

    pub fn emit(&self, ctx: &mut FunctionEmitContext) {
        // Bail out on anything left null by earlier errors.
        if ctx.current_basic_block().is_none() {
            return;
        }
        let Some(test) = &self.test else { return };
        let Some(test_type) = test.get_type() else {
            return;
        };

        ctx.set_debug_pos(&self.pos);
        let is_uniform = test_type.is_uniform();

        let Some(test_value) = test.get_value(ctx) else {
            return;
        };

        if is_uniform {
            ctx.start_uniform_if();
            if self.do_all_check {
                diagnostics::warning(test.pos(), "uniform condition supplied to \"cif\" statement");
            }

            // Uniform tests are a plain two-way branch.
            let bthen = ctx.create_basic_block("if_then");
            let belse = ctx.create_basic_block("if_else");
            let bexit = ctx.create_basic_block("if_exit");

            ctx.cond_branch(bthen, belse, test_value);

            ctx.set_current_basic_block(bthen);
            emit_if_statements(ctx, self.true_stmts.as_deref(), "true");
            if ctx.current_basic_block().is_some() {
                ctx.branch(bexit);
            }

            ctx.set_current_basic_block(belse);
            emit_if_statements(ctx, self.false_stmts.as_deref(), "false");
            if ctx.current_basic_block().is_some() {
                ctx.branch(bexit);
            }

            ctx.set_current_basic_block(bexit);
            ctx.end_if();
        } else {
            self.emit_varying_if(ctx, test_value);
        }
    }

    /// Choose and emit one of the three varying lowerings.
    fn emit_varying_if(&self, ctx: &mut FunctionEmitContext, ltest: ValueId) {
        let old_mask = ctx.get_internal_mask();
        let full_mask = ctx.get_full_mask();
        if ctx.is_mask_all_on(full_mask) {
            // The mask is known all on at compile time.
            let bdone = ctx.create_basic_block("cif_done");
            self.emit_mask_all_on(ctx, ltest, bdone);
            ctx.set_current_basic_block(bdone);
        } else if self.do_all_check {
            // Runtime dispatch between the all-on and mixed paths.
            let b_all_on = ctx.create_basic_block("cif_mask_all");
            let b_mixed = ctx.create_basic_block("cif_mask_mixed");
            let bdone = ctx.create_basic_block("cif_done");

            let full = ctx.get_full_mask();
            let Some(mask_all_q) = ctx.all(full) else {
                return;
            };
            ctx.cond_branch(b_all_on, b_mixed, mask_all_q);

            ctx.set_current_basic_block(b_all_on);
            self.emit_mask_all_on(ctx, ltest, bdone);

            ctx.set_current_basic_block(b_mixed);
            self.emit_mask_mixed(ctx, old_mask, ltest, bdone);

            ctx.set_current_basic_block(bdone);
        } else if self.true_stmts.is_some() || self.false_stmts.is_some() {
            // When both arms are safe to run with every lane off and
            // cheap, predicated straight-line execution of both arms
            // beats probing which arms have live lanes. The safety check
            // keeps indexing like `if (i < n) a[i] = 0;` off this path:
            // the blend stores don't guard against all lanes being off.
            let arms_safe = self
                .true_stmts
                .as_deref()
                .map_or(true, safe_to_run_with_all_lanes_off)
                && self
                    .false_stmts
                    .as_deref()
                    .map_or(true, safe_to_run_with_all_lanes_off);
            let arms_cost = self.true_stmts.as_ref().map_or(0, |s| s.estimate_cost())
                + self.false_stmts.as_ref().map_or(0, |s| s.estimate_cost());

            if arms_safe && arms_cost < PREDICATE_SAFE_IF_STATEMENT_COST {
                ctx.start_varying_if(old_mask);
                self.emit_masked_true_and_false(ctx, old_mask, ltest);
                debug_assert!(ctx.current_basic_block().is_some());
                ctx.end_if();
            } else {
                let bdone = ctx.create_basic_block("if_done");
                self.emit_mask_mixed(ctx, old_mask, ltest, bdone);
                ctx.set_current_basic_block(bdone);
            }
        }
    }

    /// Lowering for the case where the mask entering the `if` is known
    /// all on: probe the test itself and run only the arms with lanes.
    fn emit_mask_all_on(&self, ctx: &mut FunctionEmitContext, ltest: ValueId, bdone: crate::ir::BlockId) {
        // Explicitly pin both masks to all-on. This doesn't change their
        // value; it lets everything emitted below see the fact statically.
        let all_on = ctx.mask_all_on();
        ctx.set_internal_mask(all_on);
        let old_function_mask = ctx.get_function_mask();
        ctx.set_function_mask(all_on);

        // All lanes want the true arm?
        let b_test_all = ctx.create_basic_block("cif_test_all");
        let b_test_none_check = ctx.create_basic_block("cif_test_none_check");
        let Some(test_all_q) = ctx.all(ltest) else {
            return;
        };
        ctx.cond_branch(b_test_all, b_test_none_check, test_all_q);

        ctx.set_current_basic_block(b_test_all);
        ctx.start_varying_if(all_on);
        emit_if_statements(ctx, self.true_stmts.as_deref(), "if: all on mask, expr all true");
        ctx.end_if();
        // The block may be gone: with all lanes following this path, a
        // return or break inside the arm legally ends emission.
        if ctx.current_basic_block().is_some() {
            ctx.branch(bdone);
        }

        // Not all true: distinguish all-false from mixed.
        ctx.set_current_basic_block(b_test_none_check);
        let b_test_none = ctx.create_basic_block("cif_test_none");
        let b_test_mixed = ctx.create_basic_block("cif_test_mixed");
        let Some(test_any_q) = ctx.any(ltest) else {
            return;
        };
        ctx.cond_branch(b_test_mixed, b_test_none, test_any_q);

        ctx.set_current_basic_block(b_test_none);
        ctx.start_varying_if(all_on);
        emit_if_statements(ctx, self.false_stmts.as_deref(), "if: all on mask, expr all false");
        ctx.end_if();
        if ctx.current_basic_block().is_some() {
            ctx.branch(bdone);
        }

        // Mixed lanes: unavoidably run both arms under masks.
        ctx.set_current_basic_block(b_test_mixed);
        ctx.start_varying_if(all_on);
        self.emit_masked_true_and_false(ctx, all_on, ltest);
        // Here return/break/continue may not end the block.
        debug_assert!(ctx.current_basic_block().is_some());
        ctx.end_if();
        ctx.branch(bdone);

        ctx.set_current_basic_block(bdone);
        ctx.set_function_mask(old_function_mask);
    }

    /// Lowering for an arbitrary (possibly mixed) entry mask: restrict
    /// the mask per arm and probe `any()` to jump over arms nobody wants.
    fn emit_mask_mixed(
        &self,
        ctx: &mut FunctionEmitContext,
        old_mask: ValueId,
        ltest: ValueId,
        bdone: crate::ir::BlockId,
    ) {
        ctx.start_varying_if(old_mask);
        let mut bnext = ctx.create_basic_block("safe_if_after_true");
        if self.true_stmts.is_some() {
            let b_run_true = ctx.create_basic_block("safe_if_run_true");
            ctx.set_internal_mask_and(old_mask, ltest);

            // Jump over the arm if no lane wants it.
            let full = ctx.get_full_mask();
            let Some(any_q) = ctx.any(full) else { return };
            ctx.cond_branch(b_run_true, bnext, any_q);

            ctx.set_current_basic_block(b_run_true);
            emit_if_statements(ctx, self.true_stmts.as_deref(), "if: expr mixed, true statements");
            // Under varying control flow returns can't end emission, so
            // the block is still live here.
            debug_assert!(ctx.current_basic_block().is_some());
            ctx.branch(bnext);
            ctx.set_current_basic_block(bnext);
        }
        if self.false_stmts.is_some() {
            let b_run_false = ctx.create_basic_block("safe_if_run_false");
            bnext = ctx.create_basic_block("safe_if_after_false");
            ctx.set_internal_mask_and_not(old_mask, ltest);

            let full = ctx.get_full_mask();
            let Some(any_q) = ctx.any(full) else { return };
            ctx.cond_branch(b_run_false, bnext, any_q);

            ctx.set_current_basic_block(b_run_false);
            emit_if_statements(
                ctx,
                self.false_stmts.as_deref(),
                "if: expr mixed, false statements",
            );
            debug_assert!(ctx.current_basic_block().is_some());
            ctx.branch(bnext);
            ctx.set_current_basic_block(bnext);
        }
        ctx.branch(bdone);
        ctx.set_current_basic_block(bdone);
        ctx.end_if();
    }

    /// Run both arms unconditionally with the mask restricted to
    /// `old_mask & test`, then `old_mask & !test`; no probes at all.
    fn emit_masked_true_and_false(
        &self,
        ctx: &mut FunctionEmitContext,
        old_mask: ValueId,
        ltest: ValueId,
    ) {
        if self.true_stmts.is_some() {
            ctx.set_internal_mask_and(old_mask, ltest);
            emit_if_statements(ctx, self.true_stmts.as_deref(), "if: expr mixed, true statements");
            debug_assert!(ctx.current_basic_block().is_some());
        }
        if self.false_stmts.is_some() {
            ctx.set_internal_mask_and_not(old_mask, ltest);
            emit_if_statements(
                ctx,
                self.false_stmts.as_deref(),
                "if: expr mixed, false statements",
            );
            debug_assert!(ctx.current_basic_block().is_some());
        }
    }

    pub fn type_check(mut self, g: &CompileContext) -> Option<IfStmt> {
        if let Some(test) = self.test.take() {
            match test.type_check() {
                None => {}
                Some(test) => {
                    if let Some(test_type) = test.get_type() {
                        if !test_type.is_numeric() && !test_type.is_bool() {
                            diagnostics::error(
                                test.pos(),
                                format!(
                                    "type \"{}\" can't be converted to boolean for \"if\" test",
                                    test_type
                                ),
                            );
                            return None;
                        }
                        let uniform =
                            test_type.is_uniform() && !g.opt.disable_uniform_control_flow;
                        self.test = Some(cast_test_to_bool(test, uniform));
                    } else {
                        self.test = Some(test);
                    }
                }
            }
        }
        self.true_stmts = self.true_stmts.and_then(|s| s.type_check(g));
        self.false_stmts = self.false_stmts.and_then(|s| s.type_check(g));
        Some(self)
    }

    pub fn optimize(mut self) -> IfStmt {
        self.test = self.test.map(|t| t.optimize());
        self.true_stmts = self.true_stmts.map(|s| s.optimize());
        self.false_stmts = self.false_stmts.map(|s| s.optimize());
        self
    }

    pub fn estimate_cost(&self) -> i32 {
        let mut if_cost = 0;
        if let Some(test) = &self.test {
            if let Some(ty) = test.get_type() {
                if_cost = if ty.is_uniform() {
                    COST_UNIFORM_IF
                } else {
                    COST_VARYING_IF
                };
            }
        }
        if_cost
            + self.test.as_ref().map_or(0, |t| t.estimate_cost())
            + self.true_stmts.as_ref().map_or(0, |s| s.estimate_cost())
            + self.false_stmts.as_ref().map_or(0, |s| s.estimate_cost())
    }
}

/// A `do`/`while` loop, optionally in its coherent `cdo` form.
#[derive(Debug)]
pub struct DoStmt {
    pub test: Option<Box<Expr>>,
    pub body: Option<Box<Stmt>>,
    pub do_coherent_check: bool,
    pub pos: SourcePos,
}

impl DoStmt {
    pub fn new(
        test: Box<Expr>,
        body: Option<Box<Stmt>>,
        check_coherence: bool,
        g: &CompileContext,
        pos: SourcePos,
    ) -> DoStmt {
        DoStmt {
            test: Some(test),
            body,
            do_coherent_check: check_coherence && !g.opt.disable_coherent_control_flow,
            pos,
        }
    }

    pub fn emit(&self, ctx: &mut FunctionEmitContext) {
        if ctx.current_basic_block().is_none() {
            return;
        }
        let Some(test) = &self.test else { return };
        let Some(test_type) = test.get_type() else {
            return;
        };

        let uniform_test = test_type.is_uniform();
        if uniform_test && self.do_coherent_check {
            diagnostics::warning(&self.pos, "uniform condition supplied to \"cdo\" statement");
        }

        let bloop = ctx.create_basic_block("do_loop");
        let bexit = ctx.create_basic_block("do_exit");
        let btest = ctx.create_basic_block("do_test");

        ctx.start_loop(bexit, btest, uniform_test);

        // Jump straight into the body; the test runs after it.
        ctx.branch(bloop);
        ctx.set_current_basic_block(bloop);
        ctx.set_loop_mask(ctx.get_internal_mask());
        ctx.set_debug_pos(&self.pos);

        let body_is_list = matches!(self.body.as_deref(), Some(Stmt::List(_)));
        if !body_is_list {
            ctx.start_scope();
        }

        ctx.add_instrumentation_point("do loop body");
        if self.do_coherent_check && !uniform_test {
            // Probe the mask at the top of each iteration; an all-on
            // iteration runs the body with both masks pinned all on.
            let loop_mask = ctx.get_internal_mask();
            let b_all_on = ctx.create_basic_block("do_all_on");
            let b_mixed = ctx.create_basic_block("do_mixed");
            ctx.branch_if_mask_all(b_all_on, b_mixed);

            ctx.set_current_basic_block(b_all_on);
            let all_on = ctx.mask_all_on();
            ctx.set_internal_mask(all_on);
            let old_function_mask = ctx.get_function_mask();
            ctx.set_function_mask(all_on);
            if let Some(body) = &self.body {
                body.emit(ctx);
            }
            debug_assert!(ctx.current_basic_block().is_some());
            ctx.set_function_mask(old_function_mask);
            ctx.branch(btest);

            // The all-on path pinned the internal mask; the mixed body
            // must run under the mask the loop was entered with.
            ctx.set_current_basic_block(b_mixed);
            ctx.set_internal_mask(loop_mask);
            if let Some(body) = &self.body {
                body.emit(ctx);
            }
            ctx.branch(btest);
        } else {
            if let Some(body) = &self.body {
                body.emit(ctx);
            }
            if ctx.current_basic_block().is_some() {
                ctx.branch(btest);
            }
        }
        if !body_is_list {
            ctx.end_scope();
        }

        ctx.set_current_basic_block(btest);
        // Lanes that executed `continue` this iteration rejoin before the
        // test. Uniform loops branch straight to the test and don't
        // touch the mask.
        if !uniform_test {
            ctx.restore_continued_lanes();
        }
        let Some(test_value) = test.get_value(ctx) else {
            // close the loop region even on the error path so the
            // builder stacks stay balanced
            ctx.set_current_basic_block(bexit);
            ctx.end_loop();
            return;
        };

        if uniform_test {
            ctx.cond_branch(bloop, bexit, test_value);
        } else {
            // Re-enter the loop iff any lane still passes the test.
            let mask = ctx.get_internal_mask();
            ctx.set_internal_mask_and(mask, test_value);
            ctx.branch_if_mask_any(bloop, bexit);
        }

        ctx.set_current_basic_block(bexit);
        ctx.end_loop();
    }

    pub fn type_check(mut self, g: &CompileContext) -> Option<DoStmt> {
        if let Some(test) = self.test.take() {
            match test.type_check() {
                None => {}
                Some(test) => {
                    if let Some(test_type) = test.get_type() {
                        if !test_type.is_numeric() && !test_type.is_bool() {
                            diagnostics::error(
                                test.pos(),
                                format!(
                                    "type \"{}\" can't be converted to boolean for \"while\" \
                                     test in \"do\" loop",
                                    test_type
                                ),
                            );
                            return None;
                        }
                        // The loop is uniform only if the test type is
                        // uniform, uniform control flow is enabled, and no
                        // break/continue in the body sits under a varying
                        // if. Otherwise the test is cast to varying so the
                        // loop tracks per-lane liveness.
                        let uniform = test_type.is_uniform()
                            && !g.opt.disable_uniform_control_flow
                            && !self
                                .body
                                .as_deref()
                                .is_some_and(has_varying_break_or_continue);
                        self.test = Some(cast_test_to_bool(test, uniform));
                    } else {
                        self.test = Some(test);
                    }
                }
            }
        }
        self.body = self.body.and_then(|b| b.type_check(g));
        Some(self)
    }

    pub fn optimize(mut self) -> DoStmt {
        self.test = self.test.map(|t| t.optimize());
        self.body = self.body.map(|b| b.optimize());
        self
    }

    pub fn estimate_cost(&self) -> i32 {
        self.test.as_ref().map_or(0, |t| t.estimate_cost())
            + self.body.as_ref().map_or(0, |s| s.estimate_cost())
    }
}

/// A `for` loop, optionally in its coherent `cfor` form.
#[derive(Debug)]
pub struct ForStmt {
    pub init: Option<Box<Stmt>>,
    pub test: Option<Box<Expr>>,
    pub step: Option<Box<Stmt>>,
    pub body: Option<Box<Stmt>>,
    pub do_coherent_check: bool,
    pub pos: SourcePos,
}

impl ForStmt {
    pub fn new(
        init: Option<Box<Stmt>>,
        test: Option<Box<Expr>>,
        step: Option<Box<Stmt>>,
        body: Option<Box<Stmt>>,
        check_coherence: bool,
        g: &CompileContext,
        pos: SourcePos,
    ) -> ForStmt {
        ForStmt {
            init,
            test,
            step,
            body,
            do_coherent_check: check_coherence && !g.opt.disable_coherent_control_flow,
            pos,
        }
    }

    fn uniform_test(&self, g: &CompileContext) -> bool {
        match &self.test {
            Some(test) => test.get_type().is_some_and(|t| t.is_uniform()),
            // A missing test is "true"; the loop is still uniform unless
            // a varying break/continue forces lane tracking.
            None => {
                !g.opt.disable_uniform_control_flow
                    && !self
                        .body
                        .as_deref()
                        .is_some_and(has_varying_break_or_continue)
            }
        }
    }

    pub fn emit(&self, ctx: &mut FunctionEmitContext) {
        if ctx.current_basic_block().is_none() {
            return;
        }

        let btest = ctx.create_basic_block("for_test");
        let bstep = ctx.create_basic_block("for_step");
        let bloop = ctx.create_basic_block("for_loop");
        let bexit = ctx.create_basic_block("for_exit");

        let uniform_test = self.uniform_test(ctx.g());

        ctx.start_loop(bexit, bstep, uniform_test);
        ctx.set_debug_pos(&self.pos);

        // The init gets its own scope: it may declare variables visible
        // to the test, step and body.
        if let Some(init) = &self.init {
            debug_assert!(!matches!(init.as_ref(), Stmt::List(_)));
            ctx.start_scope();
            init.emit(ctx);
        }
        ctx.branch(btest);

        ctx.set_current_basic_block(btest);
        let ltest = match &self.test {
            Some(test) => match test.get_value(ctx) {
                Some(v) => v,
                None => {
                    // close the regions opened above before bailing
                    if self.init.is_some() {
                        ctx.end_scope();
                    }
                    ctx.set_current_basic_block(bexit);
                    ctx.end_loop();
                    return;
                }
            },
            None => {
                if uniform_test {
                    ctx.constant(Constant::Bool(true), IrType::Bool)
                } else {
                    ctx.mask_all_on()
                }
            }
        };

        if uniform_test {
            if self.do_coherent_check {
                diagnostics::warning(&self.pos, "uniform condition supplied to \"cfor\" statement");
            }
            ctx.cond_branch(bloop, bexit, ltest);
        } else {
            let mask = ctx.get_internal_mask();
            ctx.set_internal_mask_and(mask, ltest);
            ctx.branch_if_mask_any(bloop, bexit);
        }

        ctx.set_current_basic_block(bloop);
        ctx.set_loop_mask(ctx.get_internal_mask());
        ctx.add_instrumentation_point("for loop body");
        let body_is_list = matches!(self.body.as_deref(), Some(Stmt::List(_)));
        if !body_is_list {
            ctx.start_scope();
        }

        if self.do_coherent_check && !uniform_test {
            // After the mask has been restricted by the test, probe it:
            // an all-on iteration runs scalar-style code.
            let loop_mask = ctx.get_internal_mask();
            let b_all_on = ctx.create_basic_block("for_all_on");
            let b_mixed = ctx.create_basic_block("for_mixed");
            ctx.branch_if_mask_all(b_all_on, b_mixed);

            ctx.set_current_basic_block(b_all_on);
            let all_on = ctx.mask_all_on();
            ctx.set_internal_mask(all_on);
            let old_function_mask = ctx.get_function_mask();
            ctx.set_function_mask(all_on);
            if let Some(body) = &self.body {
                body.emit(ctx);
            }
            debug_assert!(ctx.current_basic_block().is_some());
            ctx.set_function_mask(old_function_mask);
            ctx.branch(bstep);

            // The mixed body never runs with the mask all off thanks to
            // the any() probe at the test; it also must not inherit the
            // all-on mask pinned by the fast path, so put back the mask
            // the test produced.
            ctx.set_current_basic_block(b_mixed);
            ctx.set_internal_mask(loop_mask);
            if let Some(body) = &self.body {
                body.emit(ctx);
            }
            ctx.branch(bstep);
        } else {
            if let Some(body) = &self.body {
                body.emit(ctx);
            }
            if ctx.current_basic_block().is_some() {
                ctx.branch(bstep);
            }
        }
        if !body_is_list {
            ctx.end_scope();
        }

        // Step: first restore lanes parked by `continue`, then run the
        // step statement and head back to the test.
        ctx.set_current_basic_block(bstep);
        ctx.restore_continued_lanes();
        if let Some(step) = &self.step {
            step.emit(ctx);
        }
        ctx.branch(btest);

        ctx.set_current_basic_block(bexit);
        if self.init.is_some() {
            ctx.end_scope();
        }
        ctx.end_loop();
    }

    pub fn type_check(mut self, g: &CompileContext) -> Option<ForStmt> {
        if let Some(test) = self.test.take() {
            match test.type_check() {
                None => {}
                Some(test) => {
                    if let Some(test_type) = test.get_type() {
                        if !test_type.is_numeric() && !test_type.is_bool() {
                            diagnostics::error(
                                test.pos(),
                                format!(
                                    "type \"{}\" can't be converted to boolean for \"for\" \
                                     loop test",
                                    test_type
                                ),
                            );
                            return None;
                        }
                        // See DoStmt::type_check for the uniformity rule.
                        let uniform = test_type.is_uniform()
                            && !g.opt.disable_uniform_control_flow
                            && !self
                                .body
                                .as_deref()
                                .is_some_and(has_varying_break_or_continue);
                        self.test = Some(cast_test_to_bool(test, uniform));
                    } else {
                        self.test = Some(test);
                    }
                }
            }
        }
        self.init = self.init.and_then(|s| s.type_check(g));
        self.step = self.step.and_then(|s| s.type_check(g));
        self.body = self.body.and_then(|s| s.type_check(g));
        Some(self)
    }

    pub fn optimize(mut self) -> ForStmt {
        self.test = self.test.map(|t| t.optimize());
        self.init = self.init.map(|s| s.optimize());
        self.step = self.step.map(|s| s.optimize());
        self.body = self.body.map(|s| s.optimize());
        self
    }

    pub fn estimate_cost(&self) -> i32 {
        let uniform = match &self.test {
            Some(test) => test.get_type().is_some_and(|t| t.is_uniform()),
            None => !self
                .body
                .as_deref()
                .is_some_and(has_varying_break_or_continue),
        };
        self.init.as_ref().map_or(0, |s| s.estimate_cost())
            + self.test.as_ref().map_or(0, |t| t.estimate_cost())
            + self.step.as_ref().map_or(0, |s| s.estimate_cost())
            + self.body.as_ref().map_or(0, |s| s.estimate_cost())
            + if uniform {
                COST_UNIFORM_LOOP
            } else {
                COST_VARYING_LOOP
            }
    }
}
