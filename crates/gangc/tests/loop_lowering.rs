//! Loop lowering: uniform loops, varying loops with lane bookkeeping,
//! coherent iteration dispatch, and structured break/continue.

mod common;

use common::*;
use gangc::diagnostics;
use gangc::ir::{BinOp, Inst, Terminator};
use gangc::stmt::{BreakStmt, ContinueStmt, DoStmt, ForStmt, IfStmt, Stmt};
use gangc::types::Type;
use gangc::CompileContext;

#[test]
fn uniform_for_loop_has_no_lane_bookkeeping() {
    let g = CompileContext::new();
    let body = stmt_list(vec![Box::new(Stmt::For(ForStmt::new(
        None,
        Some(uniform_bool(true)),
        None,
        Some(stmt_list(vec![])),
        false,
        &g,
        pos(),
    )))]);
    let module = compile(&g, body);
    let f = func(&module);

    assert!(has_block(f, "for_test"));
    assert!(has_block(f, "for_step"));
    assert!(has_block(f, "for_loop"));
    assert!(has_block(f, "for_exit"));
    assert!(!has_alloca(f, "break_lanes"));
    assert!(!has_alloca(f, "continue_lanes"));
    assert_eq!(count_all_probes(f), 0);
    assert_eq!(count_any_probes(f), 0);
}

#[test]
fn varying_do_loop_tracks_lanes_and_restores_continues() {
    let g = CompileContext::new();
    let body = stmt_list(vec![Box::new(Stmt::Do(DoStmt::new(
        varying_test(),
        Some(stmt_list(vec![])),
        false,
        &g,
        pos(),
    )))]);
    let module = compile(&g, body);
    let f = func(&module);

    assert!(has_block(f, "do_loop"));
    assert!(has_block(f, "do_test"));
    assert!(has_block(f, "do_exit"));
    assert!(has_alloca(f, "break_lanes"));
    assert!(has_alloca(f, "continue_lanes"));
    // loop re-entry is gated on any(mask & test)
    assert!(count_any_probes(f) >= 1);
    // continue-lane restoration ors the parked lanes back in
    assert!(f
        .insts()
        .any(|i| matches!(i, Inst::Bin { op: BinOp::Or, .. })));
}

#[test]
fn varying_break_demotes_loop_and_emits_lane_accumulation() {
    let g = CompileContext::new();
    // for (;uniform;) { if (varying) break; } -- promoted to varying
    let loop_body = stmt_list(vec![Box::new(Stmt::If(IfStmt::new(
        varying_test(),
        Some(Box::new(Stmt::Break(BreakStmt::new(false, &g, pos())))),
        None,
        false,
        &g,
        pos(),
    )))]);
    let body = stmt_list(vec![Box::new(Stmt::For(ForStmt::new(
        None,
        Some(uniform_bool(true)),
        None,
        Some(loop_body),
        false,
        &g,
        pos(),
    )))]);
    let module = compile(&g, body);
    let f = func(&module);

    // the promoted loop carries full lane bookkeeping
    assert!(has_alloca(f, "break_lanes"));
    assert!(has_alloca(f, "continue_lanes"));
    // the break accumulates the breaking lanes instead of branching
    assert!(f
        .insts()
        .any(|i| matches!(i, Inst::Bin { op: BinOp::Or, .. })));
    assert!(count_any_probes(f) >= 1);
}

#[test]
fn uniform_break_is_a_direct_branch_to_the_exit() {
    let g = CompileContext::new();
    let body = stmt_list(vec![Box::new(Stmt::For(ForStmt::new(
        None,
        Some(uniform_bool(true)),
        None,
        Some(stmt_list(vec![Box::new(Stmt::Break(BreakStmt::new(
            false,
            &g,
            pos(),
        )))])),
        false,
        &g,
        pos(),
    )))]);
    let module = compile(&g, body);
    let f = func(&module);

    let loop_block = f
        .blocks
        .iter()
        .find(|b| b.name == "for_loop")
        .expect("loop body block");
    match &loop_block.term {
        Some(Terminator::Br(target)) => {
            assert_eq!(f.blocks[target.index()].name, "for_exit");
        }
        other => panic!("expected direct branch to the exit, got {:?}", other),
    }
}

#[test]
fn uniform_continue_branches_to_the_step_block() {
    let g = CompileContext::new();
    let body = stmt_list(vec![Box::new(Stmt::For(ForStmt::new(
        None,
        Some(uniform_bool(true)),
        None,
        Some(stmt_list(vec![Box::new(Stmt::Continue(ContinueStmt::new(
            false,
            &g,
            pos(),
        )))])),
        false,
        &g,
        pos(),
    )))]);
    let module = compile(&g, body);
    let f = func(&module);

    let loop_block = f
        .blocks
        .iter()
        .find(|b| b.name == "for_loop")
        .expect("loop body block");
    match &loop_block.term {
        Some(Terminator::Br(target)) => {
            assert_eq!(f.blocks[target.index()].name, "for_step");
        }
        other => panic!("expected direct branch to the step, got {:?}", other),
    }
}

#[test]
fn coherent_varying_do_loop_dispatches_per_iteration() {
    let g = CompileContext::new();
    let x = sym("x", Type::varying_int32());
    let loop_body = stmt_list(vec![assign(
        sym_ref(&x),
        varying_i32(&[1, 1, 1, 1, 1, 1, 1, 1]),
    )]);
    let body = stmt_list(vec![
        decl(&x, Some(varying_i32(&[0, 0, 0, 0, 0, 0, 0, 0]))),
        Box::new(Stmt::Do(DoStmt::new(
            varying_test(),
            Some(loop_body),
            true,
            &g,
            pos(),
        ))),
    ]);
    let module = compile_in_varying_region(&g, body);
    let f = func(&module);

    assert!(has_block(f, "do_all_on"));
    assert!(has_block(f, "do_mixed"));
    assert!(count_all_probes(f) >= 1);

    // the all-on iteration runs scalar-style: its store is unmasked
    let all_on = block(f, "do_all_on");
    assert_eq!(count_selects_in(all_on), 0);
    assert!(count_stores_in(all_on) >= 1);
    // the mixed iteration blends the varying store under the mask the
    // loop was entered with, not the all-on value of the fast path
    let mixed = block(f, "do_mixed");
    assert_eq!(count_selects_in(mixed), 1);
    assert!(count_stores_in(mixed) >= 1);
}

#[test]
fn coherent_varying_for_loop_dispatches_per_iteration() {
    let g = CompileContext::new();
    let x = sym("x", Type::varying_int32());
    let loop_body = stmt_list(vec![assign(
        sym_ref(&x),
        varying_i32(&[2, 2, 2, 2, 2, 2, 2, 2]),
    )]);
    let body = stmt_list(vec![
        decl(&x, Some(varying_i32(&[0, 0, 0, 0, 0, 0, 0, 0]))),
        Box::new(Stmt::For(ForStmt::new(
            None,
            Some(varying_test()),
            None,
            Some(loop_body),
            true,
            &g,
            pos(),
        ))),
    ]);
    let module = compile_in_varying_region(&g, body);
    let f = func(&module);

    assert!(has_block(f, "for_all_on"));
    assert!(has_block(f, "for_mixed"));
    assert!(count_all_probes(f) >= 1);

    let all_on = block(f, "for_all_on");
    assert_eq!(count_selects_in(all_on), 0);
    assert!(count_stores_in(all_on) >= 1);
    let mixed = block(f, "for_mixed");
    assert_eq!(count_selects_in(mixed), 1);
    assert!(count_stores_in(mixed) >= 1);
}

#[test]
fn cfor_over_uniform_test_warns() {
    let _quiet = diagnostics::suppress();
    let g = CompileContext::new();
    let before = diagnostics::warning_count();
    let body = stmt_list(vec![Box::new(Stmt::For(ForStmt::new(
        None,
        Some(uniform_bool(true)),
        None,
        Some(stmt_list(vec![])),
        true,
        &g,
        pos(),
    )))]);
    let _ = compile(&g, body);
    assert_eq!(diagnostics::warning_count(), before + 1);
}

#[test]
fn cdo_over_uniform_test_warns() {
    let _quiet = diagnostics::suppress();
    let g = CompileContext::new();
    let before = diagnostics::warning_count();
    let body = stmt_list(vec![Box::new(Stmt::Do(DoStmt::new(
        uniform_bool(false),
        Some(stmt_list(vec![])),
        true,
        &g,
        pos(),
    )))]);
    let _ = compile(&g, body);
    assert_eq!(diagnostics::warning_count(), before + 1);
}

#[test]
fn coherent_break_probes_for_empty_loop_mask() {
    let g = CompileContext::new();
    // do { if (varying) cbreak; } while (varying)
    let loop_body = stmt_list(vec![Box::new(Stmt::If(IfStmt::new(
        varying_test(),
        Some(Box::new(Stmt::Break(BreakStmt::new(true, &g, pos())))),
        None,
        false,
        &g,
        pos(),
    )))]);
    let body = stmt_list(vec![Box::new(Stmt::Do(DoStmt::new(
        varying_test(),
        Some(loop_body),
        false,
        &g,
        pos(),
    )))]);
    let module = compile(&g, body);
    let f = func(&module);

    assert!(has_block(f, "coherent_jump_not_done"));
}

#[test]
fn for_loop_without_test_is_uniform_unless_promoted() {
    let g = CompileContext::new();
    let body = stmt_list(vec![Box::new(Stmt::For(ForStmt::new(
        None,
        None,
        None,
        Some(stmt_list(vec![Box::new(Stmt::Break(BreakStmt::new(
            false,
            &g,
            pos(),
        )))])),
        false,
        &g,
        pos(),
    )))]);
    let module = compile(&g, body);
    let f = func(&module);
    assert!(!has_alloca(f, "break_lanes"));

    // with a varying-controlled break it is promoted even without a test
    let promoted_body = stmt_list(vec![Box::new(Stmt::For(ForStmt::new(
        None,
        None,
        None,
        Some(stmt_list(vec![Box::new(Stmt::If(IfStmt::new(
            varying_test(),
            Some(Box::new(Stmt::Break(BreakStmt::new(false, &g, pos())))),
            None,
            false,
            &g,
            pos(),
        )))])),
        false,
        &g,
        pos(),
    )))]);
    let module = compile(&g, promoted_body);
    let f = func(&module);
    assert!(has_alloca(f, "break_lanes"));
}
