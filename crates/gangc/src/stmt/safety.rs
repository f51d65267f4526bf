//! Conservative analyses backing the lowering decisions.
//!
//! [`safe_to_run_with_all_lanes_off`] answers whether executing a
//! statement with the execution mask entirely off is free of observable
//! effects and undefined behavior; it gates the predicated straight-line
//! lowering of varying `if` statements.
//!
//! [`has_varying_break_or_continue`] detects `break`/`continue`
//! statements reachable under varying control flow inside a loop body;
//! such a loop must track per-lane liveness even when its own test is
//! uniform.
//!
//! Both matches are exhaustive over the statement and expression
//! variants, so adding a variant forces a decision here rather than a
//! silent (and wrong) default.

use crate::diagnostics;
use crate::expr::Expr;
use crate::types::Type;

use super::Stmt;

/// Is it safe to execute `stmt` even if no lane is active?
pub fn safe_to_run_with_all_lanes_off(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Expr(s) => expr_safe_opt(s.expr.as_deref()),
        Stmt::Decl(s) => s.vars.iter().all(|v| expr_safe_opt(v.init.as_deref())),
        Stmt::If(s) => {
            expr_safe_opt(s.test.as_deref())
                && stmt_safe_opt(s.true_stmts.as_deref())
                && stmt_safe_opt(s.false_stmts.as_deref())
        }
        Stmt::Do(s) => expr_safe_opt(s.test.as_deref()) && stmt_safe_opt(s.body.as_deref()),
        Stmt::For(s) => {
            stmt_safe_opt(s.init.as_deref())
                && expr_safe_opt(s.test.as_deref())
                && stmt_safe_opt(s.step.as_deref())
                && stmt_safe_opt(s.body.as_deref())
        }
        Stmt::Break(_) | Stmt::Continue(_) => true,
        Stmt::Return(s) => expr_safe_opt(s.value.as_deref()),
        Stmt::List(s) => s.stmts.iter().all(|c| safe_to_run_with_all_lanes_off(c)),
        Stmt::Print(s) => expr_safe_opt(s.values.as_deref()),
        // An assert would report spurious failures for lanes that are
        // not actually running, uniform predicate or not.
        Stmt::Assert(_) => false,
    }
}

fn stmt_safe_opt(stmt: Option<&Stmt>) -> bool {
    stmt.map_or(true, safe_to_run_with_all_lanes_off)
}

fn expr_safe_opt(expr: Option<&Expr>) -> bool {
    expr.is_some_and(expr_safe)
}

/// Expression counterpart of the safety analysis.
fn expr_safe(expr: &Expr) -> bool {
    match expr {
        Expr::Unary { operand, .. } => expr_safe(operand),
        Expr::Binary { left, right, .. } => expr_safe(left) && expr_safe(right),
        Expr::Assign { lvalue, rvalue, .. } => expr_safe(lvalue) && expr_safe(rvalue),
        Expr::Select {
            test,
            on_true,
            on_false,
            ..
        } => expr_safe(test) && expr_safe(on_true) && expr_safe(on_false),
        Expr::List { exprs, .. } => exprs.iter().all(expr_safe),
        // Calls could be safe if the callee were known pure, but we
        // can't see through the call, so: no.
        Expr::Call { .. } => false,
        Expr::Index { base, index, .. } => {
            // Indexing is safe only when the indexed object has a
            // statically known element count and every index in the
            // constant index vector is in bounds; a blend store through
            // an out-of-bounds lane would still fault.
            let Some(mut ty) = base.get_type() else {
                return false;
            };
            let Expr::Const(ce) = index.as_ref() else {
                return false;
            };
            if let Some(target) = ty.reference_target() {
                ty = target.clone();
            }
            let count = match &ty {
                Type::Array { count, .. } | Type::Vector { count, .. } => *count,
                _ => diagnostics::fatal("unexpected indexed type in all-lanes-off analysis"),
            };
            if count == 0 {
                // unsized array, so no bound to check against
                return false;
            }
            ce.as_i32_values()
                .iter()
                .all(|&i| i >= 0 && (i as usize) < count)
        }
        Expr::Member { base, .. } => expr_safe(base),
        Expr::Const(_) => true,
        Expr::Cast { expr, .. } => expr_safe(expr),
        Expr::Reference { expr, .. } => expr_safe(expr),
        Expr::Dereference { expr, .. } => expr_safe(expr),
        Expr::Symbol { .. } | Expr::FunctionSymbol { .. } | Expr::Sync { .. } => true,
    }
}

/// Does `stmt` contain a `break` or `continue` that can execute under
/// varying control flow?
///
/// The walk tracks whether the current point sits under an `if` with a
/// varying test. It deliberately does not descend into nested `do`/`for`
/// loops: a break inside a nested loop targets that loop and has no
/// bearing on this one's mask management.
pub fn has_varying_break_or_continue(stmt: &Stmt) -> bool {
    walk(stmt, false)
}

fn walk(stmt: &Stmt, in_varying_cf: bool) -> bool {
    match stmt {
        Stmt::List(sl) => sl.stmts.iter().any(|s| walk(s, in_varying_cf)),
        Stmt::If(is) => {
            let mut varying = in_varying_cf;
            if let Some(test) = &is.test {
                if let Some(ty) = test.get_type() {
                    varying |= ty.is_varying();
                }
            }
            is.true_stmts.as_deref().is_some_and(|s| walk(s, varying))
                || is.false_stmts.as_deref().is_some_and(|s| walk(s, varying))
        }
        Stmt::Break(_) | Stmt::Continue(_) => in_varying_cf,
        // Breaks and continues inside nested loops belong to them.
        Stmt::Do(_) | Stmt::For(_) => false,
        Stmt::Expr(_)
        | Stmt::Decl(_)
        | Stmt::Return(_)
        | Stmt::Print(_)
        | Stmt::Assert(_) => false,
    }
}
