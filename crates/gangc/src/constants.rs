//! Cost-model constants used by `estimate_cost` and the lowering
//! heuristics.
//!
//! The absolute values are rough per-node weights; what matters is the
//! relative ordering (a varying construct always costs more than its
//! uniform counterpart) and the predication threshold below.

/// Cost of an `if` with a uniform test (a plain two-way branch).
pub const COST_UNIFORM_IF: i32 = 2;
/// Cost of an `if` with a varying test (mask updates plus branches).
pub const COST_VARYING_IF: i32 = 3;
/// Cost of a loop with a uniform test.
pub const COST_UNIFORM_LOOP: i32 = 4;
/// Cost of a loop with a varying test (lane bookkeeping every iteration).
pub const COST_VARYING_LOOP: i32 = 6;
/// Cost of a plain `break` / `continue`.
pub const COST_REGULAR_BREAK_CONTINUE: i32 = 1;
/// Cost of a coherent `cbreak` / `ccontinue` (adds a mask probe).
pub const COST_COHERENT_BREAK_CONTINUE: i32 = 3;
/// Cost of a `return`.
pub const COST_RETURN: i32 = 4;
/// Cost of a function call.
pub const COST_FUNCALL: i32 = 4;
/// Cost of an `assert` (a runtime call that can abort).
pub const COST_ASSERT: i32 = 8;
/// Cost of a simple expression node (constants, symbols, arithmetic).
pub const COST_SIMPLE_ARITH_LOGIC_OP: i32 = 1;

/// Threshold under which both arms of a varying `if` whose arms are safe
/// to run with all lanes off are executed unconditionally under masked
/// restriction, instead of emitting per-arm `any()` probes and branches.
pub const PREDICATE_SAFE_IF_STATEMENT_COST: i32 = 6;
