//! gangc: statement semantic analysis and code generation core for the
//! gang SPMD data-parallel language.
//!
//! Scalar-looking gang source describes the behavior of a whole gang of
//! program instances executing in lock step; every value is either
//! `uniform` (one value for the gang) or `varying` (one value per lane).
//! This crate owns the statement tree: each statement kind is driven
//! through three passes,
//!
//! 1. `type_check` validates operand types, inserts the boolean casts
//!    on control-flow tests, and may reject the subtree;
//! 2. `optimize` folds children and annotates declared constants;
//! 3. `emit` walks the tree and directs the emit context to build a
//!    control-flow graph with correct per-lane mask bookkeeping.
//!
//! The hard part is lowering varying control flow: `if` statements and
//! loops over varying tests keep an execution mask per lexical region,
//! and the coherent variants (`cif`, `cdo`, `cfor`, ...) add runtime
//! probes that select a scalar-style fast path when all lanes agree.
//! See `stmt::control_flow` for the three `if` lowering strategies and
//! `stmt::safety` for the analyses that gate them.

pub mod constants;
pub mod ctx;
pub mod diagnostics;
pub mod expr;
pub mod ir;
pub mod pos;
pub mod stmt;
pub mod sym;
pub mod types;

use anyhow::bail;

/// Optimization and lowering switches.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Treat `cif`/`cdo`/`cfor`/`cbreak`/`ccontinue`/`creturn` as their
    /// plain counterparts: no runtime coherence probes are emitted.
    pub disable_coherent_control_flow: bool,
    /// Treat every control-flow test as varying, even if its type is
    /// uniform.
    pub disable_uniform_control_flow: bool,
    /// Emit instrumentation calls at interesting control-flow points.
    pub instrument: bool,
}

/// Description of the compilation target.
#[derive(Debug, Clone)]
pub struct Target {
    /// Number of program instances in a gang.
    pub vector_width: usize,
}

impl Default for Target {
    fn default() -> Self {
        Target { vector_width: 8 }
    }
}

/// Process-wide compilation state, threaded explicitly through the
/// passes (options plus target description).
#[derive(Debug, Clone, Default)]
pub struct CompileContext {
    pub opt: Options,
    pub target: Target,
}

impl CompileContext {
    pub fn new() -> CompileContext {
        CompileContext::default()
    }
}

/// Drive a statement tree through all three passes as the body of a
/// fresh function named `name`, installing the result in `module`.
///
/// Errors reported by any pass fail the whole call, but only after the
/// passes have walked as much of the tree as they can, so one run
/// surfaces as many diagnostics as possible.
pub fn compile_stmt_function(
    g: &CompileContext,
    module: &mut ir::Module,
    name: &str,
    return_type: ir::IrType,
    body: Box<stmt::Stmt>,
) -> anyhow::Result<()> {
    let errors_before = diagnostics::error_count();

    let body = match body.type_check(g) {
        Some(body) => body,
        None => bail!("type checking failed for function \"{}\"", name),
    };
    if diagnostics::error_count() > errors_before {
        bail!("type checking failed for function \"{}\"", name);
    }

    let body = body.optimize();

    let mut ctx = ctx::FunctionEmitContext::new(g, module, name, return_type);
    body.emit(&mut ctx);
    ctx.finish();

    if diagnostics::error_count() > errors_before {
        bail!("code generation failed for function \"{}\"", name);
    }
    Ok(())
}
