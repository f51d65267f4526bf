//! `print` statements: runtime glue around `__do_print`.
//!
//! `__do_print(fmt, types, width, lane_mask, args)` receives, besides
//! the format string, a string with one character per printed value
//! encoding its type and variability, the gang width, the current lane
//! mask as an integer bitmap, and an array of generic pointers to the
//! evaluated values. The encoding here and the decoder in the runtime
//! have to agree.

use crate::constants::COST_FUNCALL;
use crate::ctx::FunctionEmitContext;
use crate::diagnostics;
use crate::expr::Expr;
use crate::ir::{Constant, IrType, ValueId};
use crate::pos::SourcePos;
use crate::types::{AtomicKind, Type, Variability};
use crate::CompileContext;

/// One character per argument: lowercase is uniform, uppercase varying.
fn encode_type(ty: &Type) -> Option<char> {
    let Type::Atomic {
        kind, variability, ..
    } = ty
    else {
        return None;
    };
    let uniform = *variability == Variability::Uniform;
    Some(match (kind, uniform) {
        (AtomicKind::Bool, true) => 'b',
        (AtomicKind::Bool, false) => 'B',
        (AtomicKind::Int32, true) => 'i',
        (AtomicKind::Int32, false) => 'I',
        (AtomicKind::UInt32, true) => 'u',
        (AtomicKind::UInt32, false) => 'U',
        (AtomicKind::Float, true) => 'f',
        (AtomicKind::Float, false) => 'F',
        (AtomicKind::Int64, true) => 'l',
        (AtomicKind::Int64, false) => 'L',
        (AtomicKind::UInt64, true) => 'v',
        (AtomicKind::UInt64, false) => 'V',
        (AtomicKind::Double, true) => 'd',
        (AtomicKind::Double, false) => 'D',
        _ => return None,
    })
}

/// Evaluate one print argument to alloca'd storage and append its type
/// code; returns the slot's address as a generic pointer.
fn process_print_arg(
    arg: &Expr,
    ctx: &mut FunctionEmitContext,
    arg_types: &mut String,
) -> Option<ValueId> {
    let mut expr = arg.clone();
    let mut ty = expr.get_type()?;

    // References are printed through: dereference them first.
    if matches!(ty, Type::Reference { .. }) {
        let pos = expr.pos().clone();
        expr = Expr::Dereference {
            expr: Box::new(expr),
            pos,
        };
        ty = expr.get_type()?;
    }

    // 8- and 16-bit integers widen to 32 bits, keeping their variability.
    let needs_widening = matches!(
        &ty,
        Type::Atomic {
            kind: AtomicKind::Int8 | AtomicKind::UInt8 | AtomicKind::Int16 | AtomicKind::UInt16,
            ..
        }
    );
    if needs_widening {
        let to = if ty.is_uniform() {
            Type::uniform_int32()
        } else {
            Type::varying_int32()
        };
        let pos = expr.pos().clone();
        expr = Expr::Cast {
            to: to.clone(),
            expr: Box::new(expr),
            pos,
        };
        ty = to;
    }

    let Some(code) = encode_type(&ty.as_non_const()) else {
        diagnostics::error(
            expr.pos(),
            format!(
                "only atomic types are allowed in print statements; type \"{}\" is illegal",
                ty
            ),
        );
        return None;
    };
    arg_types.push(code);

    let ir_ty = ty.ir_type(ctx.g());
    let slot = ctx.alloca(ir_ty, "print_arg")?;
    let value = expr.get_value(ctx)?;
    ctx.store(value, slot);
    ctx.bitcast(slot, IrType::Ptr)
}

/// A `print` statement: a literal format string plus the printed values
/// (a single expression or an expression list).
#[derive(Debug)]
pub struct PrintStmt {
    pub format: String,
    pub values: Option<Box<Expr>>,
    pub pos: SourcePos,
}

impl PrintStmt {
    pub fn new(format: impl Into<String>, values: Option<Box<Expr>>, pos: SourcePos) -> PrintStmt {
        PrintStmt {
            format: format.into(),
            values,
            pos,
        }
    }

    pub fn emit(&self, ctx: &mut FunctionEmitContext) {
        ctx.set_debug_pos(&self.pos);

        // __do_print takes five arguments: the format string, the
        // type-code string, the gang width, the current lane mask, and
        // a pointer to an array of pointers to the values.
        let mut arg_types = String::new();

        let arg_array_ptr = match &self.values {
            None => ctx.constant(Constant::NullPtr, IrType::Ptr),
            Some(values) => {
                let exprs: Vec<&Expr> = match values.as_ref() {
                    Expr::List { exprs, .. } => exprs.iter().collect(),
                    single => vec![single],
                };

                let array_ty = IrType::Array(Box::new(IrType::Ptr), exprs.len());
                let Some(arg_array) = ctx.alloca(array_ty, "print_arg_ptrs") else {
                    return;
                };

                // Evaluate each value into its own slot and record the
                // slot addresses in the pointer array.
                for (i, e) in exprs.iter().enumerate() {
                    let Some(ptr) = process_print_arg(e, ctx, &mut arg_types) else {
                        return;
                    };
                    let Some(slot) = ctx.element_ptr(arg_array, i, "arg_ptr") else {
                        return;
                    };
                    ctx.store(ptr, slot);
                }

                match ctx.bitcast(arg_array, IrType::Ptr) {
                    Some(cast) => cast,
                    None => return,
                }
            }
        };

        let fmt_ptr = ctx.string_ptr(&self.format);
        let types_ptr = ctx.string_ptr(&arg_types);
        let width = ctx.constant(
            Constant::Int {
                ty: IrType::I32,
                value: ctx.g().target.vector_width as i64,
            },
            IrType::I32,
        );
        let full = ctx.get_full_mask();
        let Some(lane_mask) = ctx.lane_mask(full) else {
            return;
        };

        ctx.call(
            "__do_print",
            vec![fmt_ptr, types_ptr, width, lane_mask, arg_array_ptr],
            IrType::Void,
        );
    }

    pub fn type_check(mut self, _g: &CompileContext) -> Option<PrintStmt> {
        self.values = self.values.and_then(|v| v.type_check());
        Some(self)
    }

    pub fn optimize(mut self) -> PrintStmt {
        self.values = self.values.map(|v| v.optimize());
        self
    }

    pub fn estimate_cost(&self) -> i32 {
        COST_FUNCALL + self.values.as_ref().map_or(0, |v| v.estimate_cost())
    }
}
