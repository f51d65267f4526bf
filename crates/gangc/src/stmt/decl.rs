//! Variable declaration statements and initializer lowering.

use crate::ctx::FunctionEmitContext;
use crate::diagnostics;
use crate::expr::{type_convert_expr, Expr};
use crate::ir::{Constant, Global, ValueId};
use crate::pos::SourcePos;
use crate::sym::{StorageClass, Symbol};
use crate::types::Type;
use crate::CompileContext;

use std::rc::Rc;

/// One declared variable: the symbol plus its optional initializer.
#[derive(Debug)]
pub struct VariableDeclaration {
    pub sym: Rc<Symbol>,
    pub init: Option<Box<Expr>>,
}

impl VariableDeclaration {
    pub fn new(sym: Rc<Symbol>, init: Option<Box<Expr>>) -> VariableDeclaration {
        VariableDeclaration { sym, init }
    }
}

/// An ordered sequence of variable declarations.
#[derive(Debug)]
pub struct DeclStmt {
    pub vars: Vec<VariableDeclaration>,
    pub pos: SourcePos,
}

/// Emit code initializing `lvalue` (holding a value of type `ty`) from
/// `init`, recursing elementwise for brace-initialized aggregates.
fn init_symbol(
    ctx: &mut FunctionEmitContext,
    lvalue: ValueId,
    name: &str,
    ty: &Type,
    init: Option<&Expr>,
    pos: &SourcePos,
) {
    let Some(init) = init else {
        // No initializer: the slot starts undefined. (Storing a zero
        // value here instead would give auto-initialization.)
        let ir_ty = ty.ir_type(ctx.g());
        let undef = ctx.constant(Constant::Undef(ir_ty.clone()), ir_ty);
        ctx.store(undef, lvalue);
        return;
    };

    if !matches!(init, Expr::List { .. }) {
        if let Some(rt) = ty.reference_target() {
            // References bind exactly: the initializer must have the
            // same reference type.
            let init_type = init.get_type();
            let matches_ref = init_type.as_ref().is_some_and(|t| t.equal_ignoring_const(ty));
            if !matches_ref {
                diagnostics::error(
                    init.pos(),
                    format!(
                        "initializer for reference type \"reference to {}\" must have the same \
                         reference type itself; \"{}\" is incompatible",
                        rt,
                        init_type.map_or_else(|| "<unknown>".to_string(), |t| t.to_string()),
                    ),
                );
                return;
            }
            if let Some(value) = init.get_value(ctx) {
                ctx.store(value, lvalue);
            }
            return;
        }

        // A straight expression: convert it to the variable's type and
        // store the result.
        if let Some(converted) = type_convert_expr(Box::new(init.clone()), ty, "initializer") {
            if let Some(value) = converted.get_value(ctx) {
                ctx.store(value, lvalue);
            }
        }
        return;
    }

    // Brace-initializer cases from here on.
    if ty.is_atomic_or_enum() {
        diagnostics::error(
            init.pos(),
            format!(
                "expression list initializers can't be used for variable \"{}\" with type \"{}\"",
                name, ty
            ),
        );
        return;
    }
    if matches!(ty, Type::Reference { .. }) {
        diagnostics::error(
            init.pos(),
            format!(
                "expression list initializers can't be used for reference-type variable \"{}\"",
                name
            ),
        );
        return;
    }

    if let Some(count) = ty.element_count() {
        let kind = match ty {
            Type::Struct { .. } => "struct",
            Type::Array { .. } => "array",
            Type::Vector { .. } => "vector",
            _ => diagnostics::fatal("unexpected collection type in init_symbol"),
        };
        let Expr::List { exprs, .. } = init else {
            unreachable!()
        };
        // The brace list must supply exactly one value per element.
        if exprs.len() != count {
            diagnostics::error(
                init.pos(),
                format!(
                    "initializer for {} \"{}\" requires {} values; {} provided",
                    kind,
                    name,
                    count,
                    exprs.len()
                ),
            );
            return;
        }
        for (i, elem_init) in exprs.iter().enumerate() {
            let Some(elem_ptr) = ctx.element_ptr(lvalue, i, "element") else {
                return;
            };
            let elem_ty = ty.element_type(i).cloned();
            match elem_ty {
                Some(elem_ty) => {
                    init_symbol(ctx, elem_ptr, name, &elem_ty, Some(elem_init), pos)
                }
                None => diagnostics::fatal("collection element type missing in init_symbol"),
            }
        }
        return;
    }

    diagnostics::fatal("unexpected type in init_symbol");
}

impl DeclStmt {
    pub fn new(vars: Vec<VariableDeclaration>, pos: SourcePos) -> DeclStmt {
        DeclStmt { vars, pos }
    }

    pub fn emit(&self, ctx: &mut FunctionEmitContext) {
        if ctx.current_basic_block().is_none() {
            return;
        }

        for var in &self.vars {
            let sym = &var.sym;
            let init = var.init.as_deref();

            // Now that we're emitting, the nesting depth of varying
            // control flow at this declaration is directly at hand;
            // the expression layer reads it for late diagnostics.
            sym.varying_cf_depth.set(ctx.varying_cf_depth());

            ctx.set_debug_pos(&sym.pos);

            // An array declared without a size takes its length from the
            // brace initializer, or is rejected.
            let declared = sym.ty.borrow().clone();
            if matches!(&declared, Type::Array { count: 0, .. }) {
                match init {
                    Some(Expr::List { exprs, .. }) => {
                        let sized = declared
                            .with_size(exprs.len())
                            .unwrap_or_else(|| declared.clone());
                        *sym.ty.borrow_mut() = sized;
                    }
                    _ => {
                        diagnostics::error(
                            &sym.pos,
                            "can't declare an unsized array as a local variable without \
                             providing an initializer expression to set its size",
                        );
                        continue;
                    }
                }
            }
            let ty = sym.ty.borrow().clone();

            // References must be bound at declaration.
            if matches!(ty, Type::Reference { .. }) && init.is_none() {
                diagnostics::error(
                    &sym.pos,
                    format!(
                        "must provide initializer for reference-type variable \"{}\"",
                        sym.name
                    ),
                );
                continue;
            }

            let ir_ty = ty.ir_type(ctx.g());
            match sym.storage_class {
                StorageClass::Static => {
                    // Statics need a compile-time constant initializer;
                    // a zero value stands in when there is none (or when
                    // the initializer isn't constant, after the error).
                    let mut cinit = None;
                    if let Some(e) = init {
                        cinit = e.get_constant(&ty, ctx.g().target.vector_width);
                        if cinit.is_none() {
                            diagnostics::error(
                                &sym.pos,
                                format!(
                                    "initializer for static variable \"{}\" must be a constant",
                                    sym.name
                                ),
                            );
                        }
                    }
                    let cinit = cinit.unwrap_or(Constant::Zero(ir_ty.clone()));

                    // Module-scoped storage so the value persists across
                    // calls; keyed by line and name to stay unique.
                    let gid = ctx.add_global(Global {
                        name: format!("static.{}.{}", sym.pos.line, sym.name),
                        ty: ir_ty,
                        init: cinit,
                        internal_linkage: true,
                        is_const: ty.is_const_type(),
                    });
                    if let Some(ptr) = ctx.global_addr(gid) {
                        sym.storage.set(Some(ptr));
                    }
                }
                StorageClass::Auto => {
                    let Some(ptr) = ctx.alloca(ir_ty, &sym.name) else {
                        continue;
                    };
                    sym.storage.set(Some(ptr));
                    init_symbol(ctx, ptr, &sym.name, &ty, init, &sym.pos);
                }
            }
        }
    }

    pub fn type_check(mut self, _g: &CompileContext) -> Option<DeclStmt> {
        let mut encountered_error = false;
        for var in &mut self.vars {
            let Some(init) = var.init.take() else {
                continue;
            };
            let Some(init) = init.type_check() else {
                continue;
            };

            // Convert non-list initializers of scalar targets now, so
            // that e.g. `const float f = 2` records a float constant
            // rather than an int. List initializers stay as they are;
            // the emit phase checks their shape against the target.
            let ty = var.sym.ty.borrow().clone();
            if ty.is_atomic_or_enum() && !matches!(init.as_ref(), Expr::List { .. }) {
                match type_convert_expr(init, &ty, "initializer") {
                    Some(converted) => var.init = Some(converted),
                    None => encountered_error = true,
                }
            } else {
                var.init = Some(init);
            }
        }
        if encountered_error {
            None
        } else {
            Some(self)
        }
    }

    pub fn optimize(mut self) -> DeclStmt {
        for var in &mut self.vars {
            let Some(init) = var.init.take() else {
                continue;
            };
            let init = init.optimize();

            // A const-qualified variable whose optimized initializer is
            // a constant of the matching type records that constant on
            // the symbol for later folding. Constant aggregates don't
            // get this treatment: there is no scalar constant to cache,
            // which bounds how much the compiler can reason about e.g.
            // array sizes computed from non-trivial expressions.
            let sym = &var.sym;
            let sym_ty = sym.ty.borrow().clone();
            if sym_ty.is_const_type() {
                if let Expr::Const(c) = init.as_ref() {
                    if c.ty.equal_ignoring_const(&sym_ty) {
                        *sym.const_value.borrow_mut() = Some(c.clone());
                    }
                }
            }
            var.init = Some(init);
        }
        self
    }

    pub fn estimate_cost(&self) -> i32 {
        self.vars
            .iter()
            .map(|v| v.init.as_ref().map_or(0, |e| e.estimate_cost()))
            .sum()
    }
}
