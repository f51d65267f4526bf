//! The expression-tree interface consumed by the statement core.
//!
//! The statement passes only need a narrow slice of the expression
//! layer: type inspection, constant evaluation, per-pass child
//! substitution and "give me an IR value". The variant set here is
//! exactly the one the all-lanes-off safety analysis in `stmt::safety`
//! enumerates.

use std::rc::Rc;

use crate::constants::{COST_FUNCALL, COST_SIMPLE_ARITH_LOGIC_OP};
use crate::ctx::FunctionEmitContext;
use crate::diagnostics;
use crate::ir::{self, Constant, ValueId};
use crate::pos::SourcePos;
use crate::sym::Symbol;
use crate::types::{AtomicKind, Type, Variability};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    LogicalNot,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Xor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

/// One scalar of a constant, independent of lane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstScalar {
    Bool(bool),
    SInt(i64),
    UInt(u64),
    Float(f64),
}

impl ConstScalar {
    pub fn as_i64(self) -> i64 {
        match self {
            ConstScalar::Bool(b) => b as i64,
            ConstScalar::SInt(v) => v,
            ConstScalar::UInt(v) => v as i64,
            ConstScalar::Float(v) => v as i64,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            ConstScalar::Bool(b) => b as i64 as f64,
            ConstScalar::SInt(v) => v as f64,
            ConstScalar::UInt(v) => v as f64,
            ConstScalar::Float(v) => v,
        }
    }

    pub fn as_bool(self) -> bool {
        match self {
            ConstScalar::Bool(b) => b,
            ConstScalar::SInt(v) => v != 0,
            ConstScalar::UInt(v) => v != 0,
            ConstScalar::Float(v) => v != 0.0,
        }
    }
}

/// A compile-time constant: a type plus one scalar per lane (a single
/// scalar for uniform values).
#[derive(Debug, Clone, PartialEq)]
pub struct ConstExpr {
    pub ty: Type,
    pub values: Vec<ConstScalar>,
    pub pos: SourcePos,
}

impl ConstExpr {
    pub fn uniform_bool(v: bool, pos: SourcePos) -> ConstExpr {
        ConstExpr {
            ty: Type::uniform_bool(),
            values: vec![ConstScalar::Bool(v)],
            pos,
        }
    }

    pub fn uniform_i32(v: i32, pos: SourcePos) -> ConstExpr {
        ConstExpr {
            ty: Type::uniform_int32(),
            values: vec![ConstScalar::SInt(v as i64)],
            pos,
        }
    }

    pub fn varying_i32(vals: &[i32], pos: SourcePos) -> ConstExpr {
        ConstExpr {
            ty: Type::varying_int32(),
            values: vals.iter().map(|v| ConstScalar::SInt(*v as i64)).collect(),
            pos,
        }
    }

    pub fn uniform_float(v: f32, pos: SourcePos) -> ConstExpr {
        ConstExpr {
            ty: Type::atomic(AtomicKind::Float, Variability::Uniform),
            values: vec![ConstScalar::Float(v as f64)],
            pos,
        }
    }

    pub fn uniform_double(v: f64, pos: SourcePos) -> ConstExpr {
        ConstExpr {
            ty: Type::atomic(AtomicKind::Double, Variability::Uniform),
            values: vec![ConstScalar::Float(v)],
            pos,
        }
    }

    /// All lane values as 32-bit ints (the bounds check in the safety
    /// analysis works on these).
    pub fn as_i32_values(&self) -> Vec<i32> {
        self.values.iter().map(|v| v.as_i64() as i32).collect()
    }

    fn scalar_to_ir(&self, scalar: ConstScalar, kind: AtomicKind) -> Constant {
        match kind {
            AtomicKind::Bool => Constant::Bool(scalar.as_bool()),
            AtomicKind::Float => Constant::Float {
                ty: ir::IrType::F32,
                value: scalar.as_f64(),
            },
            AtomicKind::Double => Constant::Float {
                ty: ir::IrType::F64,
                value: scalar.as_f64(),
            },
            AtomicKind::Int8 | AtomicKind::UInt8 => Constant::Int {
                ty: ir::IrType::I8,
                value: scalar.as_i64(),
            },
            AtomicKind::Int16 | AtomicKind::UInt16 => Constant::Int {
                ty: ir::IrType::I16,
                value: scalar.as_i64(),
            },
            AtomicKind::Int32 | AtomicKind::UInt32 => Constant::Int {
                ty: ir::IrType::I32,
                value: scalar.as_i64(),
            },
            AtomicKind::Int64 | AtomicKind::UInt64 => Constant::Int {
                ty: ir::IrType::I64,
                value: scalar.as_i64(),
            },
        }
    }

    /// Render this constant as an IR constant of `target` (which must be
    /// an atomic or enum type of the same variability). Varying constants
    /// are widened to the gang width, splatting a single value.
    pub fn to_ir_constant(&self, target: &Type, width: usize) -> Option<Constant> {
        let (kind, variability) = match target {
            Type::Atomic {
                kind, variability, ..
            } => (*kind, *variability),
            Type::Enum { variability, .. } => (AtomicKind::Int32, *variability),
            _ => return None,
        };
        if self.ty.is_varying() && variability == Variability::Uniform {
            return None;
        }
        match variability {
            Variability::Uniform => Some(self.scalar_to_ir(self.values[0], kind)),
            Variability::Varying => {
                let mut lanes = Vec::with_capacity(width);
                for i in 0..width {
                    let scalar = if self.values.len() == 1 {
                        self.values[0]
                    } else {
                        *self.values.get(i)?
                    };
                    lanes.push(self.scalar_to_ir(scalar, kind));
                }
                Some(Constant::Aggregate(lanes))
            }
        }
    }
}

/// An expression-tree node.
///
/// Cloning is shallow where it matters: symbol references share the
/// underlying `Symbol` through `Rc`.
#[derive(Debug, Clone)]
pub enum Expr {
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        pos: SourcePos,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        pos: SourcePos,
    },
    Assign {
        lvalue: Box<Expr>,
        rvalue: Box<Expr>,
        pos: SourcePos,
    },
    Select {
        test: Box<Expr>,
        on_true: Box<Expr>,
        on_false: Box<Expr>,
        pos: SourcePos,
    },
    /// Brace-initializer / argument list. Has no type of its own.
    List {
        exprs: Vec<Expr>,
        pos: SourcePos,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        pos: SourcePos,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
        pos: SourcePos,
    },
    Member {
        base: Box<Expr>,
        member: String,
        pos: SourcePos,
    },
    Const(ConstExpr),
    Cast {
        to: Type,
        expr: Box<Expr>,
        pos: SourcePos,
    },
    /// Address-of.
    Reference {
        expr: Box<Expr>,
        pos: SourcePos,
    },
    Dereference {
        expr: Box<Expr>,
        pos: SourcePos,
    },
    Symbol {
        sym: Rc<Symbol>,
        pos: SourcePos,
    },
    FunctionSymbol {
        name: String,
        ret_type: Type,
        pos: SourcePos,
    },
    /// Gang-wide synchronization point.
    Sync {
        pos: SourcePos,
    },
}

impl Expr {
    pub fn pos(&self) -> &SourcePos {
        match self {
            Expr::Unary { pos, .. }
            | Expr::Binary { pos, .. }
            | Expr::Assign { pos, .. }
            | Expr::Select { pos, .. }
            | Expr::List { pos, .. }
            | Expr::Call { pos, .. }
            | Expr::Index { pos, .. }
            | Expr::Member { pos, .. }
            | Expr::Cast { pos, .. }
            | Expr::Reference { pos, .. }
            | Expr::Dereference { pos, .. }
            | Expr::Symbol { pos, .. }
            | Expr::FunctionSymbol { pos, .. }
            | Expr::Sync { pos } => pos,
            Expr::Const(c) => &c.pos,
        }
    }

    /// The type of this expression, if it has one. Lists have none;
    /// expressions over rejected subtrees may not either.
    pub fn get_type(&self) -> Option<Type> {
        match self {
            Expr::Unary { op, operand, .. } => {
                let t = operand.get_type()?;
                match op {
                    UnaryOp::LogicalNot => Some(if t.is_uniform() {
                        Type::uniform_bool()
                    } else {
                        Type::varying_bool()
                    }),
                    _ => Some(t),
                }
            }
            Expr::Binary { op, left, right, .. } => {
                let lt = left.get_type()?;
                let rt = right.get_type()?;
                let varying = lt.is_varying() || rt.is_varying();
                if op.is_comparison() {
                    Some(if varying {
                        Type::varying_bool()
                    } else {
                        Type::uniform_bool()
                    })
                } else if varying {
                    Some(lt.as_varying())
                } else {
                    Some(lt)
                }
            }
            Expr::Assign { lvalue, .. } => lvalue.get_type(),
            Expr::Select { test, on_true, .. } => {
                let t = on_true.get_type()?;
                if test.get_type()?.is_varying() {
                    Some(t.as_varying())
                } else {
                    Some(t)
                }
            }
            Expr::List { .. } => None,
            Expr::Call { callee, .. } => match callee.as_ref() {
                Expr::FunctionSymbol { ret_type, .. } => Some(ret_type.clone()),
                _ => None,
            },
            Expr::Index { base, index, .. } => {
                let mut bt = base.get_type()?;
                if let Some(target) = bt.reference_target() {
                    bt = target.clone();
                }
                let elem = bt.element_type(0)?.clone();
                if index.get_type()?.is_varying() {
                    Some(elem.as_varying())
                } else {
                    Some(elem)
                }
            }
            Expr::Member { base, member, .. } => {
                let mut bt = base.get_type()?;
                if let Some(target) = bt.reference_target() {
                    bt = target.clone();
                }
                match bt {
                    Type::Struct { members, .. } => members
                        .iter()
                        .find(|(n, _)| n == member)
                        .map(|(_, t)| t.clone()),
                    _ => None,
                }
            }
            Expr::Const(c) => Some(c.ty.clone()),
            Expr::Cast { to, .. } => Some(to.clone()),
            Expr::Reference { expr, .. } => Some(Type::Reference {
                target: Box::new(expr.get_type()?),
            }),
            Expr::Dereference { expr, .. } => {
                expr.get_type()?.reference_target().cloned()
            }
            Expr::Symbol { sym, .. } => Some(sym.ty.borrow().clone()),
            Expr::FunctionSymbol { ret_type, .. } => Some(ret_type.clone()),
            Expr::Sync { .. } => None,
        }
    }

    /// Evaluate this expression as a compile-time constant of type
    /// `target`, if possible.
    pub fn get_constant(&self, target: &Type, width: usize) -> Option<Constant> {
        match self {
            Expr::Const(c) => c.to_ir_constant(target, width),
            _ => None,
        }
    }

    /// Constant-fold this subtree bottom-up.
    pub fn optimize(self: Box<Self>) -> Box<Expr> {
        match *self {
            Expr::Unary { op, operand, pos } => {
                let operand = operand.optimize();
                if let Expr::Const(c) = operand.as_ref() {
                    if c.ty.is_uniform() {
                        if let Some(folded) = fold_unary(op, c, &pos) {
                            return Box::new(Expr::Const(folded));
                        }
                    }
                }
                Box::new(Expr::Unary { op, operand, pos })
            }
            Expr::Binary {
                op,
                left,
                right,
                pos,
            } => {
                let left = left.optimize();
                let right = right.optimize();
                if let (Expr::Const(a), Expr::Const(b)) = (left.as_ref(), right.as_ref()) {
                    if a.ty == b.ty && a.ty.is_uniform() {
                        if let Some(folded) = fold_binary(op, a, b, &pos) {
                            return Box::new(Expr::Const(folded));
                        }
                    }
                }
                Box::new(Expr::Binary {
                    op,
                    left,
                    right,
                    pos,
                })
            }
            Expr::Assign {
                lvalue,
                rvalue,
                pos,
            } => Box::new(Expr::Assign {
                lvalue: lvalue.optimize(),
                rvalue: rvalue.optimize(),
                pos,
            }),
            Expr::Select {
                test,
                on_true,
                on_false,
                pos,
            } => Box::new(Expr::Select {
                test: test.optimize(),
                on_true: on_true.optimize(),
                on_false: on_false.optimize(),
                pos,
            }),
            Expr::List { exprs, pos } => Box::new(Expr::List {
                exprs: exprs
                    .into_iter()
                    .map(|e| *Box::new(e).optimize())
                    .collect(),
                pos,
            }),
            Expr::Call { callee, args, pos } => Box::new(Expr::Call {
                callee: callee.optimize(),
                args: args.into_iter().map(|e| *Box::new(e).optimize()).collect(),
                pos,
            }),
            Expr::Index { base, index, pos } => Box::new(Expr::Index {
                base: base.optimize(),
                index: index.optimize(),
                pos,
            }),
            Expr::Member { base, member, pos } => Box::new(Expr::Member {
                base: base.optimize(),
                member,
                pos,
            }),
            Expr::Cast { to, expr, pos } => {
                let expr = expr.optimize();
                if let Expr::Const(c) = expr.as_ref() {
                    // A cast between scalar types of the same variability
                    // folds to a retyped constant.
                    if to.is_atomic_or_enum()
                        && c.ty.is_atomic_or_enum()
                        && to.is_uniform() == c.ty.is_uniform()
                    {
                        return Box::new(Expr::Const(ConstExpr {
                            ty: to,
                            values: c.values.clone(),
                            pos,
                        }));
                    }
                }
                Box::new(Expr::Cast { to, expr, pos })
            }
            Expr::Reference { expr, pos } => Box::new(Expr::Reference {
                expr: expr.optimize(),
                pos,
            }),
            Expr::Dereference { expr, pos } => Box::new(Expr::Dereference {
                expr: expr.optimize(),
                pos,
            }),
            other @ (Expr::Const(_)
            | Expr::Symbol { .. }
            | Expr::FunctionSymbol { .. }
            | Expr::Sync { .. }) => Box::new(other),
        }
    }

    /// Type-check this subtree. Expression typing proper lives outside
    /// the statement core; this walk recurses for the substitution
    /// contract and accepts everything well-formed.
    pub fn type_check(self: Box<Self>) -> Option<Box<Expr>> {
        match *self {
            Expr::Unary { op, operand, pos } => Some(Box::new(Expr::Unary {
                op,
                operand: operand.type_check()?,
                pos,
            })),
            Expr::Binary {
                op,
                left,
                right,
                pos,
            } => Some(Box::new(Expr::Binary {
                op,
                left: left.type_check()?,
                right: right.type_check()?,
                pos,
            })),
            Expr::Assign {
                lvalue,
                rvalue,
                pos,
            } => Some(Box::new(Expr::Assign {
                lvalue: lvalue.type_check()?,
                rvalue: rvalue.type_check()?,
                pos,
            })),
            Expr::Select {
                test,
                on_true,
                on_false,
                pos,
            } => Some(Box::new(Expr::Select {
                test: test.type_check()?,
                on_true: on_true.type_check()?,
                on_false: on_false.type_check()?,
                pos,
            })),
            Expr::List { exprs, pos } => {
                let mut checked = Vec::with_capacity(exprs.len());
                for e in exprs {
                    checked.push(*Box::new(e).type_check()?);
                }
                Some(Box::new(Expr::List { exprs: checked, pos }))
            }
            Expr::Call { callee, args, pos } => {
                let callee = callee.type_check()?;
                let mut checked = Vec::with_capacity(args.len());
                for a in args {
                    checked.push(*Box::new(a).type_check()?);
                }
                Some(Box::new(Expr::Call {
                    callee,
                    args: checked,
                    pos,
                }))
            }
            Expr::Index { base, index, pos } => Some(Box::new(Expr::Index {
                base: base.type_check()?,
                index: index.type_check()?,
                pos,
            })),
            Expr::Member { base, member, pos } => Some(Box::new(Expr::Member {
                base: base.type_check()?,
                member,
                pos,
            })),
            Expr::Cast { to, expr, pos } => Some(Box::new(Expr::Cast {
                to,
                expr: expr.type_check()?,
                pos,
            })),
            Expr::Reference { expr, pos } => Some(Box::new(Expr::Reference {
                expr: expr.type_check()?,
                pos,
            })),
            Expr::Dereference { expr, pos } => Some(Box::new(Expr::Dereference {
                expr: expr.type_check()?,
                pos,
            })),
            other => Some(Box::new(other)),
        }
    }

    /// Per-node cost heuristic; leaves are free, operators pay one unit,
    /// calls pay the call cost.
    pub fn estimate_cost(&self) -> i32 {
        match self {
            Expr::Unary { operand, .. } => COST_SIMPLE_ARITH_LOGIC_OP + operand.estimate_cost(),
            Expr::Binary { left, right, .. } => {
                COST_SIMPLE_ARITH_LOGIC_OP + left.estimate_cost() + right.estimate_cost()
            }
            Expr::Assign { lvalue, rvalue, .. } => {
                COST_SIMPLE_ARITH_LOGIC_OP + lvalue.estimate_cost() + rvalue.estimate_cost()
            }
            Expr::Select {
                test,
                on_true,
                on_false,
                ..
            } => {
                COST_SIMPLE_ARITH_LOGIC_OP
                    + test.estimate_cost()
                    + on_true.estimate_cost()
                    + on_false.estimate_cost()
            }
            Expr::List { exprs, .. } => exprs.iter().map(|e| e.estimate_cost()).sum(),
            Expr::Call { args, .. } => {
                COST_FUNCALL + args.iter().map(|e| e.estimate_cost()).sum::<i32>()
            }
            Expr::Index { base, index, .. } => {
                COST_SIMPLE_ARITH_LOGIC_OP + base.estimate_cost() + index.estimate_cost()
            }
            Expr::Member { base, .. } => COST_SIMPLE_ARITH_LOGIC_OP + base.estimate_cost(),
            Expr::Cast { expr, .. } => COST_SIMPLE_ARITH_LOGIC_OP + expr.estimate_cost(),
            Expr::Reference { expr, .. } | Expr::Dereference { expr, .. } => expr.estimate_cost(),
            Expr::Const(_)
            | Expr::Symbol { .. }
            | Expr::FunctionSymbol { .. }
            | Expr::Sync { .. } => 0,
        }
    }

    /// Emit code computing this expression's value. `None` means the
    /// value could not be produced (an error has been reported, or the
    /// current block is terminated).
    pub fn get_value(&self, ctx: &mut FunctionEmitContext) -> Option<ValueId> {
        match self {
            Expr::Const(c) => {
                let ty = c.ty.ir_type(ctx.g());
                let constant = c.to_ir_constant(&c.ty, ctx.g().target.vector_width)?;
                Some(ctx.constant(constant, ty))
            }
            Expr::Symbol { sym, pos } => {
                let ptr = match sym.storage.get() {
                    Some(ptr) => ptr,
                    None => {
                        diagnostics::error(
                            pos,
                            format!("variable \"{}\" used before its declaration emitted", sym.name),
                        );
                        return None;
                    }
                };
                let ty = sym.ty.borrow().ir_type(ctx.g());
                ctx.load(ptr, ty)
            }
            Expr::Unary { op, operand, .. } => {
                let v = operand.get_value(ctx)?;
                match op {
                    UnaryOp::Negate => {
                        let ty = ctx.value_type(v);
                        let zero = ctx.constant(Constant::Zero(ty.clone()), ty);
                        ctx.binary(ir::BinOp::Sub, zero, v)
                    }
                    UnaryOp::LogicalNot | UnaryOp::BitNot => ctx.not(v),
                }
            }
            Expr::Binary { op, left, right, .. } => {
                let a = left.get_value(ctx)?;
                let b = right.get_value(ctx)?;
                match op {
                    BinaryOp::Add => ctx.binary(ir::BinOp::Add, a, b),
                    BinaryOp::Sub => ctx.binary(ir::BinOp::Sub, a, b),
                    BinaryOp::Mul => ctx.binary(ir::BinOp::Mul, a, b),
                    BinaryOp::Div => ctx.binary(ir::BinOp::Div, a, b),
                    BinaryOp::And => ctx.binary(ir::BinOp::And, a, b),
                    BinaryOp::Or => ctx.binary(ir::BinOp::Or, a, b),
                    BinaryOp::Xor => ctx.binary(ir::BinOp::Xor, a, b),
                    BinaryOp::Eq => ctx.compare(ir::CmpOp::Eq, a, b),
                    BinaryOp::Ne => ctx.compare(ir::CmpOp::Ne, a, b),
                    BinaryOp::Lt => ctx.compare(ir::CmpOp::Lt, a, b),
                    BinaryOp::Le => ctx.compare(ir::CmpOp::Le, a, b),
                    BinaryOp::Gt => ctx.compare(ir::CmpOp::Gt, a, b),
                    BinaryOp::Ge => ctx.compare(ir::CmpOp::Ge, a, b),
                }
            }
            Expr::Assign { lvalue, rvalue, .. } => {
                let ptr = lvalue.get_lvalue_address(ctx)?;
                let value = rvalue.get_value(ctx)?;
                let ty = lvalue.get_type()?;
                if ty.is_varying() {
                    // Varying stores blend under the current mask so that
                    // inactive lanes keep their old contents.
                    ctx.masked_store(value, ptr, ty.ir_type(ctx.g()));
                } else {
                    ctx.store(value, ptr);
                }
                Some(value)
            }
            Expr::Select {
                test,
                on_true,
                on_false,
                ..
            } => {
                let c = test.get_value(ctx)?;
                let t = on_true.get_value(ctx)?;
                let f = on_false.get_value(ctx)?;
                ctx.select(c, t, f)
            }
            Expr::List { pos, .. } => {
                diagnostics::error(pos, "expression list used where a single value is required");
                None
            }
            Expr::Call { callee, args, .. } => {
                let name = match callee.as_ref() {
                    Expr::FunctionSymbol { name, .. } => name.clone(),
                    _ => {
                        diagnostics::error(callee.pos(), "called expression is not a function");
                        return None;
                    }
                };
                let ret = self
                    .get_type()
                    .map(|t| t.ir_type(ctx.g()))
                    .unwrap_or(ir::IrType::Void);
                let mut vals = Vec::with_capacity(args.len());
                for a in args {
                    vals.push(a.get_value(ctx)?);
                }
                ctx.call(&name, vals, ret)
            }
            Expr::Index { .. } | Expr::Member { .. } => {
                let ptr = self.get_lvalue_address(ctx)?;
                let ty = self.get_type()?.ir_type(ctx.g());
                ctx.load(ptr, ty)
            }
            Expr::Cast { to, expr, .. } => {
                let v = expr.get_value(ctx)?;
                let from_ir = expr.get_type()?.ir_type(ctx.g());
                let to_ir = to.ir_type(ctx.g());
                if from_ir == to_ir {
                    Some(v)
                } else {
                    ctx.convert(v, to_ir)
                }
            }
            Expr::Reference { expr, .. } => expr.get_lvalue_address(ctx),
            Expr::Dereference { expr, .. } => {
                let ptr = expr.get_value(ctx)?;
                let ty = self.get_type()?.ir_type(ctx.g());
                ctx.load(ptr, ty)
            }
            Expr::FunctionSymbol { name, pos, .. } => {
                diagnostics::error(
                    pos,
                    format!("function \"{}\" used where a value is required", name),
                );
                None
            }
            Expr::Sync { .. } => ctx.call("__sync", Vec::new(), ir::IrType::Void),
        }
    }

    /// Emit code computing the address this expression designates.
    pub fn get_lvalue_address(&self, ctx: &mut FunctionEmitContext) -> Option<ValueId> {
        match self {
            Expr::Symbol { sym, pos } => match sym.storage.get() {
                Some(ptr) => Some(ptr),
                None => {
                    diagnostics::error(
                        pos,
                        format!("variable \"{}\" used before its declaration emitted", sym.name),
                    );
                    None
                }
            },
            Expr::Index { base, index, .. } => {
                let base_ptr = match base.get_type()? {
                    Type::Reference { .. } => base.get_value(ctx)?,
                    _ => base.get_lvalue_address(ctx)?,
                };
                let idx = index.get_value(ctx)?;
                ctx.element_ptr_dyn(base_ptr, idx, "index")
            }
            Expr::Member { base, member, .. } => {
                let base_ptr = match base.get_type()? {
                    Type::Reference { .. } => base.get_value(ctx)?,
                    _ => base.get_lvalue_address(ctx)?,
                };
                let mut bt = base.get_type()?;
                if let Some(target) = bt.reference_target() {
                    bt = target.clone();
                }
                let index = match &bt {
                    Type::Struct { members, .. } => {
                        members.iter().position(|(n, _)| n == member)?
                    }
                    _ => {
                        diagnostics::error(self.pos(), "member access on non-struct type");
                        return None;
                    }
                };
                ctx.element_ptr(base_ptr, index, member)
            }
            Expr::Dereference { expr, .. } => expr.get_value(ctx),
            _ => {
                diagnostics::error(self.pos(), "expression is not an lvalue");
                None
            }
        }
    }
}

fn fold_unary(op: UnaryOp, c: &ConstExpr, pos: &SourcePos) -> Option<ConstExpr> {
    let folded = c
        .values
        .iter()
        .map(|v| match (op, *v) {
            (UnaryOp::Negate, ConstScalar::SInt(x)) => Some(ConstScalar::SInt(-x)),
            (UnaryOp::Negate, ConstScalar::Float(x)) => Some(ConstScalar::Float(-x)),
            (UnaryOp::LogicalNot, s) => Some(ConstScalar::Bool(!s.as_bool())),
            (UnaryOp::BitNot, ConstScalar::SInt(x)) => Some(ConstScalar::SInt(!x)),
            (UnaryOp::BitNot, ConstScalar::UInt(x)) => Some(ConstScalar::UInt(!x)),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    let ty = match op {
        UnaryOp::LogicalNot => {
            if c.ty.is_uniform() {
                Type::uniform_bool()
            } else {
                Type::varying_bool()
            }
        }
        _ => c.ty.clone(),
    };
    Some(ConstExpr {
        ty,
        values: folded,
        pos: pos.clone(),
    })
}

fn fold_binary(op: BinaryOp, a: &ConstExpr, b: &ConstExpr, pos: &SourcePos) -> Option<ConstExpr> {
    let fold_one = |x: ConstScalar, y: ConstScalar| -> Option<ConstScalar> {
        match (x, y) {
            (ConstScalar::SInt(x), ConstScalar::SInt(y)) => match op {
                BinaryOp::Add => Some(ConstScalar::SInt(x.wrapping_add(y))),
                BinaryOp::Sub => Some(ConstScalar::SInt(x.wrapping_sub(y))),
                BinaryOp::Mul => Some(ConstScalar::SInt(x.wrapping_mul(y))),
                BinaryOp::Div => {
                    if y == 0 {
                        None
                    } else {
                        Some(ConstScalar::SInt(x.wrapping_div(y)))
                    }
                }
                BinaryOp::And => Some(ConstScalar::SInt(x & y)),
                BinaryOp::Or => Some(ConstScalar::SInt(x | y)),
                BinaryOp::Xor => Some(ConstScalar::SInt(x ^ y)),
                BinaryOp::Eq => Some(ConstScalar::Bool(x == y)),
                BinaryOp::Ne => Some(ConstScalar::Bool(x != y)),
                BinaryOp::Lt => Some(ConstScalar::Bool(x < y)),
                BinaryOp::Le => Some(ConstScalar::Bool(x <= y)),
                BinaryOp::Gt => Some(ConstScalar::Bool(x > y)),
                BinaryOp::Ge => Some(ConstScalar::Bool(x >= y)),
            },
            (ConstScalar::Float(x), ConstScalar::Float(y)) => match op {
                BinaryOp::Add => Some(ConstScalar::Float(x + y)),
                BinaryOp::Sub => Some(ConstScalar::Float(x - y)),
                BinaryOp::Mul => Some(ConstScalar::Float(x * y)),
                BinaryOp::Div => Some(ConstScalar::Float(x / y)),
                BinaryOp::Eq => Some(ConstScalar::Bool(x == y)),
                BinaryOp::Ne => Some(ConstScalar::Bool(x != y)),
                BinaryOp::Lt => Some(ConstScalar::Bool(x < y)),
                BinaryOp::Le => Some(ConstScalar::Bool(x <= y)),
                BinaryOp::Gt => Some(ConstScalar::Bool(x > y)),
                BinaryOp::Ge => Some(ConstScalar::Bool(x >= y)),
                _ => None,
            },
            (ConstScalar::Bool(x), ConstScalar::Bool(y)) => match op {
                BinaryOp::And => Some(ConstScalar::Bool(x && y)),
                BinaryOp::Or => Some(ConstScalar::Bool(x || y)),
                BinaryOp::Xor => Some(ConstScalar::Bool(x != y)),
                BinaryOp::Eq => Some(ConstScalar::Bool(x == y)),
                BinaryOp::Ne => Some(ConstScalar::Bool(x != y)),
                _ => None,
            },
            _ => None,
        }
    };

    if a.values.len() != b.values.len() {
        return None;
    }
    let folded = a
        .values
        .iter()
        .zip(b.values.iter())
        .map(|(x, y)| fold_one(*x, *y))
        .collect::<Option<Vec<_>>>()?;
    let ty = if op.is_comparison() {
        if a.ty.is_uniform() {
            Type::uniform_bool()
        } else {
            Type::varying_bool()
        }
    } else {
        a.ty.clone()
    };
    Some(ConstExpr {
        ty,
        values: folded,
        pos: pos.clone(),
    })
}

/// Wrap `expr` in a cast to `to` when the types differ; report an error
/// (mentioning `reason`) and reject when no conversion exists.
pub fn type_convert_expr(expr: Box<Expr>, to: &Type, reason: &str) -> Option<Box<Expr>> {
    let from = match expr.get_type() {
        Some(t) => t,
        None => return None,
    };
    if from.equal_ignoring_const(to) {
        return Some(expr);
    }
    // Varying-to-uniform narrowing loses per-lane values; everything else
    // scalar-shaped converts through a cast.
    let convertible = from.is_atomic_or_enum()
        && to.is_atomic_or_enum()
        && !(from.is_varying() && to.is_uniform());
    if !convertible {
        diagnostics::error(
            expr.pos(),
            format!(
                "can't convert type \"{}\" to \"{}\" for {}",
                from, to, reason
            ),
        );
        return None;
    }
    let pos = expr.pos().clone();
    Some(Box::new(Expr::Cast {
        to: to.as_non_const(),
        expr,
        pos,
    }))
}
