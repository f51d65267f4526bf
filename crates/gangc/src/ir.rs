//! The target IR produced by the emit context.
//!
//! A deliberately small SSA-ish instruction set: enough to express mask
//! bookkeeping, control flow, stack and global storage, and runtime
//! calls. Values are handles into a per-function arena; constants are
//! values too (not instructions), so mask constants exist independently
//! of any basic block and the emit context can recognize the canonical
//! all-on mask statically.
//!
//! The textual dump rendered by the `Display` impls is the main
//! debugging and testing surface.

use std::fmt;

/// Handle for a value (constant or instruction result) within a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(pub(crate) u32);

impl ValueId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle for a basic block within a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub(crate) u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle for a module-level global.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalId(pub(crate) u32);

/// IR-level types.
///
/// `Mask` is the per-lane execution bitmap; it doubles as the
/// representation of varying booleans. Varying values of other scalar
/// kinds are `Vector`s at the gang width.
#[derive(Debug, Clone, PartialEq)]
pub enum IrType {
    Void,
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Mask,
    /// Opaque pointer.
    Ptr,
    Vector(Box<IrType>, usize),
    Array(Box<IrType>, usize),
    Struct(Vec<IrType>),
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Void => write!(f, "void"),
            IrType::Bool => write!(f, "i1"),
            IrType::I8 => write!(f, "i8"),
            IrType::I16 => write!(f, "i16"),
            IrType::I32 => write!(f, "i32"),
            IrType::I64 => write!(f, "i64"),
            IrType::F32 => write!(f, "f32"),
            IrType::F64 => write!(f, "f64"),
            IrType::Mask => write!(f, "mask"),
            IrType::Ptr => write!(f, "ptr"),
            IrType::Vector(elem, n) => write!(f, "<{} x {}>", n, elem),
            IrType::Array(elem, n) => write!(f, "[{} x {}]", n, elem),
            IrType::Struct(members) => {
                write!(f, "{{")?;
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", m)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Compile-time constants.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Bool(bool),
    Int { ty: IrType, value: i64 },
    Float { ty: IrType, value: f64 },
    /// The canonical all-lanes-on mask.
    MaskAllOn,
    /// The canonical all-lanes-off mask.
    MaskAllOff,
    /// Zero of any type.
    Zero(IrType),
    /// Undefined value (uninitialized stores).
    Undef(IrType),
    /// Null pointer.
    NullPtr,
    /// Address of an interned string.
    Str(String),
    /// Per-element aggregate (vector splats and brace-style constants).
    Aggregate(Vec<Constant>),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Bool(b) => write!(f, "{}", b),
            Constant::Int { ty, value } => write!(f, "{} {}", ty, value),
            Constant::Float { ty, value } => write!(f, "{} {}", ty, value),
            Constant::MaskAllOn => write!(f, "mask.all_on"),
            Constant::MaskAllOff => write!(f, "mask.all_off"),
            Constant::Zero(ty) => write!(f, "{} zero", ty),
            Constant::Undef(ty) => write!(f, "{} undef", ty),
            Constant::NullPtr => write!(f, "null"),
            Constant::Str(s) => write!(f, "str {:?}", s),
            Constant::Aggregate(elems) => {
                write!(f, "{{")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Two-operand arithmetic and bitwise operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Xor,
}

impl BinOp {
    fn name(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
        }
    }
}

/// Comparison predicates. Comparing vectors yields a mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn name(self) -> &'static str {
        match self {
            CmpOp::Eq => "eq",
            CmpOp::Ne => "ne",
            CmpOp::Lt => "lt",
            CmpOp::Le => "le",
            CmpOp::Gt => "gt",
            CmpOp::Ge => "ge",
        }
    }
}

/// Non-terminator instructions.
#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    Bin {
        op: BinOp,
        a: ValueId,
        b: ValueId,
    },
    Not {
        value: ValueId,
    },
    Cmp {
        op: CmpOp,
        a: ValueId,
        b: ValueId,
    },
    /// Lanewise select between `on_true` and `on_false` under `cond`.
    Select {
        cond: ValueId,
        on_true: ValueId,
        on_false: ValueId,
    },
    Alloca {
        ty: IrType,
        name: String,
    },
    GlobalAddr {
        global: GlobalId,
    },
    Load {
        ptr: ValueId,
    },
    Store {
        value: ValueId,
        ptr: ValueId,
    },
    /// Address of a constant-index element of an aggregate.
    ElementPtr {
        base: ValueId,
        index: usize,
        name: String,
    },
    /// Address of a dynamically-indexed element.
    ElementPtrDyn {
        base: ValueId,
        index: ValueId,
        name: String,
    },
    Bitcast {
        value: ValueId,
        ty: IrType,
    },
    /// Value-preserving numeric / variability conversion.
    Convert {
        value: ValueId,
        ty: IrType,
    },
    Call {
        callee: String,
        args: Vec<ValueId>,
    },
    /// Uniform true iff every lane of the mask is on.
    All {
        mask: ValueId,
    },
    /// Uniform true iff any lane of the mask is on.
    Any {
        mask: ValueId,
    },
    /// The mask as an integer bitmap (one bit per lane).
    LaneMask {
        mask: ValueId,
    },
}

/// Block terminators. A block whose terminator is `None` is still open.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Br(BlockId),
    CondBr {
        cond: ValueId,
        on_true: BlockId,
        on_false: BlockId,
    },
    Ret(Option<ValueId>),
    Unreachable,
}

/// A basic block: a label, an ordered instruction list and a terminator.
#[derive(Debug)]
pub struct Block {
    pub name: String,
    pub insts: Vec<(ValueId, Inst)>,
    pub term: Option<Terminator>,
}

/// What defines a value: a constant or an instruction in some block.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueDef {
    Const(Constant),
    Inst,
}

/// A function under construction or finished.
#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub return_type: IrType,
    pub blocks: Vec<Block>,
    defs: Vec<ValueDef>,
    types: Vec<IrType>,
}

impl Function {
    pub fn new(name: impl Into<String>, return_type: IrType) -> Function {
        Function {
            name: name.into(),
            return_type,
            blocks: Vec::new(),
            defs: Vec::new(),
            types: Vec::new(),
        }
    }

    pub fn add_block(&mut self, name: impl Into<String>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block {
            name: name.into(),
            insts: Vec::new(),
            term: None,
        });
        id
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    /// Register a constant value.
    pub fn add_constant(&mut self, c: Constant, ty: IrType) -> ValueId {
        let id = ValueId(self.defs.len() as u32);
        self.defs.push(ValueDef::Const(c));
        self.types.push(ty);
        id
    }

    /// Append an instruction to `block`, returning its result value.
    pub fn add_inst(&mut self, block: BlockId, inst: Inst, ty: IrType) -> ValueId {
        let id = ValueId(self.defs.len() as u32);
        self.defs.push(ValueDef::Inst);
        self.types.push(ty);
        self.blocks[block.index()].insts.push((id, inst));
        id
    }

    pub fn value_type(&self, v: ValueId) -> &IrType {
        &self.types[v.index()]
    }

    /// The constant defining `v`, if `v` is a constant value.
    pub fn constant_of(&self, v: ValueId) -> Option<&Constant> {
        match &self.defs[v.index()] {
            ValueDef::Const(c) => Some(c),
            ValueDef::Inst => None,
        }
    }

    /// Iterate over all instructions in block order.
    pub fn insts(&self) -> impl Iterator<Item = &Inst> {
        self.blocks.iter().flat_map(|b| b.insts.iter().map(|(_, i)| i))
    }

    /// All calls to `callee`, in emission order.
    pub fn calls_to(&self, callee: &str) -> Vec<&[ValueId]> {
        self.insts()
            .filter_map(|i| match i {
                Inst::Call { callee: c, args } if c == callee => Some(args.as_slice()),
                _ => None,
            })
            .collect()
    }

    /// Count instructions matching a predicate.
    pub fn count_insts(&self, pred: impl Fn(&Inst) -> bool) -> usize {
        self.insts().filter(|i| pred(i)).count()
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, v: ValueId) -> fmt::Result {
        match &self.defs[v.index()] {
            ValueDef::Const(c) => write!(f, "{}", c),
            ValueDef::Inst => write!(f, "%{}", v.0),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "fn @{} -> {} {{", self.name, self.return_type)?;
        for block in &self.blocks {
            writeln!(f, "{}:", block.name)?;
            for (id, inst) in &block.insts {
                write!(f, "  %{} = ", id.0)?;
                match inst {
                    Inst::Bin { op, a, b } => {
                        write!(f, "{} ", op.name())?;
                        self.fmt_operand(f, *a)?;
                        write!(f, ", ")?;
                        self.fmt_operand(f, *b)?;
                    }
                    Inst::Not { value } => {
                        write!(f, "not ")?;
                        self.fmt_operand(f, *value)?;
                    }
                    Inst::Cmp { op, a, b } => {
                        write!(f, "cmp.{} ", op.name())?;
                        self.fmt_operand(f, *a)?;
                        write!(f, ", ")?;
                        self.fmt_operand(f, *b)?;
                    }
                    Inst::Select {
                        cond,
                        on_true,
                        on_false,
                    } => {
                        write!(f, "select ")?;
                        self.fmt_operand(f, *cond)?;
                        write!(f, ", ")?;
                        self.fmt_operand(f, *on_true)?;
                        write!(f, ", ")?;
                        self.fmt_operand(f, *on_false)?;
                    }
                    Inst::Alloca { ty, name } => write!(f, "alloca {} ; {}", ty, name)?,
                    Inst::GlobalAddr { global } => write!(f, "global_addr @g{}", global.0)?,
                    Inst::Load { ptr } => {
                        write!(f, "load ")?;
                        self.fmt_operand(f, *ptr)?;
                    }
                    Inst::Store { value, ptr } => {
                        write!(f, "store ")?;
                        self.fmt_operand(f, *value)?;
                        write!(f, " -> ")?;
                        self.fmt_operand(f, *ptr)?;
                    }
                    Inst::ElementPtr { base, index, name } => {
                        write!(f, "elem_ptr ")?;
                        self.fmt_operand(f, *base)?;
                        write!(f, ", {} ; {}", index, name)?;
                    }
                    Inst::ElementPtrDyn { base, index, name } => {
                        write!(f, "elem_ptr ")?;
                        self.fmt_operand(f, *base)?;
                        write!(f, ", ")?;
                        self.fmt_operand(f, *index)?;
                        write!(f, " ; {}", name)?;
                    }
                    Inst::Bitcast { value, ty } => {
                        write!(f, "bitcast ")?;
                        self.fmt_operand(f, *value)?;
                        write!(f, " to {}", ty)?;
                    }
                    Inst::Convert { value, ty } => {
                        write!(f, "convert ")?;
                        self.fmt_operand(f, *value)?;
                        write!(f, " to {}", ty)?;
                    }
                    Inst::Call { callee, args } => {
                        write!(f, "call @{}(", callee)?;
                        for (i, a) in args.iter().enumerate() {
                            if i > 0 {
                                write!(f, ", ")?;
                            }
                            self.fmt_operand(f, *a)?;
                        }
                        write!(f, ")")?;
                    }
                    Inst::All { mask } => {
                        write!(f, "all ")?;
                        self.fmt_operand(f, *mask)?;
                    }
                    Inst::Any { mask } => {
                        write!(f, "any ")?;
                        self.fmt_operand(f, *mask)?;
                    }
                    Inst::LaneMask { mask } => {
                        write!(f, "lane_mask ")?;
                        self.fmt_operand(f, *mask)?;
                    }
                }
                writeln!(f)?;
            }
            match &block.term {
                Some(Terminator::Br(b)) => writeln!(f, "  br {}", self.blocks[b.index()].name)?,
                Some(Terminator::CondBr {
                    cond,
                    on_true,
                    on_false,
                }) => {
                    write!(f, "  br ")?;
                    self.fmt_operand(f, *cond)?;
                    writeln!(
                        f,
                        ", {}, {}",
                        self.blocks[on_true.index()].name,
                        self.blocks[on_false.index()].name
                    )?;
                }
                Some(Terminator::Ret(Some(v))) => {
                    write!(f, "  ret ")?;
                    self.fmt_operand(f, *v)?;
                    writeln!(f)?;
                }
                Some(Terminator::Ret(None)) => writeln!(f, "  ret void")?,
                Some(Terminator::Unreachable) => writeln!(f, "  unreachable")?,
                None => writeln!(f, "  <open>")?,
            }
        }
        writeln!(f, "}}")
    }
}

/// A module-level variable.
#[derive(Debug)]
pub struct Global {
    pub name: String,
    pub ty: IrType,
    pub init: Constant,
    pub internal_linkage: bool,
    pub is_const: bool,
}

/// A translation unit: globals plus functions.
#[derive(Debug, Default)]
pub struct Module {
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new() -> Module {
        Module::default()
    }

    pub fn add_global(&mut self, global: Global) -> GlobalId {
        let id = GlobalId(self.globals.len() as u32);
        self.globals.push(global);
        id
    }

    pub fn global(&self, id: GlobalId) -> &Global {
        &self.globals[id.0 as usize]
    }

    pub fn find_global(&self, name: &str) -> Option<&Global> {
        self.globals.iter().find(|g| g.name == name)
    }

    pub fn add_function(&mut self, function: Function) {
        self.functions.push(function);
    }

    pub fn find_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, g) in self.globals.iter().enumerate() {
            let linkage = if g.internal_linkage { "internal " } else { "" };
            let konst = if g.is_const { "const " } else { "" };
            writeln!(
                f,
                "@g{} = {}{}global {} {} ; {}",
                i, linkage, konst, g.ty, g.init, g.name
            )?;
        }
        for func in &self.functions {
            writeln!(f)?;
            write!(f, "{}", func)?;
        }
        Ok(())
    }
}
