//! The type-system surface consumed by the statement core.
//!
//! Every value in gang carries a variability attribute: `uniform` values
//! are identical across all program instances in the gang, `varying`
//! values are potentially distinct per lane. Types here are plain data;
//! the interesting mask-propagation questions are answered by the
//! predicates (`is_uniform`, `is_bool`, ...) that statement type checking
//! and lowering ask.

use std::fmt;

use crate::ir::IrType;
use crate::CompileContext;

/// Whether a value is shared by the whole gang or distinct per lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variability {
    Uniform,
    Varying,
}

/// The scalar kinds of the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomicKind {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float,
    Int64,
    UInt64,
    Double,
}

impl AtomicKind {
    pub fn is_numeric(self) -> bool {
        !matches!(self, AtomicKind::Bool)
    }

    fn name(self) -> &'static str {
        match self {
            AtomicKind::Bool => "bool",
            AtomicKind::Int8 => "int8",
            AtomicKind::UInt8 => "unsigned int8",
            AtomicKind::Int16 => "int16",
            AtomicKind::UInt16 => "unsigned int16",
            AtomicKind::Int32 => "int32",
            AtomicKind::UInt32 => "unsigned int32",
            AtomicKind::Float => "float",
            AtomicKind::Int64 => "int64",
            AtomicKind::UInt64 => "unsigned int64",
            AtomicKind::Double => "double",
        }
    }

    fn scalar_ir_type(self) -> IrType {
        match self {
            AtomicKind::Bool => IrType::Bool,
            AtomicKind::Int8 | AtomicKind::UInt8 => IrType::I8,
            AtomicKind::Int16 | AtomicKind::UInt16 => IrType::I16,
            AtomicKind::Int32 | AtomicKind::UInt32 => IrType::I32,
            AtomicKind::Int64 | AtomicKind::UInt64 => IrType::I64,
            AtomicKind::Float => IrType::F32,
            AtomicKind::Double => IrType::F64,
        }
    }
}

/// A gang type.
///
/// `Array` with `count == 0` denotes an unsized array; declaration
/// lowering either fixes the size from a brace initializer or rejects the
/// declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Atomic {
        kind: AtomicKind,
        variability: Variability,
        is_const: bool,
    },
    Enum {
        name: String,
        variability: Variability,
        is_const: bool,
    },
    Array {
        element: Box<Type>,
        count: usize,
    },
    Vector {
        element: Box<Type>,
        count: usize,
    },
    Struct {
        name: String,
        members: Vec<(String, Type)>,
    },
    Reference {
        target: Box<Type>,
    },
    Pointer {
        pointee: Box<Type>,
        variability: Variability,
    },
}

impl Type {
    pub fn atomic(kind: AtomicKind, variability: Variability) -> Type {
        Type::Atomic {
            kind,
            variability,
            is_const: false,
        }
    }

    pub fn uniform_bool() -> Type {
        Type::atomic(AtomicKind::Bool, Variability::Uniform)
    }

    pub fn varying_bool() -> Type {
        Type::atomic(AtomicKind::Bool, Variability::Varying)
    }

    pub fn uniform_int32() -> Type {
        Type::atomic(AtomicKind::Int32, Variability::Uniform)
    }

    pub fn varying_int32() -> Type {
        Type::atomic(AtomicKind::Int32, Variability::Varying)
    }

    /// Is every component of this type uniform?
    pub fn is_uniform(&self) -> bool {
        match self {
            Type::Atomic { variability, .. }
            | Type::Enum { variability, .. }
            | Type::Pointer { variability, .. } => *variability == Variability::Uniform,
            Type::Array { element, .. } | Type::Vector { element, .. } => element.is_uniform(),
            Type::Struct { members, .. } => members.iter().all(|(_, t)| t.is_uniform()),
            Type::Reference { target } => target.is_uniform(),
        }
    }

    pub fn is_varying(&self) -> bool {
        !self.is_uniform()
    }

    pub fn is_bool(&self) -> bool {
        matches!(
            self,
            Type::Atomic {
                kind: AtomicKind::Bool,
                ..
            }
        )
    }

    /// Numeric types can be converted to boolean for control-flow tests.
    pub fn is_numeric(&self) -> bool {
        match self {
            Type::Atomic { kind, .. } => kind.is_numeric(),
            Type::Enum { .. } => true,
            _ => false,
        }
    }

    pub fn is_const_type(&self) -> bool {
        match self {
            Type::Atomic { is_const, .. } | Type::Enum { is_const, .. } => *is_const,
            _ => false,
        }
    }

    /// Atomic and enum types; these reject brace initializers.
    pub fn is_atomic_or_enum(&self) -> bool {
        matches!(self, Type::Atomic { .. } | Type::Enum { .. })
    }

    /// Struct, array and vector types: initialized either elementwise from
    /// a brace list or rejected for other aggregate initializers.
    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            Type::Array { .. } | Type::Vector { .. } | Type::Struct { .. }
        )
    }

    /// Number of elements of a collection type. Zero for unsized arrays.
    pub fn element_count(&self) -> Option<usize> {
        match self {
            Type::Array { count, .. } | Type::Vector { count, .. } => Some(*count),
            Type::Struct { members, .. } => Some(members.len()),
            _ => None,
        }
    }

    /// Type of the `i`-th element of a collection type.
    pub fn element_type(&self, i: usize) -> Option<&Type> {
        match self {
            Type::Array { element, .. } | Type::Vector { element, .. } => Some(element),
            Type::Struct { members, .. } => members.get(i).map(|(_, t)| t),
            _ => None,
        }
    }

    /// A sized copy of an unsized array type.
    pub fn with_size(&self, count: usize) -> Option<Type> {
        match self {
            Type::Array { element, .. } => Some(Type::Array {
                element: element.clone(),
                count,
            }),
            _ => None,
        }
    }

    pub fn reference_target(&self) -> Option<&Type> {
        match self {
            Type::Reference { target } => Some(target),
            _ => None,
        }
    }

    /// The same type with the const qualifier stripped (scalars only; the
    /// qualifier is not carried anywhere else).
    pub fn as_non_const(&self) -> Type {
        match self {
            Type::Atomic {
                kind, variability, ..
            } => Type::Atomic {
                kind: *kind,
                variability: *variability,
                is_const: false,
            },
            Type::Enum {
                name, variability, ..
            } => Type::Enum {
                name: name.clone(),
                variability: *variability,
                is_const: false,
            },
            other => other.clone(),
        }
    }

    /// The uniform view of this type (used when classifying print
    /// arguments independent of their variability).
    pub fn as_uniform(&self) -> Type {
        match self {
            Type::Atomic { kind, is_const, .. } => Type::Atomic {
                kind: *kind,
                variability: Variability::Uniform,
                is_const: *is_const,
            },
            Type::Enum { name, is_const, .. } => Type::Enum {
                name: name.clone(),
                variability: Variability::Uniform,
                is_const: *is_const,
            },
            Type::Pointer { pointee, .. } => Type::Pointer {
                pointee: pointee.clone(),
                variability: Variability::Uniform,
            },
            other => other.clone(),
        }
    }

    /// The varying counterpart of this type.
    pub fn as_varying(&self) -> Type {
        match self {
            Type::Atomic { kind, is_const, .. } => Type::Atomic {
                kind: *kind,
                variability: Variability::Varying,
                is_const: *is_const,
            },
            Type::Enum { name, is_const, .. } => Type::Enum {
                name: name.clone(),
                variability: Variability::Varying,
                is_const: *is_const,
            },
            Type::Pointer { pointee, .. } => Type::Pointer {
                pointee: pointee.clone(),
                variability: Variability::Varying,
            },
            other => other.clone(),
        }
    }

    /// Structural equality modulo the const qualifier.
    pub fn equal_ignoring_const(&self, other: &Type) -> bool {
        self.as_non_const() == other.as_non_const()
    }

    /// Map this type onto the target IR. Uniform atomics become scalars,
    /// varying atomics become vectors at the gang width; a varying bool is
    /// the mask register type itself.
    pub fn ir_type(&self, g: &CompileContext) -> IrType {
        let width = g.target.vector_width;
        match self {
            Type::Atomic {
                kind, variability, ..
            } => match variability {
                Variability::Uniform => kind.scalar_ir_type(),
                Variability::Varying => {
                    if *kind == AtomicKind::Bool {
                        IrType::Mask
                    } else {
                        IrType::Vector(Box::new(kind.scalar_ir_type()), width)
                    }
                }
            },
            Type::Enum { variability, .. } => match variability {
                Variability::Uniform => IrType::I32,
                Variability::Varying => IrType::Vector(Box::new(IrType::I32), width),
            },
            Type::Array { element, count } | Type::Vector { element, count } => {
                IrType::Array(Box::new(element.ir_type(g)), *count)
            }
            Type::Struct { members, .. } => {
                IrType::Struct(members.iter().map(|(_, t)| t.ir_type(g)).collect())
            }
            Type::Reference { .. } | Type::Pointer { .. } => IrType::Ptr,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Atomic {
                kind,
                variability,
                is_const,
            } => {
                if *is_const {
                    write!(f, "const ")?;
                }
                let v = match variability {
                    Variability::Uniform => "uniform",
                    Variability::Varying => "varying",
                };
                write!(f, "{} {}", v, kind.name())
            }
            Type::Enum {
                name, variability, ..
            } => {
                let v = match variability {
                    Variability::Uniform => "uniform",
                    Variability::Varying => "varying",
                };
                write!(f, "{} enum {}", v, name)
            }
            Type::Array { element, count } => {
                if *count == 0 {
                    write!(f, "{}[]", element)
                } else {
                    write!(f, "{}[{}]", element, count)
                }
            }
            Type::Vector { element, count } => write!(f, "{}<{}>", element, count),
            Type::Struct { name, .. } => write!(f, "struct {}", name),
            Type::Reference { target } => write!(f, "reference to {}", target),
            Type::Pointer { pointee, .. } => write!(f, "{} *", pointee),
        }
    }
}
