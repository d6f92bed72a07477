//! Editable method bodies.
//!
//! Instructions are kept in a `Vec` ordered by their original byte offset. An
//! [`InstructionId`] is a position in that vector; branch operands and exception region
//! boundaries refer to instructions by id, and [`MethodBody::previous`] / [`MethodBody::next`]
//! give the doubly linked view the rest of the model expects.

use std::fmt;

use crate::document::{
    opcodes::{OpCode, OperandKind},
    CallSite, FieldReference, MemberReference, MethodReference, TypeReference,
};

/// Position of an instruction inside its [`MethodBody`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstructionId(pub usize);

/// A decoded, resolved instruction operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand
    None,
    /// 8-bit immediate (`ldc.i4.s`, `unaligned.`, `no.`)
    Int8(i8),
    /// 32-bit immediate
    Int32(i32),
    /// 64-bit immediate
    Int64(i64),
    /// 32-bit float immediate
    Float32(f32),
    /// 64-bit float immediate
    Float64(f64),
    /// User string
    String(String),
    /// Local variable index
    Local(u16),
    /// Argument index, including `this` for instance methods
    Argument(u16),
    /// Branch target
    Target(InstructionId),
    /// Switch table targets
    Targets(Vec<InstructionId>),
    /// Type token
    Type(TypeReference),
    /// Method token
    Method(MethodReference),
    /// Field token
    Field(FieldReference),
    /// `ldtoken` operand
    Token(MemberReference),
    /// `calli` signature
    CallSite(CallSite),
}

/// One instruction of a [`MethodBody`].
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Byte offset in the original instruction stream
    pub offset: u32,
    /// The opcode
    pub opcode: &'static OpCode,
    /// The resolved operand
    pub operand: Operand,
}

impl Instruction {
    /// Create an instruction.
    #[must_use]
    pub fn new(offset: u32, opcode: &'static OpCode, operand: Operand) -> Self {
        Instruction {
            offset,
            opcode,
            operand,
        }
    }

    /// Encoded size in bytes: opcode plus operand.
    #[must_use]
    pub fn size(&self) -> u32 {
        let operand = match self.opcode.operand.fixed_size() {
            Some(size) => size,
            None => match &self.operand {
                #[allow(clippy::cast_possible_truncation)]
                Operand::Targets(targets) => 4 + 4 * targets.len() as u32,
                _ => 4,
            },
        };
        self.opcode.size() + operand
    }

    /// Offset of the instruction that follows.
    #[must_use]
    pub fn next_offset(&self) -> u32 {
        self.offset + self.size()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04x}: {}", self.offset, self.opcode)?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Int8(value) => write!(f, " {value}"),
            Operand::Int32(value) => write!(f, " {value}"),
            Operand::Int64(value) => write!(f, " {value}"),
            Operand::Float32(value) => write!(f, " {value}"),
            Operand::Float64(value) => write!(f, " {value}"),
            Operand::String(value) => write!(f, " {value:?}"),
            Operand::Local(index) => write!(f, " V_{index}"),
            Operand::Argument(index) => write!(f, " A_{index}"),
            Operand::Target(target) => write!(f, " #{}", target.0),
            Operand::Targets(targets) => {
                let targets: Vec<String> = targets.iter().map(|t| format!("#{}", t.0)).collect();
                write!(f, " ({})", targets.join(", "))
            }
            Operand::Type(ty) => write!(f, " {ty}"),
            Operand::Method(method) => write!(f, " {method}"),
            Operand::Field(field) => write!(f, " {field}"),
            Operand::Token(member) => write!(f, " {member}"),
            Operand::CallSite(site) => write!(f, " {site}"),
        }
    }
}

/// Kind of a protected region handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionRegionKind {
    /// Typed catch
    Catch,
    /// Filter plus handler
    Filter,
    /// Finally
    Finally,
    /// Fault
    Fault,
}

/// A protected region with its handler.
///
/// End boundaries are exclusive. `None` marks an open end: the region runs to the end of the
/// body, one past the last instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionRegion {
    /// Handler kind
    pub kind: ExceptionRegionKind,
    /// First protected instruction
    pub try_start: InstructionId,
    /// First instruction after the protected block
    pub try_end: Option<InstructionId>,
    /// First filter instruction, for [`ExceptionRegionKind::Filter`]
    pub filter_start: Option<InstructionId>,
    /// First handler instruction
    pub handler_start: InstructionId,
    /// First instruction after the handler
    pub handler_end: Option<InstructionId>,
    /// Caught type, for [`ExceptionRegionKind::Catch`]
    pub catch_type: Option<TypeReference>,
}

/// A local variable slot.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    /// Variable type, wrapped in [`TypeReference::Pinned`] for pinned locals
    pub variable_type: TypeReference,
}

/// The body of a [`crate::document::MethodDefinition`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MethodBody {
    /// Offset ordered instructions
    pub instructions: Vec<Instruction>,
    /// Local variables
    pub variables: Vec<VariableDefinition>,
    /// Protected regions in declaration order
    pub exception_regions: Vec<ExceptionRegion>,
    /// Maximum evaluation stack depth
    pub max_stack: u16,
    /// Zero initialize locals
    pub init_locals: bool,
}

impl MethodBody {
    /// Instruction by id.
    #[must_use]
    pub fn instruction(&self, id: InstructionId) -> Option<&Instruction> {
        self.instructions.get(id.0)
    }

    /// The instruction before `id`.
    #[must_use]
    pub fn previous(&self, id: InstructionId) -> Option<InstructionId> {
        if id.0 == 0 || id.0 > self.instructions.len() {
            return None;
        }
        Some(InstructionId(id.0 - 1))
    }

    /// The instruction after `id`.
    #[must_use]
    pub fn next(&self, id: InstructionId) -> Option<InstructionId> {
        let next = id.0 + 1;
        (next < self.instructions.len()).then_some(InstructionId(next))
    }

    /// Size of the original instruction stream.
    #[must_use]
    pub fn code_size(&self) -> u32 {
        self.instructions
            .last()
            .map_or(0, Instruction::next_offset)
    }

    /// Byte offset of a region boundary, resolving an open end to [`MethodBody::code_size`].
    #[must_use]
    pub fn boundary_offset(&self, boundary: Option<InstructionId>) -> u32 {
        match boundary.and_then(|id| self.instruction(id)) {
            Some(instruction) => instruction.offset,
            None => self.code_size(),
        }
    }

    /// Whether the body uses an operand kind that refers to another instruction.
    #[must_use]
    pub fn has_branches(&self) -> bool {
        self.instructions.iter().any(|i| {
            matches!(
                i.opcode.operand,
                OperandKind::ShortInlineBrTarget
                    | OperandKind::InlineBrTarget
                    | OperandKind::InlineSwitch
            )
        })
    }
}
