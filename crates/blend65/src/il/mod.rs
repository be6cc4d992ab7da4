//! The intermediate language.
//!
//! Linear, non-SSA, accumulator-centric: values flow through an implicit
//! accumulator, every instruction reads or writes it, and storage operands
//! are fixed addresses: frame slots, absolute locations, or symbolic
//! globals the emitter resolves when it places the data section. Basic
//! blocks end in exactly one terminator, enforced by construction.

pub use builder::FunctionBuilder;
pub use generator::{ModuleLowerInput, generate_il};

mod builder;
mod generator;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::source::SourceSpan;

/// Identifier of a basic block within one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(u32);

impl BlockId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index.try_into().expect("block arena overflow"))
    }

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A storage operand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Place {
    /// A frame slot at its statically allocated address.
    Slot { address: u16 },
    /// An absolute address (zero page, hardware register, scratch).
    Abs { address: u16 },
    /// A module-level variable or literal pool entry; the emitter assigns
    /// the final address when it lays out the data section.
    Global(String),
}

/// A source operand: immediate or storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Imm(u16),
    Place(Place),
}

/// Comparison conditions (unsigned, like the target).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Cond {
    #[must_use]
    pub fn negate(self) -> Self {
        match self {
            Self::Eq => Self::Ne,
            Self::Ne => Self::Eq,
            Self::Lt => Self::Ge,
            Self::Ge => Self::Lt,
            Self::Le => Self::Gt,
            Self::Gt => Self::Le,
        }
    }
}

/// Operand width, so the emitter knows whether X/Y must carry a high byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum Width {
    #[default]
    Byte,
    Word,
}

/// One IL operation. The accumulator is implicit in all of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    /// acc ← immediate.
    LoadImm(u16),
    /// acc ← memory.
    Load(Place),
    /// memory ← acc.
    Store(Place),
    /// acc ← *(pointer stored at place).
    LoadInd(Place),
    /// *(pointer stored at place) ← acc.
    StoreInd(Place),
    /// acc ← address of place (resolved by the emitter for globals).
    Lea(Place),
    Add(Value),
    Sub(Value),
    Mul(Value),
    Div(Value),
    Mod(Value),
    BitAnd(Value),
    BitOr(Value),
    BitXor(Value),
    Shl(Value),
    Shr(Value),
    /// acc ← two's complement of acc.
    Neg,
    /// acc ← logical complement of a 0/1 accumulator.
    Not,
    /// Compare acc with the operand, setting the condition state consumed
    /// by `SetIf` and branch terminators.
    Cmp(Value),
    /// acc ← 1 if the condition holds, else 0.
    SetIf(Cond),
    /// Transfer to a function; arguments were stored into the callee's
    /// parameter slots beforehand.
    Call(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub op: Op,
    pub width: Width,
    /// Present when source maps are enabled.
    pub location: Option<SourceSpan>,
}

/// The single exit of a basic block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Terminator {
    Jump(BlockId),
    /// Conditional jump consuming the last `Cmp`.
    Branch {
        cond: Cond,
        then_to: BlockId,
        else_to: BlockId,
    },
    Ret,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub label: String,
    pub instructions: Vec<Instruction>,
    pub terminator: Terminator,
}

/// One lowered function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IlFunction {
    /// Qualified `module::function` name.
    pub name: String,
    pub frame_base: u16,
    pub entry: BlockId,
    pub blocks: Vec<Block>,
}

impl IlFunction {
    #[must_use]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.instructions.len()).sum()
    }
}

/// One module-level data object the emitter will place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalData {
    /// Qualified `module::name`.
    pub name: String,
    pub size: usize,
    /// Initial bytes for `data` storage and literals; `None` = zeroed RAM.
    pub bytes: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IlModule {
    pub name: String,
    /// Simple function name → lowered function, in declaration order.
    pub functions: IndexMap<String, IlFunction>,
}

/// The whole lowered program handed to the emitter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IlProgram {
    pub modules: IndexMap<String, IlModule>,
    pub global_data: Vec<GlobalData>,
}

impl IlProgram {
    #[must_use]
    pub fn function(&self, qualified: &str) -> Option<&IlFunction> {
        let (module, name) = qualified.split_once("::")?;
        self.modules.get(module)?.functions.get(name)
    }

    /// Textual rendering, stable across runs; the determinism tests diff
    /// this form.
    #[must_use]
    pub fn render(&self) -> String {
        use std::fmt::Write as _;
        let mut out = String::new();
        for module in self.modules.values() {
            let _ = writeln!(out, "module {}", module.name);
            for function in module.functions.values() {
                let _ = writeln!(out, "  fn {} @ ${:04X}", function.name, function.frame_base);
                for block in &function.blocks {
                    let _ = writeln!(out, "  {}:", block.label);
                    for instruction in &block.instructions {
                        let _ = writeln!(out, "    {:?} ({})", instruction.op, instruction.width);
                    }
                    let _ = writeln!(out, "    {:?}", block.terminator);
                }
            }
        }
        for data in &self.global_data {
            let _ = writeln!(out, "data {} [{} bytes]", data.name, data.size);
        }
        out
    }
}
