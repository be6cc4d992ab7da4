//! Block-structured IL emission.
//!
//! `FunctionBuilder` owns the block arena for one function while lowering
//! runs: blocks are created ahead of time (so forward jumps need no
//! patching), instructions go to the current block, and `finish` seals
//! every block with exactly one terminator.

use super::{Block, BlockId, IlFunction, Instruction, Op, Terminator, Width};
use crate::source::SourceSpan;

#[derive(Debug)]
struct OpenBlock {
    label: String,
    instructions: Vec<Instruction>,
    terminator: Option<Terminator>,
}

#[derive(Debug)]
pub struct FunctionBuilder {
    name: String,
    frame_base: u16,
    blocks: Vec<OpenBlock>,
    current: BlockId,
    location: Option<SourceSpan>,
    width: Width,
}

impl FunctionBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>, frame_base: u16) -> Self {
        Self {
            name: name.into(),
            frame_base,
            blocks: vec![OpenBlock {
                label: "entry".to_owned(),
                instructions: Vec::new(),
                terminator: None,
            }],
            current: BlockId::new(0),
            location: None,
            width: Width::Byte,
        }
    }

    /// Sets the source location stamped on subsequent instructions.
    pub fn set_location(&mut self, location: Option<SourceSpan>) {
        self.location = location;
    }

    /// Sets the operand width of subsequent instructions.
    pub fn set_width(&mut self, width: Width) {
        self.width = width;
    }

    /// Creates a new, empty block. The label gets an index suffix so
    /// renderings stay unambiguous.
    pub fn new_block(&mut self, label: &str) -> BlockId {
        let id = BlockId::new(self.blocks.len());
        self.blocks.push(OpenBlock {
            label: format!("{label}_{}", id.index()),
            instructions: Vec::new(),
            terminator: None,
        });
        id
    }

    /// Redirects emission to `block`.
    pub fn switch_to(&mut self, block: BlockId) {
        self.current = block;
    }

    #[must_use]
    pub fn current_block(&self) -> BlockId {
        self.current
    }

    /// Whether the current block already ended.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.blocks[self.current.index()].terminator.is_some()
    }

    /// Appends an instruction to the current block.
    ///
    /// Emitting into a terminated block is a lowering bug; the builder
    /// drops the instruction rather than corrupting the block.
    pub fn emit(&mut self, op: Op) {
        let block = &mut self.blocks[self.current.index()];
        if block.terminator.is_some() {
            debug_assert!(false, "emit into terminated block {}", block.label);
            return;
        }
        block.instructions.push(Instruction {
            op,
            width: self.width,
            location: self.location,
        });
    }

    /// Seals the current block. A second terminator is ignored; the first
    /// exit wins, matching source order.
    pub fn terminate(&mut self, terminator: Terminator) {
        let block = &mut self.blocks[self.current.index()];
        if block.terminator.is_none() {
            block.terminator = Some(terminator);
        }
    }

    /// Seals all remaining blocks and produces the function. Unterminated
    /// blocks fall back to `Ret` (the implicit return path).
    #[must_use]
    pub fn finish(self) -> IlFunction {
        let blocks = self
            .blocks
            .into_iter()
            .enumerate()
            .map(|(index, block)| Block {
                id: BlockId::new(index),
                label: block.label,
                instructions: block.instructions,
                terminator: block.terminator.unwrap_or(Terminator::Ret),
            })
            .collect();
        IlFunction {
            name: self.name,
            frame_base: self.frame_base,
            entry: BlockId::new(0),
            blocks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::Place;

    #[test]
    fn entry_block_exists_and_collects_instructions() {
        let mut b = FunctionBuilder::new("main::f", 0x0200);
        b.emit(Op::LoadImm(1));
        b.emit(Op::Store(Place::Slot { address: 0x0200 }));
        b.terminate(Terminator::Ret);
        let function = b.finish();
        assert_eq!(function.blocks.len(), 1);
        assert_eq!(function.block(function.entry).instructions.len(), 2);
        assert_eq!(function.block(function.entry).terminator, Terminator::Ret);
    }

    #[test]
    fn forward_jumps_reference_pre_created_blocks() {
        let mut b = FunctionBuilder::new("main::f", 0x0200);
        let then_block = b.new_block("then");
        let end_block = b.new_block("end");
        b.emit(Op::LoadImm(1));
        b.emit(Op::Cmp(crate::il::Value::Imm(0)));
        b.terminate(Terminator::Branch {
            cond: crate::il::Cond::Ne,
            then_to: then_block,
            else_to: end_block,
        });
        b.switch_to(then_block);
        b.emit(Op::LoadImm(2));
        b.terminate(Terminator::Jump(end_block));
        b.switch_to(end_block);
        b.terminate(Terminator::Ret);
        let function = b.finish();
        assert_eq!(function.blocks.len(), 3);
        assert!(function.blocks.iter().all(|block| match block.terminator {
            Terminator::Jump(to) => to.index() < function.blocks.len(),
            Terminator::Branch { then_to, else_to, .. } => {
                then_to.index() < function.blocks.len() && else_to.index() < function.blocks.len()
            }
            Terminator::Ret => true,
        }));
    }

    #[test]
    fn first_terminator_wins() {
        let mut b = FunctionBuilder::new("main::f", 0x0200);
        b.terminate(Terminator::Ret);
        let other = b.new_block("dead");
        b.terminate(Terminator::Jump(other));
        let function = b.finish();
        assert_eq!(function.block(function.entry).terminator, Terminator::Ret);
    }
}
