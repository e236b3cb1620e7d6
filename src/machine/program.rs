//! A program under construction: one memory registry plus the emitted
//! instruction and data lists.

use std::fmt;
use std::rc::Rc;

use super::instr::{DataInstr, Instruction, InstructionList};
use super::mailbox::{Label, Mailbox};
use super::memory::{Memory, MemoryOp};
use super::{Address, MachineResult, Value};

/// Owns exactly one [`Memory`] and one [`InstructionList`]. Grown
/// monotonically during instruction selection, then mutated in place by
/// the optimisation passes.
#[derive(Debug, Default)]
pub struct Program {
    pub memory: Memory,
    pub instructions: InstructionList,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends executable instructions and data declarations.
    pub fn add_instructions(
        &mut self,
        instructions: impl IntoIterator<Item = Instruction>,
        defs: impl IntoIterator<Item = DataInstr>,
    ) {
        for instr in instructions {
            self.instructions.push(instr);
        }
        for def in defs {
            self.instructions.push_data(def);
        }
    }

    /// Commits a pending memory operation: registers its new mailboxes
    /// and labels and records their data declarations. Fails on registry
    /// collisions.
    pub fn add_memory_op(&mut self, op: &MemoryOp) -> MachineResult<()> {
        for pair in op.new_boxes() {
            self.memory.add_mailbox(pair.mailbox.clone())?;
        }

        for pair in op.new_labels() {
            self.memory.add_label(pair.label.clone())?;
        }

        self.add_instructions([], op.defs());
        Ok(())
    }

    /// Proposes and immediately commits a new mailbox.
    pub fn new_mailbox(
        &mut self,
        address: Address,
        identifier: Option<&str>,
    ) -> MachineResult<Rc<Mailbox>> {
        let op = self.memory.new_mailbox(address, identifier);
        self.add_memory_op(&op)?;
        Ok(op.mailbox())
    }

    /// Proposes and immediately commits a new label.
    pub fn new_label(&mut self, identifier: Option<&str>) -> MachineResult<Rc<Label>> {
        let op = self.memory.new_label(identifier);
        self.add_memory_op(&op)?;
        Ok(op.label())
    }

    /// Fetches (or creates and commits) the mailbox for a constant.
    pub fn constant(&mut self, value: Value) -> MachineResult<Rc<Mailbox>> {
        let op = self.memory.constant(value);
        self.add_memory_op(&op)?;
        Ok(op.mailbox())
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.instructions.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn committing_an_op_registers_boxes_and_defs() {
        let mut program = Program::new();
        let op = program.memory.new_mailbox(2, None);

        program.add_memory_op(&op).unwrap();

        assert!(program.memory.mailbox_at(2).is_some());
        assert_eq!(program.instructions.data.len(), 1);
    }

    #[test]
    fn constants_commit_once() {
        let mut program = Program::new();
        let a = program.constant(5).unwrap();
        let b = program.constant(5).unwrap();

        assert_eq!(a.identifier(), b.identifier());
        assert_eq!(program.instructions.data.len(), 1);
        assert_eq!(program.memory.mailboxes().len(), 1);
    }

    #[test]
    fn colliding_commit_fails() {
        let mut program = Program::new();
        program.new_mailbox(1, Some("A")).unwrap();

        let op = program.memory.new_mailbox(1, Some("B"));
        assert!(program.add_memory_op(&op).is_err());
        assert!(program.memory.mailbox_named("B").is_none());
    }
}
