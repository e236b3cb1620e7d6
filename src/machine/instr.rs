//! The closed target instruction set and the instruction/data lists.
//!
//! Each executable instruction knows its mnemonic, which mailboxes it
//! references, and whether executing it leaves the accumulator holding a
//! value unrelated to the last explicit load ([`Instruction::mutates_acc`]).
//! That last bit is the one piece of semantic knowledge every optimisation
//! pass relies on.

use std::fmt;
use std::rc::Rc;

use super::mailbox::{Label, Mailbox};
use super::{MachineError, MachineResult, Value};

/// Branch condition variants for the three branch mnemonics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    /// `BRA`: branch unconditionally.
    Always,
    /// `BRP`: branch when the accumulator is positive or zero.
    IfPositive,
    /// `BRZ`: branch when the accumulator is zero.
    IfZero,
}

impl BranchKind {
    pub fn mnemonic(self) -> &'static str {
        match self {
            BranchKind::Always => "BRA",
            BranchKind::IfPositive => "BRP",
            BranchKind::IfZero => "BRZ",
        }
    }
}

/// An executable target instruction.
///
/// `Labelled` wraps any other instruction with a jump target; the wrapper
/// delegates its accumulator flag to the wrapped instruction.
#[derive(Debug, Clone)]
pub enum Instruction {
    Load(Rc<Mailbox>),
    Store(Rc<Mailbox>),
    Add(Rc<Mailbox>),
    Sub(Rc<Mailbox>),
    Input,
    Output,
    Halt,
    Branch(BranchKind, Rc<Label>),
    Labelled(Rc<Label>, Box<Instruction>),
}

impl Instruction {
    pub fn name(&self) -> &'static str {
        match self {
            Instruction::Load(_) => "Load",
            Instruction::Store(_) => "Store",
            Instruction::Add(_) => "Add",
            Instruction::Sub(_) => "Sub",
            Instruction::Input => "Input",
            Instruction::Output => "Output",
            Instruction::Halt => "Halt",
            Instruction::Branch(..) => "Branch",
            Instruction::Labelled(_, inner) => inner.name(),
        }
    }

    /// Whether executing this instruction makes the accumulator's value
    /// untraceable to the most recent explicit load. `Input` mutates
    /// because its value is externally unknown.
    pub fn mutates_acc(&self) -> bool {
        match self {
            Instruction::Load(_)
            | Instruction::Add(_)
            | Instruction::Sub(_)
            | Instruction::Input => true,
            Instruction::Store(_)
            | Instruction::Output
            | Instruction::Halt
            | Instruction::Branch(..) => false,
            Instruction::Labelled(_, inner) => inner.mutates_acc(),
        }
    }

    /// The mailboxes this instruction references, for usage counting.
    pub fn mailboxes(&self) -> Vec<&Rc<Mailbox>> {
        match self {
            Instruction::Load(m)
            | Instruction::Store(m)
            | Instruction::Add(m)
            | Instruction::Sub(m) => vec![m],
            Instruction::Labelled(_, inner) => inner.mailboxes(),
            _ => Vec::new(),
        }
    }

    /// Mutable access to the referenced mailboxes, for the propagation
    /// pass's alias rewrite.
    pub fn mailboxes_mut(&mut self) -> Vec<&mut Rc<Mailbox>> {
        match self {
            Instruction::Load(m)
            | Instruction::Store(m)
            | Instruction::Add(m)
            | Instruction::Sub(m) => vec![m],
            Instruction::Labelled(_, inner) => inner.mailboxes_mut(),
            _ => Vec::new(),
        }
    }

    /// The label attached by a `Labelled` wrapper, if any.
    pub fn attached_label(&self) -> Option<&Rc<Label>> {
        match self {
            Instruction::Labelled(label, _) => Some(label),
            _ => None,
        }
    }

    /// The instruction itself, unwrapped from any `Labelled` shell.
    pub fn unwrapped(&self) -> &Instruction {
        match self {
            Instruction::Labelled(_, inner) => inner.unwrapped(),
            other => other,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Load(m) => write!(f, "LDA {m}"),
            Instruction::Store(m) => write!(f, "STA {m}"),
            Instruction::Add(m) => write!(f, "ADD {m}"),
            Instruction::Sub(m) => write!(f, "SUB {m}"),
            Instruction::Input => f.write_str("INP"),
            Instruction::Output => f.write_str("OUT"),
            Instruction::Halt => f.write_str("HLT"),
            Instruction::Branch(kind, label) => write!(f, "{} {label}", kind.mnemonic()),
            Instruction::Labelled(label, inner) => write!(f, "{label} {inner}"),
        }
    }
}

/// A `DAT` declaration: reserves a mailbox with an initial value. Stored
/// apart from the executable instructions and rendered after them.
#[derive(Debug, Clone)]
pub struct DataInstr {
    pub value: Value,
    pub mailbox: Rc<Mailbox>,
}

impl DataInstr {
    pub fn new(value: Value, mailbox: Rc<Mailbox>) -> Self {
        Self { value, mailbox }
    }
}

impl fmt::Display for DataInstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} DAT {}", self.mailbox, self.value)
    }
}

/// The executable instructions and data declarations of a program, kept
/// as two parallel sequences.
#[derive(Debug, Clone, Default)]
pub struct InstructionList {
    pub instructions: Vec<Instruction>,
    pub data: Vec<DataInstr>,
}

impl InstructionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, instr: Instruction) {
        self.instructions.push(instr);
    }

    pub fn push_data(&mut self, data: DataInstr) {
        self.data.push(data);
    }

    /// Removes every data declaration for `identifier`.
    pub fn remove_data(&mut self, identifier: &str) -> MachineResult<()> {
        let before = self.data.len();
        self.data.retain(|d| d.mailbox.identifier() != identifier);

        if self.data.len() == before {
            return Err(MachineError::NoSuchDeclaration {
                identifier: identifier.to_string(),
            });
        }

        Ok(())
    }
}

impl fmt::Display for InstructionList {
    /// Renders the program: labelled lines get their label in the left
    /// column, every mnemonic starts at (longest label + 1); data
    /// declarations follow after a blank line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let longest = self
            .instructions
            .iter()
            .filter_map(|i| i.attached_label())
            .map(|l| l.identifier().len())
            .max()
            .unwrap_or(0);

        // Unlabelled lines are padded to the same column; no labels at all
        // means no padding.
        let column = if longest == 0 { 0 } else { longest + 1 };

        for instr in &self.instructions {
            match instr {
                Instruction::Labelled(label, inner) => {
                    let pad = column - label.identifier().len();
                    writeln!(f, "{label}{}{inner}", " ".repeat(pad))?;
                }
                other => {
                    writeln!(f, "{}{other}", " ".repeat(column))?;
                }
            }
        }

        if !self.data.is_empty() {
            writeln!(f)?;
            for d in &self.data {
                writeln!(f, "{d}")?;
            }
        }

        Ok(())
    }
}
