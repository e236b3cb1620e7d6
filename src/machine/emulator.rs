//! A reference interpreter for finished programs.
//!
//! The emulator exists so tests can assert on what generated code *does*
//! (the output sequence for a given input sequence) instead of on its
//! exact spelling, which the optimisation passes are free to change.

use hashbrown::HashMap;
use thiserror::Error;

use super::instr::{BranchKind, Instruction};
use super::program::Program;
use super::Value;

#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error("branch to unknown label `{identifier}`")]
    UnknownLabel { identifier: String },

    #[error("input requested but the input queue is empty")]
    InputExhausted,

    #[error("step limit of {limit} exceeded")]
    StepLimit { limit: usize },
}

/// Executes a program's instruction list against its data declarations.
pub struct Emulator {
    instructions: Vec<Instruction>,
    labels: HashMap<String, usize>,
    store: HashMap<String, Value>,
}

impl Emulator {
    pub fn new(program: &Program) -> Self {
        let instructions = program.instructions.instructions.clone();

        let mut labels = HashMap::new();
        for (index, instr) in instructions.iter().enumerate() {
            if let Some(label) = instr.attached_label() {
                labels.insert(label.identifier().to_string(), index);
            }
        }

        let mut store = HashMap::new();
        for def in &program.instructions.data {
            store.insert(def.mailbox.identifier().to_string(), def.value);
        }

        Self {
            instructions,
            labels,
            store,
        }
    }

    /// Runs to completion (HLT or falling off the end), returning the
    /// emitted outputs. `max_steps` bounds runaway loops.
    pub fn run(
        &mut self,
        inputs: &[Value],
        max_steps: usize,
    ) -> Result<Vec<Value>, EmulatorError> {
        let mut inputs = inputs.iter().copied();
        let mut outputs = Vec::new();
        let mut acc: Value = 0;
        let mut pc = 0usize;
        let mut steps = 0usize;

        while pc < self.instructions.len() {
            steps += 1;
            if steps > max_steps {
                return Err(EmulatorError::StepLimit { limit: max_steps });
            }

            let mut jump = None;
            match self.instructions[pc].unwrapped() {
                Instruction::Load(m) => {
                    acc = self.store.get(m.identifier()).copied().unwrap_or(0);
                }
                Instruction::Store(m) => {
                    self.store.insert(m.identifier().to_string(), acc);
                }
                Instruction::Add(m) => {
                    acc += self.store.get(m.identifier()).copied().unwrap_or(0);
                }
                Instruction::Sub(m) => {
                    acc -= self.store.get(m.identifier()).copied().unwrap_or(0);
                }
                Instruction::Input => {
                    acc = inputs.next().ok_or(EmulatorError::InputExhausted)?;
                }
                Instruction::Output => outputs.push(acc),
                Instruction::Halt => break,
                Instruction::Branch(kind, label) => {
                    let taken = match kind {
                        BranchKind::Always => true,
                        BranchKind::IfPositive => acc >= 0,
                        BranchKind::IfZero => acc == 0,
                    };

                    if taken {
                        let target = self.labels.get(label.identifier()).copied().ok_or_else(
                            || EmulatorError::UnknownLabel {
                                identifier: label.identifier().to_string(),
                            },
                        )?;
                        jump = Some(target);
                    }
                }
                Instruction::Labelled(..) => unreachable!("unwrapped above"),
            }

            pc = match jump {
                Some(target) => target,
                None => pc + 1,
            };
        }

        Ok(outputs)
    }

    /// The value last stored in the named mailbox (its declared initial
    /// value if never written).
    pub fn mailbox_value(&self, identifier: &str) -> Value {
        self.store.get(identifier).copied().unwrap_or(0)
    }
}
