//! Instruction selection and lowering.
//!
//! The [`Compiler`] owns the [`Program`] being built and the
//! configuration surface; the [`Engine`] partitions each block into
//! pattern [`Match`]es, and the per-opcode generators in [`lower`]
//! translate every match into a [`pattern::Unit`] that is committed into
//! the program, memory declarations first, instructions second.
//! A hard error at any step aborts the block with nothing committed for
//! the failing match.

use std::rc::Rc;

use log::debug;

use crate::ir::{Inst, Module, Operand};
use crate::machine::{Address, Mailbox, MemoryOp, Program};
use crate::opt::{OptimiseError, StackingOptimiser};

pub mod builtin;
pub mod error;
pub mod lower;
pub mod options;
pub mod pattern;

pub use error::{CompileError, CompileResult, Warning, WarningKind, WarningLevel};
pub use options::Options;
pub use pattern::{Compiled, Engine, Match, Pattern, Unit};

/// Identifier of the single scratch temporary shared by every generator
/// that needs a placeholder box.
const TEMP_IDENTIFIER: &str = "_TEMP";

/// Compiles one module's entry function into a growing [`Program`].
pub struct Compiler<'m> {
    module: &'m Module,
    program: Program,
    options: Options,
    temp_box: Option<Rc<Mailbox>>,
    warnings: Vec<Warning>,
}

impl<'m> Compiler<'m> {
    pub fn new(module: &'m Module) -> Self {
        Self {
            module,
            program: Program::new(),
            options: Options::default(),
            temp_box: None,
            warnings: Vec::new(),
        }
    }

    pub fn module(&self) -> &'m Module {
        self.module
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn into_program(self) -> Program {
        self.program
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut Options {
        &mut self.options
    }

    /// Every warning collected so far, unfiltered.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// The warnings the configured verbosity level surfaces.
    pub fn surfaced_warnings(&self) -> impl Iterator<Item = &Warning> {
        let level = self.options.warning_level;
        self.warnings.iter().filter(move |w| w.level <= level)
    }

    /// The shared scratch temporary, created on first use.
    pub(crate) fn scratch_box(&mut self) -> MemoryOp {
        if let Some(existing) = &self.temp_box {
            return MemoryOp::of_box(existing.clone(), false);
        }

        let op = self.program.memory.new_mailbox(-1, Some(TEMP_IDENTIFIER));
        self.temp_box = Some(op.mailbox());
        op
    }

    /// Resolves a source operand to the mailbox backing it.
    ///
    /// A null placeholder resolves to the scratch temporary; an integer
    /// literal goes through the constant cache; an instruction reference
    /// must have an int-like type and an already-compiled mailbox. A
    /// global reference is only meaningful to the pragma pattern.
    pub(crate) fn resolve_operand(&mut self, operand: &Operand) -> CompileResult<MemoryOp> {
        match operand {
            Operand::Null => Ok(self.scratch_box()),
            Operand::Literal(value) => Ok(self.program.memory.constant(*value)),
            Operand::Inst { id, ty } => {
                if !ty.is_int_like() {
                    return Err(CompileError::InvalidOperandType {
                        detail: format!("`{ty}` does not fit a mailbox"),
                    });
                }

                let mailbox = self
                    .program
                    .memory
                    .mailbox_at(*id)
                    .ok_or(CompileError::UnknownMailbox { address: *id })?;
                Ok(MemoryOp::of_box(mailbox, false))
            }
            Operand::Global(name) => Err(CompileError::InvalidOperandType {
                detail: format!("global `@{name}` outside a configuration pragma"),
            }),
        }
    }

    /// The destination mailbox for the result of the instruction with
    /// identity `address`: the already-bound box, or a fresh zero-
    /// initialised proposal.
    pub(crate) fn destination_box(&mut self, address: Address) -> MemoryOp {
        match self.program.memory.mailbox_at(address) {
            Some(existing) => MemoryOp::of_box(existing, false),
            None => self.program.memory.new_mailbox(address, None),
        }
    }

    /// Commits a compiled unit: registers every new mailbox and label
    /// (recording their data declarations) before appending the unit's
    /// executable instructions; collects its warnings.
    pub fn commit(&mut self, compiled: Compiled) -> CompileResult<()> {
        let mut defs = Vec::new();

        for op in &compiled.unit.ops {
            for pair in op.new_boxes() {
                self.program
                    .memory
                    .add_mailbox(pair.mailbox.clone())
                    .map_err(|source| CompileError::DuplicateDeclaration { source })?;
            }

            for pair in op.new_labels() {
                self.program
                    .memory
                    .add_label(pair.label.clone())
                    .map_err(|source| CompileError::DuplicateDeclaration { source })?;
            }

            defs.extend(op.defs());
        }

        self.program
            .add_instructions(compiled.unit.instructions, defs);
        self.warnings.extend(compiled.warnings);
        Ok(())
    }

    /// Compiles one block: partitions it into matches and compiles and
    /// commits them in source order. The first hard error aborts with
    /// nothing committed for the failing match.
    pub fn compile_block(&mut self, engine: &Engine, insts: &[Inst]) -> CompileResult<()> {
        let matches = engine.find_all(insts)?;

        for m in matches {
            let compiled = m.pattern.compile(self, &m.insts)?;
            self.commit(compiled)?;
        }

        Ok(())
    }

    /// Compiles every block of the module's entry function.
    pub fn compile_entry(&mut self, engine: &Engine) -> CompileResult<()> {
        let Some(entry) = self.module.entry() else {
            // Entry lookup is the caller's setup concern; compiling a
            // module without one is a no-op.
            return Ok(());
        };

        debug!(
            "compiling `{}`: {} block(s)",
            entry.name,
            entry.blocks.len()
        );

        for block in &entry.blocks {
            self.compile_block(engine, &block.insts)?;
        }

        Ok(())
    }

    /// Runs the optimisation pipeline selected by the current options
    /// over the compiled program.
    pub fn optimise(&mut self) -> Result<(), OptimiseError> {
        StackingOptimiser::new(self.options.strategies).optimise(&mut self.program)
    }
}

/// Convenience entry point: compiles the module's entry function and
/// returns the program plus every collected warning, unfiltered;
/// callers apply their own verbosity.
pub fn compile_module(module: &Module) -> CompileResult<(Program, Vec<Warning>)> {
    let engine = Engine::new();
    let mut compiler = Compiler::new(module);

    compiler.compile_entry(&engine)?;

    let warnings = compiler.warnings.clone();
    Ok((compiler.into_program(), warnings))
}
