//! lmcc - a Little Man Computer compiler backend.
//!
//! lmcc lowers straight-line, already-typed IR, one basic block at a
//! time, to the instruction set of the Little Man Computer (a single
//! accumulator, numbered mailboxes, three branch forms, one input and
//! one output port) and then shrinks the emitted code with a stack of
//! peephole passes.
//!
//! # Primary usage
//!
//! ```
//! use lmcc::backend::{Compiler, Engine};
//! use lmcc::ir;
//!
//! let module = ir::parse_module(
//!     "func @_lmc {\n\
//!      %cell = alloca\n\
//!      store 7, %cell\n\
//!      %v = load %cell\n\
//!      call @output(%v)\n\
//!      }\n",
//! )
//! .unwrap();
//!
//! let engine = Engine::new();
//! let mut compiler = Compiler::new(&module);
//! compiler.compile_entry(&engine).unwrap();
//! compiler.optimise().unwrap();
//!
//! println!("{}", compiler.program());
//! ```
//!
//! # Architecture
//!
//! - [`machine`] - the target machine: mailboxes, instructions, memory
//!   registry, program, reference emulator
//! - [`ir`] - the source IR consumed from the frontend collaborator,
//!   plus a minimal textual reader
//! - [`backend`] - instruction selection (pattern engine) and lowering
//! - [`opt`] - the optimisation pipeline and its stacking driver

pub mod backend;
pub mod ir;
pub mod machine;
pub mod opt;

pub use backend::{
    compile_module, CompileError, CompileResult, Compiler, Engine, Options, Warning, WarningKind,
    WarningLevel,
};
pub use machine::{Emulator, Program};
pub use opt::{StackingOptimiser, Strategy, StrategySet};
