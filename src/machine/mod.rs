//! The Little Man Computer target machine.
//!
//! Everything the backend emits lives here: mailboxes (named, addressed
//! memory slots), labels, the closed target instruction set, the memory
//! registry with its two-phase allocation protocol, and the [`Program`]
//! that ties them together. A small reference [`Emulator`] executes
//! finished programs so tests can check behaviour rather than spellings.
//!
//! The machine layer is deliberately ignorant of the source IR; it only
//! knows about addresses, identifiers and instructions. Address `>= 0`
//! means "owned by some source-level value", negative addresses mark
//! compiler-internal boxes (constants and the scratch temporary).

use thiserror::Error;

pub mod emulator;
pub mod instr;
pub mod mailbox;
pub mod memory;
pub mod program;

pub use emulator::Emulator;
pub use instr::{BranchKind, DataInstr, Instruction, InstructionList};
pub use mailbox::{Label, Mailbox};
pub use memory::{Memory, MemoryOp};
pub use program::Program;

/// Identity of a mailbox. Non-negative addresses mirror the identity of a
/// source instruction; negative addresses are compiler-internal and are
/// never looked up.
pub type Address = i64;

/// Contents of a mailbox.
pub type Value = i64;

/// Errors raised by the machine layer itself: registry collisions and
/// list bookkeeping violations.
#[derive(Error, Debug)]
pub enum MachineError {
    #[error("a mailbox with address {address} already exists")]
    MailboxAddressInUse { address: Address },

    #[error("a mailbox with identifier `{identifier}` already exists")]
    MailboxIdentifierInUse { identifier: String },

    #[error("a label with identifier `{identifier}` already exists")]
    LabelIdentifierInUse { identifier: String },

    #[error("no data declaration for `{identifier}`")]
    NoSuchDeclaration { identifier: String },
}

pub type MachineResult<T> = Result<T, MachineError>;
