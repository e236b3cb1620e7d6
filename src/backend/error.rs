//! Error and warning types for the backend.
//!
//! Hard errors abort the enclosing unit of work with nothing committed;
//! warnings are collected per compiled unit, filtered by the configured
//! verbosity, and never alter control flow.

use std::fmt;

use thiserror::Error;

use crate::machine::{Address, MachineError};

/// Hard compilation errors.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("unknown instruction `{name}`: no selection pattern covers it")]
    UnknownInstruction { name: String },

    #[error("unsupported feature: {feature}")]
    Unsupported { feature: String },

    #[error("invalid operand: {detail}")]
    InvalidOperandType { detail: String },

    #[error("no mailbox compiled for address {address}")]
    UnknownMailbox { address: Address },

    #[error("declaration collision while committing: {source}")]
    DuplicateDeclaration {
        #[source]
        source: MachineError,
    },

    #[error("unknown builtin function {name}({arity})")]
    UnknownBuiltin { name: String, arity: usize },

    #[error("builtin {name} expects {expected} argument(s), got {got}")]
    BuiltinArity {
        name: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("invalid `__lmc_option__` pragma: {reason}")]
    InvalidPragma { reason: String },

    #[error("missing property on source instruction: {property}")]
    MissingProperty { property: &'static str },

    #[error("incorrect type for {value}: got {got}, expected {expected}")]
    IncorrectType {
        value: &'static str,
        got: String,
        expected: &'static str,
    },

    #[error(transparent)]
    Machine(#[from] MachineError),
}

pub type CompileResult<T> = Result<T, CompileError>;

/// Verbosity classes for non-fatal diagnostics. A configured level
/// surfaces every warning at that level or below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WarningLevel {
    Default,
    Info,
    Debug,
}

impl WarningLevel {
    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            0 => Some(WarningLevel::Default),
            1 => Some(WarningLevel::Info),
            2 => Some(WarningLevel::Debug),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            WarningLevel::Default => "default",
            WarningLevel::Info => "info",
            WarningLevel::Debug => "debug",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    Bitcast,
    UnknownOption,
}

impl WarningKind {
    pub fn name(self) -> &'static str {
        match self {
            WarningKind::Bitcast => "bitcast",
            WarningKind::UnknownOption => "unknown-option",
        }
    }
}

/// A non-fatal diagnostic attached to a compiled unit.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub level: WarningLevel,
    pub message: String,
}

impl Warning {
    pub fn bitcast(from: impl fmt::Display, to: impl fmt::Display) -> Self {
        Self {
            kind: WarningKind::Bitcast,
            level: WarningLevel::Debug,
            message: format!("bitcast from {from} to {to} is unchecked on this machine"),
        }
    }

    pub fn unknown_option(key: &str, value: i64) -> Self {
        Self {
            kind: WarningKind::UnknownOption,
            level: WarningLevel::Default,
            message: format!("unrecognised option pair `{key}`={value}; ignored"),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}/{}] {}",
            self.kind.name(),
            self.level.name(),
            self.message
        )
    }
}
