//! The instruction-selection engine.
//!
//! Selection is a prioritised, greedy, non-overlapping pattern match
//! over one block's instruction list. Each [`Pattern`] recognises a run
//! of one or more consecutive source instructions and knows how to
//! compile the run into a [`Unit`] of target instructions plus the
//! memory operations it needs. [`Engine::find_all`] partitions the block
//! so that every instruction belongs to exactly one match, fused
//! patterns strictly outranking the single-instruction ones for the
//! instructions they consume.

use log::{debug, trace};

use hashbrown::HashSet;

use crate::ir::{Inst, InstKind, Opcode, Operand, PRAGMA_CALLEE};
use crate::machine::{Instruction, MemoryOp};

use super::error::{CompileError, CompileResult, Warning};
use super::Compiler;

/// The output of compiling one match: the target instructions to append
/// and the memory operations to commit first. Either list may be empty
/// (alloca registers storage without code; the pragma produces nothing).
#[derive(Debug, Default)]
pub struct Unit {
    pub instructions: Vec<Instruction>,
    pub ops: Vec<MemoryOp>,
}

impl Unit {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// A successfully compiled unit plus its non-fatal diagnostics.
#[derive(Debug)]
pub struct Compiled {
    pub unit: Unit,
    pub warnings: Vec<Warning>,
}

impl Compiled {
    pub fn of(unit: Unit) -> Self {
        Self {
            unit,
            warnings: Vec::new(),
        }
    }
}

/// A recogniser-plus-generator for a run of consecutive instructions.
pub trait Pattern {
    /// A short name for diagnostics.
    fn name(&self) -> &'static str;

    /// Whether the window is exactly one occurrence of this pattern.
    fn matches(&self, window: &[Inst]) -> bool;

    /// Every occurrence in the block, as groups of claimed indices.
    fn find(&self, insts: &[Inst]) -> Vec<Vec<usize>>;

    /// Compiles exactly the claimed instructions.
    ///
    /// # Panics
    ///
    /// Panics when handed a window whose length does not match the
    /// pattern; the engine guarantees the length, so a mismatch is an
    /// invariant violation rather than a user-facing error.
    fn compile(&self, compiler: &mut Compiler<'_>, insts: &[&Inst]) -> CompileResult<Compiled>;

    /// Higher priorities claim instructions first.
    fn priority(&self) -> i32;
}

/// Matches exactly one instruction of a fixed opcode and defers to the
/// per-opcode generator.
struct SinglePattern {
    opcode: Opcode,
}

impl Pattern for SinglePattern {
    fn name(&self) -> &'static str {
        self.opcode.name()
    }

    fn matches(&self, window: &[Inst]) -> bool {
        window.len() == 1 && window[0].kind.opcode() == self.opcode
    }

    fn find(&self, insts: &[Inst]) -> Vec<Vec<usize>> {
        (0..insts.len())
            .filter(|&i| self.matches(&insts[i..i + 1]))
            .map(|i| vec![i])
            .collect()
    }

    fn compile(&self, compiler: &mut Compiler<'_>, insts: &[&Inst]) -> CompileResult<Compiled> {
        assert!(
            insts.len() == 1,
            "single-instruction pattern compiled with a window of {}",
            insts.len()
        );

        compiler.lower_single(insts[0])
    }

    fn priority(&self) -> i32 {
        0
    }
}

/// Matches a comparison immediately followed by a zero-extension of the
/// comparison's own result, lowering the pair straight into the widened
/// destination.
struct CmpZextPattern;

impl Pattern for CmpZextPattern {
    fn name(&self) -> &'static str {
        "icmp+zext"
    }

    fn matches(&self, window: &[Inst]) -> bool {
        let [first, second] = window else {
            return false;
        };

        if !matches!(first.kind, InstKind::ICmp { .. }) {
            return false;
        }

        match &second.kind {
            InstKind::ZExt {
                from: Operand::Inst { id, .. },
                ..
            } => *id == first.id,
            _ => false,
        }
    }

    fn find(&self, insts: &[Inst]) -> Vec<Vec<usize>> {
        (1..insts.len())
            .filter(|&j| self.matches(&insts[j - 1..j + 1]))
            .map(|j| vec![j - 1, j])
            .collect()
    }

    fn compile(&self, compiler: &mut Compiler<'_>, insts: &[&Inst]) -> CompileResult<Compiled> {
        assert!(
            insts.len() == 2,
            "fused compare pattern compiled with a window of {}",
            insts.len()
        );

        let InstKind::ICmp { pred, x, y } = &insts[0].kind else {
            return Err(CompileError::MissingProperty {
                property: "comparison at the head of a fused pair",
            });
        };

        // The widened instruction's own destination replaces the
        // comparison's.
        compiler.lower_icmp(*pred, x, y, insts[1].id)
    }

    fn priority(&self) -> i32 {
        10
    }
}

/// Consumes the configuration pragma before any call pattern can
/// mistake it for a real builtin.
struct PragmaPattern;

impl Pattern for PragmaPattern {
    fn name(&self) -> &'static str {
        "pragma"
    }

    fn matches(&self, window: &[Inst]) -> bool {
        let [inst] = window else {
            return false;
        };

        matches!(&inst.kind, InstKind::Call { callee, .. } if callee == PRAGMA_CALLEE)
    }

    fn find(&self, insts: &[Inst]) -> Vec<Vec<usize>> {
        (0..insts.len())
            .filter(|&i| self.matches(&insts[i..i + 1]))
            .map(|i| vec![i])
            .collect()
    }

    fn compile(&self, compiler: &mut Compiler<'_>, insts: &[&Inst]) -> CompileResult<Compiled> {
        assert!(
            insts.len() == 1,
            "pragma pattern compiled with a window of {}",
            insts.len()
        );

        compiler.lower_pragma(insts[0])
    }

    fn priority(&self) -> i32 {
        100
    }
}

/// One accepted occurrence of a pattern: the claimed instructions, the
/// owning pattern, and the position of the first claimed index.
pub struct Match<'a, 'e> {
    pub insts: Vec<&'a Inst>,
    pub pattern: &'e dyn Pattern,
    pub first: usize,
}

const SINGLE_OPCODES: [Opcode; 12] = [
    Opcode::Add,
    Opcode::Sub,
    Opcode::Mul,
    Opcode::SDiv,
    Opcode::SRem,
    Opcode::Alloca,
    Opcode::Load,
    Opcode::Store,
    Opcode::ICmp,
    Opcode::ZExt,
    Opcode::Bitcast,
    Opcode::Call,
];

/// The pattern registry, held sorted by descending priority.
pub struct Engine {
    patterns: Vec<Box<dyn Pattern>>,
}

impl Engine {
    pub fn new() -> Self {
        let mut patterns: Vec<Box<dyn Pattern>> = SINGLE_OPCODES
            .into_iter()
            .map(|opcode| Box::new(SinglePattern { opcode }) as Box<dyn Pattern>)
            .collect();

        patterns.push(Box::new(CmpZextPattern));
        patterns.push(Box::new(PragmaPattern));

        let mut engine = Self { patterns };
        engine.sort();
        engine
    }

    /// Registers an extra pattern, keeping priority order.
    pub fn add_pattern(&mut self, pattern: Box<dyn Pattern>) {
        self.patterns.push(pattern);
        self.sort();
    }

    fn sort(&mut self) {
        // Stable: same-priority patterns keep registration order.
        self.patterns.sort_by_key(|p| std::cmp::Reverse(p.priority()));
    }

    /// Partitions a block into matches. Every index is claimed by at
    /// most one pattern (higher priority first, all-or-nothing per
    /// group); an index no pattern claims is a hard error. Matches come
    /// back ordered by first claimed index.
    pub fn find_all<'a, 'e>(&'e self, insts: &'a [Inst]) -> CompileResult<Vec<Match<'a, 'e>>> {
        let mut claimed: HashSet<usize> = HashSet::new();
        let mut matches: Vec<Match<'a, 'e>> = Vec::new();

        for pattern in &self.patterns {
            for group in pattern.find(insts) {
                if group.iter().any(|i| claimed.contains(i)) {
                    continue;
                }

                trace!("pattern `{}` claims {:?}", pattern.name(), group);
                claimed.extend(group.iter().copied());
                matches.push(Match {
                    insts: group.iter().map(|&i| &insts[i]).collect(),
                    pattern: pattern.as_ref(),
                    first: group[0],
                });
            }
        }

        for (index, inst) in insts.iter().enumerate() {
            if !claimed.contains(&index) {
                return Err(CompileError::UnknownInstruction {
                    name: inst.kind.opcode().name().to_string(),
                });
            }
        }

        matches.sort_by_key(|m| m.first);
        debug!("{} instructions -> {} matches", insts.len(), matches.len());

        Ok(matches)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
