//! Peephole optimisation passes over a finished [`Program`].
//!
//! Each strategy is a pure in-place rewrite of the program's instruction
//! list and memory registry: passes remove, merge-via-alias, or rebind
//! existing mailboxes, never invent new ones. The [`StackingOptimiser`]
//! composes them, re-running the dead-box cleanup after every other
//! strategy because any of them can strand a declaration.

use log::debug;
use thiserror::Error;

use crate::machine::{MachineError, MachineResult, Program};

pub mod clean;
pub mod propagation;
pub mod thrashing;

/// The available optimisation strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Redundant load/store elimination.
    Thrashing,
    /// Dead-box and duplicate-declaration cleanup.
    Cleanup,
    /// Box-copy propagation.
    Propagation,
}

impl Strategy {
    pub fn name(self) -> &'static str {
        match self {
            Strategy::Thrashing => "thrashing",
            Strategy::Cleanup => "cleanup",
            Strategy::Propagation => "propagation",
        }
    }

    fn run(self, program: &mut Program) -> MachineResult<()> {
        match self {
            Strategy::Thrashing => thrashing::eliminate(program),
            Strategy::Cleanup => clean::run(program),
            Strategy::Propagation => propagation::propagate(program),
        }
    }
}

/// A bitmask selection of strategies, as carried by the `OPT`
/// configuration option. Bits with no assigned strategy are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategySet(u8);

const THRASHING_BIT: u8 = 1;
const CLEANUP_BIT: u8 = 1 << 1;
const PROPAGATION_BIT: u8 = 1 << 2;
const ALL_BITS: u8 = THRASHING_BIT | CLEANUP_BIT | PROPAGATION_BIT;

impl StrategySet {
    pub fn all() -> Self {
        Self(ALL_BITS)
    }

    pub fn empty() -> Self {
        Self(0)
    }

    /// Keeps only the assigned bits; unknown bits are ignored rather
    /// than rejected.
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & ALL_BITS)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, strategy: Strategy) -> bool {
        let bit = match strategy {
            Strategy::Thrashing => THRASHING_BIT,
            Strategy::Cleanup => CLEANUP_BIT,
            Strategy::Propagation => PROPAGATION_BIT,
        };
        self.0 & bit != 0
    }

    /// The selected strategies in their fixed running order.
    pub fn strategies(self) -> Vec<Strategy> {
        [Strategy::Thrashing, Strategy::Cleanup, Strategy::Propagation]
            .into_iter()
            .filter(|s| self.contains(*s))
            .collect()
    }
}

impl Default for StrategySet {
    fn default() -> Self {
        Self::all()
    }
}

/// A strategy failure, reported with the failing strategy's name.
#[derive(Error, Debug)]
#[error("{strategy} optimisation failed")]
pub struct OptimiseError {
    pub strategy: &'static str,
    #[source]
    pub source: MachineError,
}

/// Runs an ordered list of strategies, interleaving a cleanup pass after
/// each one (except cleanup itself; no point running it twice in a row).
pub struct StackingOptimiser {
    strategies: Vec<Strategy>,
}

impl StackingOptimiser {
    pub fn new(set: StrategySet) -> Self {
        Self {
            strategies: set.strategies(),
        }
    }

    pub fn with_strategies(strategies: Vec<Strategy>) -> Self {
        Self { strategies }
    }

    pub fn optimise(&self, program: &mut Program) -> Result<(), OptimiseError> {
        for strategy in &self.strategies {
            let before = program.instructions.instructions.len();

            strategy.run(program).map_err(|source| OptimiseError {
                strategy: strategy.name(),
                source,
            })?;

            if *strategy != Strategy::Cleanup {
                clean::run(program).map_err(|source| OptimiseError {
                    strategy: Strategy::Cleanup.name(),
                    source,
                })?;
            }

            debug!(
                "{}: {} -> {} instructions",
                strategy.name(),
                before,
                program.instructions.instructions.len()
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_sets_decode_in_running_order() {
        assert_eq!(
            StrategySet::all().strategies(),
            vec![Strategy::Thrashing, Strategy::Cleanup, Strategy::Propagation]
        );
        assert_eq!(
            StrategySet::from_bits(0b101).strategies(),
            vec![Strategy::Thrashing, Strategy::Propagation]
        );
        assert!(StrategySet::empty().strategies().is_empty());
    }

    #[test]
    fn unknown_bits_are_ignored() {
        let set = StrategySet::from_bits(0xF8 | 0b010);
        assert_eq!(set.strategies(), vec![Strategy::Cleanup]);
    }
}
