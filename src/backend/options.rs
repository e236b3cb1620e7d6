//! The configuration surface consumed by the driving caller.
//!
//! Two knobs exist: the warning-verbosity level and the optimisation
//! strategy selection. Both may be set by the caller up front or from
//! inside the compiled source through the `__lmc_option__` pragma; they
//! are not renegotiated mid-compilation.

use crate::opt::StrategySet;

use super::error::WarningLevel;

/// Option key for the warning-verbosity level (0..=2).
pub const KEY_WARNING_LEVEL: &str = "WLEVEL";

/// Option key for the optimisation strategy bitmask.
pub const KEY_STRATEGIES: &str = "OPT";

#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub warning_level: WarningLevel,
    pub strategies: StrategySet,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            warning_level: WarningLevel::Default,
            strategies: StrategySet::all(),
        }
    }
}

impl Options {
    /// Sets one option by key. Returns `false` when the key is not
    /// recognised or the value fails the key's validity check; the
    /// caller decides whether that is warning-worthy.
    pub fn set(&mut self, key: &str, value: i64) -> bool {
        match key {
            KEY_WARNING_LEVEL => match WarningLevel::from_value(value) {
                Some(level) => {
                    self.warning_level = level;
                    true
                }
                None => false,
            },
            KEY_STRATEGIES => {
                if !(0..=i64::from(u8::MAX)).contains(&value) {
                    return false;
                }
                self.strategies = StrategySet::from_bits(value as u8);
                true
            }
            _ => false,
        }
    }
}
