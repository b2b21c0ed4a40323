use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_RELATIVE_HISTORICAL_BLOCKS: i64 = 1024;
pub const MIN_MAX_RELATIVE_HISTORICAL_BLOCKS: i64 = 0;
pub const MAX_MAX_RELATIVE_HISTORICAL_BLOCKS: i64 = 10_000;

pub const DEFAULT_ABSOLUTE_HISTORICAL_BLOCK_CUTOFF: i64 = 1;
pub const MIN_ABSOLUTE_HISTORICAL_BLOCK_CUTOFF: i64 = 1;
pub const MAX_ABSOLUTE_HISTORICAL_BLOCK_CUTOFF: i64 = 1_000_000;

/// Module-wide, governed parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    /// How many blocks back a script may query; 0 disables the check.
    pub max_relative_historical_blocks: i64,
    /// Floor below which historical availability is never required.
    pub absolute_historical_block_cutoff: i64,
}

impl Params {
    pub fn new(max_relative_historical_blocks: i64, absolute_historical_block_cutoff: i64) -> Self {
        Self {
            max_relative_historical_blocks,
            absolute_historical_block_cutoff,
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_range(
            "max relative historical blocks",
            self.max_relative_historical_blocks,
            MIN_MAX_RELATIVE_HISTORICAL_BLOCKS,
            MAX_MAX_RELATIVE_HISTORICAL_BLOCKS,
        )?;
        check_range(
            "absolute historical block cutoff",
            self.absolute_historical_block_cutoff,
            MIN_ABSOLUTE_HISTORICAL_BLOCK_CUTOFF,
            MAX_ABSOLUTE_HISTORICAL_BLOCK_CUTOFF,
        )
    }
}

impl Default for Params {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_RELATIVE_HISTORICAL_BLOCKS,
            DEFAULT_ABSOLUTE_HISTORICAL_BLOCK_CUTOFF,
        )
    }
}

fn check_range(name: &str, value: i64, min: i64, max: i64) -> Result<()> {
    if value < min {
        return Err(Error::Invalid(format!(
            "{} must be at least {}, got: {}",
            name, min, value
        )));
    }
    if value > max {
        return Err(Error::Invalid(format!(
            "{} must be at most {}, got: {}",
            name, max, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_validation() {
        assert!(Params::default().validate().is_ok());
        assert!(Params::new(0, 1).validate().is_ok());
        assert!(Params::new(-1, 1).validate().is_err());
        assert!(Params::new(10_001, 1).validate().is_err());
        assert!(Params::new(10, 0).validate().is_err());
        assert!(Params::new(10, 1_000_001).validate().is_err());
    }
}
