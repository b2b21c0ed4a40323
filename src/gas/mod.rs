use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Flat charge for having launched an interpreter at all.
pub const EXEC_SCRIPT_GAS: u64 = 1;

/// Per-call gas meter. `consumed` never exceeds `limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasMeter {
    limit: u64,
    consumed: u64,
}

impl GasMeter {
    pub fn new(limit: u64) -> Self {
        Self { limit, consumed: 0 }
    }

    pub fn infinite() -> Self {
        Self::new(u64::MAX)
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn remaining(&self) -> u64 {
        self.limit - self.consumed
    }

    /// Charges `amount`. A charge that would cross the limit fails with
    /// [`Error::OutOfGas`] and leaves the meter exhausted.
    pub fn consume(&mut self, amount: u64, descriptor: &str) -> Result<()> {
        match self.consumed.checked_add(amount) {
            Some(total) if total <= self.limit => {
                self.consumed = total;
                Ok(())
            }
            _ => {
                let consumed = self.consumed;
                self.consumed = self.limit;
                tracing::debug!(
                    descriptor,
                    limit = self.limit,
                    consumed,
                    requested = amount,
                    "gas limit exceeded"
                );
                Err(Error::OutOfGas {
                    limit: self.limit,
                    consumed,
                    requested: amount,
                })
            }
        }
    }

    /// Charges `amount` scaled by the call depth and returns the charged cost.
    pub fn consume_scaled(&mut self, amount: u64, depth: u32, descriptor: &str) -> Result<u64> {
        let cost = scaled_cost(amount, depth).unwrap_or(u64::MAX);
        self.consume(cost, descriptor)?;
        Ok(cost)
    }

    pub fn info(&self) -> GasInfo {
        GasInfo {
            gas_consumed: self.consumed,
            gas_limit: self.limit,
            gas_remaining: self.remaining(),
        }
    }
}

/// `amount * 2^(depth-1)`: every extra level of script-calls-script doubles
/// the price. `None` on overflow.
pub fn scaled_cost(amount: u64, depth: u32) -> Option<u64> {
    let shift = depth.saturating_sub(1);
    if shift >= u64::BITS {
        return if amount == 0 { Some(0) } else { None };
    }
    amount.checked_mul(1u64 << shift)
}

/// Meter snapshot reported to scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasInfo {
    #[serde(rename = "GasConsumed")]
    pub gas_consumed: u64,
    #[serde(rename = "GasLimit")]
    pub gas_limit: u64,
    #[serde(rename = "GasRemaining")]
    pub gas_remaining: u64,
}
