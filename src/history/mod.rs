//! Historical state access and the retention policy that bounds it.

use crate::error::{Error, Result};
use crate::storage::KVStore;
use crate::types::{BlockHeader, Params};
use std::sync::Arc;
use tracing::{error, info};

/// Committed state of one past block.
#[derive(Clone)]
pub struct HistoricalState {
    pub header: BlockHeader,
    pub store: Arc<dyn KVStore + Send + Sync>,
}

/// Read access to committed state at past heights.
pub trait StateHistory {
    fn state_at(&self, height: i64) -> Result<HistoricalState>;
}

/// History source for hosts that keep no past state.
pub struct NoHistory;

impl StateHistory for NoHistory {
    fn state_at(&self, height: i64) -> Result<HistoricalState> {
        Err(Error::HistoricalState {
            height,
            reason: "no historical state is retained".into(),
        })
    }
}

/// Lowest height that queries may target at `current`, or `None` when the
/// retention policy is disabled. Always within `[1, current]`.
pub fn oldest_queryable_height(current: i64, params: &Params) -> Option<i64> {
    if params.max_relative_historical_blocks < 1 || current < 1 {
        return None;
    }
    let relative = current.saturating_sub(params.max_relative_historical_blocks);
    let oldest = relative.max(params.absolute_historical_block_cutoff);
    Some(oldest.clamp(1, current))
}

/// Accepts `requested` (a positive height) if the policy allows querying it
/// from `current`.
pub fn check_query_height(current: i64, requested: i64, params: &Params) -> Result<()> {
    if requested < 0 {
        return Err(Error::HistoricalState {
            height: requested,
            reason: "query height cannot be negative".into(),
        });
    }
    if requested > current {
        return Err(Error::HistoricalState {
            height: requested,
            reason: format!("query height is above the current height {}", current),
        });
    }
    if let Some(oldest) = oldest_queryable_height(current, params) {
        if requested < oldest {
            return Err(Error::HistoricalState {
                height: requested,
                reason: format!(
                    "query height is older than the oldest allowed height {} (current {}, max relative {}, absolute cutoff {})",
                    oldest,
                    current,
                    params.max_relative_historical_blocks,
                    params.absolute_historical_block_cutoff
                ),
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionCheck {
    /// Nothing to check at this height or with these params.
    Skipped,
    Retained { oldest: i64 },
    Missing { oldest: i64 },
}

/// Verifies at block start that the oldest height the policy promises is
/// still available. A missing height is reported loudly; the block is not
/// rejected.
pub fn check_retention(history: &dyn StateHistory, current: i64, params: &Params) -> RetentionCheck {
    if current <= 1 {
        return RetentionCheck::Skipped;
    }
    let oldest = match oldest_queryable_height(current, params) {
        Some(oldest) => oldest,
        None => return RetentionCheck::Skipped,
    };

    match history.state_at(oldest) {
        Ok(_) => RetentionCheck::Retained { oldest },
        Err(e) => {
            error!(
                height = current,
                oldest,
                error = %e,
                "CRITICAL: historical state required by the script params is not retained; \
                 scripts may fail or diverge on historical queries. Set min-retain-blocks to at least {}",
                params.max_relative_historical_blocks.saturating_add(1)
            );
            RetentionCheck::Missing { oldest }
        }
    }
}

/// Logs the retention requirement once at startup.
pub fn log_retention_requirement(params: &Params, min_retain_blocks: u64) {
    if params.max_relative_historical_blocks < 1 {
        return;
    }
    let required = params.max_relative_historical_blocks.saturating_add(1);
    if min_retain_blocks != 0 && (min_retain_blocks as i64) < required {
        error!(
            min_retain_blocks,
            required, "min-retain-blocks is lower than the script history window"
        );
    } else {
        info!(min_retain_blocks, required, "script history window");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    struct RetainedFrom(i64);

    impl StateHistory for RetainedFrom {
        fn state_at(&self, height: i64) -> Result<HistoricalState> {
            if height < self.0 {
                return NoHistory.state_at(height);
            }
            Ok(HistoricalState {
                header: BlockHeader::new(height, "test"),
                store: Arc::new(MemoryStore::new()),
            })
        }
    }

    #[test]
    fn test_query_height_policy() {
        let params = Params::new(10, 1);
        assert!(check_query_height(100, 95, &params).is_ok());
        assert!(check_query_height(100, 90, &params).is_ok());
        assert!(check_query_height(100, 85, &params).is_err());
        assert!(check_query_height(100, -1, &params).is_err());
        assert!(check_query_height(100, 101, &params).is_err());

        let cutoff = Params::new(10, 97);
        assert!(check_query_height(100, 95, &cutoff).is_err());
        assert!(check_query_height(100, 97, &cutoff).is_ok());

        let beyond = Params::new(10, 500);
        assert!(check_query_height(100, 100, &beyond).is_ok());
        assert!(check_query_height(100, 99, &beyond).is_err());

        let disabled = Params::new(0, 1);
        assert!(check_query_height(100, 1, &disabled).is_ok());
    }

    #[test]
    fn test_retention_check() {
        let params = Params::new(10, 1);
        assert_eq!(check_retention(&RetainedFrom(1), 1, &params), RetentionCheck::Skipped);
        assert_eq!(
            check_retention(&RetainedFrom(1), 5, &params),
            RetentionCheck::Retained { oldest: 1 }
        );
        assert_eq!(
            check_retention(&RetainedFrom(95), 100, &params),
            RetentionCheck::Missing { oldest: 90 }
        );
        assert_eq!(
            check_retention(&RetainedFrom(95), 100, &Params::new(0, 1)),
            RetentionCheck::Skipped
        );
    }
}
