use crate::context::Context;
use crate::error::Result;
use crate::history::{check_retention, RetentionCheck};
use crate::storage::ParamsStore;
use tracing::info;

/// Block-start hook: checks that the history window promised by the params
/// is still retained.
pub fn begin_block(ctx: &Context<'_>) -> Result<RetentionCheck> {
    let params = ctx.store().get_params()?;
    let height = ctx.block_height();
    let check = check_retention(ctx.services().history.as_ref(), height, &params);
    if let RetentionCheck::Retained { oldest } = check {
        info!(
            height,
            oldest,
            max_relative_historical_blocks = params.max_relative_historical_blocks,
            absolute_historical_block_cutoff = params.absolute_historical_block_cutoff,
            "historical state available"
        );
    }
    Ok(check)
}
