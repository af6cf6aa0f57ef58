//! §4.E Automatic strategies: deduplication, error-input purging, and
//! head/tail output truncation. Each strategy is config-gated and re-entrant
//! — running it twice over the same (state, messages) produces no further
//! changes (§8).

mod dedup;
mod purge_errors;
mod truncate;

pub use dedup::deduplicate;
pub use purge_errors::purge_errors;
pub use truncate::truncate_outputs;

use crate::config::EngineConfig;
use crate::model::Message;
use crate::state::SessionState;
use crate::token::TokenCounter;

/// Runs every enabled automatic strategy, in the order the spec lists them:
/// deduplication, then error-purging, then truncation. `messages` is taken
/// `&mut` because truncation rewrites tool output text in place.
pub fn run_all(state: &mut SessionState, config: &EngineConfig, messages: &mut [Message], tc: &mut TokenCounter) {
    if config.strategies.deduplication.enabled {
        deduplicate(state, config, messages, tc);
    }
    if config.strategies.purge_errors.enabled {
        purge_errors(state, config, messages, tc);
    }
    if config.strategies.truncation.enabled {
        truncate_outputs(state, config, messages, tc);
    }
}
