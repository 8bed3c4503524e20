#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod cards;
pub mod coins;
pub mod indexing;
pub mod ledger;
pub mod messaging;
pub mod promotion;
pub mod sweeper;

#[cfg(test)]
mod test_support;

pub use coins::{CoinLedger, SurrealCoinLedger};
pub use indexing::{DocumentIndexer, IndexJob, IndexingQueue, IndexingStats};
pub use ledger::{Decision, ReviewLedger, VoteOutcome};
pub use messaging::{DiscordMessenger, Messenger};
pub use sweeper::{run_sweeper_loop, SweepReport};
