pub mod engine;
pub mod error;
pub mod evaluator;
pub mod leaderboard;
pub mod metrics;
pub mod queue;
pub mod worker;
pub mod wrapper;

#[cfg(test)]
mod testing;
