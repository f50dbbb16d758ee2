//! Training module: the optimization loop, evaluation, checkpointing and
//! the end-to-end run.

pub mod checkpoint;
pub mod supervised;
pub mod trainer;

pub use checkpoint::CheckpointStore;
pub use supervised::{run, RunOutcome};
pub use trainer::{
    evaluate, sgd_optimizer, BatchOutcome, EpochSummary, EvaluationSummary, Trainer,
};
