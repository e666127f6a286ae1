//! Rollout collection, evaluation and the training loop
mod collect;
mod evaluate;
mod train;

pub use collect::{CollectSummary, PathEnd, RolloutCollector, EPISODE_WINDOW};
pub use evaluate::{EpisodeTotals, EvalProbe, Evaluator, EVAL_WINDOW};
pub use train::{run_dir, TrainSummary, Trainer, ALGO_NAME, TASK_NAME};
