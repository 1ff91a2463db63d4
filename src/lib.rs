pub mod action;
pub mod cache;
pub mod config;
pub mod insertion;
pub mod passthrough;
pub mod scoring;
pub mod symbols;
pub mod task;

pub use action::Action;
pub use cache::SymbolCache;
pub use config::{ActionsConfig, Config, GroupConfig, ScanConfig, SymbolConfig};
pub use insertion::{add_result_option, InsertFlags};
pub use passthrough::PassthroughResult;
pub use scoring::{MetricResult, SymbolOptions, SymbolResult};
pub use symbols::{Symbol, SymbolGroup, SymbolRegistry};
pub use task::{stage, Task, TaskSettings};
