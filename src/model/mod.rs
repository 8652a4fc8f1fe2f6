//! Per-partition isolation forests: fitting and the swappable registry.

pub mod forest;
pub mod registry;
pub mod trainer;

pub use forest::{AnomalyLabel, IsolationForest};
pub use registry::{Generation, ModelKey, ModelMap, ModelRegistry, RegistryStatus};
pub use trainer::Trainer;
