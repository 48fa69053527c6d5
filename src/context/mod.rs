pub mod aggregator;
pub mod classify;
pub mod clock;
pub mod smoother;
pub mod snapshot;

pub use aggregator::ContextAggregator;
pub use classify::AppClassifier;
pub use smoother::Smoother;
pub use snapshot::{AppCategory, ContextSnapshot, SmoothedAffect, TimeOfDay};
