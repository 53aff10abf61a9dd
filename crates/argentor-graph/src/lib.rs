//! Task graph data model, readiness engine, and scheduler (spec §3, §4.3,
//! §4.4).

mod model;
mod readiness;
mod scheduler;

pub use model::{Artifact, Constraints, Evidence, InputRequirement, Plan, Review, TaskEdge, TaskNode, EdgeMetadata};
pub use readiness::{has_cycle, ReadinessEvent, ReadinessGraph};
pub use scheduler::{next_runnable, RunnableBatch};
