//! Skill runtime collaborator (spec §6): a registry mapping skill name to
//! implementation with declared schemas and an idempotency strategy, plus
//! one reference skill (text extraction) so the executor round has
//! something real to call.

mod descriptor;
mod error;
mod idempotency;
mod registry;
mod skill;
mod skills;

pub use descriptor::{IdempotencyStrategy, SkillDescriptor};
pub use error::{SkillError, SkillResult};
pub use registry::SkillRegistry;
pub use skill::{Skill, SkillArtifact, SkillInput, SkillInputFile, SkillOutcome};
pub use skills::TextExtractSkill;
