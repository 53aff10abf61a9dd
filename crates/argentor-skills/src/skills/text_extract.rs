//! The reference text-extraction skill: reads `.txt`/`.md` files verbatim
//! (up to `max_chars`) and writes one `extracted_text` artifact per input
//! file. PDF/DOCX extraction is an out-of-core collaborator this crate
//! doesn't implement; unsupported extensions fail with `SKILL_BAD_INPUT`,
//! matching `skills/impl/text_extract.py`'s behaviour for the same case.

use crate::descriptor::{IdempotencyStrategy, SkillDescriptor};
use crate::error::{SkillError, SkillResult};
use crate::skill::{Skill, SkillArtifact, SkillInput, SkillOutcome};
use argentor_core::ArtifactFormat;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::Path;

const DEFAULT_MAX_CHARS: usize = 200_000;
const SKILL_NAME: &str = "text_extract";

pub struct TextExtractSkill {
    descriptor: SkillDescriptor,
}

impl TextExtractSkill {
    pub fn new() -> Self {
        Self {
            descriptor: SkillDescriptor {
                name: SKILL_NAME.into(),
                description: "Extracts plain text from .txt/.md input files".into(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": { "files": { "type": "array" } },
                    "required": ["files"]
                }),
                output_schema: serde_json::json!({
                    "type": "object",
                    "properties": { "artifacts": { "type": "array" } }
                }),
                params_schema: serde_json::json!({
                    "type": "object",
                    "properties": { "max_chars": { "type": "integer", "minimum": 1 } }
                }),
                idempotency_strategy: IdempotencyStrategy::InputHashes,
            },
        }
    }
}

impl Default for TextExtractSkill {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Skill for TextExtractSkill {
    fn descriptor(&self) -> &SkillDescriptor {
        &self.descriptor
    }

    async fn execute(&self, input: SkillInput) -> SkillResult<SkillOutcome> {
        let max_chars = input
            .params
            .get("max_chars")
            .and_then(serde_json::Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_CHARS);

        let mut artifacts = Vec::with_capacity(input.files.len());

        for file in &input.files {
            let path = Path::new(&file.path);
            let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();

            if !matches!(extension.as_str(), "txt" | "md") {
                return Err(SkillError::BadInput {
                    skill: SKILL_NAME,
                    reason: format!("unsupported file type for text_extract: .{extension}"),
                });
            }

            let text = std::fs::read_to_string(path)
                .map_err(|e| SkillError::BadInput { skill: SKILL_NAME, reason: format!("reading {}: {e}", file.path) })?;
            let truncated: String = text.chars().take(max_chars).collect();

            let sha256 = hex::encode(Sha256::digest(truncated.as_bytes()));
            let out_dir = format!("workspace/artifacts/{}", input.task_id);
            std::fs::create_dir_all(&out_dir)
                .map_err(|e| SkillError::Failed { skill: SKILL_NAME, reason: format!("creating {out_dir}: {e}") })?;
            let out_path = format!("{out_dir}/extracted_{sha256}.txt");
            std::fs::write(&out_path, &truncated)
                .map_err(|e| SkillError::Failed { skill: SKILL_NAME, reason: format!("writing {out_path}: {e}") })?;

            artifacts.push(SkillArtifact {
                name: "extracted_text".into(),
                path: out_path,
                sha256,
                format: ArtifactFormat::Txt,
            });
        }

        Ok(SkillOutcome { artifacts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skill::SkillInputFile;
    use argentor_core::{PlanId, TaskId};
    use std::io::Write;

    #[tokio::test]
    async fn extracts_text_from_a_markdown_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "# heading\nbody text").unwrap();

        let skill = TextExtractSkill::new();
        let task_id = TaskId::new();
        let input = SkillInput {
            task_id,
            plan_id: PlanId::new(),
            files: vec![SkillInputFile { name: "notes".into(), path: path.to_string_lossy().to_string(), sha256: "deadbeef".into() }],
            params: serde_json::json!({}),
        };

        let outcome = skill.execute(input).await.unwrap();
        assert_eq!(outcome.artifacts.len(), 1);
        assert_eq!(outcome.artifacts[0].format, argentor_core::ArtifactFormat::Txt);
        let written = std::fs::read_to_string(&outcome.artifacts[0].path).unwrap();
        assert!(written.contains("heading"));

        std::fs::remove_dir_all(format!("workspace/artifacts/{task_id}")).ok();
    }

    #[tokio::test]
    async fn truncates_to_max_chars() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(&vec![b'a'; 100]).unwrap();

        let skill = TextExtractSkill::new();
        let task_id = TaskId::new();
        let input = SkillInput {
            task_id,
            plan_id: PlanId::new(),
            files: vec![SkillInputFile { name: "big".into(), path: path.to_string_lossy().to_string(), sha256: "deadbeef".into() }],
            params: serde_json::json!({"max_chars": 10}),
        };

        let outcome = skill.execute(input).await.unwrap();
        let written = std::fs::read_to_string(&outcome.artifacts[0].path).unwrap();
        assert_eq!(written.len(), 10);

        std::fs::remove_dir_all(format!("workspace/artifacts/{task_id}")).ok();
    }

    #[tokio::test]
    async fn unsupported_extension_is_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();

        let skill = TextExtractSkill::new();
        let input = SkillInput {
            task_id: TaskId::new(),
            plan_id: PlanId::new(),
            files: vec![SkillInputFile { name: "doc".into(), path: path.to_string_lossy().to_string(), sha256: "deadbeef".into() }],
            params: serde_json::json!({}),
        };

        let err = skill.execute(input).await.unwrap_err();
        assert!(matches!(err, SkillError::BadInput { .. }));
    }
}
