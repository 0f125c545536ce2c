//! Scripted workflow episodes.
//!
//! An episode file is a JSON list of steps replayed against a [`WorkflowController`]:
//!
//! ```json
//! { "steps": [
//!     { "action": "fill", "fields": { "age": { "kind": "number", "value": 72 } } },
//!     { "action": "advance" },
//!     { "action": "edit", "stage": 1 },
//!     { "action": "submit" }
//! ] }
//! ```

use anyhow::{anyhow, Context};
use atn_core::{FieldValue, Stage, StageBackend, WorkflowController, WorkflowView};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Episode {
    pub steps: Vec<Step>,
}

/// One user action.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Sets fields of the current stage.
    Fill { fields: BTreeMap<String, FieldValue> },
    /// Marks a field of the current stage as explicitly empty.
    Clear { field: String },
    Advance,
    Retreat,
    /// Jumps back from the summary to a stage number.
    Edit { stage: u8 },
    Submit,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Fill { fields } => write!(f, "fill {} field(s)", fields.len()),
            Step::Clear { field } => write!(f, "clear {field}"),
            Step::Advance => f.write_str("advance"),
            Step::Retreat => f.write_str("retreat"),
            Step::Edit { stage } => write!(f, "edit stage {stage}"),
            Step::Submit => f.write_str("submit"),
        }
    }
}

impl Episode {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading episode {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing episode {}", path.display()))
    }

    /// Applies every step in order and returns the final view.
    ///
    /// # Errors
    ///
    /// The first failing step, numbered from 1.
    pub async fn replay<B: StageBackend>(
        &self,
        ctl: &mut WorkflowController<B>,
    ) -> anyhow::Result<WorkflowView> {
        for (index, step) in self.steps.iter().enumerate() {
            apply(ctl, step)
                .await
                .with_context(|| format!("step {} ({step}) failed", index + 1))?;
            tracing::debug!(step = index + 1, state = %ctl.state(), "step applied");
        }
        Ok(ctl.view())
    }
}

async fn apply<B: StageBackend>(
    ctl: &mut WorkflowController<B>,
    step: &Step,
) -> anyhow::Result<()> {
    match step {
        Step::Fill { fields } => {
            for (name, value) in fields {
                ctl.set_field(name, value.clone())?;
            }
        }
        Step::Clear { field } => ctl.clear_field(field)?,
        Step::Advance => {
            ctl.advance().await?;
        }
        Step::Retreat => {
            ctl.retreat()?;
        }
        Step::Edit { stage } => {
            let stage = Stage::from_number(*stage).ok_or_else(|| anyhow!("no stage {stage}"))?;
            ctl.edit(stage)?;
        }
        Step::Submit => {
            ctl.submit().await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use atn_backend::InMemoryBackend;
    use atn_core::{CoreConfig, WorkflowState};
    use atn_engine::DiagnosisLabel;
    use std::io::Write;
    use std::sync::Arc;

    const EPISODE: &str = r#"{
        "steps": [
            { "action": "fill", "fields": {
                "age": { "kind": "number", "value": 72 },
                "mmse_score": { "kind": "number", "value": 22 },
                "moca_score": { "kind": "number", "value": 19 },
                "behavior_change": { "kind": "boolean", "value": true },
                "is_independent": { "kind": "boolean", "value": false }
            } },
            { "action": "advance" },
            { "action": "fill", "fields": {
                "assay_methods": { "kind": "choices", "value": ["Elecsys", "MRIFreesurfer"] },
                "abeta42_40_ratio": { "kind": "number", "value": 0.05 },
                "ptau_abeta42_ratio": { "kind": "number", "value": 0.09 },
                "hippocampal_left": { "kind": "number", "value": 3000 },
                "hippocampal_right": { "kind": "number", "value": 3100 },
                "intracranial_volume": { "kind": "number", "value": 1400000 }
            } },
            { "action": "advance" },
            { "action": "advance" },
            { "action": "advance" },
            { "action": "submit" }
        ]
    }"#;

    fn write_episode(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn reference_episode_submits() {
        let file = write_episode(EPISODE);
        let episode = Episode::load(file.path()).unwrap();
        let backend = Arc::new(InMemoryBackend::default());
        let mut ctl = WorkflowController::new(backend.clone(), CoreConfig::default());

        let view = episode.replay(&mut ctl).await.unwrap();
        assert_eq!(view.state, WorkflowState::Submitted);
        assert_eq!(
            view.diagnosis.unwrap().label,
            DiagnosisLabel::AlzheimersContinuum
        );
        assert_eq!(backend.finalization_count().await, 1);
    }

    #[tokio::test]
    async fn failing_step_is_numbered() {
        let file = write_episode(r#"{ "steps": [ { "action": "advance" } ] }"#);
        let episode = Episode::load(file.path()).unwrap();
        let mut ctl = WorkflowController::new(InMemoryBackend::default(), CoreConfig::default());

        let err = episode.replay(&mut ctl).await.unwrap_err();
        assert!(err.to_string().contains("step 1 (advance) failed"));
        assert_eq!(ctl.state(), WorkflowState::Editing(Stage::Intake));
    }

    #[tokio::test]
    async fn edit_to_unknown_stage_fails() {
        let episode = Episode {
            steps: vec![Step::Edit { stage: 9 }],
        };
        let mut ctl = WorkflowController::new(InMemoryBackend::default(), CoreConfig::default());
        assert!(episode.replay(&mut ctl).await.is_err());
    }

    #[test]
    fn unknown_action_does_not_parse() {
        let file = write_episode(r#"{ "steps": [ { "action": "teleport" } ] }"#);
        assert!(Episode::load(file.path()).is_err());
    }
}
