use serde::Serialize;

/// Stages of the process-file pipeline, in execution order.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Validate,
    Analyze,
    Backup,
    Extract,
    PopulateCells,
    AutoDetectSourceLanguage,
    Translate,
    ApplyTranslations,
    Cleanup,
}

impl PipelineStage {
    pub fn label(&self) -> &'static str {
        match self {
            PipelineStage::Validate => "Request validation",
            PipelineStage::Analyze => "File analysis",
            PipelineStage::Backup => "Backup",
            PipelineStage::Extract => "Content extraction",
            PipelineStage::PopulateCells => "Cell population",
            PipelineStage::AutoDetectSourceLanguage => "Source language detection",
            PipelineStage::Translate => "Translation",
            PipelineStage::ApplyTranslations => "Writing translated file",
            PipelineStage::Cleanup => "Cleanup",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PipelineStage::Validate => {
                "Checks the file, language pair, batch settings and content volume."
            }
            PipelineStage::Analyze => "Reads sheet counts, cell counts and processability flags.",
            PipelineStage::Backup => "Copies the source workbook aside. Failure only warns.",
            PipelineStage::Extract => "Pulls (text, row, column) triples out of each sheet.",
            PipelineStage::PopulateCells => {
                "Drops filtered text and attaches sheet names to the remaining cells."
            }
            PipelineStage::AutoDetectSourceLanguage => {
                "Samples cell texts and picks the most frequent confident language."
            }
            PipelineStage::Translate => "Runs the batch translation across every sheet.",
            PipelineStage::ApplyTranslations => {
                "Writes translated cells to the output workbook. Failure only warns."
            }
            PipelineStage::Cleanup => "Removes temporary files and stale backups.",
        }
    }

    /// Stages whose failure never fails the run.
    pub fn is_best_effort(&self) -> bool {
        matches!(
            self,
            PipelineStage::Backup | PipelineStage::ApplyTranslations | PipelineStage::Cleanup
        )
    }

    /// `"<label> failed: <reason>"`, the message carried by failed responses.
    pub fn failure_message(&self, reason: impl std::fmt::Display) -> String {
        format!("{} failed: {reason}", self.label())
    }
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PipelinePlan {
    pub target: String,
    pub stages: Vec<PipelineStage>,
}

impl PipelinePlan {
    pub fn default_for(file_name: &str, auto_detect: bool, backup: bool, has_output: bool) -> Self {
        let target = format!("Translation pipeline for {file_name}");
        let stages = [
            (PipelineStage::Validate, true),
            (PipelineStage::Analyze, true),
            (PipelineStage::Backup, backup),
            (PipelineStage::Extract, true),
            (PipelineStage::PopulateCells, true),
            (PipelineStage::AutoDetectSourceLanguage, auto_detect),
            (PipelineStage::Translate, true),
            (PipelineStage::ApplyTranslations, has_output),
            (PipelineStage::Cleanup, true),
        ]
        .into_iter()
        .filter_map(|(stage, enabled)| enabled.then_some(stage))
        .collect();

        Self { target, stages }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_stages_follow_flags() {
        let minimal = PipelinePlan::default_for("book.xlsx", false, false, false);
        assert_eq!(
            minimal.stages,
            vec![
                PipelineStage::Validate,
                PipelineStage::Analyze,
                PipelineStage::Extract,
                PipelineStage::PopulateCells,
                PipelineStage::Translate,
                PipelineStage::Cleanup,
            ]
        );

        let full = PipelinePlan::default_for("book.xlsx", true, true, true);
        assert_eq!(full.stages.len(), 9);
        assert_eq!(full.target, "Translation pipeline for book.xlsx");
    }

    #[test]
    fn failure_message_names_the_stage() {
        assert_eq!(
            PipelineStage::Extract.failure_message("corrupt sheet"),
            "Content extraction failed: corrupt sheet"
        );
        assert!(PipelineStage::Backup.is_best_effort());
        assert!(!PipelineStage::Translate.is_best_effort());
    }
}
