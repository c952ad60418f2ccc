//! Persisting reflection runs to disk

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use reflex_agent::ReflectionResult;

/// Writes every artifact of a run under one directory
pub struct ArtifactWriter {
    dir: PathBuf,
    basename: String,
}

impl ArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>, basename: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            basename: basename.into(),
        }
    }

    fn path(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}_{}", self.basename, suffix))
    }

    /// Write versions, final artifact, feedback report and run record.
    /// Returns the paths written, in that order.
    pub fn save(&self, result: &ReflectionResult) -> anyhow::Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let mut written = Vec::new();
        for iteration in &result.iterations {
            let path = self.path(&format!("v{}.txt", iteration.index));
            write(&path, &iteration.artifact)?;
            written.push(path);
        }

        let path = self.path("final.txt");
        write(&path, &result.final_artifact)?;
        written.push(path);

        let path = self.path("feedback.md");
        write(&path, &feedback_report(result))?;
        written.push(path);

        let path = self.path("run.json");
        let json = serde_json::to_string_pretty(result)?;
        write(&path, &json)?;
        written.push(path);

        tracing::debug!("wrote {} artifact file(s) to {}", written.len(), self.dir.display());
        Ok(written)
    }
}

fn write(path: &Path, content: &str) -> anyhow::Result<()> {
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

/// Human-readable summary of every critique in the run
pub fn feedback_report(result: &ReflectionResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Reflection run {}\n", result.run_id);
    let _ = writeln!(out, "- Task: {}", result.task);
    let _ = writeln!(out, "- Kind: {}", result.kind);
    let _ = writeln!(out, "- Iterations: {}", result.total_iterations);
    let _ = writeln!(out, "- Termination: {}\n", result.termination);

    for iteration in &result.iterations {
        let _ = write!(out, "## Version {} ({} words", iteration.index, iteration.size);
        if let Some(change) = iteration.change {
            let _ = write!(out, ", change {:.3}", change);
        }
        out.push_str(")\n\n");

        match &iteration.feedback {
            Some(feedback) => {
                let _ = writeln!(
                    out,
                    "Revised from this critique of version {} (average score {:.1}):\n",
                    iteration.index - 1,
                    feedback.average_score()
                );
                out.push_str(&feedback.to_markdown());
                out.push('\n');
            }
            None => out.push_str("Initial draft.\n\n"),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use reflex_agent::{Feedback, Iteration, Termination};

    fn sample() -> ReflectionResult {
        let feedback = Feedback::parse(
            r#"{"verdict": "Too short", "fixes": ["Explain the Calvin cycle"], "scores": {"Overall": 2}}"#,
        )
        .unwrap();
        ReflectionResult {
            run_id: "run-1".into(),
            kind: "essay".into(),
            task: "Summarize photosynthesis".into(),
            iterations: vec![
                Iteration {
                    index: 1,
                    artifact: "Plants make food.".into(),
                    size: 3,
                    feedback: None,
                    change: None,
                    timestamp: Utc::now(),
                },
                Iteration {
                    index: 2,
                    artifact: "Plants convert light into chemical energy.".into(),
                    size: 6,
                    feedback: Some(feedback),
                    change: Some(0.8),
                    timestamp: Utc::now(),
                },
            ],
            final_artifact: "Plants convert light into chemical energy.".into(),
            total_iterations: 2,
            termination: Termination::Exhausted,
            tool_calls: vec![],
            usage: Default::default(),
        }
    }

    #[test]
    fn test_save_writes_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path().join("out"), "essay");

        let written = writer.save(&sample()).unwrap();
        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "essay_v1.txt",
                "essay_v2.txt",
                "essay_final.txt",
                "essay_feedback.md",
                "essay_run.json"
            ]
        );

        let v1 = fs::read_to_string(dir.path().join("out/essay_v1.txt")).unwrap();
        assert_eq!(v1, "Plants make food.");

        let json = fs::read_to_string(dir.path().join("out/essay_run.json")).unwrap();
        let restored: ReflectionResult = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.termination, Termination::Exhausted);
        assert_eq!(restored.iterations[1].feedback, sample().iterations[1].feedback);
    }

    #[test]
    fn test_feedback_report() {
        let report = feedback_report(&sample());
        assert!(report.contains("- Termination: exhausted"));
        assert!(report.contains("Initial draft."));
        assert!(report.contains("## Version 2 (6 words, change 0.800)"));
        assert!(report.contains("1. Explain the Calvin cycle"));
        assert!(report.contains("critique of version 1 (average score 2.0)"));
    }
}
