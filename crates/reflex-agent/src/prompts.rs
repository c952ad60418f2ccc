//! Prompt sets for the draft → critique → revise cycle
//!
//! Each artifact kind supplies its own wording through [`ArtifactPrompts`].
//! All critique prompts ask for the same JSON shape so that
//! [`Feedback::parse`](crate::Feedback::parse) can read any of them.

use std::sync::LazyLock;

use regex::Regex;

use crate::feedback::Feedback;

/// Wording for one kind of artifact
pub trait ArtifactPrompts: Send + Sync {
    /// Short identifier, used for logs and artifact metadata
    fn kind(&self) -> &str;

    /// System instruction shared by every step
    fn system(&self) -> Option<&str> {
        None
    }

    /// Whether drafting should go through the tool-calling conversation
    fn uses_tools(&self) -> bool {
        false
    }

    /// Rubric dimensions the critique must score
    fn rubric(&self) -> &[&str];

    fn draft(&self, task: &str) -> String;

    fn critique(&self, task: &str, artifact: &str) -> String;

    fn revise(&self, task: &str, artifact: &str, feedback: &Feedback) -> String;

    /// Pull the artifact out of a raw model response
    fn extract(&self, response: &str) -> String {
        response.trim().to_string()
    }
}

/// JSON contract appended to every critique prompt
fn feedback_format(rubric: &[&str]) -> String {
    let scores = rubric
        .iter()
        .map(|d| format!("\"{}\": <1-5>", d))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"Respond with a single JSON object and nothing else:
{{
  "verdict": "<one-sentence overall assessment>",
  "strengths": ["<what works well>", ...],
  "fixes": [
    {{"priority": 1, "issue": "<problem and why it matters>", "suggestion": "<concrete fix>"}},
    ...
  ],
  "scores": {{{scores}}}
}}
List at most 5 fixes, most important first. Scores are integers from 1 to 5."#
    )
}

/// Extra instruction for critique attempt `attempt` (1-based) after a parse failure
pub fn strict_json_reminder(attempt: u32, reason: &str) -> String {
    let mut reminder = format!(
        "\n\nCRITICAL: Your previous response could not be used ({}). \
         Output ONLY the JSON object, with no additional text before or after.",
        reason
    );
    if attempt > 2 {
        reminder.push_str(
            " Do not use code fences. Every field shown above is required, \
             and every score must be an integer between 1 and 5.",
        );
    }
    reminder
}

/// Essays written without tools
#[derive(Debug, Clone, Default)]
pub struct EssayPrompts;

const ESSAY_RUBRIC: &[&str] = &["Structure", "Clarity", "Argument Strength", "Style", "Overall"];

impl ArtifactPrompts for EssayPrompts {
    fn kind(&self) -> &str {
        "essay"
    }

    fn rubric(&self) -> &[&str] {
        ESSAY_RUBRIC
    }

    fn draft(&self, task: &str) -> String {
        format!(
            "Write a comprehensive, well-structured essay on the following topic:\n\n\
             TOPIC: {task}\n\n\
             Requirements:\n\
             - Write a complete essay with introduction, body paragraphs, and conclusion\n\
             - Present clear arguments supported by reasoning and examples\n\
             - Maintain an academic tone appropriate for a research essay\n\
             - Aim for approximately 500-800 words\n\
             - Include a thesis statement in the introduction\n\n\
             Output only the essay text, without any meta-commentary."
        )
    }

    fn critique(&self, _task: &str, artifact: &str) -> String {
        format!(
            "You are a meticulous peer reviewer and writing coach. Read the essay below and \
             give a critical but constructive review. Do NOT rewrite the essay.\n\n\
             ESSAY\n------\n{artifact}\n------\n\n\
             Consider structure and flow, clarity and precision, argument quality \
             (thesis, logic, evidence, counterarguments) and style and tone.\n\n{}",
            feedback_format(self.rubric())
        )
    }

    fn revise(&self, _task: &str, artifact: &str, feedback: &Feedback) -> String {
        format!(
            "You are an expert editor. Revise the essay below using the feedback. \
             Preserve its core ideas and factual accuracy.\n\n\
             ORIGINAL DRAFT\n--------------\n{artifact}\n\n\
             FEEDBACK\n--------\n{}\n\
             Address every listed fix, strengthen transitions and clarify weak evidence. \
             Do not add unrelated content or fabricate citations.\n\
             Output ONLY the revised essay.",
            feedback.to_markdown()
        )
    }
}

/// Research reports drafted with search tools
#[derive(Debug, Clone, Default)]
pub struct ResearchReportPrompts;

const RESEARCH_SYSTEM: &str = "You are a research assistant that can search the web, \
Wikipedia, arXiv and Europe PMC to write detailed, accurate, and properly sourced research reports. Use tools when \
appropriate. Cite sources whenever relevant and include full URLs. Use an academic tone and \
organize the output into clearly labeled sections. Never use placeholder text such as \
'(citation needed)'.";

const RESEARCH_RUBRIC: &[&str] = &["Accuracy", "Sourcing", "Structure", "Clarity", "Overall"];

impl ArtifactPrompts for ResearchReportPrompts {
    fn kind(&self) -> &str {
        "research_report"
    }

    fn system(&self) -> Option<&str> {
        Some(RESEARCH_SYSTEM)
    }

    fn uses_tools(&self) -> bool {
        true
    }

    fn rubric(&self) -> &[&str] {
        RESEARCH_RUBRIC
    }

    fn draft(&self, task: &str) -> String {
        format!(
            "Write a research report on the following question. Search for recent papers \
             and web sources first, then write the report with inline citations and a \
             references section.\n\nQUESTION: {task}"
        )
    }

    fn critique(&self, task: &str, artifact: &str) -> String {
        format!(
            "You are an academic reviewer. Review the research report below, written for \
             the question \"{task}\". Assess its strengths, limitations, unsupported claims, \
             missing sources and opportunities for deeper analysis.\n\n\
             REPORT\n------\n{artifact}\n------\n\n{}",
            feedback_format(self.rubric())
        )
    }

    fn revise(&self, task: &str, artifact: &str, feedback: &Feedback) -> String {
        format!(
            "You are an academic editor. Revise the research report for the question \
             \"{task}\" so that it addresses the review. Keep every valid citation and URL; \
             do not invent sources.\n\n\
             REPORT\n------\n{artifact}\n\n\
             REVIEW\n------\n{}\n\
             Output ONLY the revised report.",
            feedback.to_markdown()
        )
    }
}

/// Plotting code for a dataset, returned inside `<execute_python>` tags
#[derive(Debug, Clone)]
pub struct ChartCodePrompts {
    /// Column names and types of the dataset
    pub schema: String,
    /// First rows of the dataset as JSON records
    pub sample: Option<String>,
    /// Where the generated code should save the chart
    pub output_path: String,
}

const CHART_RUBRIC: &[&str] = &[
    "Chart Type",
    "Truthfulness",
    "Readability",
    "Data-Ink Ratio",
    "Overall",
];

const CHART_CONSTRAINTS: &str = "Constraints:\n\
1. Assume a pandas DataFrame named `df` is already loaded with the schema above.\n\
2. Use matplotlib for plotting; pandas may be used for wrangling.\n\
3. Add a clear title, axis labels, and a legend when appropriate.\n\
4. Do not call plt.show(); call plt.close() after saving.\n\
5. Include all imports inside the code block.";

static EXECUTE_PYTHON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<execute_python>([\s\S]*?)</execute_python>").unwrap()
});

static FENCED_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:python|py)?[ \t]*\n([\s\S]*?)```").unwrap());

impl ChartCodePrompts {
    pub fn new(schema: impl Into<String>, output_path: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            sample: None,
            output_path: output_path.into(),
        }
    }

    pub fn with_sample(mut self, sample: impl Into<String>) -> Self {
        self.sample = Some(sample.into());
        self
    }

    /// Schema, plus sample rows when known, as embedded in every prompt
    fn dataset(&self) -> String {
        match &self.sample {
            Some(sample) => format!(
                "Dataset schema:\n{}\n\nSample rows (JSON records):\n{}",
                self.schema, sample
            ),
            None => format!("Dataset schema:\n{}", self.schema),
        }
    }
}

impl ArtifactPrompts for ChartCodePrompts {
    fn kind(&self) -> &str {
        "chart_code"
    }

    fn system(&self) -> Option<&str> {
        Some("You are a data visualization expert.")
    }

    fn rubric(&self) -> &[&str] {
        CHART_RUBRIC
    }

    fn draft(&self, task: &str) -> String {
        format!(
            "{}\n\n\
             Write Python code for this chart: {task}\n\
             Save the chart to '{}' with dpi=300.\n\n{CHART_CONSTRAINTS}\n\n\
             Output ONLY the code wrapped in:\n<execute_python>\n# code here\n</execute_python>",
            self.dataset(),
            self.output_path
        )
    }

    fn critique(&self, task: &str, artifact: &str) -> String {
        format!(
            "Critique the plotting code below for the instruction \"{task}\". Evaluate chart \
             type appropriateness, perceptual accuracy (honest scales, baselines), clarity \
             and readability (labels, legend, colors), data-ink ratio, and statistical \
             integrity.\n\n{}\n\nCODE\n----\n{artifact}\n----\n\n{}",
            self.dataset(),
            feedback_format(self.rubric())
        )
    }

    fn revise(&self, task: &str, artifact: &str, feedback: &Feedback) -> String {
        format!(
            "Improve the plotting code for the instruction \"{task}\" by applying the critique.\n\n\
             {}\n\nCODE\n----\n{artifact}\n\nCRITIQUE\n--------\n{}\n\
             Save the chart to '{}' with dpi=300.\n\n{CHART_CONSTRAINTS}\n\n\
             Output ONLY the refined code wrapped in:\n<execute_python>\n...\n</execute_python>",
            self.dataset(),
            feedback.to_markdown(),
            self.output_path
        )
    }

    fn extract(&self, response: &str) -> String {
        EXECUTE_PYTHON
            .captures(response)
            .or_else(|| FENCED_CODE.captures(response))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap_or(response)
            .trim()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_feedback() -> Feedback {
        Feedback::parse(
            r#"{"verdict": "Too short", "fixes": [{"issue": "Expand", "suggestion": "Add detail"}],
                "scores": {"Overall": 2}}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_critique_prompts_request_rubric() {
        let essay = EssayPrompts.critique("t", "body");
        for dim in ESSAY_RUBRIC {
            assert!(essay.contains(&format!("\"{}\": <1-5>", dim)));
        }
        assert!(essay.contains("body"));

        let chart = ChartCodePrompts::new("date: str", "chart.png").critique("t", "code");
        assert!(chart.contains("\"Data-Ink Ratio\": <1-5>"));
    }

    #[test]
    fn test_revise_embeds_feedback() {
        let prompt = ResearchReportPrompts.revise("q", "report", &sample_feedback());
        assert!(prompt.contains("Too short"));
        assert!(prompt.contains("Expand → Add detail"));
    }

    #[test]
    fn test_chart_prompts_include_sample_rows() {
        let plain = ChartCodePrompts::new("- region: string", "chart.png");
        assert!(!plain.draft("sales by region").contains("Sample rows"));

        let with_rows = plain.with_sample(r#"[{"region": "north"}]"#);
        for prompt in [
            with_rows.draft("sales by region"),
            with_rows.critique("sales by region", "import matplotlib"),
        ] {
            assert!(prompt.contains("- region: string"));
            assert!(prompt.contains(r#"[{"region": "north"}]"#));
        }
    }

    #[test]
    fn test_only_research_uses_tools() {
        assert!(ResearchReportPrompts.uses_tools());
        assert!(!EssayPrompts.uses_tools());
        assert!(!ChartCodePrompts::new("", "").uses_tools());
    }

    #[test]
    fn test_chart_extracts_tagged_code() {
        let prompts = ChartCodePrompts::new("", "out.png");
        let response = "{\"description\": \"bar chart\"}\n<execute_python>\nimport pandas as pd\nplt.close()\n</execute_python>";
        assert_eq!(prompts.extract(response), "import pandas as pd\nplt.close()");
    }

    #[test]
    fn test_chart_extracts_fenced_code() {
        let prompts = ChartCodePrompts::new("", "out.png");
        let response = "Here you go:\n```python\nprint('hi')\n```";
        assert_eq!(prompts.extract(response), "print('hi')");
        assert_eq!(prompts.extract("  bare code  "), "bare code");
    }

    #[test]
    fn test_strict_reminder_escalates() {
        let second = strict_json_reminder(2, "invalid JSON");
        let third = strict_json_reminder(3, "invalid JSON");
        assert!(second.contains("invalid JSON"));
        assert!(!second.contains("code fences"));
        assert!(third.contains("code fences"));
    }
}
