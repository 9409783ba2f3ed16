//! Prompt Builder System
//!
//! Mode-specific prompt construction. Every task mode maps to a fixed system
//! preamble; the preamble and the user request together form a
//! `PreparedPrompt` that is handed unchanged to whichever backend is tried.
//!
//! ## Design Principles
//!
//! 1. **Role Definition**: Clear assistant role per task mode
//! 2. **Structured Objectives**: Numbered goals
//! 3. **Output Contract**: The exact shape of the expected answer

use serde::{Deserialize, Serialize};

/// Task mode selecting the system preamble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskMode {
    #[default]
    Generate,
    Test,
    Document,
    Refactor,
    Boilerplate,
    Explain,
}

impl TaskMode {
    pub const ALL: [TaskMode; 6] = [
        TaskMode::Generate,
        TaskMode::Test,
        TaskMode::Document,
        TaskMode::Refactor,
        TaskMode::Boilerplate,
        TaskMode::Explain,
    ];

    /// System preamble prepended to every request in this mode
    pub fn system_prompt(&self) -> String {
        match self {
            TaskMode::Generate => PromptBuilder::new()
                .role("senior software engineer", "write production-ready code")
                .objectives(vec![
                    "Implement exactly what the request asks for",
                    "Follow the idioms of the target language",
                    "Handle errors explicitly",
                ])
                .output("Return only the code, in a single fenced code block.")
                .build(),
            TaskMode::Test => PromptBuilder::new()
                .role("test engineer", "write thorough automated tests")
                .objectives(vec![
                    "Cover the main behaviour and the edge cases",
                    "Use the conventional test framework of the language",
                    "Keep each test focused on one behaviour",
                ])
                .output("Return only the test code, in a single fenced code block.")
                .build(),
            TaskMode::Document => PromptBuilder::new()
                .role("technical writer", "document source code")
                .objectives(vec![
                    "Add doc comments to every public item",
                    "Describe parameters, return values and errors",
                    "Do not change behaviour",
                ])
                .output("Return the full documented code in a single fenced code block.")
                .build(),
            TaskMode::Refactor => PromptBuilder::new()
                .role("senior software engineer", "refactor code for clarity")
                .objectives(vec![
                    "Preserve observable behaviour",
                    "Remove duplication and simplify control flow",
                    "Summarize the changes after the code",
                ])
                .output("Return the refactored code in a fenced code block, then a short change list.")
                .build(),
            TaskMode::Boilerplate => PromptBuilder::new()
                .role("software architect", "scaffold new projects")
                .objectives(vec![
                    "Produce a minimal but complete project skeleton",
                    "Include build configuration and an entry point",
                    "Mark every generated file with its relative path",
                ])
                .output("Return each file as a fenced code block preceded by its path.")
                .build(),
            TaskMode::Explain => PromptBuilder::new()
                .role("code reviewer", "explain code line by line")
                .objectives(vec![
                    "Explain what every non-empty line does",
                    "Flag risky lines with a risk level",
                    "Note performance and security concerns where relevant",
                ])
                .output(EXPLAIN_OUTPUT_CONTRACT)
                .build(),
        }
    }
}

impl std::fmt::Display for TaskMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskMode::Generate => write!(f, "generate"),
            TaskMode::Test => write!(f, "test"),
            TaskMode::Document => write!(f, "document"),
            TaskMode::Refactor => write!(f, "refactor"),
            TaskMode::Boilerplate => write!(f, "boilerplate"),
            TaskMode::Explain => write!(f, "explain"),
        }
    }
}

impl std::str::FromStr for TaskMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "generate" => Ok(TaskMode::Generate),
            "test" => Ok(TaskMode::Test),
            "document" => Ok(TaskMode::Document),
            "refactor" => Ok(TaskMode::Refactor),
            "boilerplate" => Ok(TaskMode::Boilerplate),
            "explain" => Ok(TaskMode::Explain),
            _ => Err(format!(
                "Unknown task mode: {}. Valid values: generate, test, document, refactor, boilerplate, explain",
                s
            )),
        }
    }
}

const EXPLAIN_OUTPUT_CONTRACT: &str = r#"Respond ONLY with a JSON array, no prose. Each element:
{"lineNumber": <int, 1-based>, "code": "<the line>", "explanation": "<what it does>",
 "riskLevel": "low" | "medium" | "high" (optional),
 "performanceNote": "<text>" (optional), "securityIssue": "<text>" (optional)}"#;

/// Fully transformed prompt, identical for every backend in a chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedPrompt {
    pub mode: TaskMode,
    /// Mode-specific system instruction
    pub system: String,
    /// User content (request text, or numbered source for explain mode)
    pub user: String,
}

impl PreparedPrompt {
    pub fn new(mode: TaskMode, user: impl Into<String>) -> Self {
        Self {
            mode,
            system: mode.system_prompt(),
            user: user.into(),
        }
    }

    /// Build the explain-mode prompt with a numbered source listing
    pub fn explain(code: &str, language: Option<&str>) -> Self {
        let mut builder = PromptBuilder::new();
        if let Some(language) = language {
            builder = builder.text(&format!("Language: {}", language));
        }
        let user = builder
            .code(language.unwrap_or(""), &number_lines(code))
            .build();
        Self::new(TaskMode::Explain, user)
    }

    /// System preamble and user content as one block, for single-message APIs
    pub fn combined(&self) -> String {
        format!("{}\n\n---\n\n{}", self.system, self.user)
    }
}

/// Prefix every line with its 1-based number
fn number_lines(code: &str) -> String {
    code.lines()
        .enumerate()
        .map(|(idx, line)| format!("{:>4} | {}", idx + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt section types
#[derive(Debug, Clone)]
enum PromptSection {
    Role { expertise: String, task: String },
    Objectives(Vec<String>),
    Text(String),
    Code { language: String, content: String },
    Output(String),
}

/// Prompt builder for consistent prompt construction
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    sections: Vec<PromptSection>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a role definition section
    pub fn role(mut self, expertise: &str, task: &str) -> Self {
        self.sections.push(PromptSection::Role {
            expertise: expertise.to_string(),
            task: task.to_string(),
        });
        self
    }

    /// Add objectives section
    pub fn objectives(mut self, objectives: Vec<&str>) -> Self {
        self.sections.push(PromptSection::Objectives(
            objectives.into_iter().map(String::from).collect(),
        ));
        self
    }

    pub fn text(mut self, content: &str) -> Self {
        self.sections.push(PromptSection::Text(content.to_string()));
        self
    }

    pub fn code(mut self, language: &str, content: &str) -> Self {
        self.sections.push(PromptSection::Code {
            language: language.to_string(),
            content: content.to_string(),
        });
        self
    }

    /// Add the output contract section
    pub fn output(mut self, contract: &str) -> Self {
        self.sections.push(PromptSection::Output(contract.to_string()));
        self
    }

    pub fn build(&self) -> String {
        let mut parts = Vec::with_capacity(self.sections.len());

        for section in &self.sections {
            let rendered = match section {
                PromptSection::Role { expertise, task } => {
                    format!("You are an expert {}. Your task: {}.", expertise, task)
                }
                PromptSection::Objectives(items) => {
                    let mut out = String::from("## Objectives\n");
                    for (idx, item) in items.iter().enumerate() {
                        out.push_str(&format!("{}. {}\n", idx + 1, item));
                    }
                    out.trim_end().to_string()
                }
                PromptSection::Text(content) => content.clone(),
                PromptSection::Code { language, content } => {
                    format!("```{}\n{}\n```", language, content)
                }
                PromptSection::Output(contract) => format!("## Output\n{}", contract),
            };
            parts.push(rendered);
        }

        parts.join("\n\n")
    }
}
