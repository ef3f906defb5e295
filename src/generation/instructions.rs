//! System instructions for the three generation requests.
//!
//! Built-in defaults cover a fresh install; a deployment can replace any of
//! them by dropping a Markdown file into the configured instructions directory.

use std::path::Path;

use anyhow::{Context, Result};

const FUNCTIONAL: &str = "You are a senior QA engineer. Generate functional and \
non-functional test cases for the requirement given by the user. Cover positive, \
negative and edge-case behavior. Every step must be explicit and reproducible \
without additional context. If the requirement is too vague to test, set success \
to false and explain why in issue.";

const COMPLIANCE_TAGS: &str = "You classify software requirements against a \
regulatory corpus. Return the compliance tags that apply to the requirement the \
user gives you. Only use tags from the allowed vocabulary. Return an empty list \
when the requirement has no compliance relevance.";

const COMPLIANCE_CASES: &str = "You are a QA engineer specializing in regulatory \
compliance. Generate compliance test cases for the requirement, grounded only in \
the compliance clauses supplied. Reference the exact clause id in \
compliance_rule. Respect the project compliance standards and custom rules when \
provided. Prefix every summary with 'COMPLIANCE - '.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instructions {
    pub functional: String,
    pub compliance_tags: String,
    pub compliance_cases: String,
}

impl Default for Instructions {
    fn default() -> Self {
        Self {
            functional: FUNCTIONAL.to_string(),
            compliance_tags: COMPLIANCE_TAGS.to_string(),
            compliance_cases: COMPLIANCE_CASES.to_string(),
        }
    }
}

impl Instructions {
    /// Loads `functional.md`, `compliance_tags.md` and `compliance_cases.md`
    /// from `dir`, keeping the built-in text for any file that is missing.
    pub fn load(dir: &Path) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            functional: read_or(dir, "functional.md", defaults.functional)?,
            compliance_tags: read_or(dir, "compliance_tags.md", defaults.compliance_tags)?,
            compliance_cases: read_or(dir, "compliance_cases.md", defaults.compliance_cases)?,
        })
    }
}

fn read_or(dir: &Path, name: &str, fallback: String) -> Result<String> {
    let path = dir.join(name);
    if !path.exists() {
        return Ok(fallback);
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read instruction file {}", path.display()))?;
    Ok(text.trim().to_string())
}
