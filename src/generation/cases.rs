use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The `{success, issue, data}` wrapper every generation call returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default)]
    pub issue: String,
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

impl<T> Envelope<T> {
    pub fn failure(issue: impl Into<String>) -> Self {
        Self {
            success: false,
            issue: issue.into(),
            data: Vec::new(),
        }
    }
}

/// Output of the tag extraction phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagExtraction {
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One test case as the backend produces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedCase {
    pub summary: String,
    pub description: CaseDescription,
}

impl GeneratedCase {
    pub fn kind(&self) -> CaseKind {
        match self.description {
            CaseDescription::Functional(_) => CaseKind::Functional,
            CaseDescription::NonFunctional(_) => CaseKind::NonFunctional,
            CaseDescription::Compliance(_) => CaseKind::Compliance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseKind {
    Functional,
    NonFunctional,
    Compliance,
}

/// Typed body of a test case, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CaseDescription {
    Functional(FunctionalDetails),
    NonFunctional(NonFunctionalDetails),
    Compliance(ComplianceDetails),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionalDetails {
    pub purpose: String,
    #[serde(default)]
    pub preconditions: String,
    pub testing_procedure: Vec<String>,
    pub expected_result: String,
    pub requirement_coverage: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonFunctionalDetails {
    /// Performance, Security, Usability, Reliability, Scalability or Compatibility.
    pub test_category: String,
    #[serde(default)]
    pub preconditions: String,
    pub testing_procedure: Vec<String>,
    pub expected_result: String,
    pub acceptance_criteria: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceDetails {
    /// Exact rule including its clause id.
    pub compliance_rule: String,
    #[serde(default)]
    pub preconditions: String,
    pub testing_procedure: Vec<String>,
    pub expected_result: String,
    pub compliance_impact: String,
}

/// A generated case bound to its item, ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCase {
    pub id: String,
    pub item_id: String,
    pub summary: String,
    pub description: CaseDescription,
}

impl TestCase {
    /// Assigns a fresh id to a generated case.
    pub fn new(item_id: &str, case: GeneratedCase) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            item_id: item_id.to_string(),
            summary: case.summary,
            description: case.description,
        }
    }

    /// JSON stored in the `description` column.
    pub fn description_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.description)
    }
}
