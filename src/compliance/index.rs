//! Static compliance corpus lookups.
//!
//! The forward index maps a composite clause id (`"{source} {clause_id}"`) to
//! the clause; the reverse index maps a tag to the clause ids carrying it.
//! Both are loaded once per process and never mutated afterwards.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::PipelineError;

pub const FORWARD_FILE: &str = "compliance_index.json";
pub const REVERSE_FILE: &str = "compliance_reverse_index.json";
pub const TAGS_FILE: &str = "compliance_tags.json";

/// One clause of a compliance source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceClause {
    /// Source document, e.g. "HIPAA".
    pub source: String,
    /// Clause identifier inside the source, e.g. "§164.312(a)".
    pub clause_id: String,
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ComplianceClause {
    pub fn composite_id(&self) -> String {
        format!("{} {}", self.source, self.clause_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComplianceIndex {
    clauses: HashMap<String, ComplianceClause>,
    reverse: HashMap<String, Vec<String>>,
}

impl ComplianceIndex {
    /// Builds both lookups from corpus clauses, keeping corpus order in the
    /// per-tag id lists.
    pub fn build(corpus: impl IntoIterator<Item = ComplianceClause>) -> Self {
        let mut clauses = HashMap::new();
        let mut reverse: HashMap<String, Vec<String>> = HashMap::new();
        for clause in corpus {
            let id = clause.composite_id();
            for tag in &clause.tags {
                let ids = reverse.entry(tag.clone()).or_default();
                if !ids.contains(&id) {
                    ids.push(id.clone());
                }
            }
            clauses.insert(id, clause);
        }
        Self { clauses, reverse }
    }

    /// Assembles an index from already-built tables, checking they agree.
    pub fn from_parts(
        clauses: HashMap<String, ComplianceClause>,
        reverse: HashMap<String, Vec<String>>,
    ) -> Result<Self, PipelineError> {
        let index = Self { clauses, reverse };
        index.verify()?;
        Ok(index)
    }

    /// Loads the forward and reverse index files written by the build step.
    pub fn load(forward_path: &Path, reverse_path: &Path) -> Result<Self, PipelineError> {
        let clauses: HashMap<String, ComplianceClause> =
            serde_json::from_str(&std::fs::read_to_string(forward_path)?)?;
        let reverse: HashMap<String, Vec<String>> =
            serde_json::from_str(&std::fs::read_to_string(reverse_path)?)?;
        let index = Self::from_parts(clauses, reverse)?;
        info!(
            clauses = index.clauses.len(),
            tags = index.reverse.len(),
            "compliance index loaded"
        );
        Ok(index)
    }

    /// Writes the forward index, reverse index and tag vocabulary into `dir`.
    pub fn write_to(&self, dir: &Path) -> Result<(), PipelineError> {
        std::fs::create_dir_all(dir)?;
        let forward: BTreeMap<_, _> = self.clauses.iter().collect();
        let reverse: BTreeMap<_, _> = self.reverse.iter().collect();
        std::fs::write(dir.join(FORWARD_FILE), serde_json::to_string_pretty(&forward)?)?;
        std::fs::write(dir.join(REVERSE_FILE), serde_json::to_string_pretty(&reverse)?)?;
        std::fs::write(dir.join(TAGS_FILE), serde_json::to_string_pretty(&self.tags())?)?;
        Ok(())
    }

    fn verify(&self) -> Result<(), PipelineError> {
        for (tag, ids) in &self.reverse {
            if let Some(missing) = ids.iter().find(|id| !self.clauses.contains_key(*id)) {
                return Err(PipelineError::Configuration(format!(
                    "reverse index tag '{tag}' points at unknown clause '{missing}'"
                )));
            }
        }
        Ok(())
    }

    pub fn clause_ids_for(&self, tag: &str) -> Option<&[String]> {
        self.reverse.get(tag).map(Vec::as_slice)
    }

    pub fn clause(&self, id: &str) -> Option<&ComplianceClause> {
        self.clauses.get(id)
    }

    /// The tag vocabulary, sorted.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.reverse.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn clause(source: &str, clause_id: &str, tags: &[&str]) -> ComplianceClause {
        ComplianceClause {
            source: source.into(),
            clause_id: clause_id.into(),
            title: format!("{source} {clause_id} title"),
            text: format!("{source} {clause_id} text"),
            severity: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub(crate) fn sample_index() -> ComplianceIndex {
        ComplianceIndex::build([
            clause("HIPAA", "§164.312(a)", &["access_control", "unique_user_id"]),
            clause("HIPAA", "§164.312(b)", &["audit_logging"]),
            clause("FDA", "21 CFR 11.10(d)", &["access_control"]),
        ])
    }

    #[test]
    fn build_composes_ids_and_reverse_lists() {
        let index = sample_index();
        assert_eq!(index.len(), 3);
        assert_eq!(
            index.clause_ids_for("access_control").unwrap(),
            &["HIPAA §164.312(a)".to_string(), "FDA 21 CFR 11.10(d)".to_string()]
        );
        assert_eq!(
            index.clause("HIPAA §164.312(b)").unwrap().title,
            "HIPAA §164.312(b) title"
        );
        assert!(index.clause_ids_for("encryption").is_none());
        assert!(!index.is_empty());
        assert!(ComplianceIndex::build(Vec::new()).is_empty());
    }

    #[test]
    fn tags_are_sorted_vocabulary() {
        assert_eq!(
            sample_index().tags(),
            vec!["access_control", "audit_logging", "unique_user_id"]
        );
    }

    #[test]
    fn write_then_load_preserves_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let index = sample_index();
        index.write_to(dir.path()).unwrap();

        let loaded =
            ComplianceIndex::load(&dir.path().join(FORWARD_FILE), &dir.path().join(REVERSE_FILE))
                .unwrap();
        assert_eq!(loaded, index);

        let tags: Vec<String> =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join(TAGS_FILE)).unwrap())
                .unwrap();
        assert_eq!(tags.len(), 3);
    }

    #[test]
    fn reverse_entry_without_clause_is_rejected() {
        let mut reverse = HashMap::new();
        reverse.insert("encryption".to_string(), vec!["ISO 27001 A.8.24".to_string()]);
        let err = ComplianceIndex::from_parts(HashMap::new(), reverse).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }
}
