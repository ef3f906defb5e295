use serde_json::{Value, json};

/// The structured output a generation request expects back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputShape {
    /// Envelope whose data items are functional or non-functional cases.
    FunctionalSuite,
    /// Envelope whose data items are compliance cases.
    ComplianceSuite,
    /// `{ tags: string[] }`.
    ComplianceTags,
}

impl OutputShape {
    pub fn name(&self) -> &'static str {
        match self {
            OutputShape::FunctionalSuite => "functional_suite",
            OutputShape::ComplianceSuite => "compliance_suite",
            OutputShape::ComplianceTags => "compliance_tags",
        }
    }

    /// JSON Schema handed to the backend alongside the instruction.
    pub fn json_schema(&self) -> Value {
        match self {
            OutputShape::FunctionalSuite => envelope(json!({
                "anyOf": [functional_case(), non_functional_case()]
            })),
            OutputShape::ComplianceSuite => envelope(compliance_case()),
            OutputShape::ComplianceTags => json!({
                "type": "object",
                "properties": {
                    "tags": {
                        "type": "array",
                        "description": "Compliance tags that match the requirement.",
                        "items": { "type": "string" }
                    }
                },
                "required": ["tags"]
            }),
        }
    }
}

fn envelope(item: Value) -> Value {
    json!({
        "type": "object",
        "properties": {
            "success": {
                "type": "boolean",
                "description": "Whether test case generation succeeded."
            },
            "issue": {
                "type": "string",
                "description": "Reason for failure if success is false; empty string otherwise."
            },
            "data": {
                "type": "array",
                "description": "Test cases if success is true; empty array otherwise.",
                "items": item
            }
        },
        "required": ["success", "issue", "data"]
    })
}

fn case(summary: &str, kind: &str, fields: &[(&str, &str)]) -> Value {
    let mut properties = serde_json::Map::new();
    properties.insert("type".into(), json!({ "type": "string", "enum": [kind] }));
    properties.insert(
        "preconditions".into(),
        json!({ "type": "string", "description": "Preconditions (if any)" }),
    );
    properties.insert(
        "testing_procedure".into(),
        json!({ "type": "array", "items": { "type": "string" }, "description": "Steps for testing" }),
    );
    let mut required = vec!["type", "preconditions", "testing_procedure"];
    for (name, description) in fields {
        properties.insert(
            (*name).into(),
            json!({ "type": "string", "description": description }),
        );
        required.push(*name);
    }

    json!({
        "type": "object",
        "properties": {
            "summary": { "type": "string", "description": summary },
            "description": {
                "type": "object",
                "properties": properties,
                "required": required
            }
        },
        "required": ["summary", "description"]
    })
}

fn functional_case() -> Value {
    case(
        "Short title (5-10 words) describing the test case",
        "functional",
        &[
            ("purpose", "Purpose of the test"),
            ("expected_result", "Clear observable outcome"),
            (
                "requirement_coverage",
                "Which part of the requirement this test validates",
            ),
        ],
    )
}

fn non_functional_case() -> Value {
    case(
        "Short title (5-10 words) describing the test case",
        "non_functional",
        &[
            (
                "test_category",
                "Performance, Security, Usability, Reliability, Scalability or Compatibility",
            ),
            ("expected_result", "Clear measurable outcome"),
            ("acceptance_criteria", "Specific acceptance criteria or thresholds"),
        ],
    )
}

fn compliance_case() -> Value {
    case(
        "COMPLIANCE - short title (5-10 words) describing the test case",
        "compliance",
        &[
            ("compliance_rule", "Exact rule involved, with its clause id"),
            (
                "expected_result",
                "System behavior must remain compliant with the rule",
            ),
            (
                "compliance_impact",
                "Why verifying this clause matters",
            ),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn functional_suite_offers_both_variants() {
        let schema = OutputShape::FunctionalSuite.json_schema();
        let variants = schema["properties"]["data"]["items"]["anyOf"]
            .as_array()
            .unwrap();
        let kinds: Vec<&str> = variants
            .iter()
            .map(|v| v["properties"]["description"]["properties"]["type"]["enum"][0].as_str().unwrap())
            .collect();
        assert_eq!(kinds, vec!["functional", "non_functional"]);
    }

    #[test]
    fn compliance_case_requires_rule_and_impact() {
        let schema = OutputShape::ComplianceSuite.json_schema();
        let required = schema["properties"]["data"]["items"]["properties"]["description"]["required"]
            .as_array()
            .unwrap();
        assert!(required.contains(&json!("compliance_rule")));
        assert!(required.contains(&json!("compliance_impact")));
    }

    #[test]
    fn tags_shape_is_plain_object() {
        let schema = OutputShape::ComplianceTags.json_schema();
        assert_eq!(schema["required"], json!(["tags"]));
        assert!(schema["properties"].get("success").is_none());
    }
}
