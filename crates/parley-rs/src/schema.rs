//! Structured output: declare a JSON Schema, ask the model to follow it, and
//! validate what comes back.
//!
//! Validation failures are reported per field. Each [`SchemaViolation`]
//! names the JSON pointer of the offending value, the schema keyword it
//! broke, and the value actually received, so a failure can be pinned in a
//! test without re-running the model.

use crate::{Error, JsonSchemaFormat, ResponseFormat, ResponseFormatType, json_schema_for};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// One way a value fails a schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaViolation {
    /// JSON pointer into the received value (`""` for the root).
    pub path: String,
    /// Schema keyword that failed, e.g. `type`, `required`, `enum`.
    pub keyword: String,
    pub message: String,
    pub received: Value,
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        write!(f, "{path} [{}]: {}", self.keyword, self.message)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("output does not match schema '{schema}' ({} violation(s))", .violations.len())]
pub struct SchemaError {
    pub schema: String,
    pub violations: Vec<SchemaViolation>,
}

impl SchemaError {
    /// First violation at `path`, if any.
    pub fn at(&self, path: &str) -> Option<&SchemaViolation> {
        self.violations.iter().find(|v| v.path == path)
    }
}

/// Validate `value` against `schema`. An invalid schema is reported as a
/// single violation at the root with keyword `schema`.
pub fn validate_value(schema: &Value, value: &Value) -> Result<(), Vec<SchemaViolation>> {
    let validator = match jsonschema::validator_for(schema) {
        Ok(v) => v,
        Err(e) => {
            return Err(vec![SchemaViolation {
                path: String::new(),
                keyword: "schema".into(),
                message: format!("invalid schema: {e}"),
                received: schema.clone(),
            }]);
        }
    };

    let violations: Vec<SchemaViolation> = validator
        .iter_errors(value)
        .map(|e| {
            let path = e.instance_path().to_string();
            let schema_path = e.schema_path().to_string();
            SchemaViolation {
                keyword: schema_path
                    .rsplit('/')
                    .next()
                    .unwrap_or_default()
                    .to_string(),
                message: e.to_string(),
                received: value.pointer(&path).cloned().unwrap_or(Value::Null),
                path,
            }
        })
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

// ── OutputSchema ───────────────────────────────────────────────────

/// A named JSON Schema the model's final answer must satisfy.
#[derive(Debug, Clone)]
pub struct OutputSchema {
    name: String,
    schema: Value,
}

impl OutputSchema {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }

    /// Schema derived from a `schemars` type, named after the type.
    pub fn of<T: JsonSchema>() -> Self {
        Self::new(T::schema_name(), json_schema_for::<T>())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// `response_format` asking the provider for JSON following this schema.
    ///
    /// Non-strict: `schemars` output is not always accepted by strict mode,
    /// and the answer is validated locally anyway.
    pub fn response_format(&self) -> ResponseFormat {
        ResponseFormat {
            fmt_type: ResponseFormatType::JsonSchema,
            json_schema: Some(JsonSchemaFormat {
                name: self.name.clone(),
                schema: self.schema.clone(),
                strict: false,
            }),
        }
    }

    pub fn validate(&self, value: &Value) -> Result<(), SchemaError> {
        validate_value(&self.schema, value).map_err(|violations| SchemaError {
            schema: self.name.clone(),
            violations,
        })
    }

    /// Parse model text as JSON and validate it. Text that is not JSON at
    /// all is a single root violation with keyword `json`.
    pub fn parse_value(&self, text: &str) -> Result<Value, SchemaError> {
        let value: Value = serde_json::from_str(strip_code_fence(text)).map_err(|e| SchemaError {
            schema: self.name.clone(),
            violations: vec![SchemaViolation {
                path: String::new(),
                keyword: "json".into(),
                message: format!("not valid JSON: {e}"),
                received: Value::String(text.to_string()),
            }],
        })?;
        self.validate(&value)?;
        Ok(value)
    }

    /// [`parse_value`](Self::parse_value), then deserialize into `T`.
    pub fn parse<T: DeserializeOwned>(&self, text: &str) -> Result<T, Error> {
        let value = self.parse_value(text)?;
        Ok(self.deserialize(&value)?)
    }

    /// Deserialize an already validated value into `T`.
    ///
    /// The generated schema cannot express every constraint of the Rust
    /// type (integer widths, for one). A value that passes the schema but
    /// not the type is a single violation with keyword `deserialize` at the
    /// path where deserialization stopped.
    pub fn deserialize<T: DeserializeOwned>(&self, value: &Value) -> Result<T, SchemaError> {
        serde_path_to_error::deserialize(value).map_err(|e| {
            let path = json_pointer(e.path());
            SchemaError {
                schema: self.name.clone(),
                violations: vec![SchemaViolation {
                    keyword: "deserialize".into(),
                    message: e.inner().to_string(),
                    received: value.pointer(&path).cloned().unwrap_or(Value::Null),
                    path,
                }],
            }
        })
    }
}

fn json_pointer(path: &serde_path_to_error::Path) -> String {
    use serde_path_to_error::Segment;
    let mut pointer = String::new();
    for segment in path.iter() {
        match segment {
            Segment::Seq { index } => pointer.push_str(&format!("/{index}")),
            Segment::Map { key } => {
                pointer.push('/');
                pointer.push_str(&key.replace('~', "~0").replace('/', "~1"));
            }
            Segment::Enum { variant } => {
                pointer.push('/');
                pointer.push_str(variant);
            }
            Segment::Unknown => {}
        }
    }
    pointer
}

/// Some models wrap JSON answers in a Markdown code fence even in JSON mode.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

// ── Runtime label sets ─────────────────────────────────────────────

/// A classification answer constrained to a [`LabelSet`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Classification {
    pub category: String,
    pub reasoning: String,
}

/// Labels for a classification task, known only at runtime.
///
/// The schema it produces constrains `category` to exactly these labels.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelSet {
    domain: String,
    labels: Vec<String>,
}

impl LabelSet {
    /// Duplicate labels are dropped, keeping first occurrence order.
    pub fn new<I, S>(domain: impl Into<String>, labels: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let domain = domain.into();
        let mut unique: Vec<String> = Vec::new();
        for label in labels {
            let label = label.into();
            if !unique.contains(&label) {
                unique.push(label);
            }
        }
        if unique.is_empty() {
            return Err(Error::config(
                format!("labels.{domain}"),
                "a label set needs at least one label",
            ));
        }
        Ok(Self {
            domain,
            labels: unique,
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn output_schema(&self) -> OutputSchema {
        OutputSchema::new(
            format!("{}_classification", self.domain),
            json!({
                "type": "object",
                "properties": {
                    "category": {
                        "type": "string",
                        "enum": self.labels,
                        "description": format!("The {} category", self.domain),
                    },
                    "reasoning": {
                        "type": "string",
                        "minLength": 10,
                        "description": "Short explanation of the choice",
                    },
                },
                "required": ["category", "reasoning"],
                "additionalProperties": false,
            }),
        )
    }

    pub fn system_prompt(&self) -> String {
        format!(
            "Classify text into one of these {} categories: {}. \
             Respond with the category and a brief reasoning.",
            self.domain,
            self.labels.join(", ")
        )
    }

    /// Parse and validate a classification answer.
    pub fn check(&self, text: &str) -> Result<Classification, Error> {
        self.output_schema().parse(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;

    #[derive(Serialize, Deserialize, JsonSchema, Debug, PartialEq)]
    struct Element {
        element_type: String,
        element_content: String,
    }

    #[derive(Serialize, Deserialize, JsonSchema, Debug, PartialEq)]
    struct Analysis {
        file_type: String,
        file_elements: Vec<Element>,
    }

    #[test]
    fn string_where_list_expected_names_field_and_value() {
        let schema = OutputSchema::of::<Analysis>();
        let bad = json!({"file_type": "invoice", "file_elements": "No elements found"});
        let err = schema.validate(&bad).unwrap_err();
        let v = err.at("/file_elements").expect("violation at file_elements");
        assert_eq!(v.keyword, "type");
        assert_eq!(v.received, json!("No elements found"));
    }

    #[test]
    fn list_of_strings_where_objects_expected() {
        let schema = OutputSchema::of::<Analysis>();
        let bad = json!({"file_type": "invoice", "file_elements": ["No elements found"]});
        let err = schema.validate(&bad).unwrap_err();
        let v = err
            .violations
            .iter()
            .find(|v| v.path.starts_with("/file_elements"))
            .unwrap();
        assert_eq!(v.path, "/file_elements/0");
        assert_eq!(v.received, json!("No elements found"));
    }

    #[test]
    fn missing_required_field() {
        let schema = OutputSchema::of::<Analysis>();
        let err = schema.validate(&json!({"file_type": "x"})).unwrap_err();
        assert!(err.violations.iter().any(|v| v.keyword == "required"));
        assert!(err.to_string().contains("Analysis"));
    }

    #[test]
    fn valid_output_parses_into_type() {
        let schema = OutputSchema::of::<Analysis>();
        let text = r#"{"file_type": "letter", "file_elements": [
            {"element_type": "header", "element_content": "Dear Sir"}]}"#;
        let parsed: Analysis = schema.parse(text).unwrap();
        assert_eq!(parsed.file_elements[0].element_type, "header");
    }

    #[test]
    fn value_outside_the_rust_type_is_a_field_violation() {
        #[derive(Deserialize, JsonSchema, Debug)]
        struct Rating {
            stars: u8,
        }

        let schema = OutputSchema::of::<Rating>();
        let err = schema.parse::<Rating>(r#"{"stars": 300}"#).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);

        let err = match err {
            Error::Schema(err) => err,
            other => panic!("expected a schema error, got {other:?}"),
        };
        let v = err.at("/stars").expect("violation at /stars");
        assert_eq!(v.keyword, "deserialize");
        assert_eq!(v.received, json!(300));

        let nested = json!({"file_type": "x", "file_elements": [{"element_type": 1}]});
        let err = OutputSchema::of::<Analysis>()
            .deserialize::<Analysis>(&nested)
            .unwrap_err();
        assert_eq!(err.violations[0].path, "/file_elements/0/element_type");
        assert_eq!(err.violations[0].received, json!(1));
    }

    #[test]
    fn non_json_text_is_root_violation() {
        let schema = OutputSchema::of::<Analysis>();
        let err = schema.parse_value("I could not read the page").unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert_eq!(err.violations[0].keyword, "json");
        assert_eq!(err.violations[0].path, "");
        assert_eq!(
            err.violations[0].received,
            json!("I could not read the page")
        );
    }

    #[test]
    fn fenced_json_is_accepted() {
        let schema = OutputSchema::new("any", json!({"type": "object"}));
        let value = schema.parse_value("```json\n{\"a\": 1}\n```").unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn response_format_carries_name_and_schema() {
        let fmt = OutputSchema::of::<Element>().response_format();
        let body = serde_json::to_value(&fmt).unwrap();
        assert_eq!(body["type"], "json_schema");
        assert_eq!(body["json_schema"]["name"], "Element");
        assert_eq!(body["json_schema"]["schema"]["type"], "object");
    }

    // ── LabelSet ───────────────────────────────────────────────────

    #[test]
    fn label_set_rejects_empty() {
        let err = LabelSet::new("emotion", Vec::<String>::new()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Config);
    }

    #[test]
    fn label_set_dedups_in_order() {
        let set = LabelSet::new("priority", ["high", "low", "high", "medium"]).unwrap();
        assert_eq!(set.labels(), ["high", "low", "medium"]);
        assert!(set.contains("low"));
        assert!(!set.contains("urgent"));
        assert!(set.system_prompt().contains("high, low, medium"));
    }

    #[test]
    fn label_outside_set_is_rejected() {
        let set = LabelSet::new("emotion", ["joy", "anger"]).unwrap();
        let ok = set
            .check(r#"{"category": "joy", "reasoning": "The text is upbeat."}"#)
            .unwrap();
        assert_eq!(ok.category, "joy");

        let err = set
            .check(r#"{"category": "fear", "reasoning": "The text is scary."}"#)
            .unwrap_err();
        let Error::Schema(schema_err) = err else {
            panic!("expected schema error, got {err:?}");
        };
        let v = schema_err.at("/category").unwrap();
        assert_eq!(v.keyword, "enum");
        assert_eq!(v.received, json!("fear"));
    }

    #[test]
    fn short_reasoning_is_rejected() {
        let set = LabelSet::new("emotion", ["joy"]).unwrap();
        let err = set
            .check(r#"{"category": "joy", "reasoning": "ok"}"#)
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
    }
}
