use crate::vulnerability::Vulnerability;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// A batch of vulnerability records that does not conform to the schema.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("record {index}: field '{field}' {reason}")]
pub struct SchemaError {
    /// Position of the offending record in the batch.
    pub index: usize,
    /// Slash separated path of the offending field, e.g. `path/2/location/file`.
    pub field: String,
    pub reason: String,
}

/// Accepts or rejects a batch of records before it is handed to consumers.
pub trait SchemaValidator {
    fn validate(&self, batch: &[Vulnerability]) -> Result<(), SchemaError>;
}

/// The vulnerability record schema shared with report consumers.
///
/// Records are checked in their serialized JSON form, so the validator sees
/// exactly what consumers will see. A value of this type is immutable once
/// built and is passed explicitly to every parse.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct VulnerabilitySchema {
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
    #[serde(default = "default_event_kinds")]
    pub event_kinds: Vec<String>,
}

fn default_categories() -> Vec<String> {
    vec!["Memory error".to_string(), "Logic error".to_string()]
}

fn default_event_kinds() -> Vec<String> {
    vec!["event".to_string(), "control".to_string()]
}

impl Default for VulnerabilitySchema {
    fn default() -> Self {
        Self {
            categories: default_categories(),
            event_kinds: default_event_kinds(),
        }
    }
}

const RECORD_FIELDS: &[&str] = &[
    "category",
    "type",
    "description",
    "location",
    "path",
    "issue_hash",
];
const LOCATION_FIELDS: &[&str] = &["file", "line", "col"];
const EVENT_FIELDS: &[&str] = &["kind", "message", "location"];

struct RecordChecker<'s> {
    schema: &'s VulnerabilitySchema,
    index: usize,
}

impl RecordChecker<'_> {
    fn fail(&self, field: &str, reason: impl Into<String>) -> SchemaError {
        SchemaError {
            index: self.index,
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    fn object<'v>(
        &self,
        value: &'v Value,
        field: &str,
        allowed: &[&str],
    ) -> Result<&'v Map<String, Value>, SchemaError> {
        let object = value
            .as_object()
            .ok_or_else(|| self.fail(field, "must be an object"))?;
        for key in allowed {
            if !object.contains_key(*key) {
                return Err(self.fail(&join(field, key), "is required"));
            }
        }
        if let Some(unknown) = object.keys().find(|key| !allowed.contains(&key.as_str())) {
            return Err(self.fail(&join(field, unknown), "is not allowed"));
        }
        Ok(object)
    }

    fn string<'v>(
        &self,
        object: &'v Map<String, Value>,
        parent: &str,
        key: &str,
    ) -> Result<&'v str, SchemaError> {
        object[key]
            .as_str()
            .ok_or_else(|| self.fail(&join(parent, key), "must be a string"))
    }

    fn one_of(&self, value: &str, allowed: &[String], field: &str) -> Result<(), SchemaError> {
        if allowed.iter().any(|a| a == value) {
            Ok(())
        } else {
            Err(self.fail(field, format!("must be one of {allowed:?}, got {value:?}")))
        }
    }

    fn location(&self, value: &Value, field: &str) -> Result<(), SchemaError> {
        let location = self.object(value, field, LOCATION_FIELDS)?;
        if self.string(location, field, "file")?.is_empty() {
            return Err(self.fail(&join(field, "file"), "must not be empty"));
        }
        for key in ["line", "col"] {
            if !location[key].is_u64() {
                return Err(self.fail(&join(field, key), "must be a non-negative integer"));
            }
        }
        Ok(())
    }

    fn record(&self, value: &Value) -> Result<(), SchemaError> {
        let record = self.object(value, "", RECORD_FIELDS)?;

        let category = self.string(record, "", "category")?;
        self.one_of(category, &self.schema.categories, "category")?;
        if self.string(record, "", "type")?.is_empty() {
            return Err(self.fail("type", "must not be empty"));
        }
        self.string(record, "", "description")?;
        self.string(record, "", "issue_hash")?;
        self.location(&record["location"], "location")?;

        let path = record["path"]
            .as_array()
            .ok_or_else(|| self.fail("path", "must be an array"))?;
        for (i, event) in path.iter().enumerate() {
            let field = format!("path/{i}");
            let event = self.object(event, &field, EVENT_FIELDS)?;
            let kind = self.string(event, &field, "kind")?;
            self.one_of(kind, &self.schema.event_kinds, &join(&field, "kind"))?;
            self.string(event, &field, "message")?;
            self.location(&event["location"], &join(&field, "location"))?;
        }
        Ok(())
    }
}

fn join(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}/{key}")
    }
}

impl SchemaValidator for VulnerabilitySchema {
    fn validate(&self, batch: &[Vulnerability]) -> Result<(), SchemaError> {
        for (index, vulnerability) in batch.iter().enumerate() {
            let checker = RecordChecker { schema: self, index };
            let value = serde_json::to_value(vulnerability)
                .map_err(|e| checker.fail("", format!("cannot be serialized: {e}")))?;
            checker.record(&value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{Location, PathEvent};
    use crate::vulnerability::Category;

    fn record(location: Location) -> Vulnerability {
        Vulnerability::new(
            Category::MemoryError,
            "heap-buffer-overflow",
            "heap-buffer-overflow: main.c in FuzzMe".to_string(),
            location.clone(),
            vec![PathEvent::event("FuzzMe", location)],
        )
    }

    #[test]
    fn accepts_well_formed_records() {
        let schema = VulnerabilitySchema::default();
        assert!(schema.validate(&[]).is_ok());
        assert!(schema.validate(&[record(Location::new("main.c", 42, 7))]).is_ok());
    }

    #[test]
    fn rejects_empty_location_file() {
        let schema = VulnerabilitySchema::default();
        let batch = [record(Location::new("main.c", 1, 1)), record(Location::default())];
        let err = schema.validate(&batch).unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.field, "location/file");
    }

    #[test]
    fn rejects_empty_file_inside_path() {
        let schema = VulnerabilitySchema::default();
        let mut vulnerability = record(Location::new("main.c", 1, 1));
        vulnerability
            .path
            .push(PathEvent::event("caller", Location::default()));
        let err = schema.validate(&[vulnerability]).unwrap_err();
        assert_eq!(err.field, "path/1/location/file");
    }

    #[test]
    fn rejects_categories_outside_schema() {
        let schema = VulnerabilitySchema {
            categories: vec!["Memory error".to_string()],
            ..VulnerabilitySchema::default()
        };
        let mut vulnerability = record(Location::new("main.c", 1, 1));
        vulnerability.category = Category::LogicError;
        let err = schema.validate(&[vulnerability]).unwrap_err();
        assert_eq!(err.field, "category");
        assert!(err.to_string().contains("Logic error"));
    }

    #[test]
    fn schema_loads_from_toml_with_defaults() {
        let schema: VulnerabilitySchema = toml::from_str(r#"event-kinds = ["event"]"#).unwrap();
        assert_eq!(schema.categories, default_categories());
        assert_eq!(schema.event_kinds, vec!["event".to_string()]);
    }
}
