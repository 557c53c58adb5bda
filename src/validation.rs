use serde::{Deserialize, Serialize};
use serde_json::Value;

const SCHEMA_DESCRIPTOR_SCHEMA: &str = r##"{
  "type": "object",
  "required": ["version", "models"],
  "properties": {
    "version": { "const": 2 },
    "models": {
      "type": "array",
      "items": {
        "type": "object",
        "required": ["name", "columns"],
        "properties": {
          "name": { "type": "string", "minLength": 1 },
          "columns": { "type": "array", "items": { "$ref": "#/definitions/column" } }
        }
      }
    }
  },
  "definitions": {
    "column": {
      "type": "object",
      "required": ["name", "tests"],
      "properties": {
        "name": { "type": "string", "minLength": 1 },
        "tests": { "type": "array", "minItems": 1 }
      }
    }
  }
}"##;

const SOURCES_DESCRIPTOR_SCHEMA: &str = r##"{
  "type": "object",
  "required": ["version", "sources"],
  "properties": {
    "version": { "const": 2 },
    "sources": {
      "type": "array",
      "items": {
        "type": "object",
        "required": ["name", "tables"],
        "properties": {
          "name": { "type": "string", "minLength": 1 },
          "schema": { "type": "string" },
          "tables": {
            "type": "array",
            "items": {
              "type": "object",
              "required": ["name", "columns"],
              "properties": { "name": { "type": "string", "minLength": 1 } }
            }
          }
        }
      }
    }
  }
}"##;

const PROJECT_DESCRIPTOR_SCHEMA: &str = r##"{
  "type": "object",
  "required": ["name", "version", "config-version", "profile", "model-paths", "macro-paths", "vars"],
  "properties": {
    "name": { "type": "string", "pattern": "^[a-z_][a-z0-9_]*$" },
    "version": { "type": "string" },
    "config-version": { "const": 2 },
    "profile": { "type": "string", "minLength": 1 },
    "model-paths": { "type": "array", "items": { "type": "string" } },
    "macro-paths": { "type": "array", "items": { "type": "string" } },
    "vars": {
      "type": "object",
      "required": ["start_date", "end_date", "region"],
      "properties": {
        "start_date": { "type": "string" },
        "end_date": { "type": "string" },
        "region": { "type": ["string", "null"] }
      }
    }
  }
}"##;

/// Generated descriptor files that are checked before writing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DescriptorKind {
    Schema,
    Sources,
    Project,
}

impl DescriptorKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            DescriptorKind::Schema => "schema.yml",
            DescriptorKind::Sources => "sources.yml",
            DescriptorKind::Project => "dbt_project.yml",
        }
    }

    fn json_schema(&self) -> &'static str {
        match self {
            DescriptorKind::Schema => SCHEMA_DESCRIPTOR_SCHEMA,
            DescriptorKind::Sources => SOURCES_DESCRIPTOR_SCHEMA,
            DescriptorKind::Project => PROJECT_DESCRIPTOR_SCHEMA,
        }
    }
}

/// Validation results for the descriptors of one output directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.is_valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Check one descriptor against its JSON schema
    pub fn validate_descriptor(&mut self, kind: DescriptorKind, instance: &Value) {
        let schema: Value = match serde_json::from_str(kind.json_schema()) {
            Ok(schema) => schema,
            Err(e) => {
                self.add_warning(ValidationWarning::new(kind, format!("Schema unavailable: {}", e)));
                return;
            }
        };

        let compiled = match jsonschema::JSONSchema::compile(&schema) {
            Ok(compiled) => compiled,
            Err(e) => {
                self.add_warning(ValidationWarning::new(kind, format!("Failed to compile schema: {}", e)));
                return;
            }
        };

        if let Err(errors) = compiled.validate(instance) {
            let found: Vec<ValidationError> = errors
                .map(|error| ValidationError::new(kind, error.instance_path.to_string(), error.to_string()))
                .collect();
            for error in found {
                self.add_error(error);
            }
        };
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

/// A schema violation in a generated descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    pub document: DescriptorKind,
    pub instance_path: String,
    pub message: String,
}

/// A check that could not run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub document: DescriptorKind,
    pub message: String,
}

impl ValidationError {
    pub fn new(document: DescriptorKind, instance_path: String, message: String) -> Self {
        Self {
            document,
            instance_path,
            message,
        }
    }
}

impl ValidationWarning {
    pub fn new(document: DescriptorKind, message: String) -> Self {
        Self { document, message }
    }
}
