use crate::api::{PRIORITY_VALUES, STATUS_VALUES};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

pub const ADD_CUSTOMER_RECORD: &str = "add_customer_record";
pub const LIST_EVENT_TYPES: &str = "list_event_types";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate tool name: {name}")]
    DuplicateTool { name: String },
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },
}

impl RegistryError {
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::DuplicateTool { .. } => "registry.duplicate_tool",
            RegistryError::UnknownTool { .. } => "registry.unknown_tool",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Boolean,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
    pub required: bool,
    pub allowed_values: Option<&'static [&'static str]>,
    pub description: &'static str,
}

impl FieldSpec {
    pub const fn required(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            ty: FieldType::String,
            required: true,
            allowed_values: None,
            description,
        }
    }

    pub const fn optional(name: &'static str, ty: FieldType, description: &'static str) -> Self {
        Self {
            name,
            ty,
            required: false,
            allowed_values: None,
            description,
        }
    }

    pub const fn one_of(mut self, values: &'static [&'static str]) -> Self {
        self.allowed_values = Some(values);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterRef {
    Spreadsheet,
    Scheduling,
}

impl AdapterRef {
    pub fn as_str(self) -> &'static str {
        match self {
            AdapterRef::Spreadsheet => "spreadsheet",
            AdapterRef::Scheduling => "scheduling",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    AppendRecord,
    ListEventTypes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Vec<FieldSpec>,
    pub adapter: AdapterRef,
    pub operation: Operation,
}

impl ToolDefinition {
    /// JSON Schema object advertised over `tools/list`.
    pub fn json_schema(&self) -> Map<String, Value> {
        let mut properties = Map::new();
        let mut required = vec![];
        for field in &self.input_schema {
            let mut prop = Map::new();
            prop.insert("type".to_string(), json!(field.ty.as_str()));
            prop.insert("description".to_string(), json!(field.description));
            if let Some(values) = field.allowed_values {
                prop.insert("enum".to_string(), json!(values));
            }
            properties.insert(field.name.to_string(), Value::Object(prop));
            if field.required {
                required.push(json!(field.name));
            }
        }
        let mut schema = Map::new();
        schema.insert("type".to_string(), json!("object"));
        schema.insert("properties".to_string(), Value::Object(properties));
        schema.insert("required".to_string(), Value::Array(required));
        schema
    }
}

/// Populated once at startup; dispatch only reads it.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for def in builtin_definitions() {
            registry.register(def)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, definition: ToolDefinition) -> Result<(), RegistryError> {
        if self.tools.contains_key(&definition.name) {
            return Err(RegistryError::DuplicateTool {
                name: definition.name,
            });
        }
        self.tools.insert(definition.name.clone(), definition);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&ToolDefinition, RegistryError> {
        self.tools.get(name).ok_or_else(|| RegistryError::UnknownTool {
            name: name.to_string(),
        })
    }

    pub fn definitions(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.values()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn builtin_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: ADD_CUSTOMER_RECORD.to_string(),
            description: "Append a customer issue record (name, email, issue, status, priority) to the CRM spreadsheet. Each call appends a new row."
                .to_string(),
            input_schema: vec![
                FieldSpec::required("name", "Customer full name"),
                FieldSpec::required("email", "Customer email address"),
                FieldSpec::required("issue", "Short description of the customer's issue"),
                FieldSpec::required("status", "Issue status").one_of(STATUS_VALUES),
                FieldSpec::required("priority", "Issue priority").one_of(PRIORITY_VALUES),
                FieldSpec::optional("phone", FieldType::String, "Customer phone number"),
                FieldSpec::optional("notes", FieldType::String, "Free-form notes"),
            ],
            adapter: AdapterRef::Spreadsheet,
            operation: Operation::AppendRecord,
        },
        ToolDefinition {
            name: LIST_EVENT_TYPES.to_string(),
            description: "List scheduling event types for an organization. Defaults to the configured organization URI."
                .to_string(),
            input_schema: vec![
                FieldSpec::optional(
                    "organization",
                    FieldType::String,
                    "Organization URI, e.g. https://api.calendly.com/organizations/ABC",
                ),
                FieldSpec::optional(
                    "active",
                    FieldType::Boolean,
                    "Only return active (true) or inactive (false) event types",
                ),
            ],
            adapter: AdapterRef::Scheduling,
            operation: Operation::ListEventTypes,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_exposes_both_tools() {
        let registry = ToolRegistry::builtin().expect("builtin registry");
        assert_eq!(registry.len(), 2);
        let add = registry.lookup(ADD_CUSTOMER_RECORD).expect("add tool");
        assert_eq!(add.adapter, AdapterRef::Spreadsheet);
        assert_eq!(add.operation, Operation::AppendRecord);
        let list = registry.lookup(LIST_EVENT_TYPES).expect("list tool");
        assert_eq!(list.adapter, AdapterRef::Scheduling);
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = ToolRegistry::builtin().expect("builtin registry");
        let dup = registry.lookup(LIST_EVENT_TYPES).expect("list tool").clone();
        let err = registry.register(dup).expect_err("duplicate");
        assert_eq!(
            err,
            RegistryError::DuplicateTool {
                name: LIST_EVENT_TYPES.to_string()
            }
        );
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn unknown_lookup_fails() {
        let registry = ToolRegistry::builtin().expect("builtin registry");
        let err = registry.lookup("delete_everything").expect_err("unknown");
        assert_eq!(err.code(), "registry.unknown_tool");
    }

    #[test]
    fn json_schema_lists_enums_and_required_fields() {
        let registry = ToolRegistry::builtin().expect("builtin registry");
        let schema = registry
            .lookup(ADD_CUSTOMER_RECORD)
            .expect("add tool")
            .json_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(
            schema["properties"]["status"]["enum"],
            json!(["open", "in-progress", "resolved", "closed"])
        );
        let required: Vec<&str> = schema["required"]
            .as_array()
            .expect("required array")
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(required, vec!["name", "email", "issue", "status", "priority"]);
        assert!(schema["properties"].get("phone").is_some());
    }
}
