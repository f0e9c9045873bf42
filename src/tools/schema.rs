use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

use crate::error::{McpError, McpResult};
use crate::mcp::types::{Property, ToolInputSchema};
use crate::utils::parse_params;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub param_type: ParamType,
    pub description: String,
    pub required: bool,
    pub default: Option<Value>,
    pub enum_values: Option<Vec<Value>>,
}

/// Ordered parameter list for one tool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputSchema {
    params: Vec<ParamSpec>,
}

impl InputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn required(self, name: &str, param_type: ParamType, description: &str) -> Self {
        self.param(ParamSpec {
            name: name.to_string(),
            param_type,
            description: description.to_string(),
            required: true,
            default: None,
            enum_values: None,
        })
    }

    pub fn optional(
        self,
        name: &str,
        param_type: ParamType,
        description: &str,
        default: Option<Value>,
    ) -> Self {
        self.param(ParamSpec {
            name: name.to_string(),
            param_type,
            description: description.to_string(),
            required: false,
            default,
            enum_values: None,
        })
    }

    pub fn optional_enum(self, name: &str, description: &str, default: &str, options: &[&str]) -> Self {
        self.param(ParamSpec {
            name: name.to_string(),
            param_type: ParamType::String,
            description: description.to_string(),
            required: false,
            default: Some(Value::String(default.to_string())),
            enum_values: Some(options.iter().map(|s| Value::String(s.to_string())).collect()),
        })
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Checks presence and type of declared parameters, applies defaults,
    /// and drops undeclared ones.
    pub fn validate(&self, raw: Value) -> McpResult<ToolArgs> {
        let mut supplied = match raw {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(McpError::InvalidArguments(format!(
                    "arguments must be an object, got {}",
                    json_type_name(&other)
                )));
            }
        };

        let mut values = Map::new();
        for spec in &self.params {
            match supplied.remove(&spec.name).filter(|v| !v.is_null()) {
                Some(value) => {
                    if !spec.param_type.accepts(&value) {
                        return Err(McpError::InvalidArguments(format!(
                            "parameter '{}' must be a {}, got {}",
                            spec.name,
                            spec.param_type.as_str(),
                            json_type_name(&value)
                        )));
                    }
                    if let Some(options) = &spec.enum_values
                        && !options.contains(&value)
                    {
                        return Err(McpError::InvalidArguments(format!(
                            "parameter '{}' must be one of {}",
                            spec.name,
                            Value::Array(options.clone())
                        )));
                    }
                    values.insert(spec.name.clone(), value);
                }
                None if spec.required => {
                    return Err(McpError::InvalidArguments(format!(
                        "missing required parameter: {}",
                        spec.name
                    )));
                }
                None => {
                    if let Some(default) = &spec.default {
                        values.insert(spec.name.clone(), default.clone());
                    }
                }
            }
        }

        if !supplied.is_empty() {
            let ignored: Vec<&String> = supplied.keys().collect();
            debug!(?ignored, "ignoring undeclared arguments");
        }

        Ok(ToolArgs { values })
    }

    /// JSON Schema form advertised through `tools/list`.
    pub fn to_json_schema(&self) -> ToolInputSchema {
        let mut properties = HashMap::new();
        let mut required = Vec::new();

        for spec in &self.params {
            properties.insert(
                spec.name.clone(),
                Property {
                    property_type: spec.param_type.as_str().to_string(),
                    description: Some(spec.description.clone()),
                    default: spec.default.clone(),
                    enum_values: spec.enum_values.clone(),
                },
            );
            if spec.required {
                required.push(spec.name.clone());
            }
        }

        ToolInputSchema {
            schema_type: "object".to_string(),
            properties,
            required,
        }
    }
}

/// Arguments that have passed schema validation.
///
/// Only [`InputSchema::validate`] constructs these, so handlers can rely on
/// required parameters being present with the declared type.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolArgs {
    values: Map<String, Value>,
}

impl ToolArgs {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(Value::as_f64)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(Value::as_bool)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Decodes into a handler's typed parameter struct.
    pub fn parse<T: DeserializeOwned>(self) -> McpResult<T> {
        parse_params(Value::Object(self.values))
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
