//! Input-schema generation from declared parameter lists
//!
//! Components declare their parameters at registration time with
//! [`ParamSpec`]; the framework derives a JSON-Schema-like input descriptor
//! from the list. A parameter typed [`ParamType::Context`] is filled by the
//! server with a per-call context and never appears in the emitted schema.
//!
//! # Example
//!
//! ```rust
//! use beacon_mcp::schema::{input_schema, ParamSpec, ParamType};
//! use serde_json::json;
//!
//! let params = vec![
//!     ParamSpec::required("city", ParamType::String),
//!     ParamSpec::optional("units", ParamType::String, json!("metric")),
//! ];
//! let schema = input_schema(&params);
//! assert_eq!(schema["type"], "object");
//! assert_eq!(schema["required"], json!(["city"]));
//! ```

use serde_json::{json, Map, Value};

/// Declared type of a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    Integer,
    Number,
    Boolean,
    String,
    Array,
    Object,
    /// Accepts anything; emitted as an empty schema object.
    Any,
    /// A closed set of values; emitted as `{"enum": [...]}`.
    Enum(Vec<Value>),
    /// Emitted as `{"type": "string", "format": "date-time"}`.
    DateTime,
    /// `T | null`; emitted as `{"type": [T, "null"]}` and excluded from
    /// `required`.
    Nullable(Box<ParamType>),
    /// A union of multiple non-null types; emitted as `{"type": [t1, t2, …]}`.
    Union(Vec<ParamType>),
    /// Marker for the parameter the server fills with a per-call
    /// [`CallContext`](crate::tool::CallContext). Omitted from the schema.
    Context,
}

impl ParamType {
    fn base_name(&self) -> Option<&'static str> {
        match self {
            ParamType::Integer => Some("integer"),
            ParamType::Number => Some("number"),
            ParamType::Boolean => Some("boolean"),
            ParamType::String | ParamType::DateTime => Some("string"),
            ParamType::Array => Some("array"),
            ParamType::Object => Some("object"),
            _ => None,
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, ParamType::Nullable(_))
    }

    /// The JSON-Schema descriptor for this type.
    pub fn descriptor(&self) -> Value {
        match self {
            ParamType::Any => json!({}),
            ParamType::Enum(values) => json!({"enum": values}),
            ParamType::DateTime => json!({"type": "string", "format": "date-time"}),
            ParamType::Nullable(inner) => match inner.base_name() {
                Some(name) => json!({"type": [name, "null"]}),
                None => json!({"type": ["null"]}),
            },
            ParamType::Union(types) => {
                let names: Vec<&str> = types.iter().filter_map(|t| t.base_name()).collect();
                json!({"type": names})
            }
            other => match other.base_name() {
                Some(name) => json!({"type": name}),
                None => json!({}),
            },
        }
    }
}

/// One declared parameter of a tool, resource template, or prompt.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub ty: ParamType,
    pub required: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
}

impl ParamSpec {
    /// A required parameter with no default.
    pub fn required(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: true,
            default: None,
            description: None,
        }
    }

    /// An optional parameter with a default used when the caller omits it.
    pub fn optional(name: impl Into<String>, ty: ParamType, default: Value) -> Self {
        Self {
            name: name.into(),
            ty,
            required: false,
            default: Some(default),
            description: None,
        }
    }

    /// A `T | null` parameter, filled with `null` when omitted.
    pub fn nullable(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty: ParamType::Nullable(Box::new(ty)),
            required: false,
            default: None,
            description: None,
        }
    }

    /// The context parameter the server injects per call.
    pub fn context(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ParamType::Context,
            required: false,
            default: None,
            description: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_context(&self) -> bool {
        matches!(self.ty, ParamType::Context)
    }

    /// Whether the caller may omit this parameter.
    pub fn may_be_absent(&self) -> bool {
        self.default.is_some() || self.ty.is_nullable()
    }
}

/// Derive the `inputSchema` object from a declared parameter list.
///
/// Context parameters are omitted. A parameter that may be absent (default
/// or nullable) is excluded from `required`; the `required` array itself is
/// omitted entirely when empty.
pub fn input_schema(params: &[ParamSpec]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in params {
        if param.is_context() {
            continue;
        }
        let mut descriptor = param.ty.descriptor();
        if let (Some(text), Some(obj)) = (&param.description, descriptor.as_object_mut()) {
            obj.insert("description".to_string(), json!(text));
        }
        properties.insert(param.name.clone(), descriptor);
        if param.required && !param.may_be_absent() {
            required.push(param.name.clone());
        }
    }

    let mut schema = json!({
        "type": "object",
        "properties": properties,
    });
    if !required.is_empty() {
        schema["required"] = json!(required);
    }
    schema
}

/// Coerce a string-sourced value (a URI-template variable or query
/// parameter) to the declared parameter type. Non-string values and textual
/// targets pass through unchanged; an unparseable value is reported by name.
pub fn coerce(name: &str, value: Value, ty: &ParamType) -> Result<Value, String> {
    let target = match ty {
        ParamType::Nullable(inner) => inner.as_ref(),
        other => other,
    };
    let Value::String(text) = &value else {
        return Ok(value);
    };
    match target {
        ParamType::Integer => text
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| format!("Invalid integer for '{}': {}", name, text)),
        ParamType::Number => text
            .parse::<f64>()
            .map(Value::from)
            .map_err(|_| format!("Invalid number for '{}': {}", name, text)),
        ParamType::Boolean => match text.as_str() {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => Err(format!("Invalid boolean for '{}': {}", name, text)),
        },
        _ => Ok(value),
    }
}
