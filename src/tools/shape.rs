//! Declared argument shapes and the validated argument values tools receive.
//!
//! A tool declares its fields once; the same declaration produces the JSON
//! Schema sent to the model, guides decoding of text-notation values, and
//! validates the parsed payload before the tool runs.

use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl FieldKind {
    pub fn json_type(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Array => "array",
            FieldKind::Object => "object",
        }
    }

    fn accept(self, value: Value) -> Result<ArgValue, Value> {
        match (self, value) {
            (FieldKind::String, Value::String(s)) => Ok(ArgValue::Str(s)),
            (FieldKind::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => {
                match n.as_i64() {
                    Some(i) => Ok(ArgValue::Int(i)),
                    None => Err(Value::Number(n)),
                }
            }
            (FieldKind::Number, Value::Number(n)) => match n.as_f64() {
                Some(f) => Ok(ArgValue::Num(f)),
                None => Err(Value::Number(n)),
            },
            (FieldKind::Boolean, Value::Bool(b)) => Ok(ArgValue::Bool(b)),
            (FieldKind::Array, Value::Array(a)) => Ok(ArgValue::List(a)),
            (FieldKind::Object, Value::Object(m)) => Ok(ArgValue::Map(m)),
            (_, other) => Err(other),
        }
    }

    /// Turns the raw text of a notation value into JSON for this kind.
    /// Text that does not decode is kept as a string and left to validation.
    pub fn decode_text(self, text: &str) -> Value {
        if self == FieldKind::String {
            return Value::String(text.to_string());
        }
        let trimmed = text.trim();
        match trimmed {
            "True" => return Value::Bool(true),
            "False" => return Value::Bool(false),
            "None" => return Value::Null,
            _ => {}
        }
        serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(text.to_string()))
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldIssue {
    pub field: String,
    pub problem: String,
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.problem)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgShape {
    fields: Vec<FieldSpec>,
    allow_extra: bool,
}

impl ArgShape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(self, name: &str, kind: FieldKind, description: &str) -> Self {
        self.field(name, kind, true, description)
    }

    pub fn optional(self, name: &str, kind: FieldKind, description: &str) -> Self {
        self.field(name, kind, false, description)
    }

    fn field(mut self, name: &str, kind: FieldKind, required: bool, description: &str) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            kind,
            required,
            description: description.to_string(),
        });
        self
    }

    /// Accept fields that are not declared instead of rejecting them.
    pub fn allow_extra(mut self) -> Self {
        self.allow_extra = true;
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn kind_of(&self, name: &str) -> Option<FieldKind> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.kind)
    }

    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for f in &self.fields {
            let mut prop = json!({ "type": f.kind.json_type() });
            if !f.description.is_empty() {
                prop["description"] = Value::String(f.description.clone());
            }
            properties.insert(f.name.clone(), prop);
        }
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": self.allow_extra,
        })
    }

    /// Decodes a notation value for `field`; undeclared fields stay strings.
    pub fn decode_text_value(&self, field: &str, text: &str) -> Value {
        self.kind_of(field)
            .unwrap_or(FieldKind::String)
            .decode_text(text)
    }

    /// Checks `value` against the declaration. Every failing field is
    /// reported, not just the first one.
    pub fn validate(&self, value: Value) -> Result<ToolArgs, Vec<FieldIssue>> {
        let mut obj = match value {
            Value::Object(m) => m,
            other => {
                return Err(vec![FieldIssue {
                    field: "$".into(),
                    problem: format!("expected an object, got {}", type_name(&other)),
                }]);
            }
        };

        let mut issues = Vec::new();
        let mut values = BTreeMap::new();
        for spec in &self.fields {
            match obj.remove(&spec.name) {
                None | Some(Value::Null) => {
                    if spec.required {
                        issues.push(FieldIssue {
                            field: spec.name.clone(),
                            problem: "missing required field".into(),
                        });
                    }
                }
                Some(v) => match spec.kind.accept(v) {
                    Ok(arg) => {
                        values.insert(spec.name.clone(), arg);
                    }
                    Err(v) => issues.push(FieldIssue {
                        field: spec.name.clone(),
                        problem: format!(
                            "expected {}, got {}",
                            spec.kind.json_type(),
                            type_name(&v)
                        ),
                    }),
                },
            }
        }

        for (name, v) in obj {
            if self.allow_extra {
                values.insert(name, ArgValue::from(v));
            } else {
                issues.push(FieldIssue {
                    field: name,
                    problem: "unknown field".into(),
                });
            }
        }

        if issues.is_empty() {
            Ok(ToolArgs { values })
        } else {
            Err(issues)
        }
    }
}

/// A validated argument value, tagged by its declared kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Str(String),
    Int(i64),
    Num(f64),
    Bool(bool),
    List(Vec<Value>),
    Map(Map<String, Value>),
    Null,
}

impl From<Value> for ArgValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => ArgValue::Null,
            Value::Bool(b) => ArgValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ArgValue::Int(i),
                None => ArgValue::Num(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => ArgValue::Str(s),
            Value::Array(a) => ArgValue::List(a),
            Value::Object(m) => ArgValue::Map(m),
        }
    }
}

impl From<&ArgValue> for Value {
    fn from(v: &ArgValue) -> Self {
        match v {
            ArgValue::Str(s) => Value::String(s.clone()),
            ArgValue::Int(i) => json!(i),
            ArgValue::Num(f) => json!(f),
            ArgValue::Bool(b) => Value::Bool(*b),
            ArgValue::List(a) => Value::Array(a.clone()),
            ArgValue::Map(m) => Value::Object(m.clone()),
            ArgValue::Null => Value::Null,
        }
    }
}

/// Arguments that passed validation against a tool's [`ArgShape`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs {
    values: BTreeMap<String, ArgValue>,
}

impl ToolArgs {
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ArgValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ArgValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn f64(&self, name: &str) -> Option<f64> {
        match self.values.get(name) {
            Some(ArgValue::Num(f)) => Some(*f),
            Some(ArgValue::Int(i)) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(ArgValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), Value::from(v)))
                .collect(),
        )
    }
}
