//! Declarative schemas for model responses.
//!
//! A [`Schema`] describes the expected JSON shape of a payload and reports
//! every violation it finds with a JSON path, rather than stopping at the
//! first one. Unknown extra fields are ignored.

use std::fmt;
use std::marker::PhantomData;

use serde_json::Value;

use gtdflow_core::Violation;

/// Expected kind of a JSON value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    String,
    /// String with at least one non-whitespace character.
    NonEmptyString,
    Integer,
    Number,
    Boolean,
    /// String restricted to the listed values.
    Enum(Vec<String>),
    Array(Box<FieldKind>),
    Object(Vec<FieldSpec>),
    Any,
}

impl FieldKind {
    pub fn array(item: FieldKind) -> Self {
        Self::Array(Box::new(item))
    }

    pub fn one_of(values: &[&str]) -> Self {
        Self::Enum(values.iter().map(|v| v.to_string()).collect())
    }

    fn describe(&self) -> String {
        match self {
            Self::String => "string".to_string(),
            Self::NonEmptyString => "non-empty string".to_string(),
            Self::Integer => "integer".to_string(),
            Self::Number => "number".to_string(),
            Self::Boolean => "boolean".to_string(),
            Self::Enum(values) => format!("one of [{}]", values.join(", ")),
            Self::Array(_) => "array".to_string(),
            Self::Object(_) => "object".to_string(),
            Self::Any => "any value".to_string(),
        }
    }
}

/// A named member of an object.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    /// Required fields must be present and non-null.
    pub required: bool,
}

impl FieldSpec {
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }
}

/// Schema for payloads that deserialize into `T`.
pub struct Schema<T> {
    name: String,
    root: FieldKind,
    _target: PhantomData<fn() -> T>,
}

impl<T> Schema<T> {
    /// Object schema with no fields yet.
    pub fn object(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: FieldKind::Object(Vec::new()),
            _target: PhantomData,
        }
    }

    /// Schema with an arbitrary root kind, e.g. a top-level array.
    pub fn with_root(name: impl Into<String>, root: FieldKind) -> Self {
        Self {
            name: name.into(),
            root,
            _target: PhantomData,
        }
    }

    pub fn required(self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.field(FieldSpec::required(name, kind))
    }

    pub fn optional(self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.field(FieldSpec::optional(name, kind))
    }

    /// Add a field to an object root. Ignored for non-object roots.
    pub fn field(mut self, spec: FieldSpec) -> Self {
        if let FieldKind::Object(ref mut fields) = self.root {
            fields.push(spec);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &FieldKind {
        &self.root
    }

    /// Every violation in `value`, in document order. Empty means valid.
    pub fn validate(&self, value: &Value) -> Vec<Violation> {
        let mut violations = Vec::new();
        check(&self.root, value, "$", &mut violations);
        violations
    }
}

impl<T> Clone for Schema<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            root: self.root.clone(),
            _target: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Schema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("root", &self.root)
            .finish()
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn mismatch(kind: &FieldKind, value: &Value, path: &str, out: &mut Vec<Violation>) {
    out.push(Violation::new(
        path,
        format!("expected {}, found {}", kind.describe(), type_name(value)),
    ));
}

fn check(kind: &FieldKind, value: &Value, path: &str, out: &mut Vec<Violation>) {
    match (kind, value) {
        (FieldKind::Any, _) => {}
        (FieldKind::String, Value::String(_)) => {}
        (FieldKind::NonEmptyString, Value::String(s)) => {
            if s.trim().is_empty() {
                out.push(Violation::new(path, "must not be empty"));
            }
        }
        (FieldKind::Integer, Value::Number(n)) => {
            if !(n.is_i64() || n.is_u64()) {
                out.push(Violation::new(path, format!("expected integer, found {}", n)));
            }
        }
        (FieldKind::Number, Value::Number(_)) => {}
        (FieldKind::Boolean, Value::Bool(_)) => {}
        (FieldKind::Enum(values), Value::String(s)) => {
            if !values.iter().any(|v| v == s) {
                out.push(Violation::new(
                    path,
                    format!("'{}' is not one of [{}]", s, values.join(", ")),
                ));
            }
        }
        (FieldKind::Array(item), Value::Array(items)) => {
            for (i, element) in items.iter().enumerate() {
                check(item, element, &format!("{}[{}]", path, i), out);
            }
        }
        (FieldKind::Object(fields), Value::Object(map)) => {
            for spec in fields {
                let child = format!("{}.{}", path, spec.name);
                match map.get(&spec.name) {
                    None if spec.required => {
                        out.push(Violation::new(child, "required field is missing"));
                    }
                    None => {}
                    Some(Value::Null) if !spec.required => {}
                    Some(v) => check(&spec.kind, v, &child, out),
                }
            }
        }
        _ => mismatch(kind, value, path, out),
    }
}
