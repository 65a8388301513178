//! Request payload schemas.
//!
//! A [`Schema`] is an ordered set of named [`Field`]s. Validation walks the
//! fields in declaration order and stops at the first violation, so the error
//! a client sees is always the earliest field that is wrong.
//!
//! ```rust
//! use berth::schema::{Field, Schema};
//! use serde_json::json;
//!
//! let schema = Schema::new()
//!     .field("name",  Field::string().required())
//!     .field("kind",  Field::string().required().allowed(["cat", "dog"]))
//!     .field("legs",  Field::number().default(4))
//!     .field("owner", Field::object().nested(
//!         Schema::new().field("email", Field::string().required()),
//!     ));
//!
//! let payload = json!({"name": "rex", "kind": "dog", "owner": {"email": "a@b.c"}});
//! let normalized = schema.validate(payload.as_object().unwrap()).unwrap();
//! assert_eq!(normalized["legs"], json!(4));
//! ```

use std::fmt;

use serde_json::{Map, Value};

use crate::error::HttpError;

/// Declared type of a scalar field.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScalarType {
    String,
    Number,
    Boolean,
}

impl ScalarType {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String  => value.is_string(),
            Self::Number  => value.is_number(),
            Self::Boolean => value.is_boolean(),
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::String  => "string",
            Self::Number  => "number",
            Self::Boolean => "boolean",
        })
    }
}

/// Accepted values for a scalar field.
#[derive(Clone, Debug, PartialEq)]
pub enum Allowed {
    /// Exactly this value.
    Only(Value),
    /// Any member of the set.
    OneOf(Vec<Value>),
}

impl Allowed {
    fn check(&self, name: &str, value: &Value) -> Result<(), HttpError> {
        match self {
            Self::Only(only) if only != value => Err(HttpError::bad_request(format!(
                "'{name}' value '{}' is not valid. Allowed value is '{}'",
                display(value),
                display(only),
            ))),
            Self::OneOf(set) if !set.contains(value) => {
                let listed: Vec<String> = set.iter().map(display).collect();
                Err(HttpError::bad_request(format!(
                    "'{name}' value '{}' is not valid. Allowed values are [{}]",
                    display(value),
                    listed.join(","),
                )))
            }
            _ => Ok(()),
        }
    }
}

/// The shape of a field. Nested schemas exist only on compound kinds; for
/// arrays the nested schema applies to every element.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldKind {
    Scalar { ty: ScalarType, allowed: Option<Allowed> },
    Object(Option<Schema>),
    Array(Option<Schema>),
}

/// One field rule. Build with [`Field::string`], [`Field::number`], … and
/// the chained modifiers.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    required: bool,
    allow_empty: bool,
    default: Option<Value>,
    kind: FieldKind,
}

impl Field {
    pub fn new(kind: FieldKind) -> Self {
        Self { required: false, allow_empty: false, default: None, kind }
    }

    pub fn string() -> Self {
        Self::scalar(ScalarType::String)
    }

    pub fn number() -> Self {
        Self::scalar(ScalarType::Number)
    }

    pub fn boolean() -> Self {
        Self::scalar(ScalarType::Boolean)
    }

    pub fn object() -> Self {
        Self::new(FieldKind::Object(None))
    }

    pub fn array() -> Self {
        Self::new(FieldKind::Array(None))
    }

    fn scalar(ty: ScalarType) -> Self {
        Self::new(FieldKind::Scalar { ty, allowed: None })
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Lets a required string field be `""`.
    pub fn allow_empty(mut self) -> Self {
        self.allow_empty = true;
        self
    }

    /// Substituted when the payload omits the field (or sends `null`).
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Restricts a scalar field to a set of values. Ignored on compound kinds.
    pub fn allowed<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        if let FieldKind::Scalar { allowed, .. } = &mut self.kind {
            *allowed = Some(Allowed::OneOf(values.into_iter().map(Into::into).collect()));
        }
        self
    }

    /// Restricts a scalar field to exactly one value. Ignored on compound kinds.
    pub fn allowed_value(mut self, value: impl Into<Value>) -> Self {
        if let FieldKind::Scalar { allowed, .. } = &mut self.kind {
            *allowed = Some(Allowed::Only(value.into()));
        }
        self
    }

    /// Attaches a nested schema. Ignored on scalar kinds.
    pub fn nested(mut self, schema: Schema) -> Self {
        match &mut self.kind {
            FieldKind::Object(nested) | FieldKind::Array(nested) => *nested = Some(schema),
            FieldKind::Scalar { .. } => {}
        }
        self
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    fn is_missing(&self, value: Option<&Value>) -> bool {
        match value {
            None => true,
            Some(Value::String(s)) => s.is_empty() && !self.allow_empty,
            Some(_) => false,
        }
    }

    fn check(&self, name: &str, value: &Value) -> Result<Value, HttpError> {
        match &self.kind {
            FieldKind::Scalar { ty, allowed } => {
                if !ty.matches(value) {
                    return Err(type_mismatch(name, value, *ty));
                }
                if let Some(allowed) = allowed {
                    allowed.check(name, value)?;
                }
                Ok(value.clone())
            }
            FieldKind::Object(nested) => {
                let Value::Object(map) = value else {
                    return Err(type_mismatch(name, value, "object"));
                };
                match nested {
                    Some(schema) => schema.validate(map).map(Value::Object),
                    None => Ok(value.clone()),
                }
            }
            FieldKind::Array(nested) => {
                let Value::Array(items) = value else {
                    return Err(type_mismatch(name, value, "array"));
                };
                let Some(schema) = nested else {
                    return Ok(value.clone());
                };
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| match item {
                        Value::Object(map) => schema.validate(map).map(Value::Object),
                        other => Err(type_mismatch(&format!("{name}[{i}]"), other, "object")),
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
        }
    }
}

// ── Schema ────────────────────────────────────────────────────────────────────

/// Ordered field rules. Names are unique: re-declaring a name replaces the
/// earlier rule in place.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Schema {
    fields: Vec<(String, Field)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = field,
            None => self.fields.push((name, field)),
        }
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(n, f)| (n.as_str(), f))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Validates `data`, returning only the declared fields that resolved to
    /// a value (defaults substituted). Undeclared keys are dropped.
    pub fn validate(&self, data: &Map<String, Value>) -> Result<Map<String, Value>, HttpError> {
        let mut found = Map::new();

        for (name, field) in &self.fields {
            // `null` counts as absent, for both the payload and the default.
            let value = data
                .get(name)
                .filter(|v| !v.is_null())
                .or(field.default.as_ref())
                .filter(|v| !v.is_null());

            if field.required && field.is_missing(value) {
                return Err(HttpError::bad_request(format!("Missing required field '{name}'")));
            }

            let Some(value) = value else { continue };
            found.insert(name.clone(), field.check(name, value)?);
        }

        tracing::trace!(fields = found.len(), "payload validated");
        Ok(found)
    }
}

fn type_mismatch(name: &str, value: &Value, declared: impl fmt::Display) -> HttpError {
    HttpError::bad_request(format!(
        "Type of '{name}' is {}, should be {declared}",
        type_name(value)
    ))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null      => "null",
        Value::Bool(_)   => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_)  => "array",
        Value::Object(_) => "object",
    }
}

/// Strings unquoted, everything else as JSON.
fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    fn triple() -> Schema {
        Schema::new()
            .field("first", Field::number().required())
            .field("second", Field::string().required().allowed(["X", "Y", "Z"]))
            .field("third", Field::string().required().default("A"))
    }

    #[test]
    fn default_is_substituted() {
        let out = triple().validate(&obj(json!({"first": 1, "second": "Z"}))).unwrap();
        assert_eq!(Value::Object(out), json!({"first": 1, "second": "Z", "third": "A"}));
    }

    #[test]
    fn disallowed_value_lists_the_set() {
        let err = triple().validate(&obj(json!({"first": 1, "second": "Q"}))).unwrap_err();
        assert_eq!(err.status, http::StatusCode::BAD_REQUEST);
        assert!(err.message.contains("'second'"), "{}", err.message);
        assert!(err.message.contains("[X,Y,Z]"), "{}", err.message);
    }

    #[test]
    fn single_allowed_literal() {
        let schema = Schema::new().field("v", Field::number().allowed_value(2));
        assert!(schema.validate(&obj(json!({"v": 2}))).is_ok());
        let err = schema.validate(&obj(json!({"v": 3}))).unwrap_err();
        assert_eq!(err.message, "'v' value '3' is not valid. Allowed value is '2'");
    }

    #[test]
    fn first_violation_in_declaration_order_wins() {
        let schema = Schema::new()
            .field("b", Field::string().required())
            .field("a", Field::number().required());
        let err = schema.validate(&obj(json!({}))).unwrap_err();
        assert_eq!(err.message, "Missing required field 'b'");
    }

    #[test]
    fn empty_string_is_missing_unless_allowed() {
        let strict = Schema::new().field("s", Field::string().required());
        let lenient = Schema::new().field("s", Field::string().required().allow_empty());
        let data = obj(json!({"s": ""}));
        assert_eq!(strict.validate(&data).unwrap_err().message, "Missing required field 's'");
        assert_eq!(lenient.validate(&data).unwrap()["s"], json!(""));
    }

    #[test]
    fn null_is_absent() {
        let schema = Schema::new()
            .field("req", Field::string().required())
            .field("opt", Field::string());
        assert!(schema.validate(&obj(json!({"req": null}))).is_err());
        let out = schema.validate(&obj(json!({"req": "x", "opt": null}))).unwrap();
        assert!(!out.contains_key("opt"));
    }

    #[test]
    fn optional_absent_fields_are_omitted_and_extras_dropped() {
        let schema = Schema::new().field("a", Field::string()).field("b", Field::number());
        let out = schema.validate(&obj(json!({"b": 1, "extra": true}))).unwrap();
        assert_eq!(Value::Object(out), json!({"b": 1}));
    }

    #[test]
    fn type_mismatch_message() {
        let schema = Schema::new().field("n", Field::number());
        let err = schema.validate(&obj(json!({"n": "7"}))).unwrap_err();
        assert_eq!(err.message, "Type of 'n' is string, should be number");
    }

    #[test]
    fn array_is_not_an_object() {
        let schema = Schema::new().field("o", Field::object());
        let err = schema.validate(&obj(json!({"o": [1, 2]}))).unwrap_err();
        assert_eq!(err.message, "Type of 'o' is array, should be object");
    }

    #[test]
    fn object_is_not_an_array() {
        let schema = Schema::new().field("a", Field::array());
        let err = schema.validate(&obj(json!({"a": {"k": 1}}))).unwrap_err();
        assert_eq!(err.message, "Type of 'a' is object, should be array");
    }

    #[test]
    fn nested_object_is_normalized() {
        let schema = Schema::new().field(
            "owner",
            Field::object().nested(
                Schema::new()
                    .field("name", Field::string().required())
                    .field("role", Field::string().default("member")),
            ),
        );
        let out = schema.validate(&obj(json!({"owner": {"name": "kim", "x": 1}}))).unwrap();
        assert_eq!(out["owner"], json!({"name": "kim", "role": "member"}));

        let err = schema.validate(&obj(json!({"owner": {}}))).unwrap_err();
        assert_eq!(err.status, http::StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Missing required field 'name'");
    }

    #[test]
    fn nested_array_validates_each_element_in_order() {
        let schema = Schema::new().field(
            "items",
            Field::array().nested(Schema::new().field("sku", Field::string().required())),
        );
        let out = schema
            .validate(&obj(json!({"items": [{"sku": "a", "n": 1}, {"sku": "b"}]})))
            .unwrap();
        assert_eq!(out["items"], json!([{"sku": "a"}, {"sku": "b"}]));

        let err = schema
            .validate(&obj(json!({"items": [{"sku": "a"}, {"sku": 5}, {}]})))
            .unwrap_err();
        assert_eq!(err.message, "Type of 'sku' is number, should be string");

        let err = schema.validate(&obj(json!({"items": ["a"]}))).unwrap_err();
        assert_eq!(err.message, "Type of 'items[0]' is string, should be object");
    }

    #[test]
    fn untyped_compound_fields_are_copied() {
        let schema = Schema::new().field("meta", Field::object()).field("tags", Field::array());
        let data = obj(json!({"meta": {"any": [1, {"x": null}]}, "tags": [1, "two"]}));
        assert_eq!(schema.validate(&data).unwrap(), data);
    }

    #[test]
    fn revalidation_is_idempotent() {
        let schema = triple().field(
            "lines",
            Field::array().nested(Schema::new().field("qty", Field::number().default(1))),
        );
        let once = schema
            .validate(&obj(json!({"first": 3, "second": "X", "lines": [{}, {"qty": 4}]})))
            .unwrap();
        let twice = schema.validate(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn redeclaring_a_field_replaces_it() {
        let schema = Schema::new()
            .field("a", Field::string())
            .field("b", Field::string())
            .field("a", Field::number());
        let names: Vec<_> = schema.fields().map(|(n, _)| n).collect();
        assert_eq!(names, ["a", "b"]);
        assert!(matches!(
            schema.fields().next().map(|(_, f)| f.kind()),
            Some(FieldKind::Scalar { ty: ScalarType::Number, .. })
        ));
    }
}
