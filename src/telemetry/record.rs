use serde_json::{Map, Value};

use crate::{
    error::{FieldIssue, FieldProblem, SchemaValidationError, TypeCoercionError},
    telemetry::Field,
};

#[derive(Debug, Clone, PartialEq)]
pub struct SensorRecord {
    pub date: String,

    pub aq: f64,

    pub h2s: f64,

    pub humidity: f64,

    pub temperature: f64,
}

impl SensorRecord {
    /// Validates a value read from the store. Every missing or mistyped field
    /// is reported, not only the first one; unknown keys are ignored.
    pub fn from_value(value: Option<&Value>) -> Result<Self, SchemaValidationError> {
        let empty = Map::new();
        let object = match value {
            None | Some(Value::Null) => &empty,
            Some(Value::Object(object)) => object,
            Some(other) => {
                let found = type_name(other);
                return Err(SchemaValidationError {
                    issues: Field::ALL
                        .into_iter()
                        .map(|field| FieldIssue {
                            field,
                            problem: FieldProblem::WrongType {
                                expected: expected_type(field),
                                found,
                            },
                        })
                        .collect(),
                });
            }
        };

        let mut issues = Vec::new();

        let date = match object.get(Field::Date.as_str()) {
            Some(Value::String(s)) => Some(s.clone()),
            other => {
                issues.push(issue(Field::Date, other));
                None
            }
        };

        let mut number = |field: Field| match object.get(field.as_str()).and_then(Value::as_f64) {
            Some(v) => Some(v),
            None => {
                issues.push(issue(field, object.get(field.as_str())));
                None
            }
        };

        let aq = number(Field::Aq);
        let h2s = number(Field::H2s);
        let humidity = number(Field::Humidity);
        let temperature = number(Field::Temperature);

        match (date, aq, h2s, humidity, temperature) {
            (Some(date), Some(aq), Some(h2s), Some(humidity), Some(temperature)) => Ok(Self {
                date,
                aq,
                h2s,
                humidity,
                temperature,
            }),
            _ => Err(SchemaValidationError { issues }),
        }
    }
}

/// Numeric key the persistence sink stores a sensor under. Blank and
/// non-finite input is rejected along with anything non-numeric.
pub fn coerce_sensor_id(sensor_id: &str) -> Result<f64, TypeCoercionError> {
    match sensor_id.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(TypeCoercionError {
            input: sensor_id.to_string(),
        }),
    }
}

fn issue(field: Field, found: Option<&Value>) -> FieldIssue {
    let problem = match found {
        None | Some(Value::Null) => FieldProblem::Missing,
        Some(v) => FieldProblem::WrongType {
            expected: expected_type(field),
            found: type_name(v),
        },
    };

    FieldIssue { field, problem }
}

fn expected_type(field: Field) -> &'static str {
    match field {
        Field::Date => "string",
        _ => "number",
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
