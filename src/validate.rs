//! Response contract checks shared by every protocol step

use serde_json::Value;

use crate::error::{FrameError, ValidationError};
use crate::frame::Frame;
use crate::protocol::{field, Direction, Header, Operation, ResourceType, STATUS_OK};

/// What a response must look like for a step to succeed
#[derive(Debug, Clone)]
pub struct Expectation {
    pub operation: Operation,
    pub kind: ResourceType,
    pub direction: Direction,
    pub status: i64,
    pub required: Vec<&'static str>,
    pub matches: Vec<(&'static str, Value)>,
}

impl Expectation {
    /// RESPONSE direction, status 200, no field constraints
    pub fn new(operation: Operation, kind: ResourceType) -> Self {
        Self {
            operation,
            kind,
            direction: Direction::Response,
            status: STATUS_OK,
            required: Vec::new(),
            matches: Vec::new(),
        }
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn status(mut self, status: i64) -> Self {
        self.status = status;
        self
    }

    pub fn require(mut self, fields: &[&'static str]) -> Self {
        self.required.extend_from_slice(fields);
        self
    }

    pub fn matching(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.matches.push((field, value.into()));
        self
    }

    pub fn check(&self, response: Option<&Header>) -> Result<(), ValidationError> {
        validate(response, self)
    }

    /// Check the outcome of a frame read; decode failures count as no response
    pub fn check_reply<'a>(
        &self,
        reply: &'a Result<Frame, FrameError>,
    ) -> Result<&'a Header, ValidationError> {
        match reply {
            Ok(frame) => {
                validate(Some(&frame.header), self)?;
                Ok(&frame.header)
            }
            Err(e) => Err(ValidationError::NoResponse(e.to_string())),
        }
    }
}

fn render(v: Option<&Value>) -> String {
    match v {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "none".to_string(),
    }
}

fn as_int(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| {
        v.as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

/// Equality that treats `3` and `3.0` as the same number
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        _ => a == b,
    }
}

fn str_field_is(h: &Header, name: &str, expected: &str) -> bool {
    h.get(name).and_then(Value::as_str) == Some(expected)
}

/// Run every check in order and report the first one that fails
pub fn validate(response: Option<&Header>, exp: &Expectation) -> Result<(), ValidationError> {
    let h = response.ok_or_else(|| ValidationError::NoResponse("no frame received".into()))?;

    if !str_field_is(h, field::OPERATION, exp.operation.as_str()) {
        return Err(ValidationError::Operation {
            expected: exp.operation.to_string(),
            got: render(h.get(field::OPERATION)),
        });
    }
    if !str_field_is(h, field::DIRECTION, exp.direction.as_str()) {
        return Err(ValidationError::Direction {
            expected: exp.direction.to_string(),
            got: render(h.get(field::DIRECTION)),
        });
    }
    if !str_field_is(h, field::TYPE, exp.kind.as_str()) {
        return Err(ValidationError::Type {
            expected: exp.kind.to_string(),
            got: render(h.get(field::TYPE)),
        });
    }

    let status = h.get(field::STATUS);
    if status.and_then(as_int) != Some(exp.status) {
        let message = h
            .get(field::STATUS_MSG)
            .map(|m| render(Some(m)))
            .unwrap_or_else(|| "unknown error".to_string());
        return Err(ValidationError::Status {
            status: render(status),
            expected: exp.status,
            message,
        });
    }

    if let Some(missing) = exp.required.iter().find(|f| !h.contains_key(**f)) {
        return Err(ValidationError::MissingField(missing.to_string()));
    }

    for (name, expected) in &exp.matches {
        let got = h.get(*name).cloned().unwrap_or(Value::Null);
        if !values_equal(&got, expected) {
            return Err(ValidationError::Mismatch {
                field: name.to_string(),
                expected: expected.clone(),
                got,
            });
        }
    }
    Ok(())
}

/// Read a required string field from a validated response
pub fn str_field(h: &Header, name: &'static str) -> Result<String, ValidationError> {
    match h.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(ValidationError::InvalidField {
            field: name.to_string(),
            reason: format!("expected string, got {}", other),
        }),
        None => Err(ValidationError::MissingField(name.to_string())),
    }
}

/// Read a required non-negative integer field from a validated response
pub fn u64_field(h: &Header, name: &'static str) -> Result<u64, ValidationError> {
    let v = h
        .get(name)
        .ok_or_else(|| ValidationError::MissingField(name.to_string()))?;
    as_int(v)
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| ValidationError::InvalidField {
            field: name.to_string(),
            reason: format!("expected non-negative integer, got {}", v),
        })
}
