//! Tagged runtime values and heap objects.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{Result, VmError};

/// One operand-stack or local-slot value. Category-2 values (`Long`,
/// `Double`) are a single entry here; two-slot accounting happens in the
/// frame, not in the value.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Ref(Option<ObjRef>),
}

pub type ObjRef = Rc<RefCell<Obj>>;

/// A heap object: class name plus named fields. Strings, boxed primitives,
/// and arrays carry their data out of band so natives can reach it without
/// field-name conventions.
#[derive(Debug)]
pub struct Obj {
    pub class: String,
    pub fields: HashMap<String, Value>,
    pub payload: Payload,
}

#[derive(Debug)]
pub enum Payload {
    None,
    Str(String),
    Boxed(Value),
    Array(Vec<Value>),
}

impl Obj {
    pub fn new(class: impl Into<String>) -> ObjRef {
        Obj::with_payload(class, Payload::None)
    }

    pub fn with_payload(class: impl Into<String>, payload: Payload) -> ObjRef {
        Rc::new(RefCell::new(Obj {
            class: class.into(),
            fields: HashMap::new(),
            payload,
        }))
    }
}

impl Value {
    pub fn null() -> Value {
        Value::Ref(None)
    }

    /// A fresh `java/lang/String` instance.
    pub fn string(s: impl Into<String>) -> Value {
        Value::Ref(Some(Obj::with_payload(
            "java/lang/String",
            Payload::Str(s.into()),
        )))
    }

    /// Local/stack slots occupied.
    pub fn width(&self) -> u16 {
        match self {
            Value::Long(_) | Value::Double(_) => 2,
            _ => 1,
        }
    }

    pub fn as_int(&self) -> Result<i32> {
        match self {
            Value::Int(v) => Ok(*v),
            _ => Err(VmError::TypeMismatch("int")),
        }
    }

    pub fn as_long(&self) -> Result<i64> {
        match self {
            Value::Long(v) => Ok(*v),
            _ => Err(VmError::TypeMismatch("long")),
        }
    }

    pub fn as_float(&self) -> Result<f32> {
        match self {
            Value::Float(v) => Ok(*v),
            _ => Err(VmError::TypeMismatch("float")),
        }
    }

    pub fn as_double(&self) -> Result<f64> {
        match self {
            Value::Double(v) => Ok(*v),
            _ => Err(VmError::TypeMismatch("double")),
        }
    }

    pub fn as_ref(&self) -> Result<Option<ObjRef>> {
        match self {
            Value::Ref(r) => Ok(r.clone()),
            _ => Err(VmError::TypeMismatch("reference")),
        }
    }

    /// String payload, unwrapping `java/lang/String` objects.
    pub fn as_str(&self) -> Option<String> {
        match self {
            Value::Ref(Some(o)) => match &o.borrow().payload {
                Payload::Str(s) => Some(s.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Default value for a field of the given descriptor.
    pub fn default_of(descriptor: &str) -> Value {
        match descriptor.as_bytes().first() {
            Some(b'J') => Value::Long(0),
            Some(b'D') => Value::Double(0.0),
            Some(b'F') => Value::Float(0.0),
            Some(b'L') | Some(b'[') => Value::null(),
            _ => Value::Int(0),
        }
    }

    /// Human-readable rendering for hook logs and CLI output. Boxed
    /// wrappers and strings render as their contents.
    pub fn render(&self) -> String {
        match self {
            Value::Int(v) => v.to_string(),
            Value::Long(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Double(v) => v.to_string(),
            Value::Ref(None) => "null".to_string(),
            Value::Ref(Some(o)) => {
                let o = o.borrow();
                match &o.payload {
                    Payload::Str(s) => s.clone(),
                    Payload::Boxed(v) => v.render(),
                    Payload::Array(items) => format!("{}[{}]", o.class, items.len()),
                    Payload::None => o.class.clone(),
                }
            }
        }
    }
}
