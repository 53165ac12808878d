//! Field and method descriptor parsing.
//!
//! Descriptors use the class-file grammar: `I`, `J`, `Ljava/lang/String;`,
//! `[[D`, and method shapes like `(IJLjava/lang/String;)V`. Parsed forms
//! carry slot widths (long/double take two local/stack slots) and the boxing
//! table used when a primitive has to cross a reference-typed hook boundary.

use std::fmt;

use smallvec::SmallVec;

use crate::error::{ClassFileError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
    /// Internal (slash-separated) class name.
    Object(String),
    Array(Box<FieldType>),
}

impl FieldType {
    /// Parse one field type from the front of `chars`, leaving the rest.
    fn parse_from(chars: &mut std::str::Chars<'_>, full: &str) -> Result<FieldType> {
        let c = chars
            .next()
            .ok_or_else(|| ClassFileError::BadDescriptor(full.to_string()))?;
        Ok(match c {
            'B' => FieldType::Byte,
            'C' => FieldType::Char,
            'D' => FieldType::Double,
            'F' => FieldType::Float,
            'I' => FieldType::Int,
            'J' => FieldType::Long,
            'S' => FieldType::Short,
            'Z' => FieldType::Boolean,
            'L' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some(';') => break,
                        Some(c) => name.push(c),
                        None => return Err(ClassFileError::BadDescriptor(full.to_string())),
                    }
                }
                if name.is_empty() {
                    return Err(ClassFileError::BadDescriptor(full.to_string()));
                }
                FieldType::Object(name)
            }
            '[' => FieldType::Array(Box::new(Self::parse_from(chars, full)?)),
            _ => return Err(ClassFileError::BadDescriptor(full.to_string())),
        })
    }

    pub fn parse(descriptor: &str) -> Result<FieldType> {
        let mut chars = descriptor.chars();
        let ty = Self::parse_from(&mut chars, descriptor)?;
        if chars.next().is_some() {
            return Err(ClassFileError::BadDescriptor(descriptor.to_string()));
        }
        Ok(ty)
    }

    pub fn descriptor(&self) -> String {
        let mut s = String::new();
        self.write_descriptor(&mut s);
        s
    }

    fn write_descriptor(&self, out: &mut String) {
        match self {
            FieldType::Byte => out.push('B'),
            FieldType::Char => out.push('C'),
            FieldType::Double => out.push('D'),
            FieldType::Float => out.push('F'),
            FieldType::Int => out.push('I'),
            FieldType::Long => out.push('J'),
            FieldType::Short => out.push('S'),
            FieldType::Boolean => out.push('Z'),
            FieldType::Object(name) => {
                out.push('L');
                out.push_str(name);
                out.push(';');
            }
            FieldType::Array(inner) => {
                out.push('[');
                inner.write_descriptor(out);
            }
        }
    }

    /// Local/stack slots occupied: 2 for long and double, 1 otherwise.
    pub fn width(&self) -> u16 {
        match self {
            FieldType::Long | FieldType::Double => 2,
            _ => 1,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::Object(_) | FieldType::Array(_))
    }

    /// Boxing target for a primitive: `(owner, valueOf descriptor)`.
    /// Returns `None` for reference types, which never box.
    pub fn boxed(&self) -> Option<(&'static str, &'static str)> {
        Some(match self {
            FieldType::Byte => ("java/lang/Byte", "(B)Ljava/lang/Byte;"),
            FieldType::Char => ("java/lang/Character", "(C)Ljava/lang/Character;"),
            FieldType::Double => ("java/lang/Double", "(D)Ljava/lang/Double;"),
            FieldType::Float => ("java/lang/Float", "(F)Ljava/lang/Float;"),
            FieldType::Int => ("java/lang/Integer", "(I)Ljava/lang/Integer;"),
            FieldType::Long => ("java/lang/Long", "(J)Ljava/lang/Long;"),
            FieldType::Short => ("java/lang/Short", "(S)Ljava/lang/Short;"),
            FieldType::Boolean => ("java/lang/Boolean", "(Z)Ljava/lang/Boolean;"),
            FieldType::Object(_) | FieldType::Array(_) => return None,
        })
    }
}

impl fmt::Display for FieldType {
    /// Source-style name: `int`, `java.lang.String`, `long[]`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Byte => f.write_str("byte"),
            FieldType::Char => f.write_str("char"),
            FieldType::Double => f.write_str("double"),
            FieldType::Float => f.write_str("float"),
            FieldType::Int => f.write_str("int"),
            FieldType::Long => f.write_str("long"),
            FieldType::Short => f.write_str("short"),
            FieldType::Boolean => f.write_str("boolean"),
            FieldType::Object(name) => f.write_str(&name.replace('/', ".")),
            FieldType::Array(inner) => write!(f, "{inner}[]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDescriptor {
    pub params: SmallVec<[FieldType; 8]>,
    /// `None` for void.
    pub ret: Option<FieldType>,
}

impl MethodDescriptor {
    pub fn parse(descriptor: &str) -> Result<MethodDescriptor> {
        let mut chars = descriptor.chars();
        if chars.next() != Some('(') {
            return Err(ClassFileError::BadDescriptor(descriptor.to_string()));
        }
        let mut params = SmallVec::new();
        loop {
            let rest = chars.as_str();
            match rest.chars().next() {
                Some(')') => {
                    chars.next();
                    break;
                }
                Some(_) => params.push(FieldType::parse_from(&mut chars, descriptor)?),
                None => return Err(ClassFileError::BadDescriptor(descriptor.to_string())),
            }
        }
        let ret = match chars.as_str() {
            "V" => None,
            "" => return Err(ClassFileError::BadDescriptor(descriptor.to_string())),
            rest => {
                let ty = FieldType::parse(rest)?;
                Some(ty)
            }
        };
        Ok(MethodDescriptor { params, ret })
    }

    pub fn descriptor(&self) -> String {
        let mut s = String::from("(");
        for p in &self.params {
            p.write_descriptor(&mut s);
        }
        s.push(')');
        match &self.ret {
            Some(ty) => ty.write_descriptor(&mut s),
            None => s.push('V'),
        }
        s
    }

    /// Total local slots the parameters occupy (excluding `this`).
    pub fn param_slots(&self) -> u16 {
        self.params.iter().map(|p| p.width()).sum()
    }

    /// Source-style parameter list: `int, java.lang.String`.
    pub fn param_names(&self) -> String {
        let names: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
        names.join(", ")
    }
}
