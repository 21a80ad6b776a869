use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

/// Integer identifier carried by the marker annotation's `value` element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeKey(pub i32);

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for TypeKey {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

/// Where a class resource was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceOrigin {
    /// The class path entry (directory or archive) that held the resource.
    pub entry: PathBuf,
    /// Slash separated resource path inside the entry, e.g. `a/b/A.class`.
    pub resource: String,
}

impl fmt::Display for ResourceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!/{}", self.entry.display(), self.resource)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AnnotationValue {
    Byte(i8),
    Char(char),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bool(bool),
    String(String),
    Enum { type_name: String, constant: String },
    Class(String),
    Annotation(Annotation),
    Array(Vec<AnnotationValue>),
}

impl AnnotationValue {
    /// Integral values that fit an `i32`, the way `int` elements are stored.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            AnnotationValue::Int(v) => Some(*v),
            AnnotationValue::Short(v) => Some(i32::from(*v)),
            AnnotationValue::Byte(v) => Some(i32::from(*v)),
            AnnotationValue::Char(c) => Some(*c as i32),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AnnotationValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Strings of a `String[]` element. A single string counts as a one
    /// element array, mirroring how annotation arrays may be written.
    pub fn as_string_array(&self) -> Option<Vec<String>> {
        match self {
            AnnotationValue::String(s) => Some(vec![s.clone()]),
            AnnotationValue::Array(items) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => None,
        }
    }
}

/// A declared annotation: its binary type name and explicitly written elements.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub type_name: String,
    pub elements: Vec<(String, AnnotationValue)>,
}

impl Annotation {
    pub fn element(&self, name: &str) -> Option<&AnnotationValue> {
        self.elements
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// Lightweight metadata of one class, decoded without loading it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassDescriptor {
    pub name: String,
    pub access_flags: u16,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub annotations: Vec<Annotation>,
    pub origin: ResourceOrigin,
}

impl ClassDescriptor {
    pub const ACC_INTERFACE: u16 = 0x0200;
    pub const ACC_ABSTRACT: u16 = 0x0400;
    pub const ACC_ANNOTATION: u16 = 0x2000;

    pub fn annotation(&self, type_name: &str) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.type_name == type_name)
    }

    pub fn has_annotation(&self, type_name: &str) -> bool {
        self.annotation(type_name).is_some()
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & Self::ACC_INTERFACE != 0
    }

    pub fn is_annotation(&self) -> bool {
        self.access_flags & Self::ACC_ANNOTATION != 0
    }

    pub fn package_name(&self) -> &str {
        package_of(&self.name)
    }

    pub fn simple_name(&self) -> &str {
        let tail = self.name.rsplit('.').next().unwrap_or(&self.name);
        tail.rsplit('$').next().unwrap_or(tail)
    }
}

/// A discovered class that passed the filter and resolved to a loadable type.
///
/// Identity is the binary name; two copies of one class on different class
/// path entries are the same type.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateType {
    pub name: String,
    pub key: TypeKey,
    pub origin: ResourceOrigin,
}

impl PartialEq for CandidateType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for CandidateType {}

impl Hash for CandidateType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for CandidateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class {}", self.name)
    }
}

pub type CandidateMap = BTreeMap<TypeKey, CandidateType>;

/// Package part of a dotted binary name; empty for the root package.
pub fn package_of(class_name: &str) -> &str {
    class_name.rfind('.').map_or("", |idx| &class_name[..idx])
}

/// `a.b.C` → `a/b/C.class`
pub fn class_name_to_class_path(class_name: &str) -> String {
    format!("{}.class", class_name.replace('.', "/"))
}

/// `a/b/C.class` → `a.b.C`
pub fn class_path_to_class_name(class_path: &str) -> String {
    class_path
        .trim_end_matches(".class")
        .replace(['/', '\\'], ".")
}

/// `a.b` → `a/b/`, the root package maps to the empty prefix.
pub fn package_to_path_prefix(package: &str) -> String {
    let trimmed = package.trim().trim_matches('.');
    if trimmed.is_empty() {
        return String::new();
    }
    format!("{}/", trimmed.replace('.', "/"))
}
