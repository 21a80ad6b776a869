//! Class file fixtures for tests.
//!
//! Builds minimal but well-formed class files so tests can exercise the
//! decoder and the scanner without a JDK. Shared with the integration tests
//! through `#[path]`, so it only depends on std.

#![allow(dead_code)]

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub enum ElementSpec {
    Int(i32),
    Bool(bool),
    Long(i64),
    Double(f64),
    Str(String),
    Enum(String, String),
    Class(String),
    Array(Vec<ElementSpec>),
}

#[derive(Debug, Clone)]
struct AnnotationSpec {
    type_name: String,
    elements: Vec<(String, ElementSpec)>,
}

#[derive(Debug, Clone)]
pub struct ClassSpec {
    name: String,
    access_flags: u16,
    superclass: Option<String>,
    interfaces: Vec<String>,
    visible: Vec<AnnotationSpec>,
    invisible: Vec<AnnotationSpec>,
    fields: Vec<String>,
    methods: Vec<String>,
}

impl ClassSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            access_flags: 0x0021, // public super
            superclass: Some("java.lang.Object".to_string()),
            interfaces: Vec::new(),
            visible: Vec::new(),
            invisible: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn access_flags(mut self, flags: u16) -> Self {
        self.access_flags = flags;
        self
    }

    pub fn superclass(mut self, name: &str) -> Self {
        self.superclass = Some(name.to_string());
        self
    }

    pub fn interface(mut self, name: &str) -> Self {
        self.interfaces.push(name.to_string());
        self
    }

    pub fn annotation(mut self, type_name: &str, elements: &[(&str, ElementSpec)]) -> Self {
        self.visible.push(annotation_spec(type_name, elements));
        self
    }

    pub fn invisible_annotation(mut self, type_name: &str, elements: &[(&str, ElementSpec)]) -> Self {
        self.invisible.push(annotation_spec(type_name, elements));
        self
    }

    pub fn field(mut self, name: &str) -> Self {
        self.fields.push(name.to_string());
        self
    }

    pub fn method(mut self, name: &str) -> Self {
        self.methods.push(name.to_string());
        self
    }

    /// Slash separated resource path of this class.
    pub fn resource_path(&self) -> String {
        format!("{}.class", self.name.replace('.', "/"))
    }

    pub fn build(&self) -> Vec<u8> {
        let mut pool = PoolBuilder::default();

        let this_class = pool.class(&self.name);
        let super_class = self.superclass.as_deref().map_or(0, |s| pool.class(s));
        let interfaces: Vec<u16> = self.interfaces.iter().map(|i| pool.class(i)).collect();

        let mut members = Vec::new();
        for list in [&self.fields, &self.methods] {
            put_u2(&mut members, list.len() as u16);
            for name in list.iter() {
                let name_index = pool.utf8(name);
                let descriptor_index = pool.utf8("I");
                put_u2(&mut members, 0x0001);
                put_u2(&mut members, name_index);
                put_u2(&mut members, descriptor_index);
                // One opaque attribute so skipping is exercised.
                put_u2(&mut members, 1);
                put_u2(&mut members, pool.utf8("Synthetic"));
                put_u4(&mut members, 0);
            }
        }

        let mut attributes = Vec::new();
        let mut attribute_count = 0u16;
        for (attr_name, list) in [
            ("RuntimeVisibleAnnotations", &self.visible),
            ("RuntimeInvisibleAnnotations", &self.invisible),
        ] {
            if list.is_empty() {
                continue;
            }
            let mut body = Vec::new();
            put_u2(&mut body, list.len() as u16);
            for a in list.iter() {
                write_annotation(&mut body, &mut pool, a);
            }
            attribute_count += 1;
            put_u2(&mut attributes, pool.utf8(attr_name));
            put_u4(&mut attributes, body.len() as u32);
            attributes.extend_from_slice(&body);
        }

        let mut out = Vec::new();
        put_u4(&mut out, 0xCAFE_BABE);
        put_u2(&mut out, 0);
        put_u2(&mut out, 52);
        put_u2(&mut out, pool.next_index);
        out.extend_from_slice(&pool.bytes);
        put_u2(&mut out, self.access_flags);
        put_u2(&mut out, this_class);
        put_u2(&mut out, super_class);
        put_u2(&mut out, interfaces.len() as u16);
        for i in interfaces {
            put_u2(&mut out, i);
        }
        out.extend_from_slice(&members);
        put_u2(&mut out, attribute_count);
        out.extend_from_slice(&attributes);
        out
    }
}

fn annotation_spec(type_name: &str, elements: &[(&str, ElementSpec)]) -> AnnotationSpec {
    AnnotationSpec {
        type_name: type_name.to_string(),
        elements: elements
            .iter()
            .map(|(n, v)| (n.to_string(), v.clone()))
            .collect(),
    }
}

fn write_annotation(out: &mut Vec<u8>, pool: &mut PoolBuilder, a: &AnnotationSpec) {
    put_u2(out, pool.utf8(&descriptor(&a.type_name)));
    put_u2(out, a.elements.len() as u16);
    for (name, value) in a.elements.iter() {
        put_u2(out, pool.utf8(name));
        write_element(out, pool, value);
    }
}

fn write_element(out: &mut Vec<u8>, pool: &mut PoolBuilder, value: &ElementSpec) {
    match value {
        ElementSpec::Int(v) => {
            out.push(b'I');
            put_u2(out, pool.integer(*v));
        }
        ElementSpec::Bool(v) => {
            out.push(b'Z');
            put_u2(out, pool.integer(i32::from(*v)));
        }
        ElementSpec::Long(v) => {
            out.push(b'J');
            put_u2(out, pool.long(*v));
        }
        ElementSpec::Double(v) => {
            out.push(b'D');
            put_u2(out, pool.double(*v));
        }
        ElementSpec::Str(s) => {
            out.push(b's');
            put_u2(out, pool.utf8(s));
        }
        ElementSpec::Enum(type_name, constant) => {
            out.push(b'e');
            put_u2(out, pool.utf8(&descriptor(type_name)));
            put_u2(out, pool.utf8(constant));
        }
        ElementSpec::Class(name) => {
            out.push(b'c');
            put_u2(out, pool.utf8(&descriptor(name)));
        }
        ElementSpec::Array(items) => {
            out.push(b'[');
            put_u2(out, items.len() as u16);
            for item in items {
                write_element(out, pool, item);
            }
        }
    }
}

fn descriptor(name: &str) -> String {
    format!("L{};", name.replace('.', "/"))
}

struct PoolBuilder {
    bytes: Vec<u8>,
    next_index: u16,
    utf8: HashMap<String, u16>,
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self {
            bytes: Vec::new(),
            next_index: 1,
            utf8: HashMap::new(),
        }
    }
}

impl PoolBuilder {
    fn utf8(&mut self, s: &str) -> u16 {
        if let Some(index) = self.utf8.get(s) {
            return *index;
        }
        self.bytes.push(1);
        put_u2(&mut self.bytes, s.len() as u16);
        self.bytes.extend_from_slice(s.as_bytes());
        let index = self.bump(1);
        self.utf8.insert(s.to_string(), index);
        index
    }

    fn class(&mut self, name: &str) -> u16 {
        let name_index = self.utf8(&name.replace('.', "/"));
        self.bytes.push(7);
        put_u2(&mut self.bytes, name_index);
        self.bump(1)
    }

    fn integer(&mut self, v: i32) -> u16 {
        self.bytes.push(3);
        put_u4(&mut self.bytes, v as u32);
        self.bump(1)
    }

    fn long(&mut self, v: i64) -> u16 {
        self.bytes.push(5);
        self.bytes.extend_from_slice(&v.to_be_bytes());
        self.bump(2)
    }

    fn double(&mut self, v: f64) -> u16 {
        self.bytes.push(6);
        self.bytes.extend_from_slice(&v.to_bits().to_be_bytes());
        self.bump(2)
    }

    fn bump(&mut self, slots: u16) -> u16 {
        let index = self.next_index;
        self.next_index += slots;
        index
    }
}

fn put_u2(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_u4(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}
