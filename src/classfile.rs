//! Class file metadata decoding.
//!
//! Reads just enough of a `.class` file to describe the type: its name,
//! access flags, supertypes and class-level annotations. Fields and methods
//! are skipped, no bytecode is interpreted and nothing is linked, so a class
//! whose dependencies are absent still decodes.

use crate::error::DecodeError;
use crate::model::{Annotation, AnnotationValue, ClassDescriptor, ResourceOrigin};

const MAGIC: u32 = 0xCAFE_BABE;
const RUNTIME_VISIBLE_ANNOTATIONS: &[u8] = b"RuntimeVisibleAnnotations";
const RUNTIME_INVISIBLE_ANNOTATIONS: &[u8] = b"RuntimeInvisibleAnnotations";
/// Nesting limit for `@` and `[` element values.
const MAX_ELEMENT_DEPTH: usize = 64;

/// Turns the bytes of one class resource into a [`ClassDescriptor`].
pub trait MetadataDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8], origin: ResourceOrigin) -> Result<ClassDescriptor, DecodeError>;
}

/// Decoder for the JVM class file format.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassFileDecoder {
    /// Also report `CLASS` retention annotations, which the JVM never exposes
    /// reflectively.
    pub include_invisible: bool,
}

impl ClassFileDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_invisible_annotations(mut self, include: bool) -> Self {
        self.include_invisible = include;
        self
    }
}

impl MetadataDecoder for ClassFileDecoder {
    fn decode(&self, bytes: &[u8], origin: ResourceOrigin) -> Result<ClassDescriptor, DecodeError> {
        let mut r = ByteReader::new(bytes);

        let magic = r.u4()?;
        if magic != MAGIC {
            return Err(DecodeError::BadMagic(magic));
        }
        let _minor = r.u2()?;
        let _major = r.u2()?;

        let pool = ConstantPool::read(&mut r)?;

        let access_flags = r.u2()?;
        let this_class = r.u2()?;
        let super_class = r.u2()?;
        let name = pool.class_name(this_class)?;
        let superclass = if super_class == 0 {
            None
        } else {
            Some(pool.class_name(super_class)?)
        };

        let interface_count = r.u2()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(pool.class_name(r.u2()?)?);
        }

        skip_members(&mut r)?; // fields
        skip_members(&mut r)?; // methods

        let mut annotations = Vec::new();
        let attribute_count = r.u2()?;
        for _ in 0..attribute_count {
            let name_index = r.u2()?;
            let len = r.u4()? as usize;
            let body = r.take(len)?;
            let attr_name = pool.utf8_bytes(name_index)?;

            let wanted = attr_name == RUNTIME_VISIBLE_ANNOTATIONS
                || (self.include_invisible && attr_name == RUNTIME_INVISIBLE_ANNOTATIONS);
            if !wanted {
                continue;
            }

            let mut ar = ByteReader::with_offset(body, r.pos - len);
            let count = ar.u2()?;
            for _ in 0..count {
                annotations.push(read_annotation(&mut ar, &pool, 0)?);
            }
        }

        Ok(ClassDescriptor {
            name,
            access_flags,
            superclass,
            interfaces,
            annotations,
            origin,
        })
    }
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self::with_offset(bytes, 0)
    }

    fn with_offset(bytes: &'a [u8], base: usize) -> Self {
        Self { bytes, pos: 0, base }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(DecodeError::Truncated(self.base + self.bytes.len()))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u1(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u2(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u4(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u8(&mut self) -> Result<u64, DecodeError> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_be_bytes(buf))
    }
}

#[derive(Debug, Clone, Copy)]
enum Constant<'a> {
    Utf8(&'a [u8]),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    Other,
    /// Second slot of a long or double.
    Unusable,
}

struct ConstantPool<'a> {
    entries: Vec<Constant<'a>>,
}

impl<'a> ConstantPool<'a> {
    fn read(r: &mut ByteReader<'a>) -> Result<Self, DecodeError> {
        let count = u32::from(r.u2()?);
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(Constant::Unusable);

        // u32 so the second slot of a trailing long/double cannot wrap.
        let mut index = 1u32;
        while index < count {
            let tag = r.u1()?;
            let constant = match tag {
                1 => {
                    let len = r.u2()? as usize;
                    Constant::Utf8(r.take(len)?)
                }
                3 => Constant::Integer(r.u4()? as i32),
                4 => Constant::Float(f32::from_bits(r.u4()?)),
                5 => Constant::Long(r.u8()? as i64),
                6 => Constant::Double(f64::from_bits(r.u8()?)),
                7 => Constant::Class(r.u2()?),
                8 | 16 | 19 | 20 => {
                    r.u2()?;
                    Constant::Other
                }
                9 | 10 | 11 | 12 | 17 | 18 => {
                    r.u4()?;
                    Constant::Other
                }
                15 => {
                    r.u1()?;
                    r.u2()?;
                    Constant::Other
                }
                _ => {
                    return Err(DecodeError::UnknownConstantTag {
                        tag,
                        index: index as u16,
                    });
                }
            };

            if matches!(constant, Constant::Long(_) | Constant::Double(_)) {
                if index + 1 >= count {
                    return Err(DecodeError::BadConstant {
                        index: index as u16,
                        expected: "single-slot constant in the last pool slot",
                    });
                }
                entries.push(constant);
                entries.push(Constant::Unusable);
                index += 2;
            } else {
                entries.push(constant);
                index += 1;
            }
        }

        Ok(Self { entries })
    }

    fn get(&self, index: u16) -> Option<Constant<'a>> {
        self.entries.get(index as usize).copied()
    }

    fn utf8_bytes(&self, index: u16) -> Result<&'a [u8], DecodeError> {
        match self.get(index) {
            Some(Constant::Utf8(bytes)) => Ok(bytes),
            _ => Err(DecodeError::BadConstant {
                index,
                expected: "Utf8",
            }),
        }
    }

    fn utf8(&self, index: u16) -> Result<String, DecodeError> {
        decode_modified_utf8(self.utf8_bytes(index)?).ok_or(DecodeError::BadUtf8(index))
    }

    fn class_name(&self, index: u16) -> Result<String, DecodeError> {
        match self.get(index) {
            Some(Constant::Class(name_index)) => Ok(self.utf8(name_index)?.replace('/', ".")),
            _ => Err(DecodeError::BadConstant {
                index,
                expected: "Class",
            }),
        }
    }

    fn integer(&self, index: u16) -> Result<i32, DecodeError> {
        match self.get(index) {
            Some(Constant::Integer(v)) => Ok(v),
            _ => Err(DecodeError::BadConstant {
                index,
                expected: "Integer",
            }),
        }
    }
}

fn skip_members(r: &mut ByteReader<'_>) -> Result<(), DecodeError> {
    let count = r.u2()?;
    for _ in 0..count {
        r.take(6)?; // access_flags, name_index, descriptor_index
        let attribute_count = r.u2()?;
        for _ in 0..attribute_count {
            r.u2()?;
            let len = r.u4()? as usize;
            r.take(len)?;
        }
    }
    Ok(())
}

fn read_annotation(
    r: &mut ByteReader<'_>,
    pool: &ConstantPool<'_>,
    depth: usize,
) -> Result<Annotation, DecodeError> {
    let type_name = descriptor_to_name(&pool.utf8(r.u2()?)?);
    let pair_count = r.u2()?;
    let mut elements = Vec::with_capacity(pair_count as usize);
    for _ in 0..pair_count {
        let name = pool.utf8(r.u2()?)?;
        let value = read_element_value(r, pool, depth)?;
        elements.push((name, value));
    }
    Ok(Annotation { type_name, elements })
}

fn read_element_value(
    r: &mut ByteReader<'_>,
    pool: &ConstantPool<'_>,
    depth: usize,
) -> Result<AnnotationValue, DecodeError> {
    if depth >= MAX_ELEMENT_DEPTH {
        return Err(DecodeError::NestedTooDeep(MAX_ELEMENT_DEPTH));
    }
    let tag = r.u1()? as char;
    let value = match tag {
        'B' => AnnotationValue::Byte(pool.integer(r.u2()?)? as i8),
        'C' => {
            let code = pool.integer(r.u2()?)? as u32;
            AnnotationValue::Char(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER))
        }
        'S' => AnnotationValue::Short(pool.integer(r.u2()?)? as i16),
        'I' => AnnotationValue::Int(pool.integer(r.u2()?)?),
        'Z' => AnnotationValue::Bool(pool.integer(r.u2()?)? != 0),
        'J' => {
            let index = r.u2()?;
            match pool.get(index) {
                Some(Constant::Long(v)) => AnnotationValue::Long(v),
                _ => {
                    return Err(DecodeError::BadConstant {
                        index,
                        expected: "Long",
                    });
                }
            }
        }
        'F' => {
            let index = r.u2()?;
            match pool.get(index) {
                Some(Constant::Float(v)) => AnnotationValue::Float(v),
                _ => {
                    return Err(DecodeError::BadConstant {
                        index,
                        expected: "Float",
                    });
                }
            }
        }
        'D' => {
            let index = r.u2()?;
            match pool.get(index) {
                Some(Constant::Double(v)) => AnnotationValue::Double(v),
                _ => {
                    return Err(DecodeError::BadConstant {
                        index,
                        expected: "Double",
                    });
                }
            }
        }
        's' => AnnotationValue::String(pool.utf8(r.u2()?)?),
        'e' => {
            let type_name = descriptor_to_name(&pool.utf8(r.u2()?)?);
            let constant = pool.utf8(r.u2()?)?;
            AnnotationValue::Enum {
                type_name,
                constant,
            }
        }
        'c' => AnnotationValue::Class(descriptor_to_name(&pool.utf8(r.u2()?)?)),
        '@' => AnnotationValue::Annotation(read_annotation(r, pool, depth + 1)?),
        '[' => {
            let count = r.u2()?;
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                items.push(read_element_value(r, pool, depth + 1)?);
            }
            AnnotationValue::Array(items)
        }
        other => return Err(DecodeError::UnknownElementTag(other)),
    };
    Ok(value)
}

/// `La/b/C;` → `a.b.C`. Primitive and array descriptors are returned as is.
fn descriptor_to_name(descriptor: &str) -> String {
    match descriptor
        .strip_prefix('L')
        .and_then(|s| s.strip_suffix(';'))
    {
        Some(internal) => internal.replace('/', "."),
        None => descriptor.to_string(),
    }
}

/// Decodes the JVM's modified UTF-8 (`0xC0 0x80` for NUL, surrogate pairs
/// encoded as two three-byte sequences).
fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    if bytes.is_ascii() {
        return std::str::from_utf8(bytes).ok().map(str::to_string);
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0usize;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            units.push(u16::from(b));
            i += 1;
        } else if b & 0xE0 == 0xC0 {
            let b2 = *bytes.get(i + 1)?;
            units.push((u16::from(b & 0x1F) << 6) | u16::from(b2 & 0x3F));
            i += 2;
        } else if b & 0xF0 == 0xE0 {
            let b2 = *bytes.get(i + 1)?;
            let b3 = *bytes.get(i + 2)?;
            units.push(
                (u16::from(b & 0x0F) << 12) | (u16::from(b2 & 0x3F) << 6) | u16::from(b3 & 0x3F),
            );
            i += 3;
        } else {
            return None;
        }
    }
    String::from_utf16(&units).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ClassSpec, ElementSpec};
    use std::path::PathBuf;

    fn origin(resource: &str) -> ResourceOrigin {
        ResourceOrigin {
            entry: PathBuf::from("mem"),
            resource: resource.to_string(),
        }
    }

    #[test]
    fn decodes_name_supertypes_and_marker() {
        let bytes = ClassSpec::new("a.b.A1")
            .superclass("a.b.Base")
            .interface("java.io.Serializable")
            .annotation("x.Marker", &[("value", ElementSpec::Int(7))])
            .build();

        let d = ClassFileDecoder::new()
            .decode(&bytes, origin("a/b/A1.class"))
            .unwrap();
        assert_eq!(d.name, "a.b.A1");
        assert_eq!(d.superclass.as_deref(), Some("a.b.Base"));
        assert_eq!(d.interfaces, vec!["java.io.Serializable".to_string()]);

        let marker = d.annotation("x.Marker").unwrap();
        assert_eq!(marker.element("value"), Some(&AnnotationValue::Int(7)));
    }

    #[test]
    fn decodes_nested_element_kinds() {
        let bytes = ClassSpec::new("a.Scan")
            .annotation(
                "x.Scan",
                &[
                    (
                        "value",
                        ElementSpec::Array(vec![
                            ElementSpec::Str("a.b".into()),
                            ElementSpec::Str("c".into()),
                        ]),
                    ),
                    ("lazy", ElementSpec::Bool(true)),
                    ("limit", ElementSpec::Long(1 << 40)),
                    ("ratio", ElementSpec::Double(0.5)),
                    ("kind", ElementSpec::Enum("x.Kind".into(), "FAST".into())),
                    ("target", ElementSpec::Class("a.b.A1".into())),
                ],
            )
            .build();

        let d = ClassFileDecoder::new().decode(&bytes, origin("a/Scan.class")).unwrap();
        let scan = d.annotation("x.Scan").unwrap();
        assert_eq!(
            scan.element("value").and_then(AnnotationValue::as_string_array),
            Some(vec!["a.b".to_string(), "c".to_string()])
        );
        assert_eq!(scan.element("lazy"), Some(&AnnotationValue::Bool(true)));
        assert_eq!(scan.element("limit"), Some(&AnnotationValue::Long(1 << 40)));
        assert_eq!(scan.element("ratio"), Some(&AnnotationValue::Double(0.5)));
        assert_eq!(
            scan.element("kind"),
            Some(&AnnotationValue::Enum {
                type_name: "x.Kind".into(),
                constant: "FAST".into()
            })
        );
        assert_eq!(
            scan.element("target"),
            Some(&AnnotationValue::Class("a.b.A1".into()))
        );
    }

    #[test]
    fn class_retention_annotations_are_opt_in() {
        let bytes = ClassSpec::new("a.A")
            .invisible_annotation("x.Hidden", &[])
            .build();

        let default = ClassFileDecoder::new().decode(&bytes, origin("a/A.class")).unwrap();
        assert!(!default.has_annotation("x.Hidden"));

        let all = ClassFileDecoder::new()
            .with_invisible_annotations(true)
            .decode(&bytes, origin("a/A.class"))
            .unwrap();
        assert!(all.has_annotation("x.Hidden"));
    }

    #[test]
    fn skips_fields_and_methods() {
        let bytes = ClassSpec::new("a.A")
            .field("count")
            .method("run")
            .annotation("x.Marker", &[("value", ElementSpec::Int(3))])
            .build();

        let d = ClassFileDecoder::new().decode(&bytes, origin("a/A.class")).unwrap();
        assert!(d.has_annotation("x.Marker"));
    }

    #[test]
    fn rejects_bad_magic_and_truncation() {
        let err = ClassFileDecoder::new()
            .decode(b"dummy", origin("a/A.class"))
            .unwrap_err();
        assert!(matches!(err, DecodeError::BadMagic(_)));

        let bytes = ClassSpec::new("a.A").build();
        let err = ClassFileDecoder::new()
            .decode(&bytes[..bytes.len() - 3], origin("a/A.class"))
            .unwrap_err();
        assert!(matches!(err, DecodeError::Truncated(_)));
    }

    fn header(pool_count: u16) -> Vec<u8> {
        let mut bytes = MAGIC.to_be_bytes().to_vec();
        bytes.extend_from_slice(&[0, 0, 0, 52]);
        bytes.extend_from_slice(&pool_count.to_be_bytes());
        bytes
    }

    fn utf8(bytes: &mut Vec<u8>, text: &str) {
        bytes.push(1);
        bytes.extend_from_slice(&(text.len() as u16).to_be_bytes());
        bytes.extend_from_slice(text.as_bytes());
    }

    #[test]
    fn long_in_last_pool_slot_is_rejected() {
        let mut bytes = header(0xFFFF);
        for _ in 0..0xFFFD {
            bytes.extend_from_slice(&[1, 0, 0]);
        }
        bytes.push(5);
        bytes.extend_from_slice(&42u64.to_be_bytes());

        let err = ClassFileDecoder::new()
            .decode(&bytes, origin("a/A.class"))
            .unwrap_err();
        assert_eq!(
            err,
            DecodeError::BadConstant {
                index: 0xFFFE,
                expected: "single-slot constant in the last pool slot",
            }
        );
    }

    #[test]
    fn deeply_nested_element_values_are_rejected() {
        let mut bytes = header(6);
        utf8(&mut bytes, "a/A");
        bytes.extend_from_slice(&[7, 0, 1]);
        utf8(&mut bytes, "RuntimeVisibleAnnotations");
        utf8(&mut bytes, "Lx/Marker;");
        utf8(&mut bytes, "value");

        let mut element = Vec::new();
        for _ in 0..10_000 {
            element.extend_from_slice(&[b'[', 0, 1]);
        }
        element.extend_from_slice(&[b's', 0, 5]);

        let mut body = vec![0, 1, 0, 4, 0, 1, 0, 5];
        body.extend_from_slice(&element);

        bytes.extend_from_slice(&[0, 0x21, 0, 2, 0, 0]); // access, this, super
        bytes.extend_from_slice(&[0, 0, 0, 0, 0, 0]); // interfaces, fields, methods
        bytes.extend_from_slice(&[0, 1, 0, 3]);
        bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&body);

        let err = ClassFileDecoder::new()
            .decode(&bytes, origin("a/A.class"))
            .unwrap_err();
        assert_eq!(err, DecodeError::NestedTooDeep(MAX_ELEMENT_DEPTH));
    }

    #[test]
    fn modified_utf8_handles_nul_and_supplementary() {
        assert_eq!(decode_modified_utf8(&[0xC0, 0x80]).as_deref(), Some("\0"));
        // U+1F600 as a surrogate pair, each half three bytes.
        let bytes = [0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80];
        assert_eq!(decode_modified_utf8(&bytes).as_deref(), Some("\u{1F600}"));
        assert_eq!(decode_modified_utf8(&[0xFF]), None);
    }
}
