//! Structural extraction from compiled class files.
//!
//! Reads the constant pool, then the declared fields and methods, and renders
//! each member as a readable declaration. Attributes (code, annotations,
//! generic signatures) are skipped by length.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::descriptor::{self, DescriptorError};

const MAGIC: u32 = 0xCAFE_BABE;

const ACC_PUBLIC: u16 = 0x0001;
const ACC_PRIVATE: u16 = 0x0002;
const ACC_PROTECTED: u16 = 0x0004;
const ACC_STATIC: u16 = 0x0008;
const ACC_FINAL: u16 = 0x0010;
const ACC_ABSTRACT: u16 = 0x0400;

const CONSTRUCTOR: &str = "<init>";
const STATIC_INITIALIZER: &str = "<clinit>";

#[derive(Debug, Error)]
pub enum ClassParseError {
    #[error("unexpected end of class file")]
    UnexpectedEof,
    #[error("invalid class file magic header {0:#010x}")]
    InvalidMagic(u32),
    #[error("unsupported constant pool tag {tag}")]
    UnsupportedConstant { tag: u8 },
    #[error("invalid constant pool index {index}")]
    InvalidConstantIndex { index: u16 },
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub name: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    pub field_type: String,
}

impl FieldInfo {
    pub fn declaration(&self) -> String {
        format!("{} {}", self.field_type, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedClass {
    pub class_name: String,
    pub package_name: String,
    pub methods: Vec<MethodInfo>,
    pub fields: Vec<FieldInfo>,
}

pub fn parse_class(bytes: &[u8]) -> Result<ParsedClass, ClassParseError> {
    let mut reader = ClassReader::new(bytes);
    let magic = reader.read_u4()?;
    if magic != MAGIC {
        return Err(ClassParseError::InvalidMagic(magic));
    }
    let _minor_version = reader.read_u2()?;
    let _major_version = reader.read_u2()?;
    let pool = ConstantPool::parse(&mut reader)?;

    let _access_flags = reader.read_u2()?;
    let this_class = reader.read_u2()?;
    let _super_class = reader.read_u2()?;
    let interfaces_count = reader.read_u2()?;
    reader.skip(usize::from(interfaces_count) * 2)?;

    let fields_count = reader.read_u2()?;
    let mut fields = Vec::with_capacity(usize::from(fields_count));
    for _ in 0..fields_count {
        let member = read_member(&mut reader, &pool)?;
        fields.push(FieldInfo {
            name: member.name.to_string(),
            field_type: descriptor::decode_type(member.descriptor)?,
        });
    }

    let methods_count = reader.read_u2()?;
    let mut methods = Vec::with_capacity(usize::from(methods_count));
    for _ in 0..methods_count {
        let member = read_member(&mut reader, &pool)?;
        if member.name == CONSTRUCTOR || member.name == STATIC_INITIALIZER {
            continue;
        }
        methods.push(MethodInfo {
            name: member.name.to_string(),
            signature: render_method(member.access_flags, member.name, member.descriptor)?,
        });
    }

    let attributes_count = reader.read_u2()?;
    skip_attributes(&mut reader, attributes_count)?;

    let class_name = pool.class_name(this_class)?.replace('/', ".");
    let package_name = package_of(&class_name).to_string();

    Ok(ParsedClass {
        class_name,
        package_name,
        methods,
        fields,
    })
}

/// Renders `[visibility ][static ][final ][abstract ]<ret> <name>(<params>)`.
pub fn render_method(
    access_flags: u16,
    name: &str,
    method_descriptor: &str,
) -> Result<String, DescriptorError> {
    let decoded = descriptor::decode_method(method_descriptor)?;
    let mut out = String::new();

    if access_flags & ACC_PUBLIC != 0 {
        out.push_str("public ");
    } else if access_flags & ACC_PROTECTED != 0 {
        out.push_str("protected ");
    } else if access_flags & ACC_PRIVATE != 0 {
        out.push_str("private ");
    }
    if access_flags & ACC_STATIC != 0 {
        out.push_str("static ");
    }
    if access_flags & ACC_FINAL != 0 {
        out.push_str("final ");
    }
    if access_flags & ACC_ABSTRACT != 0 {
        out.push_str("abstract ");
    }

    out.push_str(&decoded.return_type);
    out.push(' ');
    out.push_str(name);
    out.push('(');
    out.push_str(&decoded.parameters.join(", "));
    out.push(')');
    Ok(out)
}

pub fn package_of(class_name: &str) -> &str {
    class_name
        .rsplit_once('.')
        .map(|(pkg, _)| pkg)
        .unwrap_or("")
}

pub fn simple_name_of(class_name: &str) -> &str {
    class_name
        .rsplit_once('.')
        .map(|(_, simple)| simple)
        .unwrap_or(class_name)
}

struct Member<'p> {
    access_flags: u16,
    name: &'p str,
    descriptor: &'p str,
}

fn read_member<'p>(
    reader: &mut ClassReader<'_>,
    pool: &'p ConstantPool,
) -> Result<Member<'p>, ClassParseError> {
    let access_flags = reader.read_u2()?;
    let name_index = reader.read_u2()?;
    let descriptor_index = reader.read_u2()?;
    let attributes_count = reader.read_u2()?;
    skip_attributes(reader, attributes_count)?;

    Ok(Member {
        access_flags,
        name: pool.utf8(name_index)?,
        descriptor: pool.utf8(descriptor_index)?,
    })
}

fn skip_attributes(reader: &mut ClassReader<'_>, count: u16) -> Result<(), ClassParseError> {
    for _ in 0..count {
        reader.read_u2()?; // attribute_name_index
        let length = reader.read_u4()? as usize;
        reader.skip(length)?;
    }
    Ok(())
}

#[derive(Debug, Clone)]
enum Constant {
    Utf8(String),
    Class { name_index: u16 },
    Other,
    Unusable,
}

struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    fn parse(reader: &mut ClassReader<'_>) -> Result<Self, ClassParseError> {
        let count = usize::from(reader.read_u2()?);
        let mut entries = Vec::with_capacity(count);
        entries.push(Constant::Unusable);

        while entries.len() < count {
            let tag = reader.read_u1()?;
            let entry = match tag {
                1 => {
                    let length = usize::from(reader.read_u2()?);
                    // Modified UTF-8; lossy decoding keeps odd names readable.
                    let bytes = reader.read_slice(length)?;
                    Constant::Utf8(String::from_utf8_lossy(bytes).into_owned())
                }
                7 => Constant::Class {
                    name_index: reader.read_u2()?,
                },
                3 | 4 | 9 | 10 | 11 | 12 | 17 | 18 => {
                    reader.skip(4)?;
                    Constant::Other
                }
                5 | 6 => {
                    reader.skip(8)?;
                    entries.push(Constant::Other);
                    Constant::Unusable
                }
                8 | 16 | 19 | 20 => {
                    reader.skip(2)?;
                    Constant::Other
                }
                15 => {
                    reader.skip(3)?;
                    Constant::Other
                }
                other => return Err(ClassParseError::UnsupportedConstant { tag: other }),
            };
            entries.push(entry);
        }

        Ok(Self { entries })
    }

    fn get(&self, index: u16) -> Result<&Constant, ClassParseError> {
        self.entries
            .get(usize::from(index))
            .ok_or(ClassParseError::InvalidConstantIndex { index })
    }

    fn utf8(&self, index: u16) -> Result<&str, ClassParseError> {
        match self.get(index)? {
            Constant::Utf8(value) => Ok(value.as_str()),
            _ => Err(ClassParseError::InvalidConstantIndex { index }),
        }
    }

    fn class_name(&self, index: u16) -> Result<&str, ClassParseError> {
        match self.get(index)? {
            Constant::Class { name_index } => self.utf8(*name_index),
            _ => Err(ClassParseError::InvalidConstantIndex { index }),
        }
    }
}

struct ClassReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ClassReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], ClassParseError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(ClassParseError::UnexpectedEof)?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> Result<(), ClassParseError> {
        self.read_slice(len).map(|_| ())
    }

    fn read_u1(&mut self) -> Result<u8, ClassParseError> {
        Ok(self.read_slice(1)?[0])
    }

    fn read_u2(&mut self) -> Result<u16, ClassParseError> {
        let b = self.read_slice(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn read_u4(&mut self) -> Result<u32, ClassParseError> {
        let b = self.read_slice(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}
