//! Field and method descriptor decoding.
//!
//! Descriptors are the compact type encodings stored in the constant pool
//! (`I`, `[Ljava/lang/String;`, `(IJ)V`, ...). This module renders them as
//! the dotted, source-like names used in stored signatures.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed descriptor {descriptor:?}: {reason}")]
pub struct DescriptorError {
    pub descriptor: String,
    pub reason: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub parameters: Vec<String>,
    pub return_type: String,
}

/// Decodes a single type token. The whole token must be consumed.
pub fn decode_type(descriptor: &str) -> Result<String, DescriptorError> {
    if descriptor == "V" {
        return Ok("void".to_string());
    }

    let mut parser = DescriptorParser::new(descriptor);
    let ty = parser.next_type()?;
    if parser.remaining() != 0 {
        return Err(parser.error("trailing characters after type"));
    }
    Ok(ty)
}

/// Splits the parenthesized part of a method descriptor into rendered
/// parameter types, one descriptor at a time.
pub fn split_parameters(segment: &str) -> Result<Vec<String>, DescriptorError> {
    let mut parser = DescriptorParser::new(segment);
    let mut parameters = Vec::new();
    while parser.remaining() > 0 {
        parameters.push(parser.next_type()?);
    }
    Ok(parameters)
}

pub fn decode_method(descriptor: &str) -> Result<MethodDescriptor, DescriptorError> {
    let malformed = |reason| DescriptorError {
        descriptor: descriptor.to_string(),
        reason,
    };

    let rest = descriptor
        .strip_prefix('(')
        .ok_or_else(|| malformed("method descriptor must start with '('"))?;
    let (params, ret) = rest
        .split_once(')')
        .ok_or_else(|| malformed("unterminated parameter list"))?;
    if ret.is_empty() {
        return Err(malformed("missing return type"));
    }

    Ok(MethodDescriptor {
        parameters: split_parameters(params)?,
        return_type: decode_type(ret)?,
    })
}

struct DescriptorParser<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> DescriptorParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
        }
    }

    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    fn error(&self, reason: &'static str) -> DescriptorError {
        DescriptorError {
            descriptor: self.source.to_string(),
            reason,
        }
    }

    fn next_type(&mut self) -> Result<String, DescriptorError> {
        let Some(&tag) = self.bytes.get(self.pos) else {
            return Err(self.error("unexpected end of descriptor"));
        };

        match tag {
            b'[' => self.array_type(),
            b'L' => self.reference_type(),
            _ => {
                let name = primitive_name(tag).ok_or_else(|| self.error("unknown type tag"))?;
                self.pos += 1;
                Ok(name.to_string())
            }
        }
    }

    fn array_type(&mut self) -> Result<String, DescriptorError> {
        let mut dimensions = 0usize;
        while self.bytes.get(self.pos) == Some(&b'[') {
            dimensions += 1;
            self.pos += 1;
        }
        let mut element = self.next_type()?;
        for _ in 0..dimensions {
            element.push_str("[]");
        }
        Ok(element)
    }

    fn reference_type(&mut self) -> Result<String, DescriptorError> {
        let start = self.pos + 1;
        let end = self.bytes[start..]
            .iter()
            .position(|b| *b == b';')
            .map(|offset| start + offset)
            .ok_or_else(|| self.error("unterminated object type"))?;
        if end == start {
            return Err(self.error("empty object type name"));
        }
        self.pos = end + 1;
        Ok(self.source[start..end].replace('/', "."))
    }
}

fn primitive_name(tag: u8) -> Option<&'static str> {
    Some(match tag {
        b'Z' => "boolean",
        b'B' => "byte",
        b'C' => "char",
        b'S' => "short",
        b'I' => "int",
        b'J' => "long",
        b'F' => "float",
        b'D' => "double",
        _ => return None,
    })
}
