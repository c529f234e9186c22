// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Bounded DER/BER cursor.
//!
//! Receipts are attacker-supplied. Every read checks the tag it expects before
//! consuming anything, and a read that fails leaves the cursor where it was, so
//! callers can treat a single bad field as "absent" and keep going.
//!
//! The cursor is a plain value: a borrowed buffer, an offset and an end bound.
//! Moving it forward produces a new cursor ([`DerCursor::advanced_by`]); the
//! consuming `read_*` methods compute the next cursor first and only commit it
//! once the whole read has succeeded.

use std::fmt;

use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

/// Universal tag numbers used by receipts and PKCS#7.
pub mod tag {
    pub const INTEGER: u32 = 0x02;
    pub const BIT_STRING: u32 = 0x03;
    pub const OCTET_STRING: u32 = 0x04;
    pub const NULL: u32 = 0x05;
    pub const OBJECT_IDENTIFIER: u32 = 0x06;
    pub const UTF8_STRING: u32 = 0x0C;
    pub const SEQUENCE: u32 = 0x10;
    pub const SET: u32 = 0x11;
    pub const IA5_STRING: u32 = 0x16;
}

/// Maximum nesting accepted when measuring indefinite-length (BER) elements.
const MAX_NESTING_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DerError {
    #[error("unexpected end of input at offset {offset}")]
    Truncated { offset: usize },

    #[error("declared length {length} at offset {offset} exceeds the {remaining} remaining bytes")]
    LengthOverflow { offset: usize, length: usize, remaining: usize },

    #[error("unsupported length encoding at offset {offset}")]
    InvalidLength { offset: usize },

    #[error("indefinite length is not allowed at offset {offset}")]
    IndefiniteLength { offset: usize },

    #[error("tag number at offset {offset} does not fit in 32 bits")]
    TagTooLarge { offset: usize },

    #[error("expected universal tag {expected}, found {found}")]
    UnexpectedTag { expected: u32, found: Header },

    #[error("elements nested too deeply at offset {offset}")]
    NestingTooDeep { offset: usize },

    #[error("missing end-of-contents marker for element at offset {offset}")]
    MissingEndOfContents { offset: usize },

    #[error("INTEGER has no content octets")]
    EmptyInteger,

    #[error("INTEGER of {length} octets does not fit in 64 bits")]
    IntegerOverflow { length: usize },

    #[error("invalid text: {0}")]
    InvalidText(&'static str),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TagClass {
    Universal,
    Application,
    ContextSpecific,
    Private,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Length {
    Definite(usize),
    /// BER indefinite form, terminated by an end-of-contents marker.
    Indefinite,
}

/// Identifier and length octets of one element.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Header {
    pub class: TagClass,
    pub constructed: bool,
    pub number: u32,
    /// Number of identifier + length octets.
    pub header_len: usize,
    pub length: Length,
}

impl Header {
    pub fn is_universal(&self, number: u32) -> bool {
        self.class == TagClass::Universal && self.number == number
    }

    pub fn is_context(&self, number: u32) -> bool {
        self.class == TagClass::ContextSpecific && self.number == number
    }

    pub fn definite_len(&self) -> Option<usize> {
        match self.length {
            Length::Definite(len) => Some(len),
            Length::Indefinite => None,
        }
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let class = match self.class {
            TagClass::Universal => "universal",
            TagClass::Application => "application",
            TagClass::ContextSpecific => "context",
            TagClass::Private => "private",
        };
        let form = if self.constructed { "constructed" } else { "primitive" };
        write!(f, "{class} tag {} ({form})", self.number)
    }
}

/// One complete element: header, content octets and the full encoding.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Element<'a> {
    pub header: Header,
    /// Content octets (for indefinite lengths, without the end-of-contents marker).
    pub value: &'a [u8],
    /// Identifier, length and content octets exactly as they appear in the input.
    pub raw: &'a [u8],
}

impl<'a> Element<'a> {
    /// Cursor over the content octets.
    pub fn contents(&self) -> DerCursor<'a> {
        DerCursor::new(self.value)
    }
}

/// Which decoding a field expects; see [`DerCursor::read_value`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ValueKind {
    Integer,
    Text,
    Timestamp,
    RawBytes,
}

/// A decoded attribute value, borrowing from the buffer it was read from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AttributeValue<'a> {
    Integer(i64),
    Utf8Text(&'a str),
    Ia5Text(&'a str),
    Timestamp(OffsetDateTime),
    RawBytes(&'a [u8]),
}

impl<'a> AttributeValue<'a> {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&'a str> {
        match self {
            Self::Utf8Text(s) | Self::Ia5Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<OffsetDateTime> {
        match self {
            Self::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match self {
            Self::RawBytes(b) => Some(b),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DerCursor<'a> {
    buf: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> DerCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            end: buf.len(),
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn remaining(&self) -> usize {
        self.end - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.end
    }

    /// Unconsumed bytes up to the end bound.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..self.end]
    }

    /// A cursor `n` bytes further on. `self` is not modified.
    pub fn advanced_by(&self, n: usize) -> Result<Self, DerError> {
        if n > self.remaining() {
            return Err(DerError::Truncated { offset: self.end });
        }
        Ok(Self {
            pos: self.pos + n,
            ..*self
        })
    }

    /// Decode the next header without consuming it.
    pub fn peek_header(&self) -> Result<Header, DerError> {
        parse_header(self.rest(), self.pos)
    }

    pub fn peek_is_context(&self, number: u32) -> bool {
        self.peek_header().map(|h| h.is_context(number)).unwrap_or(false)
    }

    /// Consume the next definite-length element, whatever its tag.
    pub fn read_element(&mut self) -> Result<Element<'a>, DerError> {
        let header = self.peek_header()?;
        let len = header
            .definite_len()
            .ok_or(DerError::IndefiniteLength { offset: self.pos })?;
        self.commit_element(header, len, header.header_len + len)
    }

    /// Consume the next element, accepting BER indefinite lengths.
    pub fn read_ber_element(&mut self) -> Result<Element<'a>, DerError> {
        let (header, content_len, total_len) = ber_extent(self.rest(), self.pos, 0)?;
        self.commit_element(header, content_len, total_len)
    }

    fn commit_element(
        &mut self,
        header: Header,
        content_len: usize,
        total_len: usize,
    ) -> Result<Element<'a>, DerError> {
        let next = self.advanced_by(total_len)?;
        let start = self.pos + header.header_len;
        let element = Element {
            header,
            value: &self.buf[start..start + content_len],
            raw: &self.buf[self.pos..self.pos + total_len],
        };
        *self = next;
        Ok(element)
    }

    /// Consume the next element if it carries universal tag `number`; return its content.
    pub fn read_expected(&mut self, number: u32) -> Result<&'a [u8], DerError> {
        let header = self.peek_header()?;
        if !header.is_universal(number) {
            return Err(DerError::UnexpectedTag { expected: number, found: header });
        }
        Ok(self.read_element()?.value)
    }

    /// Consume a definite-length constructed element with universal tag `number`
    /// and return a cursor over its content.
    pub fn enter(&mut self, number: u32) -> Result<DerCursor<'a>, DerError> {
        let header = self.peek_header()?;
        if !header.is_universal(number) || !header.constructed {
            return Err(DerError::UnexpectedTag { expected: number, found: header });
        }
        Ok(self.read_element()?.contents())
    }

    /// Like [`DerCursor::enter`], but the element may use an indefinite length.
    pub fn enter_ber(&mut self, number: u32) -> Result<DerCursor<'a>, DerError> {
        let header = self.peek_header()?;
        if !header.is_universal(number) || !header.constructed {
            return Err(DerError::UnexpectedTag { expected: number, found: header });
        }
        Ok(self.read_ber_element()?.contents())
    }

    /// Skip the next element (definite or indefinite length).
    pub fn skip_element(&mut self) -> Result<(), DerError> {
        self.read_ber_element().map(|_| ())
    }

    pub fn read_integer(&mut self) -> Result<i64, DerError> {
        let mut next = *self;
        let content = next.read_primitive(tag::INTEGER)?;
        let value = decode_integer(content)?;
        *self = next;
        Ok(value)
    }

    /// Read a UTF8String or IA5String.
    pub fn read_text(&mut self) -> Result<&'a str, DerError> {
        let value = self.read_text_value()?;
        value.as_text().ok_or(DerError::InvalidText("not a text value"))
    }

    fn read_text_value(&mut self) -> Result<AttributeValue<'a>, DerError> {
        let header = self.peek_header()?;
        let mut next = *self;
        let value = if header.is_universal(tag::UTF8_STRING) {
            let content = next.read_primitive(tag::UTF8_STRING)?;
            let text = std::str::from_utf8(content)
                .map_err(|_| DerError::InvalidText("UTF8String is not valid UTF-8"))?;
            AttributeValue::Utf8Text(text)
        } else if header.is_universal(tag::IA5_STRING) {
            let content = next.read_primitive(tag::IA5_STRING)?;
            AttributeValue::Ia5Text(ia5_str(content)?)
        } else {
            return Err(DerError::UnexpectedTag {
                expected: tag::UTF8_STRING,
                found: header,
            });
        };
        *self = next;
        Ok(value)
    }

    /// Read an IA5String holding `YYYY-MM-DDTHH:MM:SSZ` (UTC).
    pub fn read_timestamp(&mut self) -> Result<OffsetDateTime, DerError> {
        let mut next = *self;
        let content = next.read_primitive(tag::IA5_STRING)?;
        let value = parse_receipt_timestamp(ia5_str(content)?)?;
        *self = next;
        Ok(value)
    }

    /// Content octets of the next element, uninterpreted.
    pub fn read_raw_bytes(&mut self) -> Result<&'a [u8], DerError> {
        Ok(self.read_element()?.value)
    }

    /// Consume everything up to the end bound.
    pub fn take_rest(&mut self) -> &'a [u8] {
        let rest = self.rest();
        self.pos = self.end;
        rest
    }

    /// Decode one value of the given kind. `RawBytes` takes the rest of the cursor as-is.
    pub fn read_value(&mut self, kind: ValueKind) -> Result<AttributeValue<'a>, DerError> {
        match kind {
            ValueKind::Integer => self.read_integer().map(AttributeValue::Integer),
            ValueKind::Text => self.read_text_value(),
            ValueKind::Timestamp => self.read_timestamp().map(AttributeValue::Timestamp),
            ValueKind::RawBytes => Ok(AttributeValue::RawBytes(self.take_rest())),
        }
    }

    fn read_primitive(&mut self, number: u32) -> Result<&'a [u8], DerError> {
        let header = self.peek_header()?;
        if !header.is_universal(number) || header.constructed {
            return Err(DerError::UnexpectedTag { expected: number, found: header });
        }
        Ok(self.read_element()?.value)
    }
}

/// Parse `YYYY-MM-DDTHH:MM:SSZ` as a UTC instant.
pub fn parse_receipt_timestamp(text: &str) -> Result<OffsetDateTime, DerError> {
    let format = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");
    PrimitiveDateTime::parse(text, format)
        .map(PrimitiveDateTime::assume_utc)
        .map_err(|e| DerError::InvalidTimestamp(format!("{text:?}: {e}")))
}

fn ia5_str(content: &[u8]) -> Result<&str, DerError> {
    if !content.is_ascii() {
        return Err(DerError::InvalidText("IA5String contains non-ASCII octets"));
    }
    std::str::from_utf8(content)
        .map_err(|_| DerError::InvalidText("IA5String contains non-ASCII octets"))
}

fn decode_integer(content: &[u8]) -> Result<i64, DerError> {
    let first = *content.first().ok_or(DerError::EmptyInteger)?;
    if content.len() > 8 {
        return Err(DerError::IntegerOverflow { length: content.len() });
    }
    // Two's complement, sign-extended from the first octet.
    let mut value: i64 = if first & 0x80 != 0 { -1 } else { 0 };
    for b in content {
        value = (value << 8) | i64::from(*b);
    }
    Ok(value)
}

fn parse_header(input: &[u8], offset: usize) -> Result<Header, DerError> {
    let first = *input.first().ok_or(DerError::Truncated { offset })?;
    let class = match first >> 6 {
        0 => TagClass::Universal,
        1 => TagClass::Application,
        2 => TagClass::ContextSpecific,
        _ => TagClass::Private,
    };
    let constructed = first & 0x20 != 0;

    let mut idx = 1usize;
    let mut number = u32::from(first & 0x1f);
    if number == 0x1f {
        // High tag number form: base-128, most significant group first.
        number = 0;
        loop {
            let b = *input.get(idx).ok_or(DerError::Truncated { offset: offset + idx })?;
            idx += 1;
            if number > (u32::MAX >> 7) {
                return Err(DerError::TagTooLarge { offset });
            }
            number = (number << 7) | u32::from(b & 0x7f);
            if b & 0x80 == 0 {
                break;
            }
        }
    }

    let len_byte = *input.get(idx).ok_or(DerError::Truncated { offset: offset + idx })?;
    idx += 1;
    let length = match len_byte {
        0x00..=0x7f => Length::Definite(usize::from(len_byte)),
        0x80 => {
            if !constructed {
                return Err(DerError::InvalidLength { offset });
            }
            Length::Indefinite
        }
        0xff => return Err(DerError::InvalidLength { offset }),
        _ => {
            let count = usize::from(len_byte & 0x7f);
            if count > std::mem::size_of::<usize>() {
                return Err(DerError::InvalidLength { offset });
            }
            let octets = input
                .get(idx..idx + count)
                .ok_or(DerError::Truncated { offset: offset + idx })?;
            idx += count;
            Length::Definite(octets.iter().fold(0usize, |acc, b| (acc << 8) | usize::from(*b)))
        }
    };

    if let Length::Definite(len) = length {
        let remaining = input.len() - idx;
        if len > remaining {
            return Err(DerError::LengthOverflow {
                offset,
                length: len,
                remaining,
            });
        }
    }

    Ok(Header {
        class,
        constructed,
        number,
        header_len: idx,
        length,
    })
}

/// Measure the element at the start of `input`: (header, content length, total length).
fn ber_extent(
    input: &[u8],
    offset: usize,
    depth: usize,
) -> Result<(Header, usize, usize), DerError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(DerError::NestingTooDeep { offset });
    }
    let header = parse_header(input, offset)?;
    match header.length {
        Length::Definite(len) => Ok((header, len, header.header_len + len)),
        Length::Indefinite => {
            let mut pos = header.header_len;
            loop {
                let rest = &input[pos..];
                if rest.starts_with(&[0x00, 0x00]) {
                    return Ok((header, pos - header.header_len, pos + 2));
                }
                if rest.is_empty() {
                    return Err(DerError::MissingEndOfContents { offset });
                }
                let (_, _, child_len) = ber_extent(rest, offset + pos, depth + 1)?;
                pos += child_len;
            }
        }
    }
}
