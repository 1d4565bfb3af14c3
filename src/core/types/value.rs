//! Typed, byte-exact values used as search needles and write payloads

use super::error::{MemoryError, MemoryResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// The kind a [`Value`] was constructed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    I32,
    I64,
    F32,
    F64,
    Bytes,
}

impl ValueKind {
    /// Returns the encoded size in bytes, or `None` for raw byte patterns
    pub fn size(&self) -> Option<usize> {
        match self {
            ValueKind::I32 | ValueKind::F32 => Some(4),
            ValueKind::I64 | ValueKind::F64 => Some(8),
            ValueKind::Bytes => None,
        }
    }
}

impl FromStr for ValueKind {
    type Err = MemoryError;

    fn from_str(s: &str) -> MemoryResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "i32" | "int32" | "int" => Ok(ValueKind::I32),
            "i64" | "int64" | "long" => Ok(ValueKind::I64),
            "f32" | "float32" | "float" => Ok(ValueKind::F32),
            "f64" | "float64" | "double" => Ok(ValueKind::F64),
            "bytes" | "aob" => Ok(ValueKind::Bytes),
            other => Err(MemoryError::InvalidValue(format!(
                "unknown value kind '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::I32 => "i32",
            ValueKind::I64 => "i64",
            ValueKind::F32 => "f32",
            ValueKind::F64 => "f64",
            ValueKind::Bytes => "bytes",
        };
        f.write_str(name)
    }
}

/// An immutable host-endian byte encoding of a scalar or a raw byte pattern.
///
/// Equality and hashing look at the encoded bytes only: a `Value` built from
/// `0x3f800000_i32` and one built from `1.0_f32` are the same needle.
#[derive(Debug, Clone, Serialize)]
pub struct Value {
    kind: ValueKind,
    bytes: Box<[u8]>,
}

impl Value {
    pub fn from_i32(value: i32) -> Self {
        Self::encoded(ValueKind::I32, &value.to_ne_bytes())
    }

    pub fn from_i64(value: i64) -> Self {
        Self::encoded(ValueKind::I64, &value.to_ne_bytes())
    }

    pub fn from_f32(value: f32) -> Self {
        Self::encoded(ValueKind::F32, &value.to_ne_bytes())
    }

    pub fn from_f64(value: f64) -> Self {
        Self::encoded(ValueKind::F64, &value.to_ne_bytes())
    }

    /// Wraps a raw byte pattern of any length
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Value {
            kind: ValueKind::Bytes,
            bytes: bytes.into().into_boxed_slice(),
        }
    }

    fn encoded(kind: ValueKind, bytes: &[u8]) -> Self {
        Value {
            kind,
            bytes: bytes.into(),
        }
    }

    /// Reinterprets raw memory bytes as a value of `kind`.
    ///
    /// Fixed-size kinds require exactly their encoded length.
    pub fn decode(kind: ValueKind, bytes: &[u8]) -> MemoryResult<Self> {
        match kind.size() {
            Some(size) if size != bytes.len() => Err(MemoryError::InvalidValue(format!(
                "{} needs {} bytes, got {}",
                kind,
                size,
                bytes.len()
            ))),
            _ => Ok(Self::encoded(kind, bytes)),
        }
    }

    /// Parses user text as a value of `kind`.
    ///
    /// Numeric kinds accept decimal text (integers also accept a `0x` prefix);
    /// raw bytes accept hex with optional whitespace, e.g. `"de ad be ef"`.
    pub fn parse(kind: ValueKind, text: &str) -> MemoryResult<Self> {
        let text = text.trim();
        let invalid = || MemoryError::InvalidValue(format!("cannot parse '{}' as {}", text, kind));

        match kind {
            ValueKind::I32 => parse_integer::<i32>(text)
                .map(Self::from_i32)
                .ok_or_else(invalid),
            ValueKind::I64 => parse_integer::<i64>(text)
                .map(Self::from_i64)
                .ok_or_else(invalid),
            ValueKind::F32 => text.parse::<f32>().map(Self::from_f32).map_err(|_| invalid()),
            ValueKind::F64 => text.parse::<f64>().map(Self::from_f64).map_err(|_| invalid()),
            ValueKind::Bytes => {
                let compact: String = text
                    .chars()
                    .filter(|c| !c.is_ascii_whitespace())
                    .collect();
                let compact = compact
                    .strip_prefix("0x")
                    .or_else(|| compact.strip_prefix("0X"))
                    .unwrap_or(&compact);
                if compact.is_empty() {
                    return Err(invalid());
                }
                hex::decode(compact)
                    .map(Self::from_bytes)
                    .map_err(|e| MemoryError::InvalidValue(format!("'{}': {}", text, e)))
            }
        }
    }

    /// The kind this value was constructed from
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// The encoded bytes
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Encoded length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_i32(&self) -> Option<i32> {
        self.array::<4>().map(i32::from_ne_bytes)
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.array::<8>().map(i64::from_ne_bytes)
    }

    pub fn as_f32(&self) -> Option<f32> {
        self.array::<4>().map(f32::from_ne_bytes)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.array::<8>().map(f64::from_ne_bytes)
    }

    /// Space-separated lowercase hex of the encoded bytes
    pub fn to_hex(&self) -> String {
        hex_string(&self.bytes)
    }

    fn array<const N: usize>(&self) -> Option<[u8; N]> {
        <[u8; N]>::try_from(&self.bytes[..]).ok()
    }
}

/// Space-separated lowercase hex, e.g. `"c3 f5 48 40"`
pub fn hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| hex::encode([*b]))
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_integer<T>(text: &str) -> Option<T>
where
    T: FromStr + TryFrom<i128>,
{
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        // the sign belongs before the prefix only
        if hex.starts_with(|c: char| c == '+' || c == '-') {
            return None;
        }
        let magnitude = i128::from_str_radix(hex, 16).ok()?;
        let value = if negative { -magnitude } else { magnitude };
        return T::try_from(value).ok();
    }

    text.parse::<T>().ok()
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::from_i32(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::from_i64(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::from_f32(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::from_f64(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::from_bytes(bytes)
    }
}

impl From<&[u8]> for Value {
    fn from(bytes: &[u8]) -> Self {
        Value::from_bytes(bytes)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = match self.kind {
            ValueKind::I32 => self.as_i32().map(|v| v.to_string()),
            ValueKind::I64 => self.as_i64().map(|v| v.to_string()),
            ValueKind::F32 => self.as_f32().map(|v| v.to_string()),
            ValueKind::F64 => self.as_f64().map(|v| v.to_string()),
            ValueKind::Bytes => None,
        };
        match rendered {
            Some(text) => write!(f, "{}", text),
            None => write!(f, "[{}]", self.to_hex()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_sizes() {
        assert_eq!(Value::from_i32(42).len(), 4);
        assert_eq!(Value::from_i64(42).len(), 8);
        assert_eq!(Value::from_f32(1.5).len(), 4);
        assert_eq!(Value::from_f64(1.5).len(), 8);
        assert_eq!(Value::from_bytes(vec![1, 2, 3]).len(), 3);
        assert!(Value::from_bytes(Vec::new()).is_empty());
    }

    #[test]
    #[cfg(target_endian = "little")]
    fn test_float_encoding_is_host_endian() {
        let value = Value::from_f32(3.14);
        assert_eq!(value.bytes(), &[0xc3, 0xf5, 0x48, 0x40]);
        assert_eq!(value.to_hex(), "c3 f5 48 40");
        assert_eq!(Value::from_i32(0x12345678).bytes(), &[0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn test_equality_ignores_kind() {
        let as_int = Value::from_i32(0x3f80_0000);
        let as_float = Value::from_f32(1.0);
        assert_eq!(as_int, as_float);
        assert_ne!(as_int.kind(), as_float.kind());
        assert_eq!(Value::from_bytes(as_float.bytes().to_vec()), as_float);
    }

    #[test]
    fn test_decode_checks_length() {
        assert!(Value::decode(ValueKind::I32, &[1, 2, 3]).is_err());
        let value = Value::decode(ValueKind::I64, &7i64.to_ne_bytes()).unwrap();
        assert_eq!(value.as_i64(), Some(7));
        assert_eq!(value.kind(), ValueKind::I64);
        assert!(Value::decode(ValueKind::Bytes, &[]).is_ok());
    }

    #[test]
    fn test_typed_accessors_need_matching_length() {
        let value = Value::from_i64(-9);
        assert_eq!(value.as_i32(), None);
        assert_eq!(value.as_f32(), None);
        assert_eq!(value.as_i64(), Some(-9));
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(Value::parse(ValueKind::I32, "-17").unwrap().as_i32(), Some(-17));
        assert_eq!(Value::parse(ValueKind::I32, "0x10").unwrap().as_i32(), Some(16));
        assert_eq!(Value::parse(ValueKind::I32, "-0x10").unwrap().as_i32(), Some(-16));
        assert_eq!(
            Value::parse(ValueKind::I64, "9000000000").unwrap().as_i64(),
            Some(9_000_000_000)
        );
        assert_eq!(Value::parse(ValueKind::F64, "2.5").unwrap().as_f64(), Some(2.5));
        assert!(Value::parse(ValueKind::I32, "9000000000").is_err());
        assert!(Value::parse(ValueKind::F32, "pi").is_err());
    }

    #[test]
    fn test_parse_rejects_sign_after_hex_prefix() {
        assert!(Value::parse(ValueKind::I32, "0x-5").is_err());
        assert!(Value::parse(ValueKind::I32, "-0x-5").is_err());
        assert!(Value::parse(ValueKind::I64, "0x+5").is_err());
        assert_eq!(Value::parse(ValueKind::I64, "-0x5").unwrap().as_i64(), Some(-5));
    }

    #[test]
    fn test_parse_bytes() {
        let value = Value::parse(ValueKind::Bytes, "de ad be ef").unwrap();
        assert_eq!(value.bytes(), &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(Value::parse(ValueKind::Bytes, "0xCAFE").unwrap().bytes(), &[0xca, 0xfe]);
        assert!(Value::parse(ValueKind::Bytes, "abc").is_err());
        assert!(Value::parse(ValueKind::Bytes, "zz").is_err());
        assert!(Value::parse(ValueKind::Bytes, "   ").is_err());
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("int32".parse::<ValueKind>().unwrap(), ValueKind::I32);
        assert_eq!("Double".parse::<ValueKind>().unwrap(), ValueKind::F64);
        assert!("u128".parse::<ValueKind>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::from_i32(-5).to_string(), "-5");
        assert_eq!(Value::from_f64(0.5).to_string(), "0.5");
        assert_eq!(Value::from_bytes(vec![0xab, 0x01]).to_string(), "[ab 01]");
    }
}
