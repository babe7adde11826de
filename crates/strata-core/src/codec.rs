//! Value codec: structured values to and from the byte-string transport.
//!
//! Three modes, exactly one active per cache instance:
//!
//! - [`CodecMode::Tagged`] (default): a small fixed grammar of
//!   tagged-length-prefixed forms (`i:42;`, `s:5:"hello";`, `a:2:{...}`,
//!   `O:4:"user":1:{...}`). Plain strings that do not match the grammar are
//!   stored raw so they are never double-encoded; plain strings that happen
//!   to match it are wrapped in a string tag so they still round-trip.
//! - [`CodecMode::Binary`]: compact binary form via `bincode`.
//! - [`CodecMode::Passthrough`]: the backend's own value typing is
//!   authoritative; only scalar values are accepted.
//!
//! Decoding is best-effort: bytes that cannot be classified or parsed come
//! back unmodified (`Str` for UTF-8 input, `Bytes` otherwise). The
//! [`is_encoded`] check is a structural classifier, not a parser; a plain
//! string that coincidentally matches the grammar (e.g. one starting with
//! `s:5:"`) is classified as encoded. That is an accepted limitation, not
//! something to paper over with a full parse.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::CacheResult;
use crate::error::CacheError;
use crate::value::CacheValue;

/// Matches the head of string/sequence/record forms: `s:<len>:`, `a:<n>:`,
/// `O:<len>:`.
static AGGREGATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[saO]:[0-9]+:").expect("hard-coded pattern"));

/// Matches bool/int/float forms anywhere at the head: `b:1;`, `i:-3;`,
/// `d:1.5;`. Floats include the non-finite spellings `inf`/`-inf`/`NaN`.
static SCALAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[bid]:(?:-?inf|NaN|[0-9.E-]+);").expect("hard-coded pattern"));

/// Strict variant of [`SCALAR_RE`]: the terminator must end the input.
static SCALAR_STRICT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[bid]:(?:-?inf|NaN|[0-9.E-]+);$").expect("hard-coded pattern")
});

/// Which wire form the codec produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecMode {
    /// Tagged-length-prefixed text grammar (default).
    #[default]
    Tagged,
    /// Compact binary form (`bincode`).
    Binary,
    /// No encoding; the caller guarantees the backend handles value typing.
    Passthrough,
}

/// Encoder/decoder for cache values.
#[derive(Debug, Clone, Copy, Default)]
pub struct Codec {
    mode: CodecMode,
}

impl Codec {
    /// Creates a codec for the given mode.
    #[must_use]
    pub fn new(mode: CodecMode) -> Self {
        Self { mode }
    }

    /// Returns the active mode.
    #[must_use]
    pub fn mode(&self) -> CodecMode {
        self.mode
    }

    /// Encodes a value to its byte-string transport form.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Codec` when the active mode cannot represent the
    /// value (structured values in passthrough mode, serializer failures in
    /// binary mode). Tagged encoding is infallible.
    pub fn encode(&self, value: &CacheValue) -> CacheResult<Vec<u8>> {
        match self.mode {
            CodecMode::Tagged => Ok(encode_tagged(value)),
            CodecMode::Binary => {
                bincode::serialize(value).map_err(|e| CacheError::codec(e.to_string()))
            }
            CodecMode::Passthrough => encode_passthrough(value),
        }
    }

    /// Decodes a byte-string back into a value.
    ///
    /// Best-effort: input that is not in encoded form, or that fails to
    /// parse, is returned unmodified (`Str` for UTF-8 input, `Bytes`
    /// otherwise). The codec cannot always distinguish "not actually
    /// encoded" from "corrupt", so it never errors here.
    #[must_use]
    pub fn decode(&self, data: &[u8]) -> CacheValue {
        match self.mode {
            CodecMode::Tagged => decode_tagged(data),
            CodecMode::Binary => {
                bincode::deserialize(data).unwrap_or_else(|_| raw_value(data))
            }
            CodecMode::Passthrough => raw_value(data),
        }
    }
}

/// Structural check for whether `data` is already in the tagged wire form.
///
/// Mirrors the grammar head only: tag byte, `:` separator, length/digit
/// shape, and (in strict mode) a matching terminator at the end of input.
/// Deliberately a classifier rather than a parse; see the module docs for
/// the accepted misclassification case.
#[must_use]
pub fn is_encoded(data: &str, strict: bool) -> bool {
    let data = data.trim();

    if data == "N;" {
        return true;
    }

    if data.len() < 4 {
        return false;
    }

    let bytes = data.as_bytes();

    if bytes[1] != b':' {
        return false;
    }

    if strict {
        let last = bytes[data.len() - 1];
        if last != b';' && last != b'}' {
            return false;
        }
    } else {
        let semicolon = data.find(';');
        let brace = data.find('}');

        // Either ; or } must exist, and neither in the first few characters.
        if semicolon.is_none() && brace.is_none() {
            return false;
        }
        if matches!(semicolon, Some(pos) if pos < 3) {
            return false;
        }
        if matches!(brace, Some(pos) if pos < 4) {
            return false;
        }
    }

    match bytes[0] {
        b's' => {
            if strict {
                if bytes[data.len() - 2] != b'"' {
                    return false;
                }
            } else if !data.contains('"') {
                return false;
            }
            AGGREGATE_RE.is_match(data)
        }
        b'a' | b'O' => AGGREGATE_RE.is_match(data),
        b'b' | b'i' | b'd' => {
            if strict {
                SCALAR_STRICT_RE.is_match(data)
            } else {
                SCALAR_RE.is_match(data)
            }
        }
        _ => false,
    }
}

/// Wraps raw bytes in the closest value variant without interpreting them.
fn raw_value(data: &[u8]) -> CacheValue {
    match std::str::from_utf8(data) {
        Ok(s) => CacheValue::Str(s.to_string()),
        Err(_) => CacheValue::Bytes(data.to_vec()),
    }
}

fn encode_passthrough(value: &CacheValue) -> CacheResult<Vec<u8>> {
    match value {
        CacheValue::Null => Ok(Vec::new()),
        CacheValue::Bool(b) => Ok(if *b { b"1".to_vec() } else { b"0".to_vec() }),
        CacheValue::Int(i) => Ok(i.to_string().into_bytes()),
        CacheValue::Float(f) => Ok(f.to_string().into_bytes()),
        CacheValue::Str(s) => Ok(s.clone().into_bytes()),
        CacheValue::Bytes(b) => Ok(b.clone()),
        other => Err(CacheError::codec(format!(
            "passthrough mode cannot encode {} values",
            other.type_name()
        ))),
    }
}

fn encode_tagged(value: &CacheValue) -> Vec<u8> {
    match value {
        // Plain strings are stored raw unless they would be mistaken for
        // encoded data on the way back out.
        CacheValue::Str(s) if !is_encoded(s, false) => s.clone().into_bytes(),
        CacheValue::Bytes(b) => b.clone(),
        other => {
            let mut buf = Vec::new();
            write_tagged(other, &mut buf);
            buf
        }
    }
}

fn write_tagged(value: &CacheValue, buf: &mut Vec<u8>) {
    match value {
        CacheValue::Null => buf.extend_from_slice(b"N;"),
        CacheValue::Bool(b) => {
            buf.extend_from_slice(if *b { b"b:1;" } else { b"b:0;" });
        }
        CacheValue::Int(i) => {
            buf.extend_from_slice(format!("i:{i};").as_bytes());
        }
        CacheValue::Float(f) => {
            buf.extend_from_slice(format!("d:{f};").as_bytes());
        }
        CacheValue::Str(s) => write_str(s.as_bytes(), buf),
        // `Bytes` nested inside a container is carried as a string payload;
        // it decodes back to `Str` when the payload is valid UTF-8.
        CacheValue::Bytes(b) => write_str(b, buf),
        CacheValue::List(items) => {
            buf.extend_from_slice(format!("a:{}:{{", items.len()).as_bytes());
            for (idx, item) in items.iter().enumerate() {
                buf.extend_from_slice(format!("i:{idx};").as_bytes());
                write_tagged(item, buf);
            }
            buf.push(b'}');
        }
        CacheValue::Map(entries) => {
            buf.extend_from_slice(format!("a:{}:{{", entries.len()).as_bytes());
            for (key, item) in entries {
                write_str(key.as_bytes(), buf);
                write_tagged(item, buf);
            }
            buf.push(b'}');
        }
        CacheValue::Record { name, fields } => {
            buf.extend_from_slice(
                format!("O:{}:\"{}\":{}:{{", name.len(), name, fields.len()).as_bytes(),
            );
            for (key, item) in fields {
                write_str(key.as_bytes(), buf);
                write_tagged(item, buf);
            }
            buf.push(b'}');
        }
    }
}

fn write_str(payload: &[u8], buf: &mut Vec<u8>) {
    buf.extend_from_slice(format!("s:{}:\"", payload.len()).as_bytes());
    buf.extend_from_slice(payload);
    buf.extend_from_slice(b"\";");
}

fn decode_tagged(data: &[u8]) -> CacheValue {
    let Ok(text) = std::str::from_utf8(data) else {
        return CacheValue::Bytes(data.to_vec());
    };

    let trimmed = text.trim();
    if !is_encoded(trimmed, true) {
        return CacheValue::Str(text.to_string());
    }

    let mut reader = TaggedReader {
        data: trimmed.as_bytes(),
        pos: 0,
    };
    match reader.read_value() {
        Some(value) if reader.pos == reader.data.len() => value,
        // Classified as encoded but did not parse cleanly: hand the input
        // back unmodified rather than guessing.
        _ => CacheValue::Str(text.to_string()),
    }
}

struct TaggedReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl TaggedReader<'_> {
    fn read_value(&mut self) -> Option<CacheValue> {
        match *self.data.get(self.pos)? {
            b'N' => {
                self.expect(b"N;")?;
                Some(CacheValue::Null)
            }
            b'b' => {
                self.expect(b"b:")?;
                let flag = *self.take(1)?.first()?;
                self.expect(b";")?;
                match flag {
                    b'0' => Some(CacheValue::Bool(false)),
                    b'1' => Some(CacheValue::Bool(true)),
                    _ => None,
                }
            }
            b'i' => {
                self.expect(b"i:")?;
                let digits = self.until(b';')?;
                Some(CacheValue::Int(digits.parse().ok()?))
            }
            b'd' => {
                self.expect(b"d:")?;
                let digits = self.until(b';')?;
                Some(CacheValue::Float(digits.parse().ok()?))
            }
            b's' => self.read_str(),
            b'a' => self.read_array(),
            b'O' => self.read_record(),
            _ => None,
        }
    }

    /// Reads `s:<len>:"<payload>";`. The length is in bytes; a payload that
    /// is not valid UTF-8 becomes `Bytes`.
    fn read_str(&mut self) -> Option<CacheValue> {
        self.expect(b"s:")?;
        let len: usize = self.until(b':')?.parse().ok()?;
        self.expect(b"\"")?;
        let payload = self.take(len)?;
        let value = match std::str::from_utf8(payload) {
            Ok(s) => CacheValue::Str(s.to_string()),
            Err(_) => CacheValue::Bytes(payload.to_vec()),
        };
        self.expect(b"\";")?;
        Some(value)
    }

    /// Reads `a:<n>:{...}`. Entries keyed `0..n` in order decode as a
    /// sequence, anything else as a mapping. An empty form is ambiguous and
    /// decodes as an empty sequence.
    fn read_array(&mut self) -> Option<CacheValue> {
        self.expect(b"a:")?;
        let count: usize = self.until(b':')?.parse().ok()?;
        self.expect(b"{")?;

        // The count comes off the wire; cap the pre-allocation at what the
        // remaining input could possibly hold and let the parse fail on its
        // own if the count lied.
        let mut entries = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            let key = self.read_value()?;
            let value = self.read_value()?;
            entries.push((key, value));
        }
        self.expect(b"}")?;

        let sequential = entries
            .iter()
            .enumerate()
            .all(|(idx, (key, _))| matches!(key, CacheValue::Int(i) if *i == idx as i64));

        if sequential {
            Some(CacheValue::List(
                entries.into_iter().map(|(_, value)| value).collect(),
            ))
        } else {
            let mut map = IndexMap::with_capacity(entries.len());
            for (key, value) in entries {
                let key = match key {
                    CacheValue::Str(s) => s,
                    CacheValue::Int(i) => i.to_string(),
                    _ => return None,
                };
                map.insert(key, value);
            }
            Some(CacheValue::Map(map))
        }
    }

    /// Reads `O:<len>:"<name>":<n>:{...}` with string-keyed fields.
    fn read_record(&mut self) -> Option<CacheValue> {
        self.expect(b"O:")?;
        let name_len: usize = self.until(b':')?.parse().ok()?;
        self.expect(b"\"")?;
        let name = std::str::from_utf8(self.take(name_len)?).ok()?.to_string();
        self.expect(b"\":")?;
        let count: usize = self.until(b':')?.parse().ok()?;
        self.expect(b"{")?;

        // Wire-supplied count, same capacity cap as `read_array`.
        let mut fields = IndexMap::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            let key = match self.read_value()? {
                CacheValue::Str(s) => s,
                _ => return None,
            };
            let value = self.read_value()?;
            fields.insert(key, value);
        }
        self.expect(b"}")?;
        Some(CacheValue::Record { name, fields })
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn expect(&mut self, token: &[u8]) -> Option<()> {
        if self.data[self.pos..].starts_with(token) {
            self.pos += token.len();
            Some(())
        } else {
            None
        }
    }

    fn take(&mut self, len: usize) -> Option<&[u8]> {
        let end = self.pos.checked_add(len)?;
        let slice = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn until(&mut self, delim: u8) -> Option<&str> {
        let rest = &self.data[self.pos..];
        let at = rest.iter().position(|&b| b == delim)?;
        let slice = std::str::from_utf8(&rest[..at]).ok()?;
        self.pos += at + 1;
        Some(slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged() -> Codec {
        Codec::new(CodecMode::Tagged)
    }

    fn sample_map() -> CacheValue {
        let mut map = IndexMap::new();
        map.insert("name".to_string(), CacheValue::from("ada"));
        map.insert("visits".to_string(), CacheValue::Int(3));
        CacheValue::Map(map)
    }

    #[test]
    fn test_scalar_round_trips() {
        let codec = tagged();
        for value in [
            CacheValue::Null,
            CacheValue::Bool(true),
            CacheValue::Bool(false),
            CacheValue::Int(-42),
            CacheValue::Float(1.5),
            CacheValue::from("plain text"),
        ] {
            let encoded = codec.encode(&value).unwrap();
            assert_eq!(codec.decode(&encoded), value);
        }
    }

    #[test]
    fn test_container_round_trips() {
        let codec = tagged();
        let list = CacheValue::List(vec![
            CacheValue::Int(1),
            CacheValue::from("two"),
            CacheValue::List(vec![CacheValue::Bool(false)]),
        ]);
        let encoded = codec.encode(&list).unwrap();
        assert_eq!(codec.decode(&encoded), list);

        let map = sample_map();
        let encoded = codec.encode(&map).unwrap();
        assert_eq!(codec.decode(&encoded), map);

        let mut fields = IndexMap::new();
        fields.insert("id".to_string(), CacheValue::Int(7));
        fields.insert("tags".to_string(), CacheValue::List(vec![]));
        let record = CacheValue::Record {
            name: "user".to_string(),
            fields,
        };
        let encoded = codec.encode(&record).unwrap();
        assert_eq!(codec.decode(&encoded), record);
    }

    #[test]
    fn test_plain_strings_are_not_double_encoded() {
        let codec = tagged();
        let encoded = codec.encode(&CacheValue::from("hello world")).unwrap();
        assert_eq!(encoded, b"hello world");
    }

    #[test]
    fn test_grammar_shaped_string_is_wrapped() {
        let codec = tagged();
        let tricky = CacheValue::from("i:5;");
        let encoded = codec.encode(&tricky).unwrap();
        assert_eq!(encoded, b"s:4:\"i:5;\";");
        assert_eq!(codec.decode(&encoded), tricky);
    }

    #[test]
    fn grammar_shaped_plain_string_decodes_as_encoded() {
        // Accepted limitation: foreign bytes that match the grammar are
        // treated as encoded data, not as a plain string.
        let codec = tagged();
        assert_eq!(codec.decode(b"s:5:\"hello\";"), CacheValue::from("hello"));
        assert_eq!(codec.decode(b"i:41;"), CacheValue::Int(41));
    }

    #[test]
    fn test_foreign_scalars_decode() {
        let codec = tagged();
        assert_eq!(codec.decode(b"b:1;"), CacheValue::Bool(true));
        assert_eq!(codec.decode(b"b:0;"), CacheValue::Bool(false));
        assert_eq!(codec.decode(b"N;"), CacheValue::Null);
        assert_eq!(codec.decode(b"d:-2.5;"), CacheValue::Float(-2.5));
    }

    #[test]
    fn test_non_finite_floats_round_trip() {
        let codec = tagged();
        for value in [
            CacheValue::Float(f64::INFINITY),
            CacheValue::Float(f64::NEG_INFINITY),
        ] {
            let encoded = codec.encode(&value).unwrap();
            assert_eq!(codec.decode(&encoded), value);
        }

        // NaN never compares equal, but it must still come back as a float.
        let encoded = codec.encode(&CacheValue::Float(f64::NAN)).unwrap();
        assert_eq!(encoded, b"d:NaN;");
        assert!(matches!(codec.decode(&encoded), CacheValue::Float(f) if f.is_nan()));
    }

    #[test]
    fn test_oversized_wire_count_is_rejected_not_allocated() {
        let codec = tagged();
        // A lying element count must fail the parse, not reserve memory.
        assert_eq!(
            codec.decode(b"a:99999999999999:{}"),
            CacheValue::from("a:99999999999999:{}")
        );
        assert_eq!(
            codec.decode(b"O:4:\"user\":99999999999999:{}"),
            CacheValue::from("O:4:\"user\":99999999999999:{}")
        );
    }

    #[test]
    fn test_nested_bytes_decode_as_str() {
        let codec = tagged();
        let list = CacheValue::List(vec![CacheValue::Bytes(b"hi".to_vec())]);
        let encoded = codec.encode(&list).unwrap();
        assert_eq!(
            codec.decode(&encoded),
            CacheValue::List(vec![CacheValue::from("hi")])
        );
    }

    #[test]
    fn test_malformed_input_returned_unmodified() {
        let codec = tagged();
        // Classifies as encoded (head shape matches) but does not parse.
        assert_eq!(
            codec.decode(b"a:2:{broken}"),
            CacheValue::from("a:2:{broken}")
        );
        // Truncated string payload.
        assert_eq!(
            codec.decode(b"s:10:\"oops\";"),
            CacheValue::from("s:10:\"oops\";")
        );
    }

    #[test]
    fn test_non_utf8_input_becomes_bytes() {
        let codec = tagged();
        let data = vec![0xff, 0xfe, 0x01];
        assert_eq!(codec.decode(&data), CacheValue::Bytes(data.clone()));
        // And bytes pass through encode untouched.
        assert_eq!(codec.encode(&CacheValue::Bytes(data.clone())).unwrap(), data);
    }

    #[test]
    fn test_is_encoded_classifier() {
        assert!(is_encoded("N;", true));
        assert!(is_encoded("i:42;", true));
        assert!(is_encoded("s:5:\"hello\";", true));
        assert!(is_encoded("a:0:{}", true));
        assert!(is_encoded("O:4:\"user\":0:{}", true));

        assert!(!is_encoded("hello", true));
        assert!(!is_encoded("i:", true));
        assert!(!is_encoded("x:42;", true));
        // Strict mode requires the terminator at the very end.
        assert!(!is_encoded("i:42; trailing", true));
        assert!(is_encoded("i:42; trailing", false));
        // Non-strict string form still needs a quote somewhere.
        assert!(!is_encoded("s:5:hello", false));
    }

    #[test]
    fn test_binary_mode_round_trip() {
        let codec = Codec::new(CodecMode::Binary);
        let value = sample_map();
        let encoded = codec.encode(&value).unwrap();
        assert_eq!(codec.decode(&encoded), value);
        // Garbage falls back to the raw value.
        assert_eq!(codec.decode(b"garbage"), CacheValue::from("garbage"));
    }

    #[test]
    fn test_passthrough_mode() {
        let codec = Codec::new(CodecMode::Passthrough);
        assert_eq!(codec.encode(&CacheValue::from("as-is")).unwrap(), b"as-is");
        assert_eq!(codec.encode(&CacheValue::Int(9)).unwrap(), b"9");
        assert!(codec.encode(&sample_map()).unwrap_err().is_codec());
        assert_eq!(codec.decode(b"as-is"), CacheValue::from("as-is"));
    }
}
