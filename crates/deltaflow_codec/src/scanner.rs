//! Byte-level JSON scanner over a blocking reader.
//!
//! The scanner never looks further ahead than one byte, so the parser
//! can stop at any point without having consumed input it did not use.

use crate::error::{CodecError, CodecResult};
use std::io::{self, BufRead, BufReader, Read};

/// Maximum nesting depth of a scanned value.
/// Bounds the closer stack for untrusted input.
pub(crate) const MAX_DEPTH: usize = 128;

/// Destination of the bytes of a scanned value.
pub(crate) enum Sink<'a> {
    /// Bytes are dropped (structural skip).
    Discard,
    /// Bytes are appended to the buffer.
    Keep(&'a mut Vec<u8>),
}

impl Sink<'_> {
    #[inline]
    fn push(&mut self, byte: u8) {
        if let Sink::Keep(buf) = self {
            buf.push(byte);
        }
    }
}

/// A JSON scanner reading from a byte stream.
pub(crate) struct Scanner<R> {
    inner: BufReader<R>,
    offset: u64,
}

impl<R: Read> Scanner<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            offset: 0,
        }
    }

    /// Number of bytes consumed so far.
    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }

    fn peek(&mut self) -> CodecResult<Option<u8>> {
        loop {
            match self.inner.fill_buf() {
                Ok(buf) => return Ok(buf.first().copied()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    #[inline]
    fn bump(&mut self) {
        self.inner.consume(1);
        self.offset += 1;
    }

    fn next_byte(&mut self) -> CodecResult<Option<u8>> {
        let byte = self.peek()?;
        if byte.is_some() {
            self.bump();
        }
        Ok(byte)
    }

    /// Skips whitespace and returns the next byte without consuming it.
    pub(crate) fn peek_token(&mut self) -> CodecResult<Option<u8>> {
        while let Some(byte) = self.peek()? {
            if !is_whitespace(byte) {
                return Ok(Some(byte));
            }
            self.bump();
        }
        Ok(None)
    }

    /// Skips whitespace and consumes the next byte.
    pub(crate) fn next_token(&mut self) -> CodecResult<Option<u8>> {
        let byte = self.peek_token()?;
        if byte.is_some() {
            self.bump();
        }
        Ok(byte)
    }

    /// Consumes the expected delimiter or fails with `MalformedStructure`.
    pub(crate) fn expect(&mut self, expected: u8, what: &str) -> CodecResult<()> {
        match self.next_token()? {
            Some(byte) if byte == expected => Ok(()),
            Some(byte) => Err(CodecError::malformed(format!(
                "{what} not found: unexpected '{}' at offset {}",
                char::from(byte),
                self.offset - 1
            ))),
            None => Err(CodecError::malformed(format!(
                "{what} not found: unexpected end of input"
            ))),
        }
    }

    /// Scans one complete JSON value.
    ///
    /// Containers are scanned by balanced delimiter counting; their inner
    /// grammar is left to whoever decodes the kept bytes.
    pub(crate) fn scan_value(&mut self, mut sink: Sink<'_>) -> CodecResult<()> {
        match self.peek_token()? {
            Some(b'"') => self.scan_string(&mut sink),
            Some(b'{' | b'[') => self.scan_container(&mut sink),
            Some(byte) if is_scalar_byte(byte) => self.scan_scalar(&mut sink),
            Some(byte) => Err(self.unexpected(byte)),
            None => Err(CodecError::malformed(
                "expected a value: unexpected end of input",
            )),
        }
    }

    fn scan_string(&mut self, sink: &mut Sink<'_>) -> CodecResult<()> {
        self.bump();
        sink.push(b'"');
        loop {
            match self.next_byte()? {
                Some(b'\\') => {
                    sink.push(b'\\');
                    let escaped = self.next_byte()?.ok_or_else(unterminated_string)?;
                    sink.push(escaped);
                }
                Some(b'"') => {
                    sink.push(b'"');
                    return Ok(());
                }
                Some(byte) => sink.push(byte),
                None => return Err(unterminated_string()),
            }
        }
    }

    fn scan_container(&mut self, sink: &mut Sink<'_>) -> CodecResult<()> {
        let mut closers: Vec<u8> = Vec::new();
        loop {
            let byte = self.peek()?.ok_or_else(|| {
                CodecError::malformed("unterminated object or array: unexpected end of input")
            })?;
            match byte {
                b'"' => {
                    self.scan_string(sink)?;
                    continue;
                }
                b'{' | b'[' => {
                    if closers.len() >= MAX_DEPTH {
                        return Err(CodecError::malformed(format!(
                            "nesting deeper than {MAX_DEPTH} levels at offset {}",
                            self.offset
                        )));
                    }
                    closers.push(if byte == b'{' { b'}' } else { b']' });
                }
                b'}' | b']' => {
                    if closers.pop() != Some(byte) {
                        return Err(self.unexpected(byte));
                    }
                }
                _ => {}
            }
            self.bump();
            sink.push(byte);
            if closers.is_empty() {
                return Ok(());
            }
        }
    }

    fn scan_scalar(&mut self, sink: &mut Sink<'_>) -> CodecResult<()> {
        let start = self.offset;
        let mut token = Vec::new();
        while let Some(byte) = self.peek()? {
            if !is_scalar_byte(byte) {
                break;
            }
            self.bump();
            token.push(byte);
        }

        if !is_literal(&token) && !is_number(&token) {
            return Err(CodecError::malformed(format!(
                "invalid literal '{}' at offset {start}",
                String::from_utf8_lossy(&token)
            )));
        }
        for byte in token {
            sink.push(byte);
        }
        Ok(())
    }

    fn unexpected(&self, byte: u8) -> CodecError {
        CodecError::malformed(format!(
            "unexpected '{}' at offset {}",
            char::from(byte),
            self.offset
        ))
    }
}

fn unterminated_string() -> CodecError {
    CodecError::malformed("unterminated string: unexpected end of input")
}

#[inline]
fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r')
}

/// Bytes that may start or continue a bare token. The token is validated as a
/// whole once it ends.
#[inline]
fn is_scalar_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'+' | b'.')
}

fn is_literal(token: &[u8]) -> bool {
    matches!(token, b"true" | b"false" | b"null")
}

/// `-?(0|[1-9][0-9]*)(\.[0-9]+)?([eE][+-]?[0-9]+)?`
fn is_number(token: &[u8]) -> bool {
    fn digits(bytes: &[u8]) -> usize {
        bytes.iter().take_while(|b| b.is_ascii_digit()).count()
    }

    let mut rest = token.strip_prefix(b"-").unwrap_or(token);
    match rest.first() {
        Some(b'0') => rest = &rest[1..],
        Some(b'1'..=b'9') => rest = &rest[digits(rest)..],
        _ => return false,
    }
    if let Some(fraction) = rest.strip_prefix(b".") {
        let n = digits(fraction);
        if n == 0 {
            return false;
        }
        rest = &fraction[n..];
    }
    if let Some(exponent) = rest.strip_prefix(b"e").or_else(|| rest.strip_prefix(b"E")) {
        let exponent = exponent
            .strip_prefix(b"+")
            .or_else(|| exponent.strip_prefix(b"-"))
            .unwrap_or(exponent);
        let n = digits(exponent);
        if n == 0 {
            return false;
        }
        rest = &exponent[n..];
    }
    rest.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(input: &str) -> CodecResult<(String, u64)> {
        let mut scanner = Scanner::new(input.as_bytes());
        let mut buf = Vec::new();
        scanner.scan_value(Sink::Keep(&mut buf))?;
        Ok((String::from_utf8(buf).unwrap(), scanner.offset()))
    }

    #[test]
    fn scans_nested_containers() {
        let (value, _) = scan(r#" {"a":[1,{"b":"]}"}],"c":null} , 5"#).unwrap();
        assert_eq!(value, r#"{"a":[1,{"b":"]}"}],"c":null}"#);
    }

    #[test]
    fn scans_escaped_quotes() {
        let (value, _) = scan(r#""say \"hi\"" tail"#).unwrap();
        assert_eq!(value, r#""say \"hi\"""#);
    }

    #[test]
    fn scalar_stops_before_delimiter() {
        let (value, offset) = scan("-12.5e3,").unwrap();
        assert_eq!(value, "-12.5e3");
        assert_eq!(offset, 7);
    }

    #[test]
    fn accepts_literals_and_numbers() {
        let inputs = [
            "true",
            "false",
            "null",
            "0",
            "-0.5E+3",
            "10e-2",
            "123456789012345678901234567890",
        ];
        for input in inputs {
            let (value, _) = scan(&format!("{input} ,")).unwrap();
            assert_eq!(value, input);
        }
    }

    #[test]
    fn bare_words_are_malformed() {
        let inputs = [
            "abc,", "tru", "nul}", "TRUE", "01", "1.", ".5", "1e", "-", "+1", "0x10",
        ];
        for input in inputs {
            let err = scan(input).unwrap_err();
            assert!(
                matches!(err, CodecError::MalformedStructure { .. }),
                "{input}: {err}"
            );
        }
        let err = scan("abc,").unwrap_err();
        assert!(err.to_string().contains("invalid literal 'abc' at offset 0"));
    }

    #[test]
    fn mismatched_closer_is_malformed() {
        assert!(matches!(
            scan(r#"{"a":[1}"#),
            Err(CodecError::MalformedStructure { .. })
        ));
    }

    #[test]
    fn truncated_container_is_malformed() {
        assert!(matches!(
            scan(r#"{"a":[1,2"#),
            Err(CodecError::MalformedStructure { .. })
        ));
        assert!(matches!(
            scan(r#""open"#),
            Err(CodecError::MalformedStructure { .. })
        ));
    }

    #[test]
    fn depth_is_bounded() {
        let deep = "[".repeat(MAX_DEPTH + 1);
        let err = scan(&deep).unwrap_err();
        assert!(err.to_string().contains("nesting deeper"));
    }

    #[test]
    fn discard_consumes_value() {
        let mut scanner = Scanner::new(&b"[1, [2, 3]] ,"[..]);
        scanner.scan_value(Sink::Discard).unwrap();
        assert_eq!(scanner.next_token().unwrap(), Some(b','));
    }

    #[test]
    fn expect_reports_offset() {
        let mut scanner = Scanner::new(&b"  x"[..]);
        let err = scanner.expect(b'{', "object start delimiter").unwrap_err();
        assert!(err.to_string().contains("object start delimiter not found"));
        assert!(err.to_string().contains("offset 2"));
    }
}
