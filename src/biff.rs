//! BIFF record stream primitives
//!
//! Cursor-driven iteration over the Workbook stream, CONTINUE stitching,
//! string decoding in either byte width, and the packed numeric encodings.

use std::cmp::min;

use encoding_rs::{Encoding, UTF_16LE};

use crate::utils::{read_u16, read_u32};
use crate::workbook::XlsError;

/// Record type of CONTINUE records
pub(crate) const CONTINUE: u16 = 0x003C;

/// Stream version, from the BOF record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Biff {
    Biff7,
    Biff8,
}

impl Biff {
    pub fn from_version(version: u16) -> Result<Biff, XlsError> {
        match version {
            0x0500 => Ok(Biff::Biff7),
            0x0600 => Ok(Biff::Biff8),
            v => Err(XlsError::InvalidVersion(v)),
        }
    }
}

/// Decodes BIFF strings according to the workbook code page.
///
/// BIFF8 strings carry a per-segment flag selecting compressed (single byte)
/// or full UTF-16 characters; BIFF7 strings are plain byte strings in the
/// code page declared by the CODEPAGE record.
pub(crate) struct XlsEncoding {
    encoding: &'static Encoding,
}

impl XlsEncoding {
    pub fn from_codepage(codepage: u16) -> Result<XlsEncoding, XlsError> {
        codepage::to_encoding(codepage)
            .map(|encoding| XlsEncoding { encoding })
            .ok_or(XlsError::InvalidCodePage(codepage))
    }

    /// Decodes up to `len` characters from `bytes` into `s`.
    ///
    /// `high_byte` is `None` for code-page byte strings, otherwise the
    /// current segment's width flag. Returns (characters, bytes) consumed.
    pub fn decode_to(
        &self,
        s: &mut String,
        len: usize,
        bytes: &[u8],
        high_byte: Option<bool>,
    ) -> (usize, usize) {
        match high_byte {
            None => {
                let l = min(len, bytes.len());
                let (d, _) = self.encoding.decode_without_bom_handling(&bytes[..l]);
                s.push_str(&d);
                (l, l)
            }
            Some(false) => {
                // compressed UTF-16: high bytes are implicit zeros
                let l = min(len, bytes.len());
                let wide: Vec<u8> = bytes[..l].iter().flat_map(|&b| [b, 0]).collect();
                let (d, _) = UTF_16LE.decode_without_bom_handling(&wide);
                s.push_str(&d);
                (l, l)
            }
            Some(true) => {
                let l = min(len, bytes.len() / 2);
                let (d, _) = UTF_16LE.decode_without_bom_handling(&bytes[..2 * l]);
                s.push_str(&d);
                (l, 2 * l)
            }
        }
    }
}

/// A BIFF record with its CONTINUE payloads attached
pub(crate) struct Record<'a> {
    pub typ: u16,
    pub data: &'a [u8],
    pub cont: Option<Vec<&'a [u8]>>,
}

impl<'a> Record<'a> {
    /// Swaps `data` for the next CONTINUE payload, if any remains.
    pub fn continue_record(&mut self) -> bool {
        match self.cont {
            None => false,
            Some(ref mut v) => {
                if v.is_empty() {
                    false
                } else {
                    self.data = v.remove(0);
                    true
                }
            }
        }
    }
}

pub(crate) struct RecordIter<'a> {
    stream: &'a [u8],
}

impl<'a> RecordIter<'a> {
    pub fn new(stream: &'a [u8]) -> RecordIter<'a> {
        RecordIter { stream }
    }
}

impl<'a> Iterator for RecordIter<'a> {
    type Item = Result<Record<'a>, XlsError>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.stream.len() < 4 {
            return if self.stream.is_empty() {
                None
            } else {
                Some(Err(XlsError::Len {
                    typ: "record header",
                    expected: 4,
                    found: self.stream.len(),
                }))
            };
        }
        let typ = read_u16(self.stream);
        let mut len = read_u16(&self.stream[2..]) as usize;
        if self.stream.len() < len + 4 {
            return Some(Err(XlsError::Len {
                typ: "record payload",
                expected: len + 4,
                found: self.stream.len(),
            }));
        }
        let (data, next) = self.stream.split_at(len + 4);
        self.stream = next;
        let data = &data[4..];

        // attach trailing CONTINUE payloads so string reads can stitch them
        let cont = if self.stream.len() > 4 && read_u16(self.stream) == CONTINUE {
            let mut cont = Vec::new();
            while self.stream.len() >= 4 && read_u16(self.stream) == CONTINUE {
                len = read_u16(&self.stream[2..]) as usize;
                if self.stream.len() < len + 4 {
                    return Some(Err(XlsError::Len {
                        typ: "continue payload",
                        expected: len + 4,
                        found: self.stream.len(),
                    }));
                }
                let (c, next) = self.stream.split_at(len + 4);
                cont.push(&c[4..]);
                self.stream = next;
            }
            Some(cont)
        } else {
            None
        };

        Some(Ok(Record { typ, data, cont }))
    }
}

/// Reads `len` characters, following CONTINUE boundaries.
///
/// For BIFF8 (`high_byte` is `Some`) every continued segment restates its
/// own width flag, so a string may switch between compressed and full
/// UTF-16 mid-way; decoding segment-wise keeps the result consistent.
pub(crate) fn read_dbcs(
    enc: &XlsEncoding,
    mut len: usize,
    r: &mut Record<'_>,
    mut high_byte: Option<bool>,
) -> Result<String, XlsError> {
    let mut s = String::with_capacity(len);
    while len > 0 {
        let (chars, bytes) = enc.decode_to(&mut s, len, r.data, high_byte);
        r.data = &r.data[bytes..];
        len -= chars;
        if len > 0 {
            if !r.continue_record() {
                return Err(XlsError::ContinueRecordTooShort);
            }
            if let Some(b) = high_byte.as_mut() {
                if r.data.is_empty() {
                    return Err(XlsError::ContinueRecordTooShort);
                }
                *b = r.data[0] & 0x1 != 0;
                r.data = &r.data[1..];
            }
        }
    }
    Ok(s)
}

/// Reads an XLUnicodeRichExtendedString (SST entries, LABEL and STRING
/// payloads), skipping formatting runs and extended data.
pub(crate) fn read_rich_extended_string(
    r: &mut Record<'_>,
    enc: &XlsEncoding,
) -> Result<String, XlsError> {
    if r.data.is_empty() && !r.continue_record() || r.data.len() < 3 {
        return Err(XlsError::Len {
            typ: "rich extended string",
            expected: 3,
            found: r.data.len(),
        });
    }

    let str_len = read_u16(r.data) as usize;
    let flags = r.data[2];
    r.data = &r.data[3..];
    let high_byte = flags & 0x1 != 0;
    let ext_st = flags & 0x4 != 0;
    let rich_st = flags & 0x8 != 0;

    let mut unused_len = 0;
    if rich_st {
        if r.data.len() < 2 {
            return Err(XlsError::Len {
                typ: "rich string formatting runs",
                expected: 2,
                found: r.data.len(),
            });
        }
        unused_len = 4 * read_u16(r.data) as usize;
        r.data = &r.data[2..];
    }
    if ext_st {
        if r.data.len() < 4 {
            return Err(XlsError::Len {
                typ: "extended string length",
                expected: 4,
                found: r.data.len(),
            });
        }
        unused_len += read_u32(r.data) as usize;
        r.data = &r.data[4..];
    }

    let s = read_dbcs(enc, str_len, r, Some(high_byte))?;

    while unused_len > 0 {
        if r.data.is_empty() && !r.continue_record() {
            return Err(XlsError::ContinueRecordTooShort);
        }
        let l = min(unused_len, r.data.len());
        r.data = &r.data[l..];
        unused_len -= l;
    }

    Ok(s)
}

/// Reads a length-byte-prefixed short string (sheet names).
pub(crate) fn read_short_string(
    r: &mut Record<'_>,
    enc: &XlsEncoding,
    biff: Biff,
) -> Result<String, XlsError> {
    if r.data.len() < 2 {
        return Err(XlsError::Len {
            typ: "short string",
            expected: 2,
            found: r.data.len(),
        });
    }
    let len = r.data[0] as usize;
    let high_byte = match biff {
        Biff::Biff8 => {
            let b = r.data[1] & 0x1 != 0;
            r.data = &r.data[2..];
            Some(b)
        }
        Biff::Biff7 => {
            r.data = &r.data[1..];
            None
        }
    };
    let mut s = String::with_capacity(len);
    enc.decode_to(&mut s, len, r.data, high_byte);
    Ok(s)
}

/// Reads a u16-length-prefixed byte string (BIFF7 cell strings).
pub(crate) fn read_byte_string(r: &mut Record<'_>, enc: &XlsEncoding) -> Result<String, XlsError> {
    if r.data.len() < 2 {
        return Err(XlsError::Len {
            typ: "byte string",
            expected: 2,
            found: r.data.len(),
        });
    }
    let len = read_u16(r.data) as usize;
    r.data = &r.data[2..];
    let mut s = String::with_capacity(len);
    enc.decode_to(&mut s, len, r.data, None);
    Ok(s)
}

/// Reconstructs a double from the packed 4-byte RK encoding.
///
/// Bit 0 scales by 0.01, bit 1 marks a shifted integer; otherwise the 30
/// significant bits form the high word of an IEEE-754 double with the low
/// mantissa bits zeroed.
pub(crate) fn rk_number(rk: u32) -> f64 {
    let d100 = rk & 0x1 != 0;
    let int = rk & 0x2 != 0;
    let v = if int {
        ((rk as i32) >> 2) as f64
    } else {
        f64::from_bits(((rk & 0xFFFF_FFFC) as u64) << 32)
    };
    if d100 {
        v / 100.0
    } else {
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoding() -> XlsEncoding {
        XlsEncoding::from_codepage(1200).unwrap()
    }

    fn record(typ: u16, payload: &[u8], cont: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&typ.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        out.extend_from_slice(payload);
        for c in cont {
            out.extend_from_slice(&CONTINUE.to_le_bytes());
            out.extend_from_slice(&(c.len() as u16).to_le_bytes());
            out.extend_from_slice(c);
        }
        out
    }

    #[test]
    fn rk_scaled_integer() {
        // integer 100 with the /100 flag: 1.00
        assert_eq!(rk_number((100 << 2) | 0x3), 1.0);
        // integer flag alone decodes the integer directly
        assert_eq!(rk_number(100 << 2), 100.0);
        assert_eq!(rk_number(((-25i32 as u32) << 2) | 0x2), -25.0);
    }

    #[test]
    fn rk_packed_float() {
        let packed = ((1.5f64.to_bits() >> 32) as u32) & 0xFFFF_FFFC;
        assert_eq!(rk_number(packed), 1.5);
        assert_eq!(rk_number(packed | 0x1), 0.015);
    }

    #[test]
    fn record_iteration_reports_truncation() {
        let mut stream = record(0x0203, &[0u8; 4], &[]);
        stream.truncate(6);
        let mut iter = RecordIter::new(&stream);
        assert!(matches!(
            iter.next(),
            Some(Err(XlsError::Len { typ: "record payload", .. }))
        ));
    }

    #[test]
    fn string_spanning_continue_ascii_then_wide() {
        // 10 chars: "hello" compressed, then " wörld" in UTF-16
        let mut payload = vec![11, 0, 0x0];
        payload.extend_from_slice(b"hello");
        let mut cont = vec![0x1];
        for c in " w\u{f6}rld".encode_utf16() {
            cont.extend_from_slice(&c.to_le_bytes());
        }
        let stream = record(0x00FC, &payload, &[&cont]);
        let mut iter = RecordIter::new(&stream);
        let mut r = iter.next().unwrap().unwrap();
        let s = read_rich_extended_string(&mut r, &encoding()).unwrap();
        assert_eq!(s, "hello w\u{f6}rld");
    }

    #[test]
    fn string_spanning_continue_wide_then_ascii() {
        let mut payload = vec![8, 0, 0x1];
        for c in "\u{e9}t\u{e9} ".encode_utf16() {
            payload.extend_from_slice(&c.to_le_bytes());
        }
        let mut cont = vec![0x0];
        cont.extend_from_slice(b"2026");
        let stream = record(0x00FC, &payload, &[&cont]);
        let mut iter = RecordIter::new(&stream);
        let mut r = iter.next().unwrap().unwrap();
        let s = read_rich_extended_string(&mut r, &encoding()).unwrap();
        assert_eq!(s, "\u{e9}t\u{e9} 2026");
    }

    #[test]
    fn missing_continuation_fails() {
        let mut payload = vec![20, 0, 0x0];
        payload.extend_from_slice(b"short");
        let stream = record(0x00FC, &payload, &[]);
        let mut iter = RecordIter::new(&stream);
        let mut r = iter.next().unwrap().unwrap();
        assert!(matches!(
            read_rich_extended_string(&mut r, &encoding()),
            Err(XlsError::ContinueRecordTooShort)
        ));
    }
}
