//! Character encoding detection and transcoding to UTF-8.
//!
//! Detection is a fixed decision tree: BOMs (longest first), null-byte
//! pattern heuristics for BOM-less UTF-16/32, UTF-8 validation, then the
//! single-byte fallbacks. Detection never fails; everything bottoms out at
//! Latin-1. Transcoding always allocates a fresh UTF-8 buffer; downstream
//! stages only ever see UTF-8 with the BOM consumed.

use encoding_rs::{UTF_16BE, UTF_16LE};
use velocsv_core::errors::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CharEncoding {
    Utf8,
    Utf8Bom,
    Utf16Le,
    Utf16Be,
    Utf32Le,
    Utf32Be,
    Latin1,
    Windows1252,
    Unknown,
}

impl CharEncoding {
    pub fn name(self) -> &'static str {
        match self {
            CharEncoding::Utf8 => "UTF-8",
            CharEncoding::Utf8Bom => "UTF-8 (BOM)",
            CharEncoding::Utf16Le => "UTF-16LE",
            CharEncoding::Utf16Be => "UTF-16BE",
            CharEncoding::Utf32Le => "UTF-32LE",
            CharEncoding::Utf32Be => "UTF-32BE",
            CharEncoding::Latin1 => "Latin-1",
            CharEncoding::Windows1252 => "Windows-1252",
            CharEncoding::Unknown => "Unknown",
        }
    }
}

/// Produced once per open; immutable thereafter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EncodingReport {
    pub encoding: CharEncoding,
    pub bom_length: usize,
    pub confidence: f32,
    pub needs_transcoding: bool,
}

/// Windows-1252 mapping for bytes 0x80-0x9F, which differ from Latin-1.
/// Zero entries are undefined bytes, replaced with U+FFFD.
const WINDOWS_1252_TABLE: [u32; 32] = [
    0x20AC, 0, 0x201A, 0x0192, 0x201E, 0x2026, 0x2020, 0x2021, //
    0x02C6, 0x2030, 0x0160, 0x2039, 0x0152, 0, 0x017D, 0, //
    0, 0x2018, 0x2019, 0x201C, 0x201D, 0x2022, 0x2013, 0x2014, //
    0x02DC, 0x2122, 0x0161, 0x203A, 0x0153, 0, 0x017E, 0x0178,
];

const HEURISTIC_PREFIX: usize = 256;
const WINDOWS_1252_SCAN: usize = 4096;

pub fn detect_encoding(data: &[u8]) -> EncodingReport {
    if data.is_empty() {
        return EncodingReport {
            encoding: CharEncoding::Utf8,
            bom_length: 0,
            confidence: 1.0,
            needs_transcoding: false,
        };
    }

    // BOMs, longest first so UTF-32LE is not mistaken for UTF-16LE.
    if data.len() >= 4 {
        if data[0] == 0xFF && data[1] == 0xFE && data[2] == 0x00 && data[3] == 0x00 {
            return bom_report(CharEncoding::Utf32Le, 4);
        }
        if data[0] == 0x00 && data[1] == 0x00 && data[2] == 0xFE && data[3] == 0xFF {
            return bom_report(CharEncoding::Utf32Be, 4);
        }
    }
    if data.len() >= 3 && data[0] == 0xEF && data[1] == 0xBB && data[2] == 0xBF {
        return EncodingReport {
            encoding: CharEncoding::Utf8Bom,
            bom_length: 3,
            confidence: 1.0,
            // BOM bytes are skipped in place; no fresh buffer needed.
            needs_transcoding: false,
        };
    }
    if data.len() >= 2 {
        if data[0] == 0xFF && data[1] == 0xFE {
            return bom_report(CharEncoding::Utf16Le, 2);
        }
        if data[0] == 0xFE && data[1] == 0xFF {
            return bom_report(CharEncoding::Utf16Be, 2);
        }
    }

    // No BOM. Null bytes are valid UTF-8 but strongly suggest a wide
    // encoding in text data, so check those patterns first.
    if data.len() >= 4 {
        let check = (data.len().min(HEURISTIC_PREFIX) / 4) * 4;
        let mut could_be_utf32_le = true;
        let mut could_be_utf32_be = true;
        for i in (0..check).step_by(4) {
            if data[i + 2] != 0 || data[i + 3] != 0 {
                could_be_utf32_le = false;
            }
            if data[i] != 0 || data[i + 1] != 0 {
                could_be_utf32_be = false;
            }
            if !could_be_utf32_le && !could_be_utf32_be {
                break;
            }
        }
        if could_be_utf32_le {
            return heuristic_report(CharEncoding::Utf32Le, 0.8);
        }
        if could_be_utf32_be {
            return heuristic_report(CharEncoding::Utf32Be, 0.8);
        }
    }

    if data.len() >= 2 {
        let check = (data.len().min(HEURISTIC_PREFIX) / 2) * 2;
        let mut null_even = 0usize;
        let mut null_odd = 0usize;
        for i in (0..check).step_by(2) {
            if data[i] == 0 {
                null_even += 1;
            }
            if data[i + 1] == 0 {
                null_odd += 1;
            }
        }
        let pairs = check / 2;
        if pairs > 0 {
            // ASCII-heavy UTF-16LE puts nulls on odd bytes, BE on even.
            if null_odd > pairs / 2 && null_even < pairs / 4 {
                return heuristic_report(CharEncoding::Utf16Le, 0.7);
            }
            if null_even > pairs / 2 && null_odd < pairs / 4 {
                return heuristic_report(CharEncoding::Utf16Be, 0.7);
            }
        }
    }

    if std::str::from_utf8(data).is_ok() {
        return EncodingReport {
            encoding: CharEncoding::Utf8,
            bom_length: 0,
            confidence: 1.0,
            needs_transcoding: false,
        };
    }

    // Single-byte encodings. The 0x80-0x9F range separates Windows-1252
    // from Latin-1.
    let scan = &data[..data.len().min(WINDOWS_1252_SCAN)];
    if scan.iter().any(|&b| (0x80..=0x9F).contains(&b)) {
        return heuristic_report(CharEncoding::Windows1252, 0.6);
    }

    heuristic_report(CharEncoding::Latin1, 0.5)
}

fn bom_report(encoding: CharEncoding, bom_length: usize) -> EncodingReport {
    EncodingReport {
        encoding,
        bom_length,
        confidence: 1.0,
        needs_transcoding: true,
    }
}

fn heuristic_report(encoding: CharEncoding, confidence: f32) -> EncodingReport {
    EncodingReport {
        encoding,
        bom_length: 0,
        confidence,
        needs_transcoding: true,
    }
}

/// Transcode `data` (including any BOM) to a fresh UTF-8 buffer.
///
/// Only call when `report.needs_transcoding`; UTF-8 inputs are used in
/// place. Fails with `Error::Encoding` if a non-empty input decodes to
/// nothing.
pub fn transcode_to_utf8(data: &[u8], report: &EncodingReport) -> Result<Vec<u8>> {
    let body = &data[report.bom_length..];
    let out = match report.encoding {
        CharEncoding::Utf8 | CharEncoding::Utf8Bom => body.to_vec(),
        CharEncoding::Utf16Le => decode_utf16(body, true),
        CharEncoding::Utf16Be => decode_utf16(body, false),
        CharEncoding::Utf32Le => decode_utf32(body, true),
        CharEncoding::Utf32Be => decode_utf32(body, false),
        CharEncoding::Latin1 => decode_latin1(body),
        CharEncoding::Windows1252 => decode_windows1252(body),
        CharEncoding::Unknown => {
            return Err(Error::Encoding("cannot transcode unknown encoding".into()))
        }
    };
    if out.is_empty() && !body.is_empty() {
        return Err(Error::Encoding(format!(
            "{} input produced no UTF-8 output",
            report.encoding.name()
        )));
    }
    Ok(out)
}

fn decode_utf16(body: &[u8], little_endian: bool) -> Vec<u8> {
    let codec = if little_endian { UTF_16LE } else { UTF_16BE };
    // The BOM was already stripped; malformed units become U+FFFD.
    let (text, _had_errors) = codec.decode_without_bom_handling(body);
    text.into_owned().into_bytes()
}

fn decode_utf32(body: &[u8], little_endian: bool) -> Vec<u8> {
    let mut out = String::with_capacity(body.len() / 4);
    for unit in body.chunks(4) {
        let cp = if unit.len() < 4 {
            // Truncated trailing unit.
            char::REPLACEMENT_CHARACTER as u32
        } else if little_endian {
            u32::from_le_bytes([unit[0], unit[1], unit[2], unit[3]])
        } else {
            u32::from_be_bytes([unit[0], unit[1], unit[2], unit[3]])
        };
        out.push(char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER));
    }
    out.into_bytes()
}

fn decode_latin1(body: &[u8]) -> Vec<u8> {
    let mut out = String::with_capacity(body.len());
    for &b in body {
        out.push(b as char);
    }
    out.into_bytes()
}

fn decode_windows1252(body: &[u8]) -> Vec<u8> {
    let mut out = String::with_capacity(body.len());
    for &b in body {
        let c = if (0x80..=0x9F).contains(&b) {
            match WINDOWS_1252_TABLE[(b - 0x80) as usize] {
                0 => char::REPLACEMENT_CHARACTER,
                cp => char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER),
            }
        } else {
            b as char
        };
        out.push(c);
    }
    out.into_bytes()
}
