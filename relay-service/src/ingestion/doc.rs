//! Legacy Word (.doc, Word 97-2003) text extraction.
//!
//! The characters live in the `WordDocument` stream of the compound file.
//! The piece table (stored in the `0Table` or `1Table` stream) maps character
//! positions to byte offsets in that stream, and records for each piece
//! whether it is stored as 8-bit cp1252 or as UTF-16LE.

use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::error::ProcessingError;

const WORD_IDENT: u16 = 0xA5EC;
const FLAG_ENCRYPTED: u16 = 0x0100;
const FLAG_WHICH_TABLE: u16 = 0x0200;

/// Size of FibBase, after which the variable-length FIB sections start
const FIB_BASE_LEN: usize = 32;
/// Position of ccpText in FibRgLw97
const CCP_TEXT_INDEX: usize = 3;
/// Position of the fcClx/lcbClx pair in FibRgFcLcb97
const CLX_PAIR_INDEX: usize = 33;

const FC_COMPRESSED: u32 = 0x4000_0000;
const FC_MASK: u32 = 0x3FFF_FFFF;

const CLXT_PRC: u8 = 0x01;
const CLXT_PCDT: u8 = 0x02;
const PCD_LEN: usize = 8;

/// Characters 0x80-0x9F of cp1252; everything else in a compressed piece is
/// Latin-1.
const CP1252_HIGH: [char; 32] = [
    '\u{20AC}', '\u{0081}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{008D}', '\u{017D}', '\u{008F}',
    '\u{0090}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\u{009D}', '\u{017E}', '\u{0178}',
];

/// The parts of the File Information Block needed to find the text
#[derive(Debug, PartialEq)]
struct Fib {
    table_stream: &'static str,
    ccp_text: u32,
    fc_clx: u32,
    lcb_clx: u32,
}

/// A run of characters with a single storage encoding
#[derive(Debug, PartialEq)]
struct Piece {
    cp_start: u32,
    cp_end: u32,
    /// Byte offset in the WordDocument stream
    offset: u32,
    compressed: bool,
}

/// Extract the main document text of a .doc file.
pub fn extract_doc(path: &Path) -> Result<String, ProcessingError> {
    let mut compound = cfb::open(path).map_err(|e| ProcessingError::extraction("doc", e))?;

    let word = read_stream(&mut compound, "/WordDocument")?;
    let fib = parse_fib(&word)?;
    let table = read_stream(&mut compound, fib.table_stream)?;

    let clx_start = fib.fc_clx as usize;
    let clx = table
        .get(clx_start..clx_start + fib.lcb_clx as usize)
        .ok_or_else(|| ProcessingError::extraction("doc", "piece table outside table stream"))?;
    let pieces = parse_clx(clx)?;

    debug!(
        pieces = pieces.len(),
        characters = fib.ccp_text,
        table = fib.table_stream,
        "Word piece table parsed"
    );

    let raw = decode_pieces(&word, &pieces, fib.ccp_text)?;
    Ok(clean_text(&raw))
}

fn read_stream<F: Read + std::io::Seek>(
    compound: &mut cfb::CompoundFile<F>,
    name: &str,
) -> Result<Vec<u8>, ProcessingError> {
    let mut stream = compound
        .open_stream(name)
        .map_err(|e| ProcessingError::extraction("doc", format!("{}: {}", name, e)))?;
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).map_err(ProcessingError::Io)?;
    Ok(buf)
}

fn parse_fib(word: &[u8]) -> Result<Fib, ProcessingError> {
    if read_u16(word, 0)? != WORD_IDENT {
        return Err(ProcessingError::extraction(
            "doc",
            "not a Word 97-2003 document",
        ));
    }

    let flags = read_u16(word, 0x0A)?;
    if flags & FLAG_ENCRYPTED != 0 {
        return Err(ProcessingError::extraction("doc", "document is encrypted"));
    }

    let csw = read_u16(word, FIB_BASE_LEN)? as usize;
    let cslw_at = FIB_BASE_LEN + 2 + csw * 2;
    let cslw = read_u16(word, cslw_at)? as usize;
    let rg_lw = cslw_at + 2;
    let cb_rg_fc_lcb_at = rg_lw + cslw * 4;
    let cb_rg_fc_lcb = read_u16(word, cb_rg_fc_lcb_at)? as usize;
    let rg_fc_lcb = cb_rg_fc_lcb_at + 2;

    if cslw <= CCP_TEXT_INDEX || cb_rg_fc_lcb <= CLX_PAIR_INDEX {
        return Err(ProcessingError::extraction("doc", "file information block too short"));
    }

    Ok(Fib {
        table_stream: if flags & FLAG_WHICH_TABLE != 0 {
            "/1Table"
        } else {
            "/0Table"
        },
        ccp_text: read_u32(word, rg_lw + CCP_TEXT_INDEX * 4)?,
        fc_clx: read_u32(word, rg_fc_lcb + CLX_PAIR_INDEX * 8)?,
        lcb_clx: read_u32(word, rg_fc_lcb + CLX_PAIR_INDEX * 8 + 4)?,
    })
}

fn parse_clx(clx: &[u8]) -> Result<Vec<Piece>, ProcessingError> {
    let mut pos = 0;

    // Property modifiers come first; only the piece table matters here.
    while clx.get(pos) == Some(&CLXT_PRC) {
        let cb = read_u16(clx, pos + 1)? as usize;
        pos += 3 + cb;
    }

    if clx.get(pos) != Some(&CLXT_PCDT) {
        return Err(ProcessingError::extraction("doc", "piece table not found"));
    }

    let lcb = read_u32(clx, pos + 1)? as usize;
    let plc = clx
        .get(pos + 5..pos + 5 + lcb)
        .ok_or_else(|| ProcessingError::extraction("doc", "truncated piece table"))?;

    if lcb < 4 || (lcb - 4) % (4 + PCD_LEN) != 0 {
        return Err(ProcessingError::extraction("doc", "malformed piece table"));
    }

    let count = (lcb - 4) / (4 + PCD_LEN);
    let descriptors = (count + 1) * 4;

    (0..count)
        .map(|i| {
            let fc = read_u32(plc, descriptors + i * PCD_LEN + 2)?;
            let compressed = fc & FC_COMPRESSED != 0;
            Ok(Piece {
                cp_start: read_u32(plc, i * 4)?,
                cp_end: read_u32(plc, (i + 1) * 4)?,
                offset: if compressed {
                    (fc & FC_MASK) / 2
                } else {
                    fc & FC_MASK
                },
                compressed,
            })
        })
        .collect()
}

/// Decode the pieces covering the first `ccp_text` characters (the main
/// document; footnotes, headers and comments follow it).
fn decode_pieces(word: &[u8], pieces: &[Piece], ccp_text: u32) -> Result<String, ProcessingError> {
    let mut text = String::new();

    for piece in pieces {
        if piece.cp_start >= ccp_text {
            break;
        }
        let count = piece.cp_end.min(ccp_text).saturating_sub(piece.cp_start) as usize;
        let start = piece.offset as usize;
        let width = if piece.compressed { 1 } else { 2 };

        let bytes = word
            .get(start..start + count * width)
            .ok_or_else(|| ProcessingError::extraction("doc", "piece outside document stream"))?;

        if piece.compressed {
            text.extend(bytes.iter().map(|&b| cp1252_char(b)));
        } else {
            let units = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
            text.extend(
                char::decode_utf16(units).map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER)),
            );
        }
    }

    Ok(text)
}

fn cp1252_char(byte: u8) -> char {
    match byte {
        0x80..=0x9F => CP1252_HIGH[(byte - 0x80) as usize],
        b => b as char,
    }
}

/// Map Word's in-band control characters to plain text.
///
/// Paragraph, line and page breaks become newlines, cell marks become tabs,
/// and for fields only the displayed result is kept (the field code between
/// 0x13 and 0x14 is dropped).
fn clean_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    // One entry per open field: true while still inside its code part.
    let mut fields: Vec<bool> = Vec::new();

    for c in raw.chars() {
        match c {
            '\u{13}' => {
                fields.push(true);
                continue;
            }
            '\u{14}' => {
                if let Some(in_code) = fields.last_mut() {
                    *in_code = false;
                }
                continue;
            }
            '\u{15}' => {
                fields.pop();
                continue;
            }
            _ => {}
        }

        if fields.iter().any(|&in_code| in_code) {
            continue;
        }

        match c {
            '\r' | '\u{0B}' | '\u{0C}' => out.push('\n'),
            '\u{07}' | '\t' => out.push('\t'),
            '\u{1E}' => out.push('-'),
            '\u{A0}' => out.push(' '),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }

    out
}

fn read_u16(buf: &[u8], offset: usize) -> Result<u16, ProcessingError> {
    buf.get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| ProcessingError::extraction("doc", "unexpected end of data"))
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32, ProcessingError> {
    buf.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| ProcessingError::extraction("doc", "unexpected end of data"))
}
