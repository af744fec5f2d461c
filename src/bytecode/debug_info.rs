//! Debug line table codec
//!
//! Each function's line table is a run-length encoded stream of control bytes.
//! The decoder keeps a current file and current line across the whole
//! function and produces one [`DebugLine`] per instruction.
//!
//! ```text
//! xxxxxxx1 yyyyyyyy   set file = (x << 8) | y
//! ddcccc10            repeat current line for c ops, then line += d
//! lllll100            line += l, one op
//! lllll000 b2 b3      line = l | b2 << 5 | b3 << 13, one op
//! ```

use tracing::trace;

use super::error::{DecodeErrorKind, DecodeResult};
use super::module::DebugLine;
use super::reader::ByteReader;

const SET_FILE: u8 = 0x01;
const REPEAT: u8 = 0x02;
const SMALL_DELTA: u8 = 0x04;

/// Longest run a single repeat record can express
const MAX_REPEAT: usize = 15;
/// Largest delta carried by a repeat record
const MAX_REPEAT_DELTA: u32 = 3;
/// Largest delta carried by a small-delta record
const MAX_SMALL_DELTA: u32 = 31;

/// Decode the line table of a function with `op_count` instructions
pub fn read_debug_lines(
    r: &mut ByteReader<'_>,
    function: u32,
    op_count: usize,
    file_count: usize,
) -> DecodeResult<Vec<DebugLine>> {
    let mut lines = Vec::with_capacity(op_count);
    let mut file = 0usize;
    let mut line = 0u32;

    while lines.len() < op_count {
        let c = r.read_u8()?;
        if c & SET_FILE != 0 {
            let low = r.read_u8()? as usize;
            file = (((c >> 1) as usize) << 8) | low;
            if file >= file_count {
                return Err(r.error(DecodeErrorKind::InvalidDebugFile {
                    file,
                    count: file_count,
                }));
            }
        } else if c & REPEAT != 0 {
            let delta = (c >> 6) as u32;
            let count = ((c >> 2) & 0x0F) as usize;
            if lines.len() + count > op_count {
                return Err(r.error(DecodeErrorKind::DebugLineOverflow {
                    function,
                    at: lines.len(),
                    count,
                    total: op_count,
                }));
            }
            lines.extend(std::iter::repeat(DebugLine { file, line }).take(count));
            line += delta;
        } else if c & SMALL_DELTA != 0 {
            line += (c >> 3) as u32;
            lines.push(DebugLine { file, line });
        } else {
            let b2 = r.read_u8()? as u32;
            let b3 = r.read_u8()? as u32;
            line = ((c >> 3) as u32) | (b2 << 5) | (b3 << 13);
            lines.push(DebugLine { file, line });
        }
    }

    trace!(target: "hlbridge::decode::debug", function, ops = op_count, "Decoded line table");
    Ok(lines)
}

/// Encode a line table so that [`read_debug_lines`] reproduces it exactly
///
/// Files must be below 2^15 and lines below 2^21, the limits of the format.
pub fn write_debug_lines(out: &mut Vec<u8>, lines: &[DebugLine]) {
    let mut file = 0usize;
    let mut line = 0u32;
    let mut i = 0;

    while i < lines.len() {
        let entry = lines[i];
        if entry.file != file {
            out.push((((entry.file >> 8) as u8) << 1) | SET_FILE);
            out.push((entry.file & 0xFF) as u8);
            file = entry.file;
        }

        if entry.line == line {
            let mut count = 1;
            while count < MAX_REPEAT
                && i + count < lines.len()
                && lines[i + count] == entry
            {
                count += 1;
            }
            // Fold a small step to the next line into the run when possible
            let delta = match lines.get(i + count) {
                Some(next) if next.file == file && next.line > line && next.line - line <= MAX_REPEAT_DELTA => {
                    next.line - line
                }
                _ => 0,
            };
            out.push(REPEAT | ((count as u8) << 2) | ((delta as u8) << 6));
            line += delta;
            i += count;
        } else if entry.line > line && entry.line - line <= MAX_SMALL_DELTA {
            out.push(SMALL_DELTA | (((entry.line - line) as u8) << 3));
            line = entry.line;
            i += 1;
        } else {
            out.push(((entry.line & 0x1F) as u8) << 3);
            out.push(((entry.line >> 5) & 0xFF) as u8);
            out.push(((entry.line >> 13) & 0xFF) as u8);
            line = entry.line;
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dl(file: usize, line: u32) -> DebugLine {
        DebugLine { file, line }
    }

    #[test]
    fn test_decode_each_record_kind() {
        let bytes = [
            0x01, 0x01, // file 1
            0x00 | (10 << 3), 0x00, 0x00, // absolute line 10
            0x04 | (2 << 3), // line += 2 -> 12
            0x02 | (3 << 2) | (1 << 6), // 3 ops at 12, then line 13
            0x04, // line += 0 -> 13
        ];
        let mut r = ByteReader::new(&bytes);
        let lines = read_debug_lines(&mut r, 0, 6, 2).unwrap();
        assert_eq!(
            lines,
            vec![dl(1, 10), dl(1, 12), dl(1, 12), dl(1, 12), dl(1, 12), dl(1, 13)]
        );
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_repeat_past_end_is_rejected() {
        let bytes = [0x02 | (5 << 2)];
        let mut r = ByteReader::new(&bytes);
        let err = read_debug_lines(&mut r, 7, 3, 1).unwrap_err();
        assert!(matches!(
            err.kind,
            DecodeErrorKind::DebugLineOverflow { function: 7, count: 5, total: 3, .. }
        ));
    }

    #[test]
    fn test_unknown_file_is_rejected() {
        let bytes = [0x01, 0x04];
        let mut r = ByteReader::new(&bytes);
        let err = read_debug_lines(&mut r, 0, 1, 2).unwrap_err();
        assert!(matches!(err.kind, DecodeErrorKind::InvalidDebugFile { file: 4, count: 2 }));
    }

    #[test]
    fn test_encode_decode_mixed_table() {
        let lines = vec![
            dl(0, 1),
            dl(0, 1),
            dl(0, 2),
            dl(0, 40),
            dl(1, 40),
            dl(1, 3),
            dl(1, 70_000),
            dl(2, 70_001),
            dl(2, 70_001),
            dl(2, 70_001),
        ];
        let mut bytes = Vec::new();
        write_debug_lines(&mut bytes, &lines);
        let mut r = ByteReader::new(&bytes);
        let decoded = read_debug_lines(&mut r, 0, lines.len(), 3).unwrap();
        assert_eq!(decoded, lines);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_long_runs_split() {
        let lines = vec![dl(0, 5); 40];
        let mut bytes = Vec::new();
        write_debug_lines(&mut bytes, &lines);
        let mut r = ByteReader::new(&bytes);
        assert_eq!(read_debug_lines(&mut r, 0, 40, 1).unwrap(), lines);
    }
}
