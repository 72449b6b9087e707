//! Hex and binary renderings of raw memory.
//!
//! Rows are appended to a staging buffer, so an oversized region is cut
//! short with the usual truncation marker instead of overrunning anything.

use crate::staging_buffer::StagingBuffer;

/// Bytes per hexdump row, shown as two halves of eight.
pub const HEX_ROW: usize = 16;

/// Bytes per bindump row.
pub const BIN_ROW: usize = 8;

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";
const HALF_WIDTH: usize = 3 * HEX_ROW / 2;

/// The byte itself when it is printable ASCII, `.` otherwise.
pub fn printable(byte: u8) -> u8 {
    if (0x20..0x7f).contains(&byte) {
        byte
    } else {
        b'.'
    }
}

/// Appends hexdump rows for `data`:
///
/// ```text
///        0  de ad be ef 00 01 02 03  41 42 43 44 45 46 47 48  |....ABCDEFGH|
/// ```
///
/// Each row is the decimal offset padded to 8 columns, two fields of eight
/// `xx ` cells, and the ASCII column between bars.
pub fn render_hex<const CAP: usize>(buffer: &mut StagingBuffer<CAP>, data: &[u8]) {
    for (row_index, row) in data.chunks(HEX_ROW).enumerate() {
        if buffer.is_truncated() {
            break;
        }

        let mut halves = [[b' '; HALF_WIDTH]; 2];
        let mut ascii = [b' '; HEX_ROW];

        for (i, &byte) in row.iter().enumerate() {
            let cell = (i % 8) * 3;
            let half = &mut halves[i / 8];
            half[cell] = HEX_DIGITS[(byte >> 4) as usize];
            half[cell + 1] = HEX_DIGITS[(byte & 0xf) as usize];
            ascii[i] = printable(byte);
        }

        buffer.append(format_args!("{:8}  ", row_index * HEX_ROW));
        buffer.push_bytes(&halves[0]);
        buffer.push_byte(b' ');
        buffer.push_bytes(&halves[1]);
        buffer.push_bytes(b" |");
        buffer.push_bytes(&ascii);
        buffer.push_bytes(b"|\n");
    }
}

/// Appends bindump rows for `data`: the offset, three spaces, then each byte
/// as eight `0`/`1` digits, most significant bit first, followed by a space.
pub fn render_bin<const CAP: usize>(buffer: &mut StagingBuffer<CAP>, data: &[u8]) {
    for (row_index, row) in data.chunks(BIN_ROW).enumerate() {
        if buffer.is_truncated() {
            break;
        }

        buffer.append(format_args!("{:8}   ", row_index * BIN_ROW));

        for &byte in row {
            let mut bits = [b' '; 9];
            for (k, digit) in bits[..8].iter_mut().enumerate() {
                *digit = if byte & (0x80 >> k) != 0 { b'1' } else { b'0' };
            }
            buffer.push_bytes(&bits);
        }

        buffer.push_byte(b'\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging_buffer::{RecordBuffer, TRUNCATION_MARKER};

    fn hex(data: &[u8]) -> String {
        let mut buffer = RecordBuffer::new();
        render_hex(&mut buffer, data);
        String::from_utf8(buffer.as_bytes().to_vec()).unwrap()
    }

    fn bin(data: &[u8]) -> String {
        let mut buffer = RecordBuffer::new();
        render_bin(&mut buffer, data);
        String::from_utf8(buffer.as_bytes().to_vec()).unwrap()
    }

    #[test]
    fn test_printable_range() {
        assert_eq!(printable(b' '), b' ');
        assert_eq!(printable(b'~'), b'~');
        assert_eq!(printable(b'A'), b'A');
        assert_eq!(printable(0x1f), b'.');
        assert_eq!(printable(0x7f), b'.');
        assert_eq!(printable(0xab), b'.');
        assert_eq!(printable(0), b'.');
    }

    #[test]
    fn test_hex_empty() {
        assert_eq!(hex(&[]), "");
    }

    #[test]
    fn test_hex_single_byte() {
        let expected = format!("{:8}  {:<24} {:<24} |{:<16}|\n", 0, "ab ", "", ".");
        assert_eq!(hex(&[0xab]), expected);
    }

    #[test]
    fn test_hex_full_row() {
        let data: Vec<u8> = (0x40..0x50).collect();
        let expected = format!(
            "{:8}  {:<24} {:<24} |{}|\n",
            0, "40 41 42 43 44 45 46 47 ", "48 49 4a 4b 4c 4d 4e 4f ", "@ABCDEFGHIJKLMNO"
        );
        assert_eq!(hex(&data), expected);
    }

    #[test]
    fn test_hex_row_offsets() {
        let data = [0u8; 40];
        let text = hex(&data);
        let offsets: Vec<&str> = text.lines().map(|l| l[..8].trim_start()).collect();
        assert_eq!(offsets, ["0", "16", "32"]);
        assert!(text.lines().last().unwrap().ends_with("|........        |"));
    }

    #[test]
    fn test_bin_single_byte() {
        assert_eq!(bin(&[0xb0]), format!("{:8}   10110000 \n", 0));
    }

    #[test]
    fn test_bin_rows() {
        let data = [0xffu8, 0x00, 0x01, 0x80, 0x55, 0xaa, 0x0f, 0xf0, 0x81];
        let text = bin(&data);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            format!(
                "{:8}   11111111 00000000 00000001 10000000 01010101 10101010 00001111 11110000 ",
                0
            )
        );
        assert_eq!(lines[1], format!("{:8}   10000001 ", 8));
    }

    #[test]
    fn test_large_region_truncates() {
        let data = vec![0x41u8; 64 * 1024];
        let hexed = hex(&data);
        let binned = bin(&data);

        for text in [hexed, binned] {
            assert!(text.ends_with(TRUNCATION_MARKER));
            assert_eq!(text.matches(TRUNCATION_MARKER).count(), 1);
            assert!(text.len() <= RecordBuffer::new().capacity() + TRUNCATION_MARKER.len());
        }
    }
}
