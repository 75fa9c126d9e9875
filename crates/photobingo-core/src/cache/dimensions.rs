//! Image header sniffing for cache size estimates.
//!
//! Only the header is read; nothing is decoded.

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Bytes per decoded pixel (RGBA)
pub const BYTES_PER_PIXEL: u64 = 4;

/// Width and height of a PNG, GIF or JPEG image, if the header is readable.
pub fn image_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.starts_with(PNG_SIGNATURE) {
        png_dimensions(bytes)
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        gif_dimensions(bytes)
    } else if bytes.starts_with(&[0xFF, 0xD8]) {
        jpeg_dimensions(bytes)
    } else {
        None
    }
}

/// Estimated decoded size; the encoded length when dimensions are unknown.
pub fn decoded_size_estimate(bytes: &[u8]) -> u64 {
    match image_dimensions(bytes) {
        Some((w, h)) => u64::from(w) * u64::from(h) * BYTES_PER_PIXEL,
        None => bytes.len() as u64,
    }
}

fn be_u16(bytes: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_be_bytes([*bytes.get(at)?, *bytes.get(at + 1)?]))
}

fn png_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.get(12..16)? != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes(bytes.get(16..20)?.try_into().ok()?);
    let height = u32::from_be_bytes(bytes.get(20..24)?.try_into().ok()?);
    Some((width, height))
}

fn gif_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    let width = u16::from_le_bytes([*bytes.get(6)?, *bytes.get(7)?]);
    let height = u16::from_le_bytes([*bytes.get(8)?, *bytes.get(9)?]);
    Some((u32::from(width), u32::from(height)))
}

fn jpeg_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    let mut i = 2;
    while i + 1 < bytes.len() {
        if bytes[i] != 0xFF {
            return None;
        }
        let marker = bytes[i + 1];
        // Fill bytes
        if marker == 0xFF {
            i += 1;
            continue;
        }
        // Standalone markers carry no length
        if marker == 0x01 || (0xD0..=0xD9).contains(&marker) {
            i += 2;
            continue;
        }
        let length = usize::from(be_u16(bytes, i + 2)?);
        let is_frame_header =
            (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_frame_header {
            let height = be_u16(bytes, i + 5)?;
            let width = be_u16(bytes, i + 7)?;
            return Some((u32::from(width), u32::from(height)));
        }
        i += 2 + length;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::png_header;

    #[test]
    fn test_png_dimensions() {
        assert_eq!(image_dimensions(&png_header(640, 480)), Some((640, 480)));
        assert_eq!(decoded_size_estimate(&png_header(10, 10)), 400);
    }

    #[test]
    fn test_gif_dimensions() {
        let mut bytes = b"GIF89a".to_vec();
        bytes.extend_from_slice(&[0x20, 0x03, 0x58, 0x02]);
        assert_eq!(image_dimensions(&bytes), Some((800, 600)));
    }

    #[test]
    fn test_jpeg_dimensions_skip_app_segments() {
        let mut bytes = vec![0xFF, 0xD8];
        // APP0 segment, 16 bytes including the length field
        bytes.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
        bytes.extend_from_slice(&[0u8; 14]);
        // SOF0: length, precision, height 0x01E0, width 0x0280
        bytes.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 0x08, 0x01, 0xE0, 0x02, 0x80]);
        assert_eq!(image_dimensions(&bytes), Some((640, 480)));
    }

    #[test]
    fn test_unknown_format_falls_back_to_length() {
        let bytes = b"definitely not an image";
        assert_eq!(image_dimensions(bytes), None);
        assert_eq!(decoded_size_estimate(bytes), bytes.len() as u64);
    }

    #[test]
    fn test_truncated_png_is_unknown() {
        let bytes = &png_header(1, 1)[..18];
        assert_eq!(image_dimensions(bytes), None);
    }
}
