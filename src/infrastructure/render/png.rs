//! Minimal PNG decoder for signature images coming off a browser canvas:
//! 8-bit grayscale, gray+alpha, RGB and RGBA, non-interlaced. Alpha is
//! composited over white since the rendered page is white.

use std::io::Read;

use flate2::read::ZlibDecoder;
use thiserror::Error;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const MAX_DIMENSION: u32 = 10_000;

#[derive(Error, Debug)]
pub enum PngError {
    #[error("not a PNG image")]
    BadSignature,

    #[error("PNG data truncated")]
    Truncated,

    #[error("unsupported PNG: {0}")]
    Unsupported(String),

    #[error("corrupt PNG: {0}")]
    Corrupt(String),
}

/// Decoded image, tightly packed 8-bit RGB rows.
pub struct RgbImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

struct Header {
    width: u32,
    height: u32,
    color_type: u8,
}

impl Header {
    /// Samples per pixel for the supported color types.
    fn channels(&self) -> usize {
        match self.color_type {
            0 => 1,
            2 => 3,
            4 => 2,
            _ => 4,
        }
    }
}

pub fn decode_png(bytes: &[u8]) -> Result<RgbImage, PngError> {
    if bytes.len() < 8 || bytes[..8] != PNG_SIGNATURE {
        return Err(PngError::BadSignature);
    }

    let mut header: Option<Header> = None;
    let mut compressed = Vec::new();
    let mut pos = 8;
    while pos + 8 <= bytes.len() {
        let len = u32::from_be_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]])
            as usize;
        let kind = [bytes[pos + 4], bytes[pos + 5], bytes[pos + 6], bytes[pos + 7]];
        let data_start = pos + 8;
        let data_end = data_start.checked_add(len).ok_or(PngError::Truncated)?;
        if data_end + 4 > bytes.len() {
            return Err(PngError::Truncated);
        }
        let data = &bytes[data_start..data_end];

        match &kind {
            b"IHDR" => {
                if len < 13 {
                    return Err(PngError::Corrupt("short IHDR".to_string()));
                }
                let width = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
                let height = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
                let depth = data[8];
                let color_type = data[9];
                let interlace = data[12];

                if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
                    return Err(PngError::Corrupt(format!("bad dimensions {width}x{height}")));
                }
                if depth != 8 {
                    return Err(PngError::Unsupported(format!("bit depth {depth}")));
                }
                if !matches!(color_type, 0 | 2 | 4 | 6) {
                    return Err(PngError::Unsupported(format!("color type {color_type}")));
                }
                if interlace != 0 {
                    return Err(PngError::Unsupported("interlaced".to_string()));
                }
                header = Some(Header {
                    width,
                    height,
                    color_type,
                });
            }
            b"IDAT" => compressed.extend_from_slice(data),
            b"IEND" => break,
            _ => {}
        }
        pos = data_end + 4; // skip CRC
    }

    let header = header.ok_or(PngError::Truncated)?;
    if compressed.is_empty() {
        return Err(PngError::Corrupt("no image data".to_string()));
    }

    let mut raw = Vec::new();
    ZlibDecoder::new(compressed.as_slice())
        .read_to_end(&mut raw)
        .map_err(|e| PngError::Corrupt(format!("inflate failed: {e}")))?;

    let channels = header.channels();
    let stride = header.width as usize * channels;
    let expected = (stride + 1) * header.height as usize;
    if raw.len() < expected {
        return Err(PngError::Truncated);
    }

    // Undo the per-scanline filters in place over a previous-row buffer.
    let mut prev = vec![0u8; stride];
    let mut pixels = Vec::with_capacity(stride * header.height as usize);
    for y in 0..header.height as usize {
        let line_start = y * (stride + 1);
        let filter = raw[line_start];
        let mut line = raw[line_start + 1..line_start + 1 + stride].to_vec();
        match filter {
            0 => {}
            1 => {
                for i in channels..stride {
                    line[i] = line[i].wrapping_add(line[i - channels]);
                }
            }
            2 => {
                for i in 0..stride {
                    line[i] = line[i].wrapping_add(prev[i]);
                }
            }
            3 => {
                for i in 0..stride {
                    let left = if i >= channels { line[i - channels] } else { 0 };
                    let avg = ((left as u16 + prev[i] as u16) / 2) as u8;
                    line[i] = line[i].wrapping_add(avg);
                }
            }
            4 => {
                for i in 0..stride {
                    let left = if i >= channels { line[i - channels] } else { 0 };
                    let up_left = if i >= channels { prev[i - channels] } else { 0 };
                    line[i] = line[i].wrapping_add(paeth(left, prev[i], up_left));
                }
            }
            other => {
                return Err(PngError::Corrupt(format!("filter type {other}")));
            }
        }
        pixels.extend_from_slice(&line);
        prev = line;
    }

    Ok(to_rgb(&header, &pixels))
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Expand to RGB, compositing any alpha channel over white.
fn to_rgb(header: &Header, pixels: &[u8]) -> RgbImage {
    let count = header.width as usize * header.height as usize;
    let mut data = Vec::with_capacity(count * 3);
    let blend = |c: u8, a: u8| -> u8 {
        ((c as u32 * a as u32 + 255 * (255 - a as u32)) / 255) as u8
    };
    match header.color_type {
        0 => {
            for &g in pixels {
                data.extend_from_slice(&[g, g, g]);
            }
        }
        4 => {
            for px in pixels.chunks_exact(2) {
                let g = blend(px[0], px[1]);
                data.extend_from_slice(&[g, g, g]);
            }
        }
        2 => data.extend_from_slice(pixels),
        _ => {
            for px in pixels.chunks_exact(4) {
                let a = px[3];
                data.extend_from_slice(&[blend(px[0], a), blend(px[1], a), blend(px[2], a)]);
            }
        }
    }
    RgbImage {
        width: header.width,
        height: header.height,
        data,
    }
}
