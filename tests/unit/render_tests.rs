use std::io::Write;

use base64::Engine;
use chrono::{FixedOffset, TimeZone};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use signoff::domain::{Submission, ValidationRules};
use signoff::infrastructure::render::{decode_png, DocumentRenderer, PdfRenderer, TrueTypeFont};

fn png_chunk(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    out.extend_from_slice(&[0u8; 4]);
    out
}

/// Incompressible RGB noise so the encoded PNG clears the signature
/// size floor.
fn noise_png(width: u32, height: u32) -> Vec<u8> {
    let mut ihdr = Vec::new();
    ihdr.extend_from_slice(&width.to_be_bytes());
    ihdr.extend_from_slice(&height.to_be_bytes());
    ihdr.extend_from_slice(&[8, 2, 0, 0, 0]);

    let mut state = 0x2545_F491u32;
    let mut scanlines = Vec::new();
    for _ in 0..height {
        scanlines.push(0u8); // filter: none
        for _ in 0..width * 3 {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            scanlines.push((state >> 24) as u8);
        }
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(&scanlines).unwrap();
    let idat = encoder.finish().unwrap();

    let mut png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    png.extend(png_chunk(b"IHDR", &ihdr));
    png.extend(png_chunk(b"IDAT", &idat));
    png.extend(png_chunk(b"IEND", &[]));
    png
}

fn submission_with_signature(png: &[u8]) -> Submission {
    let b64 = base64::engine::general_purpose::STANDARD.encode(png);
    Submission::new(
        "王小明",
        "J123456789",
        &format!("data:image/png;base64,{b64}"),
        "停車證",
        true,
        "student@nkust.edu.tw".to_string(),
        &ValidationRules::default(),
        FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 2, 3, 4, 5)
            .unwrap(),
    )
    .unwrap()
}

/// Minimal TrueType file: head, hhea, hmtx, maxp, and a format 4 cmap
/// mapping 'A'..='B' to glyphs 1..=2.
fn synthetic_font() -> Vec<u8> {
    let mut head = vec![0u8; 54];
    head[18..20].copy_from_slice(&1000u16.to_be_bytes());
    head[36..38].copy_from_slice(&(-50i16).to_be_bytes());
    head[38..40].copy_from_slice(&(-200i16).to_be_bytes());
    head[40..42].copy_from_slice(&1000i16.to_be_bytes());
    head[42..44].copy_from_slice(&800i16.to_be_bytes());

    let mut hhea = vec![0u8; 36];
    hhea[4..6].copy_from_slice(&800i16.to_be_bytes());
    hhea[6..8].copy_from_slice(&(-200i16).to_be_bytes());
    hhea[34..36].copy_from_slice(&3u16.to_be_bytes());

    let mut maxp = vec![0u8; 6];
    maxp[4..6].copy_from_slice(&3u16.to_be_bytes());

    let mut hmtx = Vec::new();
    for advance in [500u16, 600, 700] {
        hmtx.extend_from_slice(&advance.to_be_bytes());
        hmtx.extend_from_slice(&0i16.to_be_bytes());
    }

    let mut cmap = Vec::new();
    cmap.extend_from_slice(&0u16.to_be_bytes());
    cmap.extend_from_slice(&1u16.to_be_bytes());
    cmap.extend_from_slice(&3u16.to_be_bytes());
    cmap.extend_from_slice(&1u16.to_be_bytes());
    cmap.extend_from_slice(&12u32.to_be_bytes());
    cmap.extend_from_slice(&4u16.to_be_bytes());
    cmap.extend_from_slice(&32u16.to_be_bytes());
    cmap.extend_from_slice(&0u16.to_be_bytes());
    cmap.extend_from_slice(&4u16.to_be_bytes());
    cmap.extend_from_slice(&[0u8; 6]);
    cmap.extend_from_slice(&0x0042u16.to_be_bytes());
    cmap.extend_from_slice(&0xFFFFu16.to_be_bytes());
    cmap.extend_from_slice(&0u16.to_be_bytes());
    cmap.extend_from_slice(&0x0041u16.to_be_bytes());
    cmap.extend_from_slice(&0xFFFFu16.to_be_bytes());
    cmap.extend_from_slice(&0xFFC0u16.to_be_bytes());
    cmap.extend_from_slice(&1u16.to_be_bytes());
    cmap.extend_from_slice(&0u16.to_be_bytes());
    cmap.extend_from_slice(&0u16.to_be_bytes());

    let tables: [([u8; 4], &[u8]); 5] = [
        (*b"cmap", &cmap),
        (*b"head", &head),
        (*b"hhea", &hhea),
        (*b"hmtx", &hmtx),
        (*b"maxp", &maxp),
    ];

    let mut font = Vec::new();
    font.extend_from_slice(&0x0001_0000u32.to_be_bytes());
    font.extend_from_slice(&(tables.len() as u16).to_be_bytes());
    font.extend_from_slice(&[0u8; 6]);
    let mut offset = 12 + tables.len() * 16;
    for (tag, content) in &tables {
        font.extend_from_slice(tag);
        font.extend_from_slice(&0u32.to_be_bytes());
        font.extend_from_slice(&(offset as u32).to_be_bytes());
        font.extend_from_slice(&(content.len() as u32).to_be_bytes());
        offset += content.len();
    }
    for (_, content) in &tables {
        font.extend_from_slice(content);
    }
    font
}

#[test]
fn test_truetype_parse_roundtrip() {
    let font = TrueTypeFont::parse(synthetic_font()).unwrap();
    assert_eq!(font.units_per_em, 1000);
    assert_eq!(font.glyph_id('A'), 1);
    assert_eq!(font.glyph_id('B'), 2);
    assert_eq!(font.glyph_id('Z'), 0);
    assert_eq!(font.width_1000(1), 600);
}

#[test]
fn test_png_decoder_handles_noise_image() {
    let png = noise_png(64, 64);
    assert!(png.len() >= 10_000);
    let image = decode_png(&png).unwrap();
    assert_eq!((image.width, image.height), (64, 64));
    assert_eq!(image.data.len(), 64 * 64 * 3);
}

#[test]
fn test_fallback_render_embeds_image() {
    let renderer = PdfRenderer::new(None).unwrap();
    let pdf = renderer.render(&submission_with_signature(&noise_png(64, 64))).unwrap();

    assert!(pdf.starts_with(b"%PDF-1.5"));
    assert!(find_bytes(&pdf, b"/XObject").is_some());
    assert!(find_bytes(&pdf, b"/Helvetica").is_some());
}

#[test]
fn test_fallback_render_survives_broken_signature_image() {
    // valid base64, not a PNG; the page renders with an empty box
    let renderer = PdfRenderer::new(None).unwrap();
    let garbage = vec![0xABu8; 12_000];
    let pdf = renderer.render(&submission_with_signature(&garbage)).unwrap();

    assert!(pdf.starts_with(b"%PDF-1.5"));
    assert!(find_bytes(&pdf, b"/XObject").is_none());
}

#[test]
fn test_configured_font_produces_cid_font() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&synthetic_font()).unwrap();
    file.flush().unwrap();

    let renderer = PdfRenderer::new(Some(file.path())).unwrap();
    let pdf = renderer.render(&submission_with_signature(&noise_png(64, 64))).unwrap();

    assert!(pdf.starts_with(b"%PDF-1.5"));
    assert!(find_bytes(&pdf, b"/CIDFontType2").is_some());
    assert!(find_bytes(&pdf, b"/Identity-H").is_some());
    assert!(find_bytes(&pdf, b"/FontFile2").is_some());
    assert!(find_bytes(&pdf, b"/ToUnicode").is_some());
}

#[test]
fn test_missing_font_file_is_an_error() {
    let result = PdfRenderer::new(Some(std::path::Path::new("/nonexistent/font.ttf")));
    assert!(result.is_err());
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
