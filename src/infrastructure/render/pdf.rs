//! Renders the signed receipt as a single-page A4 PDF.
//!
//! With a TrueType font configured the text is written as a CID-keyed
//! embedded font so CJK renders correctly; without one it falls back to
//! built-in Helvetica and replaces non-Latin-1 characters with `?`.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use chrono::Datelike;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};
use thiserror::Error;
use tracing::warn;

use crate::domain::Submission;
use crate::infrastructure::render::font::{FontError, TrueTypeFont};
use crate::infrastructure::render::png::decode_png;

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;

const BOX_X: f32 = MARGIN;
const BOX_Y: f32 = 292.0;
const BOX_W: f32 = 450.0;
const BOX_H: f32 = 200.0;
const BOX_PADDING: f32 = 10.0;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Font(#[from] FontError),

    #[error("font file {0} unreadable: {1}")]
    FontIo(String, std::io::Error),

    #[error("pdf assembly failed: {0}")]
    Pdf(String),
}

/// Turns a validated submission into the artifact bytes that get stored
/// and mailed.
pub trait DocumentRenderer: Send + Sync {
    fn render(&self, submission: &Submission) -> Result<Vec<u8>, RenderError>;
}

pub struct PdfRenderer {
    font: Option<TrueTypeFont>,
}

impl PdfRenderer {
    pub fn new(font_path: Option<&Path>) -> Result<Self, RenderError> {
        let font = match font_path {
            Some(path) => {
                let data = std::fs::read(path)
                    .map_err(|e| RenderError::FontIo(path.display().to_string(), e))?;
                Some(TrueTypeFont::parse(data)?)
            }
            None => None,
        };
        Ok(Self { font })
    }

    /// Text width in points, for centering. The Helvetica fallback uses a
    /// flat half-em estimate, which is close enough for one title line.
    fn text_width(&self, text: &str, size: f32) -> f32 {
        match &self.font {
            Some(font) => text
                .chars()
                .map(|c| font.width_1000(font.glyph_id(c)) as f32 * size / 1000.0)
                .sum(),
            None => text.chars().count() as f32 * size * 0.5,
        }
    }

    /// Emit a text run at (x, y) and record which glyphs it used.
    fn show_text(
        &self,
        ops: &mut Vec<Operation>,
        used: &mut BTreeMap<u16, char>,
        x: f32,
        y: f32,
        size: f32,
        text: &str,
    ) {
        let string = match &self.font {
            Some(font) => {
                let mut codes = Vec::with_capacity(text.len() * 2);
                for c in text.chars() {
                    let glyph = font.glyph_id(c);
                    used.entry(glyph).or_insert(c);
                    codes.extend_from_slice(&glyph.to_be_bytes());
                }
                Object::String(codes, StringFormat::Hexadecimal)
            }
            None => {
                let bytes = text
                    .chars()
                    .map(|c| if (c as u32) < 0x100 { c as u8 } else { b'?' })
                    .collect::<Vec<u8>>();
                Object::String(bytes, StringFormat::Literal)
            }
        };

        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new(
            "Tf",
            vec![Object::Name(b"F1".to_vec()), Object::Real(size)],
        ));
        ops.push(Operation::new(
            "Td",
            vec![Object::Real(x), Object::Real(y)],
        ));
        ops.push(Operation::new("Tj", vec![string]));
        ops.push(Operation::new("ET", vec![]));
    }

    /// Build the font dictionary; a CID-keyed Type0 font when a TrueType
    /// file is configured, plain Helvetica otherwise.
    fn add_font(
        &self,
        doc: &mut Document,
        used: &BTreeMap<u16, char>,
    ) -> Result<(u32, u16), RenderError> {
        let font = match &self.font {
            Some(font) => font,
            None => {
                return Ok(doc.add_object(dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => "Helvetica",
                    "Encoding" => "WinAnsiEncoding",
                }));
            }
        };

        let scale = 1000.0 / f32::from(font.units_per_em.max(1));
        let to_1000 = |v: i16| (f32::from(v) * scale) as i64;

        let font_file = doc.add_object(Stream::new(
            dictionary! { "Length1" => font.data().len() as i64 },
            font.data().to_vec(),
        ));

        let descriptor = doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => "SignoffCJK",
            "Flags" => 4,
            "FontBBox" => vec![
                to_1000(font.bbox[0]).into(),
                to_1000(font.bbox[1]).into(),
                to_1000(font.bbox[2]).into(),
                to_1000(font.bbox[3]).into(),
            ],
            "ItalicAngle" => 0,
            "Ascent" => to_1000(font.ascent),
            "Descent" => to_1000(font.descent),
            "CapHeight" => to_1000(font.ascent),
            "StemV" => 80,
            "FontFile2" => font_file,
        });

        // Per-glyph widths for exactly the glyphs the page uses.
        let mut widths = Vec::with_capacity(used.len() * 2);
        for &glyph in used.keys() {
            widths.push(Object::Integer(i64::from(glyph)));
            widths.push(Object::Array(vec![Object::Integer(font.width_1000(glyph))]));
        }

        let descendant = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => "SignoffCJK",
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal("Identity"),
                "Supplement" => 0,
            },
            "FontDescriptor" => descriptor,
            "DW" => 1000,
            "W" => widths,
            "CIDToGIDMap" => "Identity",
        });

        let to_unicode = doc.add_object(Stream::new(
            dictionary! {},
            build_to_unicode_cmap(used).into_bytes(),
        ));

        Ok(doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => "SignoffCJK",
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![descendant.into()],
            "ToUnicode" => to_unicode,
        }))
    }

    /// Decode the signature PNG and register it as an image XObject,
    /// returning the draw operations that place it inside the box. A
    /// decode failure leaves the box empty rather than failing the page.
    fn add_signature_image(
        &self,
        doc: &mut Document,
        submission: &Submission,
        ops: &mut Vec<Operation>,
    ) -> Option<(u32, u16)> {
        let bytes = match submission.signature.decode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "signature not decodable, leaving box empty");
                return None;
            }
        };
        let image = match decode_png(&bytes) {
            Ok(image) => image,
            Err(e) => {
                warn!(error = %e, "signature not renderable, leaving box empty");
                return None;
            }
        };

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        let compressed = encoder
            .write_all(&image.data)
            .and_then(|_| encoder.finish())
            .ok()?;

        let xobject = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => image.width as i64,
                "Height" => image.height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            compressed,
        ));

        // Fit the image inside the box, centered, preserving aspect.
        let avail_w = BOX_W - 2.0 * BOX_PADDING;
        let avail_h = BOX_H - 2.0 * BOX_PADDING;
        let scale = (avail_w / image.width as f32).min(avail_h / image.height as f32);
        let draw_w = image.width as f32 * scale;
        let draw_h = image.height as f32 * scale;
        let dx = BOX_X + (BOX_W - draw_w) / 2.0;
        let dy = BOX_Y + (BOX_H - draw_h) / 2.0;

        ops.push(Operation::new("q", vec![]));
        ops.push(Operation::new(
            "cm",
            vec![
                Object::Real(draw_w),
                Object::Real(0.0),
                Object::Real(0.0),
                Object::Real(draw_h),
                Object::Real(dx),
                Object::Real(dy),
            ],
        ));
        ops.push(Operation::new("Do", vec![Object::Name(b"Im1".to_vec())]));
        ops.push(Operation::new("Q", vec![]));

        Some(xobject)
    }
}

impl DocumentRenderer for PdfRenderer {
    fn render(&self, submission: &Submission) -> Result<Vec<u8>, RenderError> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut ops = Vec::new();
        let mut used: BTreeMap<u16, char> = BTreeMap::new();

        let title = "線上簽收單";
        let title_size = 20.0;
        let title_x = (PAGE_WIDTH - self.text_width(title, title_size)) / 2.0;
        self.show_text(&mut ops, &mut used, title_x, PAGE_HEIGHT - 70.0, title_size, title);

        let when = submission.submitted_at;
        let date_line = format!(
            "{}年{:02}月{:02}日 {}",
            when.year(),
            when.month(),
            when.day(),
            when.format("%H:%M:%S"),
        );
        let lines = [
            format!("日期時間：{date_line}"),
            format!("姓名：{}", submission.submitter_name),
            format!("學號：{}", submission.identifier),
            format!("簽收項目：{}", submission.item_category),
            format!("Email：{}", submission.submitter_email),
        ];
        let mut y = PAGE_HEIGHT - 120.0;
        for line in &lines {
            self.show_text(&mut ops, &mut used, MARGIN, y, 12.0, line);
            y -= 30.0;
        }

        self.show_text(&mut ops, &mut used, MARGIN, PAGE_HEIGHT - 290.0, 12.0, "簽名：");
        self.show_text(
            &mut ops,
            &mut used,
            MARGIN,
            PAGE_HEIGHT - 320.0,
            12.0,
            "我已確認已簽收本次簽收項目",
        );

        ops.push(Operation::new(
            "re",
            vec![
                Object::Real(BOX_X),
                Object::Real(BOX_Y),
                Object::Real(BOX_W),
                Object::Real(BOX_H),
            ],
        ));
        ops.push(Operation::new("S", vec![]));

        let image_id = self.add_signature_image(&mut doc, submission, &mut ops);

        let font_id = self.add_font(&mut doc, &used)?;
        let mut resources = dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        };
        if let Some(image_id) = image_id {
            resources.set("XObject", dictionary! { "Im1" => image_id });
        }

        let content = Content { operations: ops };
        let content_bytes = content
            .encode()
            .map_err(|e| RenderError::Pdf(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content_bytes));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                0.into(),
                0.into(),
                Object::Real(PAGE_WIDTH),
                Object::Real(PAGE_HEIGHT),
            ],
            "Contents" => content_id,
            "Resources" => resources,
        });

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();

        let mut out = Vec::new();
        doc.save_to(&mut out)
            .map_err(|e| RenderError::Pdf(e.to_string()))?;
        Ok(out)
    }
}

/// ToUnicode CMap so copied text round-trips from CID codes back to
/// Unicode. bfchar blocks are capped at 100 entries as CMap requires.
fn build_to_unicode_cmap(used: &BTreeMap<u16, char>) -> String {
    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n\
         12 dict begin\n\
         begincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n\
         /CMapType 2 def\n\
         1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
    );

    let entries: Vec<(u16, char)> = used.iter().map(|(&g, &c)| (g, c)).collect();
    for chunk in entries.chunks(100) {
        cmap.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for (glyph, c) in chunk {
            let mut units = [0u16; 2];
            let encoded = c.encode_utf16(&mut units);
            cmap.push_str(&format!("<{glyph:04X}> <"));
            for unit in encoded {
                cmap.push_str(&format!("{unit:04X}"));
            }
            cmap.push_str(">\n");
        }
        cmap.push_str("endbfchar\n");
    }

    cmap.push_str("endcmap\nCMapName currentdict /CMap defineresource pop\nend\nend\n");
    cmap
}
