//! Just enough TrueType parsing to embed a font as a CID-keyed PDF font:
//! character-to-glyph mapping (`cmap` formats 4 and 12), advance widths
//! (`hhea`/`hmtx`) and the global metrics the FontDescriptor needs
//! (`head`, `maxp`).

use std::collections::HashMap;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FontError {
    #[error("not a TrueType font")]
    BadMagic,

    #[error("font table {0} missing")]
    MissingTable(&'static str),

    #[error("font data truncated")]
    Truncated,

    #[error("no usable cmap subtable")]
    NoCmap,
}

fn read_u16(data: &[u8], off: usize) -> Result<u16, FontError> {
    data.get(off..off + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or(FontError::Truncated)
}

fn read_i16(data: &[u8], off: usize) -> Result<i16, FontError> {
    read_u16(data, off).map(|v| v as i16)
}

fn read_u32(data: &[u8], off: usize) -> Result<u32, FontError> {
    data.get(off..off + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(FontError::Truncated)
}

enum CmapSubtable {
    Format4 { offset: usize },
    Format12 { offset: usize },
}

pub struct TrueTypeFont {
    data: Vec<u8>,
    pub units_per_em: u16,
    pub ascent: i16,
    pub descent: i16,
    /// xMin, yMin, xMax, yMax in font units.
    pub bbox: [i16; 4],
    advances: Vec<u16>,
    cmap: CmapSubtable,
}

impl TrueTypeFont {
    pub fn parse(data: Vec<u8>) -> Result<Self, FontError> {
        let version = read_u32(&data, 0)?;
        if version != 0x0001_0000 && version != u32::from_be_bytes(*b"true") {
            return Err(FontError::BadMagic);
        }

        let num_tables = read_u16(&data, 4)? as usize;
        let mut tables: HashMap<[u8; 4], usize> = HashMap::new();
        for i in 0..num_tables {
            let rec = 12 + i * 16;
            let tag = data.get(rec..rec + 4).ok_or(FontError::Truncated)?;
            let offset = read_u32(&data, rec + 8)? as usize;
            tables.insert([tag[0], tag[1], tag[2], tag[3]], offset);
        }
        let table = |tag: &[u8; 4], name: &'static str| -> Result<usize, FontError> {
            tables.get(tag).copied().ok_or(FontError::MissingTable(name))
        };

        let head = table(b"head", "head")?;
        let units_per_em = read_u16(&data, head + 18)?;
        let bbox = [
            read_i16(&data, head + 36)?,
            read_i16(&data, head + 38)?,
            read_i16(&data, head + 40)?,
            read_i16(&data, head + 42)?,
        ];

        let hhea = table(b"hhea", "hhea")?;
        let ascent = read_i16(&data, hhea + 4)?;
        let descent = read_i16(&data, hhea + 6)?;
        let num_hmetrics = read_u16(&data, hhea + 34)? as usize;

        let hmtx = table(b"hmtx", "hmtx")?;
        let mut advances = Vec::with_capacity(num_hmetrics);
        for i in 0..num_hmetrics {
            advances.push(read_u16(&data, hmtx + i * 4)?);
        }
        if advances.is_empty() {
            return Err(FontError::MissingTable("hmtx"));
        }

        let cmap = Self::pick_cmap(&data, table(b"cmap", "cmap")?)?;

        Ok(Self {
            data,
            units_per_em,
            ascent,
            descent,
            bbox,
            advances,
            cmap,
        })
    }

    /// Prefer a format 12 subtable (full Unicode range), fall back to
    /// format 4 (BMP only).
    fn pick_cmap(data: &[u8], cmap_off: usize) -> Result<CmapSubtable, FontError> {
        let num_records = read_u16(data, cmap_off + 2)? as usize;
        let mut format4 = None;
        let mut format12 = None;
        for i in 0..num_records {
            let rec = cmap_off + 4 + i * 8;
            let sub_off = cmap_off + read_u32(data, rec + 4)? as usize;
            match read_u16(data, sub_off)? {
                4 if format4.is_none() => format4 = Some(sub_off),
                12 if format12.is_none() => format12 = Some(sub_off),
                _ => {}
            }
        }
        if let Some(offset) = format12 {
            return Ok(CmapSubtable::Format12 { offset });
        }
        if let Some(offset) = format4 {
            return Ok(CmapSubtable::Format4 { offset });
        }
        Err(FontError::NoCmap)
    }

    /// Glyph id for a character; 0 (.notdef) when unmapped.
    pub fn glyph_id(&self, c: char) -> u16 {
        let code = c as u32;
        let glyph = match self.cmap {
            CmapSubtable::Format4 { offset } => lookup_format4(&self.data, offset, code),
            CmapSubtable::Format12 { offset } => lookup_format12(&self.data, offset, code),
        };
        glyph.unwrap_or(0)
    }

    /// Advance width in font units. Glyphs past the hmtx array reuse the
    /// last entry, as TrueType defines for monospaced tails.
    pub fn advance(&self, glyph: u16) -> u16 {
        let i = (glyph as usize).min(self.advances.len() - 1);
        self.advances[i]
    }

    /// Advance width in 1/1000 em (PDF text space units).
    pub fn width_1000(&self, glyph: u16) -> i64 {
        i64::from(self.advance(glyph)) * 1000 / i64::from(self.units_per_em.max(1))
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

fn lookup_format4(data: &[u8], off: usize, code: u32) -> Option<u16> {
    if code > 0xFFFF {
        return None;
    }
    let seg_x2 = read_u16(data, off + 6).ok()? as usize;
    let seg_count = seg_x2 / 2;
    let end_base = off + 14;
    let start_base = end_base + seg_x2 + 2; // skip reservedPad
    let delta_base = start_base + seg_x2;
    let range_base = delta_base + seg_x2;

    for i in 0..seg_count {
        let end = read_u16(data, end_base + i * 2).ok()? as u32;
        if code > end {
            continue;
        }
        let start = read_u16(data, start_base + i * 2).ok()? as u32;
        if code < start {
            return None;
        }
        let delta = read_u16(data, delta_base + i * 2).ok()?;
        let range_offset = read_u16(data, range_base + i * 2).ok()? as usize;
        let glyph = if range_offset == 0 {
            (code as u16).wrapping_add(delta)
        } else {
            let idx = range_base + i * 2 + range_offset + (code - start) as usize * 2;
            let indexed = read_u16(data, idx).ok()?;
            if indexed == 0 {
                return None;
            }
            indexed.wrapping_add(delta)
        };
        return (glyph != 0).then_some(glyph);
    }
    None
}

fn lookup_format12(data: &[u8], off: usize, code: u32) -> Option<u16> {
    let n_groups = read_u32(data, off + 12).ok()? as usize;
    for i in 0..n_groups {
        let group = off + 16 + i * 12;
        let start = read_u32(data, group).ok()?;
        let end = read_u32(data, group + 4).ok()?;
        if code < start {
            return None; // groups are sorted
        }
        if code <= end {
            let glyph = read_u32(data, group + 8).ok()? + (code - start);
            return u16::try_from(glyph).ok().filter(|&g| g != 0);
        }
    }
    None
}
