//! Font, style (XF) and color tables built during the globals pass
//!
//! Every cell references an XF record; the XF resolves the number format
//! (and its date/number classification), the font, alignment, fill and
//! borders used by display-oriented consumers.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::warn;
use serde::Serialize;

use crate::biff::{Biff, Record, XlsEncoding};
use crate::formats::{
    builtin_date_format, builtin_number_format, is_date_format, parse_date_format, DateToken,
};
use crate::utils::{read_u16, read_u32};
use crate::workbook::XlsError;

/// A font from the workbook FONT table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Font {
    /// Height in points
    pub height: f64,
    /// Bold flag (weight 700)
    pub bold: bool,
    /// Italic flag
    pub italic: bool,
    /// Underline flag
    pub underline: bool,
    /// Palette index of the font color
    pub color: u16,
    /// Typeface name
    pub name: String,
}

/// Horizontal alignment of a cell style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Alignment {
    /// No explicit alignment
    #[default]
    General,
    /// Centered
    Center,
    /// Right aligned
    Right,
}

/// Border line style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum BorderStyle {
    /// No border
    #[default]
    None,
    /// Thin line
    Thin,
    /// Medium line
    Medium,
    /// Dashed line
    Dashed,
    /// Dotted line
    Dotted,
    /// Thick line
    Thick,
    /// Double line
    Double,
    /// Hairline
    Hair,
    /// Medium dashed line
    MediumDashed,
    /// Thin dash-dotted line
    ThinDashDotted,
    /// Medium dash-dotted line
    MediumDashDotted,
    /// Thin dash-dot-dotted line
    ThinDashDotDotted,
    /// Medium dash-dot-dotted line
    MediumDashDotDotted,
    /// Slanted medium dash-dotted line
    SlantedMediumDashDotted,
}

impl BorderStyle {
    fn from_nibble(n: u32) -> BorderStyle {
        match n & 0xF {
            0x01 => BorderStyle::Thin,
            0x02 => BorderStyle::Medium,
            0x03 => BorderStyle::Dashed,
            0x04 => BorderStyle::Dotted,
            0x05 => BorderStyle::Thick,
            0x06 => BorderStyle::Double,
            0x07 => BorderStyle::Hair,
            0x08 => BorderStyle::MediumDashed,
            0x09 => BorderStyle::ThinDashDotted,
            0x0A => BorderStyle::MediumDashDotted,
            0x0B => BorderStyle::ThinDashDotDotted,
            0x0C => BorderStyle::MediumDashDotDotted,
            0x0D => BorderStyle::SlantedMediumDashDotted,
            _ => BorderStyle::None,
        }
    }

    /// Whether the border draws anything.
    pub fn is_visible(&self) -> bool {
        *self != BorderStyle::None
    }
}

/// One border side: line style plus palette color index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BorderSide {
    /// Line style
    pub style: BorderStyle,
    /// Palette index of the border color
    pub color: u16,
}

/// The four borders of a cell style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Borders {
    /// Left border
    pub left: BorderSide,
    /// Right border
    pub right: BorderSide,
    /// Top border
    pub top: BorderSide,
    /// Bottom border
    pub bottom: BorderSide,
}

/// Number-format classification of a style.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CellFormat {
    /// General or text contents
    Other,
    /// Date or time, with its normalized render pattern
    DateTime(Arc<[DateToken]>),
    /// Numeric, with its format code
    Number(Arc<str>),
}

/// A decoded extended format (XF) record: one cell style.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct XfRecord {
    /// Referenced number-format id
    pub format_id: u16,
    /// Font table index, already adjusted for the reserved slot
    pub font: usize,
    /// Horizontal alignment
    pub align: Alignment,
    /// Fill pattern code, 0 when unfilled
    pub fill_pattern: u8,
    /// Background color palette index, only meaningful when filled
    pub background: Option<u16>,
    /// Cell borders
    pub borders: Borders,
    /// Derived number-format classification
    pub format: CellFormat,
}

/// The indexed color table, overridable by a PALETTE record.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Palette {
    custom: BTreeMap<u16, String>,
}

impl Palette {
    /// Resolves a palette index to an `#RRGGBB` string.
    pub fn color(&self, index: u16) -> Option<&str> {
        self.custom
            .get(&index)
            .map(String::as_str)
            .or_else(|| builtin_color(index))
    }

    fn set(&mut self, index: u16, rgb: [u8; 3]) {
        self.custom
            .insert(index, format!("#{:02X}{:02X}{:02X}", rgb[0], rgb[1], rgb[2]));
    }
}

/// Style tables accumulated over the globals pass.
#[derive(Default)]
pub(crate) struct Styles {
    pub fonts: Vec<Font>,
    pub formats: BTreeMap<u16, String>,
    pub xfs: Vec<XfRecord>,
    pub palette: Palette,
}

impl Styles {
    /// FONT record: height, option flags, color, weight, underline, name.
    pub fn parse_font(
        &mut self,
        r: &mut Record<'_>,
        enc: &XlsEncoding,
        biff: Biff,
    ) -> Result<(), XlsError> {
        if r.data.len() < 16 {
            return Err(XlsError::Len {
                typ: "font record",
                expected: 16,
                found: r.data.len(),
            });
        }
        let height = read_u16(r.data) as f64 / 20.0;
        let options = read_u16(&r.data[2..]);
        let color = read_u16(&r.data[4..]);
        let weight = read_u16(&r.data[6..]);
        let underline = r.data[10] != 0;
        let name_len = r.data[14] as usize;
        let mut name = String::with_capacity(name_len);
        match biff {
            Biff::Biff8 => {
                let high_byte = r.data[15] & 0x1 != 0;
                enc.decode_to(&mut name, name_len, &r.data[16..], Some(high_byte));
            }
            Biff::Biff7 => {
                enc.decode_to(&mut name, name_len, &r.data[15..], None);
            }
        }
        self.fonts.push(Font {
            height,
            bold: weight == 700,
            italic: options & 0x2 != 0,
            underline,
            color,
            name,
        });
        Ok(())
    }

    /// FORMAT record: format id and its code string.
    pub fn parse_format(
        &mut self,
        r: &mut Record<'_>,
        enc: &XlsEncoding,
        biff: Biff,
    ) -> Result<(), XlsError> {
        if r.data.len() < 3 {
            return Err(XlsError::Len {
                typ: "format record",
                expected: 3,
                found: r.data.len(),
            });
        }
        let id = read_u16(r.data);
        let mut code = String::new();
        match biff {
            Biff::Biff8 => {
                if r.data.len() < 5 {
                    return Err(XlsError::Len {
                        typ: "format record",
                        expected: 5,
                        found: r.data.len(),
                    });
                }
                let len = read_u16(&r.data[2..]) as usize;
                let high_byte = r.data[4] & 0x1 != 0;
                code.reserve(len);
                enc.decode_to(&mut code, len, &r.data[5..], Some(high_byte));
            }
            Biff::Biff7 => {
                let len = r.data[2] as usize;
                code.reserve(len);
                enc.decode_to(&mut code, len, &r.data[3..], None);
            }
        }
        self.formats.insert(id, code);
        Ok(())
    }

    /// XF record: font and format references, alignment, fill and borders.
    pub fn parse_xf(&mut self, r: &Record<'_>) -> Result<(), XlsError> {
        if r.data.len() < 20 {
            return Err(XlsError::Len {
                typ: "xf record",
                expected: 20,
                found: r.data.len(),
            });
        }
        // slot 4 of the font table is reserved and never stored, so the
        // stored index sits one above the table from slot 1 on
        let font = (read_u16(r.data) as usize).saturating_sub(1);
        let format_id = read_u16(&r.data[2..]);
        let mut align = match r.data[6] & 0x3 {
            2 => Alignment::Center,
            3 => Alignment::Right,
            _ => Alignment::General,
        };

        let border = read_u32(&r.data[10..]);
        let border2 = read_u16(&r.data[14..]) as u32;
        let borders = Borders {
            left: BorderSide {
                style: BorderStyle::from_nibble(border),
                color: ((border >> 16) & 0x7F) as u16,
            },
            right: BorderSide {
                style: BorderStyle::from_nibble(border >> 4),
                color: ((border >> 23) & 0x7F) as u16,
            },
            top: BorderSide {
                style: BorderStyle::from_nibble(border >> 8),
                color: (border2 & 0x7F) as u16,
            },
            bottom: BorderSide {
                style: BorderStyle::from_nibble(border >> 12),
                color: ((border2 >> 7) & 0x7F) as u16,
            },
        };

        let fill_pattern = (r.data[17] & 0xFC) >> 2;
        let background = if fill_pattern != 0 {
            Some(read_u16(&r.data[18..]) & 0x7F)
        } else {
            None
        };

        let format = self.classify(format_id);
        // date and number cells right-align unless the style says otherwise
        if align == Alignment::General && !matches!(format, CellFormat::Other) {
            align = Alignment::Right;
        }

        self.xfs.push(XfRecord {
            format_id,
            font,
            align,
            fill_pattern,
            background,
            borders,
            format,
        });
        Ok(())
    }

    /// PALETTE record: replaces indexed colors from slot 8 upward.
    pub fn parse_palette(&mut self, r: &Record<'_>) -> Result<(), XlsError> {
        if r.data.len() < 2 {
            return Err(XlsError::Len {
                typ: "palette record",
                expected: 2,
                found: r.data.len(),
            });
        }
        let count = read_u16(r.data) as usize;
        if r.data.len() < 2 + 4 * count {
            return Err(XlsError::Len {
                typ: "palette record",
                expected: 2 + 4 * count,
                found: r.data.len(),
            });
        }
        for i in 0..count {
            let off = 2 + 4 * i;
            self.palette.set(
                8 + i as u16,
                [r.data[off], r.data[off + 1], r.data[off + 2]],
            );
        }
        Ok(())
    }

    /// Classifies a format id as date, number or other, resolving custom
    /// format codes against the FORMAT table.
    fn classify(&self, format_id: u16) -> CellFormat {
        if let Some(pattern) = builtin_date_format(format_id) {
            return CellFormat::DateTime(Arc::from(pattern));
        }
        if let Some(code) = builtin_number_format(format_id) {
            return CellFormat::Number(Arc::from(code));
        }
        let code = match self.formats.get(&format_id) {
            Some(code) if !code.is_empty() => code,
            Some(_) => return CellFormat::Other,
            None => {
                // ids up to 49 cover General and the remaining builtins
                if format_id > 49 {
                    warn!("no FORMAT record for format id {format_id}");
                }
                return CellFormat::Other;
            }
        };
        if is_date_format(code) {
            CellFormat::DateTime(Arc::from(parse_date_format(code)))
        } else if code.contains(['0', '#']) {
            CellFormat::Number(Arc::from(code.as_str()))
        } else {
            CellFormat::Other
        }
    }
}

fn builtin_color(index: u16) -> Option<&'static str> {
    match index {
        0x00 => Some("#000000"),
        0x01 => Some("#FFFFFF"),
        0x02 => Some("#FF0000"),
        0x03 => Some("#00FF00"),
        0x04 => Some("#0000FF"),
        0x05 => Some("#FFFF00"),
        0x06 => Some("#FF00FF"),
        0x07 => Some("#00FFFF"),
        0x08 => Some("#000000"),
        0x09 => Some("#FFFFFF"),
        0x0A => Some("#FF0000"),
        0x0B => Some("#00FF00"),
        0x0C => Some("#0000FF"),
        0x0D => Some("#FFFF00"),
        0x0E => Some("#FF00FF"),
        0x0F => Some("#00FFFF"),
        0x10 => Some("#800000"),
        0x11 => Some("#008000"),
        0x12 => Some("#000080"),
        0x13 => Some("#808000"),
        0x14 => Some("#800080"),
        0x15 => Some("#008080"),
        0x16 => Some("#C0C0C0"),
        0x17 => Some("#808080"),
        0x18 => Some("#9999FF"),
        0x19 => Some("#993366"),
        0x1A => Some("#FFFFCC"),
        0x1B => Some("#CCFFFF"),
        0x1C => Some("#660066"),
        0x1D => Some("#FF8080"),
        0x1E => Some("#0066CC"),
        0x1F => Some("#CCCCFF"),
        0x20 => Some("#000080"),
        0x21 => Some("#FF00FF"),
        0x22 => Some("#FFFF00"),
        0x23 => Some("#00FFFF"),
        0x24 => Some("#800080"),
        0x25 => Some("#800000"),
        0x26 => Some("#008080"),
        0x27 => Some("#0000FF"),
        0x28 => Some("#00CCFF"),
        0x29 => Some("#CCFFFF"),
        0x2A => Some("#CCFFCC"),
        0x2B => Some("#FFFF99"),
        0x2C => Some("#99CCFF"),
        0x2D => Some("#FF99CC"),
        0x2E => Some("#CC99FF"),
        0x2F => Some("#FFCC99"),
        0x30 => Some("#3366FF"),
        0x31 => Some("#33CCCC"),
        0x32 => Some("#99CC00"),
        0x33 => Some("#FFCC00"),
        0x34 => Some("#FF9900"),
        0x35 => Some("#FF6600"),
        0x36 => Some("#666699"),
        0x37 => Some("#969696"),
        0x38 => Some("#003366"),
        0x39 => Some("#339966"),
        0x3A => Some("#003300"),
        0x3B => Some("#333300"),
        0x3C => Some("#993300"),
        0x3D => Some("#993366"),
        0x3E => Some("#333399"),
        0x3F => Some("#333333"),
        0x40 => Some("#000000"),
        0x41 => Some("#FFFFFF"),
        0x43 => Some("#000000"),
        0x4D => Some("#000000"),
        0x4E => Some("#FFFFFF"),
        0x4F => Some("#000000"),
        0x50 => Some("#FFFFFF"),
        0x51 => Some("#000000"),
        0x7FFF => Some("#000000"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_builtin_and_custom() {
        let mut styles = Styles::default();
        styles.formats.insert(164, "dd/mm/yyyy".to_string());
        styles.formats.insert(165, "0.000".to_string());
        styles.formats.insert(166, "@".to_string());

        assert!(matches!(styles.classify(0x0E), CellFormat::DateTime(_)));
        assert!(matches!(styles.classify(0x0A), CellFormat::Number(ref c) if &**c == "0.00%"));
        assert!(matches!(styles.classify(164), CellFormat::DateTime(_)));
        assert!(matches!(styles.classify(165), CellFormat::Number(ref c) if &**c == "0.000"));
        assert!(matches!(styles.classify(166), CellFormat::Other));
        assert!(matches!(styles.classify(0), CellFormat::Other));
    }

    #[test]
    fn xf_border_unpacking() {
        let mut styles = Styles::default();
        let mut data = vec![0u8; 20];
        // font 5 (stored as 6), format 0x0E
        data[0..2].copy_from_slice(&6u16.to_le_bytes());
        data[2..4].copy_from_slice(&0x0Eu16.to_le_bytes());
        // left thin, right medium, top dashed, bottom dotted;
        // left color 8, right color 9
        let border: u32 = 0x1 | (0x2 << 4) | (0x3 << 8) | (0x4 << 12) | (8 << 16) | (9 << 23);
        data[10..14].copy_from_slice(&border.to_le_bytes());
        // top color 10, bottom color 11
        let border2: u16 = 10 | (11 << 7);
        data[14..16].copy_from_slice(&border2.to_le_bytes());
        // solid fill, background color 22
        data[17] = 0x1 << 2;
        data[18..20].copy_from_slice(&22u16.to_le_bytes());

        let r = Record {
            typ: 0x00E0,
            data: &data,
            cont: None,
        };
        styles.parse_xf(&r).unwrap();
        let xf = &styles.xfs[0];
        assert_eq!(xf.font, 5);
        assert_eq!(xf.borders.left.style, BorderStyle::Thin);
        assert_eq!(xf.borders.right.style, BorderStyle::Medium);
        assert_eq!(xf.borders.top.style, BorderStyle::Dashed);
        assert_eq!(xf.borders.bottom.style, BorderStyle::Dotted);
        assert_eq!(xf.borders.left.color, 8);
        assert_eq!(xf.borders.right.color, 9);
        assert_eq!(xf.borders.top.color, 10);
        assert_eq!(xf.borders.bottom.color, 11);
        assert_eq!(xf.fill_pattern, 1);
        assert_eq!(xf.background, Some(22));
        // date styles right-align by default
        assert_eq!(xf.align, Alignment::Right);
        assert!(matches!(xf.format, CellFormat::DateTime(_)));
    }

    #[test]
    fn font_index_zero_clamps() {
        let mut styles = Styles::default();
        let data = vec![0u8; 20];
        let r = Record {
            typ: 0x00E0,
            data: &data,
            cont: None,
        };
        styles.parse_xf(&r).unwrap();
        assert_eq!(styles.xfs[0].font, 0);
    }

    #[test]
    fn palette_overrides_start_at_slot_eight() {
        let mut styles = Styles::default();
        let mut data = vec![0u8; 2 + 8];
        data[0..2].copy_from_slice(&2u16.to_le_bytes());
        data[2..6].copy_from_slice(&[0x12, 0x34, 0x56, 0x00]);
        data[6..10].copy_from_slice(&[0xAB, 0xCD, 0xEF, 0x00]);
        let r = Record {
            typ: 0x0092,
            data: &data,
            cont: None,
        };
        styles.parse_palette(&r).unwrap();
        assert_eq!(styles.palette.color(8), Some("#123456"));
        assert_eq!(styles.palette.color(9), Some("#ABCDEF"));
        assert_eq!(styles.palette.color(2), Some("#FF0000"));
        assert_eq!(styles.palette.color(0x42), None);
    }
}
