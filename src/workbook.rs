//! Workbook decoding: globals pass, per-sheet passes and the read API

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use encoding_rs::UTF_16LE;
use log::{debug, warn};

use crate::biff::{self, rk_number, Biff, Record, RecordIter, XlsEncoding};
use crate::cell::{Cell, CellGrid, CellKind, CellRange, ColInfo, Hyperlink, RowInfo};
use crate::cfb::{Cfb, CfbError};
use crate::formats;
use crate::style::{CellFormat, Font, Palette, Styles, XfRecord};
use crate::utils::{read_f64, read_u16, read_u32};
use crate::CellErrorType;

// record types
const TYPE_BOF: u16 = 0x0809;
const TYPE_BOF_OLD: u16 = 0x0409;
const TYPE_EOF: u16 = 0x000A;
const TYPE_FILEPASS: u16 = 0x002F;
const TYPE_CODEPAGE: u16 = 0x0042;
const TYPE_DATE1904: u16 = 0x0022;
const TYPE_FONT: u16 = 0x0031;
const TYPE_FORMAT: u16 = 0x041E;
const TYPE_XF: u16 = 0x00E0;
const TYPE_PALETTE: u16 = 0x0092;
const TYPE_SST: u16 = 0x00FC;
const TYPE_BOUNDSHEET: u16 = 0x0085;
const TYPE_DIMENSION: u16 = 0x0200;
const TYPE_ROW: u16 = 0x0208;
const TYPE_COLINFO: u16 = 0x007D;
const TYPE_DEFCOLWIDTH: u16 = 0x0055;
const TYPE_STANDARDWIDTH: u16 = 0x0099;
const TYPE_MERGEDCELLS: u16 = 0x00E5;
const TYPE_HLINK: u16 = 0x01B8;
const TYPE_RK: u16 = 0x027E;
const TYPE_RK_OLD: u16 = 0x007E;
const TYPE_MULRK: u16 = 0x00BD;
const TYPE_MULBLANK: u16 = 0x00BE;
const TYPE_NUMBER: u16 = 0x0203;
const TYPE_FORMULA: u16 = 0x0006;
const TYPE_FORMULA_OLD: u16 = 0x0406;
const TYPE_BOOLERR: u16 = 0x0205;
const TYPE_LABEL: u16 = 0x0204;
const TYPE_LABELSST: u16 = 0x00FD;
const TYPE_STRING: u16 = 0x0207;

const GLOBALS_SUBSTREAM: u16 = 0x0005;
const WORKSHEET_SUBSTREAM: u16 = 0x0010;

/// An xls decoding error
#[derive(Debug)]
pub enum XlsError {
    /// Container error
    Cfb(CfbError),
    /// Truncated or undersized payload
    Len {
        /// part being read
        typ: &'static str,
        /// required byte length
        expected: usize,
        /// available byte length
        found: usize,
    },
    /// Unexpected record content
    Mismatch {
        /// part being read
        typ: &'static str,
        /// expected value
        expected: u16,
        /// value found
        found: u16,
    },
    /// Stream version is neither BIFF7 nor BIFF8
    InvalidVersion(u16),
    /// Workbook is password protected
    Password,
    /// No encoding found for the declared code page
    InvalidCodePage(u16),
    /// A continued string ended before its declared length
    ContinueRecordTooShort,
}

from_err!(CfbError, XlsError, Cfb);

impl fmt::Display for XlsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XlsError::Cfb(e) => write!(f, "Cfb error: {e}"),
            XlsError::Len {
                typ,
                expected,
                found,
            } => write!(f, "Truncated {typ}: expected {expected} bytes, found {found}"),
            XlsError::Mismatch {
                typ,
                expected,
                found,
            } => write!(f, "Invalid {typ}: expected {expected:#06X}, found {found:#06X}"),
            XlsError::InvalidVersion(v) => write!(f, "Unsupported BIFF version {v:#06X}"),
            XlsError::Password => write!(f, "Workbook is password protected"),
            XlsError::InvalidCodePage(cp) => write!(f, "Unknown code page {cp}"),
            XlsError::ContinueRecordTooShort => {
                write!(f, "Continued string ended before its declared length")
            }
        }
    }
}

impl std::error::Error for XlsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            XlsError::Cfb(e) => Some(e),
            _ => None,
        }
    }
}

/// Decoding options.
#[derive(Debug, Clone, Copy)]
pub struct XlsOptions {
    /// Base index for row and column addressing, 1 by default
    pub base: u32,
}

impl Default for XlsOptions {
    fn default() -> XlsOptions {
        XlsOptions { base: 1 }
    }
}

/// A decoded workbook: sheets plus the shared style tables.
pub struct Workbook {
    sheets: Vec<Sheet>,
    styles: Styles,
    biff: Biff,
    is_1904: bool,
    options: XlsOptions,
}

impl Workbook {
    /// Decodes a workbook from the raw bytes of an xls file.
    pub fn open(data: &[u8]) -> Result<Workbook, XlsError> {
        Workbook::open_with(data, XlsOptions::default())
    }

    /// Decodes a workbook with explicit options.
    pub fn open_with(data: &[u8], options: XlsOptions) -> Result<Workbook, XlsError> {
        let cfb = Cfb::new(data)?;
        let stream = cfb.workbook_stream(data)?;
        // all container state ends here; only the stream buffer survives
        drop(cfb);
        let mut wb = Workbook {
            sheets: Vec::new(),
            styles: Styles::default(),
            biff: Biff::Biff8,
            is_1904: false,
            options,
        };
        wb.parse_workbook(&stream)?;
        Ok(wb)
    }

    /// Sheet count.
    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    /// Sheet names, in workbook order.
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// Sheets, in workbook order.
    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    /// A sheet by position.
    pub fn sheet(&self, index: usize) -> Option<&Sheet> {
        self.sheets.get(index)
    }

    /// A sheet by name.
    pub fn sheet_by_name(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    /// Whether serial dates count from the 1904 epoch.
    pub fn is_1904(&self) -> bool {
        self.is_1904
    }

    /// The style referenced by an XF index.
    pub fn xf(&self, index: u16) -> Option<&XfRecord> {
        self.styles.xfs.get(index as usize)
    }

    /// All decoded styles.
    pub fn xfs(&self) -> &[XfRecord] {
        &self.styles.xfs
    }

    /// The font a style references.
    pub fn font(&self, xf: &XfRecord) -> Option<&Font> {
        self.styles.fonts.get(xf.font)
    }

    /// All decoded fonts.
    pub fn fonts(&self) -> &[Font] {
        &self.styles.fonts
    }

    /// The workbook color table.
    pub fn palette(&self) -> &Palette {
        &self.styles.palette
    }

    /// The style of a cell, by sheet position.
    pub fn cell_style(&self, sheet: usize, row: u32, col: u32) -> Option<&XfRecord> {
        let cell = self.sheet(sheet)?.cell(row, col)?;
        self.xf(cell.xf)
    }

    fn parse_workbook(&mut self, stream: &[u8]) -> Result<(), XlsError> {
        let mut encoding = XlsEncoding::from_codepage(1200)?;
        let mut strings = Vec::new();
        let mut bounds: Vec<(usize, String)> = Vec::new();

        let mut iter = RecordIter::new(stream);
        let bof = iter.next().ok_or(XlsError::Len {
            typ: "workbook BOF",
            expected: 4,
            found: 0,
        })??;
        let (version, substream) = parse_bof(&bof)?;
        self.biff = Biff::from_version(version)?;
        if substream != GLOBALS_SUBSTREAM {
            return Err(XlsError::Mismatch {
                typ: "workbook globals BOF",
                expected: GLOBALS_SUBSTREAM,
                found: substream,
            });
        }

        for record in &mut iter {
            let mut r = record?;
            match r.typ {
                TYPE_EOF => break,
                TYPE_FILEPASS => return Err(XlsError::Password),
                TYPE_CODEPAGE => {
                    if r.data.len() < 2 {
                        return Err(XlsError::Len {
                            typ: "codepage record",
                            expected: 2,
                            found: r.data.len(),
                        });
                    }
                    encoding = XlsEncoding::from_codepage(read_u16(r.data))?;
                }
                TYPE_DATE1904 => {
                    if r.data.len() < 2 {
                        return Err(XlsError::Len {
                            typ: "date epoch record",
                            expected: 2,
                            found: r.data.len(),
                        });
                    }
                    self.is_1904 = read_u16(r.data) != 0;
                }
                TYPE_SST => strings = parse_sst(&mut r, &encoding)?,
                TYPE_FORMAT => self.styles.parse_format(&mut r, &encoding, self.biff)?,
                TYPE_FONT => self.styles.parse_font(&mut r, &encoding, self.biff)?,
                TYPE_XF => self.styles.parse_xf(&r)?,
                TYPE_PALETTE => self.styles.parse_palette(&r)?,
                TYPE_BOUNDSHEET => bounds.push(parse_bound_sheet(&mut r, &encoding, self.biff)?),
                typ => debug!("skip record {typ:#06X} ({} bytes)", r.data.len()),
            }
        }

        let mut sheets = Vec::with_capacity(bounds.len());
        for (offset, name) in bounds {
            if let Some(sheet) = self.parse_sheet(stream, offset, name, &strings, &encoding)? {
                sheets.push(sheet);
            }
        }
        self.sheets = sheets;
        Ok(())
    }

    fn parse_sheet(
        &self,
        stream: &[u8],
        offset: usize,
        name: String,
        strings: &[String],
        encoding: &XlsEncoding,
    ) -> Result<Option<Sheet>, XlsError> {
        debug!("parse sheet {name:?} at {offset}");
        if offset >= stream.len() {
            return Err(XlsError::Len {
                typ: "sheet substream",
                expected: offset,
                found: stream.len(),
            });
        }
        let mut iter = RecordIter::new(&stream[offset..]);
        let bof = iter.next().ok_or(XlsError::Len {
            typ: "sheet BOF",
            expected: 4,
            found: 0,
        })??;
        let (version, substream) = parse_bof(&bof)?;
        Biff::from_version(version)?;
        if substream != WORKSHEET_SUBSTREAM {
            warn!("sheet {name:?}: skipping substream type {substream:#06X}");
            return Ok(None);
        }

        let base = self.options.base;
        let mut sheet = Sheet::new(name, base);
        // a string-result formula waiting for its STRING record
        let mut pending_string: Option<(u32, u32, u16)> = None;

        for record in &mut iter {
            let mut r = record?;
            match r.typ {
                TYPE_EOF => break,
                TYPE_DIMENSION => sheet.declared = Some(parse_dimensions(&r, self.biff)?),
                TYPE_ROW => {
                    require(&r, 13, "row record")?;
                    let row = read_u16(r.data) as u32;
                    let raw = read_u16(&r.data[6..]);
                    let height = if raw & 0x8000 != 0 {
                        None
                    } else {
                        Some((raw & 0x7FFF) as f64 / 20.0)
                    };
                    let hidden = r.data[12] & 0x20 != 0;
                    sheet.row_info.insert(row + base, RowInfo { height, hidden });
                }
                TYPE_COLINFO => {
                    require(&r, 10, "colinfo record")?;
                    let first = read_u16(r.data);
                    let last = read_u16(&r.data[2..]);
                    let width = read_u16(&r.data[4..]);
                    let xf = read_u16(&r.data[6..]);
                    let opts = read_u16(&r.data[8..]);
                    if last < first || last - first > 0x4000 {
                        warn!("colinfo covers columns {first}..{last}, skipped");
                        continue;
                    }
                    for col in first..=last {
                        sheet.col_info.insert(
                            col as u32 + base,
                            ColInfo {
                                width,
                                xf,
                                hidden: opts & 0x1 != 0,
                                collapsed: opts & 0x1000 != 0,
                            },
                        );
                    }
                }
                TYPE_DEFCOLWIDTH => {
                    require(&r, 2, "default column width")?;
                    sheet.default_col_width = Some(read_u16(r.data));
                }
                TYPE_STANDARDWIDTH => {
                    require(&r, 2, "standard column width")?;
                    sheet.standard_col_width = Some(read_u16(r.data));
                }
                TYPE_MERGEDCELLS => {
                    require(&r, 2, "merged cells record")?;
                    let count = read_u16(r.data) as usize;
                    require(&r, 2 + 8 * count, "merged cells record")?;
                    for i in 0..count {
                        let off = 2 + 8 * i;
                        sheet.merged.push(CellRange {
                            first_row: read_u16(&r.data[off..]) as u32 + base,
                            last_row: read_u16(&r.data[off + 2..]) as u32 + base,
                            first_col: read_u16(&r.data[off + 4..]) as u32 + base,
                            last_col: read_u16(&r.data[off + 6..]) as u32 + base,
                        });
                    }
                }
                TYPE_HLINK => {
                    if let Some((range, link)) = parse_hyperlink(r.data, base)? {
                        sheet.hyperlinks.push((range, Arc::new(link)));
                    }
                }
                TYPE_RK | TYPE_RK_OLD => {
                    require(&r, 10, "rk record")?;
                    let (row, col, xf) = parse_cell_header(&r);
                    let value = rk_number(read_u32(&r.data[6..]));
                    sheet.insert(row, col, self.numeric_cell(value, xf));
                }
                TYPE_MULRK => {
                    require(&r, 12, "mulrk record")?;
                    let row = read_u16(r.data) as u32;
                    let col_first = read_u16(&r.data[2..]) as u32;
                    let col_last = read_u16(&r.data[r.data.len() - 2..]) as u32;
                    if col_last < col_first {
                        warn!("mulrk columns {col_first}..{col_last}, skipped");
                        continue;
                    }
                    let n = (col_last - col_first + 1) as usize;
                    require(&r, 4 + 6 * n + 2, "mulrk record")?;
                    for i in 0..n {
                        let off = 4 + 6 * i;
                        let xf = read_u16(&r.data[off..]);
                        let value = rk_number(read_u32(&r.data[off + 2..]));
                        sheet.insert(row, col_first + i as u32, self.numeric_cell(value, xf));
                    }
                }
                TYPE_MULBLANK => {
                    require(&r, 8, "mulblank record")?;
                    let row = read_u16(r.data) as u32;
                    let col_first = read_u16(&r.data[2..]) as u32;
                    let cols = r.data.len() / 2 - 3;
                    for c in 0..cols {
                        let xf = read_u16(&r.data[4 + 2 * c..]);
                        sheet.insert(row, col_first + c as u32, Cell::blank(xf));
                    }
                }
                TYPE_NUMBER => {
                    require(&r, 14, "number record")?;
                    let (row, col, xf) = parse_cell_header(&r);
                    let value = read_f64(&r.data[6..]);
                    sheet.insert(row, col, self.numeric_cell(value, xf));
                }
                TYPE_FORMULA | TYPE_FORMULA_OLD => {
                    require(&r, 14, "formula record")?;
                    let (row, col, xf) = parse_cell_header(&r);
                    if r.data[12] == 0xFF && r.data[13] == 0xFF {
                        match r.data[6] {
                            // string result follows in a STRING record
                            0 => pending_string = Some((row, col, xf)),
                            1 => {
                                let v = if r.data[8] != 0 { "TRUE" } else { "FALSE" };
                                sheet.insert(row, col, Cell::new(v.into(), CellKind::Bool, xf));
                            }
                            // error result carries no displayable value
                            2 => debug!("formula error result at ({row}, {col})"),
                            3 => {
                                sheet.insert(row, col, Cell::new(String::new(), CellKind::Text, xf))
                            }
                            code => warn!("unknown cached formula result kind {code}"),
                        }
                    } else {
                        let value = read_f64(&r.data[6..]);
                        sheet.insert(row, col, self.numeric_cell(value, xf));
                    }
                }
                TYPE_STRING => {
                    if let Some((row, col, xf)) = pending_string.take() {
                        let s = match self.biff {
                            Biff::Biff8 => biff::read_rich_extended_string(&mut r, encoding)?,
                            Biff::Biff7 => biff::read_byte_string(&mut r, encoding)?,
                        };
                        sheet.insert(row, col, Cell::new(s, CellKind::Text, xf));
                    }
                }
                TYPE_BOOLERR => {
                    require(&r, 8, "boolerr record")?;
                    let (row, col, xf) = parse_cell_header(&r);
                    let v = r.data[6];
                    if r.data[7] == 0 {
                        let s = if v != 0 { "TRUE" } else { "FALSE" };
                        sheet.insert(row, col, Cell::new(s.into(), CellKind::Bool, xf));
                    } else {
                        match CellErrorType::from_code(v) {
                            Some(e) => sheet.insert(
                                row,
                                col,
                                Cell::new(e.to_string(), CellKind::Error, xf),
                            ),
                            None => warn!("unknown error code {v:#04X} at ({row}, {col})"),
                        }
                    }
                }
                TYPE_LABEL => {
                    require(&r, 8, "label record")?;
                    let (row, col, xf) = parse_cell_header(&r);
                    r.data = &r.data[6..];
                    let s = match self.biff {
                        Biff::Biff8 => biff::read_rich_extended_string(&mut r, encoding)?,
                        Biff::Biff7 => biff::read_byte_string(&mut r, encoding)?,
                    };
                    sheet.insert(row, col, Cell::new(s, CellKind::Text, xf));
                }
                TYPE_LABELSST => {
                    require(&r, 10, "labelsst record")?;
                    let (row, col, xf) = parse_cell_header(&r);
                    let index = read_u32(&r.data[6..]) as usize;
                    match strings.get(index) {
                        Some(s) => {
                            sheet.insert(row, col, Cell::new(s.clone(), CellKind::Text, xf))
                        }
                        None => warn!("shared string {index} out of bounds at ({row}, {col})"),
                    }
                }
                typ => debug!("skip record {typ:#06X} ({} bytes)", r.data.len()),
            }
        }

        sheet.finalize();
        Ok(Some(sheet))
    }

    /// Builds a numeric cell, rendering through the style's format.
    fn numeric_cell(&self, value: f64, xf_index: u16) -> Cell {
        match self.styles.xfs.get(xf_index as usize).map(|xf| &xf.format) {
            Some(CellFormat::DateTime(pattern)) => {
                let mut cell = Cell::new(
                    formats::render_date(value, pattern, self.is_1904),
                    CellKind::Date,
                    xf_index,
                );
                cell.raw = Some(value);
                cell
            }
            Some(CellFormat::Number(code)) => {
                let rendered = formats::format_number(value, code);
                let mut cell = Cell::new(rendered.text, CellKind::Number, xf_index);
                cell.format_color = rendered.color;
                cell.raw = Some(value);
                cell
            }
            _ => {
                let mut cell = Cell::new(
                    formats::display_general(value),
                    CellKind::Number,
                    xf_index,
                );
                cell.raw = Some(value);
                cell
            }
        }
    }
}

/// One worksheet: its cell grid and layout metadata.
pub struct Sheet {
    name: String,
    base: u32,
    cells: CellGrid,
    rows: u32,
    cols: u32,
    declared: Option<(u32, u32)>,
    row_info: BTreeMap<u32, RowInfo>,
    col_info: BTreeMap<u32, ColInfo>,
    default_col_width: Option<u16>,
    standard_col_width: Option<u16>,
    merged: Vec<CellRange>,
    hyperlinks: Vec<(CellRange, Arc<Hyperlink>)>,
}

impl Sheet {
    fn new(name: String, base: u32) -> Sheet {
        Sheet {
            name,
            base,
            cells: CellGrid::default(),
            rows: 0,
            cols: 0,
            declared: None,
            row_info: BTreeMap::new(),
            col_info: BTreeMap::new(),
            default_col_width: None,
            standard_col_width: None,
            merged: Vec::new(),
            hyperlinks: Vec::new(),
        }
    }

    /// Sheet name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Row count, declared or observed.
    pub fn row_count(&self) -> u32 {
        self.rows
    }

    /// Column count, declared or observed.
    pub fn col_count(&self) -> u32 {
        self.cols
    }

    /// The cell at (row, col), if populated.
    pub fn cell(&self, row: u32, col: u32) -> Option<&Cell> {
        self.cells.get(row, col)
    }

    /// Number of populated cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// The rendered value at (row, col), blank when unpopulated.
    pub fn value(&self, row: u32, col: u32) -> &str {
        self.cells.get(row, col).map(|c| c.value.as_str()).unwrap_or("")
    }

    /// Iterates populated cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = ((u32, u32), &Cell)> {
        self.cells.iter().map(|(pos, cell)| (*pos, cell))
    }

    /// Height of a row in points, when set explicitly.
    pub fn row_height(&self, row: u32) -> Option<f64> {
        self.row_info.get(&row).and_then(|i| i.height)
    }

    /// Whether a row is hidden.
    pub fn row_hidden(&self, row: u32) -> bool {
        self.row_info.get(&row).map(|i| i.hidden).unwrap_or(false)
    }

    /// Width of a column in 1/256ths of a character, when set explicitly.
    pub fn col_width(&self, col: u32) -> Option<u16> {
        self.col_info.get(&col).map(|i| i.width)
    }

    /// Whether a column is hidden.
    pub fn col_hidden(&self, col: u32) -> bool {
        self.col_info.get(&col).map(|i| i.hidden).unwrap_or(false)
    }

    /// Column metadata, when a COLINFO record covered the column.
    pub fn col_info(&self, col: u32) -> Option<&ColInfo> {
        self.col_info.get(&col)
    }

    /// Default column width, when the sheet declared one.
    pub fn default_col_width(&self) -> Option<u16> {
        self.default_col_width.or(self.standard_col_width)
    }

    /// Merged regions declared by the sheet.
    pub fn merged_regions(&self) -> &[CellRange] {
        &self.merged
    }

    /// Hyperlinks declared by the sheet, with their ranges.
    pub fn hyperlinks(&self) -> &[(CellRange, Arc<Hyperlink>)] {
        &self.hyperlinks
    }

    /// The hyperlink covering (row, col), if any.
    pub fn hyperlink(&self, row: u32, col: u32) -> Option<&Hyperlink> {
        if let Some(link) = self.cells.get(row, col).and_then(|c| c.hyperlink.as_deref()) {
            return Some(link);
        }
        self.hyperlinks
            .iter()
            .find(|(range, _)| range.contains(row, col))
            .map(|(_, link)| &**link)
    }

    fn insert(&mut self, row: u32, col: u32, cell: Cell) {
        self.cells.insert(row + self.base, col + self.base, cell);
    }

    /// Settles dimensions and applies merged regions and hyperlinks to the
    /// grid, whatever order their records arrived in.
    fn finalize(&mut self) {
        let (drows, dcols) = self.declared.unwrap_or((0, 0));
        self.rows = drows.max(self.cells.max_row());
        self.cols = dcols.max(self.cells.max_col());

        let merged = self.merged.clone();
        for range in &merged {
            let anchor = self.cells.ensure(range.first_row, range.first_col);
            if range.last_row > range.first_row {
                anchor.rowspan = Some(range.last_row - range.first_row + 1);
            }
            if range.last_col > range.first_col {
                anchor.colspan = Some(range.last_col - range.first_col + 1);
            }
            for row in range.first_row..=range.last_row {
                for col in range.first_col..=range.last_col {
                    if (row, col) == (range.first_row, range.first_col) {
                        continue;
                    }
                    if let Some(cell) = self.cells.get_mut(row, col) {
                        cell.covered = true;
                    }
                }
            }
        }

        for (range, link) in self.hyperlinks.clone() {
            for row in range.first_row..=range.last_row {
                for col in range.first_col..=range.last_col {
                    if let Some(cell) = self.cells.get_mut(row, col) {
                        cell.hyperlink = Some(link.clone());
                    }
                }
            }
        }
    }
}

fn require(r: &Record<'_>, len: usize, typ: &'static str) -> Result<(), XlsError> {
    if r.data.len() < len {
        return Err(XlsError::Len {
            typ,
            expected: len,
            found: r.data.len(),
        });
    }
    Ok(())
}

fn parse_bof(r: &Record<'_>) -> Result<(u16, u16), XlsError> {
    if r.typ != TYPE_BOF && r.typ != TYPE_BOF_OLD {
        return Err(XlsError::Mismatch {
            typ: "BOF record",
            expected: TYPE_BOF,
            found: r.typ,
        });
    }
    require(r, 4, "bof record")?;
    Ok((read_u16(r.data), read_u16(&r.data[2..])))
}

fn parse_cell_header(r: &Record<'_>) -> (u32, u32, u16) {
    (
        read_u16(r.data) as u32,
        read_u16(&r.data[2..]) as u32,
        read_u16(&r.data[4..]),
    )
}

fn parse_sst(r: &mut Record<'_>, encoding: &XlsEncoding) -> Result<Vec<String>, XlsError> {
    require(r, 8, "sst record")?;
    let unique = read_u32(&r.data[4..]) as usize;
    r.data = &r.data[8..];
    let mut sst = Vec::with_capacity(unique.min(65536));
    for _ in 0..unique {
        sst.push(biff::read_rich_extended_string(r, encoding)?);
    }
    Ok(sst)
}

fn parse_bound_sheet(
    r: &mut Record<'_>,
    encoding: &XlsEncoding,
    biff: Biff,
) -> Result<(usize, String), XlsError> {
    require(r, 8, "boundsheet record")?;
    let offset = read_u32(r.data) as usize;
    // skip the visibility and sheet type bytes
    r.data = &r.data[6..];
    let name = biff::read_short_string(r, encoding, biff)?;
    Ok((offset, name))
}

fn parse_dimensions(r: &Record<'_>, biff: Biff) -> Result<(u32, u32), XlsError> {
    require(r, 10, "dimensions record")?;
    if r.data.len() == 10 || biff == Biff::Biff7 {
        Ok((read_u16(&r.data[2..]) as u32, read_u16(&r.data[6..]) as u32))
    } else {
        require(r, 12, "dimensions record")?;
        Ok((read_u16(&r.data[4..]) as u32, read_u16(&r.data[10..]) as u32))
    }
}

/// Decodes an HLINK record; URL targets only, other monikers are skipped.
fn parse_hyperlink(
    data: &[u8],
    base: u32,
) -> Result<Option<(CellRange, Hyperlink)>, XlsError> {
    if data.len() < 32 {
        return Err(XlsError::Len {
            typ: "hyperlink record",
            expected: 32,
            found: data.len(),
        });
    }
    let range = CellRange {
        first_row: read_u16(data) as u32 + base,
        last_row: read_u16(&data[2..]) as u32 + base,
        first_col: read_u16(&data[4..]) as u32 + base,
        last_col: read_u16(&data[6..]) as u32 + base,
    };
    let flags = read_u32(&data[28..]);
    if flags & 0x1 == 0 {
        debug!("hyperlink without url moniker, skipped");
        return Ok(None);
    }

    let mut pos = 32;
    let mut description = String::new();
    if flags & 0x14 == 0x14 {
        if data.len() < pos + 4 {
            return Err(XlsError::Len {
                typ: "hyperlink description",
                expected: pos + 4,
                found: data.len(),
            });
        }
        let chars = read_u32(&data[pos..]) as usize;
        pos += 4;
        let bytes = 2 * chars;
        if data.len() < pos + bytes {
            return Err(XlsError::Len {
                typ: "hyperlink description",
                expected: pos + bytes,
                found: data.len(),
            });
        }
        let (d, _) = UTF_16LE.decode_without_bom_handling(&data[pos..pos + bytes]);
        description = d.trim_end_matches('\0').to_string();
        pos += bytes;
    }

    // skip the URL moniker GUID and its length field
    pos += 20;
    if pos >= data.len() {
        return Err(XlsError::Len {
            typ: "hyperlink target",
            expected: pos,
            found: data.len(),
        });
    }
    let mut end = pos;
    while end + 1 < data.len() && !(data[end] == 0 && data[end + 1] == 0) {
        end += 2;
    }
    let (link, _) = UTF_16LE.decode_without_bom_handling(&data[pos..end]);
    let link = link.to_string();
    let description = if description.is_empty() {
        link.clone()
    } else {
        description
    };
    Ok(Some((range, Hyperlink { link, description })))
}
