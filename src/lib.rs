//! A legacy Excel (`.xls`, BIFF7/BIFF8) workbook decoder in pure Rust
//!
//! **siderite** decodes the OLE compound-file container, walks the BIFF
//! record stream and exposes a queryable [`Workbook`]: sheets, cells with
//! their rendered display strings and raw values, styles (fonts, alignment,
//! fills, borders), merged regions and hyperlinks. Number and date format
//! codes are interpreted so cells read back the way Excel displays them.
//!
//! Decoding is a pure in-memory transform: hand the decoder the file bytes,
//! get a workbook or an error. Nothing is written back.
//!
//! # Examples
//! ```no_run
//! use siderite::{CellKind, Workbook};
//!
//! let data = std::fs::read("report.xls").expect("cannot read file");
//! let workbook = Workbook::open(&data).expect("cannot decode workbook");
//!
//! for sheet in workbook.sheets() {
//!     println!("{}: {} rows", sheet.name(), sheet.row_count());
//!     for ((row, col), cell) in sheet.cells() {
//!         if cell.kind != CellKind::Blank {
//!             println!("  ({row}, {col}) = {}", cell.value);
//!         }
//!     }
//! }
//!
//! // style lookups go through the workbook tables
//! if let Some(style) = workbook.cell_style(0, 1, 1) {
//!     if let Some(font) = workbook.font(style) {
//!         println!("A1 font: {} {}pt", font.name, font.height);
//!     }
//! }
//! ```
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

#[macro_use]
mod utils;
mod biff;
mod cell;
mod cfb;
mod formats;
mod style;
mod workbook;

use std::fmt;

pub use cell::{Cell, CellKind, CellRange, ColInfo, Hyperlink, RowInfo};
pub use cfb::CfbError;
pub use formats::{DateToken, ExcelDateTime};
pub use style::{
    Alignment, BorderSide, BorderStyle, Borders, CellFormat, Font, Palette, XfRecord,
};
pub use workbook::{Sheet, Workbook, XlsError, XlsOptions};

// https://msdn.microsoft.com/en-us/library/office/ff839168.aspx
/// An enum to represent all different errors that can appear as
/// a value in a worksheet cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellErrorType {
    /// Division by 0 error
    Div0,
    /// Unavailable value error
    NA,
    /// Invalid name error
    Name,
    /// Null value error
    Null,
    /// Number error
    Num,
    /// Invalid cell reference error
    Ref,
    /// Value error
    Value,
    /// Getting data
    GettingData,
}

impl CellErrorType {
    /// Maps a BIFF error code to its error value.
    pub fn from_code(code: u8) -> Option<CellErrorType> {
        match code {
            0x00 => Some(CellErrorType::Null),
            0x07 => Some(CellErrorType::Div0),
            0x0F => Some(CellErrorType::Value),
            0x17 => Some(CellErrorType::Ref),
            0x1D => Some(CellErrorType::Name),
            0x24 => Some(CellErrorType::Num),
            0x2A => Some(CellErrorType::NA),
            0x2B => Some(CellErrorType::GettingData),
            _ => None,
        }
    }
}

impl fmt::Display for CellErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match *self {
            CellErrorType::Div0 => write!(f, "#DIV/0!"),
            CellErrorType::NA => write!(f, "#N/A"),
            CellErrorType::Name => write!(f, "#NAME?"),
            CellErrorType::Null => write!(f, "#NULL!"),
            CellErrorType::Num => write!(f, "#NUM!"),
            CellErrorType::Ref => write!(f, "#REF!"),
            CellErrorType::Value => write!(f, "#VALUE!"),
            CellErrorType::GettingData => write!(f, "#DATA!"),
        }
    }
}
