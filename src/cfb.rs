//! Compound File Binary format MS-CFB
//!
//! The OLE container hosting the Workbook stream: 512-byte sectors chained
//! through a file allocation table, a 64-byte mini-sector stream for short
//! streams, and a directory of named entries.

use std::fmt;

use encoding_rs::UTF_16LE;
use log::debug;

use crate::utils::{read_u16, read_u32, read_usize};

const OLE_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const END_OF_CHAIN: u32 = 0xFFFF_FFFE;
const FREE_SECTOR: u32 = 0xFFFF_FFFF;

const SECTOR_SIZE: usize = 512;
const MINI_SECTOR_SIZE: usize = 64;
const MINI_STREAM_CUTOFF: usize = 4096;
const DIR_ENTRY_SIZE: usize = 128;

// header field offsets
const FAT_LEN: usize = 0x2C;
const DIR_START: usize = 0x30;
const MINI_FAT_START: usize = 0x3C;
const DIFAT_START: usize = 0x44;
const DIFAT_LEN: usize = 0x48;
const HEADER_FAT: usize = 0x4C;

/// A Compound File specific error
#[derive(Debug)]
pub enum CfbError {
    /// Invalid OLE signature (not an office document)
    Ole,
    /// Read past the end of the file buffer
    Truncated {
        /// part being read
        typ: &'static str,
        /// requested end offset
        offset: usize,
        /// buffer length
        len: usize,
    },
    /// Sector id out of bounds of the allocation table
    Sector(u32),
    /// A sector chain revisits a sector
    ChainCycle(u32),
    /// Missing directory entry
    StreamNotFound(&'static str),
}

impl fmt::Display for CfbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CfbError::Ole => write!(f, "Invalid OLE signature (not an office document?)"),
            CfbError::Truncated { typ, offset, len } => {
                write!(f, "Truncated file: {typ} ends at {offset}, file is {len} bytes")
            }
            CfbError::Sector(id) => write!(f, "Sector {id} out of bounds"),
            CfbError::ChainCycle(id) => write!(f, "Sector chain cycles back to sector {id}"),
            CfbError::StreamNotFound(name) => write!(f, "Cannot find '{name}' stream"),
        }
    }
}

impl std::error::Error for CfbError {}

/// A struct for managing Compound File Binary format
pub(crate) struct Cfb {
    fats: Vec<u32>,
    mini_fats: Vec<u32>,
    directories: Vec<Directory>,
    workbook: usize,
    root: usize,
}

impl Cfb {
    /// Reads the container metadata: header, allocation tables and directory.
    ///
    /// No stream content is materialized here.
    pub fn new(data: &[u8]) -> Result<Cfb, CfbError> {
        if data.len() < SECTOR_SIZE {
            return Err(CfbError::Truncated {
                typ: "header",
                offset: SECTOR_SIZE,
                len: data.len(),
            });
        }
        if data[..8] != OLE_SIGNATURE {
            return Err(CfbError::Ole);
        }

        let fat_len = read_usize(&data[FAT_LEN..]);
        let dir_start = read_u32(&data[DIR_START..]);
        let mini_fat_start = read_u32(&data[MINI_FAT_START..]);
        let mut difat_next = read_u32(&data[DIFAT_START..]);
        let difat_len = read_usize(&data[DIFAT_LEN..]);

        // sector ids holding the FAT: up to 109 in the header, the rest
        // chained through DIFAT sectors of 127 ids plus a next pointer
        debug!("load difat ({difat_len} extra sectors)");
        let mut fat_sectors = Vec::with_capacity(fat_len.min(MAX_PREALLOC));
        for chunk in data[HEADER_FAT..SECTOR_SIZE].chunks_exact(4) {
            fat_sectors.push(read_u32(chunk));
        }
        let sector_count = data.len() / SECTOR_SIZE;
        let mut walked = 0;
        while difat_next != END_OF_CHAIN && difat_next != FREE_SECTOR {
            let s = sector(data, difat_next)?;
            for chunk in s[..SECTOR_SIZE - 4].chunks_exact(4) {
                fat_sectors.push(read_u32(chunk));
            }
            difat_next = read_u32(&s[SECTOR_SIZE - 4..]);
            walked += 1;
            if walked > sector_count {
                return Err(CfbError::ChainCycle(difat_next));
            }
        }

        debug!("load fat");
        let mut fats = Vec::with_capacity((fat_len * SECTOR_SIZE / 4).min(MAX_PREALLOC));
        for id in fat_sectors
            .into_iter()
            .filter(|id| *id != FREE_SECTOR && *id != END_OF_CHAIN)
            .take(fat_len)
        {
            let s = sector(data, id)?;
            for chunk in s.chunks_exact(4) {
                fats.push(read_u32(chunk));
            }
        }

        debug!("load directories");
        let dir_stream = read_big_chain(data, &fats, dir_start, None)?;
        let directories = dir_stream
            .chunks_exact(DIR_ENTRY_SIZE)
            .map(Directory::from_slice)
            .collect::<Vec<_>>();
        for d in &directories {
            debug!("directory entry {:?} (type {})", d.name, d.typ);
        }

        debug!("load minifat");
        let mini_stream = read_big_chain(data, &fats, mini_fat_start, None)?;
        let mini_fats = mini_stream.chunks_exact(4).map(read_u32).collect();

        let workbook = directories
            .iter()
            .position(|d| {
                d.name.eq_ignore_ascii_case("workbook") || d.name.eq_ignore_ascii_case("book")
            })
            .ok_or(CfbError::StreamNotFound("Workbook"))?;
        let root = directories
            .iter()
            .position(|d| d.name == "Root Entry")
            .ok_or(CfbError::StreamNotFound("Root Entry"))?;

        Ok(Cfb {
            fats,
            mini_fats,
            directories,
            workbook,
            root,
        })
    }

    /// Materializes the Workbook stream bytes.
    ///
    /// Short streams live in the mini-sector stream of the root entry,
    /// everything else is chained directly through the FAT.
    pub fn workbook_stream(&self, data: &[u8]) -> Result<Vec<u8>, CfbError> {
        let d = &self.directories[self.workbook];
        debug!("get workbook stream ({} bytes)", d.len);
        if d.len < MINI_STREAM_CUTOFF {
            let root = &self.directories[self.root];
            let ministream = read_big_chain(data, &self.fats, root.start, Some(root.len))?;
            read_mini_chain(&ministream, &self.mini_fats, d.start, d.len)
        } else {
            read_big_chain(data, &self.fats, d.start, Some(d.len))
        }
    }
}

// preallocation cap for length fields read out of the file
const MAX_PREALLOC: usize = 65536;

fn sector(data: &[u8], id: u32) -> Result<&[u8], CfbError> {
    // sector 0 starts right after the 512-byte header
    let start = (id as usize + 1) * SECTOR_SIZE;
    let end = start + SECTOR_SIZE;
    if end > data.len() {
        return Err(CfbError::Truncated {
            typ: "sector",
            offset: end,
            len: data.len(),
        });
    }
    Ok(&data[start..end])
}

fn read_big_chain(
    data: &[u8],
    fats: &[u32],
    start: u32,
    len: Option<usize>,
) -> Result<Vec<u8>, CfbError> {
    let mut chain = Vec::with_capacity(len.unwrap_or(0).min(MAX_PREALLOC));
    let mut visited = vec![false; fats.len()];
    let mut id = start;
    while id != END_OF_CHAIN && id != FREE_SECTOR {
        let i = id as usize;
        if i >= fats.len() {
            return Err(CfbError::Sector(id));
        }
        if visited[i] {
            return Err(CfbError::ChainCycle(id));
        }
        visited[i] = true;
        chain.extend_from_slice(sector(data, id)?);
        id = fats[i];
    }
    truncate_to(chain, len, "stream")
}

fn read_mini_chain(
    ministream: &[u8],
    mini_fats: &[u32],
    start: u32,
    len: usize,
) -> Result<Vec<u8>, CfbError> {
    let mut chain = Vec::with_capacity(len.min(MAX_PREALLOC));
    let mut visited = vec![false; mini_fats.len()];
    let mut id = start;
    while id != END_OF_CHAIN && id != FREE_SECTOR {
        let i = id as usize;
        if i >= mini_fats.len() {
            return Err(CfbError::Sector(id));
        }
        if visited[i] {
            return Err(CfbError::ChainCycle(id));
        }
        visited[i] = true;
        let pos = i * MINI_SECTOR_SIZE;
        let end = pos + MINI_SECTOR_SIZE;
        if end > ministream.len() {
            return Err(CfbError::Truncated {
                typ: "mini sector",
                offset: end,
                len: ministream.len(),
            });
        }
        chain.extend_from_slice(&ministream[pos..end]);
        id = mini_fats[i];
    }
    truncate_to(chain, Some(len), "mini stream")
}

fn truncate_to(
    mut chain: Vec<u8>,
    len: Option<usize>,
    typ: &'static str,
) -> Result<Vec<u8>, CfbError> {
    if let Some(len) = len {
        if chain.len() < len {
            return Err(CfbError::Truncated {
                typ,
                offset: len,
                len: chain.len(),
            });
        }
        chain.truncate(len);
    }
    Ok(chain)
}

/// A 128-byte directory entry
struct Directory {
    name: String,
    typ: u8,
    start: u32,
    len: usize,
}

impl Directory {
    fn from_slice(buf: &[u8]) -> Directory {
        let name_len = (read_u16(&buf[0x40..]) as usize).min(64);
        let (name, _) = UTF_16LE.decode_without_bom_handling(&buf[..name_len]);
        let name = name.trim_end_matches('\0').to_string();
        Directory {
            name,
            typ: buf[0x42],
            start: read_u32(&buf[0x74..]),
            len: read_usize(&buf[0x78..]),
        }
    }
}
