//! Internal module providing handy functions

use byteorder::{ByteOrder, LittleEndian};

/// Converts error types into module error enum variants.
macro_rules! from_err {
    ($from:ty, $to:tt, $var:tt) => {
        impl From<$from> for $to {
            fn from(e: $from) -> $to {
                $to::$var(e)
            }
        }
    };
}

pub(crate) fn read_u16(s: &[u8]) -> u16 {
    LittleEndian::read_u16(s)
}

pub(crate) fn read_u32(s: &[u8]) -> u32 {
    LittleEndian::read_u32(s)
}

pub(crate) fn read_usize(s: &[u8]) -> usize {
    read_u32(s) as usize
}

pub(crate) fn read_f64(s: &[u8]) -> f64 {
    LittleEndian::read_f64(s)
}
