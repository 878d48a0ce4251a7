//! 内置码流解析器.

pub mod adts;
pub mod mpeg4;

pub use adts::{AdtsHeader, AdtsParser, parse_adts_header};
pub use mpeg4::{Mpeg4StartCodeType, Mpeg4VideoParser};
