//! # tao-codec
//!
//! Tao 多媒体框架编解码器层, 提供 Packet 抽象、编解码器标识与码流解析器.
//!
//! 本 crate 对标 FFmpeg 的 libavcodec 中与解复用相关的部分:
//! `AVPacket`、`AVCodecID`/`AVCodecDescriptor`、`AVCodecParser`.
//!
//! ## 使用示例
//!
//! ```rust
//! use tao_codec::{CodecId, CodecParameters, ParserRegistry};
//!
//! let registry = ParserRegistry::with_builtin();
//! let mut parser = registry.create(CodecId::Aac).unwrap();
//! let mut params = CodecParameters::new(CodecId::Aac);
//! let (consumed, segment) = parser.parse(&mut params, &[], None, None, None);
//! assert_eq!(consumed, 0);
//! assert!(segment.is_none());
//! ```

pub mod codec_id;
pub mod codec_parameters;
pub mod packet;
pub mod parser;
pub mod parsers;
pub mod registry;

// 重导出常用类型
pub use codec_id::CodecId;
pub use codec_parameters::CodecParameters;
pub use packet::{Packet, PacketFlags, SideData, SideDataType};
pub use parser::{
    CodecParser, FrameData, ParseOutput, ParsedFrame, ParsedSegment, ParserContext, ParserFlags,
    PictureType,
};
pub use registry::{ParserFactory, ParserRegistry};
