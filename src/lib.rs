//! # tao-demux
//!
//! 纯 Rust 实现的解复用数据包流水线, 对标 FFmpeg libavformat 的读包部分.
//!
//! 从任意 [`PacketSource`](format::PacketSource) 读取原始数据包, 依次经过
//! 流级编解码器探测、码流解析器切帧、时间戳重建与 GenPTS 交错缓冲,
//! 输出带完整 PTS/DTS/时长/关键帧标志的数据包, 并支持多种 seek 方式.
//!
//! # 快速开始
//!
//! ```rust
//! use tao_demux::codec::{CodecId, CodecParameters, Packet};
//! use tao_demux::format::{DemuxContext, MemorySource, MemoryStream};
//!
//! let mut source = MemorySource::new("demo").with_stream(
//!     MemoryStream::new(CodecParameters::new(CodecId::Aac)).with_pts_info(64, 1, 1000),
//! );
//! for i in 0..3 {
//!     source.push_packet(
//!         Packet::from_data(vec![0u8; 8])
//!             .with_timestamps(Some(i * 23), Some(i * 23))
//!             .with_duration(23),
//!     );
//! }
//!
//! let mut ctx = DemuxContext::open(Box::new(source), None).unwrap();
//! while let Ok(pkt) = ctx.read_frame() {
//!     println!("流 {} pts={:?} dts={:?}", pkt.stream_index, pkt.pts, pkt.dts);
//! }
//! ctx.close();
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `tao-core` | 有理数、时间戳与错误类型 |
//! | `tao-codec` | 数据包、编解码器标识与码流解析器 |
//! | `tao-format` | 解复用引擎 |

pub mod logging;

/// 核心类型与工具 (对标 libavutil)
pub use tao_core as core;

/// 数据包与码流解析器 (对标 libavcodec)
pub use tao_codec as codec;

/// 解复用引擎 (对标 libavformat)
pub use tao_format as format;

/// 获取版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
