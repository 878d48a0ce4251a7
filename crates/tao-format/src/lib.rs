//! # tao-format
//!
//! Tao 多媒体框架解复用库, 提供从数据源读取带完整时间戳的数据包的引擎.
//!
//! 本 crate 对标 FFmpeg 的 libavformat 读包部分:
//! 数据包队列、seek 索引、流级编解码器探测、码流解析器对接、
//! 时间戳重建以及 `av_read_frame` / `av_seek_frame` 流程.
//!
//! ## 使用示例
//!
//! ```rust
//! use tao_codec::{CodecId, CodecParameters, Packet};
//! use tao_format::{DemuxContext, MemorySource, MemoryStream};
//!
//! let mut source = MemorySource::new("demo")
//!     .with_stream(MemoryStream::new(CodecParameters::new(CodecId::Mp3)).with_pts_info(64, 1, 1000));
//! source.push_packet(Packet::from_data(vec![0u8; 16]).with_timestamps(Some(0), Some(0)));
//!
//! let mut ctx = DemuxContext::open(Box::new(source), None).unwrap();
//! let pkt = ctx.read_frame().unwrap();
//! assert_eq!(pkt.pts, Some(0));
//! assert!(ctx.read_frame().unwrap_err().is_eof());
//! ```

pub mod codec_probe;
pub mod context;
pub mod format_id;
pub mod id3v2;
pub mod index;
pub mod options;
pub mod packet_list;
pub mod probe;
pub mod probes;
pub mod registry;
pub mod source;
pub mod stream;
pub mod timing;
pub mod wrap;

// 重导出常用类型
pub use codec_probe::{CodecProber, ProbeHints, ProbeStep};
pub use context::{DemuxBuilder, DemuxContext};
pub use format_id::FormatId;
pub use index::{IndexEntry, IndexFlags, SeekFlags, SeekIndex};
pub use options::DemuxOptions;
pub use packet_list::PacketList;
pub use probe::{CodecTable, FormatProbe, ProbeData, ProbeResult, ProbeScore};
pub use registry::FormatRegistry;
pub use source::{MemoryEntry, MemorySource, MemoryStream, PacketSource, SourceFlags};
pub use stream::{Discard, Disposition, ParseMode, Stream, StreamSet};
pub use timing::{FrameHints, TimingConfig, compute_frame_duration};
pub use wrap::{PtsWrap, WrapBehavior};
