//! 压缩数据包 (Packet).
//!
//! 对标 FFmpeg 的 `AVPacket`, 表示从容器格式中读取的一帧压缩数据.
//!
//! 数据缓冲区使用 [`Bytes`] 引用计数共享: 克隆数据包或从解析器切分出的
//! 子段只增加引用, 最后一个引用释放时缓冲区才被回收.

use bitflags::bitflags;
use bytes::Bytes;
use tao_core::Rational;

bitflags! {
    /// 数据包标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PacketFlags: u32 {
        /// 关键帧
        const KEY = 0x0001;
        /// 数据可能损坏
        const CORRUPT = 0x0002;
        /// 可解码但应丢弃输出 (用于预滚)
        const DISCARD = 0x0004;
    }
}

/// 附加数据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SideDataType {
    /// 新的 extradata (如码流中途更换 SPS/PPS)
    NewExtradata,
    /// 参数变化 (采样率、分辨率等)
    ParamChange,
    /// 调色板
    Palette,
    /// 需跳过的采样数
    SkipSamples,
    /// 容器特定的其他数据
    Other(u32),
}

/// 附加数据块
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideData {
    /// 类型
    pub kind: SideDataType,
    /// 内容
    pub data: Bytes,
}

/// 压缩数据包
///
/// 从容器格式中读取的一帧压缩数据, 需要送入解码器进行解码.
/// 一个 Packet 通常对应一帧视频或若干帧音频的压缩数据.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// 压缩数据
    pub data: Bytes,
    /// 显示时间戳 (PTS), `None` 表示未知
    pub pts: Option<i64>,
    /// 解码时间戳 (DTS), `None` 表示未知
    pub dts: Option<i64>,
    /// 数据包时长 (以 time_base 为单位), 0 表示未知
    pub duration: i64,
    /// 时间基
    pub time_base: Rational,
    /// 所属流的索引
    pub stream_index: usize,
    /// 标志
    pub flags: PacketFlags,
    /// 在容器中的字节偏移量, `None` 表示未知
    pub pos: Option<i64>,
    /// 附加数据
    pub side_data: Vec<SideData>,
}

impl Packet {
    /// 创建空数据包
    pub fn empty() -> Self {
        Self {
            data: Bytes::new(),
            pts: None,
            dts: None,
            duration: 0,
            time_base: Rational::UNDEFINED,
            stream_index: 0,
            flags: PacketFlags::empty(),
            pos: None,
            side_data: Vec::new(),
        }
    }

    /// 从数据创建数据包
    pub fn from_data(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Self::empty()
        }
    }

    /// 设置所属流
    pub fn with_stream(mut self, stream_index: usize) -> Self {
        self.stream_index = stream_index;
        self
    }

    /// 设置 PTS/DTS
    pub fn with_timestamps(mut self, pts: Option<i64>, dts: Option<i64>) -> Self {
        self.pts = pts;
        self.dts = dts;
        self
    }

    /// 设置时长
    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = duration;
        self
    }

    /// 设置字节偏移
    pub fn with_pos(mut self, pos: i64) -> Self {
        self.pos = Some(pos);
        self
    }

    /// 设置标志
    pub fn with_flags(mut self, flags: PacketFlags) -> Self {
        self.flags = flags;
        self
    }

    /// 数据大小 (字节)
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 是否为空包
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 是否为关键帧
    pub fn is_keyframe(&self) -> bool {
        self.flags.contains(PacketFlags::KEY)
    }

    /// 是否标记为损坏
    pub fn is_corrupt(&self) -> bool {
        self.flags.contains(PacketFlags::CORRUPT)
    }

    /// 将附加数据整体移出
    pub fn take_side_data(&mut self) -> Vec<SideData> {
        std::mem::take(&mut self.side_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_克隆共享缓冲区() {
        let pkt = Packet::from_data(vec![1u8, 2, 3, 4]).with_flags(PacketFlags::KEY);
        let clone = pkt.clone();
        assert_eq!(pkt.data.as_ptr(), clone.data.as_ptr());
        assert!(clone.is_keyframe());
        assert!(!clone.is_corrupt());
    }

    #[test]
    fn test_packet_默认未知时间戳() {
        let pkt = Packet::empty();
        assert_eq!(pkt.pts, None);
        assert_eq!(pkt.dts, None);
        assert_eq!(pkt.pos, None);
        assert!(pkt.is_empty());
    }

    #[test]
    fn test_packet_移出附加数据() {
        let mut pkt = Packet::from_data(vec![0u8; 4]);
        pkt.side_data.push(SideData {
            kind: SideDataType::NewExtradata,
            data: Bytes::from_static(b"\x01\x02"),
        });
        let side = pkt.take_side_data();
        assert_eq!(side.len(), 1);
        assert!(pkt.side_data.is_empty());
    }
}
