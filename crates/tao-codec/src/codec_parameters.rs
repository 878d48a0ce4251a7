//! 编解码器参数.
//!
//! 对标 FFmpeg 的 `AVCodecParameters`, 并合并了解复用阶段会读写的
//! 少量 `AVCodecContext` 字段 (重排深度、编码帧率、ticks_per_frame).

use tao_core::{MediaType, Rational};

use crate::codec_id::CodecId;

/// 编解码器参数
///
/// 通常由容器头部填充, 探测和解析器在读包过程中会继续补全.
#[derive(Debug, Clone, PartialEq)]
pub struct CodecParameters {
    /// 编解码器标识
    pub codec_id: CodecId,
    /// 媒体类型
    pub media_type: MediaType,
    /// 额外数据 (如 SPS/PPS, DecoderSpecificInfo 等)
    pub extra_data: Vec<u8>,
    /// 码率 (bits/s)
    pub bit_rate: u64,

    /// 宽度 (像素)
    pub width: u32,
    /// 高度 (像素)
    pub height: u32,
    /// 码流声明的帧率, 未知时为 0/1
    pub frame_rate: Rational,
    /// 每帧对应的时钟节拍数 (场编码的 H.264/MPEG-2 为 2)
    pub ticks_per_frame: i32,
    /// 解码器重排深度 (B 帧延迟)
    pub has_b_frames: u32,

    /// 采样率 (Hz), 0 表示未知
    pub sample_rate: u32,
    /// 声道数
    pub channels: u32,
    /// 每帧采样数 (0 表示可变)
    pub frame_size: u32,
}

impl CodecParameters {
    /// 创建指定编解码器的参数, 媒体类型取编解码器的默认类型
    pub fn new(codec_id: CodecId) -> Self {
        Self {
            codec_id,
            media_type: codec_id.media_type(),
            ..Self::default()
        }
    }

    /// 更换编解码器, 同时更新媒体类型
    pub fn set_codec(&mut self, codec_id: CodecId, media_type: MediaType) {
        self.codec_id = codec_id;
        self.media_type = media_type;
    }
}

impl Default for CodecParameters {
    fn default() -> Self {
        Self {
            codec_id: CodecId::None,
            media_type: MediaType::Unknown,
            extra_data: Vec::new(),
            bit_rate: 0,
            width: 0,
            height: 0,
            frame_rate: Rational::ZERO,
            ticks_per_frame: 1,
            has_b_frames: 0,
            sample_rate: 0,
            channels: 0,
            frame_size: 0,
        }
    }
}
