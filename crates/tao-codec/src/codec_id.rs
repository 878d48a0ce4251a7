//! 编解码器标识符.
//!
//! 对标 FFmpeg 的 `AVCodecID` 与 `AVCodecDescriptor`, 为每种编解码算法分配唯一标识,
//! 并给出解复用阶段需要的描述属性 (媒体类型、是否仅帧内编码、重排方式).

use std::fmt;
use tao_core::MediaType;

/// 编解码器标识符
///
/// 唯一标识一种编解码算法, 与容器格式无关.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum CodecId {
    /// 未知编解码器
    #[default]
    None,

    // ========================
    // 视频编解码器
    // ========================
    /// H.264 / AVC / MPEG-4 Part 10
    H264,
    /// H.265 / HEVC / MPEG-H Part 2
    H265,
    /// MPEG-1 Video
    Mpeg1Video,
    /// MPEG-2 Video
    Mpeg2Video,
    /// MPEG-4 Part 2 (ASP)
    Mpeg4,
    /// Motion JPEG
    Mjpeg,
    /// JPEG 2000
    Jpeg2000,
    /// PNG (无损)
    Png,
    /// Raw 视频 (未压缩)
    RawVideo,

    // ========================
    // 音频编解码器
    // ========================
    /// AAC (Advanced Audio Coding)
    Aac,
    /// AAC LATM (LOAS 封装)
    AacLatm,
    /// MP3 (MPEG Audio Layer III)
    Mp3,
    /// MP2 (MPEG Audio Layer II)
    Mp2,
    /// FLAC (Free Lossless Audio Codec)
    Flac,
    /// PCM 有符号 16 位小端
    PcmS16le,
    /// AC-3 (Dolby Digital)
    Ac3,
    /// E-AC-3 (Dolby Digital Plus)
    Eac3,
    /// DTS (Digital Theater Systems)
    Dts,
    /// Dolby TrueHD
    TrueHd,
    /// aptX
    Aptx,

    // ========================
    // 字幕与数据
    // ========================
    /// SubRip 字幕
    Srt,
    /// DVB 字幕
    DvbSubtitle,
    /// DVB 图文电视
    DvbTeletext,
    /// 时间码等二进制数据
    BinData,
}

/// 所有已知编解码器, 按名称查找时遍历
const ALL: &[CodecId] = &[
    CodecId::H264,
    CodecId::H265,
    CodecId::Mpeg1Video,
    CodecId::Mpeg2Video,
    CodecId::Mpeg4,
    CodecId::Mjpeg,
    CodecId::Jpeg2000,
    CodecId::Png,
    CodecId::RawVideo,
    CodecId::Aac,
    CodecId::AacLatm,
    CodecId::Mp3,
    CodecId::Mp2,
    CodecId::Flac,
    CodecId::PcmS16le,
    CodecId::Ac3,
    CodecId::Eac3,
    CodecId::Dts,
    CodecId::TrueHd,
    CodecId::Aptx,
    CodecId::Srt,
    CodecId::DvbSubtitle,
    CodecId::DvbTeletext,
    CodecId::BinData,
];

impl CodecId {
    /// 获取编解码器对应的媒体类型
    pub const fn media_type(&self) -> MediaType {
        match self {
            Self::None => MediaType::Unknown,

            // 视频
            Self::H264
            | Self::H265
            | Self::Mpeg1Video
            | Self::Mpeg2Video
            | Self::Mpeg4
            | Self::Mjpeg
            | Self::Jpeg2000
            | Self::Png
            | Self::RawVideo => MediaType::Video,

            // 音频
            Self::Aac
            | Self::AacLatm
            | Self::Mp3
            | Self::Mp2
            | Self::Flac
            | Self::PcmS16le
            | Self::Ac3
            | Self::Eac3
            | Self::Dts
            | Self::TrueHd
            | Self::Aptx => MediaType::Audio,

            // 字幕
            Self::Srt | Self::DvbSubtitle | Self::DvbTeletext => MediaType::Subtitle,

            Self::BinData => MediaType::Data,
        }
    }

    /// 获取编解码器的人类可读名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::H264 => "h264",
            Self::H265 => "hevc",
            Self::Mpeg1Video => "mpeg1video",
            Self::Mpeg2Video => "mpeg2video",
            Self::Mpeg4 => "mpeg4",
            Self::Mjpeg => "mjpeg",
            Self::Jpeg2000 => "jpeg2000",
            Self::Png => "png",
            Self::RawVideo => "rawvideo",
            Self::Aac => "aac",
            Self::AacLatm => "aac_latm",
            Self::Mp3 => "mp3",
            Self::Mp2 => "mp2",
            Self::Flac => "flac",
            Self::PcmS16le => "pcm_s16le",
            Self::Ac3 => "ac3",
            Self::Eac3 => "eac3",
            Self::Dts => "dts",
            Self::TrueHd => "truehd",
            Self::Aptx => "aptx",
            Self::Srt => "subrip",
            Self::DvbSubtitle => "dvb_subtitle",
            Self::DvbTeletext => "dvb_teletext",
            Self::BinData => "bin_data",
        }
    }

    /// 按名称查找编解码器
    pub fn from_name(name: &str) -> Option<Self> {
        ALL.iter().copied().find(|id| id.name() == name)
    }

    /// 是否仅帧内编码 (每个包都可独立解码)
    ///
    /// 字幕与数据类编解码器总是视为帧内编码.
    pub const fn is_intra_only(&self) -> bool {
        match self {
            Self::None => false,
            Self::Mjpeg | Self::Jpeg2000 | Self::Png | Self::RawVideo => true,
            Self::Aac
            | Self::AacLatm
            | Self::Mp3
            | Self::Mp2
            | Self::Flac
            | Self::PcmS16le
            | Self::Ac3
            | Self::Eac3
            | Self::Dts
            | Self::Aptx => true,
            Self::TrueHd => false,
            Self::H264 | Self::H265 | Self::Mpeg1Video | Self::Mpeg2Video | Self::Mpeg4 => false,
            Self::Srt | Self::DvbSubtitle | Self::DvbTeletext | Self::BinData => true,
        }
    }

    /// 是否 "一进一出" 的重排结构
    ///
    /// H.264/HEVC 允许任意参考结构, 输入与输出帧之间没有固定延迟,
    /// DTS 需要用误差累积启发式从重排窗口中挑选.
    pub const fn is_one_in_one_out(&self) -> bool {
        !matches!(self, Self::H264 | Self::H265)
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
