//! 内容探测的候选格式标识.
//!
//! 对标 FFmpeg 的裸流输入格式名称, 以及 `set_codec_from_probe_data`
//! 中 "格式名 → 编解码器" 的映射表. 流的编解码器未知时, 探测得到的
//! 格式只有出现在映射表中才会被采用.

use std::fmt;

use tao_codec::CodecId;
use tao_core::MediaType;

/// 候选格式标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FormatId {
    // ========================
    // 音频基本流
    // ========================
    /// AAC ADTS
    AacAdts,
    /// AC-3
    Ac3,
    /// aptX
    Aptx,
    /// DTS
    Dts,
    /// E-AC-3
    Eac3,
    /// AAC LATM (LOAS 封装)
    Loas,
    /// MPEG Audio (MP1/MP2/MP3)
    Mp3,
    /// Dolby TrueHD
    TrueHd,

    // ========================
    // 视频基本流
    // ========================
    /// H.264 Annex B
    H264,
    /// H.265 Annex B
    Hevc,
    /// MPEG-4 Part 2 Elementary Stream (M4V)
    Mpeg4Es,
    /// JPEG 2000 码流
    Jpeg2000,
    /// MPEG-1/2 视频
    MpegVideo,

    // ========================
    // 字幕
    // ========================
    /// DVB 字幕
    DvbSub,
    /// DVB 图文电视
    DvbTeletext,
}

impl FormatId {
    /// 所有已知格式标识的列表
    pub const ALL: &[FormatId] = &[
        Self::AacAdts,
        Self::Ac3,
        Self::Aptx,
        Self::Dts,
        Self::Eac3,
        Self::Loas,
        Self::Mp3,
        Self::TrueHd,
        Self::H264,
        Self::Hevc,
        Self::Mpeg4Es,
        Self::Jpeg2000,
        Self::MpegVideo,
        Self::DvbSub,
        Self::DvbTeletext,
    ];

    /// 格式名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AacAdts => "aac",
            Self::Ac3 => "ac3",
            Self::Aptx => "aptx",
            Self::Dts => "dts",
            Self::Eac3 => "eac3",
            Self::Loas => "loas",
            Self::Mp3 => "mp3",
            Self::TrueHd => "truehd",
            Self::H264 => "h264",
            Self::Hevc => "hevc",
            Self::Mpeg4Es => "m4v",
            Self::Jpeg2000 => "mjpeg_2000",
            Self::MpegVideo => "mpegvideo",
            Self::DvbSub => "dvbsub",
            Self::DvbTeletext => "dvbtxt",
        }
    }

    /// 常用文件扩展名
    pub const fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::AacAdts => &["aac"],
            Self::Ac3 => &["ac3"],
            Self::Aptx => &["aptx"],
            Self::Dts => &["dts"],
            Self::Eac3 => &["eac3", "ec3"],
            Self::Loas => &["loas", "latm"],
            Self::Mp3 => &["mp2", "mp3", "m2a", "mpa"],
            Self::TrueHd => &["thd"],
            Self::H264 => &["h26l", "h264", "264", "avc"],
            Self::Hevc => &["hevc", "h265", "265"],
            Self::Mpeg4Es => &["m4v"],
            Self::Jpeg2000 => &["j2c", "j2k"],
            Self::MpegVideo => &["m1v", "m2v"],
            Self::DvbSub => &["sub", "dvbsub"],
            Self::DvbTeletext => &[],
        }
    }

    /// MIME 类型
    pub const fn mime_types(&self) -> &'static [&'static str] {
        match self {
            Self::AacAdts => &["audio/aac", "audio/aacp", "audio/x-aac"],
            Self::Ac3 => &["audio/ac3"],
            Self::Eac3 => &["audio/eac3"],
            Self::Mp3 => &["audio/mpeg"],
            Self::H264 => &["video/h264"],
            Self::Hevc => &["video/h265"],
            _ => &[],
        }
    }

    /// 探测到该格式时应赋予流的编解码器与媒体类型
    pub const fn codec_mapping(&self) -> (CodecId, MediaType) {
        match self {
            Self::AacAdts => (CodecId::Aac, MediaType::Audio),
            Self::Ac3 => (CodecId::Ac3, MediaType::Audio),
            Self::Aptx => (CodecId::Aptx, MediaType::Audio),
            Self::Dts => (CodecId::Dts, MediaType::Audio),
            Self::Eac3 => (CodecId::Eac3, MediaType::Audio),
            Self::Loas => (CodecId::AacLatm, MediaType::Audio),
            Self::Mp3 => (CodecId::Mp3, MediaType::Audio),
            Self::TrueHd => (CodecId::TrueHd, MediaType::Audio),
            Self::H264 => (CodecId::H264, MediaType::Video),
            Self::Hevc => (CodecId::H265, MediaType::Video),
            Self::Mpeg4Es => (CodecId::Mpeg4, MediaType::Video),
            Self::Jpeg2000 => (CodecId::Jpeg2000, MediaType::Video),
            Self::MpegVideo => (CodecId::Mpeg2Video, MediaType::Video),
            Self::DvbSub => (CodecId::DvbSubtitle, MediaType::Subtitle),
            Self::DvbTeletext => (CodecId::DvbTeletext, MediaType::Subtitle),
        }
    }

    /// 按名称查找格式
    pub fn from_name(name: &str) -> Option<FormatId> {
        Self::ALL.iter().find(|id| id.name() == name).copied()
    }

    /// 根据文件扩展名猜测格式
    ///
    /// # 参数
    /// - `ext`: 文件扩展名 (不含 `.`, 如 "aac", "m4v")
    pub fn from_extension(ext: &str) -> Option<FormatId> {
        let ext_lower = ext.to_lowercase();
        Self::ALL
            .iter()
            .find(|id| id.extensions().contains(&ext_lower.as_str()))
            .copied()
    }

    /// 文件名的扩展名是否属于该格式
    pub fn matches_filename(&self, filename: &str) -> bool {
        match filename.rsplit_once('.') {
            Some((_, ext)) => {
                let ext = ext.to_lowercase();
                self.extensions().contains(&ext.as_str())
            }
            None => false,
        }
    }

    /// MIME 类型是否属于该格式 (忽略 `;` 之后的参数)
    pub fn matches_mime(&self, mime: &str) -> bool {
        let base = mime.split(';').next().unwrap_or(mime).trim();
        self.mime_types()
            .iter()
            .any(|m| m.eq_ignore_ascii_case(base))
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_id_名称往返() {
        for id in FormatId::ALL {
            assert_eq!(FormatId::from_name(id.name()), Some(*id));
        }
        assert_eq!(FormatId::from_name("matroska"), None);
    }

    #[test]
    fn test_format_id_编解码器映射() {
        assert_eq!(
            FormatId::Loas.codec_mapping(),
            (CodecId::AacLatm, MediaType::Audio)
        );
        assert_eq!(
            FormatId::Mpeg4Es.codec_mapping(),
            (CodecId::Mpeg4, MediaType::Video)
        );
        assert_eq!(FormatId::DvbSub.codec_mapping().1, MediaType::Subtitle);
    }

    #[test]
    fn test_format_id_扩展名与mime() {
        assert_eq!(FormatId::from_extension("M4V"), Some(FormatId::Mpeg4Es));
        assert!(FormatId::Mp3.matches_filename("song.MP3"));
        assert!(!FormatId::Mp3.matches_filename("mp3"));
        assert!(FormatId::AacAdts.matches_mime("audio/aac; rate=44100"));
        assert!(!FormatId::AacAdts.matches_mime("audio/mpeg"));
    }
}
