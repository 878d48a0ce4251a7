//! 解复用引擎配置.
//!
//! 对标 FFmpeg `AVFormatContext` 中影响读包流程的选项
//! (`max_probe_packets`、`fflags`、`*_codec_id` 等).
//! 可从 JSON 等配置文件反序列化, 缺省字段取 FFmpeg 的默认值.

use serde::{Deserialize, Serialize};
use tao_codec::{CodecId, CodecParameters};
use tao_core::{MediaType, TaoError, TaoResult};

/// 解复用引擎配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DemuxOptions {
    /// 每条流参与编解码器探测的最大包数
    #[serde(default = "default_max_probe_packets")]
    pub max_probe_packets: i32,
    /// 原始包缓冲的字节预算
    #[serde(default = "default_raw_packet_buffer_size")]
    pub raw_packet_buffer_size: i64,
    /// 单条流 seek 索引的内存上限 (字节)
    #[serde(default = "default_max_index_size")]
    pub max_index_size: usize,
    /// 最大流数量
    #[serde(default = "default_max_streams")]
    pub max_streams: usize,
    /// 丢弃标记为损坏的数据包
    #[serde(default)]
    pub discard_corrupt: bool,
    /// 通过前瞻补全缺失的 PTS
    #[serde(default)]
    pub gen_pts: bool,
    /// PTS 已知时忽略 DTS
    #[serde(default)]
    pub ignore_dts: bool,
    /// 不做任何时间戳重建
    #[serde(default)]
    pub no_fill_in: bool,
    /// 不创建码流解析器
    #[serde(default)]
    pub no_parse: bool,
    /// 检测并修正时间戳回绕
    #[serde(default = "default_true")]
    pub correct_ts_overflow: bool,
    /// 输入的文件名或 URL, 用于探测时的扩展名匹配
    #[serde(default)]
    pub url: Option<String>,
    /// 输入的 MIME 类型
    #[serde(default)]
    pub mime_type: Option<String>,
    /// 强制视频编解码器
    #[serde(default)]
    pub video_codec: Option<String>,
    /// 强制音频编解码器
    #[serde(default)]
    pub audio_codec: Option<String>,
    /// 强制字幕编解码器
    #[serde(default)]
    pub subtitle_codec: Option<String>,
    /// 强制数据流编解码器
    #[serde(default)]
    pub data_codec: Option<String>,
}

fn default_max_probe_packets() -> i32 {
    2500
}

fn default_raw_packet_buffer_size() -> i64 {
    2_500_000
}

fn default_max_index_size() -> usize {
    1 << 20
}

fn default_max_streams() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

impl Default for DemuxOptions {
    fn default() -> Self {
        Self {
            max_probe_packets: default_max_probe_packets(),
            raw_packet_buffer_size: default_raw_packet_buffer_size(),
            max_index_size: default_max_index_size(),
            max_streams: default_max_streams(),
            discard_corrupt: false,
            gen_pts: false,
            ignore_dts: false,
            no_fill_in: false,
            no_parse: false,
            correct_ts_overflow: true,
            url: None,
            mime_type: None,
            video_codec: None,
            audio_codec: None,
            subtitle_codec: None,
            data_codec: None,
        }
    }
}

/// 已解析的强制编解码器
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ForcedCodecs {
    video: Option<CodecId>,
    audio: Option<CodecId>,
    subtitle: Option<CodecId>,
    data: Option<CodecId>,
}

impl ForcedCodecs {
    /// 解析配置中的编解码器名称, 未知名称返回 [`TaoError::InvalidArgument`]
    pub(crate) fn from_options(opts: &DemuxOptions) -> TaoResult<Self> {
        fn resolve(name: Option<&str>) -> TaoResult<Option<CodecId>> {
            name.map(|n| {
                CodecId::from_name(n)
                    .ok_or_else(|| TaoError::InvalidArgument(format!("未知的编解码器: {n}")))
            })
            .transpose()
        }
        Ok(Self {
            video: resolve(opts.video_codec.as_deref())?,
            audio: resolve(opts.audio_codec.as_deref())?,
            subtitle: resolve(opts.subtitle_codec.as_deref())?,
            data: resolve(opts.data_codec.as_deref())?,
        })
    }

    /// 某媒体类型的强制编解码器
    pub(crate) fn for_media(&self, media_type: MediaType) -> Option<CodecId> {
        match media_type {
            MediaType::Video => self.video,
            MediaType::Audio => self.audio,
            MediaType::Subtitle => self.subtitle,
            MediaType::Data => self.data,
            _ => None,
        }
    }

    /// 用强制编解码器覆盖流参数中的编解码器
    pub(crate) fn apply(&self, params: &mut CodecParameters) {
        if let Some(id) = self.for_media(params.media_type) {
            params.codec_id = id;
        }
    }
}
