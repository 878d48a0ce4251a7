//! 流级编解码器探测.
//!
//! 对标 FFmpeg 的 `probe_codec` / `set_codec_from_probe_data`.
//!
//! 容器元数据不足以确定编解码器的流, 其数据包先进入原始包缓冲,
//! 同时把内容累积到探测缓冲区. 累积大小跨过 2 的幂边界、
//! 包预算耗尽或原始缓冲字节预算耗尽时, 对全部累积数据重新打分.
//! 分数高于 [`SCORE_STREAM_RETRY`] 或预算耗尽时结束探测.

use log::{debug, warn};
use tao_codec::{CodecId, CodecParameters};
use tao_core::MediaType;

use crate::probe::{CodecTable, ProbeData, SCORE_STREAM_RETRY};

/// 探测状态
///
/// `request_probe` 语义:
/// - `0`: 编解码器由容器给出, 不需要探测
/// - `> 0`: 正在探测, 数值为替换已有编解码器所需的最低分数
/// - `-1`: 探测已结束
#[derive(Debug, Clone)]
pub struct CodecProber {
    buf: Vec<u8>,
    probe_packets: i32,
    request_probe: i32,
}

/// 探测输入的文件名/MIME 提示
#[derive(Debug, Clone, Copy, Default)]
pub struct ProbeHints<'a> {
    /// 文件名
    pub filename: Option<&'a str>,
    /// MIME 类型
    pub mime_type: Option<&'a str>,
}

/// 单次喂入的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeStep {
    /// 本次是否重新打分 (此后需要重新应用强制编解码器)
    pub rescored: bool,
    /// 流的编解码器是否被探测结果改写
    pub codec_updated: bool,
    /// 探测是否在本次结束
    pub finished: bool,
    /// 预算耗尽时以不足阈值的分数选定了编解码器
    pub low_confidence: bool,
}

impl CodecProber {
    /// 创建探测状态, `max_probe_packets` 为包预算
    pub fn new(max_probe_packets: i32) -> Self {
        Self {
            buf: Vec::new(),
            probe_packets: max_probe_packets,
            request_probe: 0,
        }
    }

    /// 请求探测, `min_score` 为替换已有编解码器所需的最低分数 (至少为 1)
    pub fn request(&mut self, min_score: i32) {
        self.request_probe = min_score.max(1);
    }

    /// 是否正在探测
    pub fn is_probing(&self) -> bool {
        self.request_probe > 0
    }

    /// 探测是否已完成或不需要
    pub fn is_done(&self) -> bool {
        self.request_probe <= 0
    }

    /// 剩余包预算
    pub fn probe_packets(&self) -> i32 {
        self.probe_packets
    }

    /// 已累积的字节数
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// seek 后恢复包预算
    pub fn reset_budget(&mut self, max_probe_packets: i32) {
        self.probe_packets = max_probe_packets;
    }

    /// 立即结束探测, 丢弃已累积数据
    pub fn finish(&mut self) {
        self.buf = Vec::new();
        self.request_probe = -1;
    }

    /// 喂入一个数据包 (`None` 表示数据源已无更多数据可供探测)
    ///
    /// `raw_remaining` 为原始包缓冲剩余字节预算.
    /// 探测缓冲区扩容失败只会结束该流的探测, 不影响调用方.
    pub fn feed(
        &mut self,
        stream_index: usize,
        params: &mut CodecParameters,
        data: Option<&[u8]>,
        raw_remaining: i64,
        table: &dyn CodecTable,
        hints: ProbeHints<'_>,
    ) -> ProbeStep {
        let mut step = ProbeStep::default();
        if self.request_probe <= 0 {
            return step;
        }
        self.probe_packets -= 1;

        let appended = match data {
            Some(d) if self.buf.try_reserve(d.len()).is_ok() => {
                self.buf.extend_from_slice(d);
                d.len()
            }
            Some(_) => {
                warn!("流 {stream_index}: 探测缓冲区扩容失败");
                self.no_packet(stream_index);
                0
            }
            None => {
                self.no_packet(stream_index);
                0
            }
        };

        let end = raw_remaining <= 0 || self.probe_packets <= 0;
        let size = self.buf.len();
        if end || log2(size) != log2(size - appended) {
            let (score, updated) = set_codec_from_probe(
                params,
                self.request_probe,
                &ProbeData {
                    buf: &self.buf,
                    filename: hints.filename,
                    mime_type: hints.mime_type,
                },
                table,
            );
            step.rescored = true;
            step.codec_updated = updated;
            debug!(
                "流 {stream_index}: 探测 {size} 字节 (剩余 {} 包), 编解码器 {} 分数 {score}",
                self.probe_packets, params.codec_id
            );
            if (params.codec_id != CodecId::None && score > SCORE_STREAM_RETRY) || end {
                self.finish();
                step.finished = true;
                if params.codec_id == CodecId::None {
                    warn!("流 {stream_index}: 编解码器探测失败");
                } else if end && score <= SCORE_STREAM_RETRY {
                    step.low_confidence = true;
                    warn!(
                        "流 {stream_index}: 预算耗尽, 以低分 {score} 选定编解码器 {}",
                        params.codec_id
                    );
                } else {
                    debug!("流 {stream_index}: 探测完成, 编解码器 {}", params.codec_id);
                }
            }
        }
        step
    }

    fn no_packet(&mut self, stream_index: usize) {
        self.probe_packets = 0;
        if self.buf.is_empty() {
            warn!("流 {stream_index}: 没有可供探测的数据");
        }
    }
}

/// `floor(log2(v))`, v 为 0 时取 0
fn log2(v: usize) -> u32 {
    (v | 1).ilog2()
}

/// 用探测结果设置流的编解码器, 返回 (分数, 是否改写)
///
/// - 候选格式不是音频而流已有采样率时跳过
/// - 分数低于 `request_probe` 时不能替换为不同的编解码器
/// - 没有可用候选时分数为 0
pub fn set_codec_from_probe(
    params: &mut CodecParameters,
    request_probe: i32,
    pd: &ProbeData<'_>,
    table: &dyn CodecTable,
) -> (u32, bool) {
    let Some(result) = table.score_probe(pd) else {
        return (0, false);
    };
    let (codec_id, media_type) = result.format_id.codec_mapping();
    if media_type != MediaType::Audio && params.sample_rate != 0 {
        return (0, false);
    }
    if i64::from(request_probe) > i64::from(result.score) && params.codec_id != codec_id {
        return (0, false);
    }
    params.set_codec(codec_id, media_type);
    (result.score, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format_id::FormatId;
    use crate::probe::ProbeResult;

    /// 累积数据达到 `need` 字节后给出固定结果
    struct ThresholdTable {
        need: usize,
        format_id: FormatId,
        score: u32,
    }

    impl CodecTable for ThresholdTable {
        fn score_probe(&self, pd: &ProbeData<'_>) -> Option<ProbeResult> {
            (pd.buf.len() >= self.need).then_some(ProbeResult {
                format_id: self.format_id,
                score: self.score,
            })
        }
    }

    fn feed(
        prober: &mut CodecProber,
        params: &mut CodecParameters,
        data: Option<&[u8]>,
        table: &dyn CodecTable,
    ) -> ProbeStep {
        prober.feed(0, params, data, 1 << 20, table, ProbeHints::default())
    }

    #[test]
    fn test_prober_跨过2的幂时重新打分() {
        let table = ThresholdTable {
            need: 64,
            format_id: FormatId::AacAdts,
            score: 51,
        };
        let mut prober = CodecProber::new(2500);
        prober.request(1);
        let mut params = CodecParameters::default();
        let chunk = [0u8; 16];

        // 16 -> 32 -> 48 -> 64: 只有跨过 2 的幂的喂入才重新打分
        let steps: Vec<ProbeStep> = (0..4)
            .map(|_| feed(&mut prober, &mut params, Some(&chunk), &table))
            .collect();
        assert!(steps[0].rescored);
        assert!(steps[1].rescored);
        assert!(!steps[2].rescored);
        assert!(steps[3].rescored && steps[3].finished);
        assert_eq!(params.codec_id, CodecId::Aac);
        assert_eq!(params.media_type, MediaType::Audio);
        assert!(prober.is_done());
        assert_eq!(prober.buffered(), 0);
    }

    #[test]
    fn test_prober_低分需继续累积() {
        let table = ThresholdTable {
            need: 0,
            format_id: FormatId::Mp3,
            score: 20,
        };
        let mut prober = CodecProber::new(3);
        prober.request(1);
        let mut params = CodecParameters::default();
        let s1 = feed(&mut prober, &mut params, Some(&[1; 8]), &table);
        assert!(s1.rescored && !s1.finished && !s1.low_confidence);
        // 分数不足阈值但编解码器已先行设置
        assert_eq!(params.codec_id, CodecId::Mp3);
        feed(&mut prober, &mut params, Some(&[1; 8]), &table);
        // 预算耗尽, 接受低分结果
        let s3 = feed(&mut prober, &mut params, Some(&[1; 8]), &table);
        assert!(s3.finished);
        assert_eq!(params.codec_id, CodecId::Mp3);
        assert!(s3.low_confidence, "预算耗尽的低分结果应标记为低可信度");
    }

    #[test]
    fn test_prober_高分结束不标记低可信度() {
        let table = ThresholdTable {
            need: 0,
            format_id: FormatId::Mp3,
            score: 90,
        };
        let mut prober = CodecProber::new(1);
        prober.request(1);
        let mut params = CodecParameters::default();
        // 预算同时耗尽, 但分数足够
        let step = feed(&mut prober, &mut params, Some(&[1; 8]), &table);
        assert!(step.finished);
        assert!(!step.low_confidence);
        assert_eq!(params.codec_id, CodecId::Mp3);
    }

    #[test]
    fn test_prober_无数据时结束() {
        let table = ThresholdTable {
            need: usize::MAX,
            format_id: FormatId::Mp3,
            score: 90,
        };
        let mut prober = CodecProber::new(2500);
        prober.request(1);
        let mut params = CodecParameters::default();
        let step = feed(&mut prober, &mut params, None, &table);
        assert!(step.finished);
        assert_eq!(prober.probe_packets(), 0);
        assert_eq!(params.codec_id, CodecId::None);
    }

    #[test]
    fn test_prober_未请求时不处理() {
        let table = ThresholdTable {
            need: 0,
            format_id: FormatId::Mp3,
            score: 90,
        };
        let mut prober = CodecProber::new(10);
        let mut params = CodecParameters::default();
        let step = feed(&mut prober, &mut params, Some(&[0; 4]), &table);
        assert_eq!(step, ProbeStep::default());
        assert_eq!(prober.probe_packets(), 10);
    }

    #[test]
    fn test_set_codec_采样率与最低分约束() {
        let video = ThresholdTable {
            need: 0,
            format_id: FormatId::H264,
            score: 51,
        };
        let pd = ProbeData::new(&[0; 4]);

        let mut audio_params = CodecParameters::default();
        audio_params.sample_rate = 48000;
        assert_eq!(set_codec_from_probe(&mut audio_params, 1, &pd, &video), (0, false));

        let mut params = CodecParameters::new(CodecId::Mpeg4);
        assert_eq!(set_codec_from_probe(&mut params, 60, &pd, &video), (0, false));
        assert_eq!(params.codec_id, CodecId::Mpeg4);
        assert_eq!(set_codec_from_probe(&mut params, 40, &pd, &video), (51, true));
        assert_eq!(params.codec_id, CodecId::H264);
    }
}
