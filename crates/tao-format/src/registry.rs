//! 格式探测器注册表.
//!
//! 管理所有已注册的内容探测器, 实现按内容、扩展名和 MIME 类型
//! 选出最佳候选格式 (对标 FFmpeg 的 `av_probe_input_format3`).
//!
//! 进程级的内置注册表通过 [`FormatRegistry::global`] 获取,
//! 首次访问时初始化一次.

use std::sync::OnceLock;

use log::{debug, trace};

use crate::format_id::FormatId;
use crate::id3v2::{ID3V2_DEFAULT_MAGIC, id3v2_match, id3v2_tag_len};
use crate::probe::{
    CodecTable, FormatProbe, PROBE_BUF_MAX, ProbeData, ProbeResult, ProbeScore, SCORE_EXTENSION,
    SCORE_MIME, SCORE_STREAM_RETRY,
};
use crate::probes::builtin_probes;

/// 进程级内置注册表
static GLOBAL: OnceLock<FormatRegistry> = OnceLock::new();

/// 开头的 ID3v2 标签相对探测数据的大小
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Id3State {
    /// 没有 ID3v2 标签
    None,
    /// 标签已跳过, 但剩余数据不足标签本身大小
    AlmostGreaterProbe,
    /// 标签大于探测数据
    GreaterProbe,
    /// 标签大于探测数据上限
    GreaterMaxProbe,
}

/// 格式探测器注册表
pub struct FormatRegistry {
    /// 格式探测器列表
    probes: Vec<Box<dyn FormatProbe>>,
}

impl FormatRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self { probes: Vec::new() }
    }

    /// 创建包含全部内置探测器的注册表
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for probe in builtin_probes() {
            registry.register_probe(probe);
        }
        registry
    }

    /// 进程级内置注册表
    pub fn global() -> &'static FormatRegistry {
        GLOBAL.get_or_init(|| {
            let registry = Self::with_builtin();
            debug!("初始化格式探测注册表, 共 {} 个探测器", registry.probes.len());
            registry
        })
    }

    /// 注册一个格式探测器
    pub fn register_probe(&mut self, probe: Box<dyn FormatProbe>) {
        self.probes.push(probe);
    }

    /// 已注册探测器对应的格式
    pub fn list_probes(&self) -> Vec<FormatId> {
        self.probes.iter().map(|p| p.format_id()).collect()
    }

    /// 探测数据的格式
    ///
    /// - 开头的 ID3v2 标签在数据足够时被跳过
    /// - 扩展名匹配把分数提到至少 1 (标签过大时提到 24 或 50)
    /// - MIME 匹配把分数提到 75
    /// - 多个格式并列最高分时返回 `None`
    /// - 标签大于探测数据时最高分不超过 24
    pub fn probe(&self, pd: &ProbeData<'_>) -> Option<ProbeResult> {
        let mut lpd = *pd;
        let mut id3 = Id3State::None;

        if lpd.buf.len() > 10 && id3v2_match(lpd.buf, ID3V2_DEFAULT_MAGIC) {
            let id3len = id3v2_tag_len(lpd.buf);
            if lpd.buf.len() > id3len + 16 {
                if lpd.buf.len() < 2 * id3len + 16 {
                    id3 = Id3State::AlmostGreaterProbe;
                }
                lpd = lpd.with_buf(&lpd.buf[id3len..]);
            } else if id3len >= PROBE_BUF_MAX {
                id3 = Id3State::GreaterMaxProbe;
            } else {
                id3 = Id3State::GreaterProbe;
            }
        }

        let mut best: Option<FormatId> = None;
        let mut score_max: ProbeScore = 0;
        for probe in &self.probes {
            let format_id = probe.format_id();
            let mut score = probe.probe(&lpd).unwrap_or(0);
            if score > 0 {
                trace!("探测 {format_id}: 分数 {score}, 数据 {} 字节", lpd.buf.len());
            }
            if lpd.filename.is_some_and(|f| format_id.matches_filename(f)) {
                score = match id3 {
                    Id3State::None => score.max(1),
                    Id3State::GreaterProbe | Id3State::AlmostGreaterProbe => {
                        score.max(SCORE_STREAM_RETRY)
                    }
                    Id3State::GreaterMaxProbe => score.max(SCORE_EXTENSION),
                };
            }
            if lpd.mime_type.is_some_and(|m| format_id.matches_mime(m)) && score < SCORE_MIME {
                debug!("探测 {format_id}: MIME 类型匹配, 分数 {score} 提升至 {SCORE_MIME}");
                score = SCORE_MIME;
            }
            if score > score_max {
                score_max = score;
                best = Some(format_id);
            } else if score == score_max {
                best = None;
            }
        }

        if id3 == Id3State::GreaterProbe {
            score_max = score_max.min(SCORE_STREAM_RETRY);
        }

        best.map(|format_id| ProbeResult {
            format_id,
            score: score_max,
        })
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CodecTable for FormatRegistry {
    fn score_probe(&self, pd: &ProbeData<'_>) -> Option<ProbeResult> {
        self.probe(pd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProbe(FormatId, ProbeScore);

    impl FormatProbe for FixedProbe {
        fn probe(&self, _pd: &ProbeData<'_>) -> Option<ProbeScore> {
            (self.1 > 0).then_some(self.1)
        }

        fn format_id(&self) -> FormatId {
            self.0
        }
    }

    fn registry(entries: &[(FormatId, ProbeScore)]) -> FormatRegistry {
        let mut r = FormatRegistry::new();
        for &(id, score) in entries {
            r.register_probe(Box::new(FixedProbe(id, score)));
        }
        r
    }

    #[test]
    fn test_registry_选出最高分() {
        let r = registry(&[(FormatId::AacAdts, 10), (FormatId::Mp3, 51)]);
        let res = r.probe(&ProbeData::new(&[0u8; 32])).unwrap();
        assert_eq!(res.format_id, FormatId::Mp3);
        assert_eq!(res.score, 51);
    }

    #[test]
    fn test_registry_并列最高分无结果() {
        let r = registry(&[(FormatId::AacAdts, 30), (FormatId::Mp3, 30)]);
        assert_eq!(r.probe(&ProbeData::new(&[0u8; 32])), None);
        let empty = registry(&[(FormatId::AacAdts, 0)]);
        assert_eq!(empty.probe(&ProbeData::new(&[0u8; 32])), None);
    }

    #[test]
    fn test_registry_扩展名与mime加分() {
        let r = registry(&[(FormatId::AacAdts, 0), (FormatId::Mp3, 0)]);
        let pd = ProbeData {
            buf: &[0u8; 32],
            filename: Some("a.mp3"),
            mime_type: None,
        };
        assert_eq!(r.probe(&pd).map(|p| (p.format_id, p.score)), Some((FormatId::Mp3, 1)));
        let pd = ProbeData {
            mime_type: Some("audio/aac"),
            ..pd
        };
        assert_eq!(
            r.probe(&pd).map(|p| (p.format_id, p.score)),
            Some((FormatId::AacAdts, SCORE_MIME))
        );
    }

    #[test]
    fn test_registry_id3标签过大时封顶() {
        // 标签长度 10 + 1000, 数据只有 64 字节
        let mut data = b"ID3\x04\x00\x00\x00\x00\x07\x68".to_vec();
        data.resize(64, 0);
        let r = registry(&[(FormatId::Mp3, 80)]);
        let res = r.probe(&ProbeData::new(&data)).unwrap();
        assert_eq!(res.score, SCORE_STREAM_RETRY);
    }

    #[test]
    fn test_registry_跳过id3后探测() {
        let mut data = b"ID3\x04\x00\x00\x00\x00\x00\x04".to_vec();
        data.extend_from_slice(&[0xEE; 4]);
        data.extend(std::iter::repeat_n(0x11, 40));

        struct AfterTag;
        impl FormatProbe for AfterTag {
            fn probe(&self, pd: &ProbeData<'_>) -> Option<ProbeScore> {
                (pd.buf.first() == Some(&0x11)).then_some(60)
            }
            fn format_id(&self) -> FormatId {
                FormatId::Mp3
            }
        }
        let mut r = FormatRegistry::new();
        r.register_probe(Box::new(AfterTag));
        assert_eq!(r.probe(&ProbeData::new(&data)).map(|p| p.score), Some(60));
    }

    #[test]
    fn test_registry_全局实例只初始化一次() {
        let a = FormatRegistry::global() as *const FormatRegistry;
        let b = FormatRegistry::global() as *const FormatRegistry;
        assert_eq!(a, b);
        assert!(FormatRegistry::global().list_probes().contains(&FormatId::H264));
    }
}
