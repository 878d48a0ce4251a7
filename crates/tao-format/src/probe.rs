//! 格式探测.
//!
//! 通过分析数据内容、文件扩展名和 MIME 类型, 为候选格式打分.
//! 对标 FFmpeg 的 `AVProbeData` 与 `AVPROBE_SCORE_*`.

use crate::format_id::FormatId;

/// 探测置信度
///
/// 数值越高, 表示对格式判断越有信心.
pub type ProbeScore = u32;

/// 流内容探测的接受阈值: 分数必须严格大于该值
pub const SCORE_STREAM_RETRY: ProbeScore = SCORE_RETRY - 1;

/// 低于该分数时容器探测会继续读取更多数据
pub const SCORE_RETRY: ProbeScore = SCORE_MAX / 4;

/// 最低探测分数 (仅根据扩展名)
pub const SCORE_EXTENSION: ProbeScore = 50;

/// 中等探测分数 (MIME 类型匹配)
pub const SCORE_MIME: ProbeScore = 75;

/// 最高探测分数 (魔数完全匹配)
pub const SCORE_MAX: ProbeScore = 100;

/// 单次探测最多使用的数据量
pub const PROBE_BUF_MAX: usize = 1 << 20;

/// 探测输入
#[derive(Debug, Clone, Copy, Default)]
pub struct ProbeData<'a> {
    /// 已累积的数据
    pub buf: &'a [u8],
    /// 文件名 (用于扩展名匹配)
    pub filename: Option<&'a str>,
    /// MIME 类型
    pub mime_type: Option<&'a str>,
}

impl<'a> ProbeData<'a> {
    /// 只含数据的探测输入
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            filename: None,
            mime_type: None,
        }
    }

    /// 替换数据部分, 保留文件名与 MIME 提示
    pub fn with_buf(self, buf: &'a [u8]) -> Self {
        Self { buf, ..self }
    }
}

/// 探测结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    /// 识别出的格式
    pub format_id: FormatId,
    /// 置信度分数
    pub score: ProbeScore,
}

/// 格式探测器 trait
///
/// 每种裸流格式实现此 trait 以支持按内容识别.
/// 扩展名与 MIME 的加分由注册表统一处理, 探测器只看数据.
pub trait FormatProbe: Send + Sync {
    /// 根据数据内容探测格式
    ///
    /// # 返回
    /// - `Some(score)`: 探测成功, 返回置信度
    /// - `None`: 不是此格式
    fn probe(&self, pd: &ProbeData<'_>) -> Option<ProbeScore>;

    /// 获取此探测器对应的格式标识
    fn format_id(&self) -> FormatId;
}

/// 编解码器探测表
///
/// 解复用引擎在流的编解码器未知时调用. 实现必须是无状态只读的,
/// 多个最高分并列或全部为 0 时返回 `None`.
pub trait CodecTable: Send + Sync {
    /// 对累积数据打分, 返回最佳候选
    fn score_probe(&self, pd: &ProbeData<'_>) -> Option<ProbeResult>;
}

impl<T: CodecTable + ?Sized> CodecTable for &T {
    fn score_probe(&self, pd: &ProbeData<'_>) -> Option<ProbeResult> {
        (**self).score_probe(pd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_分数常量关系() {
        assert_eq!(SCORE_RETRY, 25);
        assert_eq!(SCORE_STREAM_RETRY, 24);
        assert_eq!(SCORE_EXTENSION / 2 - 1, SCORE_STREAM_RETRY);
    }

    #[test]
    fn test_probe_data_替换数据保留提示() {
        let pd = ProbeData {
            buf: b"abc",
            filename: Some("a.aac"),
            mime_type: Some("audio/aac"),
        };
        let sub = pd.with_buf(&pd.buf[1..]);
        assert_eq!(sub.buf, b"bc");
        assert_eq!(sub.filename, Some("a.aac"));
        assert_eq!(sub.mime_type, Some("audio/aac"));
    }
}
