//! 时间戳回绕修正.
//!
//! 对标 FFmpeg 的 `update_wrap_reference` / `wrap_timestamp`.
//!
//! 容器时间戳只有 `pts_wrap_bits` 位, 计数溢出后从 0 重新开始.
//! 第一个时间戳出现时在其之前 60 秒处确定参考点: 若起点离回绕点足够远,
//! 之后小于参考点的值加上 `2^bits`; 否则起点本身即将回绕,
//! 之后大于等于参考点的值减去 `2^bits` (变为负数).

use tao_codec::Packet;
use tao_core::{is_relative, rational::rescale};

use crate::stream::StreamSet;

/// 回绕修正方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WrapBehavior {
    /// 不修正
    #[default]
    Ignore,
    /// 小于参考点的值加上 `2^bits`
    AddOffset,
    /// 大于等于参考点的值减去 `2^bits`
    SubOffset,
}

/// 单条流的回绕参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtsWrap {
    /// 时间戳有效位数
    pub bits: u32,
    /// 参考点, 尚未确定时为 `None`
    pub reference: Option<i64>,
    /// 修正方式
    pub behavior: WrapBehavior,
}

impl Default for PtsWrap {
    fn default() -> Self {
        Self {
            bits: 33,
            reference: None,
            behavior: WrapBehavior::Ignore,
        }
    }
}

impl PtsWrap {
    /// 修正一个时间戳
    ///
    /// 未知值与相对时间戳原样返回, 因此对已修正的值重复调用不会再次平移.
    pub fn wrap(&self, ts: Option<i64>) -> Option<i64> {
        ts.map(|v| self.wrap_value(v))
    }

    /// 修正一个已知的时间戳
    pub fn wrap_value(&self, ts: i64) -> i64 {
        let Some(reference) = self.reference else {
            return ts;
        };
        if is_relative(ts) || self.bits >= 63 {
            return ts;
        }
        let span = 1i64 << self.bits;
        match self.behavior {
            WrapBehavior::AddOffset if ts < reference => ts.saturating_add(span),
            WrapBehavior::SubOffset if ts >= reference => ts.saturating_sub(span),
            _ => ts,
        }
    }
}

/// 用数据包的第一个时间戳确定回绕参考点
///
/// 没有节目 (program) 划分时, 所有流共享默认流的参考点:
/// 默认流尚无参考点时为全部流设置, 否则复制默认流的参考点.
/// 返回是否为 `stream_index` 建立了参考点.
pub fn update_wrap_reference(
    streams: &mut StreamSet,
    stream_index: usize,
    pkt: &Packet,
    correct_ts_overflow: bool,
) -> bool {
    let Some(st) = streams.get(stream_index) else {
        return false;
    };
    let wrap = st.pts_wrap;
    let Some(first) = pkt.dts.or(pkt.pts) else {
        return false;
    };
    if wrap.reference.is_some() || wrap.bits >= 63 || !correct_ts_overflow {
        return false;
    }

    let bits = wrap.bits;
    let first = first & ((1i64 << bits) - 1);
    let sixty_secs = rescale(60, i64::from(st.time_base.den), i64::from(st.time_base.num));
    let reference = first.saturating_sub(sixty_secs);
    let span = 1i64 << bits;
    let behavior = if first < span - (span >> 3)
        || first < span.saturating_sub(sixty_secs)
    {
        WrapBehavior::AddOffset
    } else {
        WrapBehavior::SubOffset
    };

    let Some(default_index) = streams.find_default_stream_index() else {
        return false;
    };
    let default_wrap = streams.get(default_index).map(|s| s.pts_wrap);
    match default_wrap {
        Some(PtsWrap {
            reference: Some(r),
            behavior: b,
            ..
        }) => {
            if let Some(st) = streams.get_mut(stream_index) {
                st.pts_wrap.reference = Some(r);
                st.pts_wrap.behavior = b;
            }
        }
        _ => {
            for st in streams.iter_mut() {
                st.pts_wrap.reference = Some(reference);
                st.pts_wrap.behavior = behavior;
            }
        }
    }
    true
}
