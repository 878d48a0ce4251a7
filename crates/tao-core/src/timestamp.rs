//! 相对时间戳区间与回绕比较.
//!
//! 对标 FFmpeg 中基于 `time_base` 的时间戳系统.
//! 未知时间戳统一用 `Option<i64>` 的 `None` 表示.
//!
//! 在流的第一个真实 DTS 出现之前, 解复用器用一个远离任何真实值的
//! 基准 (`RELATIVE_TS_BASE`) 推算临时时间戳. 落入该区间的值称为
//! "相对时间戳", 得到真实起点后再整体平移.

use std::cmp::Ordering;

/// 相对时间戳的基准值
pub const RELATIVE_TS_BASE: i64 = i64::MAX - (1i64 << 48);

/// 判断时间戳是否位于相对时间戳区间
pub const fn is_relative(ts: i64) -> bool {
    ts > RELATIVE_TS_BASE - (1i64 << 48)
}

/// 在模 `2^bits` 意义下比较两个时间戳 (按最短距离判断先后)
pub fn compare_mod(a: u64, b: u64, bits: u32) -> Ordering {
    let mask = if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    };
    let diff = a.wrapping_sub(b) & mask;
    if diff == 0 {
        Ordering::Equal
    } else if bits < 64 && diff > (1u64 << (bits - 1)) {
        Ordering::Less
    } else if bits >= 64 && diff > (1u64 << 63) {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}
