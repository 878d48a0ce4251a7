//! 时间戳重建.
//!
//! 对标 FFmpeg 的 `compute_pkt_fields` 及其辅助函数
//! (`update_initial_durations` / `update_initial_timestamps` /
//! `select_from_pts_buffer` / `ff_compute_frame_duration`).
//!
//! 数据源给出的 PTS/DTS 可能缺失、乱序或已回绕. 本模块在每个数据包
//! 离开解复用引擎前补全时间戳与时长: 在第一个真实 DTS 出现之前,
//! 流使用以 [`RELATIVE_TS_BASE`] 为原点的相对时间戳;
//! 真实 DTS 出现时一次性确定偏移, 并平移所有已排队的数据包.

use log::{debug, trace, warn};
use tao_codec::{Packet, PacketFlags, ParsedFrame, PictureType};
use tao_core::rational::{add_stable, rescale_rnd};
use tao_core::{MediaType, RELATIVE_TS_BASE, Rational, Rounding, is_relative};

use crate::packet_list::PacketList;
use crate::stream::{MAX_REORDER_DELAY, PTS_BUFFER_LEN, Stream};

/// DTS 顺序计数的衰减阈值
pub const DTS_ORDER_DECAY: u32 = 250;

/// 重排误差累积的衰减阈值
pub const REORDER_ERROR_DECAY: u8 = 250;

/// 解析器输出帧中与时间戳重建相关的属性
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameHints {
    /// 图像类型
    pub pict_type: PictureType,
    /// 额外重复显示的场数
    pub repeat_pict: i32,
}

impl From<&ParsedFrame> for FrameHints {
    fn from(frame: &ParsedFrame) -> Self {
        Self {
            pict_type: frame.pict_type,
            repeat_pict: frame.repeat_pict,
        }
    }
}

/// 时间戳重建开关
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimingConfig {
    /// 完全跳过重建
    pub no_fill_in: bool,
    /// PTS 已知时忽略 DTS
    pub ignore_dts: bool,
    /// 数据源的 PTS == DTS 是可信的 (不因延迟为 1 而丢弃 DTS)
    pub keep_equal_timestamps: bool,
}

/// 尚未交给调用方的数据包队列
///
/// 遍历顺序: 先交错缓冲, 后解析输出队列.
pub struct PendingQueues<'a> {
    /// 交错缓冲 (GenPTS 前瞻)
    pub packet_buffer: &'a mut PacketList,
    /// 解析输出队列
    pub parse_queue: &'a mut PacketList,
}

impl PendingQueues<'_> {
    fn has_any(&self) -> bool {
        !self.packet_buffer.is_empty() || !self.parse_queue.is_empty()
    }

    fn iter(&self) -> impl Iterator<Item = &Packet> {
        self.packet_buffer.iter().chain(self.parse_queue.iter())
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut Packet> {
        self.packet_buffer
            .iter_mut()
            .chain(self.parse_queue.iter_mut())
    }
}

// ============================================================
// 帧时长
// ============================================================

/// 估算一帧的时长, 返回 `(num, den)` 秒; 无法可靠估算时返回 `None`
///
/// 视频依次尝试: 容器声明的真实帧率 (仅无解析器时), 足够粗的时间基,
/// 码流帧率 (考虑 ticks_per_frame 与重复场). 音频为每帧采样数 / 采样率.
pub fn compute_frame_duration(st: &Stream, parser: Option<FrameHints>) -> Option<(i32, i32)> {
    let max = i64::from(i32::MAX);
    match st.params.media_type {
        MediaType::Video => {
            let tb = st.time_base;
            let fr = st.params.frame_rate;
            let ticks = st.params.ticks_per_frame;
            let (num, den) = if st.r_frame_rate.num != 0 && (parser.is_none() || fr.num == 0) {
                (st.r_frame_rate.den, st.r_frame_rate.num)
            } else if i64::from(tb.num) * 1000 > i64::from(tb.den) {
                (tb.num, tb.den)
            } else if fr.num != 0 && i64::from(fr.den) * 1000 > i64::from(fr.num) {
                let (mut r, _) =
                    Rational::reduce_from(i64::from(fr.den), i64::from(fr.num) * i64::from(ticks), max);
                if let Some(h) = parser.filter(|h| h.repeat_pict != 0) {
                    r = Rational::reduce_from(
                        i64::from(r.num) * (1 + i64::from(h.repeat_pict)),
                        i64::from(r.den),
                        max,
                    )
                    .0;
                }
                // 场/帧混合编码没有解析器时无法确定单包时长
                if ticks > 1 && parser.is_none() {
                    return None;
                }
                (r.num, r.den)
            } else {
                return None;
            };
            (num != 0 && den != 0).then_some((num, den))
        }
        MediaType::Audio => {
            let frame_size = i32::try_from(st.params.frame_size).ok()?;
            let sample_rate = i32::try_from(st.params.sample_rate).ok()?;
            (frame_size > 0 && sample_rate > 0).then_some((frame_size, sample_rate))
        }
        _ => None,
    }
}

// ============================================================
// 已排队数据包的补全
// ============================================================

/// 第一次得到可靠时长时, 向前为已排队且没有时间戳的数据包补全 DTS 与时长
fn update_initial_durations(
    st: &mut Stream,
    stream_index: usize,
    duration: i64,
    queues: &mut PendingQueues<'_>,
) {
    let mut cur_dts = RELATIVE_TS_BASE;

    if let Some(first_dts) = st.first_dts {
        if st.update_initial_durations_done {
            return;
        }
        st.update_initial_durations_done = true;
        cur_dts = first_dts;
        let mut anchor = None;
        for pkt in queues.iter().filter(|p| p.stream_index == stream_index) {
            if pkt.pts != pkt.dts || pkt.dts.is_some() || pkt.duration != 0 {
                anchor = Some(pkt.dts);
                break;
            }
            let Some(prev) = cur_dts.checked_sub(duration) else {
                warn!("流 {stream_index}: 回填时间戳越界, first_dts {first_dts} 时长 {duration}");
                return;
            };
            cur_dts = prev;
        }
        match anchor {
            Some(dts) if dts == Some(first_dts) => {}
            Some(_) => {
                debug!("流 {stream_index}: 队列中第一个 DTS 与 first_dts {first_dts} 不一致");
                return;
            }
            None => return,
        }
        st.first_dts = Some(cur_dts);
    } else if st.cur_dts != Some(RELATIVE_TS_BASE) {
        return;
    }

    let first_dts = st.first_dts;
    let has_b_frames = st.params.has_b_frames;
    let mut exhausted = true;
    for pkt in queues.iter_mut().filter(|p| p.stream_index == stream_index) {
        let untimed = (pkt.pts == pkt.dts || pkt.pts.is_none())
            && (pkt.dts.is_none() || pkt.dts == first_dts || pkt.dts == Some(RELATIVE_TS_BASE))
            && pkt.duration == 0
            && cur_dts.checked_add(duration).is_some();
        if !untimed {
            exhausted = false;
            break;
        }
        pkt.dts = Some(cur_dts);
        if has_b_frames == 0 {
            pkt.pts = Some(cur_dts);
        }
        pkt.duration = duration;
        cur_dts += duration;
    }
    if exhausted {
        st.cur_dts = Some(cur_dts);
    }
}

/// H.264 需要观察到足够多的帧后才信任重排深度
fn has_decode_delay_been_guessed(st: &Stream) -> bool {
    if st.params.codec_id != tao_codec::CodecId::H264 {
        return true;
    }
    let need = match st.params.has_b_frames {
        0..3 => 7,
        3 => 18,
        _ => 20,
    };
    st.frames_seen >= need
}

/// 把 PTS 插入重排窗口并保持前 `delay + 1` 个槽位有序
fn insert_pts(buffer: &mut [Option<i64>; PTS_BUFFER_LEN], pts: i64, delay: usize) {
    buffer[0] = Some(pts);
    let mut i = 0;
    while i < delay && buffer[i] > buffer[i + 1] {
        buffer.swap(i, i + 1);
        i += 1;
    }
}

/// 从重排窗口中挑选 DTS
///
/// 一进一出的编解码器直接取窗口中最小的 PTS. 其余编解码器按槽位
/// 累积与已知 DTS 的偏差, DTS 未知时取平均偏差最小的槽位.
fn select_from_pts_buffer(
    st: &mut Stream,
    buffer: &[Option<i64>; PTS_BUFFER_LEN],
    mut dts: Option<i64>,
) -> Option<i64> {
    if !st.params.codec_id.is_one_in_one_out() {
        let delay = (st.params.has_b_frames as usize).min(MAX_REORDER_DELAY);
        match dts {
            None => {
                let mut best_score = i64::MAX;
                for i in 0..delay {
                    let count = st.pts_reorder_error_count[i];
                    if count != 0 {
                        let score = st.pts_reorder_error[i] / i64::from(count);
                        if score < best_score {
                            best_score = score;
                            dts = buffer[i];
                        }
                    }
                }
            }
            Some(known) => {
                for i in 0..delay {
                    let Some(pts) = buffer[i] else {
                        continue;
                    };
                    let err = st.pts_reorder_error[i];
                    let diff = pts.wrapping_sub(known).wrapping_abs().saturating_add(err);
                    st.pts_reorder_error[i] = diff.max(err);
                    st.pts_reorder_error_count[i] += 1;
                    if st.pts_reorder_error_count[i] > REORDER_ERROR_DECAY {
                        st.pts_reorder_error[i] >>= 1;
                        st.pts_reorder_error_count[i] >>= 1;
                    }
                }
            }
        }
    }
    dts.or(buffer[0])
}

/// 用已排队数据包的 PTS 重新推导其 DTS
fn update_dts_from_pts(st: &mut Stream, stream_index: usize, queues: &mut PendingQueues<'_>) {
    let delay = st.params.has_b_frames as usize;
    if delay > MAX_REORDER_DELAY {
        return;
    }
    let mut buffer = [None; PTS_BUFFER_LEN];
    for pkt in queues.iter_mut().filter(|p| p.stream_index == stream_index) {
        if let Some(pts) = pkt.pts {
            insert_pts(&mut buffer, pts, delay);
            pkt.dts = select_from_pts_buffer(st, &buffer, pkt.dts);
        }
    }
}

/// 第一个真实 DTS 出现时确定 `first_dts`, 并把相对时间戳平移为真实值
fn update_initial_timestamps(
    st: &mut Stream,
    stream_index: usize,
    dts: Option<i64>,
    pts: Option<i64>,
    pkt: &mut Packet,
    queues: &mut PendingQueues<'_>,
) {
    if st.first_dts.is_some() {
        return;
    }
    let (Some(dts), Some(cur_dts)) = (dts, st.cur_dts) else {
        return;
    };
    if cur_dts < i64::from(i32::MIN) + RELATIVE_TS_BASE || is_relative(dts) {
        return;
    }

    let Some(first_dts) = dts.checked_sub(cur_dts - RELATIVE_TS_BASE) else {
        warn!("流 {stream_index}: 无法由 dts {dts} 推出 first_dts, 跳过相对时间戳修正");
        return;
    };
    st.first_dts = Some(first_dts);
    st.cur_dts = Some(dts);
    let shift = first_dts.wrapping_sub(RELATIVE_TS_BASE);
    debug!("流 {stream_index}: first_dts = {first_dts}");

    let shift_relative = |ts: &mut Option<i64>| {
        if let Some(v) = ts.as_mut().filter(|v| is_relative(**v)) {
            *v = v.wrapping_add(shift);
        }
    };
    let mut pts = pts;
    shift_relative(&mut pts);
    shift_relative(&mut pkt.pts);
    shift_relative(&mut pkt.dts);

    for queued in queues.iter_mut().filter(|p| p.stream_index == stream_index) {
        shift_relative(&mut queued.pts);
        shift_relative(&mut queued.dts);
        if st.start_time.is_none() && queued.pts.is_some() {
            st.start_time = queued.pts;
        }
    }

    if has_decode_delay_been_guessed(st) {
        update_dts_from_pts(st, stream_index, queues);
    }

    if st.start_time.is_none()
        && (st.params.media_type == MediaType::Audio || !pkt.flags.contains(PacketFlags::DISCARD))
    {
        st.start_time = pts;
    }
}

// ============================================================
// 主流程
// ============================================================

/// 补全一个数据包的 PTS/DTS/时长与关键帧标志
///
/// `parser` 为流挂有解析器时该包对应帧的属性, `next_dts`/`next_pts`
/// 为同一原始包携带的时间戳 (仅第一段输出可用).
pub fn compute_pkt_fields(
    st: &mut Stream,
    parser: Option<FrameHints>,
    pkt: &mut Packet,
    next_dts: Option<i64>,
    next_pts: Option<i64>,
    mut queues: PendingQueues<'_>,
    config: TimingConfig,
) {
    if config.no_fill_in {
        return;
    }
    let stream_index = st.index;
    let onein_oneout = st.params.codec_id.is_one_in_one_out();
    st.frames_seen = st.frames_seen.saturating_add(1);
    trace!(
        "流 {stream_index}: 输入 pts={:?} dts={:?} cur_dts={:?} duration={}",
        pkt.pts, pkt.dts, st.cur_dts, pkt.duration
    );

    // DTS == PTS 的视频包若频繁乱序, 不再信任其 DTS
    if st.params.media_type == MediaType::Video {
        if let Some(dts) = pkt.dts {
            if pkt.pts == Some(dts) {
                if let Some(last) = st.last_dts_for_order_check {
                    if last <= dts {
                        st.dts_ordered += 1;
                    } else {
                        if st.dts_misordered == 0 {
                            warn!("流 {stream_index}: DTS {dts} < {last}, 顺序错误");
                        } else {
                            debug!("流 {stream_index}: DTS {dts} < {last}, 顺序错误");
                        }
                        st.dts_misordered += 1;
                    }
                    if st.dts_ordered + st.dts_misordered > DTS_ORDER_DECAY {
                        st.dts_ordered >>= 1;
                        st.dts_misordered >>= 1;
                    }
                }
            }
            st.last_dts_for_order_check = Some(dts);
            if st.dts_ordered < 8 * st.dts_misordered && pkt.pts == Some(dts) {
                pkt.dts = None;
            }
        }
    }

    if config.ignore_dts && pkt.pts.is_some() {
        pkt.dts = None;
    }

    let is_b = parser.is_some_and(|h| h.pict_type == PictureType::B);
    if is_b && st.params.has_b_frames == 0 {
        st.params.has_b_frames = 1;
    }
    let delay = st.params.has_b_frames as usize;
    let mut presentation_delayed = delay > 0 && parser.is_some() && !is_b;

    // PTS 与 DTS 相差超过半个回绕周期: 其中一个已经回绕
    let bits = st.pts_wrap.bits;
    if let (Some(pts), Some(dts)) = (pkt.pts, pkt.dts) {
        let half = (1..63).contains(&bits).then(|| 1i64 << (bits - 1));
        let lowered = half.and_then(|h| dts.checked_sub(h));
        if let Some(lowered) = lowered.filter(|&l| l > pts) {
            let span = 1i64 << bits;
            let shifted = st
                .cur_dts
                .is_none_or(|cur| is_relative(cur) || lowered > cur);
            match (shifted, dts.checked_sub(span), pts.checked_add(span)) {
                (true, Some(d), _) => pkt.dts = Some(d),
                (false, _, Some(p)) => pkt.pts = Some(p),
                _ => warn!("流 {stream_index}: 回绕修正越界 pts={pts} dts={dts}"),
            }
        }
    }

    if delay == 1
        && pkt.dts.is_some()
        && pkt.dts == pkt.pts
        && presentation_delayed
        && !config.keep_equal_timestamps
    {
        debug!("流 {stream_index}: 无效的 dts/pts 组合 {:?}", pkt.dts);
        pkt.dts = None;
    }

    let tb = st.time_base;
    let mut duration = Rational::reduce_from(
        pkt.duration.saturating_mul(i64::from(tb.num)),
        i64::from(tb.den),
        i64::from(i32::MAX),
    )
    .0;
    if pkt.duration <= 0 {
        if let Some((num, den)) = compute_frame_duration(st, parser) {
            duration = Rational::new(num, den);
            pkt.duration = rescale_rnd(
                1,
                i64::from(num) * i64::from(tb.den),
                i64::from(den) * i64::from(tb.num),
                Rounding::Down,
            );
        }
    }

    if pkt.duration > 0 && queues.has_any() {
        update_initial_durations(st, stream_index, pkt.duration, &mut queues);
    }

    if let (Some(pts), Some(dts)) = (pkt.pts, pkt.dts) {
        if pts > dts {
            presentation_delayed = true;
        }
    }

    // H.264/HEVC 的重排深度不可靠, 不做插值
    if (delay == 0 || (delay == 1 && parser.is_some())) && onein_oneout {
        if presentation_delayed {
            if pkt.dts.is_none() {
                pkt.dts = st.last_ip_pts;
            }
            update_initial_timestamps(st, stream_index, pkt.dts, pkt.pts, pkt, &mut queues);
            if pkt.dts.is_none() {
                pkt.dts = st.cur_dts;
            }

            // DTS 按上一个 I/P 帧的时长前进
            if st.last_ip_duration == 0 && (pkt.duration as u64) <= i32::MAX as u64 {
                st.last_ip_duration = pkt.duration;
            }
            if let Some(dts) = pkt.dts {
                match dts.checked_add(st.last_ip_duration) {
                    Some(next) => st.cur_dts = Some(next),
                    None => warn!("流 {stream_index}: dts {dts} 加时长后越界"),
                }
            }
            if let (Some(_), None, Some(cur), Some(nd), Some(np)) =
                (pkt.dts, pkt.pts, st.cur_dts, next_dts, next_pts)
            {
                if st.last_ip_duration > 0
                    && (cur.wrapping_sub(nd).wrapping_add(1) as u64) <= 2
                    && nd != np
                {
                    pkt.pts = Some(nd);
                }
            }
            if (pkt.duration as u64) <= i32::MAX as u64 {
                st.last_ip_duration = pkt.duration;
            }
            st.last_ip_pts = pkt.pts;
        } else if pkt.pts.is_some() || pkt.dts.is_some() || pkt.duration > 0 {
            // 显示不延迟: PTS == DTS
            if pkt.pts.is_none() {
                pkt.pts = pkt.dts;
            }
            update_initial_timestamps(st, stream_index, pkt.pts, pkt.pts, pkt, &mut queues);
            if pkt.pts.is_none() {
                pkt.pts = st.cur_dts;
            }
            pkt.dts = pkt.pts;
            if let Some(pts) = pkt.pts {
                if duration.num >= 0 {
                    st.cur_dts = Some(add_stable(tb, pts, duration, 1));
                }
            }
        }
    }

    if let Some(pts) = pkt.pts {
        if delay <= MAX_REORDER_DELAY {
            insert_pts(&mut st.pts_buffer, pts, delay);
            if has_decode_delay_been_guessed(st) {
                let buffer = st.pts_buffer;
                pkt.dts = select_from_pts_buffer(st, &buffer, pkt.dts);
            }
        }
    }

    if !onein_oneout {
        update_initial_timestamps(st, stream_index, pkt.dts, pkt.pts, pkt, &mut queues);
    }
    if let Some(dts) = pkt.dts {
        if st.cur_dts.is_none_or(|cur| dts > cur) {
            st.cur_dts = Some(dts);
        }
    }

    if st.params.media_type == MediaType::Data || st.params.codec_id.is_intra_only() {
        pkt.flags |= PacketFlags::KEY;
    }
    trace!(
        "流 {stream_index}: 输出 pts={:?} dts={:?} cur_dts={:?} delayed={presentation_delayed}",
        pkt.pts, pkt.dts, st.cur_dts
    );
}
