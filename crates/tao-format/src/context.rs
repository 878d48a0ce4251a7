//! 解复用引擎.
//!
//! 对标 FFmpeg 的 `AVFormatContext` 读包流程:
//! `ff_read_packet` / `read_frame_internal` / `parse_packet` /
//! `av_read_frame` / `av_seek_frame`.
//!
//! 数据流向:
//! ```text
//! PacketSource -> [原始包缓冲 + 编解码器探测] -> [码流解析器]
//!     -> [时间戳重建] -> [解析输出队列] -> [GenPTS 交错缓冲] -> 调用方
//! ```
//! 全部工作都在调用方的 `read_frame()` 内同步完成.

use std::fmt;

use bytes::Bytes;
use log::{debug, info, trace, warn};
use tao_codec::{
    FrameData, Packet, PacketFlags, ParserContext, ParserFlags, ParserRegistry, PictureType,
};
use tao_core::rational::{rescale, rescale_q_rnd};
use tao_core::timestamp::compare_mod;
use tao_core::{MediaType, RELATIVE_TS_BASE, Rational, Rounding, TaoError, TaoResult, is_relative};

use crate::codec_probe::ProbeHints;
use crate::format_id::FormatId;
use crate::index::{IndexFlags, SeekFlags};
use crate::options::{DemuxOptions, ForcedCodecs};
use crate::packet_list::PacketList;
use crate::probe::CodecTable;
use crate::registry::FormatRegistry;
use crate::source::{PacketSource, SourceFlags};
use crate::stream::{Discard, Disposition, ParseMode, Stream, StreamSet};
use crate::timing::{FrameHints, PendingQueues, TimingConfig, compute_pkt_fields};
use crate::wrap::{WrapBehavior, update_wrap_reference};

/// 通用 seek 向前读取时, 目标之后允许的最多非关键帧数
const MAX_NONKEY_AFTER_TARGET: u32 = 1000;

/// 解复用引擎构建器
///
/// 默认使用内置的格式探测表与码流解析器.
pub struct DemuxBuilder {
    options: DemuxOptions,
    codec_table: Box<dyn CodecTable>,
    parsers: ParserRegistry,
}

impl Default for DemuxBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DemuxBuilder {
    /// 使用默认配置创建
    pub fn new() -> Self {
        Self {
            options: DemuxOptions::default(),
            codec_table: Box::new(FormatRegistry::global()),
            parsers: ParserRegistry::with_builtin(),
        }
    }

    /// 设置引擎配置
    pub fn options(mut self, options: DemuxOptions) -> Self {
        self.options = options;
        self
    }

    /// 替换编解码器探测表
    pub fn codec_table(mut self, table: Box<dyn CodecTable>) -> Self {
        self.codec_table = table;
        self
    }

    /// 替换码流解析器注册表
    pub fn parsers(mut self, parsers: ParserRegistry) -> Self {
        self.parsers = parsers;
        self
    }

    /// 打开数据源
    ///
    /// `forced_format` 为格式名称 (如 `"h264"`), 需要探测的流直接使用
    /// 该格式对应的编解码器. 未知的格式名称或编解码器名称返回
    /// [`TaoError::InvalidArgument`].
    pub fn open(
        self,
        mut source: Box<dyn PacketSource>,
        forced_format: Option<&str>,
    ) -> TaoResult<DemuxContext> {
        let forced = ForcedCodecs::from_options(&self.options)?;
        let forced_format = forced_format
            .map(|name| {
                FormatId::from_name(name)
                    .ok_or_else(|| TaoError::InvalidArgument(format!("未知的格式: {name}")))
            })
            .transpose()?;

        let mut streams = StreamSet::new(self.options.max_streams, self.options.max_probe_packets);
        source.read_header(&mut streams)?;
        let source_flags = source.flags();

        let mut ctx = DemuxContext {
            source,
            source_flags,
            streams,
            raw_remaining: self.options.raw_packet_buffer_size,
            opts: self.options,
            forced,
            forced_format,
            raw_buffer: PacketList::new(),
            parse_queue: PacketList::new(),
            packet_buffer: PacketList::new(),
            parsers: self.parsers,
            codec_table: self.codec_table,
        };
        for st in ctx.streams.iter_mut() {
            apply_forced_format(forced_format, st);
            ctx.forced.apply(&mut st.params);
        }
        ctx.queue_attached_pictures()?;

        info!(
            "打开数据源 {}: {} 条流, 标志 {:?}",
            ctx.source.name(),
            ctx.streams.len(),
            ctx.source_flags
        );
        for st in ctx.streams.iter() {
            debug!(
                "流 {}: {} {} 时间基 {} 探测中={}",
                st.index,
                st.media_type(),
                st.codec_id(),
                st.time_base,
                !st.probe_done()
            );
        }
        Ok(ctx)
    }
}

/// 解复用引擎
///
/// 单线程、拉模式: 每次 [`read_frame`](Self::read_frame) 返回一个
/// 时间戳已补全的数据包.
pub struct DemuxContext {
    source: Box<dyn PacketSource>,
    source_flags: SourceFlags,
    streams: StreamSet,
    opts: DemuxOptions,
    forced: ForcedCodecs,
    forced_format: Option<FormatId>,
    /// 等待编解码器探测的原始包
    raw_buffer: PacketList,
    raw_remaining: i64,
    /// 解析器输出, 已完成时间戳重建
    parse_queue: PacketList,
    /// GenPTS 前瞻缓冲
    packet_buffer: PacketList,
    parsers: ParserRegistry,
    codec_table: Box<dyn CodecTable>,
}

impl fmt::Debug for DemuxContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DemuxContext")
            .field("source", &self.source.name())
            .field("source_flags", &self.source_flags)
            .field("streams", &self.streams.len())
            .field("raw_buffer", &self.raw_buffer.len())
            .field("parse_queue", &self.parse_queue.len())
            .field("packet_buffer", &self.packet_buffer.len())
            .finish()
    }
}

impl DemuxContext {
    /// 使用默认配置打开数据源
    pub fn open(source: Box<dyn PacketSource>, forced_format: Option<&str>) -> TaoResult<Self> {
        DemuxBuilder::new().open(source, forced_format)
    }

    /// 全部流
    pub fn streams(&self) -> &StreamSet {
        &self.streams
    }

    /// 按索引获取流
    pub fn stream(&self, index: usize) -> Option<&Stream> {
        self.streams.get(index)
    }

    /// 按索引获取可变流 (例如调整丢弃级别)
    pub fn stream_mut(&mut self, index: usize) -> Option<&mut Stream> {
        self.streams.get_mut(index)
    }

    /// 引擎配置
    pub fn options(&self) -> &DemuxOptions {
        &self.opts
    }

    /// 数据源能力标志
    pub fn source_flags(&self) -> SourceFlags {
        self.source_flags
    }

    // ========================================================
    // 读包
    // ========================================================

    /// 读取下一个数据包
    ///
    /// # 返回
    /// - `Ok(packet)`: 时间戳已补全的数据包; 相对时间戳已换算为从 0 开始
    /// - `Err(TaoError::Eof)`: 全部流 (含解析器尾帧) 已读完
    /// - `Err(TaoError::Again)`: 非阻塞数据源暂无数据, 由调用方决定何时重试
    pub fn read_frame(&mut self) -> TaoResult<Packet> {
        if !self.opts.gen_pts {
            let pkt = match self.packet_buffer.pop() {
                Some(pkt) => pkt,
                None => self.read_frame_internal()?,
            };
            return Ok(self.return_packet(pkt));
        }

        let mut eof = false;
        loop {
            if let Some(pkt) = self.take_buffered(eof) {
                return Ok(self.return_packet(pkt));
            }
            match self.read_frame_internal() {
                Ok(pkt) => self.packet_buffer.push(pkt)?,
                Err(e) if !self.packet_buffer.is_empty() && e.is_eof() => eof = true,
                Err(e) => return Err(e),
            }
        }
    }

    /// GenPTS: 用同一流后续数据包的 DTS 补全队首的 PTS, 队首可输出时取出
    fn take_buffered(&mut self, eof: bool) -> Option<Packet> {
        let next = self.packet_buffer.peek()?;
        let stream_index = next.stream_index;
        let st = self.streams.get(stream_index);

        if let (Some(next_dts), None) = (next.dts, next.pts) {
            let bits = st.map_or(33, |st| st.pts_wrap.bits).clamp(1, 64);
            let mut pts = None;
            // 后续同流数据包出现未知 DTS 后不再更新
            let mut last_dts = Some(next_dts);
            for other in self
                .packet_buffer
                .iter()
                .filter(|p| p.stream_index == stream_index)
            {
                let Some(dts) = other.dts else {
                    last_dts = None;
                    continue;
                };
                if compare_mod(next_dts as u64, dts as u64, bits).is_lt() {
                    let b_frame = other
                        .pts
                        .is_some_and(|p| compare_mod(p as u64, dts as u64, bits).is_eq());
                    if !b_frame {
                        pts = Some(dts);
                    }
                    if last_dts.is_some() {
                        last_dts = Some(dts);
                    }
                    if pts.is_some() {
                        break;
                    }
                }
            }
            // 文件末尾的最后一个参考帧
            if eof && pts.is_none() {
                pts = last_dts.and_then(|d| d.checked_add(next.duration));
            }
            if pts.is_some() {
                if let Some(head) = self.packet_buffer.peek_mut() {
                    head.pts = pts;
                }
            }
        }

        let next = self.packet_buffer.peek()?;
        let discarded = st.is_none_or(|st| st.discard == Discard::All);
        let hold = next.pts.is_none() && !discarded && next.dts.is_some() && !eof;
        if hold { None } else { self.packet_buffer.pop() }
    }

    /// 输出前的最后处理: 建立通用索引, 相对时间戳换算为从 0 开始
    fn return_packet(&mut self, mut pkt: Packet) -> Packet {
        if self.source_flags.contains(SourceFlags::GENERIC_INDEX) && pkt.is_keyframe() {
            if let Some(st) = self.streams.get_mut(pkt.stream_index) {
                st.index_entries.reduce(self.opts.max_index_size);
                if let Some(pos) = pkt.pos {
                    if let Err(e) = st.add_index_entry(pos, pkt.dts, 0, 0, IndexFlags::KEYFRAME) {
                        trace!("流 {}: 未加入索引: {e}", st.index);
                    }
                }
            }
        }
        for ts in [&mut pkt.dts, &mut pkt.pts] {
            if let Some(v) = ts.as_mut().filter(|v| is_relative(**v)) {
                *v -= RELATIVE_TS_BASE;
            }
        }
        pkt
    }

    fn timing_config(&self) -> TimingConfig {
        TimingConfig {
            no_fill_in: self.opts.no_fill_in,
            ignore_dts: self.opts.ignore_dts,
            keep_equal_timestamps: self
                .source_flags
                .contains(SourceFlags::KEEP_EQUAL_TIMESTAMPS),
        }
    }

    /// 读取一个完整帧: 解析器输出优先, 否则从数据源取包并解析
    fn read_frame_internal(&mut self) -> TaoResult<Packet> {
        let cfg = self.timing_config();
        while self.parse_queue.is_empty() {
            let mut pkt = match self.read_packet() {
                Ok(pkt) => pkt,
                Err(e) if !e.is_eof() => return Err(e),
                Err(e) => {
                    // 数据源结束: 冲刷全部解析器, 剩余帧都进入解析输出队列
                    for index in 0..self.streams.len() {
                        let flush = self
                            .streams
                            .get(index)
                            .is_some_and(|st| st.has_parser() && st.need_parsing != ParseMode::None);
                        if flush {
                            self.parse_packet(index, None)?;
                        }
                    }
                    return self.parse_queue.pop().ok_or(e);
                }
            };

            let index = pkt.stream_index;
            let no_parse = self.opts.no_parse;
            let Some(st) = self.streams.get_mut(index) else {
                continue;
            };

            if st.need_context_update {
                // 解析器依赖编解码器, 编解码器变化后重建
                if st
                    .parser
                    .as_ref()
                    .is_some_and(|pc| pc.codec_id() != st.params.codec_id)
                {
                    st.close_parser();
                }
                st.need_context_update = false;
            }

            if let (Some(pts), Some(dts)) = (pkt.pts, pkt.dts) {
                if pts < dts {
                    warn!(
                        "流 {index}: 无效的时间戳 pts={pts} < dts={dts}, 大小 {}",
                        pkt.size()
                    );
                }
            }

            if st.discard == Discard::All {
                trace!("流 {index}: 丢弃数据包");
                continue;
            }

            if st.need_parsing != ParseMode::None && st.parser.is_none() && !no_parse {
                match self.parsers.create(st.params.codec_id) {
                    Some(mut pc) => {
                        if st.need_parsing == ParseMode::Headers {
                            pc.flags |= ParserFlags::COMPLETE_FRAMES;
                        }
                        st.parser = Some(pc);
                    }
                    None => {
                        debug!("流 {index}: 没有 {} 的解析器, 不再解析", st.params.codec_id);
                        st.need_parsing = ParseMode::None;
                    }
                }
            }

            if st.need_parsing == ParseMode::None || st.parser.is_none() {
                compute_pkt_fields(
                    st,
                    None,
                    &mut pkt,
                    None,
                    None,
                    PendingQueues {
                        packet_buffer: &mut self.packet_buffer,
                        parse_queue: &mut self.parse_queue,
                    },
                    cfg,
                );
                return Ok(pkt);
            }
            self.parse_packet(index, Some(pkt))?;
        }
        self.parse_queue.pop().ok_or(TaoError::Eof)
    }

    /// 从数据源读取原始包, 编解码器未确定的流先在原始包缓冲中探测
    fn read_packet(&mut self) -> TaoResult<Packet> {
        loop {
            let head_stream = self.raw_buffer.peek().map(|p| p.stream_index);
            if let Some(index) = head_stream {
                if self.raw_remaining <= 0 {
                    self.probe_codec(index, None);
                }
                if self.streams.get(index).is_none_or(|st| st.probe_done()) {
                    if let Some(pkt) = self.raw_buffer.pop() {
                        self.raw_remaining += pkt.size() as i64;
                        return Ok(pkt);
                    }
                }
            }

            let mut pkt = match self.source.read_packet(&mut self.streams) {
                Ok(pkt) => pkt,
                Err(e) => {
                    if head_stream.is_none() || !e.is_eof() {
                        return Err(e);
                    }
                    // 没有更多数据: 结束全部探测, 缓冲中的包随后逐个输出
                    for index in 0..self.streams.len() {
                        self.probe_codec(index, None);
                    }
                    continue;
                }
            };

            if self.opts.discard_corrupt && pkt.is_corrupt() {
                warn!("丢弃损坏的数据包 (流 {})", pkt.stream_index);
                continue;
            }

            let index = pkt.stream_index;
            let Some(st) = self.streams.get(index) else {
                warn!("数据源给出无效的流索引 {index}, 丢弃数据包");
                continue;
            };
            pkt.time_base = st.time_base;

            if update_wrap_reference(&mut self.streams, index, &pkt, self.opts.correct_ts_overflow)
            {
                if let Some(st) = self.streams.get_mut(index) {
                    debug!(
                        "流 {index}: 回绕参考点 {:?}, 方式 {:?}",
                        st.pts_wrap.reference, st.pts_wrap.behavior
                    );
                    // 起点临近回绕点: 已确定的真实时间戳修正为负值
                    if st.pts_wrap.behavior == WrapBehavior::SubOffset {
                        st.first_dts = st.pts_wrap.wrap(st.first_dts);
                        st.start_time = st.pts_wrap.wrap(st.start_time);
                        st.cur_dts = st.pts_wrap.wrap(st.cur_dts);
                    }
                }
            }

            let Some(st) = self.streams.get_mut(index) else {
                continue;
            };
            pkt.dts = st.pts_wrap.wrap(pkt.dts);
            pkt.pts = st.pts_wrap.wrap(pkt.pts);
            apply_forced_format(self.forced_format, st);
            self.forced.apply(&mut st.params);

            if self.raw_buffer.is_empty() && st.probe_done() {
                return Ok(pkt);
            }

            let size = pkt.size() as i64;
            let data = pkt.data.clone();
            self.raw_buffer.push(pkt)?;
            self.raw_remaining -= size;
            self.probe_codec(index, Some(&data[..]));
        }
    }

    /// 向流的探测器喂入一个数据包 (`None` 表示没有更多数据)
    fn probe_codec(&mut self, index: usize, data: Option<&[u8]>) {
        let hints = ProbeHints {
            filename: self.opts.url.as_deref(),
            mime_type: self.opts.mime_type.as_deref(),
        };
        let Some(st) = self.streams.get_mut(index) else {
            return;
        };
        let step = st.prober.feed(
            index,
            &mut st.params,
            data,
            self.raw_remaining,
            self.codec_table.as_ref(),
            hints,
        );
        if step.codec_updated {
            st.need_context_update = true;
        }
        if step.rescored {
            self.forced.apply(&mut st.params);
        }
    }

    /// 把原始包送入流的解析器, 输出帧补全时间戳后进入解析输出队列
    ///
    /// `pkt` 为 `None` 时冲刷解析器并在之后关闭它.
    fn parse_packet(&mut self, index: usize, pkt: Option<Packet>) -> TaoResult<()> {
        let cfg = self.timing_config();
        let Some(st) = self.streams.get_mut(index) else {
            return Ok(());
        };
        let Some(mut pc) = st.parser.take() else {
            return Ok(());
        };
        let flush = pkt.is_none();
        let pkt = pkt.unwrap_or_else(|| Packet::empty().with_stream(index));

        let result = split_packet(
            st,
            &mut pc,
            pkt,
            flush,
            &mut self.packet_buffer,
            &mut self.parse_queue,
            cfg,
        );
        if flush {
            pc.close();
        } else {
            st.parser = Some(pc);
        }
        result
    }

    // ========================================================
    // Seek
    // ========================================================

    /// 定位
    ///
    /// # 参数
    /// - `stream_index`: 目标流; `None` 时选默认流, `timestamp` 以微秒为单位
    /// - `timestamp`: 目标时间戳 (流时间基), `BYTE` 时为字节位置
    /// - `flags`: Seek 标志
    ///
    /// 依次尝试: 字节 seek, 数据源自身的 seek, 基于 `read_timestamp` 的
    /// 二分查找, 基于索引的通用 seek. 成功后清空全部队列并重新放入封面图片.
    pub fn seek(
        &mut self,
        stream_index: Option<usize>,
        timestamp: i64,
        flags: SeekFlags,
    ) -> TaoResult<()> {
        self.seek_internal(stream_index, timestamp, flags)?;
        self.queue_attached_pictures()
    }

    fn seek_internal(
        &mut self,
        stream_index: Option<usize>,
        timestamp: i64,
        flags: SeekFlags,
    ) -> TaoResult<()> {
        if flags.contains(SeekFlags::BYTE) {
            self.flush_frame_state();
            return self.seek_frame_byte(timestamp);
        }

        let (index, target) = match stream_index {
            Some(index) => {
                if self.streams.get(index).is_none() {
                    return Err(TaoError::StreamNotFound(index));
                }
                (index, timestamp)
            }
            None => {
                let index = self
                    .streams
                    .find_default_stream_index()
                    .ok_or_else(|| TaoError::NotFound("没有可用于 seek 的流".into()))?;
                let tb = self
                    .streams
                    .get(index)
                    .map_or(Rational::MICRO, |st| st.time_base);
                let target = rescale(
                    timestamp,
                    i64::from(tb.den),
                    1_000_000 * i64::from(tb.num),
                );
                (index, target)
            }
        };

        self.flush_frame_state();
        match self.source.read_seek(&self.streams, index, target, flags) {
            Ok(()) => {
                debug!("流 {index}: 数据源 seek 到 {target}");
                return Ok(());
            }
            Err(TaoError::Unsupported(_)) => {}
            Err(e) => debug!("流 {index}: 数据源 seek 失败 ({e}), 改用通用方式"),
        }

        if !self.source_flags.contains(SourceFlags::NO_BIN_SEARCH) {
            match self.seek_frame_binary(index, target, flags) {
                Err(TaoError::Unsupported(_)) => {}
                other => return other,
            }
        }
        if !self.source_flags.contains(SourceFlags::NO_GEN_SEARCH) {
            self.flush_frame_state();
            return self.seek_frame_generic(index, target, flags);
        }
        Err(TaoError::Unsupported(format!(
            "数据源 {} 不支持 seek",
            self.source.name()
        )))
    }

    /// 字节 seek, 位置限制在数据范围内
    fn seek_frame_byte(&mut self, pos: i64) -> TaoResult<()> {
        let pos_max = self.source.size().map_or(i64::MAX, |size| (size - 1).max(0));
        let pos = pos.clamp(0, pos_max);
        debug!("字节 seek 到 {pos}");
        self.source.seek_bytes(pos)
    }

    /// 读取 `pos` 之后的第一个时间戳并做回绕修正
    fn read_timestamp(
        &mut self,
        index: usize,
        pos: i64,
        pos_limit: i64,
    ) -> TaoResult<Option<(i64, i64)>> {
        let found = self.source.read_timestamp(index, pos, pos_limit)?;
        let wrap = self.streams.get(index).map(|st| st.pts_wrap);
        Ok(found.map(|(at, ts)| (at, wrap.map_or(ts, |w| w.wrap_value(ts)))))
    }

    /// 用索引收窄范围后在字节位置上插值/二分查找
    fn seek_frame_binary(&mut self, index: usize, target: i64, flags: SeekFlags) -> TaoResult<()> {
        let st = self
            .streams
            .get(index)
            .ok_or(TaoError::StreamNotFound(index))?;
        let entries = st.index_entries.entries();
        let mut lower = None;
        let mut upper = None;
        if !entries.is_empty() {
            let i = st
                .index_entries
                .search(target, flags | SeekFlags::BACKWARD)
                .unwrap_or(0);
            let e = entries[i];
            if e.timestamp <= target || e.pos == i64::from(e.min_distance) {
                lower = Some((e.pos, e.timestamp));
            }
            if let Some(j) = st
                .index_entries
                .search(target, flags.difference(SeekFlags::BACKWARD))
            {
                let e = entries[j];
                upper = Some((
                    e.pos,
                    e.timestamp,
                    e.pos.saturating_sub(i64::from(e.min_distance)),
                ));
            }
        }

        let (pos, ts) = self.gen_search(index, target, lower, upper, flags)?;
        debug!("流 {index}: 二分查找 seek 到位置 {pos}, 时间戳 {ts}");
        self.source.seek_bytes(pos)?;
        self.flush_frame_state();
        self.update_cur_dts(index, ts);
        Ok(())
    }

    /// 插值查找, 连续两次无进展时退化为二分, 再退化为线性
    fn gen_search(
        &mut self,
        index: usize,
        target: i64,
        lower: Option<(i64, i64)>,
        upper: Option<(i64, i64, i64)>,
        flags: SeekFlags,
    ) -> TaoResult<(i64, i64)> {
        let (mut pos_min, mut ts_min) = match lower {
            Some(l) => l,
            None => self
                .read_timestamp(index, 0, i64::MAX)?
                .ok_or_else(|| TaoError::NotFound("找不到起始时间戳".into()))?,
        };
        if ts_min >= target {
            return Ok((pos_min, ts_min));
        }

        let (mut pos_max, mut ts_max, mut pos_limit) = match upper {
            Some(u) => u,
            None => {
                let (pos, ts) = self.find_last_ts(index)?;
                (pos, ts, pos)
            }
        };
        if ts_max <= target {
            return Ok((pos_max, ts_max));
        }

        let mut no_change = 0;
        while pos_min < pos_limit {
            let mut pos = match no_change {
                0 => {
                    let keyframe_distance = pos_max.saturating_sub(pos_limit);
                    rescale(
                        target.saturating_sub(ts_min),
                        pos_max.saturating_sub(pos_min),
                        ts_max.saturating_sub(ts_min),
                    )
                    .saturating_add(pos_min)
                    .saturating_sub(keyframe_distance)
                }
                1 => pos_min + ((pos_limit - pos_min) >> 1),
                _ => pos_min,
            };
            if pos <= pos_min {
                pos = pos_min + 1;
            } else if pos > pos_limit {
                pos = pos_limit;
            }
            let start_pos = pos;

            let (found_pos, ts) = self
                .read_timestamp(index, pos, i64::MAX)?
                .ok_or_else(|| TaoError::NotFound(format!("位置 {pos} 之后没有时间戳")))?;
            if found_pos == pos_max {
                no_change += 1;
            } else {
                no_change = 0;
            }
            trace!(
                "二分查找: [{pos_min}, {pos_limit}] 取 {start_pos} -> {found_pos} ts={ts} 目标 {target}"
            );
            if target <= ts {
                pos_limit = start_pos - 1;
                pos_max = found_pos;
                ts_max = ts;
            }
            if target >= ts {
                pos_min = found_pos;
                ts_min = ts;
            }
        }

        Ok(if flags.contains(SeekFlags::BACKWARD) {
            (pos_min, ts_min)
        } else {
            (pos_max, ts_max)
        })
    }

    /// 从数据末尾向前按倍增步长查找最后一个时间戳
    fn find_last_ts(&mut self, index: usize) -> TaoResult<(i64, i64)> {
        let filesize = self
            .source
            .size()
            .ok_or_else(|| TaoError::NotFound("数据大小未知".into()))?;
        let mut step = 1024i64;
        let mut pos_max = filesize - 1;
        let found = loop {
            let limit = pos_max;
            pos_max = (pos_max - step).max(0);
            let found = self.read_timestamp(index, pos_max, limit)?;
            step += step;
            if found.is_some() || 2 * limit <= step {
                break found;
            }
        };
        let (mut pos_max, mut ts_max) =
            found.ok_or_else(|| TaoError::NotFound("找不到结尾时间戳".into()))?;
        while let Some((pos, ts)) = self.read_timestamp(index, pos_max + 1, i64::MAX)? {
            pos_max = pos;
            ts_max = ts;
            if pos >= filesize {
                break;
            }
        }
        Ok((pos_max, ts_max))
    }

    /// 基于索引的 seek; 目标超出索引末尾时先向前读取以扩充索引
    fn seek_frame_generic(&mut self, index: usize, target: i64, flags: SeekFlags) -> TaoResult<()> {
        let st = self
            .streams
            .get(index)
            .ok_or(TaoError::StreamNotFound(index))?;
        let mut found = st.index_entries.search(target, flags);
        if found.is_none()
            && st
                .index_entries
                .entries()
                .first()
                .is_some_and(|e| target < e.timestamp)
        {
            return Err(TaoError::NotFound(format!("目标 {target} 早于索引起点")));
        }

        let last = st.index_entries.len().checked_sub(1);
        if found.is_none() || found == last {
            match st.index_entries.last().copied() {
                Some(e) => {
                    self.source.seek_bytes(e.pos)?;
                    self.update_cur_dts(index, e.timestamp);
                }
                None => self.source.seek_bytes(0)?,
            }
            let mut nonkey = 0;
            loop {
                let pkt = match self.read_frame() {
                    Ok(pkt) => pkt,
                    Err(TaoError::Eof) => break,
                    Err(e) => return Err(e),
                };
                if pkt.stream_index == index && pkt.dts.is_some_and(|dts| dts > target) {
                    if pkt.is_keyframe() {
                        break;
                    }
                    nonkey += 1;
                    if nonkey > MAX_NONKEY_AFTER_TARGET {
                        warn!("流 {index}: 目标之后 {nonkey} 个数据包都不是关键帧, 放弃扩充索引");
                        break;
                    }
                }
            }
            found = self
                .streams
                .get(index)
                .and_then(|st| st.index_entries.search(target, flags));
        }

        let found = found.ok_or_else(|| TaoError::NotFound(format!("索引中没有目标 {target}")))?;
        self.flush_frame_state();
        if self
            .source
            .read_seek(&self.streams, index, target, flags)
            .is_ok()
        {
            return Ok(());
        }
        let entry = self
            .streams
            .get(index)
            .and_then(|st| st.index_entries.entries().get(found).copied())
            .ok_or_else(|| TaoError::NotFound("索引条目已失效".into()))?;
        debug!(
            "流 {index}: 索引 seek 到位置 {}, 时间戳 {}",
            entry.pos, entry.timestamp
        );
        self.source.seek_bytes(entry.pos)?;
        self.update_cur_dts(index, entry.timestamp);
        Ok(())
    }

    /// 把参考流上的时间戳换算到每条流, 作为各流的 `cur_dts`
    fn update_cur_dts(&mut self, ref_index: usize, timestamp: i64) {
        let Some(ref_tb) = self.streams.get(ref_index).map(|st| st.time_base) else {
            return;
        };
        for st in self.streams.iter_mut() {
            st.cur_dts = Some(rescale(
                timestamp,
                i64::from(st.time_base.den) * i64::from(ref_tb.num),
                i64::from(st.time_base.num) * i64::from(ref_tb.den),
            ));
        }
    }

    /// 清空全部队列与各流的解析/重排状态
    fn flush_frame_state(&mut self) {
        self.raw_buffer.clear();
        self.parse_queue.clear();
        self.packet_buffer.clear();
        self.raw_remaining = self.opts.raw_packet_buffer_size;
        let max_probe_packets = self.opts.max_probe_packets;
        for st in self.streams.iter_mut() {
            st.close_parser();
            st.reset_reorder();
            st.cur_dts = if st.first_dts.is_none() {
                Some(RELATIVE_TS_BASE)
            } else {
                None
            };
            st.prober.reset_budget(max_probe_packets);
        }
    }

    /// 把封面图片放入原始包缓冲
    fn queue_attached_pictures(&mut self) -> TaoResult<()> {
        for st in self.streams.iter() {
            if !st.disposition.contains(Disposition::ATTACHED_PIC) || st.discard == Discard::All {
                continue;
            }
            match &st.attached_pic {
                Some(pic) if !pic.is_empty() => {
                    let mut pkt = pic.clone().with_stream(st.index);
                    pkt.flags |= PacketFlags::KEY;
                    let size = pkt.size() as i64;
                    self.raw_buffer.push(pkt)?;
                    self.raw_remaining -= size;
                }
                _ => warn!("流 {}: 封面图片为空, 跳过", st.index),
            }
        }
        Ok(())
    }

    /// 关闭引擎, 释放全部队列与解析器
    pub fn close(mut self) {
        self.flush_frame_state();
        self.source.close();
        debug!("关闭数据源 {}", self.source.name());
    }
}

/// 强制格式: 需要探测的流直接使用格式对应的编解码器
fn apply_forced_format(format: Option<FormatId>, st: &mut Stream) {
    let Some(format) = format else {
        return;
    };
    if st.prober.is_probing() {
        let (codec_id, media_type) = format.codec_mapping();
        st.params.set_codec(codec_id, media_type);
        st.prober.finish();
        st.need_context_update = true;
    }
}

/// 用解析器切分一个原始包
///
/// 原始包的时间戳与位置只交给第一次解析调用; 帧数据落在输入内时共享缓冲区.
fn split_packet(
    st: &mut Stream,
    pc: &mut ParserContext,
    mut pkt: Packet,
    flush: bool,
    packet_buffer: &mut PacketList,
    parse_queue: &mut PacketList,
    cfg: TimingConfig,
) -> TaoResult<()> {
    let complete_frames = pc.flags.contains(ParserFlags::COMPLETE_FRAMES);
    if pkt.is_empty() && !flush {
        if complete_frames {
            // 保留零长度同步包对时序的影响
            let hints = Some(st.last_frame);
            compute_pkt_fields(
                st,
                hints,
                &mut pkt,
                None,
                None,
                PendingQueues {
                    packet_buffer,
                    parse_queue,
                },
                cfg,
            );
        }
        return Ok(());
    }

    let data = pkt.data.clone();
    let raw_flags = pkt.flags;
    let raw_duration = pkt.duration;
    let mut side_data = pkt.take_side_data();
    let (mut pts, mut dts, mut pos) = (pkt.pts, pkt.dts, pkt.pos);
    let mut offset = 0usize;
    let mut got_output = flush;

    while offset < data.len() || (flush && got_output) {
        let (next_pts, next_dts) = (pts, dts);
        let input = &data[offset..];
        let (consumed, segment) = pc.parse(&mut st.params, input, pts, dts, pos);
        (pts, dts, pos) = (None, None, None);
        let start = offset;
        offset += consumed;
        got_output = segment.is_some();

        let Some(seg) = segment else {
            if consumed == 0 && !flush {
                warn!("流 {}: 解析器 {} 没有消耗输入, 丢弃剩余数据", st.index, pc.name());
                break;
            }
            continue;
        };

        let hints = FrameHints::from(&seg.frame);
        let key_frame = seg.frame.key_frame;
        let samples = seg.frame.duration;
        let frame_data = match seg.frame.data {
            FrameData::Input(range) => {
                if range.start > range.end || range.end > input.len() {
                    return Err(TaoError::InvalidData(format!(
                        "解析器输出越界: {range:?}, 输入 {} 字节",
                        input.len()
                    )));
                }
                data.slice(start + range.start..start + range.end)
            }
            FrameData::Owned(buf) => Bytes::from(buf),
        };

        let mut out = Packet::from_data(frame_data).with_stream(st.index);
        out.time_base = st.time_base;
        if !side_data.is_empty() {
            out.side_data = std::mem::take(&mut side_data);
        }

        out.duration = if complete_frames { raw_duration } else { 0 };
        if st.params.media_type == MediaType::Audio {
            if let Ok(sample_rate) = i32::try_from(st.params.sample_rate) {
                if sample_rate > 0 {
                    out.duration = rescale_q_rnd(
                        samples,
                        Rational::new(1, sample_rate),
                        st.time_base,
                        Rounding::Down,
                    );
                }
            }
        }

        out.pts = seg.pts;
        out.dts = seg.dts;
        out.pos = if st.need_parsing == ParseMode::FullRaw {
            Some(seg.frame_offset)
        } else {
            seg.pos
        };
        out.flags |= raw_flags & PacketFlags::DISCARD;

        let key = match key_frame {
            Some(k) => k,
            None => {
                hints.pict_type == PictureType::I
                    || (hints.pict_type == PictureType::None && raw_flags.contains(PacketFlags::KEY))
            }
        };
        if key {
            out.flags |= PacketFlags::KEY;
        }

        st.last_frame = hints;
        compute_pkt_fields(
            st,
            Some(hints),
            &mut out,
            next_dts,
            next_pts,
            PendingQueues {
                packet_buffer: &mut *packet_buffer,
                parse_queue: &mut *parse_queue,
            },
            cfg,
        );
        parse_queue.push(out)?;
    }
    Ok(())
}
