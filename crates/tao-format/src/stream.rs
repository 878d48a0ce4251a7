//! 流状态定义.
//!
//! 对标 FFmpeg 的 `AVStream` (含 `AVStreamInternal` 中解复用阶段使用的字段),
//! 描述容器中的一条音视频/字幕流及其时间戳重建状态.

use bitflags::bitflags;
use log::{debug, warn};
use tao_codec::{CodecId, CodecParameters, Packet, ParserContext};
use tao_core::{MediaType, RELATIVE_TS_BASE, Rational, TaoError, TaoResult};

use crate::codec_probe::CodecProber;
use crate::index::{IndexFlags, SeekIndex};
use crate::timing::FrameHints;
use crate::wrap::PtsWrap;

/// 解码器最大重排深度
pub const MAX_REORDER_DELAY: usize = 16;

/// 重排窗口长度
pub(crate) const PTS_BUFFER_LEN: usize = MAX_REORDER_DELAY + 1;

/// 码流解析需求
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// 不需要解析
    #[default]
    None,
    /// 完整解析: 重新切分帧并补全时间戳
    Full,
    /// 只解析头部: 输入已是完整帧, 保留包时长
    Headers,
    /// 完整解析, 输出包的位置取解析器的帧偏移
    FullRaw,
}

/// 丢弃级别
///
/// 按 FFmpeg `AVDiscard` 的顺序排列, 可直接比较大小.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Discard {
    /// 不丢弃
    None,
    /// 丢弃无用数据 (如空包)
    #[default]
    Default,
    /// 丢弃非参考帧
    NonRef,
    /// 丢弃双向预测帧
    Bidir,
    /// 丢弃非帧内帧
    NonIntra,
    /// 丢弃非关键帧
    NonKey,
    /// 丢弃全部
    All,
}

bitflags! {
    /// 流的处置标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Disposition: u32 {
        /// 默认流
        const DEFAULT = 0x0001;
        /// 附带的封面图片, 只有一个数据包
        const ATTACHED_PIC = 0x0400;
    }
}

/// 流状态
///
/// 由数据源在读取头部 (或读包过程中) 创建, 读包时由探测、解析和
/// 时间戳重建持续更新, 引擎关闭前不会销毁.
#[derive(Debug)]
pub struct Stream {
    /// 流索引 (在容器中的位置, 从 0 开始)
    pub index: usize,
    /// 编解码器参数
    pub params: CodecParameters,
    /// 时间基
    pub time_base: Rational,
    /// 容器声明的真实帧率, 未知时为 0/1
    pub r_frame_rate: Rational,
    /// 时间戳回绕参数
    pub pts_wrap: PtsWrap,
    /// 当前 DTS (第一个真实 DTS 出现前为相对时间戳)
    pub cur_dts: Option<i64>,
    /// 第一个 DTS, 确定后不再改变
    pub first_dts: Option<i64>,
    /// 起始时间
    pub start_time: Option<i64>,
    /// 流时长
    pub duration: Option<i64>,
    /// 码流解析需求
    pub need_parsing: ParseMode,
    /// 丢弃级别
    pub discard: Discard,
    /// 处置标志
    pub disposition: Disposition,
    /// 封面图片数据包 (仅 `ATTACHED_PIC` 流)
    pub attached_pic: Option<Packet>,
    /// 已确认的帧数
    pub codec_info_nb_frames: u32,
    /// seek 索引
    pub index_entries: SeekIndex,

    pub(crate) prober: CodecProber,
    pub(crate) parser: Option<ParserContext>,
    pub(crate) need_context_update: bool,

    // 时间戳重建状态
    pub(crate) pts_buffer: [Option<i64>; PTS_BUFFER_LEN],
    pub(crate) pts_reorder_error: [i64; PTS_BUFFER_LEN],
    pub(crate) pts_reorder_error_count: [u8; PTS_BUFFER_LEN],
    pub(crate) last_dts_for_order_check: Option<i64>,
    pub(crate) dts_ordered: u32,
    pub(crate) dts_misordered: u32,
    pub(crate) last_ip_pts: Option<i64>,
    pub(crate) last_ip_duration: i64,
    pub(crate) frames_seen: u32,
    pub(crate) update_initial_durations_done: bool,
    /// 解析器最近一次输出帧的属性
    pub(crate) last_frame: FrameHints,
}

impl Stream {
    fn new(index: usize, params: CodecParameters, max_probe_packets: i32) -> Self {
        let mut st = Self {
            index,
            params,
            time_base: Rational::UNDEFINED,
            r_frame_rate: Rational::ZERO,
            pts_wrap: PtsWrap::default(),
            cur_dts: Some(RELATIVE_TS_BASE),
            first_dts: None,
            start_time: None,
            duration: None,
            need_parsing: ParseMode::None,
            discard: Discard::Default,
            disposition: Disposition::empty(),
            attached_pic: None,
            codec_info_nb_frames: 0,
            index_entries: SeekIndex::new(),
            prober: CodecProber::new(max_probe_packets),
            parser: None,
            need_context_update: false,
            pts_buffer: [None; PTS_BUFFER_LEN],
            pts_reorder_error: [0; PTS_BUFFER_LEN],
            pts_reorder_error_count: [0; PTS_BUFFER_LEN],
            last_dts_for_order_check: None,
            dts_ordered: 0,
            dts_misordered: 0,
            last_ip_pts: None,
            last_ip_duration: 0,
            frames_seen: 0,
            update_initial_durations_done: false,
            last_frame: FrameHints::default(),
        };
        st.set_pts_info(33, 1, 90000);
        st
    }

    /// 媒体类型
    pub fn media_type(&self) -> MediaType {
        self.params.media_type
    }

    /// 编解码器
    pub fn codec_id(&self) -> CodecId {
        self.params.codec_id
    }

    /// 设置时间基与时间戳位数
    ///
    /// 时间基先约分; 约分后非正的时间基被忽略.
    pub fn set_pts_info(&mut self, pts_wrap_bits: u32, pts_num: u32, pts_den: u32) {
        let (tb, exact) =
            Rational::reduce_from(i64::from(pts_num), i64::from(pts_den), i64::from(i32::MAX));
        if exact {
            if i64::from(tb.num) != i64::from(pts_num) && tb.num != 0 {
                debug!(
                    "流 {}: 时间基去除公因子 {}",
                    self.index,
                    i64::from(pts_num) / i64::from(tb.num)
                );
            }
        } else {
            warn!("流 {}: 时间基过大, 已近似", self.index);
        }
        if tb.num <= 0 || tb.den <= 0 {
            warn!("流 {}: 忽略无效时间基 {}/{}", self.index, tb.num, tb.den);
            return;
        }
        self.time_base = tb;
        self.pts_wrap.bits = pts_wrap_bits;
    }

    /// 请求按内容探测编解码器
    ///
    /// `min_score` 为替换已有编解码器所需的最低分数.
    pub fn request_probe(&mut self, min_score: i32) {
        self.prober.request(min_score);
    }

    /// 编解码器探测是否已结束 (或不需要)
    pub fn probe_done(&self) -> bool {
        self.prober.is_done()
    }

    /// 当前是否挂有码流解析器
    pub fn has_parser(&self) -> bool {
        self.parser.is_some()
    }

    /// 添加 seek 索引条目, 时间戳先做回绕修正
    pub fn add_index_entry(
        &mut self,
        pos: i64,
        timestamp: Option<i64>,
        size: i32,
        distance: i32,
        flags: IndexFlags,
    ) -> TaoResult<usize> {
        let timestamp = self.pts_wrap.wrap(timestamp);
        self.index_entries
            .add_entry(pos, timestamp, size, distance, flags)
    }

    /// 关闭解析器
    pub(crate) fn close_parser(&mut self) {
        if let Some(pc) = self.parser.take() {
            pc.close();
        }
    }

    /// 清空重排窗口与相关状态 (seek 后调用)
    pub(crate) fn reset_reorder(&mut self) {
        self.last_ip_pts = None;
        self.last_dts_for_order_check = None;
        self.pts_buffer = [None; PTS_BUFFER_LEN];
    }
}

/// 流集合
///
/// 数据源通过它创建新流; 引擎和数据源共享同一份流状态.
#[derive(Debug)]
pub struct StreamSet {
    streams: Vec<Stream>,
    max_streams: usize,
    max_probe_packets: i32,
}

impl StreamSet {
    /// 创建空集合
    pub fn new(max_streams: usize, max_probe_packets: i32) -> Self {
        Self {
            streams: Vec::new(),
            max_streams,
            max_probe_packets,
        }
    }

    /// 创建新流, 返回其可变引用
    ///
    /// 超过流数量上限时返回 [`TaoError::InvalidData`].
    pub fn add_stream(&mut self, params: CodecParameters) -> TaoResult<&mut Stream> {
        if self.streams.len() >= self.max_streams {
            return Err(TaoError::InvalidData(format!(
                "流数量超过上限 {}",
                self.max_streams
            )));
        }
        let index = self.streams.len();
        debug!("新建流 {index}: {} ({})", params.media_type, params.codec_id);
        self.streams
            .push(Stream::new(index, params, self.max_probe_packets));
        Ok(&mut self.streams[index])
    }

    /// 流数量
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// 是否没有流
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// 按索引获取流
    pub fn get(&self, index: usize) -> Option<&Stream> {
        self.streams.get(index)
    }

    /// 按索引获取可变流
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Stream> {
        self.streams.get_mut(index)
    }

    /// 遍历全部流
    pub fn iter(&self) -> impl Iterator<Item = &Stream> {
        self.streams.iter()
    }

    /// 可变遍历全部流
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Stream> {
        self.streams.iter_mut()
    }

    /// 全部流的切片
    pub fn as_slice(&self) -> &[Stream] {
        &self.streams
    }

    /// 每条流的探测包预算
    pub fn max_probe_packets(&self) -> i32 {
        self.max_probe_packets
    }

    /// 选出默认流
    ///
    /// 评分: 视频 +25, 有宽高 +50, 封面图片 -400; 有采样率的音频 +50;
    /// 已确认帧 +12; 未被全部丢弃 +200. 同分取索引小者.
    pub fn find_default_stream_index(&self) -> Option<usize> {
        let mut best: Option<(usize, i32)> = None;
        for st in &self.streams {
            let mut score = 0;
            match st.params.media_type {
                MediaType::Video => {
                    if st.disposition.contains(Disposition::ATTACHED_PIC) {
                        score -= 400;
                    }
                    if st.params.width != 0 && st.params.height != 0 {
                        score += 50;
                    }
                    score += 25;
                }
                MediaType::Audio if st.params.sample_rate != 0 => score += 50,
                _ => {}
            }
            if st.codec_info_nb_frames != 0 {
                score += 12;
            }
            if st.discard != Discard::All {
                score += 200;
            }
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((st.index, score));
            }
        }
        best.map(|(i, _)| i)
    }
}
