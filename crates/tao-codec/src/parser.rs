//! 码流解析器 (parser) 能力与时间戳记账.
//!
//! 对标 FFmpeg 的 `AVCodecParser` / `AVCodecParserContext` / `av_parser_parse2`.
//!
//! [`CodecParser`] 只负责把任意切分的输入字节重新切分为完整的编码帧,
//! [`ParserContext`] 在其外层记录每段输入携带的 PTS/DTS/字节位置,
//! 并在输出帧时把它们归属到正确的帧上: 一段输入的时间戳属于
//! 第一个在该段内 (或之后) 开始的帧.

use std::collections::VecDeque;
use std::ops::Range;

use bitflags::bitflags;
use log::debug;

use crate::codec_id::CodecId;
use crate::codec_parameters::CodecParameters;

/// 同时记录的输入段数量
const TIMESTAMP_SLOTS: usize = 4;

bitflags! {
    /// 解析器行为标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ParserFlags: u32 {
        /// 输入总是完整帧, 只需解析头部信息
        const COMPLETE_FRAMES = 0x0001;
    }
}

/// 图像编码类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PictureType {
    /// 未知
    #[default]
    None,
    /// 帧内
    I,
    /// 前向预测
    P,
    /// 双向预测
    B,
    /// S(GMC) 帧
    S,
    /// 切换帧内
    Si,
    /// 切换预测
    Sp,
    /// BI 帧
    Bi,
}

/// 输出帧的数据来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameData {
    /// 引用本次输入切片中的一段 (零拷贝)
    Input(Range<usize>),
    /// 解析器内部拼接出的新缓冲区
    Owned(Vec<u8>),
}

impl FrameData {
    /// 数据长度
    pub fn len(&self) -> usize {
        match self {
            Self::Input(r) => r.len(),
            Self::Owned(v) => v.len(),
        }
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 解析器切分出的一帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFrame {
    /// 帧数据
    pub data: FrameData,
    /// 图像类型
    pub pict_type: PictureType,
    /// 是否关键帧, `None` 表示解析器无法判断
    pub key_frame: Option<bool>,
    /// 额外重复显示的场数
    pub repeat_pict: i32,
    /// 音频帧的采样数, 0 表示未知
    pub duration: i64,
}

impl ParsedFrame {
    /// 创建只含数据的帧, 其余属性未知
    pub fn new(data: FrameData) -> Self {
        Self {
            data,
            pict_type: PictureType::None,
            key_frame: None,
            repeat_pict: 0,
            duration: 0,
        }
    }
}

/// 单次解析调用的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOutput {
    /// 消耗的输入字节数
    ///
    /// 可以为负: 表示下一帧开始于之前调用已提交的字节中
    /// (例如起始码跨越两次输入). 负值不会重复消费输入.
    pub consumed: isize,
    /// 切分出的帧
    pub frame: Option<ParsedFrame>,
}

impl ParseOutput {
    /// 消耗输入但没有输出
    pub fn pending(consumed: usize) -> Self {
        Self {
            consumed: consumed as isize,
            frame: None,
        }
    }
}

/// 码流解析器 trait
///
/// 空输入表示流结束, 解析器应输出内部缓存的最后一帧.
pub trait CodecParser: Send {
    /// 解析器名称
    fn name(&self) -> &'static str;

    /// 支持的编解码器
    fn codec_ids(&self) -> &[CodecId];

    /// 消费输入并尝试切分出一帧
    fn parse(
        &mut self,
        params: &mut CodecParameters,
        flags: ParserFlags,
        input: &[u8],
    ) -> ParseOutput;

    /// 释放内部状态
    fn close(&mut self) {}
}

/// 一段输入携带的时间戳
#[derive(Debug, Clone, Copy)]
struct TimestampSlot {
    offset: i64,
    end: i64,
    pts: Option<i64>,
    dts: Option<i64>,
    pos: Option<i64>,
}

/// 解析器输出的带时间戳帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSegment {
    /// 帧本身
    pub frame: ParsedFrame,
    /// 归属到该帧的 PTS
    pub pts: Option<i64>,
    /// 归属到该帧的 DTS
    pub dts: Option<i64>,
    /// 归属到该帧的字节位置
    pub pos: Option<i64>,
    /// 该帧在输入字节流中的起始偏移
    pub frame_offset: i64,
}

/// 解析器上下文
///
/// 包装一个 [`CodecParser`], 负责输入偏移与时间戳的记账.
pub struct ParserContext {
    parser: Box<dyn CodecParser>,
    codec_id: CodecId,
    /// 行为标志
    pub flags: ParserFlags,
    slots: VecDeque<TimestampSlot>,
    offset_fetched: bool,
    cur_offset: i64,
    frame_offset: Option<i64>,
    next_frame_offset: i64,
    fetch_pending: bool,
    pts: Option<i64>,
    dts: Option<i64>,
    pos: Option<i64>,
}

impl ParserContext {
    /// 为指定编解码器创建上下文
    pub fn new(parser: Box<dyn CodecParser>, codec_id: CodecId) -> Self {
        debug!("创建解析器 {} (编解码器 {codec_id})", parser.name());
        Self {
            parser,
            codec_id,
            flags: ParserFlags::empty(),
            slots: VecDeque::with_capacity(TIMESTAMP_SLOTS),
            offset_fetched: false,
            cur_offset: 0,
            frame_offset: None,
            next_frame_offset: 0,
            fetch_pending: true,
            pts: None,
            dts: None,
            pos: None,
        }
    }

    /// 创建时对应的编解码器
    pub fn codec_id(&self) -> CodecId {
        self.codec_id
    }

    /// 解析器名称
    pub fn name(&self) -> &'static str {
        self.parser.name()
    }

    /// 送入一段输入, 返回 (消耗字节数, 可能的输出帧)
    ///
    /// `pts`/`dts`/`pos` 是这段输入所属原始包的时间戳,
    /// 同一原始包的后续调用应传入 `None`.
    pub fn parse(
        &mut self,
        params: &mut CodecParameters,
        input: &[u8],
        pts: Option<i64>,
        dts: Option<i64>,
        pos: Option<i64>,
    ) -> (usize, Option<ParsedSegment>) {
        if !self.offset_fetched {
            self.cur_offset = pos.unwrap_or(0);
            self.next_frame_offset = self.cur_offset;
            self.offset_fetched = true;
        }

        if !input.is_empty() {
            if self.slots.len() == TIMESTAMP_SLOTS {
                self.slots.pop_front();
            }
            self.slots.push_back(TimestampSlot {
                offset: self.cur_offset,
                end: self.cur_offset + input.len() as i64,
                pts,
                dts,
                pos,
            });
        }

        if self.fetch_pending {
            self.fetch_pending = false;
            self.fetch_timestamp();
        }

        let out = self.parser.parse(params, self.flags, input);
        let consumed = out.consumed.min(input.len() as isize);

        let segment = out.frame.filter(|f| !f.data.is_empty()).map(|frame| {
            let frame_offset = self.next_frame_offset;
            self.frame_offset = Some(frame_offset);
            self.next_frame_offset = self.cur_offset + consumed as i64;
            self.fetch_pending = true;
            ParsedSegment {
                frame,
                pts: self.pts,
                dts: self.dts,
                pos: self.pos,
                frame_offset,
            }
        });

        let consumed = consumed.max(0) as usize;
        self.cur_offset += consumed as i64;
        (consumed, segment)
    }

    /// 为即将开始的帧选取所属输入段的时间戳
    fn fetch_timestamp(&mut self) {
        self.pts = None;
        self.dts = None;
        self.pos = None;
        for slot in &self.slots {
            let after_prev = self.frame_offset.is_none_or(|f| f < slot.offset);
            if self.cur_offset >= slot.offset && after_prev && slot.end != 0 {
                self.pts = slot.pts;
                self.dts = slot.dts;
                self.pos = slot.pos;
                if self.cur_offset < slot.end {
                    break;
                }
            }
        }
    }

    /// 关闭解析器
    pub fn close(mut self) {
        debug!("关闭解析器 {}", self.parser.name());
        self.parser.close();
    }
}

impl std::fmt::Debug for ParserContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserContext")
            .field("parser", &self.parser.name())
            .field("codec_id", &self.codec_id)
            .field("flags", &self.flags)
            .field("cur_offset", &self.cur_offset)
            .finish()
    }
}
