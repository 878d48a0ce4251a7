//! 数据包来源 (PacketSource) trait 定义.
//!
//! 对标 FFmpeg 的 `AVInputFormat` 中解复用引擎调用的回调
//! (`read_header` / `read_packet` / `read_timestamp` / `read_seek`).
//! 具体容器格式的头部解析不在本 crate 内实现, 引擎只通过此 trait 取包.
//!
//! [`MemorySource`] 是一个按脚本回放数据包的内存实现, 用于测试与基准.

use bitflags::bitflags;
use log::debug;
use tao_codec::{CodecParameters, Packet};
use tao_core::{Rational, TaoError, TaoResult};

use crate::index::SeekFlags;
use crate::stream::{Disposition, ParseMode, StreamSet};

bitflags! {
    /// 数据源能力标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SourceFlags: u32 {
        /// 读包时由引擎为关键帧自动建立 seek 索引
        const GENERIC_INDEX = 0x0100;
        /// PTS == DTS 是可信的, 不因重排深度为 1 而丢弃 DTS
        const KEEP_EQUAL_TIMESTAMPS = 0x0200;
        /// 不支持基于 `read_timestamp` 的二分查找 seek
        const NO_BIN_SEARCH = 0x2000;
        /// 不支持基于索引的通用 seek
        const NO_GEN_SEARCH = 0x4000;
    }
}

/// 数据包来源 trait
///
/// 使用流程:
/// 1. 引擎调用 `read_header()`, 数据源在 [`StreamSet`] 中创建已知的流
/// 2. 循环调用 `read_packet()`; 无头部的容器可以在此过程中继续创建流
/// 3. 可选: 调用 `read_seek()` / `read_timestamp()` / `seek_bytes()` 进行定位
pub trait PacketSource: Send {
    /// 数据源名称
    fn name(&self) -> &str;

    /// 能力标志
    fn flags(&self) -> SourceFlags {
        SourceFlags::empty()
    }

    /// 读取头部并创建流
    fn read_header(&mut self, streams: &mut StreamSet) -> TaoResult<()>;

    /// 读取下一个原始数据包
    ///
    /// # 返回
    /// - `Ok(packet)`: 成功读取一个数据包
    /// - `Err(TaoError::Eof)`: 已到达末尾
    /// - `Err(TaoError::Again)`: 非阻塞数据源暂无数据
    fn read_packet(&mut self, streams: &mut StreamSet) -> TaoResult<Packet>;

    /// 读取 `pos` 之后第一个属于 `stream_index` 的时间戳
    ///
    /// 返回 `(包的字节位置, 时间戳)`; 在 `pos_limit` 之前没有找到时返回 `None`.
    fn read_timestamp(
        &mut self,
        _stream_index: usize,
        _pos: i64,
        _pos_limit: i64,
    ) -> TaoResult<Option<(i64, i64)>> {
        Err(TaoError::Unsupported("read_timestamp".into()))
    }

    /// 数据源自身的 seek 实现
    fn read_seek(
        &mut self,
        _streams: &StreamSet,
        _stream_index: usize,
        _timestamp: i64,
        _flags: SeekFlags,
    ) -> TaoResult<()> {
        Err(TaoError::Unsupported("read_seek".into()))
    }

    /// 把读取位置移动到字节偏移 `pos`
    fn seek_bytes(&mut self, _pos: i64) -> TaoResult<()> {
        Err(TaoError::Unsupported("seek_bytes".into()))
    }

    /// 数据总字节数, 未知时返回 `None`
    fn size(&self) -> Option<i64> {
        None
    }

    /// 关闭数据源
    fn close(&mut self) {}
}

/// [`MemorySource`] 中一条流的描述
#[derive(Debug, Clone)]
pub struct MemoryStream {
    params: CodecParameters,
    pts_wrap_bits: u32,
    time_base: (u32, u32),
    need_parsing: ParseMode,
    probe_score: Option<i32>,
    r_frame_rate: Rational,
    disposition: Disposition,
    attached_pic: Option<Packet>,
}

impl MemoryStream {
    /// 创建流描述, 默认 33 位时间戳与 1/90000 时间基
    pub fn new(params: CodecParameters) -> Self {
        Self {
            params,
            pts_wrap_bits: 33,
            time_base: (1, 90000),
            need_parsing: ParseMode::None,
            probe_score: None,
            r_frame_rate: Rational::ZERO,
            disposition: Disposition::empty(),
            attached_pic: None,
        }
    }

    /// 设置时间基与时间戳位数
    pub fn with_pts_info(mut self, bits: u32, num: u32, den: u32) -> Self {
        self.pts_wrap_bits = bits;
        self.time_base = (num, den);
        self
    }

    /// 设置码流解析需求
    pub fn with_parsing(mut self, mode: ParseMode) -> Self {
        self.need_parsing = mode;
        self
    }

    /// 请求按内容探测编解码器
    pub fn with_probe(mut self, min_score: i32) -> Self {
        self.probe_score = Some(min_score);
        self
    }

    /// 设置容器声明的帧率
    pub fn with_frame_rate(mut self, rate: Rational) -> Self {
        self.r_frame_rate = rate;
        self
    }

    /// 设置封面图片
    pub fn with_attached_pic(mut self, pkt: Packet) -> Self {
        self.disposition |= Disposition::ATTACHED_PIC;
        self.attached_pic = Some(pkt);
        self
    }

    fn create(&self, streams: &mut StreamSet) -> TaoResult<usize> {
        let st = streams.add_stream(self.params.clone())?;
        st.set_pts_info(self.pts_wrap_bits, self.time_base.0, self.time_base.1);
        st.need_parsing = self.need_parsing;
        st.r_frame_rate = self.r_frame_rate;
        st.disposition = self.disposition;
        if let Some(pic) = &self.attached_pic {
            st.attached_pic = Some(pic.clone().with_stream(st.index));
        }
        if let Some(score) = self.probe_score {
            st.request_probe(score);
        }
        Ok(st.index)
    }
}

/// [`MemorySource`] 脚本中的一项
#[derive(Debug, Clone)]
pub enum MemoryEntry {
    /// 返回一个数据包
    Packet(Packet),
    /// 返回一次 [`TaoError::Again`]
    Again,
    /// 读包过程中出现新流, 随后继续读取
    NewStream(MemoryStream),
}

/// 内存数据源
///
/// 头部流在 `read_header` 时创建, 之后按顺序回放脚本条目.
/// 字节 seek 定位到第一个 `pos >= 目标` 的数据包.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    flags: SourceFlags,
    header: Vec<MemoryStream>,
    entries: Vec<MemoryEntry>,
    cursor: usize,
    created: usize,
}

impl MemorySource {
    /// 创建空数据源, 默认启用通用索引
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: SourceFlags::GENERIC_INDEX,
            header: Vec::new(),
            entries: Vec::new(),
            cursor: 0,
            created: 0,
        }
    }

    /// 替换能力标志
    pub fn with_flags(mut self, flags: SourceFlags) -> Self {
        self.flags = flags;
        self
    }

    /// 添加头部中声明的流
    pub fn with_stream(mut self, stream: MemoryStream) -> Self {
        self.header.push(stream);
        self
    }

    /// 追加一个数据包
    pub fn push_packet(&mut self, pkt: Packet) {
        self.entries.push(MemoryEntry::Packet(pkt));
    }

    /// 追加一个脚本条目
    pub fn push_entry(&mut self, entry: MemoryEntry) {
        self.entries.push(entry);
    }

    /// 已读取的脚本条目数
    pub fn position(&self) -> usize {
        self.cursor
    }

    fn packets(&self) -> impl Iterator<Item = (usize, &Packet)> {
        self.entries.iter().enumerate().filter_map(|(i, e)| match e {
            MemoryEntry::Packet(p) => Some((i, p)),
            _ => None,
        })
    }
}

impl PacketSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn flags(&self) -> SourceFlags {
        self.flags
    }

    fn read_header(&mut self, streams: &mut StreamSet) -> TaoResult<()> {
        for stream in &self.header {
            stream.create(streams)?;
        }
        debug!("{}: 头部声明 {} 条流", self.name, self.header.len());
        Ok(())
    }

    fn read_packet(&mut self, streams: &mut StreamSet) -> TaoResult<Packet> {
        loop {
            let Some(entry) = self.entries.get(self.cursor) else {
                return Err(TaoError::Eof);
            };
            self.cursor += 1;
            match entry {
                MemoryEntry::Packet(pkt) => return Ok(pkt.clone()),
                MemoryEntry::Again => return Err(TaoError::Again),
                MemoryEntry::NewStream(stream) => {
                    // seek 回放时不重复创建
                    let ordinal = self.entries[..self.cursor]
                        .iter()
                        .filter(|e| matches!(e, MemoryEntry::NewStream(_)))
                        .count();
                    if ordinal > self.created {
                        stream.create(streams)?;
                        self.created = ordinal;
                    }
                }
            }
        }
    }

    fn read_timestamp(
        &mut self,
        stream_index: usize,
        pos: i64,
        pos_limit: i64,
    ) -> TaoResult<Option<(i64, i64)>> {
        let found = self
            .packets()
            .filter_map(|(_, p)| Some((p.pos?, p)))
            .filter(|(at, p)| *at >= pos && *at < pos_limit && p.stream_index == stream_index)
            .find_map(|(at, p)| p.dts.or(p.pts).map(|ts| (at, ts)));
        Ok(found)
    }

    fn seek_bytes(&mut self, pos: i64) -> TaoResult<()> {
        let cursor = self
            .packets()
            .find(|(_, p)| p.pos.is_some_and(|at| at >= pos))
            .map_or(self.entries.len(), |(i, _)| i);
        self.cursor = cursor;
        debug!("{}: 字节 seek 到 {pos}, 条目 {}", self.name, self.cursor);
        Ok(())
    }

    fn size(&self) -> Option<i64> {
        self.packets()
            .filter_map(|(_, p)| p.pos.map(|at| at + p.size() as i64))
            .max()
    }
}
