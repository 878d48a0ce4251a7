//! AAC ADTS 帧解析器.
//!
//! ADTS 头部格式 (7 或 9 字节):
//! - syncword: 12 bits (0xFFF)
//! - ID: 1 bit, layer: 2 bits (必须为 0), protection_absent: 1 bit
//! - profile: 2 bits, sampling_frequency_index: 4 bits, private: 1 bit
//! - channel_configuration: 3 bits
//! - frame_length: 13 bits (含头部)
//! - buffer_fullness: 11 bits, number_of_raw_data_blocks: 2 bits
//! - CRC: 16 bits (protection_absent == 0 时)

use log::trace;

use crate::codec_id::CodecId;
use crate::codec_parameters::CodecParameters;
use crate::parser::{CodecParser, FrameData, ParseOutput, ParsedFrame, ParserFlags};

/// ADTS 头部最小长度
pub const ADTS_HEADER_SIZE: usize = 7;

/// AAC 采样率表 (按 sampling_frequency_index)
pub const AAC_SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// 解析后的 ADTS 头部
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    /// AAC Profile (0=Main, 1=LC, 2=SSR, 3=LTP)
    pub profile: u8,
    /// 采样率索引
    pub sampling_frequency_index: u8,
    /// 声道配置
    pub channel_configuration: u8,
    /// 帧总大小 (含头部)
    pub frame_length: u16,
    /// 是否有 CRC 校验
    pub has_crc: bool,
    /// 头部大小 (7 或 9 字节)
    pub header_size: u8,
    /// 原始数据块数量 (1..=4)
    pub raw_data_blocks: u8,
}

impl AdtsHeader {
    /// 采样率 (Hz)
    pub fn sample_rate(&self) -> u32 {
        AAC_SAMPLE_RATES[usize::from(self.sampling_frequency_index)]
    }

    /// 本帧包含的采样数
    pub fn samples(&self) -> u32 {
        1024 * u32::from(self.raw_data_blocks)
    }
}

/// 解析 ADTS 帧头部 (从 7 字节数据中)
pub fn parse_adts_header(data: &[u8]) -> Option<AdtsHeader> {
    if data.len() < ADTS_HEADER_SIZE {
        return None;
    }

    // 检查同步字 (12 bits = 0xFFF)
    if data[0] != 0xFF || (data[1] & 0xF0) != 0xF0 {
        return None;
    }

    // layer 必须为 0
    if (data[1] & 0x06) != 0 {
        return None;
    }

    let protection_absent = (data[1] & 0x01) != 0;
    let profile = (data[2] >> 6) & 0x03;
    let sampling_frequency_index = (data[2] >> 2) & 0x0F;
    let channel_configuration = ((data[2] & 0x01) << 2) | ((data[3] >> 6) & 0x03);

    // frame_length (13 bits): data[3]的低2位 + data[4]全部 + data[5]的高3位
    let frame_length =
        (u16::from(data[3] & 0x03) << 11) | (u16::from(data[4]) << 3) | (u16::from(data[5]) >> 5);
    let raw_data_blocks = (data[6] & 0x03) + 1;

    if sampling_frequency_index >= 13 {
        return None;
    }

    let header_size = if protection_absent { 7 } else { 9 };

    if frame_length < u16::from(header_size) {
        return None;
    }

    Some(AdtsHeader {
        profile,
        sampling_frequency_index,
        channel_configuration,
        frame_length,
        has_crc: !protection_absent,
        header_size,
        raw_data_blocks,
    })
}

/// ADTS 帧切分解析器
///
/// 按头部中的 frame_length 切分, 同时把采样率与声道数写回编解码器参数.
pub struct AdtsParser {
    /// 跨调用拼接的帧数据
    buffer: Vec<u8>,
    /// 缓冲中帧的完整长度 (头部已读到时)
    expected: Option<usize>,
}

impl AdtsParser {
    /// 创建解析器实例 (工厂函数)
    pub fn create() -> Box<dyn CodecParser> {
        Box::new(Self {
            buffer: Vec::new(),
            expected: None,
        })
    }

    fn frame(data: FrameData, header: &AdtsHeader, params: &mut CodecParameters) -> ParsedFrame {
        params.sample_rate = header.sample_rate();
        if header.channel_configuration > 0 {
            params.channels = u32::from(header.channel_configuration);
        }
        params.frame_size = header.samples();
        let mut out = ParsedFrame::new(data);
        out.key_frame = Some(true);
        out.duration = i64::from(header.samples());
        out
    }

    /// 继续填充跨调用的帧
    fn continue_buffered(&mut self, params: &mut CodecParameters, input: &[u8]) -> ParseOutput {
        let mut used = 0;
        if self.expected.is_none() {
            let need = ADTS_HEADER_SIZE - self.buffer.len().min(ADTS_HEADER_SIZE);
            let take = need.min(input.len());
            self.buffer.extend_from_slice(&input[..take]);
            used = take;
            match parse_adts_header(&self.buffer) {
                Some(h) => self.expected = Some(usize::from(h.frame_length)),
                None if self.buffer.len() < ADTS_HEADER_SIZE => return ParseOutput::pending(used),
                None => {
                    // 缓冲开头不是合法头部, 丢弃并重新同步
                    trace!("adts: 丢弃 {} 字节无效数据", self.buffer.len());
                    self.buffer.clear();
                    return ParseOutput::pending(used);
                }
            }
        }

        let expected = self.expected.unwrap_or(ADTS_HEADER_SIZE);
        let take = (expected - self.buffer.len()).min(input.len() - used);
        self.buffer.extend_from_slice(&input[used..used + take]);
        used += take;
        if self.buffer.len() < expected {
            return ParseOutput::pending(used);
        }

        self.expected = None;
        let data = std::mem::take(&mut self.buffer);
        match parse_adts_header(&data) {
            Some(h) => ParseOutput {
                consumed: used as isize,
                frame: Some(Self::frame(FrameData::Owned(data), &h, params)),
            },
            None => ParseOutput::pending(used),
        }
    }
}

impl CodecParser for AdtsParser {
    fn name(&self) -> &'static str {
        "aac"
    }

    fn codec_ids(&self) -> &[CodecId] {
        &[CodecId::Aac]
    }

    fn parse(
        &mut self,
        params: &mut CodecParameters,
        _flags: ParserFlags,
        input: &[u8],
    ) -> ParseOutput {
        if input.is_empty() {
            // 不完整的尾帧直接丢弃
            self.buffer.clear();
            self.expected = None;
            return ParseOutput::pending(0);
        }

        if !self.buffer.is_empty() {
            return self.continue_buffered(params, input);
        }

        // 定位同步字
        let start = (0..input.len())
            .find(|&i| {
                input[i] == 0xFF && (input.len() - i < 2 || input[i + 1] & 0xF6 == 0xF0)
            })
            .unwrap_or(input.len());
        if start > 0 {
            trace!("adts: 跳过 {start} 字节至同步字");
            return ParseOutput::pending(start);
        }

        match parse_adts_header(input) {
            Some(h) if usize::from(h.frame_length) <= input.len() => {
                let len = usize::from(h.frame_length);
                ParseOutput {
                    consumed: len as isize,
                    frame: Some(Self::frame(FrameData::Input(0..len), &h, params)),
                }
            }
            Some(_) => self.continue_buffered(params, input),
            None if input.len() < ADTS_HEADER_SIZE => self.continue_buffered(params, input),
            // 同步字后的头部无效, 跳过该字节
            None => ParseOutput::pending(1),
        }
    }

    fn close(&mut self) {
        self.buffer.clear();
        self.expected = None;
    }
}
