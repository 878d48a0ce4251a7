//! MPEG-4 Part 2 码流解析器.
//!
//! 把任意切分的 MPEG-4 Part 2 (ISO/IEC 14496-2) 基本流重新切分为帧:
//! 一帧 = 若干头部 (VOS/VO/VOL/GOV/UserData) + 一个 VOP,
//! 结束于 VOP 之后出现的下一个起始码.

use log::trace;

use crate::codec_id::CodecId;
use crate::codec_parameters::CodecParameters;
use crate::parser::{CodecParser, FrameData, ParseOutput, ParsedFrame, ParserFlags, PictureType};

/// VOP 起始码
const VOP_START_CODE: u32 = 0x0000_01B6;
/// 切片起始码, 不视为帧边界
const SLICE_START_CODE: u32 = 0x0000_01B7;

/// MPEG-4 Part 2 起始码类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mpeg4StartCodeType {
    /// 视频对象 (Video Object, 0x00-0x1F)
    VideoObject(u8),
    /// 视频对象层 (Video Object Layer, 0x20-0x2F)
    VideoObjectLayer(u8),
    /// 视觉对象序列起始 (0xB0)
    VisualObjectSequenceStart,
    /// 视觉对象序列结束 (0xB1)
    VisualObjectSequenceEnd,
    /// 用户数据 (0xB2)
    UserData,
    /// 组头 (Group of VOP, 0xB3)
    GroupOfVop,
    /// 视觉对象 (0xB5)
    VisualObject,
    /// VOP 起始码 (0xB6)
    Vop,
    /// 其他起始码
    Other(u8),
}

impl Mpeg4StartCodeType {
    /// 从起始码字节识别类型
    pub fn from_byte(code: u8) -> Self {
        match code {
            0x00..=0x1F => Self::VideoObject(code),
            0x20..=0x2F => Self::VideoObjectLayer(code - 0x20),
            0xB0 => Self::VisualObjectSequenceStart,
            0xB1 => Self::VisualObjectSequenceEnd,
            0xB2 => Self::UserData,
            0xB3 => Self::GroupOfVop,
            0xB5 => Self::VisualObject,
            0xB6 => Self::Vop,
            other => Self::Other(other),
        }
    }
}

/// 从帧数据中读取第一个 VOP 的编码类型
///
/// vop_coding_type 位于 VOP 起始码之后的最高 2 位.
pub fn vop_picture_type(frame: &[u8]) -> PictureType {
    let Some(at) = frame.windows(4).position(|w| w == [0x00, 0x00, 0x01, 0xB6]) else {
        return PictureType::None;
    };
    match frame.get(at + 4).map(|b| b >> 6) {
        Some(0) => PictureType::I,
        Some(1) => PictureType::P,
        Some(2) => PictureType::B,
        Some(3) => PictureType::S,
        _ => PictureType::None,
    }
}

/// MPEG-4 Part 2 帧切分解析器
pub struct Mpeg4VideoParser {
    /// 跨调用拼接的帧数据
    buffer: Vec<u8>,
    /// 起始码扫描状态 (最近 4 字节)
    state: u32,
    /// 当前帧是否已见到 VOP 起始码
    vop_found: bool,
}

impl Mpeg4VideoParser {
    /// 创建解析器实例 (工厂函数)
    pub fn create() -> Box<dyn CodecParser> {
        Box::new(Self::new())
    }

    fn new() -> Self {
        Self {
            buffer: Vec::new(),
            state: u32::MAX,
            vop_found: false,
        }
    }

    /// 查找当前帧在 `buf` 中的结束位置
    ///
    /// 返回值为下一个起始码首字节的偏移, 可能为负 (起始码前缀仍在内部缓冲中).
    fn find_frame_end(&mut self, buf: &[u8]) -> Option<isize> {
        let mut state = self.state;
        let mut vop_found = self.vop_found;
        let mut i = 0usize;

        if !vop_found {
            while i < buf.len() {
                state = (state << 8) | u32::from(buf[i]);
                i += 1;
                if state == VOP_START_CODE {
                    vop_found = true;
                    break;
                }
            }
        }

        if vop_found {
            while i < buf.len() {
                state = (state << 8) | u32::from(buf[i]);
                if state & 0xFFFF_FF00 == 0x100 && state != SLICE_START_CODE {
                    self.vop_found = false;
                    self.state = u32::MAX;
                    return Some(i as isize - 3);
                }
                i += 1;
            }
        }

        self.vop_found = vop_found;
        self.state = state;
        None
    }

    /// 帧结束后, 用残留在缓冲区尾部的起始码前缀重建扫描状态
    fn reseed(&mut self) {
        self.state = self
            .buffer
            .iter()
            .fold(u32::MAX, |s, &b| (s << 8) | u32::from(b));
    }

    fn emit(data: FrameData, frame: &[u8]) -> ParsedFrame {
        let mut out = ParsedFrame::new(data);
        out.pict_type = vop_picture_type(frame);
        out
    }
}

impl CodecParser for Mpeg4VideoParser {
    fn name(&self) -> &'static str {
        "mpeg4video"
    }

    fn codec_ids(&self) -> &[CodecId] {
        &[CodecId::Mpeg4]
    }

    fn parse(
        &mut self,
        _params: &mut CodecParameters,
        flags: ParserFlags,
        input: &[u8],
    ) -> ParseOutput {
        if flags.contains(ParserFlags::COMPLETE_FRAMES) {
            if input.is_empty() {
                return ParseOutput::pending(0);
            }
            return ParseOutput {
                consumed: input.len() as isize,
                frame: Some(Self::emit(FrameData::Input(0..input.len()), input)),
            };
        }

        if input.is_empty() {
            // 流结束: 输出缓存的最后一帧
            self.vop_found = false;
            self.state = u32::MAX;
            if self.buffer.is_empty() {
                return ParseOutput::pending(0);
            }
            let data = std::mem::take(&mut self.buffer);
            let frame = Self::emit(FrameData::Owned(Vec::new()), &data);
            return ParseOutput {
                consumed: 0,
                frame: Some(ParsedFrame {
                    data: FrameData::Owned(data),
                    ..frame
                }),
            };
        }

        let Some(end) = self.find_frame_end(input) else {
            self.buffer.extend_from_slice(input);
            return ParseOutput::pending(input.len());
        };

        if end >= 0 {
            let end = end as usize;
            if self.buffer.is_empty() {
                let frame = Self::emit(FrameData::Input(0..end), &input[..end]);
                return ParseOutput {
                    consumed: end as isize,
                    frame: Some(frame),
                };
            }
            self.buffer.extend_from_slice(&input[..end]);
            let data = std::mem::take(&mut self.buffer);
            let frame = Self::emit(FrameData::Owned(Vec::new()), &data);
            return ParseOutput {
                consumed: end as isize,
                frame: Some(ParsedFrame {
                    data: FrameData::Owned(data),
                    ..frame
                }),
            };
        }

        // 下一帧的起始码前缀落在之前缓存的数据里
        let back = end.unsigned_abs();
        let split = self.buffer.len().saturating_sub(back);
        let tail = self.buffer.split_off(split);
        let data = std::mem::replace(&mut self.buffer, tail);
        self.reseed();
        trace!("mpeg4: 帧边界跨越输入, 回退 {back} 字节");
        let frame = Self::emit(FrameData::Owned(Vec::new()), &data);
        ParseOutput {
            consumed: end,
            frame: Some(ParsedFrame {
                data: FrameData::Owned(data),
                ..frame
            }),
        }
    }

    fn close(&mut self) {
        self.buffer.clear();
    }
}
