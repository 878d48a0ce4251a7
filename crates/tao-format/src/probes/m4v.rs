//! MPEG-4 Part 2 Elementary Stream (M4V) 格式探测器.
//!
//! ## Start Code 定义
//! - 0x00000100-1F: Video Object
//! - 0x00000120-2F: Video Object Layer
//! - 0x000001B0: Visual Object Sequence Start
//! - 0x000001B5: Visual Object Start
//! - 0x000001B6: VOP Start

use crate::format_id::FormatId;
use crate::probe::{FormatProbe, ProbeData, ProbeScore, SCORE_EXTENSION};

const VOP_START_CODE: u32 = 0x0000_01B6;
const VISUAL_OBJECT_START_CODE: u32 = 0x0000_01B5;

/// M4V 格式探测器
///
/// 要求至少一个 VOL, VOP 数不少于 VO/VOL 数, 且没有出现其他码流的起始码.
pub struct M4vProbe;

impl FormatProbe for M4vProbe {
    fn probe(&self, pd: &ProbeData<'_>) -> Option<ProbeScore> {
        let (mut vo, mut vol, mut vop, mut viso, mut res) = (0u32, 0u32, 0u32, 0u32, 0u32);
        let mut code = u32::MAX;

        for &b in pd.buf {
            code = (code << 8) | u32::from(b);
            if code & 0xFFFF_FE00 != 0 || code < 2 {
                continue;
            }
            match code {
                VOP_START_CODE => vop += 1,
                VISUAL_OBJECT_START_CODE => viso += 1,
                0x100..=0x11F => vo += 1,
                0x120..=0x12F => vol += 1,
                0x1B0..=0x1B6 | 0x1BA..=0x1C3 => {}
                _ => res += 1,
            }
        }

        (vop >= viso && vop >= vol && vo >= vol && vol > 0 && res == 0).then_some(SCORE_EXTENSION)
    }

    fn format_id(&self) -> FormatId {
        FormatId::Mpeg4Es
    }
}
