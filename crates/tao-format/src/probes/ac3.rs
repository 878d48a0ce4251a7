//! AC-3 / E-AC-3 格式探测器.
//!
//! 两种格式共用同步字 0x0B77, 通过 bsid 区分: bsid <= 10 为 AC-3,
//! 11..=16 为 E-AC-3. 探测时只为与自身格式一致的帧链打分.

use crate::format_id::FormatId;
use crate::probe::{FormatProbe, ProbeData, ProbeScore, SCORE_EXTENSION};
use crate::probes::scan_frame_chain;

/// 同步信息 + bsi 开头所需的字节数
const AC3_HEADER_SIZE: usize = 7;

/// AC-3 码率表 (kbps), 按 frmsizecod >> 1 索引
const AC3_BITRATES: [u32; 19] = [
    32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 448, 512, 576, 640,
];

/// 码流类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ac3Kind {
    Ac3,
    Eac3,
}

/// 解析帧头, 返回 (类型, 帧字节数)
fn parse_ac3_header(buf: &[u8]) -> Option<(Ac3Kind, usize)> {
    if buf.len() < AC3_HEADER_SIZE || buf[0] != 0x0B || buf[1] != 0x77 {
        return None;
    }
    let bsid = buf[5] >> 3;
    match bsid {
        0..=10 => {
            let fscod = buf[4] >> 6;
            let frmsizecod = usize::from(buf[4] & 0x3F);
            let kbps = *AC3_BITRATES.get(frmsizecod >> 1)?;
            // 16 位字数
            let words = match fscod {
                0 => kbps * 2,
                1 => kbps * 320 / 147 + (frmsizecod & 1) as u32,
                2 => kbps * 3,
                _ => return None,
            };
            Some((Ac3Kind::Ac3, words as usize * 2))
        }
        11..=16 => {
            let frmsiz = (usize::from(buf[2] & 0x07) << 8) | usize::from(buf[3]);
            if buf[4] >> 6 == 3 && (buf[4] >> 4) & 0x03 == 3 {
                return None;
            }
            Some((Ac3Kind::Eac3, (frmsiz + 1) * 2))
        }
        _ => None,
    }
}

/// AC-3 / E-AC-3 格式探测器
pub struct Ac3Probe {
    kind: Ac3Kind,
}

impl Ac3Probe {
    /// AC-3 探测器
    pub const fn ac3() -> Self {
        Self { kind: Ac3Kind::Ac3 }
    }

    /// E-AC-3 探测器
    pub const fn eac3() -> Self {
        Self {
            kind: Ac3Kind::Eac3,
        }
    }
}

impl FormatProbe for Ac3Probe {
    fn probe(&self, pd: &ProbeData<'_>) -> Option<ProbeScore> {
        let kind = self.kind;
        let chain = scan_frame_chain(pd.buf, AC3_HEADER_SIZE, |b| {
            parse_ac3_header(b)
                .filter(|(k, _)| *k == kind)
                .map(|(_, len)| len)
        });
        let score = if chain.first_frames >= 7 {
            SCORE_EXTENSION + 1
        } else if chain.max_frames > 200 {
            SCORE_EXTENSION
        } else if chain.max_frames >= 4 {
            SCORE_EXTENSION / 2
        } else if chain.max_frames >= 1 {
            1
        } else {
            return None;
        };
        Some(score)
    }

    fn format_id(&self) -> FormatId {
        match self.kind {
            Ac3Kind::Ac3 => FormatId::Ac3,
            Ac3Kind::Eac3 => FormatId::Eac3,
        }
    }
}
