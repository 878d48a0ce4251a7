//! AAC ADTS 格式探测器.

use tao_codec::parsers::adts::{ADTS_HEADER_SIZE, parse_adts_header};

use crate::format_id::FormatId;
use crate::probe::{FormatProbe, ProbeData, ProbeScore, SCORE_EXTENSION};
use crate::probes::scan_frame_chain;

/// AAC ADTS 格式探测器
///
/// 连续 3 帧以上的 ADTS 头部链给出高于扩展名的分数.
pub struct AacProbe;

impl FormatProbe for AacProbe {
    fn probe(&self, pd: &ProbeData<'_>) -> Option<ProbeScore> {
        let chain = scan_frame_chain(pd.buf, ADTS_HEADER_SIZE, |b| {
            parse_adts_header(b).map(|h| usize::from(h.frame_length))
        });
        let score = if chain.first_frames >= 3 {
            SCORE_EXTENSION + 1
        } else if chain.max_frames > 100 {
            SCORE_EXTENSION
        } else if chain.max_frames >= 3 {
            SCORE_EXTENSION / 2
        } else if chain.first_frames >= 1 {
            1
        } else {
            return None;
        };
        Some(score)
    }

    fn format_id(&self) -> FormatId {
        FormatId::AacAdts
    }
}
