//! MPEG Audio (MP1/MP2/MP3) 格式探测器.
//!
//! MP3 帧头格式 (4 字节):
//! - sync: 11 bits (全 1)
//! - version: 2 bits, layer: 2 bits, protection: 1 bit
//! - bitrate_index: 4 bits, sampling_rate_index: 2 bits, padding: 1 bit
//! - 其余为声道模式与版权信息

use crate::format_id::FormatId;
use crate::probe::{FormatProbe, ProbeData, ProbeScore, SCORE_EXTENSION};
use crate::probes::scan_frame_chain;

/// MPEG-1 Layer III 比特率表 (kbps), 索引 1-14
const BITRATE_V1_L3: [u32; 15] = [
    0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320,
];

/// MPEG-2/2.5 Layer II/III 比特率表 (kbps)
const BITRATE_V2_L23: [u32; 15] = [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];

/// MPEG-1 Layer II 比特率表 (kbps)
const BITRATE_V1_L2: [u32; 15] = [
    0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384,
];

/// MPEG-1 Layer I 比特率表 (kbps)
const BITRATE_V1_L1: [u32; 15] = [
    0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448,
];

/// MPEG-2/2.5 Layer I 比特率表 (kbps)
const BITRATE_V2_L1: [u32; 15] = [
    0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256,
];

/// MPEG-1 采样率表
const SAMPLERATE_V1: [u32; 3] = [44100, 48000, 32000];

/// MPEG 版本
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MpegVersion {
    V1,
    V2,
    V25,
}

/// 由 4 字节帧头计算帧总字节数, 非法帧头返回 `None`
fn mpa_frame_size(header: u32) -> Option<usize> {
    // 检查同步位 (bit 31-21 必须全为 1)
    if (header >> 21) != 0x7FF {
        return None;
    }

    let version = match (header >> 19) & 0x03 {
        0 => MpegVersion::V25,
        2 => MpegVersion::V2,
        3 => MpegVersion::V1,
        _ => return None,
    };

    let layer = match (header >> 17) & 0x03 {
        1 => 3,
        2 => 2,
        3 => 1,
        _ => return None,
    };

    // free 格式无法由帧头得到帧长
    let br_idx = ((header >> 12) & 0x0F) as usize;
    if br_idx == 0 || br_idx == 15 {
        return None;
    }
    let bitrate_kbps = match (version, layer) {
        (MpegVersion::V1, 3) => BITRATE_V1_L3[br_idx],
        (MpegVersion::V1, 2) => BITRATE_V1_L2[br_idx],
        (MpegVersion::V1, _) => BITRATE_V1_L1[br_idx],
        (_, 1) => BITRATE_V2_L1[br_idx],
        _ => BITRATE_V2_L23[br_idx],
    };
    let bitrate = bitrate_kbps * 1000;

    let sr_idx = ((header >> 10) & 0x03) as usize;
    if sr_idx == 3 {
        return None;
    }
    let sample_rate = match version {
        MpegVersion::V1 => SAMPLERATE_V1[sr_idx],
        MpegVersion::V2 => SAMPLERATE_V1[sr_idx] / 2,
        MpegVersion::V25 => SAMPLERATE_V1[sr_idx] / 4,
    };

    let padding = (header >> 9) & 1;
    let size = match (layer, version) {
        (1, _) => (12 * bitrate / sample_rate + padding) * 4,
        (3, MpegVersion::V2 | MpegVersion::V25) => 72 * bitrate / sample_rate + padding,
        _ => 144 * bitrate / sample_rate + padding,
    };
    Some(size as usize)
}

/// MP3 格式探测器
pub struct Mp3Probe;

impl FormatProbe for Mp3Probe {
    fn probe(&self, pd: &ProbeData<'_>) -> Option<ProbeScore> {
        let chain = scan_frame_chain(pd.buf, 4, |b| {
            mpa_frame_size(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        });
        let score = if chain.first_frames >= 7 {
            SCORE_EXTENSION + 1
        } else if chain.max_frames > 200 {
            SCORE_EXTENSION
        } else if chain.max_frames >= 4 {
            SCORE_EXTENSION / 2
        } else if chain.first_frames >= 1 {
            1
        } else {
            return None;
        };
        Some(score)
    }

    fn format_id(&self) -> FormatId {
        FormatId::Mp3
    }
}
