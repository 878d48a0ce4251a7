//! H.264 Annex B 格式探测器.
//!
//! 扫描 `00 00 01` 起始码后的 NAL 头部, 统计 SPS/PPS/IDR/非 IDR 切片
//! 与保留类型的数量, 并检查 nal_ref_idc 与 NAL 类型的一致性.

use crate::format_id::FormatId;
use crate::probe::{FormatProbe, ProbeData, ProbeScore, SCORE_EXTENSION};

/// 各 NAL 类型对 nal_ref_idc 的要求
///
/// 0: 任意; 1: 必须为 0; -1: 必须非 0; 2: 保留类型
const REF_ZERO: [i8; 32] = [
    2, 0, 0, 0, 0, -1, 1, -1, -1, 1, 1, 1, 1, -1, 2, 2, 2, 2, 2, 0, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2,
    2, 2,
];

/// H.264 Annex B 格式探测器
pub struct H264Probe;

impl FormatProbe for H264Probe {
    fn probe(&self, pd: &ProbeData<'_>) -> Option<ProbeScore> {
        let buf = pd.buf;
        let (mut sps, mut pps, mut idr, mut sli, mut res) = (0u32, 0u32, 0u32, 0u32, 0u32);
        let mut code = u32::MAX;

        for i in 0..buf.len().saturating_sub(2) {
            code = (code << 8) | u32::from(buf[i]);
            if code & 0xFFFF_FF00 != 0x100 {
                continue;
            }
            // forbidden_zero_bit
            if code & 0x80 != 0 {
                return None;
            }
            let ref_idc = (code >> 5) & 3;
            let nal_type = (code & 0x1F) as usize;
            match REF_ZERO[nal_type] {
                1 if ref_idc != 0 => return None,
                -1 if ref_idc == 0 => return None,
                2 if !(code == 0x100 && buf[i + 1] == 0 && buf[i + 2] == 0) => res += 1,
                _ => {}
            }
            match nal_type {
                1 => sli += 1,
                5 => idr += 1,
                7 => sps += 1,
                8 => pps += 1,
                _ => {}
            }
        }

        if sps > 0 && pps > 0 && (idr > 0 || sli > 3) && res < sps + pps + idr {
            Some(SCORE_EXTENSION + 1)
        } else {
            None
        }
    }

    fn format_id(&self) -> FormatId {
        FormatId::H264
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nal(header: u8) -> Vec<u8> {
        vec![0x00, 0x00, 0x00, 0x01, header, 0x42, 0x11, 0x22]
    }

    #[test]
    fn test_h264_probe_完整序列() {
        let mut data = nal(0x67);
        data.extend(nal(0x68));
        data.extend(nal(0x65));
        assert_eq!(
            H264Probe.probe(&ProbeData::new(&data)),
            Some(SCORE_EXTENSION + 1)
        );
    }

    #[test]
    fn test_h264_probe_缺少参数集() {
        let mut data = nal(0x65);
        data.extend(nal(0x41));
        assert_eq!(H264Probe.probe(&ProbeData::new(&data)), None);
    }

    #[test]
    fn test_h264_probe_ref_idc_不一致() {
        // IDR 的 nal_ref_idc 为 0, 非法
        let mut data = nal(0x67);
        data.extend(nal(0x68));
        data.extend(nal(0x05));
        assert_eq!(H264Probe.probe(&ProbeData::new(&data)), None);
    }
}
