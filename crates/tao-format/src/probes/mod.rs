//! 内置的裸流内容探测器.
//!
//! 音频类探测器统计 "连续合法帧链" 的长度: 从缓冲区开头起的链长,
//! 以及任意位置起的最长链. 视频类探测器统计起始码的分布.

pub mod aac;
pub mod ac3;
pub mod h264;
pub mod m4v;
pub mod mp3;

pub use aac::AacProbe;
pub use ac3::Ac3Probe;
pub use h264::H264Probe;
pub use m4v::M4vProbe;
pub use mp3::Mp3Probe;

use crate::probe::FormatProbe;

/// 全部内置探测器
pub fn builtin_probes() -> Vec<Box<dyn FormatProbe>> {
    vec![
        Box::new(AacProbe),
        Box::new(Ac3Probe::ac3()),
        Box::new(Ac3Probe::eac3()),
        Box::new(H264Probe),
        Box::new(M4vProbe),
        Box::new(Mp3Probe),
    ]
}

/// 帧链统计结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct FrameChain {
    /// 从缓冲区开头起的连续帧数
    pub first_frames: usize,
    /// 任意位置起的最长连续帧数
    pub max_frames: usize,
}

/// 统计连续帧链
///
/// `frame_len` 对以帧头开始的切片返回整帧长度, 不是帧头时返回 `None`.
/// 剩余数据不足 `header_len` 时视为到达缓冲区末尾.
/// 非开头位置起的链若被非法数据打断, 视为误判不计数.
pub(crate) fn scan_frame_chain<F>(buf: &[u8], header_len: usize, frame_len: F) -> FrameChain
where
    F: Fn(&[u8]) -> Option<usize>,
{
    let mut chain = FrameChain::default();
    let mut start = 0;
    while start < buf.len() {
        let mut pos = start;
        let mut frames = 0;
        while buf.len() - pos >= header_len {
            match frame_len(&buf[pos..]) {
                Some(len) if len >= header_len => {
                    frames += 1;
                    pos += len.min(buf.len() - pos);
                }
                _ => {
                    if start != 0 {
                        frames = 0;
                    }
                    break;
                }
            }
        }
        if start == 0 {
            chain.first_frames = frames;
        }
        chain.max_frames = chain.max_frames.max(frames);
        start = pos + 1;
    }
    chain
}
