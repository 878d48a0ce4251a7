//! 流级编解码器探测集成测试

use tao_codec::{CodecId, CodecParameters, Packet};
use tao_core::{MediaType, TaoError};
use tao_format::{
    CodecTable, DemuxBuilder, DemuxContext, DemuxOptions, FormatId, MemorySource, MemoryStream,
    ParseMode, ProbeData, ProbeResult,
};

/// 构造 44.1kHz 立体声 ADTS 帧
fn adts_frame(payload_len: usize) -> Vec<u8> {
    let frame_length = (7 + payload_len) as u16;
    let mut f = vec![
        0xFF,
        0xF1,
        (1 << 6) | (4 << 2),
        (2 << 6) | ((frame_length >> 11) & 0x03) as u8,
        ((frame_length >> 3) & 0xFF) as u8,
        (((frame_length & 0x07) << 5) as u8) | 0x1F,
        0xFC,
    ];
    f.extend(std::iter::repeat_n(0x5A, payload_len));
    f
}

/// 一条编解码器未知、需要探测的流
fn unknown_stream() -> MemoryStream {
    MemoryStream::new(CodecParameters::default())
        .with_pts_info(64, 1, 44100)
        .with_probe(1)
}

fn read_all(ctx: &mut DemuxContext) -> Vec<Packet> {
    let mut out = Vec::new();
    loop {
        match ctx.read_frame() {
            Ok(pkt) => out.push(pkt),
            Err(TaoError::Eof) => break,
            Err(e) => panic!("读取失败: {e}"),
        }
    }
    out
}

#[test]
fn test_probe_adts识别后创建解析器() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut src = MemorySource::new("probe-adts")
        .with_stream(unknown_stream().with_parsing(ParseMode::Full));
    for i in 0..5i64 {
        src.push_packet(
            Packet::from_data(adts_frame(20)).with_timestamps(Some(i * 1024), Some(i * 1024)),
        );
    }

    let mut ctx = DemuxContext::open(Box::new(src), None).unwrap();
    assert!(!ctx.stream(0).unwrap().probe_done());

    let frames = read_all(&mut ctx);
    let st = ctx.stream(0).unwrap();
    assert!(st.probe_done());
    assert_eq!(st.codec_id(), CodecId::Aac);
    assert_eq!(st.media_type(), MediaType::Audio);
    assert_eq!(st.params.sample_rate, 44100, "解析器已写回采样率");

    // 探测期间缓冲的包按原顺序输出
    let pts: Vec<Option<i64>> = frames.iter().map(|p| p.pts).collect();
    assert_eq!(pts, (0..5).map(|i| Some(i * 1024)).collect::<Vec<_>>());
    assert!(frames.iter().all(|p| p.size() == 27 && p.duration == 1024));
}

#[test]
fn test_probe_无法识别时保持未知() {
    let mut src = MemorySource::new("probe-garbage").with_stream(unknown_stream());
    for i in 0..3i64 {
        src.push_packet(Packet::from_data(vec![0x11u8; 16]).with_timestamps(Some(i), Some(i)));
    }

    let mut ctx = DemuxContext::open(Box::new(src), None).unwrap();
    let frames = read_all(&mut ctx);
    assert_eq!(frames.len(), 3, "探测失败不丢包");
    let st = ctx.stream(0).unwrap();
    assert!(st.probe_done());
    assert_eq!(st.codec_id(), CodecId::None);
}

#[test]
fn test_probe_扩展名提示() {
    let mut src = MemorySource::new("probe-hint").with_stream(unknown_stream());
    for i in 0..3i64 {
        src.push_packet(Packet::from_data(vec![0x11u8; 16]).with_timestamps(Some(i), Some(i)));
    }
    let opts = DemuxOptions {
        url: Some("clip.aac".into()),
        ..DemuxOptions::default()
    };
    let mut ctx = DemuxBuilder::new()
        .options(opts)
        .open(Box::new(src), None)
        .unwrap();
    assert_eq!(read_all(&mut ctx).len(), 3);
    assert_eq!(ctx.stream(0).unwrap().codec_id(), CodecId::Aac);
}

#[test]
fn test_probe_包预算耗尽提前结束() {
    let mut src = MemorySource::new("probe-budget").with_stream(unknown_stream());
    for i in 0..10i64 {
        src.push_packet(Packet::from_data(vec![0x11u8; 16]).with_timestamps(Some(i), Some(i)));
    }
    let opts = DemuxOptions {
        max_probe_packets: 2,
        url: Some("clip.aac".into()),
        ..DemuxOptions::default()
    };
    let mut ctx = DemuxBuilder::new()
        .options(opts)
        .open(Box::new(src), None)
        .unwrap();

    assert_eq!(ctx.read_frame().unwrap().pts, Some(0));
    let st = ctx.stream(0).unwrap();
    assert!(st.probe_done(), "两个包后预算耗尽");
    assert_eq!(st.codec_id(), CodecId::Aac);
}

/// 总是给出固定候选的探测表
struct FixedTable(FormatId, u32);

impl CodecTable for FixedTable {
    fn score_probe(&self, _pd: &ProbeData<'_>) -> Option<ProbeResult> {
        Some(ProbeResult {
            format_id: self.0,
            score: self.1,
        })
    }
}

#[test]
fn test_probe_已有采样率时拒绝非音频候选() {
    let mut params = CodecParameters {
        media_type: MediaType::Audio,
        ..CodecParameters::default()
    };
    params.sample_rate = 48000;
    let mut src = MemorySource::new("probe-reject")
        .with_stream(MemoryStream::new(params).with_probe(1));
    src.push_packet(Packet::from_data(vec![0u8; 16]).with_timestamps(Some(0), Some(0)));

    let mut ctx = DemuxBuilder::new()
        .codec_table(Box::new(FixedTable(FormatId::H264, 100)))
        .open(Box::new(src), None)
        .unwrap();
    read_all(&mut ctx);
    assert_eq!(ctx.stream(0).unwrap().codec_id(), CodecId::None);
}

#[test]
fn test_probe_强制音频编解码器覆盖探测结果() {
    let mut src = MemorySource::new("probe-forced").with_stream(unknown_stream());
    src.push_packet(Packet::from_data(vec![0u8; 16]).with_timestamps(Some(0), Some(0)));
    let opts = DemuxOptions {
        audio_codec: Some("ac3".into()),
        ..DemuxOptions::default()
    };

    let mut ctx = DemuxBuilder::new()
        .options(opts)
        .codec_table(Box::new(FixedTable(FormatId::Mp3, 90)))
        .open(Box::new(src), None)
        .unwrap();
    read_all(&mut ctx);
    assert_eq!(ctx.stream(0).unwrap().codec_id(), CodecId::Ac3);
}
