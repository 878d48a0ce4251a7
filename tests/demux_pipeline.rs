//! 解复用流水线集成测试: 解析器切帧、时间戳重建与流过滤

use tao_codec::{
    CodecId, CodecParameters, CodecParser, FrameData, Packet, PacketFlags, ParseOutput,
    ParsedFrame, ParserFlags, ParserRegistry, PictureType,
};
use tao_core::{MediaType, TaoError, TaoResult};
use tao_format::{
    Discard, DemuxBuilder, DemuxContext, DemuxOptions, MemorySource, MemoryStream, PacketSource,
    ParseMode, SourceFlags, StreamSet,
};

// ============================================================
// 辅助函数
// ============================================================

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

/// 读到 EOF 为止
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

fn mp3_params() -> CodecParameters {
    let mut params = CodecParameters::new(CodecId::Mp3);
    params.sample_rate = 48000;
    params.frame_size = 1152;
    params
}

/// 按 4 字节切帧, 不足一帧的尾部留到下一个输入或冲刷时输出
struct Chunk4Parser {
    carry: Vec<u8>,
}

impl Chunk4Parser {
    const SIZE: usize = 4;

    fn create() -> Box<dyn CodecParser> {
        Box::new(Self { carry: Vec::new() })
    }

    fn frame(data: FrameData) -> Option<ParsedFrame> {
        let mut frame = ParsedFrame::new(data);
        frame.pict_type = PictureType::I;
        Some(frame)
    }
}

impl CodecParser for Chunk4Parser {
    fn name(&self) -> &'static str {
        "chunk4"
    }

    fn codec_ids(&self) -> &[CodecId] {
        &[CodecId::Mpeg4]
    }

    fn parse(
        &mut self,
        _params: &mut CodecParameters,
        _flags: ParserFlags,
        input: &[u8],
    ) -> ParseOutput {
        if input.is_empty() {
            let frame = (!self.carry.is_empty())
                .then(|| Self::frame(FrameData::Owned(std::mem::take(&mut self.carry))))
                .flatten();
            return ParseOutput { consumed: 0, frame };
        }
        if !self.carry.is_empty() {
            let n = (Self::SIZE - self.carry.len()).min(input.len());
            self.carry.extend_from_slice(&input[..n]);
            let frame = (self.carry.len() == Self::SIZE)
                .then(|| Self::frame(FrameData::Owned(std::mem::take(&mut self.carry))))
                .flatten();
            return ParseOutput {
                consumed: n as isize,
                frame,
            };
        }
        if input.len() >= Self::SIZE {
            return ParseOutput {
                consumed: Self::SIZE as isize,
                frame: Self::frame(FrameData::Input(0..Self::SIZE)),
            };
        }
        self.carry = input.to_vec();
        ParseOutput::pending(input.len())
    }
}

fn chunk4_registry() -> ParserRegistry {
    let mut reg = ParserRegistry::new();
    reg.register(CodecId::Mpeg4, "chunk4", Chunk4Parser::create);
    reg
}

/// 第 `fail_at` 次读取时返回 I/O 错误, 不消耗内部数据
struct FailingSource {
    inner: MemorySource,
    reads: usize,
    fail_at: usize,
}

impl PacketSource for FailingSource {
    fn name(&self) -> &str {
        "failing"
    }

    fn flags(&self) -> SourceFlags {
        self.inner.flags()
    }

    fn read_header(&mut self, streams: &mut StreamSet) -> TaoResult<()> {
        self.inner.read_header(streams)
    }

    fn read_packet(&mut self, streams: &mut StreamSet) -> TaoResult<Packet> {
        self.reads += 1;
        if self.reads == self.fail_at {
            return Err(TaoError::Io(std::io::Error::other("磁盘已移除")));
        }
        self.inner.read_packet(streams)
    }
}

// ============================================================
// 测试
// ============================================================

#[test]
fn test_demux_adts_任意切分重新成帧() {
    let _ = env_logger::builder().is_test(true).try_init();
    let f1 = adts_frame(10);
    let f2 = adts_frame(30);
    let f3 = adts_frame(20);
    let f4 = adts_frame(40);

    // 第一个原始包: f1 + f2 + f3 的前 5 字节; 第二个: f3 剩余 + f4
    let mut a = Vec::new();
    a.extend_from_slice(&f1);
    a.extend_from_slice(&f2);
    a.extend_from_slice(&f3[..5]);
    let mut b = Vec::new();
    b.extend_from_slice(&f3[5..]);
    b.extend_from_slice(&f4);
    let a_len = a.len() as i64;

    let mut src = MemorySource::new("adts").with_stream(
        MemoryStream::new(CodecParameters::new(CodecId::Aac))
            .with_pts_info(64, 1, 44100)
            .with_parsing(ParseMode::Full),
    );
    src.push_packet(
        Packet::from_data(a)
            .with_timestamps(Some(0), Some(0))
            .with_pos(0),
    );
    src.push_packet(
        Packet::from_data(b)
            .with_timestamps(Some(3072), Some(3072))
            .with_pos(a_len),
    );

    let mut ctx = DemuxContext::open(Box::new(src), None).unwrap();
    let frames = read_all(&mut ctx);

    let sizes: Vec<usize> = frames.iter().map(Packet::size).collect();
    assert_eq!(sizes, vec![f1.len(), f2.len(), f3.len(), f4.len()]);
    assert_eq!(frames[2].data.as_ref(), f3.as_slice(), "跨包帧应被完整拼接");

    let pts: Vec<Option<i64>> = frames.iter().map(|p| p.pts).collect();
    assert_eq!(pts, vec![Some(0), Some(1024), Some(2048), Some(3072)]);
    for pkt in &frames {
        assert_eq!(pkt.dts, pkt.pts, "音频 DTS 与 PTS 相同");
        assert_eq!(pkt.duration, 1024, "每帧 1024 个采样");
        assert!(pkt.is_keyframe());
    }

    let st = ctx.stream(0).unwrap();
    assert_eq!(st.params.sample_rate, 44100);
    assert_eq!(st.params.channels, 2);
    assert_eq!(st.first_dts, Some(0));
    assert_eq!(st.start_time, Some(0));
    assert!(!st.has_parser(), "EOF 后解析器已关闭");
}

#[test]
fn test_demux_无时间戳起始包输出相对零点() {
    let mut src = MemorySource::new("relative")
        .with_stream(MemoryStream::new(mp3_params()).with_pts_info(64, 1, 1000));
    src.push_packet(Packet::from_data(vec![0u8; 8]));
    src.push_packet(Packet::from_data(vec![0u8; 8]));
    src.push_packet(Packet::from_data(vec![0u8; 8]).with_timestamps(Some(100), Some(100)));

    let mut ctx = DemuxContext::open(Box::new(src), None).unwrap();
    let frames = read_all(&mut ctx);
    let pts: Vec<Option<i64>> = frames.iter().map(|p| p.pts).collect();
    // 1152 / 48000 秒 = 24 毫秒
    assert_eq!(pts, vec![Some(0), Some(24), Some(100)]);
    assert!(frames.iter().all(|p| p.duration == 24));
    assert_eq!(ctx.stream(0).unwrap().first_dts, Some(52));
}

#[test]
fn test_demux_pts推导dts() {
    // 解码顺序 I P B P B, 只有 PTS
    let mut params = CodecParameters::new(CodecId::Mpeg4);
    params.has_b_frames = 1;
    let mut src = MemorySource::new("reorder")
        .with_stream(MemoryStream::new(params).with_pts_info(64, 1, 25));
    for pts in [0, 2, 1, 4, 3] {
        src.push_packet(Packet::from_data(vec![0u8; 8]).with_timestamps(Some(pts), None));
    }

    let mut ctx = DemuxContext::open(Box::new(src), None).unwrap();
    let frames = read_all(&mut ctx);
    let dts: Vec<Option<i64>> = frames.iter().map(|p| p.dts).collect();
    assert_eq!(dts, vec![None, Some(0), Some(1), Some(2), Some(3)]);
    let pts: Vec<Option<i64>> = frames.iter().map(|p| p.pts).collect();
    assert_eq!(pts, vec![Some(0), Some(2), Some(1), Some(4), Some(3)]);
    assert!(frames.iter().all(|p| p.duration == 1), "时间基 1/25 即一帧");
}

#[test]
fn test_demux_时间戳回绕() {
    // 33 位时间戳, 起点离回绕点不到 60 秒: 回绕前的值修正为负数
    let wrap = 1i64 << 33;
    let mut src = MemorySource::new("wrap")
        .with_stream(MemoryStream::new(mp3_params()).with_pts_info(33, 1, 90000));
    src.push_packet(
        Packet::from_data(vec![0u8; 8]).with_timestamps(Some(wrap - 90000), Some(wrap - 90000)),
    );
    src.push_packet(Packet::from_data(vec![0u8; 8]).with_timestamps(Some(10), Some(10)));

    let mut ctx = DemuxContext::open(Box::new(src), None).unwrap();
    let frames = read_all(&mut ctx);
    let dts: Vec<Option<i64>> = frames.iter().map(|p| p.dts).collect();
    assert_eq!(dts, vec![Some(-90000), Some(10)]);
    assert_eq!(ctx.stream(0).unwrap().first_dts, Some(-90000));
}

#[test]
fn test_demux_丢弃整条流() {
    let mut src = MemorySource::new("discard")
        .with_stream(MemoryStream::new(mp3_params()).with_pts_info(64, 1, 1000))
        .with_stream(
            MemoryStream::new(CodecParameters::new(CodecId::Ac3)).with_pts_info(64, 1, 1000),
        );
    for i in 0..4i64 {
        src.push_packet(
            Packet::from_data(vec![0u8; 8])
                .with_stream((i % 2) as usize)
                .with_timestamps(Some(i * 24), Some(i * 24)),
        );
    }

    let mut ctx = DemuxContext::open(Box::new(src), None).unwrap();
    ctx.stream_mut(1).unwrap().discard = Discard::All;
    let frames = read_all(&mut ctx);
    assert_eq!(frames.len(), 2);
    assert!(frames.iter().all(|p| p.stream_index == 0));
}

#[test]
fn test_demux_强制编解码器与损坏包() {
    let mut src = MemorySource::new("forced")
        .with_stream(MemoryStream::new(mp3_params()).with_pts_info(64, 1, 1000));
    src.push_packet(
        Packet::from_data(vec![0u8; 8])
            .with_timestamps(Some(0), Some(0))
            .with_flags(PacketFlags::CORRUPT),
    );
    src.push_packet(Packet::from_data(vec![0u8; 8]).with_timestamps(Some(24), Some(24)));

    let opts: DemuxOptions =
        serde_json::from_str(r#"{"audio_codec": "mp2", "discard_corrupt": true}"#).unwrap();
    let mut ctx = DemuxBuilder::new()
        .options(opts)
        .open(Box::new(src), None)
        .unwrap();
    assert_eq!(ctx.stream(0).unwrap().codec_id(), CodecId::Mp2);
    assert_eq!(ctx.stream(0).unwrap().media_type(), MediaType::Audio);

    let frames = read_all(&mut ctx);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].pts, Some(24));
}

#[test]
fn test_demux_未知强制编解码器打开失败() {
    let opts = DemuxOptions {
        video_codec: Some("no-such-codec".into()),
        ..DemuxOptions::default()
    };
    let result = DemuxBuilder::new()
        .options(opts)
        .open(Box::new(MemorySource::new("empty")), None);
    assert!(matches!(result, Err(TaoError::InvalidArgument(_))));
}

#[test]
fn test_demux_cur_dts单调不减() {
    let mut src = MemorySource::new("monotonic")
        .with_stream(MemoryStream::new(mp3_params()).with_pts_info(64, 1, 1000));
    src.push_packet(Packet::from_data(vec![0u8; 8]));
    src.push_packet(Packet::from_data(vec![0u8; 8]));
    src.push_packet(Packet::from_data(vec![0u8; 8]).with_timestamps(Some(100), Some(100)));
    src.push_packet(Packet::from_data(vec![0u8; 8]));
    src.push_packet(Packet::from_data(vec![0u8; 8]).with_timestamps(Some(148), Some(148)));
    src.push_packet(Packet::from_data(vec![0u8; 8]));

    let mut ctx = DemuxContext::open(Box::new(src), None).unwrap();
    let mut cur = Vec::new();
    let mut dts = Vec::new();
    loop {
        match ctx.read_frame() {
            Ok(pkt) => {
                dts.push(pkt.dts);
                let st = ctx.stream(0).unwrap();
                if st.first_dts.is_some() {
                    cur.push(st.cur_dts);
                }
            }
            Err(TaoError::Eof) => break,
            Err(e) => panic!("读取失败: {e}"),
        }
    }

    assert_eq!(cur, vec![Some(124), Some(148), Some(172), Some(196)]);
    assert!(cur.windows(2).all(|w| w[0] <= w[1]), "cur_dts 不应回退: {cur:?}");
    assert_eq!(
        dts,
        vec![Some(0), Some(24), Some(100), Some(124), Some(148), Some(172)]
    );
}

#[test]
fn test_demux_eof冲刷解析器不丢不重() {
    let raw: Vec<u8> = (0u8..10).collect();
    let mut src = MemorySource::new("flush").with_stream(
        MemoryStream::new(CodecParameters::new(CodecId::Mpeg4))
            .with_pts_info(64, 1, 25)
            .with_parsing(ParseMode::Full),
    );
    src.push_packet(Packet::from_data(raw.clone()).with_timestamps(Some(0), Some(0)));

    let mut ctx = DemuxBuilder::new()
        .parsers(chunk4_registry())
        .open(Box::new(src), None)
        .unwrap();

    let frames = read_all(&mut ctx);
    let sizes: Vec<usize> = frames.iter().map(Packet::size).collect();
    assert_eq!(sizes, vec![4, 4, 2], "一个原始包应切成三段, 最后一段来自冲刷");
    let joined: Vec<u8> = frames.iter().flat_map(|p| p.data.iter().copied()).collect();
    assert_eq!(joined, raw, "冲刷后数据既不丢失也不重复");
    assert!(frames.iter().all(|p| p.stream_index == 0));
    assert!(!ctx.stream(0).unwrap().has_parser(), "EOF 后解析器已关闭");
    assert!(ctx.read_frame().unwrap_err().is_eof(), "再次读取仍为 EOF");
}

#[test]
fn test_demux_读取错误不冲刷解析器() {
    let f1 = adts_frame(10);
    let f2 = adts_frame(30);
    let f3 = adts_frame(20);
    let f4 = adts_frame(40);
    let mut a = Vec::new();
    a.extend_from_slice(&f1);
    a.extend_from_slice(&f2);
    a.extend_from_slice(&f3[..5]);
    let mut b = Vec::new();
    b.extend_from_slice(&f3[5..]);
    b.extend_from_slice(&f4);

    let mut inner = MemorySource::new("adts").with_stream(
        MemoryStream::new(CodecParameters::new(CodecId::Aac))
            .with_pts_info(64, 1, 44100)
            .with_parsing(ParseMode::Full),
    );
    inner.push_packet(Packet::from_data(a).with_timestamps(Some(0), Some(0)));
    inner.push_packet(Packet::from_data(b).with_timestamps(Some(3072), Some(3072)));
    let src = FailingSource {
        inner,
        reads: 0,
        fail_at: 2,
    };

    let mut ctx = DemuxContext::open(Box::new(src), None).unwrap();
    let mut frames = Vec::new();
    let mut io_errors = 0;
    loop {
        match ctx.read_frame() {
            Ok(pkt) => frames.push(pkt),
            Err(TaoError::Eof) => break,
            Err(TaoError::Io(_)) => {
                io_errors += 1;
                assert!(ctx.stream(0).unwrap().has_parser(), "I/O 错误后解析器应保留");
            }
            Err(e) => panic!("意外错误: {e}"),
        }
    }

    assert_eq!(io_errors, 1, "I/O 错误应原样返回给调用方");
    let sizes: Vec<usize> = frames.iter().map(Packet::size).collect();
    assert_eq!(sizes, vec![f1.len(), f2.len(), f3.len(), f4.len()]);
    assert_eq!(frames[2].data.as_ref(), f3.as_slice(), "错误前后的半帧应被完整拼接");
}
