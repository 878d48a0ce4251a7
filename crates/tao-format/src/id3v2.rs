//! ID3v2 标签头部识别.
//!
//! 裸音频流 (MP3/AAC 等) 开头常带 ID3v2 标签, 内容探测前需要先跳过.

/// ID3v2 头部长度
pub const ID3V2_HEADER_SIZE: usize = 10;

/// 默认魔数
pub const ID3V2_DEFAULT_MAGIC: &[u8; 3] = b"ID3";

/// 判断 `buf` 是否以指定魔数的 ID3v2 头部开始
///
/// 除魔数外还检查版本字节不为 0xFF, 以及 4 字节 syncsafe 长度的最高位均为 0.
pub fn id3v2_match(buf: &[u8], magic: &[u8; 3]) -> bool {
    buf.len() >= ID3V2_HEADER_SIZE
        && buf[..3] == magic[..]
        && buf[3] != 0xFF
        && buf[4] != 0xFF
        && buf[6..10].iter().all(|b| b & 0x80 == 0)
}

/// 计算 ID3v2 标签总长度 (含头部, 含可选的尾部)
///
/// 调用方需保证 `buf` 至少有 [`ID3V2_HEADER_SIZE`] 字节.
pub fn id3v2_tag_len(buf: &[u8]) -> usize {
    let size = buf[6..10]
        .iter()
        .fold(0usize, |acc, &b| (acc << 7) | usize::from(b & 0x7F));
    let mut len = size + ID3V2_HEADER_SIZE;
    // footer present
    if buf[5] & 0x10 != 0 {
        len += ID3V2_HEADER_SIZE;
    }
    len
}
