//! 数据包队列.
//!
//! 对标 FFmpeg 的 `AVPacketList` 链表 (`packet_buffer` / `parse_queue` /
//! `raw_packet_buffer`), 以 [`VecDeque`] 实现先进先出队列.

use std::collections::VecDeque;

use tao_codec::Packet;
use tao_core::{TaoError, TaoResult};

/// 先进先出的数据包队列
#[derive(Debug, Default, Clone)]
pub struct PacketList {
    packets: VecDeque<Packet>,
}

impl PacketList {
    /// 创建空队列
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加到队尾
    ///
    /// 扩容失败时返回 [`TaoError::OutOfMemory`], 队列保持不变.
    pub fn push(&mut self, pkt: Packet) -> TaoResult<()> {
        self.packets
            .try_reserve(1)
            .map_err(|e| TaoError::OutOfMemory(format!("数据包队列扩容失败: {e}")))?;
        self.packets.push_back(pkt);
        Ok(())
    }

    /// 取出队首
    pub fn pop(&mut self) -> Option<Packet> {
        self.packets.pop_front()
    }

    /// 查看队首
    pub fn peek(&self) -> Option<&Packet> {
        self.packets.front()
    }

    /// 可变地查看队首
    pub fn peek_mut(&mut self) -> Option<&mut Packet> {
        self.packets.front_mut()
    }

    /// 队列长度
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// 清空队列
    pub fn clear(&mut self) {
        self.packets.clear();
    }

    /// 按入队顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = &Packet> {
        self.packets.iter()
    }

    /// 按入队顺序可变遍历
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Packet> {
        self.packets.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_list_先进先出() {
        let mut list = PacketList::new();
        for i in 0..3 {
            list.push(Packet::from_data(vec![i as u8]).with_stream(i))
                .unwrap();
        }
        assert_eq!(list.len(), 3);
        assert_eq!(list.peek().map(|p| p.stream_index), Some(0));
        let order: Vec<usize> = std::iter::from_fn(|| list.pop())
            .map(|p| p.stream_index)
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert!(list.pop().is_none());
    }

    #[test]
    fn test_packet_list_清空与遍历修改() {
        let mut list = PacketList::new();
        list.push(Packet::empty()).unwrap();
        list.push(Packet::empty()).unwrap();
        for pkt in list.iter_mut() {
            pkt.dts = Some(7);
        }
        assert!(list.iter().all(|p| p.dts == Some(7)));
        list.clear();
        assert!(list.is_empty());
    }
}
