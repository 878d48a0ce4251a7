//! 流的 seek 索引.
//!
//! 对标 FFmpeg 的 `AVIndexEntry` / `ff_add_index_entry` /
//! `ff_index_search_timestamp` / `ff_reduce_index`.
//!
//! 每条流维护一张按时间戳升序排列的索引表, 条目记录
//! (字节位置, 时间戳, 大小, 最小关键帧距离, 标志).
//! 相对时间戳在入表前减去 [`RELATIVE_TS_BASE`], 使表内数值保持较小.

use bitflags::bitflags;
use log::debug;
use tao_core::{RELATIVE_TS_BASE, TaoError, TaoResult, is_relative};

/// 单个条目允许的最大字节数
const MAX_ENTRY_SIZE: i32 = 0x3FFF_FFFF;

bitflags! {
    /// 索引条目标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct IndexFlags: u32 {
        /// 关键帧, 可作为 seek 落点
        const KEYFRAME = 0x0001;
        /// 该帧解码后应丢弃 (预滚), 二分查找时跳过
        const DISCARD = 0x0002;
    }
}

bitflags! {
    /// Seek 标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SeekFlags: u32 {
        /// 向后 seek (寻找目标之前最近的条目)
        const BACKWARD = 0x0001;
        /// 基于字节位置 seek (而非时间戳)
        const BYTE = 0x0002;
        /// 允许落在非关键帧上
        const ANY = 0x0004;
    }
}

/// 索引条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// 在容器中的字节位置
    pub pos: i64,
    /// 时间戳 (流时间基)
    pub timestamp: i64,
    /// 数据包大小
    pub size: i32,
    /// 与上一个关键帧的最小距离, 用于避免 seek 后空读
    pub min_distance: i32,
    /// 标志
    pub flags: IndexFlags,
}

impl IndexEntry {
    /// 是否关键帧
    pub fn is_keyframe(&self) -> bool {
        self.flags.contains(IndexFlags::KEYFRAME)
    }
}

/// 在已排序的条目中查找目标时间戳
///
/// `BACKWARD` 时返回时间戳 <= `wanted` 的最后一个条目, 否则返回
/// 时间戳 >= `wanted` 的第一个条目. 未设置 `ANY` 时继续沿同一方向
/// 跳过非关键帧. 找不到时返回 `None`.
pub fn search_timestamp(entries: &[IndexEntry], wanted: i64, flags: SeekFlags) -> Option<usize> {
    let nb = entries.len() as isize;
    let mut a: isize = -1;
    let mut b: isize = nb;

    // 追加场景的快速路径
    if b > 0 && entries[(b - 1) as usize].timestamp < wanted {
        a = b - 1;
    }

    while b - a > 1 {
        let mut m = (a + b) >> 1;
        // 跳过被标记丢弃的条目
        while entries[m as usize].flags.contains(IndexFlags::DISCARD) && m < b && m < nb - 1 {
            m += 1;
            if m == b && entries[m as usize].timestamp >= wanted {
                m = b - 1;
                break;
            }
        }
        let ts = entries[m as usize].timestamp;
        if ts >= wanted {
            b = m;
        }
        if ts <= wanted {
            a = m;
        }
    }

    let backward = flags.contains(SeekFlags::BACKWARD);
    let mut m = if backward { a } else { b };
    if !flags.contains(SeekFlags::ANY) {
        while m >= 0
            && m < nb
            && (!entries[m as usize].is_keyframe()
                || entries[m as usize].flags.contains(IndexFlags::DISCARD))
        {
            m += if backward { -1 } else { 1 };
        }
    }

    if m < 0 || m >= nb {
        None
    } else {
        Some(m as usize)
    }
}

/// 单条流的 seek 索引
#[derive(Debug, Clone, Default)]
pub struct SeekIndex {
    entries: Vec<IndexEntry>,
}

impl SeekIndex {
    /// 创建空索引
    pub fn new() -> Self {
        Self::default()
    }

    /// 全部条目 (按时间戳升序)
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// 条目数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 最后一个条目
    pub fn last(&self) -> Option<&IndexEntry> {
        self.entries.last()
    }

    /// 清空索引
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// 添加条目, 返回其在表中的位置
    ///
    /// - 未知时间戳与越界大小返回 [`TaoError::InvalidArgument`]
    /// - 相对时间戳先换算为表内形式
    /// - 已有相同时间戳时: 位置相同只刷新大小/标志且最小距离只降不升,
    ///   位置不同则整条替换
    pub fn add_entry(
        &mut self,
        pos: i64,
        timestamp: Option<i64>,
        size: i32,
        distance: i32,
        flags: IndexFlags,
    ) -> TaoResult<usize> {
        let Some(mut timestamp) = timestamp else {
            return Err(TaoError::InvalidArgument("索引条目缺少时间戳".into()));
        };
        if !(0..=MAX_ENTRY_SIZE).contains(&size) {
            return Err(TaoError::InvalidArgument(format!(
                "索引条目大小越界: {size}"
            )));
        }
        if is_relative(timestamp) {
            timestamp -= RELATIVE_TS_BASE;
        }
        self.entries
            .try_reserve(1)
            .map_err(|e| TaoError::OutOfMemory(format!("索引扩容失败: {e}")))?;

        let mut entry = IndexEntry {
            pos,
            timestamp,
            size,
            min_distance: distance,
            flags,
        };

        match search_timestamp(&self.entries, timestamp, SeekFlags::ANY) {
            None => {
                self.entries.push(entry);
                Ok(self.entries.len() - 1)
            }
            Some(i) if self.entries[i].timestamp != timestamp => {
                if self.entries[i].timestamp < timestamp {
                    return Err(TaoError::InvalidData("索引顺序被破坏".into()));
                }
                self.entries.insert(i, entry);
                Ok(i)
            }
            Some(i) => {
                let old = &self.entries[i];
                if old.pos == pos {
                    entry.min_distance = old.min_distance.min(distance);
                }
                self.entries[i] = entry;
                Ok(i)
            }
        }
    }

    /// 查找目标时间戳, 语义同 [`search_timestamp`]
    pub fn search(&self, wanted: i64, flags: SeekFlags) -> Option<usize> {
        search_timestamp(&self.entries, wanted, flags)
    }

    /// 索引超出内存预算 (`max_index_size` 字节) 时隔一取一, 条目减半
    ///
    /// 返回是否发生了缩减.
    pub fn reduce(&mut self, max_index_size: usize) -> bool {
        let max_entries = max_index_size / std::mem::size_of::<IndexEntry>();
        if self.entries.len() < max_entries {
            return false;
        }
        let before = self.entries.len();
        let mut i = 0;
        self.entries.retain(|_| {
            let keep = i % 2 == 0;
            i += 1;
            keep
        });
        debug!("索引条目 {before} 条超出预算, 缩减至 {}", self.entries.len());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_index(timestamps: &[i64]) -> SeekIndex {
        let mut idx = SeekIndex::new();
        for (i, &ts) in timestamps.iter().enumerate() {
            idx.add_entry(i as i64 * 100, Some(ts), 10, 0, IndexFlags::KEYFRAME)
                .unwrap();
        }
        idx
    }

    #[test]
    fn test_index_乱序插入保持升序() {
        let idx = key_index(&[30, 10, 50, 20, 40]);
        let ts: Vec<i64> = idx.entries().iter().map(|e| e.timestamp).collect();
        assert_eq!(ts, vec![10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_index_拒绝无效条目() {
        let mut idx = SeekIndex::new();
        assert!(idx.add_entry(0, None, 1, 0, IndexFlags::KEYFRAME).is_err());
        assert!(idx.add_entry(0, Some(1), -1, 0, IndexFlags::KEYFRAME).is_err());
        assert!(idx.add_entry(0, Some(1), 0x4000_0000, 0, IndexFlags::KEYFRAME).is_err());
        assert!(idx.is_empty());
    }

    #[test]
    fn test_index_相对时间戳换算() {
        let mut idx = SeekIndex::new();
        idx.add_entry(0, Some(RELATIVE_TS_BASE + 42), 1, 0, IndexFlags::KEYFRAME)
            .unwrap();
        assert_eq!(idx.entries()[0].timestamp, 42);
    }

    #[test]
    fn test_index_相同时间戳替换规则() {
        let mut idx = SeekIndex::new();
        idx.add_entry(100, Some(10), 5, 8, IndexFlags::KEYFRAME).unwrap();
        // 位置相同: 最小距离只降不升
        idx.add_entry(100, Some(10), 6, 12, IndexFlags::KEYFRAME).unwrap();
        assert_eq!(idx.entries()[0].min_distance, 8);
        assert_eq!(idx.entries()[0].size, 6);
        idx.add_entry(100, Some(10), 6, 3, IndexFlags::KEYFRAME).unwrap();
        assert_eq!(idx.entries()[0].min_distance, 3);
        // 位置不同: 整条替换
        idx.add_entry(200, Some(10), 7, 9, IndexFlags::KEYFRAME).unwrap();
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.entries()[0].pos, 200);
        assert_eq!(idx.entries()[0].min_distance, 9);
    }

    #[test]
    fn test_search_前后方向() {
        let idx = key_index(&[0, 10, 20, 30]);
        assert_eq!(idx.search(15, SeekFlags::BACKWARD), Some(1));
        assert_eq!(idx.search(15, SeekFlags::empty()), Some(2));
        assert_eq!(idx.search(20, SeekFlags::BACKWARD), Some(2));
        assert_eq!(idx.search(20, SeekFlags::empty()), Some(2));
        assert_eq!(idx.search(-5, SeekFlags::BACKWARD), None);
        assert_eq!(idx.search(35, SeekFlags::empty()), None);
        assert_eq!(idx.search(35, SeekFlags::BACKWARD), Some(3));
    }

    #[test]
    fn test_search_跳过非关键帧() {
        let mut idx = SeekIndex::new();
        for (i, ts) in [0i64, 10, 20, 30, 40].into_iter().enumerate() {
            let flags = if i % 2 == 0 {
                IndexFlags::KEYFRAME
            } else {
                IndexFlags::empty()
            };
            idx.add_entry(i as i64, Some(ts), 1, 0, flags).unwrap();
        }
        assert_eq!(idx.search(30, SeekFlags::BACKWARD), Some(2));
        assert_eq!(idx.search(30, SeekFlags::empty()), Some(4));
        assert_eq!(idx.search(30, SeekFlags::BACKWARD | SeekFlags::ANY), Some(3));
    }

    #[test]
    fn test_search_跳过丢弃条目() {
        let mut idx = SeekIndex::new();
        idx.add_entry(0, Some(0), 1, 0, IndexFlags::KEYFRAME).unwrap();
        idx.add_entry(1, Some(10), 1, 0, IndexFlags::KEYFRAME | IndexFlags::DISCARD)
            .unwrap();
        idx.add_entry(2, Some(20), 1, 0, IndexFlags::KEYFRAME).unwrap();
        assert_eq!(idx.search(12, SeekFlags::empty()), Some(2));
        assert_eq!(idx.search(25, SeekFlags::BACKWARD), Some(2));
    }

    #[test]
    fn test_search_向后跳过丢弃关键帧() {
        let mut idx = SeekIndex::new();
        idx.add_entry(0, Some(0), 1, 0, IndexFlags::KEYFRAME).unwrap();
        idx.add_entry(1, Some(10), 1, 0, IndexFlags::KEYFRAME | IndexFlags::DISCARD)
            .unwrap();
        idx.add_entry(2, Some(20), 1, 0, IndexFlags::KEYFRAME).unwrap();
        assert_eq!(
            idx.search(12, SeekFlags::BACKWARD),
            Some(0),
            "丢弃的关键帧不能作为落点"
        );
        assert_eq!(idx.search(10, SeekFlags::BACKWARD), Some(0));
        assert_eq!(idx.search(10, SeekFlags::empty()), Some(2));
    }

    #[test]
    fn test_index_超出预算减半() {
        let ts: Vec<i64> = (0..10).map(|i| i * 10).collect();
        let mut idx = key_index(&ts);
        let budget = 10 * std::mem::size_of::<IndexEntry>();
        assert!(idx.reduce(budget));
        let kept: Vec<i64> = idx.entries().iter().map(|e| e.timestamp).collect();
        assert_eq!(kept, vec![0, 20, 40, 60, 80]);
        assert!(!idx.reduce(budget));
    }
}
