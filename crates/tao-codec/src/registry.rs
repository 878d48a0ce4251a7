//! 解析器注册表.
//!
//! 对标 FFmpeg 的 `av_parser_init` 查找机制, 按 CodecId 创建码流解析器.

use std::collections::HashMap;

use crate::codec_id::CodecId;
use crate::parser::{CodecParser, ParserContext};
use crate::parsers::{AdtsParser, Mpeg4VideoParser};

/// 解析器工厂函数类型
pub type ParserFactory = fn() -> Box<dyn CodecParser>;

/// 解析器注册条目
struct ParserEntry {
    /// 解析器名称
    name: String,
    /// 工厂函数
    factory: ParserFactory,
}

/// 解析器注册表
///
/// 同一编解码器可注册多个解析器, 后注册的优先.
pub struct ParserRegistry {
    parsers: HashMap<CodecId, Vec<ParserEntry>>,
}

impl ParserRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// 创建包含全部内置解析器的注册表
    pub fn with_builtin() -> Self {
        let mut reg = Self::new();
        reg.register(CodecId::Mpeg4, "mpeg4video", Mpeg4VideoParser::create);
        reg.register(CodecId::Aac, "aac", AdtsParser::create);
        reg
    }

    /// 注册一个解析器
    pub fn register(&mut self, codec_id: CodecId, name: impl Into<String>, factory: ParserFactory) {
        self.parsers
            .entry(codec_id)
            .or_default()
            .insert(0, ParserEntry {
                name: name.into(),
                factory,
            });
    }

    /// 为指定编解码器创建解析器上下文, 未注册时返回 `None`
    pub fn create(&self, codec_id: CodecId) -> Option<ParserContext> {
        let entry = self.parsers.get(&codec_id)?.first()?;
        Some(ParserContext::new((entry.factory)(), codec_id))
    }

    /// 获取所有已注册的解析器名称
    pub fn list(&self) -> Vec<(CodecId, &str)> {
        let mut result = Vec::new();
        for (id, entries) in &self.parsers {
            for entry in entries {
                result.push((*id, entry.name.as_str()));
            }
        }
        result
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}
