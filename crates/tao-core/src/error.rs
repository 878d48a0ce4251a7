//! 统一错误类型定义.
//!
//! 所有 Tao crate 共用的错误类型, 支持跨模块传播.

use thiserror::Error;

/// Tao 框架统一错误类型
#[derive(Debug, Error)]
pub enum TaoError {
    /// 已到达流末尾
    ///
    /// 对调用方而言不是故障, 而是终止信号.
    #[error("已到达流末尾")]
    Eof,

    /// 非阻塞数据源暂时无数据, 调用方稍后重试
    #[error("资源暂不可用, 请稍后重试")]
    Again,

    /// 无效数据 (损坏的码流等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// 内存分配失败
    #[error("内存分配失败: {0}")]
    OutOfMemory(String),

    /// 未找到 (格式、编解码器等)
    #[error("未找到: {0}")]
    NotFound(String),

    /// I/O 错误, 原样透传
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 未找到指定的流
    #[error("未找到流: 索引 {0}")]
    StreamNotFound(usize),

    /// 不支持的操作
    #[error("不支持的操作: {0}")]
    Unsupported(String),
}

impl TaoError {
    /// 是否为流末尾信号
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Eof)
    }

    /// 是否为 "稍后重试" 信号
    pub fn is_again(&self) -> bool {
        matches!(self, Self::Again)
    }
}

/// Tao 框架统一 Result 类型
pub type TaoResult<T> = Result<T, TaoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_信号判断() {
        assert!(TaoError::Eof.is_eof());
        assert!(!TaoError::Eof.is_again());
        assert!(TaoError::Again.is_again());
        assert!(!TaoError::InvalidData("x".into()).is_eof());
    }

    #[test]
    fn test_error_io_透传() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "断开");
        let err: TaoError = io.into();
        assert!(matches!(err, TaoError::Io(_)));
        assert!(err.to_string().contains("断开"));
    }
}
