// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use bytes::Bytes;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::errors::{Classify, ErrorKind, RepositoryError};

/// 采集器错误类型
#[derive(Error, Debug)]
pub enum CollectorError {
    /// 请求失败
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// 非成功状态码，且未被 after_response 降级
    #[error("Unexpected status {status} from {url}: {body}")]
    HttpStatus {
        status: u16,
        url: String,
        body: String,
    },
    /// 响应解析失败
    #[error("Failed to parse response from {url}: {message}")]
    Parse { url: String, message: String },
    /// 采集参数错误
    #[error("Invalid collector arguments: {0}")]
    InvalidArgs(String),
    /// URL 无效
    #[error("Invalid url: {0}")]
    Url(#[from] url::ParseError),
    /// URL 模板渲染失败
    #[error("Template error: {0}")]
    Template(String),
    /// 原始数据表读写失败
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    /// 序列化失败
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// 抽取或转换单行数据失败
    #[error("Conversion failed: {0}")]
    Convert(String),
    /// 已取消
    #[error("Cancelled")]
    Cancelled,
    /// 后台任务异常退出
    #[error("Worker aborted: {0}")]
    Join(String),
}

impl Classify for CollectorError {
    fn kind(&self) -> ErrorKind {
        match self {
            CollectorError::HttpStatus { status: 404, .. } => ErrorKind::NotFound,
            CollectorError::HttpStatus { status: 400, .. }
            | CollectorError::InvalidArgs(_)
            | CollectorError::Url(_)
            | CollectorError::Template(_) => ErrorKind::BadInput,
            CollectorError::Repository(e) => e.kind(),
            CollectorError::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::Internal,
        }
    }
}

/// API 响应
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP状态码
    pub status: u16,
    /// 最终请求的 URL
    pub url: String,
    /// 响应头
    pub headers: HeaderMap,
    /// 响应体
    pub body: Bytes,
}

impl ApiResponse {
    /// 状态码是否为 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 将响应体反序列化为 JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, CollectorError> {
        serde_json::from_slice(&self.body).map_err(|e| CollectorError::Parse {
            url: self.url.clone(),
            message: e.to_string(),
        })
    }

    /// 响应体文本（有损转换）
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// 分页器
///
/// `page` 从 1 开始单调递增，`size` 固定，每个页面上下文重新开始
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pager {
    pub page: u32,
    pub size: u32,
    pub skip: u32,
}

impl Pager {
    /// 第一页
    pub fn first(size: u32) -> Self {
        Self {
            page: 1,
            size,
            skip: 0,
        }
    }

    /// 指定页码
    pub fn at(page: u32, size: u32) -> Self {
        Self {
            page,
            size,
            skip: page.saturating_sub(1) * size,
        }
    }

    /// 下一页
    pub fn next(&self) -> Self {
        Self::at(self.page + 1, self.size)
    }
}

/// 页面上下文
///
/// 由输入迭代器产生的一个元素加上当前分页器
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageContext {
    pub input: Option<serde_json::Value>,
    pub pager: Pager,
}
