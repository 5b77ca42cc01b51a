// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 原始数据表名前缀
pub const RAW_TABLE_PREFIX: &str = "_raw_";

/// 原始数据记录
///
/// 采集器写入 `_raw_<name>` 表的一行。同一 `params` 下允许重复，
/// 由非增量采集在写入前整体清除。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDataRecord {
    /// 自增主键
    pub id: i64,
    /// 采集参数的 JSON 字符串，用于区分不同的数据范围
    pub params: String,
    /// 单条记录的原始 JSON
    pub data: Vec<u8>,
    /// 产生该记录的请求地址
    pub url: String,
    /// 产生该记录的输入（页面上下文的 input）
    pub input: Option<Vec<u8>>,
    /// 写入时间
    pub created_at: DateTime<Utc>,
}

impl RawDataRecord {
    /// 将 data 解析为 JSON
    pub fn data_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.data)
    }

    /// 将 input 解析为 JSON，无输入时返回 `Value::Null`
    pub fn input_json(&self) -> Result<Value, serde_json::Error> {
        match &self.input {
            Some(bytes) => serde_json::from_slice(bytes),
            None => Ok(Value::Null),
        }
    }
}

/// 待写入的原始数据
#[derive(Debug, Clone, PartialEq)]
pub struct NewRawData {
    pub params: String,
    pub data: Vec<u8>,
    pub url: String,
    pub input: Option<Vec<u8>>,
}

/// 原始数据表定位参数
///
/// `table` 为不带前缀的表名，`params` 会被序列化后存入每一行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDataArgs {
    pub table: String,
    pub params: Value,
}

impl RawDataArgs {
    pub fn new(table: impl Into<String>, params: Value) -> Self {
        Self {
            table: table.into(),
            params,
        }
    }

    /// 带前缀的完整表名
    pub fn table_name(&self) -> String {
        if self.table.starts_with(RAW_TABLE_PREFIX) {
            self.table.clone()
        } else {
            format!("{}{}", RAW_TABLE_PREFIX, self.table)
        }
    }

    /// params 的规范 JSON 字符串
    ///
    /// serde_json 的 Map 默认按键排序，因此相同内容总是得到相同字符串
    pub fn params_string(&self) -> String {
        self.params.to_string()
    }
}

/// 原始数据来源
///
/// 转换后的实体记录自己是从哪一张原始表、哪一组参数、哪一行产生的
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDataOrigin {
    pub raw_data_table: String,
    pub raw_data_params: String,
    pub raw_data_id: i64,
    pub raw_data_remark: String,
}

/// 持有原始数据来源的实体
pub trait HasRawOrigin {
    fn raw_origin(&self) -> &RawDataOrigin;
    fn set_raw_origin(&mut self, origin: RawDataOrigin);
}
