// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::plugin::PluginRegistry;
use crate::utils::errors::{Classify, ErrorKind};

/// 领域ID错误类型
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DomainIdError {
    /// 模型所在模块未登记到任何插件
    #[error("No plugin registered for model {0}")]
    UnregisteredModel(String),
    /// 未提供主键
    #[error("At least one key is required")]
    EmptyKeys,
    /// 主键不是标量
    #[error("Key #{index} is not a scalar: {value}")]
    NonScalarKey { index: usize, value: String },
}

impl Classify for DomainIdError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::BadInput
    }
}

/// 领域ID的一个主键分量
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdKey {
    Str(String),
    Int(i64),
    UInt(u64),
    Bool(bool),
}

impl IdKey {
    fn write_to(&self, out: &mut String) {
        match self {
            IdKey::Str(s) => {
                for c in s.chars() {
                    match c {
                        '%' => out.push_str("%25"),
                        ':' => out.push_str("%3A"),
                        c => out.push(c),
                    }
                }
            }
            IdKey::Int(n) => out.push_str(&n.to_string()),
            IdKey::UInt(n) => out.push_str(&n.to_string()),
            IdKey::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        }
    }
}

impl From<&str> for IdKey {
    fn from(v: &str) -> Self {
        IdKey::Str(v.to_string())
    }
}

impl From<String> for IdKey {
    fn from(v: String) -> Self {
        IdKey::Str(v)
    }
}

impl From<&String> for IdKey {
    fn from(v: &String) -> Self {
        IdKey::Str(v.clone())
    }
}

impl From<Uuid> for IdKey {
    fn from(v: Uuid) -> Self {
        IdKey::Str(v.to_string())
    }
}

impl From<bool> for IdKey {
    fn from(v: bool) -> Self {
        IdKey::Bool(v)
    }
}

macro_rules! id_key_from_int {
    ($variant:ident, $target:ty, $($t:ty),*) => {
        $(impl From<$t> for IdKey {
            fn from(v: $t) -> Self {
                IdKey::$variant(v as $target)
            }
        })*
    };
}

id_key_from_int!(Int, i64, i8, i16, i32, i64);
id_key_from_int!(UInt, u64, u8, u16, u32, u64, usize);

/// 领域ID生成器
///
/// 生成 `<plugin>:<TypeName>:<key1>[:<key2>...]` 形式的确定性ID，
/// 使不同插件无需协调即可引用同一个现实实体。
///
/// 字符串主键中的 `%` 与 `:` 会被转义，因此不同的主键元组总是得到不同的ID。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainIdGenerator {
    prefix: String,
}

impl DomainIdGenerator {
    /// 由模型实例创建生成器
    ///
    /// # 参数
    ///
    /// * `model` - 工具层模型实例，仅用于确定类型
    /// * `registry` - 插件注册表
    ///
    /// # 返回值
    ///
    /// * `Ok(DomainIdGenerator)` - 生成器
    /// * `Err(DomainIdError::UnregisteredModel)` - 模型所在模块未登记
    pub fn new<T: ?Sized>(_model: &T, registry: &PluginRegistry) -> Result<Self, DomainIdError> {
        Self::for_model::<T>(registry)
    }

    /// 由模型类型创建生成器
    pub fn for_model<T: ?Sized>(registry: &PluginRegistry) -> Result<Self, DomainIdError> {
        Self::from_type_path(std::any::type_name::<T>(), registry)
    }

    /// 由完整类型路径创建生成器，例如 `plugins::github::models::Issue`
    pub fn from_type_path(path: &str, registry: &PluginRegistry) -> Result<Self, DomainIdError> {
        // generic arguments are not part of the model identity
        let path = path.split('<').next().unwrap_or(path).trim_start_matches('&');
        let (module, type_name) = path.rsplit_once("::").unwrap_or(("", path));

        let plugin = registry
            .plugin_for_module(module)
            .ok_or_else(|| DomainIdError::UnregisteredModel(path.to_string()))?;

        Ok(Self {
            prefix: format!("{}:{}", plugin, type_name),
        })
    }

    /// `<plugin>:<TypeName>` 前缀
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// 生成领域ID
    pub fn generate(&self, keys: &[IdKey]) -> Result<String, DomainIdError> {
        if keys.is_empty() {
            return Err(DomainIdError::EmptyKeys);
        }
        let mut id = self.prefix.clone();
        for key in keys {
            id.push(':');
            key.write_to(&mut id);
        }
        Ok(id)
    }

    /// 由 JSON 标量生成领域ID
    pub fn generate_json(&self, keys: &[Value]) -> Result<String, DomainIdError> {
        let keys = keys
            .iter()
            .enumerate()
            .map(|(index, value)| match value {
                Value::String(s) => Ok(IdKey::Str(s.clone())),
                Value::Bool(b) => Ok(IdKey::Bool(*b)),
                Value::Number(n) => n
                    .as_i64()
                    .map(IdKey::Int)
                    .or_else(|| n.as_u64().map(IdKey::UInt))
                    .ok_or_else(|| DomainIdError::NonScalarKey {
                        index,
                        value: n.to_string(),
                    }),
                other => Err(DomainIdError::NonScalarKey {
                    index,
                    value: other.to_string(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.generate(&keys)
    }
}

#[cfg(test)]
#[path = "domain_id_test.rs"]
mod tests;
