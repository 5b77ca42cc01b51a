// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::VecDeque;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::collector::traits::CollectorError;

/// 分页输入迭代器
///
/// 为采集器逐个产生页面上下文的输入，例如每个需要分页拉取子资源的上游实体。
/// 序列可以是有限的，也可以在生产者关闭前无限延续。
#[async_trait]
pub trait PagedIterator: Send {
    /// 取下一个输入，`None` 表示已耗尽
    async fn next(&mut self) -> Result<Option<Value>, CollectorError>;
}

/// 基于内存列表的迭代器
#[derive(Debug, Default)]
pub struct VecIterator {
    items: VecDeque<Value>,
}

impl VecIterator {
    /// 由任意可序列化元素创建
    pub fn new<T, I>(items: I) -> Result<Self, CollectorError>
    where
        T: Serialize,
        I: IntoIterator<Item = T>,
    {
        let items = items
            .into_iter()
            .map(|item| serde_json::to_value(item))
            .collect::<Result<VecDeque<_>, _>>()?;
        Ok(Self { items })
    }

    /// 剩余元素数
    pub fn remaining(&self) -> usize {
        self.items.len()
    }
}

#[async_trait]
impl PagedIterator for VecIterator {
    async fn next(&mut self) -> Result<Option<Value>, CollectorError> {
        Ok(self.items.pop_front())
    }
}

/// 基于通道的迭代器
///
/// 输入在采集过程中由其他任务动态推送，所有发送端关闭后迭代结束
pub struct QueueIterator {
    rx: mpsc::Receiver<Value>,
}

impl QueueIterator {
    /// 创建带缓冲的通道，返回发送端与迭代器
    pub fn channel(buffer: usize) -> (mpsc::Sender<Value>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self { rx })
    }
}

#[async_trait]
impl PagedIterator for QueueIterator {
    async fn next(&mut self) -> Result<Option<Value>, CollectorError> {
        Ok(self.rx.recv().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_vec_iterator_yields_in_order() {
        let mut it = VecIterator::new(vec![json!({"Number": 1}), json!({"Number": 2})]).unwrap();
        assert_eq!(it.remaining(), 2);
        assert_eq!(it.next().await.unwrap(), Some(json!({"Number": 1})));
        assert_eq!(it.next().await.unwrap(), Some(json!({"Number": 2})));
        assert_eq!(it.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_queue_iterator_ends_when_senders_drop() {
        let (tx, mut it) = QueueIterator::channel(4);
        tokio::spawn(async move {
            for n in 0..3 {
                tx.send(json!({ "id": n })).await.unwrap();
            }
        });

        let mut seen = Vec::new();
        while let Some(v) = it.next().await.unwrap() {
            seen.push(v["id"].as_i64().unwrap());
        }
        assert_eq!(seen, vec![0, 1, 2]);
    }
}
