// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 流水线任务
///
/// 一个插件在一个数据范围上的一次执行
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineTask {
    pub plugin: String,
    /// 为空时执行插件所有默认启用的子任务
    #[serde(default)]
    pub subtasks: Vec<String>,
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl PipelineTask {
    pub fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            ..Default::default()
        }
    }

    pub fn with_subtasks(mut self, subtasks: Vec<String>) -> Self {
        self.subtasks = subtasks;
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }
}

/// 流水线阶段，阶段内的任务并行执行
pub type PipelineStage = Vec<PipelineTask>;

/// 流水线计划
///
/// 按顺序执行的阶段列表，阶段之间是硬屏障。
/// JSON 形式为 `[[{"plugin": "...", "subtasks": [...], "options": {...}}]]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelinePlan(pub Vec<PipelineStage>);

impl PipelinePlan {
    pub fn new(stages: Vec<PipelineStage>) -> Self {
        Self(stages)
    }

    /// 单阶段计划
    pub fn single(tasks: PipelineStage) -> Self {
        Self(vec![tasks])
    }

    pub fn stages(&self) -> &[PipelineStage] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push_stage(&mut self, stage: PipelineStage) {
        self.0.push(stage);
    }

    /// 所有任务
    pub fn tasks(&self) -> impl Iterator<Item = &PipelineTask> {
        self.0.iter().flatten()
    }

    /// 任务总数
    pub fn task_count(&self) -> usize {
        self.0.iter().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plan_json_shape() {
        let plan = PipelinePlan::single(vec![PipelineTask::new("github")
            .with_subtasks(vec!["collectIssues".to_string()])
            .with_option("connectionId", json!(1))]);

        let value = serde_json::to_value(&plan).unwrap();
        assert_eq!(
            value,
            json!([[{
                "plugin": "github",
                "subtasks": ["collectIssues"],
                "options": {"connectionId": 1}
            }]])
        );

        let parsed: PipelinePlan =
            serde_json::from_value(json!([[{"plugin": "gitextractor"}], []])).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.task_count(), 1);
        assert!(parsed.stages()[0][0].subtasks.is_empty());
    }
}
