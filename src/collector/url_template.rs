// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::collector::traits::{CollectorError, PageContext};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\s*(Input|Pager)((?:\.[A-Za-z0-9_]+)*)\s*\}")
        .expect("placeholder pattern is valid")
});

/// 渲染 URL 模板
///
/// 支持 `{Input}`、`{Input.a.b}` 以及 `{Pager.page}`、`{Pager.size}`、`{Pager.skip}`。
/// 引用的字段必须存在且为标量。
pub fn render(template: &str, ctx: &PageContext) -> Result<String, CollectorError> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(template) {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
        out.push_str(&template[last..whole.start]);

        let root = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let path: Vec<&str> = caps
            .get(2)
            .map(|m| m.as_str())
            .unwrap_or_default()
            .split('.')
            .filter(|s| !s.is_empty())
            .collect();

        let value = match root {
            "Pager" => pager_field(ctx, &path)?,
            _ => input_field(ctx, &path)?,
        };
        out.push_str(&value);
        last = whole.end;
    }

    out.push_str(&template[last..]);
    Ok(out)
}

fn pager_field(ctx: &PageContext, path: &[&str]) -> Result<String, CollectorError> {
    match path {
        ["page"] | ["Page"] => Ok(ctx.pager.page.to_string()),
        ["size"] | ["Size"] => Ok(ctx.pager.size.to_string()),
        ["skip"] | ["Skip"] => Ok(ctx.pager.skip.to_string()),
        _ => Err(CollectorError::Template(format!(
            "unknown pager field: Pager.{}",
            path.join(".")
        ))),
    }
}

fn input_field(ctx: &PageContext, path: &[&str]) -> Result<String, CollectorError> {
    let mut current = ctx
        .input
        .as_ref()
        .ok_or_else(|| CollectorError::Template("template references Input but no input is set".to_string()))?;

    for key in path {
        current = current.get(*key).ok_or_else(|| {
            CollectorError::Template(format!("missing input field: Input.{}", path.join(".")))
        })?;
    }

    scalar_to_string(current).ok_or_else(|| {
        CollectorError::Template(format!(
            "input field Input.{} is not a scalar",
            path.join(".")
        ))
    })
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
