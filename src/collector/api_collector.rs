// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use metrics::counter;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::collector::api_client::ApiClient;
use crate::collector::iterator::PagedIterator;
use crate::collector::tick_pool::TickPool;
use crate::collector::traits::{ApiResponse, CollectorError, PageContext, Pager};
use crate::collector::url_template;
use crate::config::settings::CollectorSettings;
use crate::domain::models::raw_data::{NewRawData, RawDataArgs};
use crate::domain::models::subtask::Progress;
use crate::domain::repositories::raw_data_repository::RawDataRepository;

/// 构造查询参数
pub type QueryBuilder =
    Arc<dyn Fn(&PageContext) -> Result<Vec<(String, String)>, CollectorError> + Send + Sync>;
/// 将响应解析为记录列表
pub type ResponseParser =
    Arc<dyn Fn(&ApiResponse) -> Result<Vec<Value>, CollectorError> + Send + Sync>;
/// 解析响应前的钩子
pub type AfterResponse =
    Arc<dyn Fn(&ApiResponse) -> Result<ResponseAction, CollectorError> + Send + Sync>;
/// 由第一页响应得出总页数
pub type TotalPagesResolver =
    Arc<dyn Fn(&ApiResponse, &PageContext) -> Result<u32, CollectorError> + Send + Sync>;

/// after_response 钩子的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseAction {
    /// 按正常流程处理
    Continue,
    /// 当作空页处理，例如资源已被删除的 404
    Ignore,
}

/// 采集参数
pub struct ApiCollectorArgs {
    pub raw: RawDataArgs,
    pub client: Arc<ApiClient>,
    /// 相对或绝对地址模板，支持 `{Input.x}` 与 `{Pager.page}` 等占位符
    pub url_template: String,
    pub query: Option<QueryBuilder>,
    /// 0 表示不分页，每个上下文只请求一次
    pub page_size: u32,
    pub concurrency: usize,
    pub incremental: bool,
    pub input: Option<Box<dyn PagedIterator>>,
    pub get_total_pages: Option<TotalPagesResolver>,
    pub response_parser: ResponseParser,
    pub after_response: Option<AfterResponse>,
    /// 连续多少个空页后结束一个上下文
    pub empty_page_probe: u32,
}

impl ApiCollectorArgs {
    pub fn new(
        raw: RawDataArgs,
        client: Arc<ApiClient>,
        url_template: impl Into<String>,
        response_parser: ResponseParser,
    ) -> Self {
        Self {
            raw,
            client,
            url_template: url_template.into(),
            query: None,
            page_size: 100,
            concurrency: 1,
            incremental: false,
            input: None,
            get_total_pages: None,
            response_parser,
            after_response: None,
            empty_page_probe: 1,
        }
    }

    /// 应用采集器配置中的默认分页大小、并发数与空页探测次数
    pub fn with_settings(mut self, settings: &CollectorSettings) -> Self {
        self.page_size = settings.page_size;
        self.concurrency = settings.concurrency;
        self.empty_page_probe = settings.empty_page_probe;
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    pub fn query<F>(mut self, f: F) -> Self
    where
        F: Fn(&PageContext) -> Result<Vec<(String, String)>, CollectorError> + Send + Sync + 'static,
    {
        self.query = Some(Arc::new(f));
        self
    }

    pub fn input(mut self, input: impl PagedIterator + 'static) -> Self {
        self.input = Some(Box::new(input));
        self
    }

    pub fn total_pages<F>(mut self, f: F) -> Self
    where
        F: Fn(&ApiResponse, &PageContext) -> Result<u32, CollectorError> + Send + Sync + 'static,
    {
        self.get_total_pages = Some(Arc::new(f));
        self
    }

    pub fn after_response<F>(mut self, f: F) -> Self
    where
        F: Fn(&ApiResponse) -> Result<ResponseAction, CollectorError> + Send + Sync + 'static,
    {
        self.after_response = Some(Arc::new(f));
        self
    }

    pub fn empty_page_probe(mut self, probe: u32) -> Self {
        self.empty_page_probe = probe;
        self
    }
}

/// 采集结果统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectSummary {
    /// 非增量采集前删除的旧行数
    pub deleted: u64,
    /// 处理的上下文数
    pub contexts: u64,
}

/// 上下文任务共享的只读状态
struct Shared {
    client: Arc<ApiClient>,
    repo: Arc<dyn RawDataRepository>,
    table: String,
    params: String,
    url_template: String,
    query: Option<QueryBuilder>,
    page_size: u32,
    concurrency: usize,
    /// 所有上下文及其页面共享的请求名额
    fetch_slots: Arc<Semaphore>,
    get_total_pages: Option<TotalPagesResolver>,
    response_parser: ResponseParser,
    after_response: Option<AfterResponse>,
    empty_page_probe: u32,
    progress: Arc<Progress>,
}

/// 通用 API 采集器
///
/// 把任意分页接口转换为写入 `_raw_<name>` 表的原始记录流。
/// 每个输入元素形成一个页面上下文，最多 `concurrency` 个上下文同时在途；
/// 无论来自哪个上下文，同时在途的页面请求也不超过 `concurrency` 个，
/// 所有请求经由客户端的限流器。
pub struct ApiCollector {
    args: ApiCollectorArgs,
    repo: Arc<dyn RawDataRepository>,
}

impl ApiCollector {
    /// 创建采集器
    ///
    /// # 参数
    ///
    /// * `args` - 采集参数
    /// * `repo` - 原始数据仓库
    ///
    /// # 返回值
    ///
    /// * `Ok(ApiCollector)` - 参数合法
    /// * `Err(CollectorError::InvalidArgs)` - 参数缺失或取值无效
    pub fn new(
        args: ApiCollectorArgs,
        repo: Arc<dyn RawDataRepository>,
    ) -> Result<Self, CollectorError> {
        if args.raw.table.trim().is_empty() {
            return Err(CollectorError::InvalidArgs("raw table is required".to_string()));
        }
        if args.url_template.trim().is_empty() {
            return Err(CollectorError::InvalidArgs("url template is required".to_string()));
        }
        if args.concurrency == 0 {
            return Err(CollectorError::InvalidArgs(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if args.empty_page_probe == 0 {
            return Err(CollectorError::InvalidArgs(
                "empty_page_probe must be at least 1".to_string(),
            ));
        }
        Ok(Self { args, repo })
    }

    /// 执行采集
    ///
    /// 输入耗尽且所有在途上下文完成后返回；任意上下文失败时其余上下文被取消，
    /// 返回第一个错误
    pub async fn execute(
        mut self,
        cancel: &CancellationToken,
        progress: Arc<Progress>,
    ) -> Result<CollectSummary, CollectorError> {
        let table = self.args.raw.table_name();
        let params = self.args.raw.params_string();

        self.repo.ensure_table(&table).await?;

        let mut summary = CollectSummary::default();
        if !self.args.incremental {
            summary.deleted = self.repo.delete_by_params(&table, &params).await?;
            debug!("Cleared {} rows from {} for {}", summary.deleted, table, params);
        }
        progress.set(0, -1);

        let mut input = self.args.input.take();
        let shared = Arc::new(Shared {
            client: self.args.client.clone(),
            repo: self.repo.clone(),
            table: table.clone(),
            params,
            url_template: self.args.url_template.clone(),
            query: self.args.query.clone(),
            page_size: self.args.page_size,
            concurrency: self.args.concurrency,
            fetch_slots: Arc::new(Semaphore::new(self.args.concurrency)),
            get_total_pages: self.args.get_total_pages.clone(),
            response_parser: self.args.response_parser.clone(),
            after_response: self.args.after_response.clone(),
            empty_page_probe: self.args.empty_page_probe,
            progress,
        });

        let mut pool = TickPool::new(self.args.concurrency, cancel);
        let token = pool.token();
        match input.as_mut() {
            Some(input) => loop {
                if pool.has_error() || token.is_cancelled() {
                    break;
                }
                // 生产者可能长时间不发送，等待输入时同样响应取消
                let next = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    next = input.next() => next?,
                };
                let Some(item) = next else {
                    break;
                };
                summary.contexts += 1;
                let job = collect_context(shared.clone(), Some(item), pool.token());
                if pool.next_tick(job).await.is_err() {
                    break;
                }
            },
            None => {
                summary.contexts = 1;
                let job = collect_context(shared.clone(), None, pool.token());
                // an immediate cancellation surfaces through wait_async
                let _ = pool.next_tick(job).await;
            }
        }

        pool.wait_async().await?;
        info!(
            "Collected {} context(s) into {}",
            summary.contexts, table
        );
        Ok(summary)
    }
}

/// 采集一个页面上下文的所有页面
async fn collect_context(
    shared: Arc<Shared>,
    input: Option<Value>,
    cancel: CancellationToken,
) -> Result<(), CollectorError> {
    if shared.page_size == 0 {
        let ctx = PageContext {
            input,
            pager: Pager::at(1, 0),
        };
        fetch_page(&shared, &ctx, &cancel).await?;
        return Ok(());
    }

    let first = PageContext {
        input,
        pager: Pager::first(shared.page_size),
    };

    if let Some(resolver) = shared.get_total_pages.clone() {
        let (count, response) = fetch_page(&shared, &first, &cancel).await?;
        if count == 0 {
            return Ok(());
        }
        let total = resolver(&response, &first)?;
        debug!("{} has {} page(s) for {}", shared.table, total, shared.params);
        shared.progress.add_total(i64::from(total.max(1)));
        if total < 2 {
            return Ok(());
        }

        let shared_ref = &shared;
        let first_ref = &first;
        let cancel_ref = &cancel;
        // 实际在途请求数由 fetch_slots 约束
        return stream::iter(2..=total)
            .map(Ok::<u32, CollectorError>)
            .try_for_each_concurrent(shared.concurrency, |page| async move {
                let ctx = PageContext {
                    input: first_ref.input.clone(),
                    pager: Pager::at(page, shared_ref.page_size),
                };
                fetch_page(shared_ref, &ctx, cancel_ref).await.map(|_| ())
            })
            .await;
    }

    let mut ctx = first;
    let mut empty_streak = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(CollectorError::Cancelled);
        }
        let (count, _) = fetch_page(&shared, &ctx, &cancel).await?;
        if count == 0 {
            empty_streak += 1;
            if empty_streak >= shared.empty_page_probe {
                return Ok(());
            }
        } else {
            empty_streak = 0;
        }
        ctx.pager = ctx.pager.next();
    }
}

/// 请求并保存一页，返回写入的记录数与响应
async fn fetch_page(
    shared: &Shared,
    ctx: &PageContext,
    cancel: &CancellationToken,
) -> Result<(usize, ApiResponse), CollectorError> {
    let path = url_template::render(&shared.url_template, ctx)?;
    let query = match &shared.query {
        Some(build) => build(ctx)?,
        None => Vec::new(),
    };

    let _slot = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(CollectorError::Cancelled),
        slot = shared.fetch_slots.acquire() => slot.map_err(|_| CollectorError::Cancelled)?,
    };

    let response = shared.client.get(&path, &query, cancel).await?;
    counter!("collector_pages_total", "table" => shared.table.clone()).increment(1);
    shared.progress.inc(1);

    if let Some(hook) = &shared.after_response {
        if hook(&response)? == ResponseAction::Ignore {
            debug!("Ignoring response {} from {}", response.status, response.url);
            return Ok((0, response));
        }
    }

    if !response.is_success() {
        let mut body = response.text();
        body.truncate(512);
        return Err(CollectorError::HttpStatus {
            status: response.status,
            url: response.url.clone(),
            body,
        });
    }

    let items = (shared.response_parser)(&response)?;
    if items.is_empty() {
        return Ok((0, response));
    }

    let input = ctx.input.as_ref().map(serde_json::to_vec).transpose()?;
    let rows = items
        .iter()
        .map(|item| {
            Ok(NewRawData {
                params: shared.params.clone(),
                data: serde_json::to_vec(item)?,
                url: response.url.clone(),
                input: input.clone(),
            })
        })
        .collect::<Result<Vec<_>, CollectorError>>()?;

    let count = rows.len();
    shared.repo.insert(&shared.table, rows).await?;
    counter!("collector_records_total", "table" => shared.table.clone()).increment(count as u64);
    Ok((count, response))
}

/// 常用响应解析器
pub mod parsers {
    use super::*;

    /// 响应体本身是 JSON 数组
    pub fn json_array() -> ResponseParser {
        Arc::new(|response: &ApiResponse| response.json::<Vec<Value>>())
    }

    /// 响应体是对象，记录数组位于指定字段；字段缺失或为 null 视为空页
    pub fn json_field(field: &'static str) -> ResponseParser {
        Arc::new(move |response: &ApiResponse| {
            let body: Value = response.json()?;
            match body.get(field) {
                None | Some(Value::Null) => Ok(Vec::new()),
                Some(Value::Array(items)) => Ok(items.clone()),
                Some(_) => Err(CollectorError::Parse {
                    url: response.url.clone(),
                    message: format!("field {} is not an array", field),
                }),
            }
        })
    }
}

#[cfg(test)]
#[path = "api_collector_test.rs"]
mod tests;
