use std::sync::Arc;

use anyhow::anyhow;
use clap::Parser;
use log::{error, info};
use prometheus::{BasicAuthentication, labels};
use tokio::net::TcpListener;
use tokio::task::spawn_blocking;
use tokio::time::{Duration, sleep};

use crate::cli::SubCommandExtend;
use crate::config::{ExtractorOptions, IndexOptions, SearchOptions};
use crate::service::SearchServiceBuilder;
use crate::{Opts, server};

#[derive(Parser, Debug, Clone)]
pub struct ServerCommand {
    #[command(flatten)]
    pub extractor: ExtractorOptions,
    #[command(flatten)]
    pub index: IndexOptions,
    #[command(flatten)]
    pub search: SearchOptions,
    /// 监听地址
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub addr: String,
    /// 写入和删除接口的鉴权 token，不填则不鉴权
    #[arg(long)]
    pub token: Option<String>,
    /// prometheus 主动推送地址
    #[arg(long, value_name = "URL")]
    pub prometheus_push: Option<String>,
    /// 自定义 instance 标签值
    #[arg(long, value_name = "NAME")]
    pub prometheus_instance: Option<String>,
    /// prometheus 认证信息，格式为 username:password
    #[arg(long, value_name = "AUTH")]
    pub prometheus_auth: Option<String>,
}

impl SubCommandExtend for ServerCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let service = SearchServiceBuilder::new(opts.conf_dir.clone())
            .extractor_options(self.extractor.clone())
            .index_options(self.index.clone())
            .search_options(self.search.clone())
            .open()
            .await?;

        if self.token.is_none() {
            info!("未设置 token，写入接口不鉴权");
        }

        // 创建应用状态
        let state = server::AppState::new(Arc::new(service), self.token.clone());

        // 创建应用
        let app = server::create_app(state);

        if let Some(url) = self.prometheus_push.clone() {
            let instance = self.prometheus_instance.clone().unwrap_or_else(|| self.addr.clone());
            let auth = match &self.prometheus_auth {
                Some(s) => {
                    let (username, password) =
                        s.split_once(':').ok_or_else(|| anyhow!("无效的认证信息: {s}"))?;
                    Some((username.to_string(), password.to_string()))
                }
                None => None,
            };
            tokio::spawn(push_metrics(url, instance, auth));
        }

        // 启动服务器
        info!("服务器启动：http://{}", &self.addr);
        let listener = TcpListener::bind(&self.addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("服务器正在关闭");
            })
            .await?;

        Ok(())
    }
}

/// 每 30 秒推送一次指标
async fn push_metrics(url: String, instance: String, auth: Option<(String, String)>) {
    loop {
        let metric_families = prometheus::gather();
        let url = url.clone();
        let instance = instance.clone();
        let auth = auth.clone();
        let r = spawn_blocking(move || {
            prometheus::push_metrics(
                "vsearch",
                labels! {
                    "instance".to_string() => instance,
                },
                &url,
                metric_families,
                auth.map(|(username, password)| BasicAuthentication { username, password }),
            )
        })
        .await;
        match r {
            Ok(Err(e)) => error!("推送指标失败: {e}"),
            Err(e) => error!("推送指标失败: {e}"),
            Ok(Ok(())) => {}
        }
        sleep(Duration::from_secs(30)).await;
    }
}
