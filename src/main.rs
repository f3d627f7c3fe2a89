//! CareCrew REPL
//!
//! 入口：初始化日志、加载配置、构建编排器，从 stdin 逐行读取客户消息。
//! 命令：/reset 清空会话，/history 查看历史，/quit 退出。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use carecrew::config::load_config;
use carecrew::core::{OrchestratorBuilder, Shutdown, ShutdownReason};
use carecrew::memory::SessionMemory;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const SESSION_ID: &str = "repl";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    carecrew::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        Default::default()
    });

    let shutdown = Arc::new(Shutdown::new());
    let memory = Arc::new(SessionMemory::from_config(&cfg.session));
    let sweep_interval = cfg.session.sweep_interval_secs;
    let orchestrator = Arc::new(
        OrchestratorBuilder::new(cfg)
            .with_memory(Arc::clone(&memory))
            .build(),
    );
    let sweeper = sweep_interval
        .map(|secs| orchestrator.spawn_sweeper(Duration::from_secs(secs.max(1)), shutdown.token()));

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    stdout
        .write_all(b"CareCrew customer care. Type /reset, /history or /quit.\n")
        .await?;

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                orchestrator.reset(SESSION_ID).await;
                stdout.write_all(b"Session cleared.\n").await?;
            }
            "/history" => {
                for msg in memory.history(SESSION_ID, None).await {
                    let who = msg.agent.as_deref().unwrap_or(match msg.role {
                        carecrew::memory::Role::User => "you",
                        carecrew::memory::Role::Agent => "agent",
                        carecrew::memory::Role::System => "system",
                    });
                    let mut line = format!("[{}] {}: {}", msg.timestamp.format("%H:%M:%S"), who, msg.text);
                    if !msg.tools.is_empty() {
                        line.push_str(&format!("  (tools: {})", msg.tools.join(", ")));
                    }
                    line.push('\n');
                    stdout.write_all(line.as_bytes()).await?;
                }
            }
            message => {
                let resp = orchestrator.handle(SESSION_ID, message).await;
                let trace = resp
                    .plan_trace
                    .iter()
                    .map(|t| format!("{}:{}", t.agent, t.status.label()))
                    .collect::<Vec<_>>()
                    .join(" -> ");
                let mut out = format!("\n{}\n\n  [{}] {}", resp.reply, resp.plan.plan_id, trace);
                if resp.degraded {
                    out.push_str(" (degraded)");
                }
                out.push_str(&format!(
                    " confidence {:.2}, {}ms\n\n",
                    resp.confidence, resp.elapsed_ms
                ));
                stdout.write_all(out.as_bytes()).await?;
            }
        }
    }

    shutdown.trigger(ShutdownReason::UserInitiated);
    if let Some(handle) = sweeper {
        shutdown.join(handle, Duration::from_secs(2)).await;
    }
    orchestrator.clear_all().await;
    Ok(())
}
