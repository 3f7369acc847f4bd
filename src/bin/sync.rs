//! Sync CLI / 同步命令行工具
//!
//! ```text
//! specfusion-sync sync [source] [--all] [--incremental] [--limit N]
//!                      [--api-url URL] [--admin-token TOKEN]
//! specfusion-sync list-sources
//! specfusion-sync add-openapi <id> --name <name> --spec-url <url> [--sync]
//! ```

use clap::{Parser, Subcommand};
use console::style;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use specfusion::adapters::AdapterRegistry;
use specfusion::config;
use specfusion::store::DocStore;
use specfusion::sync::{AdminClient, SyncRunner};

#[derive(Parser)]
#[command(name = "specfusion-sync")]
#[command(about = "开放平台文档同步工具 / Doc sync tool for open platforms")]
#[command(version)]
struct Cli {
    /// Enable verbose logging / 输出调试日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync one source, or all with --all / 同步单个或全部来源
    Sync {
        /// Source id (e.g. wecom, feishu) / 来源标识
        source: Option<String>,
        /// Sync every registered source / 同步全部来源
        #[arg(long)]
        all: bool,
        /// Only entries changed in the last 7 days / 增量模式
        #[arg(long)]
        incremental: bool,
        /// Truncate the catalog (debug aid) / 目录截断
        #[arg(long)]
        limit: Option<usize>,
        /// Server base URL / 服务地址
        #[arg(long)]
        api_url: Option<String>,
        /// Bearer token for admin routes / 管理令牌
        #[arg(long)]
        admin_token: Option<String>,
    },
    /// List registered sources / 列出已注册来源
    ListSources,
    /// Register an OpenAPI source / 注册OpenAPI来源
    AddOpenapi {
        /// Source id / 来源标识
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        spec_url: String,
        /// Sync immediately after registering / 注册后立刻同步
        #[arg(long)]
        sync: bool,
    },
}

/// Re-register OpenAPI sources persisted in the store
/// / 恢复之前注册过的OpenAPI来源
async fn load_dynamic_sources(store: &DocStore, registry: &AdapterRegistry) -> anyhow::Result<()> {
    for source in store.get_sources().await? {
        let Some(config_text) = source.config else { continue };
        let Ok(config) = serde_json::from_str::<serde_json::Value>(&config_text) else {
            continue;
        };
        if config.get("type").and_then(|v| v.as_str()) == Some("openapi") {
            if let Some(spec_url) = config.get("spec_url").and_then(|v| v.as_str()) {
                registry
                    .register_openapi(&source.id, &source.name, spec_url)
                    .await;
            }
        }
    }
    Ok(())
}

async fn sync_sources(registry: &AdapterRegistry, runner: &SyncRunner, sources: Vec<String>) -> i32 {
    let mut exit_code = 0;
    for source_id in sources {
        let adapter = match registry.create(&source_id).await {
            Ok(a) => a,
            Err(e) => {
                println!("{} {}: {}", style("❌").red(), source_id, e);
                exit_code = 1;
                continue;
            }
        };
        match runner.run_source(adapter).await {
            Ok(counts) if counts.errors == 0 => {}
            Ok(_) => exit_code = 1,
            Err(_) => exit_code = 1,
        }
    }
    exit_code
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .init();

    let cfg = config::config();
    let store = match DocStore::open(&cfg.db_path).await {
        Ok(store) => store,
        Err(e) => {
            eprintln!("数据库打开失败: {}", e);
            std::process::exit(1);
        }
    };

    let registry = AdapterRegistry::new();
    specfusion::register_source_adapters(&registry).await;
    if let Err(e) = load_dynamic_sources(&store, &registry).await {
        tracing::warn!("动态来源恢复失败: {}", e);
    }

    let exit_code = match cli.command {
        Commands::Sync {
            source,
            all,
            incremental,
            limit,
            api_url,
            admin_token,
        } => {
            let api_url = api_url.unwrap_or_else(|| cfg.api_url.clone());
            let admin_token = admin_token.unwrap_or_else(|| cfg.admin_token.clone());
            let client = AdminClient::new(&api_url, &admin_token);
            let mut runner = SyncRunner::new(store.clone(), client);
            runner.incremental = incremental;
            runner.limit = limit;

            let targets = if all {
                registry.list_sources().await
            } else if let Some(source) = source {
                vec![source]
            } else {
                eprintln!("请指定来源，或使用 --all 同步全部");
                std::process::exit(1);
            };
            sync_sources(&registry, &runner, targets).await
        }
        Commands::ListSources => {
            let registered = registry.list_sources().await;
            println!("已注册来源（{}）:", registered.len());
            let synced = store.get_sources().await.unwrap_or_default();
            for id in registered {
                match synced.iter().find(|s| s.id == id) {
                    Some(s) => println!(
                        "  {} {} — {} 篇，最近同步 {}",
                        style("●").green(),
                        id,
                        s.doc_count,
                        s.last_synced
                            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                            .unwrap_or_else(|| "从未".into())
                    ),
                    None => println!("  {} {} — 未同步", style("○").dim(), id),
                }
            }
            0
        }
        Commands::AddOpenapi {
            id,
            name,
            spec_url,
            sync,
        } => {
            let mut code = 0;
            let result: anyhow::Result<()> = async {
                store.upsert_source(&id, &name, None).await?;
                let config_json = serde_json::json!({
                    "type": "openapi",
                    "spec_url": spec_url,
                })
                .to_string();
                store.set_source_config(&id, &config_json).await?;
                registry.register_openapi(&id, &name, &spec_url).await;
                println!("{} OpenAPI来源已注册: {} ({})", style("✅").green(), id, spec_url);
                Ok(())
            }
            .await;
            if let Err(e) = result {
                eprintln!("注册失败: {}", e);
                code = 1;
            } else if sync {
                let client = AdminClient::new(&cfg.api_url, &cfg.admin_token);
                let runner = SyncRunner::new(store.clone(), client);
                code = sync_sources(&registry, &runner, vec![id]).await;
            }
            code
        }
    };

    std::process::exit(exit_code);
}
