use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use specfusion::config;
use specfusion::search::init_tokenizer;
use specfusion::server::{self, AppState};
use specfusion::store::DocStore;

#[tokio::main]
async fn main() {
    println!(
        r#"
███████╗██████╗ ███████╗ ██████╗███████╗██╗   ██╗███████╗██╗ ██████╗ ███╗   ██╗
██╔════╝██╔══██╗██╔════╝██╔════╝██╔════╝██║   ██║██╔════╝██║██╔═══██╗████╗  ██║
███████╗██████╔╝█████╗  ██║     █████╗  ██║   ██║███████╗██║██║   ██║██╔██╗ ██║
╚════██║██╔═══╝ ██╔══╝  ██║     ██╔══╝  ██║   ██║╚════██║██║██║   ██║██║╚██╗██║
███████║██║     ███████╗╚██████╗██║     ╚██████╔╝███████║██║╚██████╔╝██║ ╚████║
╚══════╝╚═╝     ╚══════╝ ╚═════╝╚═╝      ╚═════╝ ╚══════╝╚═╝ ╚═════╝ ╚═╝  ╚═══╝

开放平台文档检索服务 (build {})
"#,
        env!("BUILD_TIME")
    );

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .compact()
        .init();

    println!("🚀 服务器启动中...");

    let cfg = config::config();

    // 数据目录与数据库
    if let Some(parent) = cfg.db_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            eprintln!("创建数据目录失败: {}", e);
            std::process::exit(1);
        }
    }
    let store = match DocStore::open(&cfg.db_path).await {
        Ok(store) => {
            println!("📊 数据库连接成功: {}", cfg.db_path.display());
            store
        }
        Err(e) => {
            eprintln!("数据库初始化失败: {}", e);
            std::process::exit(1);
        }
    };

    // 分词器在启动时加载词典，写入和查询共用同一实例
    init_tokenizer(Some(&cfg.userdict_path));
    println!("🈶 分词器就绪（词典: {}）", cfg.userdict_path.display());

    if cfg.admin_token == "dev-token" {
        tracing::warn!("⚠️ ADMIN_TOKEN 仍是默认值，生产环境请务必覆盖");
    }

    let state = Arc::new(AppState::new(store, cfg.admin_token.clone()));
    if let Err(e) = server::serve(state, &cfg.bind_address()).await {
        eprintln!("服务器退出: {}", e);
        std::process::exit(1);
    }
}
