use clap::Parser;
use nodewatcher::config::{CliConfig, Command, NodeCommand};
use nodewatcher::core::monitor_pipeline::export_streams;
use nodewatcher::datastream::MemoryStreamBackend;
use nodewatcher::equipment::{install_device_antenna_fixtures, AntennaStore};
use nodewatcher::events::EventSinkPool;
use nodewatcher::generator::DeviceRegistry;
use nodewatcher::nodes::{JsonNodeRepository, NodeConfig, NodeRepository, NodeService, PermissionStore};
use nodewatcher::utils::error::ErrorSeverity;
use nodewatcher::utils::{logger, validation::Validate};
use nodewatcher::{LocalStorage, MonitorEngine, MonitorPipeline, NodewatcherConfig, Result};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    // 初始化日誌
    logger::init_cli_logger(cli.verbose, cli.log_json);
    tracing::debug!("CLI arguments: {:?}", cli);

    // 載入並驗證配置
    let config = match cli.load_config().and_then(|config| {
        config.validate()?;
        Ok(config)
    }) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Configuration validation failed: {}", e);
            tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(1);
        }
    };

    if let Err(e) = execute(cli.command, config).await {
        // 記錄詳細錯誤信息
        tracing::error!(
            "❌ Command failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        // 輸出用戶友好的錯誤信息
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 建議: {}", e.recovery_suggestion());

        // 根據錯誤嚴重程度決定退出碼
        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,      // 警告，但成功
            ErrorSeverity::Medium => 2,   // 可重試的錯誤
            ErrorSeverity::High => 1,     // 處理錯誤
            ErrorSeverity::Critical => 3, // 系統錯誤
        };

        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }
}

async fn node_service(
    config: &NodewatcherConfig,
    repository: Arc<dyn NodeRepository>,
    events: Arc<EventSinkPool>,
) -> Result<NodeService<LocalStorage>> {
    let storage = LocalStorage::new(config.data_dir());
    let permissions = PermissionStore::load(storage, config.superusers().to_vec()).await?;
    let registry = Arc::new(DeviceRegistry::with_builtin_devices()?);
    Ok(NodeService::new(repository, permissions, registry, events))
}

async fn execute(command: Command, config: NodewatcherConfig) -> Result<()> {
    let storage = LocalStorage::new(config.data_dir());
    let events = Arc::new(EventSinkPool::new(config.event_sinks.clone()));

    match command {
        Command::Devices { platform, json } => {
            let registry = DeviceRegistry::with_builtin_devices()?;
            let platforms: Vec<String> = match platform {
                Some(platform) => vec![platform],
                None => registry.platforms().map(str::to_string).collect(),
            };

            for platform in &platforms {
                for device in registry.platform_devices(platform) {
                    if json {
                        println!("{}", serde_json::to_string(device.as_ref())?);
                    } else {
                        println!(
                            "{:<10} {:<16} {} ({})",
                            platform, device.identifier, device.name, device.manufacturer
                        );
                    }
                }
            }
        }
        Command::SyncAntennas => {
            let registry = DeviceRegistry::with_builtin_devices()?;
            let mut store = AntennaStore::load(storage).await?;
            let report = install_device_antenna_fixtures(&registry, &mut store).await?;
            println!(
                "✅ Antennas synchronized: {} created, {} updated",
                report.created, report.updated
            );
        }
        Command::Node { action } => {
            let repository = Arc::new(JsonNodeRepository::load(storage).await?);
            let service = node_service(&config, repository, events).await?;

            match action {
                NodeCommand::List => {
                    for node in service.list_nodes().await? {
                        println!(
                            "{} {:<20} {:<8} {:<16} {}",
                            node.id,
                            node.name,
                            node.platform,
                            node.router.as_deref().unwrap_or("-"),
                            node.address.as_deref().unwrap_or("-")
                        );
                    }
                }
                NodeCommand::Create {
                    name,
                    platform,
                    router,
                    address,
                    user,
                } => {
                    let node_config = NodeConfig {
                        name,
                        platform,
                        router,
                        address,
                        ..Default::default()
                    };
                    let node = service.create_node(&user, node_config).await?;
                    println!("✅ Created node {} ({})", node.name, node.id);
                }
                NodeCommand::Reset { id, user } => {
                    let node = service.reset_node(&user, id).await?;
                    println!("🔄 Reset node {} ({})", node.name, node.id);
                }
                NodeCommand::Remove { id, user } => {
                    let node = service.remove_node(&user, id).await?;
                    println!("🗑️ Removed node {} ({})", node.name, node.id);
                }
            }
        }
        Command::Import { dump } => {
            let content = tokio::fs::read_to_string(&dump).await?;
            let repository = Arc::new(JsonNodeRepository::load(storage).await?);
            let service = node_service(&config, repository, events).await?;
            let count = service.import_nodes(&content).await?;
            println!("📥 Imported {} nodes from {}", count, dump.display());
        }
        Command::Monitor {
            once,
            export,
            stats,
        } => {
            if stats {
                tracing::info!("🔍 System monitoring enabled");
            }

            let repository = Arc::new(JsonNodeRepository::load(storage).await?);
            let backend = Arc::new(MemoryStreamBackend::new());
            let interval = Duration::from_secs(config.interval_seconds());
            let pipeline = MonitorPipeline::new(config, repository, backend.clone(), events)?;
            let engine = MonitorEngine::new_with_monitoring(pipeline, stats);

            if once {
                let report = engine.run().await?;
                println!("📊 {}", serde_json::to_string(&report)?);
            } else {
                let runs = engine.run_periodic(interval).await?;
                println!("📊 Completed {} monitoring runs", runs);
            }

            if let Some(dir) = export {
                let files = export_streams(&backend, &LocalStorage::new(&dir)).await?;
                println!("📁 Exported {} streams to {}", files, dir.display());
            }
        }
    }

    Ok(())
}
