use clap::Parser;
use gie_etl::app::pipelines::{
    BoundaryPipeline, IntegratePipeline, LandcoverPipeline, TreatmentPipeline,
};
use gie_etl::config::{api_key_from_env, load_env_file, CliConfig, Command, ProjectConfig};
use gie_etl::core::{EtlEngine, PipelineReport, PipelineSequence};
use gie_etl::utils::error::GieError;
use gie_etl::utils::{logger, validation::Validate};
use gie_etl::LocalStorage;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliConfig::parse();
    let env_file = load_env_file(cli.env_file.as_deref());

    // 載入 TOML 配置
    let config = match ProjectConfig::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            init_logging(&cli, None)?;
            eprintln!("❌ Failed to load config file '{}'", cli.config.display());
            exit_with(&e);
        }
    };

    init_logging(&cli, log_file(&config, cli.command).as_ref())?;
    tracing::info!("🚀 gie-etl {} ({})", cli.command.name(), env!("CARGO_PKG_VERSION"));
    tracing::info!("📁 Configuration: {}", cli.config.display());
    if let Some(path) = env_file {
        tracing::debug!("Loaded environment from {}", path.display());
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        exit_with(&e);
    }

    let monitor_enabled = cli.monitor.unwrap_or_else(|| config.monitoring_enabled());
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    if let Err(e) = run_command(cli.command, &config, monitor_enabled).await {
        exit_with(&e);
    }
    Ok(())
}

fn init_logging(cli: &CliConfig, file: Option<&PathBuf>) -> std::io::Result<()> {
    if cli.json_logs {
        logger::init_json_logger();
        Ok(())
    } else {
        logger::init_cli_logger(cli.verbose, file.map(PathBuf::as_path))
    }
}

/// 每個步驟寫到自己的日誌檔
fn log_file(config: &ProjectConfig, command: Command) -> Option<PathBuf> {
    match command {
        Command::Boundary => Some(config.boundary_dir().join("boundary.log")),
        Command::Landcover => Some(config.landcover_dir().join("dataset.log")),
        Command::Treatment | Command::Integrate | Command::All => {
            Some(config.base_dir().join("pipeline.log"))
        }
        Command::Check => None,
    }
}

async fn run_command(
    command: Command,
    config: &ProjectConfig,
    monitor: bool,
) -> Result<(), GieError> {
    match command {
        Command::Boundary => {
            let storage = LocalStorage::new(config.boundary_dir());
            let pipeline = BoundaryPipeline::new(storage, config.boundary.clone())?;
            let report = EtlEngine::new_with_monitoring(pipeline, monitor).run().await?;
            print_report(&report);
        }
        Command::Landcover => {
            let pipeline = LandcoverPipeline::from_config(config)?;
            let report = EtlEngine::new_with_monitoring(pipeline, monitor).run().await?;
            print_report(&report);
        }
        Command::Treatment => {
            let pipeline = TreatmentPipeline::new(LocalStorage::new(config.base_dir()), config);
            let report = EtlEngine::new_with_monitoring(pipeline, monitor).run().await?;
            print_report(&report);
        }
        Command::Integrate => {
            let pipeline = IntegratePipeline::new(LocalStorage::new(config.base_dir()), config)?;
            let report = EtlEngine::new_with_monitoring(pipeline, monitor).run().await?;
            print_report(&report);
        }
        Command::All => {
            let execution_id = format!("gie-{}", chrono::Utc::now().format("%Y%m%d-%H%M%S"));
            let mut sequence = PipelineSequence::new(execution_id).with_monitoring(monitor);

            let boundary = BoundaryPipeline::new(
                LocalStorage::new(config.boundary_dir()),
                config.boundary.clone(),
            )?;
            sequence.add_stage(Box::new(EtlEngine::new(boundary)));
            sequence.add_stage(Box::new(EtlEngine::new(LandcoverPipeline::from_config(config)?)));
            sequence.add_stage(Box::new(EtlEngine::new(IntegratePipeline::new(
                LocalStorage::new(config.base_dir()),
                config,
            )?)));

            let results = sequence.execute_all().await?;
            println!("{}", PipelineSequence::summary(&results));
        }
        Command::Check => perform_dry_run(config),
    }
    Ok(())
}

fn print_report(report: &PipelineReport) {
    println!(
        "✅ {} completed: {} processed, {} skipped, {} failed",
        report.pipeline,
        report.processed,
        report.skipped,
        report.failed.len()
    );
    for output in &report.outputs {
        println!("📁 {}", output);
    }
    if !report.is_clean() {
        println!("⚠️ Failed: {}", report.failed.join(", "));
    }
}

fn perform_dry_run(config: &ProjectConfig) {
    println!("🔍 Dry Run Analysis:");
    println!();

    println!("📡 Boundaries:");
    println!("  Index: {}", config.boundary.index_url());
    let filter = config.boundary.iso3_filter();
    if filter.is_empty() {
        println!("  Countries: all");
    } else {
        println!("  Countries: {}", filter.join(", "));
    }
    println!("  Output: {}", config.boundary_dir().display());

    println!();
    println!("🛰️ Landcover:");
    println!("  Dataset: {} at {}", config.landcover.cds_dataset(), config.landcover.cds_url());
    println!(
        "  Years: {}",
        config
            .landcover
            .years
            .iter()
            .map(|y| y.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    match api_key_from_env(&config.landcover.api_key_env_var) {
        Ok(_) => println!("  Credential: {} is set", config.landcover.api_key_env_var),
        Err(e) => {
            tracing::warn!("⚠️ {}", e);
            println!("  Credential: {} is MISSING", config.landcover.api_key_env_var);
        }
    }

    println!();
    println!("🔗 Integrate:");
    let integrate = &config.integrate;
    for (label, path) in [
        ("Child", config.boundary_file(&integrate.iso3, &integrate.child_level)),
        ("Parent", config.boundary_file(&integrate.iso3, &integrate.parent_level)),
        ("Treatment", config.treatment_file()),
    ] {
        println!("  {}: {} ({})", label, path.display(), presence(&path));
    }
    for &year in &config.landcover.years {
        let path = config.landcover_output(year);
        println!("  Raster {}: {} ({})", year, path.display(), presence(&path));
    }
    println!("  Output: {}", config.integrate_output_dir().display());
}

fn presence(path: &std::path::Path) -> &'static str {
    if path.exists() {
        "found"
    } else {
        "missing"
    }
}

fn exit_with(e: &GieError) -> ! {
    tracing::error!(
        "❌ gie-etl failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());

    // 根據錯誤嚴重程度決定退出碼
    std::process::exit(e.severity().exit_code());
}
