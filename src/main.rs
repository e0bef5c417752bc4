use clap::Parser;
use fargate_stack::domain::model::Resource;
use fargate_stack::domain::ports::{Renderer, Storage};
use fargate_stack::utils::error::ErrorSeverity;
use fargate_stack::utils::{logger, validation::Validate};
use fargate_stack::{
    build, CliConfig, JsonRenderer, LocalStorage, ResourceGraph, StackConfig, StackError,
    Synthesizer, TemplateFormat, YamlRenderer,
};
use std::path::{Path, PathBuf};

fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.log_json {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("🚀 Starting stack-synth");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("📁 Loading configuration from: {}", path);
            match StackConfig::from_file(path) {
                Ok(config) => config,
                Err(e) => fail(&e),
            }
        }
        None => {
            tracing::info!("📁 No --config given, using the built-in stack definition");
            StackConfig::default()
        }
    };

    // 應用命令列覆蓋設定
    if let Some(region) = &cli.region {
        config.stack.region = region.clone();
        tracing::info!("🔧 Region overridden to: {}", region);
    }

    if let Err(e) = config.validate() {
        fail(&e);
    }

    let graph = match build(&config) {
        Ok(graph) => graph,
        Err(e) => fail(&e),
    };

    display_graph_summary(&graph);

    if cli.dry_run {
        tracing::info!("🔍 DRY RUN MODE - nothing will be written");
        print_outputs(&graph);
        return Ok(());
    }

    // 映像建置路徑相對於設定檔所在目錄
    let asset_base = cli
        .config
        .as_deref()
        .and_then(|p| Path::new(p).parent())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let storage = LocalStorage::new(&cli.out);
    let result = match cli.format {
        TemplateFormat::Json => synthesize(&graph, storage, JsonRenderer, asset_base, &cli),
        TemplateFormat::Yaml => synthesize(&graph, storage, YamlRenderer, asset_base, &cli),
    };

    if let Err(e) = result {
        fail(&e);
    }

    println!("✅ Synthesized stack '{}' into {}", graph.stack_name(), cli.out);
    print_outputs(&graph);
    Ok(())
}

fn synthesize<R: Renderer>(
    graph: &ResourceGraph,
    storage: LocalStorage,
    renderer: R,
    asset_base: PathBuf,
    cli: &CliConfig,
) -> Result<(), StackError> {
    let synth =
        Synthesizer::new(storage, renderer, asset_base).with_asset_fingerprints(!cli.skip_assets);
    let result = synth.run(graph)?;
    tracing::info!("📁 Template: {}", synth.storage().display_path(&result.template_file));
    tracing::info!("📁 Assets: {}", synth.storage().display_path(&result.asset_manifest_file));
    Ok(())
}

fn display_graph_summary(graph: &ResourceGraph) {
    tracing::info!("📋 Stack '{}' ({})", graph.stack_name(), graph.region());
    for resource in graph.resources() {
        let deps: Vec<&str> = graph
            .dependencies_of(resource.id())
            .into_iter()
            .map(|d| d.as_str())
            .collect();
        tracing::info!(
            "   {:<16} {:<24} <- [{}]",
            resource.kind().to_string(),
            resource.id().as_str(),
            deps.join(", ")
        );
    }

    for resource in graph.resources() {
        if let Resource::TaskDefinition(task) = resource {
            tracing::info!(
                "   task {}: {} cpu units, {}/{} MiB reserved by containers",
                task.id,
                task.cpu,
                task.total_container_memory(),
                task.memory_mib
            );
        }
    }
}

fn print_outputs(graph: &ResourceGraph) {
    for output in graph.outputs() {
        if let Some(value) = graph.preview_output(output.id.as_str()) {
            println!("🌐 {} = {}", output.id, value);
        }
    }
}

fn fail(e: &StackError) -> ! {
    tracing::error!(
        "❌ {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());

    let exit_code = match e.severity() {
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code);
}
