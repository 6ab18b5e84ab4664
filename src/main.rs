//! bidflow entrypoint. Each input path is one shard (`-` or no argument reads stdin);
//! Ctrl+C drains open batches and windows before exiting.

use bidflow::{config::PipelineConfig, logging::StructuredLogger, pipeline::Pipeline};
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::{error, info};

type Input = Box<dyn AsyncBufRead + Unpin + Send>;

async fn open_inputs(args: &[String]) -> std::io::Result<Vec<Input>> {
    if args.is_empty() {
        return Ok(vec![Box::new(BufReader::new(tokio::io::stdin()))]);
    }
    let mut inputs: Vec<Input> = Vec::with_capacity(args.len());
    for arg in args {
        if arg == "-" {
            inputs.push(Box::new(BufReader::new(tokio::io::stdin())));
        } else {
            let file = tokio::fs::File::open(arg).await?;
            inputs.push(Box::new(BufReader::new(file)));
        }
    }
    Ok(inputs)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config_path = std::env::var("BIDFLOW_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("bidflow.json"));
    let config = PipelineConfig::load(&config_path)?;

    StructuredLogger::init(config.log.json, &config.log.level);

    info!(
        config = %config_path.display(),
        reference = %config.reference_path.display(),
        window_secs = config.window.width_secs,
        "bidflow starting"
    );

    let pipeline = match Pipeline::bootstrap(config).await {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "startup failed");
            return Err(e.into());
        }
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    let inputs = open_inputs(&args).await?;

    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = stop_tx.send(true);
    }) {
        tracing::warn!(error = %e, "no Ctrl+C handler; shutdown only at end of input");
    }

    let stats = pipeline.run(inputs, stop_rx).await;
    info!(
        accepted = stats.accepted,
        windows_closed = stats.windows_closed,
        "bidflow stopped"
    );
    Ok(())
}
