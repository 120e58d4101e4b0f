//! metrics-capacitor
//!
//! Reads metric lines from stdin, decodes them and writes the records as JSON
//! lines to the configured sink. Configuration comes from the TOML file named
//! by `METCAP_CONFIG` plus `METCAP_*` overrides.
//!
//! Stops at end of input (after flushing everything) or on Ctrl+C.

use metrics_capacitor::codec::MutatorRules;
use metrics_capacitor::config::{Config, SinkConfig, SinkKind};
use metrics_capacitor::observability::init_tracing;
use metrics_capacitor::pipeline::{block_on_detached, run_pipeline};
use metrics_capacitor::sink::{JsonLinesSink, Sink};
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    init_tracing(&config.logging);

    let rules = match &config.decoder.rules_file {
        Some(path) => {
            let rules = MutatorRules::from_file(path).map_err(|e| {
                error!("Failed to load mutator rules from {}: {}", path.display(), e);
                e
            })?;
            info!("Loaded {} mutator rules from {}", rules.len(), path.display());
            rules
        }
        None => {
            warn!("No rules file configured, every path uses the fallback name");
            MutatorRules::empty()
        }
    };

    let sink: Arc<dyn Sink> = match config.sink.kind {
        SinkKind::Stdout => Arc::new(configure(JsonLinesSink::stdout(), &config.sink)),
        SinkKind::File => {
            let path = config
                .sink
                .path
                .as_ref()
                .ok_or("sink.path is required for the file sink")?;
            Arc::new(configure(JsonLinesSink::create(path)?, &config.sink))
        }
    };

    block_on_detached(async move {
        let shutdown = CancellationToken::new();
        {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Received Ctrl+C, shutting down");
                    shutdown.cancel();
                }
            });
        }

        run_pipeline(&config, Arc::new(rules), sink, tokio::io::stdin(), shutdown).await
    })??;

    Ok(())
}

fn configure<W>(sink: JsonLinesSink<W>, config: &SinkConfig) -> JsonLinesSink<W>
where
    W: Write + Send + 'static,
{
    let sink = sink.with_index(config.index.clone(), config.doc_type.clone());
    match &config.template_path {
        Some(path) => sink.with_template_path(path.clone()),
        None => sink,
    }
}
