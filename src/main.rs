use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;

use conduit::channel::ChannelManager;
use conduit::config::{ChannelConfig, ChannelsFile, DestinationConfig, EngineConfig, SourceConfig};
use conduit::datatypes::{DataTypeProperties, DataTypeRegistry};
use conduit::external::{ChannelReport, MessageReport};
use conduit::message::ContentMap;
use conduit::pipeline::{
    ChannelComponents, DestinationComponents, DestinationDispatcher, DispatchOutcome,
    DispatchRequest,
};

/// Logs each delivery and acknowledges it.
struct LoggingDispatcher;

#[async_trait]
impl DestinationDispatcher for LoggingDispatcher {
    async fn dispatch(&self, request: &DispatchRequest) -> DispatchOutcome {
        tracing::info!(
            channel_id = %request.channel_id,
            destination = %request.destination,
            data_type = %request.data_type,
            payload = %request.encoded,
            "Delivered"
        );
        DispatchOutcome::sent("ACK")
    }
}

fn demo_channel() -> ChannelConfig {
    let destination = |name: &str, outbound: &str| DestinationConfig {
        name: name.to_string(),
        enabled: true,
        inbound_data_type: "DELIMITED".to_string(),
        outbound_data_type: outbound.to_string(),
        response_data_type: Some("RAW".to_string()),
        data_type_properties: DataTypeProperties::default(),
        properties: serde_json::json!({ "target": name }),
    };
    ChannelConfig {
        id: "demo".to_string(),
        name: "Demo channel".to_string(),
        max_workers: None,
        source: SourceConfig {
            name: "Source".to_string(),
            inbound_data_type: "DELIMITED".to_string(),
            outbound_data_type: "DELIMITED".to_string(),
            data_type_properties: DataTypeProperties::default(),
        },
        destinations: vec![destination("json-out", "JSON"), destination("raw-out", "RAW")],
    }
}

fn components_for(config: &ChannelConfig) -> ChannelComponents {
    let dispatcher: Arc<dyn DestinationDispatcher> = Arc::new(LoggingDispatcher);
    config
        .destinations
        .iter()
        .fold(ChannelComponents::new(), |components, destination| {
            components.with_destination(
                destination.name.clone(),
                DestinationComponents::new(Arc::clone(&dispatcher)),
            )
        })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = EngineConfig::from_env();
    let registry = Arc::new(DataTypeRegistry::with_builtins());

    eprintln!("Conduit v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Data types: {}", registry.list().join(", "));
    eprintln!("   Workers per channel: {}", config.max_workers);
    eprintln!("   Drain timeout: {}s", config.drain_timeout.as_secs());

    let channels = match &config.channels_file {
        Some(path) => {
            let file = ChannelsFile::from_file(path)
                .with_context(|| format!("reading channels from {}", path.display()))?;
            file.validate(&registry)?;
            eprintln!("   Channels: {} from {}", file.channels.len(), path.display());
            file.channels
        }
        None => {
            eprintln!("   Channels: built-in demo");
            vec![demo_channel()]
        }
    };

    let manager = ChannelManager::new(config, Arc::clone(&registry));
    for channel in channels {
        let components = components_for(&channel);
        manager.deploy(channel, components).await?;
    }

    let inputs: Vec<String> = std::env::args().skip(1).collect();
    let inputs = if inputs.is_empty() { vec!["A|B|C".to_string()] } else { inputs };

    for summary in manager.list().await {
        for raw in &inputs {
            let message = manager.dispatch(&summary.id, raw, ContentMap::new()).await?;
            println!("{}", MessageReport::from_message(&message).to_json()?);
        }
    }

    let failed = manager.shutdown().await;
    for summary in manager.list().await {
        let report = ChannelReport::from(&summary);
        eprintln!("   {} ({}): {}", report.name, report.id, report.state_label);
    }
    if !failed.is_empty() {
        anyhow::bail!("channels did not stop cleanly: {}", failed.join(", "));
    }

    Ok(())
}
