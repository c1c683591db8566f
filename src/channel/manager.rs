//! Manager for every deployed channel.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{RwLock, Semaphore};
use tracing::{info, warn};

use crate::channel::controller::{ChannelStateMachine, StateTransition};
use crate::channel::state::DeployedState;
use crate::config::{ChannelConfig, EngineConfig};
use crate::datatypes::DataTypeRegistry;
use crate::error::{ChannelError, Error, PipelineError};
use crate::message::{ContentMap, Message};
use crate::pipeline::processor::ChannelPipeline;
use crate::pipeline::types::ChannelComponents;

/// A deployed channel: its lifecycle, pipeline and worker permits.
pub struct DeployedChannel {
    state: Arc<ChannelStateMachine>,
    pipeline: ChannelPipeline,
    workers: Semaphore,
    max_workers: usize,
}

impl DeployedChannel {
    pub fn config(&self) -> &ChannelConfig {
        self.pipeline.config()
    }

    pub fn state(&self) -> &Arc<ChannelStateMachine> {
        &self.state
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Messages currently holding a worker permit.
    pub fn busy_workers(&self) -> usize {
        self.max_workers - self.workers.available_permits()
    }
}

/// One row of [`ChannelManager::list`].
#[derive(Debug, Clone, Serialize)]
pub struct ChannelSummary {
    pub id: String,
    pub name: String,
    pub state: DeployedState,
    pub in_flight: usize,
    pub max_workers: usize,
}

/// Owns every deployed channel and serializes requests against each.
///
/// Channels are independent: an operation on one never waits on another.
pub struct ChannelManager {
    config: EngineConfig,
    registry: Arc<DataTypeRegistry>,
    channels: RwLock<HashMap<String, Arc<DeployedChannel>>>,
}

impl ChannelManager {
    pub fn new(config: EngineConfig, registry: Arc<DataTypeRegistry>) -> Self {
        Self {
            config,
            registry,
            channels: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<DataTypeRegistry> {
        &self.registry
    }

    /// Look up a deployed channel.
    pub async fn channel(&self, id: &str) -> Result<Arc<DeployedChannel>, ChannelError> {
        self.channels
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ChannelError::NotFound(id.to_string()))
    }

    /// Deploy and start a channel.
    pub async fn deploy(&self, config: ChannelConfig, components: ChannelComponents) -> Result<(), Error> {
        let id = config.id.clone();
        let max_workers = config.max_workers.unwrap_or(self.config.max_workers);
        let state = Arc::new(ChannelStateMachine::with_history_limit(
            id.clone(),
            self.config.transition_history,
        ));
        let pipeline = ChannelPipeline::new(
            Arc::new(config),
            Arc::clone(&self.registry),
            components,
            Arc::clone(&state),
        )?;
        let channel = Arc::new(DeployedChannel {
            state: Arc::clone(&state),
            pipeline,
            workers: Semaphore::new(max_workers),
            max_workers,
        });

        {
            let mut channels = self.channels.write().await;
            if channels.contains_key(&id) {
                return Err(ChannelError::AlreadyDeployed(id).into());
            }
            channels.insert(id.clone(), channel);
        }

        if let Err(e) = state.deploy().await {
            self.channels.write().await.remove(&id);
            return Err(e.into());
        }
        info!(channel_id = %id, max_workers, "Channel deployed");
        Ok(())
    }

    /// Restart a stopped channel.
    pub async fn start(&self, id: &str) -> Result<(), ChannelError> {
        self.channel(id).await?.state.start().await
    }

    /// Stop admitting work and wait for in-flight messages.
    pub async fn pause(&self, id: &str) -> Result<(), ChannelError> {
        self.channel(id)
            .await?
            .state
            .pause(self.config.drain_timeout)
            .await
    }

    pub async fn resume(&self, id: &str) -> Result<(), ChannelError> {
        self.channel(id).await?.state.resume().await
    }

    /// Stop a channel, draining in-flight messages first.
    pub async fn stop(&self, id: &str) -> Result<(), ChannelError> {
        self.channel(id)
            .await?
            .state
            .stop(self.config.drain_timeout)
            .await
    }

    /// Undeploy a channel, stopping it first if it is still running.
    pub async fn undeploy(&self, id: &str) -> Result<(), ChannelError> {
        let channel = self.channel(id).await?;
        if matches!(
            channel.state.state(),
            DeployedState::Started | DeployedState::Paused | DeployedState::Stopping
        ) {
            channel.state.stop(self.config.drain_timeout).await?;
        }
        channel.state.undeploy().await?;
        self.channels.write().await.remove(id);
        info!(channel_id = %id, "Channel undeployed");
        Ok(())
    }

    /// Reconcile a channel with an external source of truth.
    pub async fn sync_state(&self, id: &str, resolved: DeployedState) -> Result<(), ChannelError> {
        let channel = self.channel(id).await?;
        channel.state.begin_sync().await?;
        channel.state.resolve_sync(resolved).await
    }

    /// Record that a channel's state could not be determined.
    pub async fn mark_unknown(&self, id: &str, reason: &str) -> Result<(), ChannelError> {
        self.channel(id).await?.state.mark_unknown(reason).await?;
        Ok(())
    }

    pub async fn state(&self, id: &str) -> Result<DeployedState, ChannelError> {
        Ok(self.channel(id).await?.state.state())
    }

    pub async fn history(&self, id: &str) -> Result<Vec<StateTransition>, ChannelError> {
        Ok(self.channel(id).await?.state.history())
    }

    /// Process one inbound message on a channel.
    ///
    /// Waits for a free worker when the channel is at its limit.
    pub async fn dispatch(&self, id: &str, raw: &str, source_map: ContentMap) -> Result<Message, PipelineError> {
        let channel = self.channel(id).await?;
        let not_running = || ChannelError::ChannelNotRunning {
            channel_id: id.to_string(),
            state: channel.state.state(),
        };
        if channel.state.state() != DeployedState::Started {
            return Err(not_running().into());
        }
        let _permit = channel.workers.acquire().await.map_err(|_| not_running())?;
        channel.pipeline.process(raw, source_map).await
    }

    /// All deployed channels, sorted by id.
    pub async fn list(&self) -> Vec<ChannelSummary> {
        let mut summaries: Vec<_> = self
            .channels
            .read()
            .await
            .values()
            .map(|c| ChannelSummary {
                id: c.config().id.clone(),
                name: c.config().display_name().to_string(),
                state: c.state.state(),
                in_flight: c.state.in_flight(),
                max_workers: c.max_workers,
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    /// Stop every running channel concurrently.
    ///
    /// Failures are logged; the ids of channels that did not stop are returned.
    pub async fn shutdown(&self) -> Vec<String> {
        let channels: Vec<_> = self.channels.read().await.values().cloned().collect();
        let results = join_all(channels.iter().map(|channel| async move {
            match channel.state.state() {
                DeployedState::Started | DeployedState::Paused | DeployedState::Stopping => {
                    channel.state.stop(self.config.drain_timeout).await
                }
                _ => Ok(()),
            }
        }))
        .await;

        let mut failed = Vec::new();
        for (channel, result) in channels.iter().zip(results) {
            if let Err(e) = result {
                warn!(channel_id = %channel.config().id, error = %e, "Channel did not stop cleanly");
                failed.push(channel.config().id.clone());
            }
        }
        info!(channels = channels.len(), failed = failed.len(), "Shutdown complete");
        failed
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::config::{DestinationConfig, SourceConfig};
    use crate::datatypes::DataTypeProperties;
    use crate::message::Status;
    use crate::pipeline::types::{DestinationComponents, DestinationDispatcher, DispatchOutcome, DispatchRequest};

    struct Echo;

    #[async_trait]
    impl DestinationDispatcher for Echo {
        async fn dispatch(&self, request: &DispatchRequest) -> DispatchOutcome {
            DispatchOutcome::sent(request.encoded.clone())
        }
    }

    /// Holds every message until released.
    struct Gate(tokio::sync::Semaphore);

    #[async_trait]
    impl DestinationDispatcher for Gate {
        async fn dispatch(&self, _: &DispatchRequest) -> DispatchOutcome {
            match self.0.acquire().await {
                Ok(_) => DispatchOutcome::sent("OK"),
                Err(_) => DispatchOutcome::failed("gate", "closed"),
            }
        }
    }

    fn config(id: &str) -> ChannelConfig {
        ChannelConfig {
            id: id.to_string(),
            name: String::new(),
            max_workers: Some(2),
            source: SourceConfig {
                name: "Source".into(),
                inbound_data_type: "DELIMITED".into(),
                outbound_data_type: "DELIMITED".into(),
                data_type_properties: DataTypeProperties::default(),
            },
            destinations: vec![DestinationConfig {
                name: "out".into(),
                enabled: true,
                inbound_data_type: "DELIMITED".into(),
                outbound_data_type: "RAW".into(),
                response_data_type: None,
                data_type_properties: DataTypeProperties::default(),
                properties: serde_json::Value::Null,
            }],
        }
    }

    fn components(dispatcher: Arc<dyn DestinationDispatcher>) -> ChannelComponents {
        ChannelComponents::new().with_destination("out", DestinationComponents::new(dispatcher))
    }

    fn manager() -> ChannelManager {
        let config = EngineConfig {
            drain_timeout: Duration::from_secs(2),
            ..EngineConfig::default()
        };
        ChannelManager::new(config, Arc::new(DataTypeRegistry::with_builtins()))
    }

    #[tokio::test]
    async fn deploy_and_dispatch() {
        let manager = manager();
        manager.deploy(config("a"), components(Arc::new(Echo))).await.unwrap();
        assert_eq!(manager.state("a").await.unwrap(), DeployedState::Started);

        let message = manager.dispatch("a", "X|Y", ContentMap::new()).await.unwrap();
        assert_eq!(message.destination("out").unwrap().status(), Status::Sent);

        let list = manager.list().await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "a");
        assert_eq!(list[0].max_workers, 2);
    }

    #[tokio::test]
    async fn duplicate_deploy_rejected() {
        let manager = manager();
        manager.deploy(config("a"), components(Arc::new(Echo))).await.unwrap();
        let err = manager.deploy(config("a"), components(Arc::new(Echo))).await.unwrap_err();
        assert!(matches!(err, Error::Channel(ChannelError::AlreadyDeployed(_))));
    }

    #[tokio::test]
    async fn invalid_config_not_deployed() {
        let manager = manager();
        let mut bad = config("bad");
        bad.source.inbound_data_type = "HL7V2".into();
        let err = manager.deploy(bad, components(Arc::new(Echo))).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(manager.list().await.is_empty());
    }

    #[tokio::test]
    async fn dispatch_requires_started() {
        let manager = manager();
        manager.deploy(config("a"), components(Arc::new(Echo))).await.unwrap();
        manager.pause("a").await.unwrap();
        let err = manager.dispatch("a", "X", ContentMap::new()).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Channel(ChannelError::ChannelNotRunning {
                state: DeployedState::Paused,
                ..
            })
        ));
        manager.resume("a").await.unwrap();
        manager.dispatch("a", "X", ContentMap::new()).await.unwrap();

        assert!(matches!(
            manager.dispatch("missing", "X", ContentMap::new()).await,
            Err(PipelineError::Channel(ChannelError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn worker_limit_bounds_concurrency() {
        let manager = Arc::new(manager());
        let gate = Arc::new(Gate(tokio::sync::Semaphore::new(0)));
        manager.deploy(config("a"), components(gate.clone())).await.unwrap();

        let tasks: Vec<_> = (0..4)
            .map(|i| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.dispatch("a", &format!("M|{i}"), ContentMap::new()).await })
            })
            .collect();

        let channel = manager.channel("a").await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while channel.busy_workers() < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(channel.busy_workers(), 2);
        assert_eq!(channel.state().in_flight(), 2);

        gate.0.add_permits(4);
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(channel.busy_workers(), 0);
    }

    #[tokio::test]
    async fn undeploy_running_channel_stops_first() {
        let manager = manager();
        manager.deploy(config("a"), components(Arc::new(Echo))).await.unwrap();
        let channel = manager.channel("a").await.unwrap();
        manager.undeploy("a").await.unwrap();

        let path: Vec<_> = channel.state().history().iter().map(|t| t.to).collect();
        assert_eq!(
            path,
            vec![
                DeployedState::Deploying,
                DeployedState::Starting,
                DeployedState::Started,
                DeployedState::Stopping,
                DeployedState::Stopped,
                DeployedState::Undeploying,
                DeployedState::Undeployed,
            ]
        );
        assert!(matches!(manager.state("a").await, Err(ChannelError::NotFound(_))));
    }

    #[tokio::test]
    async fn stop_start_and_sync() {
        let manager = manager();
        manager.deploy(config("a"), components(Arc::new(Echo))).await.unwrap();
        manager.stop("a").await.unwrap();
        assert_eq!(manager.state("a").await.unwrap(), DeployedState::Stopped);
        manager.start("a").await.unwrap();

        manager.mark_unknown("a", "lost contact").await.unwrap();
        assert_eq!(manager.state("a").await.unwrap(), DeployedState::Unknown);
        manager.sync_state("a", DeployedState::Stopped).await.unwrap();
        assert_eq!(manager.state("a").await.unwrap(), DeployedState::Stopped);

        let history = manager.history("a").await.unwrap();
        assert_eq!(history.last().unwrap().reason.as_deref(), Some("sync resolved"));
    }

    #[tokio::test]
    async fn channels_are_independent() {
        let manager = manager();
        manager.deploy(config("a"), components(Arc::new(Echo))).await.unwrap();
        manager.deploy(config("b"), components(Arc::new(Echo))).await.unwrap();
        manager.pause("a").await.unwrap();
        assert_eq!(manager.state("b").await.unwrap(), DeployedState::Started);
        manager.dispatch("b", "X", ContentMap::new()).await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_stops_everything() {
        let manager = manager();
        manager.deploy(config("a"), components(Arc::new(Echo))).await.unwrap();
        manager.deploy(config("b"), components(Arc::new(Echo))).await.unwrap();
        manager.pause("b").await.unwrap();

        assert!(manager.shutdown().await.is_empty());
        assert_eq!(manager.state("a").await.unwrap(), DeployedState::Stopped);
        assert_eq!(manager.state("b").await.unwrap(), DeployedState::Stopped);
    }
}
