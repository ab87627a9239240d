//! Local-process binding.

use super::bus::EventBus;
use super::command::{find_cli, CliPaths};
use super::process::{spawn_run, ProcessRegistry};
use super::{Binding, ChatTransport, LaunchRequest};
use crate::model::{RouteId, TransportError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Runs the source CLI as a child process per launch.
///
/// Every launch gets a fresh route. The route is subscribed on the bus
/// before the process is spawned, so no line can be missed.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    bus: Arc<EventBus>,
    registry: Arc<ProcessRegistry>,
    cli_paths: CliPaths,
}

impl LocalTransport {
    /// Transport with its own bus.
    pub fn new(cli_paths: CliPaths) -> Self {
        Self::with_bus(Arc::new(EventBus::new()), cli_paths)
    }

    /// Transport publishing on a shared `bus`.
    pub fn with_bus(bus: Arc<EventBus>, cli_paths: CliPaths) -> Self {
        Self {
            bus,
            registry: Arc::new(ProcessRegistry::new()),
            cli_paths,
        }
    }

    /// The bus events are published on.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Live processes started by this transport.
    pub fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.registry
    }

    fn launch(&self, request: LaunchRequest) -> Result<Binding, TransportError> {
        let program = find_cli(request.source, self.cli_paths.get(request.source))?;
        let route = RouteId::generate();
        let events = self.bus.subscribe(&route);

        if let Err(err) = spawn_run(
            &program,
            &request,
            route.clone(),
            Arc::clone(&self.bus),
            Arc::clone(&self.registry),
        ) {
            self.bus.unsubscribe(&route);
            return Err(err);
        }

        info!(
            route = %route,
            source = %request.source,
            resume = ?request.resume.as_ref().map(|id| id.as_str()),
            "Launched local run"
        );
        Ok(Binding::new(route, events))
    }
}

#[async_trait]
impl ChatTransport for LocalTransport {
    async fn send_start(&self, request: LaunchRequest) -> Result<Binding, TransportError> {
        self.launch(request)
    }

    async fn send_continue(&self, request: LaunchRequest) -> Result<Binding, TransportError> {
        self.launch(request)
    }

    async fn send_cancel(&self, route: &RouteId) -> Result<(), TransportError> {
        if !self.registry.cancel(route) {
            debug!(route = %route, "Cancel for route with no running process");
        }
        Ok(())
    }
}
