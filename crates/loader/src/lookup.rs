use std::sync::Arc;

use ertdata_api::{HttpTransport, ReqwestTransport, TransportError};
use serde_json::{Map, Value};
use tracing::error;

use crate::{ClientRegistry, ConnectionError, ConnectionProvider, ConnectionRegistry, DataLoader, LoaderConfig};

/// Entry point for project-scoped lookups.
///
/// Resolves a project to its storage connection and returns the shared
/// client for that connection.
#[derive(Debug)]
pub struct Lookup {
    connections: ConnectionRegistry,
    clients: ClientRegistry,
}

impl Lookup {
    pub fn new(connections: ConnectionRegistry, clients: ClientRegistry) -> Self {
        Self { connections, clients }
    }

    /// Build both registries and a reqwest transport from `config`.
    pub fn from_config(config: &LoaderConfig, provider: Arc<dyn ConnectionProvider>) -> Result<Self, TransportError> {
        let transport: Arc<dyn HttpTransport> =
            Arc::new(ReqwestTransport::new(&config.user_agent, config.request_timeout())?);
        Ok(Self::with_transport(config, provider, transport))
    }

    pub fn with_transport(
        config: &LoaderConfig,
        provider: Arc<dyn ConnectionProvider>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self::new(
            ConnectionRegistry::new(provider, config.connection_cache_capacity()),
            ClientRegistry::new(transport, config.query_cache_capacity),
        )
    }

    pub fn get_client(&self, project_id: Option<&str>) -> Result<Arc<DataLoader>, ConnectionError> {
        let info = self.connections.resolve(project_id)?;
        Ok(self.clients.get_or_create(info.into()))
    }

    /// Every ensemble of the project; empty when the project has no
    /// reachable storage.
    pub async fn get_ensembles(&self, project_id: Option<&str>) -> Vec<Map<String, Value>> {
        match self.get_client(project_id) {
            Ok(client) => client.list_all_ensembles().await,
            Err(failure) => {
                error!(project = ?project_id, error = %failure, "cannot resolve storage connection");
                Vec::new()
            }
        }
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }
}
