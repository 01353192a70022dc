//! Connector facade
//!
//! Bundles an HTTP transport, a websocket event stream, one client identity
//! and a readiness probe, all built from a single [`ConnectorConfig`]. Callers
//! own the connector outright; there is no process-wide instance.

use crate::client::JobClient;
use crate::config::ConnectorConfig;
use crate::error::ConnectorError;
use crate::events::WebSocketEvents;
use crate::readiness::ReadinessProbe;
use crate::transport::HttpTransport;
use crate::types::{ClientId, GeneratedImage, UploadAck, UploadRequest};
use comfy_graph::JobGraph;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Ready-to-use connection to one execution service
#[derive(Debug)]
pub struct Connector {
    config: ConnectorConfig,
    client: JobClient<HttpTransport, WebSocketEvents>,
    probe: ReadinessProbe,
}

impl Connector {
    /// Build a connector, loading the readiness reference graph from
    /// `config.test_payload`
    pub fn new(config: ConnectorConfig) -> Result<Self, ConnectorError> {
        let reference = JobGraph::load(&config.test_payload)?;
        Self::with_reference_graph(config, reference)
    }

    /// Build a connector with an in-memory readiness reference graph
    pub fn with_reference_graph(
        config: ConnectorConfig,
        reference: JobGraph,
    ) -> Result<Self, ConnectorError> {
        config.validate()?;

        let client_id = ClientId::generate(&config.app_name);
        let transport = HttpTransport::from_config(&config)?;
        let events = WebSocketEvents::from_config(&config, &client_id);
        let client = JobClient::new(transport, events, client_id)
            .with_completion_timeout(config.completion_timeout);
        let probe = ReadinessProbe::from_config(reference, &config);

        info!(
            client_id = %client.client_id(),
            address = %config.server_address,
            "connector created"
        );
        Ok(Self {
            config,
            client,
            probe,
        })
    }

    /// Identity this connector's events are scoped to
    #[inline]
    #[must_use]
    pub fn client_id(&self) -> &ClientId {
        self.client.client_id()
    }

    /// Configuration the connector was built from
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// Whether the service can run jobs right now
    pub async fn is_ready(&mut self) -> bool {
        self.probe.is_ready(&mut self.client).await
    }

    /// Retry [`is_ready`](Self::is_ready) per the configured attempts and delay
    pub async fn wait_until_ready(&mut self) -> Result<(), ConnectorError> {
        self.probe
            .wait_until_ready(&mut self.client)
            .await
            .map_err(|e| match e {
                ConnectorError::Unreachable { reason, .. } => ConnectorError::Unreachable {
                    address: self.config.server_address.clone(),
                    reason,
                },
                other => other,
            })
    }

    /// Run a graph and return its decoded `SaveImage` outputs
    pub async fn generate_images(
        &mut self,
        graph: &JobGraph,
    ) -> Result<Vec<GeneratedImage>, ConnectorError> {
        self.client.generate_images(graph).await
    }

    /// Run a graph, abandoning the completion wait when `cancel` fires
    pub async fn generate_images_with_cancel(
        &mut self,
        graph: &JobGraph,
        cancel: &CancellationToken,
    ) -> Result<Vec<GeneratedImage>, ConnectorError> {
        self.client.generate_images_with_cancel(graph, cancel).await
    }

    /// Upload a local file for use as a node input
    pub async fn upload_image(&self, request: &UploadRequest) -> Result<UploadAck, ConnectorError> {
        self.client.upload_image(request).await
    }

    /// Underlying job client
    #[inline]
    pub fn client_mut(&mut self) -> &mut JobClient<HttpTransport, WebSocketEvents> {
        &mut self.client
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use std::time::Duration;

    fn reference() -> JobGraph {
        JobGraph::from_json_str(r#"{"9": {"class_type": "SaveImage"}}"#).unwrap()
    }

    #[test]
    fn identity_uses_app_name_and_is_stable() {
        let config = ConnectorConfig::new().with_app_name("worker");
        let mut connector = Connector::with_reference_graph(config, reference()).unwrap();

        let id = connector.client_id().clone();
        assert!(id.as_str().starts_with("worker-"));
        assert_eq!(connector.client_mut().client_id(), &id);
        assert_eq!(
            connector.client_mut().events().url(),
            format!("ws://localhost:7777/ws?clientId={id}")
        );
    }

    #[test]
    fn separate_connectors_get_separate_identities() {
        let a = Connector::with_reference_graph(ConnectorConfig::new(), reference()).unwrap();
        let b = Connector::with_reference_graph(ConnectorConfig::new(), reference()).unwrap();
        assert_ne!(a.client_id(), b.client_id());
    }

    #[test]
    fn loads_reference_graph_from_test_payload() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"9": {{"class_type": "SaveImage"}}}}"#).unwrap();

        let config = ConnectorConfig::new().with_test_payload(file.path());
        let connector = Connector::new(config).unwrap();
        assert_eq!(connector.probe.reference().output_node().as_deref(), Some("9"));
    }

    #[test]
    fn missing_test_payload_is_an_error() {
        let config = ConnectorConfig::new().with_test_payload("/nonexistent/test_payload.json");
        let err = Connector::new(config).unwrap_err();
        assert!(matches!(err, ConnectorError::Graph(_)));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ConnectorConfig::new().with_readiness(0, Duration::ZERO);
        assert!(matches!(
            Connector::with_reference_graph(config, reference()),
            Err(ConnectorError::Config(_))
        ));
    }

    #[tokio::test]
    async fn wait_until_ready_names_the_configured_address() {
        let config = ConnectorConfig::new()
            .with_server_address("127.0.0.1:9")
            .with_readiness(1, Duration::ZERO);
        let mut connector = Connector::with_reference_graph(config, reference()).unwrap();

        let err = connector.wait_until_ready().await.unwrap_err();
        assert!(matches!(err, ConnectorError::Unreachable { ref address, .. } if address == "127.0.0.1:9"));
    }
}
