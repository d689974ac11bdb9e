//! gRPC server for the provider protocol.
//!
//! [`ProviderService`] is the Rust-typed side of the protocol; the private
//! `ProviderGrpcService` adapts it to the generated tonic trait. Every
//! failure is reported as a diagnostic inside a successful response, so the
//! host never sees a transport error for a provider-level problem.
//!
//! # Signal Handling
//!
//! [`serve`] stops on SIGTERM or SIGINT. After the signal it stops accepting
//! connections, waits up to [`ServeOptions::shutdown_timeout`] for in-flight
//! requests, then calls [`ProviderService::stop`].

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;
use tonic::transport::Server;
use tracing::{debug, error, info, instrument, warn};

use crate::config::SHUTDOWN_TIMEOUT_ENV;
use crate::error::ProviderError;
use crate::protocol;
use crate::schema::{has_errors, Diagnostic, DiagnosticSeverity, ProviderSchema, Schema};
use crate::types::{
    encode_value, ImportedResource, PlanResult, ProviderMetadata, HANDSHAKE_PREFIX,
    PROTOCOL_VERSION,
};

/// The provider side of the plugin protocol, in Rust types.
///
/// State and configuration travel as [`serde_json::Value`]. Errors returned
/// from any method are turned into diagnostics by the server.
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    /// The provider's schema including all resources and data sources.
    fn schema(&self) -> ProviderSchema;

    /// Resource and data source names. Derived from the schema by default.
    fn metadata(&self) -> ProviderMetadata {
        let schema = self.schema();
        ProviderMetadata {
            resources: schema.resources.keys().cloned().collect(),
            data_sources: schema.data_sources.keys().cloned().collect(),
            capabilities: Default::default(),
        }
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = config;
        Ok(vec![])
    }

    /// Configure the provider with credentials and settings.
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (resource_type, config);
        Ok(vec![])
    }

    /// Plan changes for a resource. `proposed_state` is `Null` for a destroy.
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError>;

    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError>;

    /// Refresh a resource. `None` means it no longer exists and should be
    /// dropped from state.
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Option<Value>, ProviderError>;

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError>;

    async fn import_resource(
        &self,
        resource_type: &str,
        _id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        Err(ProviderError::InvalidRequest(format!(
            "import not supported for resource type {}",
            resource_type
        )))
    }

    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (data_source_type, config);
        Ok(vec![])
    }

    async fn read_data_source(
        &self,
        data_source_type: &str,
        _config: Value,
    ) -> Result<Value, ProviderError> {
        Err(ProviderError::UnknownDataSource(data_source_type.to_string()))
    }
}

impl From<Diagnostic> for protocol::Diagnostic {
    fn from(d: Diagnostic) -> Self {
        let severity = match d.severity {
            DiagnosticSeverity::Error => protocol::diagnostic::Severity::Error,
            DiagnosticSeverity::Warning => protocol::diagnostic::Severity::Warning,
        };
        Self {
            severity: severity as i32,
            summary: d.summary,
            detail: d.detail.unwrap_or_default(),
            attribute: d.attribute.unwrap_or_default(),
        }
    }
}

fn diagnostics_to_proto(diagnostics: Vec<Diagnostic>) -> Vec<protocol::Diagnostic> {
    diagnostics.into_iter().map(Into::into).collect()
}

fn error_to_diagnostics(err: &ProviderError) -> Vec<protocol::Diagnostic> {
    vec![err.to_diagnostic().into()]
}

fn schema_to_proto(schema: &Schema) -> protocol::Schema {
    protocol::Schema {
        version: schema.version as i64,
        attributes: schema
            .attributes
            .iter()
            .map(|(name, attr)| protocol::Attribute {
                name: name.clone(),
                r#type: serde_json::to_vec(&attr.attr_type).unwrap_or_default(),
                required: attr.flags.required,
                optional: attr.flags.optional,
                computed: attr.flags.computed,
                sensitive: attr.flags.sensitive,
                description: attr.description.clone().unwrap_or_default(),
                force_new: attr.force_new,
                default_value: attr.default.as_ref().map(encode_value).unwrap_or_default(),
            })
            .collect(),
        description: schema.description.clone().unwrap_or_default(),
    }
}

/// Decode a JSON payload. An empty payload is `Null`.
fn decode(bytes: &[u8]) -> Result<Value, ProviderError> {
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(bytes)
        .map_err(|e| ProviderError::InvalidRequest(format!("payload is not valid JSON: {}", e)))
}

/// Decode a payload where empty or `null` means absent.
fn decode_optional(bytes: &[u8]) -> Result<Option<Value>, ProviderError> {
    decode(bytes).map(|v| Some(v).filter(|v| !v.is_null()))
}

fn log_diagnostics(operation: &str, diagnostics: &[Diagnostic]) {
    if has_errors(diagnostics) {
        warn!(diagnostics = diagnostics.len(), "{} completed with errors", operation);
    } else {
        info!("{} completed successfully", operation);
    }
}

/// Adapts a [`ProviderService`] to the generated gRPC trait.
struct ProviderGrpcService<P: ProviderService> {
    provider: Arc<P>,
}

impl<P: ProviderService> ProviderGrpcService<P> {
    async fn plan_inner(&self, req: &protocol::PlanRequest) -> Result<PlanResult, ProviderError> {
        let prior = decode_optional(&req.prior_state)?;
        let proposed = decode(&req.proposed_state)?;
        let config = decode(&req.config)?;
        self.provider
            .plan(&req.resource_type, prior, proposed, config)
            .await
    }

    async fn update_inner(&self, req: &protocol::UpdateRequest) -> Result<Value, ProviderError> {
        let prior = decode(&req.prior_state)?;
        let planned = decode(&req.planned_state)?;
        self.provider.update(&req.resource_type, prior, planned).await
    }
}

type GrpcResult<T> = Result<tonic::Response<T>, tonic::Status>;

#[tonic::async_trait]
impl<P: ProviderService> protocol::provider_server::Provider for ProviderGrpcService<P> {
    #[instrument(skip(self, _request), name = "grpc.get_metadata")]
    async fn get_metadata(
        &self,
        _request: tonic::Request<protocol::GetMetadataRequest>,
    ) -> GrpcResult<protocol::GetMetadataResponse> {
        let metadata = self.provider.metadata();
        info!(
            resources = metadata.resources.len(),
            data_sources = metadata.data_sources.len(),
            "GetMetadata completed"
        );
        Ok(tonic::Response::new(protocol::GetMetadataResponse {
            server_capabilities: Some(protocol::ServerCapabilities {
                plan_destroy: metadata.capabilities.plan_destroy,
            }),
            resources: metadata.resources,
            data_sources: metadata.data_sources,
            diagnostics: vec![],
        }))
    }

    #[instrument(skip(self, _request), name = "grpc.get_schema")]
    async fn get_schema(
        &self,
        _request: tonic::Request<protocol::GetSchemaRequest>,
    ) -> GrpcResult<protocol::GetSchemaResponse> {
        let schema = self.provider.schema();
        info!(
            resources = schema.resources.len(),
            data_sources = schema.data_sources.len(),
            "GetSchema completed"
        );
        Ok(tonic::Response::new(protocol::GetSchemaResponse {
            provider: Some(schema_to_proto(&schema.provider)),
            resources: schema
                .resources
                .iter()
                .map(|(k, v)| (k.clone(), schema_to_proto(v)))
                .collect(),
            data_sources: schema
                .data_sources
                .iter()
                .map(|(k, v)| (k.clone(), schema_to_proto(v)))
                .collect(),
            diagnostics: vec![],
        }))
    }

    #[instrument(skip(self, request), name = "grpc.validate_provider_config")]
    async fn validate_provider_config(
        &self,
        request: tonic::Request<protocol::ValidateProviderConfigRequest>,
    ) -> GrpcResult<protocol::ValidateProviderConfigResponse> {
        let req = request.into_inner();
        let result = match decode(&req.config) {
            Ok(config) => self.provider.validate_provider_config(config).await,
            Err(e) => Err(e),
        };

        let diagnostics = match result {
            Ok(diagnostics) => {
                log_diagnostics("ValidateProviderConfig", &diagnostics);
                diagnostics_to_proto(diagnostics)
            },
            Err(e) => {
                error!(error = %e, "ValidateProviderConfig failed");
                error_to_diagnostics(&e)
            },
        };
        Ok(tonic::Response::new(protocol::ValidateProviderConfigResponse { diagnostics }))
    }

    #[instrument(skip(self, request), name = "grpc.configure")]
    async fn configure(
        &self,
        request: tonic::Request<protocol::ConfigureRequest>,
    ) -> GrpcResult<protocol::ConfigureResponse> {
        let req = request.into_inner();
        let result = match decode(&req.config) {
            Ok(config) => self.provider.configure(config).await,
            Err(e) => Err(e),
        };

        let diagnostics = match result {
            Ok(diagnostics) => {
                log_diagnostics("Configure", &diagnostics);
                diagnostics_to_proto(diagnostics)
            },
            Err(e) => {
                error!(error = %e, "Configure failed");
                error_to_diagnostics(&e)
            },
        };
        Ok(tonic::Response::new(protocol::ConfigureResponse { diagnostics }))
    }

    #[instrument(skip(self, _request), name = "grpc.stop")]
    async fn stop(
        &self,
        _request: tonic::Request<protocol::StopRequest>,
    ) -> GrpcResult<protocol::StopResponse> {
        let error = match self.provider.stop().await {
            Ok(()) => {
                info!("Stop completed");
                String::new()
            },
            Err(e) => {
                error!(error = %e, "Stop failed");
                e.to_string()
            },
        };
        Ok(tonic::Response::new(protocol::StopResponse { error }))
    }

    #[instrument(skip(self, request), name = "grpc.validate_resource_config")]
    async fn validate_resource_config(
        &self,
        request: tonic::Request<protocol::ValidateResourceConfigRequest>,
    ) -> GrpcResult<protocol::ValidateResourceConfigResponse> {
        let req = request.into_inner();
        debug!(resource_type = %req.resource_type, "ValidateResourceConfig called");
        let result = match decode(&req.config) {
            Ok(config) => {
                self.provider
                    .validate_resource_config(&req.resource_type, config)
                    .await
            },
            Err(e) => Err(e),
        };

        let diagnostics = match result {
            Ok(diagnostics) => {
                log_diagnostics("ValidateResourceConfig", &diagnostics);
                diagnostics_to_proto(diagnostics)
            },
            Err(e) => {
                error!(resource_type = %req.resource_type, error = %e, "ValidateResourceConfig failed");
                error_to_diagnostics(&e)
            },
        };
        Ok(tonic::Response::new(protocol::ValidateResourceConfigResponse { diagnostics }))
    }

    #[instrument(skip(self, request), name = "grpc.plan")]
    async fn plan(
        &self,
        request: tonic::Request<protocol::PlanRequest>,
    ) -> GrpcResult<protocol::PlanResponse> {
        let req = request.into_inner();
        debug!(resource_type = %req.resource_type, "Plan called");

        match self.plan_inner(&req).await {
            Ok(plan) => {
                info!(
                    resource_type = %req.resource_type,
                    changes = plan.changes.len(),
                    requires_replace = plan.requires_replace,
                    "Plan completed"
                );
                Ok(tonic::Response::new(protocol::PlanResponse {
                    planned_state: if plan.planned_state.is_null() {
                        Vec::new()
                    } else {
                        encode_value(&plan.planned_state)
                    },
                    changes: plan.changes.into_iter().map(Into::into).collect(),
                    requires_replace: plan.requires_replace,
                    diagnostics: vec![],
                }))
            },
            Err(e) => {
                error!(resource_type = %req.resource_type, error = %e, "Plan failed");
                Ok(tonic::Response::new(protocol::PlanResponse {
                    planned_state: Vec::new(),
                    changes: vec![],
                    requires_replace: false,
                    diagnostics: error_to_diagnostics(&e),
                }))
            },
        }
    }

    #[instrument(skip(self, request), name = "grpc.create")]
    async fn create(
        &self,
        request: tonic::Request<protocol::CreateRequest>,
    ) -> GrpcResult<protocol::CreateResponse> {
        let req = request.into_inner();
        debug!(resource_type = %req.resource_type, "Create called");
        let result = match decode(&req.planned_state) {
            Ok(planned) => self.provider.create(&req.resource_type, planned).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(state) => {
                info!(resource_type = %req.resource_type, "Create completed");
                Ok(tonic::Response::new(protocol::CreateResponse {
                    state: encode_value(&state),
                    diagnostics: vec![],
                }))
            },
            Err(e) => {
                error!(resource_type = %req.resource_type, error = %e, "Create failed");
                Ok(tonic::Response::new(protocol::CreateResponse {
                    state: e.partial_state().map(encode_value).unwrap_or_default(),
                    diagnostics: error_to_diagnostics(&e),
                }))
            },
        }
    }

    #[instrument(skip(self, request), name = "grpc.read")]
    async fn read(
        &self,
        request: tonic::Request<protocol::ReadRequest>,
    ) -> GrpcResult<protocol::ReadResponse> {
        let req = request.into_inner();
        debug!(resource_type = %req.resource_type, "Read called");
        let result = match decode(&req.current_state) {
            Ok(current) => self.provider.read(&req.resource_type, current).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(Some(state)) => {
                debug!(resource_type = %req.resource_type, "Read completed");
                Ok(tonic::Response::new(protocol::ReadResponse {
                    state: encode_value(&state),
                    diagnostics: vec![],
                }))
            },
            Ok(None) => {
                info!(resource_type = %req.resource_type, "Read found no remote object");
                Ok(tonic::Response::new(protocol::ReadResponse {
                    state: Vec::new(),
                    diagnostics: vec![],
                }))
            },
            Err(e) => {
                error!(resource_type = %req.resource_type, error = %e, "Read failed");
                Ok(tonic::Response::new(protocol::ReadResponse {
                    state: Vec::new(),
                    diagnostics: error_to_diagnostics(&e),
                }))
            },
        }
    }

    #[instrument(skip(self, request), name = "grpc.update")]
    async fn update(
        &self,
        request: tonic::Request<protocol::UpdateRequest>,
    ) -> GrpcResult<protocol::UpdateResponse> {
        let req = request.into_inner();
        debug!(resource_type = %req.resource_type, "Update called");

        match self.update_inner(&req).await {
            Ok(state) => {
                info!(resource_type = %req.resource_type, "Update completed");
                Ok(tonic::Response::new(protocol::UpdateResponse {
                    state: encode_value(&state),
                    diagnostics: vec![],
                }))
            },
            Err(e) => {
                error!(resource_type = %req.resource_type, error = %e, "Update failed");
                Ok(tonic::Response::new(protocol::UpdateResponse {
                    state: e.partial_state().map(encode_value).unwrap_or_default(),
                    diagnostics: error_to_diagnostics(&e),
                }))
            },
        }
    }

    #[instrument(skip(self, request), name = "grpc.delete")]
    async fn delete(
        &self,
        request: tonic::Request<protocol::DeleteRequest>,
    ) -> GrpcResult<protocol::DeleteResponse> {
        let req = request.into_inner();
        debug!(resource_type = %req.resource_type, "Delete called");
        let result = match decode(&req.current_state) {
            Ok(current) => self.provider.delete(&req.resource_type, current).await,
            Err(e) => Err(e),
        };

        let diagnostics = match result {
            Ok(()) => {
                info!(resource_type = %req.resource_type, "Delete completed");
                vec![]
            },
            Err(e) => {
                error!(resource_type = %req.resource_type, error = %e, "Delete failed");
                error_to_diagnostics(&e)
            },
        };
        Ok(tonic::Response::new(protocol::DeleteResponse { diagnostics }))
    }

    #[instrument(skip(self, request), name = "grpc.import_resource_state")]
    async fn import_resource_state(
        &self,
        request: tonic::Request<protocol::ImportResourceStateRequest>,
    ) -> GrpcResult<protocol::ImportResourceStateResponse> {
        let req = request.into_inner();

        match self.provider.import_resource(&req.resource_type, &req.id).await {
            Ok(imported) => {
                info!(
                    resource_type = %req.resource_type,
                    id = %req.id,
                    imported_count = imported.len(),
                    "ImportResourceState completed"
                );
                Ok(tonic::Response::new(protocol::ImportResourceStateResponse {
                    imported: imported
                        .into_iter()
                        .map(|r| protocol::ImportedResource {
                            resource_type: r.resource_type,
                            state: encode_value(&r.state),
                        })
                        .collect(),
                    diagnostics: vec![],
                }))
            },
            Err(e) => {
                error!(resource_type = %req.resource_type, id = %req.id, error = %e, "ImportResourceState failed");
                Ok(tonic::Response::new(protocol::ImportResourceStateResponse {
                    imported: vec![],
                    diagnostics: error_to_diagnostics(&e),
                }))
            },
        }
    }

    #[instrument(skip(self, request), name = "grpc.validate_data_source_config")]
    async fn validate_data_source_config(
        &self,
        request: tonic::Request<protocol::ValidateDataSourceConfigRequest>,
    ) -> GrpcResult<protocol::ValidateDataSourceConfigResponse> {
        let req = request.into_inner();
        let result = match decode(&req.config) {
            Ok(config) => {
                self.provider
                    .validate_data_source_config(&req.data_source_type, config)
                    .await
            },
            Err(e) => Err(e),
        };

        let diagnostics = match result {
            Ok(diagnostics) => {
                log_diagnostics("ValidateDataSourceConfig", &diagnostics);
                diagnostics_to_proto(diagnostics)
            },
            Err(e) => {
                error!(data_source_type = %req.data_source_type, error = %e, "ValidateDataSourceConfig failed");
                error_to_diagnostics(&e)
            },
        };
        Ok(tonic::Response::new(protocol::ValidateDataSourceConfigResponse { diagnostics }))
    }

    #[instrument(skip(self, request), name = "grpc.read_data_source")]
    async fn read_data_source(
        &self,
        request: tonic::Request<protocol::ReadDataSourceRequest>,
    ) -> GrpcResult<protocol::ReadDataSourceResponse> {
        let req = request.into_inner();
        debug!(data_source_type = %req.data_source_type, "ReadDataSource called");
        let result = match decode(&req.config) {
            Ok(config) => {
                self.provider
                    .read_data_source(&req.data_source_type, config)
                    .await
            },
            Err(e) => Err(e),
        };

        match result {
            Ok(state) => {
                info!(data_source_type = %req.data_source_type, "ReadDataSource completed");
                Ok(tonic::Response::new(protocol::ReadDataSourceResponse {
                    state: encode_value(&state),
                    diagnostics: vec![],
                }))
            },
            Err(e) => {
                error!(data_source_type = %req.data_source_type, error = %e, "ReadDataSource failed");
                Ok(tonic::Response::new(protocol::ReadDataSourceResponse {
                    state: Vec::new(),
                    diagnostics: error_to_diagnostics(&e),
                }))
            },
        }
    }
}

/// Options for running the server.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// How long to wait for in-flight requests after a shutdown signal.
    pub shutdown_timeout: Duration,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServeOptions {
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Defaults, with the shutdown timeout read from
    /// `GITLAB_PROVIDER_SHUTDOWN_TIMEOUT` (whole seconds) when set.
    pub fn from_env() -> Result<Self, ProviderError> {
        let mut options = Self::default();
        if let Ok(raw) = std::env::var(SHUTDOWN_TIMEOUT_ENV) {
            let seconds: u64 = raw.trim().parse().map_err(|_| {
                ProviderError::Configuration(format!(
                    "{} must be a whole number of seconds, got '{}'",
                    SHUTDOWN_TIMEOUT_ENV, raw
                ))
            })?;
            options.shutdown_timeout = Duration::from_secs(seconds);
        }
        Ok(options)
    }
}

/// Wait for SIGTERM or SIGINT.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
                    _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
                }
            },
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Unable to install signal handlers, falling back to ctrl-c");
                if tokio::signal::ctrl_c().await.is_err() {
                    std::future::pending::<()>().await;
                }
            },
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received CTRL+C, initiating graceful shutdown");
        } else {
            std::future::pending::<()>().await;
        }
    }
}

/// Serve the provider on a random local port until a shutdown signal.
///
/// Prints `PROVIDER_PLUGIN|1|<addr>` on stdout once the listener is bound.
pub async fn serve<P: ProviderService>(provider: P) -> Result<(), ProviderError> {
    serve_with_options(provider, ServeOptions::default()).await
}

pub async fn serve_with_options<P: ProviderService>(
    provider: P,
    options: ServeOptions,
) -> Result<(), ProviderError> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    serve_with_shutdown(provider, listener, options, wait_for_shutdown_signal()).await
}

/// Serve on a specific address.
pub async fn serve_on<P: ProviderService>(
    provider: P,
    addr: SocketAddr,
    options: ServeOptions,
) -> Result<(), ProviderError> {
    let listener = TcpListener::bind(addr).await?;
    serve_with_shutdown(provider, listener, options, wait_for_shutdown_signal()).await
}

/// Serve on an already-bound listener until `shutdown` resolves.
pub async fn serve_with_shutdown<P, F>(
    provider: P,
    listener: TcpListener,
    options: ServeOptions,
    shutdown: F,
) -> Result<(), ProviderError>
where
    P: ProviderService,
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    println!("{}|{}|{}", HANDSHAKE_PREFIX, PROTOCOL_VERSION, addr);
    info!(address = %addr, "Provider listening");

    let provider = Arc::new(provider);
    let service = ProviderGrpcService {
        provider: Arc::clone(&provider),
    };

    let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();
    let server = Server::builder()
        .add_service(protocol::provider_server::ProviderServer::new(service))
        .serve_with_incoming_shutdown(
            tokio_stream::wrappers::TcpListenerStream::new(listener),
            async move {
                shutdown.await;
                let _ = signalled_tx.send(());
            },
        );
    tokio::pin!(server);

    // The timeout only starts once shutdown has been requested.
    tokio::select! {
        biased;
        result = &mut server => result?,
        _ = signalled_rx => {
            match tokio::time::timeout(options.shutdown_timeout, &mut server).await {
                Ok(result) => result?,
                Err(_) => warn!(
                    timeout = ?options.shutdown_timeout,
                    "Shutdown timeout exceeded, forcing shutdown"
                ),
            }
        },
    }
    info!("Server shutdown complete");

    if let Err(e) = provider.stop().await {
        error!(error = %e, "Provider stop failed");
    }
    info!("Provider shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;
    use crate::types::AttributeChange;
    use serde_json::json;

    #[test]
    fn test_decode_payloads() {
        assert_eq!(decode(b"").unwrap(), Value::Null);
        assert_eq!(decode(br#"{"id":"1"}"#).unwrap(), json!({"id": "1"}));
        assert!(decode_optional(b"null").unwrap().is_none());
        assert!(decode_optional(b"").unwrap().is_none());

        let err = decode(b"{not json").unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
        assert!(err.to_diagnostic().summary.starts_with("Invalid request"));
    }

    #[test]
    fn test_diagnostic_to_proto() {
        let proto: protocol::Diagnostic = Diagnostic::warning("careful").with_attribute("key").into();
        assert_eq!(proto.severity, protocol::diagnostic::Severity::Warning as i32);
        assert_eq!(proto.attribute, "key");
        assert!(proto.detail.is_empty());
    }

    #[test]
    fn test_schema_to_proto() {
        let schema = Schema::v0()
            .with_description("users")
            .with_attribute("state", Attribute::optional_string().with_default(json!("active")))
            .with_attribute("password", Attribute::optional_string().sensitive());

        let proto = schema_to_proto(&schema);
        assert_eq!(proto.description, "users");
        assert_eq!(proto.attributes.len(), 2);

        let password = &proto.attributes[0];
        assert_eq!(password.name, "password");
        assert!(password.sensitive);
        assert_eq!(password.r#type, br#""string""#.to_vec());

        let state = &proto.attributes[1];
        assert!(state.computed);
        assert_eq!(state.default_value, br#""active""#.to_vec());
    }

    #[test]
    fn test_attribute_change_proto_for_removal() {
        let proto: protocol::AttributeChange = AttributeChange::removed("key", json!("PEM")).into();
        assert!(proto.after.is_empty());
        assert_eq!(proto.before, br#""PEM""#.to_vec());
    }

    #[test]
    fn test_serve_options() {
        let options = ServeOptions::default();
        assert_eq!(options.shutdown_timeout, Duration::from_secs(30));

        let options = options.with_shutdown_timeout(Duration::from_secs(5));
        assert_eq!(options.shutdown_timeout, Duration::from_secs(5));
    }
}
