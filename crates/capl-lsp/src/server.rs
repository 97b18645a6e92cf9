use crate::config::CaplConfig;
use crate::document::{
    ServerState, handle_document_change, handle_document_close, handle_document_open,
};
use crate::handlers::{document_symbol, to_rpc_error};
use capl_core::ChangeOutcome;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_lsp_server::ls_types::{
    ClientCapabilities, DidChangeTextDocumentParams, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, DocumentSymbolParams, DocumentSymbolResponse, InitializeParams,
    InitializeResult, InitializedParams, MessageType, OneOf, ServerCapabilities, ServerInfo,
    TextDocumentSyncCapability, TextDocumentSyncKind,
};
use tower_lsp_server::{Client, LanguageServer, jsonrpc::Result};

pub struct Backend {
    client: Client,
    state: Arc<ServerState>,
    config: Arc<RwLock<CaplConfig>>,
}

impl Backend {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            state: Arc::new(ServerState::new()),
            config: Arc::new(RwLock::new(CaplConfig::default())),
        }
    }

    fn server_capabilities(config: &CaplConfig) -> ServerCapabilities {
        let sync = if config.sync.incremental {
            TextDocumentSyncKind::INCREMENTAL
        } else {
            TextDocumentSyncKind::FULL
        };

        ServerCapabilities {
            text_document_sync: Some(TextDocumentSyncCapability::Kind(sync)),
            document_symbol_provider: Some(OneOf::Left(true)),
            ..Default::default()
        }
    }

    fn supports_hierarchical_symbols(capabilities: &ClientCapabilities) -> bool {
        capabilities
            .text_document
            .as_ref()
            .and_then(|text| text.document_symbol.as_ref())
            .and_then(|symbols| symbols.hierarchical_document_symbol_support)
            .unwrap_or(false)
    }
}

impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        tracing::info!("initializing capl-lsp server");

        if let Some(init_options) = params.initialization_options {
            match serde_json::from_value::<CaplConfig>(init_options) {
                Ok(config) => {
                    tracing::debug!("loaded configuration: {:?}", config);
                    *self.config.write().await = config;
                }
                Err(e) => {
                    tracing::warn!("invalid initialization options, using defaults: {}", e);
                }
            }
        }

        let hierarchical = Self::supports_hierarchical_symbols(&params.capabilities);
        tracing::debug!("client hierarchical document symbols: {}", hierarchical);
        self.state.set_hierarchical_symbols(hierarchical);

        let config = self.config.read().await;
        Ok(InitializeResult {
            capabilities: Self::server_capabilities(&config),
            server_info: Some(ServerInfo {
                name: "capl-lsp".into(),
                version: Some(env!("CARGO_PKG_VERSION").into()),
            }),
            offset_encoding: None,
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        tracing::info!("capl-lsp server initialized");
        self.client
            .log_message(MessageType::INFO, "capl-lsp ready")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        tracing::info!(
            "shutting down capl-lsp server ({} open document(s))",
            self.state.document_count()
        );
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        handle_document_open(&self.state, params);
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri.clone();

        match handle_document_change(&self.state, params) {
            Ok(ChangeOutcome::Applied { .. }) => {}
            Ok(ChangeOutcome::Stale { current, received }) => {
                tracing::debug!(
                    "ignored change {} for {:?} (at {})",
                    received,
                    uri,
                    current
                );
            }
            Err(e) => {
                tracing::warn!("failed to apply change: {}", e);
            }
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        if let Err(e) = handle_document_close(&self.state, params) {
            tracing::warn!("failed to close document: {}", e);
        }
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        let uri = params.text_document.uri;
        tracing::debug!("documentSymbol request for: {:?}", uri);

        // Clone config before computing to release lock early
        let symbols_config = { self.config.read().await.symbols.clone() };

        document_symbol::handle_document_symbol(&self.state, &uri, &symbols_config)
            .map(Some)
            .map_err(to_rpc_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower_lsp_server::ls_types::{
        DocumentSymbolClientCapabilities, TextDocumentClientCapabilities,
    };

    #[test]
    fn test_server_capabilities() {
        let caps = Backend::server_capabilities(&CaplConfig::default());

        assert!(matches!(
            caps.document_symbol_provider,
            Some(OneOf::Left(true))
        ));
        assert!(caps.hover_provider.is_none());
        assert!(caps.completion_provider.is_none());
    }

    #[test]
    fn test_server_capabilities_text_document_sync() {
        let caps = Backend::server_capabilities(&CaplConfig::default());

        match caps.text_document_sync {
            Some(TextDocumentSyncCapability::Kind(kind)) => {
                assert_eq!(kind, TextDocumentSyncKind::INCREMENTAL);
            }
            _ => panic!("Expected text document sync kind to be INCREMENTAL"),
        }
    }

    #[test]
    fn test_server_capabilities_full_sync() {
        let mut config = CaplConfig::default();
        config.sync.incremental = false;
        let caps = Backend::server_capabilities(&config);

        match caps.text_document_sync {
            Some(TextDocumentSyncCapability::Kind(kind)) => {
                assert_eq!(kind, TextDocumentSyncKind::FULL);
            }
            _ => panic!("Expected text document sync kind to be FULL"),
        }
    }

    #[test]
    fn test_hierarchical_detection() {
        assert!(!Backend::supports_hierarchical_symbols(
            &ClientCapabilities::default()
        ));

        let capabilities = ClientCapabilities {
            text_document: Some(TextDocumentClientCapabilities {
                document_symbol: Some(DocumentSymbolClientCapabilities {
                    hierarchical_document_symbol_support: Some(true),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(Backend::supports_hierarchical_symbols(&capabilities));
    }

    #[tokio::test]
    async fn test_backend_state_initialization() {
        let (service, _socket) = tower_lsp_server::LspService::build(Backend::new).finish();
        let backend = service.inner();

        assert_eq!(backend.state.document_count(), 0);
        assert!(!backend.state.hierarchical_symbols());
    }

    #[tokio::test]
    async fn test_initialize_reads_options() {
        let (service, _socket) = tower_lsp_server::LspService::build(Backend::new).finish();
        let backend = service.inner();

        let params = InitializeParams {
            initialization_options: Some(serde_json::json!({
                "symbols": { "include_locals": true },
                "sync": { "incremental": false }
            })),
            ..Default::default()
        };
        let result = backend.initialize(params).await.unwrap();

        assert!(backend.config.read().await.symbols.include_locals);
        assert!(matches!(
            result.capabilities.text_document_sync,
            Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::FULL))
        ));
        assert_eq!(result.server_info.unwrap().name, "capl-lsp");
    }

    #[tokio::test]
    async fn test_initialize_invalid_options_keeps_defaults() {
        let (service, _socket) = tower_lsp_server::LspService::build(Backend::new).finish();
        let backend = service.inner();

        let params = InitializeParams {
            initialization_options: Some(serde_json::json!({ "symbols": 42 })),
            ..Default::default()
        };
        backend.initialize(params).await.unwrap();

        let config = backend.config.read().await;
        assert!(!config.symbols.include_locals);
        assert_eq!(config.symbols.max_depth, 32);
    }

    #[tokio::test]
    async fn test_document_symbol_unknown_document() {
        let (service, _socket) = tower_lsp_server::LspService::build(Backend::new).finish();
        let backend = service.inner();

        let params: DocumentSymbolParams = serde_json::from_value(serde_json::json!({
            "textDocument": { "uri": "file:///missing.can" }
        }))
        .unwrap();

        let error = backend.document_symbol(params).await.unwrap_err();
        assert_eq!(
            error.code,
            tower_lsp_server::jsonrpc::ErrorCode::InvalidParams
        );
    }
}
