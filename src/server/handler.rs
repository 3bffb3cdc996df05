use crate::client::{JstorClient, ScholarClient};
use crate::session::SystemBrowserAuthenticator;
use crate::tools::{
    AuthenticateInput, AuthenticateTool, SearchInput, SearchOutcome, SearchSource, SearchTool,
};
use crate::{Config, Result};
use rmcp::{
    model::*,
    service::{RequestContext, RoleServer},
    ErrorData, ServerHandler,
};
use std::{future::Future, sync::Arc};
use tracing::{debug, info, instrument};

const SERVER_INSTRUCTIONS: &str = "Academic search gateway. Provides tools to search Google Scholar \
(open access) and JSTOR (institutional access), and to manage the interactive JSTOR login session.";

/// Main MCP server handler
#[derive(Debug, Clone)]
pub struct ScholarServerHandler {
    config: Arc<Config>,
    search_tool: SearchTool,
    authenticate_tool: AuthenticateTool,
}

impl ScholarServerHandler {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        info!("Initializing academic search server handler");

        let scholar = Arc::new(ScholarClient::new(&config.scholar)?);

        let handoff_path = config
            .session
            .cookie_file
            .with_file_name(".jstor_login_handoff.json");
        let authenticator = Arc::new(SystemBrowserAuthenticator::new(handoff_path));
        let jstor = Arc::new(JstorClient::new(
            &config.jstor,
            config.session.clone(),
            authenticator,
        )?);

        let search_tool = SearchTool::new(scholar, Arc::clone(&jstor), &config);
        let authenticate_tool = AuthenticateTool::new(jstor);

        Ok(Self {
            config,
            search_tool,
            authenticate_tool,
        })
    }

    /// Health check for the server
    #[instrument(skip(self))]
    pub async fn ping(&self) -> Result<()> {
        debug!("Ping received - server is healthy");
        Ok(())
    }

    fn tool_result(payload: &impl serde::Serialize, is_error: bool) -> std::result::Result<CallToolResult, ErrorData> {
        let json = serde_json::to_value(payload)
            .map_err(|e| ErrorData::internal_error(format!("Serialization failed: {e}"), None))?;
        let text = serde_json::to_string_pretty(&json)
            .map_err(|e| ErrorData::internal_error(format!("Serialization failed: {e}"), None))?;
        Ok(CallToolResult {
            content: Some(vec![Content::text(text)]),
            structured_content: Some(json),
            is_error: Some(is_error),
        })
    }

    fn parse_input<T: serde::de::DeserializeOwned>(
        request: &CallToolRequestParam,
    ) -> std::result::Result<T, ErrorData> {
        serde_json::from_value(serde_json::Value::Object(
            request.arguments.clone().unwrap_or_default(),
        ))
        .map_err(|e| ErrorData::invalid_params(format!("Invalid tool input: {e}"), None))
    }

    async fn run_search(
        &self,
        source: SearchSource,
        request: &CallToolRequestParam,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        let input: SearchInput = Self::parse_input(request)?;
        let outcome = self.search_tool.search(source, input).await;
        let is_error = outcome.is_error();
        match &outcome {
            SearchOutcome::Success(result) => {
                debug!(papers = result.total_results, "Search tool returning results");
            }
            SearchOutcome::Failure(response) => {
                debug!(code = %response.code, "Search tool returning error envelope");
            }
        }
        Self::tool_result(&outcome, is_error)
    }
}

impl ServerHandler for ScholarServerHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(SERVER_INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    #[instrument(skip(self, request, context))]
    fn initialize(
        &self,
        request: InitializeRequestParam,
        context: RequestContext<RoleServer>,
    ) -> impl Future<Output = std::result::Result<InitializeResult, ErrorData>> + Send + '_ {
        info!("MCP server initializing");

        async move {
            if context.peer.peer_info().is_none() {
                context.peer.set_peer_info(request);
            }

            Ok(InitializeResult {
                protocol_version: ProtocolVersion::default(),
                capabilities: ServerCapabilities::builder().enable_tools().build(),
                server_info: Implementation {
                    name: env!("CARGO_PKG_NAME").into(),
                    version: env!("CARGO_PKG_VERSION").into(),
                },
                instructions: Some(SERVER_INSTRUCTIONS.into()),
            })
        }
    }

    #[instrument(skip(self, _request, _context))]
    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = std::result::Result<ListToolsResult, ErrorData>> + Send + '_ {
        info!("Listing available tools");

        async move {
            let search_schema = Arc::new(
                serde_json::to_value(schemars::schema_for!(SearchInput))
                    .expect("schema serializes")
                    .as_object()
                    .expect("schema is an object")
                    .clone(),
            );

            let tools = vec![
                Tool {
                    name: "search_scholar".into(),
                    description: Some(
                        "Search Google Scholar for academic papers by keywords, with optional \
                         author and date filters and optional abstract/full-text retrieval"
                            .into(),
                    ),
                    input_schema: Arc::clone(&search_schema),
                    output_schema: None,
                    annotations: None,
                },
                Tool {
                    name: "search_jstor".into(),
                    description: Some(
                        "Search JSTOR for academic papers; requires an institutional session \
                         established via authenticate_jstor for full results"
                            .into(),
                    ),
                    input_schema: search_schema,
                    output_schema: None,
                    annotations: None,
                },
                Tool {
                    name: "authenticate_jstor".into(),
                    description: Some(
                        "Manage the JSTOR institutional session: run interactive browser login, \
                         check status, or clear stored cookies"
                            .into(),
                    ),
                    input_schema: Arc::new(
                        serde_json::to_value(schemars::schema_for!(AuthenticateInput))
                            .expect("schema serializes")
                            .as_object()
                            .expect("schema is an object")
                            .clone(),
                    ),
                    output_schema: None,
                    annotations: None,
                },
            ];

            Ok(ListToolsResult {
                tools,
                next_cursor: None,
            })
        }
    }

    #[instrument(skip(self, request, _context))]
    fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = std::result::Result<CallToolResult, ErrorData>> + Send + '_ {
        info!("Tool called: {}", request.name);

        let handler = self.clone();

        async move {
            match request.name.as_ref() {
                "search_scholar" => handler.run_search(SearchSource::Scholar, &request).await,
                "search_jstor" => handler.run_search(SearchSource::Jstor, &request).await,
                "authenticate_jstor" => {
                    let input: AuthenticateInput = Self::parse_input(&request)?;
                    let payload = handler
                        .authenticate_tool
                        .execute(input)
                        .await
                        .map_err(|e| {
                            ErrorData::internal_error(format!("Authentication failed: {e}"), None)
                        })?;
                    Self::tool_result(&payload, false)
                }
                _ => Err(ErrorData::invalid_request(
                    format!("Unknown tool: {}", request.name),
                    None,
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_handler() -> ScholarServerHandler {
        let config = Config::default();
        ScholarServerHandler::new(Arc::new(config)).unwrap()
    }

    #[tokio::test]
    async fn test_handler_creation() {
        let handler = create_test_handler();
        assert_eq!(handler.config.scholar.min_request_interval_ms, 1000);
    }

    #[tokio::test]
    async fn test_ping() {
        let handler = create_test_handler();
        assert!(handler.ping().await.is_ok());
    }

    #[test]
    fn test_search_input_schema_has_required_keywords() {
        let schema = serde_json::to_value(schemars::schema_for!(SearchInput)).unwrap();
        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "keywords"));
        assert!(schema["properties"].get("maxResults").is_some());
        assert!(schema["properties"].get("dateRange").is_some());
    }

    #[test]
    fn test_error_envelope_marks_tool_error() {
        let outcome = SearchOutcome::Failure(crate::tools::ErrorResponse::new(
            "EMPTY_KEYWORDS",
            "At least one search keyword is required".to_string(),
            None,
        ));
        let result = ScholarServerHandler::tool_result(&outcome, outcome.is_error()).unwrap();
        assert_eq!(result.is_error, Some(true));
        let structured = result.structured_content.unwrap();
        assert_eq!(structured["code"], "EMPTY_KEYWORDS");
    }
}
