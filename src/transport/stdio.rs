//! Stdio transport for MCP
//!
//! Reads newline-delimited JSON from stdin and writes newline-delimited
//! JSON to stdout, flushing after each response. Closed input ends the
//! session. Every message is dispatched with an empty
//! [`AuthRequest`](crate::auth::AuthRequest); there are no credentials on a
//! subprocess pipe.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::auth::AuthRequest;
use crate::error::{Error, Result};
use crate::server::McpServer;

/// Stdio transport for MCP servers
///
/// # Example
///
/// ```rust,no_run
/// use beacon_mcp::{McpServer, StdioTransport};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = McpServer::new().server_info("my-server", "1.0.0");
///     let mut transport = StdioTransport::new(server);
///     transport.run().await?;
///     Ok(())
/// }
/// ```
pub struct StdioTransport {
    server: McpServer,
}

impl StdioTransport {
    pub fn new(server: McpServer) -> Self {
        Self { server }
    }

    /// Process messages until EOF or an I/O error.
    pub async fn run(&mut self) -> Result<()> {
        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut reader = BufReader::new(stdin);
        let mut line = String::new();

        tracing::info!("Stdio transport started, waiting for input");

        loop {
            line.clear();
            let bytes_read = reader
                .read_line(&mut line)
                .await
                .map_err(|e| Error::Transport(format!("Failed to read from stdin: {}", e)))?;

            if bytes_read == 0 {
                tracing::info!("Stdin closed, shutting down");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            tracing::debug!(input = %trimmed, "Received message");

            if let Some(response) = self
                .server
                .handle_message(trimmed, AuthRequest::default())
                .await
            {
                tracing::debug!(output = %response, "Sending response");
                stdout
                    .write_all(response.as_bytes())
                    .await
                    .map_err(|e| Error::Transport(format!("Failed to write to stdout: {}", e)))?;
                stdout
                    .write_all(b"\n")
                    .await
                    .map_err(|e| Error::Transport(format!("Failed to write newline: {}", e)))?;
                stdout
                    .flush()
                    .await
                    .map_err(|e| Error::Transport(format!("Failed to flush stdout: {}", e)))?;
            }
        }

        Ok(())
    }
}
