// Stdio transport: one JSON-RPC message per line in, one response per line out
// stdout carries protocol traffic only; logs go to stderr

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::rpc::{RpcHandler, RpcResponse, PARSE_ERROR};

/// Session key shared by everything arriving over stdio
pub const STDIO_SESSION_KEY: &str = "stdio";

/// Serve MCP over the process's stdin/stdout until stdin closes
pub async fn serve(handler: RpcHandler) -> Result<()> {
    let reader = BufReader::new(tokio::io::stdin());
    let writer = tokio::io::stdout();
    serve_io(handler, reader, writer).await
}

/// Serve MCP over any line-oriented reader/writer pair
pub async fn serve_io<R, W>(handler: RpcHandler, mut reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = Vec::new();

    while reader
        .read_until(b'\n', &mut line)
        .await
        .context("Failed to read from stdin")?
        > 0
    {
        let response = handle_line(&handler, &line).await;
        line.clear();

        if let Some(response) = response {
            let json = serde_json::to_string(&response)?;
            writer.write_all(json.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
    }

    tracing::info!("stdin closed, stopping stdio transport");
    Ok(())
}

/// One raw line in, at most one response out; blank lines are skipped
async fn handle_line(handler: &RpcHandler, raw: &[u8]) -> Option<RpcResponse> {
    let text = match std::str::from_utf8(raw) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("Discarding stdin line that is not UTF-8: {}", e);
            return Some(RpcResponse::error(
                Value::Null,
                PARSE_ERROR,
                format!("Parse error: {}", e),
            ));
        }
    };

    let message = text.trim();
    if message.is_empty() {
        return None;
    }
    handler.handle_message(STDIO_SESSION_KEY, message).await
}
