//! Line input for the chat client

use crate::node::{Node, NodeError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, error};

/// Append every line from `reader` to the node's own log.
///
/// Returns the number of lines written once the input is exhausted or the
/// node stops. A line that cannot be written is logged and skipped; a read
/// failure ends forwarding and is returned to the caller.
pub async fn forward_lines<R>(node: &Node, reader: R) -> std::io::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut written = 0;
    while let Some(line) = lines.next_line().await? {
        match node.write(&line).await {
            Ok(_) => written += 1,
            Err(NodeError::Shutdown) => {
                debug!("Node stopped, no longer reading input");
                return Ok(written);
            }
            Err(e) => error!("Failed to write message: {}", e),
        }
    }
    debug!("Input exhausted after {} lines", written);
    Ok(written)
}
