use tokio::io::{AsyncRead, AsyncReadExt};

use crate::core::EngineResult;
use crate::runtime::ToolUseRequest;

/// Read a JSON array of tool-use requests without blocking the runtime
pub async fn read_requests<R>(mut reader: R) -> EngineResult<Vec<ToolUseRequest>>
where
    R: AsyncRead + Unpin,
{
    let mut contents = String::new();
    reader.read_to_string(&mut contents).await?;
    Ok(serde_json::from_str(&contents)?)
}
