// Transport utilities for the MCP server

use std::io;
use tracing::debug;

/// Validates stdio transport setup
pub fn validate_stdio_transport() -> io::Result<()> {
    debug!("Validating stdio transport setup");

    if atty::is(atty::Stream::Stdin) {
        debug!("Stdin is a terminal - this is expected in development mode");
        debug!("In production, the server expects stdio transport from an MCP client");
    } else {
        debug!("Stdio transport detected - ready for MCP communication");
    }

    Ok(())
}
