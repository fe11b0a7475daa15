//! Process worker loop: one JSON [`WorkerEnvelope`] per input line, one
//! JSON [`WorkerReply`] per output line.

use std::io::{BufRead, Write};

use anyhow::Result;
use preview_protocol::{SandboxFailure, SandboxResponse, WorkerEnvelope, WorkerReply};
use tracing::{debug, warn};

use crate::handler::handle_request;

/// Serves requests until `reader` reaches end of input.
pub fn serve(reader: impl BufRead, mut writer: impl Write) -> Result<()> {
    let mut served = 0_u64;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<WorkerEnvelope>(&line) {
            Ok(envelope) => WorkerReply {
                id: envelope.id,
                response: handle_request(envelope.request),
            },
            Err(error) => {
                warn!(%error, "malformed sandbox request");
                WorkerReply {
                    id: envelope_id(&line),
                    response: SandboxResponse::Failure(SandboxFailure::tool(format!(
                        "malformed sandbox request: {error}"
                    ))),
                }
            }
        };
        serde_json::to_writer(&mut writer, &reply)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        served += 1;
    }
    debug!(served, "sandbox worker input closed");
    Ok(())
}

fn envelope_id(line: &str) -> u64 {
    serde_json::from_str::<serde_json::Value>(line)
        .ok()
        .and_then(|value| value.get("id").and_then(serde_json::Value::as_u64))
        .unwrap_or(0)
}
