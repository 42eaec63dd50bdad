// process_data BLOB: [version: u8][wincode Vec<ProcessSample>].

use crate::models::ProcessSample;

pub(super) const PROCESS_BLOB_VERSION: u8 = 1;

pub(super) fn encode_processes(processes: &[ProcessSample]) -> anyhow::Result<Vec<u8>> {
    let payload = wincode::serialize(&processes.to_vec())
        .map_err(|e| anyhow::anyhow!("wincode processes: {}", e))?;
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(PROCESS_BLOB_VERSION);
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decodes a process blob; an empty, unknown-version or corrupt blob yields an empty list.
pub(super) fn decode_processes(bytes: &[u8]) -> Vec<ProcessSample> {
    match bytes.split_first() {
        None => vec![],
        Some((&PROCESS_BLOB_VERSION, payload)) => {
            wincode::deserialize(payload).unwrap_or_else(|e| {
                tracing::debug!(error = %e, "wincode deserialize processes (corrupt), using empty");
                vec![]
            })
        }
        Some((version, _)) => {
            tracing::debug!(version, "unknown process blob version, using empty");
            vec![]
        }
    }
}
