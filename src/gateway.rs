use std::path::{Path, PathBuf};

pub const VERIFICATIONS_FILE: &str = "gateway-verifications.json";

#[derive(Debug, Clone)]
pub struct Verification {
    pub status: String,
    pub amount_minor: i64,
}

impl Verification {
    pub fn is_successful(&self) -> bool {
        self.status == "success"
    }
}

/// Payment gateway boundary: resolve a transaction reference to its settled
/// status and amount. A failed resolution is fatal to the payment path.
pub trait GatewayVerifier {
    fn verify(&self, reference: &str) -> anyhow::Result<Verification>;
}

/// Workspace-file-backed verifier. The hosted gateway posts settlement data
/// out-of-band into `gateway-verifications.json`; this reads it fresh on
/// every call so an updated file is picked up without a restart.
pub struct FileGateway {
    workspace: PathBuf,
}

impl FileGateway {
    pub fn new(workspace: &Path) -> FileGateway {
        FileGateway {
            workspace: workspace.to_path_buf(),
        }
    }
}

impl GatewayVerifier for FileGateway {
    fn verify(&self, reference: &str) -> anyhow::Result<Verification> {
        let path = self.workspace.join(VERIFICATIONS_FILE);
        let text = std::fs::read_to_string(&path).map_err(|e| {
            anyhow::anyhow!(
                "gateway verification source unavailable ({}): {}",
                path.to_string_lossy(),
                e
            )
        })?;
        let doc: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| anyhow::anyhow!("gateway verification source is invalid JSON: {}", e))?;
        let entry = doc
            .get(reference)
            .ok_or_else(|| anyhow::anyhow!("unknown transaction reference: {}", reference))?;
        let status = entry
            .get("status")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        let amount_minor = entry
            .get("amountMinorUnits")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        Ok(Verification {
            status,
            amount_minor,
        })
    }
}
