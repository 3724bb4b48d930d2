use crate::backup;
use crate::db;
use crate::gateway::FileGateway;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::require_capability;
use crate::ipc::types::{AppState, Request};
use crate::roles::Capability;
use serde_json::json;
use std::path::PathBuf;

fn resolve_workspace(state: &AppState, req: &Request) -> Option<PathBuf> {
    req.params
        .get("workspacePath")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone())
}

fn handle_export_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_capability(&req.params, Capability::ExportBackup, "export backups") {
        return e.response(&req.id);
    }
    let Some(workspace) = resolve_workspace(state, req) else {
        return err(&req.id, "bad_params", "missing workspacePath", None);
    };
    let out_path = match req.params.get("outPath").and_then(|v| v.as_str()) {
        Some(v) => PathBuf::from(v),
        None => return err(&req.id, "bad_params", "missing outPath", None),
    };

    match backup::export_workspace_bundle(&workspace, &out_path) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "bundleFormat": summary.bundle_format,
                "outPath": out_path.to_string_lossy(),
                "rowCounts": {
                    "fees": summary.fee_count,
                    "payments": summary.payment_count,
                    "ledgerTransactions": summary.ledger_count,
                }
            }),
        ),
        Err(e) => err(&req.id, "backup_export_failed", format!("{e:?}"), None),
    }
}

fn handle_import_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_capability(&req.params, Capability::ExportBackup, "import backups") {
        return e.response(&req.id);
    }
    let Some(workspace) = resolve_workspace(state, req) else {
        return err(&req.id, "bad_params", "missing workspacePath", None);
    };
    let in_path = match req.params.get("inPath").and_then(|v| v.as_str()) {
        Some(v) => PathBuf::from(v),
        None => return err(&req.id, "bad_params", "missing inPath", None),
    };

    // The live connection holds the file we are about to replace; drop it
    // for the duration of the restore.
    let previous = state.workspace.clone();
    let had_open_db = state.db.take().is_some();

    let summary = match backup::import_workspace_bundle(&in_path, &workspace) {
        Ok(s) => s,
        Err(e) => {
            if had_open_db {
                if let Some(prev) = previous.as_ref() {
                    state.db = db::open_db(prev).ok();
                }
            }
            return err(&req.id, "backup_import_failed", format!("{e:?}"), None);
        }
    };

    match db::open_db(&workspace) {
        Ok(conn) => {
            state.workspace = Some(workspace.clone());
            state.gateway = Some(Box::new(FileGateway::new(&workspace)));
            state.db = Some(conn);
            ok(
                &req.id,
                json!({
                    "bundleFormat": summary.bundle_format_detected,
                    "workspacePath": workspace.to_string_lossy()
                }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportWorkspaceBundle" => Some(handle_export_bundle(state, req)),
        "backup.importWorkspaceBundle" => Some(handle_import_bundle(state, req)),
        _ => None,
    }
}
