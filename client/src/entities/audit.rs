use serde::{Deserialize, Serialize};

pub type AuditId = i64;

/// Append-only record of an operator action. Entries are written
/// before the corresponding state change commits, so a crash
/// mid-change leaves the audit log ahead of reality rather than
/// behind it. Never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
  pub id: AuditId,
  pub actor: String,
  pub action: String,
  pub detail: serde_json::Value,
  pub source_addr: Option<String>,
  pub ts: i64,
}
