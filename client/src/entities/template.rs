use serde::{Deserialize, Serialize};

use super::ServiceKind;

pub type TemplateId = i64;

/// Named, reusable installer configuration blob. Resolved by
/// copy-on-use into a [`super::task::DeploymentTask`] or
/// [`super::cron::CronJob`] at creation time; later edits to the
/// template never retroactively change a task that already
/// captured it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationTemplate {
  pub id: TemplateId,
  pub label: String,
  pub service_kind: ServiceKind,
  pub config: serde_json::Value,
  pub description: Option<String>,
}
