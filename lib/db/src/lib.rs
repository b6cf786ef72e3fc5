pub mod client;
pub mod error;
pub mod repositories;

pub use client::connect;
pub use error::{DbError, DbResult};
pub use repositories::{
  alert::AlertRepository, audit::AuditRepository, cron::CronRepository,
  domain::DomainRepository, host::{HostRepository, PlacementWeights}, placement::PlacementRepository,
  scan::ScanRepository, task::TaskRepository, template::TemplateRepository,
};
