use fleet_client::{ErrorKind, FleetError};

#[derive(Debug, thiserror::Error)]
pub enum DbError {
  #[error("not found")]
  NotFound,
  #[error("version conflict: expected {expected}, row is at {actual}")]
  VersionConflict { expected: i64, actual: i64 },
  #[error(transparent)]
  Query(#[from] sqlx::Error),
}

impl DbError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      DbError::NotFound => ErrorKind::Internal,
      DbError::VersionConflict { .. } => ErrorKind::Internal,
      DbError::Query(_) => ErrorKind::Internal,
    }
  }
}

pub type DbResult<T> = Result<T, DbError>;

impl From<DbError> for FleetError {
  fn from(e: DbError) -> Self {
    let kind = e.kind();
    FleetError::new(kind, e)
  }
}
