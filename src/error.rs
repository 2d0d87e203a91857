use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParserError {
  #[error("beam size must be positive")]
  InvalidBeam,
  #[error("need at least one worker thread")]
  InvalidThreads,
  #[error("rule `{0}` registered twice")]
  DuplicateRule(String),
  #[error("couldn't start worker pool: {0}")]
  ThreadPool(#[from] rayon::ThreadPoolBuildError),
  #[error("can't parse an empty sentence")]
  EmptyInput,
  #[error("parse job failed: {0}")]
  JobFailed(String),
  #[error("parser has been shut down")]
  Shutdown,
}
