//! The same jobs as the single-threaded parser, run on a worker pool. A span
//! is built in three phases: its lexical job and one job per split (in any
//! order), then its unary job once all of those are in. A finished span is
//! then paired with every finished neighbour to issue the split jobs of the
//! span covering both.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use parking_lot::Mutex;
use rayon::{Scope, ThreadPool, ThreadPoolBuilder};
use tracing::{debug, error, info, trace};

use crate::category::Semantics;
use crate::chart::SharedChart;
use crate::error::ParserError;
use crate::model::Model;
use crate::output::ParserOutput;
use crate::parser::core::{CkyCore, ParseContext, owned_tokens};
use crate::parser::{ParseOptions, Parser};

pub struct MultiCkyParser<M: Semantics> {
  core: CkyCore<M>,
  pool: Option<ThreadPool>,
  num_threads: usize,
}

impl<M: Semantics> MultiCkyParser<M> {
  pub(crate) fn new(core: CkyCore<M>, num_threads: usize, prefix: &str) -> Result<Self, ParserError> {
    let prefix = prefix.to_string();
    let pool = ThreadPoolBuilder::new()
      .num_threads(num_threads)
      .thread_name(move |idx| format!("{}-{}", prefix, idx))
      .build()?;
    info!(num_threads, "started parser worker pool");
    Ok(Self {
      core,
      pool: Some(pool),
      num_threads,
    })
  }

  pub fn num_threads(&self) -> usize {
    self.num_threads
  }

  pub fn beam(&self) -> usize {
    self.core.beam
  }

  /// Stop the workers. Later parses fail with [`ParserError::Shutdown`].
  pub fn shutdown(&mut self) {
    if self.pool.take().is_some() {
      info!("parser worker pool shut down");
    }
  }

  pub fn is_shutdown(&self) -> bool {
    self.pool.is_none()
  }
}

impl<M: Semantics> Parser<M> for MultiCkyParser<M> {
  fn parse_with(
    &self,
    tokens: &[&str],
    model: &dyn Model<M>,
    options: &ParseOptions<'_, M>,
  ) -> Result<ParserOutput<M>, ParserError> {
    let pool = self.pool.as_ref().ok_or(ParserError::Shutdown)?;
    let timer = Instant::now();
    let tokens = owned_tokens(tokens)?;
    let generated = self.core.generate_lexicons(&tokens, options.sloppy);
    let ctx = self.core.context(tokens, model, &generated, options)?;
    let chart = SharedChart::new(ctx.tokens.clone(), ctx.config);

    let scheduler = Scheduler::new(&self.core, &ctx, &chart);
    pool.scope(|scope| scheduler.start(scope));
    scheduler.finish()?;

    let chart = chart.into_chart();
    let elapsed = timer.elapsed();
    debug!(tokens = ctx.tokens.len(), cells = chart.iter().count(), ?elapsed, "parsed");
    Ok(ParserOutput::new(chart, elapsed))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Job {
  Lexical { start: usize, end: usize },
  Split { start: usize, end: usize, split: usize },
  Unary { start: usize, end: usize },
}

impl fmt::Display for Job {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Lexical { start, end } => write!(f, "lexical {}..{}", start, end),
      Self::Split { start, end, split } => write!(f, "split {}..{}/{}", start, end, split),
      Self::Unary { start, end } => write!(f, "unary {}..{}", start, end),
    }
  }
}

/// Work a span still waits on before its unary job can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Pending {
  Lexical,
  Split(usize),
}

/// Finished spans meeting at one token boundary: those ending at token `b`
/// and those starting at `b + 1`.
#[derive(Debug, Default)]
struct Boundary {
  /// Start of each finished span ending here
  ending: Vec<usize>,
  /// End of each finished span starting after here
  starting: Vec<usize>,
}

struct Scheduler<'a, M: Semantics> {
  core: &'a CkyCore<M>,
  ctx: &'a ParseContext<'a, M>,
  chart: &'a SharedChart<M>,
  /// Spans not finished yet, with what they're waiting on
  registry: Mutex<HashMap<(usize, usize), HashSet<Pending>>>,
  boundaries: Vec<Mutex<Boundary>>,
  failure: Mutex<Option<String>>,
}

impl<'a, M: Semantics> Scheduler<'a, M> {
  fn new(core: &'a CkyCore<M>, ctx: &'a ParseContext<'a, M>, chart: &'a SharedChart<M>) -> Self {
    let n = chart.sentence_len();
    let mut registry = HashMap::new();
    for start in 0..n {
      for end in start..n {
        let mut pending = HashSet::new();
        pending.insert(Pending::Lexical);
        pending.extend((0..end - start).map(Pending::Split));
        registry.insert((start, end), pending);
      }
    }
    Self {
      core,
      ctx,
      chart,
      registry: Mutex::new(registry),
      boundaries: (0..n.saturating_sub(1)).map(|_| Mutex::default()).collect(),
      failure: Mutex::new(None),
    }
  }

  /// Every span's lexical job is ready from the start
  fn start<'s>(&'s self, scope: &Scope<'s>) {
    let n = self.chart.sentence_len();
    for start in 0..n {
      for end in start..n {
        self.spawn(scope, Job::Lexical { start, end });
      }
    }
  }

  fn spawn<'s>(&'s self, scope: &Scope<'s>, job: Job) {
    trace!(%job, "issued");
    scope.spawn(move |scope| self.run(scope, job));
  }

  fn run<'s>(&'s self, scope: &Scope<'s>, job: Job) {
    if self.failure.lock().is_some() {
      return;
    }
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
      self.execute(job);
      self.complete(scope, job);
    }));
    if let Err(payload) = outcome {
      let message = panic_message(payload.as_ref());
      error!(%job, %message, "parse job failed");
      self
        .failure
        .lock()
        .get_or_insert_with(|| format!("{}: {}", job, message));
    }
  }

  fn execute(&self, job: Job) {
    match job {
      Job::Lexical { start, end } => self.core.lexical_job(self.ctx, self.chart, start, end),
      Job::Split { start, end, split } => self.core.split_job(self.ctx, self.chart, start, end, split),
      Job::Unary { start, end } => self.core.unary_job(self.ctx, self.chart, start, end),
    }
  }

  fn complete<'s>(&'s self, scope: &Scope<'s>, job: Job) {
    match job {
      Job::Lexical { start, end } => self.resolve(scope, start, end, Pending::Lexical),
      Job::Split { start, end, split } => self.resolve(scope, start, end, Pending::Split(split)),
      Job::Unary { start, end } => {
        let remaining = {
          let mut registry = self.registry.lock();
          let pending = registry.remove(&(start, end));
          assert!(
            pending.is_some_and(|p| p.is_empty()),
            "span {}..{} finished out of turn",
            start,
            end
          );
          registry.len()
        };
        debug!(start, end, remaining, "span complete");
        self.connect(scope, start, end);
      }
    }
  }

  /// Tick off one of a span's jobs, issuing its unary job after the last one
  fn resolve<'s>(&'s self, scope: &Scope<'s>, start: usize, end: usize, done: Pending) {
    let ready = {
      let mut registry = self.registry.lock();
      let pending = registry
        .get_mut(&(start, end))
        .unwrap_or_else(|| panic!("span {}..{} isn't registered", start, end));
      assert!(
        pending.remove(&done),
        "{:?} for span {}..{} wasn't pending",
        done,
        start,
        end
      );
      pending.is_empty()
    };
    if ready {
      self.spawn(scope, Job::Unary { start, end });
    }
  }

  /// Record a finished span at both of its boundaries and issue a split job
  /// for each finished neighbour found there. Recording and scanning happen
  /// under the boundary's lock, so of two neighbours finishing concurrently
  /// exactly one sees the other.
  fn connect<'s>(&'s self, scope: &Scope<'s>, start: usize, end: usize) {
    let mut jobs = Vec::new();
    if let Some(boundary) = self.boundaries.get(end) {
      let mut boundary = boundary.lock();
      boundary.ending.push(start);
      jobs.extend(boundary.starting.iter().map(|&right_end| Job::Split {
        start,
        end: right_end,
        split: end - start,
      }));
    }
    if start > 0 {
      let mut boundary = self.boundaries[start - 1].lock();
      boundary.starting.push(end);
      jobs.extend(boundary.ending.iter().map(|&left_start| Job::Split {
        start: left_start,
        end,
        split: start - 1 - left_start,
      }));
    }
    for job in jobs {
      self.spawn(scope, job);
    }
  }

  /// After the pool drained: the first failure, if any job failed
  fn finish(&self) -> Result<(), ParserError> {
    if let Some(message) = self.failure.lock().take() {
      return Err(ParserError::JobFailed(message));
    }
    let registry = self.registry.lock();
    assert!(registry.is_empty(), "{} spans never finished", registry.len());
    Ok(())
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    message.to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "unknown panic".to_string()
  }
}
