use std::time::Instant;

use tracing::debug;

use crate::category::Semantics;
use crate::chart::SharedChart;
use crate::error::ParserError;
use crate::model::Model;
use crate::output::ParserOutput;
use crate::parser::core::{CkyCore, owned_tokens};
use crate::parser::{ParseOptions, Parser};

/// Fills the chart on the calling thread, shortest spans first. Each span gets
/// its lexical cells, then every split, then the unary pass.
pub struct CkyParser<M: Semantics> {
  core: CkyCore<M>,
}

impl<M: Semantics> CkyParser<M> {
  pub(crate) fn new(core: CkyCore<M>) -> Self {
    Self { core }
  }

  pub fn beam(&self) -> usize {
    self.core.beam
  }
}

impl<M: Semantics> Parser<M> for CkyParser<M> {
  fn parse_with(
    &self,
    tokens: &[&str],
    model: &dyn Model<M>,
    options: &ParseOptions<'_, M>,
  ) -> Result<ParserOutput<M>, ParserError> {
    let timer = Instant::now();
    let tokens = owned_tokens(tokens)?;
    let generated = self.core.generate_lexicons(&tokens, options.sloppy);
    let ctx = self.core.context(tokens, model, &generated, options)?;
    let chart = SharedChart::new(ctx.tokens.clone(), ctx.config);

    let n = ctx.tokens.len();
    for len in 0..n {
      for begin in 0..n - len {
        let end = begin + len;
        self.core.lexical_job(&ctx, &chart, begin, end);
        for split in 0..len {
          self.core.split_job(&ctx, &chart, begin, end, split);
        }
        self.core.unary_job(&ctx, &chart, begin, end);
      }
    }

    let chart = chart.into_chart();
    let elapsed = timer.elapsed();
    debug!(tokens = n, cells = chart.iter().count(), ?elapsed, "parsed");
    Ok(ParserOutput::new(chart, elapsed))
  }
}
