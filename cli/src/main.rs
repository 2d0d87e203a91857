use std::io;
use std::io::Write;
use std::path::PathBuf;

use clap::Parser as _;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ccg_chart::category::{Syntax, Term};
use ccg_chart::forest::DerivationTree;
use ccg_chart::model::LinearModel;
use ccg_chart::normal_form::{CompositionConstraint, NormalFormValidator};
use ccg_chart::parse_lexicon::read_lexicon;
use ccg_chart::rules::{
  BackwardApplication, BackwardComposition, Direction, ForwardApplication, ForwardComposition, Skipping, TypeShift,
};
use ccg_chart::{Err, Parser, ParserBuilder, ParserOutput};

/// Parse sentences read from stdin against a CCG lexicon
#[derive(Debug, clap::Parser)]
#[command(name = "ccg-chart")]
struct Args {
  /// Lexicon file, one `tokens :- category [: semantics] [{origin}]` per line
  lexicon: PathBuf,

  /// Print the parse chart
  #[arg(short, long)]
  chart: bool,

  /// Print every tree packed under each derivation instead of the Viterbi tree
  #[arg(short, long)]
  trees: bool,

  /// Label tree nodes with their syntactic category only
  #[arg(short, long)]
  syntax: bool,

  /// Maximum number of cells per span
  #[arg(short, long, default_value_t = ParserBuilder::<Term>::DEFAULT_BEAM)]
  beam: usize,

  /// Worker threads; parse on the main thread if not given
  #[arg(short = 'j', long)]
  threads: Option<usize>,
}

fn builder() -> ParserBuilder<Term> {
  ParserBuilder::new()
    .add_binary_rule(ForwardApplication::new())
    .add_binary_rule(BackwardApplication::new())
    .add_binary_rule(ForwardComposition::new())
    .add_binary_rule(BackwardComposition::new())
    .add_binary_rule(Skipping::new(Direction::Forward))
    .add_binary_rule(Skipping::new(Direction::Backward))
    .add_unary_rule(TypeShift::new("shift", Syntax::atom("N"), Syntax::atom("NP")))
    .normal_form(NormalFormValidator::builder().add_constraint(CompositionConstraint::new()).build())
}

fn render(tree: &DerivationTree<Term>, syntax_only: bool) -> String {
  if syntax_only {
    tree.map(&|node| node.value.category.syntax.to_string(), &|word| word.value.clone()).to_string()
  } else {
    tree.to_string()
  }
}

fn print_output(output: &ParserOutput<Term>, opts: &Args) {
  if opts.chart {
    println!("chart:\n{}\n", output.chart());
  }

  let derivations = output.best_derivations();
  println!(
    "Parsed {} tree{} in {:?}{}",
    derivations.len(),
    if derivations.len() == 1 { "" } else { "s" },
    output.parsing_time(),
    if output.is_exact() { "" } else { " (pruned)" }
  );

  for derivation in derivations {
    println!(
      "{} score={} parses={}",
      derivation,
      derivation.score(),
      derivation.num_parses()
    );
    if opts.trees {
      for scored in derivation.trees() {
        println!("{}\nscore={}\n", render(&scored.tree, opts.syntax), scored.score);
      }
    } else if let Some(tree) = derivation.viterbi_tree() {
      println!("{}", render(&tree, opts.syntax));
    }
    println!();
  }
}

fn main() -> Result<(), Err> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(io::stderr)
    .init();

  let opts = Args::parse();
  let lexicon = read_lexicon(&opts.lexicon)?;
  info!(path = %opts.lexicon.display(), entries = lexicon.len(), "loaded lexicon");
  let model = LinearModel::with_default_features(lexicon);
  let builder = builder().beam(opts.beam);
  let parser: Box<dyn Parser<Term>> = match opts.threads {
    Some(threads) => Box::new(builder.num_threads(threads).build_multi()?),
    None => Box::new(builder.build()?),
  };

  let mut input = String::new();
  loop {
    print!("> ");
    io::stdout().flush()?;

    match io::stdin().read_line(&mut input) {
      Ok(_) => {
        if input.is_empty() {
          // ctrl+d
          return Ok(());
        }
        input.make_ascii_lowercase();
        let sentence = input.split_whitespace().collect::<Vec<_>>();
        if !sentence.is_empty() {
          match parser.parse(&sentence, &model) {
            Ok(output) => print_output(&output, &opts),
            Err(error) => eprintln!("error: {}", error),
          }
        }
        input.clear();
      }
      Err(error) => return Err(error.into()),
    }
  }
}
