use criterion::{Criterion, black_box, criterion_group, criterion_main};

use ccg_chart::category::{Syntax, Term};
use ccg_chart::lexicon::Lexicon;
use ccg_chart::model::{LinearModel, Model};
use ccg_chart::rules::{BackwardApplication, BackwardComposition, ForwardApplication, ForwardComposition, TypeShift};
use ccg_chart::{Parser, ParserBuilder};

const LEXICON_SRC: &str = include_str!("../demos/toy.lex");

fn builder() -> ParserBuilder<Term> {
  ParserBuilder::new()
    .add_binary_rule(ForwardApplication::new())
    .add_binary_rule(BackwardApplication::new())
    .add_binary_rule(ForwardComposition::new())
    .add_binary_rule(BackwardComposition::new())
    .add_unary_rule(TypeShift::new("shift", Syntax::atom("N"), Syntax::atom("NP")))
}

fn parse(parser: &dyn Parser<Term>, model: &dyn Model<Term>, input: &[&str]) -> usize {
  parser.parse(input, model).unwrap().all_derivations().len()
}

fn criterion_benchmark(c: &mut Criterion) {
  let lexicon = LEXICON_SRC.parse::<Lexicon<Term>>().unwrap();
  let model = LinearModel::with_default_features(lexicon);
  let single = builder().build().unwrap();
  let multi = builder().num_threads(4).build_multi().unwrap();

  let simple_input = "the dog barks".split(' ').collect::<Vec<_>>();
  let complex_input = "the old man saw the dog with a telescope in the park"
    .split(' ')
    .collect::<Vec<_>>();

  c.bench_function("single simple", |b| {
    b.iter(|| parse(black_box(&single), &model, black_box(&simple_input)))
  });
  c.bench_function("multi simple", |b| {
    b.iter(|| parse(black_box(&multi), &model, black_box(&simple_input)))
  });
  c.bench_function("single attachment", |b| {
    b.iter(|| parse(black_box(&single), &model, black_box(&complex_input)))
  });
  c.bench_function("multi attachment", |b| {
    b.iter(|| parse(black_box(&multi), &model, black_box(&complex_input)))
  });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
