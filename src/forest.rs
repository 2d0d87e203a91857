//! Unpacking trees from the chart. The packed forest keeps every tree a cell
//! stands for implicitly; these walks make them explicit, either the first
//! Viterbi tree or all of them (exponential, for debugging and checking
//! chart scores by brute force).

use std::collections::HashMap;
use std::fmt;

use crate::category::{Category, Semantics};
use crate::chart::{CellId, Chart, Step};
use crate::model::FeatureVector;
use crate::rules::RuleName;
use crate::syntree::{Constituent, SynTree, Word};
use crate::utils::combinations;

/// A node of a derivation tree: the category built and the rule that built it
#[derive(Debug, Clone, PartialEq)]
pub struct DerivationNode<M> {
  pub rule: RuleName,
  pub category: Category<M>,
}

impl<M: fmt::Display> fmt::Display for DerivationNode<M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} [{}]", self.category, self.rule)
  }
}

pub type DerivationTree<M> = SynTree<DerivationNode<M>, String>;

/// One fully unpacked tree with its total score and summed features
#[derive(Debug, Clone)]
pub struct ScoredTree<M> {
  pub tree: DerivationTree<M>,
  pub score: f64,
  pub features: FeatureVector,
}

/// The tree for `step` given trees for its children. Overloaded steps unfold
/// into the base rule's node under the unary rule's node.
fn step_tree<M: Semantics>(step: &Step<M>, children: Vec<DerivationTree<M>>) -> DerivationTree<M> {
  let span = step.span();
  let children = match step.entry() {
    Some(entry) => vec![SynTree::Leaf(Word {
      value: entry.tokens.join(" "),
      span,
    })],
    None => children,
  };

  let rule = step.rule();
  match (rule.unary(), step.intermediate()) {
    (Some(unary), Some(intermediate)) => {
      let inner = SynTree::Branch(
        Constituent {
          value: DerivationNode {
            rule: rule.base(),
            category: intermediate.clone(),
          },
          span,
        },
        children,
      );
      SynTree::Branch(
        Constituent {
          value: DerivationNode {
            rule: unary.clone(),
            category: step.root().clone(),
          },
          span,
        },
        vec![inner],
      )
    }
    _ => SynTree::Branch(
      Constituent {
        value: DerivationNode {
          rule: rule.clone(),
          category: step.root().clone(),
        },
        span,
      },
      children,
    ),
  }
}

/// The Viterbi tree of a cell, taking the first Viterbi step at every node
pub fn viterbi_tree<M: Semantics>(chart: &Chart<M>, id: CellId) -> Option<DerivationTree<M>> {
  let cell = chart.cell(id);
  let step = cell.viterbi_steps().next()?;
  let children = step
    .children()
    .iter()
    .map(|child| viterbi_tree(chart, *child))
    .collect::<Option<Vec<_>>>()?;
  Some(step_tree(step, children))
}

/// Every tree packed in a cell
pub fn all_trees<M: Semantics>(chart: &Chart<M>, id: CellId) -> Vec<ScoredTree<M>> {
  let mut memo = HashMap::new();
  all_trees_memo(chart, id, &mut memo)
}

fn all_trees_memo<M: Semantics>(
  chart: &Chart<M>,
  id: CellId,
  memo: &mut HashMap<CellId, Vec<ScoredTree<M>>>,
) -> Vec<ScoredTree<M>> {
  if let Some(trees) = memo.get(&id) {
    return trees.clone();
  }

  let mut trees = Vec::new();
  for step in chart.cell(id).steps() {
    let child_trees = step
      .children()
      .iter()
      .map(|child| all_trees_memo(chart, *child, memo))
      .collect::<Vec<_>>();

    let choices = if child_trees.is_empty() {
      vec![Vec::new()]
    } else {
      combinations(&child_trees)
    };
    for choice in choices {
      let mut features = step.features().clone();
      let mut score = step.local_score();
      for child in choice.iter() {
        child.features.add_times_into(1.0, &mut features);
        score += child.score;
      }
      let tree = step_tree(step, choice.into_iter().map(|c| c.tree).collect());
      trees.push(ScoredTree { tree, score, features });
    }
  }

  memo.insert(id, trees.clone());
  trees
}
