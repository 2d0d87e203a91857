use std::error::Error;

/// Boxed static error type
pub type Err = Box<dyn Error + 'static>;

/// Takes a list where each element is a set of choices, and returns all the possible sets
/// generated. Will clone the elements.
///
/// ```
/// let v = vec![
///   vec![1],
///   vec![2, 3],
///   vec![4],
/// ];
///
/// assert_eq!(ccg_chart::utils::combinations(&v), vec![
///   vec![1, 2, 4],
///   vec![1, 3, 4],
/// ]);
/// ```
pub fn combinations<T>(list: &[Vec<T>]) -> Vec<Vec<T>>
where
  T: Clone,
{
  match list.split_first() {
    None => Vec::new(),
    Some((head, [])) => head.iter().map(|e| vec![e.clone()]).collect(),
    Some((head, tail)) => combinations(tail)
      .into_iter()
      .flat_map(|subseq| {
        head.iter().map(move |v| {
          let mut newseq = Vec::with_capacity(subseq.len() + 1);
          newseq.push(v.clone());
          newseq.extend(subseq.iter().cloned());
          newseq
        })
      })
      .collect(),
  }
}

/// log(exp(a) + exp(b)), exact when either side is -inf
pub fn log_sum_exp(a: f64, b: f64) -> f64 {
  if a == f64::NEG_INFINITY {
    return b;
  }
  if b == f64::NEG_INFINITY {
    return a;
  }
  let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
  hi + (lo - hi).exp().ln_1p()
}

/// log(exp(a) - exp(b)) for `a >= b`. Equal sides give -inf.
pub fn log_diff_exp(a: f64, b: f64) -> f64 {
  debug_assert!(a >= b, "log_diff_exp({}, {}) of a negative difference", a, b);
  if b == f64::NEG_INFINITY {
    return a;
  }
  a + (-(b - a).exp_m1()).ln()
}

/// log-sum-exp over any number of terms. An empty iterator gives -inf.
pub fn log_sum_exp_all(values: impl IntoIterator<Item = f64>) -> f64 {
  let values = values.into_iter().collect::<Vec<_>>();
  let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
  if max.is_infinite() {
    return max;
  }
  max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
  }

  #[test]
  fn test_log_sum_exp() {
    assert!(close(log_sum_exp(0.0, 0.0), 2f64.ln()));
    assert_eq!(log_sum_exp(f64::NEG_INFINITY, -3.0), -3.0);
    assert_eq!(log_sum_exp(1.5, f64::NEG_INFINITY), 1.5);
    assert!(close(log_sum_exp(-1000.0, -1000.0), -1000.0 + 2f64.ln()));
  }

  #[test]
  fn test_log_diff_exp() {
    assert!(close(log_diff_exp(3f64.ln(), 1f64.ln()), 2f64.ln()));
    assert_eq!(log_diff_exp(-2.0, f64::NEG_INFINITY), -2.0);
    assert_eq!(log_diff_exp(0.5, 0.5), f64::NEG_INFINITY);
  }

  #[test]
  fn test_log_sum_exp_all() {
    assert_eq!(log_sum_exp_all(Vec::new()), f64::NEG_INFINITY);
    let v = [1.0, 2.0, 3.0];
    let expected = v.iter().map(|x: &f64| x.exp()).sum::<f64>().ln();
    assert!(close(log_sum_exp_all(v), expected));
  }

  #[test]
  fn test_combinations_empty_choice() {
    let v: Vec<Vec<u8>> = vec![vec![1, 2], vec![]];
    assert!(combinations(&v).is_empty());
  }
}
