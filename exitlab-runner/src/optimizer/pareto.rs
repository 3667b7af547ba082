//! Pareto frontier over primary and secondary objectives.

use super::OptimizationResult;

/// `a` dominates `b`: strictly better primary and no worse on any secondary.
pub fn dominates(a: &OptimizationResult, b: &OptimizationResult) -> bool {
    match (a.objective, b.objective) {
        (Some(pa), Some(pb)) => {
            pa > pb
                && a
                    .secondary
                    .iter()
                    .zip(&b.secondary)
                    .all(|(sa, sb)| sa >= sb)
        }
        _ => false,
    }
}

/// Successful results no other successful result dominates, best primary first.
pub fn pareto_frontier(results: &[OptimizationResult]) -> Vec<OptimizationResult> {
    let candidates: Vec<&OptimizationResult> =
        results.iter().filter(|r| r.is_success()).collect();
    let mut frontier: Vec<OptimizationResult> = candidates
        .iter()
        .filter(|r| !candidates.iter().any(|other| dominates(other, r)))
        .map(|r| (*r).clone())
        .collect();
    super::sort_by_objective(&mut frontier);
    frontier
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, primary: f64, secondary: &[f64]) -> OptimizationResult {
        OptimizationResult {
            combination_id: id.to_string(),
            objective: Some(primary),
            secondary: secondary.to_vec(),
            ..OptimizationResult::default()
        }
    }

    #[test]
    fn trade_off_keeps_both() {
        // GIVEN A has higher primary but lower secondary than B
        let a = result("a", 120.0, &[0.4]);
        let b = result("b", 80.0, &[0.7]);

        // THEN neither dominates and both are on the frontier
        assert!(!dominates(&a, &b));
        assert!(!dominates(&b, &a));
        let frontier = pareto_frontier(&[a, b]);
        let ids: Vec<&str> = frontier.iter().map(|r| r.combination_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn dominated_result_is_dropped() {
        let a = result("a", 120.0, &[0.7, 3.0]);
        let b = result("b", 80.0, &[0.7, 2.0]);
        let c = result("c", 60.0, &[0.9, 1.0]);
        assert!(dominates(&a, &b));
        let frontier = pareto_frontier(&[b, a, c]);
        let ids: Vec<&str> = frontier.iter().map(|r| r.combination_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn equal_primary_never_dominates() {
        let a = result("a", 100.0, &[0.9]);
        let b = result("b", 100.0, &[0.1]);
        assert!(!dominates(&a, &b));
        assert_eq!(pareto_frontier(&[a, b]).len(), 2);
    }

    #[test]
    fn failures_are_excluded() {
        let failed = OptimizationResult {
            combination_id: "bad".into(),
            error: Some("invalid strategy".into()),
            ..OptimizationResult::default()
        };
        let ok = result("ok", 1.0, &[1.0]);
        let frontier = pareto_frontier(&[failed, ok]);
        assert_eq!(frontier.len(), 1);
        assert_eq!(frontier[0].combination_id, "ok");
    }
}
