//! Reporting and export — JSON, CSV, and Markdown artifact generation.
//!
//! - **JSON**: simulation traces and full optimization summaries
//! - **CSV**: comparison tables, exit tapes, optimizer rankings, metric
//!   comparison, Pareto frontier, parameter sensitivity
//! - **Markdown**: human-readable optimization report
//!
//! `save_optimization_artifacts` writes the whole set into one run directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use exitlab_core::engine::SimulationResult;

use crate::comparator::ComparisonResult;
use crate::optimizer::{OptimizationResult, OptimizationSummary};

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_simulation_json(result: &SimulationResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize SimulationResult to JSON")
}

pub fn export_summary_json(summary: &OptimizationSummary) -> Result<String> {
    serde_json::to_string_pretty(summary)
        .context("failed to serialize OptimizationSummary to JSON")
}

pub fn import_summary_json(json: &str) -> Result<OptimizationSummary> {
    serde_json::from_str(json).context("failed to deserialize OptimizationSummary from JSON")
}

// ─── CSV export ─────────────────────────────────────────────────────

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

fn opt_f64(value: Option<f64>) -> String {
    value.map_or_else(String::new, |v| format!("{:.4}", v))
}

/// One row per strategy in a comparison.
///
/// Columns: position_id, strategy_id, strategy_name, simulated_pnl_pct,
/// realized_pnl_pct, unrealized_pnl_pct, actual_pnl_pct, delta_pct, exits,
/// remaining_percentage, peak_price, closed_at, is_best
pub fn export_comparison_csv(comparison: &ComparisonResult) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "position_id",
        "strategy_id",
        "strategy_name",
        "simulated_pnl_pct",
        "realized_pnl_pct",
        "unrealized_pnl_pct",
        "actual_pnl_pct",
        "delta_pct",
        "exits",
        "remaining_percentage",
        "peak_price",
        "closed_at",
        "is_best",
    ])?;

    for row in &comparison.rows {
        let r = &row.result;
        wtr.write_record([
            comparison.position_id.as_str(),
            r.strategy_id.as_str(),
            &r.strategy_name,
            &format!("{:.4}", r.simulated_pnl_pct),
            &format!("{:.4}", r.realized_pnl_pct),
            &format!("{:.4}", r.unrealized_pnl_pct),
            &r.actual_pnl_pct.map_or_else(String::new, |v| format!("{:.4}", v)),
            &r.delta_pct.map_or_else(String::new, |v| format!("{:.4}", v)),
            &r.exits.len().to_string(),
            &format!("{:.4}", r.remaining_percentage),
            &r.peak_price.to_string(),
            &r.closed_at.map_or_else(String::new, |t| t.to_rfc3339()),
            &row.is_best.to_string(),
        ])?;
    }
    finish(wtr)
}

/// Exit tape of one simulation.
pub fn export_exits_csv(result: &SimulationResult) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "tick_index",
        "timestamp",
        "reason",
        "level_index",
        "trigger_price",
        "sell_percentage",
        "pnl_contribution_pct",
    ])?;
    for e in &result.exits {
        wtr.write_record([
            e.tick_index.to_string().as_str(),
            &e.timestamp.to_rfc3339(),
            e.decision.reason.as_str(),
            &e.decision
                .level_index
                .map_or_else(String::new, |i| i.to_string()),
            &e.decision.trigger_price.to_string(),
            &e.decision.sell_percentage.to_string(),
            &format!("{:.4}", e.pnl_contribution_pct),
        ])?;
    }
    finish(wtr)
}

/// Parameter names present in any result, in name order.
fn parameter_columns<'a>(results: impl IntoIterator<Item = &'a OptimizationResult>) -> Vec<String> {
    let mut names: Vec<String> = results
        .into_iter()
        .flat_map(|r| r.parameters.keys().cloned())
        .collect();
    names.sort();
    names.dedup();
    names
}

fn parameter_cells(result: &OptimizationResult, columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .map(|c| {
            result
                .parameters
                .get(c)
                .map_or_else(String::new, |v| v.to_string())
        })
        .collect()
}

/// Successful results best first, then failures with their error.
///
/// Columns: rank, combination_id, one per parameter, objective, error
pub fn export_rankings_csv(summary: &OptimizationSummary) -> Result<String> {
    let columns = parameter_columns(&summary.results);
    let mut wtr = csv::Writer::from_writer(vec![]);

    let mut header = vec!["rank".to_string(), "combination_id".to_string()];
    header.extend(columns.iter().cloned());
    header.push(summary.objective.to_string());
    header.push("error".to_string());
    wtr.write_record(&header)?;

    for (rank, r) in summary.ranked().into_iter().enumerate() {
        let mut record = vec![(rank + 1).to_string(), r.combination_id.clone()];
        record.extend(parameter_cells(r, &columns));
        record.push(opt_f64(r.objective));
        record.push(String::new());
        wtr.write_record(&record)?;
    }
    for r in summary.failures() {
        let mut record = vec![String::new(), r.combination_id.clone()];
        record.extend(parameter_cells(r, &columns));
        record.push(String::new());
        record.push(r.error.clone().unwrap_or_default());
        wtr.write_record(&record)?;
    }
    finish(wtr)
}

/// Every aggregate metric for each successful combination, best first.
pub fn export_metric_comparison_csv(summary: &OptimizationSummary) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "combination_id",
        "positions",
        "total_pnl_pct",
        "avg_pnl_pct",
        "median_pnl_pct",
        "win_rate",
        "profit_factor",
        "best_pnl_pct",
        "worst_pnl_pct",
        "avg_hold_hours",
        "closed_rate",
        "avg_capture_pct",
        "avg_delta_pct",
    ])?;
    for r in summary.ranked() {
        let Some(m) = &r.metrics else { continue };
        wtr.write_record([
            &r.combination_id,
            &m.positions.to_string(),
            &format!("{:.4}", m.total_pnl_pct),
            &format!("{:.4}", m.avg_pnl_pct),
            &format!("{:.4}", m.median_pnl_pct),
            &format!("{:.4}", m.win_rate),
            &format!("{:.4}", m.profit_factor),
            &format!("{:.4}", m.best_pnl_pct),
            &format!("{:.4}", m.worst_pnl_pct),
            &format!("{:.2}", m.avg_hold_hours),
            &format!("{:.4}", m.closed_rate),
            &format!("{:.2}", m.avg_capture_pct),
            &opt_f64(m.avg_delta_pct),
        ])?;
    }
    finish(wtr)
}

/// Columns: combination_id, one per parameter, primary, one per secondary
pub fn export_pareto_csv(summary: &OptimizationSummary) -> Result<String> {
    let columns = parameter_columns(&summary.pareto_frontier);
    let mut wtr = csv::Writer::from_writer(vec![]);

    let mut header = vec!["combination_id".to_string()];
    header.extend(columns.iter().cloned());
    header.push(summary.objective.to_string());
    header.extend(summary.secondary_objectives.iter().map(|o| o.to_string()));
    wtr.write_record(&header)?;

    for r in &summary.pareto_frontier {
        let mut record = vec![r.combination_id.clone()];
        record.extend(parameter_cells(r, &columns));
        record.push(opt_f64(r.objective));
        record.extend(r.secondary.iter().map(|v| format!("{:.4}", v)));
        wtr.write_record(&record)?;
    }
    finish(wtr)
}

/// One row per (parameter, value), most sensitive parameter first.
pub fn export_sensitivity_csv(summary: &OptimizationSummary) -> Result<String> {
    let mut params: Vec<_> = summary.sensitivity.values().collect();
    params.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.parameter.cmp(&b.parameter)));

    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "parameter",
        "score",
        "value",
        "average_objective",
        "count",
        "is_best",
    ])?;
    for p in params {
        for v in &p.averages {
            wtr.write_record([
                &p.parameter,
                &format!("{:.4}", p.score),
                &v.value.to_string(),
                &format!("{:.4}", v.average),
                &v.count.to_string(),
                &(v.value == p.best_value).to_string(),
            ])?;
        }
    }
    finish(wtr)
}

// ─── Markdown report ────────────────────────────────────────────────

const REPORT_TOP_N: usize = 10;

pub fn generate_optimization_report(summary: &OptimizationSummary) -> String {
    let mut md = String::with_capacity(4096);

    md.push_str(&format!("# Optimization Report: {}\n\n", summary.name));

    md.push_str("## Run\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Objective | {} |\n", summary.objective));
    if !summary.secondary_objectives.is_empty() {
        let names: Vec<&str> = summary.secondary_objectives.iter().map(|o| o.as_str()).collect();
        md.push_str(&format!("| Secondary | {} |\n", names.join(", ")));
    }
    md.push_str(&format!("| Grid Size | {} |\n", summary.grid_size));
    md.push_str(&format!("| Planned | {} |\n", summary.planned));
    md.push_str(&format!("| Completed | {} |\n", summary.completed));
    md.push_str(&format!("| Failed | {} |\n", summary.failed));
    if summary.cancelled {
        md.push_str(&format!("| Skipped | {} (**CANCELLED**) |\n", summary.skipped));
    }
    md.push_str(&format!(
        "| Elapsed | {:.1}s |\n",
        summary.elapsed_ms as f64 / 1000.0
    ));
    md.push_str(&format!("| Dataset Hash | {} |\n", summary.dataset_hash));
    md.push('\n');

    if let Some(best) = &summary.best {
        md.push_str("## Best Combination\n\n");
        md.push_str("| Parameter | Value |\n");
        md.push_str("| --- | --- |\n");
        for (name, value) in &best.parameters {
            md.push_str(&format!("| {name} | {value} |\n"));
        }
        md.push_str(&format!(
            "| **{}** | **{}** |\n",
            summary.objective,
            opt_f64(best.objective)
        ));
        if let Some(m) = &best.metrics {
            md.push_str(&format!("| win_rate | {:.1}% |\n", m.win_rate * 100.0));
            md.push_str(&format!("| profit_factor | {:.2} |\n", m.profit_factor));
            md.push_str(&format!("| worst_pnl | {:.2}% |\n", m.worst_pnl_pct));
        }
        md.push('\n');
    }

    let ranked = summary.ranked();
    if !ranked.is_empty() {
        md.push_str(&format!("## Top {}\n\n", ranked.len().min(REPORT_TOP_N)));
        md.push_str(&format!("| Rank | Combination | {} | Parameters |\n", summary.objective));
        md.push_str("| ---: | --- | ---: | --- |\n");
        for (i, r) in ranked.iter().take(REPORT_TOP_N).enumerate() {
            let params: Vec<String> =
                r.parameters.iter().map(|(k, v)| format!("{k}={v}")).collect();
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                i + 1,
                short(&r.combination_id),
                opt_f64(r.objective),
                params.join(", ")
            ));
        }
        md.push('\n');
    }

    if !summary.pareto_frontier.is_empty() {
        md.push_str("## Pareto Frontier\n\n");
        for r in &summary.pareto_frontier {
            let secondary: Vec<String> = r.secondary.iter().map(|v| format!("{:.4}", v)).collect();
            md.push_str(&format!(
                "- {}: {} [{}]\n",
                short(&r.combination_id),
                opt_f64(r.objective),
                secondary.join(", ")
            ));
        }
        md.push('\n');
    }

    if !summary.sensitivity.is_empty() {
        md.push_str("## Parameter Sensitivity\n\n");
        md.push_str("| Parameter | Score | Best Value | Best Average |\n");
        md.push_str("| --- | ---: | ---: | ---: |\n");
        let mut params: Vec<_> = summary.sensitivity.values().collect();
        params.sort_by(|a, b| b.score.total_cmp(&a.score));
        for p in params {
            md.push_str(&format!(
                "| {} | {:.4} | {} | {:.4} |\n",
                p.parameter, p.score, p.best_value, p.best_average
            ));
        }
        md.push('\n');
    }

    let failures: Vec<&OptimizationResult> = summary.failures().collect();
    if !failures.is_empty() {
        md.push_str("## Failures\n\n");
        for r in failures {
            md.push_str(&format!(
                "- {}: {}\n",
                short(&r.combination_id),
                r.error.as_deref().unwrap_or("unknown error")
            ));
        }
        md.push('\n');
    }

    md
}

fn short(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for an optimization run.
///
/// Creates `{name}_{timestamp}/` under `output_dir` containing
/// `summary.json`, `rankings.csv`, `metrics.csv`, `sensitivity.csv`,
/// `report.md`, and `pareto.csv` when a frontier was computed.
///
/// Returns the path to the created directory.
pub fn save_optimization_artifacts(
    summary: &OptimizationSummary,
    output_dir: &Path,
) -> Result<PathBuf> {
    let dirname = format!(
        "{}_{}",
        summary.name,
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    write(&run_dir, "summary.json", &export_summary_json(summary)?)?;
    write(&run_dir, "rankings.csv", &export_rankings_csv(summary)?)?;
    write(&run_dir, "metrics.csv", &export_metric_comparison_csv(summary)?)?;
    write(&run_dir, "sensitivity.csv", &export_sensitivity_csv(summary)?)?;
    write(&run_dir, "report.md", &generate_optimization_report(summary))?;
    if !summary.pareto_frontier.is_empty() {
        write(&run_dir, "pareto.csv", &export_pareto_csv(summary)?)?;
    }

    tracing::info!(dir = %run_dir.display(), "optimization artifacts saved");
    Ok(run_dir)
}

fn write(dir: &Path, file: &str, contents: &str) -> Result<()> {
    let path = dir.join(file);
    std::fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))
}

/// Load a summary from an artifact directory's summary.json.
pub fn load_optimization_summary(dir: &Path) -> Result<OptimizationSummary> {
    let path = dir.join("summary.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_summary_json(&json)
}
