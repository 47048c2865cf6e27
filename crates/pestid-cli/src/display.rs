//! Command output: pretty JSON by default, or aligned plain text.

use clap::ValueEnum;
use pestid_core::{ArtifactStat, BuildReport, ClassifierStatus, IndexInfo, ModelInfo, Prediction};
use serde::Serialize;

const MAX_LABELS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    #[default]
    Json,
    Text,
}

/// Print `value` to stdout in the requested format.
pub fn emit<T: Serialize>(
    value: &T,
    format: Format,
    text: impl FnOnce(&T) -> String,
) -> anyhow::Result<()> {
    let out = match format {
        Format::Json => serde_json::to_string_pretty(value)?,
        Format::Text => text(value),
    };
    println!("{out}");
    Ok(())
}

pub fn predictions(predictions: &[Prediction]) -> String {
    if predictions.is_empty() {
        return "no prediction".to_string();
    }
    let width = predictions.iter().map(|p| p.label.len()).max().unwrap_or(0);
    predictions
        .iter()
        .enumerate()
        .map(|(i, p)| {
            format!(
                "{:>2}. {:<width$}  {:>6.2}%",
                i + 1,
                p.label,
                p.probability * 100.0
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_report(report: &BuildReport) -> String {
    format!(
        "indexed {} reference images\n  labels: {}",
        report.count,
        label_list(&report.labels)
    )
}

pub fn index_info(info: &IndexInfo) -> String {
    format!(
        "generation {}: {} entries, dim {}\n  labels: {}",
        info.generation,
        info.count,
        info.dim,
        label_list(&info.labels)
    )
}

pub fn model_info(info: &ModelInfo) -> String {
    let status = match &info.classifier_status {
        ClassifierStatus::Unloaded => "unloaded".to_string(),
        ClassifierStatus::Loaded => "loaded".to_string(),
        ClassifierStatus::LoadFailed(reason) => format!("unavailable ({reason})"),
    };
    [
        format!("  backbone:    {}", artifact(info.backbone.as_ref())),
        format!("  classifier:  {}", artifact(info.classifier.as_ref())),
        format!("  labels:      {}", artifact(info.labels.as_ref())),
        format!("  classes:     {}", info.num_classes),
        format!("  status:      {status}"),
    ]
    .join("\n")
}

fn artifact(stat: Option<&ArtifactStat>) -> String {
    let Some(stat) = stat else {
        return "missing".to_string();
    };
    let modified = stat
        .modified
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "{} ({}, modified {modified})",
        stat.path.display(),
        human_size(stat.size)
    )
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

fn label_list(labels: &[String]) -> String {
    if labels.is_empty() {
        return "(none)".to_string();
    }
    let shown = labels
        .iter()
        .take(MAX_LABELS)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    match labels.len().saturating_sub(MAX_LABELS) {
        0 => shown,
        more => format!("{shown} … (+{more} more)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn predictions_are_aligned() {
        let text = predictions(&[
            Prediction {
                label: "sau_rom".into(),
                probability: 0.75,
            },
            Prediction {
                label: "mite".into(),
                probability: 0.25,
            },
        ]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], " 1. sau_rom   75.00%");
        assert_eq!(lines[1], " 2. mite      25.00%");
    }

    #[test]
    fn empty_predictions() {
        assert_eq!(predictions(&[]), "no prediction");
    }

    #[test]
    fn sizes() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(14 * 1024 * 1024), "14.0 MiB");
    }

    #[test]
    fn long_label_lists_are_cut() {
        let labels: Vec<String> = (0..25).map(|i| format!("pest{i}")).collect();
        let text = label_list(&labels);
        assert!(text.ends_with("(+5 more)"));
        assert!(text.starts_with("pest0, pest1"));
    }

    #[test]
    fn model_info_text() {
        let info = ModelInfo {
            backbone: Some(ArtifactStat {
                path: PathBuf::from("/srv/models/backbone/model.onnx"),
                size: 2048,
                modified: None,
            }),
            classifier: None,
            labels: None,
            num_classes: 0,
            classifier_status: ClassifierStatus::LoadFailed("not configured".into()),
        };
        let text = model_info(&info);
        assert!(text.contains("/srv/models/backbone/model.onnx (2.0 KiB, modified unknown)"));
        assert!(text.contains("classifier:  missing"));
        assert!(text.contains("unavailable (not configured)"));
    }
}
