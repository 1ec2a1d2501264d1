//! JSONL データセットローダ
//!
//! 1 行 = 1 文書。形式:
//!
//! ```json
//! { "features": [0.1, 3.0], "target": 1.0, "weight": 2.0, "group": "q1", "baseline": [0.5] }
//! ```
//!
//! `weight`（既定 1.0）、`group`、`baseline` は省略可。グループ境界は
//! 連続する同一 `group` キーから組み立てる（同一キーの再出現は別グループ）。
//! `baseline` は全文書に付けるか全く付けないかのどちらか。

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ensplot_core::{DatasetPart, GroupBounds};

/// JSONL の 1 行
#[derive(Debug, Deserialize)]
struct DocRecord {
    features: Vec<f32>,
    target: f32,
    #[serde(default = "default_weight")]
    weight: f32,
    #[serde(default)]
    group: Option<String>,
    #[serde(default)]
    baseline: Option<Vec<f64>>,
}

fn default_weight() -> f32 {
    1.0
}

/// JSONL ファイルを 1 つの part として読み込む
pub fn load_dataset_part<P: AsRef<Path>>(path: P) -> Result<DatasetPart> {
    let file = File::open(path.as_ref())
        .with_context(|| format!("Failed to open {}", path.as_ref().display()))?;
    let reader = BufReader::new(file);

    let mut features = Vec::new();
    let mut targets = Vec::new();
    let mut weights = Vec::new();
    let mut groups: Vec<GroupBounds> = Vec::new();
    let mut current_group: Option<(String, usize)> = None;
    let mut baseline_rows: Vec<Vec<f64>> = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", line_no + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: DocRecord = serde_json::from_str(&line)
            .with_context(|| format!("Failed to parse line {}: {line}", line_no + 1))?;

        let doc_index = targets.len();
        if let Some(base) = &record.baseline {
            if doc_index != baseline_rows.len() {
                bail!(
                    "line {}: baseline given for some documents but not all",
                    line_no + 1
                );
            }
            baseline_rows.push(base.clone());
        } else if !baseline_rows.is_empty() {
            bail!(
                "line {}: baseline given for some documents but not all",
                line_no + 1
            );
        }

        // グループキーが変わったら前のグループを閉じる
        let group_changed = match (&current_group, &record.group) {
            (Some((key, _)), Some(next)) => key != next,
            (Some(_), None) => true,
            _ => false,
        };
        if group_changed {
            if let Some((_, begin)) = current_group.take() {
                groups.push(GroupBounds {
                    begin,
                    end: doc_index,
                });
            }
        }
        if current_group.is_none() {
            if let Some(next) = &record.group {
                current_group = Some((next.clone(), doc_index));
            }
        }

        features.push(record.features);
        targets.push(record.target);
        weights.push(record.weight);
    }
    if let Some((_, begin)) = current_group {
        groups.push(GroupBounds {
            begin,
            end: targets.len(),
        });
    }

    // 文書メジャーの baseline を [dim][doc] に転置する
    let baseline = if baseline_rows.is_empty() {
        None
    } else {
        let dim = baseline_rows[0].len();
        if let Some((i, row)) = baseline_rows.iter().enumerate().find(|(_, r)| r.len() != dim) {
            bail!(
                "document {i}: baseline dimension {} does not match first document's {dim}",
                row.len()
            );
        }
        let mut rows = vec![vec![0.0; baseline_rows.len()]; dim];
        for (i, doc) in baseline_rows.iter().enumerate() {
            for (d, v) in doc.iter().enumerate() {
                rows[d][i] = *v;
            }
        }
        Some(rows)
    };

    let doc_count = targets.len();
    let part = DatasetPart::new(features, targets, Some(weights), groups, baseline)
        .with_context(|| format!("Invalid dataset {}", path.as_ref().display()))?;
    log::info!(
        "loaded {}: {doc_count} documents, {} groups",
        path.as_ref().display(),
        part.groups().len()
    );
    Ok(part)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_jsonl(lines: &[&str]) -> (tempfile::TempDir, std::path::PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data.jsonl");
        let mut f = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
        (tmp, path)
    }

    #[test]
    fn loads_documents_with_defaults() {
        let (_tmp, path) = write_jsonl(&[
            r#"{ "features": [0.1], "target": 1.0 }"#,
            r#"{ "features": [0.2], "target": 0.0, "weight": 2.0 }"#,
        ]);
        let part = load_dataset_part(&path).unwrap();
        assert_eq!(part.doc_count(), 2);
        assert_eq!(part.weights(), &[1.0, 2.0]);
        assert!(part.groups().is_empty());
        assert!(!part.has_baseline());
    }

    #[test]
    fn group_boundaries_from_consecutive_keys() {
        let (_tmp, path) = write_jsonl(&[
            r#"{ "features": [0.1], "target": 1.0, "group": "a" }"#,
            r#"{ "features": [0.2], "target": 0.0, "group": "a" }"#,
            r#"{ "features": [0.3], "target": 1.0, "group": "b" }"#,
            r#"{ "features": [0.4], "target": 0.0 }"#,
            r#"{ "features": [0.5], "target": 1.0, "group": "a" }"#,
        ]);
        let part = load_dataset_part(&path).unwrap();
        assert_eq!(
            part.groups(),
            &[
                GroupBounds { begin: 0, end: 2 },
                GroupBounds { begin: 2, end: 3 },
                GroupBounds { begin: 4, end: 5 },
            ]
        );
    }

    #[test]
    fn baseline_is_transposed_to_dim_major() {
        let (_tmp, path) = write_jsonl(&[
            r#"{ "features": [0.1], "target": 1.0, "baseline": [0.5, -0.5] }"#,
            r#"{ "features": [0.2], "target": 0.0, "baseline": [0.25, -0.25] }"#,
        ]);
        let part = load_dataset_part(&path).unwrap();
        let baseline = part.baseline().unwrap();
        assert_eq!(baseline, &[vec![0.5, 0.25], vec![-0.5, -0.25]]);
    }

    #[test]
    fn partial_baseline_is_rejected() {
        let (_tmp, path) = write_jsonl(&[
            r#"{ "features": [0.1], "target": 1.0, "baseline": [0.5] }"#,
            r#"{ "features": [0.2], "target": 0.0 }"#,
        ]);
        assert!(load_dataset_part(&path).is_err());
    }
}
