//! 数据质量校验
//!
//! 对一批记录计算缺失值、整行重复和 IQR 离群值，并给出 [0, 1] 的质量分数。
//! 纯函数，同一输入总是得到同一结果。

use std::collections::{BTreeMap, BTreeSet, HashSet};

use energy_core::config::QualityConfig;
use energy_core::{QualityReport, Reading};
use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct QualityValidator {
    config: QualityConfig,
}

impl QualityValidator {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    pub fn validate(&self, readings: &[Reading]) -> QualityReport {
        let total = readings.len();
        if total == 0 {
            return QualityReport::default();
        }

        // 字段集合取所有记录字段的并集
        let fields: BTreeSet<&str> = readings.iter().flat_map(Reading::field_names).collect();

        let mut missing_counts = BTreeMap::new();
        let mut missing_fractions = BTreeMap::new();
        let mut missing_cells = 0usize;
        for field in &fields {
            let missing = readings.iter().filter(|r| r.is_missing(field)).count();
            missing_cells += missing;
            missing_counts.insert(field.to_string(), missing);
            missing_fractions.insert(field.to_string(), missing as f64 / total as f64);
        }
        let missing_fraction = if fields.is_empty() {
            1.0
        } else {
            missing_cells as f64 / (total * fields.len()) as f64
        };

        let duplicate_count = count_duplicates(readings, &fields);
        let duplicate_fraction = duplicate_count as f64 / total as f64;

        let mut outlier_counts = BTreeMap::new();
        let mut outlier_rows = vec![false; total];
        for field in &fields {
            let values: Vec<(usize, f64)> = readings
                .iter()
                .enumerate()
                .filter_map(|(idx, r)| r.number(field).map(|v| (idx, v)))
                .collect();
            if values.is_empty() {
                continue;
            }
            let Some((lower, upper)) = iqr_bounds(
                values.iter().map(|(_, v)| *v).collect(),
                self.config.iqr_multiplier,
            ) else {
                continue;
            };
            let mut count = 0;
            for (idx, value) in &values {
                if *value < lower || *value > upper {
                    count += 1;
                    outlier_rows[*idx] = true;
                }
            }
            outlier_counts.insert(field.to_string(), count);
        }
        let outlier_records = outlier_rows.iter().filter(|flag| **flag).count();
        let outlier_fraction = outlier_records as f64 / total as f64;

        let quality_score =
            self.score(missing_fraction, duplicate_fraction, outlier_fraction);

        QualityReport {
            total_records: total,
            missing_counts,
            missing_fractions,
            missing_fraction,
            duplicate_count,
            duplicate_fraction,
            outlier_counts,
            outlier_records,
            outlier_fraction,
            quality_score,
        }
    }

    fn score(&self, missing: f64, duplicate: f64, outlier: f64) -> f64 {
        let config = &self.config;
        let total_weight = config.missing_weight + config.duplicate_weight + config.outlier_weight;
        if total_weight <= 0.0 {
            return 0.0;
        }
        let penalty = (config.missing_weight * missing
            + config.duplicate_weight * duplicate
            + config.outlier_weight * outlier)
            / total_weight;
        (1.0 - penalty).clamp(0.0, 1.0)
    }
}

/// 与前面某一行完全相同的记录数；字段缺失与 null 视为相同
fn count_duplicates(readings: &[Reading], fields: &BTreeSet<&str>) -> usize {
    let mut seen = HashSet::new();
    readings
        .iter()
        .filter(|reading| {
            let row: Vec<&Value> = fields
                .iter()
                .map(|f| reading.get(f).unwrap_or(&Value::Null))
                .collect();
            let key = serde_json::to_string(&row).unwrap_or_else(|_| reading.canonical_key());
            !seen.insert(key)
        })
        .count()
}

/// 线性插值分位数，`sorted` 必须非空且已排序
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// `[Q1 - k*IQR, Q3 + k*IQR]`
pub fn iqr_bounds(mut values: Vec<f64>, multiplier: f64) -> Option<(f64, f64)> {
    values.retain(|v| v.is_finite());
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let q1 = quantile(&values, 0.25);
    let q3 = quantile(&values, 0.75);
    let iqr = q3 - q1;
    Some((q1 - multiplier * iqr, q3 + multiplier * iqr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reading(temp: Value, humidity: f64) -> Reading {
        Reading::new()
            .with("temperature", temp)
            .with("humidity", humidity)
    }

    #[test]
    fn test_empty_batch_scores_zero() {
        let report = QualityValidator::default().validate(&[]);
        assert_eq!(report.total_records, 0);
        assert_eq!(report.quality_score, 0.0);
    }

    #[test]
    fn test_iqr_bounds_linear_interpolation() {
        let (lower, upper) = iqr_bounds(vec![1.0, 2.0, 3.0, 4.0], 1.5).unwrap();
        // Q1 = 1.75, Q3 = 3.25, IQR = 1.5
        assert!((lower - (-0.5)).abs() < 1e-9);
        assert!((upper - 5.5).abs() < 1e-9);
    }

    #[test]
    fn test_outlier_fraction_counts_records_not_cells() {
        let mut readings: Vec<Reading> = (0..10)
            .map(|i| reading(json!(20.0 + i as f64 * 0.1), 50.0 + i as f64))
            .collect();
        // 同一条记录的两个字段都是离群值，只算一条
        readings.push(reading(json!(95.0), 500.0));

        let report = QualityValidator::default().validate(&readings);
        assert_eq!(report.outlier_counts.get("temperature"), Some(&1));
        assert_eq!(report.outlier_counts.get("humidity"), Some(&1));
        assert_eq!(report.outlier_records, 1);
        assert!((report.outlier_fraction - 1.0 / 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_detects_outlier() {
        let mut readings: Vec<Reading> = (0..10)
            .map(|i| reading(json!(20.0 + i as f64 * 0.1), 50.0 + i as f64))
            .collect();
        readings.push(reading(json!(95.0), 55.5));

        let report = QualityValidator::default().validate(&readings);
        assert_eq!(report.outlier_counts.get("temperature"), Some(&1));
        assert_eq!(report.outlier_records, 1);
        assert_eq!(report.duplicate_count, 0);
        assert!(report.quality_score < 1.0);
    }

    #[test]
    fn test_clean_batch_scores_one() {
        let readings: Vec<Reading> = (0..5)
            .map(|i| reading(json!(10.0 + i as f64), 40.0 + i as f64))
            .collect();
        let report = QualityValidator::default().validate(&readings);
        assert_eq!(report.missing_fraction, 0.0);
        assert_eq!(report.outlier_records, 0);
        assert_eq!(report.quality_score, 1.0);
    }

    #[test]
    fn test_absent_field_counts_as_missing_and_duplicate_match() {
        let readings = vec![
            Reading::new().with("temperature", 1.0).with("humidity", 2.0),
            Reading::new().with("temperature", 1.0),
            Reading::new().with("temperature", 1.0).with("humidity", Value::Null),
        ];
        let report = QualityValidator::default().validate(&readings);
        assert_eq!(report.missing_counts.get("humidity"), Some(&2));
        assert!((report.missing_fraction - 2.0 / 6.0).abs() < 1e-9);
        // 第三行与第二行在去重意义上相同
        assert_eq!(report.duplicate_count, 1);
    }

    #[test]
    fn test_weights_change_score() {
        let readings = vec![
            reading(Value::Null, 1.0),
            reading(json!(2.0), 1.0),
        ];
        let equal = QualityValidator::default().validate(&readings);
        let missing_only = QualityValidator::new(QualityConfig {
            missing_weight: 1.0,
            duplicate_weight: 0.0,
            outlier_weight: 0.0,
            ..QualityConfig::default()
        })
        .validate(&readings);
        assert!((missing_only.quality_score - 0.75).abs() < 1e-9);
        assert!(equal.quality_score > missing_only.quality_score);
    }
}
