use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DataType, Location, Reading};
use crate::errors::SourceFailure;

/// 数据质量评估结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub total_records: usize,
    /// 每个字段的缺失值数量
    pub missing_counts: BTreeMap<String, usize>,
    /// 每个字段的缺失比例
    pub missing_fractions: BTreeMap<String, f64>,
    /// 全部单元格中的缺失比例
    pub missing_fraction: f64,
    pub duplicate_count: usize,
    pub duplicate_fraction: f64,
    /// 每个数值字段的IQR离群值数量
    pub outlier_counts: BTreeMap<String, usize>,
    /// 至少含一个离群值的记录数
    pub outlier_records: usize,
    pub outlier_fraction: f64,
    pub quality_score: f64,
}

impl QualityReport {
    pub fn missing_fraction_of(&self, field: &str) -> f64 {
        self.missing_fractions.get(field).copied().unwrap_or(0.0)
    }
}

/// 多数据源采集器返回的原始批次
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedBatch {
    pub source_used: String,
    pub readings: Vec<Reading>,
    /// 在成功之前失败的数据源
    pub failed_sources: Vec<SourceFailure>,
}

/// 一次成功采集的结果，创建后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionResult {
    pub schedule_name: String,
    pub timestamp: DateTime<Utc>,
    pub location: Location,
    pub data_type: DataType,
    pub source_used: String,
    pub readings: Vec<Reading>,
    pub quality_score: f64,
    pub anomaly_count: usize,
    pub duplicate_count: usize,
    pub missing_fraction: f64,
}

impl CollectionResult {
    pub fn from_batch(
        schedule_name: impl Into<String>,
        timestamp: DateTime<Utc>,
        location: Location,
        data_type: DataType,
        batch: CollectedBatch,
        report: &QualityReport,
    ) -> Self {
        Self {
            schedule_name: schedule_name.into(),
            timestamp,
            location,
            data_type,
            source_used: batch.source_used,
            readings: batch.readings,
            quality_score: report.quality_score,
            anomaly_count: report.outlier_records,
            duplicate_count: report.duplicate_count,
            missing_fraction: report.missing_fraction,
        }
    }
}
