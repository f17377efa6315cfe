// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Snapshots metrics as JSON files, one file per target, metric and unit.
//!
//! Every write rewrites whole files, so this destination is meant for
//! debugging and small deployments.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use health_export::{Metric, MetricData, Payload, Time};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::destination::Destination;
use crate::error::WriteError;

pub const LOCAL_FILE_NAME: &str = "LocalFile";

/// Contents of one metric file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricFile {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub target: String,
    pub units: String,
    pub data: MetricData,
}

impl MetricFile {
    fn from_metric(metric: &Metric, target: &str) -> Self {
        Self {
            name: metric.name.clone(),
            target: target.to_string(),
            units: metric.units.clone(),
            data: metric.data.clone(),
        }
    }

    /// `[<target>_]<name>_<units>.json`, with path separators replaced by
    /// `_` so the file always lands directly in the metrics directory.
    pub fn file_name(&self) -> String {
        let base = format!("{}_{}", self.name, self.units);
        let name = if self.target.is_empty() {
            format!("{base}.json")
        } else {
            format!("{}_{base}.json", self.target)
        };
        name.replace(['/', '\\'], "_")
    }
}

/// Stored data is resolved against the metric name, like a payload metric.
#[derive(Deserialize)]
struct RawMetricFile {
    name: String,
    #[serde(default)]
    target: String,
    #[serde(default)]
    units: String,
    #[serde(default)]
    data: serde_json::Value,
}

fn parse_metric_file(bytes: &[u8]) -> Result<MetricFile, serde_json::Error> {
    let raw: RawMetricFile = serde_json::from_slice(bytes)?;
    let data = MetricData::resolve(&raw.name, &raw.data)?;
    Ok(MetricFile {
        name: raw.name,
        target: raw.target,
        units: raw.units,
        data,
    })
}

#[derive(Debug)]
pub struct LocalFile {
    dir: PathBuf,
    metrics: Mutex<HashMap<String, MetricFile>>,
}

impl LocalFile {
    /// Loads every metric file already in `dir`. A missing directory is
    /// created on the first write; unreadable files are skipped.
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        let metrics = load_metrics(&dir)?;
        debug!(path = %dir.display(), files = metrics.len(), "loaded local metric files");
        Ok(Self {
            dir,
            metrics: Mutex::new(metrics),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn write_metric(
        &self,
        metrics: &mut HashMap<String, MetricFile>,
        metric: &Metric,
        target: &str,
    ) -> io::Result<()> {
        let mut file = MetricFile::from_metric(metric, target);
        let file_name = file.file_name();
        if let Some(existing) = metrics.get(&file_name) {
            file.data = merge(&existing.data, &file.data);
        }

        let path = self.dir.join(&file_name);
        if path.parent() != Some(self.dir.as_path()) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("file name {file_name:?} escapes {}", self.dir.display()),
            ));
        }
        let bytes = serde_json::to_vec_pretty(&file)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&path, bytes).await?;

        metrics.insert(file_name, file);
        Ok(())
    }
}

#[async_trait]
impl Destination for LocalFile {
    fn name(&self) -> &str {
        LOCAL_FILE_NAME
    }

    async fn write(&self, payload: &Payload, target: &str) -> Result<(), WriteError> {
        let mut metrics = self.metrics.lock().await;
        for metric in payload.metrics() {
            self.write_metric(&mut metrics, metric, target)
                .await
                .map_err(|e| {
                    WriteError::permanent(format!("handle metric error for {}: {e}", metric.name))
                })?;
        }
        if !payload.workouts().is_empty() {
            debug!(
                workouts = payload.workouts().len(),
                "workouts are not persisted to local files"
            );
        }
        Ok(())
    }
}

fn load_metrics(dir: &Path) -> io::Result<HashMap<String, MetricFile>> {
    let mut metrics = HashMap::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(metrics),
        Err(e) => return Err(e),
    };

    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let parsed = std::fs::read(&path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| parse_metric_file(&bytes).map_err(|e| e.to_string()));
        match parsed {
            Ok(file) => {
                metrics.insert(file.file_name(), file);
            }
            Err(e) => warn!(path = %path.display(), "could not read metric file: {e}"),
        }
    }
    Ok(metrics)
}

/// Merges `incoming` into `existing` by timestamp. Incoming entries win on
/// equal timestamps; entries without a timestamp are kept in front. A change
/// of layout replaces the stored entries.
fn merge(existing: &MetricData, incoming: &MetricData) -> MetricData {
    match (existing, incoming) {
        (MetricData::Datapoints(old), MetricData::Datapoints(new)) => {
            MetricData::Datapoints(merge_by(old, new, |d| d.date))
        }
        (MetricData::SleepEvents(old), MetricData::SleepEvents(new)) => {
            MetricData::SleepEvents(merge_by(old, new, |e| e.start_date))
        }
        (MetricData::AggregatedSleep(old), MetricData::AggregatedSleep(new)) => {
            MetricData::AggregatedSleep(merge_by(old, new, |a| a.sleep_start))
        }
        _ => incoming.clone(),
    }
}

fn merge_by<T: Clone>(old: &[T], new: &[T], key: impl Fn(&T) -> Option<Time>) -> Vec<T> {
    let mut untimed = Vec::new();
    let mut by_time = BTreeMap::new();
    for entry in old.iter().chain(new) {
        match key(entry) {
            Some(time) => {
                by_time.insert(time, entry.clone());
            }
            None => untimed.push(entry.clone()),
        }
    }
    untimed.extend(by_time.into_values());
    untimed
}
