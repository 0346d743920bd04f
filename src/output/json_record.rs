// 该文件是 Huishou （回收分类） 项目的一部分。
// src/output/json_record.rs - JSON 结果记录
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{
  fs::File,
  io::{BufWriter, Write},
  path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::{
  FromUrl, FromUrlWithScheme,
  category::Category,
  model::ImageReport,
  output::Render,
  video::{FrameRecord, VideoReport},
};

#[derive(Error, Debug)]
pub enum JsonRecordOutputError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON serialization error: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 把结果写成 JSON 文件，例如 `json:///var/lib/huishou/report.json`
#[derive(Debug, Clone)]
pub struct JsonRecordOutput {
  path: PathBuf,
}

impl FromUrlWithScheme for JsonRecordOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonRecordOutput {
  type Error = JsonRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME || uri.path().is_empty() {
      return Err(JsonRecordOutputError::SchemeMismatch);
    }

    Ok(JsonRecordOutput {
      path: PathBuf::from(uri.path()),
    })
  }
}

impl JsonRecordOutput {
  pub fn new<P: Into<PathBuf>>(path: P) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn write<T: Serialize>(&self, record: &T) -> Result<(), JsonRecordOutputError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(&self.path)?);
    serde_json::to_writer_pretty(&mut writer, record)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    info!("结果已写入 {}", self.path.display());
    Ok(())
  }
}

#[derive(Serialize)]
struct RankedEntry {
  category_id: Category,
  probability: f32,
}

#[derive(Serialize)]
struct ImageRecord<'a> {
  generated_at: DateTime<Utc>,
  source: &'a str,
  category_id: Category,
  category_display_name: &'static str,
  category_color: &'static str,
  confidence_percent: f32,
  inference_failed: bool,
  probabilities: Vec<RankedEntry>,
}

#[derive(Serialize)]
struct DominantEntry {
  category_id: Category,
  frames: usize,
}

#[derive(Serialize)]
struct VideoRecord<'a> {
  generated_at: DateTime<Utc>,
  source: &'a str,
  fps: Option<f64>,
  frame_skip: u64,
  frames_read: u64,
  frames_failed: u64,
  elapsed_seconds: f64,
  stopped_early: bool,
  dominant_category: Option<DominantEntry>,
  records: &'a [FrameRecord],
}

impl Render<ImageReport> for JsonRecordOutput {
  type Error = JsonRecordOutputError;

  fn render_result(&self, result: &ImageReport) -> Result<(), Self::Error> {
    let prediction = &result.prediction;
    self.write(&ImageRecord {
      generated_at: Utc::now(),
      source: &result.source,
      category_id: prediction.category,
      category_display_name: prediction.category.display_name(),
      category_color: prediction.descriptor().color,
      confidence_percent: prediction.confidence_percent,
      inference_failed: prediction.is_degraded(),
      probabilities: result
        .ranked
        .iter()
        .map(|&(category_id, probability)| RankedEntry {
          category_id,
          probability,
        })
        .collect(),
    })
  }
}

impl Render<VideoReport> for JsonRecordOutput {
  type Error = JsonRecordOutputError;

  fn render_result(&self, result: &VideoReport) -> Result<(), Self::Error> {
    self.write(&VideoRecord {
      generated_at: Utc::now(),
      source: &result.source,
      fps: result.fps,
      frame_skip: result.frame_skip,
      frames_read: result.frames_read,
      frames_failed: result.frames_failed,
      elapsed_seconds: result.elapsed.as_secs_f64(),
      stopped_early: result.stopped_early,
      dominant_category: result
        .dominant_category()
        .map(|(category_id, frames)| DominantEntry {
          category_id,
          frames,
        }),
      records: &result.records,
    })
  }
}
