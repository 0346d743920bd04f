// 该文件是 Huishou （回收分类） 项目的一部分。
// src/config.rs - 配置常量与分析参数
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

use std::time::Duration;

use thiserror::Error;

use crate::frame::TargetSize;

pub const MODEL_DOWNLOAD_URL: &str = "https://huggingface.co/iuQuynhThu/Garbage/resolve/main/model.onnx";
pub const LOCAL_MODEL_FILENAME: &str = "downloaded_model.onnx";
pub const CACHE_DIR: &str = "./model_cache";

pub const TARGET_SIZE: TargetSize = TargetSize::square(299);

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const MODEL_CACHE_TTL: Duration = Duration::from_secs(3600);

pub const DEFAULT_CONFIDENCE_THRESHOLD: u8 = 50;
pub const MAX_CONFIDENCE_THRESHOLD: u8 = 100;

pub const DEFAULT_FRAME_INTERVAL_SECS: f64 = 2.0;
pub const MIN_FRAME_INTERVAL_SECS: f64 = 0.5;
pub const MAX_FRAME_INTERVAL_SECS: f64 = 10.0;

pub const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mov", "mkv"];

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
  #[error("Confidence threshold must be between 0 and 100, got {0}")]
  ThresholdOutOfRange(u8),
  #[error("Frame interval must be between 0.5 and 10.0 seconds, got {0}")]
  IntervalOutOfRange(f64),
}

/// 用户可调的分析参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisSettings {
  confidence_threshold: u8,
  frame_interval_secs: f64,
}

impl Default for AnalysisSettings {
  fn default() -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      frame_interval_secs: DEFAULT_FRAME_INTERVAL_SECS,
    }
  }
}

impl AnalysisSettings {
  pub fn new(confidence_threshold: u8, frame_interval_secs: f64) -> Result<Self, ConfigError> {
    Self::default()
      .with_confidence_threshold(confidence_threshold)?
      .with_frame_interval(frame_interval_secs)
  }

  pub fn with_confidence_threshold(mut self, threshold: u8) -> Result<Self, ConfigError> {
    if threshold > MAX_CONFIDENCE_THRESHOLD {
      return Err(ConfigError::ThresholdOutOfRange(threshold));
    }
    self.confidence_threshold = threshold;
    Ok(self)
  }

  pub fn with_frame_interval(mut self, secs: f64) -> Result<Self, ConfigError> {
    if !(MIN_FRAME_INTERVAL_SECS..=MAX_FRAME_INTERVAL_SECS).contains(&secs) {
      return Err(ConfigError::IntervalOutOfRange(secs));
    }
    self.frame_interval_secs = secs;
    Ok(self)
  }

  pub fn confidence_threshold(&self) -> u8 {
    self.confidence_threshold
  }

  /// 百分比形式的阈值，供决策引擎使用
  pub fn threshold_percent(&self) -> f32 {
    f32::from(self.confidence_threshold)
  }

  pub fn frame_interval_secs(&self) -> f64 {
    self.frame_interval_secs
  }
}
