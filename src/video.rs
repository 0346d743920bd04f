// 该文件是 Huishou （回收分类） 项目的一部分。
// src/video.rs - 视频抽帧与逐帧分类
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

//! # 视频分析
//!
//! 按固定的时间间隔从视频中抽取帧，对每个被抽中的帧做归一化和分类，
//! 按时间顺序汇总为 [`VideoReport`]。
//!
//! 处理流程由 [`VideoSampler`] 驱动，每调用一次 [`VideoSampler::step`]
//! 前进一个阶段：
//!
//! ```text
//! Read ─┬─> Sample ─┬─> Normalize ─> Classify ─> Emit ─┐
//!       │           └──────────────────────────────────┤
//!       │                                              v
//!       │  <────────────────────────────────────── Advance
//!       └─> Close ─> Finished
//! ```
//!
//! 单帧失败（解码、归一化或推理）只会跳过该帧；
//! 视频源在 `Close` 阶段释放，提前取消时也是如此。

use std::{
  path::PathBuf,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::{Duration, Instant},
};

use image::DynamicImage;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  category::{Category, ClassTable},
  config::AnalysisSettings,
  frame::{FrameError, NormalizedImage, RawFrame, TargetSize},
  model::{Model, PredictionResult, Probabilities, classify},
};

/// 解码后的视频帧来源
pub trait FrameSource {
  /// 容器中记录的帧率，未知时为 `None`
  fn fps(&self) -> Option<f64>;

  fn total_frames(&self) -> Option<u64>;

  /// 读取下一帧；视频结束时返回 `None`，单帧解码失败时返回 `Some(Err(..))`
  fn next_frame(&mut self) -> Option<Result<RawFrame, FrameError>>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
  fn fps(&self) -> Option<f64> {
    (**self).fps()
  }

  fn total_frames(&self) -> Option<u64> {
    (**self).total_frames()
  }

  fn next_frame(&mut self) -> Option<Result<RawFrame, FrameError>> {
    (**self).next_frame()
  }
}

#[derive(Error, Debug)]
pub enum VideoError {
  #[error("Failed to open video {}: {reason}", .path.display())]
  Open { path: PathBuf, reason: String },
}

/// 抽帧间隔换算为帧数，至少为 1
pub fn frame_skip(fps: f64, interval_secs: f64) -> u64 {
  if !(fps.is_finite() && fps > 0.0 && interval_secs.is_finite() && interval_secs > 0.0) {
    return 1;
  }
  let skip = (fps * interval_secs).round();
  if skip < 1.0 { 1 } else { skip as u64 }
}

/// 帧在视频中的时间（秒）；帧率无效时直接使用帧序号
pub fn frame_timestamp(frame_index: u64, fps: f64) -> f64 {
  if fps.is_finite() && fps > 0.0 {
    frame_index as f64 / fps
  } else {
    frame_index as f64
  }
}

/// 一个被抽中帧的分类结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameRecord {
  pub frame_index: u64,
  pub timestamp_seconds: f64,
  pub category_display_name: &'static str,
  pub confidence_percent: f32,
  pub category_id: Category,
}

impl FrameRecord {
  fn new(frame_index: u64, fps: f64, prediction: &PredictionResult) -> Self {
    Self {
      frame_index,
      timestamp_seconds: frame_timestamp(frame_index, fps),
      category_display_name: prediction.category.display_name(),
      confidence_percent: prediction.confidence_percent,
      category_id: prediction.category,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoProgress {
  pub frame_index: u64,
  pub total_frames: Option<u64>,
  /// 0.0 ~ 1.0；总帧数未知时循环变化
  pub fraction: f32,
}

/// 接收视频处理进度，也可以请求提前结束
pub trait ProgressSink {
  fn report(&mut self, progress: &VideoProgress);

  fn is_cancelled(&self) -> bool {
    false
  }
}

impl<F: FnMut(&VideoProgress)> ProgressSink for F {
  fn report(&mut self, progress: &VideoProgress) {
    self(progress)
  }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
  fn report(&mut self, _progress: &VideoProgress) {}
}

/// 通过日志输出进度，共享的标志位被置起时请求取消
#[derive(Debug, Default)]
pub struct TracingProgress {
  cancel: Option<Arc<AtomicBool>>,
  last_step: u32,
}

impl TracingProgress {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
    self.cancel = Some(flag);
    self
  }
}

impl ProgressSink for TracingProgress {
  fn report(&mut self, progress: &VideoProgress) {
    match progress.total_frames {
      Some(total) => {
        let step = (progress.fraction * 10.0) as u32;
        if step > self.last_step {
          self.last_step = step;
          info!(
            "视频处理进度: {:.0}% ({}/{})",
            progress.fraction * 100.0,
            progress.frame_index + 1,
            total
          );
        }
      }
      None => {
        if progress.frame_index % 100 == 0 {
          info!("视频处理中... 已读取 {} 帧", progress.frame_index + 1);
        }
      }
    }
  }

  fn is_cancelled(&self) -> bool {
    self
      .cancel
      .as_ref()
      .is_some_and(|flag| flag.load(Ordering::SeqCst))
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerConfig {
  pub frame_interval_secs: f64,
  pub confidence_threshold_percent: f32,
  pub target_size: TargetSize,
}

impl SamplerConfig {
  pub fn from_settings(settings: &AnalysisSettings, target_size: TargetSize) -> Self {
    Self {
      frame_interval_secs: settings.frame_interval_secs(),
      confidence_threshold_percent: settings.threshold_percent(),
      target_size,
    }
  }
}

/// 一次视频分析的结果
#[derive(Debug, Clone)]
pub struct VideoReport {
  pub source: String,
  /// 按帧序号递增
  pub records: Vec<FrameRecord>,
  pub elapsed: Duration,
  pub frames_read: u64,
  pub frames_failed: u64,
  pub frame_skip: u64,
  pub fps: Option<f64>,
  pub stopped_early: bool,
}

impl VideoReport {
  /// 出现次数最多的已知类别及其次数，次数相同时取先出现的
  pub fn dominant_category(&self) -> Option<(Category, usize)> {
    let mut counts: Vec<(Category, usize)> = Vec::new();
    for record in self.records.iter().filter(|r| !r.category_id.is_unknown()) {
      match counts.iter_mut().find(|(c, _)| *c == record.category_id) {
        Some((_, n)) => *n += 1,
        None => counts.push((record.category_id, 1)),
      }
    }

    counts
      .into_iter()
      .fold(None, |best, (category, n)| match best {
        Some((_, bn)) if n <= bn => best,
        _ => Some((category, n)),
      })
  }
}

enum Phase {
  Read,
  Sample(RawFrame),
  Normalize(RawFrame),
  Classify(NormalizedImage),
  Emit(PredictionResult),
  Advance,
  Close,
  Finished,
}

impl Phase {
  fn name(&self) -> &'static str {
    match self {
      Phase::Read => "read",
      Phase::Sample(_) => "sample",
      Phase::Normalize(_) => "normalize",
      Phase::Classify(_) => "classify",
      Phase::Emit(_) => "emit",
      Phase::Advance => "advance",
      Phase::Close => "close",
      Phase::Finished => "finished",
    }
  }
}

/// 视频抽帧分类状态机
pub struct VideoSampler<'a, S, M: ?Sized> {
  source: Option<S>,
  model: &'a M,
  table: &'a ClassTable,
  config: SamplerConfig,
  source_name: String,
  phase: Phase,
  fps: Option<f64>,
  total_frames: Option<u64>,
  frame_skip: u64,
  frame_index: u64,
  frames_read: u64,
  frames_sampled: u64,
  frames_failed: u64,
  records: Vec<FrameRecord>,
  stopped_early: bool,
  started: Instant,
  elapsed: Duration,
}

impl<'a, S, M> VideoSampler<'a, S, M>
where
  S: FrameSource,
  M: Model<Input = NormalizedImage, Output = Probabilities> + ?Sized,
  M::Error: std::fmt::Display,
{
  pub fn new(source: S, model: &'a M, table: &'a ClassTable, config: SamplerConfig) -> Self {
    let fps = source.fps().filter(|f| f.is_finite() && *f > 0.0);
    let total_frames = source.total_frames().filter(|&n| n > 0);
    let frame_skip = frame_skip(fps.unwrap_or(0.0), config.frame_interval_secs);

    match fps {
      Some(fps) => info!(
        "视频 fps {:.2}, 每 {:.1} 秒抽取一帧 (每 {} 帧)",
        fps, config.frame_interval_secs, frame_skip
      ),
      None => warn!("无法获取视频帧率, 逐帧处理并以帧序号作为时间"),
    }

    Self {
      source: Some(source),
      model,
      table,
      config,
      source_name: String::new(),
      phase: Phase::Read,
      fps,
      total_frames,
      frame_skip,
      frame_index: 0,
      frames_read: 0,
      frames_sampled: 0,
      frames_failed: 0,
      records: Vec::new(),
      stopped_early: false,
      started: Instant::now(),
      elapsed: Duration::ZERO,
    }
  }

  pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
    self.source_name = name.into();
    self
  }

  pub fn frame_skip(&self) -> u64 {
    self.frame_skip
  }

  pub fn records(&self) -> &[FrameRecord] {
    &self.records
  }

  pub fn is_finished(&self) -> bool {
    matches!(self.phase, Phase::Finished)
  }

  /// 前进一个阶段，结束后返回 `false`
  pub fn step(&mut self, progress: &mut dyn ProgressSink) -> bool {
    let phase = std::mem::replace(&mut self.phase, Phase::Finished);
    self.phase = match phase {
      Phase::Read => self.read(progress),
      Phase::Sample(frame) => {
        if self.frame_index % self.frame_skip == 0 {
          self.frames_sampled += 1;
          Phase::Normalize(frame)
        } else {
          Phase::Advance
        }
      }
      Phase::Normalize(frame) => self.normalize(frame),
      Phase::Classify(image) => {
        let prediction = classify(
          self.model,
          &image,
          self.table,
          self.config.confidence_threshold_percent,
        );
        if prediction.is_degraded() {
          self.frames_failed += 1;
          warn!("第 {} 帧推理失败, 跳过", self.frame_index);
          Phase::Advance
        } else {
          Phase::Emit(prediction)
        }
      }
      Phase::Emit(prediction) => {
        let record = FrameRecord::new(self.frame_index, self.fps.unwrap_or(0.0), &prediction);
        debug!(
          "第 {} 帧 ({:.2}s): {} {:.2}%",
          record.frame_index, record.timestamp_seconds, record.category_id, record.confidence_percent
        );
        self.records.push(record);
        Phase::Advance
      }
      Phase::Advance => {
        progress.report(&self.progress());
        self.frame_index += 1;
        Phase::Read
      }
      Phase::Close => {
        // 释放解码器
        self.source = None;
        self.elapsed = self.started.elapsed();
        info!(
          "视频处理完成: 读取 {} 帧, 抽取 {} 帧, 失败 {} 帧, 耗时 {:.2?}",
          self.frames_read, self.frames_sampled, self.frames_failed, self.elapsed
        );
        Phase::Finished
      }
      Phase::Finished => Phase::Finished,
    };
    !self.is_finished()
  }

  /// 运行至结束并返回结果
  pub fn run(mut self, progress: &mut dyn ProgressSink) -> VideoReport {
    while self.step(progress) {}
    self.into_report()
  }

  fn read(&mut self, progress: &dyn ProgressSink) -> Phase {
    if progress.is_cancelled() {
      info!("视频处理已取消, 停止于第 {} 帧", self.frame_index);
      self.stopped_early = true;
      return Phase::Close;
    }

    let Some(source) = self.source.as_mut() else {
      return Phase::Close;
    };

    match source.next_frame() {
      None => Phase::Close,
      Some(Ok(frame)) => {
        self.frames_read += 1;
        Phase::Sample(frame)
      }
      Some(Err(e)) => {
        self.frames_read += 1;
        self.frames_failed += 1;
        warn!("第 {} 帧解码失败, 跳过: {}", self.frame_index, e);
        Phase::Advance
      }
    }
  }

  fn normalize(&mut self, frame: RawFrame) -> Phase {
    let normalized = frame
      .to_rgb_image()
      .map_err(|e| e.to_string())
      .and_then(|rgb| {
        NormalizedImage::from_image(&DynamicImage::ImageRgb8(rgb), self.config.target_size)
          .map_err(|e| e.to_string())
      });

    match normalized {
      Ok(image) => Phase::Classify(image),
      Err(e) => {
        self.frames_failed += 1;
        warn!("第 {} 帧预处理失败, 跳过: {}", self.frame_index, e);
        Phase::Advance
      }
    }
  }

  fn progress(&self) -> VideoProgress {
    let fraction = match self.total_frames {
      Some(total) => ((self.frame_index + 1) as f32 / total as f32).min(1.0),
      None => (self.frames_sampled % 100) as f32 / 100.0,
    };
    VideoProgress {
      frame_index: self.frame_index,
      total_frames: self.total_frames,
      fraction,
    }
  }

  fn into_report(self) -> VideoReport {
    if !self.is_finished() {
      debug!("视频处理未完成即生成报告, 当前阶段 {}", self.phase.name());
    }
    VideoReport {
      source: self.source_name,
      records: self.records,
      elapsed: self.elapsed,
      frames_read: self.frames_read,
      frames_failed: self.frames_failed,
      frame_skip: self.frame_skip,
      fps: self.fps,
      stopped_early: self.stopped_early,
    }
  }
}

/// 打开视频文件并完成整个分析
#[cfg(feature = "gstreamer_input")]
pub fn analyze<M>(
  path: &std::path::Path,
  model: &M,
  table: &ClassTable,
  config: SamplerConfig,
  progress: &mut dyn ProgressSink,
) -> Result<VideoReport, VideoError>
where
  M: Model<Input = NormalizedImage, Output = Probabilities> + ?Sized,
  M::Error: std::fmt::Display,
{
  let source = crate::input::GStreamerVideo::open(path).map_err(|e| VideoError::Open {
    path: path.to_path_buf(),
    reason: e.to_string(),
  })?;

  Ok(
    VideoSampler::new(source, model, table, config)
      .with_source_name(path.display().to_string())
      .run(progress),
  )
}
