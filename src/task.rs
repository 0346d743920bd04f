// 该文件是 Huishou （回收分类） 项目的一部分。
// src/task.rs - 分类任务
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

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};

use image::DynamicImage;
use tracing::{info, warn};

use crate::{
  category::ClassTable,
  frame::{NormalizedImage, TargetSize, normalize},
  model::{ImageReport, Model, Probabilities, classify},
  output::Render,
  video::{FrameSource, SamplerConfig, TracingProgress, VideoReport, VideoSampler},
};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 对单张图像分类
pub struct OneShotTask<'a> {
  table: &'a ClassTable,
  target_size: TargetSize,
  threshold_percent: f32,
  source_name: String,
}

impl<'a> OneShotTask<'a> {
  pub fn new(table: &'a ClassTable, target_size: TargetSize, threshold_percent: f32) -> Self {
    Self {
      table,
      target_size,
      threshold_percent,
      source_name: String::new(),
    }
  }

  pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
    self.source_name = name.into();
    self
  }
}

impl<
  ME: std::fmt::Display,
  RE: std::error::Error + Sync + Send + 'static,
  S: FrameSource,
  M: Model<Input = NormalizedImage, Output = Probabilities, Error = ME>,
  O: Render<VideoReport, Error = RE>,
> Task<S, M, O> for VideoTask<'_>
{
  type Error = anyhow::Error;

  fn run_task(self, input: S, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始视频任务...");
    let mut progress = TracingProgress::new().with_cancel_flag(self.cancel_flag());

    let report = VideoSampler::new(input, &model, self.table, self.config)
      .with_source_name(self.source_name)
      .run(&mut progress);
    finish_video(report, output)
  }
}

#[cfg(feature = "gstreamer_input")]
impl VideoTask<'_> {
  /// 打开本地视频文件并运行任务，文件无法解码时返回 [`crate::video::VideoError::Open`]
  pub fn run_file<ME, RE, M, O>(self, path: &std::path::Path, model: M, output: O) -> anyhow::Result<()>
  where
    ME: std::fmt::Display,
    RE: std::error::Error + Sync + Send + 'static,
    M: Model<Input = NormalizedImage, Output = Probabilities, Error = ME>,
    O: Render<VideoReport, Error = RE>,
  {
    info!("开始视频任务: {}", path.display());
    let mut progress = TracingProgress::new().with_cancel_flag(self.cancel_flag());

    let mut report = crate::video::analyze(path, &model, self.table, self.config, &mut progress)?;
    if !self.source_name.is_empty() {
      report.source = self.source_name;
    }
    finish_video(report, output)
  }
}

fn finish_video<O>(report: VideoReport, output: O) -> anyhow::Result<()>
where
  O: Render<VideoReport>,
  O::Error: std::error::Error + Sync + Send + 'static,
{
  if report.stopped_early {
    warn!("视频任务被中断，输出部分结果");
  }

  output.render_result(&report)?;
  info!("任务完成，退出");
  Ok(())
}
