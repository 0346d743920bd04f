// 该文件是 Huishou （回收分类） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 视频文件解码
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

//! # GStreamer 视频解码
//!
//! 使用 `decodebin` 解码本地视频文件（mp4、avi、mov、mkv 等），
//! 通过 appsink 逐帧取出 BGR 图像，交给 [`crate::video::VideoSampler`]。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev \
//!   gstreamer1.0-plugins-good gstreamer1.0-libav
//! ```
//!
//! **macOS:**
//! ```bash
//! brew install gstreamer
//! ```
//!
//! ## 基本用法
//!
//! ```no_run
//! use huishou::{input::GStreamerVideo, video::FrameSource};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut video = GStreamerVideo::open("bin.mp4")?;
//! println!("fps: {:?}, 总帧数: {:?}", video.fps(), video.total_frames());
//! while let Some(frame) = video.next_frame() {
//!     let frame = frame?;
//!     println!("帧: {}x{}", frame.width, frame.height);
//! }
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{FrameError, PixelFormat, RawFrame},
  video::FrameSource,
};

const PIPELINE: &str =
  "filesrc name=src ! decodebin ! videoconvert ! video/x-raw,format=BGR ! appsink name=sink sync=false";

/// 等待管道预加载的最长时间
const PREROLL_TIMEOUT_SECS: u64 = 10;

const BYTES_PER_PIXEL: usize = 3;

/// GStreamer 输入错误类型
#[derive(Error, Debug)]
pub enum GStreamerInputError {
  /// URI scheme 不匹配（期望 "file://"）
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("Video file not found: {}", .0.display())]
  NotFound(PathBuf),
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("Failed to get element: {0}")]
  ElementNotFound(&'static str),
  /// 无法转换元素为 appsink
  #[error("Failed to convert element to appsink")]
  AppSinkConversionFailed,
  /// 无法从 caps 获取视频信息
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

/// 本地视频文件的逐帧解码器
///
/// 释放时管道进入 `Null` 状态，文件句柄随之关闭。
pub struct GStreamerVideo {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  fps: Option<f64>,
  total_frames: Option<u64>,
}

impl Drop for GStreamerVideo {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    } else {
      debug!("视频管道已关闭");
    }
  }
}

impl std::fmt::Debug for GStreamerVideo {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("GStreamerVideo")
      .field("fps", &self.fps)
      .field("total_frames", &self.total_frames)
      .finish()
  }
}

impl GStreamerVideo {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GStreamerInputError> {
    let path = path.as_ref();
    if !path.is_file() {
      return Err(GStreamerInputError::NotFound(path.to_path_buf()));
    }

    gst::init()?;
    info!("打开视频文件: {}", path.display());

    let pipeline = gst::parse::launch(PIPELINE)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    let src = pipeline
      .by_name("src")
      .ok_or(GStreamerInputError::ElementNotFound("src"))?;
    src.set_property("location", path.to_string_lossy().into_owned());

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::ElementNotFound("sink"))?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    // 构造 Self 之后出错时由 Drop 负责把管道置回 Null
    let mut video = GStreamerVideo {
      pipeline,
      appsink,
      fps: None,
      total_frames: None,
    };
    video.preroll()?;
    video.pipeline.set_state(gst::State::Playing)?;

    info!(
      "视频已打开: fps {:?}, 总帧数 {:?}",
      video.fps, video.total_frames
    );
    Ok(video)
  }

  /// 预加载到 `Paused`，从协商好的 caps 中读取帧率与时长
  fn preroll(&mut self) -> Result<(), GStreamerInputError> {
    self.pipeline.set_state(gst::State::Paused)?;
    let (result, _, _) = self
      .pipeline
      .state(gst::ClockTime::from_seconds(PREROLL_TIMEOUT_SECS));
    if let Err(e) = result {
      let reason = self.bus_error().unwrap_or_else(|| e.to_string());
      error!("视频预加载失败: {}", reason);
      return Err(GStreamerInputError::PipelineError(reason));
    }

    let caps = self
      .appsink
      .static_pad("sink")
      .and_then(|pad| pad.current_caps())
      .ok_or(GStreamerInputError::VideoInfoError)?;
    let info =
      gst_video::VideoInfo::from_caps(&caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

    let fps = info.fps();
    self.fps = if fps.numer() > 0 && fps.denom() > 0 {
      Some(fps.numer() as f64 / fps.denom() as f64)
    } else {
      None
    };

    self.total_frames = match (self.pipeline.query_duration::<gst::ClockTime>(), self.fps) {
      (Some(duration), Some(fps)) => {
        let frames = (duration.nseconds() as f64 / 1e9 * fps).round();
        (frames > 0.0).then_some(frames as u64)
      }
      _ => None,
    };

    Ok(())
  }

  fn bus_error(&self) -> Option<String> {
    let bus = self.pipeline.bus()?;
    let message = bus.pop_filtered(&[gst::MessageType::Error])?;
    match message.view() {
      gst::MessageView::Error(err) => Some(err.error().to_string()),
      _ => None,
    }
  }
}

impl FromUrlWithScheme for GStreamerVideo {
  const SCHEME: &'static str = "file";
}

impl FromUrl for GStreamerVideo {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerInputError::SchemeMismatch);
    }
    let path = url
      .to_file_path()
      .map_err(|_| GStreamerInputError::SchemeMismatch)?;
    Self::open(path)
  }
}

impl FrameSource for GStreamerVideo {
  fn fps(&self) -> Option<f64> {
    self.fps
  }

  fn total_frames(&self) -> Option<u64> {
    self.total_frames
  }

  fn next_frame(&mut self) -> Option<Result<RawFrame, FrameError>> {
    match self.appsink.pull_sample() {
      Ok(sample) => Some(convert_sample(&sample)),
      Err(e) => {
        if self.appsink.is_eos() {
          debug!("视频读取结束");
        } else {
          error!("Failed to pull sample: {}", e);
        }
        None
      }
    }
  }
}

fn convert_sample(sample: &gst::Sample) -> Result<RawFrame, FrameError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| FrameError::Decode("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| FrameError::Decode("No caps in sample".to_string()))?;
  let video_info = gst_video::VideoInfo::from_caps(caps)
    .map_err(|_| FrameError::Decode("Failed to get video info from caps".to_string()))?;

  let format = match video_info.format() {
    gst_video::VideoFormat::Bgr => PixelFormat::Bgr,
    gst_video::VideoFormat::Rgb => PixelFormat::Rgb,
    other => return Err(FrameError::Decode(format!("Unsupported video format: {other:?}"))),
  };

  let width = video_info.width() as usize;
  let height = video_info.height() as usize;
  let row_bytes = width * BYTES_PER_PIXEL;
  let stride = video_info
    .stride()
    .first()
    .map(|&s| s as usize)
    .unwrap_or(row_bytes);

  let map = buffer
    .map_readable()
    .map_err(|e| FrameError::Decode(format!("Failed to map buffer for reading: {e}")))?;
  let data = map.as_slice();

  // 每行末尾可能有对齐填充
  let expected = if height == 0 {
    0
  } else {
    (height - 1) * stride + row_bytes
  };
  if data.len() < expected || stride < row_bytes {
    return Err(FrameError::BufferSizeMismatch {
      expected,
      actual: data.len(),
    });
  }

  let mut pixels = Vec::with_capacity(row_bytes * height);
  for row in 0..height {
    let start = row * stride;
    pixels.extend_from_slice(&data[start..start + row_bytes]);
  }

  Ok(RawFrame {
    width: video_info.width(),
    height: video_info.height(),
    format,
    data: pixels.into_boxed_slice(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_file_is_reported_before_pipeline_setup() {
    assert!(matches!(
      GStreamerVideo::open("/definitely/not/here.mp4"),
      Err(GStreamerInputError::NotFound(p)) if p == Path::new("/definitely/not/here.mp4")
    ));
  }

  #[test]
  fn only_file_urls_are_accepted() {
    let url = Url::parse("https://example.com/bin.mp4").unwrap();
    assert!(matches!(
      GStreamerVideo::from_url(&url),
      Err(GStreamerInputError::SchemeMismatch)
    ));
  }
}
