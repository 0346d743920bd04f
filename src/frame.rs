// 该文件是 Huishou （回收分类） 项目的一部分。
// src/frame.rs - 帧与归一化张量定义
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

use image::{DynamicImage, RgbImage, imageops::FilterType};
use thiserror::Error;

const RGB_CHANNELS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetSize {
  pub width: u32,
  pub height: u32,
}

impl TargetSize {
  pub const fn new(width: u32, height: u32) -> Self {
    Self { width, height }
  }

  pub const fn square(side: u32) -> Self {
    Self::new(side, side)
  }
}

impl std::fmt::Display for TargetSize {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}x{}", self.width, self.height)
  }
}

#[derive(Error, Debug)]
pub enum PreprocessError {
  #[error("Invalid image size: {width}x{height}")]
  EmptyImage { width: u32, height: u32 },
  #[error("Invalid target size: {0}")]
  InvalidTargetSize(TargetSize),
}

/// 归一化后的 NHWC 张量，形状为 `[1, H, W, 3]`，取值范围 `[0, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedImage {
  size: TargetSize,
  data: Box<[f32]>,
}

impl NormalizedImage {
  pub fn from_image(image: &DynamicImage, size: TargetSize) -> Result<Self, PreprocessError> {
    if size.width == 0 || size.height == 0 {
      return Err(PreprocessError::InvalidTargetSize(size));
    }
    if image.width() == 0 || image.height() == 0 {
      return Err(PreprocessError::EmptyImage {
        width: image.width(),
        height: image.height(),
      });
    }

    let resized = image
      .resize_exact(size.width, size.height, FilterType::Lanczos3)
      .to_rgb8();

    Ok(Self::from_rgb_image(&resized))
  }

  /// 不做缩放，直接按 8 位深度归一化
  pub fn from_rgb_image(image: &RgbImage) -> Self {
    let size = TargetSize::new(image.width(), image.height());
    let data = image
      .as_raw()
      .iter()
      .map(|&v| f32::from(v) / 255.0)
      .collect::<Vec<f32>>()
      .into_boxed_slice();

    Self { size, data }
  }

  pub fn size(&self) -> TargetSize {
    self.size
  }

  pub fn shape(&self) -> [usize; 4] {
    [
      1,
      self.size.height as usize,
      self.size.width as usize,
      RGB_CHANNELS,
    ]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  pub fn pixel(&self, x: u32, y: u32) -> Option<[f32; 3]> {
    if x >= self.size.width || y >= self.size.height {
      return None;
    }
    let idx = (y as usize * self.size.width as usize + x as usize) * RGB_CHANNELS;
    Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
  }
}

/// 按目标尺寸归一化任意输入图像
pub fn normalize(image: &DynamicImage, size: TargetSize) -> Result<NormalizedImage, PreprocessError> {
  NormalizedImage::from_image(image, size)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
  Rgb,
  Bgr,
}

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual}")]
  BufferSizeMismatch { expected: usize, actual: usize },
  #[error("Frame decoding error: {0}")]
  Decode(String),
}

/// 解码后的视频帧，HWC 排列
#[derive(Debug, Clone)]
pub struct RawFrame {
  pub width: u32,
  pub height: u32,
  pub format: PixelFormat,
  pub data: Box<[u8]>,
}

impl RawFrame {
  pub fn to_rgb_image(&self) -> Result<RgbImage, FrameError> {
    let width = self.width as usize;
    let height = self.height as usize;
    let expected = width * height * RGB_CHANNELS;
    let actual = self.data.len();
    if actual < expected {
      return Err(FrameError::BufferSizeMismatch { expected, actual });
    }

    let data = match self.format {
      PixelFormat::Rgb => self.data[..expected].to_vec(),
      PixelFormat::Bgr => {
        let mut rgb = vec![0u8; expected];
        for (dst, src) in rgb
          .chunks_exact_mut(RGB_CHANNELS)
          .zip(self.data[..expected].chunks_exact(RGB_CHANNELS))
        {
          dst[0] = src[2];
          dst[1] = src[1];
          dst[2] = src[0];
        }
        rgb
      }
    };

    RgbImage::from_raw(self.width, self.height, data)
      .ok_or(FrameError::BufferSizeMismatch { expected, actual })
  }
}
