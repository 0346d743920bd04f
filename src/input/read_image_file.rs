// 该文件是 Huishou （回收分类） 项目的一部分。
// src/input/read_image_file.rs - 图像文件与上传数据输入
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

use image::{DynamicImage, ImageReader};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("URI scheme mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(std::io::Error),
  #[error("Image decoding error: {0}")]
  ImageLoadError(image::ImageError),
}

impl From<std::io::Error> for DecodeError {
  fn from(err: std::io::Error) -> Self {
    DecodeError::IoError(err)
  }
}

impl From<image::ImageError> for DecodeError {
  fn from(err: image::ImageError) -> Self {
    DecodeError::ImageLoadError(err)
  }
}

/// 解码上传的图像数据，格式由内容推断；统一转换为 RGB
pub fn decode_image_bytes(bytes: &[u8]) -> Result<DynamicImage, DecodeError> {
  let image = image::load_from_memory(bytes)?;
  debug!("图像解码完成: {}x{}", image.width(), image.height());
  Ok(DynamicImage::ImageRgb8(image.to_rgb8()))
}

pub struct ImageFileInput {
  image: Option<DynamicImage>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "file";
}

impl FromUrl for ImageFileInput {
  type Error = DecodeError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(DecodeError::SchemaMismatch);
    }

    let path = url.to_file_path().map_err(|_| DecodeError::SchemaMismatch)?;
    let image = ImageReader::open(&path)?.with_guessed_format()?.decode()?;
    debug!(
      "读取图像文件 {}: {}x{}",
      path.display(),
      image.width(),
      image.height()
    );

    Ok(ImageFileInput {
      image: Some(DynamicImage::ImageRgb8(image.to_rgb8())),
    })
  }
}

impl Iterator for ImageFileInput {
  type Item = DynamicImage;

  fn next(&mut self) -> Option<Self::Item> {
    self.image.take()
  }
}

/// 上传的图像数据
pub struct BytesImageInput {
  image: Option<DynamicImage>,
}

impl BytesImageInput {
  pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
    Ok(Self {
      image: Some(decode_image_bytes(bytes)?),
    })
  }
}

impl Iterator for BytesImageInput {
  type Item = DynamicImage;

  fn next(&mut self) -> Option<Self::Item> {
    self.image.take()
  }
}
