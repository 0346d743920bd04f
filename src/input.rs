// 该文件是 Huishou （回收分类） 项目的一部分。
// src/input.rs - 图像/视频输入
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

use image::DynamicImage;
use thiserror::Error;

use crate::{FromUrl, FromUrlWithScheme};

mod read_image_file;
pub use self::read_image_file::{BytesImageInput, DecodeError, ImageFileInput, decode_image_bytes};

mod fetch_url;
pub use self::fetch_url::{FetchError, UrlImageInput};

mod uploaded_video;
pub use self::uploaded_video::{UploadError, UploadedVideo};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{GStreamerInputError, GStreamerVideo};

#[derive(Error, Debug)]
pub enum ImageInputError {
  #[error("Image fetch error: {0}")]
  Fetch(#[from] FetchError),
  #[error("Image file input error: {0}")]
  Decode(#[from] DecodeError),
  #[error("Unsupported input scheme: {0}")]
  SchemeMismatch(String),
  #[error("Invalid input source: {0}")]
  InvalidSource(String),
}

/// 把命令行给出的路径或 URL 统一转换为 URL
///
/// 带 scheme 的字符串按 URL 解析，其余按本地路径处理。
pub fn source_url(source: &str) -> Result<url::Url, ImageInputError> {
  if let Ok(url) = url::Url::parse(source)
    && url.scheme().len() > 1
  {
    return Ok(url);
  }

  let path = std::path::Path::new(source);
  let absolute = std::path::absolute(path)
    .map_err(|e| ImageInputError::InvalidSource(format!("{source}: {e}")))?;
  url::Url::from_file_path(&absolute).map_err(|_| ImageInputError::InvalidSource(source.to_string()))
}

/// 单张图像输入，迭代时产出一张图像
pub enum InputWrapper {
  ImageFile(ImageFileInput),
  Url(UrlImageInput),
  Bytes(BytesImageInput),
}

impl FromUrl for InputWrapper {
  type Error = ImageInputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ImageFileInput::SCHEME => Ok(InputWrapper::ImageFile(ImageFileInput::from_url(url)?)),
      "http" | "https" => Ok(InputWrapper::Url(UrlImageInput::from_url(url)?)),
      other => Err(ImageInputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl From<BytesImageInput> for InputWrapper {
  fn from(input: BytesImageInput) -> Self {
    InputWrapper::Bytes(input)
  }
}

impl Iterator for InputWrapper {
  type Item = DynamicImage;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::ImageFile(input) => input.next(),
      InputWrapper::Url(input) => input.next(),
      InputWrapper::Bytes(input) => input.next(),
    }
  }
}
