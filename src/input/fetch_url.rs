// 该文件是 Huishou （回收分类） 项目的一部分。
// src/input/fetch_url.rs - 通过 URL 获取图像
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
use reqwest::blocking::Client;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use super::read_image_file::{DecodeError, decode_image_bytes};
use crate::{FromUrl, config::FETCH_TIMEOUT};

#[derive(Error, Debug)]
pub enum FetchError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("HTTP request error: {0}")]
  Request(#[from] reqwest::Error),
  #[error("Unexpected HTTP status: {status}")]
  Status { status: u16 },
  #[error("Image decoding error: {0}")]
  Decode(#[from] DecodeError),
}

pub struct UrlImageInput {
  image: Option<DynamicImage>,
}

impl UrlImageInput {
  /// 使用给定的客户端获取并解码图像
  ///
  /// 非 2xx 状态直接返回错误，不会尝试解码响应内容。
  pub fn fetch_with(client: &Client, url: &Url) -> Result<Self, FetchError> {
    if !matches!(url.scheme(), "http" | "https") {
      return Err(FetchError::SchemeMismatch);
    }

    info!("获取图像: {}", url);
    let response = client.get(url.as_str()).send()?;
    let status = response.status();
    if !status.is_success() {
      warn!("获取图像 {} 返回状态 {}", url, status);
      return Err(FetchError::Status {
        status: status.as_u16(),
      });
    }

    let bytes = response.bytes()?;
    let image = decode_image_bytes(&bytes)?;
    Ok(Self { image: Some(image) })
  }
}

impl FromUrl for UrlImageInput {
  type Error = FetchError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let client = Client::builder().timeout(FETCH_TIMEOUT).build()?;
    Self::fetch_with(&client, url)
  }
}

impl Iterator for UrlImageInput {
  type Item = DynamicImage;

  fn next(&mut self) -> Option<Self::Item> {
    self.image.take()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{local_client, serve_once};
  use image::{ImageBuffer, ImageFormat, Rgb};
  use std::io::Cursor;

  #[test]
  fn not_found_is_a_fetch_error() {
    let url = serve_once("404 Not Found", b"<html>missing</html>".to_vec());
    assert!(matches!(
      UrlImageInput::fetch_with(&local_client(), &url),
      Err(FetchError::Status { status: 404 })
    ));
  }

  #[test]
  fn fetched_image_is_decoded() {
    let mut png = Vec::new();
    ImageBuffer::from_pixel(5, 7, Rgb([1u8, 2, 3]))
      .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
      .unwrap();
    let url = serve_once("200 OK", png);

    let mut input = UrlImageInput::fetch_with(&local_client(), &url).unwrap();
    let image = input.next().unwrap();
    assert_eq!((image.width(), image.height()), (5, 7));
  }

  #[test]
  fn non_image_body_is_a_decode_error() {
    let url = serve_once("200 OK", b"plain text".to_vec());
    assert!(matches!(
      UrlImageInput::fetch_with(&local_client(), &url),
      Err(FetchError::Decode(_))
    ));
  }

  #[test]
  fn non_http_scheme_is_rejected() {
    let url = Url::parse("file:///tmp/a.png").unwrap();
    assert!(matches!(
      UrlImageInput::from_url(&url),
      Err(FetchError::SchemeMismatch)
    ));
  }
}
