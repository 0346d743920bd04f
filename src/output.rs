// 该文件是 Huishou （回收分类） 项目的一部分。
// src/output.rs - 输出定义
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

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, model::ImageReport, video::VideoReport};

pub trait Render<Report>: Sized {
  type Error;
  fn render_result(&self, result: &Report) -> Result<(), Self::Error>;
}

mod console;
pub use self::console::{ConsoleOutput, format_image_report, format_video_report};

mod json_record;
pub use self::json_record::{JsonRecordOutput, JsonRecordOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("JSON record output error: {0}")]
  JsonRecordOutputError(#[from] JsonRecordOutputError),
  #[error("URI scheme mismatch")]
  SchemeMismatch,
}

pub enum OutputWrapper {
  Console(ConsoleOutput),
  JsonRecord(JsonRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ConsoleOutput::SCHEME => Ok(OutputWrapper::Console(ConsoleOutput::from_url(url)?)),
      JsonRecordOutput::SCHEME => {
        let output = JsonRecordOutput::from_url(url)?;
        Ok(OutputWrapper::JsonRecord(output))
      }
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl Render<ImageReport> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, result: &ImageReport) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Console(output) => {
        output.render_result(result).map_err(|never| match never {})
      }
      OutputWrapper::JsonRecord(output) => output.render_result(result).map_err(OutputError::from),
    }
  }
}

impl Render<VideoReport> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, result: &VideoReport) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Console(output) => {
        output.render_result(result).map_err(|never| match never {})
      }
      OutputWrapper::JsonRecord(output) => output.render_result(result).map_err(OutputError::from),
    }
  }
}
