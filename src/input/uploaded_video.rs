// 该文件是 Huishou （回收分类） 项目的一部分。
// src/input/uploaded_video.rs - 上传视频的临时存储
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

use std::{io::Write, path::Path};

use tempfile::TempPath;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::VIDEO_EXTENSIONS;

#[derive(Error, Debug)]
pub enum UploadError {
  #[error("Unsupported video container: {0}")]
  UnsupportedContainer(String),
  #[error("Failed to store uploaded video: {0}")]
  Io(#[from] std::io::Error),
}

/// 写入临时文件的上传视频，释放时删除文件
#[derive(Debug)]
pub struct UploadedVideo {
  path: Option<TempPath>,
}

impl UploadedVideo {
  pub fn is_supported(extension: &str) -> bool {
    let extension = extension.trim_start_matches('.');
    VIDEO_EXTENSIONS
      .iter()
      .any(|ext| ext.eq_ignore_ascii_case(extension))
  }

  /// 以 `extension` 为后缀保存上传内容，解码器据此识别容器格式
  pub fn persist(bytes: &[u8], extension: &str) -> Result<Self, UploadError> {
    if !Self::is_supported(extension) {
      return Err(UploadError::UnsupportedContainer(extension.to_string()));
    }

    let suffix = format!(".{}", extension.trim_start_matches('.').to_ascii_lowercase());
    let mut file = tempfile::Builder::new()
      .prefix("huishou-upload-")
      .suffix(&suffix)
      .tempfile()?;
    file.write_all(bytes)?;
    file.flush()?;

    let path = file.into_temp_path();
    debug!("上传视频已保存到 {} ({} 字节)", path.display(), bytes.len());
    Ok(Self { path: Some(path) })
  }

  pub fn path(&self) -> &Path {
    self.path.as_deref().unwrap_or(Path::new(""))
  }

  /// 立即删除临时文件
  pub fn close(mut self) -> Result<(), UploadError> {
    if let Some(path) = self.path.take() {
      path.close()?;
    }
    Ok(())
  }
}

impl Drop for UploadedVideo {
  fn drop(&mut self) {
    if let Some(path) = self.path.take() {
      let removed = path.to_path_buf();
      if let Err(e) = path.close() {
        warn!("删除临时视频文件失败: {}: {}", removed.display(), e);
      } else {
        debug!("已删除临时视频文件: {}", removed.display());
      }
    }
  }
}
