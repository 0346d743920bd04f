// 该文件是 Huishou （回收分类） 项目的一部分。
// src/provision/download.rs - 模型文件下载
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

use std::{
  fs::File,
  io::{BufWriter, ErrorKind, Read, Write},
  path::{Path, PathBuf},
  time::{Duration, Instant},
};

use reqwest::blocking::Client;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::FETCH_TIMEOUT;

pub const DOWNLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// 整个下载过程的超时，模型文件较大
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30 * 60);

const PARTIAL_SUFFIX: &str = "part";

#[derive(Error, Debug)]
pub enum DownloadError {
  #[error("HTTP request error: {0}")]
  Request(#[from] reqwest::Error),
  #[error("Unexpected HTTP status: {0}")]
  Status(u16),
  #[error("Model file I/O error: {0}")]
  Io(#[from] std::io::Error),
  #[error("Incomplete download: expected {expected} bytes, got {actual}")]
  Incomplete { expected: u64, actual: u64 },
}

/// 一次下载的数据流
pub struct ArtifactStream {
  /// 总字节数，服务器未提供时为 `None`
  pub total: Option<u64>,
  pub reader: Box<dyn Read + Send>,
}

pub trait ArtifactSource {
  fn open(&self, url: &Url) -> Result<ArtifactStream, DownloadError>;
}

impl<S: ArtifactSource + ?Sized> ArtifactSource for Box<S> {
  fn open(&self, url: &Url) -> Result<ArtifactStream, DownloadError> {
    (**self).open(url)
  }
}

pub struct HttpArtifactSource {
  client: Client,
}

impl HttpArtifactSource {
  pub fn new() -> Result<Self, DownloadError> {
    let client = Client::builder()
      .connect_timeout(FETCH_TIMEOUT)
      .timeout(DOWNLOAD_TIMEOUT)
      .build()?;
    Ok(Self { client })
  }

  pub fn with_client(client: Client) -> Self {
    Self { client }
  }
}

impl ArtifactSource for HttpArtifactSource {
  fn open(&self, url: &Url) -> Result<ArtifactStream, DownloadError> {
    let response = self.client.get(url.as_str()).send()?;
    let status = response.status();
    if !status.is_success() {
      warn!("下载 {} 返回状态 {}", url, status);
      return Err(DownloadError::Status(status.as_u16()));
    }

    let total = response.content_length().filter(|&len| len > 0);
    debug!("远程文件大小: {:?}", total);

    Ok(ArtifactStream {
      total,
      reader: Box::new(response),
    })
  }
}

pub trait DownloadProgress {
  fn on_progress(&mut self, downloaded: u64, total: Option<u64>);

  fn on_complete(&mut self, _downloaded: u64) {}
}

impl<F: FnMut(u64, Option<u64>)> DownloadProgress for F {
  fn on_progress(&mut self, downloaded: u64, total: Option<u64>) {
    self(downloaded, total)
  }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl DownloadProgress for NoProgress {
  fn on_progress(&mut self, _downloaded: u64, _total: Option<u64>) {}
}

/// 通过日志输出下载进度
#[derive(Debug)]
pub struct LogProgress {
  started: Instant,
  last_step: u64,
}

impl Default for LogProgress {
  fn default() -> Self {
    Self::new()
  }
}

impl LogProgress {
  /// 总大小未知时每 16 MB 记录一次
  const UNKNOWN_TOTAL_STEP: u64 = 16 * 1024 * 1024;

  pub fn new() -> Self {
    Self {
      started: Instant::now(),
      last_step: 0,
    }
  }
}

impl DownloadProgress for LogProgress {
  fn on_progress(&mut self, downloaded: u64, total: Option<u64>) {
    let mb = downloaded as f64 / (1024.0 * 1024.0);
    let elapsed = self.started.elapsed().as_secs_f64();
    let speed = if elapsed > 0.0 { mb / elapsed } else { 0.0 };

    match total.filter(|&total| total > 0) {
      Some(total) => {
        let percent = (downloaded.min(total) * 100) / total;
        let step = percent / 10;
        if step > self.last_step {
          self.last_step = step;
          info!(
            "下载中... {}% ({:.1}/{:.1} MB @ {:.2} MB/s)",
            percent,
            mb,
            total as f64 / (1024.0 * 1024.0),
            speed
          );
        }
      }
      None => {
        let step = downloaded / Self::UNKNOWN_TOTAL_STEP;
        if step > self.last_step {
          self.last_step = step;
          info!("下载中... {:.1} MB @ {:.2} MB/s", mb, speed);
        }
      }
    }
  }

  fn on_complete(&mut self, downloaded: u64) {
    info!(
      "模型下载完成: {:.1} MB, 耗时 {:.2?}",
      downloaded as f64 / (1024.0 * 1024.0),
      self.started.elapsed()
    );
  }
}

/// 下载过程中使用的临时文件路径
pub fn partial_path(dest: &Path) -> PathBuf {
  let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
  name.push(".");
  name.push(PARTIAL_SUFFIX);
  dest.with_file_name(name)
}

/// 把 `url` 下载到 `dest`，返回下载的字节数
///
/// 先写入 `<dest>.part`，成功后再重命名；任何失败都会删除临时文件。
pub fn fetch_artifact<S: ArtifactSource + ?Sized>(
  source: &S,
  url: &Url,
  dest: &Path,
  progress: &mut dyn DownloadProgress,
) -> Result<u64, DownloadError> {
  if let Some(parent) = dest.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)?;
  }

  let partial = partial_path(dest);
  let result = stream_to_file(source, url, &partial, progress)
    .and_then(|size| std::fs::rename(&partial, dest).map(|_| size).map_err(DownloadError::from));

  match result {
    Ok(size) => {
      progress.on_complete(size);
      Ok(size)
    }
    Err(e) => {
      if partial.exists() {
        match std::fs::remove_file(&partial) {
          Ok(()) => debug!("已删除未完成的下载文件: {}", partial.display()),
          Err(re) => warn!("删除未完成的下载文件失败: {}: {}", partial.display(), re),
        }
      }
      Err(e)
    }
  }
}

fn stream_to_file<S: ArtifactSource + ?Sized>(
  source: &S,
  url: &Url,
  path: &Path,
  progress: &mut dyn DownloadProgress,
) -> Result<u64, DownloadError> {
  let ArtifactStream { total, mut reader } = source.open(url)?;
  let total = total.filter(|&len| len > 0);
  let mut writer = BufWriter::new(File::create(path)?);
  let mut buf = vec![0u8; DOWNLOAD_CHUNK_SIZE];
  let mut downloaded = 0u64;

  loop {
    let n = match reader.read(&mut buf) {
      Ok(0) => break,
      Ok(n) => n,
      Err(e) if e.kind() == ErrorKind::Interrupted => continue,
      Err(e) => return Err(e.into()),
    };
    writer.write_all(&buf[..n])?;
    downloaded += n as u64;
    progress.on_progress(downloaded, total);
  }

  writer.flush()?;
  writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;

  if let Some(expected) = total
    && downloaded < expected
  {
    return Err(DownloadError::Incomplete {
      expected,
      actual: downloaded,
    });
  }

  Ok(downloaded)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{local_client, serve_once};
  use std::io::Cursor;

  struct FixedSource {
    total: Option<u64>,
    body: Vec<u8>,
  }

  impl ArtifactSource for FixedSource {
    fn open(&self, _url: &Url) -> Result<ArtifactStream, DownloadError> {
      Ok(ArtifactStream {
        total: self.total,
        reader: Box::new(Cursor::new(self.body.clone())),
      })
    }
  }

  fn url() -> Url {
    Url::parse("https://models.example.com/model.onnx").unwrap()
  }

  #[test]
  fn partial_path_appends_suffix() {
    assert_eq!(
      partial_path(Path::new("/tmp/cache/model.onnx")),
      PathBuf::from("/tmp/cache/model.onnx.part")
    );
  }

  #[test]
  fn progress_is_reported_per_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("nested/model.onnx");
    let body = vec![1u8; DOWNLOAD_CHUNK_SIZE * 2 + 10];
    let source = FixedSource {
      total: Some(body.len() as u64),
      body: body.clone(),
    };

    let mut reported = Vec::new();
    let mut progress = |d: u64, t: Option<u64>| reported.push((d, t));
    let size = fetch_artifact(&source, &url(), &dest, &mut progress).unwrap();

    assert_eq!(size, body.len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), body);
    assert!(reported.len() >= 3);
    assert!(reported.windows(2).all(|w| w[0].0 < w[1].0));
    assert_eq!(reported.last(), Some(&(body.len() as u64, Some(body.len() as u64))));
  }

  #[test]
  fn unknown_total_reports_bytes_only() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("model.onnx");
    let source = FixedSource {
      total: None,
      body: vec![9u8; 100],
    };

    let mut reported = Vec::new();
    let mut progress = |d: u64, t: Option<u64>| reported.push((d, t));
    fetch_artifact(&source, &url(), &dest, &mut progress).unwrap();
    assert_eq!(reported, vec![(100, None)]);
  }

  #[test]
  fn truncated_body_is_incomplete_and_removed() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("model.onnx");
    let source = FixedSource {
      total: Some(1000),
      body: vec![0u8; 100],
    };

    let err = fetch_artifact(&source, &url(), &dest, &mut NoProgress).unwrap_err();
    assert!(matches!(
      err,
      DownloadError::Incomplete {
        expected: 1000,
        actual: 100
      }
    ));
    assert!(!dest.exists());
    assert!(!partial_path(&dest).exists());
  }

  #[test]
  fn zero_total_is_treated_as_unknown() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("model.onnx");
    let source = FixedSource {
      total: Some(0),
      body: vec![7u8; 10],
    };

    let size = fetch_artifact(&source, &url(), &dest, &mut LogProgress::new()).unwrap();
    assert_eq!(size, 10);
    assert_eq!(std::fs::read(&dest).unwrap(), vec![7u8; 10]);
    assert!(!partial_path(&dest).exists());

    let mut reported = Vec::new();
    let mut progress = |d: u64, t: Option<u64>| reported.push((d, t));
    fetch_artifact(&source, &url(), &dir.path().join("again.onnx"), &mut progress).unwrap();
    assert_eq!(reported, vec![(10, None)]);
  }

  #[test]
  fn log_progress_survives_zero_total() {
    let mut progress = LogProgress::new();
    progress.on_progress(5, Some(0));
    assert_eq!(progress.last_step, 0);
  }

  #[test]
  fn http_source_reports_content_length() {
    let body = vec![3u8; 2048];
    let url = serve_once("200 OK", body.clone());
    let source = HttpArtifactSource::with_client(local_client());
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("model.onnx");

    let mut reported = Vec::new();
    let mut progress = |d: u64, t: Option<u64>| reported.push((d, t));
    let size = fetch_artifact(&source, &url, &dest, &mut progress).unwrap();

    assert_eq!(size, 2048);
    assert_eq!(std::fs::read(&dest).unwrap(), body);
    assert!(!reported.is_empty());
    assert!(reported.iter().all(|&(_, t)| t == Some(2048)));
    assert_eq!(reported.last().map(|r| r.0), Some(2048));
  }

  #[test]
  fn http_error_status_writes_nothing() {
    let url = serve_once("404 Not Found", b"missing".to_vec());
    let source = HttpArtifactSource::with_client(local_client());
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("model.onnx");

    let err = fetch_artifact(&source, &url, &dest, &mut NoProgress).unwrap_err();
    assert!(matches!(err, DownloadError::Status(404)));
    assert!(!dest.exists());
    assert!(!partial_path(&dest).exists());
  }

  #[test]
  fn log_progress_handles_both_totals() {
    let mut progress = LogProgress::new();
    progress.on_progress(10, Some(100));
    progress.on_progress(100, Some(100));
    assert_eq!(progress.last_step, 10);

    let mut progress = LogProgress::new();
    progress.on_progress(LogProgress::UNKNOWN_TOTAL_STEP * 2, None);
    assert_eq!(progress.last_step, 2);
  }
}
