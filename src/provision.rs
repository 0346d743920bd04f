// 该文件是 Huishou （回收分类） 项目的一部分。
// src/provision.rs - 模型下载、加载与缓存
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

//! # 模型供应
//!
//! [`ModelProvisioner`] 保证模型文件存在于本地缓存目录（不存在时下载），
//! 再将其加载为可推理的模型对象，并在 TTL 内复用同一个句柄。
//!
//! 下载与加载整体在互斥锁内完成，多个调用方同时请求时只会有一次下载。
//!
//! ```no_run
//! use huishou::provision::{HttpArtifactSource, LogProgress, ModelLocation, ModelProvisioner};
//! use huishou::model::TractLoader;
//! use huishou::config::TARGET_SIZE;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let provisioner = ModelProvisioner::new(HttpArtifactSource::new()?, TractLoader::new(TARGET_SIZE));
//! let location = ModelLocation::new(
//!   url::Url::parse("https://example.com/model.onnx")?,
//!   "./model_cache",
//!   "model.onnx",
//! );
//! let model = provisioner.obtain(&location, &mut LogProgress::new())?;
//! # Ok(())
//! # }
//! ```

use std::{
  path::{Path, PathBuf},
  sync::{Arc, Mutex, PoisonError},
  time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::config::MODEL_CACHE_TTL;

mod download;
pub use self::download::{
  ArtifactSource, ArtifactStream, DOWNLOAD_CHUNK_SIZE, DownloadError, DownloadProgress,
  HttpArtifactSource, LogProgress, NoProgress, fetch_artifact, partial_path,
};

#[derive(Error, Debug)]
pub enum LoadError {
  #[error("Model file I/O error: {0}")]
  Io(#[from] std::io::Error),
  #[error("Invalid model: {0}")]
  Model(String),
}

#[derive(Error, Debug)]
pub enum ProvisionError {
  #[error("Model download failed: {0}")]
  Download(#[from] DownloadError),
  #[error("Model load failed: {0}")]
  Load(#[from] LoadError),
}

/// 把本地文件加载为模型
pub trait ModelLoader {
  type Model;

  fn load(&self, path: &Path) -> Result<Self::Model, LoadError>;
}

pub trait Clock {
  fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> Instant {
    Instant::now()
  }
}

/// 模型的来源与本地缓存位置，同时作为缓存键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelLocation {
  pub url: Url,
  pub cache_dir: PathBuf,
  pub filename: String,
}

impl ModelLocation {
  pub fn new<P: Into<PathBuf>, S: Into<String>>(url: Url, cache_dir: P, filename: S) -> Self {
    Self {
      url,
      cache_dir: cache_dir.into(),
      filename: filename.into(),
    }
  }

  pub fn local_path(&self) -> PathBuf {
    self.cache_dir.join(&self.filename)
  }
}

struct CachedModel<M> {
  location: ModelLocation,
  handle: Arc<M>,
  loaded_at: Instant,
}

pub struct ModelProvisioner<S, L: ModelLoader, C = SystemClock> {
  source: S,
  loader: L,
  clock: C,
  ttl: Option<Duration>,
  slot: Mutex<Option<CachedModel<L::Model>>>,
}

impl<S: ArtifactSource, L: ModelLoader> ModelProvisioner<S, L> {
  pub fn new(source: S, loader: L) -> Self {
    Self {
      source,
      loader,
      clock: SystemClock,
      ttl: Some(MODEL_CACHE_TTL),
      slot: Mutex::new(None),
    }
  }
}

impl<S: ArtifactSource, L: ModelLoader, C: Clock> ModelProvisioner<S, L, C> {
  pub fn with_clock<C2: Clock>(self, clock: C2) -> ModelProvisioner<S, L, C2> {
    ModelProvisioner {
      source: self.source,
      loader: self.loader,
      clock,
      ttl: self.ttl,
      slot: self.slot,
    }
  }

  /// `None` 表示永不过期
  pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
    self.ttl = ttl;
    self
  }

  pub fn obtain(
    &self,
    location: &ModelLocation,
    progress: &mut dyn DownloadProgress,
  ) -> Result<Arc<L::Model>, ProvisionError> {
    let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);

    if let Some(cached) = slot.as_ref()
      && cached.location == *location
      && !self.is_expired(cached.loaded_at)
    {
      debug!("使用已缓存的模型: {}", location.local_path().display());
      return Ok(Arc::clone(&cached.handle));
    }

    let path = location.local_path();
    if path.is_file() {
      info!("模型文件已存在: {}", path.display());
    } else {
      info!("本地未找到模型文件, 开始下载: {}", location.url);
      let size = fetch_artifact(&self.source, &location.url, &path, progress)?;
      info!(
        "模型已保存到 {} ({:.1} MB)",
        path.display(),
        size as f64 / (1024.0 * 1024.0)
      );
    }

    let handle = Arc::new(self.loader.load(&path)?);
    *slot = Some(CachedModel {
      location: location.clone(),
      handle: Arc::clone(&handle),
      loaded_at: self.clock.now(),
    });

    Ok(handle)
  }

  /// 丢弃缓存的模型句柄，下次调用 [`Self::obtain`] 时重新加载
  pub fn invalidate(&self) {
    let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.take().is_some() {
      info!("模型缓存已失效");
    }
  }

  fn is_expired(&self, loaded_at: Instant) -> bool {
    self
      .ttl
      .is_some_and(|ttl| self.clock.now().saturating_duration_since(loaded_at) >= ttl)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{local_client, serve_once};
  use std::{
    io::{Cursor, Read},
    sync::atomic::{AtomicUsize, Ordering},
  };

  /// 每次打开都返回相同内容，并记录打开次数
  struct CountingSource {
    body: Vec<u8>,
    opened: AtomicUsize,
  }

  impl CountingSource {
    fn new(body: &[u8]) -> Self {
      Self {
        body: body.to_vec(),
        opened: AtomicUsize::new(0),
      }
    }
  }

  impl ArtifactSource for &CountingSource {
    fn open(&self, _url: &Url) -> Result<ArtifactStream, DownloadError> {
      self.opened.fetch_add(1, Ordering::SeqCst);
      Ok(ArtifactStream {
        total: Some(self.body.len() as u64),
        reader: Box::new(Cursor::new(self.body.clone())),
      })
    }
  }

  /// 读取一部分后中断
  struct BrokenReader {
    sent: usize,
  }

  impl Read for BrokenReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
      if self.sent >= 1024 {
        return Err(std::io::Error::new(
          std::io::ErrorKind::ConnectionReset,
          "connection reset",
        ));
      }
      let n = buf.len().min(256);
      buf[..n].fill(7);
      self.sent += n;
      Ok(n)
    }
  }

  struct InterruptedSource;

  impl ArtifactSource for InterruptedSource {
    fn open(&self, _url: &Url) -> Result<ArtifactStream, DownloadError> {
      Ok(ArtifactStream {
        total: Some(4096),
        reader: Box::new(BrokenReader { sent: 0 }),
      })
    }
  }

  /// 把文件内容当作模型
  struct BytesLoader {
    loads: AtomicUsize,
  }

  impl BytesLoader {
    fn new() -> Self {
      Self {
        loads: AtomicUsize::new(0),
      }
    }
  }

  impl ModelLoader for &BytesLoader {
    type Model = Vec<u8>;

    fn load(&self, path: &Path) -> Result<Self::Model, LoadError> {
      self.loads.fetch_add(1, Ordering::SeqCst);
      let bytes = std::fs::read(path)?;
      if bytes.starts_with(b"bad") {
        return Err(LoadError::Model("not a model".to_string()));
      }
      Ok(bytes)
    }
  }

  #[derive(Clone)]
  struct ManualClock {
    base: Instant,
    offset: Arc<Mutex<Duration>>,
  }

  impl ManualClock {
    fn new() -> Self {
      Self {
        base: Instant::now(),
        offset: Arc::new(Mutex::new(Duration::ZERO)),
      }
    }

    fn advance(&self, by: Duration) {
      *self.offset.lock().unwrap() += by;
    }
  }

  impl Clock for ManualClock {
    fn now(&self) -> Instant {
      self.base + *self.offset.lock().unwrap()
    }
  }

  fn location(dir: &Path) -> ModelLocation {
    ModelLocation::new(
      Url::parse("https://models.example.com/garbage.onnx").unwrap(),
      dir.join("cache"),
      "model.onnx",
    )
  }

  #[test]
  fn downloads_once_then_reuses_the_handle() {
    let dir = tempfile::tempdir().unwrap();
    let source = CountingSource::new(b"weights");
    let loader = BytesLoader::new();
    let provisioner = ModelProvisioner::new(&source, &loader);
    let location = location(dir.path());

    let first = provisioner.obtain(&location, &mut NoProgress).unwrap();
    let second = provisioner.obtain(&location, &mut NoProgress).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.as_slice(), b"weights");
    assert_eq!(source.opened.load(Ordering::SeqCst), 1);
    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    assert!(location.local_path().is_file());
    assert!(!partial_path(&location.local_path()).exists());
  }

  #[test]
  fn existing_file_is_never_downloaded() {
    let dir = tempfile::tempdir().unwrap();
    let location = location(dir.path());
    std::fs::create_dir_all(&location.cache_dir).unwrap();
    std::fs::write(location.local_path(), b"cached").unwrap();

    let source = CountingSource::new(b"remote");
    let loader = BytesLoader::new();
    let provisioner = ModelProvisioner::new(&source, &loader);

    let model = provisioner.obtain(&location, &mut NoProgress).unwrap();
    assert_eq!(model.as_slice(), b"cached");

    provisioner.invalidate();
    provisioner.obtain(&location, &mut NoProgress).unwrap();

    assert_eq!(source.opened.load(Ordering::SeqCst), 0);
    assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn expired_handle_is_reloaded_without_download() {
    let dir = tempfile::tempdir().unwrap();
    let source = CountingSource::new(b"weights");
    let loader = BytesLoader::new();
    let clock = ManualClock::new();
    let provisioner = ModelProvisioner::new(&source, &loader)
      .with_clock(clock.clone())
      .with_ttl(Some(Duration::from_secs(3600)));
    let location = location(dir.path());

    let first = provisioner.obtain(&location, &mut NoProgress).unwrap();
    clock.advance(Duration::from_secs(3599));
    let second = provisioner.obtain(&location, &mut NoProgress).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    clock.advance(Duration::from_secs(1));
    let third = provisioner.obtain(&location, &mut NoProgress).unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
    assert_eq!(source.opened.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn indefinite_ttl_never_expires() {
    let dir = tempfile::tempdir().unwrap();
    let source = CountingSource::new(b"weights");
    let loader = BytesLoader::new();
    let clock = ManualClock::new();
    let provisioner = ModelProvisioner::new(&source, &loader)
      .with_clock(clock.clone())
      .with_ttl(None);
    let location = location(dir.path());

    provisioner.obtain(&location, &mut NoProgress).unwrap();
    clock.advance(Duration::from_secs(365 * 24 * 3600));
    provisioner.obtain(&location, &mut NoProgress).unwrap();
    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn interrupted_download_leaves_no_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let loader = BytesLoader::new();
    let provisioner = ModelProvisioner::new(InterruptedSource, &loader);
    let location = location(dir.path());

    let mut reported = Vec::new();
    let mut progress = |downloaded: u64, total: Option<u64>| reported.push((downloaded, total));
    let err = provisioner.obtain(&location, &mut progress).unwrap_err();

    assert!(matches!(err, ProvisionError::Download(DownloadError::Io(_))));
    assert!(!location.local_path().exists());
    assert!(!partial_path(&location.local_path()).exists());
    assert_eq!(reported.last(), Some(&(1024, Some(4096))));
    assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn unloadable_file_is_a_load_failure() {
    let dir = tempfile::tempdir().unwrap();
    let source = CountingSource::new(b"bad weights");
    let loader = BytesLoader::new();
    let provisioner = ModelProvisioner::new(&source, &loader);

    let err = provisioner
      .obtain(&location(dir.path()), &mut NoProgress)
      .unwrap_err();
    assert!(matches!(err, ProvisionError::Load(LoadError::Model(_))));
  }

  #[test]
  fn different_location_replaces_the_cached_handle() {
    let dir = tempfile::tempdir().unwrap();
    let source = CountingSource::new(b"weights");
    let loader = BytesLoader::new();
    let provisioner = ModelProvisioner::new(&source, &loader);

    let a = location(dir.path());
    let mut b = location(dir.path());
    b.filename = "other.onnx".to_string();

    provisioner.obtain(&a, &mut NoProgress).unwrap();
    provisioner.obtain(&b, &mut NoProgress).unwrap();
    assert_eq!(source.opened.load(Ordering::SeqCst), 2);
    assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn http_not_found_leaves_cache_empty() {
    let dir = tempfile::tempdir().unwrap();
    let mut location = location(dir.path());
    location.url = serve_once("404 Not Found", b"no such model".to_vec());
    let loader = BytesLoader::new();
    let provisioner = ModelProvisioner::new(HttpArtifactSource::with_client(local_client()), &loader);

    let err = provisioner.obtain(&location, &mut NoProgress).unwrap_err();
    assert!(matches!(err, ProvisionError::Download(DownloadError::Status(404))));
    assert!(!location.local_path().exists());
    assert!(!partial_path(&location.local_path()).exists());
    assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn http_download_is_loaded_with_known_size() {
    let dir = tempfile::tempdir().unwrap();
    let mut location = location(dir.path());
    location.url = serve_once("200 OK", b"remote weights".to_vec());
    let loader = BytesLoader::new();
    let provisioner = ModelProvisioner::new(HttpArtifactSource::with_client(local_client()), &loader);

    let mut reported = Vec::new();
    let mut progress = |downloaded: u64, total: Option<u64>| reported.push((downloaded, total));
    let model = provisioner.obtain(&location, &mut progress).unwrap();

    assert_eq!(model.as_slice(), b"remote weights");
    assert_eq!(reported.last(), Some(&(14, Some(14))));
  }
}
