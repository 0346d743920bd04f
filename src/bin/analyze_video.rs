// 该文件是 Huishou （回收分类） 项目的一部分。
// src/bin/analyze_video.rs - 视频抽帧分类
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
  io::Read,
  path::{Path, PathBuf},
};

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use huishou::{
  FromUrl,
  category::ClassTable,
  config::{
    AnalysisSettings, CACHE_DIR, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_FRAME_INTERVAL_SECS,
    LOCAL_MODEL_FILENAME, MODEL_DOWNLOAD_URL, TARGET_SIZE,
  },
  input::UploadedVideo,
  model::TractLoader,
  output::OutputWrapper,
  provision::{HttpArtifactSource, LogProgress, ModelLocation, ModelProvisioner},
  task::VideoTask,
  video::SamplerConfig,
};

/// 垃圾视频分类
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入视频：本地路径，或 `-` 从标准输入读取
  #[arg(long, value_name = "SOURCE")]
  pub input: String,

  /// 从标准输入读取时的容器格式（mp4、avi、mov、mkv）
  #[arg(long, default_value = "mp4", value_name = "EXT")]
  pub container: String,

  /// 置信度阈值（百分比），低于该值时结果为 unknown
  #[arg(
    long,
    default_value_t = DEFAULT_CONFIDENCE_THRESHOLD,
    value_parser = clap::value_parser!(u8).range(0..=100),
    value_name = "PERCENT"
  )]
  pub threshold: u8,

  /// 抽帧间隔（秒，0.5 - 10.0）
  #[arg(long, default_value_t = DEFAULT_FRAME_INTERVAL_SECS, value_name = "SECONDS")]
  pub interval: f64,

  /// 模型下载地址，必须是 ONNX 格式
  ///
  /// 默认地址假定仓库中发布了 ONNX 导出的模型；仓库只提供 Keras 模型时，
  /// 请先导出为 ONNX 并通过该参数指定地址。
  #[arg(long, default_value = MODEL_DOWNLOAD_URL, value_name = "URL")]
  pub model_url: Url,

  /// 模型缓存目录
  #[arg(long, default_value = CACHE_DIR, value_name = "DIR")]
  pub cache_dir: PathBuf,

  /// 类别表（JSON 数组，按模型输出顺序排列的类别 ID）
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,

  /// 输出方式：`console:` 或 `json:///path/to/report.json`
  #[arg(long, default_value = "console:", value_name = "OUTPUT")]
  pub output: Url,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入来源: {}", args.input);
  info!("模型地址: {}", args.model_url);
  info!("输出路径: {}", args.output);

  let settings = AnalysisSettings::new(args.threshold, args.interval)?;
  let table = match &args.labels {
    Some(path) => ClassTable::from_json_file(path)?,
    None => ClassTable::default(),
  };

  // 上传的视频在 `upload` 释放时删除，无论分析是否成功
  let upload = if args.input == "-" {
    let mut bytes = Vec::new();
    std::io::stdin().lock().read_to_end(&mut bytes)?;
    info!("从标准输入读取 {} 字节", bytes.len());
    Some(UploadedVideo::persist(&bytes, &args.container)?)
  } else {
    None
  };
  let (path, source_name) = match &upload {
    Some(upload) => (upload.path().to_path_buf(), "stdin".to_string()),
    None => (PathBuf::from(&args.input), args.input.clone()),
  };
  if upload.is_none() && !has_video_extension(&path) {
    warn!("{} 不是常见的视频格式, 仍尝试解码", path.display());
  }

  let provisioner = ModelProvisioner::new(HttpArtifactSource::new()?, TractLoader::new(TARGET_SIZE));
  let location = ModelLocation::new(args.model_url.clone(), &args.cache_dir, LOCAL_MODEL_FILENAME);
  let model = provisioner.obtain(&location, &mut LogProgress::new())?;
  if let Some(len) = model.output_len()
    && let Err(e) = table.check_output_len(len)
  {
    warn!("{}", e);
  }

  let output = OutputWrapper::from_url(&args.output)?;

  VideoTask::new(&table, SamplerConfig::from_settings(&settings, TARGET_SIZE))
    .with_source_name(source_name)
    .run_file(&path, model, output)
}

fn has_video_extension(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .is_some_and(UploadedVideo::is_supported)
}
