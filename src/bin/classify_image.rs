// 该文件是 Huishou （回收分类） 项目的一部分。
// src/bin/classify_image.rs - 单张图像分类
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

use std::{io::Read, path::PathBuf};

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use huishou::{
  FromUrl,
  category::ClassTable,
  config::{
    AnalysisSettings, CACHE_DIR, DEFAULT_CONFIDENCE_THRESHOLD, LOCAL_MODEL_FILENAME,
    MODEL_DOWNLOAD_URL, TARGET_SIZE,
  },
  input::{BytesImageInput, InputWrapper, source_url},
  model::TractLoader,
  output::OutputWrapper,
  provision::{HttpArtifactSource, LogProgress, ModelLocation, ModelProvisioner},
  task::{OneShotTask, Task},
};

/// 垃圾图像分类
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入图像：本地路径、http(s) URL，或 `-` 从标准输入读取
  #[arg(long, value_name = "SOURCE")]
  pub input: String,

  /// 置信度阈值（百分比），低于该值时结果为 unknown
  #[arg(
    long,
    default_value_t = DEFAULT_CONFIDENCE_THRESHOLD,
    value_parser = clap::value_parser!(u8).range(0..=100),
    value_name = "PERCENT"
  )]
  pub threshold: u8,

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

  let settings = AnalysisSettings::default().with_confidence_threshold(args.threshold)?;
  let table = match &args.labels {
    Some(path) => ClassTable::from_json_file(path)?,
    None => ClassTable::default(),
  };

  let provisioner = ModelProvisioner::new(HttpArtifactSource::new()?, TractLoader::new(TARGET_SIZE));
  let location = ModelLocation::new(args.model_url.clone(), &args.cache_dir, LOCAL_MODEL_FILENAME);
  let model = provisioner.obtain(&location, &mut LogProgress::new())?;
  if let Some(len) = model.output_len()
    && let Err(e) = table.check_output_len(len)
  {
    warn!("{}", e);
  }

  let (input, source_name) = if args.input == "-" {
    let mut bytes = Vec::new();
    std::io::stdin().lock().read_to_end(&mut bytes)?;
    info!("从标准输入读取 {} 字节", bytes.len());
    (InputWrapper::from(BytesImageInput::decode(&bytes)?), "stdin".to_string())
  } else {
    let url = source_url(&args.input)?;
    (InputWrapper::from_url(&url)?, args.input.clone())
  };
  let output = OutputWrapper::from_url(&args.output)?;

  OneShotTask::new(&table, TARGET_SIZE, settings.threshold_percent())
    .with_source_name(source_name)
    .run_task(input, model, output)
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::CommandFactory;

  #[test]
  fn model_url_help_names_the_onnx_requirement() {
    let command = Args::command();
    let arg = command
      .get_arguments()
      .find(|a| a.get_id() == "model_url")
      .unwrap();
    let help = arg.get_long_help().unwrap().to_string();
    assert!(help.contains("ONNX"));
    assert!(help.contains("Keras"));
  }
}
