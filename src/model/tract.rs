// 该文件是 Huishou （回收分类） 项目的一部分。
// src/model/tract.rs - 基于 tract 的 ONNX 分类模型
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

use std::path::Path;

use tract_onnx::prelude::*;
use tracing::{debug, info};

use crate::{
  frame::{NormalizedImage, TargetSize},
  model::{InferenceError, Model, Probabilities},
  provision::{LoadError, ModelLoader},
};

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

/// NHWC 输入 `[1, H, W, 3]`、输出 `[1, N]` 的图像分类模型
pub struct TractClassifier {
  plan: Plan,
  input_size: TargetSize,
  output_len: Option<usize>,
}

impl std::fmt::Debug for TractClassifier {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TractClassifier")
      .field("input_size", &self.input_size)
      .field("output_len", &self.output_len)
      .finish()
  }
}

impl TractClassifier {
  pub fn load<P: AsRef<Path>>(path: P, input_size: TargetSize) -> Result<Self, LoadError> {
    let path = path.as_ref();
    info!("加载模型文件: {}", path.display());

    let metadata = std::fs::metadata(path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      metadata.len() as f64 / (1024.0 * 1024.0)
    );

    let input_fact = f32::fact([
      1,
      input_size.height as usize,
      input_size.width as usize,
      3,
    ]);

    let plan = tract_onnx::onnx()
      .model_for_path(path)
      .and_then(|model| model.with_input_fact(0, input_fact.into()))
      .and_then(|model| model.into_optimized())
      .and_then(|model| model.into_runnable())
      .map_err(|e| LoadError::Model(format!("{e:#}")))?;

    let output_len = plan
      .model()
      .output_fact(0)
      .ok()
      .and_then(|fact| fact.shape.as_concrete().and_then(|s| s.last().copied()));

    match output_len {
      Some(len) => debug!("模型输出维度: {}", len),
      None => debug!("模型输出维度未知"),
    }
    info!("模型加载完成");

    Ok(Self {
      plan,
      input_size,
      output_len,
    })
  }

  pub fn input_size(&self) -> TargetSize {
    self.input_size
  }

  pub fn output_len(&self) -> Option<usize> {
    self.output_len
  }
}

impl Model for TractClassifier {
  type Input = NormalizedImage;
  type Output = Probabilities;
  type Error = InferenceError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    if input.size() != self.input_size {
      return Err(InferenceError::ShapeMismatch {
        expected: [
          1,
          self.input_size.height as usize,
          self.input_size.width as usize,
          3,
        ],
        actual: input.shape(),
      });
    }

    let tensor = Tensor::from_shape(&input.shape(), input.as_slice())
      .map_err(|e| InferenceError::Backend(format!("{e:#}")))?;

    debug!("执行模型推理");
    let outputs = self
      .plan
      .run(tvec!(tensor.into_tvalue()))
      .map_err(|e| InferenceError::Backend(format!("{e:#}")))?;

    let output = outputs.first().ok_or(InferenceError::EmptyOutput)?;
    let view = output
      .to_array_view::<f32>()
      .map_err(|e| InferenceError::Backend(format!("{e:#}")))?;

    let probabilities: Vec<f32> = view.iter().copied().collect();
    if probabilities.is_empty() {
      return Err(InferenceError::EmptyOutput);
    }
    debug!("模型推理结果: {:?}", probabilities);

    Ok(probabilities.into_boxed_slice())
  }
}

/// 供 [`crate::provision::ModelProvisioner`] 使用的加载器
#[derive(Debug, Clone, Copy)]
pub struct TractLoader {
  input_size: TargetSize,
}

impl TractLoader {
  pub fn new(input_size: TargetSize) -> Self {
    Self { input_size }
  }
}

impl ModelLoader for TractLoader {
  type Model = TractClassifier;

  fn load(&self, path: &Path) -> Result<Self::Model, LoadError> {
    TractClassifier::load(path, self.input_size)
  }
}
