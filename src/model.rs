// 该文件是 Huishou （回收分类） 项目的一部分。
// src/model.rs - 模型与分类决策
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

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  category::{Category, CategoryDescriptor, ClassTable},
  frame::NormalizedImage,
};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

impl<M: Model + ?Sized> Model for Arc<M> {
  type Input = M::Input;
  type Output = M::Output;
  type Error = M::Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    (**self).infer(input)
  }
}

impl<M: Model + ?Sized> Model for &M {
  type Input = M::Input;
  type Output = M::Output;
  type Error = M::Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    (**self).infer(input)
  }
}

/// 每个已知类别一个概率值
pub type Probabilities = Box<[f32]>;

#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("Input shape mismatch: expected {expected:?}, got {actual:?}")]
  ShapeMismatch {
    expected: [usize; 4],
    actual: [usize; 4],
  },
  #[error("Inference error: {0}")]
  Backend(String),
  #[error("Empty model output")]
  EmptyOutput,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
  pub category: Category,
  pub confidence_percent: f32,
  /// 推理失败时为 `None`
  pub probabilities: Option<Probabilities>,
}

impl PredictionResult {
  /// 推理失败时的降级结果
  pub fn degraded() -> Self {
    Self {
      category: Category::Unknown,
      confidence_percent: 0.0,
      probabilities: None,
    }
  }

  pub fn descriptor(&self) -> &'static CategoryDescriptor {
    self.category.descriptor()
  }

  pub fn is_unknown(&self) -> bool {
    self.category.is_unknown()
  }

  pub fn is_degraded(&self) -> bool {
    self.probabilities.is_none()
  }

  /// 按概率从高到低排列的 (类别, 概率)
  ///
  /// 超出类别表的输出没有对应类别，不参与排列。
  pub fn ranked(&self, table: &ClassTable) -> Vec<(Category, f32)> {
    let mut ranked: Vec<(Category, f32)> = self
      .probabilities
      .iter()
      .flat_map(|probs| probs.iter().zip(table.classes()))
      .map(|(&p, &category)| (category, p))
      .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
  }
}

/// 单张图像的完整分类报告
#[derive(Debug, Clone)]
pub struct ImageReport {
  pub source: String,
  pub prediction: PredictionResult,
  pub ranked: Vec<(Category, f32)>,
}

/// 最大值的索引，相等时取最小索引，NaN 不参与比较
pub fn argmax(values: &[f32]) -> Option<(usize, f32)> {
  values
    .iter()
    .copied()
    .enumerate()
    .filter(|(_, v)| !v.is_nan())
    .fold(None, |best, (idx, v)| match best {
      Some((_, bv)) if v <= bv => best,
      _ => Some((idx, v)),
    })
}

/// 对模型输出应用置信度阈值
///
/// 置信度严格低于阈值时为 `Unknown`，等于阈值视为可信。
pub fn decide(
  probabilities: Probabilities,
  table: &ClassTable,
  confidence_threshold_percent: f32,
) -> PredictionResult {
  let Some((index, max)) = argmax(&probabilities) else {
    warn!("模型输出中没有有效的概率值");
    return PredictionResult::degraded();
  };

  let confidence_percent = max * 100.0;
  let category = if confidence_percent < confidence_threshold_percent {
    Category::Unknown
  } else {
    table.resolve(index)
  };

  debug!(
    "预测索引 {}, 置信度 {:.2}%, 类别 {}",
    index, confidence_percent, category
  );

  PredictionResult {
    category,
    confidence_percent,
    probabilities: Some(probabilities),
  }
}

/// 运行推理并做出类别决策；推理失败不会向上传播
pub fn classify<M>(
  model: &M,
  image: &NormalizedImage,
  table: &ClassTable,
  confidence_threshold_percent: f32,
) -> PredictionResult
where
  M: Model<Input = NormalizedImage, Output = Probabilities> + ?Sized,
  M::Error: std::fmt::Display,
{
  match model.infer(image) {
    Ok(probabilities) => decide(probabilities, table, confidence_threshold_percent),
    Err(e) => {
      warn!("推理失败, 返回未知类别: {}", e);
      PredictionResult::degraded()
    }
  }
}

#[cfg(feature = "model_tract")]
mod tract;
#[cfg(feature = "model_tract")]
pub use self::tract::{TractClassifier, TractLoader};
