// 该文件是 Huishou （回收分类） 项目的一部分。
// src/output/console.rs - 终端输出
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

use std::{convert::Infallible, fmt::Write};

use crate::{
  FromUrl, FromUrlWithScheme,
  category::Category,
  model::{ImageReport, PredictionResult},
  output::{OutputError, Render},
  video::VideoReport,
};

/// 把结果打印到标准输出
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleOutput;

impl FromUrlWithScheme for ConsoleOutput {
  const SCHEME: &'static str = "console";
}

impl FromUrl for ConsoleOutput {
  type Error = OutputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch);
    }
    Ok(ConsoleOutput)
  }
}

impl Render<ImageReport> for ConsoleOutput {
  type Error = Infallible;

  fn render_result(&self, result: &ImageReport) -> Result<(), Self::Error> {
    print!("{}", format_image_report(result));
    Ok(())
  }
}

impl Render<VideoReport> for ConsoleOutput {
  type Error = Infallible;

  fn render_result(&self, result: &VideoReport) -> Result<(), Self::Error> {
    print!("{}", format_video_report(result));
    Ok(())
  }
}

fn write_card(out: &mut String, category: Category, confidence_percent: Option<f32>) {
  let descriptor = category.descriptor();
  let _ = writeln!(out, "{} {}", descriptor.icon, descriptor.display_name);
  if let Some(confidence) = confidence_percent {
    let _ = writeln!(out, "  置信度: {:.2}%", confidence);
  }
  let _ = writeln!(out, "  说明: {}", descriptor.description);
  let _ = writeln!(out, "  可回收: {}", descriptor.recyclable);
  let _ = writeln!(out, "  处理建议: {}", descriptor.handling);
}

fn write_prediction(out: &mut String, prediction: &PredictionResult) {
  if prediction.is_degraded() {
    let _ = writeln!(out, "推理失败, 无法给出分类结果");
  } else if prediction.is_unknown() {
    let _ = writeln!(
      out,
      "置信度 {:.2}% 低于阈值, 无法确定类别",
      prediction.confidence_percent
    );
  }
  write_card(out, prediction.category, Some(prediction.confidence_percent));
}

pub fn format_image_report(report: &ImageReport) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "== 图像: {} ==", report.source);
  write_prediction(&mut out, &report.prediction);

  if !report.ranked.is_empty() {
    let _ = writeln!(out);
    let _ = writeln!(out, "{:<40} {:>10}", "类别", "概率(%)");
    for (category, probability) in &report.ranked {
      let _ = writeln!(
        out,
        "{:<40} {:>10.2}",
        category.display_name(),
        probability * 100.0
      );
    }
  }
  out
}

pub fn format_video_report(report: &VideoReport) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "== 视频: {} ==", report.source);
  let fps = report
    .fps
    .map(|fps| format!("{:.2}", fps))
    .unwrap_or_else(|| "未知".to_string());
  let _ = writeln!(
    out,
    "帧率 {}, 每 {} 帧抽取一帧, 读取 {} 帧, 失败 {} 帧, 耗时 {:.2?}",
    fps, report.frame_skip, report.frames_read, report.frames_failed, report.elapsed
  );
  if report.stopped_early {
    let _ = writeln!(out, "处理被中断, 以下为已完成部分的结果");
  }

  if report.records.is_empty() {
    let _ = writeln!(out, "没有可用的分类结果");
    return out;
  }

  let _ = writeln!(out);
  match report.dominant_category() {
    Some((category, count)) => {
      let _ = writeln!(
        out,
        "出现最多的类别 (高于阈值): {} 帧 / 共 {} 帧",
        count,
        report.records.len()
      );
      write_card(&mut out, category, None);
    }
    None => {
      let _ = writeln!(out, "所有抽取帧的置信度均低于阈值");
      write_card(&mut out, Category::Unknown, None);
    }
  }

  let _ = writeln!(out);
  let _ = writeln!(
    out,
    "{:>8} {:>10} {:<40} {:>10} {:<22}",
    "帧", "时间(秒)", "类别", "置信度(%)", "类别 ID"
  );
  for record in &report.records {
    let _ = writeln!(
      out,
      "{:>8} {:>10.2} {:<40} {:>10.2} {:<22}",
      record.frame_index,
      record.timestamp_seconds,
      record.category_display_name,
      record.confidence_percent,
      record.category_id.id()
    );
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::video::FrameRecord;
  use std::time::Duration;

  fn prediction(category: Category, confidence_percent: f32) -> PredictionResult {
    PredictionResult {
      category,
      confidence_percent,
      probabilities: Some(vec![0.1, 0.9].into_boxed_slice()),
    }
  }

  #[test]
  fn image_report_shows_card_and_ranking() {
    let report = ImageReport {
      source: "bottle.jpg".to_string(),
      prediction: prediction(Category::Glass, 90.0),
      ranked: vec![(Category::Glass, 0.9), (Category::Fabric, 0.1)],
    };
    let text = format_image_report(&report);
    assert!(text.contains("Glass"));
    assert!(text.contains("90.00%"));
    assert!(text.contains("Rinse clean"));
    let glass = text.rfind("Glass").unwrap();
    let fabric = text.find("Fabric").unwrap();
    assert!(glass < fabric);
  }

  #[test]
  fn unconfident_image_renders_unknown_card() {
    let report = ImageReport {
      source: "blurry.jpg".to_string(),
      prediction: prediction(Category::Unknown, 42.5),
      ranked: Vec::new(),
    };
    let text = format_image_report(&report);
    assert!(text.contains("低于阈值"));
    assert!(text.contains(Category::Unknown.display_name()));
  }

  #[test]
  fn video_table_rounds_to_two_decimals() {
    let report = VideoReport {
      source: "bin.mp4".to_string(),
      records: vec![FrameRecord {
        frame_index: 60,
        timestamp_seconds: 2.002002,
        category_display_name: Category::Paper.display_name(),
        confidence_percent: 77.777,
        category_id: Category::Paper,
      }],
      elapsed: Duration::from_millis(1500),
      frames_read: 90,
      frames_failed: 0,
      frame_skip: 60,
      fps: Some(29.97),
      stopped_early: false,
    };
    let text = format_video_report(&report);
    assert!(text.contains("2.00"));
    assert!(text.contains("77.78"));
    assert!(text.contains("paper"));
    assert!(text.contains("1 帧 / 共 1 帧"));
  }
}
