// 该文件是 Huishou （回收分类） 项目的一部分。
// src/category.rs - 垃圾类别表
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

use serde::{Serialize, Serializer};
use thiserror::Error;

/// 类别的展示信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryDescriptor {
  pub display_name: &'static str,
  pub icon: &'static str,
  pub description: &'static str,
  pub recyclable: &'static str,
  pub handling: &'static str,
  /// `#RRGGBB`
  pub color: &'static str,
}

/// 垃圾类别
///
/// `Unknown` 不是模型输出，只在置信度不足或索引越界时使用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
  Fabric,
  Glass,
  NonRecyclable,
  Paper,
  RecyclableInorganic,
  Unknown,
}

const FABRIC: CategoryDescriptor = CategoryDescriptor {
  display_name: "Fabric / Textiles",
  icon: "👕",
  description: "Includes clothes, shoes, towels, bedding etc.",
  recyclable: "Sometimes",
  handling: "Donate usable items. Check for textile recycling programs for unusable items. Otherwise, general waste.",
  color: "#FFA726",
};

const GLASS: CategoryDescriptor = CategoryDescriptor {
  display_name: "Glass",
  icon: "🍾",
  description: "Includes bottles and jars.",
  recyclable: "Yes",
  handling: "Rinse clean. Check local guidelines for color separation (brown, green, clear). Remove lids if required.",
  color: "#29B6F6",
};

const NON_RECYCLABLE: CategoryDescriptor = CategoryDescriptor {
  display_name: "Non-Recyclable / General Waste",
  icon: "🗑️",
  description: "Items not easily recyclable. Includes general trash, some plastics, potentially contaminated items, batteries (special disposal!), biological waste (check local compost/waste rules).",
  recyclable: "No",
  handling: "Dispose of in general waste bin. **Check local regulations for hazardous items like batteries.**",
  color: "#EF5350",
};

const PAPER: CategoryDescriptor = CategoryDescriptor {
  display_name: "Paper & Cardboard",
  icon: "📰",
  description: "Includes newspaper, magazines, office paper, cardboard boxes.",
  recyclable: "Yes",
  handling: "Keep clean and dry. Flatten cardboard boxes. Check local rules for shredded paper or coated paper.",
  color: "#FFEE58",
};

const RECYCLABLE_INORGANIC: CategoryDescriptor = CategoryDescriptor {
  display_name: "Recyclable Inorganic (Metal/Plastic)",
  icon: "🥫",
  description: "Includes metal cans (aluminum/steel) and certain types of plastic containers.",
  recyclable: "Yes (Varies by type)",
  handling: "Rinse clean. Check local guidelines for accepted plastic numbers (♻️ symbols) and metal types. Remove lids if required.",
  color: "#66BB6A",
};

const UNKNOWN: CategoryDescriptor = CategoryDescriptor {
  display_name: "Unknown / Below Threshold",
  icon: "❓",
  description: "Could not classify with high confidence or item not recognized.",
  recyclable: "Unknown",
  handling: "Please check local waste disposal guidelines or try a clearer image.",
  color: "#BDBDBD",
};

impl Category {
  /// 所有类别，包括 `Unknown`
  pub const ALL: [Category; 6] = [
    Category::Fabric,
    Category::Glass,
    Category::NonRecyclable,
    Category::Paper,
    Category::RecyclableInorganic,
    Category::Unknown,
  ];

  pub fn id(&self) -> &'static str {
    match self {
      Category::Fabric => "fabric",
      Category::Glass => "glass",
      Category::NonRecyclable => "non-recyclable",
      Category::Paper => "paper",
      Category::RecyclableInorganic => "recyclable-inorganic",
      Category::Unknown => "unknown",
    }
  }

  pub fn from_id(id: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|c| c.id() == id)
  }

  pub fn descriptor(&self) -> &'static CategoryDescriptor {
    match self {
      Category::Fabric => &FABRIC,
      Category::Glass => &GLASS,
      Category::NonRecyclable => &NON_RECYCLABLE,
      Category::Paper => &PAPER,
      Category::RecyclableInorganic => &RECYCLABLE_INORGANIC,
      Category::Unknown => &UNKNOWN,
    }
  }

  pub fn display_name(&self) -> &'static str {
    self.descriptor().display_name
  }

  pub fn is_unknown(&self) -> bool {
    matches!(self, Category::Unknown)
  }

  /// 模型可以输出的类别，按 id 字典序排列
  pub fn known() -> Vec<Category> {
    let mut known: Vec<Category> = Self::ALL
      .into_iter()
      .filter(|c| !c.is_unknown())
      .collect();
    known.sort_by_key(|c| c.id());
    known
  }
}

impl std::fmt::Display for Category {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.id())
  }
}

impl Serialize for Category {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(self.id())
  }
}

#[derive(Error, Debug)]
pub enum ClassTableError {
  #[error("Class table I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Class table format error: {0}")]
  ParseError(#[from] serde_json::Error),
  #[error("Unknown category id: {0}")]
  UnknownId(String),
  #[error("Empty class table")]
  Empty,
  #[error("Model output length {model} does not match class table length {table}")]
  OutputMismatch { model: usize, table: usize },
}

/// 模型输出索引到类别的映射
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassTable {
  classes: Box<[Category]>,
}

impl Default for ClassTable {
  fn default() -> Self {
    Self {
      classes: Category::known().into_boxed_slice(),
    }
  }
}

impl ClassTable {
  pub fn new(classes: Vec<Category>) -> Result<Self, ClassTableError> {
    if classes.is_empty() {
      return Err(ClassTableError::Empty);
    }
    if let Some(unknown) = classes.iter().find(|c| c.is_unknown()) {
      return Err(ClassTableError::UnknownId(unknown.id().to_string()));
    }
    Ok(Self {
      classes: classes.into_boxed_slice(),
    })
  }

  /// 从 JSON 数组读取，例如 `["fabric", "glass"]`
  pub fn from_json_str(json: &str) -> Result<Self, ClassTableError> {
    let ids: Vec<String> = serde_json::from_str(json)?;
    let classes = ids
      .iter()
      .map(|id| Category::from_id(id).ok_or_else(|| ClassTableError::UnknownId(id.clone())))
      .collect::<Result<Vec<_>, _>>()?;
    Self::new(classes)
  }

  pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ClassTableError> {
    let json = std::fs::read_to_string(path)?;
    Self::from_json_str(&json)
  }

  pub fn len(&self) -> usize {
    self.classes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.classes.is_empty()
  }

  pub fn classes(&self) -> &[Category] {
    &self.classes
  }

  /// 越界索引解析为 `Unknown`
  pub fn resolve(&self, index: usize) -> Category {
    self.classes.get(index).copied().unwrap_or(Category::Unknown)
  }

  pub fn check_output_len(&self, model_output_len: usize) -> Result<(), ClassTableError> {
    if model_output_len != self.classes.len() {
      return Err(ClassTableError::OutputMismatch {
        model: model_output_len,
        table: self.classes.len(),
      });
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_table_is_sorted_known_ids() {
    let table = ClassTable::default();
    let ids: Vec<&str> = table.classes().iter().map(|c| c.id()).collect();
    assert_eq!(
      ids,
      vec![
        "fabric",
        "glass",
        "non-recyclable",
        "paper",
        "recyclable-inorganic"
      ]
    );
  }

  #[test]
  fn out_of_range_index_resolves_to_unknown() {
    let table = ClassTable::default();
    assert_eq!(table.resolve(4), Category::RecyclableInorganic);
    assert_eq!(table.resolve(5), Category::Unknown);
    assert_eq!(table.resolve(usize::MAX), Category::Unknown);
  }

  #[test]
  fn ids_round_trip_through_from_id() {
    for category in Category::ALL {
      assert_eq!(Category::from_id(category.id()), Some(category));
    }
    assert_eq!(Category::from_id("plastic"), None);
  }

  #[test]
  fn json_table_rejects_unknown_and_unrecognised_ids() {
    let table = ClassTable::from_json_str(r#"["paper", "glass"]"#).unwrap();
    assert_eq!(table.resolve(0), Category::Paper);
    assert_eq!(table.len(), 2);

    assert!(matches!(
      ClassTable::from_json_str(r#"["paper", "unknown"]"#),
      Err(ClassTableError::UnknownId(id)) if id == "unknown"
    ));
    assert!(matches!(
      ClassTable::from_json_str(r#"["compost"]"#),
      Err(ClassTableError::UnknownId(_))
    ));
    assert!(matches!(
      ClassTable::from_json_str("[]"),
      Err(ClassTableError::Empty)
    ));
  }

  #[test]
  fn output_len_check_reports_mismatch() {
    let table = ClassTable::default();
    assert!(table.check_output_len(5).is_ok());
    assert!(matches!(
      table.check_output_len(6),
      Err(ClassTableError::OutputMismatch { model: 6, table: 5 })
    ));
  }

  #[test]
  fn unknown_has_its_own_guidance() {
    let unknown = Category::Unknown.descriptor();
    assert_eq!(unknown.display_name, "Unknown / Below Threshold");
    assert!(!unknown.handling.is_empty());
    assert_eq!(Category::Glass.display_name(), "Glass");
  }
}
