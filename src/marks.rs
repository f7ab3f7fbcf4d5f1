use crate::dataset::{Cell, Dataset};
use crate::error::{ClassifyError, Result};
use serde::{Deserialize, Serialize};

/// The MARKS cell resolved once per record.
#[derive(Debug, Clone, PartialEq)]
pub enum MarksValue {
    Number(f64),
    Text(String),
    Blank,
    /// Booleans, dates and anything else that is neither a score nor text.
    Other,
}

impl MarksValue {
    pub fn from_cell(cell: &Cell) -> Self {
        match cell {
            Cell::Number(v) => MarksValue::Number(*v),
            Cell::Text(s) => MarksValue::Text(s.clone()),
            Cell::Empty => MarksValue::Blank,
            Cell::Bool(_) | Cell::DateTime(_) => MarksValue::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Pass,
    Fail,
    Absent,
    Detained,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Pass,
        Category::Fail,
        Category::Absent,
        Category::Detained,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Category::Pass => "pass",
            Category::Fail => "fail",
            Category::Absent => "absent",
            Category::Detained => "detained",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Category::Pass => "Pass",
            Category::Fail => "Fail",
            Category::Absent => "Absent",
            Category::Detained => "Detained",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            Category::Pass => "pass.xlsx",
            Category::Fail => "fail.xlsx",
            Category::Absent => "absent.xlsx",
            Category::Detained => "detained.xlsx",
        }
    }

    pub fn parse(s: &str) -> Option<Category> {
        Category::ALL
            .into_iter()
            .find(|c| c.key().eq_ignore_ascii_case(s.trim()))
    }
}

/// Which category documents are offered for download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DownloadPolicy {
    /// All four documents, empty ones included.
    #[default]
    Always,
    NonEmptyOnly,
}

impl DownloadPolicy {
    pub fn offers(self, subset: &Dataset) -> bool {
        match self {
            DownloadPolicy::Always => true,
            DownloadPolicy::NonEmptyOnly => !subset.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassifyOptions {
    pub marks_column: String,
    /// Scores strictly above this pass; every other number fails.
    pub pass_above: f64,
    pub absent_sentinel: String,
    pub detained_sentinel: String,
    pub download_policy: DownloadPolicy,
    /// Name each sheet after its category instead of the writer's default.
    pub sheet_titles: bool,
}

impl Default for ClassifyOptions {
    fn default() -> Self {
        ClassifyOptions {
            marks_column: "MARKS".to_string(),
            pass_above: 21.0,
            absent_sentinel: "A".to_string(),
            detained_sentinel: "D".to_string(),
            download_policy: DownloadPolicy::Always,
            sheet_titles: true,
        }
    }
}

impl ClassifyOptions {
    pub fn validate(&self) -> Result<()> {
        if self.marks_column.trim().is_empty() {
            return Err(ClassifyError::InvalidOptions(
                "marksColumn must not be empty".into(),
            ));
        }
        if !self.pass_above.is_finite() {
            return Err(ClassifyError::InvalidOptions(
                "passAbove must be a finite number".into(),
            ));
        }
        if self.absent_sentinel.is_empty() || self.detained_sentinel.is_empty() {
            return Err(ClassifyError::InvalidOptions(
                "sentinels must not be empty".into(),
            ));
        }
        if self.absent_sentinel.to_uppercase() == self.detained_sentinel.to_uppercase() {
            return Err(ClassifyError::InvalidOptions(
                "absent and detained sentinels must differ".into(),
            ));
        }
        Ok(())
    }
}

/// `None` means the row belongs to no category.
pub fn classify(value: &MarksValue, opts: &ClassifyOptions) -> Option<Category> {
    match value {
        MarksValue::Number(v) if v.is_nan() => None,
        MarksValue::Number(v) if *v > opts.pass_above => Some(Category::Pass),
        MarksValue::Number(_) => Some(Category::Fail),
        MarksValue::Text(s) => {
            let up = s.to_uppercase();
            if up == opts.absent_sentinel.to_uppercase() {
                Some(Category::Absent)
            } else if up == opts.detained_sentinel.to_uppercase() {
                Some(Category::Detained)
            } else {
                None
            }
        }
        MarksValue::Blank | MarksValue::Other => None,
    }
}
