use crate::dataset::{Cell, Dataset};
use crate::error::{ClassifyError, Result};
use crate::marks::{classify, Category, ClassifyOptions, MarksValue};
use rust_xlsxwriter::{Format, Workbook};
use sha2::{Digest, Sha256};

pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Worksheet limits, header row included.
const MAX_SHEET_ROWS: usize = 1_048_576;
const MAX_SHEET_COLS: usize = 16_384;

/// The four category subsets of one uploaded dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportBundle {
    pub columns: Vec<String>,
    pub row_count: usize,
    pub pass: Dataset,
    pub fail: Dataset,
    pub absent: Dataset,
    pub detained: Dataset,
    /// 0-based data row indices that matched no category.
    pub unclassified: Vec<usize>,
}

impl ReportBundle {
    pub fn subset(&self, category: Category) -> &Dataset {
        match category {
            Category::Pass => &self.pass,
            Category::Fail => &self.fail,
            Category::Absent => &self.absent,
            Category::Detained => &self.detained,
        }
    }
}

/// Splits `ds` by its marks column. Fails without output when the column is
/// missing.
pub fn classify_dataset(ds: &Dataset, opts: &ClassifyOptions) -> Result<ReportBundle> {
    opts.validate()?;
    let marks_column = opts.marks_column.trim();
    ds.require_column(marks_column)?;

    let mut pass = Vec::new();
    let mut fail = Vec::new();
    let mut absent = Vec::new();
    let mut detained = Vec::new();
    let mut unclassified = Vec::new();

    for (i, rec) in ds.records().enumerate() {
        let value = MarksValue::from_cell(rec.get(marks_column).unwrap_or(&Cell::Empty));
        match classify(&value, opts) {
            Some(Category::Pass) => pass.push(i),
            Some(Category::Fail) => fail.push(i),
            Some(Category::Absent) => absent.push(i),
            Some(Category::Detained) => detained.push(i),
            None => unclassified.push(i),
        }
    }

    Ok(ReportBundle {
        columns: ds.columns().to_vec(),
        row_count: ds.len(),
        pass: ds.subset(&pass),
        fail: ds.subset(&fail),
        absent: ds.subset(&absent),
        detained: ds.subset(&detained),
        unclassified,
    })
}

/// Serializes `ds` as a one-sheet workbook held in memory. The header row is
/// bold; `sheet_name` of `None` keeps the writer's default title.
pub fn write_xlsx(ds: &Dataset, category: Category, sheet_name: Option<&str>) -> Result<Vec<u8>> {
    let too_large = |detail: String| ClassifyError::TooLarge {
        category: category.key().to_string(),
        detail,
    };
    let ser = |e: rust_xlsxwriter::XlsxError| ClassifyError::Serialize {
        category: category.key().to_string(),
        message: e.to_string(),
    };

    if ds.len() + 1 > MAX_SHEET_ROWS {
        return Err(too_large(format!("{} rows", ds.len())));
    }
    if ds.columns().len() > MAX_SHEET_COLS {
        return Err(too_large(format!("{} columns", ds.columns().len())));
    }

    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let date = Format::new().set_num_format("yyyy-mm-dd");
    let date_time = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");
    {
        let sheet = workbook.add_worksheet();
        if let Some(name) = sheet_name {
            sheet.set_name(name).map_err(ser)?;
        }
        for (c, label) in ds.columns().iter().enumerate() {
            sheet
                .write_string_with_format(0, c as u16, label, &bold)
                .map_err(ser)?;
        }
        for (r, row) in ds.rows().iter().enumerate() {
            let r = (r + 1) as u32;
            for (c, cell) in row.iter().enumerate() {
                let c = c as u16;
                match cell {
                    Cell::Empty => {}
                    Cell::Number(v) if v.is_finite() => {
                        sheet.write_number(r, c, *v).map_err(ser)?;
                    }
                    Cell::Number(v) => {
                        sheet.write_string(r, c, v.to_string()).map_err(ser)?;
                    }
                    Cell::Text(s) => {
                        sheet.write_string(r, c, s).map_err(ser)?;
                    }
                    Cell::Bool(b) => {
                        sheet.write_boolean(r, c, *b).map_err(ser)?;
                    }
                    Cell::DateTime(v) => {
                        let fmt = if v.fract() == 0.0 { &date } else { &date_time };
                        sheet
                            .write_number_with_format(r, c, *v, fmt)
                            .map_err(ser)?;
                    }
                }
            }
        }
    }
    workbook.save_to_buffer().map_err(ser)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// One serialized subset offered to the UI.
#[derive(Debug, Clone)]
pub struct Download {
    pub category: Category,
    pub rows: usize,
    pub bytes: Vec<u8>,
    pub sha256: String,
}

impl Download {
    pub fn file_name(&self) -> &'static str {
        self.category.file_name()
    }

    pub fn mime_type(&self) -> &'static str {
        XLSX_MIME
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedReports {
    pub report: ReportBundle,
    pub downloads: Vec<Download>,
}

impl GeneratedReports {
    pub fn download(&self, category: Category) -> Option<&Download> {
        self.downloads.iter().find(|d| d.category == category)
    }
}

/// Serializes every subset the download policy offers. Either all of them
/// are written or none is returned.
pub fn build_downloads(report: &ReportBundle, opts: &ClassifyOptions) -> Result<Vec<Download>> {
    let mut out = Vec::new();
    for category in Category::ALL {
        let subset = report.subset(category);
        if !opts.download_policy.offers(subset) {
            continue;
        }
        let sheet_name = opts.sheet_titles.then(|| category.title());
        let bytes = write_xlsx(subset, category, sheet_name)?;
        out.push(Download {
            category,
            rows: subset.len(),
            sha256: sha256_hex(&bytes),
            bytes,
        });
    }
    Ok(out)
}

/// Upload bytes in, report and download buffers out.
pub fn generate_reports(xlsx: &[u8], opts: &ClassifyOptions) -> Result<GeneratedReports> {
    let ds = Dataset::from_xlsx_bytes(xlsx)?;
    let report = classify_dataset(&ds, opts)?;
    let downloads = build_downloads(&report, opts)?;
    log::info!(
        "classified {} rows: pass={} fail={} absent={} detained={} unclassified={}; {} downloads",
        report.row_count,
        report.pass.len(),
        report.fail.len(),
        report.absent.len(),
        report.detained.len(),
        report.unclassified.len(),
        downloads.len()
    );
    if !report.unclassified.is_empty() {
        log::warn!(
            "{} rows matched no category and were left out of every report",
            report.unclassified.len()
        );
    }
    Ok(GeneratedReports { report, downloads })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marks::DownloadPolicy;
    use calamine::{open_workbook_from_rs, Reader, Xlsx};
    use std::io::Cursor;

    fn marks_dataset(values: Vec<Cell>) -> Dataset {
        let rows = values
            .into_iter()
            .enumerate()
            .map(|(i, v)| vec![Cell::Text(format!("S{}", i + 1)), v])
            .collect();
        Dataset::new(vec!["NAME".into(), " MARKS ".into()], rows)
    }

    fn marks_of(ds: &Dataset) -> Vec<Cell> {
        ds.rows().iter().map(|r| r[1].clone()).collect()
    }

    #[test]
    fn splits_scores_and_sentinels() {
        let ds = marks_dataset(vec![
            Cell::Number(25.0),
            Cell::Number(10.0),
            Cell::Text("A".into()),
            Cell::Text("D".into()),
            Cell::Text("a".into()),
        ]);
        let r = classify_dataset(&ds, &ClassifyOptions::default()).expect("classify");
        assert_eq!(marks_of(&r.pass), vec![Cell::Number(25.0)]);
        assert_eq!(marks_of(&r.fail), vec![Cell::Number(10.0)]);
        assert_eq!(
            marks_of(&r.absent),
            vec![Cell::Text("A".into()), Cell::Text("a".into())]
        );
        assert_eq!(marks_of(&r.detained), vec![Cell::Text("D".into())]);
        assert!(r.unclassified.is_empty());
        assert_eq!(r.columns, vec!["NAME".to_string(), "MARKS".to_string()]);
    }

    #[test]
    fn unclassified_rows_are_reported_not_offered() {
        let ds = marks_dataset(vec![
            Cell::Empty,
            Cell::Text("X".into()),
            Cell::Number(30.0),
            Cell::Bool(true),
        ]);
        let r = classify_dataset(&ds, &ClassifyOptions::default()).expect("classify");
        assert_eq!(r.unclassified, vec![0, 1, 3]);
        let placed = r.pass.len() + r.fail.len() + r.absent.len() + r.detained.len();
        assert_eq!(placed, 1);
    }

    #[test]
    fn classification_is_idempotent() {
        let ds = marks_dataset(vec![
            Cell::Number(21.0),
            Cell::Number(22.0),
            Cell::Number(21.5),
            Cell::Text("d".into()),
        ]);
        let opts = ClassifyOptions::default();
        let a = classify_dataset(&ds, &opts).expect("first");
        let b = classify_dataset(&ds, &opts).expect("second");
        assert_eq!(a, b);
        assert_eq!(marks_of(&a.fail), vec![Cell::Number(21.0)]);
        assert_eq!(
            marks_of(&a.pass),
            vec![Cell::Number(22.0), Cell::Number(21.5)]
        );
    }

    #[test]
    fn missing_marks_column_produces_nothing() {
        let ds = Dataset::new(
            vec!["NAME".into(), "SCORE".into()],
            vec![vec![Cell::Text("S1".into()), Cell::Number(40.0)]],
        );
        let err = classify_dataset(&ds, &ClassifyOptions::default()).unwrap_err();
        match err {
            ClassifyError::MissingColumn { available, .. } => {
                assert_eq!(available, vec!["NAME".to_string(), "SCORE".to_string()]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn empty_dataset_follows_download_policy() {
        let ds = marks_dataset(vec![]);
        let always = ClassifyOptions::default();
        let report = classify_dataset(&ds, &always).expect("classify");
        assert_eq!(build_downloads(&report, &always).expect("always").len(), 4);

        let non_empty = ClassifyOptions {
            download_policy: DownloadPolicy::NonEmptyOnly,
            ..ClassifyOptions::default()
        };
        assert!(build_downloads(&report, &non_empty)
            .expect("non empty")
            .is_empty());
    }

    #[test]
    fn written_subset_reads_back_identically() {
        let ds = Dataset::new(
            vec!["ROLL".into(), "NAME".into(), "MARKS".into(), "PRESENT".into()],
            vec![
                vec![
                    Cell::Number(1.0),
                    Cell::Text("Asha".into()),
                    Cell::Number(35.5),
                    Cell::Bool(true),
                ],
                vec![
                    Cell::Number(2.0),
                    Cell::Empty,
                    Cell::Text("A".into()),
                    Cell::Bool(false),
                ],
            ],
        );
        let bytes = write_xlsx(&ds, Category::Pass, Some("Pass")).expect("write");
        let back = Dataset::from_xlsx_bytes(&bytes).expect("read back");
        assert_eq!(back, ds);
    }

    #[test]
    fn sheets_are_named_after_categories() {
        let ds = marks_dataset(vec![Cell::Text("D".into())]);
        let opts = ClassifyOptions::default();
        let report = classify_dataset(&ds, &opts).expect("classify");
        let downloads = build_downloads(&report, &opts).expect("downloads");
        let detained = downloads
            .iter()
            .find(|d| d.category == Category::Detained)
            .expect("detained download");
        assert_eq!(detained.file_name(), "detained.xlsx");
        assert_eq!(detained.sha256, sha256_hex(&detained.bytes));

        let wb: Xlsx<_> =
            open_workbook_from_rs(Cursor::new(detained.bytes.as_slice())).expect("open");
        assert_eq!(wb.sheet_names(), vec!["Detained".to_string()]);
    }

    #[test]
    fn default_sheet_title_when_titles_disabled() {
        let ds = marks_dataset(vec![Cell::Number(50.0)]);
        let opts = ClassifyOptions {
            sheet_titles: false,
            ..ClassifyOptions::default()
        };
        let report = classify_dataset(&ds, &opts).expect("classify");
        let downloads = build_downloads(&report, &opts).expect("downloads");
        let wb: Xlsx<_> =
            open_workbook_from_rs(Cursor::new(downloads[0].bytes.as_slice())).expect("open");
        assert_eq!(wb.sheet_names(), vec!["Sheet1".to_string()]);
    }

    #[test]
    fn generate_rejects_unreadable_upload() {
        let err = generate_reports(b"PK\x03\x04 truncated", &ClassifyOptions::default())
            .unwrap_err();
        assert_eq!(err.code(), "dataset_load_failed");
    }

    #[test]
    fn dates_are_written_back_as_dates() {
        let ds = Dataset::new(
            vec!["NAME".into(), "DOB".into(), "MARKS".into()],
            vec![
                vec![
                    Cell::Text("Asha".into()),
                    Cell::DateTime(39585.0),
                    Cell::Number(30.0),
                ],
                vec![
                    Cell::Text("Bilal".into()),
                    Cell::DateTime(39585.5),
                    Cell::Number(40.0),
                ],
            ],
        );
        let bytes = write_xlsx(&ds, Category::Pass, Some("Pass")).expect("write");

        let mut wb: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes.as_slice())).expect("open");
        let range = wb.worksheet_range_at(0).expect("sheet").expect("range");
        match range.get_value((1, 1)) {
            Some(calamine::Data::DateTime(dt)) => assert_eq!(dt.as_f64(), 39585.0),
            other => panic!("date cell came back as {other:?}"),
        }

        let back = Dataset::from_xlsx_bytes(&bytes).expect("read back");
        assert_eq!(back, ds);
    }

    #[test]
    fn too_many_columns_is_rejected_before_writing() {
        let columns: Vec<String> = (0..16_385).map(|i| format!("C{i}")).collect();
        let ds = Dataset::new(columns, vec![]);
        let err = write_xlsx(&ds, Category::Fail, None).unwrap_err();
        assert!(matches!(err, ClassifyError::TooLarge { .. }), "{err:?}");
        assert_eq!(err.code(), "serialize_failed");
    }
}
