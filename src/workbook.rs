use calamine::{open_workbook_auto, Reader};
use std::collections::HashMap;
use std::path::Path;

/// Header rows are looked for only in the first few rows of a sheet; report
/// versions differ in how many caption/title rows they prepend.
pub const HEADER_SCAN_ROWS: usize = 5;

/// Logical sheet categories of one operations report workbook. A workbook may
/// omit any of them; a missing sheet contributes zero records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SheetCategory {
    Detail,
    GoodList,
    BadList,
    ByCenter,
    SlaOverThreshold,
    Delivery,
    WrongCenter,
    CompleteDiff,
    Summary,
}

impl SheetCategory {
    pub fn label(&self) -> &'static str {
        match self {
            SheetCategory::Detail => "detail",
            SheetCategory::GoodList => "good-list",
            SheetCategory::BadList => "bad-list",
            SheetCategory::ByCenter => "by-center",
            SheetCategory::SlaOverThreshold => "sla-over-threshold",
            SheetCategory::Delivery => "delivery",
            SheetCategory::WrongCenter => "wrong-center",
            SheetCategory::CompleteDiff => "complete-diff",
            SheetCategory::Summary => "summary",
        }
    }
}

#[derive(Debug)]
struct SheetSpec {
    category: SheetCategory,
    names: &'static [&'static str],
}

/// Recognized sheet-name spellings across report versions. Daily exports use
/// the English tab names, monthly rollups the Thai ones.
const SHEET_SPECS: &[SheetSpec] = &[
    SheetSpec {
        category: SheetCategory::Detail,
        names: &["detail", "details", "card detail", "card_detail", "รายละเอียด"],
    },
    SheetSpec {
        category: SheetCategory::GoodList,
        names: &["good", "good list", "good_list", "good cards", "บัตรดี"],
    },
    SheetSpec {
        category: SheetCategory::BadList,
        names: &["bad", "bad list", "bad_list", "bad cards", "บัตรเสีย"],
    },
    SheetSpec {
        category: SheetCategory::ByCenter,
        names: &["by center", "by_center", "center", "centers", "รายศูนย์"],
    },
    SheetSpec {
        category: SheetCategory::SlaOverThreshold,
        names: &[
            "sla over threshold",
            "sla_over_threshold",
            "over sla",
            "over_sla",
            "เกิน sla",
        ],
    },
    SheetSpec {
        category: SheetCategory::Delivery,
        names: &["delivery", "deliveries", "จัดส่ง", "ไปรษณีย์"],
    },
    SheetSpec {
        category: SheetCategory::WrongCenter,
        names: &["wrong center", "wrong_center", "ผิดศูนย์"],
    },
    SheetSpec {
        category: SheetCategory::CompleteDiff,
        names: &["complete diff", "complete_diff", "duplicate cards", "บัตรซ้ำ"],
    },
    SheetSpec {
        category: SheetCategory::Summary,
        names: &["summary", "สรุป", "สรุปผล"],
    },
];

/// One workbook loaded into memory: the source filename (natural key of the
/// resulting batch) and a trimmed string grid per recognized sheet.
#[derive(Debug, Default)]
pub struct ReportWorkbook {
    pub filename: String,
    sheets: HashMap<SheetCategory, Vec<Vec<String>>>,
}

impl ReportWorkbook {
    pub fn new(filename: impl Into<String>) -> Self {
        ReportWorkbook {
            filename: filename.into(),
            sheets: HashMap::new(),
        }
    }

    pub fn insert_sheet(&mut self, category: SheetCategory, grid: Vec<Vec<String>>) {
        self.sheets.insert(category, grid);
    }

    /// Grid for a category; a missing sheet reads as an empty grid.
    pub fn sheet(&self, category: SheetCategory) -> &[Vec<String>] {
        self.sheets
            .get(&category)
            .map(|g| g.as_slice())
            .unwrap_or(&[])
    }

    pub fn has_sheet(&self, category: SheetCategory) -> bool {
        self.sheets.contains_key(&category)
    }

    pub fn sheet_labels(&self) -> Vec<&'static str> {
        let mut labels = self
            .sheets
            .keys()
            .map(SheetCategory::label)
            .collect::<Vec<_>>();
        labels.sort_unstable();
        labels
    }
}

pub(crate) fn trim_cell(text: &str) -> String {
    text.trim()
        .trim_start_matches('\u{feff}')
        .trim()
        .to_string()
}

/// Collapses the two header naming conventions (space-delimited vs
/// underscore-delimited) and case onto one key before alias matching.
pub(crate) fn normalize_key(key: &str) -> String {
    trim_cell(key)
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .collect()
}

fn resolve_sheet_category(sheet_name: &str) -> Option<SheetCategory> {
    let key = normalize_key(sheet_name);
    if key.is_empty() {
        return None;
    }
    for spec in SHEET_SPECS {
        if spec.names.iter().any(|n| normalize_key(n) == key) {
            return Some(spec.category);
        }
    }
    None
}

/// Opens a workbook and loads every recognized sheet into a trimmed string
/// grid. Unrecognized sheets are ignored; duplicated category names keep the
/// first sheet encountered.
pub fn read_report_workbook(path: &Path) -> Result<ReportWorkbook, String> {
    if !path.exists() {
        return Err(format!("report file not found: {}", path.to_string_lossy()));
    }
    if !path.is_file() {
        return Err(format!(
            "report path is not a file: {}",
            path.to_string_lossy()
        ));
    }

    let filename = path
        .file_name()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| format!("report filename is not valid UTF-8: {}", path.to_string_lossy()))?;

    let mut workbook =
        open_workbook_auto(path).map_err(|e| format!("failed to open workbook: {e}"))?;
    let sheet_names = workbook.sheet_names().to_owned();

    let mut report = ReportWorkbook::new(filename);
    for sheet_name in sheet_names {
        let Some(category) = resolve_sheet_category(&sheet_name) else {
            continue;
        };
        if report.has_sheet(category) {
            continue;
        }
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| format!("failed to read sheet {sheet_name}: {e}"))?;
        let grid = range
            .rows()
            .map(|row| {
                row.iter()
                    .map(|cell| trim_cell(&cell.to_string()))
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        report.insert_sheet(category, grid);
    }

    Ok(report)
}

/// Scans the first [`HEADER_SCAN_ROWS`] rows for a row whose first cell is
/// one of the category's running-index markers. The detail sheet carries no
/// leading caption rows, so it falls back to row 0; every other category
/// reports the header as absent instead.
pub fn locate_header_row(
    grid: &[Vec<String>],
    markers: &[&str],
    default_to_first: bool,
) -> Option<usize> {
    for (idx, row) in grid.iter().take(HEADER_SCAN_ROWS).enumerate() {
        let first = row.first().map(|c| normalize_key(c)).unwrap_or_default();
        if first.is_empty() {
            continue;
        }
        if markers.iter().any(|m| normalize_key(m) == first) {
            return Some(idx);
        }
    }
    if default_to_first && !grid.is_empty() {
        Some(0)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn resolves_sheet_names_across_conventions() {
        assert_eq!(resolve_sheet_category("Detail"), Some(SheetCategory::Detail));
        assert_eq!(
            resolve_sheet_category("good_list"),
            Some(SheetCategory::GoodList)
        );
        assert_eq!(
            resolve_sheet_category("Good List"),
            Some(SheetCategory::GoodList)
        );
        assert_eq!(
            resolve_sheet_category("บัตรเสีย"),
            Some(SheetCategory::BadList)
        );
        assert_eq!(resolve_sheet_category("Pivot"), None);
    }

    #[test]
    fn finds_header_below_caption_rows() {
        let g = grid(&[
            &["Card Issuance Report", ""],
            &["Period: 11/2025", ""],
            &["No.", "Serial Number"],
            &["1", "0000000000123"],
        ]);
        assert_eq!(locate_header_row(&g, &["No.", "ลำดับ"], false), Some(2));
    }

    #[test]
    fn marker_match_is_case_and_convention_insensitive() {
        let g = grid(&[&["no.", "serial_number"]]);
        assert_eq!(locate_header_row(&g, &["No."], false), Some(0));
    }

    #[test]
    fn absent_header_within_scan_window() {
        let g = grid(&[
            &["a", ""],
            &["b", ""],
            &["c", ""],
            &["d", ""],
            &["e", ""],
            &["No.", "Serial Number"],
        ]);
        assert_eq!(locate_header_row(&g, &["No."], false), None);
    }

    #[test]
    fn detail_defaults_to_first_row() {
        let g = grid(&[&["Serial Number", "Status"], &["123", "Good"]]);
        assert_eq!(locate_header_row(&g, &["No."], true), Some(0));
        assert_eq!(locate_header_row(&[], &["No."], true), None);
    }

    #[test]
    fn missing_sheet_reads_as_empty_grid() {
        let wb = ReportWorkbook::new("r.xlsx");
        assert!(wb.sheet(SheetCategory::Delivery).is_empty());
        assert!(!wb.has_sheet(SheetCategory::Delivery));
    }
}
