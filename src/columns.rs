use std::collections::HashMap;

use crate::workbook::{locate_header_row, normalize_key, trim_cell, SheetCategory};

/// Maps one canonical field key to every header spelling observed for it
/// across report versions: space-delimited, underscore-delimited and Thai.
#[derive(Debug)]
pub struct AliasSpec {
    pub field: &'static str,
    pub aliases: &'static [&'static str],
}

/// Header text of the running-index column, used to locate the header row.
const INDEX_MARKERS: &[&str] = &["No.", "no", "ลำดับ", "ลำดับที่"];

const APPOINTMENT_ID_ALIASES: &[&str] = &[
    "Appointment No",
    "appointment_no",
    "Appointment ID",
    "เลขที่นัดหมาย",
    "หมายเลขนัดหมาย",
];
const CARD_ID_ALIASES: &[&str] = &["Card No", "card_no", "Card ID", "เลขบัตร", "หมายเลขบัตร"];
const SERIAL_ALIASES: &[&str] = &[
    "Serial Number",
    "serial_no",
    "Serial",
    "S/N",
    "เลขซีเรียล",
    "หมายเลขซีเรียล",
];
const WORK_PERMIT_ALIASES: &[&str] = &[
    "Work Permit No",
    "work_permit_no",
    "WP No",
    "เลขที่ใบอนุญาตทำงาน",
    "ใบอนุญาตเลขที่",
];
const STATUS_ALIASES: &[&str] = &[
    "Status",
    "print_result",
    "Print Result",
    "สถานะ",
    "ผลการพิมพ์",
];
const OPERATOR_ALIASES: &[&str] = &[
    "Operator",
    "printed_by",
    "Printed By",
    "เจ้าหน้าที่",
    "ผู้พิมพ์",
];
const CENTER_ALIASES: &[&str] = &[
    "Center",
    "Branch",
    "service_center",
    "ศูนย์",
    "ศูนย์บริการ",
    "สาขา",
];
const PRINT_DATE_ALIASES: &[&str] = &["Print Date", "print_date", "วันที่พิมพ์"];

const DETAIL_ALIAS_SPECS: &[AliasSpec] = &[
    AliasSpec {
        field: "appointment_id",
        aliases: APPOINTMENT_ID_ALIASES,
    },
    AliasSpec {
        field: "card_id",
        aliases: CARD_ID_ALIASES,
    },
    AliasSpec {
        field: "serial_number",
        aliases: SERIAL_ALIASES,
    },
    AliasSpec {
        field: "work_permit_no",
        aliases: WORK_PERMIT_ALIASES,
    },
    AliasSpec {
        field: "status",
        aliases: STATUS_ALIASES,
    },
    AliasSpec {
        field: "operator",
        aliases: OPERATOR_ALIASES,
    },
    AliasSpec {
        field: "center",
        aliases: CENTER_ALIASES,
    },
    AliasSpec {
        field: "print_date",
        aliases: PRINT_DATE_ALIASES,
    },
    AliasSpec {
        field: "appointment_date",
        aliases: &[
            "Appointment Date",
            "appointment_date",
            "วันที่นัดหมาย",
            "วันนัด",
        ],
    },
    AliasSpec {
        field: "appointment_center",
        aliases: &[
            "Appointment Center",
            "appointment_center",
            "ศูนย์นัดหมาย",
            "ศูนย์ที่นัด",
        ],
    },
    AliasSpec {
        field: "queue_no",
        aliases: &["Queue No", "queue_no", "เลขคิว", "หมายเลขคิว"],
    },
    AliasSpec {
        field: "queue_called_at",
        aliases: &["Queue Called Time", "queue_called_time", "เวลาเรียกคิว"],
    },
    AliasSpec {
        field: "wait_minutes",
        aliases: &[
            "Wait Minutes",
            "wait_minutes",
            "เวลารอ (นาที)",
            "ระยะเวลารอ",
        ],
    },
    AliasSpec {
        field: "sla_start",
        aliases: &["Start Time", "start_time", "เวลาเริ่ม", "เวลาเริ่มพิมพ์"],
    },
    AliasSpec {
        field: "sla_stop",
        aliases: &[
            "Stop Time",
            "stop_time",
            "finish_time",
            "เวลาเสร็จ",
            "เวลาสิ้นสุด",
        ],
    },
    AliasSpec {
        field: "sla_minutes",
        aliases: &[
            "SLA Minutes",
            "sla_minutes",
            "process_minutes",
            "ระยะเวลา (นาที)",
        ],
    },
];

const GOOD_LIST_ALIAS_SPECS: &[AliasSpec] = &[
    AliasSpec {
        field: "serial_number",
        aliases: SERIAL_ALIASES,
    },
    AliasSpec {
        field: "card_id",
        aliases: CARD_ID_ALIASES,
    },
    AliasSpec {
        field: "work_permit_no",
        aliases: WORK_PERMIT_ALIASES,
    },
    AliasSpec {
        field: "operator",
        aliases: OPERATOR_ALIASES,
    },
    AliasSpec {
        field: "center",
        aliases: CENTER_ALIASES,
    },
    AliasSpec {
        field: "print_date",
        aliases: PRINT_DATE_ALIASES,
    },
];

const BAD_LIST_ALIAS_SPECS: &[AliasSpec] = &[
    AliasSpec {
        field: "serial_number",
        aliases: SERIAL_ALIASES,
    },
    AliasSpec {
        field: "card_id",
        aliases: CARD_ID_ALIASES,
    },
    AliasSpec {
        field: "work_permit_no",
        aliases: WORK_PERMIT_ALIASES,
    },
    AliasSpec {
        field: "reason",
        aliases: &[
            "Reason",
            "reject_reason",
            "Reject Reason",
            "สาเหตุ",
            "สาเหตุบัตรเสีย",
        ],
    },
    AliasSpec {
        field: "operator",
        aliases: OPERATOR_ALIASES,
    },
    AliasSpec {
        field: "center",
        aliases: CENTER_ALIASES,
    },
    AliasSpec {
        field: "print_date",
        aliases: PRINT_DATE_ALIASES,
    },
];

const BY_CENTER_ALIAS_SPECS: &[AliasSpec] = &[
    AliasSpec {
        field: "center",
        aliases: CENTER_ALIASES,
    },
    AliasSpec {
        field: "good_count",
        aliases: &["Good", "good_count", "จำนวนบัตรดี", "บัตรดี"],
    },
    AliasSpec {
        field: "bad_count",
        aliases: &["Bad", "bad_count", "จำนวนบัตรเสีย", "บัตรเสีย"],
    },
    AliasSpec {
        field: "total_count",
        aliases: &["Total", "total_count", "รวม", "ทั้งหมด"],
    },
];

const ANOMALY_SLA_ALIAS_SPECS: &[AliasSpec] = &[
    AliasSpec {
        field: "serial_number",
        aliases: SERIAL_ALIASES,
    },
    AliasSpec {
        field: "work_permit_no",
        aliases: WORK_PERMIT_ALIASES,
    },
    AliasSpec {
        field: "operator",
        aliases: OPERATOR_ALIASES,
    },
    AliasSpec {
        field: "center",
        aliases: CENTER_ALIASES,
    },
    AliasSpec {
        field: "print_date",
        aliases: PRINT_DATE_ALIASES,
    },
    AliasSpec {
        field: "sla_minutes",
        aliases: &[
            "SLA Minutes",
            "sla_minutes",
            "process_minutes",
            "ระยะเวลา (นาที)",
        ],
    },
];

const WRONG_CENTER_ALIAS_SPECS: &[AliasSpec] = &[
    AliasSpec {
        field: "work_permit_no",
        aliases: WORK_PERMIT_ALIASES,
    },
    AliasSpec {
        field: "appointment_center",
        aliases: &[
            "Appointment Center",
            "appointment_center",
            "ศูนย์นัดหมาย",
            "ศูนย์ที่นัด",
        ],
    },
    AliasSpec {
        field: "actual_center",
        aliases: &[
            "Actual Center",
            "actual_center",
            "Print Center",
            "ศูนย์ที่พิมพ์",
        ],
    },
    AliasSpec {
        field: "print_date",
        aliases: PRINT_DATE_ALIASES,
    },
];

const COMPLETE_DIFF_ALIAS_SPECS: &[AliasSpec] = &[
    AliasSpec {
        field: "appointment_id",
        aliases: APPOINTMENT_ID_ALIASES,
    },
    AliasSpec {
        field: "serial_number",
        aliases: SERIAL_ALIASES,
    },
    AliasSpec {
        field: "card_count",
        aliases: &["Card Count", "card_count", "จำนวนบัตร"],
    },
    AliasSpec {
        field: "print_date",
        aliases: PRINT_DATE_ALIASES,
    },
];

const DELIVERY_ALIAS_SPECS: &[AliasSpec] = &[
    AliasSpec {
        field: "serial_number",
        aliases: SERIAL_ALIASES,
    },
    AliasSpec {
        field: "work_permit_no",
        aliases: WORK_PERMIT_ALIASES,
    },
    AliasSpec {
        field: "status",
        aliases: STATUS_ALIASES,
    },
    AliasSpec {
        field: "channel",
        aliases: &[
            "Channel",
            "delivery_channel",
            "Delivery Channel",
            "ช่องทาง",
            "ช่องทางการรับบัตร",
        ],
    },
    AliasSpec {
        field: "delivered_date",
        aliases: &[
            "Delivered Date",
            "delivered_date",
            "วันที่จัดส่ง",
            "วันที่รับบัตร",
        ],
    },
];

#[derive(Debug)]
pub struct CategorySpec {
    pub category: SheetCategory,
    pub markers: &'static [&'static str],
    pub aliases: &'static [AliasSpec],
    pub required: &'static [&'static str],
}

pub const DETAIL_SPEC: CategorySpec = CategorySpec {
    category: SheetCategory::Detail,
    markers: INDEX_MARKERS,
    aliases: DETAIL_ALIAS_SPECS,
    required: &["serial_number", "status"],
};

pub const GOOD_LIST_SPEC: CategorySpec = CategorySpec {
    category: SheetCategory::GoodList,
    markers: INDEX_MARKERS,
    aliases: GOOD_LIST_ALIAS_SPECS,
    required: &["serial_number"],
};

pub const BAD_LIST_SPEC: CategorySpec = CategorySpec {
    category: SheetCategory::BadList,
    markers: INDEX_MARKERS,
    aliases: BAD_LIST_ALIAS_SPECS,
    required: &["serial_number"],
};

pub const BY_CENTER_SPEC: CategorySpec = CategorySpec {
    category: SheetCategory::ByCenter,
    markers: INDEX_MARKERS,
    aliases: BY_CENTER_ALIAS_SPECS,
    required: &["center"],
};

pub const ANOMALY_SLA_SPEC: CategorySpec = CategorySpec {
    category: SheetCategory::SlaOverThreshold,
    markers: INDEX_MARKERS,
    aliases: ANOMALY_SLA_ALIAS_SPECS,
    required: &["serial_number"],
};

pub const WRONG_CENTER_SPEC: CategorySpec = CategorySpec {
    category: SheetCategory::WrongCenter,
    markers: INDEX_MARKERS,
    aliases: WRONG_CENTER_ALIAS_SPECS,
    required: &["work_permit_no"],
};

pub const COMPLETE_DIFF_SPEC: CategorySpec = CategorySpec {
    category: SheetCategory::CompleteDiff,
    markers: INDEX_MARKERS,
    aliases: COMPLETE_DIFF_ALIAS_SPECS,
    required: &["appointment_id"],
};

pub const DELIVERY_SPEC: CategorySpec = CategorySpec {
    category: SheetCategory::Delivery,
    markers: INDEX_MARKERS,
    aliases: DELIVERY_ALIAS_SPECS,
    required: &["serial_number"],
};

/// Rows of one category with matched header columns renamed to canonical
/// keys. Unmatched columns are simply never read.
#[derive(Debug)]
pub struct CategoryRows {
    pub header_row: usize,
    mapping: HashMap<&'static str, usize>,
    pub rows: Vec<Vec<String>>,
}

impl CategoryRows {
    pub fn field(&self, row: &[String], key: &str) -> String {
        self.mapping
            .get(key)
            .and_then(|idx| row.get(*idx))
            .map(|cell| trim_cell(cell))
            .unwrap_or_default()
    }

    pub fn has_column(&self, key: &str) -> bool {
        self.mapping.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Per-category extraction result. `Absent` and `Malformed` both degrade to
/// zero records for the category; neither blocks the rest of the import.
#[derive(Debug)]
pub enum CategoryOutcome {
    Rows(CategoryRows),
    Absent,
    Malformed(String),
}

impl CategoryOutcome {
    pub fn row_count(&self) -> usize {
        match self {
            CategoryOutcome::Rows(rows) => rows.len(),
            _ => 0,
        }
    }

    pub fn as_rows(&self) -> Option<&CategoryRows> {
        match self {
            CategoryOutcome::Rows(rows) => Some(rows),
            _ => None,
        }
    }
}

fn resolve_alias_mapping_from_row(
    row: &[String],
    specs: &[AliasSpec],
) -> HashMap<&'static str, usize> {
    let mut normalized: HashMap<String, usize> = HashMap::new();
    for (idx, cell) in row.iter().enumerate() {
        let key = normalize_key(cell);
        if !key.is_empty() {
            normalized.entry(key).or_insert(idx);
        }
    }

    let mut mapping = HashMap::new();
    for spec in specs {
        for alias in spec.aliases {
            if let Some(idx) = normalized.get(&normalize_key(alias)) {
                mapping.insert(spec.field, *idx);
                break;
            }
        }
    }
    mapping
}

fn parses_as_number(cell: &str) -> bool {
    let text = trim_cell(cell).replace(',', "");
    !text.is_empty() && text.parse::<f64>().map(f64::is_finite).unwrap_or(false)
}

/// Locates the header, renames matched columns and keeps only data rows whose
/// running-index cell parses as a number (trailing footer and blank rows do
/// not).
pub fn extract_category(grid: &[Vec<String>], spec: &CategorySpec) -> CategoryOutcome {
    let default_to_first = spec.category == SheetCategory::Detail;
    let Some(header_idx) = locate_header_row(grid, spec.markers, default_to_first) else {
        return CategoryOutcome::Absent;
    };

    let mapping = resolve_alias_mapping_from_row(&grid[header_idx], spec.aliases);
    let missing = spec
        .required
        .iter()
        .filter(|req| !mapping.contains_key(**req))
        .copied()
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return CategoryOutcome::Malformed(format!(
            "missing required columns: {}",
            missing.join(", ")
        ));
    }

    let mut rows = Vec::new();
    for row in &grid[header_idx + 1..] {
        if row.iter().all(|cell| trim_cell(cell).is_empty()) {
            continue;
        }
        let index_cell = row.first().map(String::as_str).unwrap_or("");
        if !parses_as_number(index_cell) {
            continue;
        }
        rows.push(row.clone());
    }

    CategoryOutcome::Rows(CategoryRows {
        header_row: header_idx,
        mapping,
        rows,
    })
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
    fn extracts_spaced_convention_headers() {
        let g = grid(&[
            &["No.", "Serial Number", "Status", "Work Permit No"],
            &["1", "123", "Good", "456"],
            &["2", "124", "Bad", "457"],
        ]);
        let outcome = extract_category(&g, &DETAIL_SPEC);
        let rows = outcome.as_rows().expect("detail rows");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.field(&rows.rows[0], "serial_number"), "123");
        assert_eq!(rows.field(&rows.rows[1], "status"), "Bad");
    }

    #[test]
    fn extracts_underscore_convention_headers() {
        let g = grid(&[
            &["no", "serial_no", "print_result", "work_permit_no"],
            &["1", "123", "Good", "456"],
        ]);
        let outcome = extract_category(&g, &DETAIL_SPEC);
        let rows = outcome.as_rows().expect("detail rows");
        assert_eq!(rows.field(&rows.rows[0], "serial_number"), "123");
        assert_eq!(rows.field(&rows.rows[0], "status"), "Good");
    }

    #[test]
    fn extracts_thai_headers() {
        let g = grid(&[
            &["ลำดับ", "เลขซีเรียล", "สถานะ", "ศูนย์"],
            &["1", "999", "สำเร็จ", "เชียงใหม่"],
        ]);
        let outcome = extract_category(&g, &DETAIL_SPEC);
        let rows = outcome.as_rows().expect("detail rows");
        assert_eq!(rows.field(&rows.rows[0], "serial_number"), "999");
        assert_eq!(rows.field(&rows.rows[0], "center"), "เชียงใหม่");
    }

    #[test]
    fn footer_rows_without_numeric_index_are_dropped() {
        let g = grid(&[
            &["No.", "Serial Number", "Status"],
            &["1", "123", "Good"],
            &["", "", ""],
            &["รวม", "500", ""],
            &["Total", "500", ""],
        ]);
        let outcome = extract_category(&g, &DETAIL_SPEC);
        assert_eq!(outcome.row_count(), 1);
    }

    #[test]
    fn missing_required_columns_is_malformed_not_fatal() {
        let g = grid(&[&["No.", "Operator"], &["1", "somchai"]]);
        match extract_category(&g, &DETAIL_SPEC) {
            CategoryOutcome::Malformed(reason) => {
                assert!(reason.contains("serial_number"));
                assert!(reason.contains("status"));
            }
            other => panic!("expected malformed, got {other:?}"),
        }
    }

    #[test]
    fn empty_grid_is_absent() {
        assert!(matches!(
            extract_category(&[], &GOOD_LIST_SPEC),
            CategoryOutcome::Absent
        ));
    }

    #[test]
    fn non_detail_without_marker_is_absent() {
        let g = grid(&[
            &["Good cards this month", ""],
            &["Serial Number", "Center"],
            &["123", "Bangkok"],
        ]);
        // Header row exists but its first cell is not the index marker and the
        // good-list category never defaults to row 0.
        assert!(matches!(
            extract_category(&g, &GOOD_LIST_SPEC),
            CategoryOutcome::Absent
        ));
    }

    #[test]
    fn header_found_below_caption_rows() {
        let g = grid(&[
            &["บัตรเสียประจำเดือน", ""],
            &["No.", "Serial Number", "Reason"],
            &["1", "321", "chip error"],
        ]);
        let outcome = extract_category(&g, &BAD_LIST_SPEC);
        let rows = outcome.as_rows().expect("bad rows");
        assert_eq!(rows.header_row, 1);
        assert_eq!(rows.field(&rows.rows[0], "reason"), "chip error");
    }
}
