use axum::{
    http::header,
    response::{IntoResponse, Response},
};
use chrono::NaiveDate;

use crate::error::AppError;

/// A finished CSV download.
#[derive(Debug)]
pub struct CsvExport {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl CsvExport {
    /// `stem` plus the export date, e.g. `members-2025-03-01.csv`.
    pub fn new(stem: &str, on: NaiveDate, bytes: Vec<u8>) -> Self {
        Self {
            filename: format!("{}-{}.csv", stem, on.format("%Y-%m-%d")),
            bytes,
        }
    }
}

impl IntoResponse for CsvExport {
    fn into_response(self) -> Response {
        (
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", self.filename),
                ),
            ],
            self.bytes,
        )
            .into_response()
    }
}

pub fn to_csv<I, R>(headers: &[&str], rows: I) -> Result<Vec<u8>, AppError>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = String>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(headers)
        .map_err(|e| AppError::Export(e.to_string()))?;
    for row in rows {
        let row: Vec<String> = row.into_iter().collect();
        writer
            .write_record(&row)
            .map_err(|e| AppError::Export(e.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|e| AppError::Export(e.to_string()))
}

/// Cents as a plain decimal string, `1234` -> `12.34`.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.abs();
    format!("{}{}.{:02}", sign, cents / 100, cents % 100)
}

pub fn opt<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_header_and_quotes_fields() {
        let bytes = to_csv(
            &["name", "note"],
            vec![
                vec!["Ruth".to_string(), "plain".to_string()],
                vec!["Boaz".to_string(), "has, comma".to_string()],
                vec!["Naomi".to_string(), "says \"hi\"".to_string()],
            ],
        )
        .unwrap();

        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            "name,note\nRuth,plain\nBoaz,\"has, comma\"\nNaomi,\"says \"\"hi\"\"\"\n"
        );
    }

    #[test]
    fn response_is_an_attachment() {
        let export = CsvExport::new(
            "members",
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            b"a\n".to_vec(),
        );
        let response = export.into_response();
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"members-2025-03-01.csv\""
        );
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/csv; charset=utf-8"
        );
    }

    #[test]
    fn cents_format() {
        assert_eq!(format_cents(1234), "12.34");
        assert_eq!(format_cents(5), "0.05");
        assert_eq!(format_cents(-250), "-2.50");
    }
}
