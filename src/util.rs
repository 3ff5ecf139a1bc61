use crate::ArcStr;
use chrono::NaiveDate;
use serde::{de, Deserialize, Deserializer};
use std::{fs, io, path::Path};

/// Converts a not found error to Ok(false)
pub fn path_exists(path: &Path) -> io::Result<bool> {
    match fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if matches!(e.kind(), io::ErrorKind::NotFound) => Ok(false),
        Err(e) => Err(e),
    }
}

pub fn check_extension(path: &Path, ext: &str) -> crate::Result<()> {
    anyhow::ensure!(
        matches!(path.extension(), Some(p) if p == ext),
        "filename should end with `.{}`",
        ext
    );
    Ok(())
}

// Helpers for serde to parse fields with quirks.

/// Parse a date with the format used in the VAERS datasets (mm/dd/yyyy), mapping the
/// empty field to `None`.
///
/// VAERS exports leave the field blank when the date was not reported.
pub fn opt_vaers_date<'de, D>(d: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: &str = Deserialize::deserialize(d)?;
    if s.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(s, "%m/%d/%Y")
        .map(Some)
        .map_err(|e| de::Error::custom(format!("{}", e)))
}

/// Parse a string, but map "null" to `None` (in addition to the default "" -> None mapping)
pub fn optional_string<'de, D>(d: D) -> Result<Option<ArcStr>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(d)?;
    if s.eq_ignore_ascii_case("null") || s.is_empty() {
        Ok(None)
    } else {
        Ok(Some(s.into()))
    }
}

pub fn header(header: &str) {
    let len = header.len();
    print!("\n{}\n", header);
    for _ in 0..len {
        print!("=");
    }
    println!("\n")
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::NaiveDate;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct DateRow {
        #[serde(rename = "VAX_DATE", deserialize_with = "opt_vaers_date")]
        date: Option<NaiveDate>,
    }

    fn parse(csv_text: &str) -> Result<Option<NaiveDate>, csv::Error> {
        let mut rdr = csv::Reader::from_reader(csv_text.as_bytes());
        let row: DateRow = rdr.deserialize().next().unwrap()?;
        Ok(row.date)
    }

    #[test]
    fn vaers_date() {
        assert_eq!(
            parse("VAX_DATE\n01/05/2021").unwrap(),
            Some(NaiveDate::from_ymd_opt(2021, 1, 5).unwrap())
        );
    }

    #[test]
    fn missing_date_is_none() {
        assert_eq!(parse("VAX_DATE\n\"\"").unwrap(), None);
    }

    #[test]
    fn garbage_date_is_row_error() {
        assert!(parse("VAX_DATE\nnot-a-date").is_err());
    }
}
