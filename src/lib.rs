pub mod aggregate;
pub mod cache;
pub mod dataset;
pub mod render;
pub mod symptoms;
mod util;

pub use anyhow::{Context, Error};
use chrono::NaiveDate;
use qu::ick_use::*;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use encoding_rs_io::DecodeReaderBytesBuilder;
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    ops::Deref,
    path::Path,
    sync::Arc,
};

pub use crate::util::{check_extension, header, path_exists};
use crate::util::{opt_vaers_date, optional_string};

pub type ArcStr = Arc<str>;
pub type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;

/// The report identifier shared by all three VAERS tables.
pub type VaersId = u64;

#[derive(Debug, Clone, Deserialize)]
struct VaccinationRaw {
    #[serde(rename = "VAERS_ID")]
    id: VaersId,
    #[serde(rename = "VAX_TYPE")]
    vax_type: ArcStr,
}

/// A row in the vaccination dataset (`*VAERSVAX.csv`).
///
/// In this and the other datastructures, `id` (VAERS_ID) always identifies the same
/// adverse-event report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vaccination {
    pub id: VaersId,
    /// Vaccine product code, e.g. "COVID19" or "FLU3".
    pub vax_type: ArcStr,
}

impl From<VaccinationRaw> for Vaccination {
    fn from(from: VaccinationRaw) -> Self {
        Self {
            id: from.id,
            vax_type: from.vax_type,
        }
    }
}

/// The parsed list of vaccination rows, with a pre-built index for the `id` field.
///
/// A report may list several administered vaccines; the index keeps the first row per
/// report, which is the one used as the report's product category.
pub struct Vaccinations {
    els: Vec<Vaccination>,
    id_idx: BTreeMap<VaersId, usize>,
}

impl Vaccinations {
    pub fn load_csv(path: impl AsRef<Path>) -> Result<Self> {
        let els: Vec<VaccinationRaw> = load_csv(path.as_ref())?;
        Ok(Self::new(els.into_iter().map(Into::into).collect()))
    }

    pub fn find_by_id(&self, id: VaersId) -> Option<&Vaccination> {
        let idx = self.id_idx.get(&id)?;
        self.els.get(*idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vaccination> + '_ {
        self.els.iter()
    }

    /// All distinct product codes present, with the number of reports naming each.
    pub fn product_counts(&self) -> BTreeMap<ArcStr, usize> {
        let mut map = BTreeMap::new();
        for el in self.els.iter() {
            *map.entry(el.vax_type.clone()).or_insert(0) += 1;
        }
        map
    }

    fn new(els: Vec<Vaccination>) -> Self {
        let mut this = Vaccinations {
            els,
            id_idx: BTreeMap::new(),
        };
        this.rebuild_index();
        this
    }

    fn rebuild_index(&mut self) {
        self.id_idx.clear();
        for (idx, el) in self.els.iter().enumerate() {
            self.id_idx.entry(el.id).or_insert(idx);
        }
    }
}

impl Deref for Vaccinations {
    type Target = [Vaccination];
    fn deref(&self) -> &Self::Target {
        &self.els
    }
}

impl FromIterator<Vaccination> for Vaccinations {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = Vaccination>,
    {
        Self::new(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ReportRaw {
    #[serde(rename = "VAERS_ID")]
    id: VaersId,
    #[serde(rename = "VAX_DATE", deserialize_with = "opt_vaers_date", default)]
    vax_date: Option<NaiveDate>,
    #[serde(rename = "ONSET_DATE", deserialize_with = "opt_vaers_date", default)]
    onset_date: Option<NaiveDate>,
}

/// A row in the case detail dataset (`*VAERSDATA.csv`).
///
/// Either date may be missing; such reports are excluded from onset aggregation but
/// are not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: VaersId,
    pub vax_date: Option<NaiveDate>,
    pub onset_date: Option<NaiveDate>,
}

impl From<ReportRaw> for Report {
    fn from(from: ReportRaw) -> Self {
        Self {
            id: from.id,
            vax_date: from.vax_date,
            onset_date: from.onset_date,
        }
    }
}

/// The parsed list of case details, with a pre-built index for the `id` field.
pub struct Reports {
    els: Vec<Report>,
    id_idx: BTreeMap<VaersId, usize>,
}

impl Reports {
    pub fn load_csv(path: impl AsRef<Path>) -> Result<Self> {
        let els: Vec<ReportRaw> = load_csv(path.as_ref())?;
        Ok(Self::new(els.into_iter().map(Into::into).collect()))
    }

    pub fn find_by_id(&self, id: VaersId) -> Option<&Report> {
        let idx = self.id_idx.get(&id)?;
        self.els.get(*idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Report> + '_ {
        self.els.iter()
    }

    fn new(els: Vec<Report>) -> Self {
        let mut this = Reports {
            els,
            id_idx: BTreeMap::new(),
        };
        this.rebuild_index();
        this
    }

    fn rebuild_index(&mut self) {
        self.id_idx.clear();
        for (idx, el) in self.els.iter().enumerate() {
            self.id_idx.entry(el.id).or_insert(idx);
        }
    }
}

impl Deref for Reports {
    type Target = [Report];
    fn deref(&self) -> &Self::Target {
        &self.els
    }
}

impl FromIterator<Report> for Reports {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = Report>,
    {
        Self::new(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SymptomRowRaw {
    #[serde(rename = "VAERS_ID")]
    id: VaersId,
    #[serde(rename = "SYMPTOM1", deserialize_with = "optional_string", default)]
    symptom1: Option<ArcStr>,
    #[serde(rename = "SYMPTOM2", deserialize_with = "optional_string", default)]
    symptom2: Option<ArcStr>,
    #[serde(rename = "SYMPTOM3", deserialize_with = "optional_string", default)]
    symptom3: Option<ArcStr>,
    #[serde(rename = "SYMPTOM4", deserialize_with = "optional_string", default)]
    symptom4: Option<ArcStr>,
    #[serde(rename = "SYMPTOM5", deserialize_with = "optional_string", default)]
    symptom5: Option<ArcStr>,
}

impl SymptomRowRaw {
    fn terms(&self) -> impl Iterator<Item = &ArcStr> {
        [
            &self.symptom1,
            &self.symptom2,
            &self.symptom3,
            &self.symptom4,
            &self.symptom5,
        ]
        .into_iter()
        .filter_map(|s| s.as_ref())
    }
}

/// The symptom terms per report (`*VAERSSYMPTOMS.csv`), case-folded.
///
/// A report with more than five symptoms spans several rows in the source file; rows
/// sharing a VAERS_ID are merged into one term set here.
#[derive(Default)]
pub struct SymptomTable {
    sets: BTreeMap<VaersId, BTreeSet<ArcStr>>,
}

impl SymptomTable {
    pub fn load_csv(path: impl AsRef<Path>) -> Result<Self> {
        let rows: Vec<SymptomRowRaw> = load_csv(path.as_ref())?;
        let mut this = SymptomTable::default();
        for row in &rows {
            let set = this.sets.entry(row.id).or_default();
            for term in row.terms() {
                set.insert(term.to_lowercase().into());
            }
        }
        Ok(this)
    }

    pub fn get(&self, id: VaersId) -> Option<&BTreeSet<ArcStr>> {
        self.sets.get(&id)
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn insert(&mut self, id: VaersId, terms: impl IntoIterator<Item = ArcStr>) {
        let set = self.sets.entry(id).or_default();
        for term in terms {
            set.insert(term.to_lowercase().into());
        }
    }
}

/// Load a VAERS CSV into memory.
///
/// VAERS exports are windows-1252 encoded, not UTF-8; the byte stream is decoded
/// before it reaches the CSV parser. Rows that fail to parse (bad id, unparseable
/// date) are skipped with a warning rather than aborting the run; a missing file is
/// fatal.
fn load_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    fn inner<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
        let decoded = DecodeReaderBytesBuilder::new()
            .encoding(Some(encoding_rs::WINDOWS_1252))
            .build(fs::File::open(path)?);
        let rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(decoded);
        let mut els = Vec::new();
        let mut skipped = 0u64;
        for row in rdr.into_deserialize() {
            match row {
                Ok(el) => els.push(el),
                Err(e) => {
                    skipped += 1;
                    event!(Level::DEBUG, "skipping malformed row: {}", e);
                }
            }
        }
        if skipped > 0 {
            event!(
                Level::WARN,
                "skipped {} malformed rows in \"{}\"",
                skipped,
                path.display()
            );
        }
        Ok(els)
    }
    inner(path).with_context(|| format!("while loading \"{}\"", path.display()))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    fn write_tmp(name: &str, contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn load_vaccinations_first_row_wins() {
        let (_dir, path) = write_tmp(
            "2021VAERSVAX.csv",
            "VAERS_ID,VAX_TYPE,VAX_MANU\n1,COVID19,X\n1,FLU3,Y\n2,FLU3,Y\n",
        );
        let vax = Vaccinations::load_csv(&path).unwrap();
        assert_eq!(vax.len(), 3);
        assert_eq!(&*vax.find_by_id(1).unwrap().vax_type, "COVID19");
        assert_eq!(&*vax.find_by_id(2).unwrap().vax_type, "FLU3");
        assert!(vax.find_by_id(3).is_none());
    }

    #[test]
    fn load_reports_with_missing_dates() {
        let (_dir, path) = write_tmp(
            "2021VAERSDATA.csv",
            "VAERS_ID,RECVDATE,VAX_DATE,ONSET_DATE\n\
             1,01/06/2021,01/01/2021,01/05/2021\n\
             2,01/06/2021,01/01/2021,\n\
             3,01/06/2021,,01/05/2021\n",
        );
        let reports = Reports::load_csv(&path).unwrap();
        assert_eq!(reports.len(), 3);
        assert!(reports.find_by_id(1).unwrap().onset_date.is_some());
        assert!(reports.find_by_id(2).unwrap().onset_date.is_none());
        assert!(reports.find_by_id(3).unwrap().vax_date.is_none());
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let (_dir, path) = write_tmp(
            "2021VAERSDATA.csv",
            "VAERS_ID,VAX_DATE,ONSET_DATE\n\
             1,01/01/2021,01/05/2021\n\
             not-a-number,01/01/2021,01/05/2021\n\
             3,31/31/2021,01/05/2021\n",
        );
        let reports = Reports::load_csv(&path).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].id, 1);
    }

    #[test]
    fn latin1_rows_are_decoded_not_dropped() {
        // 0xe9 is "é" in windows-1252, and an invalid byte in UTF-8
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2021VAERSSYMPTOMS.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"VAERS_ID,SYMPTOM1\n1,Guillain-Barr\xe9 syndrome\n2,Pyrexia\n")
            .unwrap();

        let symptoms = SymptomTable::load_csv(&path).unwrap();
        assert!(symptoms.get(1).unwrap().contains("guillain-barré syndrome"));
        assert!(symptoms.get(2).unwrap().contains("pyrexia"));
    }

    #[test]
    fn symptom_rows_merge_and_case_fold() {
        let (_dir, path) = write_tmp(
            "2021VAERSSYMPTOMS.csv",
            "VAERS_ID,SYMPTOM1,SYMPTOMVERSION1,SYMPTOM2,SYMPTOMVERSION2,SYMPTOM3,SYMPTOMVERSION3,SYMPTOM4,SYMPTOMVERSION4,SYMPTOM5,SYMPTOMVERSION5\n\
             1,Pyrexia,23.1,Headache,23.1,,,,,,\n\
             1,Chills,23.1,,,,,,,,\n",
        );
        let symptoms = SymptomTable::load_csv(&path).unwrap();
        let set = symptoms.get(1).unwrap();
        assert_eq!(set.len(), 3);
        assert!(set.contains("pyrexia"));
        assert!(set.contains("chills"));
        assert!(symptoms.get(2).is_none());
    }
}
