//! Locate and load the three related tables that make up one VAERS data drop.
//!
//! A yearly VAERS export is three co-located files sharing a prefix, e.g.
//! `2021VAERSVAX.csv`, `2021VAERSDATA.csv` and `2021VAERSSYMPTOMS.csv`. Callers pass
//! the vaccination file; the other two paths are derived from it.

use qu::ick_use::*;
use std::path::{Path, PathBuf};

use crate::{path_exists, Reports, Result, SymptomTable, Vaccinations};

/// The three tables of a VAERS export, named by their fixed filename suffix.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TableKind {
    /// `*VAERSVAX.csv`: report id -> administered vaccine products.
    Vaccinations,
    /// `*VAERSDATA.csv`: report id -> case details, including both dates.
    Details,
    /// `*VAERSSYMPTOMS.csv`: report id -> symptom terms, five per row.
    Symptoms,
}

impl TableKind {
    pub fn suffix(self) -> &'static str {
        match self {
            TableKind::Vaccinations => "VAERSVAX.csv",
            TableKind::Details => "VAERSDATA.csv",
            TableKind::Symptoms => "VAERSSYMPTOMS.csv",
        }
    }
}

/// Whether a path names a vaccination file (the anchor of a dataset).
pub fn is_vaccination_file(path: &Path) -> bool {
    matches!(path.file_name().and_then(|n| n.to_str()),
        Some(name) if name.ends_with(TableKind::Vaccinations.suffix()))
}

/// Derive the path of a companion table from the vaccination file path.
///
/// The derived file must exist; a dataset with a missing companion is unusable, so
/// this is fatal rather than skip-and-continue.
pub fn companion_path(vax_path: &Path, kind: TableKind) -> Result<PathBuf> {
    let name = vax_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| format_err!("invalid dataset path \"{}\"", vax_path.display()))?;
    ensure!(
        is_vaccination_file(vax_path),
        "expected a *{} file, got \"{}\"",
        TableKind::Vaccinations.suffix(),
        vax_path.display()
    );
    let prefix = &name[..name.len() - TableKind::Vaccinations.suffix().len()];
    let path = vax_path.with_file_name(format!("{}{}", prefix, kind.suffix()));
    ensure!(
        path_exists(&path)?,
        "missing companion file \"{}\" (expected next to \"{}\")",
        path.display(),
        vax_path.display()
    );
    Ok(path)
}

/// One loaded VAERS export, joined on VAERS_ID by the aggregation passes.
pub struct Dataset {
    pub vaccinations: Vaccinations,
    pub reports: Reports,
    /// Only loaded when a pass needs symptom terms.
    pub symptoms: SymptomTable,
}

impl Dataset {
    /// Load the tables for one export, given its vaccination file.
    ///
    /// `need_symptoms` is false for plain onset aggregation, which never looks at
    /// symptom terms; the symptoms file is not required to exist in that case.
    pub fn load(vax_path: impl AsRef<Path>, need_symptoms: bool) -> Result<Self> {
        let vax_path = vax_path.as_ref();
        let vaccinations = Vaccinations::load_csv(vax_path)?;
        let reports = Reports::load_csv(companion_path(vax_path, TableKind::Details)?)?;
        let symptoms = if need_symptoms {
            SymptomTable::load_csv(companion_path(vax_path, TableKind::Symptoms)?)?
        } else {
            SymptomTable::default()
        };
        event!(
            Level::INFO,
            "loaded \"{}\": {} vaccination rows, {} reports, {} symptom sets",
            vax_path.display(),
            vaccinations.len(),
            reports.len(),
            symptoms.len()
        );
        Ok(Dataset {
            vaccinations,
            reports,
            symptoms,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    #[test]
    fn companion_paths_derive_from_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let vax = dir.path().join("2021VAERSVAX.csv");
        let detail = dir.path().join("2021VAERSDATA.csv");
        let symptoms = dir.path().join("2021VAERSSYMPTOMS.csv");
        fs::write(&vax, "VAERS_ID,VAX_TYPE\n").unwrap();
        fs::write(&detail, "VAERS_ID,VAX_DATE,ONSET_DATE\n").unwrap();
        fs::write(&symptoms, "VAERS_ID,SYMPTOM1\n").unwrap();

        assert_eq!(companion_path(&vax, TableKind::Details).unwrap(), detail);
        assert_eq!(companion_path(&vax, TableKind::Symptoms).unwrap(), symptoms);
    }

    #[test]
    fn missing_companion_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let vax = dir.path().join("2021VAERSVAX.csv");
        fs::write(&vax, "VAERS_ID,VAX_TYPE\n").unwrap();

        let err = companion_path(&vax, TableKind::Details).unwrap_err();
        assert!(err.to_string().contains("missing companion file"));
    }

    #[test]
    fn non_vaccination_anchor_is_rejected() {
        assert!(companion_path(Path::new("2021VAERSDATA.csv"), TableKind::Symptoms).is_err());
        assert!(is_vaccination_file(Path::new("2021VAERSVAX.csv")));
        assert!(!is_vaccination_file(Path::new("2021VAERSDATA.csv")));
    }
}
