use clap::Parser;
use qu::ick_use::*;
use std::{collections::BTreeSet, path::PathBuf};
use term_data_table::{Cell, Row, Table};
use vaers_onset_analysis::{
    aggregate::{
        aggregate_onset, aggregate_vaxfreq, check_known_products, AggregateMode, FrequencyTable,
        OnsetAudit, SymptomFrequencyTable,
    },
    cache::ResultCache,
    check_extension,
    dataset::{self, Dataset},
    header, render,
    symptoms::KeywordFilter,
    ArcStr,
};

/// Aggregate and chart VAERS adverse-event data.
///
/// The default mode bins event onset (days since vaccination) per vaccine product;
/// `--vaxfreq` switches to ranked symptom frequency for the selected products.
#[derive(Parser)]
struct Opt {
    /// Show N entries
    #[clap(short, default_value_t = 400)]
    n: usize,
    /// Chunks have N entries each
    #[clap(long, default_value_t = 100)]
    chunksize: usize,
    /// Require these symptoms
    #[clap(long, num_args = 1..)]
    symptoms: Vec<String>,
    /// Plot symptom frequency for these products ("ALL" for every product)
    #[clap(long, num_args = 1..)]
    vaxfreq: Vec<String>,
    /// Deaths only
    #[clap(long)]
    death: bool,
    /// Count these vaccinations only
    #[clap(long, num_args = 1..)]
    vax: Vec<String>,
    /// Show pre-vaccination reports (events before vaccination)
    #[clap(long)]
    prevax: bool,
    /// Plot the Y axis in log scale
    #[clap(long)]
    ylog: bool,
    /// Accumulate
    #[clap(long)]
    acc: bool,
    /// CSV files from https://vaers.hhs.gov/data/datasets.html
    #[clap(required = true, value_name = "DATA.csv")]
    stats: Vec<PathBuf>,
}

#[qu::ick]
pub fn main(opt: Opt) -> Result {
    for path in &opt.stats {
        check_extension(path, "csv")?;
    }
    // only the vaccination files anchor a dataset; companions are derived from them
    let vax_files: Vec<&PathBuf> = opt
        .stats
        .iter()
        .filter(|p| dataset::is_vaccination_file(p))
        .collect();
    ensure!(
        !vax_files.is_empty(),
        "no *VAERSVAX.csv files among the inputs"
    );

    let mode = if opt.vaxfreq.is_empty() {
        AggregateMode::Onset {
            death_only: opt.death,
        }
    } else {
        AggregateMode::VaxFreq {
            products: opt.vaxfreq.iter().map(|p| ArcStr::from(&**p)).collect(),
            keywords: (!opt.symptoms.is_empty()).then(|| KeywordFilter::new(&opt.symptoms)),
        }
    };

    let cache = ResultCache::new(".");
    match &mode {
        AggregateMode::VaxFreq { products, keywords } => {
            let table: SymptomFrequencyTable = cache.get_or_compute(mode.cache_key(), || {
                let mut table = SymptomFrequencyTable::default();
                let mut known = BTreeSet::new();
                for path in &vax_files {
                    let ds = Dataset::load(path, true)?;
                    known.extend(ds.vaccinations.product_counts().into_keys());
                    aggregate_vaxfreq(&mut table, &ds, products, keywords.as_ref());
                }
                check_known_products(products.iter(), known.iter())?;
                Ok(table)
            })?;
            render::plot_vaxfreq(
                &table,
                &render::VaxFreqChart {
                    row_limit: opt.n,
                    chunk_size: opt.chunksize,
                    products: products.clone(),
                },
            )?;
        }
        AggregateMode::Onset { death_only } => {
            let death_only = *death_only;
            let mut audit = OnsetAudit::default();
            let table: FrequencyTable = cache.get_or_compute(mode.cache_key(), || {
                let mut table = FrequencyTable::default();
                for path in &vax_files {
                    let ds = Dataset::load(path, death_only)?;
                    aggregate_onset(&mut table, &mut audit, &ds, death_only);
                }
                Ok(table)
            })?;

            // run-local audit tallies; empty when the table came from the cache
            if audit.deaths.has_unmatched() {
                header("Uncounted Deathlike Events");
                let mut out = Table::new().with_row(
                    Row::new()
                        .with_cell(Cell::from("Symptom"))
                        .with_cell(Cell::from("Count")),
                );
                for (term, count) in audit.deaths.ranked_unmatched() {
                    out.add_row(
                        Row::new()
                            .with_cell(Cell::from(term.to_string()))
                            .with_cell(Cell::from(count.to_string())),
                    );
                }
                println!("{}", out);
            }
            if death_only && audit.prevax_reports > 0 {
                println!(
                    "{} death reports list onset before vaccination",
                    audit.prevax_reports
                );
            }

            render::plot_onset(
                &table,
                &render::OnsetChart {
                    death_only,
                    prevax: opt.prevax,
                    cumulative: opt.acc,
                    ylog: opt.ylog,
                    row_limit: opt.n,
                    products: opt.vax.iter().map(|p| ArcStr::from(&**p)).collect(),
                },
            )?;
        }
    }
    Ok(())
}
