//! Turn aggregated tables into percentage curves and chart files.

use itertools::Itertools;
use plotters::prelude::*;
use qu::ick_use::*;
use std::{
    collections::BTreeMap,
    fs,
    io::{BufWriter, Write},
};

use crate::{
    aggregate::{check_known_products, FrequencyTable, OffsetBin, SymptomFrequencyTable},
    symptoms, ArcStr, Result,
};

/// Display-only shift so day-offset zero is representable on a logarithmic x axis.
pub const DISPLAY_OFFSET: i64 = 1;

const YEAR_DAYS: f64 = 365.25;

/// Reference gridlines on the onset x axis, in days since vaccination.
const AXIS_MARKS: [(&str, f64); 6] = [
    ("vax", 0.0),
    ("1 day", 1.0),
    ("1 week", 7.0),
    ("1 month", YEAR_DAYS / 12.0),
    ("1 year", YEAR_DAYS),
    ("10 years", YEAR_DAYS * 10.0),
];

/// Cap on plotted product series when no row limit was given.
const DEFAULT_SERIES_CAP: usize = 44;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CurveMode {
    /// Each offset's share of the category total.
    Percent,
    /// Running total, normalized to end at exactly 100.
    Cumulative,
}

/// The offsets a curve walks, in plot order.
///
/// The pre-vaccination view walks backwards from -1 to the most negative offset seen
/// anywhere in the table; the normal view walks 0 to the largest offset.
pub fn offset_domain(table: &FrequencyTable, prevax: bool) -> Vec<i64> {
    let Some((min, max)) = table.offset_extent() else {
        return Vec::new();
    };
    if prevax {
        (min..=-1).rev().collect()
    } else {
        (0..=max).collect()
    }
}

/// Build the ordered (offset, percentage) points for one category.
///
/// X values are absolute, so the pre-vaccination walk still plots on a positive
/// axis. In percent mode, zero-count offsets are elided except for one explicit zero
/// point adjacent to each nonzero run, which keeps the rendered line anchored at the
/// baseline instead of cutting across gaps. The curve always starts at (0, 0).
pub fn onset_curve(
    bin: &OffsetBin,
    offsets: impl IntoIterator<Item = i64>,
    mode: CurveMode,
) -> Vec<(i64, f64)> {
    match mode {
        CurveMode::Percent => {
            let total = bin.total() as f64;
            let mut points: Vec<(i64, f64)> = vec![(0, 0.0)];
            if total == 0.0 {
                return points;
            }
            for i in offsets {
                let count = bin.get(i) as f64;
                let (last_x, last_y) = *points.last().unwrap();
                if last_y != 0.0 || count != 0.0 {
                    let x = i.abs();
                    if last_x < x - 1 {
                        points.push((x - 1, 0.0));
                    }
                    points.push((x, 100.0 * count / total));
                }
            }
            points
        }
        CurveMode::Cumulative => {
            let mut acc = 0u64;
            let mut raw: Vec<(i64, u64)> = vec![(0, 0)];
            for i in offsets {
                acc += bin.get(i);
                if raw.last().unwrap().1 != acc {
                    raw.push((i.abs(), acc));
                }
            }
            let last = raw.last().unwrap().1 as f64;
            if last == 0.0 {
                return vec![(0, 0.0)];
            }
            raw.into_iter()
                .map(|(x, y)| (x, y as f64 / last * 100.0))
                .collect()
        }
    }
}

/// Display options for the onset chart.
pub struct OnsetChart {
    pub death_only: bool,
    pub prevax: bool,
    pub cumulative: bool,
    pub ylog: bool,
    /// 0 means "use the built-in series cap".
    pub row_limit: usize,
    /// Plot only these products; empty plots every product.
    pub products: Vec<ArcStr>,
}

/// Render the per-product onset curves to a PNG in the working directory.
///
/// Categories are drawn most-reported first. Each plotted category also gets a
/// console line with its total and offset range.
pub fn plot_onset(table: &FrequencyTable, opt: &OnsetChart) -> Result {
    ensure!(!table.is_empty(), "no reports to plot");
    check_known_products(opt.products.iter(), table.products())?;

    let (min, max) = table.offset_extent().unwrap();
    println!("MIN {}", min);
    println!("MAX {}", max);
    let domain = offset_domain(table, opt.prevax);
    let mode = if opt.cumulative {
        CurveMode::Cumulative
    } else {
        CurveMode::Percent
    };
    let cap = if opt.row_limit == 0 {
        DEFAULT_SERIES_CAP
    } else {
        opt.row_limit
    };

    let mut series: Vec<(ArcStr, Vec<(f64, f64)>)> = Vec::new();
    let mut reports = 0u64;
    let mut ymax = 0f64;
    for (row_i, (product, total)) in table.products_by_total().into_iter().enumerate() {
        if row_i > cap {
            break;
        }
        if !opt.products.is_empty() && !opt.products.contains(product) {
            continue;
        }
        let bin = table.get(product).unwrap();
        println!(
            "{} {} reports {} - {} days",
            total,
            product,
            bin.min_offset().unwrap(),
            bin.max_offset().unwrap()
        );
        reports += domain.iter().map(|i| bin.get(*i)).sum::<u64>();
        let points = onset_curve(bin, domain.iter().copied(), mode);
        for &(_, y) in &points {
            ymax = ymax.max(y);
        }
        let shifted = points
            .into_iter()
            .map(|(x, y)| ((x + DISPLAY_OFFSET) as f64, y))
            .collect();
        series.push((product.clone(), shifted));
    }
    if ymax == 0.0 {
        ymax = 1.0;
    }

    let title_word = if opt.death_only { "Death" } else { "Event" };
    let fname = if opt.death_only {
        "vax_death_onset.png"
    } else {
        "vax_onset.png"
    };
    let caption = if opt.prevax {
        format!(
            "VAERS {}s Misreported Before Vaccination ({} Misreports)",
            title_word, reports
        )
    } else {
        format!(
            "VAERS {}s Reported After Vaccination ({} Reports)",
            title_word, reports
        )
    };
    let x_desc = if opt.prevax {
        format!("{} Onset (-Days)", title_word)
    } else {
        format!("{} Onset (Days)", title_word)
    };
    let y_desc = format!("% {}s", title_word);

    let xmax = (domain.iter().map(|i| i.abs()).max().unwrap_or(0) + DISPLAY_OFFSET) as f64;
    let xmax = xmax.max(10.0);
    let legend_pos = if opt.prevax {
        SeriesLabelPosition::UpperLeft
    } else {
        SeriesLabelPosition::UpperRight
    };

    let root = BitMapBackend::new(fname, (1080, 1080)).into_drawing_area();
    root.fill(&WHITE)?;
    if opt.ylog {
        let mut chart = ChartBuilder::on(&root)
            .caption(&caption, ("sans-serif", 24))
            .margin(10)
            .x_label_area_size(45)
            .y_label_area_size(55)
            .build_cartesian_2d((1f64..xmax).log_scale(), (0.001f64..ymax).log_scale())?;
        chart
            .configure_mesh()
            .x_desc(&x_desc)
            .y_desc(&y_desc)
            .draw()?;
        for (idx, (product, points)) in series.iter().enumerate() {
            let color = Palette99::pick(idx).to_rgba();
            chart
                .draw_series(LineSeries::new(
                    points.iter().map(|&(x, y)| (x, y.max(0.001))),
                    color.stroke_width(1),
                ))?
                .label(&**product)
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 18, y)], color));
        }
        for (label, mark) in AXIS_MARKS {
            let x = mark + DISPLAY_OFFSET as f64;
            if x < xmax {
                chart.draw_series(DashedLineSeries::new(
                    [(x, 0.001f64), (x, ymax)],
                    4,
                    3,
                    BLUE.stroke_width(1),
                ))?;
                chart.plotting_area().draw(&Text::new(
                    label,
                    (x, ymax),
                    ("sans-serif", 13).into_font().color(&BLUE),
                ))?;
            }
        }
        chart
            .configure_series_labels()
            .position(legend_pos)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .label_font(("sans-serif", 12))
            .draw()?;
    } else {
        let mut chart = ChartBuilder::on(&root)
            .caption(&caption, ("sans-serif", 24))
            .margin(10)
            .x_label_area_size(45)
            .y_label_area_size(55)
            .build_cartesian_2d((1f64..xmax).log_scale(), 0f64..ymax * 1.06)?;
        chart
            .configure_mesh()
            .x_desc(&x_desc)
            .y_desc(&y_desc)
            .draw()?;
        for (idx, (product, points)) in series.iter().enumerate() {
            let color = Palette99::pick(idx).to_rgba();
            chart
                .draw_series(LineSeries::new(
                    points.iter().copied(),
                    color.stroke_width(1),
                ))?
                .label(&**product)
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 18, y)], color));
        }
        for (label, mark) in AXIS_MARKS {
            let x = mark + DISPLAY_OFFSET as f64;
            if x < xmax {
                chart.draw_series(DashedLineSeries::new(
                    [(x, 0f64), (x, ymax)],
                    4,
                    3,
                    BLUE.stroke_width(1),
                ))?;
                chart.plotting_area().draw(&Text::new(
                    label,
                    (x, ymax),
                    ("sans-serif", 13).into_font().color(&BLUE),
                ))?;
            }
        }
        chart
            .configure_series_labels()
            .position(legend_pos)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .label_font(("sans-serif", 12))
            .draw()?;
    }
    root.present()?;
    event!(Level::INFO, "wrote {}", fname);
    Ok(())
}

/// Display options for the symptom frequency charts.
pub struct VaxFreqChart {
    pub row_limit: usize,
    pub chunk_size: usize,
    /// The product selection, echoed in chart titles.
    pub products: Vec<ArcStr>,
}

/// One row of ranked symptom frequency output.
///
/// Tied counts share a rank, and the rank is part of the display label so chunked
/// charts stay cross-referenceable.
struct RankedRow {
    rank: usize,
    label: String,
    count: u64,
}

fn ranked_rows(table: &SymptomFrequencyTable, row_limit: usize) -> Vec<RankedRow> {
    let mut rows = Vec::new();
    let mut rank = 0usize;
    let mut last: Option<u64> = None;
    for (term, count) in table.ranked() {
        if last != Some(count) {
            last = Some(count);
            rank += 1;
        }
        rows.push(RankedRow {
            rank,
            label: format!("{} #{}", symptoms::expand(term), rank),
            count,
        });
        if rank + 1 >= row_limit {
            break;
        }
    }
    rows
}

fn chunk<T>(n: usize, chunks: usize, lst: &[T]) -> &[T] {
    if chunks <= 1 {
        return lst;
    }
    let csize = lst.len() as f64 / chunks as f64;
    &lst[(n as f64 * csize) as usize..((n + 1) as f64 * csize) as usize]
}

/// Render the ranked symptom frequencies: console lines, the `vaxfreq.txt` audit
/// file, and one horizontal bar chart PNG per chunk of entries.
pub fn plot_vaxfreq(table: &SymptomFrequencyTable, opt: &VaxFreqChart) -> Result {
    ensure!(opt.chunk_size > 0, "chunk size must be at least 1");
    println!("VAXFREQ");
    ensure!(!table.is_empty(), "no symptom frequencies to plot");
    let reports = table.reports();
    let rows = ranked_rows(table, opt.row_limit);

    let mut audit = BufWriter::new(
        fs::File::create("vaxfreq.txt").context("creating frequency audit file")?,
    );
    for row in &rows {
        println!("{} {}", row.count, row.label);
        writeln!(audit, "{} {}", row.count, row.label)?;
    }
    audit.flush()?;

    let max_freq = rows.iter().map(|r| r.count).max().unwrap_or(0) as f64;
    let chunks = ((rows.len() as f64 / opt.chunk_size as f64).round() as usize).max(1);
    let symlist = opt.products.iter().map(|p| &**p).join(", ");
    let title = format!(
        "{} {} Unverified VAERS Reports By Symptom Frequency",
        reports, symlist
    );

    for ci in 0..chunks {
        let slice = chunk(ci, chunks, &rows);
        if slice.is_empty() {
            continue;
        }
        let base_rank = slice[0].rank;
        // ties share a rank, and thus a row, like the source data shares a bar
        let nrows = slice.last().unwrap().rank - base_rank + 1;
        let labels: BTreeMap<usize, &str> = slice
            .iter()
            .map(|r| (r.rank - base_rank, r.label.as_str()))
            .collect();

        let fname = format!("vaxfreq{:04}.png", ci + 1);
        let height = (nrows as u32) * 30 + 160;
        let root = BitMapBackend::new(&fname, (2400, height)).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .caption(&title, ("sans-serif", 22))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(760)
            .build_cartesian_2d(0f64..max_freq * 1.08, nrows as f64..0f64)?;
        chart
            .configure_mesh()
            .disable_y_mesh()
            .y_labels(nrows.min(100))
            .y_label_formatter(&|v: &f64| {
                labels
                    .get(&(v.floor() as usize))
                    .map(|l| l.to_string())
                    .unwrap_or_default()
            })
            .label_style(("sans-serif", 12))
            .draw()?;
        chart.draw_series(slice.iter().map(|r| {
            let y = (r.rank - base_rank) as f64;
            Rectangle::new(
                [(0.0, y + 0.15), (r.count as f64, y + 0.85)],
                BLUE.filled(),
            )
        }))?;
        for r in slice {
            let y = (r.rank - base_rank) as f64;
            chart.plotting_area().draw(&Text::new(
                format!(" {}", r.count),
                (r.count as f64, y + 0.5),
                ("sans-serif", 12),
            ))?;
        }
        root.present()?;
        event!(Level::INFO, "wrote {}", fname);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::aggregate::FrequencyTable;

    fn bin(counts: &[(i64, u64)]) -> OffsetBin {
        let mut bin = OffsetBin::default();
        for &(offset, n) in counts {
            for _ in 0..n {
                bin.add(offset);
            }
        }
        bin
    }

    #[test]
    fn percent_curve_zero_pads_run_boundaries() {
        // counts at 2..4, gap, then 10
        let bin = bin(&[(2, 1), (3, 2), (4, 1), (10, 4)]);
        let points = onset_curve(&bin, 0..=12, CurveMode::Percent);
        assert_eq!(
            points,
            vec![
                (0, 0.0),
                (1, 0.0),   // zero anchor before the first run
                (2, 12.5),
                (3, 25.0),
                (4, 12.5),
                (5, 0.0),   // zero anchor after the run
                (9, 0.0),   // zero anchor before the next run
                (10, 50.0),
                (11, 0.0),  // trailing anchor
            ]
        );
    }

    #[test]
    fn percent_curve_elides_interior_zero_stretches() {
        let bin = bin(&[(2, 1), (100, 1)]);
        let points = onset_curve(&bin, 0..=100, CurveMode::Percent);
        // offsets 4..=98 contribute no points
        assert_eq!(
            points,
            vec![
                (0, 0.0),
                (1, 0.0),
                (2, 50.0),
                (3, 0.0),
                (99, 0.0),
                (100, 50.0),
            ]
        );
    }

    #[test]
    fn cumulative_curve_ends_at_exactly_100() {
        let bin = bin(&[(0, 1), (3, 1), (7, 2)]);
        let points = onset_curve(&bin, 0..=10, CurveMode::Cumulative);
        assert_eq!(points.first(), Some(&(0, 0.0)));
        assert_eq!(points.last().unwrap().1, 100.0);
        // points only where the running sum changes
        assert_eq!(points.len(), 4);
        assert_eq!(points[1], (0, 25.0));
        assert_eq!(points[2], (3, 50.0));
    }

    #[test]
    fn prevax_curves_use_absolute_offsets() {
        let bin = bin(&[(-3, 1), (-1, 1)]);
        let points = onset_curve(&bin, (-4..=-1).rev(), CurveMode::Percent);
        assert!(points.iter().all(|&(x, _)| x >= 0));
        assert!(points.contains(&(1, 50.0)));
        assert!(points.contains(&(3, 50.0)));
    }

    #[test]
    fn domain_covers_whole_table() {
        let mut table = FrequencyTable::default();
        table.add("X".into(), -2);
        table.add("X".into(), 5);
        table.add("Y".into(), 3);
        assert_eq!(offset_domain(&table, false), (0..=5).collect::<Vec<_>>());
        assert_eq!(offset_domain(&table, true), vec![-1, -2]);
    }

    #[test]
    fn empty_table_has_empty_domain() {
        let table = FrequencyTable::default();
        assert!(offset_domain(&table, false).is_empty());
    }

    #[test]
    fn ranked_rows_share_rank_on_ties() {
        let mut table = SymptomFrequencyTable::default();
        table.add_report([crate::ArcStr::from("pyrexia"), crate::ArcStr::from("chills")]);
        table.add_report([crate::ArcStr::from("pyrexia")]);
        let rows = ranked_rows(&table, 400);
        assert_eq!(rows[0].rank, 1);
        assert_eq!(rows[0].count, 2);
        assert!(rows[0].label.starts_with("pyrexia (fever) #1"));
        assert_eq!(rows[1].rank, 2);
        assert_eq!(rows[1].count, 1);
    }

    #[test]
    fn ranked_rows_respect_row_limit() {
        let mut table = SymptomFrequencyTable::default();
        for (i, term) in ["a", "b", "c", "d"].iter().enumerate() {
            for _ in 0..(4 - i) {
                table.add_report([crate::ArcStr::from(*term)]);
            }
        }
        let rows = ranked_rows(&table, 3);
        // stops once the next rank would exceed the limit
        assert!(rows.iter().all(|r| r.rank < 3));
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let mut table = SymptomFrequencyTable::default();
        table.add_report([crate::ArcStr::from("pyrexia")]);
        let opt = VaxFreqChart {
            row_limit: 400,
            chunk_size: 0,
            products: vec![],
        };
        let err = plot_vaxfreq(&table, &opt).unwrap_err();
        assert!(err.to_string().contains("chunk size"));
    }

    #[test]
    fn chunk_partitions_evenly() {
        let data: Vec<u32> = (0..10).collect();
        assert_eq!(chunk(0, 1, &data), &data[..]);
        assert_eq!(chunk(0, 3, &data), &data[0..3]);
        assert_eq!(chunk(1, 3, &data), &data[3..6]);
        assert_eq!(chunk(2, 3, &data), &data[6..10]);
    }
}
