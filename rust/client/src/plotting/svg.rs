use super::{is_drawable, Figure, FigureSink};
use crate::env::Action;
use crate::error::{Error, Result};
use plotters::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const LINE: RGBColor = RGBColor(31, 119, 180);
const REPAIR: RGBColor = RGBColor(214, 39, 40);
const SELL: RGBColor = RGBColor(44, 160, 44);
const REFERENCE: RGBColor = RGBColor(128, 128, 128);

/// Draws every figure to its own SVG file, `<dir>/<nn>-<title slug>.svg`.
#[derive(Debug)]
pub struct SvgSink {
    dir: PathBuf,
    size: (u32, u32),
    written: Vec<PathBuf>,
}

impl SvgSink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        Ok(Self {
            dir,
            size: (1200, 400),
            written: vec![],
        })
    }

    /// Sink writing into a fresh `run-<local timestamp>` directory below `root`. A run
    /// landing on an existing directory gets a `-<n>` suffix instead of overwriting it.
    pub fn timestamped(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;

        let stamp = chrono::Local::now()
            .format("run-%Y%m%dT%H%M%S%.3f")
            .to_string();
        let mut dir = root.join(&stamp);
        for n in 1.. {
            match fs::create_dir(&dir) {
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    dir = root.join(format!("{stamp}-{n}"));
                }
                r => {
                    r?;
                    break;
                }
            }
        }

        Self::new(dir)
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = (width, height);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl FigureSink for SvgSink {
    fn emit(&mut self, figure: Figure) -> Result<()> {
        let path = self
            .dir
            .join(format!("{:02}-{}.svg", self.written.len(), slug(&figure.title)));

        draw(&figure, &path, self.size).map_err(|e| Error::Render {
            title: figure.title.clone(),
            reason: e.to_string(),
        })?;
        debug!(path = %path.display(), "figure written");

        self.written.push(path);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        info!(
            figures = self.written.len(),
            dir = %self.dir.display(),
            "plots written"
        );
        Ok(())
    }
}

fn slug(title: &str) -> String {
    title
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

fn draw(
    figure: &Figure,
    path: &Path,
    size: (u32, u32),
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let root = SVGBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;

    let (x_range, y_range) = figure.bounds();
    let (x0, x1) = (x_range.start, x_range.end);
    let mut chart = ChartBuilder::on(&root)
        .caption(figure.title.as_str(), ("sans-serif", 22))
        .margin(12)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)?;

    chart
        .configure_mesh()
        .x_desc(figure.x_label.as_str())
        .y_desc(figure.y_label.as_str())
        .draw()?;

    for &y in figure.reference_lines.iter().filter(|y| y.is_finite()) {
        chart.draw_series(LineSeries::new(
            vec![(x0, y), (x1, y)],
            REFERENCE.mix(0.5).stroke_width(1),
        ))?;
    }

    for series in &figure.series {
        // Non-finite values break the line, each finite run is drawn on its own.
        let mut runs = series
            .points
            .split(|p| !is_drawable(p))
            .filter(|run| !run.is_empty())
            .collect::<Vec<_>>();
        if runs.is_empty() {
            runs.push(&[]);
        }

        for (i, run) in runs.into_iter().enumerate() {
            let drawn = chart.draw_series(LineSeries::new(
                run.iter().copied(),
                LINE.stroke_width(2),
            ))?;
            if let (0, Some(label)) = (i, &series.label) {
                drawn.label(label.as_str()).legend(|(x, y)| {
                    PathElement::new(vec![(x, y), (x + 20, y)], LINE.stroke_width(2))
                });
            }
        }
        if series.markers {
            chart.draw_series(
                series
                    .points
                    .iter()
                    .filter(|p| is_drawable(p))
                    .map(|&p| Circle::new(p, 3, LINE.filled())),
            )?;
        }
    }

    for set in &figure.markers {
        let points = set.points.iter().copied().filter(is_drawable);
        match set.action {
            Action::Repair => {
                chart
                    .draw_series(points.map(|p| Circle::new(p, 6, REPAIR.filled())))?
                    .label(set.label.as_str())
                    .legend(|(x, y)| Circle::new((x + 10, y), 6, REPAIR.filled()));
            }
            Action::Sell => {
                chart
                    .draw_series(points.map(|p| {
                        EmptyElement::at(p) + Rectangle::new([(-6, -6), (6, 6)], SELL.filled())
                    }))?
                    .label(set.label.as_str())
                    .legend(|(x, y)| Rectangle::new([(x + 4, y - 6), (x + 16, y + 6)], SELL.filled()));
            }
            Action::DoNothing => {}
        }
    }

    for note in &figure.notes {
        chart
            .draw_series(std::iter::empty::<PathElement<(f64, f64)>>())?
            .label(note.as_str())
            .legend(|(x, y)| PathElement::new(vec![(x, y)], WHITE.stroke_width(0)));
    }

    if !figure.legend().is_empty() {
        chart
            .configure_series_labels()
            .background_style(&WHITE.mix(0.9))
            .border_style(&BLACK)
            .position(SeriesLabelPosition::UpperRight)
            .draw()?;
    }

    root.present()?;
    Ok(())
}
