//! Renders a recorded trajectory as time-series figures.
//!
//! Renderers never draw directly. They build backend-neutral [`Figure`]s and hand them to
//! the [`PlotSession`] passed in by the caller, which forwards them to its [`FigureSink`].
//! [`SvgSink`] draws to files, [`CapturingSink`] keeps the figures for inspection.

mod svg;

pub use svg::SvgSink;

use crate::env::{Action, Observation};
use crate::error::{Error, Result};
use crate::rollout::Trajectory;
use itertools::{Itertools, MinMaxResult};
use ndarray::Array2;
use std::fmt;
use std::ops::Range;
use tracing::{info, warn};

/// Sensor channels of the turbofan observation, in wire order.
pub const DEFAULT_CHANNEL_NAMES: [&str; 9] = [
    "HPC_Tout",    // High Pressure Compressor Temperature Outlet
    "HP_Nmech",    // High Pressure Shaft Mechanical Speed
    "HPC_Tin",     // High Pressure Compressor Temperature Inlet
    "LPT_Tin",     // Low Pressure Turbine Temperature Inlet
    "Fuel_flow",   // Fuel Flow Rate
    "HPC_Pout_st", // High Pressure Compressor Pressure Outlet (static)
    "LP_Nmech",    // Low Pressure Shaft Mechanical Speed
    "phase_type",  // Flight Phase Type
    "DTAMB",
];

/// A line through `points`, optionally with a dot on every point.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    /// Legend text, `None` keeps the series out of the legend.
    pub label: Option<String>,
    pub points: Vec<(f64, f64)>,
    pub markers: bool,
}

/// Highlighted steps where `action` was taken.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerSet {
    pub action: Action,
    pub label: String,
    pub points: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub series: Vec<Series>,
    pub markers: Vec<MarkerSet>,
    /// Horizontal reference lines at these y values.
    pub reference_lines: Vec<f64>,
    /// Text-only legend entries.
    pub notes: Vec<String>,
}

impl Figure {
    fn new(title: impl Into<String>, x_label: &str, y_label: &str) -> Self {
        Self {
            title: title.into(),
            x_label: x_label.to_string(),
            y_label: y_label.to_string(),
            series: vec![],
            markers: vec![],
            reference_lines: vec![],
            notes: vec![],
        }
    }

    /// Legend entries in drawing order, each label at most once.
    pub fn legend(&self) -> Vec<&str> {
        self.series
            .iter()
            .filter_map(|s| s.label.as_deref())
            .chain(self.markers.iter().map(|m| m.label.as_str()))
            .chain(self.notes.iter().map(String::as_str))
            .unique()
            .collect()
    }

    pub fn markers_for(&self, action: Action) -> Option<&MarkerSet> {
        self.markers.iter().find(|m| m.action == action)
    }

    /// Data ranges covering every finite series point, marker and reference line, padded
    /// so that flat data still gets a non-empty axis. NaN and infinite values are left out;
    /// backends skip them when drawing.
    pub fn bounds(&self) -> (Range<f64>, Range<f64>) {
        let points = self
            .series
            .iter()
            .flat_map(|s| s.points.iter())
            .chain(self.markers.iter().flat_map(|m| m.points.iter()))
            .filter(|p| is_drawable(p));

        let xs = points.clone().map(|p| p.0);
        let ys = points
            .map(|p| p.1)
            .chain(self.reference_lines.iter().copied().filter(|y| y.is_finite()));

        let span = |r: MinMaxResult<f64>, pad: f64| match r.into_option() {
            None => 0.0..1.0,
            Some((lo, hi)) if lo == hi => (lo - 1.)..(hi + 1.),
            Some((lo, hi)) => {
                let pad = (hi - lo) * pad;
                (lo - pad)..(hi + pad)
            }
        };

        (
            span(xs.minmax_by(f64::total_cmp), 0.),
            span(ys.minmax_by(f64::total_cmp), 0.05),
        )
    }
}

pub(crate) fn is_drawable(p: &(f64, f64)) -> bool {
    p.0.is_finite() && p.1.is_finite()
}

/// Destination of rendered figures.
pub trait FigureSink {
    fn emit(&mut self, figure: Figure) -> Result<()>;

    /// Called once when the owning [`PlotSession`] ends.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Keeps figures in memory instead of drawing them.
#[derive(Debug, Default, Clone)]
pub struct CapturingSink {
    figures: Vec<Figure>,
    flushes: usize,
}

impl CapturingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn figures(&self) -> &[Figure] {
        &self.figures
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

impl FigureSink for CapturingSink {
    fn emit(&mut self, figure: Figure) -> Result<()> {
        self.figures.push(figure);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

/// Explicit plotting context handed to each render call. The sink is flushed exactly
/// once, by [`PlotSession::finish`] or when the session is dropped.
#[derive(Debug)]
pub struct PlotSession<S: FigureSink> {
    sink: S,
    emitted: usize,
    finished: bool,
}

impl<S: FigureSink> PlotSession<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            emitted: 0,
            finished: false,
        }
    }

    pub fn emit(&mut self, figure: Figure) -> Result<()> {
        self.sink.emit(figure)?;
        self.emitted += 1;
        Ok(())
    }

    pub fn figures_emitted(&self) -> usize {
        self.emitted
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.sink.flush()
    }
}

impl<S: FigureSink> Drop for PlotSession<S> {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            warn!(error = %e, "failed to flush plot session");
        }
    }
}

/// Summary statistics of a reward series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardStats {
    pub steps: usize,
    pub total: f64,
    pub mean: f64,
    pub max: f64,
    pub min: f64,
}

impl RewardStats {
    pub fn from_rewards(rewards: &[f64]) -> Option<Self> {
        let (min, max) = rewards
            .iter()
            .copied()
            .minmax_by(f64::total_cmp)
            .into_option()?;
        let total = rewards.iter().sum::<f64>();

        Some(Self {
            steps: rewards.len(),
            total,
            mean: total / rewards.len() as f64,
            max,
            min,
        })
    }
}

impl fmt::Display for RewardStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Reward Statistics:")?;
        writeln!(f, "   Total Steps: {}", self.steps)?;
        writeln!(f, "   Total Reward: {:.2}", self.total)?;
        writeln!(f, "   Average Reward: {:.2}", self.mean)?;
        writeln!(f, "   Max Reward: {:.2}", self.max)?;
        write!(f, "   Min Reward: {:.2}", self.min)
    }
}

fn marker_label(action: Action) -> String {
    format!("{} ({})", action.label(), action.code())
}

/// Repair and sell markers at the steps they were taken. Do-nothing steps are never
/// marked, and a kind that never occurs gets no marker set (hence no legend entry).
fn action_markers(actions: &[Action], y: impl Fn(usize) -> f64) -> Vec<MarkerSet> {
    [Action::Repair, Action::Sell]
        .into_iter()
        .filter_map(|kind| {
            let points = actions
                .iter()
                .positions(|&a| a == kind)
                .map(|i| (i as f64, y(i)))
                .collect::<Vec<_>>();
            (!points.is_empty()).then(|| MarkerSet {
                action: kind,
                label: marker_label(kind),
                points,
            })
        })
        .collect()
}

fn resolve_channel_names(names: Option<&[&str]>, width: usize) -> Result<Vec<String>> {
    match names {
        Some(names) if names.len() != width => Err(Error::ChannelNames {
            names: names.len(),
            width,
        }),
        Some(names) => Ok(names.iter().map(|s| s.to_string()).collect()),
        None if width == DEFAULT_CHANNEL_NAMES.len() => {
            Ok(DEFAULT_CHANNEL_NAMES.iter().map(|s| s.to_string()).collect())
        }
        None => Ok((0..width).map(|i| format!("channel_{i}")).collect()),
    }
}

/// Renders one figure per observation channel: the channel's value against the step
/// index, with repair and sell markers when `actions` is given.
///
/// `actions` may hold one entry per observation, or one per transition (one fewer than
/// observations, as recorded in a [`Trajectory`]); in the latter case action `i` drove
/// the transition out of observation `i` and is marked at step `i`. Any other length is
/// rejected.
///
/// Empty `observations` are checked first: they produce a warning and `Ok(())` without
/// validating `actions` or `channel_names`. Otherwise widths are checked, then channel
/// names, then the action count.
pub fn render_observation_channels<S: FigureSink>(
    session: &mut PlotSession<S>,
    observations: &[Observation],
    actions: Option<&[Action]>,
    channel_names: Option<&[&str]>,
) -> Result<()> {
    if observations.is_empty() {
        warn!("No observations provided.");
        return Ok(());
    }

    let width = observations[0].len();
    if let Some((step, o)) = observations.iter().find_position(|o| o.len() != width) {
        return Err(Error::ObservationWidth {
            step,
            expected: width,
            actual: o.len(),
        });
    }
    let names = resolve_channel_names(channel_names, width)?;

    let n = observations.len();
    if let Some(actions) = actions {
        if actions.len() != n && actions.len() + 1 != n {
            return Err(Error::LengthMismatch {
                what: "actions",
                expected: format!("{n} or {}", n - 1),
                actual: actions.len(),
            });
        }
    }

    let values = Array2::from_shape_fn((n, width), |(r, c)| observations[r][c]);
    for (i, name) in names.iter().enumerate() {
        let column = values.column(i);
        let mut figure = Figure::new(format!("{name} (Dimension {i})"), "Step", "Value");
        figure.series.push(Series {
            label: None,
            points: column
                .iter()
                .enumerate()
                .map(|(step, &v)| (step as f64, v))
                .collect(),
            markers: false,
        });
        if let Some(actions) = actions {
            figure.markers = action_markers(actions, |step| column[step]);
        }

        session.emit(figure)?;
    }

    Ok(())
}

/// Renders rewards per step as a line with markers, a reference line at zero, repair
/// and sell markers when `actions` is given, and the cumulative reward in the legend.
///
/// `actions` must hold exactly one entry per reward. Returns the statistics that were
/// reported, or `None` (after a warning) when `rewards` is empty.
pub fn render_reward_series<S: FigureSink>(
    session: &mut PlotSession<S>,
    rewards: &[f64],
    actions: Option<&[Action]>,
) -> Result<Option<RewardStats>> {
    let Some(stats) = RewardStats::from_rewards(rewards) else {
        warn!("No rewards provided.");
        return Ok(None);
    };

    if let Some(actions) = actions {
        if actions.len() != rewards.len() {
            return Err(Error::LengthMismatch {
                what: "actions",
                expected: rewards.len().to_string(),
                actual: actions.len(),
            });
        }
    }

    let mut figure = Figure::new("Step Rewards Over Time", "Step", "Reward");
    figure.series.push(Series {
        label: Some("Step Reward".to_string()),
        points: rewards
            .iter()
            .enumerate()
            .map(|(step, &r)| (step as f64, r))
            .collect(),
        markers: true,
    });
    if let Some(actions) = actions {
        figure.markers = action_markers(actions, |step| rewards[step]);
    }
    figure.reference_lines.push(0.);
    figure.notes.push(format!("Cumulative: {:.1}", stats.total));

    session.emit(figure)?;
    info!("{stats}");

    Ok(Some(stats))
}

/// Renders both views of a finished rollout.
pub fn render_trajectory<S: FigureSink>(
    session: &mut PlotSession<S>,
    trajectory: &Trajectory,
    channel_names: Option<&[&str]>,
) -> Result<Option<RewardStats>> {
    render_observation_channels(
        session,
        trajectory.observations(),
        Some(trajectory.actions()),
        channel_names,
    )?;
    render_reward_series(session, trajectory.rewards(), Some(trajectory.actions()))
}
