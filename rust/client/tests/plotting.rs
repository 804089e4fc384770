extern crate float_eq;
extern crate student_gym;
mod common;

use assertor::*;
use common::*;
use float_eq::*;
use std::cell::Cell;
use std::rc::Rc;
use student_gym::plotting::{render_trajectory, DEFAULT_CHANNEL_NAMES};
use student_gym::*;

fn observations(n: usize, width: usize) -> Vec<Observation> {
    (0..n)
        .map(|step| (0..width).map(|c| (step * 10 + c) as f64).collect())
        .collect()
}

#[test]
fn one_figure_per_channel_without_markers() {
    let mut session = PlotSession::new(CapturingSink::new());

    render_observation_channels(&mut session, &observations(5, 9), None, None).unwrap();

    let figures = session.sink().figures();
    assert_that!(figures.len()).is_equal_to(9);
    assert_eq!(session.figures_emitted(), 9);
    for (i, f) in figures.iter().enumerate() {
        assert_eq!(f.title, format!("{} (Dimension {i})", DEFAULT_CHANNEL_NAMES[i]));
        assert!(f.markers.is_empty());
        assert!(f.legend().is_empty());
        let ys = f.series[0].points.iter().map(|p| p.1).collect::<Vec<_>>();
        let expected = (0..5).map(|s| (s * 10 + i) as f64).collect::<Vec<_>>();
        assert_float_eq!(ys, expected, abs_all <= 0.);
    }
}

#[test]
fn repair_at_step_i_is_marked_on_every_channel() {
    let obs = observations(4, 9);
    let actions = [Action::DoNothing, Action::DoNothing, Action::Repair, Action::DoNothing];
    let mut session = PlotSession::new(CapturingSink::new());

    render_observation_channels(&mut session, &obs, Some(&actions), None).unwrap();

    for (c, f) in session.sink().figures().iter().enumerate() {
        let repair = f.markers_for(Action::Repair).unwrap();
        assert_eq!(repair.points, vec![(2., obs[2][c])]);
        assert!(f.markers_for(Action::Sell).is_none());
        assert!(f.markers_for(Action::DoNothing).is_none());
        assert_eq!(f.legend(), vec!["Repair (1)"]);
    }
}

#[test]
fn transition_aligned_actions_mark_the_source_observation() {
    let obs = observations(4, 2);
    let actions = [Action::Sell, Action::DoNothing, Action::Repair];
    let mut session = PlotSession::new(CapturingSink::new());

    render_observation_channels(&mut session, &obs, Some(&actions), Some(&["a", "b"])).unwrap();

    let f = &session.sink().figures()[1];
    assert_eq!(f.title, "b (Dimension 1)");
    assert_eq!(f.markers_for(Action::Sell).unwrap().points, vec![(0., obs[0][1])]);
    assert_eq!(f.markers_for(Action::Repair).unwrap().points, vec![(2., obs[2][1])]);
    assert_eq!(f.legend(), vec!["Repair (1)", "Sell (2)"]);
}

#[test]
fn misaligned_actions_are_rejected_for_observations() {
    let mut session = PlotSession::new(CapturingSink::new());

    let err = render_observation_channels(
        &mut session,
        &observations(4, 9),
        Some(&[Action::Repair; 2]),
        None,
    )
    .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::InputContractViolation);
    assert_eq!(err.to_string(), "actions has 2 entries, expected 4 or 3");
    assert!(session.sink().figures().is_empty());
}

#[test]
fn channel_name_count_must_match_width() {
    let mut session = PlotSession::new(CapturingSink::new());

    let err = render_observation_channels(&mut session, &observations(2, 9), None, Some(&["x"]))
        .unwrap_err();

    assert!(matches!(err, Error::ChannelNames { names: 1, width: 9 }));
    assert_eq!(err.category(), ErrorCategory::ConfigurationError);
}

#[test]
fn ragged_observations_are_rejected() {
    let mut obs = observations(3, 9);
    obs[2].pop();
    let mut session = PlotSession::new(CapturingSink::new());

    let err = render_observation_channels(&mut session, &obs, None, None).unwrap_err();

    assert!(matches!(
        err,
        Error::ObservationWidth {
            step: 2,
            expected: 9,
            actual: 8
        }
    ));
}

#[test]
fn empty_inputs_warn_and_draw_nothing() {
    let mut session = PlotSession::new(CapturingSink::new());

    let (stats, logs) = capture_logs(|| {
        render_observation_channels(&mut session, &[], Some(&[Action::Repair]), None).unwrap();
        render_reward_series(&mut session, &[], None).unwrap()
    });

    assert!(stats.is_none());
    assert_eq!(session.figures_emitted(), 0);
    assert!(logs.contains("WARN"));
    assert!(logs.contains("No observations provided."));
    assert!(logs.contains("No rewards provided."));
}

/// Empty input is checked before anything else, so even a bad name list only warns.
#[test]
fn empty_observations_skip_channel_name_checks() {
    let mut session = PlotSession::new(CapturingSink::new());

    let (res, logs) =
        capture_logs(|| render_observation_channels(&mut session, &[], None, Some(&["x"])));

    assert!(res.is_ok());
    assert!(logs.contains("No observations provided."));
}

#[test]
fn reward_statistics_without_actions() {
    let mut session = PlotSession::new(CapturingSink::new());

    let (stats, logs) = capture_logs(|| {
        render_reward_series(&mut session, &[1.0, -0.5, 2.0], None)
            .unwrap()
            .unwrap()
    });

    assert_eq!(stats.steps, 3);
    assert_float_eq!(stats.total, 2.5, abs <= 1e-12);
    assert_float_eq!(stats.mean, 2.5 / 3., abs <= 1e-12);
    assert_float_eq!(stats.max, 2.0, abs <= 0.);
    assert_float_eq!(stats.min, -0.5, abs <= 0.);

    let figures = session.sink().figures();
    assert_eq!(figures.len(), 1);
    let f = &figures[0];
    assert_eq!(f.reference_lines, vec![0.]);
    assert!(f.series[0].markers);
    assert!(f.markers.is_empty());
    assert_eq!(f.legend(), vec!["Step Reward", "Cumulative: 2.5"]);
    assert!(logs.contains("INFO"));
    assert!(logs.contains("Reward Statistics:"));
    assert!(logs.contains("Average Reward: 0.83"));
    assert!(!logs.contains("WARN"));

    insta::assert_snapshot!(stats.to_string(), @r###"
    Reward Statistics:
       Total Steps: 3
       Total Reward: 2.50
       Average Reward: 0.83
       Max Reward: 2.00
       Min Reward: -0.50
    "###);
}

#[test]
fn reward_markers_follow_actions() {
    let rewards = [1.0, -1.0, 0.5, 3.0];
    let actions = [Action::Repair, Action::Sell, Action::Repair, Action::DoNothing];
    let mut session = PlotSession::new(CapturingSink::new());

    render_reward_series(&mut session, &rewards, Some(&actions)).unwrap();

    let f = &session.sink().figures()[0];
    assert_eq!(
        f.markers_for(Action::Repair).unwrap().points,
        vec![(0., 1.0), (2., 0.5)]
    );
    assert_eq!(f.markers_for(Action::Sell).unwrap().points, vec![(1., -1.0)]);
    assert_eq!(
        f.legend(),
        vec!["Step Reward", "Repair (1)", "Sell (2)", "Cumulative: 3.5"]
    );
}

#[test]
fn reward_action_length_mismatch_is_rejected() {
    let mut session = PlotSession::new(CapturingSink::new());

    let err = render_reward_series(&mut session, &[1.0, 2.0], Some(&[Action::Sell])).unwrap_err();

    assert!(matches!(
        err,
        Error::LengthMismatch {
            what: "actions",
            actual: 1,
            ..
        }
    ));
    assert_eq!(session.figures_emitted(), 0);
}

#[test]
fn session_flushes_on_drop() {
    struct Counting(Rc<Cell<usize>>);

    impl FigureSink for Counting {
        fn emit(&mut self, _figure: Figure) -> Result<()> {
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            self.0.set(self.0.get() + 1);
            Ok(())
        }
    }

    let flushes = Rc::new(Cell::new(0));
    {
        let mut session = PlotSession::new(Counting(Rc::clone(&flushes)));
        render_reward_series(&mut session, &[1.0], None).unwrap();
        assert_eq!(flushes.get(), 0);
    }
    assert_eq!(flushes.get(), 1);
}

#[test]
fn whole_trajectory_renders_channels_and_rewards() {
    let env = &mut ScriptedEnv::new(vec![
        Scripted::Continue(1.),
        Scripted::Continue(1.),
        Scripted::Terminate(-2.),
    ])
    .with_samples(vec![Action::Repair, Action::DoNothing, Action::Sell]);
    let t = run_episode(&mut *env, 10, 10, &mut NoopObserver).unwrap();
    let mut session = PlotSession::new(CapturingSink::new());

    let stats = render_trajectory(&mut session, &t, None).unwrap().unwrap();

    assert_eq!(session.figures_emitted(), 10);
    assert_float_eq!(stats.total, 0., abs <= 1e-12);
    session.finish().unwrap();
    assert_eq!(session.sink().flushes(), 1);
}

#[test]
fn svg_sink_writes_one_file_per_figure() {
    let dir = std::env::temp_dir().join(format!("student-gym-svg-{}", std::process::id()));
    let mut session = PlotSession::new(SvgSink::new(&dir).unwrap());

    render_observation_channels(
        &mut session,
        &observations(3, 2),
        Some(&[Action::Repair, Action::Sell]),
        None,
    )
    .unwrap();
    render_reward_series(&mut session, &[0.5, -0.5], Some(&[Action::Repair, Action::Sell]))
        .unwrap();
    session.finish().unwrap();

    let written = session.sink().written();
    assert_eq!(written.len(), 3);
    assert!(written[0].ends_with("00-channel_0_dimension_0.svg"));
    assert!(written[2].ends_with("02-step_rewards_over_time.svg"));
    for path in written {
        let svg = std::fs::read_to_string(path).unwrap();
        assert!(svg.contains("<svg"));
    }

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn svg_sink_skips_nan_and_infinite_values() {
    let dir = std::env::temp_dir().join(format!("student-gym-nonfinite-{}", std::process::id()));
    let mut session = PlotSession::new(SvgSink::new(&dir).unwrap());

    render_observation_channels(
        &mut session,
        &[vec![1.0, f64::NAN], vec![2.0, 3.0], vec![f64::INFINITY, 4.0]],
        Some(&[Action::Repair, Action::Sell]),
        None,
    )
    .unwrap();
    let stats = render_reward_series(
        &mut session,
        &[1.0, f64::INFINITY, f64::NAN],
        Some(&[Action::Sell, Action::Repair, Action::DoNothing]),
    )
    .unwrap()
    .unwrap();
    render_reward_series(&mut session, &[f64::NAN], None).unwrap();
    session.finish().unwrap();

    assert!(stats.total.is_nan());
    assert_eq!(session.sink().written().len(), 4);
    for path in session.sink().written() {
        assert!(std::fs::read_to_string(path).unwrap().contains("<svg"));
    }

    std::fs::remove_dir_all(&dir).unwrap();
}
