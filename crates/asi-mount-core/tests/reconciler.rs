mod common;

use asi_mount_core::mount::{
    CoordinateState, EpochTransform, MountEvent, PollCadence, Poller, Reconciler,
};
use asi_mount_core::protocol::PierSide;
use common::{healthy, mount, ScriptedLink};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

fn tracking_events(events: &[MountEvent]) -> Vec<bool> {
    events
        .iter()
        .filter_map(|e| match e {
            MountEvent::Tracking { on } => Some(*on),
            _ => None,
        })
        .collect()
}

fn home_events(events: &[MountEvent]) -> Vec<bool> {
    events
        .iter()
        .filter_map(|e| match e {
            MountEvent::Home { at_home } => Some(*at_home),
            _ => None,
        })
        .collect()
}

fn coordinate_state(events: &[MountEvent]) -> Option<CoordinateState> {
    events.iter().find_map(|e| match e {
        MountEvent::Coordinates { state, .. } => Some(*state),
        _ => None,
    })
}

#[test]
fn test_idle_with_tracking_off() {
    let link = ScriptedLink::new();
    healthy(&link).always(":GU#", b"NnG#");
    let mount = mount(&link);
    let reconciler = Reconciler::default();

    let report = reconciler.poll_tick(&mount);
    assert_eq!(report.cadence, PollCadence::Idle);
    assert_eq!(tracking_events(&report.events), vec![false]);
    assert_eq!(mount.state().tracking, Some(false));
    assert_eq!(coordinate_state(&report.events), Some(CoordinateState::Ok));
    assert_eq!(reconciler.interval(report.cadence), Duration::from_secs(1));
}

#[test]
fn test_moving_mount_polls_faster() {
    let link = ScriptedLink::new();
    healthy(&link).always(":GU#", b"G#");
    let mount = mount(&link);
    let reconciler = Reconciler::default();

    let report = reconciler.poll_tick(&mount);
    assert_eq!(report.cadence, PollCadence::Busy);
    assert_eq!(coordinate_state(&report.events), Some(CoordinateState::Busy));
    assert_eq!(
        reconciler.interval(report.cadence),
        Duration::from_millis(500)
    );

    link.always(":GU#", b"NG#");
    assert_eq!(reconciler.poll_tick(&mount).cadence, PollCadence::Idle);
}

#[test]
fn test_edges_fire_once() {
    let link = ScriptedLink::new();
    healthy(&link)
        .respond(":GU#", b"NG#")
        .respond(":GU#", b"NHG#")
        .respond(":GU#", b"NHG#")
        .respond(":GU#", b"NG#");
    let mount = mount(&link);
    let reconciler = Reconciler::default();

    let homes: Vec<Vec<bool>> = (0..4)
        .map(|_| home_events(&reconciler.poll_tick(&mount).events))
        .collect();
    assert_eq!(homes, vec![vec![], vec![true], vec![], vec![false]]);

    // Tracking reported on every tick but published only once
    link.clear_log();
    let report = reconciler.poll_tick(&mount);
    assert!(tracking_events(&report.events).is_empty());
}

#[test]
fn test_home_command_reannounces_arrival() {
    let link = ScriptedLink::new();
    healthy(&link).always(":GU#", b"NnH#");
    let mount = mount(&link);
    let reconciler = Reconciler::default();

    assert_eq!(home_events(&reconciler.poll_tick(&mount).events), vec![true]);
    assert!(home_events(&reconciler.poll_tick(&mount).events).is_empty());

    // Already home: the next poll still reports completion of the request
    mount.home().unwrap();
    assert!(!mount.state().at_home);
    assert_eq!(home_events(&reconciler.poll_tick(&mount).events), vec![true]);
}

#[test]
fn test_pier_side_changes() {
    let link = ScriptedLink::new();
    healthy(&link)
        .respond(":Gm#", b"W#")
        .respond(":Gm#", b"W#")
        .respond(":Gm#", b"E#");
    let mount = mount(&link);
    let reconciler = Reconciler::default();

    let sides: Vec<MountEvent> = (0..3)
        .flat_map(|_| reconciler.poll_tick(&mount).events)
        .filter(|e| matches!(e, MountEvent::PierSide { .. }))
        .collect();
    assert_eq!(
        sides,
        vec![
            MountEvent::PierSide {
                side: PierSide::West
            },
            MountEvent::PierSide {
                side: PierSide::East
            },
        ]
    );
}

#[test]
fn test_coordinate_failure_raises_alert_but_continues() {
    let link = ScriptedLink::new();
    healthy(&link).respond(":GR#", b"garbage#");
    let mount = mount(&link);
    let reconciler = Reconciler::default();

    let report = reconciler.poll_tick(&mount);
    assert_eq!(coordinate_state(&report.events), Some(CoordinateState::Alert));
    // Remaining reads still ran
    let writes = link.writes();
    for cmd in [":GU#", ":Gm#", ":GC#"] {
        assert!(writes.iter().any(|w| w == cmd), "{} not polled", cmd);
    }
    assert!(report
        .events
        .iter()
        .any(|e| matches!(e, MountEvent::Time { .. })));

    // Next tick recovers
    let report = reconciler.poll_tick(&mount);
    assert_eq!(coordinate_state(&report.events), Some(CoordinateState::Ok));
}

#[test]
fn test_time_failure_is_reported() {
    let link = ScriptedLink::new();
    healthy(&link).respond(":GC#", b"#");
    let mount = mount(&link);

    let report = Reconciler::default().poll_tick(&mount);
    assert!(report
        .events
        .iter()
        .any(|e| matches!(e, MountEvent::TimeUnavailable)));
    assert_eq!(coordinate_state(&report.events), Some(CoordinateState::Ok));
}

struct Offset;

impl EpochTransform for Offset {
    fn to_reference(&self, ra: f64, dec: f64) -> (f64, f64) {
        (ra + 1.0, dec - 1.0)
    }

    fn from_reference(&self, ra: f64, dec: f64) -> (f64, f64) {
        (ra - 1.0, dec + 1.0)
    }
}

#[test]
fn test_coordinates_converted_to_reference_epoch() {
    let link = ScriptedLink::new();
    healthy(&link);
    let mount = mount(&link);

    let report = Reconciler::new(Arc::new(Offset)).poll_tick(&mount);
    let coords = report.events.iter().find_map(|e| match e {
        MountEvent::Coordinates { ra, dec, .. } => Some((*ra, *dec)),
        _ => None,
    });
    let (ra, dec) = coords.unwrap();
    assert!((ra - 6.5).abs() < 1e-9);
    assert!((dec - 44.5).abs() < 1e-9);
}

#[tokio::test]
async fn test_poller_publishes_and_stops() {
    common::init_tracing();
    let link = ScriptedLink::new();
    healthy(&link).always(":GU#", b"NnG#");
    let mount = Arc::new(mount(&link));
    let (tx, mut rx) = broadcast::channel(1024);

    let reconciler =
        Reconciler::default().with_intervals(Duration::from_millis(10), Duration::from_millis(5));
    let mut poller = Poller::start(Arc::clone(&mount), reconciler, tx).unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(MountEvent::Tracking { on }) => break on,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event bus closed: {}", e),
            }
        }
    })
    .await
    .unwrap();
    assert!(!event);

    poller.stop();
    assert!(!poller.is_running());
    let writes = link.writes().len();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(link.writes().len(), writes);
}
