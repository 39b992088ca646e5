mod common;

use asi_mount_core::mount::{AxisMotion, MountOptions, Site};
use asi_mount_core::protocol::{
    Axis, BuzzerVolume, DeviceError, Direction, ProtocolError, SlewRate, TrackRate,
};
use chrono::{TimeZone, Utc};
use common::{mount, mount_with, ScriptedLink};
use pretty_assertions::assert_eq;
use std::time::Duration;

fn strings(cmds: &[&str]) -> Vec<String> {
    cmds.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_set_utc_scenario() {
    let link = ScriptedLink::new();
    link.respond(":SC06/15/23#", b"1Updating Planetary Data#                #")
        .respond(":SG-02#", b"1")
        .respond(":SL10:00:00#", b"1");
    let mount = mount(&link);

    let utc = Utc.with_ymd_and_hms(2023, 6, 15, 8, 0, 0).unwrap();
    mount.set_utc(utc, 2).unwrap();

    assert_eq!(
        link.writes(),
        strings(&[":SC06/15/23#", ":SG-02#", ":SL10:00:00#"])
    );
    assert!(link.writes().iter().all(|c| !c.starts_with(":SH")));
    assert_eq!(mount.state().utc_offset, Some(2));
}

#[test]
fn test_set_utc_with_dst_commands() {
    let link = ScriptedLink::new();
    link.respond(":SC06/15/23#", b"1")
        .respond(":SG-02#", b"1")
        .respond(":SL10:00:00#", b"1");
    let mount = mount_with(
        &link,
        MountOptions {
            use_dst_commands: true,
            daylight_saving: true,
        },
    );

    let utc = Utc.with_ymd_and_hms(2023, 6, 15, 8, 0, 0).unwrap();
    mount.set_utc(utc, 2).unwrap();
    assert_eq!(
        link.writes(),
        strings(&[":SC06/15/23#", ":SH1#", ":SG-02#", ":SL10:00:00#"])
    );
}

#[test]
fn test_set_utc_aborts_on_rejection() {
    let link = ScriptedLink::new();
    link.respond(":SC06/15/23#", b"0");
    let mount = mount(&link);

    let utc = Utc.with_ymd_and_hms(2023, 6, 15, 8, 0, 0).unwrap();
    let err = mount.set_utc(utc, 2).unwrap_err();
    assert!(matches!(err, ProtocolError::Rejected { .. }));
    assert_eq!(link.writes(), strings(&[":SC06/15/23#"]));
}

#[test]
fn test_get_utc_applies_offset() {
    let link = ScriptedLink::new();
    common::healthy(&link);
    let mount = mount(&link);

    let time = mount.get_utc().unwrap();
    assert_eq!(time.utc, Utc.with_ymd_and_hms(2023, 6, 15, 8, 0, 0).unwrap());
    assert_eq!(time.utc_offset, 2);
    assert_eq!(time.daylight_saving, None);
    assert_eq!(link.writes(), strings(&[":GC#", ":GL#", ":GG#"]));
}

#[test]
fn test_get_utc_reads_dst_flag_when_supported() {
    let link = ScriptedLink::new();
    common::healthy(&link).always(":GH#", b"1#");
    let mount = mount_with(
        &link,
        MountOptions {
            use_dst_commands: true,
            daylight_saving: false,
        },
    );

    let time = mount.get_utc().unwrap();
    assert_eq!(time.daylight_saving, Some(true));
    // The flag is informational; the offset alone converts to UTC
    assert_eq!(time.utc, Utc.with_ymd_and_hms(2023, 6, 15, 8, 0, 0).unwrap());
    assert_eq!(link.writes(), strings(&[":GC#", ":GL#", ":GG#", ":GH#"]));
}

#[test]
fn test_slew_and_sync_settle_before_reading() {
    let link = ScriptedLink::new();
    link.always(":Sr05:30:00#", b"1")
        .always(":Sd+45*30:00#", b"1")
        .always(":MS#", b"0#")
        .always(":CM#", b"N/A#");
    let mount = mount(&link);

    let started = std::time::Instant::now();
    mount.slew(5.5, 45.5).unwrap();
    assert!(started.elapsed() >= Duration::from_millis(100));

    let started = std::time::Instant::now();
    mount.sync(5.5, 45.5).unwrap();
    assert!(started.elapsed() >= Duration::from_millis(100));
}

#[test]
fn test_get_utc_fails_on_malformed_time() {
    let link = ScriptedLink::new();
    common::healthy(&link);
    link.respond(":GL#", b"10:0:00#");
    let mount = mount(&link);

    let err = mount.get_utc().unwrap_err();
    assert!(matches!(err, ProtocolError::Malformed { .. }));
}

#[test]
fn test_slew_below_horizon_skips_start() {
    let link = ScriptedLink::new();
    link.respond(":Sr05:30:00#", b"1")
        .respond(":Sd-80*00:00#", b"e5#");
    let mount = mount(&link);

    let err = mount.slew(5.5, -80.0).unwrap_err();
    assert_eq!(err.device_error(), Some(DeviceError::BelowHorizon));
    assert_eq!(link.count(":MS#"), 0);
}

#[test]
fn test_slew_accepts_zero_on_start() {
    let link = ScriptedLink::new();
    link.respond(":Sr05:30:00#", b"1")
        .respond(":Sd+45*30:00#", b"1")
        .respond(":MS#", b"0#");
    let mount = mount(&link);

    mount.slew(5.5, 45.5).unwrap();
    assert_eq!(
        link.writes(),
        strings(&[":Sr05:30:00#", ":Sd+45*30:00#", ":MS#"])
    );
}

#[test]
fn test_slew_start_one_is_rejection() {
    let link = ScriptedLink::new();
    link.respond(":Sr05:30:00#", b"1")
        .respond(":Sd+45*30:00#", b"1")
        .respond(":MS#", b"1#");
    let mount = mount(&link);

    assert!(matches!(
        mount.slew(5.5, 45.5),
        Err(ProtocolError::Rejected { .. })
    ));
}

#[test]
fn test_sync_error_and_success() {
    let link = ScriptedLink::new();
    link.always(":Sr05:30:00#", b"1")
        .always(":Sd+45*30:00#", b"1")
        .respond(":CM#", b"e4#")
        .respond(":CM#", b"N/A#");
    let mount = mount(&link);

    let err = mount.sync(5.5, 45.5).unwrap_err();
    assert_eq!(err.device_error(), Some(DeviceError::MountMoving));
    mount.sync(5.5, 45.5).unwrap();
}

#[test]
fn test_motion_same_direction_sends_nothing() {
    let link = ScriptedLink::new();
    let mount = mount(&link);

    mount.motion_dec(true, false).unwrap();
    mount.motion_dec(true, false).unwrap();
    assert_eq!(link.writes(), strings(&[":Mn#"]));
    assert_eq!(mount.state().dec_motion, AxisMotion::Moving(Direction::North));
}

#[test]
fn test_motion_reversal_stops_once() {
    let link = ScriptedLink::new();
    let mount = mount(&link);

    mount.motion_ra(true, false).unwrap();
    mount.motion_ra(false, true).unwrap();
    mount.motion_ra(false, false).unwrap();
    mount.motion_ra(false, false).unwrap();
    assert_eq!(
        link.writes(),
        strings(&[":Mw#", ":Qw#", ":Me#", ":Qe#"])
    );
    assert_eq!(mount.state().ra_motion, AxisMotion::Stopped);
}

#[test]
fn test_failed_stop_keeps_motion_state() {
    let link = ScriptedLink::new();
    let mount = mount(&link);

    mount.motion_dec(false, true).unwrap();
    link.fail_writes(true);
    assert!(mount.motion_dec(true, false).is_err());
    link.fail_writes(false);
    assert_eq!(mount.state().dec_motion, AxisMotion::Moving(Direction::South));
}

#[test]
fn test_motion_rejects_foreign_direction() {
    let link = ScriptedLink::new();
    let mount = mount(&link);
    assert!(matches!(
        mount.motion(Axis::Dec, Some(Direction::East)),
        Err(ProtocolError::InvalidArgument(_))
    ));
    assert!(link.writes().is_empty());
}

#[test]
fn test_stop_all_clears_motion() {
    let link = ScriptedLink::new();
    let mount = mount(&link);
    mount.motion_dec(true, false).unwrap();
    mount.motion_ra(false, true).unwrap();
    mount.stop().unwrap();

    let state = mount.state();
    assert_eq!(state.dec_motion, AxisMotion::Stopped);
    assert_eq!(state.ra_motion, AxisMotion::Stopped);
    assert_eq!(link.writes().last().map(String::as_str), Some(":Q#"));
}

#[test]
fn test_rate_selection_is_deduplicated() {
    let link = ScriptedLink::new();
    let mount = mount(&link);

    assert!(mount.select_track_rate(Some(TrackRate::Lunar)).unwrap());
    assert!(!mount.select_track_rate(Some(TrackRate::Lunar)).unwrap());
    assert!(!mount.select_track_rate(None).unwrap());
    assert!(mount
        .select_slew_rate(SlewRate::from_flags(false, false, true, false))
        .unwrap());
    assert!(!mount.select_slew_rate(Some(SlewRate::Find)).unwrap());
    assert!(mount.select_slew_rate(Some(SlewRate::Max)).unwrap());

    assert_eq!(link.writes(), strings(&[":TL#", ":RM#", ":RS#"]));
}

#[test]
fn test_guide_rate_is_clamped() {
    let link = ScriptedLink::new();
    let mount = mount(&link);

    assert_eq!(mount.set_guide_rate(5, 5).unwrap(), 10);
    assert_eq!(mount.set_guide_rate(95, 95).unwrap(), 90);
    assert_eq!(link.writes(), strings(&[":Rg0.1#", ":Rg0.9#"]));

    link.always(":Ggr#", b"0.30#");
    assert_eq!(mount.guide_rate().unwrap(), 30);
    assert_eq!(mount.state().guide_rate, Some(30));
}

#[test]
fn test_guide_pulse_needs_one_direction() {
    let link = ScriptedLink::new();
    let mount = mount(&link);

    assert_eq!(
        mount.guide_pulse(Axis::Ra, 0, 120).unwrap(),
        Duration::from_millis(120)
    );
    assert!(matches!(
        mount.guide_pulse(Axis::Dec, 100, 100),
        Err(ProtocolError::InvalidArgument(_))
    ));
    assert!(matches!(
        mount.guide_pulse(Axis::Dec, 0, 0),
        Err(ProtocolError::InvalidArgument(_))
    ));
    mount.pulse_guide(Axis::Dec, 5, 0).unwrap();
    assert_eq!(link.writes(), strings(&[":Mge0120#", ":Mgn0005#"]));
}

#[test]
fn test_latitude_round_trip() {
    for latitude in [-90.0, -33.875, -0.25, 0.0, 12.0, 50.1, 89.99] {
        let link = ScriptedLink::new();
        link.always(&format!(":St{}#", encode_dm(latitude)), b"1");
        let mount = mount(&link);

        let site = Site {
            latitude,
            longitude: 14.5,
        };
        link.always(":Sg345*30#", b"1");
        mount.set_site(site).unwrap();

        // Echo what was written back as the query reply
        let written = link.writes()[0].clone();
        let field = &written[3..written.len() - 1];
        link.always(":Gt#", format!("{}#", field).as_bytes())
            .always(":Gg#", b"345*30#");
        let read = mount.site().unwrap();
        assert!((read.latitude - latitude).abs() <= 0.5 / 60.0 + 1e-9);
        assert!((read.longitude - 14.5).abs() < 1e-9);
    }
}

/// Independent formatter for the expected `:St` payload
fn encode_dm(degrees: f64) -> String {
    let minutes = (degrees.abs() * 60.0).round() as i64;
    let sign = if degrees < 0.0 && minutes != 0 { '-' } else { '+' };
    format!("{}{:02}*{:02}", sign, minutes / 60, minutes % 60)
}

#[test]
fn test_longitude_west_of_greenwich() {
    let link = ScriptedLink::new();
    link.always(":St+40*45#", b"1").always(":Sg074*00#", b"1");
    let mount = mount(&link);

    mount
        .set_site(Site {
            latitude: 40.75,
            longitude: -74.0,
        })
        .unwrap();

    link.always(":Gt#", b"+40*45#").always(":Gg#", b"074*00#");
    let site = mount.site().unwrap();
    // Reported east-positive in (0, 360]
    assert!((site.longitude - 286.0).abs() < 1e-9);
}

#[test]
fn test_set_site_rejected_latitude_stops_sequence() {
    let link = ScriptedLink::new();
    link.always(":St+50*06#", b"e1#");
    let mount = mount(&link);

    let err = mount
        .set_site(Site {
            latitude: 50.1,
            longitude: 14.5,
        })
        .unwrap_err();
    // Site acknowledgements are one byte long, so only the `e` survives
    assert!(matches!(err, ProtocolError::Rejected { ref reply, .. } if reply == "e"));
    assert_eq!(err.device_error(), None);
    assert_eq!(link.count(":Sg345*30#"), 0);
}

#[test]
fn test_detect_product_family() {
    let link = ScriptedLink::new();
    link.respond(":GVP#", b"AM5#").respond(":GVP#", b"EQ6#");
    let mount = mount(&link);

    assert_eq!(mount.detect().unwrap(), "AM5");
    assert!(matches!(
        mount.detect(),
        Err(ProtocolError::UnsupportedDevice(p)) if p == "EQ6"
    ));
}

#[test]
fn test_status_queries() {
    let link = ScriptedLink::new();
    link.always(":GT#", b"2#")
        .always(":GBu#", b"0#")
        .always(":Gm#", b"E#")
        .always(":GS#", b"18:15:36#")
        .always(":GV#", b"1.1.2#");
    let mount = mount(&link);

    assert_eq!(mount.tracking_rate().unwrap(), TrackRate::Solar);
    assert_eq!(mount.buzzer().unwrap(), BuzzerVolume::Off);
    assert!((mount.sidereal_time().unwrap() - 18.26).abs() < 1e-9);
    assert_eq!(mount.firmware_version().unwrap(), "1.1.2");
    assert_eq!(
        mount.pier_side().unwrap(),
        asi_mount_core::protocol::PierSide::East
    );

    mount.set_buzzer(BuzzerVolume::High).unwrap();
    mount.set_tracking(false).unwrap();
    mount.home().unwrap();
    assert_eq!(
        link.writes()[5..].to_vec(),
        strings(&[":SBu2#", ":Td#", ":hC#"])
    );
    assert_eq!(mount.state().tracking, Some(false));
}
