//! MSR sectioned-log parsing tests on complete files

use std::io::Cursor;
use std::time::Duration;

use chrono::NaiveDate;
use fouracc_common::msr::{self, ParseError, Section, SyntaxError, ACC_X, ACC_Y, ACC_Z};
use fouracc_common::recording::Recording;

const FIXTURE: &str = "\
*CREATOR
MSR Electronics GmbH;MSR145;
*STARTTIME
2019-05-03;10:00:00;
*MODUL
MSR145;ACC;ACC;ACC;
*NAME
vibration bench;
*TIMEDELAY
ms;10;10;10;
*CHANNEL
TIME;ACC x;ACC y;ACC z;
*UNIT
;g;g;g;
*LIMITS
;-2;-2;-2;
*CALIBRATION
;1;1;1;
*DATA
2019-05-03 10:00:00.000;0.01;-0.02;1.00;
2019-05-03 10:00:00.020;0.03;;0.98;
2019-05-03 10:00:00.040;;;1.02;
2019-05-03 10:00:00.060;0.05;0.01
";

fn parse_str(text: &str) -> Result<msr::MsrFile, ParseError> {
    msr::parse(Cursor::new(text.as_bytes()))
}

#[test]
fn test_parse_full_file() {
    let file = parse_str(FIXTURE).expect("Should parse fixture");

    assert_eq!(
        file.start,
        NaiveDate::from_ymd_opt(2019, 5, 3)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    );
    assert_eq!(file.columns.len(), 4);
    assert_eq!(file.len(), 4);

    let names: Vec<&str> = file.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Time", "ACC x", "ACC y", "ACC z"]);
    assert_eq!(file.columns[0].unit, "");
    assert_eq!(file.columns[1].unit, "g");
    assert_eq!(file.columns[0].sensor, "MSR145");
    assert_eq!(file.columns[3].sensor, "ACC");
    assert_eq!(file.columns[0].time_delay, Duration::ZERO);
    assert_eq!(file.columns[2].time_delay, Duration::from_millis(10));
}

#[test]
fn test_empty_and_missing_tokens_hold_previous_value() {
    let file = parse_str(FIXTURE).unwrap();
    assert_eq!(file.channel(ACC_X).unwrap(), &[0.01, 0.03, 0.03, 0.05]);
    assert_eq!(file.channel(ACC_Y).unwrap(), &[-0.02, -0.02, -0.02, 0.01]);
    assert_eq!(file.channel(ACC_Z).unwrap(), &[1.00, 0.98, 1.02, 1.02]);
}

#[test]
fn test_first_empty_token_is_zero() {
    let text = FIXTURE.replace(
        "2019-05-03 10:00:00.000;0.01;-0.02;1.00;",
        "2019-05-03 10:00:00.000;;-0.02;1.00;",
    );
    let file = parse_str(&text).unwrap();
    assert_eq!(file.acc_x().unwrap()[0], 0.0);
}

#[test]
fn test_inferred_axes() {
    let file = parse_str(FIXTURE).unwrap();
    let freq = file.sampling_frequency().unwrap();
    assert!((freq - 50.0).abs() < 1e-9, "got {}", freq);
    assert_eq!(file.index_axis(), vec![0.0, 1.0, 2.0, 3.0]);
    assert_eq!(file.elapsed_axis(), Some(vec![0.0, 20.0, 40.0, 60.0]));
}

#[test]
fn test_elapsed_axis_needs_time_column() {
    let text = FIXTURE.replace("TIME;ACC x", "Clock;ACC x");
    let file = parse_str(&text).unwrap();
    assert_eq!(file.elapsed_axis(), None);
}

#[test]
fn test_unknown_section_is_ignored() {
    let text = FIXTURE.replace("*NAME\n", "*FIRMWARE\n4.2;build 7;\n*NAME\n");
    let file = parse_str(&text).unwrap();
    assert_eq!(file.len(), 4);
}

#[test]
fn test_malformed_float_reports_line_and_row() {
    let text = FIXTURE.replace("0.03;;0.98;", "0.03;oops;0.98;");
    let err = parse_str(&text).unwrap_err();
    assert_eq!(err.line(), Some(21));
    assert_eq!(err.section(), Some(Section::Data));
    match err {
        ParseError::Syntax {
            kind: SyntaxError::Float { row, token, .. },
            ..
        } => {
            assert_eq!(row, 1);
            assert_eq!(token, "oops");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_malformed_timestamp() {
    let text = FIXTURE.replace("2019-05-03 10:00:00.040", "yesterday");
    let err = parse_str(&text).unwrap_err();
    assert_eq!(err.line(), Some(22));
    assert!(matches!(
        err,
        ParseError::Syntax {
            kind: SyntaxError::Timestamp { row: 2, .. },
            ..
        }
    ));
}

#[test]
fn test_too_many_fields() {
    let text = FIXTURE.replace("0.01;-0.02;1.00;", "0.01;-0.02;1.00;7.0;");
    let err = parse_str(&text).unwrap_err();
    assert!(matches!(
        err,
        ParseError::Syntax {
            kind: SyntaxError::TooManyFields {
                found: 5,
                expected: 4
            },
            ..
        }
    ));
}

#[test]
fn test_bad_time_delay_unit() {
    let text = FIXTURE.replace("ms;10;10;10;", "lightyears;10;10;10;");
    let err = parse_str(&text).unwrap_err();
    assert_eq!(err.section(), Some(Section::TimeDelay));
    assert!(matches!(
        err,
        ParseError::Syntax {
            kind: SyntaxError::TimeDelay { index: 1, .. },
            ..
        }
    ));
}

#[test]
fn test_recording_detects_msr() {
    let rec = Recording::from_bytes(FIXTURE.as_bytes()).unwrap();
    match rec {
        Recording::Sectioned(file) => assert_eq!(file.len(), 4),
        Recording::Series(_) => panic!("fixture should be detected as MSR"),
    }
}
