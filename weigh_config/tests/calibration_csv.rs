use std::fs;

use weigh_config::load_calibration_csv;

#[test]
fn loads_and_fits_a_three_point_csv() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cal.csv");
    fs::write(&path, "raw,grams\n1000,0.0\n101000,100.0\n201000,200.0\n").unwrap();
    let c = load_calibration_csv(&path).unwrap();
    assert_eq!(c.zero_offset, 1000);
    assert!((c.scale_factor - 1000.0).abs() < 1e-9);
}

#[test]
fn single_outlier_is_dropped_before_the_refit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cal.csv");
    let mut body = String::from("raw,grams\n");
    for i in 0..10 {
        let g = f64::from(i) * 10.0;
        body.push_str(&format!("{},{g}\n", (g * 1000.0) as i64));
    }
    // A bumped platform during one reading.
    body.push_str("150000,100.0\n");
    fs::write(&path, body).unwrap();
    let c = load_calibration_csv(&path).unwrap();
    assert!((c.scale_factor - 1000.0).abs() < 1.0, "{c:?}");
    assert!(c.zero_offset.abs() < 100, "{c:?}");
}

#[test]
fn wrong_headers_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cal.csv");
    fs::write(&path, "counts,g\n1,2\n3,4\n").unwrap();
    let err = load_calibration_csv(&path).unwrap_err();
    assert!(format!("{err}").contains("headers 'raw,grams'"));
}

#[test]
fn bad_rows_point_at_the_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cal.csv");
    fs::write(&path, "raw,grams\n1,0.0\nabc,1.0\n").unwrap();
    let err = load_calibration_csv(&path).unwrap_err();
    assert!(format!("{err}").contains("row 3"));
}
