//! Pedestal and threshold calibration tables.
//!
//! Tables are comma separated with a header row. Column 2 is the VMM id,
//! column 3 the channel and column 4 the voltage in mV (0-based).

use crate::{Error, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use vmmana_core::calibration::pair_tables;
use vmmana_core::{ChannelCalibration, ChannelVoltage};

const VMM_COLUMN: usize = 2;
const CHANNEL_COLUMN: usize = 3;
const VOLTAGE_COLUMN: usize = 4;

/// Parses a chip or channel id written either as an integer or an integral float.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_id(field: &str) -> Option<u8> {
    let field = field.trim();
    if let Ok(id) = field.parse::<u8>() {
        return Some(id);
    }
    let value: f64 = field.parse().ok()?;
    if value.fract() == 0.0 && (0.0..=f64::from(u8::MAX)).contains(&value) {
        return Some(value as u8);
    }
    None
}

fn parse_row(path: &Path, line_number: usize, line: &str) -> Result<ChannelVoltage> {
    let fields: Vec<&str> = line.split(',').collect();
    let parse_error = |message: String| Error::Parse {
        path: path.to_path_buf(),
        line: line_number,
        message,
    };
    let field = |index: usize| {
        fields
            .get(index)
            .copied()
            .ok_or_else(|| {
                parse_error(format!(
                    "expected at least {} columns, found {}",
                    VOLTAGE_COLUMN + 1,
                    fields.len()
                ))
            })
    };

    let vmm_field = field(VMM_COLUMN)?;
    let channel_field = field(CHANNEL_COLUMN)?;
    let voltage_field = field(VOLTAGE_COLUMN)?;

    let vmm =
        parse_id(vmm_field).ok_or_else(|| parse_error(format!("invalid VMM id '{vmm_field}'")))?;
    let channel = parse_id(channel_field)
        .ok_or_else(|| parse_error(format!("invalid channel '{channel_field}'")))?;
    let voltage_mv: f64 = voltage_field
        .trim()
        .parse()
        .map_err(|_| parse_error(format!("invalid voltage '{voltage_field}'")))?;

    Ok(ChannelVoltage {
        vmm,
        channel,
        voltage_mv,
    })
}

/// Reads one calibration table.
///
/// # Errors
/// Returns `Io` if the file cannot be read and `Parse` for a malformed row.
pub fn read_calibration_table<P: AsRef<Path>>(path: P) -> Result<Vec<ChannelVoltage>> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let mut rows = Vec::new();
    for (index, line) in reader.lines().enumerate().skip(1) {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        rows.push(parse_row(path, index + 1, &line)?);
    }
    log::debug!("{}: {} calibration rows", path.display(), rows.len());
    Ok(rows)
}

/// Reads and pairs pedestal and threshold tables.
///
/// # Errors
/// Returns an error if either table is unreadable or the tables do not
/// describe the same channels in the same order.
pub fn read_calibration<P: AsRef<Path>, Q: AsRef<Path>>(
    pedestal_path: P,
    threshold_path: Q,
) -> Result<Vec<ChannelCalibration>> {
    let pedestals = read_calibration_table(pedestal_path)?;
    let thresholds = read_calibration_table(threshold_path)?;
    Ok(pair_tables(&pedestals, &thresholds)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn table(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_read_table_skips_header_and_blank_lines() {
        let file = table("fec,hybrid,vmm,channel,pedestal\n6,0,0,0,171.5\n\n6,0,1.0,63,180\n");
        let rows = read_calibration_table(file.path()).unwrap();
        assert_eq!(
            rows,
            vec![
                ChannelVoltage {
                    vmm: 0,
                    channel: 0,
                    voltage_mv: 171.5
                },
                ChannelVoltage {
                    vmm: 1,
                    channel: 63,
                    voltage_mv: 180.0
                },
            ]
        );
    }

    #[test]
    fn test_malformed_row_reports_line() {
        let file = table("h\n6,0,0,0,171.5\n6,0,0,x,171.5\n");
        match read_calibration_table(file.path()) {
            Err(Error::Parse { line, message, .. }) => {
                assert_eq!(line, 3);
                assert!(message.contains("channel"));
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let file = table("h\n6,0,0\n");
        assert!(matches!(
            read_calibration_table(file.path()),
            Err(Error::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn test_read_calibration_pairs_tables() {
        let pedestals = table("h\n6,0,0,0,170\n6,0,0,1,260\n");
        let thresholds = table("h\n6,0,0,0,300\n6,0,0,1,300\n");
        let paired = read_calibration(pedestals.path(), thresholds.path()).unwrap();
        assert_eq!(paired.len(), 2);
        assert!((paired[1].pedestal_mv - 260.0).abs() < f64::EPSILON);

        let short = table("h\n6,0,0,0,300\n");
        assert!(matches!(
            read_calibration(pedestals.path(), short.path()),
            Err(Error::CoreError(_))
        ));
    }
}
