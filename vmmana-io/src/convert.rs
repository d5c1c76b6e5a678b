//! Invocation of the external raw-data converter.
//!
//! The converter decodes one raw capture file into an event file. It is run
//! once per capture; a failure is reported for that file and the batch moves
//! on.

use crate::config::ConverterConfig;
use crate::{Error, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Outcome of converting a batch of capture files.
#[derive(Debug, Default)]
pub struct ConversionReport {
    pub converted: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, Error)>,
}

impl ConversionReport {
    /// Returns true if every file converted.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs the converter with a fixed set of reconstruction parameters.
#[derive(Debug, Clone)]
pub struct Converter {
    config: ConverterConfig,
}

impl Converter {
    #[must_use]
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    /// Command-line arguments for one capture file.
    #[must_use]
    pub fn arguments(&self, input: &Path) -> Vec<OsString> {
        let c = &self.config;
        let mut args: Vec<OsString> = Vec::new();
        let mut flag = |name: &str, value: OsString| {
            args.push(name.into());
            args.push(value);
        };
        flag("-f", input.into());
        flag("-geo", c.geometry.clone().into());
        flag("-bc", c.bc_clock.to_string().into());
        flag("-tac", c.tac_slope.to_string().into());
        flag("-th", c.threshold.to_string().into());
        flag("-cs", c.cluster_size.to_string().into());
        flag("-ccs", c.combined_cluster_size.to_string().into());
        flag("-mst", c.missing_strips.to_string().into());
        flag("-dt", c.delta_time_hits.to_string().into());
        flag("-spc", c.span_cluster.to_string().into());
        flag("-dp", c.delta_time_planes.to_string().into());
        flag("-crl", c.charge_ratio_lower.to_string().into());
        flag("-cru", c.charge_ratio_upper.to_string().into());
        flag("-save", c.save.clone().into());
        flag("-info", c.info.clone().into());
        flag("-df", c.data_format.clone().into());
        flag("-cal", c.calibration.clone().into());
        args
    }

    /// Converts one capture file, waiting for the converter to exit.
    ///
    /// # Errors
    /// Returns `ConverterSpawn` if the executable cannot be started and
    /// `ConverterFailed` if it exits unsuccessfully.
    pub fn convert_file(&self, input: &Path) -> Result<()> {
        log::debug!("converting {}", input.display());
        let status = Command::new(&self.config.executable)
            .args(self.arguments(input))
            .status()
            .map_err(|source| Error::ConverterSpawn {
                program: self.config.executable.clone(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::ConverterFailed {
                input: input.to_path_buf(),
                status,
            })
        }
    }

    /// Capture files in `folder` with the configured extension, sorted.
    ///
    /// # Errors
    /// Returns an error if the folder cannot be read.
    pub fn discover_inputs<P: AsRef<Path>>(&self, folder: P) -> Result<Vec<PathBuf>> {
        let mut inputs = Vec::new();
        for entry in std::fs::read_dir(folder)? {
            let path = entry?.path();
            if path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.config.input_extension))
            {
                inputs.push(path);
            }
        }
        inputs.sort();
        Ok(inputs)
    }

    /// Converts every input, continuing past failures.
    pub fn convert_all(&self, inputs: &[PathBuf]) -> ConversionReport {
        let mut report = ConversionReport::default();
        for input in inputs {
            match self.convert_file(input) {
                Ok(()) => report.converted.push(input.clone()),
                Err(err) => {
                    log::warn!("{err}");
                    report.failed.push((input.clone(), err));
                }
            }
        }
        log::info!(
            "converted {} of {} files",
            report.converted.len(),
            inputs.len()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converter(executable: &str) -> Converter {
        Converter::new(ConverterConfig {
            executable: PathBuf::from(executable),
            ..ConverterConfig::default()
        })
    }

    #[test]
    fn test_arguments_follow_flag_set() {
        let args = converter("convertFile").arguments(Path::new("run.pcapng"));
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(&args[..2], &["-f", "run.pcapng"]);
        let bc = args.iter().position(|a| a == "-bc").unwrap();
        assert_eq!(args[bc + 1], "40");
        let save = args.iter().position(|a| a == "-save").unwrap();
        assert_eq!(args[save + 1], "[[1],[1],[1]]");
        assert_eq!(args.len(), 34);
        assert_eq!(args[args.len() - 2], "-cal");
    }

    #[test]
    fn test_missing_executable_is_reported() {
        let report = converter("/nonexistent/convertFile")
            .convert_all(&[PathBuf::from("a.pcapng"), PathBuf::from("b.pcapng")]);
        assert!(!report.is_success());
        assert_eq!(report.failed.len(), 2);
        assert!(matches!(report.failed[0].1, Error::ConverterSpawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status_is_checked() {
        let input = Path::new("a.pcapng");
        assert!(converter("true").convert_file(input).is_ok());
        assert!(matches!(
            converter("false").convert_file(input),
            Err(Error::ConverterFailed { .. })
        ));
    }

    #[test]
    fn test_discover_inputs() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.pcapng", "a.pcapng", "c.h5"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let inputs = converter("convertFile").discover_inputs(dir.path()).unwrap();
        assert_eq!(inputs.len(), 2);
        assert!(inputs[0].ends_with("a.pcapng"));
    }
}
