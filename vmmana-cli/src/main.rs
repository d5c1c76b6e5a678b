//! vmmana CLI - Command-line interface for Micromegas run analysis.
//!
//! Every subcommand reads its inputs, writes CSV artifacts into an output
//! directory and prints a short summary.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use vmmana_algorithms::{
    activity_timeline, analyze_gain, channel_counts, cluster_rate_map, field_histograms,
    find_bad_channels, hit_rate, noisy_channels, region_gain_rates, threshold_profiles,
    BadChannelRule, GainReport,
};
use vmmana_core::{
    Hit, HitField, Plane, PlaneGains, Region, RunCollection, Selection, SharingPolicy,
};
use vmmana_io::{
    load_run, read_calibration, read_hits, AnalysisConfig, ArtifactWriter, Converter,
    FitSummaryRow,
};

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    VmmanaIo(#[from] vmmana_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] vmmana_core::Error),

    #[error("{failed} of {total} files failed to convert")]
    Conversion { failed: usize, total: usize },

    #[error("expected 1 or {runs} values for --{flag}, got {found}")]
    PerRunValues {
        flag: &'static str,
        runs: usize,
        found: usize,
    },
}

/// Treatment of clusters without charge on the y plane.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Sharing {
    /// Drop non-finite ratios before averaging
    FiniteOnly,
    /// Average every ratio
    Propagate,
}

impl From<Sharing> for SharingPolicy {
    fn from(sharing: Sharing) -> Self {
        match sharing {
            Sharing::FiniteOnly => SharingPolicy::FiniteOnly,
            Sharing::Propagate => SharingPolicy::Propagate,
        }
    }
}

/// Offline analysis of 2D Micromegas VMM runs.
#[derive(Parser)]
#[command(name = "vmmana")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON analysis configuration; flags override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// A run folder and where to put its artifacts.
#[derive(Args)]
struct RunArgs {
    /// Folder of event files, one per data-taking segment
    run: PathBuf,

    /// Duration of one event file in seconds
    #[arg(long)]
    segment_duration: Option<f64>,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    output: PathBuf,
}

#[derive(Args)]
struct GainArgs {
    /// Preamplifier gain of the x plane in mV/fC
    #[arg(long)]
    gain_x: Option<f64>,

    /// Preamplifier gain of the y plane in mV/fC
    #[arg(long)]
    gain_y: Option<f64>,

    /// Charge sharing policy
    #[arg(long, value_enum)]
    sharing: Option<Sharing>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit the gain spectrum of all clusters and of each region
    Gain {
        #[command(flatten)]
        run: RunArgs,

        #[command(flatten)]
        gain: GainArgs,

        /// Regions to analyse (repeatable); defaults to the configured list
        #[arg(short, long = "region")]
        regions: Vec<Region>,
    },

    /// Strip hit rates per plane and the cluster rate map
    Rates {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Hits and clusters per event file
    Timeline {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Per-channel hit counts and noisy channels
    Noisy {
        #[command(flatten)]
        run: RunArgs,

        /// Number of chips to scan
        #[arg(long)]
        vmm_count: Option<u8>,

        /// Hit count above which a channel is noisy
        #[arg(long)]
        threshold: Option<u64>,
    },

    /// Flag bad channels from pedestal and threshold calibration tables
    BadChannels {
        /// Pedestal table (CSV)
        #[arg(long)]
        pedestal: PathBuf,

        /// Threshold table (CSV)
        #[arg(long)]
        threshold: PathBuf,

        /// Bad channel rule (strict or basic)
        #[arg(long)]
        rule: Option<BadChannelRule>,

        /// Expected threshold offset above the pedestal in mV
        #[arg(long)]
        offset: Option<f64>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Compare per-region gain rates and charge sharing across runs
    Compare {
        /// Run folders
        #[arg(required = true)]
        runs: Vec<PathBuf>,

        /// Run labels, parallel with the run folders
        #[arg(short, long = "label")]
        labels: Vec<String>,

        /// x plane gain in mV/fC, once for all runs or once per run
        #[arg(long)]
        gain_x: Vec<f64>,

        /// y plane gain in mV/fC, once for all runs or once per run
        #[arg(long)]
        gain_y: Vec<f64>,

        /// Duration of one event file in seconds
        #[arg(long)]
        segment_duration: Option<f64>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Overlay hit field distributions of several event files or runs
    Sources {
        /// Event files or run folders, e.g. before, with and after the source
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Input labels, parallel with the inputs
        #[arg(short, long = "label")]
        labels: Vec<String>,

        /// Hit fields to compare (repeatable); defaults to every field
        #[arg(short, long = "field")]
        fields: Vec<HitField>,

        /// Bins per field
        #[arg(long, default_value_t = 100)]
        bins: usize,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Convert raw capture files into event files with the external converter
    Convert {
        /// Folder of raw capture files
        input: PathBuf,

        /// Converter executable
        #[arg(long)]
        executable: Option<PathBuf>,

        /// Detector geometry file
        #[arg(long)]
        geometry: Option<PathBuf>,

        /// Front-end time calibration file
        #[arg(long)]
        calibration: Option<PathBuf>,
    },

    /// Show a run summary
    Info {
        /// Folder of event files
        run: PathBuf,

        /// Duration of one event file in seconds
        #[arg(long)]
        segment_duration: Option<f64>,
    },

    /// Print the effective configuration as JSON
    Config,
}

fn init_logging(verbose: u8) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    match verbose {
        0 => {}
        1 => {
            builder.filter_level(log::LevelFilter::Debug);
        }
        _ => {
            builder.filter_level(log::LevelFilter::Trace);
        }
    }
    builder.init();
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    match path {
        Some(path) => Ok(AnalysisConfig::from_file(path)?),
        None => Ok(AnalysisConfig::default()),
    }
}

fn run_label(folder: &Path) -> String {
    folder
        .file_name()
        .map_or_else(|| folder.display().to_string(), |name| name.to_string_lossy().into_owned())
}

fn open_run(folder: &Path, config: &AnalysisConfig) -> Result<RunCollection> {
    let start = Instant::now();
    let run = load_run(folder, config.segment_duration_s)?;
    log::info!(
        "loaded {} ({} files, {} hits, {} clusters) in {:.2}s",
        folder.display(),
        run.segments.len(),
        run.hits.len(),
        run.clusters.len(),
        start.elapsed().as_secs_f64()
    );
    Ok(run)
}

fn create_output(dir: &Path, name: &str) -> Result<ArtifactWriter> {
    std::fs::create_dir_all(dir)?;
    Ok(ArtifactWriter::create(dir.join(name))?)
}

/// Hits of an event file, or of every event file in a run folder.
fn load_hits(input: &Path, config: &AnalysisConfig) -> Result<Vec<Hit>> {
    if input.is_dir() {
        Ok(open_run(input, config)?.hits)
    } else {
        let hits = read_hits(input)?;
        log::info!("loaded {} ({} hits)", input.display(), hits.len());
        Ok(hits)
    }
}

/// One value per run: a single value is broadcast, an empty list keeps the default.
fn per_run(values: &[f64], runs: usize, default: f64, flag: &'static str) -> Result<Vec<f64>> {
    match values.len() {
        0 => Ok(vec![default; runs]),
        1 => Ok(vec![values[0]; runs]),
        n if n == runs => Ok(values.to_vec()),
        found => Err(CliError::PerRunValues { flag, runs, found }),
    }
}

fn print_gain_report(report: &GainReport) {
    match report.outcome.peak() {
        Some(peak) => println!(
            "{:<14} {:>8} clusters  mu = {:.1} +/- {:.1}  sigma = {:.1}",
            report.selection.label(),
            report.clusters,
            peak.mu.value,
            peak.mu.error,
            peak.sigma.value
        ),
        None => println!(
            "{:<14} {:>8} clusters  fit failed: {}",
            report.selection.label(),
            report.clusters,
            report.outcome.message().unwrap_or_default()
        ),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Gain { run, gain, regions } => {
            if let Some(duration) = run.segment_duration {
                config.segment_duration_s = duration;
            }
            config.gains = PlaneGains::new(
                gain.gain_x.unwrap_or(config.gains.x_mv_per_fc),
                gain.gain_y.unwrap_or(config.gains.y_mv_per_fc),
            )?;
            if let Some(sharing) = gain.sharing {
                config.sharing = sharing.into();
            }
            if !regions.is_empty() {
                config.regions = regions;
            }
            config.validate()?;

            let data = open_run(&run.run, &config)?;
            let label = run_label(&run.run);
            let selections: Vec<Selection> = std::iter::once(Selection::All)
                .chain(config.regions.iter().copied().map(Selection::Region))
                .collect();

            let mut reports = Vec::with_capacity(selections.len());
            for selection in selections {
                let report = analyze_gain(
                    &data.clusters,
                    &config.gains,
                    selection,
                    &config.fit,
                    config.sharing,
                );
                let name = selection.label();
                if let Some(hist) = &report.histogram {
                    create_output(&run.output, &format!("gain_{name}_hist.csv"))?
                        .write_density_histogram(hist)?;
                }
                if report.outcome.is_success() {
                    create_output(&run.output, &format!("gain_{name}_fit.csv"))?
                        .write_fit_curve(&report.fit_curve())?;
                }
                print_gain_report(&report);
                reports.push(report);
            }

            let rows: Vec<FitSummaryRow<'_>> = reports
                .iter()
                .map(|report| FitSummaryRow {
                    run: &label,
                    selection: report.selection.label(),
                    clusters: report.clusters,
                    outcome: &report.outcome,
                })
                .collect();
            create_output(&run.output, "fit_summary.csv")?.write_fit_summary(&rows)?;

            let failed = reports.iter().filter(|r| !r.outcome.is_success()).count();
            println!(
                "{} of {} gain fits succeeded",
                reports.len() - failed,
                reports.len()
            );
        }

        Commands::Rates { run } => {
            if let Some(duration) = run.segment_duration {
                config.segment_duration_s = duration;
            }
            config.validate()?;
            let data = open_run(&run.run, &config)?;
            let edges = config.strip_edges.edges()?;
            let duration = data.duration_s();

            for plane in Plane::BOTH {
                let rate = hit_rate(&data.hits, plane, &edges, duration)?;
                create_output(&run.output, &format!("hit_rate_{}.csv", plane.label()))?
                    .write_histogram(&rate, "rate_hz")?;
                println!("Plane {}: {:.3} hits/s", plane.label(), rate.total());
            }

            let map = cluster_rate_map(&data.clusters, &edges, duration)?;
            create_output(&run.output, "cluster_rate_map.csv")?.write_rate_map(&map)?;
            println!("Clusters: {:.3} /s", map.total());
        }

        Commands::Timeline { run } => {
            if let Some(duration) = run.segment_duration {
                config.segment_duration_s = duration;
            }
            config.validate()?;
            let data = open_run(&run.run, &config)?;
            let timeline = activity_timeline(&data);
            for point in timeline.iter().filter(|p| p.hits == 0) {
                log::warn!(
                    "segment {} ({}) has no hits",
                    point.segment,
                    data.segments[point.segment].path.display()
                );
            }
            create_output(&run.output, "activity.csv")?.write_timeline(&timeline)?;
            println!(
                "{} segments over {:.0}s",
                timeline.len(),
                data.duration_s()
            );
        }

        Commands::Noisy {
            run,
            vmm_count,
            threshold,
        } => {
            if let Some(duration) = run.segment_duration {
                config.segment_duration_s = duration;
            }
            if let Some(vmm_count) = vmm_count {
                config.noise.vmm_count = vmm_count;
            }
            if let Some(threshold) = threshold {
                config.noise.threshold = threshold;
            }
            config.validate()?;
            let data = open_run(&run.run, &config)?;

            let counts: Vec<_> = (0..config.noise.vmm_count)
                .map(|vmm| (vmm, channel_counts(&data.hits, vmm)))
                .collect();
            create_output(&run.output, "channel_counts.csv")?.write_channel_counts(&counts)?;

            let noisy = noisy_channels(&data.hits, config.noise.vmm_count, config.noise.threshold);
            create_output(&run.output, "noisy_channels.csv")?.write_noisy_channels(&noisy)?;
            println!(
                "{} noisy channels (more than {} hits)",
                noisy.len(),
                config.noise.threshold
            );
            for n in &noisy {
                println!(
                    "  VMM {:>2} channel {:>2}: {}",
                    n.channel.vmm, n.channel.channel, n.count
                );
            }
        }

        Commands::BadChannels {
            pedestal,
            threshold,
            rule,
            offset,
            output,
        } => {
            if let Some(rule) = rule {
                config.qualifier.rule = rule;
            }
            if let Some(offset) = offset {
                config.qualifier.threshold_offset_mv = offset;
            }
            let calibrations = read_calibration(&pedestal, &threshold)?;
            let bad = find_bad_channels(
                &calibrations,
                config.qualifier.rule,
                &config.qualifier.limits,
            );
            create_output(&output, "bad_channels.csv")?.write_bad_channels(&bad)?;

            let profiles =
                threshold_profiles(&calibrations, config.qualifier.threshold_offset_mv);
            create_output(&output, "threshold_profiles.csv")?
                .write_threshold_profiles(&profiles)?;
            println!(
                "{} bad channels of {} ({} rule)",
                bad.len(),
                calibrations.len(),
                config.qualifier.rule
            );
        }

        Commands::Compare {
            runs,
            labels,
            gain_x,
            gain_y,
            segment_duration,
            output,
        } => {
            if let Some(duration) = segment_duration {
                config.segment_duration_s = duration;
            }
            config.validate()?;
            let gains_x = per_run(&gain_x, runs.len(), config.gains.x_mv_per_fc, "gain-x")?;
            let gains_y = per_run(&gain_y, runs.len(), config.gains.y_mv_per_fc, "gain-y")?;
            let edges = config.strip_edges.edges()?;

            let mut per_run_rates = Vec::with_capacity(runs.len());
            for (i, folder) in runs.iter().enumerate() {
                let label = labels.get(i).cloned().unwrap_or_else(|| run_label(folder));
                let gains = PlaneGains::new(gains_x[i], gains_y[i])?;
                let data = open_run(folder, &config)?;
                let duration = data.duration_s();

                for plane in Plane::BOTH {
                    let rate = hit_rate(&data.hits, plane, &edges, duration)?;
                    create_output(&output, &format!("hit_rate_{label}_{}.csv", plane.label()))?
                        .write_histogram(&rate, "rate_hz")?;
                }

                let rates = region_gain_rates(
                    &data.clusters,
                    &gains,
                    duration,
                    &config.regions,
                    &config.compare,
                    config.sharing,
                )?;
                for rate in &rates {
                    println!(
                        "Charge sharing for area {} with x={} mV/fC and y={} mV/fC: {:.4}",
                        rate.region, gains.x_mv_per_fc, gains.y_mv_per_fc, rate.charge_sharing
                    );
                }
                per_run_rates.push((label, rates));
            }

            create_output(&output, "gain_rates.csv")?.write_region_gain_rates(&per_run_rates)?;
            create_output(&output, "charge_sharing.csv")?.write_charge_sharing(&per_run_rates)?;
        }

        Commands::Sources {
            inputs,
            labels,
            fields,
            bins,
            output,
        } => {
            let fields = if fields.is_empty() {
                HitField::ALL.to_vec()
            } else {
                fields
            };
            let runs: Vec<String> = inputs
                .iter()
                .enumerate()
                .map(|(i, input)| labels.get(i).cloned().unwrap_or_else(|| run_label(input)))
                .collect();
            let hits = inputs
                .iter()
                .map(|input| load_hits(input, &config))
                .collect::<Result<Vec<_>>>()?;
            let slices: Vec<&[Hit]> = hits.iter().map(Vec::as_slice).collect();

            let mut histograms = Vec::with_capacity(fields.len());
            for field in fields {
                histograms.push((field, field_histograms(&slices, field, bins)?));
            }
            create_output(&output, "field_histograms.csv")?
                .write_field_histograms(&runs, &histograms)?;
            for (run, hits) in runs.iter().zip(&hits) {
                println!("{:<20} {:>10} hits", run, hits.len());
            }
            println!("{} fields x {} bins", histograms.len(), bins);
        }

        Commands::Convert {
            input,
            executable,
            geometry,
            calibration,
        } => {
            if let Some(executable) = executable {
                config.converter.executable = executable;
            }
            if let Some(geometry) = geometry {
                config.converter.geometry = geometry;
            }
            if let Some(calibration) = calibration {
                config.converter.calibration = calibration;
            }
            let converter = Converter::new(config.converter.clone());
            let inputs = converter.discover_inputs(&input)?;
            if inputs.is_empty() {
                log::warn!(
                    "no .{} files in {}",
                    config.converter.input_extension,
                    input.display()
                );
            }

            let start = Instant::now();
            let report = converter.convert_all(&inputs);
            println!(
                "Converted {} of {} files in {:.2}s",
                report.converted.len(),
                inputs.len(),
                start.elapsed().as_secs_f64()
            );
            if !report.is_success() {
                for (path, err) in &report.failed {
                    eprintln!("  {}: {}", path.display(), err);
                }
                return Err(CliError::Conversion {
                    failed: report.failed.len(),
                    total: inputs.len(),
                });
            }
        }

        Commands::Info {
            run,
            segment_duration,
        } => {
            if let Some(duration) = segment_duration {
                config.segment_duration_s = duration;
            }
            config.validate()?;
            let data = open_run(&run, &config)?;

            println!("Run: {}", run.display());
            println!(
                "Segments: {} x {:.0}s = {:.0}s",
                data.segments.len(),
                data.segment_duration_s(),
                data.duration_s()
            );
            for plane in Plane::BOTH {
                println!("Hits ({}): {}", plane.label(), data.hits_on(plane).count());
            }
            println!("Clusters: {}", data.clusters.len());
            for region in Region::ALL {
                let n = data.clusters.iter().filter(|c| region.contains(c)).count();
                println!("  region {:<13} {}", region.name(), n);
            }
        }

        Commands::Config => {
            config.validate()?;
            println!("{}", config.to_json()?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_gain_arguments_parse() {
        let cli = Cli::try_parse_from([
            "vmmana", "-v", "gain", "runs/16mV", "--gain-x", "12", "-r", "a", "-r", "bottom-left",
            "--sharing", "propagate",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Gain { run, gain, regions } => {
                assert_eq!(run.run, PathBuf::from("runs/16mV"));
                assert_eq!(gain.gain_x, Some(12.0));
                assert_eq!(regions, vec![Region::A, Region::BottomLeft]);
                assert!(matches!(gain.sharing, Some(Sharing::Propagate)));
            }
            _ => panic!("expected gain"),
        }
    }

    #[test]
    fn test_unknown_region_rejected() {
        assert!(Cli::try_parse_from(["vmmana", "gain", "run", "-r", "e"]).is_err());
    }

    #[test]
    fn test_bad_channel_rule_parse() {
        let cli = Cli::try_parse_from([
            "vmmana",
            "bad-channels",
            "--pedestal",
            "ped.csv",
            "--threshold",
            "thr.csv",
            "--rule",
            "basic",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::BadChannels {
                rule: Some(BadChannelRule::Basic),
                ..
            }
        ));
    }

    #[test]
    fn test_sources_arguments_parse() {
        let cli = Cli::try_parse_from([
            "vmmana", "sources", "before.h5", "source.h5", "after.h5", "-f", "adc", "-f",
            "chip_time", "--bins", "50",
        ])
        .unwrap();
        match cli.command {
            Commands::Sources {
                inputs,
                fields,
                bins,
                ..
            } => {
                assert_eq!(inputs.len(), 3);
                assert_eq!(fields, vec![HitField::Adc, HitField::ChipTime]);
                assert_eq!(bins, 50);
            }
            _ => panic!("expected sources"),
        }
        assert!(Cli::try_parse_from(["vmmana", "sources", "a.h5", "-f", "charge"]).is_err());
    }

    #[test]
    fn test_per_run_values() {
        assert_eq!(per_run(&[], 2, 16.0, "gain-x").unwrap(), vec![16.0, 16.0]);
        assert_eq!(per_run(&[12.0], 2, 16.0, "gain-x").unwrap(), vec![12.0, 12.0]);
        assert_eq!(per_run(&[12.0, 9.0], 2, 16.0, "gain-x").unwrap(), vec![12.0, 9.0]);
        assert!(matches!(
            per_run(&[1.0, 2.0, 3.0], 2, 16.0, "gain-x"),
            Err(CliError::PerRunValues { found: 3, .. })
        ));
    }
}
