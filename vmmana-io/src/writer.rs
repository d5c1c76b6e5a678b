//! CSV writers for analysis artifacts.
//!
//! Every artifact is a plain table that a plotting tool can consume directly.
//! Files are overwritten.

use crate::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use vmmana_algorithms::{
    ActivityPoint, FitOutcome, Histogram1D, Histogram2D, NoisyChannel, RegionGainRate,
    ThresholdProfile, FIT_COLUMNS,
};
use vmmana_core::{BadChannel, HitField, CHANNELS_PER_VMM};

/// One row of a fit summary table.
#[derive(Debug, Clone, Copy)]
pub struct FitSummaryRow<'a> {
    /// Run or file label.
    pub run: &'a str,
    /// Selection label (`all_areas` or a region name).
    pub selection: &'a str,
    pub clusters: usize,
    pub outcome: &'a FitOutcome,
}

/// Writer for CSV artifacts.
pub struct ArtifactWriter {
    writer: BufWriter<File>,
}

impl ArtifactWriter {
    /// Creates (or truncates) the artifact file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        Ok(Self { writer })
    }

    /// Writes a 1D histogram as `bin_low,bin_high,center,<value_name>`.
    ///
    /// # Errors
    /// Returns an error on write failure.
    pub fn write_histogram(&mut self, hist: &Histogram1D, value_name: &str) -> Result<()> {
        writeln!(self.writer, "bin_low,bin_high,center,{value_name}")?;
        for ((edges, center), value) in hist
            .edges()
            .windows(2)
            .zip(hist.centers())
            .zip(hist.counts())
        {
            writeln!(self.writer, "{},{},{},{}", edges[0], edges[1], center, value)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Writes a histogram with raw counts and density.
    ///
    /// # Errors
    /// Returns an error on write failure.
    pub fn write_density_histogram(&mut self, hist: &Histogram1D) -> Result<()> {
        writeln!(self.writer, "bin_low,bin_high,center,count,density")?;
        for (((edges, center), count), density) in hist
            .edges()
            .windows(2)
            .zip(hist.centers())
            .zip(hist.counts())
            .zip(hist.density())
        {
            writeln!(
                self.writer,
                "{},{},{},{},{}",
                edges[0], edges[1], center, count, density
            )?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Writes measured and fitted densities at the bin centres.
    ///
    /// # Errors
    /// Returns an error on write failure.
    pub fn write_fit_curve(&mut self, rows: &[(f64, f64, f64)]) -> Result<()> {
        writeln!(self.writer, "center,measured_density,fitted_density")?;
        for (center, measured, fitted) in rows {
            writeln!(self.writer, "{center},{measured},{fitted}")?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Writes the non-empty cells of a 2D rate map.
    ///
    /// # Errors
    /// Returns an error on write failure.
    pub fn write_rate_map(&mut self, map: &Histogram2D) -> Result<()> {
        writeln!(self.writer, "pos0,pos1,rate")?;
        let center = |edges: &[f64], i: usize| 0.5 * (edges[i] + edges[i + 1]);
        for ((i, j), &rate) in map.counts().indexed_iter() {
            if rate != 0.0 {
                writeln!(
                    self.writer,
                    "{},{},{}",
                    center(map.x_edges(), i),
                    center(map.y_edges(), j),
                    rate
                )?;
            }
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Writes fit summaries, one row per run and selection.
    ///
    /// Failed fits have NaN values and the failure reason in `message`.
    ///
    /// # Errors
    /// Returns an error on write failure.
    pub fn write_fit_summary(&mut self, rows: &[FitSummaryRow<'_>]) -> Result<()> {
        writeln!(
            self.writer,
            "run,selection,clusters,status,{},message",
            FIT_COLUMNS.join(",")
        )?;
        for row in rows {
            let values: Vec<String> = row
                .outcome
                .values()
                .iter()
                .map(ToString::to_string)
                .collect();
            let status = if row.outcome.is_success() { "ok" } else { "failed" };
            let message = row.outcome.message().unwrap_or_default().replace(',', ";");
            writeln!(
                self.writer,
                "{},{},{},{},{},{}",
                row.run,
                row.selection,
                row.clusters,
                status,
                values.join(","),
                message
            )?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Writes per-segment activity.
    ///
    /// # Errors
    /// Returns an error on write failure.
    pub fn write_timeline(&mut self, points: &[ActivityPoint]) -> Result<()> {
        writeln!(self.writer, "segment,elapsed_s,hits,clusters")?;
        for p in points {
            writeln!(
                self.writer,
                "{},{},{},{}",
                p.segment, p.elapsed_s, p.hits, p.clusters
            )?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Writes per-channel hit counts for several chips.
    ///
    /// # Errors
    /// Returns an error on write failure.
    pub fn write_channel_counts(&mut self, counts: &[(u8, [u64; CHANNELS_PER_VMM])]) -> Result<()> {
        writeln!(self.writer, "VMM,Channel,Count")?;
        for (vmm, channels) in counts {
            for (channel, count) in channels.iter().enumerate() {
                writeln!(self.writer, "{vmm},{channel},{count}")?;
            }
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Writes noisy channels with their hit counts.
    ///
    /// # Errors
    /// Returns an error on write failure.
    pub fn write_noisy_channels(&mut self, noisy: &[NoisyChannel]) -> Result<()> {
        writeln!(self.writer, "VMM,Channel,Count")?;
        for n in noisy {
            writeln!(
                self.writer,
                "{},{},{}",
                n.channel.vmm, n.channel.channel, n.count
            )?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Writes the bad channel list.
    ///
    /// # Errors
    /// Returns an error on write failure.
    pub fn write_bad_channels(&mut self, channels: &[BadChannel]) -> Result<()> {
        writeln!(self.writer, "VMM,Channel")?;
        for c in channels {
            writeln!(self.writer, "{},{}", c.vmm, c.channel)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Writes threshold profiles of every chip.
    ///
    /// # Errors
    /// Returns an error on write failure.
    pub fn write_threshold_profiles(&mut self, profiles: &[ThresholdProfile]) -> Result<()> {
        writeln!(
            self.writer,
            "vmm,channel,pedestal_mv,threshold_mv,expected_threshold_mv"
        )?;
        for profile in profiles {
            for p in &profile.points {
                writeln!(
                    self.writer,
                    "{},{},{},{},{}",
                    profile.vmm, p.channel, p.pedestal_mv, p.threshold_mv, p.expected_threshold_mv
                )?;
            }
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Writes per-region gain rate histograms of several runs in long form.
    ///
    /// # Errors
    /// Returns an error on write failure.
    pub fn write_region_gain_rates(
        &mut self,
        runs: &[(String, Vec<RegionGainRate>)],
    ) -> Result<()> {
        writeln!(self.writer, "run,region,bin_low,bin_high,center,rate")?;
        for (run, rates) in runs {
            for rate in rates {
                let hist = &rate.histogram;
                for ((edges, center), value) in hist
                    .edges()
                    .windows(2)
                    .zip(hist.centers())
                    .zip(hist.counts())
                {
                    writeln!(
                        self.writer,
                        "{run},{},{},{},{center},{value}",
                        rate.region, edges[0], edges[1]
                    )?;
                }
            }
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Writes hit field distributions of several runs in long form.
    ///
    /// Each field entry holds one histogram per run, parallel with `runs`.
    ///
    /// # Errors
    /// Returns an error on write failure.
    pub fn write_field_histograms(
        &mut self,
        runs: &[String],
        fields: &[(HitField, Vec<Histogram1D>)],
    ) -> Result<()> {
        writeln!(self.writer, "field,run,bin_low,bin_high,center,count")?;
        for (field, hists) in fields {
            for (run, hist) in runs.iter().zip(hists) {
                for ((edges, center), count) in hist
                    .edges()
                    .windows(2)
                    .zip(hist.centers())
                    .zip(hist.counts())
                {
                    writeln!(
                        self.writer,
                        "{field},{run},{},{},{center},{count}",
                        edges[0], edges[1]
                    )?;
                }
            }
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Writes mean charge sharing per run and region.
    ///
    /// # Errors
    /// Returns an error on write failure.
    pub fn write_charge_sharing(&mut self, runs: &[(String, Vec<RegionGainRate>)]) -> Result<()> {
        writeln!(self.writer, "run,region,charge_sharing")?;
        for (run, rates) in runs {
            for rate in rates {
                writeln!(self.writer, "{run},{},{}", rate.region, rate.charge_sharing)?;
            }
        }
        self.writer.flush()?;
        Ok(())
    }
}
