//! HDF5 event files and run folders.
//!
//! An event file holds two groups, `hits` and `clusters_detector`, with one
//! 1-D dataset per record field. A run folder is a directory of such files
//! whose lexicographic order is the order they were taken in.
//!
//! Cluster positions must be finite. Whether they fall on the strip range is
//! left to the converter; out-of-range clusters simply land in no region.

use crate::{Error, Result};
use hdf5::types::H5Type;
use hdf5::{File, Group};
use ndarray::ArrayView1;
use std::path::{Path, PathBuf};
use vmmana_core::{Cluster, Hit, Plane, PlaneCluster, RunCollection};

/// Extension of event files inside a run folder.
pub const EVENT_FILE_EXTENSION: &str = "h5";

const HITS_GROUP: &str = "hits";
const CLUSTERS_GROUP: &str = "clusters_detector";

/// Hits and clusters of one event file.
#[derive(Debug, Clone, Default)]
pub struct EventFile {
    pub hits: Vec<Hit>,
    pub clusters: Vec<Cluster>,
}

/// Reads every column of a group, checking that all have the same length.
struct ColumnReader<'a> {
    group: &'a Group,
    label: &'static str,
    rows: Option<usize>,
}

impl<'a> ColumnReader<'a> {
    fn new(group: &'a Group, label: &'static str) -> Self {
        Self {
            group,
            label,
            rows: None,
        }
    }

    fn read<T: H5Type>(&mut self, name: &str) -> Result<Vec<T>> {
        let dataset = self.group.dataset(name)?;
        let values = if dataset.size() == 0 {
            Vec::new()
        } else {
            dataset.read_raw::<T>()?
        };
        match self.rows {
            None => self.rows = Some(values.len()),
            Some(rows) if rows != values.len() => {
                return Err(Error::InvalidFormat(format!(
                    "{}/{name} has {} rows, expected {rows}",
                    self.label,
                    values.len()
                )));
            }
            Some(_) => {}
        }
        Ok(values)
    }
}

fn read_hit_group(group: &Group) -> Result<Vec<Hit>> {
    let mut columns = ColumnReader::new(group, HITS_GROUP);
    let id = columns.read::<u64>("id")?;
    let det = columns.read::<u8>("det")?;
    let plane = columns.read::<u8>("plane")?;
    let fec = columns.read::<u8>("fec")?;
    let vmm = columns.read::<u8>("vmm")?;
    let ch = columns.read::<u8>("ch")?;
    let pos = columns.read::<f64>("pos")?;
    let time = columns.read::<f64>("time")?;
    let chip_time = columns.read::<f64>("chip_time")?;
    let adc = columns.read::<u16>("adc")?;
    let readout_time = columns.read::<f64>("readout_time")?;
    let bcid = columns.read::<u16>("bcid")?;
    let tdc = columns.read::<u16>("tdc")?;
    let over_threshold = columns.read::<u8>("over_threshold")?;

    (0..id.len())
        .map(|i| -> Result<Hit> {
            Ok(Hit {
                id: id[i],
                det: det[i],
                plane: Plane::try_from(plane[i])?,
                fec: fec[i],
                vmm: vmm[i],
                ch: ch[i],
                pos: pos[i],
                time: time[i],
                chip_time: chip_time[i],
                adc: adc[i],
                readout_time: readout_time[i],
                bcid: bcid[i],
                tdc: tdc[i],
                over_threshold: over_threshold[i] != 0,
            })
        })
        .collect()
}

fn read_cluster_group(group: &Group) -> Result<Vec<Cluster>> {
    let mut columns = ColumnReader::new(group, CLUSTERS_GROUP);
    let id = columns.read::<u64>("id")?;
    let det = columns.read::<u8>("det")?;
    let delta_plane = columns.read::<f64>("delta_plane")?;

    let mut planes = Vec::with_capacity(2);
    for plane in Plane::BOTH {
        let i = plane.index();
        planes.push(PlaneColumns {
            size: columns.read::<u16>(&format!("size{i}"))?,
            adc: columns.read::<f64>(&format!("adc{i}"))?,
            pos: columns.read::<f64>(&format!("pos{i}"))?,
            time: columns.read::<f64>(&format!("time{i}"))?,
            pos_utpc: columns.read::<f64>(&format!("pos{i}_utpc"))?,
            time_utpc: columns.read::<f64>(&format!("time{i}_utpc"))?,
            pos_charge2: columns.read::<f64>(&format!("pos{i}_charge2"))?,
            time_charge2: columns.read::<f64>(&format!("time{i}_charge2"))?,
        });
    }

    (0..id.len())
        .map(|i| {
            let cluster = Cluster {
                id: id[i],
                det: det[i],
                x: planes[0].row(i),
                y: planes[1].row(i),
                delta_plane: delta_plane[i],
            };
            if cluster.pos0().is_finite() && cluster.pos1().is_finite() {
                Ok(cluster)
            } else {
                Err(Error::InvalidFormat(format!(
                    "{CLUSTERS_GROUP} row {i} has position ({}, {})",
                    cluster.pos0(),
                    cluster.pos1()
                )))
            }
        })
        .collect()
}

/// Per-plane cluster columns.
#[derive(Default)]
struct PlaneColumns {
    size: Vec<u16>,
    adc: Vec<f64>,
    pos: Vec<f64>,
    time: Vec<f64>,
    pos_utpc: Vec<f64>,
    time_utpc: Vec<f64>,
    pos_charge2: Vec<f64>,
    time_charge2: Vec<f64>,
}

impl PlaneColumns {
    fn row(&self, i: usize) -> PlaneCluster {
        PlaneCluster {
            size: self.size[i],
            adc: self.adc[i],
            pos: self.pos[i],
            time: self.time[i],
            pos_utpc: self.pos_utpc[i],
            time_utpc: self.time_utpc[i],
            pos_charge2: self.pos_charge2[i],
            time_charge2: self.time_charge2[i],
        }
    }

    fn from_clusters(clusters: &[Cluster], plane: Plane) -> Self {
        let mut columns = Self::default();
        for cluster in clusters {
            let p = cluster.plane(plane);
            columns.size.push(p.size);
            columns.adc.push(p.adc);
            columns.pos.push(p.pos);
            columns.time.push(p.time);
            columns.pos_utpc.push(p.pos_utpc);
            columns.time_utpc.push(p.time_utpc);
            columns.pos_charge2.push(p.pos_charge2);
            columns.time_charge2.push(p.time_charge2);
        }
        columns
    }
}

/// Reads the hits of an event file.
///
/// # Errors
/// Returns an error if HDF5 I/O fails, columns differ in length or a plane
/// index is not 0 or 1.
pub fn read_hits<P: AsRef<Path>>(path: P) -> Result<Vec<Hit>> {
    let file = File::open(path)?;
    read_hit_group(&file.group(HITS_GROUP)?)
}

/// Reads the clusters of an event file.
///
/// # Errors
/// Returns an error if HDF5 I/O fails, columns differ in length or a
/// cluster position is not finite.
pub fn read_clusters<P: AsRef<Path>>(path: P) -> Result<Vec<Cluster>> {
    let file = File::open(path)?;
    read_cluster_group(&file.group(CLUSTERS_GROUP)?)
}

/// Reads hits and clusters of an event file.
///
/// # Errors
/// See [`read_hits`] and [`read_clusters`].
pub fn read_event_file<P: AsRef<Path>>(path: P) -> Result<EventFile> {
    let file = File::open(path)?;
    Ok(EventFile {
        hits: read_hit_group(&file.group(HITS_GROUP)?)?,
        clusters: read_cluster_group(&file.group(CLUSTERS_GROUP)?)?,
    })
}

fn write_column<T: H5Type>(group: &Group, name: &str, values: &[T]) -> Result<()> {
    let dataset = group.new_dataset::<T>().shape((values.len(),)).create(name)?;
    if !values.is_empty() {
        dataset.write(ArrayView1::from(values))?;
    }
    Ok(())
}

fn write_hit_group(group: &Group, hits: &[Hit]) -> Result<()> {
    fn column<T, F: Fn(&Hit) -> T>(hits: &[Hit], field: F) -> Vec<T> {
        hits.iter().map(field).collect()
    }
    write_column(group, "id", &column(hits, |h| h.id))?;
    write_column(group, "det", &column(hits, |h| h.det))?;
    write_column(group, "plane", &column(hits, |h| h.plane.index()))?;
    write_column(group, "fec", &column(hits, |h| h.fec))?;
    write_column(group, "vmm", &column(hits, |h| h.vmm))?;
    write_column(group, "ch", &column(hits, |h| h.ch))?;
    write_column(group, "pos", &column(hits, |h| h.pos))?;
    write_column(group, "time", &column(hits, |h| h.time))?;
    write_column(group, "chip_time", &column(hits, |h| h.chip_time))?;
    write_column(group, "adc", &column(hits, |h| h.adc))?;
    write_column(group, "readout_time", &column(hits, |h| h.readout_time))?;
    write_column(group, "bcid", &column(hits, |h| h.bcid))?;
    write_column(group, "tdc", &column(hits, |h| h.tdc))?;
    write_column(group, "over_threshold", &column(hits, |h| u8::from(h.over_threshold)))?;
    Ok(())
}

fn write_cluster_group(group: &Group, clusters: &[Cluster]) -> Result<()> {
    let id: Vec<u64> = clusters.iter().map(|c| c.id).collect();
    let det: Vec<u8> = clusters.iter().map(|c| c.det).collect();
    let delta_plane: Vec<f64> = clusters.iter().map(|c| c.delta_plane).collect();
    write_column(group, "id", &id)?;
    write_column(group, "det", &det)?;
    write_column(group, "delta_plane", &delta_plane)?;

    for plane in Plane::BOTH {
        let i = plane.index();
        let columns = PlaneColumns::from_clusters(clusters, plane);
        write_column(group, &format!("size{i}"), &columns.size)?;
        write_column(group, &format!("adc{i}"), &columns.adc)?;
        write_column(group, &format!("pos{i}"), &columns.pos)?;
        write_column(group, &format!("time{i}"), &columns.time)?;
        write_column(group, &format!("pos{i}_utpc"), &columns.pos_utpc)?;
        write_column(group, &format!("time{i}_utpc"), &columns.time_utpc)?;
        write_column(group, &format!("pos{i}_charge2"), &columns.pos_charge2)?;
        write_column(group, &format!("time{i}_charge2"), &columns.time_charge2)?;
    }
    Ok(())
}

/// Writes hits and clusters as an event file, replacing any existing file.
///
/// # Errors
/// Returns an error if the file or datasets cannot be created.
pub fn write_event_file<P: AsRef<Path>>(path: P, hits: &[Hit], clusters: &[Cluster]) -> Result<()> {
    let file = File::create(path)?;
    write_hit_group(&file.create_group(HITS_GROUP)?, hits)?;
    write_cluster_group(&file.create_group(CLUSTERS_GROUP)?, clusters)?;
    Ok(())
}

/// Event files of a run folder in lexicographic order.
///
/// # Errors
/// Returns `NoRunFiles` if the folder holds no event files.
pub fn discover_run_files<P: AsRef<Path>>(folder: P) -> Result<Vec<PathBuf>> {
    let folder = folder.as_ref();
    let mut files = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let path = entry?.path();
        let is_event_file = path.is_file()
            && path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(EVENT_FILE_EXTENSION));
        if is_event_file {
            files.push(path);
        }
    }
    if files.is_empty() {
        return Err(Error::NoRunFiles(folder.to_path_buf()));
    }
    files.sort();
    Ok(files)
}

/// Loads every event file of a run folder.
///
/// # Errors
/// Returns an error if the folder is empty or any file fails to load.
pub fn load_run<P: AsRef<Path>>(folder: P, segment_duration_s: f64) -> Result<RunCollection> {
    let mut run = RunCollection::new(segment_duration_s)?;
    for path in discover_run_files(&folder)? {
        let EventFile { hits, clusters } = read_event_file(&path)?;
        log::debug!(
            "{}: {} hits, {} clusters",
            path.display(),
            hits.len(),
            clusters.len()
        );
        run.push_segment(path, hits, clusters);
    }
    log::info!(
        "loaded {} segments from {} ({} hits, {} clusters, {:.0} s)",
        run.segments.len(),
        folder.as_ref().display(),
        run.hits.len(),
        run.clusters.len(),
        run.duration_s()
    );
    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, NamedTempFile};

    fn sample_hits() -> Vec<Hit> {
        let mut hits = vec![
            Hit::new(Plane::X, 10, 3, 203.0, 512),
            Hit::new(Plane::Y, 2, 63, 127.5, 80),
        ];
        hits[1].id = 9;
        hits[1].bcid = 1200;
        hits[1].over_threshold = false;
        hits
    }

    fn sample_clusters() -> Vec<Cluster> {
        let mut cluster = Cluster::new(300.0, 190.0, 1500.0, 700.0);
        cluster.x.size = 4;
        cluster.y.pos_utpc = 189.5;
        cluster.delta_plane = -25.0;
        vec![cluster, Cluster::new(160.0, 160.0, 10.0, 20.0)]
    }

    #[test]
    fn test_event_file_preserves_records() {
        let file = NamedTempFile::new().unwrap();
        write_event_file(file.path(), &sample_hits(), &sample_clusters()).unwrap();

        let event_file = read_event_file(file.path()).unwrap();
        assert_eq!(event_file.hits, sample_hits());
        assert_eq!(event_file.clusters, sample_clusters());
        assert_eq!(read_hits(file.path()).unwrap().len(), 2);
        assert_eq!(read_clusters(file.path()).unwrap().len(), 2);
    }

    #[test]
    fn test_empty_event_file() {
        let file = NamedTempFile::new().unwrap();
        write_event_file(file.path(), &[], &[]).unwrap();
        let event_file = read_event_file(file.path()).unwrap();
        assert!(event_file.hits.is_empty());
        assert!(event_file.clusters.is_empty());
    }

    #[test]
    fn test_invalid_plane_rejected() {
        let file = NamedTempFile::new().unwrap();
        write_event_file(file.path(), &sample_hits(), &[]).unwrap();
        {
            let h5 = File::open_rw(file.path()).unwrap();
            let group = h5.group(HITS_GROUP).unwrap();
            group.unlink("plane").unwrap();
            write_column(&group, "plane", &[0u8, 2u8]).unwrap();
        }
        assert!(matches!(
            read_hits(file.path()),
            Err(Error::CoreError(vmmana_core::Error::InvalidPlane(2)))
        ));
    }

    #[test]
    fn test_ragged_columns_rejected() {
        let file = NamedTempFile::new().unwrap();
        write_event_file(file.path(), &sample_hits(), &[]).unwrap();
        {
            let h5 = File::open_rw(file.path()).unwrap();
            let group = h5.group(HITS_GROUP).unwrap();
            group.unlink("adc").unwrap();
            write_column(&group, "adc", &[1u16]).unwrap();
        }
        assert!(matches!(
            read_hits(file.path()),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_non_finite_cluster_position_rejected() {
        let file = NamedTempFile::new().unwrap();
        let clusters = vec![
            Cluster::new(300.0, 300.0, 100.0, 50.0),
            Cluster::new(f64::NAN, 200.0, 100.0, 50.0),
        ];
        write_event_file(file.path(), &[], &clusters).unwrap();
        assert!(matches!(
            read_clusters(file.path()),
            Err(Error::InvalidFormat(message)) if message.contains("row 1")
        ));
    }

    #[test]
    fn test_discover_run_files_sorted() {
        let dir = tempdir().unwrap();
        for name in ["run_0002.h5", "run_0000.h5", "run_0001.h5"] {
            write_event_file(dir.path().join(name), &[], &[]).unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "not an event file").unwrap();

        let files = discover_run_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["run_0000.h5", "run_0001.h5", "run_0002.h5"]);
    }

    #[test]
    fn test_empty_folder_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            discover_run_files(dir.path()),
            Err(Error::NoRunFiles(_))
        ));
        assert!(load_run(dir.path(), 600.0).is_err());
    }
}
