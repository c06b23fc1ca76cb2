use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use csv::ReaderBuilder;
use image::{GrayImage, ImageReader};
use nalgebra::Vector3;
use serde::Deserialize;
use tracing::{info, warn};

use crate::geometry::CameraExtrinsics;
use crate::imu::ImuSample;

#[derive(Debug, Clone)]
pub struct ImageEntry {
    pub timestamp_ns: u64,
    pub filename: String,
}

#[derive(Debug, Clone)]
pub struct ImuEntry {
    pub timestamp_ns: u64,
    pub sample: ImuSample,
}

/// EuRoC `mav0` directory: IMU stream, per-camera frame lists and extrinsics.
#[derive(Debug)]
pub struct EurocDataset {
    dataset_path: PathBuf,
    pub camera_entries: Vec<Vec<ImageEntry>>,
    pub imu_entries: Vec<ImuEntry>,
    pub camera_extrinsics: Vec<CameraExtrinsics>,
}

impl EurocDataset {
    /// Load `imu0` and `cam0..cam{num_cameras-1}`.
    pub fn new<P: AsRef<Path>>(root: P, num_cameras: usize) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if num_cameras == 0 {
            bail!("At least one camera is required");
        }

        let imu_entries = load_imu_list(root.join("imu0/data.csv"))?;
        let camera_extrinsics = load_camera_extrinsics(&root, num_cameras)?;

        // Frame lists are optional: extrinsics and IMU alone bootstrap a filter
        let mut camera_entries = Vec::with_capacity(num_cameras);
        for cam in 0..num_cameras {
            let entries = load_image_list(root.join(format!("cam{cam}/data.csv")))
                .unwrap_or_else(|e| {
                    warn!("Could not load frame list for cam{}: {}", cam, e);
                    Vec::new()
                });
            camera_entries.push(entries);
        }

        info!(
            "Loaded EuRoC sequence {:?}: {} IMU samples, {} cameras",
            root,
            imu_entries.len(),
            num_cameras
        );

        Ok(Self {
            dataset_path: root,
            camera_entries,
            imu_entries,
            camera_extrinsics,
        })
    }

    pub fn num_cameras(&self) -> usize {
        self.camera_extrinsics.len()
    }

    pub fn first_imu(&self) -> Option<&ImuEntry> {
        self.imu_entries.first()
    }

    /// Get IMU samples between two timestamps (inclusive).
    pub fn imu_between(&self, t_ns_start: u64, t_ns_end: u64) -> Vec<ImuEntry> {
        let start = self
            .imu_entries
            .partition_point(|e| e.timestamp_ns < t_ns_start);
        let end = self
            .imu_entries
            .partition_point(|e| e.timestamp_ns <= t_ns_end);
        self.imu_entries[start..end.max(start)].to_vec()
    }

    /// Decode frame `idx` of camera `cam` as 8-bit grayscale.
    pub fn frame(&self, cam: usize, idx: usize) -> Result<(u64, GrayImage)> {
        let entry = self
            .camera_entries
            .get(cam)
            .and_then(|entries| entries.get(idx))
            .with_context(|| format!("No frame {} for cam{}", idx, cam))?;
        let path = self
            .dataset_path
            .join(format!("cam{cam}/data"))
            .join(&entry.filename);
        let image = ImageReader::open(&path)
            .with_context(|| format!("Failed to open image {:?}", path))?
            .decode()
            .with_context(|| format!("Failed to decode image {:?}", path))?;
        Ok((entry.timestamp_ns, image.to_luma8()))
    }
}

fn load_image_list(csv_path: PathBuf) -> Result<Vec<ImageEntry>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .from_path(&csv_path)
        .with_context(|| format!("Failed to open {}", csv_path.display()))?;

    let mut entries = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        if rec.len() < 2 {
            continue;
        }
        entries.push(ImageEntry {
            timestamp_ns: rec[0].trim().parse()?,
            filename: rec[1].trim().to_string(),
        });
    }
    Ok(entries)
}

/// `imu0/data.csv`: timestamp [ns], w_x, w_y, w_z [rad/s], a_x, a_y, a_z [m/s^2].
pub fn load_imu_list(csv_path: PathBuf) -> Result<Vec<ImuEntry>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .from_path(&csv_path)
        .with_context(|| format!("Failed to open {}", csv_path.display()))?;

    let mut entries = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        if rec.len() < 7 {
            continue;
        }
        let ts: u64 = rec[0].trim().parse()?;
        let field = |i: usize| -> Result<f64> {
            rec[i]
                .trim()
                .parse()
                .with_context(|| format!("Bad IMU value {:?} at t={}", &rec[i], ts))
        };
        let gyro = Vector3::new(field(1)?, field(2)?, field(3)?);
        let accel = Vector3::new(field(4)?, field(5)?, field(6)?);
        entries.push(ImuEntry {
            timestamp_ns: ts,
            sample: ImuSample {
                timestamp_s: ts as f64 * 1e-9,
                accel,
                gyro,
            },
        });
    }
    Ok(entries)
}

/// EuRoC T_BS transform format: has cols, rows, data fields
#[derive(Debug, Deserialize)]
struct TransformYaml {
    data: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct CameraYaml {
    #[serde(rename = "T_BS")]
    t_bs: TransformYaml,
}

/// Read `cam{i}/sensor.yaml` for each camera.
pub fn load_camera_extrinsics(root: &Path, num_cameras: usize) -> Result<Vec<CameraExtrinsics>> {
    (0..num_cameras)
        .map(|cam| {
            let path = root.join(format!("cam{cam}/sensor.yaml"));
            let yaml: CameraYaml = serde_yaml::from_reader(
                File::open(&path).with_context(|| format!("Failed to open {:?}", path))?,
            )
            .with_context(|| format!("Failed to parse {:?}", path))?;
            CameraExtrinsics::from_row_major(&yaml.t_bs.data)
                .with_context(|| format!("Invalid T_BS in {:?}", path))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::fs;

    const IMU_CSV: &str = "\
#timestamp [ns],w_RS_S_x [rad s^-1],w_RS_S_y [rad s^-1],w_RS_S_z [rad s^-1],a_RS_S_x [m s^-2],a_RS_S_y [m s^-2],a_RS_S_z [m s^-2]
1403636579758555392,-0.099134701513277898,0.14730578886832138,0.02722713633111154,8.1476917083333333,-0.37592158333333331,-2.4026292499999999
1403636579763555584,-0.099134701513277898,0.14032447186034408,0.029321531433504733,8.033280791666666,-0.40861041666666664,-2.4026292499999999
1403636579768555520,-0.098436569812480182,0.12775810124598494,0.037699111843077518,7.8861810416666662,-0.42495483333333334,-2.4271458749999999
";

    const CAM_YAML: &str = "\
sensor_type: camera
comment: VI-Sensor cam0 (MT9M034)
T_BS:
  cols: 4
  rows: 4
  data: [0.0148655429818, -0.999880929698, 0.00414029679422, -0.0216401454975,
         0.999557249008, 0.0149672133247, 0.025715529948, -0.064676986768,
        -0.0257744366974, 0.00375618835797, 0.999660727178, 0.00981073058949,
         0.0, 0.0, 0.0, 1.0]
rate_hz: 20
";

    fn write_sequence(dir: &Path) {
        fs::create_dir_all(dir.join("imu0")).unwrap();
        fs::create_dir_all(dir.join("cam0/data")).unwrap();
        fs::write(dir.join("imu0/data.csv"), IMU_CSV).unwrap();
        fs::write(dir.join("cam0/sensor.yaml"), CAM_YAML).unwrap();
        fs::write(
            dir.join("cam0/data.csv"),
            "#timestamp [ns],filename\n1403636579763555584,1403636579763555584.png\n",
        )
        .unwrap();
        GrayImage::from_pixel(4, 3, image::Luma([128u8]))
            .save(dir.join("cam0/data/1403636579763555584.png"))
            .unwrap();
    }

    #[test]
    fn test_load_sequence() {
        let dir = tempfile::tempdir().unwrap();
        write_sequence(dir.path());

        let dataset = EurocDataset::new(dir.path(), 1).unwrap();
        assert_eq!(dataset.imu_entries.len(), 3);
        assert_eq!(dataset.num_cameras(), 1);

        let first = dataset.first_imu().unwrap();
        assert_eq!(first.timestamp_ns, 1403636579758555392);
        assert_relative_eq!(first.sample.accel.x, 8.1476917083333333, epsilon = 1e-12);
        assert_relative_eq!(first.sample.gyro.z, 0.02722713633111154, epsilon = 1e-12);

        let ext = &dataset.camera_extrinsics[0];
        assert_relative_eq!(ext.translation.y, -0.064676986768, epsilon = 1e-12);

        let (ts, frame) = dataset.frame(0, 0).unwrap();
        assert_eq!(ts, 1403636579763555584);
        assert_eq!(frame.dimensions(), (4, 3));
        assert!(dataset.frame(0, 1).is_err());
    }

    #[test]
    fn test_imu_between_is_inclusive() {
        let dir = tempfile::tempdir().unwrap();
        write_sequence(dir.path());
        let dataset = EurocDataset::new(dir.path(), 1).unwrap();

        let window = dataset.imu_between(1403636579763555584, 1403636579768555520);
        assert_eq!(window.len(), 2);
        assert!(dataset.imu_between(10, 20).is_empty());
        assert!(dataset.imu_between(20, 10).is_empty());
    }

    #[test]
    fn test_missing_camera_yaml_fails() {
        let dir = tempfile::tempdir().unwrap();
        write_sequence(dir.path());
        let err = EurocDataset::new(dir.path(), 2).unwrap_err();
        assert!(format!("{err:#}").contains("cam1/sensor.yaml"));
    }
}
