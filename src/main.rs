use anyhow::{Context, Result};
use nalgebra::Vector3;

use vio_filter_state::filter::{FilterSnapshot, FilterState, SharedFilterState};
use vio_filter_state::io::euroc::EurocDataset;
use vio_filter_state::state::{PredictionInput, PredictionNoise};
use vio_filter_state::{DepthMap, FilterConfig};

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => FilterConfig::from_yaml_file(&path)?,
        None => {
            println!("No configuration given, using defaults");
            FilterConfig::default()
        }
    };
    let dataset_path = args.next();

    let mut filter = FilterState::from_config(&config)?;
    println!(
        "Filter state: {} cameras, {} feature slots, covariance {}x{}",
        filter.state.n_cam(),
        filter.state.n_max(),
        filter.dimension(),
        filter.dimension()
    );
    println!("{}", filter.layout().describe());

    let mut first_input = PredictionInput::new(Vector3::new(0.0, 0.0, 9.81), Vector3::zeros());
    if let Some(path) = dataset_path {
        println!("Loading EuRoC dataset from: {}", path);
        let dataset = EurocDataset::new(&path, config.num_cameras)?;
        println!(
            "Loaded {} IMU samples, {} frames for cam0",
            dataset.imu_entries.len(),
            dataset.camera_entries[0].len()
        );

        for (cam, ext) in dataset.camera_extrinsics.iter().enumerate() {
            *filter.state.estimated_extrinsics_mut(cam)? = *ext;
            filter.state.aux.set_fixed_extrinsics(cam, *ext)?;
            println!(
                "cam{} offset [{:.4}, {:.4}, {:.4}]",
                cam, ext.translation.x, ext.translation.y, ext.translation.z
            );
        }
        if let Some(entry) = dataset.first_imu() {
            first_input = PredictionInput::from(&entry.sample);
        }
        if !dataset.camera_entries[0].is_empty() {
            let (timestamp_ns, image) = dataset.frame(0, 0)?;
            filter.set_image(0, image, timestamp_ns as f64 * 1e-9)?;
        }
    }

    filter.initialize_from_accelerometer(&first_input.acceleration);
    let (roll, pitch, yaw) = filter.state.orientation().euler_angles();
    println!(
        "Initial attitude (roll, pitch, yaw): [{:.2}, {:.2}, {:.2}] deg",
        roll.to_degrees(),
        pitch.to_degrees(),
        yaw.to_degrees()
    );

    // Seed a few features on a small grid of bearings at the configured depth.
    let init = &config.feature_init;
    let depth_map = DepthMap::new(config.depth_type);
    let shared = SharedFilterState::new(filter);
    for (u, v) in [(-0.2, -0.1), (0.0, 0.0), (0.15, 0.2)] {
        shared.with_lock(|filter| -> Result<()> {
            let Some(slot) = filter.free_slot() else {
                return Ok(());
            };
            filter.initialize_feature(
                slot,
                &Vector3::new(u, v, 1.0),
                init.depth_parameter,
                &init.covariance(),
            )?;
            println!(
                "Feature {} at depth {:.3} m",
                slot,
                depth_map.depth(init.depth_parameter)
            );
            Ok(())
        })?;
    }

    let filter = shared
        .into_inner()
        .map_err(|_| anyhow::anyhow!("Filter still shared"))?;
    filter.check_covariance()?;
    println!("{} active features", filter.active_count());

    let noise = PredictionNoise::for_state(filter.layout());
    let q = noise.covariance(&config.process_noise, 0.005);
    println!("Process noise trace over 5 ms: {:.3e}", q.trace());

    let json = filter
        .snapshot()
        .to_json()
        .context("Failed to serialize filter snapshot")?;
    let restored = FilterState::restore(FilterSnapshot::from_json(&json)?)?;
    println!(
        "Snapshot round trip: {} bytes, {} active features restored",
        json.len(),
        restored.active_count()
    );

    Ok(())
}
