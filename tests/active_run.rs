use std::sync::Arc;

use nalgebra::Vector3;

use hoomd_md::config::{ActiveForceConfig, SimulationConfig};
use hoomd_md::evaluator::{EvaluatorLennardJones, LennardJonesParams};
use hoomd_md::execution::{ExecutionConfiguration, ExecutionMode};
use hoomd_md::force::{ActiveBackend, ActiveForceCompute, PotentialPair, ShiftMode};
use hoomd_md::integrator::Integrator;
use hoomd_md::particle_data::{Host, ParticleData};

fn positions_after(config: &SimulationConfig, steps: u64) -> (ActiveBackend, Vec<Vector3<f64>>) {
    let exec_conf = Arc::new(
        ExecutionConfiguration::from_mode(config.execution, config.num_workers, config.error_checking)
            .unwrap()
            .with_block_size(config.block_size),
    );
    let mut pdata = ParticleData::lattice(
        config.number_of_particles,
        config.sim_box().unwrap(),
        config.n_dimensions,
        config.temperature,
        config.seed,
    )
    .unwrap();

    let mut integrator = Integrator::new(config.dt).unwrap();
    let mut wca = PotentialPair::<EvaluatorLennardJones>::new(&pdata, ShiftMode::Shift);
    wca.set_params("A", "A", LennardJonesParams { epsilon: 1.0, sigma: 1.0 }, config.r_cut)
        .unwrap();
    integrator.add_force(Box::new(wca));

    let active = config.active.clone().unwrap();
    let f_lst = active.random_forces(pdata.n(), pdata.n_dimensions());
    let compute = ActiveForceCompute::new(exec_conf, &pdata, &f_lst, &active).unwrap();
    let backend = compute.backend();
    integrator.add_force(Box::new(compute));

    integrator.run(&mut pdata, steps).unwrap();
    let rtags = pdata.rtags().read::<Host>();
    let positions = pdata.positions().read::<Host>();
    (backend, (0..pdata.n()).map(|tag| positions[rtags[tag]]).collect())
}

fn active_config(execution: ExecutionMode) -> SimulationConfig {
    SimulationConfig {
        number_of_particles: 64,
        execution,
        block_size: 16,
        active: Some(ActiveForceConfig {
            rotation_diff: 0.5,
            magnitude: 2.0,
            seed: 11,
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[test]
fn host_and_device_trajectories_are_identical() {
    let (host_backend, host) = positions_after(&active_config(ExecutionMode::Cpu), 100);
    let (device_backend, device) = positions_after(&active_config(ExecutionMode::Gpu), 100);
    assert_eq!(host_backend, ActiveBackend::Host);
    assert_eq!(device_backend, ActiveBackend::Device);
    assert_eq!(host, device);
}

#[test]
fn active_particles_stay_in_plane() {
    let (_, positions) = positions_after(&active_config(ExecutionMode::Cpu), 100);
    assert!(positions.iter().all(|r| r.z == 0.0));
}

#[test]
fn config_file_round_trip() {
    let config = SimulationConfig {
        r_cut: 1.125,
        ..active_config(ExecutionMode::Gpu)
    };
    let path = std::env::temp_dir().join(format!("hoomd_md_active_{}.json", std::process::id()));
    std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
    let loaded = SimulationConfig::from_json_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(loaded, config);
}
