//! Active Brownian run driver.
//!
//! Usage: `hoomd_md [config.json]`. Without a path the defaults of
//! `SimulationConfig` are used (WCA particles on a square lattice, 2D).
//! Set `RUST_LOG=info` (or `debug`) to see the thermodynamic log.

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info};

use hoomd_md::config::SimulationConfig;
use hoomd_md::evaluator::{EvaluatorLennardJones, LennardJonesParams};
use hoomd_md::execution::ExecutionConfiguration;
use hoomd_md::force::{ActiveForceCompute, PotentialPair, ShiftMode};
use hoomd_md::integrator::Integrator;
use hoomd_md::particle_data::ParticleData;
use hoomd_md::MdResult;

fn run(config: &SimulationConfig) -> MdResult<()> {
    let exec_conf = Arc::new(
        ExecutionConfiguration::from_mode(config.execution, config.num_workers, config.error_checking)?
            .with_block_size(config.block_size),
    );
    let sim_box = config.sim_box()?;
    let mut pdata = ParticleData::lattice(
        config.number_of_particles,
        sim_box,
        config.n_dimensions,
        config.temperature,
        config.seed,
    )?;
    info!(
        "{} particles in {}D, box {:?}, execution {:?}",
        pdata.n(),
        pdata.n_dimensions(),
        sim_box.lengths(),
        exec_conf.mode()
    );

    let mut integrator = Integrator::new(config.dt)?.with_log_period(config.log_period);

    // purely repulsive when r_cut sits at the potential minimum
    let mut pair = PotentialPair::<EvaluatorLennardJones>::new(&pdata, ShiftMode::Shift).with_r_buff(config.r_buff);
    pair.set_params(
        "A",
        "A",
        LennardJonesParams {
            epsilon: config.epsilon,
            sigma: config.sigma,
        },
        config.r_cut,
    )?;
    integrator.add_force(Box::new(pair));

    if let Some(active) = &config.active {
        let f_lst = active.random_forces(pdata.n(), pdata.n_dimensions());
        let active_force = ActiveForceCompute::new(Arc::clone(&exec_conf), &pdata, &f_lst, active)?;
        info!("active force backend {:?}", active_force.backend());
        integrator.add_force(Box::new(active_force));
    }

    let thermo = integrator.run(&mut pdata, config.steps)?;
    info!(
        "final: timestep {}, KE {:.6}, PE {:.6}, T {:.4}",
        thermo.timestep, thermo.kinetic_energy, thermo.potential_energy, thermo.temperature
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let config = match env::args().nth(1) {
        Some(path) => SimulationConfig::from_json_file(path),
        None => Ok(SimulationConfig::default()),
    };
    let result = config.and_then(|config| run(&config));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
