use flightwx::{
    discover_files, init_logging, load_dataset, log_job_finish, log_job_start,
    log_pipeline_config, logging_config_from_env, pipeline_config_from_env, Dataset, Store,
};

const JOB: &str = "load_raw_data";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_job_start(JOB, &logging_cfg);

    let cfg = pipeline_config_from_env();
    log_pipeline_config(JOB, &cfg);

    let mut store = Store::open(&cfg.store_path)?;
    let load_cfg = cfg.load_config();

    let mut reports = Vec::with_capacity(Dataset::ALL.len());
    for dataset in Dataset::ALL {
        let files = discover_files(&cfg.raw_root, dataset)?;
        reports.push(load_dataset(&mut store, dataset, &files, &load_cfg)?);
    }

    let failures: usize = reports.iter().map(|r| r.failures.len()).sum();
    println!("{}", serde_json::to_string_pretty(&reports)?);
    log_job_finish(JOB, failures);

    if failures > 0 {
        return Err(format!("{failures} file(s) failed to load").into());
    }
    Ok(())
}
