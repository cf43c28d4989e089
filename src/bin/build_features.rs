use flightwx::{
    apply_delay_status, flight_and_delay_summary_by_airport, init_logging, log_job_finish,
    log_job_start, log_pipeline_config, logging_config_from_env, pipeline_config_from_env,
    rebuild_congestion_tables, rebuild_feature_table, Store,
};
use serde_json::json;

const JOB: &str = "build_features";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_job_start(JOB, &logging_cfg);

    let cfg = pipeline_config_from_env();
    log_pipeline_config(JOB, &cfg);

    let mut store = Store::open(&cfg.store_path)?;

    let status = apply_delay_status(&store)?;
    let congestion = rebuild_congestion_tables(&store);
    let features = rebuild_feature_table(&mut store, &cfg.feature_requests(), &cfg.join_config())?;
    let summary = flight_and_delay_summary_by_airport(
        &store,
        cfg.start_date,
        cfg.end_date,
        cfg.delay_threshold,
    )?;

    let failures = congestion.failed_tables();
    let report = json!({
        "status": status,
        "congestion": congestion,
        "features": features,
        "delay_summary": summary,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    log_job_finish(JOB, failures);
    if failures > 0 {
        return Err(format!("{failures} congestion table(s) failed to rebuild").into());
    }
    Ok(())
}
