use anyhow::{Context, Result, anyhow};
use log::{debug, info};

use petriflow::config::Config;
use petriflow::net::read_net;
use petriflow::options::{AnalysisKind, Options};
use petriflow::report::AnalysisReport;

fn main() {
    if std::env::var("PN_LOG").is_ok() {
        let e = env_logger::Env::new()
            .filter("PN_LOG")
            .write_style("PN_LOG_STYLE");
        env_logger::init_from_env(e);
    }

    if let Err(err) = run() {
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = if args.is_empty() {
        Options::parse_from_str(&std::env::var("PN_FLAGS").unwrap_or_default())
    } else {
        Options::parse_from_args(&args)
    }
    .map_err(|err| anyhow!("{}", err))?;
    debug!("PN options: {:?}", options);

    let config = Config::load_from_file(&options.config)?;
    let net = read_net(&options.net).with_context(|| format!("Failed to load {}", options.net))?;
    net.log_diagnostics();
    info!(
        "loaded {}: {} places, {} transitions",
        options.net,
        net.places_len(),
        net.transitions_len()
    );

    let mut report = AnalysisReport::new(options.net.as_str(), &net);
    if options.runs(AnalysisKind::Incidence) {
        report.add_incidence(&net);
    }
    if options.runs(AnalysisKind::Invariants) {
        report.add_invariants(&net);
    }
    if let Some(target) = options.target.as_deref() {
        if options.runs(AnalysisKind::Reachability) {
            report.add_reachability(&net, target)?;
        }
    }
    if options.runs(AnalysisKind::Coverability) {
        report.add_coverability(&net, config.coverability_limit);
    }

    if !options.quiet {
        print!("{}", report);
    }
    if let Some(output) = &options.output {
        report
            .save_to_file(output)
            .with_context(|| format!("Failed to write report to {}", output))?;
        info!("report written to {}", output);
    }
    Ok(())
}
