//! 命令行选项解析。
//! `pn <NET> --analysis-kind {kind}` 或 `-k`，可达性查询另加 `--target place=n,...`。

use clap::{Arg, ArgAction, Command};
use std::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnalysisKind {
    All,
    Incidence,
    Reachability,
    Invariants,
    Coverability,
}

fn make_options_parser() -> clap::Command {
    Command::new("pn")
        .no_binary_name(true)
        .version("v0.1.0")
        .about("Static analysis for place/transition nets")
        .arg(
            Arg::new("net")
                .value_name("NET")
                .help("Net definition (.json or .ron)")
                .required(true),
        )
        .arg(
            Arg::new("kind")
                .short('k')
                .long("analysis-kind")
                .help("The analysis to run")
                .default_value("all")
                .value_parser([
                    "all",
                    "incidence",
                    "reachability",
                    "invariants",
                    "coverability",
                ]),
        )
        .arg(
            Arg::new("target")
                .short('t')
                .long("target")
                .value_name("PLACE=N,...")
                .help("Target marking for the reachability test; unlisted places are 0"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .default_value("petriflow.toml"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Path to file where the analysis report will be stored"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("Do not print the report to stdout"),
        )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub net: String,
    pub analysis_kind: AnalysisKind,
    pub target: Option<Vec<(String, u64)>>,
    pub config: String,
    pub output: Option<String>,
    pub quiet: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            net: String::new(),
            analysis_kind: AnalysisKind::All,
            target: None,
            config: "petriflow.toml".to_string(),
            output: None,
            quiet: false,
        }
    }
}

impl Options {
    pub fn parse_from_str(s: &str) -> Result<Self, Box<dyn Error>> {
        let flags = shellwords::split(s)?;
        Self::parse_from_args(&flags)
    }

    pub fn parse_from_args(flags: &[String]) -> Result<Self, Box<dyn Error>> {
        let app = make_options_parser();
        let matches = app.try_get_matches_from(flags.iter())?;
        let analysis_kind = match matches.get_one::<String>("kind").map(String::as_str) {
            Some("all") => AnalysisKind::All,
            Some("incidence") => AnalysisKind::Incidence,
            Some("reachability") => AnalysisKind::Reachability,
            Some("invariants") => AnalysisKind::Invariants,
            Some("coverability") => AnalysisKind::Coverability,
            _ => return Err("UnsupportedAnalysisKind".into()),
        };

        let target = matches
            .get_one::<String>("target")
            .map(|spec| parse_target(spec))
            .transpose()?;
        if analysis_kind == AnalysisKind::Reachability && target.is_none() {
            return Err("reachability analysis needs --target".into());
        }

        let net = matches
            .get_one::<String>("net")
            .cloned()
            .ok_or("missing net path")?;
        let config = matches
            .get_one::<String>("config")
            .cloned()
            .unwrap_or_else(|| "petriflow.toml".to_string());
        let output = matches.get_one::<String>("output").cloned();
        Ok(Options {
            net,
            analysis_kind,
            target,
            config,
            output,
            quiet: matches.get_flag("quiet"),
        })
    }

    pub fn runs(&self, kind: AnalysisKind) -> bool {
        self.analysis_kind == AnalysisKind::All || self.analysis_kind == kind
    }
}

/// 解析 `off=1,shining=0` 为 `[("off", 1), ("shining", 0)]`
fn parse_target(spec: &str) -> Result<Vec<(String, u64)>, Box<dyn Error>> {
    spec.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| -> Result<(String, u64), Box<dyn Error>> {
            let (place, tokens) = entry
                .split_once('=')
                .ok_or_else(|| format!("expected PLACE=N, got `{}`", entry))?;
            let tokens = tokens
                .trim()
                .parse::<u64>()
                .map_err(|err| format!("bad token count for `{}`: {}", place, err))?;
            Ok((place.trim().to_string(), tokens))
        })
        .collect()
}
