use std::env;
use std::process::ExitCode;

use epub_stream_nav::{PageTurnMode, ReadingDirection, Size};
use epub_stream_nav_sim::{Scenario, ScenarioRunner};

#[derive(Clone, Debug)]
struct Args {
    scenario_path: String,
    width: Option<f64>,
    height: Option<f64>,
    rtl: bool,
    spread: bool,
    scroll: bool,
    pretty: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    match run(env::args().collect()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("error: {}", msg);
            eprintln!("{}", help_text());
            ExitCode::FAILURE
        }
    }
}

fn run(args: Vec<String>) -> Result<(), String> {
    let cli = parse_args(args)?;
    let source = std::fs::read_to_string(&cli.scenario_path)
        .map_err(|e| format!("cannot read '{}': {}", cli.scenario_path, e))?;
    let mut scenario = Scenario::from_json(&source).map_err(|e| e.to_string())?;
    apply_overrides(&mut scenario, &cli);

    let mut runner = ScenarioRunner::new(&scenario).map_err(|e| e.to_string())?;
    let reports = runner.run(&scenario.steps).map_err(|e| e.to_string())?;
    for report in &reports {
        let line = if cli.pretty {
            serde_json::to_string_pretty(report)
        } else {
            serde_json::to_string(report)
        }
        .map_err(|e| e.to_string())?;
        println!("{}", line);
    }
    log::info!(
        "{} steps, {} pages, final item {:?}",
        reports.len(),
        runner.navigator().locator().total_pages(),
        runner
            .navigator()
            .current_record()
            .map(|record| record.spine_item)
    );
    Ok(())
}

fn apply_overrides(scenario: &mut Scenario, cli: &Args) {
    let settings = &mut scenario.settings;
    let viewport = settings.viewport;
    settings.viewport = Size::new(
        cli.width.unwrap_or(viewport.width),
        cli.height.unwrap_or(viewport.height),
    );
    if cli.rtl {
        settings.reading_direction = ReadingDirection::Rtl;
    }
    if cli.spread {
        settings.spread = true;
    }
    if cli.scroll {
        settings.page_turn_mode = PageTurnMode::Scrollable;
    }
}

fn parse_args(args: Vec<String>) -> Result<Args, String> {
    if args.len() >= 2 && (args[1] == "--help" || args[1] == "-h") {
        return Err("help requested".to_string());
    }
    let scenario_path = args
        .get(1)
        .filter(|v| !v.starts_with("--"))
        .cloned()
        .ok_or_else(|| "missing scenario path".to_string())?;

    let mut cfg = Args {
        scenario_path,
        width: None,
        height: None,
        rtl: false,
        spread: false,
        scroll: false,
        pretty: false,
    };

    let mut i = 2usize;
    while i < args.len() {
        match args[i].as_str() {
            "--width" => {
                cfg.width = Some(parse_px(&args, i, "--width")?);
                i += 2;
            }
            "--height" => {
                cfg.height = Some(parse_px(&args, i, "--height")?);
                i += 2;
            }
            "--rtl" => {
                cfg.rtl = true;
                i += 1;
            }
            "--spread" => {
                cfg.spread = true;
                i += 1;
            }
            "--scroll" => {
                cfg.scroll = true;
                i += 1;
            }
            "--pretty" => {
                cfg.pretty = true;
                i += 1;
            }
            other => return Err(format!("unknown argument '{}'", other)),
        }
    }
    Ok(cfg)
}

fn parse_px(args: &[String], i: usize, flag: &str) -> Result<f64, String> {
    let v = args
        .get(i + 1)
        .ok_or_else(|| format!("{} requires a value", flag))?;
    v.parse::<f64>()
        .ok()
        .filter(|px| px.is_finite() && *px > 0.0)
        .ok_or_else(|| format!("invalid {} value '{}'", flag, v))
}

fn help_text() -> &'static str {
    r#"nav-sim - replay a reading scenario against epub-stream-nav

USAGE:
  cargo run -p epub-stream-nav-sim --bin nav-sim -- <scenario.json> [options]

Prints one JSON report per scenario step. Set RUST_LOG=debug for a trace of
layout passes and published records.

OPTIONS:
  --width <px>     override viewport width
  --height <px>    override viewport height
  --rtl            right-to-left reading direction
  --spread         two pages per screen
  --scroll         scrollable page turn mode
  --pretty         pretty-print reports

EXAMPLE:
  cargo run -p epub-stream-nav-sim --bin nav-sim -- \
      crates/epub-stream-nav-sim/scenarios/three-chapters.json
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_flags_after_the_scenario_path() {
        let cli = parse_args(args(&["nav-sim", "book.json", "--width", "320", "--rtl", "--pretty"]))
            .expect("args");
        assert_eq!(cli.scenario_path, "book.json");
        assert_eq!(cli.width, Some(320.0));
        assert!(cli.rtl && cli.pretty);
        assert!(!cli.spread);
    }

    #[test]
    fn rejects_missing_path_and_bad_values() {
        assert!(parse_args(args(&["nav-sim"])).is_err());
        assert!(parse_args(args(&["nav-sim", "--rtl"])).is_err());
        assert!(parse_args(args(&["nav-sim", "b.json", "--height", "-3"])).is_err());
        assert!(parse_args(args(&["nav-sim", "b.json", "--zoom"])).is_err());
    }
}
