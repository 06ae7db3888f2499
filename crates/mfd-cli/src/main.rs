use std::process::ExitCode;

mod problem;

use problem::Problem;

fn usage() {
    eprintln!("usage: mfd-cli solve <problem.json>");
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 || args[1] != "solve" {
        usage();
        return ExitCode::from(2);
    }

    let problem = match Problem::from_file(&args[2]) {
        Ok(problem) => problem,
        Err(err) => {
            eprintln!("parse error: {err}");
            return ExitCode::from(1);
        }
    };

    let report = match problem.run() {
        Ok(report) => report,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::from(1);
        }
    };

    match serde_json::to_string_pretty(&report) {
        Ok(text) => println!("{text}"),
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::from(1);
        }
    }
    if report.converged {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}
