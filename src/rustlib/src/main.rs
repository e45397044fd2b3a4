mod local;

use colored::Colorize;
use std::path::Path;

const USAGE: &str = "Usage:
  neurostream process <signal.csv> [config.yaml] [output.csv]
  neurostream simulate [config.yaml] [seconds]";

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let result = match args.get(1).map(String::as_str) {
        Some("process") => match args.get(2) {
            Some(signal) => {
                let config = args.get(3).map(Path::new);
                let output = args.get(4).map_or("output.csv", String::as_str);
                local::process_file::run(Path::new(signal), config, Path::new(output))
            }
            None => {
                println!("{}", USAGE);
                return;
            }
        },
        Some("simulate") => {
            let config = args.get(2).map(Path::new);
            let seconds = match args.get(3).map(|s| s.parse::<f64>()) {
                None => 10.0,
                Some(Ok(seconds)) => seconds,
                Some(Err(_)) => {
                    println!("Invalid duration, please give the number of seconds to simulate");
                    return;
                }
            };
            local::simulate::run(config, seconds)
        }
        Some(_) => {
            println!("Invalid argument, please use 'process' or 'simulate'\n{}", USAGE);
            return;
        }
        None => {
            println!("Please specify 'process' or 'simulate' as argument\n{}", USAGE);
            return;
        }
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
