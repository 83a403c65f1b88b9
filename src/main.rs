use std::process::exit;

use colored::Colorize;

fn main() {
    if let Err(e) = dirhammer::app::run_cli() {
        eprintln!("{} {}", "[ERR]".red(), e);
        exit(1);
    }
}
