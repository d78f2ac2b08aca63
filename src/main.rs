use std::path::PathBuf;

use blog_tui::{Mode, RunOptions};

const HELP: &str = "Blog-TUI - Read a WordPress blog from the terminal.

  --version, -V        Show version and exit
  --help,    -h        Show this help message
  --list               Print the first page of posts and exit
  --post <id>          Print a single post and exit
  --config <path>      Read configuration from <path>";

enum Cli {
    Exit,
    Run(RunOptions),
}

fn main() {
    let opts = match handle_cli_flags(std::env::args().skip(1)) {
        Ok(Cli::Exit) => return,
        Ok(Cli::Run(opts)) => opts,
        Err(err) => {
            eprintln!("error: {err}\n\n{HELP}");
            std::process::exit(2);
        }
    };

    if let Err(err) = blog_tui::run(opts) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn handle_cli_flags(mut args: impl Iterator<Item = String>) -> Result<Cli, String> {
    let mut opts = RunOptions::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("Blog-TUI {}", blog_tui::VERSION);
                return Ok(Cli::Exit);
            }
            "--help" | "-h" => {
                println!("{HELP}");
                return Ok(Cli::Exit);
            }
            "--list" => opts.mode = Mode::List,
            "--post" => {
                let raw = args.next().ok_or("--post needs a post id")?;
                let id = raw
                    .parse::<i64>()
                    .map_err(|_| format!("invalid post id: {raw}"))?;
                opts.mode = Mode::Post(id);
            }
            "--config" => {
                let path = args.next().ok_or("--config needs a path")?;
                opts.config_file = Some(PathBuf::from(path));
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(Cli::Run(opts))
}
