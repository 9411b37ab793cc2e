use clap::{CommandFactory, Parser};

use crate::cli::{Cli, TopLevel, DecompileCommand, OutputModeCli};

mod cli;

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(TopLevel::Decompile { command }) => match command {
            DecompileCommand::File { path, mode, verbose } => {
                let mode = match mode {
                    OutputModeCli::Source => depyc_lib::DecompileMode::Source,
                    OutputModeCli::Disasm => depyc_lib::DecompileMode::Disasm,
                };
                match std::fs::read(&path) {
                    Ok(bytes) => match depyc_lib::decompile_with_options(
                        &bytes,
                        depyc_lib::DecompileOptions { mode },
                    ) {
                        Ok(out) => {
                            if verbose {
                                for warning in &out.warnings {
                                    eprintln!("{warning}");
                                }
                            }
                            print!("{}", out.text);
                        }
                        Err(e) => {
                            eprintln!("decompile error: {e}");
                            std::process::exit(1);
                        }
                    },
                    Err(e) => {
                        eprintln!("failed to read {path:?}: {e}");
                        std::process::exit(1);
                    }
                }
            }
        },
        Some(TopLevel::Completion { shell }) => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
        }
        None => {
            Cli::command().print_help().unwrap();
        }
    }
}
