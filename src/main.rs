mod builtins;
mod command;
mod engine;
mod environment;
mod error;
mod jobs;
mod launcher;
mod parser;
mod planner;
mod status;

use std::io::{self, Write};

use engine::{Engine, EngineOutcome};

fn main() {
    ctrlc::set_handler(|| {
        println!();
        let _ = io::stdout().flush();
    })
    .expect("Failed to set Ctrl-C handler");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut engine = Engine::new();
    let mut last_exit_code: i32 = 0;

    loop {
        print!("quill> ");
        if stdout.flush().is_err() {
            break;
        }

        let mut input = String::new();
        match stdin.read_line(&mut input) {
            Ok(0) => {
                println!();
                break;
            }
            Ok(_) => {
                let pipeline = match parser::parse_line(&input) {
                    Ok(pipeline) => pipeline,
                    Err(msg) => {
                        eprintln!("{msg}");
                        last_exit_code = 2;
                        continue;
                    }
                };

                if pipeline.is_empty() {
                    continue;
                }

                let command_text = parser::render(&pipeline);
                match engine.run(&pipeline, &command_text) {
                    EngineOutcome::Continue(code) => last_exit_code = code,
                    EngineOutcome::Exit(code) => {
                        last_exit_code = code;
                        break;
                    }
                }
            }
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {
                continue;
            }
            Err(error) => {
                eprintln!("Error reading input: {error}");
                break;
            }
        }
    }

    std::process::exit(last_exit_code);
}
