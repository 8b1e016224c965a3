use glulx::{ExitReason, Glulx, Options, StdioGlk};
use log::info;
use std::env;
use std::fs;
use std::io;
use std::process;

const USAGE: &str = "usage: main [--seed N] [--undo N] [--stack N] [--limit N] [--no-verify] STORY";

fn number<T: std::str::FromStr>(flag: &str, value: Option<String>) -> Result<T, String> {
    let value = value.ok_or_else(|| format!("{} needs a value", flag))?;
    value
        .parse()
        .map_err(|_| format!("bad value for {}: {}", flag, value))
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<(Options, String), String> {
    let mut options = Options::default();
    let mut story = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--seed" => options.rng_seed = Some(number(&arg, args.next())?),
            "--undo" => options.undo_depth = number(&arg, args.next())?,
            "--stack" => options.stack_size = Some(number(&arg, args.next())?),
            "--limit" => options.instruction_limit = Some(number(&arg, args.next())?),
            "--no-verify" => options.verify_checksum = false,
            "-h" | "--help" => return Err(USAGE.to_string()),
            flag if flag.starts_with("--") => return Err(format!("unknown option {}", flag)),
            _ if story.is_some() => return Err(USAGE.to_string()),
            _ => story = Some(arg),
        }
    }
    let story = story.ok_or_else(|| USAGE.to_string())?;
    Ok((options, story))
}

fn main() {
    env_logger::init();

    let (options, path) = match parse_args(env::args().skip(1)) {
        Ok(parsed) => parsed,
        Err(msg) => {
            eprintln!("{}", msg);
            process::exit(2);
        }
    };
    let story = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("cannot read {}: {}", path, e);
            process::exit(1);
        }
    };

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut host = StdioGlk::new(stdin.lock(), stdout.lock());
    let result = Glulx::from_story(story, &mut host, options).and_then(|mut vm| vm.run());
    host.flush();
    match result {
        Ok(ExitReason::InstructionLimit) => {
            eprintln!("stopped: instruction limit reached");
            process::exit(3);
        }
        Ok(reason) => info!("{} finished: {:?}", path, reason),
        Err(e) => {
            eprintln!("fatal: {}", e);
            process::exit(1);
        }
    }
}
