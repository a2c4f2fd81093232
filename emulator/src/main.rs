mod mains;
mod session;

use std::env;
use std::io::{self, BufRead, Write};
use std::process;

use session::{DEFAULT_SEED, Session, TranscriptProfile};

struct Options {
    profile: TranscriptProfile,
    seed: u64,
}

fn main() -> io::Result<()> {
    let options = parse_options().unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("Usage: zero-cross-emulator [--profile <name>] [--seed <n>]");
        process::exit(2);
    });

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut session = Session::new(options.profile, options.seed)?;
    let mut line = String::new();

    writeln!(
        writer,
        "Zero-Cross Relay Emulator ready. Type `help` for commands or `exit` to quit."
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        let responses = session.handle_command(trimmed)?;
        for response in responses {
            writeln!(writer, "{response}")?;
        }
    }

    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_options() -> Result<Options, String> {
    let mut options = Options {
        profile: TranscriptProfile::Interactive,
        seed: DEFAULT_SEED,
    };
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
            None => (arg, None),
        };
        let mut value = || {
            inline
                .clone()
                .or_else(|| args.next())
                .ok_or_else(|| format!("Expected value after {flag}"))
        };
        match flag.as_str() {
            "--profile" => options.profile = TranscriptProfile::from_tag(&value()?)?,
            "--seed" => {
                let raw = value()?;
                options.seed = raw
                    .parse()
                    .map_err(|_| format!("Invalid seed `{raw}`"))?;
            }
            other => return Err(format!("Unknown argument `{other}`")),
        }
    }
    Ok(options)
}
