use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use rail12306::cli::Args;
use rail12306::{BookingSession, ConsoleCaptcha, prompt_line, run};

fn list_stations(session: &mut BookingSession) {
    session.init_session();
    if !session.fetch_stations() {
        println!("Could not load the station directory.");
        return;
    }
    let mut stations: Vec<_> = session.stations().values().collect();
    stations.sort_by(|a, b| a.pinyin.cmp(&b.pinyin));
    for station in stations {
        println!("{} ({}) -> {}", station.name, station.pinyin, station.code);
    }
}

fn read_credentials() -> anyhow::Result<(String, String)> {
    let username = prompt_line("12306 account:").context("could not read the account name")?;
    let password = prompt_line("12306 password:").context("could not read the password")?;
    Ok((username, password))
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Failures up to the point where the session exists are the only ones
    // that exit non-zero; once the session is live every error is caught,
    // reported and followed by the logout below.
    let credentials = if args.list_stations {
        None
    } else {
        match read_credentials() {
            Ok(credentials) => Some(credentials),
            Err(err) => {
                eprintln!("{err:#}");
                return ExitCode::FAILURE;
            }
        }
    };

    let mut session = match BookingSession::new(Box::new(ConsoleCaptcha)) {
        Ok(session) => session,
        Err(err) => {
            eprintln!("could not set up the booking session: {err}");
            return ExitCode::FAILURE;
        }
    };

    match credentials {
        Some((username, password)) => run(&mut session, &args, &username, &password),
        None => list_stations(&mut session),
    }

    session.logout();
    println!("Done.");
    ExitCode::SUCCESS
}
