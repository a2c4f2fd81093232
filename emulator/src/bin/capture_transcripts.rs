use std::io;

#[allow(dead_code)]
#[path = "../mains.rs"]
mod mains;
#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use session::{DEFAULT_SEED, Session, TranscriptProfile};

fn main() -> io::Result<()> {
    record_profile(TranscriptProfile::Steady)?;
    record_profile(TranscriptProfile::Outage)?;
    record_profile(TranscriptProfile::Burst)?;
    Ok(())
}

fn record_profile(profile: TranscriptProfile) -> io::Result<()> {
    let mut session = Session::new(profile, DEFAULT_SEED)?;
    let script: &[&str] = match profile {
        TranscriptProfile::Steady => &[
            "relay on",
            "advance 100",
            "relay on",
            "advance 20",
            "status",
            "relay off",
            "relay off",
            "advance 20",
            "stats",
        ],
        TranscriptProfile::Outage => &[
            "advance 100",
            "relay on",
            "mains off",
            "advance 100",
            "relay on",
            "relay on now",
            "mains on",
            "advance 100",
            "status",
        ],
        TranscriptProfile::Burst => &[
            "advance 100",
            "burst duty=5",
            "advance 400",
            "stats",
            "burst off",
            "advance 40",
            "status",
        ],
        TranscriptProfile::Interactive => &[],
    };
    for line in script {
        let _ = session.handle_command(line)?;
    }
    Ok(())
}
