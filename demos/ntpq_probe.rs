//! Minimal demonstration of the library, not the interactive front end the
//! spec excludes (spec.md §1) — just enough to exercise `open_host`,
//! `read_stat`, and `read_var` end to end against a real host.
//!
//! Usage: `cargo run --example ntpq_probe -- <host>`

use ntp6::Session;

fn main() {
    simple_logger::SimpleLogger::new().init().unwrap();

    let host = std::env::args().nth(1).unwrap_or_else(|| "pool.ntp.org".to_string());

    let mut session = Session::new();
    session.debug_level(2);

    if let Err(e) = session.open_host(&host) {
        eprintln!("failed to open {host}: {e}");
        std::process::exit(1);
    }

    match session.read_stat(0) {
        Ok(peers) => {
            for peer in &peers {
                println!("assoc {} status {:#06x}", peer.associd, peer.status);
            }
        }
        Err(e) => eprintln!("readstat failed: {e}"),
    }

    match session.read_var(0, &[]) {
        Ok(vars) => {
            for (name, value) in &vars {
                println!("{name} = {value}");
            }
        }
        Err(e) => eprintln!("readvar failed: {e}"),
    }

    session.close();
}
