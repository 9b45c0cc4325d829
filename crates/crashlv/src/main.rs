//! crashlv — crash-consistency reproduction runner.
//!
//! Usage: `crashlv <toolkit-dir> <device-bdf>`
//!
//! Provisions a volume store + logical volume on the given device, then runs
//! the crash/recovery cycle at each reference write offset. Prints `PASS`
//! and exits 0 when the volume survives every cycle; exits 1 otherwise. On a
//! verification failure the target service is left running for inspection.

use std::process;

use tracing_subscriber::{fmt, EnvFilter};

use crashlv::{run_reproduction, HarnessError, HarnessOptions};
use crashlv::toolkit::Toolkit;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Logs go to stderr; stdout carries only the final verdict.
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("usage: {} <toolkit-dir> <device-bdf>", args[0]);
        process::exit(1);
    }
    let toolkit = Toolkit::new(&args[1]);
    let device_bdf = &args[2];

    match run_reproduction(&toolkit, device_bdf, HarnessOptions::default()) {
        Ok(()) => println!("PASS"),
        Err(err) => {
            eprintln!("error: {err}");
            // A startup failure carries the dead process's output; show it
            // verbatim, it is usually the whole story.
            if let HarnessError::StartupFailed { stdout, stderr, .. } = &err {
                eprint!("{stdout}");
                eprint!("{stderr}");
            }
            process::exit(1);
        }
    }
}
