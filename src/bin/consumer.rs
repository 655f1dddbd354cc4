//! Interactive consumer harness.
//!
//! Attaches read-write to an existing shared memory segment and drives it
//! from stdin with the same grammar as the producer harness:
//!
//! ```text
//! > write <data>
//! > read <size>
//! > quit
//! ```
//!
//! Run with: cargo run --bin consumer -- <name> <size>

use shmpool::prelude::*;
use std::io::{self, BufRead, Write as _};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let mut args = std::env::args().skip(1);
    let name = args.next();
    let size = args.next().and_then(|s| s.parse::<usize>().ok());
    let (name, size) = match (name, size) {
        (Some(name), Some(size)) => (name, size),
        _ => {
            eprintln!("usage: consumer <name> <size>");
            std::process::exit(2);
        }
    };

    let mut client = SegmentClient::new();
    let handle = client.attach(&name, AccessMode::ReadWrite, size)?;
    println!("attached to '{}' as {handle}", client.name(handle)?);

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("write") => match parts.next() {
                Some(data) => {
                    if let Err(err) = client.write(handle, data.as_bytes()) {
                        println!("write failed: {err}");
                    }
                }
                None => println!("usage: write <data>"),
            },
            Some("read") => match parts.next().map(str::parse::<usize>) {
                Some(Ok(len)) => {
                    let mut buf = vec![0u8; len];
                    match client.read(handle, &mut buf) {
                        Ok(()) => println!("received '{}'", String::from_utf8_lossy(&buf)),
                        Err(err) => println!("read failed: {err}"),
                    }
                }
                Some(Err(_)) => println!("cannot convert <size>"),
                None => println!("usage: read <size>"),
            },
            Some("quit") => break,
            Some(cmd) => println!("unknown command: {cmd}"),
            None => {}
        }
    }

    client.detach(handle)?;
    Ok(())
}
