//! Interactive pool allocator harness.
//!
//! Drives a [`PoolAllocator`] over a private heap buffer, printing the
//! pool layout (`| id: len |` per block, `-` for vacant space) after each
//! successful mutation:
//!
//! ```text
//! > allocate <size>
//! > free <id>
//! > quit
//! ```
//!
//! Run with: cargo run --bin pool-repl -- <pool size>

use shmpool::pool::{BlockId, PoolAllocator};
use shmpool::Result;
use std::io::{self, BufRead, Write as _};
use std::ptr::NonNull;

fn print_layout(pool: &PoolAllocator) {
    let mut row = String::new();
    for info in pool.layout() {
        match info.id {
            Some(id) => row.push_str(&format!(" | {:2}: {:2}", id, info.len)),
            None => row.push_str(&format!(" |  -: {:2}", info.len)),
        }
    }
    println!("{row} |");
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let size = match std::env::args().nth(1).and_then(|s| s.parse::<usize>().ok()) {
        Some(size) if size > 0 => size,
        _ => {
            eprintln!("usage: pool-repl <pool size>");
            std::process::exit(2);
        }
    };

    let mut buf = vec![0u8; size];
    let base = NonNull::new(buf.as_mut_ptr()).expect("vec allocations are non-null");

    let mut pool = PoolAllocator::new();
    // SAFETY: `buf` lives to the end of main, past every use of `pool`.
    unsafe { pool.init(base, size)? };

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
            Some("allocate") => match parts.next().map(str::parse::<usize>) {
                Some(Ok(len)) => match pool.allocate(len) {
                    Ok(id) => {
                        println!("allocated block {id}");
                        print_layout(&pool);
                    }
                    Err(err) => println!("{err}"),
                },
                Some(Err(_)) => println!("cannot convert <size>"),
                None => println!("usage: allocate <size>"),
            },
            Some("free") => match parts.next().map(str::parse::<u64>) {
                Some(Ok(raw)) => match pool.free(BlockId::from_raw(raw)) {
                    Ok(()) => print_layout(&pool),
                    Err(err) => println!("{err}"),
                },
                Some(Err(_)) => println!("cannot convert <id>"),
                None => println!("usage: free <id>"),
            },
            Some("quit") => break,
            Some(cmd) => println!("unknown command: {cmd}"),
            None => {}
        }
    }

    Ok(())
}
