//! ZDBKV - Interactive Shell
//! A small REPL over the adapter, against a remote store or an in-process one.

use std::io::{self, BufRead, Write};

use zdbkv::client::memory::MemoryTransport;
use zdbkv::client::{Client, Transport};
use zdbkv::config::Config;
use zdbkv::engine::iterator::RangeIterator;
use zdbkv::engine::ZdbStore;

fn main() {
    env_logger::init();

    let target = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("ZDB_ADDRESS").ok());

    match target.as_deref() {
        Some("--memory") => {
            println!("  Using in-memory store");
            run(ZdbStore::new(Client::new(MemoryTransport::new())));
        }
        other => {
            let mut config = other.map(Config::new).unwrap_or_default();
            config.namespace = std::env::var("ZDB_NAMESPACE").ok();
            config.password = std::env::var("ZDB_PASSWORD").ok();
            match ZdbStore::connect(config.clone()) {
                Ok(store) => {
                    println!("  Connected to {}", config.address);
                    run(store);
                }
                Err(err) => {
                    eprintln!("[ERROR] Failed to connect to {}: {}", config.address, err);
                    std::process::exit(1);
                }
            }
        }
    }
}

fn run<T: Transport>(store: ZdbStore<T>) {
    println!();
    println!("  Commands:");
    println!("    set <key> <value>        - Store a key-value pair");
    println!("    get <key>                - Retrieve a value by key");
    println!("    del <key>                - Delete a key");
    println!("    has <key>                - Check whether a key exists");
    println!("    scan [start] [end]       - List pairs in ascending order");
    println!("    rscan [start] [end]      - List pairs in descending order");
    println!("    info                     - Show server properties");
    println!("    stats                    - Show client metrics");
    println!("    exit                     - Quit");
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("zdbkv> ");
        if stdout.flush().is_err() {
            break;
        }

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break, // EOF
            Ok(_) => {}
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        match parts[0].to_lowercase().as_str() {
            "set" | "put" => {
                if parts.len() < 3 {
                    println!("  Usage: set <key> <value>");
                    continue;
                }
                let value = parts[2..].join(" ");
                match store.set(parts[1].as_bytes(), value.as_bytes()) {
                    Ok(()) => println!("  OK"),
                    Err(e) => println!("  ERROR: {}", e),
                }
            }
            "get" => {
                if parts.len() < 2 {
                    println!("  Usage: get <key>");
                    continue;
                }
                match store.get(parts[1].as_bytes()) {
                    Ok(Some(value)) => match String::from_utf8(value) {
                        Ok(s) => println!("  \"{}\"", s),
                        Err(_) => println!("  <binary data>"),
                    },
                    Ok(None) => println!("  (nil)"),
                    Err(e) => println!("  ERROR: {}", e),
                }
            }
            "del" | "delete" => {
                if parts.len() < 2 {
                    println!("  Usage: del <key>");
                    continue;
                }
                match store.delete(parts[1].as_bytes()) {
                    Ok(()) => println!("  OK (deleted)"),
                    Err(e) => println!("  ERROR: {}", e),
                }
            }
            "has" | "exists" => {
                if parts.len() < 2 {
                    println!("  Usage: has <key>");
                    continue;
                }
                match store.has(parts[1].as_bytes()) {
                    Ok(found) => println!("  {}", found),
                    Err(e) => println!("  ERROR: {}", e),
                }
            }
            cmd @ ("scan" | "list" | "rscan") => {
                let start = parts.get(1).map(|s| s.as_bytes());
                let end = parts.get(2).map(|s| s.as_bytes());
                let iter = if cmd == "rscan" {
                    store.reverse_iterator(start, end)
                } else {
                    store.iterator(start, end)
                };
                match iter {
                    Ok(iter) => print_entries(iter),
                    Err(e) => println!("  ERROR: {}", e),
                }
            }
            "info" => {
                let mut stats: Vec<_> = store.stats().into_iter().collect();
                if stats.is_empty() {
                    println!("  (unavailable)");
                }
                stats.sort();
                for (key, value) in stats {
                    println!("  {}: {}", key, value);
                }
            }
            "stats" | "metrics" => println!("{}", store.client().metrics().report()),
            "exit" | "quit" | "q" => {
                if let Err(e) = store.close() {
                    println!("  ERROR: {}", e);
                }
                println!("  Bye.");
                break;
            }
            _ => {
                println!("  Unknown command: '{}'. Type 'exit' to quit.", parts[0]);
            }
        }
    }
}

fn print_entries<T: Transport>(iter: RangeIterator<T>) {
    let mut count = 0;
    for entry in iter.entries() {
        match entry {
            Ok((key, value)) => {
                println!(
                    "  {} -> {}",
                    String::from_utf8_lossy(&key),
                    String::from_utf8_lossy(&value)
                );
                count += 1;
            }
            Err(e) => {
                println!("  ERROR: {}", e);
                return;
            }
        }
    }
    if count == 0 {
        println!("  (empty)");
    } else {
        println!("  ({} entries)", count);
    }
}
