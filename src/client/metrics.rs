//! ZDBKV - Client Metrics
//! Lock-free counters for the commands a client sends to the store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Atomic command counters for one client handle.
///
/// All counters use `Ordering::Relaxed`; they are read for reporting only.
#[derive(Debug)]
pub struct ClientMetrics {
    /// Total number of commands sent.
    pub commands: AtomicU64,
    /// Total number of `GET` commands.
    pub gets: AtomicU64,
    /// Total number of `SET` commands.
    pub sets: AtomicU64,
    /// Total number of `DEL` commands.
    pub deletes: AtomicU64,
    /// Total number of `SCAN`/`RSCAN` page fetches.
    pub scans: AtomicU64,
    /// Commands that came back as an error.
    pub errors: AtomicU64,
    /// Total bytes sent as keys and values.
    pub bytes_written: AtomicU64,
    /// Total value bytes returned by `GET`.
    pub bytes_read: AtomicU64,
    /// When the client was created.
    started: Instant,
}

impl ClientMetrics {
    /// Create a new metrics instance with all counters at zero.
    pub fn new() -> Self {
        Self {
            commands: AtomicU64::new(0),
            gets: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            scans: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Record one command and the argument bytes it carried.
    pub fn record_command(&self, command: &str, arg_bytes: usize) {
        self.commands.fetch_add(1, Ordering::Relaxed);
        match command {
            "GET" => self.gets.fetch_add(1, Ordering::Relaxed),
            "SET" => {
                self.bytes_written
                    .fetch_add(arg_bytes as u64, Ordering::Relaxed);
                self.sets.fetch_add(1, Ordering::Relaxed)
            }
            "DEL" => self.deletes.fetch_add(1, Ordering::Relaxed),
            "SCAN" | "RSCAN" => self.scans.fetch_add(1, Ordering::Relaxed),
            _ => 0,
        };
    }

    /// Record a value returned by `GET`.
    pub fn record_read(&self, value_size: usize) {
        self.bytes_read
            .fetch_add(value_size as u64, Ordering::Relaxed);
    }

    /// Record a failed command.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Seconds since the client was created.
    pub fn uptime_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    pub fn total_commands(&self) -> u64 {
        self.commands.load(Ordering::Relaxed)
    }

    /// Commands per second since creation.
    pub fn commands_per_sec(&self) -> f64 {
        let uptime = self.uptime_secs();
        if uptime < 0.001 {
            return 0.0;
        }
        self.total_commands() as f64 / uptime
    }

    /// Format metrics as a human-readable report.
    pub fn report(&self) -> String {
        format!(
            "\n═══ ZDBKV Client Metrics ═══\n\
             Commands:\n\
               gets:      {}\n\
               sets:      {}\n\
               deletes:   {}\n\
               scans:     {}\n\
               errors:    {}\n\
             Throughput:\n\
               total:     {}\n\
               cmds/sec:  {:.2}\n\
             I/O:\n\
               written:   {} bytes\n\
               read:      {} bytes\n\
             Uptime: {:.2}s",
            self.gets.load(Ordering::Relaxed),
            self.sets.load(Ordering::Relaxed),
            self.deletes.load(Ordering::Relaxed),
            self.scans.load(Ordering::Relaxed),
            self.errors.load(Ordering::Relaxed),
            self.total_commands(),
            self.commands_per_sec(),
            self.bytes_written.load(Ordering::Relaxed),
            self.bytes_read.load(Ordering::Relaxed),
            self.uptime_secs(),
        )
    }
}

impl Default for ClientMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_commands() {
        let m = ClientMetrics::new();

        m.record_command("SET", 15);
        m.record_command("SET", 10);
        m.record_command("GET", 3);
        m.record_read(10);
        m.record_command("DEL", 3);
        m.record_command("SCAN", 0);
        m.record_command("RSCAN", 4);
        m.record_command("PING", 0);
        m.record_error();

        assert_eq!(m.sets.load(Ordering::Relaxed), 2);
        assert_eq!(m.gets.load(Ordering::Relaxed), 1);
        assert_eq!(m.deletes.load(Ordering::Relaxed), 1);
        assert_eq!(m.scans.load(Ordering::Relaxed), 2);
        assert_eq!(m.errors.load(Ordering::Relaxed), 1);
        assert_eq!(m.bytes_written.load(Ordering::Relaxed), 25);
        assert_eq!(m.bytes_read.load(Ordering::Relaxed), 10);
        assert_eq!(m.total_commands(), 7);
    }

    #[test]
    fn test_report_format() {
        let m = ClientMetrics::new();
        m.record_command("SET", 30);
        let report = m.report();
        assert!(report.contains("sets:"));
        assert!(report.contains("cmds/sec:"));
        assert!(report.contains("written:"));
    }

    #[test]
    fn test_default() {
        let m = ClientMetrics::default();
        assert_eq!(m.total_commands(), 0);
    }
}
