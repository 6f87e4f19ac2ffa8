use bakelock::BakeryLock;

use anyhow::{Context, Result};
use clap::{arg, Command};
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::fmt;

/// Counter bumped with a separate load and store, plus a pause in between to
/// widen the window: unlocked runs lose increments, locked runs never do.
#[derive(Default)]
struct SharedCounter(AtomicU64);

impl SharedCounter {
    fn increment(&self) {
        let seen = self.0.load(Ordering::Relaxed);
        let jitter = rand::thread_rng().gen_range(0..100);
        thread::sleep(Duration::from_micros(jitter));
        self.0.store(seen + 1, Ordering::Relaxed);
    }

    fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

fn main() -> Result<()> {
    let matches = Command::new("bakelock-demo")
        .version("0.1.0")
        .about("N workers hammering one racy counter under a bakery lock")
        .arg(arg!(-w --workers <WORKERS> "Number of workers").required(false))
        .arg(arg!(-r --rounds <ROUNDS> "Critical sections per worker").required(false))
        .arg(arg!(-l --log <LOG> "Log level").required(false))
        .arg(arg!(-u --unlocked "Skip the lock to show the race").required(false))
        .get_matches();

    let workers = matches
        .get_one::<String>("workers")
        .map(|w| w.parse::<usize>())
        .transpose()
        .context("workers must be a positive integer")?
        .unwrap_or(4);
    let rounds = matches
        .get_one::<String>("rounds")
        .map(|r| r.parse::<u64>())
        .transpose()
        .context("rounds must be a positive integer")?
        .unwrap_or(50);
    let unlocked = matches.contains_id("unlocked");

    let level = match matches.get_one::<String>("log").map(String::as_str) {
        Some("trace") => Level::TRACE,
        Some("debug") => Level::DEBUG,
        _ => Level::INFO,
    };
    let subscriber = fmt::Subscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let lock = Arc::new(BakeryLock::new(workers).context("building the lock")?);
    let counter = Arc::new(SharedCounter::default());
    info!(workers, rounds, unlocked, "starting");

    let start = Instant::now();
    let ths = (0..workers)
        .map(|id| {
            let lock = lock.clone();
            let counter = counter.clone();
            thread::spawn(move || -> Result<()> {
                for round in 0..rounds {
                    if unlocked {
                        counter.increment();
                    } else {
                        lock.acquire(id)?;
                        counter.increment();
                        lock.release(id)?;
                    }
                    debug!(id, round, "round done");
                    // Non-critical work between attempts.
                    let pause = rand::thread_rng().gen_range(0..200);
                    thread::sleep(Duration::from_micros(pause));
                }
                Ok(())
            })
        })
        .collect::<Vec<_>>();
    for th in ths {
        th.join().expect("worker panicked")?;
    }

    let got = counter.get();
    let want = workers as u64 * rounds;
    let elapsed = start.elapsed();
    if got == want {
        info!(got, ?elapsed, "final count exact");
    } else {
        warn!(got, want, lost = want - got, "lost updates");
    }
    Ok(())
}
