//! Runs a closure on every worker thread until Ctrl-C and reports the
//! combined iteration rate.

use num_format::{Locale, ToFormattedString};
use std::env;
use std::process;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const SLIDING_WINDOW_SIZE: u64 = 2; // In seconds

static STOP: AtomicBool = AtomicBool::new(false);

/// One counter per worker, padded to its own cache line so workers do not
/// contend on a shared line.
#[repr(align(128))]
#[derive(Default)]
struct WorkerStats {
    count: AtomicU64,
}

fn thread_count() -> usize {
    let Some(arg) = env::args().nth(1) else {
        return num_cpus::get();
    };
    match arg.parse::<usize>() {
        Ok(0) => {
            eprintln!("Number of threads cannot be 0");
            process::exit(1);
        }
        Ok(n) => n,
        Err(_) => {
            eprintln!("Invalid command line argument '{arg}' as number of threads");
            process::exit(1);
        }
    }
}

pub fn test_throughput<F>(func: F)
where
    F: Fn(usize) + Sync,
{
    if let Err(e) = ctrlc::set_handler(|| STOP.store(true, Ordering::SeqCst)) {
        eprintln!("Error setting Ctrl-C handler: {e}");
        process::exit(1);
    }

    let num_threads = thread_count();
    println!("Number of threads: {num_threads}\n");

    let stats: Vec<WorkerStats> = (0..num_threads).map(|_| WorkerStats::default()).collect();
    let total = || -> u64 { stats.iter().map(|s| s.count.load(Ordering::Relaxed)).sum() };

    thread::scope(|s| {
        s.spawn(|| {
            let mut last_collect_time = Instant::now();
            let mut total_count_old: u64 = 0;
            let mut rates: Vec<u64> = Vec::new();

            while !STOP.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(100));
                let elapsed = last_collect_time.elapsed().as_secs();
                if elapsed < SLIDING_WINDOW_SIZE {
                    continue;
                }
                let total_count = total();
                last_collect_time = Instant::now();
                let throughput = (total_count - total_count_old) / elapsed;
                total_count_old = total_count;
                rates.push(throughput);
                println!(
                    "Throughput: {} iterations/sec",
                    throughput.to_formatted_string(&Locale::en)
                );
            }

            if !rates.is_empty() {
                let average = rates.iter().sum::<u64>() / rates.len() as u64;
                println!(
                    "Threads: {num_threads} - Average Throughput: {} iterations/sec",
                    average.to_formatted_string(&Locale::en)
                );
            }
        });

        for (index, worker) in stats.iter().enumerate() {
            let func = &func;
            s.spawn(move || {
                while !STOP.load(Ordering::SeqCst) {
                    func(index);
                    worker.count.fetch_add(1, Ordering::Relaxed);
                }
            });
        }
    });
}
