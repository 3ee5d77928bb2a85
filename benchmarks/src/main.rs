//! # Mise Device Directory - Benchmark Suite
//!
//! Measures the latency of the directory transactions against the
//! in-memory document store, without HTTP in the way.
//!
//! ## Benchmarks Included
//!
//! 1. Resolve - identity → entry → configuration
//! 2. Address Read - identity → entry address
//! 3. Configuration Update - re-resolve and replace the configuration
//! 4. Address Update - re-resolve and patch the entry
//! 5. Create (Fresh) - create devices whose base serial is free
//! 6. Create (Colliding) - create devices sharing one base serial, so each
//!    creation probes one suffix further than the last
//! 7. Collision Storm - concurrent creators racing for the same serial,
//!    retried on write conflicts
//!
//! ## Usage
//!
//! ```bash
//! # Run all benchmarks
//! cargo run --release --package benchmarks -- --all
//!
//! # Run specific benchmark
//! cargo run --release --package benchmarks -- --benchmark collision-storm --concurrency 16
//!
//! # Export results to CSV
//! cargo run --release --package benchmarks -- --all --output results.csv
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use hdrhistogram::Histogram;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use config_service::{directory::DeviceDirectory, retry::RetryPolicy, store::MemoryStore};
use shared::{Configuration, DeviceIdentity, DeviceModel};

// Number of iterations for each benchmark
const DEFAULT_ITERATIONS: usize = 1000;

// Warm-up iterations (not counted in results)
const WARMUP_ITERATIONS: usize = 20;

// Concurrent creators per collision storm round
const DEFAULT_CONCURRENCY: usize = 8;

// Attempts per creator during a collision storm
const DEFAULT_STORM_ATTEMPTS: u32 = 50;

#[derive(Parser, Debug)]
#[command(name = "benchmark")]
#[command(about = "Mise Device Directory Benchmark Suite")]
struct Args {
    /// Run all benchmarks
    #[arg(long)]
    all: bool,

    /// Specific benchmark to run
    #[arg(long, value_enum)]
    benchmark: Option<BenchmarkType>,

    /// Number of iterations per benchmark
    #[arg(long, default_value_t = DEFAULT_ITERATIONS)]
    iterations: usize,

    /// Concurrent creators per collision storm round
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Attempts each storm creator gets before giving up
    #[arg(long, default_value_t = DEFAULT_STORM_ATTEMPTS)]
    max_attempts: u32,

    /// Output file for CSV results
    #[arg(long)]
    output: Option<String>,

    /// Skip warm-up iterations
    #[arg(long)]
    no_warmup: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BenchmarkType {
    Resolve,
    AddressRead,
    ConfigurationUpdate,
    AddressUpdate,
    CreateFresh,
    CreateColliding,
    CollisionStorm,
}

#[derive(Debug, Clone, Serialize)]
struct BenchmarkResult {
    name: String,
    iterations: usize,
    min_us: f64,
    max_us: f64,
    mean_us: f64,
    median_us: f64,
    p95_us: f64,
    p99_us: f64,
    std_dev_us: f64,
    /// Operations abandoned after exhausting their retries
    failures: u32,
    timestamp: DateTime<Utc>,
}

impl BenchmarkResult {
    fn from_histogram(name: &str, histogram: &Histogram<u64>, iterations: usize, failures: u32) -> Self {
        let to_us = |v: u64| v as f64;

        Self {
            name: name.to_string(),
            iterations,
            min_us: to_us(histogram.min()),
            max_us: to_us(histogram.max()),
            mean_us: histogram.mean(),
            median_us: to_us(histogram.value_at_quantile(0.5)),
            p95_us: to_us(histogram.value_at_quantile(0.95)),
            p99_us: to_us(histogram.value_at_quantile(0.99)),
            std_dev_us: histogram.stdev(),
            failures,
            timestamp: Utc::now(),
        }
    }

    fn print_report(&self) {
        println!("\n{}", "=".repeat(60));
        println!("Benchmark: {}", self.name);
        println!("{}", "=".repeat(60));
        println!("Iterations: {}", self.iterations);
        println!();
        println!("  Min:      {:>10.1} µs", self.min_us);
        println!("  Max:      {:>10.1} µs", self.max_us);
        println!("  Mean:     {:>10.1} µs", self.mean_us);
        println!("  Median:   {:>10.1} µs", self.median_us);
        println!("  P95:      {:>10.1} µs", self.p95_us);
        println!("  P99:      {:>10.1} µs", self.p99_us);
        println!("  Std Dev:  {:>10.1} µs", self.std_dev_us);
        if self.failures > 0 {
            println!("  Failures: {:>10}", self.failures);
        }
        println!("{}", "=".repeat(60));
    }
}

fn sample_config(phidget_id: u32, load_cell_id: u32) -> Configuration {
    Configuration {
        gain: 1.0,
        ingredient: "coffee".into(),
        load_cell_id,
        location: "counter".into(),
        offset: 0.5,
        phidget_id,
        heartbeat_period: Duration::from_secs(30),
        phidget_sample_period: Duration::from_secs(1),
        max_noise: 0.01,
        buffer_length: 10,
    }
}

struct BenchmarkRunner {
    iterations: usize,
    concurrency: usize,
    max_attempts: u32,
    warmup: bool,
    verbose: bool,
}

impl BenchmarkRunner {
    fn create_histogram() -> Result<Histogram<u64>> {
        // Microsecond precision, max 60 seconds
        Histogram::new_with_bounds(1, 60_000_000, 3).context("Failed to create histogram")
    }

    fn fresh_directory() -> (MemoryStore, DeviceDirectory) {
        let store = MemoryStore::new();
        let directory = DeviceDirectory::new(Arc::new(store.clone()));
        (store, directory)
    }

    async fn seeded_device(directory: &DeviceDirectory) -> Result<DeviceIdentity> {
        let identity = directory
            .create_device(DeviceModel::IchibuV1, &sample_config(67890, 12345))
            .await?;
        directory.put_address(&identity, "192.168.1.100").await?;
        Ok(identity)
    }

    async fn run_benchmark<F, Fut>(&self, name: &str, mut f: F) -> Result<BenchmarkResult>
    where
        F: FnMut(usize) -> Fut,
        Fut: std::future::Future<Output = Result<u32>>,
    {
        let mut histogram = Self::create_histogram()?;
        let mut failures = 0;

        // Warm-up phase
        if self.warmup {
            if self.verbose {
                println!("  Warming up ({} iterations)...", WARMUP_ITERATIONS);
            }
            for i in 0..WARMUP_ITERATIONS {
                f(self.iterations + i).await?;
            }
        }

        // Measurement phase
        if self.verbose {
            println!("  Running {} iterations...", self.iterations);
        }

        for i in 0..self.iterations {
            let start = Instant::now();
            failures += f(i).await?;
            let elapsed = start.elapsed();

            histogram.record(elapsed.as_micros() as u64).ok();
        }

        Ok(BenchmarkResult::from_histogram(name, &histogram, self.iterations, failures))
    }

    // =========================================================================
    // BENCHMARK: Reads
    // =========================================================================

    async fn benchmark_resolve(&self) -> Result<BenchmarkResult> {
        println!("\nBenchmark: Resolve");
        println!("  Identity → directory entry → configuration in one transaction.");

        let (_, directory) = Self::fresh_directory();
        let identity = Self::seeded_device(&directory).await?;

        let (directory, identity) = (&directory, &identity);
        self.run_benchmark("Resolve", move |_| async move {
            directory.get_configuration(identity).await?;
            Ok::<_, anyhow::Error>(0)
        })
        .await
    }

    async fn benchmark_address_read(&self) -> Result<BenchmarkResult> {
        println!("\nBenchmark: Address Read");

        let (_, directory) = Self::fresh_directory();
        let identity = Self::seeded_device(&directory).await?;

        let (directory, identity) = (&directory, &identity);
        self.run_benchmark("Address Read", move |_| async move {
            directory.get_address(identity).await?;
            Ok::<_, anyhow::Error>(0)
        })
        .await
    }

    // =========================================================================
    // BENCHMARK: Mutations
    // =========================================================================

    async fn benchmark_configuration_update(&self) -> Result<BenchmarkResult> {
        println!("\nBenchmark: Configuration Update");

        let (_, directory) = Self::fresh_directory();
        let identity = Self::seeded_device(&directory).await?;

        self.run_benchmark("Configuration Update", |i| {
            let directory = &directory;
            let identity = &identity;
            async move {
                let mut config = sample_config(67890, 12345);
                config.buffer_length = (i % 100) as u32 + 1;
                directory.put_configuration(identity, &config).await?;
                Ok::<_, anyhow::Error>(0)
            }
        })
        .await
    }

    async fn benchmark_address_update(&self) -> Result<BenchmarkResult> {
        println!("\nBenchmark: Address Update");

        let (_, directory) = Self::fresh_directory();
        let identity = Self::seeded_device(&directory).await?;

        self.run_benchmark("Address Update", |i| {
            let directory = &directory;
            let identity = &identity;
            async move {
                let address = format!("10.0.{}.{}:9000", (i / 256) % 256, i % 256);
                directory.put_address(identity, &address).await?;
                Ok::<_, anyhow::Error>(0)
            }
        })
        .await
    }

    // =========================================================================
    // BENCHMARK: Creation
    // =========================================================================

    async fn benchmark_create_fresh(&self) -> Result<BenchmarkResult> {
        println!("\nBenchmark: Create (Fresh)");
        println!("  Every device has its own base serial; one probe per creation.");

        let (_, directory) = Self::fresh_directory();

        self.run_benchmark("Create (Fresh)", |i| {
            let directory = &directory;
            async move {
                let config = sample_config(67890, i as u32);
                directory.create_device(DeviceModel::IchibuV2, &config).await?;
                Ok::<_, anyhow::Error>(0)
            }
        })
        .await
    }

    async fn benchmark_create_colliding(&self) -> Result<BenchmarkResult> {
        println!("\nBenchmark: Create (Colliding)");
        println!("  Every device shares one base serial; probes grow with each creation.");

        let (_, directory) = Self::fresh_directory();
        let config = sample_config(67890, 12345);

        let (directory, config) = (&directory, &config);
        self.run_benchmark("Create (Colliding)", move |_| async move {
            directory.create_device(DeviceModel::IchibuV2, config).await?;
            Ok::<_, anyhow::Error>(0)
        })
        .await
    }

    async fn benchmark_collision_storm(&self) -> Result<BenchmarkResult> {
        println!("\nBenchmark: Collision Storm");
        println!(
            "  {} concurrent creators per round, same base serial, up to {} attempts each.",
            self.concurrency, self.max_attempts
        );

        let (store, directory) = Self::fresh_directory();
        let retry = RetryPolicy::new(self.max_attempts, Duration::from_micros(50));
        let concurrency = self.concurrency;

        let result = self
            .run_benchmark("Collision Storm", |round| {
                let directory = directory.clone();
                let retry = retry.clone();
                async move {
                    // Each round races on its own base serial
                    let config = sample_config(round as u32, 0);
                    let failures = Arc::new(AtomicU32::new(0));

                    let mut handles = Vec::with_capacity(concurrency);
                    for _ in 0..concurrency {
                        let directory = directory.clone();
                        let retry = retry.clone();
                        let config = config.clone();
                        let failures = Arc::clone(&failures);
                        handles.push(tokio::spawn(async move {
                            let outcome = retry
                                .run("create_device", || {
                                    directory.create_device(DeviceModel::LibraV0, &config)
                                })
                                .await;
                            if let Err(e) = outcome {
                                warn!(error = %e, "Storm creator gave up");
                                failures.fetch_add(1, Ordering::Relaxed);
                            }
                        }));
                    }
                    for handle in handles {
                        handle.await?;
                    }
                    Ok::<_, anyhow::Error>(failures.load(Ordering::Relaxed))
                }
            })
            .await?;

        // Serials must still be unique after the storm
        let devices = store.documents(shared::DEVICE_COLLECTION);
        let mut serials: Vec<_> = devices
            .iter()
            .filter_map(|d| d.fields.get(shared::FIELD_SERIAL_NUMBER).cloned())
            .map(|v| v.to_string())
            .collect();
        let total = serials.len();
        serials.sort();
        serials.dedup();
        if serials.len() != total {
            anyhow::bail!("Collision storm produced {} duplicate serials", total - serials.len());
        }
        info!(devices = total, "Collision storm left every serial unique");

        Ok(result)
    }
}

// =============================================================================
// CSV Export
// =============================================================================

fn export_to_csv(results: &[BenchmarkResult], filename: &str) -> Result<()> {
    use std::fs::File;
    use std::io::Write;

    let mut file = File::create(filename)?;

    // Header
    writeln!(file, "benchmark,iterations,min_us,max_us,mean_us,median_us,p95_us,p99_us,std_dev_us,failures,timestamp")?;

    // Data rows
    for r in results {
        writeln!(
            file,
            "{},{},{:.1},{:.1},{:.1},{:.1},{:.1},{:.1},{:.1},{},{}",
            r.name,
            r.iterations,
            r.min_us,
            r.max_us,
            r.mean_us,
            r.median_us,
            r.p95_us,
            r.p99_us,
            r.std_dev_us,
            r.failures,
            r.timestamp.to_rfc3339()
        )?;
    }

    println!("\nResults exported to: {}", filename);
    Ok(())
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    let log_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .init();

    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║       Mise Device Directory - Benchmark Suite              ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();
    println!("Configuration:");
    println!("  Iterations: {}", args.iterations);
    println!("  Storm concurrency: {}", args.concurrency);
    println!("  Warm-up: {}", if args.no_warmup { "disabled" } else { "enabled" });
    println!();

    let runner = BenchmarkRunner {
        iterations: args.iterations,
        concurrency: args.concurrency,
        max_attempts: args.max_attempts,
        warmup: !args.no_warmup,
        verbose: args.verbose,
    };

    let selected: Vec<BenchmarkType> = if args.all {
        BenchmarkType::value_variants().to_vec()
    } else if let Some(benchmark) = args.benchmark {
        vec![benchmark]
    } else {
        println!("No benchmark specified. Use --all or --benchmark <type>");
        println!();
        println!("Available benchmarks:");
        println!("  resolve               - Identity → entry → configuration");
        println!("  address-read          - Identity → entry address");
        println!("  configuration-update  - Replace a configuration");
        println!("  address-update        - Patch an entry's address");
        println!("  create-fresh          - Create devices with free base serials");
        println!("  create-colliding      - Create devices sharing a base serial");
        println!("  collision-storm       - Concurrent creators with retries");
        println!();
        println!("Example: cargo run --release -p benchmarks -- --all");
        return Ok(());
    };

    let mut results: Vec<BenchmarkResult> = Vec::new();
    for benchmark in selected {
        let result = match benchmark {
            BenchmarkType::Resolve => runner.benchmark_resolve().await?,
            BenchmarkType::AddressRead => runner.benchmark_address_read().await?,
            BenchmarkType::ConfigurationUpdate => runner.benchmark_configuration_update().await?,
            BenchmarkType::AddressUpdate => runner.benchmark_address_update().await?,
            BenchmarkType::CreateFresh => runner.benchmark_create_fresh().await?,
            BenchmarkType::CreateColliding => runner.benchmark_create_colliding().await?,
            BenchmarkType::CollisionStorm => runner.benchmark_collision_storm().await?,
        };
        result.print_report();
        results.push(result);
    }

    // Print summary
    println!("\n");
    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║                      SUMMARY                               ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();
    println!("{:<25} {:>12} {:>12} {:>12}", "Benchmark", "Mean", "P95", "P99");
    println!("{}", "-".repeat(64));

    for r in &results {
        println!(
            "{:<25} {:>10.1}µs {:>10.1}µs {:>10.1}µs",
            r.name, r.mean_us, r.p95_us, r.p99_us
        );
    }
    println!();

    // Export to CSV if requested
    if let Some(output_file) = args.output {
        export_to_csv(&results, &output_file)?;
    }

    Ok(())
}
