use task_pool::{Config, ThreadPool};
use std::time::Instant;
use tracing_subscriber::EnvFilter;


fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let now = Instant::now();
    let pool = ThreadPool::with_config(Config::cpu_bound())?;

    let handles: Vec<_> = (0..1_000_000u64)
        .map(|i| pool.submit(move |_| i.wrapping_mul(i)))
        .collect();

    let mut sum = 0u64;
    for handle in handles {
        sum = sum.wrapping_add(handle.wait()?);
    }

    pool.stop(true);
    println!("sum: {sum}, elapsed: {:?}", now.elapsed());
    Ok(())
}
