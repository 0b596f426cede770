use cslink::Config;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("CSLINK Startup");
    println!("==============\n");

    println!("1. Loading configuration...");
    println!("   Search paths (in priority order, lowest to highest):");
    for path in Config::search_paths() {
        let exists = path.exists();
        let status = if exists { "[found]" } else { "[not found]" };
        println!("   {} {}", status, path.display());
    }
    println!();

    let (config, loaded_paths) = match Config::load() {
        Ok(result) => result,
        Err(e) => {
            eprintln!("   Error loading config: {}", e);
            std::process::exit(1);
        }
    };

    if loaded_paths.is_empty() {
        println!("   No config files found, using defaults.");
    } else {
        println!("   Loaded {} config file(s):", loaded_paths.len());
        for path in &loaded_paths {
            println!("   - {}", path.display());
        }
    }

    println!("\n2. Resolved parameters...");
    println!("   csl.request_ahead_us:            {}", config.csl.request_ahead_us);
    println!("   csl.max_tx_attempts:             {}", config.csl.max_tx_attempts);
    println!("   wakeup.max_coordinators:         {}", config.wakeup.max_coordinators);
    println!("   wakeup.coordinator_evict_age_s:  {}", config.wakeup.coordinator_evict_age_secs);
    println!("   wakeup.connection_retry:         {}x{}",
        config.wakeup.connection_retry_interval, config.wakeup.connection_retry_count);
    println!("   wakeup.interval_us:              {}", config.wakeup.interval_us);
    println!("   wakeup.duration_ms:              {}", config.wakeup.duration_ms);

    println!("\nReady.");
}
