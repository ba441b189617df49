use anyhow::{ensure, Result};
use lifespan_core::{TtlConfig, TtlList, TtlMap};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lifespan_scenarios=info,lifespan_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("🧪 Lifespan Scenarios");
    println!();

    scenario_map_expiry()?;
    scenario_list_refill()?;
    scenario_list_remove_all()?;
    scenario_seeded_snapshot()?;
    scenario_concurrent_stress(TtlConfig::from_env())?;

    println!();
    tracing::info!("✅ All scenarios passed!");

    Ok(())
}

fn millis(interval: u64, lifespan: u64) -> TtlConfig {
    TtlConfig::default()
        .with_interval(Duration::from_millis(interval))
        .with_lifespan(Duration::from_millis(lifespan))
}

/// Map entry readable inside its lifespan, gone one interval after it
fn scenario_map_expiry() -> Result<()> {
    tracing::info!("Scenario A: map entry expiry (interval 50ms, lifespan 500ms)");

    let map = TtlMap::new(millis(50, 500))?;
    map.insert("k", "v");

    thread::sleep(Duration::from_millis(300));
    ensure!(map.try_get("k") == Some("v"), "entry should be present at 300ms");

    thread::sleep(Duration::from_millis(400));
    ensure!(map.try_get("k").is_none(), "entry should be swept by 700ms");

    map.stop();
    tracing::info!("   ✓ present at 300ms, absent at 700ms");
    Ok(())
}

/// List empties after expiry and can be refilled
fn scenario_list_refill() -> Result<()> {
    tracing::info!("Scenario B: list empties and refills (interval 50ms, lifespan 1000ms)");

    let list = TtlList::new(millis(50, 1000))?;
    list.push("a");

    thread::sleep(Duration::from_millis(1100));
    ensure!(list.is_empty(), "list should be empty after first lifespan");

    list.push("b");
    list.push("c");
    ensure!(list.len() == 2, "expected 2 elements, got {}", list.len());

    thread::sleep(Duration::from_millis(1100));
    ensure!(list.is_empty(), "list should be empty after second lifespan");

    tracing::info!("   ✓ swept twice, count back to zero each time");
    Ok(())
}

/// Removing by value drops every match
fn scenario_list_remove_all() -> Result<()> {
    tracing::info!("Scenario C: remove all matching elements");

    let list = TtlList::new(TtlConfig::default())?;
    list.push("x".to_string());
    list.push("y".to_string());
    list.push("x".to_string());

    ensure!(list.remove(&"x".to_string()), "remove should report a match");
    ensure!(list.len() == 1, "expected 1 element, got {}", list.len());
    ensure!(list.get(0)? == "y", "remaining element should be \"y\"");

    tracing::info!("   ✓ both \"x\" removed, \"y\" kept");
    Ok(())
}

/// A seeded map snapshots back to its seed
fn scenario_seeded_snapshot() -> Result<()> {
    tracing::info!("Scenario D: seeded map snapshot");

    let seed: HashMap<String, String> = HashMap::from([
        ("a".to_string(), "1".to_string()),
        ("b".to_string(), "2".to_string()),
    ]);
    let config = TtlConfig::default().with_lifespan(Duration::from_secs(3600));
    let map = TtlMap::with_data(config, seed.clone())?;

    ensure!(map.snapshot() == seed, "snapshot should equal seed");

    tracing::info!("   ✓ snapshot matches seed");
    Ok(())
}

/// Writers, readers and the sweep thread hammer one map at once
fn scenario_concurrent_stress(config: TtlConfig) -> Result<()> {
    let threads = 8;
    let per_thread = 2_000;
    tracing::info!(
        "Scenario E: concurrent stress ({} threads x {} ops, interval {:?}, lifespan {:?})",
        threads,
        per_thread,
        config.interval,
        config.lifespan
    );

    let map = Arc::new(TtlMap::new(config)?);
    let start = Instant::now();

    let handles: Vec<_> = (0..threads)
        .map(|thread_id| {
            let map = Arc::clone(&map);
            thread::spawn(move || {
                for i in 0..per_thread {
                    let key = format!("stress-{}-{}", thread_id, i);
                    map.insert(key.clone(), i);
                    let _ = map.try_get(&key);
                    if i % 4 == 0 {
                        let _ = map.remove(&key);
                    }
                    if i % 100 == 0 {
                        // Point-in-time copy while others mutate
                        let _ = map.iter().count();
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        if handle.join().is_err() {
            anyhow::bail!("stress thread panicked");
        }
    }

    let elapsed = start.elapsed();
    let snapshot = map.snapshot();
    ensure!(
        snapshot.len() == map.len(),
        "snapshot size {} disagrees with len {}",
        snapshot.len(),
        map.len()
    );
    ensure!(
        snapshot.len() <= threads * per_thread * 3 / 4,
        "more entries than were ever live"
    );

    let stats = map.scheduler_stats();
    tracing::info!(
        "   ✓ {} live entries after {:?} ({} sweeps, {} removed, {} faults)",
        snapshot.len(),
        elapsed,
        stats.sweeps,
        stats.removed,
        stats.faults
    );
    Ok(())
}
