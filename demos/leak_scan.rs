//! Walkthrough of a leak scan against the reference collaborator.
//!
//! Seeds a plan cache the way a query layer would: composite keys that
//! captured their parameter bindings at admission time, plus an unrelated
//! warmup entry. Then probes the cache for suspect groups and prints the
//! verdicts.
//!
//! Run with: cargo run --example leak_scan

use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use leak_probe::testkit::{self, MemoryCache, QueryPlanKey};
use leak_probe::{AccessorFactory, LeakDetector, TypeRegistry};

#[allow(dead_code)]
mod widgets {
    pub struct Gizmo {
        pub serial: u64,
    }
}

#[allow(dead_code)]
mod ordering {
    pub struct OrderBatch {
        pub order_ids: Vec<u64>,
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== Cache leak probe walkthrough ===\n");

    // 1. Wire the probe: collaborator shape, accessor factory, detector.
    let registry = Arc::new(TypeRegistry::new());
    testkit::register_reference_shapes(&registry);
    let detector = LeakDetector::new(Arc::new(AccessorFactory::new(registry)));

    // 2. Seed the cache the way a query layer would.
    let mut cache = MemoryCache::new();
    cache.insert(
        QueryPlanKey::new("SELECT g FROM gizmos WHERE g.serial IN (?)")
            .bind("serials", Box::new(widgets::Gizmo { serial: 42 })),
        Box::new(String::from("plan: index-scan gizmos")),
    );
    cache.insert(
        QueryPlanKey::new("UPDATE orders SET state = ? WHERE batch = ?")
            .bind(
                "batch",
                Box::new(ordering::OrderBatch {
                    order_ids: vec![101, 102, 103],
                }),
            )
            .bind_absent("state"),
        Box::new(String::from("plan: seq-scan orders")),
    );
    cache.insert("schema-version".to_string(), Box::new(7u32));
    println!("Seeded {} cache entries\n", cache.len());

    // 3. Verdicts per suspect group.
    for group in ["widgets", "ordering", "sprockets"] {
        if detector.detect(&cache, group)? {
            println!("LEAK:  cache retains at least one `{group}` object");
        } else {
            println!("clean: no `{group}` objects retained");
        }
    }

    // 4. Full accounting for one group.
    let report = detector.scan(&cache, "ordering")?;
    println!("\n{}", report.format_report());
    println!("\nAs JSON:\n{}", report.to_json()?);

    Ok(())
}
