use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::Runtime;
use weavegraph_coordinator::coordination::bus::CoordinationBus;
use weavegraph_coordinator::coordination::events::NodeExecutionEvent;
use weavegraph_coordinator::node::NodeId;

const BATCH_SIZES: &[usize] = &[64, 256, 1024];

async fn publish_batch(bus: &CoordinationBus, batch: usize) {
    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = delivered.clone();
    bus.subscribe::<NodeExecutionEvent, _, _>(move |_event| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    });

    for i in 0..batch {
        bus.publish(NodeExecutionEvent {
            source: "bench".to_string(),
            timestamp: chrono::Utc::now(),
            workflow_id: "bench-workflow".to_string(),
            node_id: NodeId(i as u64),
            status: weavegraph_coordinator::coordination::events::NodeExecutionStatus::Completed,
            output: None,
            error_message: None,
        });
    }

    while delivered.load(Ordering::Relaxed) < batch {
        tokio::task::yield_now().await;
    }
}

fn event_bus_throughput(c: &mut Criterion) {
    let runtime = Runtime::new().expect("runtime");
    let mut group = c.benchmark_group("coordination_bus_publish");

    for &batch in BATCH_SIZES {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &size| {
            b.to_async(&runtime).iter(|| async move {
                let bus = CoordinationBus::new();
                publish_batch(&bus, size).await;
            });
        });
    }

    group.finish();
}

criterion_group!(benches, event_bus_throughput);
criterion_main!(benches);
