//! The wired-up orchestration core and its shutdown coordination.

use std::sync::Arc;
use std::time::Duration;

use synapse_broker::Broker;
use synapse_bus::{memory::MemoryBus, Bus, SchemaValidator};
use synapse_config::AppConfig;
use synapse_monitor::{CpuProbe, DependencyProbe, DiskProbe, LogSubsystemProbe, MemoryProbe, Monitor, Probe, ProcessProbe};
use synapse_observability::MetricsTap;
use synapse_scheduler::Scheduler;
use tokio::task::JoinHandle;

/// Every core component, constructor-injected rather than reached for as a
/// singleton (spec §9: "Singletons ... become explicit constructor-injected
/// values").
pub struct AgencyCore {
    pub bus: Arc<dyn Bus>,
    pub scheduler: Arc<Scheduler>,
    pub broker: Arc<Broker>,
    pub monitor: Arc<Monitor>,
    pub metrics: MetricsTap,
}

/// Handles to the background tasks [`AgencyCore::spawn`] started, so the
/// caller can drive shutdown (spec §5 "Shutdown cancels all in-flight
/// requests and flushes a shutdown event").
pub struct RunningTasks {
    broker_task: JoinHandle<()>,
    monitor_task: JoinHandle<()>,
    metrics_task: JoinHandle<()>,
}

impl AgencyCore {
    pub fn new(config: AppConfig) -> Self {
        let AppConfig { scheduler, broker, monitor } = config;

        let bus: Arc<dyn Bus> = Arc::new(MemoryBus::with_validator(Arc::new(SchemaValidator)));
        let scheduler = Arc::new(Scheduler::new(scheduler));
        let broker = Broker::new(broker, Arc::clone(&bus));

        let probes: Vec<Arc<dyn Probe>> = vec![
            Arc::new(MemoryProbe::new(monitor.memory_warning_percent)),
            Arc::new(CpuProbe::new(monitor.cpu_warning_percent)),
            Arc::new(DiskProbe::new(monitor.disk_warning_percent)),
            Arc::new(ProcessProbe::default()),
            Arc::new(LogSubsystemProbe::new(monitor.log_directory.clone())),
            Arc::new(DependencyProbe::new(monitor.dependency_credential_env_var.clone())),
        ];
        let monitor = Monitor::new(monitor, probes);

        Self {
            bus,
            scheduler,
            broker,
            monitor,
            metrics: MetricsTap::new(),
        }
    }

    /// Start the broker's dispatch loop, the monitor's probe/report
    /// cadence, and a metrics tap that samples both on a fixed interval.
    /// Each runs on its own task so a slow probe never blocks dispatch and
    /// vice versa (spec §5: "one or more broker dispatch tasks ... one
    /// per-probe cadence for the monitor").
    pub fn spawn(&self) -> RunningTasks {
        let broker_task = tokio::spawn(Arc::clone(&self.broker).run());
        let monitor_task = tokio::spawn(Arc::clone(&self.monitor).run());

        let metrics = self.metrics.clone();
        let scheduler = Arc::clone(&self.scheduler);
        let broker = Arc::clone(&self.broker);
        let monitor = Arc::clone(&self.monitor);
        let metrics_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(15));
            loop {
                ticker.tick().await;
                metrics.record_scheduler_snapshot(&scheduler.snapshot()).await;
                metrics.record_broker_stats(&broker.stats()).await;
                metrics.record_monitor_report(&monitor.latest_report()).await;
            }
        });

        RunningTasks {
            broker_task,
            monitor_task,
            metrics_task,
        }
    }

    /// Stop accepting new broker dispatches and tear down the background
    /// tasks. In-flight requests still finish or are killed by their own
    /// per-request deadline (spec §5 "Cancellation"); this call does not
    /// wait for that — it only stops new work and the cadences driving it.
    pub async fn shutdown(&self, tasks: RunningTasks) {
        self.broker.shutdown();
        tasks.monitor_task.abort();
        tasks.metrics_task.abort();
        // Give in-flight dispatches a moment to observe the shutdown state
        // and finish their current envelope before the process exits.
        let _ = tokio::time::timeout(Duration::from_secs(2), tasks.broker_task).await;
        tracing::info!("shutdown complete");
    }
}
