//! Built-in probes (spec §4.D "Built-in probes"): memory, CPU, disk,
//! process, log-subsystem, dependency health.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use sysinfo::{Disks, System};
use synapse_contracts::{CoreError, ErrorKind};

use crate::probe::{Probe, ProbeReport};

fn metric(name: &str, value: f64) -> HashMap<String, f64> {
    let mut map = HashMap::new();
    map.insert(name.to_string(), value);
    map
}

/// Memory usage probe. Unhealthy once used/total exceeds `warning_percent`.
pub struct MemoryProbe {
    system: Mutex<System>,
    warning_percent: f64,
}

impl MemoryProbe {
    pub fn new(warning_percent: f64) -> Self {
        Self {
            system: Mutex::new(System::new()),
            warning_percent,
        }
    }
}

#[async_trait]
impl Probe for MemoryProbe {
    fn id(&self) -> &str {
        "memory"
    }

    fn name(&self) -> &str {
        "memory usage"
    }

    async fn check(&self) -> ProbeReport {
        let mut system = self.system.lock().unwrap();
        system.refresh_memory();
        let total = system.total_memory().max(1) as f64;
        let used = system.used_memory() as f64;
        let percent = used / total * 100.0;
        let metrics = metric("used_percent", percent);
        if percent >= self.warning_percent {
            ProbeReport::unhealthy(metrics, format!("memory usage {percent:.1}% >= {:.1}%", self.warning_percent))
        } else {
            ProbeReport::healthy(metrics)
        }
    }

    async fn heal(&self) -> Result<(), CoreError> {
        tracing::warn!("memory probe healing: releasing caches is delegated to the process embedding this crate");
        Ok(())
    }
}

/// CPU usage probe (spec §4.D: "CPU usage"). `sysinfo` needs two samples a
/// short interval apart before `cpu_usage()` is meaningful; this probe
/// refreshes twice with a brief sleep, matching the library's documented
/// usage pattern.
pub struct CpuProbe {
    system: Mutex<System>,
    warning_percent: f64,
}

impl CpuProbe {
    pub fn new(warning_percent: f64) -> Self {
        Self {
            system: Mutex::new(System::new()),
            warning_percent,
        }
    }
}

#[async_trait]
impl Probe for CpuProbe {
    fn id(&self) -> &str {
        "cpu"
    }

    fn name(&self) -> &str {
        "cpu usage"
    }

    async fn check(&self) -> ProbeReport {
        {
            let mut system = self.system.lock().unwrap();
            system.refresh_cpu_usage();
        }
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
        let percent = {
            let mut system = self.system.lock().unwrap();
            system.refresh_cpu_usage();
            system.global_cpu_usage() as f64
        };
        let metrics = metric("usage_percent", percent);
        if percent >= self.warning_percent {
            ProbeReport::unhealthy(metrics, format!("cpu usage {percent:.1}% >= {:.1}%", self.warning_percent))
        } else {
            ProbeReport::healthy(metrics)
        }
    }

    async fn heal(&self) -> Result<(), CoreError> {
        tracing::warn!("cpu probe healing: throttling is delegated to the scheduler's resource-quota gate");
        Ok(())
    }
}

/// Disk usage probe, averaged across every mounted disk `sysinfo` can see.
pub struct DiskProbe {
    warning_percent: f64,
}

impl DiskProbe {
    pub fn new(warning_percent: f64) -> Self {
        Self { warning_percent }
    }
}

#[async_trait]
impl Probe for DiskProbe {
    fn id(&self) -> &str {
        "disk"
    }

    fn name(&self) -> &str {
        "disk usage"
    }

    async fn check(&self) -> ProbeReport {
        let disks = Disks::new_with_refreshed_list();
        let (total, available) = disks
            .iter()
            .fold((0u64, 0u64), |(t, a), disk| (t + disk.total_space(), a + disk.available_space()));
        if total == 0 {
            return ProbeReport::unhealthy(HashMap::new(), "no disks reported by the system");
        }
        let used_percent = (1.0 - available as f64 / total as f64) * 100.0;
        let metrics = metric("used_percent", used_percent);
        if used_percent >= self.warning_percent {
            ProbeReport::unhealthy(
                metrics,
                format!("disk usage {used_percent:.1}% >= {:.1}%", self.warning_percent),
            )
        } else {
            ProbeReport::healthy(metrics)
        }
    }

    async fn heal(&self) -> Result<(), CoreError> {
        tracing::warn!("disk probe healing: scratch-directory sweep is delegated to the broker");
        Ok(())
    }
}

/// Process health probe: this process is alive and `sysinfo` can see it
/// (spec §4.D "process health").
pub struct ProcessProbe {
    system: Mutex<System>,
}

impl Default for ProcessProbe {
    fn default() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

#[async_trait]
impl Probe for ProcessProbe {
    fn id(&self) -> &str {
        "process"
    }

    fn name(&self) -> &str {
        "process health"
    }

    async fn check(&self) -> ProbeReport {
        let pid = sysinfo::Pid::from_u32(std::process::id());
        let mut system = self.system.lock().unwrap();
        system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
        match system.process(pid) {
            Some(process) => {
                let metrics = metric("memory_bytes", process.memory() as f64);
                ProbeReport::healthy(metrics)
            }
            None => ProbeReport::unhealthy(HashMap::new(), "own process id not found in process table"),
        }
    }

    async fn heal(&self) -> Result<(), CoreError> {
        Err(CoreError::new(ErrorKind::Unknown, "a process missing from its own process table cannot self-heal"))
    }
}

/// Log-subsystem health: the log directory exists and is writable (spec
/// §4.D "log-subsystem health").
pub struct LogSubsystemProbe {
    log_directory: PathBuf,
}

impl LogSubsystemProbe {
    pub fn new(log_directory: PathBuf) -> Self {
        Self { log_directory }
    }
}

#[async_trait]
impl Probe for LogSubsystemProbe {
    fn id(&self) -> &str {
        "log_subsystem"
    }

    fn name(&self) -> &str {
        "log subsystem health"
    }

    async fn check(&self) -> ProbeReport {
        if let Err(err) = tokio::fs::create_dir_all(&self.log_directory).await {
            return ProbeReport::unhealthy(HashMap::new(), format!("log directory unreachable: {err}"));
        }
        let probe_file = self.log_directory.join(".health-probe");
        match tokio::fs::write(&probe_file, b"ok").await {
            Ok(()) => {
                let _ = tokio::fs::remove_file(&probe_file).await;
                ProbeReport::healthy(HashMap::new())
            }
            Err(err) => ProbeReport::unhealthy(HashMap::new(), format!("log directory not writable: {err}")),
        }
    }

    async fn heal(&self) -> Result<(), CoreError> {
        tokio::fs::create_dir_all(&self.log_directory)
            .await
            .map_err(|e| CoreError::new(ErrorKind::Unknown, format!("failed to recreate log directory: {e}")))
    }
}

/// Dependency health: presence of the credentials/reachability signal the
/// model process needs (spec §4.D "dependency health"). This crate checks
/// only for the presence of the environment variable the broker's external
/// CLI relies on for authentication; it does not attempt a network call.
pub struct DependencyProbe {
    credential_env_var: String,
}

impl DependencyProbe {
    pub fn new(credential_env_var: impl Into<String>) -> Self {
        Self {
            credential_env_var: credential_env_var.into(),
        }
    }
}

#[async_trait]
impl Probe for DependencyProbe {
    fn id(&self) -> &str {
        "dependency"
    }

    fn name(&self) -> &str {
        "dependency health"
    }

    async fn check(&self) -> ProbeReport {
        if std::env::var_os(&self.credential_env_var).is_some() {
            ProbeReport::healthy(HashMap::new())
        } else {
            ProbeReport::unhealthy(
                HashMap::new(),
                format!("credential env var '{}' is not set", self.credential_env_var),
            )
        }
    }

    async fn heal(&self) -> Result<(), CoreError> {
        Err(CoreError::new(
            ErrorKind::Unknown,
            "missing credentials cannot be healed automatically; escalation required",
        ))
    }
}
