use std::sync::Mutex;
use std::time::{Duration, Instant};
#[cfg(feature = "cli")]
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// One checkpoint of a document run.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseStats {
    pub phase: String,
    /// Time spent since the previous checkpoint.
    pub duration: Duration,
    pub memory_mb: Option<u64>,
    pub cpu_usage: Option<f32>,
}

/// 記錄每份文件各處理階段（解析、抽取、正規化）的耗時與資源用量
pub struct SystemMonitor {
    #[cfg(feature = "cli")]
    system: Mutex<System>,
    #[cfg(feature = "cli")]
    pid: Option<Pid>,
    last_checkpoint: Mutex<Instant>,
    phases: Mutex<Vec<PhaseStats>>,
}

impl SystemMonitor {
    pub fn new() -> Self {
        Self {
            #[cfg(feature = "cli")]
            system: Mutex::new(System::new()),
            #[cfg(feature = "cli")]
            pid: sysinfo::get_current_pid().ok(),
            last_checkpoint: Mutex::new(Instant::now()),
            phases: Mutex::new(Vec::new()),
        }
    }

    /// Closes the current phase and logs it.
    pub fn record_phase(&self, phase: &str) -> Option<PhaseStats> {
        let now = Instant::now();
        let duration = {
            let mut last = self.last_checkpoint.lock().ok()?;
            let elapsed = now.duration_since(*last);
            *last = now;
            elapsed
        };
        let (memory_mb, cpu_usage) = self.process_usage();

        let stats = PhaseStats {
            phase: phase.to_string(),
            duration,
            memory_mb,
            cpu_usage,
        };
        match (memory_mb, cpu_usage) {
            (Some(memory), Some(cpu)) => tracing::info!(
                "📊 {} - {:?}, CPU: {:.1}%, Memory: {}MB",
                phase,
                duration,
                cpu,
                memory
            ),
            _ => tracing::info!("📊 {} - {:?}", phase, duration),
        }

        self.phases.lock().ok()?.push(stats.clone());
        Some(stats)
    }

    pub fn phases(&self) -> Vec<PhaseStats> {
        self.phases.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn peak_memory_mb(&self) -> Option<u64> {
        self.phases().iter().filter_map(|p| p.memory_mb).max()
    }

    /// Total time across recorded phases.
    pub fn total(&self) -> Duration {
        self.phases().iter().map(|p| p.duration).sum()
    }

    pub fn log_summary(&self, domains: usize, items: usize) {
        match self.peak_memory_mb() {
            Some(peak) => tracing::info!(
                "📈 {} domains, {} items in {:?} (peak memory {}MB)",
                domains,
                items,
                self.total(),
                peak
            ),
            None => tracing::info!("📈 {} domains, {} items in {:?}", domains, items, self.total()),
        }
    }

    #[cfg(feature = "cli")]
    fn process_usage(&self) -> (Option<u64>, Option<f32>) {
        let (Some(pid), Ok(mut system)) = (self.pid, self.system.lock()) else {
            return (None, None);
        };
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory().with_cpu(),
        );
        match system.process(pid) {
            Some(process) => (Some(process.memory() / 1024 / 1024), Some(process.cpu_usage())),
            None => (None, None),
        }
    }

    // 沒有 sysinfo 時只記錄耗時
    #[cfg(not(feature = "cli"))]
    fn process_usage(&self) -> (Option<u64>, Option<f32>) {
        (None, None)
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phases_are_recorded_in_order() {
        let monitor = SystemMonitor::new();
        monitor.record_phase("Document parsed").unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let extraction = monitor.record_phase("Extraction completed").unwrap();

        assert!(extraction.duration >= Duration::from_millis(5));
        let names: Vec<String> = monitor.phases().into_iter().map(|p| p.phase).collect();
        assert_eq!(names, vec!["Document parsed", "Extraction completed"]);
        assert!(monitor.total() >= extraction.duration);
    }
}
