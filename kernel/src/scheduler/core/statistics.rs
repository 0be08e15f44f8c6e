//! Statistics - Per-thread exit accounting and system-wide run statistics
//!
//! Every non-root exit folds its [`ExitSummary`] into [`SystemStats`]; the
//! scheduler adds dispatch and idle counters as it runs.

use alloc::vec::Vec;
use core::fmt;

use crate::scheduler::thread::Pid;

/// Final accounting record of one exited thread, all times in ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitSummary {
    pub pid: Pid,
    pub exit_code: i32,
    pub instructions: u64,
    pub start_tick: u64,
    pub exit_tick: u64,
    pub max_burst: u64,
    pub min_burst: u64,
    pub total_burst: u64,
    pub bursts: u64,
    pub sleep_time: u64,
    /// Time spent ready but not running
    pub wait_time: u64,
    /// `100 * total_burst / (exit_tick - start_tick)`, 0 for a zero lifetime
    pub utilization: u64,
}

impl ExitSummary {
    pub fn lifetime(&self) -> u64 {
        self.exit_tick.saturating_sub(self.start_tick)
    }

    pub fn average_burst(&self) -> u64 {
        if self.bursts > 0 {
            self.total_burst / self.bursts
        } else {
            0
        }
    }
}

impl fmt::Display for ExitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "[pid {}]: Exit code {} instructions {} entry {} exit {}",
            self.pid, self.exit_code, self.instructions, self.start_tick, self.exit_tick
        )?;
        writeln!(
            f,
            "[pid {}]: max burst {} min burst {} total burst {} average burst {} bursts {}",
            self.pid,
            self.max_burst,
            self.min_burst,
            self.total_burst,
            self.average_burst(),
            self.bursts
        )?;
        write!(
            f,
            "[pid {}]: sleep {} wait {} utilization {}%",
            self.pid, self.sleep_time, self.wait_time, self.utilization
        )
    }
}

/// System-wide statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemStats {
    /// Sum of CPU bursts of exited threads
    pub busy_time: u64,
    /// Tick of the most recent non-root exit
    pub total_execution_time: u64,
    pub max_burst: u64,
    pub min_burst: Option<u64>,
    pub num_bursts: u64,
    pub num_exited: u64,
    pub max_completion: u64,
    pub min_completion: Option<u64>,
    /// Lifetime of every exited thread, in exit order
    pub completion_times: Vec<u64>,
    /// Sum of `lifetime - sleep_time` over exited threads; includes their own bursts
    pub total_wait: u64,
    /// Accumulated `|predicted - actual|` over all predicted bursts
    pub estimation_error: f64,
    pub total_switches: u64,
    pub idle_ticks: u64,
    /// Pid of every dispatched thread, in order, when tracing is enabled
    pub dispatch_trace: Vec<Pid>,
}

impl SystemStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold an exiting thread into the totals
    pub fn record_exit(&mut self, summary: &ExitSummary) {
        self.busy_time += summary.total_burst;
        self.total_execution_time = summary.exit_tick;
        self.max_burst = self.max_burst.max(summary.max_burst);
        if summary.bursts > 0 {
            self.min_burst = Some(
                self.min_burst
                    .map_or(summary.min_burst, |m| m.min(summary.min_burst)),
            );
        }
        self.num_bursts += summary.bursts;
        self.num_exited += 1;

        let completion = summary.lifetime();
        self.max_completion = self.max_completion.max(completion);
        self.min_completion = Some(self.min_completion.map_or(completion, |m| m.min(completion)));
        self.completion_times.push(completion);
        self.total_wait += completion.saturating_sub(summary.sleep_time);
    }

    /// Count a transfer to `pid`
    pub fn record_dispatch(&mut self, pid: Pid, trace: bool) {
        self.total_switches += 1;
        if trace {
            self.dispatch_trace.push(pid);
        }
    }

    pub fn record_idle(&mut self, ticks: u64) {
        self.idle_ticks += ticks;
    }

    pub fn record_estimation_error(&mut self, error: f64) {
        self.estimation_error += error;
    }

    /// Busy time as a percentage of total execution time
    pub fn cpu_utilization(&self) -> f64 {
        if self.total_execution_time == 0 {
            return 0.0;
        }
        100.0 * self.busy_time as f64 / self.total_execution_time as f64
    }

    pub fn average_burst(&self) -> f64 {
        if self.num_bursts == 0 {
            return 0.0;
        }
        self.busy_time as f64 / self.num_bursts as f64
    }

    pub fn average_wait(&self) -> f64 {
        if self.num_exited == 0 {
            return 0.0;
        }
        self.total_wait as f64 / self.num_exited as f64
    }

    pub fn average_completion(&self) -> f64 {
        if self.completion_times.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.completion_times.iter().sum();
        sum as f64 / self.completion_times.len() as f64
    }

    /// Population variance of the completion times
    pub fn completion_variance(&self) -> f64 {
        if self.completion_times.is_empty() {
            return 0.0;
        }
        let mean = self.average_completion();
        let sum: f64 = self
            .completion_times
            .iter()
            .map(|&t| {
                let d = t as f64 - mean;
                d * d
            })
            .sum();
        sum / self.completion_times.len() as f64
    }

    /// Estimation error relative to the total busy time
    pub fn relative_estimation_error(&self) -> f64 {
        if self.busy_time == 0 {
            return 0.0;
        }
        self.estimation_error / self.busy_time as f64
    }
}

impl fmt::Display for SystemStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total CPU busy time: {}", self.busy_time)?;
        writeln!(f, "Total execution time: {}", self.total_execution_time)?;
        writeln!(f, "CPU utilization: {:.2}%", self.cpu_utilization())?;
        writeln!(
            f,
            "Bursts: {} (max {} min {} average {:.2})",
            self.num_bursts,
            self.max_burst,
            self.min_burst.unwrap_or(0),
            self.average_burst()
        )?;
        writeln!(
            f,
            "Completion: max {} min {} average {:.2} variance {:.2}",
            self.max_completion,
            self.min_completion.unwrap_or(0),
            self.average_completion(),
            self.completion_variance()
        )?;
        writeln!(f, "Average wait time: {:.2}", self.average_wait())?;
        writeln!(
            f,
            "Estimation error: {:.2} (relative {:.4})",
            self.estimation_error,
            self.relative_estimation_error()
        )?;
        write!(
            f,
            "Exited threads: {} context switches: {} idle ticks: {}",
            self.num_exited, self.total_switches, self.idle_ticks
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(pid: Pid, start: u64, exit: u64, total: u64, bursts: u64) -> ExitSummary {
        ExitSummary {
            pid,
            exit_code: 0,
            instructions: total,
            start_tick: start,
            exit_tick: exit,
            max_burst: total,
            min_burst: if bursts > 0 { total / bursts } else { 0 },
            total_burst: total,
            bursts,
            sleep_time: 0,
            wait_time: (exit - start) - total,
            utilization: 100 * total / (exit - start),
        }
    }

    #[test]
    fn test_record_exit_aggregates() {
        let mut stats = SystemStats::new();
        stats.record_exit(&summary(1, 0, 100, 40, 2));
        stats.record_exit(&summary(2, 10, 210, 60, 3));

        assert_eq!(stats.busy_time, 100);
        assert_eq!(stats.total_execution_time, 210);
        assert_eq!(stats.num_bursts, 5);
        assert_eq!(stats.num_exited, 2);
        assert_eq!(stats.max_burst, 60);
        assert_eq!(stats.min_burst, Some(20));
        assert_eq!(stats.completion_times, vec![100, 200]);
        assert_eq!(stats.max_completion, 200);
        assert_eq!(stats.min_completion, Some(100));
        assert_eq!(stats.total_wait, 100 + 200);
        assert_eq!(stats.average_wait(), 150.0);
        assert_eq!(stats.completion_variance(), 2500.0);
    }

    #[test]
    fn test_total_wait_excludes_sleep_only() {
        let mut stats = SystemStats::new();
        let mut exited = summary(1, 0, 100, 30, 3);
        exited.sleep_time = 25;
        exited.wait_time = 100 - 30 - 25;
        stats.record_exit(&exited);

        // the per-thread figure drops the bursts, the aggregate does not
        assert_eq!(exited.wait_time, 45);
        assert_eq!(stats.total_wait, 75);
    }

    #[test]
    fn test_burstless_exit_does_not_touch_min_burst() {
        let mut stats = SystemStats::new();
        stats.record_exit(&summary(1, 0, 10, 0, 0));
        assert_eq!(stats.min_burst, None);
        assert_eq!(stats.average_burst(), 0.0);
    }

    #[test]
    fn test_dispatch_trace() {
        let mut stats = SystemStats::new();
        stats.record_dispatch(0, true);
        stats.record_dispatch(3, true);
        stats.record_dispatch(4, false);
        assert_eq!(stats.total_switches, 3);
        assert_eq!(stats.dispatch_trace, vec![0, 3]);
    }

    #[test]
    fn test_empty_stats_ratios() {
        let stats = SystemStats::new();
        assert_eq!(stats.cpu_utilization(), 0.0);
        assert_eq!(stats.average_completion(), 0.0);
        assert_eq!(stats.relative_estimation_error(), 0.0);
    }

    #[test]
    fn test_summary_display() {
        let text = summary(7, 0, 50, 25, 5).to_string();
        assert!(text.contains("[pid 7]: Exit code 0"));
        assert!(text.contains("utilization 50%"));
    }
}
