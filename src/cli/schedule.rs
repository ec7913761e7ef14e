//! Scenario scheduling
//!
//! Parallel scenarios run on blocking worker threads, bounded by a
//! semaphore. Exclusive scenarios run afterwards, one at a time.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::common::{Error, Result};
use crate::testing::{panic_message, RunResult, ScenarioConfig, ScenarioRunner};

/// Set once an interrupt arrives; scenarios not yet started are skipped
#[derive(Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Record an interrupt; true if one had already been received
    fn escalate(&self) -> bool {
        self.0.swap(true, Ordering::SeqCst)
    }

    /// Intercept Ctrl-C so in-flight scenarios still reach teardown
    ///
    /// A second Ctrl-C exits immediately, leaving whatever teardown is in
    /// progress unfinished.
    pub fn install(&self, workdir_root: PathBuf) {
        let flag = self.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if flag.escalate() {
                    tracing::error!(
                        "Second interrupt, exiting before teardown finished; state may remain in \
                         working copies under {} or in exclusive scenarios' source directories",
                        workdir_root.display()
                    );
                    std::process::exit(130);
                }
                tracing::warn!(
                    "Interrupt received, waiting for running scenarios to tear down \
                     (press Ctrl-C again to force quit)"
                );
            }
        });
    }
}

/// Run every scenario and return results in input order
pub async fn run_all(
    runner: &ScenarioRunner,
    scenarios: Vec<ScenarioConfig>,
    max_parallel: usize,
    interrupt: &Interrupt,
) -> Result<Vec<RunResult>> {
    let total = scenarios.len();
    let (parallel, exclusive): (Vec<_>, Vec<_>) =
        scenarios.into_iter().enumerate().partition(|(_, s)| s.parallel);

    let mut results: Vec<Option<RunResult>> = vec![None; total];
    let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));
    let mut set = JoinSet::new();

    for (index, config) in parallel {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;
        if interrupt.is_triggered() {
            results[index] = Some(skipped(&config));
            continue;
        }
        let runner = runner.clone();
        set.spawn_blocking(move || {
            let _permit = permit;
            let result = run_catching(&runner, &config);
            (index, result)
        });
    }

    while let Some(joined) = set.join_next().await {
        let (index, result) = joined.map_err(|e| Error::Internal(format!("Worker failed: {e}")))?;
        results[index] = Some(result);
    }

    for (index, config) in exclusive {
        if interrupt.is_triggered() {
            results[index] = Some(skipped(&config));
            continue;
        }
        let runner = runner.clone();
        let result = tokio::task::spawn_blocking(move || run_catching(&runner, &config))
            .await
            .map_err(|e| Error::Internal(format!("Worker failed: {e}")))?;
        results[index] = Some(result);
    }

    Ok(results.into_iter().flatten().collect())
}

/// Run a scenario, turning a panic that escapes the runner into a result
///
/// Panics during provisioning are reported by the runner itself with the
/// real teardown status; this only covers a panic before the teardown
/// guard is armed, when nothing has been provisioned.
fn run_catching(runner: &ScenarioRunner, config: &ScenarioConfig) -> RunResult {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| runner.run(config))).unwrap_or_else(
        |payload| {
            RunResult::aborted(config, &format!("panicked: {}", panic_message(payload.as_ref())))
        },
    )
}

fn skipped(config: &ScenarioConfig) -> RunResult {
    RunResult::aborted(config, "interrupted before start")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use parking_lot::Mutex;
    use serde_json::json;
    use tempfile::TempDir;

    use crate::provision::{Provisioner, TerraformOptions};
    use crate::testing::{IsolationKey, RunStatus, RunnerOptions, TeardownStatus};

    /// Provisioner that records start/end events and tracks concurrency
    #[derive(Default)]
    struct RecordingProvisioner {
        events: Mutex<Vec<String>>,
        active: AtomicUsize,
        peak: AtomicUsize,
        apply_delay: Duration,
        panic_on: Option<&'static str>,
        fail_destroy_on: Option<&'static str>,
        interrupt_on: Option<(&'static str, Interrupt)>,
    }

    impl RecordingProvisioner {
        fn scenario(options: &TerraformOptions) -> String {
            options.vars["scenario"].as_str().unwrap_or_default().to_string()
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().clone()
        }

        fn position(&self, event: &str) -> usize {
            self.events()
                .iter()
                .position(|e| e == event)
                .unwrap_or_else(|| panic!("missing event '{event}'"))
        }

        fn count(&self, prefix: &str) -> usize {
            self.events().iter().filter(|e| e.starts_with(prefix)).count()
        }
    }

    impl Provisioner for RecordingProvisioner {
        fn init_and_apply(&self, options: &TerraformOptions) -> Result<()> {
            let name = Self::scenario(options);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.events.lock().push(format!("start {name}"));

            if let Some((target, interrupt)) = &self.interrupt_on {
                if *target == name {
                    interrupt.trigger();
                }
            }
            std::thread::sleep(self.apply_delay);

            self.events.lock().push(format!("end {name}"));
            self.active.fetch_sub(1, Ordering::SeqCst);
            if self.panic_on == Some(name.as_str()) {
                panic!("provider crashed in {name}");
            }
            Ok(())
        }

        fn output(&self, _options: &TerraformOptions, name: &str) -> Result<String> {
            Err(Error::output_read(name, "Output not found"))
        }

        fn destroy(&self, options: &TerraformOptions) -> Result<()> {
            let name = Self::scenario(options);
            self.events.lock().push(format!("destroy {name}"));
            if self.fail_destroy_on == Some(name.as_str()) {
                return Err(Error::Destroy("DependencyViolation".to_string()));
            }
            Ok(())
        }
    }

    struct Fixture {
        _temp: TempDir,
        module_dir: PathBuf,
        workdir_root: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = tempfile::tempdir().unwrap();
            let module_dir = temp.path().join("module");
            std::fs::create_dir_all(&module_dir).unwrap();
            std::fs::write(module_dir.join("main.tf"), "# module").unwrap();
            let workdir_root = temp.path().join("work");
            Self {
                _temp: temp,
                module_dir,
                workdir_root,
            }
        }

        fn runner(&self, provisioner: Arc<RecordingProvisioner>) -> ScenarioRunner {
            ScenarioRunner::new(
                provisioner,
                RunnerOptions {
                    upgrade: false,
                    env: BTreeMap::new(),
                    workdir_root: self.workdir_root.clone(),
                    keep_workdirs: false,
                },
            )
        }

        fn scenario(&self, name: &str, parallel: bool) -> ScenarioConfig {
            ScenarioConfig::new(name, &self.module_dir, IsolationKey::fixed(name))
                .parallel(parallel)
                .variable("scenario", json!(name))
        }
    }

    fn names(results: &[RunResult]) -> Vec<&str> {
        results.iter().map(|r| r.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_results_follow_input_order() {
        let fixture = Fixture::new();
        let fake = Arc::new(RecordingProvisioner {
            apply_delay: Duration::from_millis(20),
            ..Default::default()
        });
        let runner = fixture.runner(fake.clone());
        let scenarios = vec![
            fixture.scenario("ex1", false),
            fixture.scenario("p1", true),
            fixture.scenario("ex2", false),
            fixture.scenario("p2", true),
            fixture.scenario("p3", true),
        ];

        let results = run_all(&runner, scenarios, 2, &Interrupt::default())
            .await
            .unwrap();

        assert_eq!(names(&results), vec!["ex1", "p1", "ex2", "p2", "p3"]);
        assert!(results.iter().all(|r| r.passed()));
        assert!(results.iter().all(|r| r.teardown == TeardownStatus::Destroyed));
    }

    #[tokio::test]
    async fn test_exclusive_scenarios_run_after_parallel_batch_one_at_a_time() {
        let fixture = Fixture::new();
        let fake = Arc::new(RecordingProvisioner {
            apply_delay: Duration::from_millis(20),
            ..Default::default()
        });
        let runner = fixture.runner(fake.clone());
        let scenarios = vec![
            fixture.scenario("ex1", false),
            fixture.scenario("p1", true),
            fixture.scenario("ex2", false),
            fixture.scenario("p2", true),
        ];

        run_all(&runner, scenarios, 4, &Interrupt::default())
            .await
            .unwrap();

        let first_exclusive = fake.position("start ex1");
        for parallel in ["p1", "p2"] {
            assert!(fake.position(&format!("destroy {parallel}")) < first_exclusive);
        }
        assert!(fake.position("destroy ex1") < fake.position("start ex2"));
    }

    #[tokio::test]
    async fn test_max_parallel_bounds_concurrent_applies() {
        let fixture = Fixture::new();
        let fake = Arc::new(RecordingProvisioner {
            apply_delay: Duration::from_millis(30),
            ..Default::default()
        });
        let runner = fixture.runner(fake.clone());
        let scenarios = (0..6)
            .map(|i| fixture.scenario(&format!("p{i}"), true))
            .collect();

        let results = run_all(&runner, scenarios, 2, &Interrupt::default())
            .await
            .unwrap();

        assert_eq!(results.len(), 6);
        assert!(fake.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(fake.count("destroy"), 6);
    }

    #[tokio::test]
    async fn test_interrupt_skips_pending_scenarios_and_tears_down_running_one() {
        let fixture = Fixture::new();
        let interrupt = Interrupt::default();
        let fake = Arc::new(RecordingProvisioner {
            interrupt_on: Some(("p1", interrupt.clone())),
            ..Default::default()
        });
        let runner = fixture.runner(fake.clone());
        let scenarios = vec![
            fixture.scenario("p1", true),
            fixture.scenario("p2", true),
            fixture.scenario("ex1", false),
        ];

        let results = run_all(&runner, scenarios, 1, &interrupt).await.unwrap();

        assert_eq!(results[0].status, RunStatus::Passed);
        assert_eq!(results[0].teardown, TeardownStatus::Destroyed);
        for skipped in &results[1..] {
            assert_eq!(
                skipped.status,
                RunStatus::Aborted("interrupted before start".to_string())
            );
            assert_eq!(skipped.teardown, TeardownStatus::Skipped);
        }
        assert_eq!(fake.count("start"), 1);
        assert_eq!(fake.count("destroy"), 1);
    }

    #[tokio::test]
    async fn test_panic_is_reported_without_stopping_the_batch() {
        let fixture = Fixture::new();
        let fake = Arc::new(RecordingProvisioner {
            panic_on: Some("p1"),
            fail_destroy_on: Some("p1"),
            ..Default::default()
        });
        let runner = fixture.runner(fake.clone());
        let scenarios = vec![
            fixture.scenario("p1", true),
            fixture.scenario("p2", true),
            fixture.scenario("ex1", false),
        ];

        let results = run_all(&runner, scenarios, 2, &Interrupt::default())
            .await
            .unwrap();

        let crashed = &results[0];
        assert!(
            matches!(crashed.status, RunStatus::Aborted(ref r) if r.contains("provider crashed in p1"))
        );
        assert!(
            matches!(crashed.teardown, TeardownStatus::Failed(ref d) if d.contains("DependencyViolation"))
        );
        let kept = crashed.working_dir.as_ref().expect("working dir recorded");
        assert!(kept.exists(), "state must stay on disk after a failed destroy");

        assert!(results[1].passed());
        assert!(results[2].passed());
        assert_eq!(fake.count("destroy"), 3);
    }

    #[test]
    fn test_second_interrupt_escalates() {
        let interrupt = Interrupt::default();
        assert!(!interrupt.is_triggered());
        assert!(!interrupt.escalate());
        assert!(interrupt.is_triggered());
        assert!(interrupt.escalate());
    }
}
