//! Test doubles for the orchestrator seams
//!
//! Every fake is cheaply cloneable and shares its state, so a test can hand one clone to
//! the [`RunContext`] and keep another to inspect what happened.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::contention::{ContentionProbe, ContentionSnapshot, InterventionMode, InterventionReport};
use crate::context::RunContext;
use crate::error::Result;
use crate::operator::{ContentionChoice, MenuChoice, Operator};
use crate::progress::{MessageLevel, ProgressReporter};
use crate::runner::{CommandRunner, CommandSpec, OperationResult};

/// Runner that answers from scripted results keyed by a leading run of whole words
///
/// Results queued for a prefix are consumed in order; the last one repeats forever.
/// Commands without a rule succeed with empty output.
#[derive(Clone, Default)]
pub struct ScriptedRunner {
    inner: Arc<Mutex<RunnerScript>>,
}

#[derive(Default)]
struct RunnerScript {
    rules: Vec<(String, VecDeque<OperationResult>)>,
    calls: Vec<String>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, prefix: &str, results: Vec<OperationResult>) -> &Self {
        self.inner
            .lock()
            .unwrap()
            .rules
            .push((prefix.to_string(), results.into()));
        self
    }

    pub fn always_fail(&self, prefix: &str) -> &Self {
        self.respond(prefix, vec![OperationResult::failed(1, format!("{prefix} failed"))])
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| starts_with_words(c, prefix))
            .count()
    }
}

/// `line` begins with `prefix` and the match ends on a word boundary
fn starts_with_words(line: &str, prefix: &str) -> bool {
    line.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(' '))
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, spec: &CommandSpec) -> OperationResult {
        let line = spec.to_string();
        let mut script = self.inner.lock().unwrap();
        script.calls.push(line.clone());
        let Some((_, queue)) = script
            .rules
            .iter_mut()
            .find(|(prefix, _)| starts_with_words(&line, prefix))
        else {
            return OperationResult::succeeded("");
        };
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or_else(|| OperationResult::succeeded(""))
        }
    }
}

/// Operator that replays scripted answers and records every prompt
///
/// When a queue runs dry the answer is Continue / Wait / no.
#[derive(Clone, Default)]
pub struct ScriptedOperator {
    inner: Arc<Mutex<OperatorScript>>,
}

#[derive(Default)]
struct OperatorScript {
    recovery: VecDeque<MenuChoice>,
    contention: VecDeque<ContentionChoice>,
    confirmations: VecDeque<bool>,
    prompts: Vec<String>,
    shown: Vec<(String, String)>,
}

impl ScriptedOperator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recovery(self, choices: &[MenuChoice]) -> Self {
        self.inner.lock().unwrap().recovery.extend(choices);
        self
    }

    pub fn with_contention(self, choices: &[ContentionChoice]) -> Self {
        self.inner.lock().unwrap().contention.extend(choices);
        self
    }

    pub fn with_confirmations(self, answers: &[bool]) -> Self {
        self.inner.lock().unwrap().confirmations.extend(answers);
        self
    }

    /// Prompts in the order they were shown: `recovery:<subject>`, `contention:<resource>`,
    /// `confirm:<question>`
    pub fn prompts(&self) -> Vec<String> {
        self.inner.lock().unwrap().prompts.clone()
    }

    pub fn prompt_count(&self, kind: &str) -> usize {
        self.prompts()
            .iter()
            .filter(|p| p.starts_with(&format!("{kind}:")))
            .count()
    }

    pub fn shown(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().shown.clone()
    }
}

impl Operator for ScriptedOperator {
    fn choose_recovery(&mut self, subject: &str) -> Result<MenuChoice> {
        let mut script = self.inner.lock().unwrap();
        script.prompts.push(format!("recovery:{subject}"));
        Ok(script.recovery.pop_front().unwrap_or(MenuChoice::Continue))
    }

    fn choose_contention(&mut self, resource: &str, _blockers: &str) -> Result<ContentionChoice> {
        let mut script = self.inner.lock().unwrap();
        script.prompts.push(format!("contention:{resource}"));
        Ok(script
            .contention
            .pop_front()
            .unwrap_or(ContentionChoice::Wait))
    }

    fn confirm(&mut self, question: &str) -> Result<bool> {
        let mut script = self.inner.lock().unwrap();
        script.prompts.push(format!("confirm:{question}"));
        Ok(script.confirmations.pop_front().unwrap_or(false))
    }

    fn show(&mut self, title: &str, body: &str) {
        self.inner
            .lock()
            .unwrap()
            .shown
            .push((title.to_string(), body.to_string()));
    }
}

/// Clock whose time only moves when something sleeps
#[derive(Clone)]
pub struct VirtualClock {
    base: Instant,
    inner: Arc<Mutex<ClockState>>,
}

#[derive(Default)]
struct ClockState {
    offset: Duration,
    sleeps: Vec<Duration>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            inner: Arc::new(Mutex::new(ClockState::default())),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.inner.lock().unwrap().offset
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.inner.lock().unwrap().sleeps.clone()
    }

    pub fn advance(&self, by: Duration) {
        self.inner.lock().unwrap().offset += by;
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Instant {
        self.base + self.inner.lock().unwrap().offset
    }

    fn sleep(&self, duration: Duration) {
        let mut state = self.inner.lock().unwrap();
        state.offset += duration;
        state.sleeps.push(duration);
    }
}

/// Reporter that records every call as a short event string
#[derive(Clone, Default)]
pub struct RecordingProgress {
    inner: Arc<Mutex<ProgressLog>>,
}

#[derive(Default)]
struct ProgressLog {
    events: Vec<String>,
    waiting: bool,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.inner.lock().unwrap().events.clone()
    }

    /// `(ordinal, total)` pairs passed to `begin_step`
    pub fn steps(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| e.strip_prefix("begin_step ").map(str::to_string))
            .collect()
    }

    fn push(&self, event: String) {
        self.inner.lock().unwrap().events.push(event);
    }
}

impl ProgressReporter for RecordingProgress {
    fn begin_step(&mut self, ordinal: usize, total: usize, label: &str) {
        self.push(format!("begin_step {ordinal}/{total} {label}"));
    }

    fn finish_step(&mut self, ordinal: usize, succeeded: bool) {
        self.push(format!("finish_step {ordinal} {succeeded}"));
    }

    fn begin_wait(&mut self, message: &str) {
        self.inner.lock().unwrap().waiting = true;
        self.push(format!("begin_wait {message}"));
    }

    fn end_wait(&mut self) {
        self.inner.lock().unwrap().waiting = false;
        self.push("end_wait".to_string());
    }

    fn is_waiting(&self) -> bool {
        self.inner.lock().unwrap().waiting
    }

    fn message(&mut self, level: MessageLevel, text: &str) {
        self.push(format!("message {} {text}", level.marker()));
    }

    fn finish(&mut self) {
        self.push("finish".to_string());
    }

    fn abandon(&mut self) {
        self.push("abandon".to_string());
    }
}

/// Probe that replays scripted snapshots; the last one repeats
///
/// With `cleared_by`, an intervention of that mode frees the resource for good.
#[derive(Clone)]
pub struct ScriptedProbe {
    inner: Arc<Mutex<ProbeScript>>,
}

struct ProbeScript {
    snapshots: VecDeque<ContentionSnapshot>,
    cleared_by: Option<InterventionMode>,
    cleared: bool,
    polls: usize,
    interventions: Vec<InterventionMode>,
}

impl ScriptedProbe {
    pub fn new(snapshots: Vec<ContentionSnapshot>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ProbeScript {
                snapshots: snapshots.into(),
                cleared_by: None,
                cleared: false,
                polls: 0,
                interventions: Vec::new(),
            })),
        }
    }

    /// A probe whose resource is always free
    pub fn free() -> Self {
        Self::new(vec![ContentionSnapshot::default()])
    }

    pub fn cleared_by(self, mode: InterventionMode) -> Self {
        self.inner.lock().unwrap().cleared_by = Some(mode);
        self
    }

    pub fn polls(&self) -> usize {
        self.inner.lock().unwrap().polls
    }

    pub fn interventions(&self) -> Vec<InterventionMode> {
        self.inner.lock().unwrap().interventions.clone()
    }
}

impl ContentionProbe for ScriptedProbe {
    fn resource(&self) -> &str {
        "package manager"
    }

    fn snapshot(&mut self, _runner: &dyn CommandRunner) -> ContentionSnapshot {
        let mut script = self.inner.lock().unwrap();
        script.polls += 1;
        if script.cleared {
            return ContentionSnapshot::default();
        }
        if script.snapshots.len() > 1 {
            script.snapshots.pop_front().unwrap_or_default()
        } else {
            script.snapshots.front().cloned().unwrap_or_default()
        }
    }

    fn intervene(
        &mut self,
        _runner: &dyn CommandRunner,
        snapshot: &ContentionSnapshot,
        mode: InterventionMode,
    ) -> InterventionReport {
        let mut script = self.inner.lock().unwrap();
        script.interventions.push(mode);
        if script.cleared_by == Some(mode) {
            script.cleared = true;
        }
        InterventionReport {
            signalled: snapshot.processes.iter().cloned().collect(),
            removed: snapshot.markers.iter().cloned().collect(),
            notes: Vec::new(),
        }
    }
}

/// Fakes wired into a context, with handles kept for assertions
pub struct Harness {
    pub runner: ScriptedRunner,
    pub operator: ScriptedOperator,
    pub clock: VirtualClock,
    pub progress: RecordingProgress,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_operator(ScriptedOperator::new())
    }

    pub fn with_operator(operator: ScriptedOperator) -> Self {
        Self {
            runner: ScriptedRunner::new(),
            operator,
            clock: VirtualClock::new(),
            progress: RecordingProgress::new(),
        }
    }

    pub fn context(&self) -> RunContext {
        RunContext::new(
            Arc::new(self.runner.clone()),
            Box::new(self.operator.clone()),
            Arc::new(self.clock.clone()),
            Box::new(self.progress.clone()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules_match_whole_words_only() {
        let runner = ScriptedRunner::new();
        runner.respond("fuser /var/lib/dpkg/lock", vec![OperationResult::failed(1, "")]);

        let frontend = runner.run(&CommandSpec::new("fuser").arg("/var/lib/dpkg/lock-frontend"));
        let lock = runner.run(&CommandSpec::new("fuser").arg("/var/lib/dpkg/lock"));

        assert!(frontend.success);
        assert!(!lock.success);
        assert_eq!(runner.count("fuser /var/lib/dpkg/lock"), 1);
        assert_eq!(runner.count("fuser"), 2);
    }
}
