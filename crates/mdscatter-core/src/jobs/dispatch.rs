//! Step dispatch back-ends sharing one coordinator contract: every step
//! index runs exactly once and its payload is handed to `sink` on the
//! calling thread, in arrival order.

use super::kernel::{JobPlan, StepPayload};
use super::remote::RemoteDispatcher;
use super::status::{CancellationToken, JobStatus};
use crate::configurators::RunningMode;
use crate::domain::{AnalysisError, AnalysisResult, JobParameters};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

pub type StepSink<'a> = dyn FnMut(usize, StepPayload) -> AnalysisResult<()> + 'a;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Completed,
    Cancelled,
}

pub trait Dispatcher {
    fn name(&self) -> &'static str;

    fn dispatch(
        &self,
        plan: &JobPlan,
        sink: &mut StepSink<'_>,
        status: &mut JobStatus,
    ) -> AnalysisResult<DispatchOutcome>;
}

pub(crate) fn step_error(index: usize, error: AnalysisError) -> AnalysisError {
    error.with_context(format!("step {index}"))
}

/// Synchronous loop in the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleCoreDispatcher;

impl Dispatcher for SingleCoreDispatcher {
    fn name(&self) -> &'static str {
        "single-core"
    }

    fn dispatch(
        &self,
        plan: &JobPlan,
        sink: &mut StepSink<'_>,
        status: &mut JobStatus,
    ) -> AnalysisResult<DispatchOutcome> {
        for index in 0..plan.n_steps {
            if status.is_stopped() {
                return Ok(DispatchOutcome::Cancelled);
            }
            tracing::debug!(index, "running step");
            let payload = plan.kernel.run_step(index).map_err(|error| step_error(index, error))?;
            sink(index, payload)?;
            status.update();
        }
        Ok(DispatchOutcome::Completed)
    }
}

/// A rayon pool of `workers` threads sharing the immutable step kernel.
#[derive(Debug, Clone, Copy)]
pub struct MulticoreDispatcher {
    pub workers: usize,
}

impl Dispatcher for MulticoreDispatcher {
    fn name(&self) -> &'static str {
        "multicore"
    }

    fn dispatch(
        &self,
        plan: &JobPlan,
        sink: &mut StepSink<'_>,
        status: &mut JobStatus,
    ) -> AnalysisResult<DispatchOutcome> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.workers.clamp(1, plan.n_steps.max(1)))
            .thread_name(|index| format!("mdscatter-step-{index}"))
            .build()
            .map_err(|error| AnalysisError::internal("JOB.THREAD_POOL", error.to_string()))?;
        let n_steps = plan.n_steps;
        let kernel = &plan.kernel;
        let failed = AtomicBool::new(false);
        let token = status.token().clone();
        let (sender, receiver) = mpsc::channel::<(usize, AnalysisResult<StepPayload>)>();

        pool.in_place_scope(|scope| {
            let (failed, worker_token) = (&failed, token.clone());
            scope.spawn(move |_| {
                // Err(()) only short-circuits the iteration; the coordinator sees the step error.
                let _ = (0..n_steps).into_par_iter().try_for_each_with(sender, |sender, index| {
                    if worker_token.is_cancelled() || failed.load(Ordering::SeqCst) {
                        return Err(());
                    }
                    tracing::debug!(index, "running step");
                    let result = kernel.run_step(index);
                    let stop = result.is_err();
                    if sender.send((index, result)).is_err() || stop {
                        return Err(());
                    }
                    Ok(())
                });
            });
            collect_results(&receiver, n_steps, failed, &token, sink, status)
        })
    }
}

/// Coordinator side of a pool: hands every payload to `sink` in arrival
/// order until the senders are gone.
fn collect_results(
    receiver: &mpsc::Receiver<(usize, AnalysisResult<StepPayload>)>,
    n_steps: usize,
    failed: &AtomicBool,
    token: &CancellationToken,
    sink: &mut StepSink<'_>,
    status: &mut JobStatus,
) -> AnalysisResult<DispatchOutcome> {
    let mut received = 0;
    while let Ok((index, result)) = receiver.recv() {
        let combined = result
            .map_err(|error| step_error(index, error))
            .and_then(|payload| sink(index, payload));
        if let Err(error) = combined {
            failed.store(true, Ordering::SeqCst);
            return Err(error);
        }
        received += 1;
        status.update();
    }

    if received == n_steps {
        Ok(DispatchOutcome::Completed)
    } else if token.is_cancelled() {
        Ok(DispatchOutcome::Cancelled)
    } else {
        Err(AnalysisError::internal(
            "JOB.INCOMPLETE",
            format!("{received} of {n_steps} steps returned a result"),
        ))
    }
}

/// Runs `n_steps` indices over stateful `workers` (one per remote
/// connection), each pulling the next free index until none is left, a step
/// fails or the job is cancelled.
pub(crate) fn run_pool<W, F>(
    workers: Vec<W>,
    n_steps: usize,
    step: F,
    sink: &mut StepSink<'_>,
    status: &mut JobStatus,
) -> AnalysisResult<DispatchOutcome>
where
    W: Send,
    F: Fn(&mut W, usize) -> AnalysisResult<StepPayload> + Sync,
{
    let next = AtomicUsize::new(0);
    let failed = AtomicBool::new(false);
    let token = status.token().clone();
    let (sender, receiver) = mpsc::channel::<(usize, AnalysisResult<StepPayload>)>();

    thread::scope(|scope| {
        for (worker_index, mut worker) in workers.into_iter().enumerate() {
            let sender = sender.clone();
            let (next, failed, token, step) = (&next, &failed, token.clone(), &step);
            scope.spawn(move || {
                loop {
                    if token.is_cancelled() || failed.load(Ordering::SeqCst) {
                        break;
                    }
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    if index >= n_steps {
                        break;
                    }
                    tracing::debug!(worker = worker_index, index, "running step");
                    let result = step(&mut worker, index);
                    let stop = result.is_err();
                    if sender.send((index, result)).is_err() || stop {
                        break;
                    }
                }
            });
        }
        drop(sender);
        collect_results(&receiver, n_steps, &failed, &token, sink, status)
    })
}

/// The dispatcher implementing `mode`; remote workers rebuild the job from
/// its name and parameters.
pub fn dispatcher_for(mode: &RunningMode, job: &str, parameters: &JobParameters) -> Box<dyn Dispatcher> {
    match mode {
        RunningMode::SingleCore => Box::new(SingleCoreDispatcher),
        RunningMode::Multicore { workers } => Box::new(MulticoreDispatcher { workers: *workers }),
        RunningMode::Remote { addresses } => {
            Box::new(RemoteDispatcher::new(addresses.clone(), job, parameters.clone()))
        }
    }
}
