//! Remote step execution over TCP with newline-delimited JSON messages.
//!
//! A coordinator opens one connection per worker address and sends
//! `setup` with the job name and its parameters. The worker rebuilds the
//! job from its own registry, answers `ready` with its step count, then
//! serves `step` requests until `close` or end of stream.

use super::dispatch::{DispatchOutcome, Dispatcher, StepSink, run_pool};
use super::kernel::{JobContext, JobPlan, StepPayload};
use super::registry::JobRegistry;
use super::status::{CancellationToken, JobStatus};
use crate::configurators::resolve;
use crate::database::Databases;
use crate::domain::{AnalysisError, AnalysisResult, JobParameters};
use crate::output::JobLog;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

pub const COMMUNICATION: &str = "JOB.COMMUNICATION";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
    Setup { job: String, parameters: JobParameters },
    Step { index: usize },
    Close,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerResponse {
    Ready { n_steps: usize },
    Result { index: usize, payload: StepPayload },
    Error { placeholder: String, message: String },
}

fn communication_error(address: &str, message: impl std::fmt::Display) -> AnalysisError {
    AnalysisError::job(COMMUNICATION, format!("worker {address}: {message}"))
}

/// One JSON message per line in each direction.
struct Connection {
    address: String,
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Connection {
    fn from_stream(address: String, stream: TcpStream) -> AnalysisResult<Self> {
        let reader = stream
            .try_clone()
            .map_err(|error| communication_error(&address, error))?;
        Ok(Self {
            address,
            reader: BufReader::new(reader),
            writer: stream,
        })
    }

    fn connect(address: &str) -> AnalysisResult<Self> {
        let stream = TcpStream::connect(address).map_err(|error| communication_error(address, error))?;
        Self::from_stream(address.to_string(), stream)
    }

    fn send<T: Serialize>(&mut self, message: &T) -> AnalysisResult<()> {
        let mut line =
            serde_json::to_string(message).map_err(|error| communication_error(&self.address, error))?;
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .and_then(|()| self.writer.flush())
            .map_err(|error| communication_error(&self.address, error))
    }

    /// `None` at end of stream.
    fn receive<T: DeserializeOwned>(&mut self) -> AnalysisResult<Option<T>> {
        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .map_err(|error| communication_error(&self.address, error))?;
        if read == 0 {
            return Ok(None);
        }
        serde_json::from_str(line.trim_end())
            .map(Some)
            .map_err(|error| communication_error(&self.address, format!("malformed message: {error}")))
    }

    fn expect_response(&mut self) -> AnalysisResult<WorkerResponse> {
        self.receive()?
            .ok_or_else(|| communication_error(&self.address, "connection closed"))
    }

    fn run_step(&mut self, index: usize) -> AnalysisResult<StepPayload> {
        self.send(&WorkerRequest::Step { index })?;
        match self.expect_response()? {
            WorkerResponse::Result { index: returned, payload } if returned == index => Ok(payload),
            WorkerResponse::Result { index: returned, .. } => Err(communication_error(
                &self.address,
                format!("answered step {returned} to a request for step {index}"),
            )),
            WorkerResponse::Error { placeholder, message } => Err(AnalysisError::job(
                "JOB.REMOTE_STEP",
                format!("worker {}: [{placeholder}] {message}", self.address),
            )),
            WorkerResponse::Ready { .. } => Err(communication_error(&self.address, "unexpected ready message")),
        }
    }
}

/// Coordinator end of a connection; says `close` when dropped.
struct CoordinatorSession(Connection);

impl Drop for CoordinatorSession {
    fn drop(&mut self) {
        if let Err(error) = self.0.send(&WorkerRequest::Close) {
            tracing::debug!(error = %error, "worker already gone");
        }
    }
}

/// Steps spread over remote `mdscatter worker` processes.
#[derive(Debug, Clone)]
pub struct RemoteDispatcher {
    addresses: Vec<String>,
    job: String,
    parameters: JobParameters,
}

impl RemoteDispatcher {
    pub fn new(addresses: Vec<String>, job: &str, parameters: JobParameters) -> Self {
        let mut parameters = parameters;
        parameters.insert("running_mode".to_string(), json!(["single-core"]));
        Self {
            addresses,
            job: job.to_string(),
            parameters,
        }
    }

    fn open(&self, address: &str, n_steps: usize) -> AnalysisResult<Connection> {
        let mut connection = Connection::connect(address)?;
        connection.send(&WorkerRequest::Setup {
            job: self.job.clone(),
            parameters: self.parameters.clone(),
        })?;
        match connection.expect_response()? {
            WorkerResponse::Ready { n_steps: remote } if remote == n_steps => Ok(connection),
            WorkerResponse::Ready { n_steps: remote } => Err(AnalysisError::job(
                "JOB.REMOTE_SETUP",
                format!("worker {address} planned {remote} steps, the coordinator {n_steps}"),
            )),
            WorkerResponse::Error { placeholder, message } => Err(AnalysisError::job(
                "JOB.REMOTE_SETUP",
                format!("worker {address}: [{placeholder}] {message}"),
            )),
            WorkerResponse::Result { .. } => Err(communication_error(address, "unexpected step result")),
        }
    }
}

impl Dispatcher for RemoteDispatcher {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn dispatch(
        &self,
        plan: &JobPlan,
        sink: &mut StepSink<'_>,
        status: &mut JobStatus,
    ) -> AnalysisResult<DispatchOutcome> {
        let mut connections = Vec::with_capacity(self.addresses.len());
        for address in &self.addresses {
            match self.open(address, plan.n_steps) {
                Ok(connection) => connections.push(CoordinatorSession(connection)),
                Err(error) => {
                    if error.placeholder() == COMMUNICATION {
                        status.communication(false);
                    }
                    return Err(error);
                }
            }
        }
        status.communication(true);
        let outcome = run_pool(
            connections,
            plan.n_steps,
            |session: &mut CoordinatorSession, index| session.0.run_step(index),
            sink,
            status,
        );
        if let Err(error) = &outcome {
            if error.placeholder() == COMMUNICATION {
                status.communication(false);
            }
        }
        outcome
    }
}

/// Accepts coordinator sessions on `listener`, one thread per session,
/// until `max_sessions` sessions were served (forever when `None`) or
/// `shutdown` is cancelled.
pub fn serve(
    listener: &TcpListener,
    registry: &JobRegistry,
    databases: &Databases,
    max_sessions: Option<usize>,
    shutdown: &CancellationToken,
) -> AnalysisResult<()> {
    let local = listener
        .local_addr()
        .map(|address| address.to_string())
        .unwrap_or_default();
    tracing::info!(address = %local, "worker listening");
    thread::scope(|scope| {
        let mut served = 0;
        for stream in listener.incoming() {
            if shutdown.is_cancelled() {
                break;
            }
            let stream = match stream {
                Ok(stream) => stream,
                Err(error) => {
                    tracing::warn!(%error, "failed to accept a coordinator");
                    continue;
                }
            };
            let peer = stream
                .peer_addr()
                .map(|address| address.to_string())
                .unwrap_or_else(|_| "unknown".to_string());
            scope.spawn(move || {
                if let Err(error) = serve_session(peer.clone(), stream, registry, databases) {
                    tracing::warn!(peer = %peer, error = %error, "worker session ended with an error");
                }
            });
            served += 1;
            if max_sessions.is_some_and(|limit| served >= limit) {
                break;
            }
        }
        Ok(())
    })
}

fn serve_session(
    peer: String,
    stream: TcpStream,
    registry: &JobRegistry,
    databases: &Databases,
) -> AnalysisResult<()> {
    let mut connection = Connection::from_stream(peer.clone(), stream)?;
    let Some(WorkerRequest::Setup { job, parameters }) = connection.receive()? else {
        return Err(communication_error(&peer, "expected a setup message"));
    };
    tracing::info!(peer = %peer, job = %job, "worker session started");
    let log = JobLog::new(format!("worker-{peer}"));
    let plan = match setup(&job, &parameters, registry, databases, &log) {
        Ok(plan) => plan,
        Err(error) => {
            connection.send(&error_response(&error))?;
            return Err(error);
        }
    };
    connection.send(&WorkerResponse::Ready { n_steps: plan.n_steps })?;

    while let Some(request) = connection.receive::<WorkerRequest>()? {
        match request {
            WorkerRequest::Step { index } if index < plan.n_steps => {
                let response = match plan.kernel.run_step(index) {
                    Ok(payload) => WorkerResponse::Result { index, payload },
                    Err(error) => error_response(&error),
                };
                connection.send(&response)?;
            }
            WorkerRequest::Step { index } => {
                let error = AnalysisError::job(
                    "JOB.STEP_INDEX",
                    format!("step {index} is outside [0, {})", plan.n_steps),
                );
                connection.send(&error_response(&error))?;
            }
            WorkerRequest::Close => break,
            WorkerRequest::Setup { .. } => {
                let error = communication_error(&peer, "a session accepts one setup");
                connection.send(&error_response(&error))?;
            }
        }
    }
    tracing::info!(peer = %peer, "worker session closed");
    Ok(())
}

fn setup(
    job: &str,
    parameters: &JobParameters,
    registry: &JobRegistry,
    databases: &Databases,
    log: &JobLog,
) -> AnalysisResult<JobPlan> {
    let descriptor = registry.get(job)?;
    let config = resolve(&descriptor.settings(), parameters, databases)?;
    let mut analysis = descriptor.create();
    let context = JobContext {
        config: &config,
        databases,
        log,
    };
    analysis.initialize(&context)
}

fn error_response(error: &AnalysisError) -> WorkerResponse {
    WorkerResponse::Error {
        placeholder: error.placeholder().to_string(),
        message: error.message().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{COMMUNICATION, RemoteDispatcher, WorkerRequest, serve};
    use crate::database::Databases;
    use crate::jobs::dispatch::{DispatchOutcome, Dispatcher};
    use crate::jobs::registry::JobRegistry;
    use crate::jobs::status::{CancellationToken, JobStatus, StatusEvent};
    use crate::jobs::kernel::JobPlan;
    use crate::jobs::testing::{SquareKernel, square_sum_descriptor};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn requests_are_tagged_json_lines() {
        let encoded = serde_json::to_string(&WorkerRequest::Step { index: 4 }).expect("encode");
        assert_eq!(encoded, r#"{"type":"step","index":4}"#);
    }

    #[test]
    fn remote_workers_return_every_step() {
        let databases = Databases::builtin().expect("databases");
        let mut registry = JobRegistry::new();
        registry.register(square_sum_descriptor()).expect("register");
        let listeners: Vec<TcpListener> = (0..2)
            .map(|_| TcpListener::bind("127.0.0.1:0").expect("bind"))
            .collect();
        let addresses: Vec<String> = listeners
            .iter()
            .map(|listener| listener.local_addr().expect("address").to_string())
            .collect();
        let parameters = json!({"n_steps": 6}).as_object().cloned().expect("object");
        let dispatcher = RemoteDispatcher::new(addresses, "SquareSum", parameters);
        let plan = JobPlan::new(6, SquareKernel);
        let shutdown = CancellationToken::new();

        thread::scope(|scope| {
            for listener in &listeners {
                let (registry, databases, shutdown) = (&registry, &databases, &shutdown);
                scope.spawn(move || serve(listener, registry, databases, Some(1), shutdown).expect("serve"));
            }
            let mut status = JobStatus::default();
            status.start(plan.n_steps, 1.0);
            let mut results = BTreeMap::new();
            let outcome = dispatcher
                .dispatch(
                    &plan,
                    &mut |index, payload| {
                        results.insert(index, payload.scalar("square")?);
                        Ok(())
                    },
                    &mut status,
                )
                .expect("dispatch");
            assert_eq!(outcome, DispatchOutcome::Completed);
            assert_eq!(results.len(), 6);
            assert_eq!(results[&5], 25.0);
            assert!(status.events().contains(&StatusEvent::Communication { connected: true }));
        });
    }

    #[test]
    fn unreachable_workers_fail_with_a_communication_event() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let address = listener.local_addr().expect("address").to_string();
        drop(listener);
        let dispatcher = RemoteDispatcher::new(vec![address], "SquareSum", serde_json::Map::new());
        let plan = JobPlan::new(2, SquareKernel);
        let mut status = JobStatus::default();
        status.start(2, 1.0);
        let error = dispatcher
            .dispatch(&plan, &mut |_, _| Ok(()), &mut status)
            .expect_err("unreachable");
        assert_eq!(error.placeholder(), COMMUNICATION);
        assert!(status.events().contains(&StatusEvent::Communication { connected: false }));
    }
}
