use crate::bridge::{FailureReport, Operation};
use crate::errors::ErrorKind;
use crate::session::{SessionStateMachine, SessionStatus};

/// What the error handler did about a failure, beyond logging it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    Logged,
    /// The failed call belongs to an attempt the session has moved past.
    Stale,
    RolledBack { from: SessionStatus },
    InitializationReset,
}

/// Uniform sink for failures intercepted by the event bridge.
///
/// Runs on the consumer thread. Never panics, never rethrows.
#[derive(Debug, Default)]
pub struct ErrorHandler {
    handled: usize,
}

impl ErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of failures handled so far.
    pub fn handled(&self) -> usize {
        self.handled
    }

    pub fn handle(&mut self, report: &FailureReport, session: &mut SessionStateMachine) -> Recovery {
        self.handled += 1;
        let kind = report.cause.kind();
        Self::log(report, kind);

        match report.operation {
            Operation::Connect(attempt) | Operation::Disconnect(attempt) => {
                if !session.is_current(attempt) {
                    tracing::debug!(attempt, current = session.attempt(), "failure of an earlier attempt");
                    return Recovery::Stale;
                }
                match session.rollback_transitional(attempt) {
                    Some(from) => Recovery::RolledBack { from },
                    None => Recovery::Logged,
                }
            }
            Operation::Initialize => {
                session.on_initialize_failed();
                Recovery::InitializationReset
            }
            _ => Recovery::Logged,
        }
    }

    fn log(report: &FailureReport, kind: ErrorKind) {
        let file = report.location.file();
        let line = report.location.line();
        match kind {
            ErrorKind::InvalidArgument | ErrorKind::NotConnected => tracing::warn!(
                operation = %report.operation,
                %kind,
                file,
                line,
                "{}",
                report.cause
            ),
            ErrorKind::SdkInternal | ErrorKind::Unknown => tracing::error!(
                operation = %report.operation,
                %kind,
                file,
                line,
                "{}",
                report.cause
            ),
        }
    }
}
