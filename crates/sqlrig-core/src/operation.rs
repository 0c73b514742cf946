use std::time::Instant;

/// Start/finish banner around one step of a run.
///
/// `start` logs the step; `done` logs its completion with the elapsed time.
/// A guard dropped without `done` (an early `?` return) logs that the step
/// did not complete.
#[must_use = "call done() when the step completes"]
pub struct Operation {
    message: String,
    started: Instant,
    finished: bool,
}

impl Operation {
    pub fn start(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::info!("------ {message}");
        Self {
            message,
            started: Instant::now(),
            finished: false,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn done(mut self) {
        self.finished = true;
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        tracing::info!(elapsed_ms, "------ {} done", self.message);
    }
}

impl Drop for Operation {
    fn drop(&mut self) {
        if !self.finished {
            let elapsed_ms = self.started.elapsed().as_millis() as u64;
            tracing::warn!(elapsed_ms, "------ {} did not complete", self.message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn done_marks_finished() {
        let op = Operation::start("Deploy views");
        assert_eq!(op.message(), "Deploy views");
        op.done();
    }

    #[test]
    fn drop_without_done_does_not_panic() {
        let op = Operation::start("Drop functions");
        drop(op);
    }
}
