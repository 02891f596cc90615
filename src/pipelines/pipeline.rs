//! Pipeline trait.
use crate::error::Error;

/// This trait must be implemented for each Pipeline,
/// and is generic over the return type so that
/// each stage can return its own run statistics.
pub trait Pipeline<T> {
    fn run(&self) -> Result<T, Error>;
}

/// Log every failed unit of work, and fail if there is any.
///
/// Units are independent: a failure does not stop the others, so that
/// a re-run only has to redo the failed ones.
/// A single failure is returned as is.
pub(crate) fn check_failures(stage: &str, mut failures: Vec<(String, Error)>) -> Result<(), Error> {
    for (unit, error) in &failures {
        log::error!("[{}] {} failed: {}", stage, unit, error);
    }
    if failures.len() <= 1 {
        return match failures.pop() {
            Some((_, error)) => Err(error),
            None => Ok(()),
        };
    }
    Err(Error::Custom(format!(
        "{} {} units failed: see previous messages.",
        failures.len(),
        stage
    )))
}
