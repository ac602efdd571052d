/// Returns early with `$error` when `$predicate` does not hold.
///
/// Like `assert!`, but for validation that should surface as an `Err`:
///
/// ```ignore
/// ensure!(body.len() % 2 == 0, HttpError::invalid_body("odd length utf-16 body"));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
